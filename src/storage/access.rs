//! Owner-or-public visibility shared by every listing and detail query.

/// Who is asking. Anonymous viewers only see public rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<String>,
    /// Users whose private rows this viewer may read, including itself
    pub group_user_ids: Vec<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>, mut group_user_ids: Vec<String>) -> Self {
        let user_id = user_id.into();
        if !group_user_ids.contains(&user_id) {
            group_user_ids.push(user_id.clone());
        }
        Self {
            user_id: Some(user_id),
            group_user_ids,
        }
    }

    /// `owner_id IN group_user_ids OR is_public`
    pub fn can_read(&self, owner_id: &str, is_public: bool) -> bool {
        is_public || self.group_user_ids.iter().any(|id| id == owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_sees_only_public() {
        let viewer = Viewer::anonymous();
        assert!(viewer.can_read("alice", true));
        assert!(!viewer.can_read("alice", false));
    }

    #[test]
    fn test_group_members_read() {
        let viewer = Viewer::user("bob", vec!["alice".to_string()]);
        assert!(viewer.can_read("alice", false));
        assert!(viewer.can_read("bob", false));
        assert!(!viewer.can_read("carol", false));
    }

    #[test]
    fn test_user_always_in_own_group() {
        let viewer = Viewer::user("dave", Vec::new());
        assert_eq!(viewer.group_user_ids, vec!["dave".to_string()]);
    }
}
