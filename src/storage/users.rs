use chrono::Utc;
use redb::{ReadableTable, Table};

use super::db::{Database, DatabaseError};
use super::models::{GroupRecord, UserProfile, UserRecord};
use super::tables::*;

fn read_group(
    table: &Table<'_, &'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<GroupRecord>, DatabaseError> {
    match table.get(id)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

fn write_group(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    group: &GroupRecord,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(group)?;
    table.insert(group.id.as_str(), data.as_slice())?;
    Ok(())
}

impl Database {
    // ========================================================================
    // Users and groups mirrored from SSO
    // ========================================================================

    /// Insert or refresh a user and keep group membership in sync.
    pub fn upsert_user(&self, profile: UserProfile) -> Result<UserRecord, DatabaseError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let user = {
            let mut users = write_txn.open_table(USERS)?;
            let existing: Option<UserRecord> = match users.get(profile.id.as_str())? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            let previous_group = existing.as_ref().and_then(|u| u.group_id.clone());

            let user = UserRecord {
                id: profile.id,
                name: profile.name,
                email: profile.email,
                avatar: profile.avatar,
                group_id: profile.group_id,
                created_at: existing.map(|u| u.created_at).unwrap_or(now),
                updated_at: now,
            };
            let data = rmp_serde::to_vec_named(&user)?;
            users.insert(user.id.as_str(), data.as_slice())?;

            let mut groups = write_txn.open_table(GROUPS)?;
            if previous_group != user.group_id {
                if let Some(old_id) = previous_group {
                    if let Some(mut old) = read_group(&groups, &old_id)? {
                        old.member_ids.retain(|m| m != &user.id);
                        old.updated_at = now;
                        write_group(&mut groups, &old)?;
                    }
                }
            }
            if let Some(ref group_id) = user.group_id {
                let mut group = read_group(&groups, group_id)?.unwrap_or_else(|| GroupRecord {
                    id: group_id.clone(),
                    name: group_id.clone(),
                    member_ids: Vec::new(),
                    created_at: now,
                    updated_at: now,
                });
                if !group.member_ids.contains(&user.id) {
                    group.member_ids.push(user.id.clone());
                    group.updated_at = now;
                    write_group(&mut groups, &group)?;
                }
            }
            user
        };
        write_txn.commit()?;
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(GROUPS)?;
        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Users whose private rows `user_id` may read: its group's members, or
    /// just itself when it has no group or is not mirrored yet.
    pub fn group_user_ids(&self, user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let group_id = self.get_user(user_id)?.and_then(|u| u.group_id);
        let mut ids = match group_id {
            Some(gid) => self
                .get_group(&gid)?
                .map(|g| g.member_ids)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !ids.iter().any(|id| id == user_id) {
            ids.push(user_id.to_string());
        }
        Ok(ids)
    }
}
