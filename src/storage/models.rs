use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-state patch value for partial updates.
/// Unlike `Option<Option<T>>`, each variant has a distinct wire representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    /// Field was not included in the request (no change).
    #[default]
    Absent,
    /// Field was explicitly set to null (clear it).
    Null,
    /// Field was set to a new value.
    Value(T),
}

impl<T> From<Option<Option<T>>> for Patch<T> {
    fn from(v: Option<Option<T>>) -> Self {
        match v {
            None => Patch::Absent,
            Some(None) => Patch::Null,
            Some(Some(v)) => Patch::Value(v),
        }
    }
}

impl<T> Patch<T> {
    /// Apply the patch to an optional field in place.
    pub fn apply_to(self, field: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Null => *field = None,
            Patch::Value(v) => *field = Some(v),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let primary = mime_type.split('/').next().unwrap_or("");
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" | "application" => {
                let sub = mime_type.split('/').nth(1).unwrap_or("");
                match sub {
                    "pdf"
                    | "msword"
                    | "rtf"
                    | "csv"
                    | "vnd.openxmlformats-officedocument.wordprocessingml.document"
                    | "vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                    | "vnd.ms-excel" => FileType::Document,
                    _ if primary == "text" => FileType::Document,
                    _ => FileType::Binary,
                }
            }
            _ => FileType::Binary,
        }
    }
}

// ============================================================================
// Assets
// ============================================================================

/// Lifecycle of a file row: reserved before the object write, committed after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Reserved,
    Committed,
}

/// One holder's reference to a stored object. Every upload gets its own row
/// with its own owner and visibility; rows with identical bytes share the
/// object, counted in [`ObjectRef`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub bucket: String,
    /// Object key, `{prefix}/{sha256}`
    pub path: String,
    pub hash: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    pub owner_id: String,
    pub is_public: bool,
    pub state: FileState,
    /// Image or video this row belongs to; `None` for generic uploads
    #[serde(default)]
    pub media_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Key of the object reference entry for this row.
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.bucket, self.path)
    }
}

/// Holders of one stored object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Reserved and committed rows pointing at the object
    pub holders: u32,
    /// Set once a write of the object has succeeded
    pub stored: bool,
}

/// Progress of the asynchronous derivative tier for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifData {
    pub make: Option<String>,
    pub model: Option<String>,
    pub date_taken: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub exposure_time: Option<String>,
    pub f_number: Option<f64>,
    pub iso: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub owner_id: String,
    pub is_public: bool,
    #[serde(default)]
    pub category: String,
    pub original_file_id: String,
    pub thumbnail_320x_file_id: String,
    #[serde(default)]
    pub compressed_file_id: Option<String>,
    #[serde(default)]
    pub thumbnail_768x_file_id: Option<String>,
    /// Tiny JPEG kept inline and served as a data URI
    pub thumbnail_10x: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub exif: Option<ExifData>,
    #[serde(default)]
    pub address: Option<String>,
    pub derivative_status: DerivativeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Every file row this image holds a reference to.
    pub fn file_ids(&self) -> Vec<String> {
        let mut ids = vec![
            self.original_file_id.clone(),
            self.thumbnail_320x_file_id.clone(),
        ];
        ids.extend(self.compressed_file_id.clone());
        ids.extend(self.thumbnail_768x_file_id.clone());
        ids
    }
}

/// Pending derivative work for one image, kept until it succeeds or runs out
/// of attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeTask {
    pub image_id: String,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Output of a successful derivative run.
#[derive(Debug, Clone)]
pub struct DerivativeOutput {
    pub compressed_file_id: String,
    pub thumbnail_768x_file_id: String,
    pub exif: Option<ExifData>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub owner_id: String,
    pub is_public: bool,
    #[serde(default)]
    pub category: String,
    pub file_id: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Content entities
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub is_public: bool,
    #[serde(default)]
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Done flag
    pub status: bool,
    pub pinned: bool,
    #[serde(default)]
    pub category: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentRecord {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub is_public: bool,
    #[serde(default)]
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Join row between a moment and one of its attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentMedia {
    pub kind: MediaKind,
    pub media_id: String,
    pub sort: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindMapRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Node tree as produced by the editor
    pub content: serde_json::Value,
    #[serde(default)]
    pub category: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity fields mirrored from the upstream SSO token.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub group_id: Option<String>,
}
