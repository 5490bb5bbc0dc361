use redb::TableDefinition;

/// Stored objects: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Shared objects: "{bucket}/{path}" -> ObjectRef (msgpack)
pub const OBJECT_REFS: TableDefinition<&str, &[u8]> = TableDefinition::new("object_refs");

pub const IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("images");
pub const VIDEOS: TableDefinition<&str, &[u8]> = TableDefinition::new("videos");

/// Durable derivative queue: image uuid -> DerivativeTask (msgpack)
pub const DERIVATIVE_TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("derivative_tasks");

pub const KEEPS: TableDefinition<&str, &[u8]> = TableDefinition::new("keeps");
pub const TODOS: TableDefinition<&str, &[u8]> = TableDefinition::new("todos");
pub const MOMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("moments");
pub const MINDMAPS: TableDefinition<&str, &[u8]> = TableDefinition::new("mindmaps");

/// Moment attachments: moment uuid -> msgpack Vec<MomentMedia>
pub const MOMENT_MEDIA: TableDefinition<&str, &[u8]> = TableDefinition::new("moment_media");

pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");
