mod admin;
mod assets;
mod keeps;
mod mindmaps;
mod moments;
mod resources;
mod search;
mod todos;
mod users;

pub use admin::{admin_purge, health};
pub use assets::{
    delete_file, delete_image, delete_video, file_content, get_file, upload_file, upload_image,
    upload_video,
};
pub use keeps::{create_keep, update_keep};
pub use mindmaps::{create_mindmap, update_mindmap};
pub use moments::{create_moment, update_moment};
pub use resources::{categories, detail, list, remove};
pub use search::search;
pub use todos::{create_todo, update_todo};
pub use users::{me, sync_user};
