pub mod access;
pub mod db;
pub mod entity;
mod files;
mod images;
pub mod models;
mod moments;
pub mod page;
mod tables;
mod users;

pub use access::Viewer;
pub use db::{Database, DatabaseError};
pub use entity::{CategoryCount, Entity, ListFilter};
pub use files::{Aborted, Reservation};
pub use page::CursorPage;
pub use tables::*;
