use serde::Serialize;

use super::db::DatabaseError;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    /// Id of the first row of the next page
    pub next_cursor: Option<String>,
}

/// Seek to `cursor` (inclusive) in `rows`, which must already be in listing
/// order, and cut a page of `limit` rows. The row after the page becomes the
/// next cursor.
pub fn paginate<T>(
    rows: Vec<T>,
    cursor: Option<&str>,
    limit: usize,
    id_of: impl Fn(&T) -> &str,
) -> Result<CursorPage<T>, DatabaseError> {
    let start = match cursor {
        Some(cursor) => rows
            .iter()
            .position(|row| id_of(row) == cursor)
            .ok_or_else(|| DatabaseError::InvalidCursor(cursor.to_string()))?,
        None => 0,
    };

    let mut items: Vec<T> = rows.into_iter().skip(start).take(limit + 1).collect();
    let next_cursor = if items.len() > limit {
        items.pop().map(|row| id_of(&row).to_string())
    } else {
        None
    };

    Ok(CursorPage { items, next_cursor })
}
