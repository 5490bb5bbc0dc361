use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::access::Viewer;
use super::db::{Database, DatabaseError};
use super::models::*;
use super::page::{paginate, CursorPage};
use super::tables::*;

/// A row type with an owner and a visibility flag, stored msgpack-encoded in
/// its own table keyed by id.
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn is_public(&self) -> bool;
    fn created_at(&self) -> DateTime<Utc>;
    fn touch(&mut self, now: DateTime<Utc>);

    fn category(&self) -> &str {
        ""
    }

    /// Whether the row matches a lowercased free-text query. Entities without
    /// text fields ignore the query.
    fn matches_text(&self, _needle: &str) -> bool {
        true
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        newest_first(a, b)
    }

    /// Bump the view counter; returns false for entities that do not count views.
    fn record_view(&mut self) -> bool {
        false
    }

    /// Remove dependent rows inside the deleting transaction.
    fn cascade_delete(_txn: &WriteTransaction, _id: &str) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// `created_at` descending, ties broken by id descending.
pub fn newest_first<E: Entity>(a: &E, b: &E) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| b.id().cmp(a.id()))
}

/// Facet filters applied before pagination.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

pub(crate) fn read_row<E, T>(table: &T, id: &str) -> Result<Option<E>, DatabaseError>
where
    E: DeserializeOwned,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_row<E: Entity>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &E,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(record)?;
    table.insert(record.id(), data.as_slice())?;
    Ok(())
}

impl Database {
    // ========================================================================
    // Generic entity operations
    // ========================================================================

    pub fn insert<E: Entity>(&self, record: &E) -> Result<(), DatabaseError> {
        debug_assert!(!record.id().is_empty(), "entity id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(E::TABLE)?;
            write_row(&mut table, record)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Unfiltered lookup by id, for internal use.
    pub fn fetch<E: Entity>(&self, id: &str) -> Result<Option<E>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(E::TABLE)?;
        read_row(&table, id)
    }

    /// Lookup by id through the owner-or-public filter.
    pub fn fetch_visible<E: Entity>(&self, id: &str, viewer: &Viewer) -> Result<E, DatabaseError> {
        match self.fetch::<E>(id)? {
            Some(record) if viewer.can_read(record.owner_id(), record.is_public()) => Ok(record),
            _ => Err(DatabaseError::NotFound),
        }
    }

    /// Apply `change` to the row matching `id AND owner_id`. A row owned by
    /// someone else is reported exactly like a missing one.
    pub fn update_owned<E, F>(&self, id: &str, owner_id: &str, change: F) -> Result<E, DatabaseError>
    where
        E: Entity,
        F: FnOnce(&mut E),
    {
        let write_txn = self.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(E::TABLE)?;
            let mut record: E = match read_row(&table, id)? {
                Some(record) if record.owner_id() == owner_id => record,
                _ => return Err(DatabaseError::NotFound),
            };
            change(&mut record);
            record.touch(Utc::now());
            write_row(&mut table, &record)?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Delete the row matching `id AND owner_id` together with its dependents.
    pub fn delete_owned<E: Entity>(&self, id: &str, owner_id: &str) -> Result<E, DatabaseError> {
        let write_txn = self.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(E::TABLE)?;
            let record: E = match read_row(&table, id)? {
                Some(record) if record.owner_id() == owner_id => record,
                _ => return Err(DatabaseError::NotFound),
            };
            table.remove(id)?;
            record
        };
        E::cascade_delete(&write_txn, id)?;
        write_txn.commit()?;
        Ok(record)
    }

    /// Every row, in table order.
    pub fn scan<E: Entity>(&self) -> Result<Vec<E>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(E::TABLE)?;

        let mut records = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            records.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Rows visible to `viewer` that pass `filter`, in listing order.
    pub fn list_visible<E: Entity>(
        &self,
        viewer: &Viewer,
        filter: &ListFilter,
    ) -> Result<Vec<E>, DatabaseError> {
        let needle = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<E> = self
            .scan::<E>()?
            .into_iter()
            .filter(|r| viewer.can_read(r.owner_id(), r.is_public()))
            .filter(|r| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| r.category() == c)
            })
            .filter(|r| needle.as_deref().map_or(true, |q| r.matches_text(q)))
            .collect();
        rows.sort_by(E::listing_order);
        Ok(rows)
    }

    pub fn list_page<E: Entity>(
        &self,
        viewer: &Viewer,
        filter: &ListFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<CursorPage<E>, DatabaseError> {
        let rows = self.list_visible::<E>(viewer, filter)?;
        paginate(rows, cursor, limit, |r| r.id())
    }

    /// Row counts per non-empty category among rows visible to `viewer`.
    pub fn category_counts<E: Entity>(
        &self,
        viewer: &Viewer,
    ) -> Result<Vec<CategoryCount>, DatabaseError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for record in self.list_visible::<E>(viewer, &ListFilter::default())? {
            if !record.category().is_empty() {
                *counts.entry(record.category().to_string()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect())
    }

    /// Increment the view counter of a row. Missing rows are ignored.
    pub fn record_view<E: Entity>(&self, id: &str) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(E::TABLE)?;
            let existing: Option<E> = read_row(&table, id)?;
            if let Some(mut record) = existing {
                if record.record_view() {
                    write_row(&mut table, &record)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

// ============================================================================
// Entity impls
// ============================================================================

macro_rules! owned_entity {
    ($table:expr) => {
        const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = $table;

        fn id(&self) -> &str {
            &self.id
        }

        fn owner_id(&self) -> &str {
            &self.owner_id
        }

        fn is_public(&self) -> bool {
            self.is_public
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn touch(&mut self, now: DateTime<Utc>) {
            self.updated_at = now;
        }
    };
}

impl Entity for KeepRecord {
    owned_entity!(KEEPS);

    fn category(&self) -> &str {
        &self.category
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }

    fn record_view(&mut self) -> bool {
        self.view_count += 1;
        true
    }
}

impl Entity for TodoRecord {
    owned_entity!(TODOS);

    fn category(&self) -> &str {
        &self.category
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }

    /// Pinned first, open before done, then newest first.
    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| a.status.cmp(&b.status))
            .then_with(|| newest_first(a, b))
    }
}

impl Entity for MomentRecord {
    owned_entity!(MOMENTS);

    fn category(&self) -> &str {
        &self.category
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
    }

    fn record_view(&mut self) -> bool {
        self.view_count += 1;
        true
    }

    fn cascade_delete(txn: &WriteTransaction, id: &str) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(MOMENT_MEDIA)?;
        table.remove(id)?;
        Ok(())
    }
}

impl Entity for MindMapRecord {
    owned_entity!(MINDMAPS);

    fn category(&self) -> &str {
        &self.category
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
    }
}

impl Entity for ImageRecord {
    owned_entity!(IMAGES);

    fn category(&self) -> &str {
        &self.category
    }

    fn matches_text(&self, needle: &str) -> bool {
        self.address
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(needle))
    }

    fn cascade_delete(txn: &WriteTransaction, id: &str) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(DERIVATIVE_TASKS)?;
        table.remove(id)?;
        Ok(())
    }
}

impl Entity for VideoRecord {
    owned_entity!(VIDEOS);

    fn category(&self) -> &str {
        &self.category
    }
}

impl Entity for FileRecord {
    owned_entity!(FILES);
}
