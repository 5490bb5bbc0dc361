use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::entity::{read_row, write_row};
use super::models::{MomentMedia, MomentRecord};
use super::tables::*;

fn write_media(
    txn: &redb::WriteTransaction,
    moment_id: &str,
    media: &[MomentMedia],
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(MOMENT_MEDIA)?;
    if media.is_empty() {
        table.remove(moment_id)?;
    } else {
        let data = rmp_serde::to_vec_named(media)?;
        table.insert(moment_id, data.as_slice())?;
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Moments and their attachments
    // ========================================================================

    pub fn create_moment(
        &self,
        moment: &MomentRecord,
        media: &[MomentMedia],
    ) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(MOMENTS)?;
            write_row(&mut table, moment)?;
        }
        write_media(&write_txn, &moment.id, media)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Owner-scoped update; `media`, when given, replaces every attachment.
    pub fn update_moment<F>(
        &self,
        id: &str,
        owner_id: &str,
        change: F,
        media: Option<&[MomentMedia]>,
    ) -> Result<MomentRecord, DatabaseError>
    where
        F: FnOnce(&mut MomentRecord),
    {
        let write_txn = self.begin_write()?;
        let moment = {
            let mut table = write_txn.open_table(MOMENTS)?;
            let mut moment: MomentRecord = match read_row(&table, id)? {
                Some(m) if m.owner_id == owner_id => m,
                _ => return Err(DatabaseError::NotFound),
            };
            change(&mut moment);
            moment.updated_at = chrono::Utc::now();
            write_row(&mut table, &moment)?;
            moment
        };
        if let Some(media) = media {
            write_media(&write_txn, id, media)?;
        }
        write_txn.commit()?;
        Ok(moment)
    }

    /// Attachments of a moment ordered by `sort`.
    pub fn moment_media(&self, moment_id: &str) -> Result<Vec<MomentMedia>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(MOMENT_MEDIA)?;
        let mut media: Vec<MomentMedia> = match table.get(moment_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };
        media.sort_by_key(|m| m.sort);
        Ok(media)
    }
}
