use chrono::Utc;
use redb::{ReadableTable, Table, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::entity::{read_row, write_row};
use super::models::{FileRecord, FileState, ObjectRef};
use super::tables::*;

/// Outcome of reserving a file row for new content.
#[derive(Debug, Clone)]
pub enum Reservation {
    /// The object is already stored; the new row was inserted committed and
    /// no object write is needed.
    Existing(FileRecord),
    /// A fresh `reserved` row; the caller must write the object, then commit
    /// or abort.
    Reserved(FileRecord),
}

/// A reserved row removed by [`Database::abort_file`].
#[derive(Debug, Clone)]
pub struct Aborted {
    pub record: FileRecord,
    /// Another row, reserved or committed, still points at the same object
    pub object_in_use: bool,
}

fn read_ref<T>(table: &T, key: &str) -> Result<ObjectRef, DatabaseError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(data) => Ok(rmp_serde::from_slice(data.value())?),
        None => Ok(ObjectRef::default()),
    }
}

fn write_ref(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    object: ObjectRef,
) -> Result<(), DatabaseError> {
    if object.holders == 0 {
        table.remove(key)?;
    } else {
        let data = rmp_serde::to_vec_named(&object)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}

/// Decrement the holder count of `record`'s object; returns what is left.
fn drop_holder(write_txn: &WriteTransaction, record: &FileRecord) -> Result<u32, DatabaseError> {
    let mut refs = write_txn.open_table(OBJECT_REFS)?;
    let key = record.object_key();
    let mut object = read_ref(&refs, &key)?;
    object.holders = object.holders.saturating_sub(1);
    write_ref(&mut refs, &key, object)?;
    Ok(object.holders)
}

impl Database {
    // ========================================================================
    // Content-addressed file rows
    // ========================================================================

    /// Phase one of a two-phase upload. Inserts `record` for its uploader and
    /// counts it as a holder of the object. When the object is already stored
    /// the row is committed straight away.
    pub fn reserve_file(&self, mut record: FileRecord) -> Result<Reservation, DatabaseError> {
        debug_assert!(!record.path.is_empty(), "file path must not be empty");

        let write_txn = self.begin_write()?;
        let reservation = {
            let mut refs = write_txn.open_table(OBJECT_REFS)?;
            let key = record.object_key();
            let mut object = read_ref(&refs, &key)?;
            object.holders += 1;
            write_ref(&mut refs, &key, object)?;

            let mut files = write_txn.open_table(FILES)?;
            if object.stored {
                record.state = FileState::Committed;
                write_row(&mut files, &record)?;
                Reservation::Existing(record)
            } else {
                record.state = FileState::Reserved;
                write_row(&mut files, &record)?;
                Reservation::Reserved(record)
            }
        };
        write_txn.commit()?;
        Ok(reservation)
    }

    /// Phase two after a successful object write.
    pub fn commit_file(&self, id: &str) -> Result<FileRecord, DatabaseError> {
        let write_txn = self.begin_write()?;
        let committed = {
            let mut files = write_txn.open_table(FILES)?;
            let mut record: FileRecord = read_row(&files, id)?.ok_or(DatabaseError::NotFound)?;
            if record.state == FileState::Committed {
                return Ok(record);
            }
            record.state = FileState::Committed;
            record.updated_at = Utc::now();
            write_row(&mut files, &record)?;

            let mut refs = write_txn.open_table(OBJECT_REFS)?;
            let key = record.object_key();
            let mut object = read_ref(&refs, &key)?;
            object.stored = true;
            write_ref(&mut refs, &key, object)?;
            record
        };
        write_txn.commit()?;
        Ok(committed)
    }

    /// Roll back a reservation whose object write failed.
    pub fn abort_file(&self, id: &str) -> Result<Option<Aborted>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let aborted = {
            let mut files = write_txn.open_table(FILES)?;
            let record: Option<FileRecord> = read_row(&files, id)?;
            match record {
                Some(record) if record.state == FileState::Reserved => {
                    files.remove(id)?;
                    let object_in_use = drop_holder(&write_txn, &record)? > 0;
                    Some(Aborted {
                        record,
                        object_in_use,
                    })
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(aborted)
    }

    /// Remove a committed row. Returns it when it was the object's last
    /// holder; the caller then deletes the object.
    pub fn release_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let released = {
            let mut files = write_txn.open_table(FILES)?;
            let record: Option<FileRecord> = read_row(&files, id)?;
            match record {
                Some(record) if record.state == FileState::Committed => {
                    files.remove(id)?;
                    if drop_holder(&write_txn, &record)? == 0 {
                        Some(record)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(released)
    }

    /// Holder count and stored flag for an object key.
    pub fn object_ref(&self, bucket: &str, path: &str) -> Result<ObjectRef, DatabaseError> {
        let read_txn = self.begin_read()?;
        let refs = read_txn.open_table(OBJECT_REFS)?;
        read_ref(&refs, &format!("{bucket}/{path}"))
    }

    /// Rows stuck in `reserved`, left behind by a crash mid-upload.
    pub fn reserved_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let files = read_txn.open_table(FILES)?;

        let mut reserved = Vec::new();
        for result in files.iter()? {
            let (_, value) = result?;
            let record: FileRecord = rmp_serde::from_slice(value.value())?;
            if record.state == FileState::Reserved {
                reserved.push(record);
            }
        }
        Ok(reserved)
    }
}
