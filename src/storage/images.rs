use chrono::Utc;
use redb::ReadableTable;

use super::access::Viewer;
use super::db::{Database, DatabaseError};
use super::entity::{read_row, write_row};
use super::models::{
    DerivativeOutput, DerivativeStatus, DerivativeTask, FileRecord, FileType, ImageRecord,
    VideoRecord,
};
use super::tables::*;

impl Database {
    // ========================================================================
    // Images and the derivative queue
    // ========================================================================

    /// Insert a new image and enqueue its derivative task atomically, so a
    /// committed image always has either a task or a final status.
    pub fn create_image(&self, image: &ImageRecord) -> Result<DerivativeTask, DatabaseError> {
        let task = DerivativeTask {
            image_id: image.id.clone(),
            attempts: 0,
            enqueued_at: Utc::now(),
            last_error: None,
        };

        let write_txn = self.begin_write()?;
        {
            let mut images = write_txn.open_table(IMAGES)?;
            write_row(&mut images, image)?;

            let mut tasks = write_txn.open_table(DERIVATIVE_TASKS)?;
            let data = rmp_serde::to_vec_named(&task)?;
            tasks.insert(task.image_id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(task)
    }

    /// Queued tasks, oldest first.
    pub fn pending_tasks(&self) -> Result<Vec<DerivativeTask>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DERIVATIVE_TASKS)?;

        let mut tasks = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let task: DerivativeTask = rmp_serde::from_slice(value.value())?;
            tasks.push(task);
        }
        tasks.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(tasks)
    }

    /// Attach finished derivatives, mark the image ready and dequeue its task.
    /// Fails with `NotFound` when the image was deleted while the task ran.
    pub fn complete_derivatives(
        &self,
        image_id: &str,
        output: DerivativeOutput,
    ) -> Result<ImageRecord, DatabaseError> {
        let write_txn = self.begin_write()?;
        let image = {
            let mut images = write_txn.open_table(IMAGES)?;
            let mut image: ImageRecord =
                read_row(&images, image_id)?.ok_or(DatabaseError::NotFound)?;

            image.compressed_file_id = Some(output.compressed_file_id);
            image.thumbnail_768x_file_id = Some(output.thumbnail_768x_file_id);
            image.exif = output.exif;
            image.address = output.address;
            image.derivative_status = DerivativeStatus::Ready;
            image.updated_at = Utc::now();
            write_row(&mut images, &image)?;

            let mut tasks = write_txn.open_table(DERIVATIVE_TASKS)?;
            tasks.remove(image_id)?;
            image
        };
        write_txn.commit()?;
        Ok(image)
    }

    /// Record a failed attempt. Once `max_attempts` is reached the task is
    /// dropped and the image marked failed; otherwise it stays queued.
    pub fn fail_derivative_attempt(
        &self,
        image_id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<DerivativeStatus, DatabaseError> {
        let write_txn = self.begin_write()?;
        let status = {
            let mut tasks = write_txn.open_table(DERIVATIVE_TASKS)?;
            let task: Option<DerivativeTask> = match tasks.get(image_id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            let Some(mut task) = task else {
                return Err(DatabaseError::NotFound);
            };

            task.attempts += 1;
            task.last_error = Some(error.to_string());

            if task.attempts >= max_attempts {
                tasks.remove(image_id)?;
                let mut images = write_txn.open_table(IMAGES)?;
                let image: Option<ImageRecord> = read_row(&images, image_id)?;
                if let Some(mut image) = image {
                    image.derivative_status = DerivativeStatus::Failed;
                    image.updated_at = Utc::now();
                    write_row(&mut images, &image)?;
                }
                DerivativeStatus::Failed
            } else {
                let data = rmp_serde::to_vec_named(&task)?;
                tasks.insert(image_id, data.as_slice())?;
                DerivativeStatus::Pending
            }
        };
        write_txn.commit()?;
        Ok(status)
    }

    /// Whether `viewer` may read `file`. Rows that belong to an image or
    /// video follow that media's visibility; generic uploads use their own.
    pub fn file_visible(&self, file: &FileRecord, viewer: &Viewer) -> Result<bool, DatabaseError> {
        let Some(media_id) = file.media_id.as_deref() else {
            return Ok(viewer.can_read(&file.owner_id, file.is_public));
        };
        let owner = match file.file_type {
            FileType::Video => self
                .fetch::<VideoRecord>(media_id)?
                .map(|v| (v.owner_id, v.is_public)),
            _ => self
                .fetch::<ImageRecord>(media_id)?
                .map(|i| (i.owner_id, i.is_public)),
        };
        Ok(owner.is_some_and(|(owner_id, is_public)| viewer.can_read(&owner_id, is_public)))
    }
}
