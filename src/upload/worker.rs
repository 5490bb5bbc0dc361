//! Background worker that produces the asynchronous image tier.
//!
//! Tasks live in the `derivative_tasks` table, so work queued before a
//! restart is picked up again. The worker wakes on upload notifications and
//! on a fixed poll interval.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{imaging, release_quietly, store_object, Holder, UploadError, IMAGE_PREFIX};
use crate::geocode;
use crate::storage::models::{DerivativeOutput, DerivativeStatus, DerivativeTask, FileRecord, ImageRecord};
use crate::storage::DatabaseError;
use crate::AppState;

pub fn spawn(state: Arc<AppState>, shutdown: CancellationToken) -> JoinHandle<()> {
    let poll = Duration::from_secs(state.config.media.derivative_poll_interval_secs.max(1));
    tokio::spawn(async move {
        tracing::info!(poll_secs = poll.as_secs(), "Derivative worker started");
        loop {
            if let Err(e) = run_pending(&state).await {
                tracing::error!(error = %e, "Failed to read derivative queue");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = state.derivatives.notified() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
        tracing::info!("Derivative worker stopped");
    })
}

/// Work through every queued task once. Returns how many completed.
pub async fn run_pending(state: &AppState) -> Result<usize, DatabaseError> {
    let tasks = state.db.pending_tasks()?;
    let mut completed = 0;
    for task in tasks {
        if process(state, &task).await {
            completed += 1;
        }
    }
    Ok(completed)
}

async fn process(state: &AppState, task: &DerivativeTask) -> bool {
    let mut written = Vec::new();
    let outcome = match generate(state, &task.image_id, &mut written).await {
        Ok(output) => state
            .db
            .complete_derivatives(&task.image_id, output)
            .map_err(UploadError::from),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(image) => {
            tracing::info!(image_id = %image.id, "Image derivatives ready");
            true
        }
        Err(UploadError::Database(DatabaseError::NotFound)) => {
            // deleted while the task ran
            release_quietly(state, &written).await;
            tracing::debug!(image_id = %task.image_id, "Dropped derivatives of deleted image");
            false
        }
        Err(e) => {
            release_quietly(state, &written).await;
            let max_attempts = state.config.media.derivative_max_attempts;
            match state
                .db
                .fail_derivative_attempt(&task.image_id, &e.to_string(), max_attempts)
            {
                Ok(DerivativeStatus::Failed) => {
                    tracing::error!(image_id = %task.image_id, error = %e, "Image derivatives failed permanently");
                }
                Ok(_) => {
                    tracing::warn!(
                        image_id = %task.image_id,
                        attempt = task.attempts + 1,
                        max_attempts,
                        error = %e,
                        "Image derivative attempt failed"
                    );
                }
                Err(db) => {
                    tracing::error!(image_id = %task.image_id, error = %db, "Failed to record derivative failure");
                }
            }
            false
        }
    }
}

async fn generate(
    state: &AppState,
    image_id: &str,
    written: &mut Vec<String>,
) -> Result<DerivativeOutput, UploadError> {
    let image: ImageRecord = state
        .db
        .fetch(image_id)?
        .ok_or(DatabaseError::NotFound)?;
    let original: FileRecord = state
        .db
        .fetch(&image.original_file_id)?
        .ok_or_else(|| UploadError::Unsupported("original file is missing".to_string()))?;
    let data = state.object_store.get(&original.path).await?;

    let quality = state.config.media.image_quality;
    let (derivatives, exif) = tokio::task::spawn_blocking(move || {
        imaging::async_tier(&data, quality).map(|d| (d, imaging::read_exif(&data)))
    })
    .await??;

    let address = match exif.as_ref().and_then(|e| e.latitude.zip(e.longitude)) {
        Some((lat, lon)) => {
            geocode::reverse_geocode(
                &state.http,
                state.config.services.geocode_url.as_deref(),
                lat,
                lon,
            )
            .await
        }
        None => None,
    };

    let compressed = store_tracked(state, &image, derivatives.compressed, written).await?;
    let thumbnail_768 = store_tracked(state, &image, derivatives.thumbnail_768, written).await?;

    Ok(DerivativeOutput {
        compressed_file_id: compressed,
        thumbnail_768x_file_id: thumbnail_768,
        exif,
        address,
    })
}

async fn store_tracked(
    state: &AppState,
    image: &ImageRecord,
    data: Vec<u8>,
    written: &mut Vec<String>,
) -> Result<String, UploadError> {
    let holder = Holder {
        owner_id: &image.owner_id,
        is_public: image.is_public,
        media_id: Some(&image.id),
    };
    let file = store_object(state, Bytes::from(data), IMAGE_PREFIX, "image/jpeg", holder).await?;
    written.push(file.id.clone());
    Ok(file.id)
}
