//! Upload pipeline: content-addressed object writes with two-phase metadata
//! rows, plus the image and video intake built on top of them.

pub mod imaging;
pub mod probe;
pub mod worker;

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::hash::ContentHash;
use crate::object_store::ObjectStoreError;
use crate::storage::models::{
    DerivativeStatus, FileRecord, FileState, FileType, ImageRecord, VideoRecord,
};
use crate::storage::{DatabaseError, Reservation};
use crate::AppState;

pub const FILE_PREFIX: &str = "files";
pub const IMAGE_PREFIX: &str = "images";
pub const VIDEO_PREFIX: &str = "videos";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Object storage error: {0}")]
    Storage(#[from] ObjectStoreError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unsupported upload: {0}")]
    Unsupported(String),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A received upload and the metadata submitted with it.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub data: Bytes,
    pub mime_type: String,
    pub owner_id: String,
    pub is_public: bool,
    pub category: String,
}

/// Who a stored object is recorded for.
#[derive(Debug, Clone, Copy)]
pub struct Holder<'a> {
    pub owner_id: &'a str,
    pub is_public: bool,
    /// Image or video the row belongs to
    pub media_id: Option<&'a str>,
}

/// Write `data` under `{prefix}/{sha256}` and record a file row for `holder`.
///
/// When identical content is already stored only the row is added. Otherwise
/// the row is reserved, the object written, and the row committed; a failed
/// write aborts the reservation.
pub async fn store_object(
    state: &AppState,
    data: Bytes,
    prefix: &str,
    mime_type: &str,
    holder: Holder<'_>,
) -> Result<FileRecord, UploadError> {
    let hash = ContentHash::compute(&data);
    let now = Utc::now();
    let record = FileRecord {
        id: uuid::Uuid::new_v4().to_string(),
        bucket: state.config.bucket_name().to_string(),
        path: hash.object_path(prefix),
        hash: hash.to_hex(),
        byte_size: data.len() as u64,
        mime_type: mime_type.to_string(),
        file_type: FileType::from_mime(mime_type),
        owner_id: holder.owner_id.to_string(),
        is_public: holder.is_public,
        state: FileState::Reserved,
        media_id: holder.media_id.map(str::to_string),
        created_at: now,
        updated_at: now,
    };

    let reserved = match state.db.reserve_file(record)? {
        Reservation::Existing(file) => {
            tracing::debug!(file_id = %file.id, path = %file.path, "Reused stored object");
            return Ok(file);
        }
        Reservation::Reserved(file) => file,
    };

    if let Err(e) = state
        .object_store
        .put(&reserved.path, data, &reserved.mime_type)
        .await
    {
        match state.db.abort_file(&reserved.id) {
            Ok(Some(aborted)) if !aborted.object_in_use => {
                if let Err(del) = state.object_store.delete(&aborted.record.path).await {
                    tracing::warn!(path = %aborted.record.path, error = %del, "Failed to remove partial object");
                }
            }
            Ok(_) => {}
            Err(db) => {
                tracing::error!(file_id = %reserved.id, error = %db, "Failed to abort file reservation");
            }
        }
        return Err(e.into());
    }

    let file = state.db.commit_file(&reserved.id)?;
    tracing::debug!(file_id = %file.id, path = %file.path, bytes = file.byte_size, "Stored object");
    Ok(file)
}

/// Remove a file row; the object goes once no row refers to it.
pub async fn release_object(state: &AppState, file_id: &str) -> Result<(), UploadError> {
    if let Some(file) = state.db.release_file(file_id)? {
        // a new upload of the same bytes may have claimed the key meanwhile
        if state.db.object_ref(&file.bucket, &file.path)?.holders > 0 {
            return Ok(());
        }
        if let Err(e) = state.object_store.delete(&file.path).await {
            tracing::warn!(file_id = %file_id, path = %file.path, error = %e, "Failed to delete object");
        }
    }
    Ok(())
}

/// Release every file in `file_ids`, logging instead of failing.
pub async fn release_quietly(state: &AppState, file_ids: &[String]) {
    for id in file_ids {
        if let Err(e) = release_object(state, id).await {
            tracing::warn!(file_id = %id, error = %e, "Failed to release file");
        }
    }
}

/// Abort reservations left behind by a crash between reserve and commit.
/// Must run before the server accepts uploads.
pub async fn recover_reserved(state: &AppState) -> Result<usize, UploadError> {
    let reserved = state.db.reserved_files()?;
    let mut recovered = 0;
    for file in reserved {
        if let Some(aborted) = state.db.abort_file(&file.id)? {
            if !aborted.object_in_use {
                if let Err(e) = state.object_store.delete(&aborted.record.path).await {
                    tracing::warn!(path = %aborted.record.path, error = %e, "Failed to remove orphaned object");
                }
            }
            recovered += 1;
        }
    }
    if recovered > 0 {
        tracing::warn!(count = recovered, "Aborted reserved files left by an interrupted upload");
    }
    Ok(recovered)
}

// ============================================================================
// Intake
// ============================================================================

/// Store a generic file owned by the uploader.
pub async fn upload_file(state: &AppState, upload: NewUpload) -> Result<FileRecord, UploadError> {
    let holder = Holder {
        owner_id: &upload.owner_id,
        is_public: upload.is_public,
        media_id: None,
    };
    store_object(state, upload.data, FILE_PREFIX, &upload.mime_type, holder).await
}

/// Store an image with its synchronous derivatives and queue the rest.
pub async fn upload_image(state: &AppState, upload: NewUpload) -> Result<ImageRecord, UploadError> {
    if FileType::from_mime(&upload.mime_type) != FileType::Image {
        return Err(UploadError::Unsupported(format!(
            "expected an image, got {}",
            upload.mime_type
        )));
    }

    let quality = state.config.media.image_quality;
    let data = upload.data.clone();
    let derivatives =
        tokio::task::spawn_blocking(move || imaging::sync_tier(&data, quality)).await??;

    let image_id = uuid::Uuid::new_v4().to_string();
    let holder = Holder {
        owner_id: &upload.owner_id,
        is_public: upload.is_public,
        media_id: Some(&image_id),
    };
    let original =
        store_object(state, upload.data, IMAGE_PREFIX, &upload.mime_type, holder).await?;

    let thumbnail = match store_object(
        state,
        Bytes::from(derivatives.thumbnail_320),
        IMAGE_PREFIX,
        "image/jpeg",
        holder,
    )
    .await
    {
        Ok(file) => file,
        Err(e) => {
            release_quietly(state, &[original.id]).await;
            return Err(e);
        }
    };

    let now = Utc::now();
    let image = ImageRecord {
        id: image_id,
        owner_id: upload.owner_id,
        is_public: upload.is_public,
        category: upload.category,
        original_file_id: original.id.clone(),
        thumbnail_320x_file_id: thumbnail.id.clone(),
        compressed_file_id: None,
        thumbnail_768x_file_id: None,
        thumbnail_10x: derivatives.placeholder,
        width: derivatives.width,
        height: derivatives.height,
        exif: None,
        address: None,
        derivative_status: DerivativeStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.db.create_image(&image) {
        release_quietly(state, &[original.id, thumbnail.id]).await;
        return Err(e.into());
    }
    state.derivatives.notify_one();

    tracing::info!(image_id = %image.id, width = image.width, height = image.height, "Uploaded image");
    Ok(image)
}

/// Store a video and record what ffprobe can tell about it.
pub async fn upload_video(state: &AppState, upload: NewUpload) -> Result<VideoRecord, UploadError> {
    if FileType::from_mime(&upload.mime_type) != FileType::Video {
        return Err(UploadError::Unsupported(format!(
            "expected a video, got {}",
            upload.mime_type
        )));
    }

    let media = &state.config.media;
    let probed = match probe::probe_video(
        &media.ffprobe_path,
        upload.data.clone(),
        Duration::from_secs(media.ffprobe_timeout_secs.max(1)),
    )
    .await
    {
        Ok(probed) => probed,
        Err(e) => {
            tracing::warn!(error = %e, "Video probe failed; storing without metadata");
            probe::VideoProbe::default()
        }
    };

    let video_id = uuid::Uuid::new_v4().to_string();
    let holder = Holder {
        owner_id: &upload.owner_id,
        is_public: upload.is_public,
        media_id: Some(&video_id),
    };
    let file =
        store_object(state, upload.data, VIDEO_PREFIX, &upload.mime_type, holder).await?;

    let now = Utc::now();
    let video = VideoRecord {
        id: video_id,
        owner_id: upload.owner_id,
        is_public: upload.is_public,
        category: upload.category,
        file_id: file.id.clone(),
        duration_secs: probed.duration_secs,
        fps: probed.fps,
        width: probed.width,
        height: probed.height,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.db.insert(&video) {
        release_quietly(state, &[file.id]).await;
        return Err(e.into());
    }

    tracing::info!(video_id = %video.id, duration = ?video.duration_secs, "Uploaded video");
    Ok(video)
}

// ============================================================================
// Removal
// ============================================================================

pub async fn delete_image(
    state: &AppState,
    id: &str,
    owner_id: &str,
) -> Result<ImageRecord, UploadError> {
    let image = state.db.delete_owned::<ImageRecord>(id, owner_id)?;
    release_quietly(state, &image.file_ids()).await;
    Ok(image)
}

pub async fn delete_video(
    state: &AppState,
    id: &str,
    owner_id: &str,
) -> Result<VideoRecord, UploadError> {
    let video = state.db.delete_owned::<VideoRecord>(id, owner_id)?;
    release_quietly(state, &[video.file_id.clone()]).await;
    Ok(video)
}

/// Remove a generic upload owned by the caller. Rows that belong to an
/// image or video only go away with their media.
pub async fn delete_file(state: &AppState, id: &str, owner_id: &str) -> Result<(), UploadError> {
    match state.db.fetch::<FileRecord>(id)? {
        Some(file)
            if file.owner_id == owner_id
                && file.state == FileState::Committed
                && file.media_id.is_none()
                && file.path.starts_with(&format!("{FILE_PREFIX}/")) =>
        {
            release_object(state, id).await
        }
        _ => Err(DatabaseError::NotFound.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::ListFilter;
    use crate::storage::Viewer;
    use crate::testutil::{png, test_state, test_state_with_store, FlakyStore};

    fn upload(data: Vec<u8>, mime: &str, owner: &str) -> NewUpload {
        NewUpload {
            data: Bytes::from(data),
            mime_type: mime.to_string(),
            owner_id: owner.to_string(),
            is_public: false,
            category: "travel".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stored_bytes_match_row_hash() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let file = upload_file(&state, upload(b"hello hub".to_vec(), "text/plain", "alice"))
            .await
            .unwrap();

        assert_eq!(file.state, FileState::Committed);
        assert_eq!(file.path, format!("files/{}", file.hash));
        let stored = state.object_store.get(&file.path).await.unwrap();
        assert_eq!(ContentHash::compute(&stored).to_hex(), file.hash);
    }

    #[tokio::test]
    async fn test_identical_uploads_share_one_object() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let first = upload_file(&state, upload(b"same".to_vec(), "text/plain", "alice"))
            .await
            .unwrap();
        let mut public = upload(b"same".to_vec(), "text/plain", "bob");
        public.is_public = true;
        let second = upload_file(&state, public).await.unwrap();

        // Each uploader holds a row of their own over one object
        assert_ne!(first.id, second.id);
        assert_eq!(first.path, second.path);
        assert_eq!((first.owner_id.as_str(), first.is_public), ("alice", false));
        assert_eq!((second.owner_id.as_str(), second.is_public), ("bob", true));
        assert_eq!(state.db.object_ref(&first.bucket, &first.path).unwrap().holders, 2);

        delete_file(&state, &first.id, "alice").await.unwrap();
        assert!(matches!(
            delete_file(&state, &first.id, "alice").await,
            Err(UploadError::Database(DatabaseError::NotFound))
        ));
        assert!(matches!(
            delete_file(&state, &second.id, "alice").await,
            Err(UploadError::Database(DatabaseError::NotFound))
        ));
        assert!(state.object_store.exists(&second.path).await.unwrap());

        delete_file(&state, &second.id, "bob").await.unwrap();
        assert!(!state.object_store.exists(&second.path).await.unwrap());
        assert!(state.db.scan::<FileRecord>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_files_are_not_deletable_as_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let image = upload_image(&state, upload(png(64, 48), "image/png", "alice"))
            .await
            .unwrap();
        let original: FileRecord = state.db.fetch(&image.original_file_id).unwrap().unwrap();
        assert_eq!(original.media_id.as_deref(), Some(image.id.as_str()));

        for id in image.file_ids() {
            assert!(matches!(
                delete_file(&state, &id, "alice").await,
                Err(UploadError::Database(DatabaseError::NotFound))
            ));
        }
        assert!(state.object_store.exists(&original.path).await.unwrap());

        let video = upload_video(
            &state,
            upload(b"\x00\x00\x00\x18ftypmp42".to_vec(), "video/mp4", "alice"),
        )
        .await
        .unwrap();
        assert!(matches!(
            delete_file(&state, &video.file_id, "alice").await,
            Err(UploadError::Database(DatabaseError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::new(&dir));
        let state = test_state_with_store(&dir, store.clone());

        store.set_failing(true);
        let err = upload_file(&state, upload(b"lost".to_vec(), "text/plain", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage(_)));
        assert!(state.db.scan::<FileRecord>().unwrap().is_empty());
        assert!(state.db.reserved_files().unwrap().is_empty());

        store.set_failing(false);
        let file = upload_file(&state, upload(b"lost".to_vec(), "text/plain", "alice"))
            .await
            .unwrap();
        let object = state.db.object_ref(&file.bucket, &file.path).unwrap();
        assert_eq!((object.holders, object.stored), (1, true));
    }

    #[tokio::test]
    async fn test_recovery_aborts_reserved_rows() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let hash = ContentHash::compute(b"half written");
        let now = Utc::now();
        let record = FileRecord {
            id: "orphan".to_string(),
            bucket: state.config.bucket_name().to_string(),
            path: hash.object_path(FILE_PREFIX),
            hash: hash.to_hex(),
            byte_size: 12,
            mime_type: "text/plain".to_string(),
            file_type: FileType::Document,
            owner_id: "alice".to_string(),
            is_public: false,
            state: FileState::Reserved,
            media_id: None,
            created_at: now,
            updated_at: now,
        };
        state.db.reserve_file(record).unwrap();
        state
            .object_store
            .put(&hash.object_path(FILE_PREFIX), Bytes::from_static(b"half"), "text/plain")
            .await
            .unwrap();

        assert_eq!(recover_reserved(&state).await.unwrap(), 1);
        assert!(state.db.fetch::<FileRecord>("orphan").unwrap().is_none());
        assert!(!state
            .object_store
            .exists(&hash.object_path(FILE_PREFIX))
            .await
            .unwrap());
        assert_eq!(recover_reserved(&state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_upload_then_worker_completes_derivatives() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let image = upload_image(&state, upload(png(1200, 800), "image/png", "alice"))
            .await
            .unwrap();
        assert_eq!((image.width, image.height), (1200, 800));
        assert_eq!(image.derivative_status, DerivativeStatus::Pending);
        assert!(image.compressed_file_id.is_none());
        assert!(image.thumbnail_768x_file_id.is_none());
        assert!(!image.thumbnail_10x.is_empty());

        let thumb: FileRecord = state.db.fetch(&image.thumbnail_320x_file_id).unwrap().unwrap();
        let thumb_bytes = state.object_store.get(&thumb.path).await.unwrap();
        assert_eq!(imaging::decode(&thumb_bytes).unwrap().width(), 320);

        assert_eq!(worker::run_pending(&state).await.unwrap(), 1);

        let done: ImageRecord = state.db.fetch(&image.id).unwrap().unwrap();
        assert_eq!(done.derivative_status, DerivativeStatus::Ready);
        let preview: FileRecord = state
            .db
            .fetch(done.thumbnail_768x_file_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        let preview_bytes = state.object_store.get(&preview.path).await.unwrap();
        assert_eq!(imaging::decode(&preview_bytes).unwrap().width(), 768);
        assert!(done.compressed_file_id.is_some());
        assert!(state.db.pending_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_original_eventually_fails() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let image = upload_image(&state, upload(png(64, 64), "image/png", "alice"))
            .await
            .unwrap();
        let original: FileRecord = state.db.fetch(&image.original_file_id).unwrap().unwrap();
        state.object_store.delete(&original.path).await.unwrap();

        // derivative_max_attempts is 2 in tests
        assert_eq!(worker::run_pending(&state).await.unwrap(), 0);
        let retry: ImageRecord = state.db.fetch(&image.id).unwrap().unwrap();
        assert_eq!(retry.derivative_status, DerivativeStatus::Pending);
        assert_eq!(state.db.pending_tasks().unwrap()[0].attempts, 1);

        assert_eq!(worker::run_pending(&state).await.unwrap(), 0);
        let failed: ImageRecord = state.db.fetch(&image.id).unwrap().unwrap();
        assert_eq!(failed.derivative_status, DerivativeStatus::Failed);
        assert!(failed.compressed_file_id.is_none());
        assert!(failed.thumbnail_768x_file_id.is_none());
        assert!(state.db.pending_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_image_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = upload_image(&state, upload(b"not a png".to_vec(), "image/png", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Image(_)));
        assert!(state.db.scan::<FileRecord>().unwrap().is_empty());
        assert!(state.db.pending_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_image_releases_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let image = upload_image(&state, upload(png(400, 300), "image/png", "alice"))
            .await
            .unwrap();
        worker::run_pending(&state).await.unwrap();

        assert!(matches!(
            delete_image(&state, &image.id, "mallory").await,
            Err(UploadError::Database(DatabaseError::NotFound))
        ));

        delete_image(&state, &image.id, "alice").await.unwrap();
        assert!(state.db.scan::<FileRecord>().unwrap().is_empty());
        let viewer = Viewer::user("alice", vec![]);
        assert!(state
            .db
            .list_visible::<ImageRecord>(&viewer, &ListFilter::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_video_without_ffprobe_keeps_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config_state = test_state(&dir);
        Arc::get_mut(&mut config_state).unwrap().config.media.ffprobe_path =
            "/nonexistent/ffprobe".to_string();

        let video = upload_video(
            &config_state,
            upload(b"\x00\x00\x00\x18ftypmp42".to_vec(), "video/mp4", "alice"),
        )
        .await
        .unwrap();
        assert!(video.duration_secs.is_none());
        assert!(video.width.is_none());
        let file: FileRecord = config_state.db.fetch(&video.file_id).unwrap().unwrap();
        assert!(file.path.starts_with("videos/"));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = upload_video(&state, upload(b"text".to_vec(), "text/plain", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Unsupported(_)));
    }
}
