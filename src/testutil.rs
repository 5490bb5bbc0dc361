//! Shared test helpers for resource-hub unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::auth::{self, Claims};
use crate::config::{AuthConfig, Config, MediaConfig, NodeConfig, ServicesConfig, StorageConfig};
use crate::object_store::{LocalStore, ObjectStore, ObjectStoreError};
use crate::storage::Database;
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes";

fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: temp_dir.path().join("data").to_string_lossy().to_string(),
        },
        storage: StorageConfig::default(),
        auth: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            ..AuthConfig::default()
        },
        media: MediaConfig {
            derivative_max_attempts: 2,
            ..MediaConfig::default()
        },
        services: ServicesConfig::default(),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    }
}

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let store = LocalStore::new(temp_dir.path().join("files"))
        .expect("Failed to create test object store");
    test_state_with_store(temp_dir, Arc::new(store))
}

pub fn test_state_with_store(
    temp_dir: &tempfile::TempDir,
    object_store: Arc<dyn ObjectStore>,
) -> Arc<AppState> {
    let config = test_config(temp_dir);
    let db = Database::open(&config.node.data_dir).expect("Failed to open test database");
    Arc::new(AppState::new(config, db, object_store, reqwest::Client::new()))
}

/// Signed session token for `user_id`.
pub fn token(user_id: &str, group: Option<&str>) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        name: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        avatar: None,
        group: group.map(str::to_string),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    auth::sign(TEST_SECRET, &claims).expect("Failed to sign test token")
}

/// A small PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([30, 120, 200]),
    ));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    buf.into_inner()
}

/// Local store whose writes can be made to fail.
pub struct FlakyStore {
    inner: LocalStore,
    fail_puts: AtomicBool,
}

impl FlakyStore {
    pub fn new(temp_dir: &tempfile::TempDir) -> Self {
        Self {
            inner: LocalStore::new(temp_dir.path().join("files"))
                .expect("Failed to create test object store"),
            fail_puts: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_puts.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("simulated outage".to_string()));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        self.inner.exists(key).await
    }
}
