use bytes::Bytes;
use resource_hub::hash::ContentHash;
use resource_hub::object_store::{LocalStore, ObjectStore, ObjectStoreError};

#[tokio::test]
async fn test_local_store_put_get_nested_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("hello world");
    let key = ContentHash::compute(&data).object_path("files");
    store.put(&key, data.clone(), "text/plain").await.unwrap();

    let retrieved = store.get(&key).await.unwrap();
    assert_eq!(retrieved, data);
    assert!(dir.path().join(&key).is_file());
}

#[tokio::test]
async fn test_local_store_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("images/missing").await.unwrap());

    store
        .put("images/present", Bytes::from("data"), "image/jpeg")
        .await
        .unwrap();
    assert!(store.exists("images/present").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store
        .put("files/to-delete", Bytes::from("data"), "text/plain")
        .await
        .unwrap();
    assert!(store.exists("files/to-delete").await.unwrap());

    store.delete("files/to-delete").await.unwrap();
    assert!(!store.exists("files/to-delete").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete_nonexistent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    // Deleting a nonexistent key should not error
    store.delete("files/nonexistent").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.get("videos/missing").await;
    assert!(matches!(result.unwrap_err(), ObjectStoreError::NotFound(_)));
}

#[tokio::test]
async fn test_local_store_same_key_same_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("content addressed");
    let key = ContentHash::compute(&data).object_path("files");
    store.put(&key, data.clone(), "text/plain").await.unwrap();
    store.put(&key, data.clone(), "text/plain").await.unwrap();

    assert_eq!(store.get(&key).await.unwrap(), data);
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path().join("root")).unwrap();

    for key in ["", "/etc/passwd", "files/../../outside", "files//x", "files\\x", "./x"] {
        let result = store.put(key, Bytes::from("x"), "text/plain").await;
        assert!(
            matches!(result, Err(ObjectStoreError::InvalidKey(_))),
            "key {key:?} should be rejected"
        );
    }
    assert!(!dir.path().join("outside").exists());
}
