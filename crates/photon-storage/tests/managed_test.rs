//! Managed storage integration tests against a recording upstream.
//!
//! Run with: `cargo test -p photon-storage --test managed_test`

mod helpers;

use bytes::Bytes;
use helpers::{recording_factory, Call, RecordingProvider};
use photon_storage::{
    GitHubConfig, ManagedStorageConfig, RemoteStorageConfig, S3CompatibleConfig, StorageConfig,
    StorageError, StorageObject, StorageProvider, UploadOptions,
};

fn managed_s3(tenant_id: &str, upstream_prefix: Option<&str>) -> StorageConfig {
    StorageConfig::Managed(ManagedStorageConfig {
        tenant_id: tenant_id.to_string(),
        provider_key: "shared-s3".to_string(),
        upstream: RemoteStorageConfig::S3(S3CompatibleConfig {
            prefix: upstream_prefix.map(String::from),
            ..S3CompatibleConfig::new("photos")
        }),
        base_prefix: None,
    })
}

fn managed_github(tenant_id: &str) -> StorageConfig {
    StorageConfig::Managed(ManagedStorageConfig {
        tenant_id: tenant_id.to_string(),
        provider_key: "shared-github".to_string(),
        upstream: RemoteStorageConfig::Github(GitHubConfig {
            owner: "octo".to_string(),
            repo: "gallery".to_string(),
            path: Some("photos".to_string()),
            ..Default::default()
        }),
        base_prefix: Some("tenants".to_string()),
    })
}

fn object(key: &str) -> StorageObject {
    StorageObject {
        key: key.to_string(),
        size: 1,
        last_modified: None,
        etag: None,
    }
}

#[tokio::test]
async fn test_upload_is_prefixed_with_tenant_namespace() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory
        .create_provider(&managed_s3("acme", Some("root")))
        .unwrap();

    let uploaded = provider
        .upload_file("a.jpg", Bytes::from_static(b"jpeg"), UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(uploaded.key, "a.jpg");
    assert_eq!(recorder.calls(), vec![Call::Upload("root/acme/a.jpg".to_string())]);
    assert_eq!(recorder.stored_keys().await, vec!["root/acme/a.jpg".to_string()]);

    match recorder.last_config() {
        Some(StorageConfig::S3(config)) => assert_eq!(config.prefix.as_deref(), Some("root/acme")),
        other => panic!("unexpected upstream config: {:?}", other),
    }
}

#[tokio::test]
async fn test_listing_hides_other_tenants_and_namespace_root() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_s3("acme", None)).unwrap();

    recorder.seed("acme").await;
    recorder.seed("acme/a.jpg").await;
    recorder.seed("acme/2024/b.heic").await;
    recorder.seed("acme/notes.txt").await;
    recorder.seed("acme2/leak.jpg").await;
    recorder.seed("beta/a.jpg").await;

    let all = provider.list_all_files(None).await.unwrap();
    let keys: Vec<_> = all.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["2024/b.heic", "a.jpg", "notes.txt"]);

    let images = provider.list_images().await.unwrap();
    let keys: Vec<_> = images.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["2024/b.heic", "a.jpg"]);
}

#[tokio::test]
async fn test_two_tenants_do_not_collide() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let acme = factory.create_provider(&managed_s3("acme", None)).unwrap();
    let beta = factory.create_provider(&managed_s3("beta", None)).unwrap();

    acme.upload_file("a.jpg", Bytes::from_static(b"acme"), UploadOptions::default())
        .await
        .unwrap();
    beta.upload_file("a.jpg", Bytes::from_static(b"beta"), UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(
        recorder.stored_keys().await,
        vec!["acme/a.jpg".to_string(), "beta/a.jpg".to_string()]
    );
    assert_eq!(
        acme.get_file("a.jpg").await.unwrap(),
        Some(Bytes::from_static(b"acme"))
    );
    assert_eq!(
        beta.get_file("a.jpg").await.unwrap(),
        Some(Bytes::from_static(b"beta"))
    );
}

#[tokio::test]
async fn test_delete_folder_root_targets_effective_prefix() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let acme = factory
        .create_provider(&managed_s3("acme", Some("root")))
        .unwrap();

    recorder.seed("root/acme/a.jpg").await;
    recorder.seed("root/beta/a.jpg").await;

    acme.delete_folder("").await.unwrap();
    acme.delete_folder("/").await.unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            Call::DeleteFolder("root/acme".to_string()),
            Call::DeleteFolder("root/acme".to_string()),
        ]
    );
    assert_eq!(recorder.stored_keys().await, vec!["root/beta/a.jpg".to_string()]);
}

#[tokio::test]
async fn test_delete_is_idempotent_through_managed() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_s3("acme", None)).unwrap();

    provider.delete_file("missing.jpg").await.unwrap();
    provider.delete_file("missing.jpg").await.unwrap();
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Delete("acme/missing.jpg".to_string()),
            Call::Delete("acme/missing.jpg".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_move_and_public_url_translate_keys() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_s3("acme", None)).unwrap();

    provider
        .upload_file("a.jpg", Bytes::from_static(b"x"), UploadOptions::default())
        .await
        .unwrap();
    let moved = provider
        .move_file("a.jpg", "album/a.jpg", UploadOptions::default())
        .await
        .unwrap();
    assert_eq!(moved.key, "album/a.jpg");

    let url = provider.generate_public_url("album/a.jpg").await.unwrap();
    assert_eq!(url, "https://cdn.test/acme/album/a.jpg");

    let err = provider
        .move_file("missing.jpg", "b.jpg", UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_live_photo_pairs_are_tenant_relative() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_s3("acme", None)).unwrap();

    let objects = vec![
        object("2024/IMG_0001.HEIC"),
        object("2024/IMG_0001.mov"),
        object("2024/IMG_0002.jpg"),
        object(""),
    ];
    let pairs = provider.detect_live_photos(&objects);

    assert_eq!(pairs.len(), 1);
    let video = &pairs["2024/IMG_0001.HEIC"];
    assert_eq!(video.key, "2024/IMG_0001.mov");
}

#[tokio::test]
async fn test_path_based_upstream_receives_relative_keys() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_github("acme")).unwrap();

    match recorder.last_config() {
        Some(StorageConfig::Github(config)) => {
            assert_eq!(config.path.as_deref(), Some("photos/tenants/acme"));
        }
        other => panic!("unexpected upstream config: {:?}", other),
    }

    provider
        .upload_file("a.jpg", Bytes::from_static(b"x"), UploadOptions::default())
        .await
        .unwrap();
    provider.delete_folder("").await.unwrap();
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Upload("a.jpg".to_string()),
            Call::DeleteFolder(String::new()),
        ]
    );
}

#[tokio::test]
async fn test_escaping_keys_never_reach_upstream() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let provider = factory.create_provider(&managed_s3("acme", None)).unwrap();

    for key in ["../beta/a.jpg", "a/../../beta/a.jpg", "./a.jpg"] {
        let err = provider.get_file(key).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)), "{}", key);
    }
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_tenant_fails_at_construction() {
    let recorder = RecordingProvider::new();
    let factory = recording_factory(recorder.clone());
    let err = factory
        .create_provider(&managed_s3("   ", None))
        .err()
        .unwrap();
    assert!(matches!(err, StorageError::InvalidTenant(_)));
    assert!(recorder.last_config().is_none());
}
