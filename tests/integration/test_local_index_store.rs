//! Index store on top of the filesystem blob store.

use repo_embeddings::storage::{BlobStoreError, UploadOptions};
use repo_embeddings::{
    CommitId, EmbeddingIndex, IndexStore, LocalBlobStore, RepoEmbeddingIndex,
    RepoEmbeddingIndexName, RepoName, RowMetadata, StorageError,
};
use tempfile::TempDir;

fn sample_index(rows: usize, dim: usize) -> RepoEmbeddingIndex {
    let floats: Vec<f32> = (0..rows * dim).map(|i| (i as f32 * 0.37).sin()).collect();
    let metadata = (0..rows)
        .map(|i| {
            RowMetadata::new(
                format!("internal/pkg/file_{}.go", i / 3),
                i as u32 * 10,
                i as u32 * 10 + 9,
            )
        })
        .collect();
    let ranks = (0..rows).map(|i| 1.0 / (i as f32 + 1.0)).collect();
    RepoEmbeddingIndex {
        repo_name: RepoName::new("github.com/sourcegraph/sourcegraph"),
        revision: CommitId::new("4f1e2d3c"),
        code_index: EmbeddingIndex::from_float(&floats, dim, metadata, ranks).unwrap(),
        text_index: EmbeddingIndex::from_float(
            &floats[..dim],
            dim,
            vec![RowMetadata::new("README.md", 0, 40)],
            vec![],
        )
        .unwrap(),
    }
}

#[tokio::test]
async fn test_save_and_load_by_revision() {
    let temp_dir = TempDir::new().unwrap();
    let store = IndexStore::with_options(
        LocalBlobStore::new(temp_dir.path()),
        UploadOptions {
            chunk_rows: 7,
            buffer_bytes: 64,
        },
    );
    let index = sample_index(100, 24);

    let (name, size) = store.save(&index).await.unwrap();
    assert_eq!(
        name.as_str(),
        "github.com_sourcegraph_sourcegraph@4f1e2d3c.embeddingindex"
    );
    let on_disk = std::fs::metadata(temp_dir.path().join(name.as_str())).unwrap();
    assert_eq!(on_disk.len(), size);

    let loaded = store.load(&index.repo_name, &index.revision).await.unwrap();
    assert_eq!(loaded, index);
}

#[tokio::test]
async fn test_two_row_index_survives_single_row_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let store = IndexStore::with_options(
        LocalBlobStore::new(temp_dir.path()),
        UploadOptions {
            chunk_rows: 1,
            ..UploadOptions::default()
        },
    );
    let index = RepoEmbeddingIndex {
        repo_name: RepoName::new("github.com/a/b"),
        revision: CommitId::new("1"),
        code_index: EmbeddingIndex::from_float(
            &[0.1, -1.0, 0.5, 0.99, 0.0, -0.2],
            3,
            vec![RowMetadata::new("a.go", 1, 2), RowMetadata::new("b.go", 3, 4)],
            vec![],
        )
        .unwrap(),
        text_index: EmbeddingIndex::default(),
    };

    store.upload_repo_index("example", &index).await.unwrap();
    let loaded = store.download_repo_index("example").await.unwrap();
    assert_eq!(loaded.code_index.embeddings, vec![13, -127, 64, 126, 0, -25]);
    assert_eq!(loaded, index);
}

#[tokio::test]
async fn test_new_revision_is_an_independent_blob() {
    let temp_dir = TempDir::new().unwrap();
    let store = IndexStore::new(LocalBlobStore::new(temp_dir.path()));
    let first = sample_index(10, 8);
    let mut second = sample_index(20, 8);
    second.revision = CommitId::new("5a6b7c8d");

    store.save(&first).await.unwrap();
    store.save(&second).await.unwrap();

    assert_eq!(
        store.load(&first.repo_name, &first.revision).await.unwrap(),
        first
    );
    assert_eq!(
        store.load(&second.repo_name, &second.revision).await.unwrap(),
        second
    );
}

#[tokio::test]
async fn test_unknown_revision_is_a_read_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = IndexStore::new(LocalBlobStore::new(temp_dir.path()));

    let err = store
        .load(&RepoName::new("github.com/a/b"), &CommitId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Read {
            source: BlobStoreError::NotFound { .. },
            ..
        }
    ));
    assert!(!err.is_corruption());
}

#[tokio::test]
async fn test_damaged_blob_is_reported_as_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let store = IndexStore::new(LocalBlobStore::new(temp_dir.path()));
    let index = sample_index(30, 16);
    let (name, _) = store.save(&index).await.unwrap();

    let path = temp_dir.path().join(name.as_str());
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 50]).unwrap();

    let err = store.download_repo_index(name.as_str()).await.unwrap_err();
    assert!(err.is_corruption(), "{err}");
    assert_eq!(err.key(), name.as_str());

    // The damaged blob is left in place.
    assert_eq!(std::fs::read(&path).unwrap().len(), bytes.len() - 50);
    assert_eq!(
        RepoEmbeddingIndexName::new(&index.repo_name, &index.revision),
        name
    );
}
