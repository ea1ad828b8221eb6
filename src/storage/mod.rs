//! Persistence of repository embedding indexes in blob storage.

pub mod blob;
pub mod codec;
pub mod error;
mod index_store;

pub use blob::{BlobReader, BlobStore, BlobStoreError, LocalBlobStore, MemoryBlobStore};
pub use codec::{CodecError, DEFAULT_CHUNK_ROWS};
pub use error::{StorageError, StorageResult};
pub use index_store::{DEFAULT_UPLOAD_BUFFER_BYTES, IndexStore, UploadOptions};
