use crate::error::StorageResult;

/// Durable key-value storage for serialized blobs.
///
/// Every write replaces the whole value stored under `key`; there are no
/// partial updates.
pub trait Persistence: Send + Sync {
    /// Read the blob stored under `key`, or `None` if nothing was written yet
    fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Overwrite the blob stored under `key`
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;
}
