pub mod file;
pub mod links;
pub mod memory;
pub mod trait_def;

pub use file::FileStorage;
pub use links::{load_links, save_links, try_load_links, LINKS_KEY};
pub use memory::MemoryStorage;
pub use trait_def::Persistence;

pub use crate::error::{StorageError, StorageResult};
