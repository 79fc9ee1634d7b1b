pub mod atomic;
pub mod error;
pub mod fs;
pub mod grid;
pub mod loader;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use fs::{FileSystem, OsFileSystem};
pub use grid::{GridFile, GridFileIo};
pub use sqlite::SqliteSettings;
pub use traits::*;
