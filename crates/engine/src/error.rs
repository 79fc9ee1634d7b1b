use std::path::PathBuf;

use stockroom_core::CoreError;
use stockroom_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unrecognized file type .{extension} (expected one of: {expected})")]
    Format { extension: String, expected: String },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("no data found in {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error("role '{role}' may not upload to the cloud folder")]
    Permission { role: String },

    #[error("{} is being edited by {owner}", .path.display())]
    LockConflict { path: PathBuf, owner: String },

    #[error("failed to load {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(&'static str),
}

/// Why a document was refused as a merge source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// The quantity column reads "Stock": a canonical document, not a delta.
    #[error("this is a stock file; only purchase files can be merged")]
    StockDocument,

    /// The quantity column reads something other than "Purchase".
    #[error("column 3 header must be 'Purchase' (found '{0}')")]
    UnexpectedHeader(String),
}
