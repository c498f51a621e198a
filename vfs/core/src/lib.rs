//! Caching virtual filesystem.
//!
//! Backing stores plug in as [`FileSystemProvider`]s. The [`Vfs`] registry
//! caches their hierarchy as [`FileNode`]s with stable [`NodeId`]s, keeps
//! per-node attributes in [`PersistentRecords`] and resynchronizes the cache
//! through refresh sessions and [`VfsEvent`] batches. Archive files are
//! exposed as nested filesystems by [`ArchiveFileSystem`].

pub mod archive;
pub mod attributes;
pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod flags;
pub mod ids;
pub mod navigator;
pub mod node;
pub mod path;
pub mod provider;
pub mod provider_registry;
pub mod records;
pub mod refresh;
mod table;
mod vfs;

pub use archive::{
    ArchiveFileSystem, ArchiveFormat, ArchiveHandler, ArchiveHandlerRegistry, ArchiveProvider,
    ArchiveSource, InvalidatedArchive,
};
pub use attributes::{
    AttributeInput, AttributeOutput, AttributeRegistry, AttributeStore, FileAttribute,
    StringEnumerator,
};
pub use cancel::{CancellationToken, access_disk_with_check_canceled, check_canceled};
pub use config::{RefreshExecutor, VfsConfig};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use event::VfsEvent;
pub use flags::{FileAttributes, NodeFlags};
pub use ids::{NodeId, SessionId};
pub use navigator::{Navigation, RootSource, SymlinkPolicy, TransientRoots, navigate};
pub use node::{
    CacheAvoidingNode, CachedNode, Children, FileNode, NodeWriter, TransientNode, UserDataKey,
    next_modification_stamp, unstable_user_data_accesses,
};
pub use provider::FileSystemProvider;
pub use provider_registry::ProviderRegistry;
pub use records::PersistentRecords;
pub use refresh::{FinishCallback, RefreshQueue, RefreshSession};
pub use vfs::{Vfs, VfsBuilder};
