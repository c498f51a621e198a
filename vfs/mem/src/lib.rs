//! In-memory local store for `vfs-core`.
//!
//! [`MemFs`] implements [`vfs_core::FileSystemProvider`] over a slab-backed
//! tree of directories, files and symlinks. Its own helpers (`write_file`,
//! `symlink`, `remove`, ...) change the tree behind the registry's back, the
//! way an external process would change a disk.

mod config;
mod fs;
mod provider;

pub use config::MemFsConfig;
pub use fs::{MemFs, MemFsStats};
