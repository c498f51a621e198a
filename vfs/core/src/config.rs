//! Runtime configuration of a [`crate::Vfs`].

use crate::navigator::SymlinkPolicy;

/// Where asynchronous refresh sessions run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshExecutor {
    /// A dedicated worker thread drains a channel of sessions.
    #[default]
    Background,
    /// Sessions are queued until [`crate::RefreshQueue::run_pending`] is called.
    Deferred,
}

#[derive(Clone, Debug)]
pub struct VfsConfig {
    pub refresh_executor: RefreshExecutor,
    pub refresh_thread_name: String,
    /// Marker separating an archive's host path from the entry path.
    pub archive_separator: String,
    pub max_attribute_id_len: usize,
    /// Policy used by `find_file_by_path` and friends.
    pub navigation_policy: SymlinkPolicy,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            refresh_executor: RefreshExecutor::Background,
            refresh_thread_name: "vfs-refresh".to_string(),
            archive_separator: "!/".to_string(),
            max_attribute_id_len: 255,
            navigation_policy: SymlinkPolicy::Lexical,
        }
    }
}
