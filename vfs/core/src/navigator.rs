//! Segment-by-segment path resolution, independent of the backing store.
//!
//! Two `..` policies are supported:
//! - [`SymlinkPolicy::Lexical`]: `..` is the structural parent, symlinks are
//!   never resolved.
//! - [`SymlinkPolicy::PosixLight`]: `..` on a symlink node goes to the parent
//!   of the symlink's canonical target. Ordinary child steps are not
//!   resolved, so `a/../a/b` and `a/b` may reach different nodes when `a` is
//!   a symlink.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::VfsResult;
use crate::cancel::access_disk_with_check_canceled;
use crate::node::{FileNode, TransientNode};
use crate::provider::FileSystemProvider;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    #[default]
    Lexical,
    PosixLight,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    Resolved(FileNode),
    /// A step failed; carries the last node reached.
    Unresolved(FileNode),
    /// The path has no usable root.
    Empty,
}

impl Navigation {
    pub fn resolved(self) -> Option<FileNode> {
        match self {
            Self::Resolved(node) => Some(node),
            _ => None,
        }
    }
}

/// Where the walk starts for a given root path.
pub trait RootSource {
    fn find_root(&self, provider: &Arc<dyn FileSystemProvider>, root_path: &str)
    -> Option<FileNode>;
}

/// Roots that are transient nodes, so the whole walk mints nothing cached.
pub struct TransientRoots;

impl RootSource for TransientRoots {
    fn find_root(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        root_path: &str,
    ) -> Option<FileNode> {
        let root = TransientNode::root(provider.clone(), root_path);
        match root.exists() {
            Ok(true) => Some(FileNode::Transient(root)),
            Ok(false) => None,
            Err(err) => {
                tracing::debug!(root = root_path, error = %err, "transient root lookup failed");
                None
            }
        }
    }
}

pub fn navigate(
    roots: &dyn RootSource,
    provider: &Arc<dyn FileSystemProvider>,
    path: &str,
    policy: SymlinkPolicy,
) -> VfsResult<Navigation> {
    let Some(normalized) = provider.normalize(path) else {
        return Ok(Navigation::Empty);
    };
    let root_path = provider.extract_root_path(&normalized);
    if root_path.is_empty() {
        return Ok(Navigation::Empty);
    }
    let Some(mut current) = roots.find_root(provider, &root_path) else {
        return Ok(Navigation::Empty);
    };

    let rest = normalized.get(root_path.len()..).unwrap_or("");
    let segments: SmallVec<[&str; 16]> = rest.split('/').collect();
    for segment in segments {
        let next = match segment {
            "" | "." => continue,
            ".." => parent_step(roots, provider, &current, policy)?,
            name => current.find_child(name)?,
        };
        match next {
            Some(node) => current = node,
            None => return Ok(Navigation::Unresolved(current)),
        }
    }
    Ok(Navigation::Resolved(current))
}

fn parent_step(
    roots: &dyn RootSource,
    provider: &Arc<dyn FileSystemProvider>,
    current: &FileNode,
    policy: SymlinkPolicy,
) -> VfsResult<Option<FileNode>> {
    if policy == SymlinkPolicy::PosixLight && current.is_symlink() {
        let target = access_disk_with_check_canceled("navigator.resolve_symlink", || {
            provider.resolve_symlink(current.path())
        })?;
        let Some(target) = target else {
            return Ok(None);
        };
        return Ok(navigate(roots, provider, &target, SymlinkPolicy::Lexical)?
            .resolved()
            .and_then(|node| node.parent()));
    }
    Ok(current.parent())
}
