//! Node flag set and the combined metadata record providers return.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        const WRITABLE = 1 << 0;
        const DIRECTORY = 1 << 1;
        const SYMLINK = 1 << 2;
        const HIDDEN = 1 << 3;
        const SPECIAL = 1 << 4;
    }
}

/// Metadata answered by one provider call.
///
/// `last_modified` is in milliseconds; providers decide the epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileAttributes {
    pub flags: NodeFlags,
    pub length: u64,
    pub last_modified: u64,
}

impl FileAttributes {
    pub fn file(length: u64, last_modified: u64) -> Self {
        Self {
            flags: NodeFlags::WRITABLE,
            length,
            last_modified,
        }
    }

    pub fn directory(last_modified: u64) -> Self {
        Self {
            flags: NodeFlags::DIRECTORY | NodeFlags::WRITABLE,
            length: 0,
            last_modified,
        }
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.remove(NodeFlags::WRITABLE);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    pub fn is_symlink(&self) -> bool {
        self.flags.contains(NodeFlags::SYMLINK)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(NodeFlags::WRITABLE)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(NodeFlags::HIDDEN)
    }

    pub fn is_special(&self) -> bool {
        self.flags.contains(NodeFlags::SPECIAL)
    }

    /// True when the content (not only the flags) differs.
    pub fn content_differs(&self, other: &FileAttributes) -> bool {
        self.length != other.length || self.last_modified != other.last_modified
    }
}
