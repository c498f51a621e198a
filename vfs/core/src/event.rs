//! Change events flowing from providers and refresh sessions into the
//! managing registry.

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VfsEvent {
    Create {
        protocol: String,
        path: String,
        directory: bool,
    },
    ContentChange {
        protocol: String,
        path: String,
    },
    Delete {
        protocol: String,
        path: String,
    },
    Move {
        protocol: String,
        path: String,
        new_parent: String,
    },
    Rename {
        protocol: String,
        path: String,
        new_name: String,
    },
    /// Flags changed without a content change.
    PropertyChange {
        protocol: String,
        path: String,
    },
}

impl VfsEvent {
    pub fn create(protocol: &str, path: impl Into<String>, directory: bool) -> Self {
        Self::Create {
            protocol: protocol.to_string(),
            path: path.into(),
            directory,
        }
    }

    pub fn content_change(protocol: &str, path: impl Into<String>) -> Self {
        Self::ContentChange {
            protocol: protocol.to_string(),
            path: path.into(),
        }
    }

    pub fn delete(protocol: &str, path: impl Into<String>) -> Self {
        Self::Delete {
            protocol: protocol.to_string(),
            path: path.into(),
        }
    }

    pub fn move_to(protocol: &str, path: impl Into<String>, new_parent: impl Into<String>) -> Self {
        Self::Move {
            protocol: protocol.to_string(),
            path: path.into(),
            new_parent: new_parent.into(),
        }
    }

    pub fn rename(protocol: &str, path: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::Rename {
            protocol: protocol.to_string(),
            path: path.into(),
            new_name: new_name.into(),
        }
    }

    pub fn property_change(protocol: &str, path: impl Into<String>) -> Self {
        Self::PropertyChange {
            protocol: protocol.to_string(),
            path: path.into(),
        }
    }

    pub fn protocol(&self) -> &str {
        match self {
            Self::Create { protocol, .. }
            | Self::ContentChange { protocol, .. }
            | Self::Delete { protocol, .. }
            | Self::Move { protocol, .. }
            | Self::Rename { protocol, .. }
            | Self::PropertyChange { protocol, .. } => protocol,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. }
            | Self::ContentChange { path, .. }
            | Self::Delete { path, .. }
            | Self::Move { path, .. }
            | Self::Rename { path, .. }
            | Self::PropertyChange { path, .. } => path,
        }
    }

    /// Events that take the node away from its current path.
    pub fn removes_path(&self) -> bool {
        matches!(self, Self::Delete { .. } | Self::Move { .. } | Self::Rename { .. })
    }
}
