#[derive(Clone, Debug)]
pub struct MemFsConfig {
    /// Protocol the provider registers under.
    pub protocol: &'static str,
    pub case_sensitive: bool,
    /// Reject every mutation issued through the provider interface.
    pub read_only: bool,
    pub rank: i32,
    /// Optional max bytes allowed for all file data in this FS instance.
    pub max_bytes: Option<u64>,
    /// Optional max inode count allowed in this FS instance.
    pub max_inodes: Option<u64>,
    /// If true, listings are sorted by name; otherwise in creation order.
    pub deterministic_readdir: bool,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            protocol: "file",
            case_sensitive: true,
            read_only: false,
            rank: 0,
            max_bytes: None,
            max_inodes: None,
            deterministic_readdir: true,
        }
    }
}
