use vfs_core::{FileAttributes, FileSystemProvider, VfsError, VfsResult};

use crate::MemFs;

impl MemFs {
    fn ensure_writable(&self, context: &'static str) -> VfsResult<()> {
        if self.config.read_only {
            return Err(VfsError::not_supported(context));
        }
        Ok(())
    }
}

impl FileSystemProvider for MemFs {
    fn protocol(&self) -> &'static str {
        self.config.protocol
    }

    fn is_case_sensitive(&self) -> bool {
        self.config.case_sensitive
    }

    fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    fn rank(&self) -> i32 {
        self.config.rank
    }

    fn list(&self, path: &str) -> VfsResult<Vec<String>> {
        self.stats.count_list();
        Ok(self.read_dir(path))
    }

    fn attributes(&self, path: &str) -> VfsResult<Option<FileAttributes>> {
        self.stats.count_attributes();
        let attributes = self.stat(path);
        Ok(if self.config.read_only {
            attributes.map(FileAttributes::read_only)
        } else {
            attributes
        })
    }

    fn resolve_symlink(&self, path: &str) -> VfsResult<Option<String>> {
        Ok(self.read_link(path))
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.stats.count_read();
        self.read_file(path)
    }

    fn write(&self, path: &str, bytes: &[u8], timestamp: Option<u64>) -> VfsResult<()> {
        self.ensure_writable("mem.write")?;
        tracing::trace!(path, len = bytes.len(), "mem write");
        self.overwrite(path, bytes, timestamp)
    }

    fn create_child_file(&self, parent: &str, name: &str) -> VfsResult<()> {
        self.ensure_writable("mem.create_child_file")?;
        self.create_child(parent, name, false)
    }

    fn create_child_directory(&self, parent: &str, name: &str) -> VfsResult<()> {
        self.ensure_writable("mem.create_child_directory")?;
        self.create_child(parent, name, true)
    }

    fn delete(&self, path: &str) -> VfsResult<()> {
        self.ensure_writable("mem.delete")?;
        self.remove(path)
    }

    fn rename(&self, path: &str, new_name: &str) -> VfsResult<()> {
        self.ensure_writable("mem.rename")?;
        self.rename_entry(path, new_name)
    }

    fn move_to(&self, path: &str, new_parent: &str) -> VfsResult<()> {
        self.ensure_writable("mem.move")?;
        self.move_entry(path, new_parent)
    }

    fn copy(&self, path: &str, new_parent: &str, new_name: &str) -> VfsResult<()> {
        self.ensure_writable("mem.copy")?;
        self.copy_entry(path, new_parent, new_name)
    }

    fn set_writable(&self, path: &str, writable: bool) -> VfsResult<()> {
        self.ensure_writable("mem.set_writable")?;
        self.set_writable_flag(path, writable)
    }

    fn set_timestamp(&self, path: &str, timestamp: u64) -> VfsResult<()> {
        self.ensure_writable("mem.set_timestamp")?;
        self.touch(path, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemFsConfig;
    use vfs_core::VfsErrorKind;

    #[test]
    fn read_only_rejects_mutations_but_serves_reads() {
        let fs = MemFs::new(MemFsConfig {
            read_only: true,
            ..MemFsConfig::default()
        });
        fs.write_file("/seed.txt", b"seed").unwrap();

        let err = FileSystemProvider::write(&fs, "/seed.txt", b"x", None).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NotSupported);
        let err = fs.create_child_directory("/", "d").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NotSupported);

        let attrs = FileSystemProvider::attributes(&fs, "/seed.txt").unwrap().unwrap();
        assert!(!attrs.is_writable());
        assert_eq!(FileSystemProvider::read(&fs, "/seed.txt").unwrap(), b"seed".to_vec());
    }

    #[test]
    fn provider_calls_are_counted() {
        let fs = MemFs::default();
        fs.write_file("/f", b"x").unwrap();

        FileSystemProvider::attributes(&fs, "/f").unwrap();
        FileSystemProvider::list(&fs, "/").unwrap();
        FileSystemProvider::read(&fs, "/f").unwrap();
        assert_eq!(fs.stats().attributes(), 1);
        assert_eq!(fs.stats().list(), 1);
        assert_eq!(fs.stats().read(), 1);
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let fs = MemFs::default();
        fs.write_file("/f", b"old").unwrap();
        let before = FileSystemProvider::timestamp(&fs, "/f").unwrap();

        FileSystemProvider::write(&fs, "/f", b"new!", Some(before)).unwrap();
        let attrs = FileSystemProvider::attributes(&fs, "/f").unwrap().unwrap();
        assert_eq!(attrs.last_modified, before);
        assert_eq!(attrs.length, 4);
    }
}
