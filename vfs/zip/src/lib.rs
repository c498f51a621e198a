//! Zip container support for the `vfs-core` archive filesystem.
//!
//! Register a [`ZipFormat`] with [`vfs_core::Vfs::register_archive_format`]
//! and every zip file of the local store can be browsed as
//! `zip:///path/to/lib.zip!/entry`.

mod handler;

use std::io::{Cursor, Write};
use std::sync::Arc;

use vfs_core::{ArchiveFormat, ArchiveHandler, ArchiveSource, VfsError, VfsErrorKind, VfsResult};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub use handler::ZipHandler;

#[derive(Clone, Debug)]
pub struct ZipFormat {
    protocol: &'static str,
}

impl Default for ZipFormat {
    fn default() -> Self {
        Self { protocol: "zip" }
    }
}

impl ZipFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same codec under another protocol, e.g. `jar`.
    pub fn with_protocol(protocol: &'static str) -> Self {
        Self { protocol }
    }
}

impl ArchiveFormat for ZipFormat {
    fn protocol(&self) -> &'static str {
        self.protocol
    }

    fn open(&self, source: ArchiveSource) -> VfsResult<Arc<dyn ArchiveHandler>> {
        Ok(Arc::new(ZipHandler::new(source)?))
    }
}

/// Build a zip image with stored (uncompressed) entries. Names ending in
/// `/` become directory entries.
pub fn write_stored_archive<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> VfsResult<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(name, options)
                .map_err(zip_error("zip.write.directory"))?;
        } else {
            writer
                .start_file(name, options)
                .map_err(zip_error("zip.write.file"))?;
            writer.write_all(bytes)?;
        }
    }
    let cursor = writer.finish().map_err(zip_error("zip.write.finish"))?;
    Ok(cursor.into_inner())
}

pub(crate) fn zip_error(context: &'static str) -> impl FnOnce(ZipError) -> VfsError {
    move |err| match err {
        ZipError::Io(err) => VfsError::with_source(VfsErrorKind::Io, context, err),
        other => VfsError::with_source(VfsErrorKind::InvalidInput, context, other),
    }
}
