// Test utilities shared across the workspace. Tests operate on plain image
// files, never on real block devices.
use std::io;

use tempfile::NamedTempFile;

/// Create an empty image file of the given size backed by a temp file.
/// The file is removed when the handle is dropped.
pub fn create_image_file(size: u64) -> io::Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    file.as_file().set_len(size)?;
    Ok(file)
}
