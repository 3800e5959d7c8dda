// Backing store for a mounted volume: a shared read/write mapping of the
// image file. Stores land in the page cache and reach the file on flush.

use std::fs::OpenOptions;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use fatmod_core::FatError;
use log::info;
use memmap2::MmapMut;

#[derive(Debug)]
pub struct FsImage {
    map: MmapMut,
    len: u64,
}

impl FsImage {
    /// Open `path` read/write and map it shared. Fails with `FatError::Mount`
    /// when the file is missing or not writable.
    pub fn map<P: AsRef<Path>>(path: P) -> Result<Self, FatError> {
        let path = path.as_ref();
        let mount_err = |source| FatError::Mount {
            path: path.display().to_string(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(mount_err)?;
        let len = file.metadata().map_err(mount_err)?.len();
        // Safety: the engine assumes exclusive access to the image for its
        // lifetime; concurrent mutation from another process is undefined.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(mount_err)?;

        info!("mapped '{}' ({} bytes)", path.display(), len);
        Ok(Self { map, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn range(&self, offset: u64, bytes: u64) -> Result<usize, FatError> {
        match offset.checked_add(bytes) {
            Some(end) if end <= self.len => Ok(offset as usize),
            _ => Err(FatError::OutOfBounds {
                offset,
                len: self.len,
            }),
        }
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8, FatError> {
        let at = self.range(offset, 1)?;
        Ok(self.map[at])
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16, FatError> {
        let at = self.range(offset, 2)?;
        Ok(LittleEndian::read_u16(&self.map[at..at + 2]))
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32, FatError> {
        let at = self.range(offset, 4)?;
        Ok(LittleEndian::read_u32(&self.map[at..at + 4]))
    }

    pub fn write_u8(&mut self, value: u8, offset: u64) -> Result<(), FatError> {
        let at = self.range(offset, 1)?;
        self.map[at] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16, offset: u64) -> Result<(), FatError> {
        let at = self.range(offset, 2)?;
        LittleEndian::write_u16(&mut self.map[at..at + 2], value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32, offset: u64) -> Result<(), FatError> {
        let at = self.range(offset, 4)?;
        LittleEndian::write_u32(&mut self.map[at..at + 4], value);
        Ok(())
    }

    pub fn read_bytes(&self, offset: u64, len: usize) -> Result<&[u8], FatError> {
        let at = self.range(offset, len as u64)?;
        Ok(&self.map[at..at + len])
    }

    pub fn write_bytes(&mut self, data: &[u8], offset: u64) -> Result<(), FatError> {
        let at = self.range(offset, data.len() as u64)?;
        self.map[at..at + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn fill(&mut self, value: u8, offset: u64, len: usize) -> Result<(), FatError> {
        let at = self.range(offset, len as u64)?;
        self.map[at..at + len].fill(value);
        Ok(())
    }

    /// Post all pending stores to the file.
    pub fn flush(&self) -> Result<(), FatError> {
        self.map.flush().map_err(FatError::Io)
    }
}

impl Drop for FsImage {
    fn drop(&mut self) {
        // Best effort; the mapping is released right after.
        let _ = self.map.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatmod_core::test_utils::create_image_file;

    #[test]
    fn little_endian_round_trip() {
        let file = create_image_file(64).unwrap();
        let mut image = FsImage::map(file.path()).unwrap();

        image.write_u32(0xDEAD_BEEF, 0).unwrap();
        assert_eq!(image.read_u32(0).unwrap(), 0xDEAD_BEEF);
        assert_eq!(image.read_u8(0).unwrap(), 0xEF);
        assert_eq!(image.read_u8(3).unwrap(), 0xDE);

        image.write_u16(0x1234, 10).unwrap();
        assert_eq!(image.read_u16(10).unwrap(), 0x1234);
        assert_eq!(image.read_u8(10).unwrap(), 0x34);
    }

    #[test]
    fn rejects_out_of_bounds_access() {
        let file = create_image_file(16).unwrap();
        let mut image = FsImage::map(file.path()).unwrap();

        assert!(matches!(
            image.read_u32(14),
            Err(FatError::OutOfBounds { .. })
        ));
        assert!(matches!(
            image.write_u8(0, 16),
            Err(FatError::OutOfBounds { .. })
        ));
        assert!(image.read_u32(12).is_ok());
    }

    #[test]
    fn missing_image_is_a_mount_error() {
        let err = FsImage::map("/nonexistent/volume.img").unwrap_err();
        assert!(matches!(err, FatError::Mount { .. }));
    }
}
