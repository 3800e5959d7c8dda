// A mounted FAT32 volume: the mapped image, its geometry, the FSInfo
// bookkeeping, and the session state (working directory, open files).
//
// The layers of the engine are impl blocks spread over sibling modules:
// `table` (FAT manager), `chain` (cluster chain I/O), `ops` (directory
// operations and the public verbs), `recovery` (undelete).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use fatmod_core::{FatError, OpenMode};
use log::info;

use crate::constants::ROOT_NAME;
use crate::dir_entry::DirEntry;
use crate::geometry::{Bpb, FsInfoState};
use crate::image::FsImage;

/// Stable identity of an open file: the directory it was opened in plus its
/// presentation name. Updates to the entry never move the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenFileKey {
    pub dir_cluster: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct OpenFile {
    pub mode: OpenMode,
    pub entry: DirEntry,
}

#[derive(Debug)]
pub struct Fat32Volume {
    pub(crate) image: FsImage,
    pub(crate) bpb: Bpb,
    pub(crate) fsinfo: FsInfoState,
    pub(crate) cwd_cluster: u32,
    pub(crate) cwd_name: String,
    pub(crate) open_files: HashMap<OpenFileKey, OpenFile>,
}

impl Fat32Volume {
    /// Mount the FAT32 image at `path`. The engine owns the mapping
    /// exclusively until it is dropped.
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<Self, FatError> {
        let image = FsImage::map(path)?;
        let bpb = Bpb::parse(&image)?;
        let fsinfo = FsInfoState::read(&image, &bpb)?;
        info!(
            "mounted FAT32 volume, {} free clusters",
            fsinfo.free_cluster_count
        );

        let root_cluster = bpb.root_cluster;
        Ok(Self {
            image,
            bpb,
            fsinfo,
            cwd_cluster: root_cluster,
            cwd_name: ROOT_NAME.to_string(),
            open_files: HashMap::new(),
        })
    }

    pub fn current_directory_name(&self) -> &str {
        &self.cwd_name
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn free_cluster_count(&self) -> u32 {
        self.fsinfo.free_cluster_count
    }

    /// The FSInfo first-free hint: where the next free-cluster scan starts.
    pub fn first_free_cluster_hint(&self) -> u32 {
        self.fsinfo.first_free_cluster
    }

    /// Geometry and free-space accounting, as printed by `fsinfo`.
    pub fn summary(&self) -> VolumeSummary {
        VolumeSummary {
            bytes_per_sector: self.bpb.bytes_per_sector,
            sectors_per_cluster: self.bpb.sectors_per_cluster,
            total_sectors: self.bpb.total_sectors,
            num_fats: self.bpb.num_fats,
            fat_size_sectors: self.bpb.fat_size_sectors,
            free_sectors: self.fsinfo.free_cluster_count * self.bpb.sectors_per_cluster as u32,
        }
    }

    /// Post all pending stores to the image file.
    pub fn flush(&self) -> Result<(), FatError> {
        self.image.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSummary {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u32,
    pub num_fats: u8,
    pub fat_size_sectors: u32,
    pub free_sectors: u32,
}

impl fmt::Display for VolumeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bytes Per Sector: {}", self.bytes_per_sector)?;
        writeln!(f, "Sectors Per Cluster: {}", self.sectors_per_cluster)?;
        writeln!(f, "Total Sectors: {}", self.total_sectors)?;
        writeln!(f, "Number of FATS: {}", self.num_fats)?;
        writeln!(f, "Sectors per FAT: {}", self.fat_size_sectors)?;
        write!(f, "Number of Free Sectors: {}", self.free_sectors)
    }
}
