// BIOS Parameter Block interpretation. All fields are read once at mount and
// immutable afterwards; FSInfo is the only mutable on-disk bookkeeping.

use fatmod_core::FatError;
use log::info;

use crate::constants::*;
use crate::image::FsImage;

#[derive(Debug, Clone)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub total_sectors: u32,
    pub fat_size_sectors: u32,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,

    // Derived at mount
    pub bytes_per_cluster: u32,
    pub first_data_sector: u32,
    /// Exclusive upper bound on valid data cluster numbers (clusters are
    /// numbered 2..total_clusters).
    pub total_clusters: u32,
}

impl Bpb {
    pub fn parse(image: &FsImage) -> Result<Self, FatError> {
        let signature = [
            image.read_u8(BOOT_SIGNATURE_OFFSET)?,
            image.read_u8(BOOT_SIGNATURE_OFFSET + 1)?,
        ];
        if signature != BOOT_SIGNATURE {
            return Err(FatError::Corrupt("missing 0x55AA boot signature".into()));
        }

        let bytes_per_sector = image.read_u16(BPB_BYTES_PER_SEC)?;
        let sectors_per_cluster = image.read_u8(BPB_SEC_PER_CLUS)?;
        let reserved_sector_count = image.read_u16(BPB_RSVD_SEC_CNT)?;
        let num_fats = image.read_u8(BPB_NUM_FATS)?;
        let total_sectors = image.read_u32(BPB_TOT_SEC32)?;
        let fat_size_sectors = image.read_u32(BPB_FAT_SZ32)?;
        let root_cluster = image.read_u32(BPB_ROOT_CLUS)?;
        let fsinfo_sector = image.read_u16(BPB_FS_INFO)?;

        if bytes_per_sector == 0 || sectors_per_cluster == 0 || num_fats == 0 {
            return Err(FatError::Corrupt("invalid FAT32 parameters".into()));
        }

        let bytes_per_cluster = bytes_per_sector as u32 * sectors_per_cluster as u32;
        let first_data_sector = reserved_sector_count as u32 + num_fats as u32 * fat_size_sectors;
        if first_data_sector >= total_sectors {
            return Err(FatError::Corrupt("data area starts past end of volume".into()));
        }
        let total_clusters = (total_sectors - first_data_sector) / sectors_per_cluster as u32 + 2;

        info!("FAT32 geometry:");
        info!("  bytes per sector: {}", bytes_per_sector);
        info!("  sectors per cluster: {}", sectors_per_cluster);
        info!("  reserved sectors: {}", reserved_sector_count);
        info!("  FAT mirrors: {}", num_fats);
        info!("  sectors per FAT: {}", fat_size_sectors);
        info!("  root cluster: {}", root_cluster);
        info!("  first data sector: {}", first_data_sector);

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count,
            num_fats,
            total_sectors,
            fat_size_sectors,
            root_cluster,
            fsinfo_sector,
            bytes_per_cluster,
            first_data_sector,
            total_clusters,
        })
    }

    /// Sector of the first FAT mirror holding `cluster`'s entry.
    pub fn fat_sector(&self, cluster: u32) -> u32 {
        self.reserved_sector_count as u32 + (cluster * 4) / self.bytes_per_sector as u32
    }

    /// Byte offset of `cluster`'s entry within its FAT sector.
    pub fn fat_entry_offset(&self, cluster: u32) -> u32 {
        (cluster * 4) % self.bytes_per_sector as u32
    }

    /// Absolute byte offset of the first byte of a data cluster.
    pub fn cluster_byte_offset(&self, cluster: u32) -> u64 {
        ((cluster as u64 - 2) * self.sectors_per_cluster as u64 + self.first_data_sector as u64)
            * self.bytes_per_sector as u64
    }

    pub fn fsinfo_byte_offset(&self) -> u64 {
        self.fsinfo_sector as u64 * self.bytes_per_sector as u64
    }
}

/// The FSInfo bookkeeping the engine keeps in lockstep with the image.
#[derive(Debug, Clone)]
pub struct FsInfoState {
    pub free_cluster_count: u32,
    pub first_free_cluster: u32,
}

impl FsInfoState {
    pub fn read(image: &FsImage, bpb: &Bpb) -> Result<Self, FatError> {
        let base = bpb.fsinfo_byte_offset();
        Ok(Self {
            free_cluster_count: image.read_u32(base + FSINFO_FREE_COUNT_OFFSET)?,
            first_free_cluster: image.read_u32(base + FSINFO_NEXT_FREE_OFFSET)?,
        })
    }
}
