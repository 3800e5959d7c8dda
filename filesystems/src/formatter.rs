// Minimal native FAT32 formatter: boot sector, FSInfo (plus the standard
// backups at sectors 6 and 7), zeroed FAT mirrors with their reserved
// entries, and an empty root directory. Exists so tests and tools can
// fabricate a valid volume; it is not wired into the interactive verbs.

use std::fs::OpenOptions;
use std::path::Path;

use chrono::Local;
use fatmod_core::FatError;
use log::info;

use crate::constants::*;
use crate::image::FsImage;

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub total_sectors: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            num_fats: 2,
            total_sectors: 2048,
        }
    }
}

/// Create (or truncate) the file at `path` and lay down a fresh FAT32
/// volume described by `opts`.
pub fn format_volume<P: AsRef<Path>>(path: P, opts: &FormatOptions) -> Result<(), FatError> {
    let path = path.as_ref();
    let bps = opts.bytes_per_sector as u64;
    let image_len = opts.total_sectors as u64 * bps;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(FatError::Io)?;
    file.set_len(image_len).map_err(FatError::Io)?;
    drop(file);

    // FAT size from a one-pass overestimate of the cluster count; the extra
    // slack is at most a sector.
    let cluster_estimate = opts.total_sectors / opts.sectors_per_cluster as u32;
    let fat_bytes = (cluster_estimate as u64 + 2) * 4;
    let fat_size_sectors = fat_bytes.div_ceil(bps) as u32;

    let first_data_sector =
        opts.reserved_sectors as u32 + opts.num_fats as u32 * fat_size_sectors;
    if first_data_sector + opts.sectors_per_cluster as u32 > opts.total_sectors {
        return Err(FatError::Corrupt(format!(
            "cannot format: {} sectors leave no data area",
            opts.total_sectors
        )));
    }
    let cluster_count = (opts.total_sectors - first_data_sector) / opts.sectors_per_cluster as u32;
    let root_cluster = 2u32;

    let mut image = FsImage::map(path)?;

    write_boot_sector(&mut image, opts, fat_size_sectors, root_cluster, 0)?;
    // Backup boot sector at the standard location.
    write_boot_sector(&mut image, opts, fat_size_sectors, root_cluster, 6 * bps)?;

    // The root directory occupies one cluster from the start.
    let free_clusters = cluster_count - 1;
    write_fsinfo_sector(&mut image, free_clusters, 3, bps)?;
    write_fsinfo_sector(&mut image, free_clusters, 3, 7 * bps)?;

    // Zero every FAT mirror, then seed the reserved entries.
    let fat_base = opts.reserved_sectors as u64 * bps;
    let fat_len = fat_size_sectors as u64 * bps;
    image.fill(0, fat_base, (fat_len * opts.num_fats as u64) as usize)?;
    for mirror in 0..opts.num_fats as u64 {
        let base = fat_base + mirror * fat_len;
        image.write_u32(0x0FFF_FF00 | 0xF8, base)?;
        image.write_u32(0x0FFF_FFFF, base + 4)?;
        image.write_u32(0x0FFF_FFFF, base + root_cluster as u64 * 4)?;
    }

    // Empty root directory.
    let root_offset = first_data_sector as u64 * bps;
    let cluster_bytes = opts.bytes_per_sector as usize * opts.sectors_per_cluster as usize;
    image.fill(0, root_offset, cluster_bytes)?;

    image.flush()?;
    info!(
        "formatted '{}': {} sectors, {} clusters, {} sectors per FAT",
        path.display(),
        opts.total_sectors,
        cluster_count,
        fat_size_sectors
    );
    Ok(())
}

fn write_boot_sector(
    image: &mut FsImage,
    opts: &FormatOptions,
    fat_size_sectors: u32,
    root_cluster: u32,
    at: u64,
) -> Result<(), FatError> {
    image.fill(0, at, opts.bytes_per_sector as usize)?;

    image.write_bytes(&[0xEB, 0x58, 0x90], at)?; // jump
    image.write_bytes(b"MSWIN4.1", at + 3)?;
    image.write_u16(opts.bytes_per_sector, at + BPB_BYTES_PER_SEC)?;
    image.write_u8(opts.sectors_per_cluster, at + BPB_SEC_PER_CLUS)?;
    image.write_u16(opts.reserved_sectors, at + BPB_RSVD_SEC_CNT)?;
    image.write_u8(opts.num_fats, at + BPB_NUM_FATS)?;
    // Root entry count, total sectors (16-bit), and FAT size (16-bit) are
    // zero on FAT32.
    image.write_u16(0, at + 17)?;
    image.write_u16(0, at + 19)?;
    image.write_u8(0xF8, at + 21)?; // media descriptor, fixed disk
    image.write_u16(0, at + 22)?;
    image.write_u16(63, at + 24)?; // sectors per track
    image.write_u16(255, at + 26)?; // heads
    image.write_u32(0, at + 28)?; // hidden sectors
    image.write_u32(opts.total_sectors, at + BPB_TOT_SEC32)?;
    image.write_u32(fat_size_sectors, at + BPB_FAT_SZ32)?;
    image.write_u16(0, at + 40)?; // ext flags: mirrored FATs
    image.write_u16(0, at + 42)?; // fs version
    image.write_u32(root_cluster, at + BPB_ROOT_CLUS)?;
    image.write_u16(1, at + BPB_FS_INFO)?;
    image.write_u16(6, at + 50)?; // backup boot sector
    image.write_u8(0x80, at + 64)?; // drive number
    image.write_u8(0x29, at + 66)?; // extended boot signature
    image.write_u32(Local::now().timestamp() as u32, at + 67)?; // volume serial
    image.write_bytes(b"NO NAME    ", at + 71)?;
    image.write_bytes(b"FAT32   ", at + 82)?;
    image.write_bytes(&BOOT_SIGNATURE, at + BOOT_SIGNATURE_OFFSET)?;
    Ok(())
}

fn write_fsinfo_sector(
    image: &mut FsImage,
    free_clusters: u32,
    next_free: u32,
    at: u64,
) -> Result<(), FatError> {
    image.fill(0, at, 512)?;
    image.write_u32(FSINFO_LEAD_SIG, at + FSINFO_LEAD_SIG_OFFSET)?;
    image.write_u32(FSINFO_STRUC_SIG, at + FSINFO_STRUC_SIG_OFFSET)?;
    image.write_u32(free_clusters, at + FSINFO_FREE_COUNT_OFFSET)?;
    image.write_u32(next_free, at + FSINFO_NEXT_FREE_OFFSET)?;
    image.write_u32(FSINFO_TRAIL_SIG, at + FSINFO_TRAIL_SIG_OFFSET)?;
    Ok(())
}
