// The FAT table manager: 28-bit entry access, mirror-consistent updates,
// free-cluster accounting against FSInfo, and the cluster allocator.

use fatmod_core::FatError;
use log::debug;

use crate::constants::*;
use crate::volume::Fat32Volume;

impl Fat32Volume {
    /// The 28-bit FAT entry for `cluster`, read from the first mirror.
    pub fn fat_entry(&self, cluster: u32) -> Result<u32, FatError> {
        let location = self.bpb.fat_sector(cluster) as u64 * self.bpb.bytes_per_sector as u64
            + self.bpb.fat_entry_offset(cluster) as u64;
        Ok(self.image.read_u32(location)? & FAT_MASK)
    }

    /// Write `value` into `cluster`'s entry in every FAT mirror. The high
    /// four bits of each existing word are reserved and preserved.
    pub fn set_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), FatError> {
        let sector = self.bpb.fat_sector(cluster);
        let entry_offset = self.bpb.fat_entry_offset(cluster);

        for mirror in 0..self.bpb.num_fats as u32 {
            let location = (sector + mirror * self.bpb.fat_size_sectors) as u64
                * self.bpb.bytes_per_sector as u64
                + entry_offset as u64;
            let word = self.image.read_u32(location)?;
            let word = (word & !FAT_MASK) | (value & FAT_MASK);
            self.image.write_u32(word, location)?;
        }
        Ok(())
    }

    pub fn is_free_cluster(&self, cluster: u32) -> Result<bool, FatError> {
        Ok(self.fat_entry(cluster)? == FREE_CLUSTER)
    }

    /// Update the free-cluster count in memory and in the FSInfo sector
    /// together.
    pub(crate) fn set_free_count(&mut self, count: u32) -> Result<(), FatError> {
        self.fsinfo.free_cluster_count = count;
        let location = self.bpb.fsinfo_byte_offset() + FSINFO_FREE_COUNT_OFFSET;
        self.image.write_u32(count, location)
    }

    /// Update the first-free hint in memory and in the FSInfo sector
    /// together.
    pub(crate) fn set_free_hint(&mut self, cluster: u32) -> Result<(), FatError> {
        self.fsinfo.first_free_cluster = cluster;
        let location = self.bpb.fsinfo_byte_offset() + FSINFO_NEXT_FREE_OFFSET;
        self.image.write_u32(cluster, location)
    }

    /// First cluster number whose FAT entry is free. The scan starts at the
    /// FSInfo first-free hint and wraps around; an out-of-range hint falls
    /// back to cluster 2.
    pub(crate) fn find_free_cluster(&self) -> Result<u32, FatError> {
        if self.fsinfo.free_cluster_count == 0 {
            return Err(FatError::InsufficientSpace);
        }
        let total = self.bpb.total_clusters;
        let hint = self.fsinfo.first_free_cluster;
        let start = if (2..total).contains(&hint) { hint } else { 2 };

        let mut cluster = start;
        loop {
            if self.is_free_cluster(cluster)? {
                return Ok(cluster);
            }
            cluster += 1;
            if cluster >= total {
                cluster = 2;
            }
            if cluster == start {
                return Err(FatError::Corrupt(
                    "free cluster count disagrees with the FAT".into(),
                ));
            }
        }
    }

    /// Allocate one cluster and terminate it with EOC. A nonzero `prev` is
    /// linked to the new cluster, extending its chain. The first-free hint
    /// advances past the allocation.
    pub(crate) fn allocate_cluster(&mut self, prev: u32) -> Result<u32, FatError> {
        let cluster = self.find_free_cluster()?;
        if prev != 0 {
            self.set_fat_entry(prev, cluster)?;
        }
        self.set_fat_entry(cluster, EOC)?;
        self.set_free_count(self.fsinfo.free_cluster_count - 1)?;
        self.set_free_hint(cluster + 1)?;
        debug!("allocated cluster {}", cluster);
        Ok(cluster)
    }

    /// Zero a data cluster. Directory clusters must be cleared before use so
    /// stale bytes cannot decode as live entries.
    pub(crate) fn zero_cluster(&mut self, cluster: u32) -> Result<(), FatError> {
        let offset = self.bpb.cluster_byte_offset(cluster);
        self.image
            .fill(0, offset, self.bpb.bytes_per_cluster as usize)
    }
}
