// Best-effort recovery of recently deleted files in the current directory.
//
// Deletion zeros every FAT link of a file's chain, so only the first cluster
// can be brought back: its FAT entry is re-terminated with EOC and the record
// is revived under a fresh `undel.<k>` name with its size clamped to one
// cluster.

use fatmod_core::FatError;
use log::info;

use crate::constants::*;
use crate::dir_entry::{decode_entry, encode_entry};
use crate::volume::Fat32Volume;

impl Fat32Volume {
    /// Scan the current directory for free file records that still reference
    /// a cluster and revive each one. Returns the number of files recovered.
    pub fn undelete(&mut self) -> Result<usize, FatError> {
        let mut recovered = 0usize;
        let chain = self.cluster_chain(self.cwd_cluster)?;

        for &cluster in &chain {
            let base = self.bpb.cluster_byte_offset(cluster);
            for slot in (0..self.bpb.bytes_per_cluster)
                .step_by(DIR_ENTRY_SIZE as usize)
                .rev()
            {
                let entry = decode_entry(&self.image, base + slot as u64)?;
                if !(entry.is_free() && entry.is_file() && entry.cluster != 0) {
                    continue;
                }

                self.set_fat_entry(entry.cluster, EOC)?;
                self.set_free_count(self.fsinfo.free_cluster_count.saturating_sub(1))?;
                recovered += 1;

                let mut entry = entry;
                entry.name = format!("undel.{recovered}");
                entry.size = entry.size.min(self.bpb.bytes_per_cluster);
                encode_entry(&mut self.image, &entry)?;
                info!("recovered '{}' at cluster {}", entry.name, entry.cluster);
            }
        }
        Ok(recovered)
    }
}
