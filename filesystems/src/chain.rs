// Cluster chain I/O: walking FAT links to end-of-chain, growing chains by
// allocation, and streaming byte ranges across cluster boundaries.

use fatmod_core::FatError;
use log::debug;

use crate::constants::*;
use crate::dir_entry::DirEntry;
use crate::volume::Fat32Volume;

impl Fat32Volume {
    /// The ordered list of clusters starting at `start`. A start of 0 yields
    /// the sentinel `[0]`, meaning no cluster has been assigned yet.
    pub fn cluster_chain(&self, start: u32) -> Result<Vec<u32>, FatError> {
        let mut chain = Vec::new();
        let mut cluster = start;
        loop {
            if chain.len() as u32 >= MAX_CHAIN_LENGTH {
                return Err(FatError::Corrupt(format!(
                    "cluster chain from {} is circular or too long",
                    start
                )));
            }
            chain.push(cluster);
            cluster = self.fat_entry(cluster)?;
            if cluster >= EOC {
                return Ok(chain);
            }
        }
    }

    /// Grow `chain` to `new_len` clusters, linking each new cluster from the
    /// previous tail. The sentinel `[0]` is replaced by the first allocation.
    /// Chains never shrink here; deletion tears them down separately.
    pub(crate) fn grow_chain(
        &mut self,
        new_len: usize,
        chain: &mut Vec<u32>,
    ) -> Result<(), FatError> {
        if chain.first() == Some(&0) && new_len > 0 {
            let first = self.allocate_cluster(0)?;
            chain.clear();
            chain.push(first);
        }
        while chain.len() < new_len {
            let tail = *chain.last().expect("chain is never empty");
            let next = self.allocate_cluster(tail)?;
            chain.push(next);
        }
        Ok(())
    }

    /// Read up to `count` bytes of `entry` starting at byte `start`. The
    /// count is clamped to the bytes remaining before end of file.
    pub(crate) fn read_range(
        &self,
        entry: &DirEntry,
        start: u32,
        count: u32,
    ) -> Result<Vec<u8>, FatError> {
        if start > entry.size {
            return Err(FatError::OutOfRange {
                pos: start,
                size: entry.size,
            });
        }
        let count = count.min(entry.size - start) as usize;

        let chain = self.cluster_chain(entry.cluster)?;
        let bytes_per_cluster = self.bpb.bytes_per_cluster as u64;
        let mut data = Vec::with_capacity(count);
        let mut in_cluster = start as u64 % bytes_per_cluster;

        for &cluster in chain
            .iter()
            .skip((start / self.bpb.bytes_per_cluster) as usize)
        {
            if data.len() == count || cluster == 0 {
                break;
            }
            let take = ((bytes_per_cluster - in_cluster) as usize).min(count - data.len());
            let offset = self.bpb.cluster_byte_offset(cluster) + in_cluster;
            data.extend_from_slice(self.image.read_bytes(offset, take)?);
            in_cluster = 0;
        }
        Ok(data)
    }

    /// Stream `data` into `chain` starting at byte `start`. The chain must
    /// already span `start + data.len()` bytes.
    pub(crate) fn write_range(
        &mut self,
        chain: &[u32],
        start: u32,
        data: &[u8],
    ) -> Result<(), FatError> {
        let bytes_per_cluster = self.bpb.bytes_per_cluster as u64;
        let mut in_cluster = start as u64 % bytes_per_cluster;
        let mut written = 0usize;

        for &cluster in chain
            .iter()
            .skip((start / self.bpb.bytes_per_cluster) as usize)
        {
            if written == data.len() {
                break;
            }
            let take = ((bytes_per_cluster - in_cluster) as usize).min(data.len() - written);
            let offset = self.bpb.cluster_byte_offset(cluster) + in_cluster;
            self.image
                .write_bytes(&data[written..written + take], offset)?;
            written += take;
            in_cluster = 0;
        }
        debug!("wrote {} bytes at position {}", written, start);
        Ok(())
    }

    /// Rewrite a grown file's record in place: cluster halves, size, and the
    /// ARCHIVE bit.
    pub(crate) fn update_file_entry(
        &mut self,
        entry: &mut DirEntry,
        first_cluster: u32,
        new_size: u32,
    ) -> Result<(), FatError> {
        entry.cluster = first_cluster;
        entry.size = new_size;
        entry.attribute |= ATTR_ARCHIVE;

        let at = entry.offset;
        self.image.write_u8(entry.attribute, at + 11)?;
        self.image.write_u16((entry.cluster >> 16) as u16, at + 20)?;
        self.image
            .write_u16((entry.cluster & 0xFFFF) as u16, at + 26)?;
        self.image.write_u32(entry.size, at + 28)?;
        Ok(())
    }
}
