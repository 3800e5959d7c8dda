// Directory operations and the public session verbs. Directory records are
// located through the parent's cluster chain; every mutating verb validates
// names and capacity before touching the image.

use fatmod_core::{FatError, OpenMode};
use log::info;

use crate::constants::*;
use crate::dir_entry::{self, decode_entry, encode_deleted, encode_entry, DirEntry};
use crate::volume::{Fat32Volume, OpenFile, OpenFileKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
}

impl Fat32Volume {
    /// All live, short-name entries of the directory starting at
    /// `dir_cluster`, in on-disk order (slots low to high, clusters in chain
    /// order). Slots are scanned from the highest offset down, the same
    /// traversal the undelete scan depends on.
    pub fn directory_entries(&self, dir_cluster: u32) -> Result<Vec<DirEntry>, FatError> {
        let mut entries = Vec::new();
        for cluster in self.cluster_chain(dir_cluster)? {
            let base = self.bpb.cluster_byte_offset(cluster);
            let mut kept = Vec::new();
            for slot in (0..self.bpb.bytes_per_cluster)
                .step_by(DIR_ENTRY_SIZE as usize)
                .rev()
            {
                let entry = decode_entry(&self.image, base + slot as u64)?;
                if !entry.is_long_name() && !entry.is_free() {
                    kept.push(entry);
                }
            }
            kept.reverse();
            entries.extend(kept);
        }
        Ok(entries)
    }

    /// Resolve `name` within the directory at `dir_cluster`. `/` is the
    /// root, `.` the searched directory itself, and `..` follows the on-disk
    /// dot-dot record to the parent (the root is its own parent).
    pub fn find_entry(&self, name: &str, dir_cluster: u32) -> Result<Option<DirEntry>, FatError> {
        if name == ROOT_NAME {
            return Ok(Some(self.root_entry()));
        }
        if name == "." {
            if dir_cluster == self.bpb.root_cluster {
                return Ok(Some(self.root_entry()));
            }
            let display = if dir_cluster == self.cwd_cluster {
                self.cwd_name.clone()
            } else {
                ".".to_string()
            };
            return Ok(Some(DirEntry::synthesized(
                display,
                ATTR_DIRECTORY,
                dir_cluster,
            )));
        }
        if name == ".." {
            if dir_cluster == self.bpb.root_cluster {
                return Ok(Some(self.root_entry()));
            }
            for entry in self.directory_entries(dir_cluster)? {
                if entry.name == ".." {
                    let mut entry = entry;
                    if entry.cluster == 0 {
                        // The Microsoft convention stores 0 for a root parent.
                        entry.cluster = self.bpb.root_cluster;
                    }
                    return Ok(Some(entry));
                }
            }
            return Ok(None);
        }
        if name == self.cwd_name && dir_cluster == self.cwd_cluster {
            return Ok(Some(DirEntry::synthesized(
                self.cwd_name.clone(),
                ATTR_DIRECTORY,
                self.cwd_cluster,
            )));
        }

        for entry in self.directory_entries(dir_cluster)? {
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn entry_exists(&self, name: &str, dir_cluster: u32) -> Result<bool, FatError> {
        if name == ROOT_NAME {
            return Ok(true);
        }
        Ok(self
            .directory_entries(dir_cluster)?
            .iter()
            .any(|entry| entry.name == name))
    }

    fn root_entry(&self) -> DirEntry {
        DirEntry::synthesized(ROOT_NAME.to_string(), ATTR_DIRECTORY, self.bpb.root_cluster)
    }

    /// Create a fresh file or directory record under `parent_cluster`. The
    /// record goes into the first free 32-byte slot of the parent chain, or
    /// into a newly allocated parent cluster when no slot is left. Capacity
    /// for every allocation is verified before any mutation.
    pub(crate) fn create_entry(
        &mut self,
        name: &str,
        parent_cluster: u32,
        kind: EntryKind,
    ) -> Result<(), FatError> {
        let chain = self.cluster_chain(parent_cluster)?;

        let mut slot = None;
        'search: for &cluster in &chain {
            let base = self.bpb.cluster_byte_offset(cluster);
            for entry_offset in (0..self.bpb.bytes_per_cluster).step_by(DIR_ENTRY_SIZE as usize) {
                let entry = decode_entry(&self.image, base + entry_offset as u64)?;
                if entry.is_free() {
                    slot = Some(base + entry_offset as u64);
                    break 'search;
                }
            }
        }

        // One cluster for the content chain, one more if the parent has to
        // grow to hold the record.
        let clusters_needed = 1 + u32::from(slot.is_none());
        if self.fsinfo.free_cluster_count < clusters_needed {
            return Err(FatError::InsufficientSpace);
        }

        let slot = match slot {
            Some(offset) => offset,
            None => {
                let tail = *chain.last().expect("chain is never empty");
                let extension = self.allocate_cluster(tail)?;
                self.zero_cluster(extension)?;
                self.bpb.cluster_byte_offset(extension)
            }
        };

        let content = self.allocate_cluster(0)?;
        let (write_date, write_time) = dir_entry::now_datetime();
        let attribute = match kind {
            EntryKind::Directory => ATTR_DIRECTORY,
            EntryKind::File => ATTR_ARCHIVE,
        };
        let entry = DirEntry::new_at(
            name.to_string(),
            attribute,
            content,
            slot,
            write_date,
            write_time,
        );
        encode_entry(&mut self.image, &entry)?;

        if kind == EntryKind::Directory {
            self.zero_cluster(content)?;
            let base = self.bpb.cluster_byte_offset(content);
            let dot = DirEntry::new_at(
                ".".to_string(),
                ATTR_DIRECTORY,
                content,
                base,
                write_date,
                write_time,
            );
            let dot_dot = DirEntry::new_at(
                "..".to_string(),
                ATTR_DIRECTORY,
                parent_cluster,
                base + DIR_ENTRY_SIZE as u64,
                write_date,
                write_time,
            );
            encode_entry(&mut self.image, &dot)?;
            encode_entry(&mut self.image, &dot_dot)?;
        }

        info!("created '{}' at cluster {}", name, content);
        Ok(())
    }

    /// Tear down `entry`'s cluster chain tail-first, then rewrite its record
    /// as a last-free slot. Attribute, cluster, and size survive in the
    /// record, which is what makes undelete possible.
    pub(crate) fn delete_entry(&mut self, entry: &DirEntry) -> Result<(), FatError> {
        if entry.cluster != 0 {
            let chain = self.cluster_chain(entry.cluster)?;
            for &cluster in chain.iter().rev() {
                self.set_fat_entry(cluster, FREE_CLUSTER)?;
                self.set_free_count(self.fsinfo.free_cluster_count + 1)?;
                if cluster < self.fsinfo.first_free_cluster {
                    self.set_free_hint(cluster)?;
                }
            }
        }
        encode_deleted(&mut self.image, entry)?;
        info!("deleted '{}'", entry.name);
        Ok(())
    }

    // ---- public session verbs ----

    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<(), FatError> {
        validate_entry_name(name)?;
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        if !entry.is_file() {
            return Err(FatError::NotAFile(name.to_string()));
        }
        if self.open_files.keys().any(|key| key.name == name) {
            return Err(FatError::AlreadyOpen(name.to_string()));
        }
        let key = OpenFileKey {
            dir_cluster: self.cwd_cluster,
            name: name.to_string(),
        };
        self.open_files.insert(key, OpenFile { mode, entry });
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        let key = self
            .open_files
            .keys()
            .find(|key| key.name == name)
            .cloned()
            .ok_or_else(|| FatError::NotOpen(name.to_string()))?;
        self.open_files.remove(&key);
        Ok(())
    }

    pub fn create(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        validate_new_name(name)?;
        if self.entry_exists(name, self.cwd_cluster)? {
            return Err(FatError::AlreadyExists(name.to_string()));
        }
        self.create_entry(name, self.cwd_cluster, EntryKind::File)
    }

    pub fn mkdir(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        validate_new_name(name)?;
        if self.entry_exists(name, self.cwd_cluster)? {
            return Err(FatError::AlreadyExists(name.to_string()));
        }
        self.create_entry(name, self.cwd_cluster, EntryKind::Directory)
    }

    pub fn read(&self, name: &str, start: u32, count: u32) -> Result<Vec<u8>, FatError> {
        validate_entry_name(name)?;
        let handle = self
            .open_files
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, handle)| handle)
            .ok_or_else(|| FatError::NotOpen(name.to_string()))?;
        if !handle.mode.is_readable() {
            return Err(FatError::WrongMode {
                name: name.to_string(),
                access: "reading",
            });
        }
        if !handle.entry.is_file() {
            return Err(FatError::NotAFile(name.to_string()));
        }
        self.read_range(&handle.entry, start, count)
    }

    pub fn write(&mut self, name: &str, start: u32, data: &[u8]) -> Result<(), FatError> {
        validate_entry_name(name)?;
        let (key, handle) = self
            .open_files
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(key, handle)| (key.clone(), handle.clone()))
            .ok_or_else(|| FatError::NotOpen(name.to_string()))?;
        if !handle.mode.is_writable() {
            return Err(FatError::WrongMode {
                name: name.to_string(),
                access: "writing",
            });
        }

        let mut entry = handle.entry;
        let mut chain = self.cluster_chain(entry.cluster)?;
        let bytes_per_cluster = self.bpb.bytes_per_cluster as u64;
        let required = start as u64 + data.len() as u64;
        if required > u32::MAX as u64 {
            return Err(FatError::InsufficientSpace);
        }
        let unallocated = chain.first() == Some(&0);
        let allocated = if unallocated {
            0
        } else {
            chain.len() as u64 * bytes_per_cluster
        };

        if required > allocated {
            let additional = (required - allocated).div_ceil(bytes_per_cluster);
            if additional > self.fsinfo.free_cluster_count as u64 {
                return Err(FatError::InsufficientSpace);
            }
            let target = if unallocated {
                additional as usize
            } else {
                chain.len() + additional as usize
            };
            self.grow_chain(target, &mut chain)?;
        }

        if required > entry.size as u64 {
            let first = chain[0];
            self.update_file_entry(&mut entry, first, required as u32)?;
            self.open_files
                .get_mut(&key)
                .expect("handle looked up above")
                .entry = entry;
        }

        self.write_range(&chain, start, data)
    }

    pub fn remove(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        if !entry.is_file() {
            return Err(FatError::NotAFile(name.to_string()));
        }
        if let Some(key) = self.open_files.keys().find(|key| key.name == name).cloned() {
            self.open_files.remove(&key);
        }
        self.delete_entry(&entry)
    }

    pub fn cd(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        if !entry.is_directory() {
            return Err(FatError::NotADirectory(name.to_string()));
        }
        let cluster = if entry.cluster == 0 {
            self.bpb.root_cluster
        } else {
            entry.cluster
        };
        self.cwd_cluster = cluster;
        if cluster == self.bpb.root_cluster {
            self.cwd_name = ROOT_NAME.to_string();
        } else if name != "." {
            self.cwd_name = name.to_string();
        }
        Ok(())
    }

    pub fn list(&self, name: &str) -> Result<Vec<String>, FatError> {
        validate_entry_name(name)?;
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        if !entry.is_directory() {
            return Err(FatError::NotADirectory(name.to_string()));
        }
        Ok(self
            .directory_entries(entry.cluster)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    pub fn rmdir(&mut self, name: &str) -> Result<(), FatError> {
        validate_entry_name(name)?;
        if name == "." || name == ".." || name == ROOT_NAME {
            return Err(FatError::InvalidName(format!("'{name}' cannot be removed")));
        }
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        if !entry.is_directory() {
            return Err(FatError::NotADirectory(name.to_string()));
        }
        let live = self
            .directory_entries(entry.cluster)?
            .into_iter()
            .any(|child| child.name != "." && child.name != "..");
        if live {
            return Err(FatError::NotEmpty(name.to_string()));
        }
        self.delete_entry(&entry)
    }

    /// Allocated bytes of an entry: chain length times cluster size, not the
    /// recorded file size.
    pub fn allocated_size(&self, name: &str) -> Result<u64, FatError> {
        validate_entry_name(name)?;
        let entry = self
            .find_entry(name, self.cwd_cluster)?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;
        let chain = self.cluster_chain(entry.cluster)?;
        Ok(chain.len() as u64 * self.bpb.bytes_per_cluster as u64)
    }
}

/// Entry names may not contain `/`; the single-character `/` denotes the
/// root and is allowed where a lookup target is expected.
fn validate_entry_name(name: &str) -> Result<(), FatError> {
    if name != ROOT_NAME && name.contains('/') {
        return Err(FatError::InvalidName(format!("'{name}' contains '/'")));
    }
    Ok(())
}

/// Validity rules for names being created: ASCII only, no reserved dot
/// names, no invalid bytes (0x05 is tolerated only as the first byte), and
/// 8.3-compatible lengths.
fn validate_new_name(name: &str) -> Result<(), FatError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FatError::InvalidName(format!("cannot create '{name}'")));
    }
    if !name.is_ascii() {
        return Err(FatError::InvalidName(format!(
            "'{name}' contains non-ASCII characters"
        )));
    }
    for (i, byte) in name.bytes().enumerate() {
        if byte == KANJI_LEAD_BYTE && i != 0 {
            return Err(FatError::InvalidName(format!(
                "'{name}' contains an invalid character"
            )));
        }
        if INVALID_NAME_BYTES.contains(&byte) {
            return Err(FatError::InvalidName(format!(
                "'{name}' contains an invalid character"
            )));
        }
    }
    match name.find('.') {
        Some(dot) => {
            let (base, extension) = (&name[..dot], &name[dot + 1..]);
            if base.len() > 8 || extension.len() > 3 {
                return Err(FatError::InvalidName(format!(
                    "'{name}' base or extension is too long"
                )));
            }
        }
        None => {
            if name.len() > 11 {
                return Err(FatError::InvalidName(format!("'{name}' is too long")));
            }
        }
    }
    Ok(())
}
