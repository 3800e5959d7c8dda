// Consistency checks over a mounted volume: the invariants the engine
// promises to uphold after every operation. Used heavily by the integration
// tests; cheap enough to run after arbitrary operation sequences.

use std::collections::HashMap;

use fatmod_core::FatError;

use crate::constants::FREE_CLUSTER;
use crate::volume::Fat32Volume;

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sweep the volume: FAT mirrors byte-identical, FSInfo free count matching
/// the table, and every reachable chain well-formed and disjoint.
pub fn validate(volume: &Fat32Volume) -> Result<ValidationReport, FatError> {
    let mut report = ValidationReport::default();
    check_mirrors(volume, &mut report)?;
    check_free_count(volume, &mut report)?;
    check_chains(volume, &mut report)?;
    Ok(report)
}

fn check_mirrors(volume: &Fat32Volume, report: &mut ValidationReport) -> Result<(), FatError> {
    let bpb = volume.bpb();
    let fat_len = bpb.fat_size_sectors as u64 * bpb.bytes_per_sector as u64;
    let base = bpb.reserved_sector_count as u64 * bpb.bytes_per_sector as u64;

    let first = volume.image.read_bytes(base, fat_len as usize)?;
    for mirror in 1..bpb.num_fats as u64 {
        let other = volume
            .image
            .read_bytes(base + mirror * fat_len, fat_len as usize)?;
        if first != other {
            report
                .errors
                .push(format!("FAT mirror {mirror} differs from mirror 0"));
        }
    }
    Ok(())
}

fn check_free_count(volume: &Fat32Volume, report: &mut ValidationReport) -> Result<(), FatError> {
    let mut free = 0u32;
    for cluster in 2..volume.bpb().total_clusters {
        if volume.fat_entry(cluster)? == FREE_CLUSTER {
            free += 1;
        }
    }
    let recorded = volume.free_cluster_count();
    if free != recorded {
        report.errors.push(format!(
            "FSInfo records {recorded} free clusters but the FAT holds {free}"
        ));
    }
    Ok(())
}

/// Walk the directory tree from the root and verify that every reachable
/// chain stays within bounds, terminates, and shares no cluster with any
/// other chain.
fn check_chains(volume: &Fat32Volume, report: &mut ValidationReport) -> Result<(), FatError> {
    let bpb = volume.bpb();
    let mut owners: HashMap<u32, String> = HashMap::new();
    let mut pending = vec![(bpb.root_cluster, String::from("/"))];

    while let Some((dir_cluster, dir_name)) = pending.pop() {
        let chain = match volume.cluster_chain(dir_cluster) {
            Ok(chain) => chain,
            Err(err) => {
                report
                    .errors
                    .push(format!("directory '{dir_name}' chain is broken: {err}"));
                continue;
            }
        };
        claim_chain(volume, &chain, &dir_name, &mut owners, report);

        for entry in volume.directory_entries(dir_cluster)? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let path = format!("{dir_name}/{}", entry.name);
            if entry.is_directory() {
                pending.push((entry.cluster, path));
            } else if entry.cluster != 0 {
                match volume.cluster_chain(entry.cluster) {
                    Ok(chain) => claim_chain(volume, &chain, &path, &mut owners, report),
                    Err(err) => report
                        .errors
                        .push(format!("file '{path}' chain is broken: {err}")),
                }
            }
        }
    }
    Ok(())
}

fn claim_chain(
    volume: &Fat32Volume,
    chain: &[u32],
    owner: &str,
    owners: &mut HashMap<u32, String>,
    report: &mut ValidationReport,
) {
    for &cluster in chain {
        if cluster < 2 || cluster >= volume.bpb().total_clusters {
            report
                .errors
                .push(format!("'{owner}' references out-of-range cluster {cluster}"));
            continue;
        }
        if let Some(previous) = owners.insert(cluster, owner.to_string()) {
            report.errors.push(format!(
                "cluster {cluster} is claimed by both '{previous}' and '{owner}'"
            ));
        }
    }
}
