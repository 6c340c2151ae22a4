use std::{
    io,
    path::{Path, PathBuf},
};

use sysinfo::Disks;

/// Capacity of the volume holding a path, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: u64,
    pub free: u64,
}

/// Source of free/total space figures. Queried fresh on every call.
pub trait SpaceProbe: Send + Sync {
    fn space(&self, path: &Path) -> io::Result<DiskSpace>;
}

/// Reads volume sizes through `sysinfo`, picking the disk with the longest
/// mount point that contains the path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl SpaceProbe for SysinfoProbe {
    fn space(&self, path: &Path) -> io::Result<DiskSpace> {
        let resolved = existing_ancestor(path)?;
        let disks = Disks::new_with_refreshed_list();

        disks
            .list()
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| DiskSpace {
                total: disk.total_space(),
                free: disk.available_space(),
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no mounted volume contains {}", resolved.display()),
                )
            })
    }
}

/// Canonical form of the nearest existing ancestor, so a log directory that
/// hasn't been created yet still maps to its volume.
fn existing_ancestor(path: &Path) -> io::Result<PathBuf> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if candidate.exists() {
            return candidate.canonicalize();
        }
        current = candidate.parent();
    }
    std::env::current_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_ancestor_walks_up() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("a/b/c");
        assert_eq!(
            existing_ancestor(&missing).unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
