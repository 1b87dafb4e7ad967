//! Host mount
//!
//! Serves a filesystem that external tooling has already mounted from the
//! evidence container onto a host directory.

use crate::domain::repositories::{
    DirEntry, FileSystemError, MountedFilesystem, NodeKind, NodeMetadata,
};
use std::fs::{self, File, Metadata};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// A mounted filesystem rooted at a host directory
///
/// Symlinks are reported as files and never followed, so a walk cannot
/// escape the mount point or loop through links. Listing or reading through
/// a symlink fails with [`FileSystemError::Symlink`].
#[derive(Debug, Clone)]
pub struct HostMount {
    root: PathBuf,
}

impl HostMount {
    /// Opens the mount point; fails if it is not a readable directory
    pub fn open(root: &Path) -> Result<Self, FileSystemError> {
        let meta = fs::metadata(root)
            .map_err(|e| FileSystemError::MountFailed(format!("{}: {}", root.display(), e)))?;
        if !meta.is_dir() {
            return Err(FileSystemError::MountFailed(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        info!("Using host mount at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an in-filesystem path to a host path
    ///
    /// Rejects `..` and symlinked intermediate directories. The final
    /// component may itself be a symlink.
    fn resolve(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        let mut host = self.root.clone();
        let mut components = Path::new(path.trim_start_matches('/'))
            .components()
            .peekable();
        while let Some(component) = components.next() {
            match component {
                Component::Normal(part) => host.push(part),
                Component::CurDir => continue,
                _ => return Err(FileSystemError::InvalidPath(path.to_string())),
            }
            if components.peek().is_some() && is_symlink(&host) {
                return Err(FileSystemError::Symlink(path.to_string()));
            }
        }
        Ok(host)
    }

    /// Like [`Self::resolve`], but the final component must not be a symlink
    fn resolve_target(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        let host = self.resolve(path)?;
        if is_symlink(&host) {
            return Err(FileSystemError::Symlink(path.to_string()));
        }
        Ok(host)
    }
}

fn is_symlink(host: &Path) -> bool {
    fs::symlink_metadata(host).is_ok_and(|m| m.file_type().is_symlink())
}

fn map_io(path: &str, e: std::io::Error) -> FileSystemError {
    match e.kind() {
        ErrorKind::NotFound => FileSystemError::NotFound(path.to_string()),
        _ => FileSystemError::ReadError {
            path: path.to_string(),
            message: e.to_string(),
        },
    }
}

fn epoch_secs(time: std::io::Result<SystemTime>) -> Option<i64> {
    let time = time.ok()?;
    Some(match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    })
}

fn node_metadata(meta: &Metadata) -> NodeMetadata {
    let kind = if meta.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::File
    };
    NodeMetadata {
        kind,
        size: i64::try_from(meta.len()).ok(),
        created: epoch_secs(meta.created()),
        modified: epoch_secs(meta.modified()),
        accessed: epoch_secs(meta.accessed()),
    }
}

#[cfg(unix)]
fn name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

impl MountedFilesystem for HostMount {
    fn open_path(&self, path: &str) -> Result<NodeMetadata, FileSystemError> {
        let host = self.resolve(path)?;
        let meta = fs::symlink_metadata(&host).map_err(|e| map_io(path, e))?;
        Ok(node_metadata(&meta))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FileSystemError> {
        let host = self.resolve_target(path)?;
        let entries = fs::read_dir(&host).map_err(|e| match e.kind() {
            ErrorKind::NotADirectory => FileSystemError::NotADirectory(path.to_string()),
            _ => map_io(path, e),
        })?;

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| map_io(path, e))?;
            let metadata = fs::symlink_metadata(entry.path())
                .ok()
                .map(|m| node_metadata(&m));
            listing.push(DirEntry::new(name_bytes(&entry.file_name()), metadata));
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn read_file_range(
        &self,
        path: &str,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, FileSystemError> {
        let host = self.resolve_target(path)?;
        let mut file = File::open(&host).map_err(|e| map_io(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| map_io(path, e))?;

        let mut buf = Vec::with_capacity(length.min(1 << 20));
        file.take(length as u64)
            .read_to_end(&mut buf)
            .map_err(|e| map_io(path, e))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mount() -> (TempDir, HostMount) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Windows/System32")).unwrap();
        fs::write(dir.path().join("Windows/System32/setup.log"), b"0123456789").unwrap();
        let mount = HostMount::open(dir.path()).unwrap();
        (dir, mount)
    }

    #[test]
    fn test_open_requires_directory() {
        assert!(HostMount::open(Path::new("/nonexistent/mount")).is_err());
    }

    #[test]
    fn test_list_and_read() {
        let (_dir, mount) = mount();
        let listing = mount.list_directory("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, b"Windows");
        assert!(listing[0].metadata.as_ref().unwrap().is_directory());

        let data = mount
            .read_file_range("/Windows/System32/setup.log", 2, 4)
            .unwrap();
        assert_eq!(data, b"2345");
        let tail = mount
            .read_file_range("Windows/System32/setup.log", 8, 100)
            .unwrap();
        assert_eq!(tail, b"89");
    }

    #[test]
    fn test_rejects_parent_components() {
        let (_dir, mount) = mount();
        assert!(matches!(
            mount.open_path("/../etc/passwd"),
            Err(FileSystemError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        use std::os::unix::fs::symlink;

        let (dir, mount) = mount();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"HOST-SECRET").unwrap();
        symlink(outside.path().join("secret.txt"), dir.path().join("evil.log")).unwrap();
        symlink(outside.path(), dir.path().join("elsewhere")).unwrap();

        // the link itself is visible, as a file
        let meta = mount.open_path("/evil.log").unwrap();
        assert!(!meta.is_directory());

        assert!(matches!(
            mount.read_file_range("/evil.log", 0, 4096),
            Err(FileSystemError::Symlink(_))
        ));
        assert!(matches!(
            mount.read_file_range("/elsewhere/secret.txt", 0, 4096),
            Err(FileSystemError::Symlink(_))
        ));
        assert!(matches!(
            mount.list_directory("/elsewhere"),
            Err(FileSystemError::Symlink(_))
        ));
    }

    #[test]
    fn test_missing_path() {
        let (_dir, mount) = mount();
        assert!(matches!(
            mount.open_path("/Windows/nothing"),
            Err(FileSystemError::NotFound(_))
        ));
    }
}
