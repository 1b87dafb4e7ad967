//! Walk filesystem use case
//!
//! Depth-bounded traversal of a mounted filesystem. Every entry with a
//! metadata record and a size becomes a [`FilesystemEntry`]; log-like and
//! hive-like files are optionally copied out as they are found.

use crate::domain::entities::{EntryType, FilesystemEntry, NTUSER, Timestamp};
use crate::domain::repositories::{
    ArtifactWriter, DirEntry, FileSystemError, MountedFilesystem, NodeMetadata, join_path,
};
use crate::domain::services::safe_decode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directory captured log files are written to
pub const LOGS_DIR: &str = "extracted_logs";

/// Directory captured hive files are written to
pub const REGISTRY_DIR: &str = "extracted_registry";

const HIVE_FILE_NAMES: [&str; 5] = ["ntuser.dat", "system", "software", "sam", "security"];
const LOG_EXTENSIONS: [&str; 3] = [".evtx", ".log", ".txt"];

/// Errors that end a walk
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Cannot list walk root {path}: {source}")]
    RootUnreadable {
        path: String,
        #[source]
        source: FileSystemError,
    },
}

/// Where a file is sent once recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRoute {
    /// Recorded only
    Default,
    /// Copied to `extracted_logs/` with a metadata sidecar
    Log,
    /// Copied to `extracted_registry/` and offered for extraction
    Hive,
}

impl ArtifactRoute {
    /// Picks the route for a file name; hive beats log beats default
    pub fn for_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if HIVE_FILE_NAMES.contains(&lower.as_str()) {
            Self::Hive
        } else if lower.contains("log") || LOG_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            Self::Log
        } else {
            Self::Default
        }
    }
}

/// A file copied out during the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedArtifact {
    pub route: ArtifactRoute,
    pub source_path: String,
    pub saved_path: PathBuf,
    pub saved_size: u64,
    /// Sidecar with the source path and timestamps (log route only)
    pub metadata_path: Option<PathBuf>,
}

/// A hive file found while walking, already copied locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveCandidate {
    /// `SYSTEM`, `SOFTWARE`, ... or `NTUSER_<parent directory>`
    pub hive_name: String,
    pub source_path: String,
    pub local_path: PathBuf,
}

/// Everything a walk produced
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Recorded entries in visit order
    pub entries: Vec<FilesystemEntry>,
    pub captured: Vec<CapturedArtifact>,
    pub hive_candidates: Vec<HiveCandidate>,
    /// Entries without metadata or with no size
    pub skipped: usize,
    /// Directories that could not be listed
    pub failures: usize,
    pub capture_failures: usize,
}

/// Which routes copy content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureRoutes {
    pub logs: bool,
    pub hives: bool,
}

/// Walks a mounted filesystem and captures artifacts
pub struct ArtifactWalker<'a> {
    writer: &'a dyn ArtifactWriter,
    routes: CaptureRoutes,
}

impl<'a> ArtifactWalker<'a> {
    pub fn new(writer: &'a dyn ArtifactWriter, routes: CaptureRoutes) -> Self {
        Self { writer, routes }
    }

    /// Walks from `root`
    ///
    /// Children of `root` are level 0. Directories are always recorded but
    /// only descended while their level is below `max_depth`. `on_entry` is
    /// called for every recorded entry. Only an unreadable root is fatal.
    pub fn walk<F>(
        &self,
        fs: &dyn MountedFilesystem,
        root: &str,
        max_depth: usize,
        mut on_entry: F,
    ) -> Result<WalkOutcome, WalkError>
    where
        F: FnMut(&FilesystemEntry),
    {
        info!("Walking {} (max depth {})", root, max_depth);

        let children = fs
            .list_directory(root)
            .map_err(|source| WalkError::RootUnreadable {
                path: root.to_string(),
                source,
            })?;

        let mut outcome = WalkOutcome::default();
        for child in children {
            self.visit(fs, root, child, 0, max_depth, &mut outcome, &mut on_entry);
        }

        info!(
            "Walk complete: {} entries, {} skipped, {} failed, {} captured",
            outcome.entries.len(),
            outcome.skipped,
            outcome.failures,
            outcome.captured.len()
        );
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit<F>(
        &self,
        fs: &dyn MountedFilesystem,
        parent: &str,
        child: DirEntry,
        level: usize,
        max_depth: usize,
        outcome: &mut WalkOutcome,
        on_entry: &mut F,
    ) where
        F: FnMut(&FilesystemEntry),
    {
        if child.is_dot() {
            return;
        }

        let name = safe_decode(&child.name);
        let path = join_path(parent, &name);

        let Some(metadata) = child.metadata else {
            debug!("No metadata for {}, skipping", path);
            outcome.skipped += 1;
            return;
        };
        let raw_size = match metadata.size {
            Some(size) if size != 0 => size,
            _ => {
                debug!("No size for {}, skipping", path);
                outcome.skipped += 1;
                return;
            }
        };

        let entry = to_entry(path.clone(), raw_size, &metadata);
        on_entry(&entry);
        outcome.entries.push(entry);

        if metadata.is_directory() {
            if level >= max_depth {
                return;
            }
            match fs.list_directory(&path) {
                Ok(children) => {
                    for grandchild in children {
                        self.visit(fs, &path, grandchild, level + 1, max_depth, outcome, on_entry);
                    }
                }
                Err(e) => {
                    warn!("Cannot list {}: {}", path, e);
                    outcome.failures += 1;
                }
            }
            return;
        }

        match ArtifactRoute::for_name(&name) {
            ArtifactRoute::Default => {}
            ArtifactRoute::Log if self.routes.logs => {
                self.capture_log(fs, &path, raw_size, &metadata, outcome);
            }
            ArtifactRoute::Hive if self.routes.hives => {
                self.capture_hive(fs, parent, &name, &path, raw_size, outcome);
            }
            _ => {}
        }
    }

    fn capture_log(
        &self,
        fs: &dyn MountedFilesystem,
        path: &str,
        raw_size: i64,
        metadata: &NodeMetadata,
        outcome: &mut WalkOutcome,
    ) {
        let dest = Path::new(LOGS_DIR).join(flatten_path(path));
        let copy = match self
            .writer
            .copy_file(fs, path, Some(raw_size.max(0) as u64), &dest)
        {
            Ok(copy) => copy,
            Err(e) => {
                warn!("Failed to capture log {}: {}", path, e);
                outcome.capture_failures += 1;
                return;
            }
        };

        let sidecar = PathBuf::from(format!("{}_metadata.txt", dest.display()));
        let contents = format!(
            "File Path: {}\nCreated Time: {}\nModified Time: {}\nAccessed Time: {}\n",
            path,
            Timestamp::from_epoch(metadata.created),
            Timestamp::from_epoch(metadata.modified),
            Timestamp::from_epoch(metadata.accessed),
        );
        let metadata_path = match self.writer.write_text(&sidecar, &contents) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Failed to write metadata for {}: {}", path, e);
                outcome.capture_failures += 1;
                None
            }
        };

        info!("Saved log {} ({} bytes)", copy.saved_path.display(), copy.saved_size);
        outcome.captured.push(CapturedArtifact {
            route: ArtifactRoute::Log,
            source_path: path.to_string(),
            saved_path: copy.saved_path,
            saved_size: copy.saved_size,
            metadata_path,
        });
    }

    fn capture_hive(
        &self,
        fs: &dyn MountedFilesystem,
        parent: &str,
        name: &str,
        path: &str,
        raw_size: i64,
        outcome: &mut WalkOutcome,
    ) {
        let dest = Path::new(REGISTRY_DIR).join(flatten_path(path));
        let copy = match self
            .writer
            .copy_file(fs, path, Some(raw_size.max(0) as u64), &dest)
        {
            Ok(copy) => copy,
            Err(e) => {
                warn!("Failed to capture hive {}: {}", path, e);
                outcome.capture_failures += 1;
                return;
            }
        };

        info!("Found hive file {}", path);
        outcome.hive_candidates.push(HiveCandidate {
            hive_name: hive_name_for(parent, name),
            source_path: path.to_string(),
            local_path: copy.saved_path.clone(),
        });
        outcome.captured.push(CapturedArtifact {
            route: ArtifactRoute::Hive,
            source_path: path.to_string(),
            saved_path: copy.saved_path,
            saved_size: copy.saved_size,
            metadata_path: None,
        });
    }
}

fn to_entry(path: String, raw_size: i64, metadata: &NodeMetadata) -> FilesystemEntry {
    let entry_type = if metadata.is_directory() {
        EntryType::Directory
    } else {
        EntryType::File
    };
    FilesystemEntry::new(
        path,
        raw_size,
        Timestamp::from_epoch(metadata.created),
        Timestamp::from_epoch(metadata.modified),
        Timestamp::from_epoch(metadata.accessed),
        entry_type,
    )
}

/// Local file name for a captured path: `/a/b.log` becomes `a_b.log`
pub fn flatten_path(path: &str) -> String {
    path.replace('/', "_").trim_start_matches('_').to_string()
}

fn hive_name_for(parent: &str, name: &str) -> String {
    if name.eq_ignore_ascii_case("ntuser.dat") {
        let user = parent.rsplit('/').find(|p| !p.is_empty()).unwrap_or("unknown");
        format!("{NTUSER}_{user}")
    } else {
        name.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::file_systems::MemoryFilesystem;
    use crate::infrastructure::persistence::LocalArtifactWriter;
    use tempfile::TempDir;

    #[test]
    fn test_route_precedence() {
        assert_eq!(ArtifactRoute::for_name("SYSTEM"), ArtifactRoute::Hive);
        assert_eq!(ArtifactRoute::for_name("NTUSER.DAT"), ArtifactRoute::Hive);
        assert_eq!(ArtifactRoute::for_name("syslog"), ArtifactRoute::Log);
        assert_eq!(ArtifactRoute::for_name("Security.evtx"), ArtifactRoute::Log);
        assert_eq!(ArtifactRoute::for_name("notes.txt"), ArtifactRoute::Log);
        assert_eq!(ArtifactRoute::for_name("NOTES.TXT"), ArtifactRoute::Default);
        assert_eq!(ArtifactRoute::for_name("photo.jpg"), ArtifactRoute::Default);
    }

    #[test]
    fn test_flatten_path() {
        assert_eq!(flatten_path("/var/log/syslog"), "var_log_syslog");
        assert_eq!(flatten_path("a.log"), "a.log");
    }

    #[test]
    fn test_hive_names() {
        assert_eq!(hive_name_for("/Users/alice", "NTUSER.DAT"), "NTUSER_alice");
        assert_eq!(hive_name_for("/Windows/System32/config", "software"), "SOFTWARE");
    }

    #[test]
    fn test_walk_records_and_skips() {
        let out = TempDir::new().unwrap();
        let writer = LocalArtifactWriter::new(out.path()).unwrap();
        let mut fs = MemoryFilesystem::new().with_dot_entries();
        fs.add_file("/a.bin", b"abc")
            .add_file("/empty", b"")
            .add_without_metadata("/ghost");

        let walker = ArtifactWalker::new(&writer, CaptureRoutes::default());
        let mut seen = 0;
        let outcome = walker.walk(&fs, "/", 2, |_| seen += 1).unwrap();

        assert_eq!(seen, 1);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].path, "/a.bin");
        assert_eq!(outcome.skipped, 2);
    }
}
