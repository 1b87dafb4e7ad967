//! In-memory filesystem
//!
//! A [`MountedFilesystem`] built programmatically. Used for synthetic
//! evidence and to reproduce damaged filesystems: entries without metadata,
//! unreadable directories and files, and directory aliases that form cycles.

use crate::domain::repositories::{
    DirEntry, FileSystemError, MountedFilesystem, NodeKind, NodeMetadata,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct MemNode {
    metadata: Option<NodeMetadata>,
    content: Vec<u8>,
    alias_of: Option<String>,
    unreadable: bool,
}

/// Filesystem held entirely in memory
///
/// Parent directories are created implicitly. Listings are sorted by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    nodes: BTreeMap<String, MemNode>,
    dot_entries: bool,
}

/// Normalizes to a leading-slash path without trailing slash
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    Some(if idx == 0 { "/" } else { &path[..idx] })
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        let mut fs = Self::default();
        fs.nodes.insert(
            "/".to_string(),
            MemNode {
                metadata: Some(NodeMetadata::directory(4096)),
                ..MemNode::default()
            },
        );
        fs
    }

    /// Makes listings include `.` and `..` like raw filesystem parsers do
    pub fn with_dot_entries(mut self) -> Self {
        self.dot_entries = true;
        self
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut current = parent_of(path).map(str::to_string);
        while let Some(dir) = current {
            self.nodes.entry(dir.clone()).or_insert_with(|| MemNode {
                metadata: Some(NodeMetadata::directory(4096)),
                ..MemNode::default()
            });
            current = parent_of(&dir).map(str::to_string);
        }
    }

    fn insert(&mut self, path: &str, node: MemNode) -> &mut Self {
        let path = normalize(path);
        self.ensure_parents(&path);
        self.nodes.insert(path, node);
        self
    }

    /// Adds a file whose size is the content length
    pub fn add_file(&mut self, path: &str, content: &[u8]) -> &mut Self {
        self.insert(
            path,
            MemNode {
                metadata: Some(NodeMetadata::file(content.len() as i64)),
                content: content.to_vec(),
                ..MemNode::default()
            },
        )
    }

    /// Adds a file with explicit metadata
    pub fn add_file_with_metadata(
        &mut self,
        path: &str,
        content: &[u8],
        metadata: NodeMetadata,
    ) -> &mut Self {
        self.insert(
            path,
            MemNode {
                metadata: Some(metadata),
                content: content.to_vec(),
                ..MemNode::default()
            },
        )
    }

    /// Adds an empty directory
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.insert(
            path,
            MemNode {
                metadata: Some(NodeMetadata::directory(4096)),
                ..MemNode::default()
            },
        )
    }

    /// Adds an entry the filesystem has no metadata record for
    pub fn add_without_metadata(&mut self, path: &str) -> &mut Self {
        self.insert(path, MemNode::default())
    }

    /// Adds a directory entry whose contents are those of `target`
    pub fn add_alias(&mut self, path: &str, target: &str) -> &mut Self {
        self.insert(
            path,
            MemNode {
                metadata: Some(NodeMetadata::directory(4096)),
                alias_of: Some(normalize(target)),
                ..MemNode::default()
            },
        )
    }

    /// Makes listing or reading `path` fail
    pub fn mark_unreadable(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        if let Some(node) = self.nodes.get_mut(&path) {
            node.unreadable = true;
        }
        self
    }

    /// Resolves aliases component by component
    fn resolve(&self, path: &str) -> String {
        let mut current = String::from("/");
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = if current == "/" {
                format!("/{part}")
            } else {
                format!("{current}/{part}")
            };
            if let Some(target) = self.nodes.get(&current).and_then(|n| n.alias_of.clone()) {
                current = target;
            }
        }
        current
    }

    fn node(&self, path: &str) -> Result<(String, &MemNode), FileSystemError> {
        let resolved = self.resolve(path);
        match self.nodes.get(&resolved) {
            Some(node) if node.unreadable => Err(FileSystemError::ReadError {
                path: path.to_string(),
                message: "simulated read failure".to_string(),
            }),
            Some(node) => Ok((resolved, node)),
            None => Err(FileSystemError::NotFound(path.to_string())),
        }
    }
}

impl MountedFilesystem for MemoryFilesystem {
    fn open_path(&self, path: &str) -> Result<NodeMetadata, FileSystemError> {
        let (_, node) = self.node(path)?;
        node.metadata
            .clone()
            .ok_or_else(|| FileSystemError::NotFound(path.to_string()))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FileSystemError> {
        let (resolved, node) = self.node(path)?;
        if node.metadata.as_ref().is_some_and(|m| m.kind != NodeKind::Directory) {
            return Err(FileSystemError::NotADirectory(path.to_string()));
        }

        let mut listing = Vec::new();
        if self.dot_entries {
            listing.push(DirEntry::new(".", node.metadata.clone()));
            listing.push(DirEntry::new("..", node.metadata.clone()));
        }
        listing.extend(
            self.nodes
                .iter()
                .filter(|(p, _)| parent_of(p) == Some(resolved.as_str()))
                .map(|(p, n)| DirEntry::new(name_of(p), n.metadata.clone())),
        );
        Ok(listing)
    }

    fn read_file_range(
        &self,
        path: &str,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, FileSystemError> {
        let (_, node) = self.node(path)?;
        let start = (offset as usize).min(node.content.len());
        let end = start.saturating_add(length).min(node.content.len());
        Ok(node.content[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_parents_and_listing() {
        let mut fs = MemoryFilesystem::new();
        fs.add_file("/Users/alice/NTUSER.DAT", b"regf");
        let users = fs.list_directory("/Users").unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, b"alice");
        assert_eq!(fs.open_path("Users/alice/NTUSER.DAT").unwrap().size, Some(4));
    }

    #[test]
    fn test_alias_cycle_resolves() {
        let mut fs = MemoryFilesystem::new();
        fs.add_file("/a/file.bin", b"x");
        fs.add_alias("/a/loop", "/a");
        let nested = fs.list_directory("/a/loop/loop/loop").unwrap();
        let names: Vec<_> = nested.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"file.bin".to_vec(), b"loop".to_vec()]);
    }

    #[test]
    fn test_unreadable_and_dot_entries() {
        let mut fs = MemoryFilesystem::new().with_dot_entries();
        fs.add_dir("/broken");
        fs.mark_unreadable("/broken");
        assert!(fs.list_directory("/broken").is_err());
        let root = fs.list_directory("/").unwrap();
        assert!(root[0].is_dot() && root[1].is_dot());
    }

    #[test]
    fn test_read_range_clamps() {
        let mut fs = MemoryFilesystem::new();
        fs.add_file("/f", b"abcdef");
        assert_eq!(fs.read_file_range("/f", 4, 10).unwrap(), b"ef");
        assert!(fs.read_file_range("/f", 10, 10).unwrap().is_empty());
    }
}
