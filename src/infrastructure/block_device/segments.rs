//! Segment discovery and container metadata
//!
//! Finds the numbered segment files of an evidence container and summarizes
//! them. Families are tried in order: EWF (`.E01`), SMART (`.s01`) and split
//! raw (`.001`).

use super::segmented_image::SegmentedImage;
use crate::domain::entities::{ContainerFormat, DiskImageMetadata};
use crate::domain::repositories::BlockDeviceError;
use crate::domain::services::{ContainerError, EvidenceContainer};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Bytes read from each segment to check it is readable
const PROBE_BYTES: usize = 1024;

/// Highest index tried for two-digit families
const MAX_TWO_DIGIT_INDEX: u32 = 99;

/// Highest index tried for split raw images
const MAX_RAW_INDEX: u32 = 999;

/// Ordered segments of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSet {
    pub format: ContainerFormat,
    pub paths: Vec<PathBuf>,
}

/// Splits a segment file name into stem, family and index
pub fn parse_segment_name(file_name: &str) -> Option<(String, ContainerFormat, u32)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let bytes = ext.as_bytes();
    if stem.is_empty() || bytes.len() != 3 {
        return None;
    }

    let (format, digits) = match bytes[0] {
        b'E' | b'e' => (ContainerFormat::Ewf, &ext[1..]),
        b's' | b'S' => (ContainerFormat::Smart, &ext[1..]),
        b'0'..=b'9' => (ContainerFormat::Raw, ext),
        _ => return None,
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    (index > 0).then(|| (stem.to_string(), format, index))
}

fn max_index(format: ContainerFormat) -> u32 {
    match format {
        ContainerFormat::Raw => MAX_RAW_INDEX,
        _ => MAX_TWO_DIGIT_INDEX,
    }
}

/// Returns true when the first bytes of a segment can be read
fn is_readable(path: &Path) -> bool {
    let mut buf = [0u8; PROBE_BYTES];
    match File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(_) => true,
        Err(e) => {
            warn!("Segment {} is unreadable: {}", path.display(), e);
            false
        }
    }
}

/// Discovers the segments of a container
///
/// `source` is either a directory holding the segments or one segment file.
/// A file with a numbered extension pulls in its numbered siblings; any
/// other file is treated as a single raw image. Within a family, index 1 may
/// be missing, but the first gap after it ends the sequence. An unreadable
/// segment keeps its place so later offsets do not shift; a family whose
/// segments are all unreadable is skipped.
pub fn discover_segments(source: &Path) -> Result<SegmentSet, ContainerError> {
    let (dir, only_stem) = if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match parse_segment_name(&name) {
            Some((stem, _, _)) => (
                source
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                Some(stem),
            ),
            None => {
                debug!("Treating {} as a single raw image", source.display());
                return if is_readable(source) {
                    Ok(SegmentSet {
                        format: ContainerFormat::Raw,
                        paths: vec![source.to_path_buf()],
                    })
                } else {
                    Err(ContainerError::NoSegments(source.to_path_buf()))
                };
            }
        }
    } else {
        (source.to_path_buf(), None)
    };

    let entries = fs::read_dir(&dir).map_err(|_| ContainerError::NoSegments(dir.clone()))?;

    let mut families: BTreeMap<u8, BTreeMap<u32, Vec<PathBuf>>> = BTreeMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some((stem, format, index)) = parse_segment_name(&name) else {
            continue;
        };
        if only_stem.as_ref().is_some_and(|s| *s != stem) {
            continue;
        }
        families
            .entry(family_rank(format))
            .or_default()
            .entry(index)
            .or_default()
            .push(path);
    }

    for (rank, by_index) in families {
        let format = format_for_rank(rank);
        let mut paths = Vec::new();
        for index in 1..=max_index(format) {
            match by_index.get(&index) {
                None if index == 1 => continue,
                None => break,
                Some(found) => {
                    let mut found = found.clone();
                    found.sort();
                    paths.extend(found);
                }
            }
        }
        if paths.iter().any(|p| is_readable(p)) {
            info!("Found {} {} segment(s) in {}", paths.len(), format, dir.display());
            return Ok(SegmentSet { format, paths });
        }
    }

    Err(ContainerError::NoSegments(dir))
}

fn family_rank(format: ContainerFormat) -> u8 {
    match format {
        ContainerFormat::Ewf => 0,
        ContainerFormat::Smart => 1,
        ContainerFormat::Raw => 2,
    }
}

fn format_for_rank(rank: u8) -> ContainerFormat {
    match rank {
        0 => ContainerFormat::Ewf,
        1 => ContainerFormat::Smart,
        _ => ContainerFormat::Raw,
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

/// Summarizes segment stat data
///
/// Creation time is the earliest across segments, access and modification
/// times the latest. The first segment failing to stat is a catastrophic
/// failure; a later one ends the summary there, as it ends the stream.
pub fn collect_image_metadata(
    source: &Path,
    segments: &SegmentSet,
) -> Result<DiskImageMetadata, ContainerError> {
    let mut total_size = 0u64;
    let mut created: Option<SystemTime> = None;
    let mut accessed: Option<SystemTime> = None;
    let mut modified: Option<SystemTime> = None;

    let mut files = Vec::with_capacity(segments.paths.len());

    for (index, path) in segments.paths.iter().enumerate() {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if index == 0 => {
                return Err(ContainerError::Open {
                    path: path.clone(),
                    source: BlockDeviceError::IoError(e),
                });
            }
            Err(e) => {
                warn!("Cannot stat segment {}: {}", path.display(), e);
                break;
            }
        };
        files.push(path.display().to_string());
        total_size += meta.len();
        if let Ok(t) = meta.created() {
            created = Some(created.map_or(t, |c| c.min(t)));
        }
        if let Ok(t) = meta.accessed() {
            accessed = Some(accessed.map_or(t, |a| a.max(t)));
        }
        if let Ok(t) = meta.modified() {
            modified = Some(modified.map_or(t, |m| m.max(t)));
        }
    }

    Ok(DiskImageMetadata {
        path: source.display().to_string(),
        segment_count: files.len(),
        files,
        total_size,
        creation_time: created.map(rfc3339),
        access_time: accessed.map(rfc3339),
        modification_time: modified.map(rfc3339),
        file_format: segments.format,
    })
}

impl EvidenceContainer<SegmentedImage> {
    /// Opens a container over ordered segment files
    pub fn open(segments: &[PathBuf]) -> Result<Self, ContainerError> {
        let first = segments.first().cloned().unwrap_or_default();
        if segments.is_empty() {
            return Err(ContainerError::NoSegments(first));
        }
        let device = SegmentedImage::open(segments).map_err(|source| ContainerError::Open {
            path: first,
            source,
        })?;
        Ok(Self::from_device(device))
    }
}
