//! Block device implementations

mod probe;
mod segmented_image;
mod segments;

pub use probe::{detect_filesystem, probe_filesystem};
pub use segmented_image::SegmentedImage;
pub use segments::{SegmentSet, collect_image_metadata, discover_segments, parse_segment_name};
