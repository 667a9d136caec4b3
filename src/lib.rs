//! Reads VirtualBox VDI headers and rebuilds the parent/child snapshot hierarchy of a set of
//! disk images, e.g. after the VM configuration or VirtualBox.xml has been lost.

pub mod error;
pub mod header;
pub mod render;
pub mod scan;
pub mod tree;
mod util;

pub use error::{FailureKind, HeaderError, ScanError, TreeError, Unsupported};
pub use header::{HeaderRecord, ImageType, RawHeader, Version};
pub use scan::{FileEntry, accepted, scan, scan_file};
pub use tree::{Forest, NodeKind, TreeNode, Visit, build_forest};
