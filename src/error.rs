use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::header::Version;

/// Structural problems with a header. The file is not a usable VDI image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("not a vdi file")]
    NotVdi,
    #[error("header truncated after {len} bytes")]
    Truncated { len: usize },
    #[error("invalid signature {0:#010x}")]
    InvalidSignature(u32),
    #[error("unexpected header size {0:#x}")]
    UnexpectedHeaderSize(u32),
    #[error("unexpected geometry {cylinders}/{heads}/{sectors}")]
    UnexpectedGeometry {
        cylinders: u32,
        heads: u32,
        sectors: u32,
    },
    #[error("unexpected sector size {0}")]
    UnexpectedSectorSize(u32),
    #[error("unexpected block extra data size {0}")]
    UnexpectedBlockExtra(u32),
}

/// The header parsed, but describes an image we don't handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {
    #[error("only version 1.1 is supported, this is {0}")]
    Version(Version),
    #[error("unsupported image type {0}")]
    ImageType(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Structural,
    Unsupported,
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("is a directory")]
    IsDirectory,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Invalid(#[from] HeaderError),
    #[error(transparent)]
    Unsupported(#[from] Unsupported),
}

impl ScanError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScanError::IsDirectory | ScanError::Io(_) => FailureKind::Io,
            ScanError::Invalid(_) => FailureKind::Structural,
            ScanError::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("{}: uuid {uuid} is already used by {}", second.display(), first.display())]
    DuplicateUuid {
        uuid: Uuid,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("{}: cyclic parent reference through {uuid}", path.display())]
    CyclicParent { uuid: Uuid, path: PathBuf },
}
