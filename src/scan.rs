//! Reading the headers of a batch of files.
//!
//! Every path produces a [`FileEntry`]; a file that can't be used is logged and kept with its
//! failure so the rest of the batch is unaffected.

use std::path::{Path, PathBuf};

use crate::error::ScanError;
use crate::header::HeaderRecord;

#[derive(Debug)]
pub struct FileEntry {
    pub path: PathBuf,
    pub outcome: Result<HeaderRecord, ScanError>,
}

impl FileEntry {
    pub fn header(&self) -> Option<&HeaderRecord> {
        self.outcome.as_ref().ok()
    }
}

/// Reads and checks the header of a single file.
pub fn scan_file(path: impl AsRef<Path>) -> FileEntry {
    let path = path.as_ref();
    let outcome = read_checked(path);
    match &outcome {
        Ok(header) => tracing::debug!(
            "{}: version {}, {} image, uuid {:?}, parent {:?}",
            path.display(),
            header.version,
            header.image_type,
            header.uuid,
            header.parent_uuid
        ),
        Err(e) => tracing::error!("{}: {}", path.display(), e),
    }

    FileEntry {
        path: path.to_path_buf(),
        outcome,
    }
}

fn read_checked(path: &Path) -> Result<HeaderRecord, ScanError> {
    if path.is_dir() {
        return Err(ScanError::IsDirectory);
    }

    let file = std::fs::File::open(path)?;
    let header = HeaderRecord::read(&file)?;
    header.check_supported()?;
    Ok(header)
}

/// Scans every path in order.
pub fn scan<I, P>(paths: I) -> Vec<FileEntry>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths.into_iter().map(scan_file).collect()
}

/// The entries that passed every check, in input order.
pub fn accepted(entries: &[FileEntry]) -> Vec<(PathBuf, HeaderRecord)> {
    entries
        .iter()
        .filter_map(|entry| entry.header().map(|header| (entry.path.clone(), *header)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, HeaderError};
    use crate::header::{ImageType, Version};
    use std::io::Write;

    fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    fn record() -> HeaderRecord {
        HeaderRecord {
            version: Version::SUPPORTED,
            image_type: ImageType::Dynamic,
            flags: 0,
            disk_size: 1 << 30,
            block_size: 1 << 20,
            total_blocks: 1024,
            allocated_blocks: 3,
            uuid: Some(uuid::Uuid::from_u128(1)),
            snapshot_uuid: None,
            parent_uuid: None,
        }
    }

    #[test]
    fn directory_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let entry = scan_file(dir.path());
        let err = entry.outcome.unwrap_err();
        assert!(matches!(err, ScanError::IsDirectory));
        assert_eq!(err.kind(), FailureKind::Io);
    }

    #[test]
    fn missing_file_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let entry = scan_file(dir.path().join("nope.vdi"));
        assert_eq!(entry.outcome.unwrap_err().kind(), FailureKind::Io);
    }

    #[test]
    fn classifies_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_image(dir.path(), "good.vdi", &record().to_bytes());
        let junk = write_image(dir.path(), "junk.vdi", b"definitely not a disk image");
        let mut old = record();
        old.version = Version { major: 1, minor: 0 };
        let old = write_image(dir.path(), "old.vdi", &old.to_bytes());

        let entries = scan([&good, &junk, &old]);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].header(), Some(&record()));

        let junk_err = entries[1].outcome.as_ref().unwrap_err();
        assert_eq!(junk_err.kind(), FailureKind::Structural);
        assert!(matches!(junk_err, ScanError::Invalid(HeaderError::NotVdi)));

        let old_err = entries[2].outcome.as_ref().unwrap_err();
        assert_eq!(old_err.kind(), FailureKind::Unsupported);

        assert_eq!(accepted(&entries), vec![(good, record())]);
    }
}
