use std::fmt;

use bytemuck::{Pod, Zeroable};
use positioned_io2::ReadAt;
use uuid::Uuid;

use crate::error::{HeaderError, ScanError, Unsupported};
use crate::util::ReadAtExt;

/// Text tag at the start of every image we accept. The rest of the 64 byte text field is padding.
pub const MAGIC: &[u8; 33] = b"<<< Sun VirtualBox Disk Image >>>";

/// On-disk layout of the pre-header and the version 1.1 header, 472 bytes in total.
///
/// UUIDs are stored exactly as they appear in the file, i.e. with the first three fields in
/// little-endian order. Use [`HeaderRecord`] for decoded values.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawHeader {
    pub text: [u8; 0x40],
    pub signature: u32,
    pub version_minor: u16,
    pub version_major: u16,
    pub header_size: u32,
    pub image_type: u32,
    pub image_flags: u32,
    pub description: [u8; 0x100],
    pub block_offsets_offset: u32,
    pub data_offset: u32,
    pub cylinders: u32, // legacy geometry, must be zero
    pub heads: u32,     // legacy geometry, must be zero
    pub sectors: u32,   // legacy geometry, must be zero
    pub sector_size: u32,
    pub unused1: u32,
    pub disk_size: i64,
    pub block_size: u32,
    pub block_extra: u32,
    pub blocks_in_image: u32,
    pub blocks_allocated: u32,
    pub uuid_image: Uuid,
    pub uuid_last_snap: Uuid,
    pub uuid_parent: Uuid,
    pub uuid_parent_modify: Uuid, // ignored
    pub lchs_geometry: [u32; 4],  // ignored
}

const _: () = assert!(std::mem::size_of::<RawHeader>() == RawHeader::SIZE);

impl RawHeader {
    pub const SIZE: usize = 0x48 + Self::HEADER_SIZE as usize;
    /// Bytes up to and including the parent UUID. The parent-modification UUID and logical
    /// geometry after it are optional.
    pub const MIN_SIZE: usize = 440;
    pub const SIGNATURE: u32 = 0xBEDA107F;
    pub const HEADER_SIZE: u32 = 0x190;
    pub const SECTOR_SIZE: u32 = 512;

    /// Structural checks, in the order the fields appear on disk.
    pub fn validate(&self) -> Result<(), HeaderError> {
        if &self.text[..MAGIC.len()] != MAGIC {
            return Err(HeaderError::NotVdi);
        }
        if self.signature != Self::SIGNATURE {
            return Err(HeaderError::InvalidSignature(self.signature));
        }
        if self.header_size != Self::HEADER_SIZE {
            return Err(HeaderError::UnexpectedHeaderSize(self.header_size));
        }
        if self.cylinders != 0 || self.heads != 0 || self.sectors != 0 {
            return Err(HeaderError::UnexpectedGeometry {
                cylinders: self.cylinders,
                heads: self.heads,
                sectors: self.sectors,
            });
        }
        if self.sector_size != Self::SECTOR_SIZE {
            return Err(HeaderError::UnexpectedSectorSize(self.sector_size));
        }
        if self.block_extra != 0 {
            return Err(HeaderError::UnexpectedBlockExtra(self.block_extra));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const SUPPORTED: Version = Version { major: 1, minor: 1 };
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Dynamic,
    Fixed,
    Differential,
    Other(u32),
}

impl ImageType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ImageType::Dynamic,
            2 => ImageType::Fixed,
            4 => ImageType::Differential,
            other => ImageType::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            ImageType::Dynamic => 1,
            ImageType::Fixed => 2,
            ImageType::Differential => 4,
            ImageType::Other(code) => code,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, ImageType::Other(_))
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageType::Dynamic => f.write_str("Dynamic"),
            ImageType::Fixed => f.write_str("Fixed"),
            ImageType::Differential => f.write_str("Differential"),
            ImageType::Other(code) => write!(f, "Unknown ({code})"),
        }
    }
}

/// Decoded header of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub version: Version,
    pub image_type: ImageType,
    /// Passed through uninterpreted.
    pub flags: u32,
    pub disk_size: i64,
    pub block_size: u32,
    pub total_blocks: u32,
    pub allocated_blocks: u32,
    pub uuid: Option<Uuid>,
    pub snapshot_uuid: Option<Uuid>,
    pub parent_uuid: Option<Uuid>,
}

impl HeaderRecord {
    /// Parses a header from the first bytes of an image. Bytes past the header are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(HeaderError::NotVdi);
        }
        if data.len() < RawHeader::MIN_SIZE {
            return Err(HeaderError::Truncated { len: data.len() });
        }

        let mut buf = [0u8; RawHeader::SIZE];
        let len = data.len().min(RawHeader::SIZE);
        buf[..len].copy_from_slice(&data[..len]);
        let raw: RawHeader = bytemuck::pod_read_unaligned(&buf);
        raw.validate()?;
        Ok(Self::from_raw(&raw))
    }

    pub fn read<R: ReadAt + ?Sized>(reader: &R) -> Result<Self, ScanError> {
        let mut buf = [0u8; RawHeader::SIZE];
        let n = reader.read_up_to_at(0, &mut buf)?;
        Ok(Self::parse(&buf[..n])?)
    }

    /// Decodes an already validated raw header.
    pub fn from_raw(raw: &RawHeader) -> Self {
        Self {
            version: Version {
                major: raw.version_major,
                minor: raw.version_minor,
            },
            image_type: ImageType::from_code(raw.image_type),
            flags: raw.image_flags,
            disk_size: raw.disk_size,
            block_size: raw.block_size,
            total_blocks: raw.blocks_in_image,
            allocated_blocks: raw.blocks_allocated,
            uuid: decode_uuid(raw.uuid_image),
            snapshot_uuid: decode_uuid(raw.uuid_last_snap),
            parent_uuid: decode_uuid(raw.uuid_parent),
        }
    }

    /// Builds a structurally valid raw header carrying this record. Fields the record does not
    /// keep (description, offsets, trailing UUID and geometry) are zero.
    pub fn to_raw(&self) -> RawHeader {
        let mut raw = RawHeader::zeroed();
        raw.text[..MAGIC.len()].copy_from_slice(MAGIC);
        raw.signature = RawHeader::SIGNATURE;
        raw.version_minor = self.version.minor;
        raw.version_major = self.version.major;
        raw.header_size = RawHeader::HEADER_SIZE;
        raw.image_type = self.image_type.code();
        raw.image_flags = self.flags;
        raw.sector_size = RawHeader::SECTOR_SIZE;
        raw.disk_size = self.disk_size;
        raw.block_size = self.block_size;
        raw.blocks_in_image = self.total_blocks;
        raw.blocks_allocated = self.allocated_blocks;
        raw.uuid_image = encode_uuid(self.uuid);
        raw.uuid_last_snap = encode_uuid(self.snapshot_uuid);
        raw.uuid_parent = encode_uuid(self.parent_uuid);
        raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(&self.to_raw()).to_vec()
    }

    /// The acceptance checks applied before an image takes part in tree construction.
    pub fn check_supported(&self) -> Result<(), Unsupported> {
        if self.version != Version::SUPPORTED {
            return Err(Unsupported::Version(self.version));
        }
        if !self.image_type.is_supported() {
            return Err(Unsupported::ImageType(self.image_type.code()));
        }
        Ok(())
    }
}

// Only the first three GUID fields are stored little-endian, which is exactly what
// `from_bytes_le`/`to_bytes_le` flip.
fn decode_uuid(stored: Uuid) -> Option<Uuid> {
    let uuid = Uuid::from_bytes_le(*stored.as_bytes());
    (!uuid.is_nil()).then_some(uuid)
}

fn encode_uuid(uuid: Option<Uuid>) -> Uuid {
    uuid.map_or(Uuid::nil(), |u| Uuid::from_bytes(u.to_bytes_le()))
}
