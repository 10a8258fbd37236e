//! Region bookkeeping embedded in allocator pages.
//!
//! Every region of a page, sentinels included, starts with a
//! [`RegionHeader`]. The allocator keeps its authoritative region list
//! outside the page; the embedded copy lets `free` reject handles whose
//! header was never written or has already been cleared.

use crate::common::config::REGION_HEADER_SIZE;

/// Kind of region described by a header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Zeroed memory, no region here.
    #[default]
    Vacant = 0,
    /// Permanent region at the start of a page.
    HeadSentinel = 1,
    /// Permanent region at the end of a page.
    TailSentinel = 2,
    /// A live allocation.
    Live = 3,
}

impl RegionKind {
    /// Convert from u8, returning Vacant for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RegionKind::HeadSentinel,
            2 => RegionKind::TailSentinel,
            3 => RegionKind::Live,
            _ => RegionKind::Vacant,
        }
    }
}

/// Metadata stored in front of every region.
///
/// # Layout (16 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     kind (RegionKind as u8)
/// 1       3     reserved
/// 4       4     magic (little-endian)
/// 8       4     payload size (little-endian)
/// 12      4     start offset of this header in its page (little-endian)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    /// Kind of region.
    pub kind: RegionKind,
    /// Payload size in bytes (zero for sentinels).
    pub size: u32,
    /// Offset of the header within its page.
    pub start: u32,
}

impl RegionHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = REGION_HEADER_SIZE;

    /// Marker identifying a written header.
    pub const MAGIC: u32 = 0x5247_4E31;

    pub const OFFSET_KIND: usize = 0;
    pub const OFFSET_MAGIC: usize = 4;
    pub const OFFSET_SIZE: usize = 8;
    pub const OFFSET_START: usize = 12;

    /// Create a header.
    pub fn new(kind: RegionKind, start: usize, size: usize) -> Self {
        Self {
            kind,
            size: size as u32,
            start: start as u32,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// Returns `None` if the magic marker is missing.
    ///
    /// # Panics
    /// Panics if `data.len() < RegionHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        assert!(data.len() >= Self::SIZE, "buffer too small for RegionHeader");

        if read_u32(data, Self::OFFSET_MAGIC) != Self::MAGIC {
            return None;
        }

        Some(Self {
            kind: RegionKind::from_u8(data[Self::OFFSET_KIND]),
            size: read_u32(data, Self::OFFSET_SIZE),
            start: read_u32(data, Self::OFFSET_START),
        })
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < RegionHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for RegionHeader");

        data[..Self::SIZE].fill(0);
        data[Self::OFFSET_KIND] = self.kind as u8;
        data[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 4].copy_from_slice(&Self::MAGIC.to_le_bytes());
        data[Self::OFFSET_SIZE..Self::OFFSET_SIZE + 4].copy_from_slice(&self.size.to_le_bytes());
        data[Self::OFFSET_START..Self::OFFSET_START + 4].copy_from_slice(&self.start.to_le_bytes());
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
