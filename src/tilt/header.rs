//! The fixed 16-byte header prefixed to the ZIP payload.
//!
//! The two-layer framing lets a container carry a fingerprint and version
//! of its own while remaining byte-for-byte a valid ZIP once the header
//! is stripped. The header also fails fast: deciding that a random file
//! is *not* a ZIP archive takes a full tail scan, while a sentinel check
//! costs one small read.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use anyhow::Result;

use crate::error::HeaderError;
use crate::io::ReadAt;

/// ASCII "tilT" read as a little-endian u32.
pub const TILT_SENTINEL: u32 = 0x546c6974;
/// ZIP local-file-header signature ("PK\x03\x04" little-endian).
pub const PKZIP_SENTINEL: u32 = 0x04034b50;

pub const HEADER_SIZE: u16 = 16;
pub const HEADER_VERSION: u16 = 1;

/// The decoded container header.
///
/// Layout, little-endian: `u32 sentinel`, `u16 headerSize`,
/// `u16 headerVersion`, two reserved `u32`s. `headerSize` may exceed 16
/// in future revisions; the extra bytes are skipped on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiltHeader {
    pub sentinel: u32,
    pub header_size: u16,
    pub header_version: u16,
    pub reserved1: u32,
    pub reserved2: u32,
}

impl Default for TiltHeader {
    fn default() -> Self {
        Self {
            sentinel: TILT_SENTINEL,
            header_size: HEADER_SIZE,
            header_version: HEADER_VERSION,
            reserved1: 0,
            reserved2: 0,
        }
    }
}

impl TiltHeader {
    /// Encode as exactly 16 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.write_u32::<LittleEndian>(self.sentinel).unwrap();
        buf.write_u16::<LittleEndian>(self.header_size).unwrap();
        buf.write_u16::<LittleEndian>(self.header_version).unwrap();
        buf.write_u32::<LittleEndian>(self.reserved1).unwrap();
        buf.write_u32::<LittleEndian>(self.reserved2).unwrap();
        buf.try_into().unwrap()
    }

    /// Decode and validate a header from the front of `data`.
    ///
    /// Checks run in order: enough bytes, sentinel, version, declared
    /// size. A declared size larger than 16 is accepted; the surplus is
    /// a forward-compatible extension area the caller skips via
    /// [`zip_offset`](Self::zip_offset).
    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < HEADER_SIZE as usize {
            return Err(HeaderError::Truncated(data.len(), HEADER_SIZE as usize));
        }

        let mut cursor = Cursor::new(data);
        let header = Self {
            sentinel: cursor.read_u32::<LittleEndian>().unwrap(),
            header_size: cursor.read_u16::<LittleEndian>().unwrap(),
            header_version: cursor.read_u16::<LittleEndian>().unwrap(),
            reserved1: cursor.read_u32::<LittleEndian>().unwrap(),
            reserved2: cursor.read_u32::<LittleEndian>().unwrap(),
        };

        if header.sentinel != TILT_SENTINEL {
            return Err(HeaderError::InvalidSentinel(header.sentinel));
        }
        if header.header_version != HEADER_VERSION {
            return Err(HeaderError::UnsupportedVersion(header.header_version));
        }
        if header.header_size < HEADER_SIZE {
            return Err(HeaderError::CorruptHeader(header.header_size));
        }
        Ok(header)
    }

    /// Offset of the embedded ZIP archive: just past the header,
    /// including any extension bytes a newer writer added.
    pub fn zip_offset(&self) -> u64 {
        self.header_size as u64
    }
}

/// Read and validate the header at the front of `source`, including the
/// check that a ZIP local-file header follows immediately. Rejects
/// non-container files before any ZIP parsing happens.
pub async fn read_validated(source: &dyn ReadAt) -> Result<TiltHeader, HeaderError> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(filled as u64, &mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => break,
        }
    }
    let header = TiltHeader::from_bytes(&buf[..filled])?;

    let mut zip_sig = [0u8; 4];
    let ok = matches!(source.read_at(header.zip_offset(), &mut zip_sig).await, Ok(4));
    if !ok || u32::from_le_bytes(zip_sig) != PKZIP_SENTINEL {
        return Err(HeaderError::MissingZipSentinel);
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    #[test]
    fn round_trips() {
        let header = TiltHeader::default();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(TiltHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn rejects_short_input() {
        for n in 0..16 {
            let buf = vec![0u8; n];
            assert!(matches!(
                TiltHeader::from_bytes(&buf),
                Err(HeaderError::Truncated(got, 16)) if got == n
            ));
        }
    }

    #[test]
    fn rejects_wrong_sentinel() {
        let mut bytes = TiltHeader::default().to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            TiltHeader::from_bytes(&bytes),
            Err(HeaderError::InvalidSentinel(_))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let header = TiltHeader {
            header_version: 9,
            ..Default::default()
        };
        assert_eq!(
            TiltHeader::from_bytes(&header.to_bytes()),
            Err(HeaderError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn rejects_undersized_header() {
        let header = TiltHeader {
            header_size: 8,
            ..Default::default()
        };
        assert_eq!(
            TiltHeader::from_bytes(&header.to_bytes()),
            Err(HeaderError::CorruptHeader(8))
        );
    }

    #[tokio::test]
    async fn oversized_header_skips_extension_bytes() {
        // header_size 20: four extension bytes between header and ZIP
        let header = TiltHeader {
            header_size: 20,
            ..Default::default()
        };
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[0xAA; 4]);
        data.extend_from_slice(&PKZIP_SENTINEL.to_le_bytes());

        let source = MemoryReader::new(data);
        let parsed = read_validated(&source).await.unwrap();
        assert_eq!(parsed.zip_offset(), 20);
    }

    #[tokio::test]
    async fn requires_zip_signature_after_header() {
        let mut data = TiltHeader::default().to_bytes().to_vec();
        data.extend_from_slice(b"not a zip");
        let source = MemoryReader::new(data);
        assert_eq!(
            read_validated(&source).await,
            Err(HeaderError::MissingZipSentinel)
        );
    }
}
