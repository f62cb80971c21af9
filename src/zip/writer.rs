//! Minimal ZIP archive writer.
//!
//! Members are written STORED (compression level 0). Sketch payloads are
//! already-compressed PNG and packed binary, so deflate buys little, and
//! stored members keep the container extractable by the wider ecosystem
//! of unzip tools. ZIP64 is not emitted for the same reason.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use anyhow::{Result, bail};

use super::structures::{CDFH_SIGNATURE, EndOfCentralDirectory, LFH_SIGNATURE};

// "version made by" / "version needed": 2.0, plain deflate-era ZIP.
const VERSION_MADE_BY: u16 = 20;
const VERSION_NEEDED: u16 = 20;

// DOS timestamp 1980-01-01 00:00:00; member times carry no meaning for
// sketch containers and a fixed value keeps output deterministic.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = 0x21;

struct MemberRecord {
    name: String,
    crc32: u32,
    size: u64,
    lfh_offset: u64,
}

/// Streaming writer for a stored-member ZIP archive.
///
/// Offsets are tracked relative to the first byte this writer emits, so
/// the archive is internally consistent no matter what (for instance a
/// container header) was written to `out` beforehand.
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    members: Vec<MemberRecord>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            members: Vec::new(),
        }
    }

    /// Append one member with the given contents.
    pub fn write_member(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if data.len() as u64 > u32::MAX as u64 {
            bail!("member {} too large for a non-ZIP64 archive", name);
        }
        if name.len() > u16::MAX as usize {
            bail!("member name too long");
        }
        // Every LFH offset and the central directory offset are written
        // as u32, so the cumulative payload must stay addressable too.
        let record_len = 30 + name.len() as u64 + data.len() as u64;
        if !fits_without_zip64(self.offset, record_len) {
            bail!(
                "member {} would push the archive past the non-ZIP64 limit",
                name
            );
        }

        let mut crc = flate2::Crc::new();
        crc.update(data);
        let crc32 = crc.sum();

        let lfh_offset = self.offset;

        // Local File Header
        self.out.write_all(LFH_SIGNATURE)?;
        self.out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        self.out.write_u16::<LittleEndian>(0)?; // flags
        self.out.write_u16::<LittleEndian>(0)?; // method: stored
        self.out.write_u16::<LittleEndian>(DOS_TIME)?;
        self.out.write_u16::<LittleEndian>(DOS_DATE)?;
        self.out.write_u32::<LittleEndian>(crc32)?;
        self.out.write_u32::<LittleEndian>(data.len() as u32)?; // compressed
        self.out.write_u32::<LittleEndian>(data.len() as u32)?; // uncompressed
        self.out.write_u16::<LittleEndian>(name.len() as u16)?;
        self.out.write_u16::<LittleEndian>(0)?; // extra field
        self.out.write_all(name.as_bytes())?;
        self.out.write_all(data)?;

        self.offset += 30 + name.len() as u64 + data.len() as u64;

        self.members.push(MemberRecord {
            name: name.to_string(),
            crc32,
            size: data.len() as u64,
            lfh_offset,
        });
        Ok(())
    }

    /// Write the Central Directory and EOCD, then flush.
    pub fn finish(mut self) -> Result<W> {
        let cd_offset = self.offset;

        for member in &self.members {
            self.out.write_all(CDFH_SIGNATURE)?;
            self.out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
            self.out.write_u16::<LittleEndian>(VERSION_NEEDED)?;
            self.out.write_u16::<LittleEndian>(0)?; // flags
            self.out.write_u16::<LittleEndian>(0)?; // method: stored
            self.out.write_u16::<LittleEndian>(DOS_TIME)?;
            self.out.write_u16::<LittleEndian>(DOS_DATE)?;
            self.out.write_u32::<LittleEndian>(member.crc32)?;
            self.out.write_u32::<LittleEndian>(member.size as u32)?;
            self.out.write_u32::<LittleEndian>(member.size as u32)?;
            self.out
                .write_u16::<LittleEndian>(member.name.len() as u16)?;
            self.out.write_u16::<LittleEndian>(0)?; // extra field
            self.out.write_u16::<LittleEndian>(0)?; // comment
            self.out.write_u16::<LittleEndian>(0)?; // disk number start
            self.out.write_u16::<LittleEndian>(0)?; // internal attrs
            self.out.write_u32::<LittleEndian>(0)?; // external attrs
            self.out
                .write_u32::<LittleEndian>(member.lfh_offset as u32)?;
            self.out.write_all(member.name.as_bytes())?;

            self.offset += 46 + member.name.len() as u64;
        }

        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: self.members.len() as u16,
            total_entries: self.members.len() as u16,
            cd_size: (self.offset - cd_offset) as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        };
        self.out.write_all(&eocd.to_bytes()?)?;
        self.out.flush()?;

        Ok(self.out)
    }
}

/// Whether a record appended at `offset` keeps every offset field of the
/// archive within u32 range.
fn fits_without_zip64(offset: u64, record_len: u64) -> bool {
    offset + record_len <= u32::MAX as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryReader, ReadAt};
    use crate::zip::{CompressionMethod, ZipParser};
    use std::sync::Arc;

    #[test]
    fn cumulative_offset_is_guarded_against_truncation() {
        assert!(fits_without_zip64(0, 30 + 10 + 100));
        assert!(fits_without_zip64(u32::MAX as u64 - 200, 200));
        assert!(!fits_without_zip64(u32::MAX as u64 - 100, 101));

        // Two members that each pass the per-member size check still
        // cannot land in one archive once their combined payload pushes
        // the central directory offset past u32.
        let record = 30 + 7 + (u32::MAX as u64 / 2);
        assert!(fits_without_zip64(0, record));
        assert!(!fits_without_zip64(record, record));
    }

    #[tokio::test]
    async fn written_archive_parses_back() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.write_member("metadata.json", br#"{"a":1}"#).unwrap();
        writer.write_member("data.sketch", &[7u8; 17]).unwrap();
        let bytes = writer.finish().unwrap();

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let entries = parser.list_files().await.unwrap();
        assert_eq!(entries.len(), 2);

        let sketch = entries.iter().find(|e| e.file_name == "data.sketch").unwrap();
        assert_eq!(sketch.compression_method, CompressionMethod::Stored);
        assert_eq!(sketch.uncompressed_size, 17);

        let offset = parser.get_data_offset(sketch).await.unwrap();
        let mut buf = vec![0u8; 17];
        parser.reader().read_at(offset, &mut buf).await.unwrap();
        assert_eq!(buf, vec![7u8; 17]);
    }

    #[tokio::test]
    async fn empty_archive_has_valid_eocd() {
        let writer = ZipWriter::new(Vec::new());
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        assert!(parser.list_files().await.unwrap().is_empty());
    }
}
