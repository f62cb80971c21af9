mod http;
mod local;
mod offset;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use offset::SubReader;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// In-memory source, mostly useful for tests and for payloads that were
/// already fetched in one piece.
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Read the entire source into memory.
pub async fn read_all(reader: &dyn ReadAt) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; reader.size() as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read_at(filled as u64, &mut buf[filled..]).await?;
        if n == 0 {
            anyhow::bail!("source ended early at {} of {} bytes", filled, buf.len());
        }
        filled += n;
    }
    Ok(buf)
}
