use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::ReadAt;

/// A window into another source, fixing "position zero" at a base offset.
///
/// ZIP-reading code assumes its archive starts at byte 0 of the source it
/// is given. A `.tilt` file carries a 16-byte header in front of the
/// archive, so the ZIP layer is handed a `SubReader` based just past the
/// header instead of the raw file. The same adapter scopes a stored
/// member's bytes when a caller wants to stream one without copying.
///
/// Read-only by construction: `ReadAt` has no write half, so there is
/// nothing to forbid.
pub struct SubReader {
    inner: Arc<dyn ReadAt>,
    base: u64,
    len: u64,
}

impl SubReader {
    /// Window `[base, base + len)` of `inner`. The window is clamped to
    /// the bytes the source actually has.
    pub fn new(inner: Arc<dyn ReadAt>, base: u64, len: u64) -> Self {
        let available = inner.size().saturating_sub(base);
        Self {
            inner,
            base,
            len: len.min(available),
        }
    }

    /// Window from `base` to the end of the source.
    pub fn from_offset(inner: Arc<dyn ReadAt>, base: u64) -> Self {
        let len = inner.size().saturating_sub(base);
        Self { inner, base, len }
    }
}

#[async_trait]
impl ReadAt for SubReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - offset) as usize);
        self.inner.read_at(self.base + offset, &mut buf[..n]).await
    }

    fn size(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryReader, read_all};

    #[tokio::test]
    async fn translates_and_clamps() {
        let inner = Arc::new(MemoryReader::new((0u8..32).collect()));
        let sub = SubReader::new(inner, 10, 8);
        assert_eq!(sub.size(), 8);

        let bytes = read_all(&sub).await.unwrap();
        assert_eq!(bytes, (10u8..18).collect::<Vec<_>>());

        let mut buf = [0u8; 4];
        assert_eq!(sub.read_at(8, &mut buf).await.unwrap(), 0);
        assert_eq!(sub.read_at(6, &mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], &[16, 17]);
    }

    #[tokio::test]
    async fn window_clamped_to_source() {
        let inner = Arc::new(MemoryReader::new(vec![1, 2, 3, 4]));
        let sub = SubReader::new(inner.clone(), 3, 100);
        assert_eq!(sub.size(), 1);
        let sub = SubReader::from_offset(inner, 9);
        assert_eq!(sub.size(), 0);
    }
}
