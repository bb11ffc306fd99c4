//! Raw flash images.
//!
//! A [`FlashImage`] is an immutable byte buffer destined for flash. It is
//! only ever consumed in sector-sized windows; the final partial window is
//! padded on demand with a caller-chosen byte.

use {
    crate::{error::Result, target::FLASH_SECTOR_ERASE_SIZE},
    log::debug,
    std::{fs, path::Path},
};

const SECTOR: usize = FLASH_SECTOR_ERASE_SIZE as usize;

/// An image to be programmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlashImage {
    data: Vec<u8>,
}

impl FlashImage {
    /// Wrap a byte buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Load an image from a raw binary file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        debug!(
            "Loaded {} bytes from {}",
            data.len(),
            path.as_ref().display()
        );
        Ok(Self { data })
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the image is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of sectors the image occupies, `ceil(len / 4096)`.
    pub fn sector_count(&self) -> usize {
        self.data.len().div_ceil(SECTOR)
    }

    /// Length rounded up to whole sectors.
    pub fn padded_len(&self) -> usize {
        self.sector_count() * SECTOR
    }

    /// Sector `index` as a full 4096-byte buffer, tail filled with `pad`.
    pub fn sector(&self, index: usize, pad: u8) -> Option<Vec<u8>> {
        let start = index.checked_mul(SECTOR)?;
        if start >= self.data.len() {
            return None;
        }
        let end = (start + SECTOR).min(self.data.len());

        let mut buf = vec![pad; SECTOR];
        buf[..end - start].copy_from_slice(&self.data[start..end]);
        Some(buf)
    }

    /// The whole image padded with `pad` to a sector boundary.
    pub fn padded(&self, pad: u8) -> Vec<u8> {
        let mut buf = self.data.clone();
        buf.resize(self.padded_len(), pad);
        buf
    }
}

impl From<Vec<u8>> for FlashImage {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for FlashImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
