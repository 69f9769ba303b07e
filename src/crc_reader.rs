//! Helper module to compute a CRC32 checksum
//!
//! Borrowed from zip-rs:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>
//! and extended to also hold the stream to a declared length.

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

use crate::result::ZipError;

/// Reader that validates the CRC32 and the byte count when it reaches EOF.
///
/// The expected values come from the archive's central directory;
/// an entry whose decompressed bytes don't match both is corrupt.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    expected_crc: u32,
    expected_size: u64,
    bytes_read: u64,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, expected_crc: u32, expected_size: u64) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            expected_crc,
            expected_size,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 && !buf.is_empty() {
            // End of the stream: both totals must match the directory.
            if self.bytes_read != self.expected_size {
                return Err(ZipError::Corrupt(format!(
                    "expected {} bytes, got {}",
                    self.expected_size, self.bytes_read
                ))
                .into_io());
            }
            let actual_crc = self.hasher.clone().finalize();
            if actual_crc != self.expected_crc {
                return Err(ZipError::Corrupt(format!(
                    "CRC-32 mismatch: expected {:#010x}, got {:#010x}",
                    self.expected_crc, actual_crc
                ))
                .into_io());
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..count]);
        self.bytes_read += count as u64;
        if self.bytes_read > self.expected_size {
            return Err(ZipError::Corrupt(format!(
                "entry is longer than the {} bytes declared",
                self.expected_size
            ))
            .into_io());
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_empty_reader() {
        let data: &[u8] = b"";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data, 0, 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        let mut reader = Crc32Reader::new(data, 1, 0);
        assert!(reader
            .read(&mut buf)
            .unwrap_err()
            .to_string()
            .contains("CRC-32 mismatch"));
    }

    #[test]
    fn test_byte_by_byte() {
        let data: &[u8] = b"1234";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data, 0x9be3e0a3, 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        // Can keep reading 0 bytes after the end
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_zero_read() {
        let data: &[u8] = b"1234";
        let mut buf = [0; 5];

        let mut reader = Crc32Reader::new(data, 0x9be3e0a3, 4);
        assert_eq!(reader.read(&mut buf[..0]).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_length_mismatch() {
        let data: &[u8] = b"1234";

        // Declared one byte short: the stream is "too long" before EOF.
        let mut reader = Crc32Reader::new(data, 0x9be3e0a3, 3);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(err.to_string().contains("longer than"));

        // Declared one byte long: EOF arrives before the count does.
        let mut reader = Crc32Reader::new(data, 0x9be3e0a3, 5);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(err.to_string().contains("expected 5 bytes"));
    }
}
