//! Whole-file content checksums.
//!
//! Files are identified by a 128-bit XXH3 digest rendered as lowercase hex.
//! The digest is content identity only; it offers no tamper resistance, which
//! keeps hashing of multi-gigabyte game files disk-bound rather than CPU-bound.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

use crate::error::{SyncError, SyncResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the checksum of a file by streaming its contents.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn calculate_file_checksum(path: &Path) -> SyncResult<String> {
    let mut file = File::open(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SyncError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

/// Calculate the checksum of an in-memory buffer.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(data);
    format!("{:032x}", hasher.digest128())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_is_hex_128_bit() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        File::create(&file_path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let checksum = calculate_file_checksum(&file_path).unwrap();

        assert_eq!(checksum.len(), 32);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(checksum, checksum.to_lowercase());
    }

    #[test]
    fn test_file_and_buffer_checksums_agree() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");

        // Larger than the read buffer so several updates are streamed
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        File::create(&file_path).unwrap().write_all(&data).unwrap();

        assert_eq!(
            calculate_file_checksum(&file_path).unwrap(),
            checksum_bytes(&data)
        );
    }

    #[test]
    fn test_single_byte_change_changes_checksum() {
        let mut data = vec![0xABu8; 100_000];
        let before = checksum_bytes(&data);
        data[54_321] ^= 0x01;
        assert_ne!(before, checksum_bytes(&data));
    }

    #[test]
    fn test_empty_file_checksum() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        File::create(&file_path).unwrap();

        assert_eq!(
            calculate_file_checksum(&file_path).unwrap(),
            checksum_bytes(&[])
        );
    }

    #[test]
    fn test_calculate_nonexistent_file() {
        let result = calculate_file_checksum(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(SyncError::ReadFailed { .. })));
    }
}
