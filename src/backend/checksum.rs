//! CRC32 frame checksums
//!
//! - Every frame read validates its checksum
//! - A mismatch in a complete frame is corruption
//!
//! CRC32 (IEEE polynomial).

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_single_bit_flip() {
        let mut data = b"revision record".to_vec();
        let original = compute_checksum(&data);
        data[3] ^= 0x01;
        assert!(!verify_checksum(&data, original));
    }

    #[test]
    fn test_verify_checksum() {
        let data = b"branch record";
        let checksum = compute_checksum(data);
        assert!(verify_checksum(data, checksum));
        assert!(!verify_checksum(data, checksum ^ 1));
    }
}
