//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is an involution: applying the same key twice restores the input.

/// Byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time masking for larger payloads.
///
/// Produces exactly the same output as [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    // Remainder starts on a 4-byte boundary, so the key index restarts at 0.
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_example() {
        // RFC 6455 Section 5.7: masked "Hello"
        let mut data = *b"Hello";
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_mask_is_involution() {
        let original: Vec<u8> = (0..=255).collect();
        let mut data = original.clone();
        apply_mask_fast(&mut data, [1, 2, 3, 4]);
        assert_ne!(data, original);
        apply_mask_fast(&mut data, [1, 2, 3, 4]);
        assert_eq!(data, original);
    }

    #[test]
    fn test_fast_matches_scalar() {
        let mask = [0xde, 0xad, 0xbe, 0xef];
        for len in [0, 1, 3, 4, 5, 7, 8, 63, 64, 65, 1000] {
            let mut a: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut b = a.clone();
            apply_mask(&mut a, mask);
            apply_mask_fast(&mut b, mask);
            assert_eq!(a, b, "length {len}");
        }
    }
}
