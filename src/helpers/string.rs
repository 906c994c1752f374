//! Little-endian integer and float decoding for the binary readers.
//!
//! Every function reads from the start of the slice. Callers pass slices of
//! at least the decoded width; missing trailing bytes read as zero.

/// Copies up to `N` leading bytes into a zero-filled array.
#[inline]
fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    let length = bytes.len().min(N);
    array[..length].copy_from_slice(&bytes[..length]);
    array
}

#[inline]
pub(crate) fn to_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(to_array(bytes))
}

#[inline]
pub(crate) fn to_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(to_array(bytes))
}

#[inline]
pub(crate) fn to_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(to_array(bytes))
}

#[inline]
pub(crate) fn to_f64(bytes: &[u8]) -> f64 {
    f64::from_le_bytes(to_array(bytes))
}

/// Reads a 32-bit unsigned integer as usize.
#[inline]
pub(crate) fn to_usize(bytes: &[u8]) -> usize {
    to_u32(bytes) as usize
}

/// Splits bytes into 32-bit little-endian values; a trailing partial value is dropped.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(to_usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_values() {
        assert_eq!(to_u16(&[0x34, 0x12, 0xFF]), 0x1234);
        assert_eq!(to_u32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(to_u64(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]), 0xE11A_B1A1_E011_CFD0);
        assert_eq!(to_f64(&19.5f64.to_le_bytes()), 19.5);
        assert_eq!(to_usize(&[1, 0]), 1);
        assert_eq!(to_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0, 3]).collect::<Vec<_>>(), vec![1, 2]);
    }
}
