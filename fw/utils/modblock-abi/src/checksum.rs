//! Firmware image checksum.
//!
//! CRC-32 with polynomial `0x04C11DB7`, initial value `0xFFFFFFFF`, no
//! input/output reflection and no final XOR (the MPEG-2 parameterization).
//! The build pipeline and the on-device verifier must agree on these
//! parameters; both sides use this module.

use crc::{CRC_32_MPEG_2, Crc};

/// The image CRC algorithm shared by the patch tool and the target.
pub const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Checksum an entire image, skipping the 4-byte checksum field itself.
///
/// `checksum_offset` is the byte offset of the block's checksum field
/// within `image`. Every other byte of the image participates, so the
/// stored value stays correct only as long as the rest of the image does.
///
/// # Panics
///
/// Panics if `checksum_offset + 4` lies beyond the end of `image`; callers
/// obtain the offset from a successfully parsed block, which guarantees it
/// is in bounds.
#[must_use]
pub fn image_checksum(image: &[u8], checksum_offset: usize) -> u32 {
    assert!(checksum_offset + 4 <= image.len());
    let mut digest = IMAGE_CRC.digest();
    digest.update(&image[..checksum_offset]);
    digest.update(&image[checksum_offset + 4..]);
    digest.finalize()
}
