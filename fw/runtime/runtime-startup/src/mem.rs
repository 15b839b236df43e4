//! Writable-memory initialization.
//!
//! The reset path copies the image's initialized-data payload from
//! read-only storage into working memory and zero-fills the bss span
//! before any application code runs. Both walks are word-at-a-time with a
//! byte tail, so an exact byte length is honored and nothing outside
//! `[dst, dst + len)` is ever touched.

/// One initialized-data region descriptor, emitted by the linker script.
#[repr(C)]
pub struct DataRegion {
    /// Load address of the payload in read-only storage.
    pub load: *const u8,
    /// Run address in writable memory.
    pub store: *mut u8,
    /// Payload length in bytes.
    pub len: usize,
}

/// One zero-initialized region descriptor, emitted by the linker script.
#[repr(C)]
pub struct BssRegion {
    pub store: *mut u8,
    pub len: usize,
}

// SAFETY: the descriptors are immutable linker-emitted data; the spans
// they point at are only touched during the one-shot reset walk.
unsafe impl Sync for DataRegion {}
// SAFETY: as above.
unsafe impl Sync for BssRegion {}

/// Copy exactly `len` bytes from `load` to `store`, word-at-a-time with a
/// byte tail.
///
/// # Safety
///
/// `load` must be readable and `store` writable for `len` bytes, and the
/// two spans must not overlap.
pub unsafe fn copy_region(load: *const u8, store: *mut u8, len: usize) {
    const WORD: usize = size_of::<usize>();
    let words = len / WORD;

    let src = load.cast::<usize>();
    let dst = store.cast::<usize>();
    let mut i = 0;
    while i < words {
        // SAFETY: i * WORD < len, within both spans; unaligned reads keep
        // this correct for any region placement.
        unsafe { dst.add(i).write_unaligned(src.add(i).read_unaligned()) };
        i += 1;
    }

    let mut b = words * WORD;
    while b < len {
        // SAFETY: b < len.
        unsafe { store.add(b).write(load.add(b).read()) };
        b += 1;
    }
}

/// Zero exactly `len` bytes starting at `store`.
///
/// # Safety
///
/// `store` must be writable for `len` bytes.
pub unsafe fn zero_region(store: *mut u8, len: usize) {
    const WORD: usize = size_of::<usize>();
    let words = len / WORD;

    let dst = store.cast::<usize>();
    let mut i = 0;
    while i < words {
        // SAFETY: within the span, as in `copy_region`.
        unsafe { dst.add(i).write_unaligned(0) };
        i += 1;
    }

    let mut b = words * WORD;
    while b < len {
        // SAFETY: b < len.
        unsafe { store.add(b).write(0) };
        b += 1;
    }
}

/// Initialize one data region from its descriptor.
///
/// # Safety
///
/// The descriptor must describe valid, non-overlapping spans; see
/// [`copy_region`].
pub unsafe fn init_data(region: &DataRegion) {
    unsafe { copy_region(region.load, region.store, region.len) };
}

/// Initialize one bss region from its descriptor.
///
/// # Safety
///
/// The descriptor must describe a valid writable span; see
/// [`zero_region`].
pub unsafe fn init_bss(region: &BssRegion) {
    unsafe { zero_region(region.store, region.len) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_exact_byte_lengths() {
        // Including lengths that are not word multiples.
        for len in [0usize, 1, 3, 4, 7, 8, 13, 64] {
            let src: Vec<u8> = (0..len as u8).collect();
            let mut dst = vec![0u8; len];
            unsafe { copy_region(src.as_ptr(), dst.as_mut_ptr(), len) };
            assert_eq!(dst, src, "len {len}");
        }
    }

    #[test]
    fn copy_never_writes_past_the_length() {
        let src = [0xAAu8; 16];
        let mut dst = [0x55u8; 24];
        unsafe { copy_region(src.as_ptr(), dst.as_mut_ptr(), 13) };
        assert_eq!(&dst[..13], &src[..13]);
        // Canary bytes beyond len untouched.
        assert!(dst[13..].iter().all(|&b| b == 0x55));
    }

    #[test]
    fn zero_fills_exact_byte_lengths() {
        let mut buf = [0xFFu8; 24];
        unsafe { zero_region(buf.as_mut_ptr(), 11) };
        assert!(buf[..11].iter().all(|&b| b == 0));
        assert!(buf[11..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn descriptors_drive_the_walks() {
        let payload = [1u8, 2, 3, 4, 5];
        let mut ram = [0xEEu8; 8];
        let data = DataRegion {
            load: payload.as_ptr(),
            store: ram.as_mut_ptr(),
            len: payload.len(),
        };
        unsafe { init_data(&data) };
        assert_eq!(&ram[..5], &payload);
        assert_eq!(&ram[5..], &[0xEE; 3]);

        let mut bss = [0x77u8; 6];
        let region = BssRegion {
            store: bss.as_mut_ptr(),
            len: 6,
        };
        unsafe { init_bss(&region) };
        assert_eq!(bss, [0u8; 6]);
    }
}
