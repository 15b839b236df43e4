//! # Boot Bring-Up
//!
//! Everything that must run before a module's metadata is meaningful: the
//! interrupt vector table at the lowest image address, and the reset path
//! that initializes writable memory and hands control to the application.
//!
//! The boot sequence is strictly `power-on → vector fetch → reset entry →
//! data init → bss init → application entry`, with interrupts implicitly
//! masked until the application enables them. There is no recovery path in
//! here: faults land in the shared default handler's halt loop and the
//! watchdog (or a debugger) takes it from there.
//!
//! ## Linker contract
//!
//! The target build provides three symbols:
//!
//! - `__data_region`: a [`DataRegion`] descriptor (load, store, length),
//! - `__bss_region`: a [`BssRegion`] descriptor (store, length),
//! - `module_main`: the application entry point.
//!
//! The reset walk reads exactly one descriptor of each kind; targets with
//! several discontiguous RAM banks are not catered for.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod mem;
pub mod vector;

pub use mem::{BssRegion, DataRegion, copy_region, init_bss, init_data, zero_region};
pub use vector::{
    CHECKSUM_SLOT, Exception, Handler, IRQ_COUNT, Interrupt, RESERVED_IRQ_SLOTS,
    RESERVED_SYSTEM_SLOTS, VECTOR_COUNT, Vector, VectorTable, default_handler,
};

/// Linker section the vector table is placed in; it must land at the
/// lowest image address.
pub const VECTOR_SECTION: &str = ".isr_vector";

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod entry {
    use crate::mem::{BssRegion, DataRegion, init_bss, init_data};
    use core::hint::spin_loop;

    unsafe extern "C" {
        static __data_region: DataRegion;
        static __bss_region: BssRegion;
        fn module_main();
    }

    /// Reset entry point; slot 1 of the vector table.
    ///
    /// Runs once, uninterrupted, before any application code: copies the
    /// initialized-data payload into RAM, zeroes bss, then calls the
    /// application. A returning application has nothing left to do, so the
    /// core parks in a halt loop for the watchdog to find.
    ///
    /// # Safety
    ///
    /// Only the processor may call this, through slot 1 of the vector
    /// table, with the linker-provided region descriptors in place.
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn reset_handler() {
        // SAFETY: the linker script guarantees the descriptors describe
        // the image's single data and bss regions.
        unsafe {
            init_data(&__data_region);
            init_bss(&__bss_region);
            module_main();
        }
        loop {
            spin_loop();
        }
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use entry::reset_handler;
