//! # Semihosting I/O Shim
//!
//! Minimal host I/O for module images running under an emulator or a
//! debug probe: one call to write a character, one to end the run with a
//! status. That is the entire surface; it exists so unit-test images can
//! report results, not to be a console.
//!
//! On an ARM bare-metal build the operations go through the semihosting
//! breakpoint trap; everywhere else they compile to no-ops so host-side
//! tests and tools can link against the same code. Disabling the `enabled`
//! feature removes the trap entirely for production images.
//!
//! [`SemihostLogger`] routes the `log` facade through the character
//! writer, and [`semihost_trace!`] bypasses the facade for early-boot
//! output.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::SemihostLogger;

/// Write one character to the host.
pub fn write_char(c: u8) {
    semihost::write_byte(c);
}

/// End the run, reporting success (zero) or failure through the
/// semihosting exit reason.
pub fn exit(code: u32) -> ! {
    semihost::exit(code)
}

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod semihost {
    use core::fmt::{self, Write};

    /// Write one character; the argument is a pointer to the byte.
    const SYS_WRITEC: usize = 0x03;
    /// End the run; the argument is a stop reason code.
    const SYS_EXIT: usize = 0x18;

    /// Application exit stop reason.
    const ADP_STOPPED_APPLICATION_EXIT: usize = 0x20026;
    /// Runtime error stop reason, reported for nonzero exit codes.
    const ADP_STOPPED_RUN_TIME_ERROR: usize = 0x20023;

    /// Raise the semihosting trap. No-op off target.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn call(op: usize, arg: usize) {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        unsafe {
            // The host writes the operation's status back into r0.
            core::arch::asm!(
                "bkpt 0xab",
                inout("r0") op => _,
                in("r1") arg,
                options(nostack)
            );
        }
        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        {
            let _ = (op, arg);
        }
    }

    /// Write a single byte to the host.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn write_byte(b: u8) {
        // SAFETY: the trap reads one byte through the pointer in r1.
        unsafe { call(SYS_WRITEC, core::ptr::from_ref(&b) as usize) }
    }

    /// End the run with `code`; zero maps to a clean application exit.
    pub fn exit(code: u32) -> ! {
        let reason = if code == 0 {
            ADP_STOPPED_APPLICATION_EXIT
        } else {
            ADP_STOPPED_RUN_TIME_ERROR
        };
        // SAFETY: SYS_EXIT takes the reason word in r1.
        unsafe { call(SYS_EXIT, reason) };
        // Off target (or if the host ignores the trap) there is nothing
        // left to do.
        loop {
            core::hint::spin_loop();
        }
    }

    /// `fmt::Write` sink over the character writer.
    pub struct SemihostSink;

    impl Write for SemihostSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                write_byte(b);
            }
            Ok(())
        }

        #[inline]
        fn write_char(&mut self, c: char) -> fmt::Result {
            // UTF-8 encode without allocation.
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            self.write_str(s)
        }
    }

    #[doc(hidden)]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn semihost_write(args: fmt::Arguments) {
        // Ignore errors; this is best-effort debug output.
        let _ = fmt::write(&mut SemihostSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod semihost {
    use core::fmt;

    #[doc(hidden)]
    pub fn semihost_write(_: fmt::Arguments) {
        // no-op when feature disabled
    }

    pub fn write_byte(_b: u8) {
        // no-op when feature disabled
    }

    pub fn exit(_code: u32) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}

#[macro_export]
macro_rules! semihost_trace {
    ($($arg:tt)*) => {{
        // No allocation: `format_args!` builds a lightweight `Arguments`.
        $crate::semihost::semihost_write(core::format_args!($($arg)*));
    }};
}
