//! # Config Variable Storage
//!
//! In-firmware storage for the variables a module's config table
//! describes. Two shapes exist:
//!
//! - scalars, stored raw behind a [`ConfigCell`];
//! - arrays, stored as the length-prefixed [`ArrayVar`] record
//!   `{length, reserved, data}` whose capacity is fixed at build time.
//!
//! Placement expresses storage class, not type: required variables go into
//! the zero-initialized region, optional variables into the region whose
//! compiled-in contents are their defaults. The [`required_config!`] and
//! [`optional_config!`] macros emit the section attributes on the real
//! target; [`Region`] is the same classification as a value, for layout
//! passes that cannot use linker sections.
//!
//! The map describing these variables is immutable after link; the values
//! themselves are written in place by application or RPC code. Serializing
//! those accesses across interrupt and main-line context is the RPC
//! layer's obligation, not this crate's; accesses here are volatile,
//! nothing more.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::ptr;

pub use modblock_abi::Region;

/// A config variable slot written in place, possibly from interrupt
/// context.
///
/// Reads and writes are volatile single-value accesses. Concurrent access
/// discipline lives outside this crate; a handler and main-line code
/// racing on the same variable get whatever serialization the RPC layer
/// imposes.
#[repr(transparent)]
pub struct ConfigCell<T>(UnsafeCell<T>);

// SAFETY: the cell is a single storage slot whose cross-context access is
// serialized externally; the type itself adds no references.
unsafe impl<T: Send> Sync for ConfigCell<T> {}

impl<T> ConfigCell<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Pointer to the backing storage, as referenced by the config table.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut T {
        self.0.get()
    }

    #[must_use]
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        // SAFETY: the slot is always initialized and validly aligned.
        unsafe { ptr::read_volatile(self.0.get()) }
    }

    pub fn set(&self, value: T) {
        // SAFETY: as above; overwrite never changes size or placement.
        unsafe { ptr::write_volatile(self.0.get(), value) }
    }
}

/// Length-prefixed array storage record.
///
/// Layout is `{length: u16, reserved: u16, data: [T; N]}` with `length`
/// counting the *bytes* of valid payload, matching what the table builder
/// compiles into the optional region. Capacity never changes after build.
#[repr(C)]
pub struct ArrayVar<T: Copy, const N: usize> {
    length: u16,
    reserved: u16,
    data: [T; N],
}

/// A write exceeded an array variable's fixed capacity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{got} elements exceed the array capacity of {capacity}")]
pub struct CapacityError {
    pub got: usize,
    pub capacity: usize,
}

impl<T: Copy, const N: usize> ArrayVar<T, N> {
    pub const CAPACITY: usize = N;

    /// An empty record; required-region variables start this way.
    #[must_use]
    pub const fn empty(fill: T) -> Self {
        Self {
            length: 0,
            reserved: 0,
            data: [fill; N],
        }
    }

    /// A record pre-filled with a default payload of `valid` elements.
    ///
    /// # Panics
    ///
    /// Panics (at compile time, in the const initializers this is meant
    /// for) when `valid` exceeds the capacity or the byte length overflows
    /// the length field.
    #[must_use]
    pub const fn with_default(data: [T; N], valid: usize) -> Self {
        assert!(valid <= N, "default payload exceeds array capacity");
        let bytes = valid * size_of::<T>();
        assert!(
            bytes <= u16::MAX as usize,
            "array payload exceeds the length field"
        );
        #[allow(clippy::cast_possible_truncation)]
        Self {
            length: bytes as u16,
            reserved: 0,
            data,
        }
    }

    /// Number of valid elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length as usize / size_of::<T>()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Valid payload length in bytes, as stored in the record.
    #[must_use]
    pub const fn byte_len(&self) -> u16 {
        self.length
    }

    /// The valid prefix of the payload.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len()]
    }

    /// Replace the payload. The capacity is fixed; an oversized write is
    /// rejected rather than truncated.
    ///
    /// # Errors
    ///
    /// [`CapacityError`] when `values` has more than `N` elements.
    pub fn set(&mut self, values: &[T]) -> Result<(), CapacityError> {
        if values.len() > N {
            return Err(CapacityError {
                got: values.len(),
                capacity: N,
            });
        }
        self.data[..values.len()].copy_from_slice(values);
        #[allow(clippy::cast_possible_truncation)]
        {
            self.length = (values.len() * size_of::<T>()) as u16;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }
}

/// Declare a required config variable.
///
/// The backing storage lands in the zero-initialized required region on
/// the target; the initializer is the all-zero value. The section name
/// must stay in lockstep with [`Region::section`].
///
/// ```
/// runtime_config::required_config! {
///     static GAIN: u32;
/// }
/// assert_eq!(GAIN.get(), 0);
/// ```
#[macro_export]
macro_rules! required_config {
    ($(#[$meta:meta])* static $name:ident: $ty:ty;) => {
        $(#[$meta])*
        #[cfg_attr(target_os = "none", unsafe(link_section = ".modconfig.required"))]
        #[used]
        static $name: $crate::ConfigCell<$ty> =
            $crate::ConfigCell::new(unsafe { ::core::mem::zeroed() });
    };
}

/// Declare an optional config variable with its compiled-in default.
///
/// ```
/// runtime_config::optional_config! {
///     static SAMPLE_RATE: u16 = 100;
/// }
/// assert_eq!(SAMPLE_RATE.get(), 100);
/// ```
#[macro_export]
macro_rules! optional_config {
    ($(#[$meta:meta])* static $name:ident: $ty:ty = $default:expr;) => {
        $(#[$meta])*
        #[cfg_attr(target_os = "none", unsafe(link_section = ".modconfig.optional"))]
        #[used]
        static $name: $crate::ConfigCell<$ty> = $crate::ConfigCell::new($default);
    };
}
