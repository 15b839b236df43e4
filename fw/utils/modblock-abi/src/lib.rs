//! # Module Block Binary Layout
//!
//! Single source of truth for the on-image layout of the module metadata
//! block and its two embedded tables. Every firmware image carries exactly
//! one 32-byte block in a dedicated linker section; a host tool or
//! bootloader locates it either through the image's symbol table or by
//! scanning for [`BLOCK_MAGIC`] at a [`BLOCK_SIZE`] stride, then walks the
//! command and config tables it references.
//!
//! ## Block layout
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0      | 1    | hardware type |
//! | 1      | 1    | API major version |
//! | 2      | 1    | API minor version |
//! | 3      | 6    | module name (space-padded bytes, no NUL) |
//! | 9      | 1    | module major version |
//! | 10     | 1    | module minor version |
//! | 11     | 1    | module patch version |
//! | 12     | 1    | command count |
//! | 13     | 1    | required config count |
//! | 14     | 1    | total config count |
//! | 15     | 1    | reserved (zero) |
//! | 16     | 4    | config table address (0 when total count is 0) |
//! | 20     | 4    | command table address (0 when command count is 0) |
//! | 24     | 4    | magic number |
//! | 28     | 4    | firmware checksum (0 until patched post-link) |
//!
//! All multi-byte fields are little-endian, matching the Cortex-M targets
//! the convention was designed for. Table entries are 8 bytes each:
//! commands are `{handler: u32, command_id: u16, reserved: u16}`, configs
//! are `{variable: u32, config_id: u16, packed: u16}` with the packed word
//! described by [`ConfigWord`].
//!
//! The count fields are the authoritative table lengths: a consumer must
//! never walk past them, and the build pipeline guarantees they equal the
//! real table sizes. A table address is the zero sentinel, never a dangling
//! pointer, when its count is zero.
//!
//! The `scan` feature (default) adds the host-side parser in [`scan`].

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod checksum;
#[cfg(feature = "scan")]
pub mod scan;

use bitfield_struct::bitfield;

/// Magic value identifying a valid module block.
///
/// Presence of this constant at in-block offset [`offsets::MAGIC`] is the
/// sole signal that a memory region holds a block; it is not a checksum.
pub const BLOCK_MAGIC: u32 = 0xBAAD_DAAD;

/// Total size of the metadata block in bytes. Also the stride used when
/// scanning an image for the magic number.
pub const BLOCK_SIZE: usize = 32;

/// Length of the module name field. Shorter names are space-padded; the
/// field is a byte array, not a C string.
pub const NAME_LEN: usize = 6;

/// Size of one command table entry in bytes.
pub const COMMAND_ENTRY_SIZE: usize = 8;

/// Size of one config table entry in bytes.
pub const CONFIG_ENTRY_SIZE: usize = 8;

/// Largest data size a single config variable may declare; the entry's
/// size field is 15 bits wide.
pub const MAX_CONFIG_BYTE_SIZE: usize = (1 << 15) - 1;

/// Linker section holding the one metadata block of an image.
pub const BLOCK_SECTION: &str = ".module_block";

/// Storage class of a config variable.
///
/// Required variables live in a zero-initialized region and must be given
/// a value before the module counts as configured; optional variables live
/// in a region whose compiled-in contents are their default values. The
/// classification is fixed at build time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Region {
    Required,
    Optional,
}

impl Region {
    /// Linker section variables of this class are placed in.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Required => ".modconfig.required",
            Self::Optional => ".modconfig.optional",
        }
    }
}

/// Byte offsets of the block fields, relative to the block start.
pub mod offsets {
    pub const HARDWARE_TYPE: usize = 0;
    pub const API_MAJOR: usize = 1;
    pub const API_MINOR: usize = 2;
    pub const NAME: usize = 3;
    pub const MODULE_MAJOR: usize = 9;
    pub const MODULE_MINOR: usize = 10;
    pub const MODULE_PATCH: usize = 11;
    pub const NUM_COMMANDS: usize = 12;
    pub const NUM_REQUIRED_CONFIGS: usize = 13;
    pub const NUM_TOTAL_CONFIGS: usize = 14;
    pub const CONFIG_TABLE: usize = 16;
    pub const COMMAND_TABLE: usize = 20;
    pub const MAGIC: usize = 24;
    pub const CHECKSUM: usize = 28;
}

/// Packed size/kind word of a config table entry.
///
/// The on-image `u16` carries the variable's declared data size (element
/// size × element count, excluding the array record header) in the low
/// 15 bits and the array flag in the top bit. The rest of the crate deals
/// in the two explicit fields; packing happens only at this boundary.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct ConfigWord {
    /// Declared data size of the variable in bytes.
    #[bits(15)]
    pub byte_size: u16,
    /// Set when the variable is a length-prefixed array rather than a
    /// scalar.
    pub is_array: bool,
}

/// Host-endian view of the block fields.
///
/// This is the decoded form produced by the parser and consumed by the
/// encoder; it never aliases image memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockFields {
    pub hardware_type: u8,
    pub api_major: u8,
    pub api_minor: u8,
    pub name: [u8; NAME_LEN],
    pub module_major: u8,
    pub module_minor: u8,
    pub module_patch: u8,
    pub num_commands: u8,
    pub num_required_configs: u8,
    pub num_total_configs: u8,
    pub config_table: u32,
    pub command_table: u32,
    pub firmware_checksum: u32,
}

impl BlockFields {
    /// Serialize the block to its 32-byte image form.
    ///
    /// The magic number is always written; the reserved byte is zero. The
    /// caller is responsible for the sentinel invariant (zero table address
    /// for a zero count): the builder enforces it and the parser rejects
    /// violations.
    #[must_use]
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        out[offsets::HARDWARE_TYPE] = self.hardware_type;
        out[offsets::API_MAJOR] = self.api_major;
        out[offsets::API_MINOR] = self.api_minor;
        out[offsets::NAME..offsets::NAME + NAME_LEN].copy_from_slice(&self.name);
        out[offsets::MODULE_MAJOR] = self.module_major;
        out[offsets::MODULE_MINOR] = self.module_minor;
        out[offsets::MODULE_PATCH] = self.module_patch;
        out[offsets::NUM_COMMANDS] = self.num_commands;
        out[offsets::NUM_REQUIRED_CONFIGS] = self.num_required_configs;
        out[offsets::NUM_TOTAL_CONFIGS] = self.num_total_configs;
        out[offsets::CONFIG_TABLE..offsets::CONFIG_TABLE + 4]
            .copy_from_slice(&self.config_table.to_le_bytes());
        out[offsets::COMMAND_TABLE..offsets::COMMAND_TABLE + 4]
            .copy_from_slice(&self.command_table.to_le_bytes());
        out[offsets::MAGIC..offsets::MAGIC + 4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        out[offsets::CHECKSUM..offsets::CHECKSUM + 4]
            .copy_from_slice(&self.firmware_checksum.to_le_bytes());
        out
    }
}

/// Serialize one command table entry. The reserved half-word is zero.
#[must_use]
pub fn encode_command_entry(handler: u32, command_id: u16) -> [u8; COMMAND_ENTRY_SIZE] {
    let mut out = [0u8; COMMAND_ENTRY_SIZE];
    out[0..4].copy_from_slice(&handler.to_le_bytes());
    out[4..6].copy_from_slice(&command_id.to_le_bytes());
    out
}

/// Serialize one config table entry.
#[must_use]
pub fn encode_config_entry(
    variable: u32,
    config_id: u16,
    word: ConfigWord,
) -> [u8; CONFIG_ENTRY_SIZE] {
    let mut out = [0u8; CONFIG_ENTRY_SIZE];
    out[0..4].copy_from_slice(&variable.to_le_bytes());
    out[4..6].copy_from_slice(&config_id.to_le_bytes());
    out[6..8].copy_from_slice(&word.into_bits().to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> BlockFields {
        BlockFields {
            hardware_type: 10,
            api_major: 2,
            api_minor: 3,
            name: *b"accel ",
            module_major: 1,
            module_minor: 4,
            module_patch: 9,
            num_commands: 3,
            num_required_configs: 1,
            num_total_configs: 2,
            config_table: 0x2000_0100,
            command_table: 0x0000_0400,
            firmware_checksum: 0,
        }
    }

    #[test]
    fn block_encodes_to_fixed_offsets() {
        let bytes = sample_fields().encode();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(bytes[offsets::HARDWARE_TYPE], 10);
        assert_eq!(&bytes[offsets::NAME..offsets::NAME + NAME_LEN], b"accel ");
        assert_eq!(bytes[offsets::NUM_COMMANDS], 3);
        assert_eq!(bytes[offsets::NUM_REQUIRED_CONFIGS], 1);
        assert_eq!(bytes[offsets::NUM_TOTAL_CONFIGS], 2);
        assert_eq!(
            u32::from_le_bytes(bytes[offsets::MAGIC..offsets::MAGIC + 4].try_into().unwrap()),
            BLOCK_MAGIC
        );
        assert_eq!(
            u32::from_le_bytes(
                bytes[offsets::COMMAND_TABLE..offsets::COMMAND_TABLE + 4]
                    .try_into()
                    .unwrap()
            ),
            0x0000_0400
        );
    }

    #[test]
    fn config_word_packs_size_and_flag() {
        let w = ConfigWord::new().with_byte_size(16).with_is_array(true);
        assert_eq!(w.into_bits(), 0x8010);
        assert_eq!(w.byte_size(), 16);
        assert!(w.is_array());

        let scalar = ConfigWord::new().with_byte_size(4);
        assert_eq!(scalar.into_bits(), 0x0004);
        assert!(!scalar.is_array());
    }

    #[test]
    fn config_word_size_field_is_15_bits() {
        let w = ConfigWord::new().with_byte_size(0x7FFF);
        assert_eq!(w.byte_size(), 0x7FFF);
        assert!(!w.is_array());
        assert_eq!(MAX_CONFIG_BYTE_SIZE, 0x7FFF);
    }

    #[test]
    fn command_entry_layout() {
        let e = encode_command_entry(0x0000_1235, 0x0A0B);
        assert_eq!(e, [0x35, 0x12, 0x00, 0x00, 0x0B, 0x0A, 0x00, 0x00]);
    }

    #[test]
    fn config_entry_layout() {
        let w = ConfigWord::new().with_byte_size(2).with_is_array(false);
        let e = encode_config_entry(0x2000_0010, 7, w);
        assert_eq!(e, [0x10, 0x00, 0x00, 0x20, 0x07, 0x00, 0x02, 0x00]);
    }
}
