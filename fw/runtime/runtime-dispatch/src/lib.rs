//! # Device-Side Module Block and Command Dispatch
//!
//! The typed, in-firmware view of the module metadata block and its two
//! tables. A module assembles its tables as `static` const literals, wires
//! them into a [`ModuleBlock`], and places that block in the dedicated
//! linker section so host tooling can find it:
//!
//! ```ignore
//! #[unsafe(link_section = ".module_block")]
//! #[used]
//! static BLOCK: ModuleBlock = ModuleBlock::new(IDENT, &COMMANDS, &CONFIGS);
//! ```
//!
//! The table constructors are `const fn`s that panic during constant
//! evaluation on unsorted or duplicate ids, so a definition mistake is a
//! compile error, not a quietly corrupted jump table.
//!
//! Everything here is immutable read-only data after link; interrupt
//! handlers and main-line code may dispatch concurrently without locking.
//! A handler runs to completion on the caller's context; one that never
//! returns starves everything below it, which is the module author's
//! problem to avoid, not this crate's to detect.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::ptr;

use modblock_abi::{BLOCK_MAGIC, ConfigWord, NAME_LEN};

/// A command handler. Argument passing and response transport belong to
/// the RPC layer; the dispatch contract is just "run the handler for this
/// id".
pub type Handler = extern "C" fn();

/// One command table entry: `{handler, command_id, reserved}`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct CommandEntry {
    pub handler: Handler,
    pub command_id: u16,
    pub reserved: u16,
}

impl CommandEntry {
    #[must_use]
    pub const fn new(command_id: u16, handler: Handler) -> Self {
        Self {
            handler,
            command_id,
            reserved: 0,
        }
    }
}

/// One config table entry: `{variable, config_id, packed size/kind word}`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ConfigEntry {
    pub variable: *const (),
    pub config_id: u16,
    pub word: ConfigWord,
}

impl ConfigEntry {
    #[must_use]
    pub const fn new(config_id: u16, variable: *const (), byte_size: u16, is_array: bool) -> Self {
        Self {
            variable,
            config_id,
            word: ConfigWord::new()
                .with_byte_size(byte_size)
                .with_is_array(is_array),
        }
    }

    /// Entry for a scalar variable of type `T`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn scalar<T>(config_id: u16, variable: *const T) -> Self {
        Self::new(config_id, variable.cast(), size_of::<T>() as u16, false)
    }

    /// Entry for an array variable with `byte_size` bytes of declared data
    /// (element size × capacity, excluding the record header).
    #[must_use]
    pub const fn array(config_id: u16, variable: *const (), byte_size: u16) -> Self {
        Self::new(config_id, variable, byte_size, true)
    }
}

/// The command table: entries strictly ascending by id.
///
/// The constructor validates the ordering invariant during constant
/// evaluation; a `static` table with out-of-order or duplicate ids fails
/// to compile.
#[repr(transparent)]
pub struct CommandTable<const N: usize>([CommandEntry; N]);

impl<const N: usize> CommandTable<N> {
    /// # Panics
    ///
    /// In const evaluation (where these tables are built) when `N` exceeds
    /// the one-byte count field or ids are not strictly ascending.
    #[must_use]
    pub const fn new(entries: [CommandEntry; N]) -> Self {
        assert!(N <= u8::MAX as usize, "command count field is one byte");
        let mut i = 1;
        while i < N {
            assert!(
                entries[i - 1].command_id < entries[i].command_id,
                "command ids must be strictly ascending and unique"
            );
            i += 1;
        }
        Self(entries)
    }

    #[must_use]
    pub const fn entries(&self) -> &[CommandEntry] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const CommandEntry {
        self.0.as_ptr()
    }
}

/// The config table: a required prefix followed by an optional suffix,
/// each strictly ascending by id, ids unique across the whole table.
pub struct ConfigTable<const N: usize> {
    entries: [ConfigEntry; N],
    required: u8,
}

// SAFETY: entries are immutable after link; the variable pointers refer to
// statics whose access discipline lives with the config storage layer.
unsafe impl<const N: usize> Sync for ConfigTable<N> {}

impl<const N: usize> ConfigTable<N> {
    /// # Panics
    ///
    /// In const evaluation when `N` exceeds the one-byte count field,
    /// `required` exceeds `N`, a half is not strictly ascending, or an id
    /// appears in both halves.
    #[must_use]
    pub const fn new(entries: [ConfigEntry; N], required: usize) -> Self {
        assert!(N <= u8::MAX as usize, "config count field is one byte");
        assert!(required <= N, "required prefix exceeds the table");

        let mut i = 1;
        while i < N {
            if i != required {
                assert!(
                    entries[i - 1].config_id < entries[i].config_id,
                    "config ids must be strictly ascending within each half"
                );
            }
            i += 1;
        }

        let mut r = 0;
        while r < required {
            let mut o = required;
            while o < N {
                assert!(
                    entries[r].config_id != entries[o].config_id,
                    "config id defined in both the required and optional half"
                );
                o += 1;
            }
            r += 1;
        }

        #[allow(clippy::cast_possible_truncation)]
        Self {
            entries,
            required: required as u8,
        }
    }

    #[must_use]
    pub const fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// Length of the required prefix.
    #[must_use]
    pub const fn required(&self) -> u8 {
        self.required
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const ConfigEntry {
        self.entries.as_ptr()
    }
}

/// Module identity carried into the block.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ModuleIdent {
    pub hardware_type: u8,
    pub api_major: u8,
    pub api_minor: u8,
    /// Space-padded name bytes, exactly [`NAME_LEN`] of them.
    pub name: [u8; NAME_LEN],
    pub module_major: u8,
    pub module_minor: u8,
    pub module_patch: u8,
}

/// The metadata block as linked into the image.
///
/// Field order matches the on-image layout; on a 32-bit target the struct
/// is byte-identical to the serialized block. The block references the
/// tables but does not own them; they are separate statics alive for the
/// whole image. An empty table is referenced by the null sentinel, never a
/// dangling pointer.
#[repr(C)]
pub struct ModuleBlock {
    hardware_type: u8,
    api_major: u8,
    api_minor: u8,
    name: [u8; NAME_LEN],
    module_major: u8,
    module_minor: u8,
    module_patch: u8,
    num_commands: u8,
    num_required_configs: u8,
    num_total_configs: u8,
    reserved: u8,
    config_table: *const ConfigEntry,
    command_table: *const CommandEntry,
    magic: u32,
    /// Zero at compile time; an external tool patches the real value in
    /// after link.
    firmware_checksum: u32,
}

// SAFETY: read-only after link; the table pointers target immutable
// statics.
unsafe impl Sync for ModuleBlock {}

impl ModuleBlock {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new<const C: usize, const K: usize>(
        ident: ModuleIdent,
        commands: &'static CommandTable<C>,
        configs: &'static ConfigTable<K>,
    ) -> Self {
        Self {
            hardware_type: ident.hardware_type,
            api_major: ident.api_major,
            api_minor: ident.api_minor,
            name: ident.name,
            module_major: ident.module_major,
            module_minor: ident.module_minor,
            module_patch: ident.module_patch,
            num_commands: C as u8,
            num_required_configs: configs.required(),
            num_total_configs: K as u8,
            reserved: 0,
            config_table: if K == 0 { ptr::null() } else { configs.as_ptr() },
            command_table: if C == 0 { ptr::null() } else { commands.as_ptr() },
            magic: BLOCK_MAGIC,
            firmware_checksum: 0,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    #[must_use]
    pub const fn api_version(&self) -> (u8, u8) {
        (self.api_major, self.api_minor)
    }

    #[must_use]
    pub const fn module_version(&self) -> (u8, u8, u8) {
        (self.module_major, self.module_minor, self.module_patch)
    }

    #[must_use]
    pub const fn magic(&self) -> u32 {
        self.magic
    }

    #[must_use]
    pub const fn num_commands(&self) -> u8 {
        self.num_commands
    }

    #[must_use]
    pub const fn num_required_configs(&self) -> u8 {
        self.num_required_configs
    }

    #[must_use]
    pub const fn num_total_configs(&self) -> u8 {
        self.num_total_configs
    }

    #[must_use]
    pub const fn command_table(&self) -> *const CommandEntry {
        self.command_table
    }

    #[must_use]
    pub const fn config_table(&self) -> *const ConfigEntry {
        self.config_table
    }

    /// The command table as a slice; empty when the sentinel is stored.
    #[must_use]
    pub fn commands(&self) -> &[CommandEntry] {
        if self.command_table.is_null() {
            return &[];
        }
        // SAFETY: a non-null pointer was taken from a `&'static` table
        // whose length is exactly `num_commands`.
        unsafe { core::slice::from_raw_parts(self.command_table, self.num_commands as usize) }
    }

    /// The config table as a slice; empty when the sentinel is stored.
    #[must_use]
    pub fn configs(&self) -> &[ConfigEntry] {
        if self.config_table.is_null() {
            return &[];
        }
        // SAFETY: as for `commands`.
        unsafe { core::slice::from_raw_parts(self.config_table, self.num_total_configs as usize) }
    }

    /// Find the handler for `command_id`.
    #[must_use]
    pub fn lookup(&self, command_id: u16) -> Option<Handler> {
        lookup(self.commands(), command_id)
    }

    /// Run the handler for `command_id`; `false` when the id is unknown.
    pub fn dispatch(&self, command_id: u16) -> bool {
        dispatch(self.commands(), command_id)
    }
}

/// Binary-search a sorted command table for `command_id`.
#[must_use]
pub fn lookup(table: &[CommandEntry], command_id: u16) -> Option<Handler> {
    table
        .binary_search_by_key(&command_id, |e| e.command_id)
        .ok()
        .map(|i| table[i].handler)
}

/// Run the handler for `command_id`; `false` when the id is unknown.
pub fn dispatch(table: &[CommandEntry], command_id: u16) -> bool {
    match lookup(table, command_id) {
        Some(handler) => {
            handler();
            true
        }
        None => false,
    }
}

// On the 32-bit targets this convention serves, the typed structs are
// byte-identical to the serialized table entries and block.
#[cfg(target_pointer_width = "32")]
const _: () = {
    assert!(size_of::<CommandEntry>() == modblock_abi::COMMAND_ENTRY_SIZE);
    assert!(size_of::<ConfigEntry>() == modblock_abi::CONFIG_ENTRY_SIZE);
    assert!(size_of::<ModuleBlock>() == modblock_abi::BLOCK_SIZE);
};

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU16, Ordering};

    static LAST: AtomicU16 = AtomicU16::new(0);

    extern "C" fn h2() {
        LAST.store(2, Ordering::SeqCst);
    }
    extern "C" fn h5() {
        LAST.store(5, Ordering::SeqCst);
    }
    extern "C" fn h9() {
        LAST.store(9, Ordering::SeqCst);
    }

    static COMMANDS: CommandTable<3> = CommandTable::new([
        CommandEntry::new(2, h2),
        CommandEntry::new(5, h5),
        CommandEntry::new(9, h9),
    ]);

    static GAIN: u32 = 0;
    static RATE: u16 = 100;

    static CONFIGS: ConfigTable<2> = ConfigTable::new(
        [
            ConfigEntry::scalar(0x30, &raw const GAIN),
            ConfigEntry::scalar(0x10, &raw const RATE),
        ],
        1,
    );

    static EMPTY_COMMANDS: CommandTable<0> = CommandTable::new([]);
    static EMPTY_CONFIGS: ConfigTable<0> = ConfigTable::new([], 0);

    const IDENT: ModuleIdent = ModuleIdent {
        hardware_type: 10,
        api_major: 2,
        api_minor: 0,
        name: *b"accel ",
        module_major: 1,
        module_minor: 4,
        module_patch: 0,
    };

    static BLOCK: ModuleBlock = ModuleBlock::new(IDENT, &COMMANDS, &CONFIGS);
    static EMPTY_BLOCK: ModuleBlock = ModuleBlock::new(IDENT, &EMPTY_COMMANDS, &EMPTY_CONFIGS);

    #[test]
    fn counts_mirror_the_tables() {
        assert_eq!(BLOCK.num_commands(), 3);
        assert_eq!(BLOCK.num_required_configs(), 1);
        assert_eq!(BLOCK.num_total_configs(), 2);
        assert_eq!(BLOCK.magic(), BLOCK_MAGIC);
        assert_eq!(BLOCK.name(), b"accel ");
        assert_eq!(BLOCK.commands().len(), 3);
        assert_eq!(BLOCK.configs().len(), 2);
    }

    #[test]
    fn empty_tables_store_the_null_sentinel() {
        assert!(EMPTY_BLOCK.command_table().is_null());
        assert!(EMPTY_BLOCK.config_table().is_null());
        assert_eq!(EMPTY_BLOCK.num_commands(), 0);
        assert_eq!(EMPTY_BLOCK.num_total_configs(), 0);
        assert!(EMPTY_BLOCK.commands().is_empty());
        assert!(!EMPTY_BLOCK.dispatch(2));
    }

    #[test]
    fn lookup_finds_every_id_and_nothing_else() {
        for (id, expect) in [(2u16, true), (5, true), (9, true), (1, false), (6, false)] {
            assert_eq!(BLOCK.lookup(id).is_some(), expect, "id {id}");
        }
    }

    #[test]
    fn dispatch_runs_the_matching_handler() {
        assert!(BLOCK.dispatch(5));
        assert_eq!(LAST.load(Ordering::SeqCst), 5);
        assert!(!BLOCK.dispatch(1000));
        assert_eq!(LAST.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn config_entries_pack_size_and_kind() {
        let entries = CONFIGS.entries();
        assert_eq!(entries[0].word.byte_size(), 4);
        assert!(!entries[0].word.is_array());
        assert_eq!(entries[1].word.byte_size(), 2);
        assert_eq!(CONFIGS.required(), 1);
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn unsorted_command_table_panics() {
        let _ = CommandTable::new([CommandEntry::new(5, h5), CommandEntry::new(2, h2)]);
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn duplicate_command_id_panics() {
        let _ = CommandTable::new([CommandEntry::new(5, h5), CommandEntry::new(5, h2)]);
    }

    #[test]
    #[should_panic(expected = "both the required and optional half")]
    fn cross_half_duplicate_config_panics() {
        let _ = ConfigTable::new(
            [
                ConfigEntry::scalar(0x10, &raw const GAIN),
                ConfigEntry::scalar(0x10, &raw const RATE),
            ],
            1,
        );
    }

    #[test]
    #[should_panic(expected = "ascending within each half")]
    fn unsorted_half_panics() {
        let _ = ConfigTable::new(
            [
                ConfigEntry::scalar(0x20, &raw const GAIN),
                ConfigEntry::scalar(0x10, &raw const RATE),
            ],
            0,
        );
    }
}
