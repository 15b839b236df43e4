use modblock_abi::{BlockFields, ConfigWord, NAME_LEN, Region, encode_command_entry, encode_config_entry};

/// One compiled command table slot, in final table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSlot {
    pub command_id: u16,
    /// Handler symbol name; address resolution is the linker's business.
    pub handler: String,
}

/// One compiled config table slot, in final table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSlot {
    pub config_id: u16,
    /// Symbol name of the backing variable.
    pub name: String,
    pub region: Region,
    /// Byte offset of the variable's storage within its region.
    pub offset: usize,
    /// Total storage footprint (array record header included).
    pub storage_size: usize,
    /// Declared data size, as carried in the table entry.
    pub byte_size: u16,
    pub is_array: bool,
}

/// Validated module identity carried into the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub hardware_type: u8,
    pub api_major: u8,
    pub api_minor: u8,
    pub module_major: u8,
    pub module_minor: u8,
    pub module_patch: u8,
    pub(crate) name: [u8; NAME_LEN],
}

impl ModuleInfo {
    /// Space-padded name bytes as they appear in the block.
    #[must_use]
    pub const fn name(&self) -> &[u8; NAME_LEN] {
        &self.name
    }
}

/// Deterministic output of the table builders.
///
/// Everything a code/image generator needs: ordered slots, region sizes,
/// the defaulted optional-region image, and byte encoders for the block
/// and both tables. Symbol-to-address resolution stays with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    pub info: ModuleInfo,
    pub commands: Vec<CommandSlot>,
    pub configs: Vec<ConfigSlot>,
    /// Size of the zero-initialized required region in bytes.
    pub required_region_len: usize,
    /// Compiled contents of the optional region, defaults encoded in place.
    pub optional_region: Vec<u8>,
}

impl ModuleLayout {
    /// Length of the command table.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_commands(&self) -> u8 {
        self.commands.len() as u8
    }

    /// Length of the required prefix of the config table.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_required_configs(&self) -> u8 {
        self.configs
            .iter()
            .filter(|c| c.region == Region::Required)
            .count() as u8
    }

    /// Total length of the config table.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn num_total_configs(&self) -> u8 {
        self.configs.len() as u8
    }

    /// Assemble the block fields for this layout.
    ///
    /// `config_table` / `command_table` are the device addresses the linker
    /// assigned to the two tables; an empty table gets the zero sentinel no
    /// matter what the caller passes. The checksum field is left zero for
    /// the post-link patch step.
    #[must_use]
    pub fn block_fields(&self, config_table: u32, command_table: u32) -> BlockFields {
        BlockFields {
            hardware_type: self.info.hardware_type,
            api_major: self.info.api_major,
            api_minor: self.info.api_minor,
            name: self.info.name,
            module_major: self.info.module_major,
            module_minor: self.info.module_minor,
            module_patch: self.info.module_patch,
            num_commands: self.num_commands(),
            num_required_configs: self.num_required_configs(),
            num_total_configs: self.num_total_configs(),
            config_table: if self.configs.is_empty() { 0 } else { config_table },
            command_table: if self.commands.is_empty() { 0 } else { command_table },
            firmware_checksum: 0,
        }
    }

    /// Serialize the command table, resolving handler symbols to addresses
    /// through `resolve`.
    pub fn encode_command_table(&self, mut resolve: impl FnMut(&str) -> u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.commands.len() * modblock_abi::COMMAND_ENTRY_SIZE);
        for slot in &self.commands {
            out.extend_from_slice(&encode_command_entry(resolve(&slot.handler), slot.command_id));
        }
        out
    }

    /// Serialize the config table, resolving each slot's storage address
    /// through `resolve` (typically region base + slot offset).
    pub fn encode_config_table(&self, mut resolve: impl FnMut(&ConfigSlot) -> u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.configs.len() * modblock_abi::CONFIG_ENTRY_SIZE);
        for slot in &self.configs {
            let word = ConfigWord::new()
                .with_byte_size(slot.byte_size)
                .with_is_array(slot.is_array);
            out.extend_from_slice(&encode_config_entry(resolve(slot), slot.config_id, word));
        }
        out
    }
}
