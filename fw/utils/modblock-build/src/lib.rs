//! # Module Table Builders
//!
//! Host-side compiler for a module's self-description: consumes the two
//! definition mappings (command id to handler symbol, config id to
//! variable descriptor) and produces the deterministic layout the image
//! embeds: a
//! command table sorted by ascending id, a config table split into a
//! required prefix and an optional suffix (each ascending), storage
//! reservations in the two config regions, and the metadata block fields
//! whose counts mirror the tables exactly.
//!
//! Everything here is data-driven; there is no text templating step. The
//! outputs are typed values plus byte encoders, and symbol-name → address
//! resolution is deliberately left to the caller (the linker knows, we
//! don't).
//!
//! Definition mistakes (duplicate ids, oversized or ill-typed defaults,
//! zero-capacity arrays) abort the build with a [`BuildError`]; nothing
//! is dropped or coalesced to limp onwards.
//!
//! ```
//! use modblock_build::{ConfigDef, ElementType, ModuleBuilder, ModuleInfo};
//!
//! let info = ModuleInfo::new(10, "accel", (2, 0), (1, 4, 0)).unwrap();
//! let mut builder = ModuleBuilder::new(info);
//! builder.add_command(0x0005, "handle_read").unwrap();
//! builder.add_command(0x0002, "handle_reset").unwrap();
//! builder
//!     .add_config(0x0010, ConfigDef::optional_scalar("sample_rate", ElementType::U16, 100))
//!     .unwrap();
//! let layout = builder.build().unwrap();
//! assert_eq!(layout.commands[0].command_id, 0x0002);
//! ```

use std::collections::BTreeMap;

use log::{debug, trace};
use modblock_abi::{MAX_CONFIG_BYTE_SIZE, NAME_LEN, Region};

mod def;
mod error;
mod slots;

pub use def::{ConfigDef, DefaultValue, ElementType, Shape};
pub use error::BuildError;
pub use slots::{CommandSlot, ConfigSlot, ModuleInfo, ModuleLayout};

impl ModuleInfo {
    /// Validate and capture a module's identity.
    ///
    /// The name may be at most [`NAME_LEN`] bytes and is space-padded to
    /// exactly that length; it is stored as bytes, not a C string. API and
    /// module version components are one byte each by construction.
    ///
    /// # Errors
    ///
    /// [`BuildError::NameTooLong`] when the name does not fit the field.
    pub fn new(
        hardware_type: u8,
        name: &str,
        api: (u8, u8),
        version: (u8, u8, u8),
    ) -> Result<Self, BuildError> {
        if name.len() > NAME_LEN {
            return Err(BuildError::NameTooLong(name.to_owned()));
        }
        let mut padded = [b' '; NAME_LEN];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self {
            hardware_type,
            api_major: api.0,
            api_minor: api.1,
            module_major: version.0,
            module_minor: version.1,
            module_patch: version.2,
            name: padded,
        })
    }
}

/// Collects a module's command and config definitions, then compiles them
/// into a [`ModuleLayout`].
///
/// Duplicate ids are rejected at insertion time, so an id can never end up
/// in both config halves either. Iteration order of the underlying maps
/// supplies the ascending-id table invariant.
pub struct ModuleBuilder {
    info: ModuleInfo,
    commands: BTreeMap<u16, String>,
    configs: BTreeMap<u16, ConfigDef>,
}

impl ModuleBuilder {
    #[must_use]
    pub const fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            commands: BTreeMap::new(),
            configs: BTreeMap::new(),
        }
    }

    /// Register a command handler under `command_id`.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateCommandId`] when the id is already taken.
    pub fn add_command(&mut self, command_id: u16, handler: &str) -> Result<(), BuildError> {
        if self.commands.contains_key(&command_id) {
            return Err(BuildError::DuplicateCommandId(command_id));
        }
        self.commands.insert(command_id, handler.to_owned());
        Ok(())
    }

    /// Register a config variable under `config_id`.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateConfigId`] when the id is already taken,
    /// regardless of which half it would land in.
    pub fn add_config(&mut self, config_id: u16, def: ConfigDef) -> Result<(), BuildError> {
        if self.configs.contains_key(&config_id) {
            return Err(BuildError::DuplicateConfigId(config_id));
        }
        self.configs.insert(config_id, def);
        Ok(())
    }

    /// Compile the collected definitions into the final layout.
    ///
    /// # Errors
    ///
    /// Any [`BuildError`] a definition triggers; on error no layout is
    /// produced at all.
    pub fn build(self) -> Result<ModuleLayout, BuildError> {
        if self.commands.len() > usize::from(u8::MAX) {
            return Err(BuildError::TooManyCommands(self.commands.len()));
        }
        if self.configs.len() > usize::from(u8::MAX) {
            return Err(BuildError::TooManyConfigs(self.configs.len()));
        }

        let commands: Vec<CommandSlot> = self
            .commands
            .into_iter()
            .map(|(command_id, handler)| CommandSlot {
                command_id,
                handler,
            })
            .collect();

        let mut required_cursor = 0usize;
        let mut optional_region = Vec::new();
        let mut required_slots = Vec::new();
        let mut optional_slots = Vec::new();

        // BTreeMap iteration is ascending by id, so each half comes out
        // sorted without a separate pass.
        for (config_id, def) in &self.configs {
            validate_def(def)?;
            let slot = if def.required {
                place_required(*config_id, def, &mut required_cursor)
            } else {
                place_optional(*config_id, def, &mut optional_region)?
            };
            trace!(
                "config {:#06x} `{}` -> {:?}+{:#x} ({} bytes)",
                config_id, slot.name, slot.region, slot.offset, slot.storage_size
            );
            if def.required {
                required_slots.push(slot);
            } else {
                optional_slots.push(slot);
            }
        }

        let mut configs = required_slots;
        configs.append(&mut optional_slots);

        debug!(
            "compiled module layout: {} commands, {} configs ({} required), regions {}+{} bytes",
            commands.len(),
            configs.len(),
            configs.iter().filter(|c| c.region == Region::Required).count(),
            required_cursor,
            optional_region.len()
        );

        Ok(ModuleLayout {
            info: self.info,
            commands,
            configs,
            required_region_len: required_cursor,
            optional_region,
        })
    }
}

fn validate_def(def: &ConfigDef) -> Result<(), BuildError> {
    if let Shape::Array { capacity: 0 } = def.shape {
        return Err(BuildError::ZeroLengthArray(def.name.clone()));
    }
    if def.required && def.default.is_some() {
        return Err(BuildError::RequiredHasDefault(def.name.clone()));
    }
    if !def.required && def.default.is_none() {
        return Err(BuildError::OptionalWithoutDefault(def.name.clone()));
    }
    if def.data_size() > MAX_CONFIG_BYTE_SIZE {
        return Err(BuildError::SizeFieldOverflow(def.name.clone()));
    }
    Ok(())
}

/// Storage alignment and footprint of a variable. Array records lead with
/// a two-byte length, so they align to at least two.
const fn storage_geometry(def: &ConfigDef) -> (usize, usize) {
    let elem = def.ty.size();
    match def.shape {
        Shape::Scalar => (elem, elem),
        Shape::Array { capacity } => {
            let align = if elem > 2 { elem } else { 2 };
            (align, 4 + capacity * elem)
        }
    }
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[allow(clippy::cast_possible_truncation)]
fn make_slot(config_id: u16, def: &ConfigDef, region: Region, offset: usize, size: usize) -> ConfigSlot {
    ConfigSlot {
        config_id,
        name: def.name.clone(),
        region,
        offset,
        storage_size: size,
        byte_size: def.data_size() as u16,
        is_array: matches!(def.shape, Shape::Array { .. }),
    }
}

/// Reserve zero-initialized storage in the required region.
fn place_required(config_id: u16, def: &ConfigDef, cursor: &mut usize) -> ConfigSlot {
    let (align, size) = storage_geometry(def);
    let offset = align_up(*cursor, align);
    *cursor = offset + size;
    make_slot(config_id, def, Region::Required, offset, size)
}

/// Reserve storage in the optional region and materialize the default.
#[allow(clippy::cast_possible_truncation)]
fn place_optional(
    config_id: u16,
    def: &ConfigDef,
    region: &mut Vec<u8>,
) -> Result<ConfigSlot, BuildError> {
    let (align, size) = storage_geometry(def);
    let offset = align_up(region.len(), align);
    region.resize(offset + size, 0);

    let Some(payload) = def.encode_default()? else {
        return Err(BuildError::OptionalWithoutDefault(def.name.clone()));
    };
    match def.shape {
        Shape::Scalar => {
            region[offset..offset + payload.len()].copy_from_slice(&payload);
        }
        Shape::Array { .. } => {
            // {length, reserved, data}: length counts the valid payload
            // bytes; the remaining capacity stays zeroed.
            region[offset..offset + 2].copy_from_slice(&(payload.len() as u16).to_le_bytes());
            region[offset + 4..offset + 4 + payload.len()].copy_from_slice(&payload);
        }
    }
    Ok(make_slot(config_id, def, Region::Optional, offset, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ModuleInfo {
        ModuleInfo::new(10, "accel", (2, 0), (1, 4, 0)).unwrap()
    }

    #[test]
    fn name_is_space_padded() {
        assert_eq!(info().name(), b"accel ");
        assert!(matches!(
            ModuleInfo::new(10, "accelerometer", (2, 0), (1, 0, 0)),
            Err(BuildError::NameTooLong(_))
        ));
    }

    #[test]
    fn commands_come_out_sorted() {
        let mut b = ModuleBuilder::new(info());
        b.add_command(5, "h5").unwrap();
        b.add_command(2, "h2").unwrap();
        b.add_command(9, "h9").unwrap();
        let layout = b.build().unwrap();

        let ids: Vec<(u16, &str)> = layout
            .commands
            .iter()
            .map(|c| (c.command_id, c.handler.as_str()))
            .collect();
        assert_eq!(ids, [(2, "h2"), (5, "h5"), (9, "h9")]);
        assert_eq!(layout.num_commands(), 3);
    }

    #[test]
    fn duplicate_command_id_fails() {
        let mut b = ModuleBuilder::new(info());
        b.add_command(7, "first").unwrap();
        assert_eq!(
            b.add_command(7, "second").unwrap_err(),
            BuildError::DuplicateCommandId(7)
        );
    }

    #[test]
    fn duplicate_config_id_fails_across_halves() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(3, ConfigDef::required_scalar("a", ElementType::U32))
            .unwrap();
        assert_eq!(
            b.add_config(3, ConfigDef::optional_scalar("b", ElementType::U32, 1))
                .unwrap_err(),
            BuildError::DuplicateConfigId(3)
        );
    }

    #[test]
    fn required_prefix_then_optional_suffix() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(
            0x20,
            ConfigDef::optional_array(
                "taps",
                ElementType::U32,
                4,
                DefaultValue::List(vec![1, 2, 3, 4]),
            ),
        )
        .unwrap();
        b.add_config(0x30, ConfigDef::required_scalar("gain", ElementType::U32))
            .unwrap();
        let layout = b.build().unwrap();

        assert_eq!(layout.num_required_configs(), 1);
        assert_eq!(layout.num_total_configs(), 2);
        // Required slot first despite the higher id.
        assert_eq!(layout.configs[0].config_id, 0x30);
        assert_eq!(layout.configs[0].region, Region::Required);
        assert_eq!(layout.configs[1].config_id, 0x20);
        assert_eq!(layout.configs[1].region, Region::Optional);

        // Required region holds only the scalar, zero-initialized by the
        // region's nature; the layout just reserves its 4 bytes.
        assert_eq!(layout.required_region_len, 4);

        // Optional region: {length=16, reserved=0, data=[1,2,3,4]} LE.
        let mut expected = vec![16, 0, 0, 0];
        for v in [1u32, 2, 3, 4] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(layout.optional_region, expected);
        assert_eq!(layout.configs[1].byte_size, 16);
        assert!(layout.configs[1].is_array);
    }

    #[test]
    fn each_half_is_sorted() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(9, ConfigDef::required_scalar("r9", ElementType::U8))
            .unwrap();
        b.add_config(1, ConfigDef::required_scalar("r1", ElementType::U8))
            .unwrap();
        b.add_config(8, ConfigDef::optional_scalar("o8", ElementType::U8, 0))
            .unwrap();
        b.add_config(2, ConfigDef::optional_scalar("o2", ElementType::U8, 0))
            .unwrap();
        let layout = b.build().unwrap();

        let ids: Vec<u16> = layout.configs.iter().map(|c| c.config_id).collect();
        assert_eq!(ids, [1, 9, 2, 8]);
        assert_eq!(layout.num_required_configs(), 2);
    }

    #[test]
    fn empty_module_uses_sentinels() {
        let layout = ModuleBuilder::new(info()).build().unwrap();
        let fields = layout.block_fields(0x2000_0000, 0x0000_0400);
        assert_eq!(fields.num_commands, 0);
        assert_eq!(fields.num_total_configs, 0);
        assert_eq!(fields.config_table, 0);
        assert_eq!(fields.command_table, 0);
    }

    #[test]
    fn zero_capacity_array_fails() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(1, ConfigDef::required_array("buf", ElementType::U8, 0))
            .unwrap();
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::ZeroLengthArray("buf".into())
        );
    }

    #[test]
    fn required_with_default_fails() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(
            1,
            ConfigDef {
                name: "gain".into(),
                ty: ElementType::U16,
                shape: Shape::Scalar,
                required: true,
                default: Some(DefaultValue::Int(1)),
            },
        )
        .unwrap();
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::RequiredHasDefault("gain".into())
        );
    }

    #[test]
    fn optional_without_default_fails() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(
            1,
            ConfigDef {
                name: "gain".into(),
                ty: ElementType::U16,
                shape: Shape::Scalar,
                required: false,
                default: None,
            },
        )
        .unwrap();
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::OptionalWithoutDefault("gain".into())
        );
    }

    #[test]
    fn storage_is_naturally_aligned() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(1, ConfigDef::required_scalar("flag", ElementType::U8))
            .unwrap();
        b.add_config(2, ConfigDef::required_scalar("rate", ElementType::U32))
            .unwrap();
        b.add_config(3, ConfigDef::required_scalar("mode", ElementType::U8))
            .unwrap();
        let layout = b.build().unwrap();

        assert_eq!(layout.configs[0].offset, 0);
        assert_eq!(layout.configs[1].offset, 4);
        assert_eq!(layout.configs[2].offset, 8);
        assert_eq!(layout.required_region_len, 9);
    }

    #[test]
    fn scalar_default_is_encoded_in_place() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(
            1,
            ConfigDef::optional_scalar("rate", ElementType::U16, 0x0164),
        )
        .unwrap();
        let layout = b.build().unwrap();
        assert_eq!(layout.optional_region, [0x64, 0x01]);
    }

    #[test]
    fn command_table_encoding_resolves_symbols() {
        let mut b = ModuleBuilder::new(info());
        b.add_command(5, "h5").unwrap();
        b.add_command(2, "h2").unwrap();
        let layout = b.build().unwrap();

        let bytes = layout.encode_command_table(|sym| match sym {
            "h2" => 0x100,
            "h5" => 0x200,
            _ => unreachable!(),
        });
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &0x100u32.to_le_bytes());
        assert_eq!(&bytes[4..6], &2u16.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x200u32.to_le_bytes());
        assert_eq!(&bytes[12..14], &5u16.to_le_bytes());
    }

    #[test]
    fn config_table_encoding_packs_word() {
        let mut b = ModuleBuilder::new(info());
        b.add_config(
            7,
            ConfigDef::optional_array("taps", ElementType::U16, 3, DefaultValue::List(vec![1])),
        )
        .unwrap();
        let layout = b.build().unwrap();

        let bytes = layout.encode_config_table(|slot| {
            assert_eq!(slot.region, Region::Optional);
            0x2000_0000 + u32::try_from(slot.offset).unwrap()
        });
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &0x2000_0000u32.to_le_bytes());
        assert_eq!(&bytes[4..6], &7u16.to_le_bytes());
        // 6 data bytes, array bit set.
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 0x8006);
    }

    #[test]
    fn counts_are_bounded_by_the_block_fields() {
        let mut b = ModuleBuilder::new(info());
        for id in 0..=u16::from(u8::MAX) {
            b.add_command(id, "h").unwrap();
        }
        assert_eq!(b.build().unwrap_err(), BuildError::TooManyCommands(256));
    }
}
