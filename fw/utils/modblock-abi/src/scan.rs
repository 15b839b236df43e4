//! Host-side block parser.
//!
//! Locates a module block inside a raw firmware image, validates the
//! packaging invariants, and walks the two tables. Field reads are explicit
//! little-endian; nothing here relies on host struct layout or endianness.

use crate::{
    BLOCK_MAGIC, BLOCK_SIZE, COMMAND_ENTRY_SIZE, CONFIG_ENTRY_SIZE, BlockFields, ConfigWord,
    NAME_LEN, checksum, offsets,
};

/// Parsed block view over an in-memory firmware image.
///
/// Table bounds are checked once at parse time; the entry accessors and
/// iterators are infallible afterwards.
#[derive(Debug)]
pub struct BlockView<'a> {
    image: &'a [u8],
    offset: usize,
    fields: BlockFields,
    command_table_offset: Option<usize>,
    config_table_offset: Option<usize>,
}

/// One decoded command table entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommandRecord {
    pub handler: u32,
    pub command_id: u16,
    pub reserved: u16,
}

/// One decoded config table entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigRecord {
    pub variable: u32,
    pub config_id: u16,
    pub byte_size: u16,
    pub is_array: bool,
}

/// Iterator over the command table; bounded by the block's command count.
pub struct Commands<'a, 'b> {
    b: &'b BlockView<'a>,
    idx: usize,
}

/// Iterator over the config table; bounded by the block's total count.
pub struct Configs<'a, 'b> {
    b: &'b BlockView<'a>,
    idx: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BlockError {
    #[error("image too short to hold a block")]
    TooShort,
    #[error("no block magic found in image")]
    NoBlock,
    #[error("block magic found at more than one stride offset")]
    AmbiguousBlock,
    #[error("block magic mismatch")]
    BadMagic,
    #[error("nonzero table address with a zero entry count")]
    SentinelViolation,
    #[error("zero table address with a nonzero entry count")]
    NullTable,
    #[error("required config count exceeds total config count")]
    CountMismatch,
    #[error("table lies outside the image")]
    TableOutOfBounds,
    #[error("command ids not strictly ascending")]
    UnsortedCommands,
    #[error("config ids not strictly ascending within their half")]
    UnsortedConfigs,
    #[error("config id appears in both table halves")]
    DuplicateConfigId,
    #[error("stored checksum does not match image contents")]
    ChecksumMismatch,
}

fn read_u16_le(buf: &[u8], off: usize) -> Result<u16, BlockError> {
    let end = off.checked_add(2).ok_or(BlockError::TableOutOfBounds)?;
    let s = buf.get(off..end).ok_or(BlockError::TableOutOfBounds)?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

fn read_u32_le(buf: &[u8], off: usize) -> Result<u32, BlockError> {
    let end = off.checked_add(4).ok_or(BlockError::TableOutOfBounds)?;
    let s = buf.get(off..end).ok_or(BlockError::TableOutOfBounds)?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

impl<'a> BlockView<'a> {
    /// Parse and validate a block at a known image offset.
    ///
    /// `load_address` is the device address the start of `image` is linked
    /// at; it translates the block's table addresses into image offsets.
    ///
    /// # Errors
    ///
    /// Fails when the block does not fit, the magic is absent, a count
    /// field contradicts its table address sentinel, the required count
    /// exceeds the total, or a referenced table lies outside the image.
    pub fn parse_at(
        image: &'a [u8],
        offset: usize,
        load_address: u32,
    ) -> Result<Self, BlockError> {
        let end = offset.checked_add(BLOCK_SIZE).ok_or(BlockError::TooShort)?;
        if end > image.len() {
            return Err(BlockError::TooShort);
        }

        let magic = read_u32_le(image, offset + offsets::MAGIC)?;
        if magic != BLOCK_MAGIC {
            return Err(BlockError::BadMagic);
        }

        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&image[offset + offsets::NAME..offset + offsets::NAME + NAME_LEN]);

        let fields = BlockFields {
            hardware_type: image[offset + offsets::HARDWARE_TYPE],
            api_major: image[offset + offsets::API_MAJOR],
            api_minor: image[offset + offsets::API_MINOR],
            name,
            module_major: image[offset + offsets::MODULE_MAJOR],
            module_minor: image[offset + offsets::MODULE_MINOR],
            module_patch: image[offset + offsets::MODULE_PATCH],
            num_commands: image[offset + offsets::NUM_COMMANDS],
            num_required_configs: image[offset + offsets::NUM_REQUIRED_CONFIGS],
            num_total_configs: image[offset + offsets::NUM_TOTAL_CONFIGS],
            config_table: read_u32_le(image, offset + offsets::CONFIG_TABLE)?,
            command_table: read_u32_le(image, offset + offsets::COMMAND_TABLE)?,
            firmware_checksum: read_u32_le(image, offset + offsets::CHECKSUM)?,
        };

        if fields.num_required_configs > fields.num_total_configs {
            return Err(BlockError::CountMismatch);
        }

        let command_table_offset = table_offset(
            image,
            load_address,
            fields.command_table,
            fields.num_commands as usize,
            COMMAND_ENTRY_SIZE,
        )?;
        let config_table_offset = table_offset(
            image,
            load_address,
            fields.config_table,
            fields.num_total_configs as usize,
            CONFIG_ENTRY_SIZE,
        )?;

        Ok(Self {
            image,
            offset,
            fields,
            command_table_offset,
            config_table_offset,
        })
    }

    /// Locate the block by scanning for the magic at a block-sized stride.
    ///
    /// A correctly packaged image carries the magic at exactly one stride
    /// offset; zero matches or more than one are reported as errors rather
    /// than guessed around.
    ///
    /// # Errors
    ///
    /// [`BlockError::NoBlock`] / [`BlockError::AmbiguousBlock`] for the
    /// scan itself, plus anything [`Self::parse_at`] reports for the match.
    pub fn locate(image: &'a [u8], load_address: u32) -> Result<Self, BlockError> {
        if image.len() < BLOCK_SIZE {
            return Err(BlockError::TooShort);
        }

        let mut found = None;
        let mut offset = 0;
        while offset + BLOCK_SIZE <= image.len() {
            let magic = read_u32_le(image, offset + offsets::MAGIC)?;
            if magic == BLOCK_MAGIC {
                if found.is_some() {
                    return Err(BlockError::AmbiguousBlock);
                }
                found = Some(offset);
            }
            offset += BLOCK_SIZE;
        }

        let offset = found.ok_or(BlockError::NoBlock)?;
        Self::parse_at(image, offset, load_address)
    }

    /// The decoded block fields.
    #[must_use]
    pub const fn fields(&self) -> &BlockFields {
        &self.fields
    }

    /// Image offset the block was found at.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Image offset of the block's checksum field; the patch tool writes
    /// here.
    #[must_use]
    pub const fn checksum_offset(&self) -> usize {
        self.offset + offsets::CHECKSUM
    }

    /// Number of command table entries.
    #[must_use]
    pub const fn command_count(&self) -> usize {
        self.fields.num_commands as usize
    }

    /// Number of config table entries (required + optional).
    #[must_use]
    pub const fn config_count(&self) -> usize {
        self.fields.num_total_configs as usize
    }

    /// Fetch command entry `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.command_count()`; the table bounds were
    /// validated at parse time.
    #[must_use]
    pub fn command(&self, i: usize) -> CommandRecord {
        assert!(i < self.command_count());
        let Some(base) = self.command_table_offset else {
            unreachable!("a nonzero count implies a table offset")
        };
        let off = base + i * COMMAND_ENTRY_SIZE;
        CommandRecord {
            handler: self.u32_at(off),
            command_id: self.u16_at(off + 4),
            reserved: self.u16_at(off + 6),
        }
    }

    /// Fetch config entry `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.config_count()`.
    #[must_use]
    pub fn config(&self, i: usize) -> ConfigRecord {
        assert!(i < self.config_count());
        let Some(base) = self.config_table_offset else {
            unreachable!("a nonzero count implies a table offset")
        };
        let off = base + i * CONFIG_ENTRY_SIZE;
        let word = ConfigWord::from_bits(self.u16_at(off + 6));
        ConfigRecord {
            variable: self.u32_at(off),
            config_id: self.u16_at(off + 4),
            byte_size: word.byte_size(),
            is_array: word.is_array(),
        }
    }

    /// Little-endian reads inside the table spans validated at parse time.
    fn u16_at(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.image[off], self.image[off + 1]])
    }

    fn u32_at(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.image[off],
            self.image[off + 1],
            self.image[off + 2],
            self.image[off + 3],
        ])
    }

    /// Iterate the command table in stored order.
    #[must_use]
    pub const fn commands(&self) -> Commands<'a, '_> {
        Commands { b: self, idx: 0 }
    }

    /// Iterate the config table in stored order.
    #[must_use]
    pub const fn configs(&self) -> Configs<'a, '_> {
        Configs { b: self, idx: 0 }
    }

    /// Check the table ordering invariants.
    ///
    /// Commands must be strictly ascending by id; the config table must be
    /// a required prefix followed by an optional suffix, each strictly
    /// ascending, with no id shared between the halves. A violation is a
    /// packaging defect the consumer cannot repair.
    ///
    /// # Errors
    ///
    /// [`BlockError::UnsortedCommands`], [`BlockError::UnsortedConfigs`]
    /// or [`BlockError::DuplicateConfigId`].
    pub fn validate_tables(&self) -> Result<(), BlockError> {
        let mut prev: Option<u16> = None;
        for c in self.commands() {
            if prev.is_some_and(|p| p >= c.command_id) {
                return Err(BlockError::UnsortedCommands);
            }
            prev = Some(c.command_id);
        }

        let required = self.fields.num_required_configs as usize;
        let mut prev: Option<u16> = None;
        for (i, c) in self.configs().enumerate() {
            if i == required {
                prev = None;
            }
            if prev.is_some_and(|p| p >= c.config_id) {
                return Err(BlockError::UnsortedConfigs);
            }
            prev = Some(c.config_id);
        }

        for i in 0..required {
            for j in required..self.config_count() {
                if self.config(i).config_id == self.config(j).config_id {
                    return Err(BlockError::DuplicateConfigId);
                }
            }
        }
        Ok(())
    }

    /// Recompute the image checksum and compare it with the stored field.
    ///
    /// # Errors
    ///
    /// [`BlockError::ChecksumMismatch`] when they differ; the computed
    /// value is returned on success.
    pub fn verify_checksum(&self) -> Result<u32, BlockError> {
        let computed = checksum::image_checksum(self.image, self.checksum_offset());
        if computed == self.fields.firmware_checksum {
            Ok(computed)
        } else {
            Err(BlockError::ChecksumMismatch)
        }
    }
}

/// Translate a device table address into a bounds-checked image offset.
/// A zero count requires the zero sentinel and yields no offset.
fn table_offset(
    image: &[u8],
    load_address: u32,
    addr: u32,
    count: usize,
    entry_size: usize,
) -> Result<Option<usize>, BlockError> {
    if count == 0 {
        return if addr == 0 {
            Ok(None)
        } else {
            Err(BlockError::SentinelViolation)
        };
    }
    if addr == 0 {
        return Err(BlockError::NullTable);
    }

    let off = addr
        .checked_sub(load_address)
        .ok_or(BlockError::TableOutOfBounds)? as usize;
    let end = off
        .checked_add(count * entry_size)
        .ok_or(BlockError::TableOutOfBounds)?;
    if end > image.len() {
        return Err(BlockError::TableOutOfBounds);
    }
    Ok(Some(off))
}

impl Iterator for Commands<'_, '_> {
    type Item = CommandRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.b.command_count() {
            return None;
        }
        let i = self.idx;
        self.idx += 1;
        Some(self.b.command(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.b.command_count().saturating_sub(self.idx);
        (r, Some(r))
    }
}

impl core::iter::FusedIterator for Commands<'_, '_> {}

impl Iterator for Configs<'_, '_> {
    type Item = ConfigRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.b.config_count() {
            return None;
        }
        let i = self.idx;
        self.idx += 1;
        Some(self.b.config(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.b.config_count().saturating_sub(self.idx);
        (r, Some(r))
    }
}

impl core::iter::FusedIterator for Configs<'_, '_> {}
