use crate::def::ElementType;

/// Definition errors caught while compiling a module's tables.
///
/// All of these abort table generation; no entry is ever silently dropped
/// or coalesced. They are reported to whoever drives the builder and never
/// propagate into a firmware image.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("module name `{0}` does not fit the 6-byte name field")]
    NameTooLong(String),
    #[error("duplicate command id {0:#06x}")]
    DuplicateCommandId(u16),
    #[error("duplicate config id {0:#06x}")]
    DuplicateConfigId(u16),
    #[error("config `{0}` declares an array of zero elements")]
    ZeroLengthArray(String),
    #[error("config `{0}` is required but declares a default value")]
    RequiredHasDefault(String),
    #[error("config `{0}` is optional but declares no default value")]
    OptionalWithoutDefault(String),
    #[error("config `{name}` default needs {need} bytes but declares only {have}")]
    OversizedDefault {
        name: String,
        need: usize,
        have: usize,
    },
    #[error("config `{name}` default value {value} does not fit element type {ty:?}")]
    DefaultOutOfRange {
        name: String,
        value: i64,
        ty: ElementType,
    },
    #[error("config `{0}` takes a string default only as a char array")]
    StringDefaultType(String),
    #[error("config `{0}` declares a data size wider than the 15-bit entry field")]
    SizeFieldOverflow(String),
    #[error("too many commands ({0}); the block count field is one byte")]
    TooManyCommands(usize),
    #[error("too many config variables ({0}); the block count field is one byte")]
    TooManyConfigs(usize),
}
