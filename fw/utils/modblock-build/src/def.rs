use crate::error::BuildError;

/// Element types a config variable may declare.
///
/// The set matches what module definition files accept; every element is
/// stored little-endian at its natural alignment.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ElementType {
    U8,
    I8,
    Char,
    U16,
    I16,
    U32,
    I32,
}

impl ElementType {
    /// Storage size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Char => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
        }
    }

    /// Encode one element value, range-checked against the type.
    pub(crate) fn encode(self, name: &str, value: i64) -> Result<Vec<u8>, BuildError> {
        let out_of_range = || BuildError::DefaultOutOfRange {
            name: name.to_owned(),
            value,
            ty: self,
        };

        match self {
            Self::U8 | Self::Char => {
                let v = u8::try_from(value).map_err(|_| out_of_range())?;
                Ok(vec![v])
            }
            Self::I8 => {
                let v = i8::try_from(value).map_err(|_| out_of_range())?;
                Ok(v.to_le_bytes().to_vec())
            }
            Self::U16 => {
                let v = u16::try_from(value).map_err(|_| out_of_range())?;
                Ok(v.to_le_bytes().to_vec())
            }
            Self::I16 => {
                let v = i16::try_from(value).map_err(|_| out_of_range())?;
                Ok(v.to_le_bytes().to_vec())
            }
            Self::U32 => {
                let v = u32::try_from(value).map_err(|_| out_of_range())?;
                Ok(v.to_le_bytes().to_vec())
            }
            Self::I32 => {
                let v = i32::try_from(value).map_err(|_| out_of_range())?;
                Ok(v.to_le_bytes().to_vec())
            }
        }
    }
}

/// Scalar or fixed-capacity array storage shape.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shape {
    Scalar,
    Array { capacity: usize },
}

/// Compiled-in default value of an optional config variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// A single integer; for an array this is a one-element payload.
    Int(i64),
    /// A string payload for char arrays; stored with a trailing NUL.
    Str(String),
    /// An integer list for arrays. The single-element list `[0]` means an
    /// explicitly empty array, per the long-standing definition-file idiom.
    List(Vec<i64>),
}

/// One config variable definition as supplied by the module author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDef {
    /// Symbol name of the backing variable.
    pub name: String,
    pub ty: ElementType,
    pub shape: Shape,
    /// Required variables get zero-initialized storage and no default;
    /// optional variables must carry one.
    pub required: bool,
    pub default: Option<DefaultValue>,
}

impl ConfigDef {
    /// A required scalar.
    #[must_use]
    pub fn required_scalar(name: &str, ty: ElementType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            shape: Shape::Scalar,
            required: true,
            default: None,
        }
    }

    /// A required array of `capacity` elements.
    #[must_use]
    pub fn required_array(name: &str, ty: ElementType, capacity: usize) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            shape: Shape::Array { capacity },
            required: true,
            default: None,
        }
    }

    /// An optional scalar with its default.
    #[must_use]
    pub fn optional_scalar(name: &str, ty: ElementType, default: i64) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            shape: Shape::Scalar,
            required: false,
            default: Some(DefaultValue::Int(default)),
        }
    }

    /// An optional array with its default payload.
    #[must_use]
    pub fn optional_array(
        name: &str,
        ty: ElementType,
        capacity: usize,
        default: DefaultValue,
    ) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            shape: Shape::Array { capacity },
            required: false,
            default: Some(default),
        }
    }

    /// Declared data size in bytes: element size × element count. Array
    /// record headers are not part of the declared size.
    #[must_use]
    pub const fn data_size(&self) -> usize {
        match self.shape {
            Shape::Scalar => self.ty.size(),
            Shape::Array { capacity } => capacity * self.ty.size(),
        }
    }

    /// Encode the default into its payload bytes.
    ///
    /// Returns `None` for required variables. The `[0]` list on an array
    /// shape encodes the explicitly empty payload.
    pub(crate) fn encode_default(&self) -> Result<Option<Vec<u8>>, BuildError> {
        let Some(default) = &self.default else {
            return Ok(None);
        };

        let payload = match default {
            DefaultValue::Int(v) => self.ty.encode(&self.name, *v)?,
            DefaultValue::Str(s) => {
                if self.ty != ElementType::Char || !matches!(self.shape, Shape::Array { .. }) {
                    return Err(BuildError::StringDefaultType(self.name.clone()));
                }
                let mut bytes = s.clone().into_bytes();
                bytes.push(0);
                bytes
            }
            DefaultValue::List(values) => {
                if matches!(self.shape, Shape::Array { .. }) && matches!(values.as_slice(), [0]) {
                    Vec::new()
                } else {
                    let mut bytes = Vec::with_capacity(values.len() * self.ty.size());
                    for v in values {
                        bytes.extend_from_slice(&self.ty.encode(&self.name, *v)?);
                    }
                    bytes
                }
            }
        };

        if payload.len() > self.data_size() {
            return Err(BuildError::OversizedDefault {
                name: self.name.clone(),
                need: payload.len(),
                have: self.data_size(),
            });
        }
        Ok(Some(payload))
    }
}
