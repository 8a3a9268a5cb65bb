//! Dynamically typed property values and the mapping between them and Rust field types.

use std::{collections::HashMap, fmt};

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Information about an enumeration usable as a property type. Usually created by [`config_enum!`](crate::config_enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumInfo {
    /// Name of the enum in Rust code.
    pub name: &'static str,
    /// Canonical variant names.
    pub variants: &'static [&'static str],
}

impl EnumInfo {
    /// Finds a variant by its name, ignoring ASCII case.
    pub fn variant(&self, name: &str) -> Option<&'static str> {
        self.variants
            .iter()
            .copied()
            .find(|variant| variant.eq_ignore_ascii_case(name))
    }
}

/// Kind of property, i.e. which coercion is applied to the raw string before it is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// String.
    String,
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// UUID.
    Guid,
    /// Enumeration with the specified variants.
    Enum(&'static EnumInfo),
    /// Comma-separated array of strings.
    StringArray,
    /// Type that cannot be bound automatically. The enclosed string is the type name.
    Unsupported(&'static str),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => formatter.write_str("string"),
            Self::Bool => formatter.write_str("bool"),
            Self::Int => formatter.write_str("int"),
            Self::Long => formatter.write_str("long"),
            Self::Float => formatter.write_str("float"),
            Self::Double => formatter.write_str("double"),
            Self::Guid => formatter.write_str("guid"),
            Self::Enum(info) => write!(formatter, "enum `{}`", info.name),
            Self::StringArray => formatter.write_str("string array"),
            Self::Unsupported(ty) => write!(formatter, "`{ty}`"),
        }
    }
}

/// Property value as seen by binders, validations and disclosure.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value.
    #[default]
    Null,
    /// String value.
    String(String),
    /// Boolean value.
    Bool(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// UUID.
    Guid(Uuid),
    /// Canonical name of an enum variant.
    Enum(&'static str),
    /// Array of strings.
    StringArray(Vec<String>),
    /// Value of a type without automatic binding, in its display form.
    Opaque(String),
}

impl Value {
    /// Checks whether this value is `null` or stringifies to an empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) | Self::Opaque(s) => s.is_empty(),
            Self::StringArray(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some((*value).into()),
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some((*value).into()),
            Self::Double(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)] // acceptable for range checks
            Self::Int(_) | Self::Long(_) => self.as_i64().map(|value| value as f64),
            _ => None,
        }
    }
}

/// Stringifies the value the way it is disclosed. `null` is an empty string; arrays are joined with `", "`.
impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) | Self::Opaque(s) => formatter.write_str(s),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Long(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value}"),
            Self::Double(value) => write!(formatter, "{value}"),
            Self::Guid(value) => write!(formatter, "{value}"),
            Self::Enum(name) => formatter.write_str(name),
            Self::StringArray(items) => formatter.write_str(&items.join(", ")),
        }
    }
}

/// Rust type that can be used as a configuration property.
///
/// Implemented for the supported primitive types, [`Option`]s of them, [`SecretString`] and
/// a few containers that are displayed but never bound automatically (`Vec<i32>`, `Vec<i64>`, `HashMap<String, String>`).
/// Enums can implement this trait with the help of the [`config_enum!`](crate::config_enum) macro.
pub trait FieldType: Send + Sync + 'static {
    /// Kind of the property. For `Option<T>`, this is the kind of `T`.
    const KIND: ValueKind;

    /// Converts a coerced value into this type. Returns `None` if the value has an unexpected shape.
    fn from_value(value: Value) -> Option<Self>
    where
        Self: Sized;

    /// Converts this field into a value.
    fn to_value(&self) -> Value;

    /// Whether the field holds a secret and should be masked by default.
    fn is_secret() -> bool {
        false
    }
}

macro_rules! impl_field_type {
    ($($ty:ty => $variant:ident,)*) => {
        $(
        impl FieldType for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(value) => Some(value),
                    _ => None,
                }
            }

            #[allow(clippy::clone_on_copy)] // some types are `Copy`
            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }
        )*
    };
}

impl_field_type!(
    String => String,
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Uuid => Guid,
    Vec<String> => StringArray,
);

impl FieldType for SecretString {
    const KIND: ValueKind = ValueKind::String;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.into()),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.expose_secret().to_owned())
    }

    fn is_secret() -> bool {
        true
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            value => T::from_value(value).map(Some),
        }
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn is_secret() -> bool {
        T::is_secret()
    }
}

macro_rules! impl_unsupported_field_type {
    ($($ty:ty => $name:literal,)*) => {
        $(
        impl FieldType for $ty {
            const KIND: ValueKind = ValueKind::Unsupported($name);

            fn from_value(_value: Value) -> Option<Self> {
                None
            }

            fn to_value(&self) -> Value {
                Value::Opaque(format!("{self:?}"))
            }
        }
        )*
    };
}

impl_unsupported_field_type!(
    Vec<i32> => "Vec<i32>",
    Vec<i64> => "Vec<i64>",
    HashMap<String, String> => "HashMap<String, String>",
);

/// Implements [`FieldType`] for a field-less enum, so that it can be used as a configuration property.
///
/// All enum variants must be listed; the variant names are used for case-insensitive matching.
///
/// # Examples
///
/// ```
/// use config_gate::{config_enum, value::{FieldType, Value, ValueKind}};
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Mode {
///     Primary,
///     Replica,
/// }
///
/// config_enum!(Mode { Primary, Replica });
///
/// let ValueKind::Enum(info) = Mode::KIND else { unreachable!() };
/// assert_eq!(info.variant("REPLICA"), Some("Replica"));
/// assert_eq!(Mode::from_value(Value::Enum("Primary")), Some(Mode::Primary));
/// ```
#[macro_export]
macro_rules! config_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::value::FieldType for $ty {
            const KIND: $crate::value::ValueKind =
                $crate::value::ValueKind::Enum(&$crate::value::EnumInfo {
                    name: stringify!($ty),
                    variants: &[$(stringify!($variant)),+],
                });

            fn from_value(value: $crate::value::Value) -> Option<Self> {
                match value {
                    $crate::value::Value::Enum(name) => match name {
                        $(stringify!($variant) => Some(Self::$variant),)+
                        _ => None,
                    },
                    _ => None,
                }
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Enum(match self {
                    $(Self::$variant => stringify!($variant),)+
                })
            }
        }
    };
}
