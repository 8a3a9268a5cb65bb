//! Conversions of raw string values into typed values.
//!
//! All conversions share the same contract: `None` or an empty string never reaches the parser, and a parse failure
//! yields `None` rather than an error. The caller supplies the default with [`Option::or_else()`] or [`or_default()`]:
//!
//! ```
//! use config_gate::coerce;
//!
//! assert_eq!(coerce::or_default(coerce::int(Some("42")), || Some(8)), Some(42));
//! assert_eq!(coerce::or_default(coerce::int(Some("four")), || Some(8)), Some(8));
//! assert_eq!(coerce::or_default(coerce::int(Some("")), || None), None);
//! ```

use std::fmt;

use uuid::Uuid;

use crate::value::{EnumInfo, Value, ValueKind};

/// Function rewriting a raw enum value into a canonical variant name before matching.
/// Returns `None` to leave the raw value as is.
pub type Remap = fn(&str) -> Option<&'static str>;

/// Error returned by [`value()`] for kinds that cannot be coerced from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported(pub ValueKind);

impl fmt::Display for Unsupported {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "type {} is not supported for binding", self.0)
    }
}

impl std::error::Error for Unsupported {}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.is_empty())
}

/// Applies the default supplier if the value is missing.
pub fn or_default<T>(value: Option<T>, default: impl FnOnce() -> Option<T>) -> Option<T> {
    value.or_else(default)
}

/// Returns an owned string. An empty string is treated as a missing value.
pub fn string(raw: Option<&str>) -> Option<String> {
    non_empty(raw).map(str::to_owned)
}

/// Parses a Boolean value: `true` / `1` / `yes` or `false` / `0` / `no`, case-insensitive.
pub fn boolean(raw: Option<&str>) -> Option<bool> {
    let raw = non_empty(raw)?.trim();
    if ["true", "1", "yes"].iter().any(|s| raw.eq_ignore_ascii_case(s)) {
        Some(true)
    } else if ["false", "0", "no"].iter().any(|s| raw.eq_ignore_ascii_case(s)) {
        Some(false)
    } else {
        None
    }
}

macro_rules! parse_fns {
    ($($(#[$attr:meta])* $name:ident -> $ty:ty,)*) => {
        $(
        $(#[$attr])*
        pub fn $name(raw: Option<&str>) -> Option<$ty> {
            non_empty(raw)?.trim().parse().ok()
        }
        )*
    };
}

parse_fns!(
    /// Parses a 32-bit signed integer.
    int -> i32,
    /// Parses a 64-bit signed integer.
    long -> i64,
    /// Parses a single-precision float.
    float -> f32,
    /// Parses a double-precision float.
    double -> f64,
);

/// Parses a UUID in any of the formats supported by [`Uuid::parse_str()`].
pub fn guid(raw: Option<&str>) -> Option<Uuid> {
    Uuid::parse_str(non_empty(raw)?.trim()).ok()
}

/// Splits a comma-separated list, trimming each element. Empty elements are dropped;
/// if no elements remain, the value is considered missing.
pub fn string_array(raw: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<_> = non_empty(raw)?
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Matches an enum variant ignoring ASCII case. If `remap` is provided, it is applied to the raw value *before* matching.
pub fn enum_variant(raw: Option<&str>, info: &EnumInfo, remap: Option<Remap>) -> Option<&'static str> {
    let raw = non_empty(raw)?.trim();
    let candidate = remap.and_then(|remap| remap(raw)).unwrap_or(raw);
    info.variant(candidate)
}

/// Coerces a raw value according to the `kind`. A missing or unparseable value results in [`Value::Null`].
///
/// # Errors
///
/// Returns an error if `kind` is [`ValueKind::Unsupported`].
pub fn value(raw: Option<&str>, kind: ValueKind, remap: Option<Remap>) -> Result<Value, Unsupported> {
    let value = match kind {
        ValueKind::String => string(raw).map(Value::String),
        ValueKind::Bool => boolean(raw).map(Value::Bool),
        ValueKind::Int => int(raw).map(Value::Int),
        ValueKind::Long => long(raw).map(Value::Long),
        ValueKind::Float => float(raw).map(Value::Float),
        ValueKind::Double => double(raw).map(Value::Double),
        ValueKind::Guid => guid(raw).map(Value::Guid),
        ValueKind::Enum(info) => enum_variant(raw, info, remap).map(Value::Enum),
        ValueKind::StringArray => string_array(raw).map(Value::StringArray),
        ValueKind::Unsupported(_) => return Err(Unsupported(kind)),
    };
    Ok(value.unwrap_or_default())
}
