//! Binding of raw values to configuration properties.

use crate::{
    coerce::{self, Unsupported},
    error::{Violation, ViolationKind},
    lookup::CachedLookup,
    metadata::ConfigDescriptor,
    value::Value,
};

/// Binds properties of `config` that declare source keys. Never fails: unsupported property types are recorded
/// in `violations` and surface during validation; missing or unparseable values leave the property untouched.
#[tracing::instrument(level = "debug", skip_all, fields(config = descriptor.name()))]
pub(crate) fn bind<T: 'static>(
    config: &mut T,
    descriptor: &ConfigDescriptor<T>,
    lookup: &CachedLookup,
    violations: &mut Vec<Violation>,
) {
    for property in descriptor.properties() {
        let keys = property.source_keys();
        if keys.is_empty() {
            continue;
        }
        let Some(raw) = lookup.get_first(keys.iter().map(String::as_str)) else {
            continue;
        };

        match coerce::value(Some(&raw), property.kind(), property.remap()) {
            Err(Unsupported(kind)) => {
                violations.push(Violation::property(
                    property.name(),
                    ViolationKind::Binding,
                    format!("cannot bind a value of type {kind}; set it with a custom setter instead"),
                ));
            }
            Ok(Value::Null) => {
                tracing::warn!(
                    property = property.name(),
                    kind = %property.kind(),
                    "cannot parse configured value; keeping the default"
                );
            }
            Ok(value) => {
                if !property.set(config, value) {
                    tracing::warn!(property = property.name(), "coerced value does not fit the property");
                }
            }
        }
    }
}
