use serde_json::Value as Json;

use super::ValueSource;

/// Hierarchical source backed by a JSON object.
///
/// Keys are paths with segments separated by `:` or `.`; segments are matched ignoring ASCII case.
/// Scalar leaves are stringified; arrays of scalars are joined with `,` so that they can be bound to string arrays.
/// Objects and `null`s are not values.
///
/// # Examples
///
/// ```
/// use config_gate::source::{Hierarchical, ValueSource};
/// use serde_json::json;
///
/// let source = Hierarchical::new(json!({
///     "Database": { "Port": 5432, "Hosts": ["a", "b"] },
/// }));
/// assert_eq!(source.get("database:port").as_deref(), Some("5432"));
/// assert_eq!(source.get("Database.Hosts").as_deref(), Some("a,b"));
/// assert_eq!(source.get("Database").as_deref(), None);
/// ```
#[derive(Debug, Clone)]
pub struct Hierarchical {
    root: Json,
}

impl Hierarchical {
    /// Wraps a JSON value. Non-object values produce an empty source.
    pub fn new(root: Json) -> Self {
        Self { root }
    }

    fn lookup(&self, key: &str) -> Option<&Json> {
        key.split([':', '.'])
            .map(str::trim)
            .try_fold(&self.root, |node, segment| {
                let Json::Object(map) = node else {
                    return None;
                };
                map.get(segment).or_else(|| {
                    map.iter()
                        .find_map(|(name, child)| name.eq_ignore_ascii_case(segment).then_some(child))
                })
            })
    }

    fn stringify_scalar(value: &Json) -> Option<String> {
        match value {
            Json::String(s) => Some(s.clone()),
            Json::Bool(flag) => Some(flag.to_string()),
            Json::Number(number) => Some(number.to_string()),
            Json::Null | Json::Array(_) | Json::Object(_) => None,
        }
    }
}

impl ValueSource for Hierarchical {
    fn get_raw(&self, key: &str) -> Option<String> {
        match self.lookup(key)? {
            Json::Array(items) => {
                let items: Option<Vec<_>> = items.iter().map(Self::stringify_scalar).collect();
                Some(items?.join(","))
            }
            value => Self::stringify_scalar(value),
        }
    }
}
