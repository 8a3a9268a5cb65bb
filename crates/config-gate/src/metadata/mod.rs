//! Configuration metadata.
//!
//! Metadata for a configuration type is assembled once by [`Configuration::describe()`](crate::Configuration::describe())
//! using [`ConfigDescriptor::builder()`]. Each bound field is declared with a [`Param`], which ties a property name
//! to a typed [`Field`] accessor (usually created with the [`field!`](crate::field) macro).

use std::{any, borrow::Cow, fmt};

use futures::future::BoxFuture;

use crate::{
    coerce::Remap,
    validation::Validate,
    value::{FieldType, Value, ValueKind},
};


/// Display mode for a property during disclosure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisclosureMode {
    /// Always emit the property.
    #[default]
    Always,
    /// Never emit the property.
    Never,
    /// Emit the property only if its value is not empty.
    IfNotEmpty,
    /// Emit the property with its value replaced by a mask.
    Masked,
}

/// Disclosure policy for a property or a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisclosurePolicy {
    /// Display mode.
    pub mode: DisclosureMode,
    /// Header emitted before the first property using this policy. Properties under a header are indented.
    pub header: Option<Cow<'static, str>>,
}

impl DisclosurePolicy {
    /// Creates a policy with the specified mode and no header.
    pub const fn new(mode: DisclosureMode) -> Self {
        Self { mode, header: None }
    }

    /// Sets the header for this policy.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<Cow<'static, str>>) -> Self {
        self.header = Some(header.into());
        self
    }
}

impl From<DisclosureMode> for DisclosurePolicy {
    fn from(mode: DisclosureMode) -> Self {
        Self::new(mode)
    }
}

/// Typed accessor for a field of configuration `T` of type `V`.
pub struct Field<T, V> {
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Field")
            .field("ty", &any::type_name::<V>())
            .finish_non_exhaustive()
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> Field<T, V> {
    /// Creates an accessor from a pair of projection functions.
    pub const fn new(get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self {
        Self { get, get_mut }
    }
}

/// Creates a [`Field`] accessor for a named field of a configuration struct.
///
/// # Examples
///
/// ```
/// use config_gate::{field, metadata::Field};
///
/// #[derive(Debug, Default)]
/// struct Config {
///     port: i32,
/// }
///
/// let port: Field<Config, i32> = field!(Config, port);
/// # let _ = port;
/// ```
#[macro_export]
macro_rules! field {
    ($ty:ty, $field:ident) => {
        $crate::metadata::Field::new(
            |config: &$ty| &config.$field,
            |config: &mut $ty| &mut config.$field,
        )
    };
}

trait ErasedField<T>: Send + Sync {
    fn get(&self, config: &T) -> Value;

    /// Returns `false` if the value has an unexpected shape for the field type.
    fn set(&self, config: &mut T, value: Value) -> bool;
}

impl<T: 'static, V: FieldType> ErasedField<T> for Field<T, V> {
    fn get(&self, config: &T) -> Value {
        (self.get)(config).to_value()
    }

    fn set(&self, config: &mut T, value: Value) -> bool {
        match V::from_value(value) {
            Some(value) => {
                *(self.get_mut)(config) = value;
                true
            }
            None => false,
        }
    }
}

/// Builder for a single property of a configuration. Passed to [`ConfigDescriptorBuilder::param()`].
pub struct Param<T, V> {
    name: &'static str,
    field: Field<T, V>,
    source_keys: Option<Vec<String>>,
    secret_ref: bool,
    disclosure: Option<DisclosurePolicy>,
    remap: Option<Remap>,
    validations: Vec<Box<dyn Validate<Value>>>,
}

impl<T, V> fmt::Debug for Param<T, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Param")
            .field("name", &self.name)
            .field("source_keys", &self.source_keys)
            .field("secret_ref", &self.secret_ref)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, V: FieldType> Param<T, V> {
    /// Creates a property with the specified name. The property is not bound until [keys](Self::keys()) are specified.
    pub fn new(name: &'static str, field: Field<T, V>) -> Self {
        Self {
            name,
            field,
            source_keys: None,
            secret_ref: false,
            disclosure: None,
            remap: None,
            validations: Vec::new(),
        }
    }

    /// Specifies the ordered list of source keys to probe. Each item may itself be a comma-separated key chain.
    ///
    /// # Panics
    ///
    /// [`ConfigDescriptorBuilder::param()`] panics if the resulting list is empty.
    #[must_use]
    pub fn keys<S: AsRef<str>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        let keys = keys
            .into_iter()
            .flat_map(|chain| {
                chain
                    .as_ref()
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect();
        self.source_keys = Some(keys);
        self
    }

    /// Marks the property as a possible secret reference. After binding, if the value is a vault reference URL,
    /// it is replaced with the secret it points to.
    #[must_use]
    pub fn secret_ref(mut self) -> Self {
        self.secret_ref = true;
        self
    }

    /// Sets the disclosure policy for this property, overriding the configuration-wide one.
    #[must_use]
    pub fn disclose(mut self, policy: impl Into<DisclosurePolicy>) -> Self {
        self.disclosure = Some(policy.into());
        self
    }

    /// Shortcut for masking the property value on disclosure.
    #[must_use]
    pub fn masked(self) -> Self {
        self.disclose(DisclosureMode::Masked)
    }

    /// Sets a function rewriting raw values before they are matched against enum variants.
    #[must_use]
    pub fn remap(mut self, remap: Remap) -> Self {
        self.remap = Some(remap);
        self
    }

    /// Shortcut for the [`Required`](crate::validation::Required) validation.
    #[must_use]
    pub fn required(self) -> Self {
        self.validate(crate::validation::Required)
    }

    /// Adds a validation for the property value.
    #[must_use]
    pub fn validate(mut self, validation: impl Validate<Value>) -> Self {
        self.validations.push(Box::new(validation));
        self
    }

    fn into_descriptor(self) -> PropertyDescriptor<T> {
        if let Some(keys) = &self.source_keys {
            assert!(
                !keys.is_empty(),
                "property `{}` declares an empty list of source keys",
                self.name
            );
        }
        PropertyDescriptor {
            name: self.name,
            kind: V::KIND,
            source_keys: self.source_keys.unwrap_or_default(),
            secret_ref: self.secret_ref,
            secret_type: V::is_secret(),
            disclosure: self.disclosure,
            remap: self.remap,
            validations: self.validations,
            field: Box::new(self.field),
        }
    }
}

/// Metadata for a single configuration property.
pub struct PropertyDescriptor<T> {
    name: &'static str,
    kind: ValueKind,
    source_keys: Vec<String>,
    secret_ref: bool,
    secret_type: bool,
    disclosure: Option<DisclosurePolicy>,
    remap: Option<Remap>,
    validations: Vec<Box<dyn Validate<Value>>>,
    field: Box<dyn ErasedField<T>>,
}

impl<T> fmt::Debug for PropertyDescriptor<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source_keys", &self.source_keys)
            .field("secret_ref", &self.secret_ref)
            .field("disclosure", &self.disclosure)
            .field("validations", &self.validations)
            .finish_non_exhaustive()
    }
}

impl<T> PropertyDescriptor<T> {
    /// Property name. Used as the disclosure label and in validation reports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Kind of the property value.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Ordered source keys. Empty if the property is not bound automatically.
    pub fn source_keys(&self) -> &[String] {
        &self.source_keys
    }

    /// Is this property a possible secret reference?
    pub fn is_secret_ref(&self) -> bool {
        self.secret_ref
    }

    /// Does this property carry a secret, either as a reference or by its type?
    pub fn is_secret(&self) -> bool {
        self.secret_ref || self.secret_type
    }

    /// Property-level disclosure policy, if any.
    pub fn disclosure(&self) -> Option<&DisclosurePolicy> {
        self.disclosure.as_ref()
    }

    /// Enum remapping function, if any.
    pub fn remap(&self) -> Option<Remap> {
        self.remap
    }

    /// Validations for the property value.
    pub fn validations(&self) -> impl Iterator<Item = &dyn Validate<Value>> + '_ {
        self.validations.iter().map(AsRef::as_ref)
    }

    /// Gets the current property value from the config.
    pub fn get(&self, config: &T) -> Value {
        self.field.get(config)
    }

    /// Sets the property value. Returns `false` if the value has an unexpected shape and was not assigned.
    pub fn set(&self, config: &mut T, value: Value) -> bool {
        self.field.set(config, value)
    }
}

/// Action performed by a custom setter.
pub(crate) enum SetterAction<T> {
    Sync(Box<dyn Fn(&mut T) + Send + Sync>),
    Async(Box<dyn for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>),
}

/// Custom post-binding step for a configuration.
pub struct SetterDescriptor<T> {
    name: &'static str,
    order: i32,
    pub(crate) action: SetterAction<T>,
}

impl<T> fmt::Debug for SetterDescriptor<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let is_async = matches!(self.action, SetterAction::Async(_));
        formatter
            .debug_struct("SetterDescriptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("is_async", &is_async)
            .finish()
    }
}

impl<T> SetterDescriptor<T> {
    /// Setter name used in logs and violations.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Order of this setter. Setters run in the ascending order.
    pub fn order(&self) -> i32 {
        self.order
    }
}

/// Metadata for a configuration type: its properties, custom setters, disclosure policy and validations.
pub struct ConfigDescriptor<T> {
    name: &'static str,
    properties: Vec<PropertyDescriptor<T>>,
    setters: Vec<SetterDescriptor<T>>,
    disclosure: Option<DisclosurePolicy>,
    validations: Vec<Box<dyn Validate<T>>>,
}

impl<T: 'static> fmt::Debug for ConfigDescriptor<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigDescriptor")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("setters", &self.setters)
            .field("disclosure", &self.disclosure)
            .field("validations", &self.validations)
            .finish()
    }
}

impl<T: 'static> ConfigDescriptor<T> {
    /// Starts building a descriptor.
    pub fn builder() -> ConfigDescriptorBuilder<T> {
        let type_name = any::type_name::<T>();
        let name = type_name
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(type_name);
        ConfigDescriptorBuilder {
            inner: ConfigDescriptor {
                name,
                properties: Vec::new(),
                setters: Vec::new(),
                disclosure: None,
                validations: Vec::new(),
            },
        }
    }

    /// Human-readable name of the configuration.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Properties in the registration order.
    pub fn properties(&self) -> &[PropertyDescriptor<T>] {
        &self.properties
    }

    /// Custom setters in the execution order.
    pub fn setters(&self) -> &[SetterDescriptor<T>] {
        &self.setters
    }

    /// Configuration-wide disclosure policy, if any.
    pub fn disclosure(&self) -> Option<&DisclosurePolicy> {
        self.disclosure.as_ref()
    }

    /// Whole-configuration validations.
    pub fn validations(&self) -> impl Iterator<Item = &dyn Validate<T>> + '_ {
        self.validations.iter().map(AsRef::as_ref)
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor<T>> {
        self.properties.iter().find(|prop| prop.name == name)
    }
}

/// Builder for [`ConfigDescriptor`].
#[must_use = "must be finalized with `build()`"]
pub struct ConfigDescriptorBuilder<T> {
    inner: ConfigDescriptor<T>,
}

impl<T: 'static> fmt::Debug for ConfigDescriptorBuilder<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigDescriptorBuilder")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<T: 'static> ConfigDescriptorBuilder<T> {
    /// Overrides the configuration name used in logs and validation reports.
    pub fn name(mut self, name: &'static str) -> Self {
        self.inner.name = name;
        self
    }

    /// Adds a property.
    ///
    /// # Panics
    ///
    /// Panics if the property declares an empty list of source keys, or if a property with the same name
    /// is already registered.
    pub fn param<V: FieldType>(mut self, param: Param<T, V>) -> Self {
        assert!(
            self.inner.property(param.name).is_none(),
            "property `{}` is registered twice for configuration `{}`",
            param.name,
            self.inner.name
        );
        self.inner.properties.push(param.into_descriptor());
        self
    }

    /// Adds a synchronous custom setter.
    pub fn setter<F>(mut self, name: &'static str, order: i32, setter: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.inner.setters.push(SetterDescriptor {
            name,
            order,
            action: SetterAction::Sync(Box::new(setter)),
        });
        self
    }

    /// Adds an asynchronous custom setter. Errors returned by the setter are reported as validation violations.
    pub fn async_setter<F>(mut self, name: &'static str, order: i32, setter: F) -> Self
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.inner.setters.push(SetterDescriptor {
            name,
            order,
            action: SetterAction::Async(Box::new(setter)),
        });
        self
    }

    /// Sets the configuration-wide disclosure policy.
    pub fn disclose(mut self, policy: impl Into<DisclosurePolicy>) -> Self {
        self.inner.disclosure = Some(policy.into());
        self
    }

    /// Adds a whole-configuration validation.
    pub fn validate(mut self, validation: impl Validate<T>) -> Self {
        self.inner.validations.push(Box::new(validation));
        self
    }

    /// Finalizes the descriptor.
    pub fn build(mut self) -> ConfigDescriptor<T> {
        // `sort_by_key` is stable, so setters with equal order keep their registration order.
        self.inner.setters.sort_by_key(|setter| setter.order);
        self.inner
    }
}
