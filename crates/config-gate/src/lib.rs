//! `config-gate` – declarative, once-per-process resolution of strongly typed configuration.
//!
//! # Overview
//!
//! Each configuration type declares its [properties](metadata::Param) in a [descriptor](metadata::ConfigDescriptor):
//! the source keys each property is bound from, whether the property holds a reference to a vault secret,
//! how the property is disclosed in logs, and which validations apply. The type implements [`Configuration`],
//! which ties the descriptor to the type.
//!
//! Configurations are obtained from a [`ConfigHost`]. On the first request for a type, the host runs
//! the resolution pipeline for it exactly once:
//!
//! 1. Wait for the [prerequisite](prerequisite::Prerequisite), e.g. a prefetch of a
//!    [remote key–value store](source::RemoteKeyValueLoad).
//! 2. Create the default instance and bind properties from a [value source](source::ValueSource). Each property
//!    may list several keys (a *key chain*); the first key with a non-empty value wins.
//! 3. Run custom setters (sync or async) in their declared order.
//! 4. Replace [vault references](secrets) in secret reference properties with the secrets they point to.
//! 5. [Disclose](disclosure) property values, masking secrets.
//! 6. [Validate](validation) the config; all problems found on the way are aggregated into a single
//!    [`ValidationReport`].
//!
//! The outcome (either the config wrapped in an `Arc`, or the validation report) is cached; concurrent
//! and later requests receive the same outcome. Cancelled requests and prerequisite failures are not cached.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use config_gate::{
//!     config_enum, field,
//!     metadata::{ConfigDescriptor, DisclosureMode, Param},
//!     source::KeyValueMap,
//!     ConfigHost, Configuration,
//! };
//!
//! #[derive(Debug, Clone, Copy, Default, PartialEq)]
//! enum Tier {
//!     #[default]
//!     Free,
//!     Paid,
//! }
//!
//! config_enum!(Tier { Free, Paid });
//!
//! #[derive(Debug)]
//! struct ApiConfig {
//!     base_url: String,
//!     timeout_secs: i32,
//!     tier: Tier,
//!     api_key: String,
//!     timeout: Duration,
//! }
//!
//! impl Default for ApiConfig {
//!     fn default() -> Self {
//!         Self {
//!             base_url: "http://localhost".into(),
//!             timeout_secs: 30,
//!             tier: Tier::Free,
//!             api_key: String::new(),
//!             timeout: Duration::ZERO,
//!         }
//!     }
//! }
//!
//! impl Configuration for ApiConfig {
//!     fn describe() -> ConfigDescriptor<Self> {
//!         ConfigDescriptor::builder()
//!             .param(Param::new("BaseUrl", field!(ApiConfig, base_url)).keys(["API_BASE_URL", "BASE_URL"]))
//!             .param(
//!                 Param::new("TimeoutSecs", field!(ApiConfig, timeout_secs))
//!                     .keys(["API_TIMEOUT"])
//!                     .validate(1_i64..=300),
//!             )
//!             .param(Param::new("Tier", field!(ApiConfig, tier)).keys(["API_TIER"]))
//!             .param(
//!                 Param::new("ApiKey", field!(ApiConfig, api_key))
//!                     .keys(["API_KEY"])
//!                     .secret_ref()
//!                     .required(),
//!             )
//!             .setter("timeout", 0, |config| {
//!                 config.timeout = Duration::from_secs(config.timeout_secs.unsigned_abs().into());
//!             })
//!             .disclose(DisclosureMode::IfNotEmpty)
//!             .build()
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let source = KeyValueMap::default().with([
//!     ("BASE_URL", "https://api.example.com"),
//!     ("API_TIMEOUT", "10"),
//!     ("API_TIER", "paid"),
//!     ("API_KEY", "s3cr3t"),
//! ]);
//! let host = ConfigHost::builder().source(source).build();
//! let config = host.get::<ApiConfig>().await?;
//! assert_eq!(config.base_url, "https://api.example.com");
//! assert_eq!(config.tier, Tier::Paid);
//! assert_eq!(config.timeout, Duration::from_secs(10));
//! # anyhow::Ok(())
//! # }).unwrap();
//! ```
//!
//! # Supported property types
//!
//! Properties bound from sources may have the following types (see [`FieldType`](value::FieldType)):
//!
//! - `String`, `bool`, `i32`, `i64`, `f32`, `f64`
//! - [`Uuid`](uuid::Uuid)
//! - Enums implementing [`FieldType`](value::FieldType) via [`config_enum!`]
//! - `Vec<String>` parsed from comma-separated values
//! - [`SecretString`](secrecy::SecretString), which is always masked in disclosure
//! - `Option<_>` of any type above
//!
//! Other types (e.g., `Vec<i32>`) can be declared, but binding a value to them is reported as a violation;
//! such properties should be set by custom setters instead.

// Linter settings
#![warn(missing_docs)]

pub use self::{
    error::{ResolveError, UsageError, ValidationReport, Violation, ViolationKind},
    gate::{GateState, ResolutionGate},
    host::{ConfigHost, ConfigHostBuilder},
    settings::{LogLevel, WiringSettings},
};
use self::metadata::ConfigDescriptor;

mod bind;
pub mod coerce;
pub mod disclosure;
mod error;
mod gate;
mod host;
pub mod lookup;
pub mod metadata;
pub mod prerequisite;
pub mod secrets;
mod settings;
mod setters;
pub mod source;
pub mod testing;
pub mod validation;
pub mod value;

/// Configuration type resolved by a [`ConfigHost`].
///
/// The default instance provides values for properties that are not found in sources.
pub trait Configuration: Default + Send + Sync + 'static {
    /// Describes properties, setters, disclosure and validations of this configuration.
    fn describe() -> ConfigDescriptor<Self>;

    /// Performs whole-object validation after properties are bound and secrets are resolved.
    /// Returned violations are added to the validation report.
    fn validate(&self) -> Vec<Violation> {
        Vec::new()
    }
}
