//! Gate configuration
//!
//! [`GateConfig`] holds the two construction parameters of a gate. Files
//! describe them under a `[bulkhead]` section, with optional per-service
//! overrides:
//!
//! ```toml
//! [bulkhead]
//! capacity = 10
//! timeout = "500ms"
//!
//! [bulkhead.services.auth]
//! capacity = 2
//! ```
//!
//! Durations are written as integer milliseconds or as a string with a unit
//! suffix (`ms`, `s`, `m`, `h`). They always serialize as milliseconds.
//!
//! With the `config` feature, [`loader`] reads these settings from the
//! environment or from TOML/JSON files.

use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::gate::validate_capacity;

#[cfg(feature = "config")]
pub mod loader;

/// Capacity and admission timeout for one gate
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GateConfig {
    /// Maximum number of concurrent operations; must be positive
    pub capacity: i64,
    /// Maximum time a caller waits for a permit; zero means no waiting
    #[cfg_attr(feature = "serde", serde(with = "duration_serde"))]
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { capacity: 10, timeout: Duration::from_secs(5) }
    }
}

impl GateConfig {
    /// Create a new configuration builder
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`GateError::InvalidCapacity`] for a non-positive capacity.
    pub fn validate(&self) -> GateResult<()> {
        validate_capacity(self.capacity).map(|_| ())
    }
}

/// Builder for GateConfig
#[derive(Debug)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl Default for GateConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GateConfigBuilder {
    pub fn new() -> Self {
        Self { config: GateConfig::default() }
    }

    pub fn capacity(mut self, capacity: i64) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.config.timeout = Duration::ZERO;
        self
    }

    pub fn build(self) -> GateResult<GateConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-service override; unset fields fall back to the section defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GateOverride {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub capacity: Option<i64>,
    #[cfg_attr(
        feature = "serde",
        serde(with = "duration_serde::option", skip_serializing_if = "Option::is_none")
    )]
    pub timeout: Option<Duration>,
}

impl GateOverride {
    fn apply(&self, defaults: &GateConfig) -> GateConfig {
        GateConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            timeout: self.timeout.unwrap_or(defaults.timeout),
        }
    }
}

/// The `[bulkhead]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BulkheadSettings {
    /// Settings used by every gate without an override
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub defaults: GateConfig,
    /// Overrides keyed by resource/service name
    pub services: BTreeMap<String, GateOverride>,
}

impl BulkheadSettings {
    /// Settings with the given defaults and no overrides
    pub fn new(defaults: GateConfig) -> Self {
        Self { defaults, services: BTreeMap::new() }
    }

    /// Add or replace the override for `service`
    pub fn with_service(mut self, service: impl Into<String>, settings: GateOverride) -> Self {
        self.services.insert(service.into(), settings);
        self
    }

    /// Resolve the effective configuration for `service`
    pub fn for_service(&self, service: &str) -> GateConfig {
        self.services
            .get(service)
            .map_or_else(|| self.defaults.clone(), |settings| settings.apply(&self.defaults))
    }

    /// Validate the defaults and every resolved override
    ///
    /// # Errors
    /// Returns [`GateError::Config`] naming the first invalid entry.
    pub fn validate(&self) -> GateResult<()> {
        self.defaults
            .validate()
            .map_err(|e| GateError::config(format!("bulkhead defaults: {e}")))?;
        for service in self.services.keys() {
            self.for_service(service)
                .validate()
                .map_err(|e| GateError::config(format!("bulkhead service '{service}': {e}")))?;
        }
        Ok(())
    }
}

/// Parse a duration written as integer milliseconds or with a unit suffix
///
/// Accepted units are `ms`, `s`, `m` and `h`; a bare number means
/// milliseconds.
///
/// # Errors
/// Returns a description of the problem for empty input, unknown units or
/// values that overflow.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid duration '{input}': expected a number"));
    }

    let value: u64 = digits.parse().map_err(|e| format!("invalid duration '{input}': {e}"))?;
    let seconds_per_unit = match unit.trim() {
        "" | "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("invalid duration '{input}': unknown unit '{other}'")),
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("invalid duration '{input}': value too large"))
}

#[cfg(feature = "serde")]
mod duration_serde {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("milliseconds or a duration string such as \"250ms\" or \"2s\"")
        }

        fn visit_u64<E: de::Error>(self, millis: u64) -> Result<Duration, E> {
            Ok(Duration::from_millis(millis))
        }

        fn visit_i64<E: de::Error>(self, millis: i64) -> Result<Duration, E> {
            u64::try_from(millis)
                .map(Duration::from_millis)
                .map_err(|_| E::custom(format!("duration must not be negative, got {millis}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            super::parse_duration(value).map_err(E::custom)
        }
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> super::SerializeResult<S>
        where
            S: Serializer,
        {
            match duration {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(duration)| duration))
        }
    }
}
