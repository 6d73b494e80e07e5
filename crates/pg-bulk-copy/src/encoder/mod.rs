//! Encoder registry and the tiered resolution algorithm.
//!
//! An encoder turns one host value into the [`PgValue`] written for a
//! destination column. Encoders are resolved once per column before any row
//! is streamed, walking these tiers in order (first hit wins):
//!
//! 1. User extensions registered for the exact (host type, wire type) pair
//! 2. `Optional(T)` is unwrapped one layer at a time and retried
//! 3. Semantic pairs (temporal, interval, JSON, network, geometric columns)
//! 4. Arrays by element type
//! 5. Ranges by element type
//! 6. Geometric host types into their own or an unknown column type
//! 7. Declared host type equal to the source type
//! 8. Checked conversion to the declared host type
//!
//! Built-in tables are immutable. Only the user-extension tier changes at
//! runtime; it lives in a [`DashMap`] so registration and resolution may run
//! concurrently.

mod builtin;
pub mod convert;
pub mod natural;
mod network;
pub mod temporal;

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::debug;

use crate::core::{HostType, HostValue, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

/// Deepest `Optional` nesting that resolution unwraps.
const MAX_OPTIONAL_DEPTH: usize = 8;

/// Transformation of a host value into its protocol representation.
///
/// Encoders are stateless and shared between sessions. They never receive
/// [`HostValue::Null`]; the writer emits a protocol null instead.
pub trait Encoder: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str;

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue>;
}

/// Encoder backed by a plain function.
pub struct FnEncoder {
    name: String,
    f: fn(&HostValue, WireType) -> Result<PgValue>,
}

impl FnEncoder {
    pub fn new(name: impl Into<String>, f: fn(&HostValue, WireType) -> Result<PgValue>) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl Encoder for FnEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        (self.f)(value, wire)
    }
}

/// Encoder that converts the value with a user function and writes the
/// result through the natural mapping of the wire type.
pub struct ConverterEncoder<F> {
    name: String,
    convert: F,
}

impl<F> ConverterEncoder<F>
where
    F: Fn(&HostValue) -> Result<HostValue> + Send + Sync,
{
    pub fn new(name: impl Into<String>, convert: F) -> Self {
        Self {
            name: name.into(),
            convert,
        }
    }
}

impl<F> Encoder for ConverterEncoder<F>
where
    F: Fn(&HostValue) -> Result<HostValue> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        let converted = (self.convert)(value)?;
        if converted.is_null() {
            return Err(BulkCopyError::Conversion(format!(
                "converter {} returned null",
                self.name
            )));
        }
        natural::to_wire(&converted, wire)
    }
}

/// Key of the user-extension tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderKey {
    pub host: HostType,
    pub wire: WireType,
}

impl EncoderKey {
    pub fn new(host: HostType, wire: WireType) -> Self {
        Self { host, wire }
    }
}

/// Tier an encoder was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Custom,
    Semantic,
    Array,
    Range,
    Geometry,
    SameType,
    Convert,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Custom => "custom",
            Tier::Semantic => "semantic",
            Tier::Array => "array",
            Tier::Range => "range",
            Tier::Geometry => "geometry",
            Tier::SameType => "same-type",
            Tier::Convert => "convert",
        })
    }
}

/// An encoder bound to a destination column.
#[derive(Clone)]
pub struct ResolvedEncoder {
    pub encoder: Arc<dyn Encoder>,
    pub tier: Tier,
}

impl ResolvedEncoder {
    pub fn name(&self) -> &str {
        self.encoder.name()
    }

    pub fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        self.encoder.encode(value, wire)
    }
}

impl fmt::Debug for ResolvedEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEncoder")
            .field("name", &self.encoder.name())
            .field("tier", &self.tier)
            .finish()
    }
}

/// User-extension tier on top of the built-in tables.
#[derive(Default)]
pub struct EncoderRegistry {
    custom: DashMap<EncoderKey, Arc<dyn Encoder>>,
}

static GLOBAL: LazyLock<EncoderRegistry> = LazyLock::new(EncoderRegistry::new);

impl EncoderRegistry {
    /// Create an isolated registry with no user extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by writers unless another one is injected.
    pub fn global() -> &'static EncoderRegistry {
        &GLOBAL
    }

    /// Register an encoder for an exact (host, wire) pair.
    ///
    /// Returns the encoder it replaced, if any.
    pub fn register(
        &self,
        host: HostType,
        wire: WireType,
        encoder: Arc<dyn Encoder>,
    ) -> Option<Arc<dyn Encoder>> {
        debug!("Registering encoder {} for {} -> {}", encoder.name(), host, wire);
        self.custom.insert(EncoderKey::new(host, wire), encoder)
    }

    /// Register a value converter whose output is written through the
    /// natural mapping of `wire`.
    pub fn register_converter<F>(
        &self,
        host: HostType,
        wire: WireType,
        convert: F,
    ) -> Option<Arc<dyn Encoder>>
    where
        F: Fn(&HostValue) -> Result<HostValue> + Send + Sync + 'static,
    {
        let name = format!("converter {} -> {}", host, wire);
        self.register(host, wire, Arc::new(ConverterEncoder::new(name, convert)))
    }

    /// Remove a user extension. Returns whether one was registered.
    pub fn unregister(&self, host: HostType, wire: WireType) -> bool {
        self.custom.remove(&EncoderKey::new(host, wire)).is_some()
    }

    /// Remove every user extension.
    pub fn clear(&self) {
        self.custom.clear();
    }

    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    fn custom(&self, host: HostType, wire: WireType) -> Option<Arc<dyn Encoder>> {
        self.custom
            .get(&EncoderKey::new(host, wire))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve the encoder for a column of type `wire` fed by `source` values.
    ///
    /// `declared` is the host type the column naturally maps to.
    pub fn resolve(
        &self,
        wire: WireType,
        declared: HostType,
        source: HostType,
    ) -> Result<ResolvedEncoder> {
        let mut current = source;
        for _ in 0..=MAX_OPTIONAL_DEPTH {
            if let Some(encoder) = self.custom(current, wire) {
                return Ok(ResolvedEncoder {
                    encoder,
                    tier: Tier::Custom,
                });
            }
            match current {
                HostType::Optional(inner) => current = *inner,
                _ => {
                    return builtin::BUILTIN
                        .lookup(wire, declared, current)
                        .map(|(encoder, tier)| ResolvedEncoder { encoder, tier })
                        .ok_or(BulkCopyError::Resolution {
                            wire_type: wire,
                            host_type: source,
                        });
                }
            }
        }
        Err(BulkCopyError::Resolution {
            wire_type: wire,
            host_type: source,
        })
    }
}

/// Register an encoder in the global registry.
pub fn register_encoder(
    host: HostType,
    wire: WireType,
    encoder: Arc<dyn Encoder>,
) -> Option<Arc<dyn Encoder>> {
    EncoderRegistry::global().register(host, wire, encoder)
}

/// Register a value converter in the global registry.
pub fn register_converter<F>(host: HostType, wire: WireType, convert: F) -> Option<Arc<dyn Encoder>>
where
    F: Fn(&HostValue) -> Result<HostValue> + Send + Sync + 'static,
{
    EncoderRegistry::global().register_converter(host, wire, convert)
}

/// Remove an encoder from the global registry.
pub fn unregister_encoder(host: HostType, wire: WireType) -> bool {
    EncoderRegistry::global().unregister(host, wire)
}

/// Remove every user extension from the global registry.
pub fn clear_custom_encoders() {
    EncoderRegistry::global().clear();
}
