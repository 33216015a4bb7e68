//! # State Cache
//!
//! Last-known-good values for every polled field, keyed
//! `"category.field"` (`"battery.soc"`, `"es.bat_power"`, ...). A field
//! that was ever read successfully stays readable forever: failed polls
//! only clear the validity flag, never the value or its timestamp, so
//! consumers always see the most recent real reading together with honest
//! staleness metadata.
//!
//! Single writer (the poll scheduler), any number of readers.

use std::collections::HashMap;
use std::time::SystemTime;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use venuslink_wire::{Method, OperatingMode};

/// One cached field.
#[derive(Debug, Clone)]
pub struct FieldValue {
    pub value: Value,
    /// True when a unit conversion was applied at caching time
    /// (currently only the battery temperature decidegree scale).
    pub unit_applied: bool,
    /// When the value was last confirmed by a successful poll.
    pub updated_at: SystemTime,
    /// False while the most recent poll for this category failed.
    pub valid: bool,
}

/// Shared cache for one device.
#[derive(Debug, Default)]
pub struct StateCache {
    fields: RwLock<HashMap<String, FieldValue>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one successful `result` payload into the cache.
    ///
    /// Top-level fields of the result are upserted under the method's
    /// category. Fields absent from this reply keep their previous entry.
    pub async fn apply_result(&self, method: Method, result: &Value) {
        let Some(category) = method.category() else {
            return;
        };
        let Some(object) = result.as_object() else {
            debug!(%method, "Ignoring non-object result payload");
            return;
        };

        let now = SystemTime::now();
        let mut fields = self.fields.write().await;
        for (name, raw) in object {
            let (value, unit_applied) = convert_units(category, name, raw);
            fields.insert(
                format!("{category}.{name}"),
                FieldValue {
                    value,
                    unit_applied,
                    updated_at: now,
                    valid: true,
                },
            );
        }
        debug!(%method, category, fields = object.len(), "Cache updated");
    }

    /// Records a failed poll: every field of the method's category keeps
    /// its value and timestamp but is flagged stale.
    pub async fn mark_failed(&self, method: Method) {
        let Some(category) = method.category() else {
            return;
        };
        let prefix = format!("{category}.");
        let mut fields = self.fields.write().await;
        for (key, field) in fields.iter_mut() {
            if key.starts_with(&prefix) {
                field.valid = false;
            }
        }
        debug!(%method, category, "Category flagged stale");
    }

    /// Point-in-time copy of every cached field.
    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            taken_at: SystemTime::now(),
            fields: self.fields.read().await.clone(),
        }
    }
}

/// Applies known unit conversions. Returns the stored value and whether a
/// conversion happened.
fn convert_units(category: &str, field: &str, raw: &Value) -> (Value, bool) {
    if category == "battery" && field == "bat_temp" {
        if let Some(decidegrees) = raw.as_f64() {
            if let Some(celsius) = serde_json::Number::from_f64(decidegrees / 10.0) {
                return (Value::Number(celsius), true);
            }
        }
    }
    (raw.clone(), false)
}

/// An immutable view of the cache at one instant.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub taken_at: SystemTime,
    fields: HashMap<String, FieldValue>,
}

impl StateSnapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|f| f.value.as_f64())
    }

    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|f| f.value.as_str())
    }

    /// Boolean field, accepting the 0/1 encoding older firmware uses.
    #[must_use]
    pub fn flag(&self, key: &str) -> Option<bool> {
        let field = self.fields.get(key)?;
        field
            .value
            .as_bool()
            .or_else(|| field.value.as_f64().map(|n| n != 0.0))
    }

    /// Battery state of charge, percent.
    #[must_use]
    pub fn battery_soc(&self) -> Option<f64> {
        self.number("battery.soc")
    }

    /// Battery temperature in degrees Celsius (scale already applied).
    #[must_use]
    pub fn battery_temperature(&self) -> Option<f64> {
        self.number("battery.bat_temp")
    }

    /// Current operating mode, when the firmware reported a known one.
    #[must_use]
    pub fn operating_mode(&self) -> Option<OperatingMode> {
        self.string("es_mode.mode").and_then(|m| m.parse().ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterates fields of one category, `("field", value)` pairs.
    pub fn category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a FieldValue)> + 'a {
        self.fields.iter().filter_map(move |(key, field)| {
            let rest = key.strip_prefix(category)?.strip_prefix('.')?;
            Some((rest, field))
        })
    }
}
