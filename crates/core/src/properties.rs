use std::sync::Weak;
use thiserror::Error;

/// Access permissions for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Property kind/type metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyKind {
    Boolean,
    Integer,
    Float,
    Enumeration,
    /// Trigger-style property; writing executes an action, reads return `None`.
    Command,
}

/// Property value variants.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::PropertyValue;
///
/// let v = PropertyValue::Int(64);
/// assert_eq!(v, PropertyValue::Int(64));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum PropertyValue {
    /// No value (commands, unset ranges).
    None,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Index into an enumeration menu.
    Enum(u32),
}

/// Typed failures for property access.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("property '{0}' is not available")]
    NotAvailable(String),
    #[error("value out of range for property '{0}'")]
    OutOfRange(String),
    #[error("property '{0}' is read-only")]
    ReadOnly(String),
    #[error("value kind does not match property '{0}'")]
    WrongKind(String),
    #[error("device communication failed for property '{0}'")]
    DeviceCommunication(String),
}

impl PropertyError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PropertyError::NotAvailable(_) => "not_available",
            PropertyError::OutOfRange(_) => "out_of_range",
            PropertyError::ReadOnly(_) => "read_only",
            PropertyError::WrongKind(_) => "wrong_kind",
            PropertyError::DeviceCommunication(_) => "device_comm",
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, PropertyError::DeviceCommunication(_))
    }
}

/// Static descriptor plus runtime range for one adjustable parameter.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
///
/// let meta = PropertyMeta {
///     name: "whitebalance.red".into(),
///     unit: None,
///     kind: PropertyKind::Integer,
///     access: Access::ReadWrite,
///     min: PropertyValue::Int(0),
///     max: PropertyValue::Int(255),
///     default: PropertyValue::Int(64),
///     step: Some(PropertyValue::Int(1)),
///     menu: None,
/// };
/// assert!(meta.validate(&PropertyValue::Int(32)));
/// assert!(!meta.validate(&PropertyValue::Int(300)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyMeta {
    /// Stable dotted name, e.g. `whitebalance.red`.
    pub name: String,
    /// Unit of measure, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: Option<String>,
    /// Kind of property/value type.
    pub kind: PropertyKind,
    /// Access permissions.
    pub access: Access,
    /// Minimum accepted value.
    pub min: PropertyValue,
    /// Maximum accepted value.
    pub max: PropertyValue,
    /// Default value.
    pub default: PropertyValue,
    /// Optional step size for ranged properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub step: Option<PropertyValue>,
    /// Optional enumerated menu entries (for enumeration properties).
    #[cfg_attr(feature = "serde", serde(default))]
    pub menu: Option<Vec<String>>,
}

impl PropertyMeta {
    /// Shorthand for a read-write integer range.
    pub fn int_range(name: &str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            unit: None,
            kind: PropertyKind::Integer,
            access: Access::ReadWrite,
            min: PropertyValue::Int(min),
            max: PropertyValue::Int(max),
            default: PropertyValue::Int(default),
            step: Some(PropertyValue::Int(1)),
            menu: None,
        }
    }

    /// Shorthand for a read-write boolean.
    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.into(),
            unit: None,
            kind: PropertyKind::Boolean,
            access: Access::ReadWrite,
            min: PropertyValue::Bool(false),
            max: PropertyValue::Bool(true),
            default: PropertyValue::Bool(default),
            step: None,
            menu: None,
        }
    }

    /// Basic range validation respecting the variant.
    pub fn validate(&self, candidate: &PropertyValue) -> bool {
        if let Some(menu) = &self.menu {
            if let PropertyValue::Enum(idx) = candidate {
                return (*idx as usize) < menu.len();
            }
            return false;
        }

        match (candidate, &self.min, &self.max) {
            (PropertyValue::Bool(_), _, _) => self.kind == PropertyKind::Boolean,
            (PropertyValue::Int(v), PropertyValue::Int(min), PropertyValue::Int(max)) => {
                if v < min || v > max {
                    return false;
                }
                if let Some(PropertyValue::Int(step)) = &self.step {
                    if *step > 0 {
                        return ((v - min) % step) == 0;
                    }
                }
                true
            }
            (PropertyValue::Float(v), PropertyValue::Float(min), PropertyValue::Float(max)) => {
                v >= min && v <= max
            }
            (PropertyValue::None, _, _) => self.kind == PropertyKind::Command,
            _ => false,
        }
    }
}

/// Storage a property handle routes reads and writes through.
///
/// Implemented by devices (hardware registers) and by software filters
/// (in-memory state the worker thread consults per frame).
pub trait PropertyBackend: Send + Sync {
    fn read(&self, name: &str) -> Result<PropertyValue, PropertyError>;
    fn write(&self, name: &str, value: PropertyValue) -> Result<(), PropertyError>;
}

/// Live handle to one adjustable parameter.
///
/// Holds a weak reference to its backend; a handle outliving its pipeline
/// reports `NotAvailable` instead of dangling.
#[derive(Clone)]
pub struct Property {
    meta: PropertyMeta,
    backend: Weak<dyn PropertyBackend>,
}

impl Property {
    pub fn new(meta: PropertyMeta, backend: Weak<dyn PropertyBackend>) -> Self {
        Self { meta, backend }
    }

    /// Descriptor for this property.
    pub fn meta(&self) -> &PropertyMeta {
        &self.meta
    }

    /// Stable dotted name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Read the current value.
    pub fn get(&self) -> Result<PropertyValue, PropertyError> {
        let backend = self
            .backend
            .upgrade()
            .ok_or_else(|| PropertyError::NotAvailable(self.meta.name.clone()))?;
        backend.read(&self.meta.name)
    }

    /// Write a new value after access and range checks.
    pub fn set(&self, value: PropertyValue) -> Result<(), PropertyError> {
        if self.meta.access == Access::ReadOnly {
            return Err(PropertyError::ReadOnly(self.meta.name.clone()));
        }
        if !self.meta.validate(&value) {
            return Err(PropertyError::OutOfRange(self.meta.name.clone()));
        }
        let backend = self
            .backend
            .upgrade()
            .ok_or_else(|| PropertyError::NotAvailable(self.meta.name.clone()))?;
        backend.write(&self.meta.name, value)
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.meta.name)
            .field("kind", &self.meta.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::{collections::HashMap, sync::Arc};

    struct MapBackend {
        values: Mutex<HashMap<String, PropertyValue>>,
    }

    impl PropertyBackend for MapBackend {
        fn read(&self, name: &str) -> Result<PropertyValue, PropertyError> {
            self.values
                .lock()
                .get(name)
                .copied()
                .ok_or_else(|| PropertyError::NotAvailable(name.into()))
        }

        fn write(&self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
            self.values.lock().insert(name.into(), value);
            Ok(())
        }
    }

    fn backend_with(name: &str, value: PropertyValue) -> Arc<MapBackend> {
        let mut map = HashMap::new();
        map.insert(name.to_string(), value);
        Arc::new(MapBackend {
            values: Mutex::new(map),
        })
    }

    #[test]
    fn int_range_validates_bounds_and_step() {
        let meta = PropertyMeta::int_range("gain", 0, 255, 64);
        assert!(meta.validate(&PropertyValue::Int(0)));
        assert!(meta.validate(&PropertyValue::Int(255)));
        assert!(!meta.validate(&PropertyValue::Int(-1)));
        assert!(!meta.validate(&PropertyValue::Int(256)));
        assert!(!meta.validate(&PropertyValue::Bool(true)));
    }

    #[test]
    fn menu_validates_index() {
        let meta = PropertyMeta {
            name: "trigger.mode".into(),
            unit: None,
            kind: PropertyKind::Enumeration,
            access: Access::ReadWrite,
            min: PropertyValue::None,
            max: PropertyValue::None,
            default: PropertyValue::Enum(0),
            step: None,
            menu: Some(vec!["off".into(), "rising".into()]),
        };
        assert!(meta.validate(&PropertyValue::Enum(1)));
        assert!(!meta.validate(&PropertyValue::Enum(2)));
    }

    #[test]
    fn set_round_trips_through_backend() {
        let backend = backend_with("gain", PropertyValue::Int(64));
        let prop = Property::new(
            PropertyMeta::int_range("gain", 0, 255, 64),
            Arc::downgrade(&backend) as Weak<dyn PropertyBackend>,
        );
        prop.set(PropertyValue::Int(128)).unwrap();
        assert_eq!(prop.get().unwrap(), PropertyValue::Int(128));
    }

    #[test]
    fn set_rejects_out_of_range() {
        let backend = backend_with("gain", PropertyValue::Int(64));
        let prop = Property::new(
            PropertyMeta::int_range("gain", 0, 255, 64),
            Arc::downgrade(&backend) as Weak<dyn PropertyBackend>,
        );
        assert!(matches!(
            prop.set(PropertyValue::Int(1000)),
            Err(PropertyError::OutOfRange(_))
        ));
    }

    #[test]
    fn dropped_backend_reports_not_available() {
        let prop = {
            let backend = backend_with("gain", PropertyValue::Int(64));
            Property::new(
                PropertyMeta::int_range("gain", 0, 255, 64),
                Arc::downgrade(&backend) as Weak<dyn PropertyBackend>,
            )
        };
        assert!(matches!(prop.get(), Err(PropertyError::NotAvailable(_))));
    }

    #[test]
    fn read_only_rejects_writes() {
        let backend = backend_with("sensor.temp", PropertyValue::Float(41.5));
        let meta = PropertyMeta {
            name: "sensor.temp".into(),
            unit: Some("C".into()),
            kind: PropertyKind::Float,
            access: Access::ReadOnly,
            min: PropertyValue::Float(-40.0),
            max: PropertyValue::Float(120.0),
            default: PropertyValue::Float(0.0),
            step: None,
            menu: None,
        };
        let prop = Property::new(meta, Arc::downgrade(&backend) as Weak<dyn PropertyBackend>);
        assert!(matches!(
            prop.set(PropertyValue::Float(0.0)),
            Err(PropertyError::ReadOnly(_))
        ));
    }
}
