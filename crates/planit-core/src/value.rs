//! Values that cross the gateway.
//!
//! `WireValue` is the serialized form exchanged with the engine. `Arg` is the
//! local form of a call argument before marshaling: enums still need a remote
//! instance and proxies still need to be reduced to their handle.

use crate::enums::EnumRef;
use crate::proxy::Proxy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Opaque reference to an object living in the engine process.
///
/// The handle is a lookup key: the engine owns the object and the handle is
/// only meaningful while the engine that issued it is alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub id: String,
    /// Declared remote type name.
    #[serde(rename = "class")]
    pub type_name: String,
}

impl RemoteHandle {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
        }
    }

    /// Unqualified type name, used in log lines.
    pub fn short_type_name(&self) -> &str {
        self.type_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.type_name)
    }
}

impl std::fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.type_name, self.id)
    }
}

/// Serialized value exchanged over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<WireValue>),
    Object(RemoteHandle),
}

impl WireValue {
    /// Declared type label used in error context.
    pub fn type_label(&self) -> String {
        match self {
            WireValue::Null => "null".to_string(),
            WireValue::Bool(_) => "bool".to_string(),
            WireValue::Int(_) => "int".to_string(),
            WireValue::Float(_) => "float".to_string(),
            WireValue::String(_) => "string".to_string(),
            WireValue::List(_) => "list".to_string(),
            WireValue::Object(handle) => handle.type_name.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Float(f) => Some(*f),
            WireValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&RemoteHandle> {
        match self {
            WireValue::Object(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Int(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Float(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

/// A call argument before marshaling.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Scalar or list, sent unchanged.
    Value(WireValue),
    /// Local enum value; becomes a remote enum instance before the call.
    Enum(EnumRef),
    /// Proxy argument; replaced by its remote handle before the call.
    Object(Proxy),
}

impl Arg {
    /// Declared argument type, reported with remote invocation errors.
    pub fn type_label(&self) -> String {
        match self {
            Arg::Value(value) => value.type_label(),
            Arg::Enum(enum_ref) => enum_ref.remote_class.to_string(),
            Arg::Object(proxy) => proxy.remote_type().to_string(),
        }
    }
}

impl From<WireValue> for Arg {
    fn from(value: WireValue) -> Self {
        Arg::Value(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Value(WireValue::Bool(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Value(WireValue::Int(value.into()))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Value(WireValue::Int(value))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Value(WireValue::Int(value.into()))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Value(WireValue::Float(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(WireValue::String(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Value(WireValue::String(value))
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Value(WireValue::String(value.clone()))
    }
}

// Paths pass through as strings; the engine resolves them.
impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Value(WireValue::String(value.to_string_lossy().into_owned()))
    }
}

impl From<PathBuf> for Arg {
    fn from(value: PathBuf) -> Self {
        Arg::from(value.as_path())
    }
}

impl From<&PathBuf> for Arg {
    fn from(value: &PathBuf) -> Self {
        Arg::from(value.as_path())
    }
}

impl From<EnumRef> for Arg {
    fn from(value: EnumRef) -> Self {
        Arg::Enum(value)
    }
}

impl From<&Proxy> for Arg {
    fn from(value: &Proxy) -> Self {
        Arg::Object(value.clone())
    }
}

impl From<Proxy> for Arg {
    fn from(value: Proxy) -> Self {
        Arg::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_value_wire_shape() {
        let value = WireValue::Object(RemoteHandle::new("o7", "org.planit.project.PlanItSimpleProject"));
        let json = serde_json::to_value(&value).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "object",
                "value": {"id": "o7", "class": "org.planit.project.PlanItSimpleProject"}
            })
        );
    }

    #[test]
    fn test_null_and_list_wire_shape() {
        assert_eq!(serde_json::to_value(WireValue::Null).unwrap(), json!({"type": "null"}));

        let parsed: WireValue = serde_json::from_value(json!({
            "type": "list",
            "value": [{"type": "int", "value": 1}, {"type": "string", "value": "a"}]
        }))
        .unwrap();
        assert_eq!(
            parsed,
            WireValue::List(vec![WireValue::Int(1), WireValue::String("a".into())])
        );
    }

    #[test]
    fn test_as_f64_widens_integers() {
        assert_eq!(WireValue::Int(10).as_f64(), Some(10.0));
        assert_eq!(WireValue::String("10".into()).as_f64(), None);
    }

    #[test]
    fn test_path_argument_passes_through_as_string() {
        let arg = Arg::from(Path::new("route_choice/xml/initial_costs.csv"));
        match arg {
            Arg::Value(WireValue::String(s)) => assert_eq!(s, "route_choice/xml/initial_costs.csv"),
            other => panic!("Expected string value, got: {:?}", other),
        }
    }

    #[test]
    fn test_short_type_name() {
        let handle = RemoteHandle::new("o1", "org.planit.gap.StopCriterion");
        assert_eq!(handle.short_type_name(), "StopCriterion");
        assert_eq!(handle.to_string(), "org.planit.gap.StopCriterion@o1");
    }
}
