//! Entity identity keys.

use serde_json::Value;
use uuid::Uuid;

/// Identity key of an entity.
///
/// A key converts losslessly to and from the store's identity value and
/// knows whether it still holds its type's default ("unset") value. Every
/// mutating operation rejects unset keys before touching the store.
pub trait EntityKey: Clone + PartialEq + Send + Sync + 'static {
    /// Whether this key holds the type's default value.
    fn is_unset(&self) -> bool;

    /// The store-side identity value for this key.
    fn to_value(&self) -> Value;

    /// Reads a key back from a store-side identity value.
    ///
    /// Returns `None` when the value is not of this key's shape.
    fn from_value(value: &Value) -> Option<Self>;
}

impl EntityKey for i64 {
    fn is_unset(&self) -> bool {
        *self == 0
    }

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl EntityKey for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl EntityKey for Uuid {
    fn is_unset(&self) -> bool {
        self.is_nil()
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_key_defaults() {
        assert!(0i64.is_unset());
        assert!(!7i64.is_unset());
        assert_eq!(7i64.to_value(), json!(7));
        assert_eq!(i64::from_value(&json!(7)), Some(7));
        assert_eq!(i64::from_value(&json!("7")), None);
    }

    #[test]
    fn string_key_defaults() {
        assert!(String::new().is_unset());
        assert!(!"a".to_string().is_unset());
        assert_eq!(String::from_value(&json!("a")), Some("a".to_string()));
    }

    #[test]
    fn uuid_key_round_trip() {
        assert!(Uuid::nil().is_unset());
        let id = Uuid::new_v4();
        assert!(!id.is_unset());
        assert_eq!(Uuid::from_value(&id.to_value()), Some(id));
        assert_eq!(Uuid::from_value(&json!("not-a-uuid")), None);
    }
}
