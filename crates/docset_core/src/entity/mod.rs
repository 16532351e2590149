//! Entity trait and document codec.

mod descriptor;
mod key;

pub use descriptor::{descriptor_of, DescriptorBuilder, EntityDescriptor};
pub use key::EntityKey;

use crate::error::{DalError, DalResult};
use docset_store::{Document, ID_FIELD};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A persistable entity.
///
/// Entities serialize to JSON objects. The field named [`Entity::ID_FIELD`]
/// carries the identity and is stored under the reserved `_id` document
/// field; [`Entity::id`] must return that same value.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identity key type.
    type Key: EntityKey;

    /// Name of the serialized identity field.
    const ID_FIELD: &'static str = "id";

    /// The entity's identity.
    fn id(&self) -> Self::Key;
}

/// Serializes an entity into its stored document.
///
/// Strips ignored and navigation fields, moves the identity field under
/// `_id`, and enforces the discriminator allow-list for polymorphic types.
pub(crate) fn encode_document<T: Entity>(
    entity: &T,
    descriptor: &EntityDescriptor,
) -> DalResult<Document> {
    let value = serde_json::to_value(entity).map_err(DalError::codec)?;
    let Value::Object(mut doc) = value else {
        return Err(DalError::invalid_operation(
            "entities must serialize to objects",
        ));
    };
    doc.retain(|field, _| descriptor.is_persisted_field(field));
    if T::ID_FIELD != ID_FIELD {
        let id = doc.remove(T::ID_FIELD).ok_or_else(|| {
            DalError::invalid_operation(format!(
                "serialized entity is missing its identity field `{}`",
                T::ID_FIELD
            ))
        })?;
        doc.insert(ID_FIELD.to_owned(), id);
    }
    check_discriminator(&doc, descriptor)?;
    Ok(doc)
}

/// Deserializes a stored document back into an entity.
pub(crate) fn decode_document<T: Entity>(
    mut doc: Document,
    descriptor: &EntityDescriptor,
) -> DalResult<T> {
    check_discriminator(&doc, descriptor)?;
    if T::ID_FIELD != ID_FIELD {
        if let Some(id) = doc.remove(ID_FIELD) {
            doc.insert(T::ID_FIELD.to_owned(), id);
        }
    }
    serde_json::from_value(Value::Object(doc)).map_err(DalError::codec)
}

fn check_discriminator(doc: &Document, descriptor: &EntityDescriptor) -> DalResult<()> {
    let Some(tag) = descriptor.discriminator() else {
        return Ok(());
    };
    let variant = doc.get(tag).and_then(Value::as_str).ok_or_else(|| {
        DalError::invalid_operation(format!("document carries no `{tag}` discriminator"))
    })?;
    if !descriptor.is_allowed_variant(variant) {
        return Err(DalError::invalid_operation(format!(
            "discriminator value `{variant}` is not registered for this set"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: i64,
        owner: String,
        #[serde(default)]
        session_token: String,
    }

    impl Entity for Account {
        type Key = i64;

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "_t")]
    enum Shape {
        Circle { id: i64, radius: f64 },
        Square { id: i64, side: f64 },
    }

    impl Entity for Shape {
        type Key = i64;

        fn id(&self) -> i64 {
            match self {
                Self::Circle { id, .. } | Self::Square { id, .. } => *id,
            }
        }
    }

    fn shape_descriptor() -> EntityDescriptor {
        let arc = DescriptorBuilder::new()
            .discriminator("_t")
            .variant("Circle")
            .variant("Square")
            .register::<Shape>();
        (*arc).clone()
    }

    #[test]
    fn encode_moves_id_and_strips_ignored() {
        let descriptor = (*DescriptorBuilder::new()
            .ignore("session_token")
            .register::<Account>())
        .clone();
        let account = Account {
            id: 42,
            owner: "ada".into(),
            session_token: "secret".into(),
        };
        let doc = encode_document(&account, &descriptor).unwrap();
        assert_eq!(doc.get("_id"), Some(&json!(42)));
        assert!(!doc.contains_key("id"));
        assert!(!doc.contains_key("session_token"));
        assert_eq!(doc.get("owner"), Some(&json!("ada")));
    }

    #[test]
    fn decode_restores_id_field() {
        let doc = json!({"_id": 42, "owner": "ada"})
            .as_object()
            .unwrap()
            .clone();
        let account: Account = decode_document(doc, &EntityDescriptor::default()).unwrap();
        assert_eq!(
            account,
            Account {
                id: 42,
                owner: "ada".into(),
                session_token: String::new(),
            }
        );
    }

    #[test]
    fn tagged_enum_round_trips() {
        let descriptor = shape_descriptor();
        let shape = Shape::Circle {
            id: 1,
            radius: 2.5,
        };
        let doc = encode_document(&shape, &descriptor).unwrap();
        assert_eq!(doc.get("_t"), Some(&json!("Circle")));
        let back: Shape = decode_document(doc, &descriptor).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let descriptor = shape_descriptor();
        let doc = json!({"_id": 9, "_t": "Triangle", "sides": 3})
            .as_object()
            .unwrap()
            .clone();
        let err = decode_document::<Shape>(doc, &descriptor).unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }

    #[test]
    fn missing_discriminator_is_rejected() {
        let descriptor = shape_descriptor();
        let doc = json!({"_id": 9, "radius": 1.0}).as_object().unwrap().clone();
        let err = decode_document::<Shape>(doc, &descriptor).unwrap_err();
        assert!(matches!(err, DalError::InvalidOperation { .. }));
    }
}
