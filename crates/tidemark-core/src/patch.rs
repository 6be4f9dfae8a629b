//! Declarative schema patches
//!
//! A patch describes one change to a [`Schema`]. Applying a patch consumes a
//! snapshot and returns the changed snapshot, or a [`SchemaError`] if the
//! snapshot does not have the shape the patch expects.

use crate::error::SchemaError;
use crate::schema::{Collection, Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One declarative change to a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    /// Add a new collection
    CreateCollection { collection: Collection },

    /// Drop a collection (by id or name)
    DeleteCollection { collection: String },

    /// Add a field, or replace the field with the same id
    ///
    /// A replaced field keeps its position unless `at` is given, in which
    /// case it moves there.
    AddField {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<usize>,
        field: Field,
    },

    /// Remove a field by id
    RemoveField { collection: String, field_id: String },

    /// Merge attributes into a collection; nested objects merge recursively
    UpdateCollection {
        collection: String,
        set: Map<String, Value>,
    },
}

impl Patch {
    /// Apply this patch to a snapshot
    pub fn apply(&self, mut schema: Schema) -> Result<Schema, SchemaError> {
        match self {
            Patch::CreateCollection { collection } => {
                if schema.position(&collection.id).is_some() {
                    return Err(SchemaError::CollectionExists(collection.id.clone()));
                }
                if schema.position(&collection.name).is_some() {
                    return Err(SchemaError::CollectionExists(collection.name.clone()));
                }
                schema.collections.push(collection.clone());
            }
            Patch::DeleteCollection { collection } => {
                let index = schema
                    .position(collection)
                    .ok_or_else(|| SchemaError::CollectionNotFound(collection.clone()))?;
                schema.collections.remove(index);
            }
            Patch::AddField {
                collection,
                at,
                field,
            } => {
                let target = find_mut(&mut schema, collection)?;
                match (target.field_position(&field.id), at) {
                    (Some(existing), None) => target.fields[existing] = field.clone(),
                    (Some(existing), Some(at)) => {
                        target.fields.remove(existing);
                        let index = (*at).min(target.fields.len());
                        target.fields.insert(index, field.clone());
                    }
                    (None, _) => {
                        let index = at.unwrap_or(target.fields.len()).min(target.fields.len());
                        target.fields.insert(index, field.clone());
                    }
                }
            }
            Patch::RemoveField {
                collection,
                field_id,
            } => {
                let target = find_mut(&mut schema, collection)?;
                let index =
                    target
                        .field_position(field_id)
                        .ok_or_else(|| SchemaError::FieldNotFound {
                            collection: collection.clone(),
                            field: field_id.clone(),
                        })?;
                target.fields.remove(index);
            }
            Patch::UpdateCollection { collection, set } => {
                let target = find_mut(&mut schema, collection)?;
                for (key, value) in set {
                    update_attribute(target, collection, key, value)?;
                }
            }
        }
        Ok(schema)
    }

    /// Short human readable summary, used in plan output
    pub fn describe(&self) -> String {
        match self {
            Patch::CreateCollection { collection } => {
                format!("create collection {}", collection.name)
            }
            Patch::DeleteCollection { collection } => format!("delete collection {}", collection),
            Patch::AddField {
                collection, field, ..
            } => format!("add field {} to {}", field.name, collection),
            Patch::RemoveField {
                collection,
                field_id,
            } => format!("remove field {} from {}", field_id, collection),
            Patch::UpdateCollection { collection, set } => {
                let keys: Vec<&str> = set.keys().map(String::as_str).collect();
                format!("update {} ({})", collection, keys.join(", "))
            }
        }
    }
}

/// Apply patches in order, stopping at the first failure
pub fn apply_all(patches: &[Patch], schema: Schema) -> Result<Schema, SchemaError> {
    patches.iter().try_fold(schema, |schema, patch| patch.apply(schema))
}

fn find_mut<'a>(schema: &'a mut Schema, collection: &str) -> Result<&'a mut Collection, SchemaError> {
    schema
        .collection_mut(collection)
        .ok_or_else(|| SchemaError::CollectionNotFound(collection.to_string()))
}

fn update_attribute(
    target: &mut Collection,
    collection: &str,
    key: &str,
    value: &Value,
) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidValue {
        collection: collection.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    match key {
        "id" | "fields" => return Err(invalid("not updatable with update_collection")),
        "name" => {
            target.name = value
                .as_str()
                .ok_or_else(|| invalid("expected a string"))?
                .to_string();
        }
        "type" => {
            target.kind = value
                .as_str()
                .ok_or_else(|| invalid("expected a string"))?
                .to_string();
        }
        _ => match target.properties.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.properties.insert(key.to_string(), value.clone());
            }
        },
    }
    Ok(())
}

/// Objects merge key by key; anything else overwrites, `null` included
fn merge_value(existing: &mut Value, value: &Value) {
    match (existing, value) {
        (Value::Object(current), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match current.get_mut(key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        current.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
