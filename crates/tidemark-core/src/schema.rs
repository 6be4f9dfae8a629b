//! Target schema snapshot
//!
//! The engine never looks inside a schema; it only hands snapshots to
//! operations and stores what they return. Patches (see [`crate::patch`])
//! are the one place that knows the collection/field layout.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A full snapshot of the target store's schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub collections: Vec<Collection>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections.push(collection);
        self
    }

    /// Find a collection by id, falling back to name
    pub fn collection(&self, id_or_name: &str) -> Option<&Collection> {
        self.position(id_or_name).map(|i| &self.collections[i])
    }

    pub fn collection_mut(&mut self, id_or_name: &str) -> Option<&mut Collection> {
        self.position(id_or_name).map(move |i| &mut self.collections[i])
    }

    /// Index of a collection by id, falling back to name
    pub fn position(&self, id_or_name: &str) -> Option<usize> {
        self.collections
            .iter()
            .position(|c| c.id == id_or_name)
            .or_else(|| self.collections.iter().position(|c| c.name == id_or_name))
    }
}

/// A collection definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,

    pub name: String,

    #[serde(rename = "type", default = "default_collection_type")]
    pub kind: String,

    #[serde(default)]
    pub fields: Vec<Field>,

    /// Everything else (rules, indexes, ...) kept verbatim
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

fn default_collection_type() -> String {
    "base".to_string()
}

impl Collection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: default_collection_type(),
            fields: Vec::new(),
            properties: Map::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Field ids in declaration order
    pub fn field_ids(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.id.as_str()).collect()
    }
}

/// A field definition inside a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific options kept verbatim
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Field {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}
