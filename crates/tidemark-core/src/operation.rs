//! Operations: invocable schema transformations

use crate::error::OperationError;
use crate::patch::{apply_all, Patch};
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;

/// Result of invoking an operation
pub type OperationResult = Result<Schema, OperationError>;

type TransformFn = dyn Fn(Schema) -> OperationResult + Send + Sync;

/// A schema transformation: takes a snapshot and returns the new snapshot.
///
/// Cloning is cheap; clones share the same underlying function.
#[derive(Clone)]
pub struct Operation {
    transform: Arc<TransformFn>,
    patches: Option<Arc<[Patch]>>,
}

impl Operation {
    /// Wrap an arbitrary transformation
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Schema) -> OperationResult + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            patches: None,
        }
    }

    /// Build an operation that applies declarative patches in order
    pub fn from_patches(patches: Vec<Patch>) -> Self {
        let patches: Arc<[Patch]> = patches.into();
        let shared = Arc::clone(&patches);
        Self {
            transform: Arc::new(move |schema: Schema| -> OperationResult {
                apply_all(&shared, schema).map_err(OperationError::from)
            }),
            patches: Some(patches),
        }
    }

    /// An operation that returns the snapshot unchanged
    pub fn noop() -> Self {
        Self::from_patches(Vec::new())
    }

    pub fn invoke(&self, schema: Schema) -> OperationResult {
        (self.transform)(schema)
    }

    /// The declarative patches, if this operation was built from them
    pub fn patches(&self) -> Option<&[Patch]> {
        self.patches.as_deref()
    }

    /// One line per patch, or a placeholder for custom operations
    pub fn describe(&self) -> Vec<String> {
        match &self.patches {
            Some(patches) => patches.iter().map(Patch::describe).collect(),
            None => vec!["custom operation".to_string()],
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.patches {
            Some(patches) => f
                .debug_struct("Operation")
                .field("patches", &patches.len())
                .finish(),
            None => f.debug_struct("Operation").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Collection;

    #[test]
    fn test_closure_operation() {
        let op = Operation::new(|schema: Schema| {
            Ok(schema.with_collection(Collection::new("c1", "notes")))
        });
        let out = op.invoke(Schema::new()).unwrap();
        assert_eq!(out.collections.len(), 1);
        assert!(op.patches().is_none());
    }

    #[test]
    fn test_patch_operation_maps_schema_errors() {
        let op = Operation::from_patches(vec![Patch::DeleteCollection {
            collection: "missing".into(),
        }]);
        let err = op.invoke(Schema::new()).unwrap_err();
        assert!(matches!(err, OperationError::Schema(_)));
        assert_eq!(op.describe(), vec!["delete collection missing".to_string()]);
    }

    #[test]
    fn test_noop_returns_input() {
        let schema = Schema::new().with_collection(Collection::new("c1", "notes"));
        assert_eq!(Operation::noop().invoke(schema.clone()).unwrap(), schema);
    }
}
