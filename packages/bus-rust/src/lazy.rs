//! Memoising thunks over the [`Store`].
//!
//! Both helpers perform their store lookup at most once, on first access, and
//! cache the result (including "not found").

use std::sync::Arc;

use jsonapi_ops_core::{RelationDef, ResourceId, ResourceIdentifier, ResourceType};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::BusError;
use crate::store::{Model, Related, Store};

// ---------------------------------------------------------------------------
// LazyModel
// ---------------------------------------------------------------------------

/// A model looked up by type and id on first access.
pub struct LazyModel {
    store: Arc<dyn Store>,
    resource_type: ResourceType,
    id: ResourceId,
    cell: OnceCell<Option<Arc<Model>>>,
}

impl LazyModel {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, resource_type: ResourceType, id: ResourceId) -> Self {
        Self {
            store,
            resource_type,
            id,
            cell: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// # Errors
    ///
    /// Returns `BusError::Store` if the lookup fails. A failed lookup is not
    /// cached.
    pub async fn get(&self) -> Result<Option<Arc<Model>>, BusError> {
        self.cell
            .get_or_try_init(|| async {
                let found = self.store.find(&self.resource_type, &self.id).await?;
                Ok::<_, BusError>(found.map(Arc::new))
            })
            .await
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// LazyRelation
// ---------------------------------------------------------------------------

/// Related models named by a raw relationship fragment from a request body.
///
/// Identifiers that are malformed, carry only a `lid`, or whose type the
/// relation does not accept are discarded.
pub struct LazyRelation {
    store: Arc<dyn Store>,
    relation: RelationDef,
    raw: Value,
    cell: OnceCell<Related>,
}

impl LazyRelation {
    /// `raw` is the `data` member of the relationship document.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, relation: RelationDef, raw: Value) -> Self {
        Self {
            store,
            relation,
            raw,
            cell: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn relation(&self) -> &RelationDef {
        &self.relation
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.relation.name
    }

    /// The accepted identifiers, without touching the store.
    #[must_use]
    pub fn identifiers(&self) -> Vec<ResourceIdentifier> {
        match (&self.raw, self.relation.to_many) {
            (Value::Array(items), true) => items.iter().filter_map(|item| self.accept(item)).collect(),
            (Value::Null, false) => Vec::new(),
            (item @ Value::Object(_), false) => self.accept(item).into_iter().collect(),
            (other, _) => {
                tracing::debug!(
                    field = %self.relation.name,
                    to_many = self.relation.to_many,
                    data = %other,
                    "discarding relationship data of the wrong shape"
                );
                Vec::new()
            }
        }
    }

    /// Resolves the related models on first access.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Store` if the lookup fails.
    pub async fn get(&self) -> Result<&Related, BusError> {
        self.cell
            .get_or_try_init(|| async {
                let identifiers = self.identifiers();
                let related = if self.relation.to_many {
                    let models = self.store.find_many(&identifiers).await?;
                    Related::ToMany(models.into_iter().map(Arc::new).collect())
                } else {
                    let found = match identifiers.first().and_then(|i| Some((i, i.id()?))) {
                        Some((identifier, id)) => {
                            self.store.find(identifier.resource_type(), id).await?
                        }
                        None => None,
                    };
                    Related::ToOne(found.map(Arc::new))
                };
                Ok::<_, BusError>(related)
            })
            .await
    }

    fn accept(&self, item: &Value) -> Option<ResourceIdentifier> {
        let identifier = match serde_json::from_value::<ResourceIdentifier>(item.clone()) {
            Ok(identifier) => identifier,
            Err(err) => {
                tracing::debug!(field = %self.relation.name, error = %err, "discarding malformed identifier");
                return None;
            }
        };
        if identifier.id().is_none() {
            tracing::debug!(field = %self.relation.name, "discarding identifier without id");
            return None;
        }
        if !self.relation.accepts(identifier.resource_type()) {
            tracing::debug!(
                field = %self.relation.name,
                resource_type = %identifier.resource_type(),
                "discarding identifier of unexpected type"
            );
            return None;
        }
        Some(identifier)
    }
}
