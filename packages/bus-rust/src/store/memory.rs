//! In-memory [`Store`] backed by [`DashMap`].
//!
//! Records are keyed by `(type, id)`. A separate insertion log keeps
//! collection reads in creation order.

use std::cmp::Ordering;

use anyhow::Context as _;
use async_trait::async_trait;
use dashmap::DashMap;
use jsonapi_ops_core::{OpCode, ResourceId, ResourceIdentifier, ResourceObject, ResourceType};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{same_resource, Linkage, Model, Store};
use crate::context::QueryParameters;

type RecordKey = (ResourceType, ResourceId);

/// Concurrent in-memory store.
///
/// `query_all` honours `filter` (attribute equality, `id` against a list of
/// ids) and `sort` (`field` ascending, `-field` descending).
pub struct InMemoryStore {
    records: DashMap<RecordKey, Model>,
    insertion_order: Mutex<Vec<RecordKey>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            insertion_order: Mutex::new(Vec::new()),
        }
    }

    /// Seeds a model, replacing any existing record with the same key.
    pub fn insert(&self, model: Model) {
        let key = (model.resource_type.clone(), model.id.clone());
        if self.records.insert(key.clone(), model).is_none() {
            self.insertion_order.lock().push(key);
        }
    }

    /// Seeds every resource object in a JSON array. Each object needs an id.
    ///
    /// # Errors
    ///
    /// Fails if `records` is not an array of resource objects with ids.
    pub fn seed(&self, records: &Value) -> anyhow::Result<usize> {
        let objects: Vec<ResourceObject> =
            serde_json::from_value(records.clone()).context("seed must be an array of resource objects")?;
        let count = objects.len();
        for data in objects {
            let id = data
                .id()
                .cloned()
                .with_context(|| format!("seed record of type {} has no id", data.resource_type()))?;
            let mut model = Model::new(data.resource_type().clone(), id);
            fill(&mut model, &data, &Map::new())?;
            self.insert(model);
        }
        Ok(count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn get(&self, resource_type: &ResourceType, id: &ResourceId) -> Option<Model> {
        self.records
            .get(&(resource_type.clone(), id.clone()))
            .map(|r| r.clone())
    }

    fn require(&self, model: &Model) -> anyhow::Result<Model> {
        self.get(&model.resource_type, &model.id).with_context(|| {
            format!(
                "resource {}:{} does not exist",
                model.resource_type, model.id
            )
        })
    }

    fn replace(&self, model: Model) -> Model {
        self.records.insert(
            (model.resource_type.clone(), model.id.clone()),
            model.clone(),
        );
        model
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies request attributes, then validated fields, then relationships.
fn fill(model: &mut Model, data: &ResourceObject, validated: &Map<String, Value>) -> anyhow::Result<()> {
    for (key, value) in data.attributes() {
        model.attributes.insert(key.clone(), value.clone());
    }
    for (key, value) in validated {
        if !data.relationships().contains_key(key) {
            model.attributes.insert(key.clone(), value.clone());
        }
    }
    for field in data.relationships().keys() {
        if let Some(linkage_data) = data.relationship_data(field) {
            let linkage = Linkage::from_data(linkage_data)
                .with_context(|| format!("invalid linkage for relationship {field}"))?;
            model.relationships.insert(field.clone(), linkage);
        }
    }
    Ok(())
}

fn matches_filter(model: &Model, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| {
        if key == "id" {
            return match expected {
                Value::Array(ids) => ids.iter().any(|id| id.as_str() == Some(model.id.as_str())),
                Value::String(id) => id == model.id.as_str(),
                _ => false,
            };
        }
        model.attribute(key) == Some(expected)
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn sort_models(models: &mut [Model], sort: &[String]) {
    models.sort_by(|a, b| {
        for field in sort {
            let (field, descending) = match field.strip_prefix('-') {
                Some(field) => (field, true),
                None => (field.as_str(), false),
            };
            let ordering = if field == "id" {
                a.id.as_str().cmp(b.id.as_str())
            } else {
                compare_values(a.attribute(field), b.attribute(field))
            };
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find(
        &self,
        resource_type: &ResourceType,
        id: &ResourceId,
    ) -> anyhow::Result<Option<Model>> {
        Ok(self.get(resource_type, id))
    }

    async fn query_all(
        &self,
        resource_type: &ResourceType,
        query: &QueryParameters,
    ) -> anyhow::Result<Vec<Model>> {
        let keys = self.insertion_order.lock().clone();
        let mut models: Vec<Model> = keys
            .iter()
            .filter(|(t, _)| t == resource_type)
            .filter_map(|(t, id)| self.get(t, id))
            .filter(|model| matches_filter(model, &query.filter))
            .collect();
        sort_models(&mut models, &query.sort);
        Ok(models)
    }

    async fn create(
        &self,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model> {
        let id = match data.id() {
            Some(id) => id.clone(),
            None => ResourceId::new(uuid::Uuid::new_v4().to_string())?,
        };
        if self.get(data.resource_type(), &id).is_some() {
            anyhow::bail!("resource {}:{id} already exists", data.resource_type());
        }

        let mut model = Model::new(data.resource_type().clone(), id);
        fill(&mut model, data, validated)?;
        self.insert(model.clone());
        tracing::debug!(resource_type = %model.resource_type, id = %model.id, "record created");
        Ok(model)
    }

    async fn update(
        &self,
        model: &Model,
        data: &ResourceObject,
        validated: &Map<String, Value>,
    ) -> anyhow::Result<Model> {
        let mut current = self.require(model)?;
        fill(&mut current, data, validated)?;
        Ok(self.replace(current))
    }

    async fn delete(&self, model: &Model) -> anyhow::Result<()> {
        let key = (model.resource_type.clone(), model.id.clone());
        if self.records.remove(&key).is_some() {
            self.insertion_order.lock().retain(|k| k != &key);
        }
        Ok(())
    }

    async fn modify_to_one(
        &self,
        model: &Model,
        field: &str,
        related: Option<&ResourceIdentifier>,
    ) -> anyhow::Result<Model> {
        let current = self.require(model)?;
        Ok(self.replace(current.with_linkage(field, Linkage::ToOne(related.cloned()))))
    }

    async fn modify_to_many(
        &self,
        model: &Model,
        field: &str,
        op: OpCode,
        related: &[ResourceIdentifier],
    ) -> anyhow::Result<Model> {
        let current = self.require(model)?;
        let mut linked = match current.linkage(field) {
            Some(Linkage::ToMany(identifiers)) => identifiers.clone(),
            _ => Vec::new(),
        };
        match op {
            OpCode::Add => {
                for identifier in related {
                    if !linked.iter().any(|l| same_resource(l, identifier)) {
                        linked.push(identifier.clone());
                    }
                }
            }
            OpCode::Update => linked = related.to_vec(),
            OpCode::Remove => {
                linked.retain(|l| !related.iter().any(|r| same_resource(l, r)));
            }
        }
        Ok(self.replace(current.with_linkage(field, Linkage::ToMany(linked))))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::Related;

    fn rt(value: &str) -> ResourceType {
        ResourceType::new(value).unwrap()
    }

    fn id(value: &str) -> ResourceId {
        ResourceId::new(value).unwrap()
    }

    fn tag(value: &str) -> ResourceIdentifier {
        ResourceIdentifier::new(rt("tags"), id(value))
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert(Model::new(rt("posts"), id("1")).with_attribute("title", json!("b")));
        store.insert(Model::new(rt("posts"), id("2")).with_attribute("title", json!("a")));
        store.insert(Model::new(rt("tags"), id("1")));
        store.insert(Model::new(rt("tags"), id("2")));
        store
    }

    #[tokio::test]
    async fn create_assigns_id_when_absent() {
        let store = InMemoryStore::new();
        let data: ResourceObject = serde_json::from_value(json!({
            "type": "posts",
            "attributes": {"title": "Hello World!"},
            "relationships": {"tags": {"data": [{"type": "tags", "id": "1"}]}}
        }))
        .unwrap();

        let model = store.create(&data, &Map::new()).await.unwrap();
        assert!(!model.id.as_str().is_empty());
        assert_eq!(model.attribute("title"), Some(&json!("Hello World!")));
        assert!(matches!(model.linkage("tags"), Some(Linkage::ToMany(tags)) if tags.len() == 1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn seed_loads_resource_objects() {
        let store = InMemoryStore::new();
        let count = store
            .seed(&json!([
                {"type": "users", "id": "9", "attributes": {"name": "Ada"}},
                {"type": "posts", "id": "1", "relationships": {"author": {"data": {"type": "users", "id": "9"}}}}
            ]))
            .unwrap();
        assert_eq!(count, 2);
        let post = store.find(&rt("posts"), &id("1")).await.unwrap().unwrap();
        assert!(matches!(post.linkage("author"), Some(Linkage::ToOne(Some(_)))));

        assert!(store.seed(&json!([{"type": "users"}])).is_err());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_client_id() {
        let store = seeded();
        let data = ResourceObject::new(rt("posts")).with_id(id("1"));
        assert!(store.create(&data, &Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn validated_fields_override_request_attributes() {
        let store = seeded();
        let model = store.find(&rt("posts"), &id("1")).await.unwrap().unwrap();
        let data = ResourceObject::new(rt("posts"))
            .with_id(id("1"))
            .with_attributes(json!({"title": " raw "}).as_object().unwrap().clone());
        let validated = json!({"title": "raw"}).as_object().unwrap().clone();

        let updated = store.update(&model, &data, &validated).await.unwrap();
        assert_eq!(updated.attribute("title"), Some(&json!("raw")));
    }

    #[tokio::test]
    async fn query_all_filters_and_sorts() {
        let store = seeded();
        let mut query = QueryParameters {
            sort: vec!["title".to_string()],
            ..QueryParameters::default()
        };
        let ids: Vec<String> = store
            .query_all(&rt("posts"), &query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["2", "1"]);

        query.filter.insert("id".to_string(), json!(["1"]));
        let models = store.query_all(&rt("posts"), &query).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "1");
    }

    #[tokio::test]
    async fn to_many_add_update_remove() {
        let store = seeded();
        let post = store.find(&rt("posts"), &id("1")).await.unwrap().unwrap();

        let post = store
            .modify_to_many(&post, "tags", OpCode::Add, &[tag("1"), tag("2"), tag("1")])
            .await
            .unwrap();
        assert!(matches!(post.linkage("tags"), Some(Linkage::ToMany(t)) if t.len() == 2));

        let post = store
            .modify_to_many(&post, "tags", OpCode::Remove, &[tag("1")])
            .await
            .unwrap();
        let related = store.related(&post, "tags").await.unwrap();
        assert!(matches!(&related, Related::ToMany(m) if m.len() == 1 && m[0].id == "2"));

        let post = store
            .modify_to_many(&post, "tags", OpCode::Update, &[])
            .await
            .unwrap();
        assert!(store.related(&post, "tags").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn to_one_set_and_clear() {
        let store = seeded();
        store.insert(Model::new(rt("users"), id("9")));
        let post = store.find(&rt("posts"), &id("1")).await.unwrap().unwrap();
        let author = ResourceIdentifier::new(rt("users"), id("9"));

        let post = store.modify_to_one(&post, "author", Some(&author)).await.unwrap();
        let related = store.related(&post, "author").await.unwrap();
        assert!(matches!(&related, Related::ToOne(Some(m)) if m.id == "9"));

        let post = store.modify_to_one(&post, "author", None).await.unwrap();
        assert_eq!(store.related(&post, "author").await.unwrap(), Related::ToOne(None));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = seeded();
        let post = store.find(&rt("posts"), &id("1")).await.unwrap().unwrap();
        store.delete(&post).await.unwrap();
        assert!(store.find(&rt("posts"), &id("1")).await.unwrap().is_none());
        assert_eq!(
            store
                .query_all(&rt("posts"), &QueryParameters::default())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store.modify_to_one(&post, "author", None).await.is_err());
    }
}
