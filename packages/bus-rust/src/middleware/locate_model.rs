//! Resolves the addressed model before authorization and execution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ApiError, BusError};
use crate::lazy::LazyModel;
use crate::outcome::Outcome;
use crate::pipeline::{Input, Middleware, Next};
use crate::store::Store;

/// Loads the addressed model unless the input already carries one.
///
/// A missing resource, or a target addressed only by an unresolved `lid`,
/// fails the execution with 404 Not Found.
pub struct LocateModel {
    store: Arc<dyn Store>,
}

impl LocateModel {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<I: Input> Middleware<I> for LocateModel {
    fn name(&self) -> &'static str {
        "locate-model"
    }

    async fn handle(&self, input: I, next: Next<'_, I>) -> Result<Outcome, BusError> {
        if input.model().is_some() {
            return next.run(input).await;
        }

        let Some(id) = input.resource_id().cloned() else {
            if let Some(lid) = input.local_id() {
                tracing::debug!(resource_type = %input.resource_type(), %lid, "local id not resolved");
                return Ok(Outcome::failed(
                    ApiError::not_found()
                        .with_detail(format!(
                            "Resource {} with local id {lid} does not exist.",
                            input.resource_type()
                        ))
                        .with_pointer("/ref/lid"),
                ));
            }
            return Err(BusError::contract(format!(
                "{} requires a resource id to locate",
                input.action()
            )));
        };
        let lazy = LazyModel::new(self.store.clone(), input.resource_type().clone(), id);

        match lazy.get().await? {
            Some(model) => next.run(input.with_model(model)).await,
            None => {
                tracing::debug!(resource_type = %lazy.resource_type(), id = %lazy.id(), "model not found");
                Ok(Outcome::failed(ApiError::not_found().with_detail(format!(
                    "Resource {} with id {} does not exist.",
                    lazy.resource_type(),
                    lazy.id()
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use jsonapi_ops_core::OperationParser;
    use serde_json::json;

    use super::*;
    use crate::command::Command;
    use crate::error::ErrorSource;
    use crate::pipeline::{Handler, Pipeline};
    use crate::query::Query;
    use crate::testing::{rid, rt, schemas, seeded_store, CountingStore};

    struct ExpectModel;

    struct Unreachable;

    #[async_trait]
    impl Handler<Command> for Unreachable {
        async fn execute(&self, _command: Command) -> Result<Outcome, BusError> {
            panic!("handler must not run");
        }
    }

    #[async_trait]
    impl Handler<Query> for ExpectModel {
        async fn execute(&self, query: Query) -> Result<Outcome, BusError> {
            assert_eq!(query.model().expect("located").id, "1");
            Ok(Outcome::empty())
        }
    }

    fn pipeline(store: Arc<CountingStore>) -> Pipeline<Query> {
        Pipeline::new(vec![Arc::new(LocateModel::new(store)) as Arc<dyn Middleware<Query>>])
    }

    #[tokio::test]
    async fn locates_model_by_id() {
        let store = Arc::new(CountingStore::new(seeded_store()));
        let outcome = pipeline(store.clone())
            .run(Query::fetch_one(rt("posts"), rid("1")), &ExpectModel)
            .await
            .unwrap();
        assert!(outcome.did_succeed());
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn missing_model_is_not_found() {
        let store = Arc::new(CountingStore::new(seeded_store()));
        let outcome = pipeline(store)
            .run(Query::fetch_one(rt("posts"), rid("404")), &ExpectModel)
            .await
            .unwrap();
        assert_eq!(outcome.errors().unwrap().status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn existing_model_skips_lookup() {
        let store = Arc::new(CountingStore::new(seeded_store()));
        let model = Arc::new(crate::store::Model::new(rt("posts"), rid("1")));
        let query = Query::fetch_one(rt("posts"), rid("1")).with_model(model);
        pipeline(store.clone()).run(query, &ExpectModel).await.unwrap();
        assert_eq!(store.finds(), 0);
    }

    #[tokio::test]
    async fn unresolved_local_id_is_not_found() {
        let operation = OperationParser::new(&schemas())
            .parse(&json!({"op": "remove", "ref": {"type": "posts", "lid": "tmp"}}))
            .unwrap();
        let store = Arc::new(CountingStore::new(seeded_store()));
        let stage = Arc::new(LocateModel::new(store.clone())) as Arc<dyn Middleware<Command>>;

        let outcome = Pipeline::new(vec![stage])
            .run(Command::from_operation(operation), &Unreachable)
            .await
            .unwrap();
        let errors = outcome.errors().unwrap();
        assert_eq!(errors.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            errors.first().and_then(|error| error.source.as_ref()),
            Some(&ErrorSource::pointer("/ref/lid"))
        );
        assert_eq!(store.finds(), 0);
    }

    #[tokio::test]
    async fn missing_id_is_a_contract_violation() {
        let store = Arc::new(CountingStore::new(seeded_store()));
        let err = pipeline(store)
            .run(Query::fetch_many(rt("posts")), &ExpectModel)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Contract(_)));
    }
}
