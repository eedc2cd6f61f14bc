//! Fires lifecycle hooks around the handler.
//!
//! "Before" events fire ahead of the handler and abort the execution when a
//! hook fails. "After" events fire exactly once, and only when the handler
//! succeeded.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{Command, CommandKind};
use crate::context::RequestContext;
use crate::error::BusError;
use crate::hooks::{HookEvent, ResourceHooks};
use crate::outcome::{Outcome, PayloadData};
use crate::pipeline::{Input, Middleware, Next};
use crate::query::{Query, QueryKind};
use crate::store::{Model, Related};

fn fire(
    hooks: &dyn ResourceHooks,
    event: &HookEvent<'_>,
    request: Option<&RequestContext>,
) -> Result<(), BusError> {
    tracing::trace!(hook = event.name(), "firing hook");
    hooks
        .handle(event, request)
        .map_err(|source| BusError::Hook {
            hook: event.name(),
            source,
        })
}

fn located<I: Input>(input: &I) -> Result<Arc<Model>, BusError> {
    input
        .model()
        .cloned()
        .ok_or_else(|| BusError::contract(format!("{} hooks require a located model", input.action())))
}

fn field_of(field: Option<&str>, action: &str) -> Result<String, BusError> {
    field
        .map(str::to_string)
        .ok_or_else(|| BusError::contract(format!("{action} hooks require a relationship field")))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Fires the `ResourceHooks` around command execution when the command
/// carries hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerCommandHooks;

#[async_trait]
impl Middleware<Command> for TriggerCommandHooks {
    fn name(&self) -> &'static str {
        "trigger-hooks"
    }

    async fn handle(&self, command: Command, next: Next<'_, Command>) -> Result<Outcome, BusError> {
        let Some(hooks) = command.hooks().cloned() else {
            return next.run(command).await;
        };
        let hooks = hooks.as_ref();
        let request = command.request();

        match command.kind() {
            CommandKind::Store => {
                fire(hooks, &HookEvent::Saving { model: None }, request)?;
                fire(hooks, &HookEvent::Creating, request)?;
                let outcome = next.run(command.clone()).await?;
                if outcome.did_succeed() {
                    let model = outcome
                        .payload()?
                        .as_model()
                        .map(AsRef::as_ref)
                        .ok_or_else(|| BusError::contract("store handler must return the created model"))?;
                    fire(hooks, &HookEvent::Created { model }, request)?;
                    fire(hooks, &HookEvent::Saved { model }, request)?;
                }
                Ok(outcome)
            }
            CommandKind::Update => {
                let owned = located(&command)?;
                let model = owned.as_ref();
                fire(hooks, &HookEvent::Saving { model: Some(model) }, request)?;
                fire(hooks, &HookEvent::Updating { model }, request)?;
                let outcome = next.run(command.clone()).await?;
                if outcome.did_succeed() {
                    let updated = outcome.payload()?.as_model().map_or(model, AsRef::as_ref);
                    fire(hooks, &HookEvent::Updated { model: updated }, request)?;
                    fire(hooks, &HookEvent::Saved { model: updated }, request)?;
                }
                Ok(outcome)
            }
            CommandKind::Destroy => {
                let owned = located(&command)?;
                let model = owned.as_ref();
                fire(hooks, &HookEvent::Deleting { model }, request)?;
                let outcome = next.run(command.clone()).await?;
                if outcome.did_succeed() {
                    fire(hooks, &HookEvent::Deleted { model }, request)?;
                }
                Ok(outcome)
            }
            kind => {
                let owned = located(&command)?;
                let model = owned.as_ref();
                let field = field_of(command.field(), kind.as_str())?;
                let field = field.as_str();
                let before = match kind {
                    CommandKind::AttachRelationship => HookEvent::AttachingRelationship { model, field },
                    CommandKind::DetachRelationship => HookEvent::DetachingRelationship { model, field },
                    _ => HookEvent::UpdatingRelationship { model, field },
                };
                fire(hooks, &before, request)?;

                let outcome = next.run(command.clone()).await?;
                if outcome.did_succeed() {
                    let owner = outcome.related_to().map_or(model, |to| to.model.as_ref());
                    let related = outcome
                        .payload()?
                        .as_related()
                        .unwrap_or(Related::ToMany(Vec::new()));
                    let related = &related;
                    let after = match kind {
                        CommandKind::AttachRelationship => {
                            HookEvent::AttachedRelationship { model: owner, field, related }
                        }
                        CommandKind::DetachRelationship => {
                            HookEvent::DetachedRelationship { model: owner, field, related }
                        }
                        _ => HookEvent::UpdatedRelationship { model: owner, field, related },
                    };
                    fire(hooks, &after, request)?;
                }
                Ok(outcome)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Fires the read hooks around query execution when the query carries hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerQueryHooks;

#[async_trait]
impl Middleware<Query> for TriggerQueryHooks {
    fn name(&self) -> &'static str {
        "trigger-hooks"
    }

    async fn handle(&self, query: Query, next: Next<'_, Query>) -> Result<Outcome, BusError> {
        let Some(hooks) = query.hooks().cloned() else {
            return next.run(query).await;
        };
        let hooks = hooks.as_ref();
        let request = query.request();
        let parameters = query.parameters();

        match query.kind() {
            QueryKind::FetchMany => {
                fire(hooks, &HookEvent::Searching { query: parameters }, request)?;
                let outcome = next.run(query.clone()).await?;
                if outcome.did_succeed() {
                    let models = match &outcome.payload()?.data {
                        PayloadData::Models(models) => models.as_slice(),
                        _ => &[],
                    };
                    fire(hooks, &HookEvent::Searched { models, query: parameters }, request)?;
                }
                Ok(outcome)
            }
            QueryKind::FetchOne => {
                fire(hooks, &HookEvent::Reading { query: parameters }, request)?;
                let outcome = next.run(query.clone()).await?;
                if outcome.did_succeed() {
                    let model = outcome.payload()?.as_model().map(AsRef::as_ref);
                    fire(hooks, &HookEvent::Read { model, query: parameters }, request)?;
                }
                Ok(outcome)
            }
            kind => {
                let owned = located(&query)?;
                let model = owned.as_ref();
                let field = field_of(query.field(), kind.as_str())?;
                let field = field.as_str();
                let before = if kind == QueryKind::FetchRelated {
                    HookEvent::ReadingRelated { model, field }
                } else {
                    HookEvent::ReadingRelationship { model, field }
                };
                fire(hooks, &before, request)?;

                let outcome = next.run(query.clone()).await?;
                if outcome.did_succeed() {
                    let related = outcome
                        .payload()?
                        .as_related()
                        .unwrap_or(Related::ToMany(Vec::new()));
                    let related = &related;
                    let after = if kind == QueryKind::FetchRelated {
                        HookEvent::ReadRelated { model, field, related }
                    } else {
                        HookEvent::ReadRelationship { model, field, related }
                    };
                    fire(hooks, &after, request)?;
                }
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::error::ApiError;
    use crate::outcome::Payload;
    use crate::pipeline::{Handler, Pipeline};
    use crate::testing::{rid, rt, CallLog, RecordingHooks};

    /// Logs the handler call and answers with a fixed outcome.
    struct Scripted {
        log: CallLog,
        outcome: Outcome,
    }

    #[async_trait]
    impl<I: Input> Handler<I> for Scripted {
        async fn execute(&self, _input: I) -> Result<Outcome, BusError> {
            self.log.lock().push("store.handler".to_string());
            Ok(self.outcome.clone())
        }
    }

    fn post() -> Arc<Model> {
        Arc::new(Model::new(rt("posts"), rid("1")))
    }

    async fn run_command(hooks: Arc<RecordingHooks>, log: &CallLog, command: Command, outcome: Outcome) -> Result<Outcome, BusError> {
        let handler = Scripted { log: log.clone(), outcome };
        let stage: Arc<dyn Middleware<Command>> = Arc::new(TriggerCommandHooks);
        Pipeline::new(vec![stage]).run(command.with_hooks(hooks), &handler).await
    }

    fn everything(log: &CallLog) -> Vec<String> {
        log.lock().clone()
    }

    #[tokio::test]
    async fn store_hooks_wrap_the_handler() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()));
        run_command(hooks, &log, Command::store(rt("posts")), Outcome::ok(Payload::model(Some(post()))))
            .await
            .unwrap();
        assert_eq!(
            everything(&log),
            vec!["saving", "creating", "store.handler", "created", "saved"]
        );
    }

    #[tokio::test]
    async fn store_success_without_model_is_a_contract_fault() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()));
        let err = run_command(hooks, &log, Command::store(rt("posts")), Outcome::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Contract(_)));
        assert_eq!(everything(&log), vec!["saving", "creating", "store.handler"]);
    }

    #[tokio::test]
    async fn after_hooks_skip_failures() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()));
        let command = Command::destroy(rt("posts"), rid("1")).with_model(post());
        let outcome = run_command(hooks, &log, command, Outcome::failed(ApiError::from_status(StatusCode::CONFLICT)))
            .await
            .unwrap();
        assert!(outcome.did_fail());
        assert_eq!(everything(&log), vec!["deleting", "store.handler"]);
    }

    #[tokio::test]
    async fn refusing_before_hook_aborts() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()).refusing("updating"));
        let command = Command::update(rt("posts"), rid("1")).with_model(post());
        let err = run_command(hooks, &log, command, Outcome::empty()).await.unwrap_err();
        assert!(matches!(err, BusError::Hook { hook: "updating", .. }));
        assert_eq!(everything(&log), vec!["saving"]);
    }

    #[tokio::test]
    async fn relationship_hooks_name_the_change() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()));
        let command = Command::relationship(CommandKind::DetachRelationship, rt("posts"), rid("1"), "tags")
            .with_model(post());
        let outcome = Outcome::ok(Payload::models(Vec::new())).with_related_to(post(), "tags");
        run_command(hooks, &log, command, outcome).await.unwrap();
        assert_eq!(
            everything(&log),
            vec!["detachingRelationship", "store.handler", "detachedRelationship"]
        );
    }

    #[tokio::test]
    async fn query_hooks_fire_around_reads() {
        let log = CallLog::default();
        let hooks = Arc::new(RecordingHooks::with_log(log.clone()));
        let handler = Scripted {
            log: log.clone(),
            outcome: Outcome::ok(Payload::models(vec![post()])),
        };
        let stage: Arc<dyn Middleware<Query>> = Arc::new(TriggerQueryHooks);
        let pipeline = Pipeline::new(vec![stage]);
        pipeline
            .run(Query::fetch_many(rt("posts")).with_hooks(hooks.clone()), &handler)
            .await
            .unwrap();
        pipeline
            .run(
                Query::fetch_related(rt("posts"), rid("1"), "author")
                    .with_model(post())
                    .with_hooks(hooks),
                &handler,
            )
            .await
            .unwrap();
        assert_eq!(
            everything(&log),
            vec![
                "searching",
                "store.handler",
                "searched",
                "readingRelated",
                "store.handler",
                "readRelated"
            ]
        );
    }

    #[tokio::test]
    async fn no_hooks_passes_through() {
        let log = CallLog::default();
        let handler = Scripted { log: log.clone(), outcome: Outcome::empty() };
        let stage: Arc<dyn Middleware<Command>> = Arc::new(TriggerCommandHooks);
        Pipeline::new(vec![stage]).run(Command::store(rt("posts")), &handler).await.unwrap();
        assert_eq!(everything(&log), vec!["store.handler"]);
    }
}
