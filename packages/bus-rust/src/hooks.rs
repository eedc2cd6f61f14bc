//! Resource lifecycle hooks.
//!
//! Hooks observe executions through [`HookEvent`]s. "Before" events
//! (`Saving`, `Creating`, ...) fire ahead of the store call and may abort the
//! execution by returning an error. "After" events fire once, only when the
//! execution succeeded.

use std::sync::Arc;

use crate::context::{QueryParameters, RequestContext};
use crate::store::{Model, Related};

/// A lifecycle point observed by [`ResourceHooks`].
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    Searching { query: &'a QueryParameters },
    Searched { models: &'a [Arc<Model>], query: &'a QueryParameters },
    Reading { query: &'a QueryParameters },
    Read { model: Option<&'a Model>, query: &'a QueryParameters },
    ReadingRelated { model: &'a Model, field: &'a str },
    ReadRelated { model: &'a Model, field: &'a str, related: &'a Related },
    ReadingRelationship { model: &'a Model, field: &'a str },
    ReadRelationship { model: &'a Model, field: &'a str, related: &'a Related },
    /// `model` is `None` when a resource is being created.
    Saving { model: Option<&'a Model> },
    Saved { model: &'a Model },
    Creating,
    Created { model: &'a Model },
    Updating { model: &'a Model },
    Updated { model: &'a Model },
    Deleting { model: &'a Model },
    Deleted { model: &'a Model },
    UpdatingRelationship { model: &'a Model, field: &'a str },
    UpdatedRelationship { model: &'a Model, field: &'a str, related: &'a Related },
    AttachingRelationship { model: &'a Model, field: &'a str },
    AttachedRelationship { model: &'a Model, field: &'a str, related: &'a Related },
    DetachingRelationship { model: &'a Model, field: &'a str },
    DetachedRelationship { model: &'a Model, field: &'a str, related: &'a Related },
}

impl HookEvent<'_> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Searching { .. } => "searching",
            Self::Searched { .. } => "searched",
            Self::Reading { .. } => "reading",
            Self::Read { .. } => "read",
            Self::ReadingRelated { .. } => "readingRelated",
            Self::ReadRelated { .. } => "readRelated",
            Self::ReadingRelationship { .. } => "readingRelationship",
            Self::ReadRelationship { .. } => "readRelationship",
            Self::Saving { .. } => "saving",
            Self::Saved { .. } => "saved",
            Self::Creating => "creating",
            Self::Created { .. } => "created",
            Self::Updating { .. } => "updating",
            Self::Updated { .. } => "updated",
            Self::Deleting { .. } => "deleting",
            Self::Deleted { .. } => "deleted",
            Self::UpdatingRelationship { .. } => "updatingRelationship",
            Self::UpdatedRelationship { .. } => "updatedRelationship",
            Self::AttachingRelationship { .. } => "attachingRelationship",
            Self::AttachedRelationship { .. } => "attachedRelationship",
            Self::DetachingRelationship { .. } => "detachingRelationship",
            Self::DetachedRelationship { .. } => "detachedRelationship",
        }
    }
}

/// Observer of resource lifecycle events.
///
/// Used as `Arc<dyn ResourceHooks>`. Events the implementation does not care
/// about should return `Ok(())`.
pub trait ResourceHooks: Send + Sync {
    /// # Errors
    ///
    /// An error from a "before" event aborts the execution.
    fn handle(&self, event: &HookEvent<'_>, request: Option<&RequestContext>) -> anyhow::Result<()>;
}

/// Fans events out to several hooks in registration order.
///
/// Stops at the first hook that returns an error.
#[derive(Default)]
pub struct CompositeHooks {
    hooks: Vec<Arc<dyn ResourceHooks>>,
}

impl CompositeHooks {
    #[must_use]
    pub fn new(hooks: Vec<Arc<dyn ResourceHooks>>) -> Self {
        Self { hooks }
    }

    pub fn add(&mut self, hooks: Arc<dyn ResourceHooks>) {
        self.hooks.push(hooks);
    }
}

impl ResourceHooks for CompositeHooks {
    fn handle(&self, event: &HookEvent<'_>, request: Option<&RequestContext>) -> anyhow::Result<()> {
        for hooks in &self.hooks {
            hooks.handle(event, request)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHooks;

    struct Refuse;

    impl ResourceHooks for Refuse {
        fn handle(&self, event: &HookEvent<'_>, _: Option<&RequestContext>) -> anyhow::Result<()> {
            anyhow::bail!("refusing {}", event.name())
        }
    }

    #[test]
    fn composite_fans_out_in_order() {
        let first = Arc::new(RecordingHooks::new());
        let second = Arc::new(RecordingHooks::new());
        let composite = CompositeHooks::new(vec![first.clone(), second.clone()]);

        composite.handle(&HookEvent::Creating, None).unwrap();
        composite.handle(&HookEvent::Saving { model: None }, None).unwrap();

        assert_eq!(first.events(), vec!["creating", "saving"]);
        assert_eq!(second.events(), vec!["creating", "saving"]);
    }

    #[test]
    fn composite_stops_at_first_error() {
        let after = Arc::new(RecordingHooks::new());
        let mut composite = CompositeHooks::default();
        composite.add(Arc::new(Refuse));
        composite.add(after.clone());

        let err = composite.handle(&HookEvent::Creating, None).unwrap_err();
        assert_eq!(err.to_string(), "refusing creating");
        assert!(after.events().is_empty());
    }
}
