//! Step declarations: the nodes of a wizard definition.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::state::WizardState;
use wizard_core::WorkflowContext;

/// Field name -> message, reported when a step refuses to be left.
pub type FieldErrors = BTreeMap<String, String>;

/// Decides whether a target step may be entered.
pub type GuardFn<S> =
    Arc<dyn Fn(&WorkflowContext<S>) -> BoxFuture<'static, bool> + Send + Sync>;

/// Decides whether the current step may be left.
pub type ValidateFn<S> =
    Arc<dyn Fn(&WorkflowContext<S>) -> BoxFuture<'static, Result<(), FieldErrors>> + Send + Sync>;

/// Side-effecting transform run when entering or leaving a step.
pub type TransformFn<S> =
    Arc<dyn Fn(WorkflowContext<S>) -> BoxFuture<'static, WorkflowContext<S>> + Send + Sync>;

/// Computes a neighbor step id from the context.
pub type ResolveFn<S> = Arc<dyn Fn(&WorkflowContext<S>) -> String + Send + Sync>;

/// Where `next` or `prev` leads from a step.
pub enum StepTarget<S> {
    /// Neighbor in declaration order
    Positional,
    /// A fixed step id
    Step(String),
    /// Resolved from the context at transition time
    Computed(ResolveFn<S>),
}

impl<S> Clone for StepTarget<S> {
    fn clone(&self) -> Self {
        match self {
            StepTarget::Positional => StepTarget::Positional,
            StepTarget::Step(id) => StepTarget::Step(id.clone()),
            StepTarget::Computed(f) => StepTarget::Computed(Arc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for StepTarget<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::Positional => f.write_str("Positional"),
            StepTarget::Step(id) => f.debug_tuple("Step").field(id).finish(),
            StepTarget::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// A node in a workflow definition.
///
/// Declarations are immutable configuration shared by every context of a
/// definition; nothing here is persisted.
pub struct StepDeclaration<S> {
    pub id: String,
    pub title: Option<String>,
    pub next: StepTarget<S>,
    pub prev: StepTarget<S>,
    pub guard: Option<GuardFn<S>>,
    pub validate: Option<ValidateFn<S>>,
    pub on_enter: Option<TransformFn<S>>,
    pub on_exit: Option<TransformFn<S>>,
}

impl<S> fmt::Debug for StepDeclaration<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDeclaration")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("next", &self.next)
            .field("prev", &self.prev)
            .field("guard", &self.guard.as_ref().map(|_| "<guard>"))
            .field("validate", &self.validate.as_ref().map(|_| "<validate>"))
            .field("on_enter", &self.on_enter.as_ref().map(|_| "<on_enter>"))
            .field("on_exit", &self.on_exit.as_ref().map(|_| "<on_exit>"))
            .finish()
    }
}

impl<S: WizardState> StepDeclaration<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            next: StepTarget::Positional,
            prev: StepTarget::Positional,
            guard: None,
            validate: None,
            on_enter: None,
            on_exit: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Always move forward to `step`
    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next = StepTarget::Step(step.into());
        self
    }

    /// Pick the forward target from the context
    pub fn next_with<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> String + Send + Sync + 'static,
    {
        self.next = StepTarget::Computed(Arc::new(resolve));
        self
    }

    /// Always move back to `step`
    pub fn prev(mut self, step: impl Into<String>) -> Self {
        self.prev = StepTarget::Step(step.into());
        self
    }

    /// Pick the backward target from the context
    pub fn prev_with<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> String + Send + Sync + 'static,
    {
        self.prev = StepTarget::Computed(Arc::new(resolve));
        self
    }

    pub fn guard<F>(self, guard: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> bool + Send + Sync + 'static,
    {
        self.guard_async(move |ctx: &WorkflowContext<S>| futures::future::ready(guard(ctx)))
    }

    pub fn guard_async<F, Fut>(mut self, guard: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.guard = Some(Arc::new(
            move |ctx: &WorkflowContext<S>| -> BoxFuture<'static, bool> { guard(ctx).boxed() },
        ));
        self
    }

    pub fn validate<F>(self, validate: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> Result<(), FieldErrors> + Send + Sync + 'static,
    {
        self.validate_async(move |ctx: &WorkflowContext<S>| futures::future::ready(validate(ctx)))
    }

    pub fn validate_async<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn(&WorkflowContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FieldErrors>> + Send + 'static,
    {
        self.validate = Some(Arc::new(
            move |ctx: &WorkflowContext<S>| -> BoxFuture<'static, Result<(), FieldErrors>> {
                validate(ctx).boxed()
            },
        ));
        self
    }

    pub fn on_enter<F>(self, transform: F) -> Self
    where
        F: Fn(WorkflowContext<S>) -> WorkflowContext<S> + Send + Sync + 'static,
    {
        self.on_enter_async(move |ctx| futures::future::ready(transform(ctx)))
    }

    pub fn on_enter_async<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(WorkflowContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkflowContext<S>> + Send + 'static,
    {
        self.on_enter = Some(boxed_transform(transform));
        self
    }

    pub fn on_exit<F>(self, transform: F) -> Self
    where
        F: Fn(WorkflowContext<S>) -> WorkflowContext<S> + Send + Sync + 'static,
    {
        self.on_exit_async(move |ctx| futures::future::ready(transform(ctx)))
    }

    pub fn on_exit_async<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(WorkflowContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkflowContext<S>> + Send + 'static,
    {
        self.on_exit = Some(boxed_transform(transform));
        self
    }

    /// Literal target ids named by this step
    pub(crate) fn literal_targets(&self) -> impl Iterator<Item = &str> {
        [&self.next, &self.prev].into_iter().filter_map(|t| match t {
            StepTarget::Step(id) => Some(id.as_str()),
            _ => None,
        })
    }
}

fn boxed_transform<S, F, Fut>(transform: F) -> TransformFn<S>
where
    S: WizardState,
    F: Fn(WorkflowContext<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkflowContext<S>> + Send + 'static,
{
    Arc::new(move |ctx: WorkflowContext<S>| -> BoxFuture<'static, WorkflowContext<S>> {
        transform(ctx).boxed()
    })
}

/// Collect field errors; `Ok` when nothing was reported.
pub fn field_errors<I, K, V>(errors: I) -> Result<(), FieldErrors>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let errors: FieldErrors = errors
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizard_core::StateBag;

    fn ctx() -> WorkflowContext<StateBag> {
        WorkflowContext::new("w", 1, "a", None, None, StateBag::new())
    }

    #[tokio::test]
    async fn test_sync_hooks_are_wrapped() {
        let step = StepDeclaration::<StateBag>::new("a")
            .guard(|c| c.state.contains_key("ready"))
            .validate(|c| field_errors(c.state.get("email").is_none().then_some(("email", "required"))))
            .on_enter(|mut c| {
                c.state.insert("entered".into(), true.into());
                c
            });

        let guard = step.guard.as_ref().unwrap();
        assert!(!guard(&ctx()).await);

        let validate = step.validate.as_ref().unwrap();
        let errors = validate(&ctx()).await.unwrap_err();
        assert_eq!(errors.get("email").map(String::as_str), Some("required"));

        let on_enter = step.on_enter.as_ref().unwrap();
        assert_eq!(on_enter(ctx()).await.state["entered"], true);
    }

    #[tokio::test]
    async fn test_async_guard() {
        let step = StepDeclaration::<StateBag>::new("a").guard_async(|c: &WorkflowContext<StateBag>| {
            let allowed = c.tenant_id.is_none();
            async move {
                tokio::task::yield_now().await;
                allowed
            }
        });

        assert!((step.guard.as_ref().unwrap())(&ctx()).await);
    }

    #[test]
    fn test_literal_targets() {
        let step = StepDeclaration::<StateBag>::new("b").next("c").prev_with(|_| "a".to_string());
        assert_eq!(step.literal_targets().collect::<Vec<_>>(), vec!["c"]);
        assert!(format!("{:?}", step).contains("Computed(<fn>)"));
    }

    #[test]
    fn test_field_errors_helper() {
        assert!(field_errors(Vec::<(String, String)>::new()).is_ok());
        let err = field_errors([("name", "required")]).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
