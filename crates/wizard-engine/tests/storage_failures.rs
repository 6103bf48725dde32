//! Engine behavior when the storage backend misbehaves.

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::always;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use wizard_core::{ContextKey, SaveReceipt, StorageAdapter, StorageError, StoredContext};
use wizard_engine::{
    event_types, Event, StateBag, StepDeclaration, WizardEngine, WizardError, WorkflowContext,
    WorkflowDefinition,
};
use wizard_infra::TimeoutPolicy;

mock! {
    pub Storage {}

    #[async_trait]
    impl StorageAdapter for Storage {
        async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError>;
        async fn load(&self, key: &ContextKey) -> Result<Option<StoredContext>, StorageError>;
        async fn clear(&self, key: &ContextKey) -> Result<(), StorageError>;
        fn backend(&self) -> &'static str;
    }
}

fn two_steps() -> WorkflowDefinition<StateBag> {
    WorkflowDefinition::new("pair", 1)
        .step(StepDeclaration::new("a"))
        .step(StepDeclaration::new("b"))
}

fn accept(context: &StoredContext) -> Result<SaveReceipt, StorageError> {
    let mut persisted = context.clone();
    persisted.revision += 1;
    Ok(SaveReceipt {
        saved_at: persisted.updated_at,
        context: persisted,
    })
}

fn events(engine: &WizardEngine) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.on("*", move |e: &Event| {
        sink.lock().push(e.event_type.clone());
        Ok(())
    });
    seen
}

#[tokio::test]
async fn test_backend_failure_on_init() {
    let mut storage = MockStorage::new();
    storage.expect_load().returning(|_| Ok(None));
    storage
        .expect_save()
        .times(1)
        .returning(|_| Err(StorageError::Backend("disk full".into())));

    let engine = WizardEngine::new(two_steps())
        .unwrap()
        .with_storage(Arc::new(storage));
    let seen = events(&engine);

    let err = engine.init(None, None, None).await.unwrap_err();
    assert_eq!(err.code(), "storage_failure");
    assert!(!err.is_recoverable());
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_load_failure_propagates() {
    let mut storage = MockStorage::new();
    storage
        .expect_load()
        .with(always())
        .returning(|_| Err(StorageError::Database("connection reset".into())));

    let engine = WizardEngine::new(two_steps())
        .unwrap()
        .with_storage(Arc::new(storage));

    let err = engine.load(Some("t1"), None).await.unwrap_err();
    assert!(matches!(err, WizardError::Storage(StorageError::Database(_))));
}

#[tokio::test]
async fn test_conflict_during_transition_emits_nothing() {
    let mut storage = MockStorage::new();
    storage.expect_load().returning(|_| Ok(None));
    let mut saves = 0;
    storage.expect_save().returning(move |ctx| {
        saves += 1;
        if saves == 1 {
            accept(ctx)
        } else {
            Err(StorageError::Conflict {
                key: ctx.key().to_string(),
                expected: ctx.revision,
                found: ctx.revision + 1,
            })
        }
    });

    let engine = WizardEngine::new(two_steps())
        .unwrap()
        .with_storage(Arc::new(storage));
    let ctx = engine.init(None, None, None).await.unwrap();
    let seen = events(&engine);

    let err = engine.next(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "conflict");
    assert!(!seen.lock().contains(&event_types::WIZARD_STEP.to_string()));
    assert_eq!(ctx.current_step, "a");
}

struct SlowStorage;

#[async_trait]
impl StorageAdapter for SlowStorage {
    async fn save(&self, context: &StoredContext) -> Result<SaveReceipt, StorageError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        accept(context)
    }

    async fn load(&self, _key: &ContextKey) -> Result<Option<StoredContext>, StorageError> {
        Ok(None)
    }

    fn backend(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn test_slow_storage_times_out() {
    let engine = WizardEngine::new(two_steps())
        .unwrap()
        .with_storage(Arc::new(SlowStorage))
        .with_timeouts(TimeoutPolicy::default().with_storage_timeout(Duration::from_millis(25)));

    match engine.init(None, None, None).await.unwrap_err() {
        WizardError::Timeout(e) => {
            assert_eq!(e.operation, "storage.save");
            assert_eq!(e.duration, Duration::from_millis(25));
        }
        other => panic!("unexpected error: {other}"),
    }

    let ctx: WorkflowContext<StateBag> = WorkflowContext::new("pair", 1, "a", None, None, StateBag::new());
    let err = engine.save(&ctx, &StateBag::new()).await.unwrap_err();
    assert_eq!(err.code(), "timeout");
}
