//! Integration tests for the notification pipeline across levels.

use std::sync::Arc;

use horizon_collections_core::{
    AttributeScope, ByKey, ByValue, CollectionError, ElementEvent, FnElementListener, FnListener,
    Level, Modification, ModificationEvent, ModificationKind, Notifier, Outcome, Phase, ViewInfo,
    run_mutation,
};
use horizon_collections_core::logging::{span_names, targets};
use parking_lot::Mutex;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Root = Notifier<String, u32, ByValue>;
type Keys = Notifier<String, u32, ByKey>;

fn levels() -> (Arc<Root>, Arc<Keys>) {
    let root: Arc<Root> = Arc::new(Notifier::new(ViewInfo::Root, ByValue::new(), None));
    let parent: Arc<dyn Level<String, u32>> = root.clone();
    let keys = Arc::new(Notifier::new(ViewInfo::KeyView, ByKey::new(), Some(parent)));
    (root, keys)
}

fn removal(
    modification: &Arc<Modification>,
    key: &str,
    value: u32,
) -> Arc<ModificationEvent<String, u32>> {
    Arc::new(ModificationEvent::detach(
        ViewInfo::KeyView,
        Arc::clone(modification),
        key.to_string(),
        value,
    ))
}

#[test]
fn test_attribute_scopes_across_levels() {
    setup();
    let (root, keys) = levels();
    keys.set_pre_hook(|event| {
        event.attributes(AttributeScope::Local).set("local", 1_u32);
        event.attributes(AttributeScope::Chain).set("chain", 2_u32);
        event.attributes(AttributeScope::Global).set("global", 3_u32);
        Ok(())
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    root.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        let read = |scope, name| event.attributes(scope).get::<u32>(name).map(|value| *value);
        recorder.lock().push((
            read(AttributeScope::Local, "local"),
            read(AttributeScope::Chain, "chain"),
            read(AttributeScope::Global, "global"),
        ));
        Ok(())
    })));

    let modification = Modification::new(ModificationKind::RemoveKey);
    run_mutation(&*keys, &[removal(&modification, "a", 1)], |_| Ok(()), || {}).unwrap();
    assert_eq!(*seen.lock(), vec![(None, Some(2), Some(3))]);
}

#[test]
fn test_one_veto_aborts_the_whole_batch() {
    setup();
    let (root, keys) = levels();
    let elements = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&elements);
    keys.add_element_listener(Arc::new(FnElementListener::new().on_modified(
        move |event: &dyn ElementEvent<String>| {
            recorder
                .lock()
                .push(event.element(Phase::Pre).cloned().unwrap_or_default());
            Ok(())
        },
    )));
    root.add_listener(Arc::new(FnListener::new().on_modifying(|event| {
        match event.value(Phase::Pre) {
            Some(2) => Err("pinned".into()),
            _ => Ok(()),
        }
    })));

    let modification = Modification::new(ModificationKind::Clear);
    let events = [
        removal(&modification, "a", 1),
        removal(&modification, "b", 2),
        removal(&modification, "c", 3),
    ];
    let applied = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&applied);
    let error = run_mutation(
        &*keys,
        &events,
        |_| panic!("store must not be touched"),
        move || *flag.lock() = true,
    )
    .unwrap_err();

    assert!(matches!(error, CollectionError::PreModification(_)));
    assert!(!*applied.lock());
    assert_eq!(modification.outcome(), Some(&Outcome::Aborted));
    // The post phase still ran for every event.
    assert_eq!(*elements.lock(), ["a", "b", "c"]);
    assert!(events[0].pre_failure().is_none());
    assert!(events[1].pre_failure().is_some());
}

/// Records span names and event targets seen while installed.
#[derive(Clone, Default)]
struct Recorded {
    spans: Arc<Mutex<Vec<&'static str>>>,
    targets: Arc<Mutex<Vec<&'static str>>>,
}

impl<S: tracing::Subscriber> Layer<S> for Recorded {
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: Context<'_, S>,
    ) {
        self.spans.lock().push(attrs.metadata().name());
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.targets.lock().push(event.metadata().target());
    }
}

#[test]
fn test_mutation_runs_inside_named_spans() {
    let recorded = Recorded::default();
    let subscriber = tracing_subscriber::registry().with(recorded.clone());
    tracing::subscriber::with_default(subscriber, || {
        let (root, keys) = levels();
        root.add_listener(Arc::new(
            FnListener::new().on_modified(|_| Err("refused".into())),
        ));
        let modification = Modification::new(ModificationKind::RemoveKey);
        let result = run_mutation(&*keys, &[removal(&modification, "a", 1)], |_| Ok(()), || {});
        assert!(matches!(result, Err(CollectionError::PostModification(_))));
    });

    assert_eq!(
        *recorded.spans.lock(),
        [
            span_names::MUTATION,
            span_names::PRE_PHASE,
            span_names::PRE_PHASE,
            span_names::POST_PHASE,
            span_names::POST_PHASE,
        ]
    );
    let seen = recorded.targets.lock();
    assert!(seen.contains(&targets::PIPELINE));
    assert!(seen.contains(&targets::LISTENER));
}
