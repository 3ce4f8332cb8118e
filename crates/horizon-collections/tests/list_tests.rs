//! Integration tests for lists, sub-lists and cursors.

use std::sync::Arc;

use horizon_collections::prelude::*;
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Recorder = Arc<Mutex<Vec<String>>>;

fn record<S: SequenceStore>(list: &ObservableList<S>, recorder: &Recorder, name: &'static str) {
    let pre = Arc::clone(recorder);
    let post = Arc::clone(recorder);
    list.add_listener(Arc::new(
        FnListener::new()
            .on_modifying(move |_| {
                pre.lock().push(format!("pre:{name}"));
                Ok(())
            })
            .on_modified(move |_| {
                post.lock().push(format!("post:{name}"));
                Ok(())
            }),
    ));
}

fn letters(config: StoreConfig) -> ObservableList<VecStore<char>> {
    ObservableList::new(VecStore::from_vec(vec!['A', 'B', 'C', 'D', 'E'], config))
}

#[test]
fn test_phase_order_through_sub_lists() {
    setup();
    let root = letters(StoreConfig::default());
    let mid = root.sub_list(1, 4).unwrap();
    let leaf = mid.sub_list(0, 2).unwrap();

    let recorder = Recorder::default();
    record(&root, &recorder, "root");
    record(&mid, &recorder, "mid");
    record(&leaf, &recorder, "leaf");

    assert_eq!(leaf.remove(0).unwrap(), 'B');
    assert_eq!(
        *recorder.lock(),
        ["pre:leaf", "pre:mid", "pre:root", "post:root", "post:mid", "post:leaf"]
    );
    assert_eq!(leaf.to_vec().unwrap(), vec!['C']);
    assert_eq!(mid.to_vec().unwrap(), vec!['C', 'D']);
    assert_eq!(root.to_vec().unwrap(), vec!['A', 'C', 'D', 'E']);
}

#[test]
fn test_sizes_follow_store_after_each_mutation() {
    setup();
    let root = letters(StoreConfig::default());
    let mid = root.sub_list(1, 4).unwrap();

    mid.push('x').unwrap();
    assert_eq!(mid.len().unwrap(), 4);
    mid.insert_all(0, ['y', 'z']).unwrap();
    assert_eq!(mid.len().unwrap(), 6);
    mid.remove_range(1, 3).unwrap();
    assert_eq!(mid.to_vec().unwrap(), vec!['y', 'C', 'D', 'x']);
    assert_eq!(root.len().unwrap(), 6);
    mid.clear().unwrap();
    assert_eq!(mid.len().unwrap(), 0);
    assert_eq!(root.to_vec().unwrap(), vec!['A', 'E']);
}

#[test]
fn test_mutation_through_mid_makes_leaf_stale() {
    setup();
    let root = letters(StoreConfig::default());
    let mid = root.sub_list(1, 4).unwrap();
    let leaf = mid.sub_list(0, 2).unwrap();

    mid.push('F').unwrap();
    assert!(!leaf.is_fresh());
    assert!(mid.is_fresh());
    assert!(root.is_fresh());
    assert!(matches!(leaf.get(0), Err(CollectionError::Stale(_))));
    assert!(matches!(leaf.push('G'), Err(CollectionError::Stale(_))));
    assert_eq!(root.len().unwrap(), 6);
}

#[test]
fn test_eviction_before_nested_windows_keeps_their_elements() {
    setup();
    let root = letters(StoreConfig::unique());
    let v1 = root.sub_list(1, 4).unwrap();
    let v2 = v1.sub_list(0, 2).unwrap();
    assert_eq!(v2.to_vec().unwrap(), vec!['B', 'C']);

    // Writing 'A' over 'C' evicts the 'A' at absolute 0.
    assert_eq!(v2.set(1, 'A').unwrap(), 'C');
    assert_eq!(root.to_vec().unwrap(), vec!['B', 'A', 'D', 'E']);
    assert_eq!(v1.to_vec().unwrap(), vec!['B', 'A', 'D']);
    assert_eq!(v2.to_vec().unwrap(), vec!['B', 'A']);
    assert!(v1.is_fresh() && v2.is_fresh() && root.is_fresh());
}

#[test]
fn test_hook_veto_leaves_store_unchanged() {
    setup();
    let root = letters(StoreConfig::default());
    let sub = root.sub_list(0, 3).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    root.set_pre_hook(|_| Err("root says no".into()));
    sub.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        let outcome = event.final_modification().outcome().cloned();
        recorder.lock().push((outcome, event.pre_failure().is_some()));
        Ok(())
    })));

    let error = sub.remove(0).unwrap_err();
    match error {
        CollectionError::PreModification(failure) => {
            assert_eq!(failure.view(), &ViewInfo::Root);
            assert_eq!(failure.phase(), Phase::Pre);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(root.to_vec().unwrap(), vec!['A', 'B', 'C', 'D', 'E']);
    assert!(sub.is_fresh());
    assert_eq!(*seen.lock(), vec![(Some(Outcome::Aborted), true)]);

    root.clear_hooks();
    assert_eq!(sub.remove(0).unwrap(), 'A');
}

#[test]
fn test_rejected_duplicate_fails_late() {
    setup();
    let config = StoreBuilder::new().duplicates(DuplicatePolicy::Reject).build();
    let list = letters(config);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&outcomes);
    list.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        recorder.lock().push((
            event.final_modification().failure().cloned(),
            event.value(Phase::Post).copied(),
        ));
        Ok(())
    })));

    let error = list.push('B').unwrap_err();
    assert!(matches!(error, CollectionError::PreModification(_)));
    assert_eq!(list.len().unwrap(), 5);
    assert_eq!(
        *outcomes.lock(),
        vec![(Some(StoreError::Duplicate { position: 1 }), None)]
    );
    list.push('F').unwrap();
    assert_eq!(list.last().unwrap(), Some('F'));
}

#[test]
fn test_cursor_and_list_removal_are_equivalent() {
    setup();
    // A veto must skip the store in both call paths.
    for through_cursor in [false, true] {
        let list = letters(StoreConfig::default());
        list.set_pre_hook(|event| match event.value(Phase::Pre) {
            Some('C') => Err("keep C".into()),
            _ => Ok(()),
        });

        let result = if through_cursor {
            let mut cursor = list.cursor(2).unwrap();
            cursor.next().unwrap().unwrap();
            cursor.remove()
        } else {
            list.remove(2)
        };
        assert!(matches!(result, Err(CollectionError::PreModification(_))));
        assert_eq!(list.to_vec().unwrap(), vec!['A', 'B', 'C', 'D', 'E']);
    }
}

#[test]
fn test_listener_cannot_mutate_while_frozen() {
    setup();
    let list = letters(StoreConfig::default());
    let inner = list.clone();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&attempts);
    list.add_listener(Arc::new(FnListener::new().on_modified(move |_| {
        let frozen = inner.is_frozen();
        let result = inner.push('Z');
        recorder.lock().push((frozen, matches!(result, Err(CollectionError::Frozen))));
        Ok(())
    })));

    list.push('F').unwrap();
    assert_eq!(*attempts.lock(), vec![(true, true)]);
    assert_eq!(list.len().unwrap(), 6);
    assert!(!list.is_frozen());
}

#[test]
fn test_cause_depth_matches_view_depth() {
    setup();
    let root = letters(StoreConfig::default());
    let mid = root.sub_list(1, 4).unwrap();
    let leaf = mid.sub_list(1, 3).unwrap();
    let depths = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&depths);
    root.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        recorder.lock().push((
            event.change(),
            event.cause_depth(),
            event.path().len(),
            event.index(Phase::Pre),
            event.index(Phase::Post),
        ));
        Ok(())
    })));

    leaf.insert(0, 'x').unwrap();
    leaf.remove(0).unwrap();
    assert_eq!(
        *depths.lock(),
        vec![
            (ChangeKind::Attach, 2, 3, None, Some(2)),
            (ChangeKind::Detach, 2, 3, Some(2), None),
        ]
    );
}

#[test]
fn test_cursor_removals_keep_list_in_step() {
    setup();
    let list = ObservableList::new(VecStore::from((1..=6).collect::<Vec<i32>>()));
    let mut cursor = list.cursor(0).unwrap();
    while let Some(item) = cursor.next() {
        if item.unwrap() % 2 == 0 {
            cursor.remove().unwrap();
        }
    }
    assert_eq!(list.to_vec().unwrap(), vec![1, 3, 5]);
    assert!(list.is_fresh());
    assert!(cursor.is_fresh());
}
