//! Integration tests for maps, their views and sets.

use std::sync::Arc;

use horizon_collections::prelude::*;
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scores() -> ObservableMap<SortedStore<&'static str, u32>> {
    let map = ObservableMap::new(SortedStore::new());
    for (name, score) in [("ada", 90), ("bob", 72), ("cy", 85), ("dee", 60), ("eve", 99)] {
        map.put(name, score).unwrap();
    }
    map
}

#[test]
fn test_nested_sub_maps_bubble_to_root() {
    setup();
    let map = scores();
    let middle = map.sub_map("b".."e").unwrap();
    let inner = middle.tail_map("c", true).unwrap();
    assert_eq!(inner.keys(), vec!["cy", "dee"]);

    let order = Arc::new(Mutex::new(Vec::new()));
    for (view, name) in [(&map, "root"), (&middle, "middle"), (&inner, "inner")] {
        let pre = Arc::clone(&order);
        let post = Arc::clone(&order);
        view.add_listener(Arc::new(
            FnListener::new()
                .on_modifying(move |_| {
                    pre.lock().push(format!("pre:{name}"));
                    Ok(())
                })
                .on_modified(move |event| {
                    post.lock()
                        .push(format!("post:{name}:{}", event.cause_depth()));
                    Ok(())
                }),
        ));
    }

    assert_eq!(inner.remove(&"cy").unwrap(), Some(85));
    assert_eq!(
        *order.lock(),
        [
            "pre:inner",
            "pre:middle",
            "pre:root",
            "post:root:2",
            "post:middle:1",
            "post:inner:0",
        ]
    );
    assert_eq!(middle.keys(), vec!["bob", "dee"]);
}

#[test]
fn test_key_range_views_never_go_stale() {
    setup();
    let map = scores();
    let low = map.head_map("c", false).unwrap();
    map.put("al", 50).unwrap();
    map.remove(&"bob").unwrap();
    assert_eq!(low.keys(), vec!["ada", "al"]);
    assert_eq!(low.first(), Some(("ada", 90)));
    assert!(low.put("zed", 1).is_err());
}

#[test]
fn test_descending_sub_map_navigation() {
    setup();
    let map = scores();
    let reversed = map.descending_map();
    let top = reversed.head_map("cy", true).unwrap();
    assert_eq!(top.keys(), vec!["eve", "dee", "cy"]);
    assert_eq!(top.ceiling(&"d"), Some(("cy", 85)));
    assert_eq!(top.floor(&"d"), Some(("dee", 60)));
    assert_eq!(top.poll_last().unwrap(), Some(("cy", 85)));
    assert_eq!(reversed.descending_map().keys(), vec!["ada", "bob", "dee", "eve"]);
}

#[test]
fn test_access_ordered_map_promotes_on_get() {
    setup();
    let cache = ObservableMap::new(LinkedStore::with_config(StoreConfig::access_ordered()));
    for page in [1, 2, 3] {
        cache.put(page, format!("page {page}")).unwrap();
    }
    let promotions = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&promotions);
    cache.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        if event.final_modification().intent() == Intent::AccessPromotion {
            *counter.lock() += 1;
        }
        Ok(())
    })));

    cache.get(&1).unwrap();
    cache.get(&2).unwrap();
    assert_eq!(cache.keys(), vec![3, 1, 2]);
    // Evict the least recently used entry.
    assert_eq!(cache.poll_first().unwrap(), Some((3, "page 3".to_string())));
    assert_eq!(*promotions.lock(), 2);
}

#[test]
fn test_rekey_under_reject_fails_without_change() {
    setup();
    let map = ObservableMap::new(SortedStore::with_config(
        StoreBuilder::new().duplicates(DuplicatePolicy::Reject).build(),
    ));
    map.put(1, "one").unwrap();
    map.put(2, "two").unwrap();

    assert!(matches!(
        map.rekey(&1, 2),
        Err(CollectionError::PreModification(_))
    ));
    assert!(matches!(map.put(2, "deux"), Err(CollectionError::PreModification(_))));
    assert_eq!(map.entries(), vec![(1, "one"), (2, "two")]);

    map.rekey(&1, 3).unwrap();
    assert_eq!(map.entries(), vec![(2, "two"), (3, "one")]);
}

#[test]
fn test_views_share_listeners_through_bubbling() {
    setup();
    let map = scores();
    let keys = map.key_view();
    let values = map.value_view();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    map.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
        let origin = event.path().first().cloned();
        recorder.lock().push((origin, event.key(Phase::Pre).copied()));
        Ok(())
    })));

    keys.remove(&"ada").unwrap();
    values.remove_value(&60).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            (Some(ViewInfo::KeyView), Some("ada")),
            (Some(ViewInfo::ValueView), Some("dee")),
        ]
    );
    assert!(matches!(keys.insert("zoe"), Err(CollectionError::Unsupported(_))));
}

#[test]
fn test_sorted_set_views() {
    setup();
    let set: ObservableSet<SortedStore<u32, ()>> = (1..=10).collect();
    let evens_removed = set.retain(|n| n % 2 == 1).unwrap();
    assert_eq!(evens_removed, 5);

    let middle = set.sub_set(3..8).unwrap();
    assert_eq!(middle.to_vec(), vec![3, 5, 7]);
    assert!(middle.insert(4).unwrap());
    assert!(!middle.insert(4).unwrap());
    assert!(middle.insert(11).is_err());
    assert_eq!(set.to_vec(), vec![1, 3, 4, 5, 7, 9]);
    assert_eq!(middle.descending_set().first(), Some(7));
    assert_eq!(set.lower(&4), Some(3));
    assert_eq!(set.higher(&9), None);
}

type Removal = (ModificationKind, Intent, ChangeKind, Option<(&'static str, u32)>, Option<Outcome>);

#[test]
fn test_cursor_removal_matches_direct_removal() {
    setup();
    let mut removals: Vec<Vec<Removal>> = Vec::new();
    for through_cursor in [false, true] {
        let map = scores();
        map.set_pre_hook(|event| match event.key(Phase::Pre) {
            Some(&"cy") => Err("cy stays".into()),
            _ => Ok(()),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        map.add_listener(Arc::new(FnListener::new().on_modified(move |event| {
            let modification = event.final_modification();
            recorder.lock().push((
                modification.kind(),
                modification.intent(),
                event.change(),
                event.entry(Phase::Pre).copied(),
                modification.outcome().cloned(),
            ));
            Ok(())
        })));

        for key in ["bob", "cy"] {
            let result = if through_cursor {
                let mut cursor = map.cursor();
                while let Some(entry) = cursor.next() {
                    if entry.unwrap().0 == key {
                        break;
                    }
                }
                cursor.remove().map(|(_, score)| Some(score))
            } else {
                map.remove(&key)
            };
            assert_eq!(result.is_err(), key == "cy");
        }
        assert_eq!(map.keys(), vec!["ada", "cy", "dee", "eve"]);
        removals.push(seen.lock().clone());
    }

    let (direct, cursor) = (&removals[0], &removals[1]);
    assert_eq!(direct.len(), 2);
    assert_eq!(cursor.len(), 2);
    for (direct, cursor) in direct.iter().zip(cursor) {
        assert_eq!(direct.1, Intent::Explicit);
        assert_eq!(cursor.1, Intent::IteratorRemove);
        assert_eq!((direct.0, direct.2, direct.3, &direct.4), (cursor.0, cursor.2, cursor.3, &cursor.4));
    }
    assert_eq!(direct[0].4, Some(Outcome::Applied));
    assert_eq!(direct[1].4, Some(Outcome::Aborted));
}

#[test]
fn test_map_cursor_goes_stale_after_sibling_mutation() {
    setup();
    let map = scores();
    let keys = map.key_view();
    let values = map.value_view();
    let mut cursor = keys.cursor();
    assert_eq!(cursor.next().unwrap().unwrap(), "ada");

    values.remove_value(&72).unwrap();
    assert!(!cursor.is_fresh());
    assert!(matches!(cursor.next(), Some(Err(CollectionError::Stale(_)))));
    assert!(matches!(cursor.remove(), Err(CollectionError::Stale(_))));
    assert_eq!(keys.to_vec(), vec!["ada", "cy", "dee", "eve"]);

    // Replacing a value in place is not structural.
    let mut fresh = keys.cursor();
    map.put("ada", 91).unwrap();
    assert!(fresh.is_fresh());
    assert_eq!(fresh.next().unwrap().unwrap(), "ada");
}

#[test]
fn test_cursor_remove_without_current_element() {
    setup();
    let set: ObservableSet<SortedStore<u32, ()>> = (1..=3).collect();
    let mut cursor = set.cursor();
    assert!(matches!(cursor.remove(), Err(CollectionError::NoCurrentElement)));
    assert_eq!(cursor.next().unwrap().unwrap(), 1);
    assert_eq!(cursor.remove().unwrap(), 1);
    assert!(matches!(cursor.remove(), Err(CollectionError::NoCurrentElement)));
    assert_eq!(cursor.next().unwrap().unwrap(), 2);
    assert_eq!(set.to_vec(), vec![2, 3]);
}
