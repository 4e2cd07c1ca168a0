use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use syncbox_concurrent::{ConcurrentMap, Diagnostics, MapPolicy};

#[derive(Debug)]
struct Record {
    name: String,
    tag: Option<String>,
}

impl Record {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
        }
    }
}

#[test]
fn collision_policy_matrix() {
    let default_map = ConcurrentMap::new();
    let v1 = default_map.add("k", Record::new("v1")).unwrap();
    let got = default_map.add("k", Record::new("v2")).unwrap();
    assert!(Arc::ptr_eq(&v1, &got));
    assert_eq!(default_map.size(), 1);

    let replacing = ConcurrentMap::with_policy(MapPolicy::replacing());
    replacing.add("k", Record::new("v1")).unwrap();
    let got = replacing.add("k", Record::new("v2")).unwrap();
    assert_eq!(got.name, "v2");
    assert_eq!(replacing.size(), 1);

    let failing = ConcurrentMap::with_policy(MapPolicy::failing());
    failing.add("k", Record::new("v1")).unwrap();
    assert!(failing.add("k", Record::new("v2")).is_none());
    assert_eq!(failing.find("k").unwrap().name, "v1");
}

#[test]
fn scan_finds_single_tagged_entry_in_large_set() {
    const ITEM_COUNT: usize = 20_000;
    let map = ConcurrentMap::with_capacity(ITEM_COUNT + 1);
    for i in 0..ITEM_COUNT {
        assert!(map.add(format!("foo{}", i), Record::new("bard")).is_some());
    }
    map.add(
        "unique".to_string(),
        Record {
            name: "uniquebar".into(),
            tag: Some("needle".into()),
        },
    )
    .unwrap();
    assert_eq!(map.size(), ITEM_COUNT + 1);

    let mut visited = HashSet::new();
    let hit = map
        .scan(|k, v| {
            assert!(visited.insert(k.clone()), "{} visited twice", k);
            v.tag.as_deref() == Some("needle")
        })
        .unwrap();
    assert_eq!(hit.name, "uniquebar");
    assert!(visited.contains("unique"));
    assert!(visited.len() <= ITEM_COUNT + 1);

    let calls = AtomicUsize::new(0);
    let mut matches = 0;
    assert!(map
        .scan(|_, v| {
            calls.fetch_add(1, Ordering::Relaxed);
            if v.tag.is_some() {
                matches += 1;
            }
            false
        })
        .is_none());
    assert_eq!(matches, 1);
    assert_eq!(calls.load(Ordering::Relaxed), ITEM_COUNT + 1);

    assert!(map.scan(|k, _| k.as_str() == "missing").is_none());
}

#[test]
fn scan_builds_json_document() {
    let map = ConcurrentMap::new();
    for i in 0..50 {
        map.add(format!("key{}", i), Record::new(format!("bar{}", i)));
    }
    let mut doc = serde_json::Map::new();
    map.scan(|k, v| {
        doc.insert(k.clone(), serde_json::Value::String(v.name.clone()));
        false
    });
    assert_eq!(doc.len(), map.size());
    assert_eq!(doc["key7"], "bar7");
}

#[test]
fn removed_handle_outlives_table_entry() {
    let map = Arc::new(ConcurrentMap::new());
    let held = map.add(1u64, Record::new("held")).unwrap();

    let remover = {
        let map = map.clone();
        thread::spawn(move || map.remove(&1).map(|h| h.name.clone()))
    };
    assert_eq!(remover.join().unwrap().as_deref(), Some("held"));

    assert!(map.find(&1).is_none());
    assert_eq!(held.name, "held");
    assert_eq!(Arc::strong_count(&held), 1);
}

#[test]
fn parallel_writers_and_readers() -> anyhow::Result<()> {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 2_000;

    let map = Arc::new(ConcurrentMap::<u64, u64>::new());
    let barrier = Arc::new(Barrier::new((WRITERS * 2) as usize));

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let map = map.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..PER_WRITER {
                let key = w * PER_WRITER + i;
                assert_eq!(map.add(key, key * 10).map(|h| *h), Some(key * 10));
                if i % 4 == 0 {
                    assert!(map.remove(&key).is_some());
                }
            }
        }));
    }
    for _ in 0..WRITERS {
        let map = map.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..PER_WRITER {
                if let Some(v) = map.find(&i) {
                    assert_eq!(*v, i * 10);
                }
                // every visible entry is complete
                assert!(map.scan(|k, v| **v != *k * 10).is_none());
            }
        }));
    }
    for h in handles {
        h.join().map_err(|_| anyhow::anyhow!("worker panicked"))?;
    }

    let removed = WRITERS * PER_WRITER / 4;
    assert_eq!(map.add_counter(), WRITERS * PER_WRITER);
    assert_eq!(map.remove_counter(), removed);
    assert_eq!(map.size() as u64, WRITERS * PER_WRITER - removed);

    let doc = map.to_json()?;
    assert_eq!(doc["adds"], WRITERS * PER_WRITER);
    assert_eq!(doc["size"], WRITERS * PER_WRITER - removed);
    Ok(())
}

#[test]
fn factory_side_effects_only_on_store() {
    let map: ConcurrentMap<&str, Record> = ConcurrentMap::new();
    let built = AtomicUsize::new(0);
    let build = |k: &&str| {
        built.fetch_add(1, Ordering::SeqCst);
        Record::new(format!("built-{}", k))
    };

    map.add_with("a", build).unwrap();
    map.add_with("a", build).unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);

    map.set_fail_on_collision(true);
    assert!(map.add_with("a", build).is_none());
    assert_eq!(built.load(Ordering::SeqCst), 1);

    map.set_policy(MapPolicy::replacing());
    assert_eq!(map.add_with("a", build).unwrap().name, "built-a");
    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(map.add_counter(), 2);
}
