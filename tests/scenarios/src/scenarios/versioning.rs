//! Entity versions, change versions and key generation.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use sync_core::{
    Bucket, BucketError, BucketObject, BucketObjectFactory, BucketOptions, Diffable, EntityKey,
    KeySource, LogSink, MemoryStorage, Properties, Version, VersionPolicy,
};

use crate::harness::{key, memory_bucket, LogCapture, RecordingListener};

fn versioned(bucket: &Bucket<BucketObject>, k: &str, version: u64) -> BucketObject {
    bucket.build_entity(key(k), Version::new(version), Properties::new())
}

#[test]
fn has_key_version_follows_updates() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let mut note = versioned(&notes, "n1", 2);
    notes.add(&mut note, None).unwrap();

    assert!(notes.has_key_version(&key("n1"), Version::new(2)).unwrap());
    assert!(!notes.has_key_version(&key("n1"), Version::new(3)).unwrap());

    note.set_version(Version::new(3));
    notes.update(&mut note, None).unwrap();
    assert!(notes.has_key_version(&key("n1"), Version::new(3)).unwrap());
    assert!(!notes.has_key_version(&key("missing"), Version::new(1)).unwrap());
}

#[test]
fn stale_update_is_rejected_by_default() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    let mut current = versioned(&notes, "n1", 5);
    notes.add(&mut current, Some("cv1".into())).unwrap();
    notes.add_listener(recorder.clone());

    let mut stale = versioned(&notes, "n1", 4);
    stale.set("title", "old");
    let err = notes.update(&mut stale, Some("cv2".into())).unwrap_err();

    match err {
        BucketError::StaleVersion {
            key: k,
            stored,
            incoming,
        } => {
            assert_eq!(k, key("n1"));
            assert_eq!(stored, Version::new(5));
            assert_eq!(incoming, Version::new(4));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(recorder.count(), 0);
    assert_eq!(notes.key_version(&key("n1")).unwrap(), Some(Version::new(5)));
    assert!(notes.has_change_version_at(&"cv1".into()).unwrap());
}

#[test]
fn last_writer_wins_applies_and_warns() {
    let (log, capture) = LogCapture::sink();
    let options = BucketOptions::default().with_version_policy(VersionPolicy::LastWriterWins);
    let (notes, _) = memory_bucket("notes", options, log);

    let mut current = versioned(&notes, "n1", 3);
    notes.add(&mut current, None).unwrap();
    let mut older = versioned(&notes, "n1", 2);
    notes.update(&mut older, None).unwrap();

    assert_eq!(notes.key_version(&key("n1")).unwrap(), Some(Version::new(2)));
    let warnings = capture.lines_with("Overwriting n1 in notes");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("WARN"));
}

#[test]
fn change_version_is_compared_by_equality() {
    let (log, capture) = LogCapture::sink();
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), log);
    assert!(!notes.has_change_version().unwrap());
    assert_eq!(notes.change_version().unwrap(), None);

    notes.set_change_version("b7".into()).unwrap();
    notes.set_change_version("a1".into()).unwrap();

    assert!(notes.has_change_version().unwrap());
    assert!(notes.has_change_version_at(&"a1".into()).unwrap());
    assert!(!notes.has_change_version_at(&"b7".into()).unwrap());
    assert_eq!(capture.lines_with("Saving change version a1 for notes").len(), 1);
}

/// Always proposes the same key.
struct StuckKeys;

impl KeySource for StuckKeys {
    fn next_key(&self) -> EntityKey {
        key("taken")
    }
}

#[test]
fn key_generation_gives_up_after_configured_attempts() {
    let (log, capture) = LogCapture::sink();
    let storage = Arc::new(MemoryStorage::new());
    let notes: Bucket<BucketObject> = Bucket::builder("notes", BucketObjectFactory, storage)
        .options(BucketOptions::default().with_max_key_attempts(3))
        .key_source(Arc::new(StuckKeys))
        .log_sink(log)
        .build();
    let mut existing = notes.create_entity(key("taken"));
    notes.add(&mut existing, None).unwrap();

    let err = notes.new_entity().unwrap_err();
    assert!(matches!(err, BucketError::IdentityExhausted { attempts: 3 }));
    assert_eq!(capture.lines_with("Key collision on taken").len(), 3);

    let explicit = notes.create_local(Some(key("chosen"))).unwrap();
    assert_eq!(explicit.key(), &key("chosen"));
}

proptest! {
    #[test]
    fn stored_version_never_decreases(versions in prop::collection::vec(0u64..20, 1..30)) {
        let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
        let mut highest: Option<u64> = None;

        for v in versions {
            let mut entity = versioned(&notes, "n1", v);
            let result = notes.update(&mut entity, None);
            match highest {
                Some(h) if v < h => {
                    let is_stale = matches!(result, Err(BucketError::StaleVersion { .. }));
                    prop_assert!(is_stale);
                }
                _ => {
                    prop_assert!(result.is_ok());
                    highest = Some(v);
                }
            }
            prop_assert_eq!(notes.key_version(&key("n1")).unwrap(), highest.map(Version::new));
        }
    }

    #[test]
    fn generated_keys_are_fresh(count in 1usize..40) {
        let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
        let mut seen = HashSet::new();

        for _ in 0..count {
            let mut entity = notes.new_entity().unwrap();
            prop_assert!(!notes.contains_key(entity.key()).unwrap());
            prop_assert!(seen.insert(entity.key().clone()));
            notes.add(&mut entity, None).unwrap();
        }
        prop_assert_eq!(notes.all_entities().unwrap().len(), count);
    }
}
