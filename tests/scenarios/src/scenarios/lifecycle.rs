//! Entity lifecycle through a bucket.

use serde_json::json;
use sync_core::{BucketError, BucketOptions, Diffable, LogSink, StorageError, Version};

use crate::harness::{key, memory_bucket, Event, RecordingListener};

#[test]
fn note_lifecycle_end_to_end() {
    let (notes, _storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(recorder.clone());

    let mut note = notes.create_local(None).unwrap();
    let k = note.key().clone();
    assert!(note.is_new());
    assert_eq!(note.bucket_name(), Some("notes"));

    note.set("title", "groceries");
    notes.add(&mut note, Some("cv1".into())).unwrap();
    assert_eq!(notes.all_entities().unwrap().len(), 1);
    assert!(notes.has_change_version_at(&"cv1".into()).unwrap());

    note.set_version(Version::new(1));
    note.set("title", "groceries and milk");
    notes.update(&mut note, Some("cv2".into())).unwrap();

    let stored = notes.get(&k).unwrap().unwrap();
    assert_eq!(stored.get("title"), Some(&json!("groceries and milk")));
    assert_eq!(stored.version(), Version::new(1));

    let removed = notes.remove(&k, Some("cv3".into())).unwrap().unwrap();
    assert_eq!(removed.get("title"), Some(&json!("groceries and milk")));
    assert!(notes.get(&k).unwrap().is_none());
    assert_eq!(notes.change_version().unwrap(), Some("cv3".into()));

    assert_eq!(
        recorder.events(),
        vec![
            Event::Created(k.clone()),
            Event::Added(k.clone(), Version::UNACKNOWLEDGED),
            Event::Updated(k.clone(), Version::new(1)),
            Event::Removed(k),
        ]
    );
}

#[test]
fn create_entity_is_silent_and_unsaved() {
    let (notes, _storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(recorder.clone());

    let entity = notes.create_entity(key("draft"));
    assert_eq!(entity.bucket_name(), Some("notes"));
    assert_eq!(recorder.count(), 0);
    assert!(!notes.contains_key(&key("draft")).unwrap());
}

#[test]
fn add_with_existing_key_overwrites() {
    let (notes, storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());

    let mut first = notes.create_entity(key("n1"));
    first.set("title", "first");
    notes.add(&mut first, None).unwrap();

    let mut second = notes.create_entity(key("n1"));
    second.set("title", "second");
    notes.add(&mut second, None).unwrap();

    assert_eq!(storage.len("notes"), 1);
    let stored = notes.get(&key("n1")).unwrap().unwrap();
    assert_eq!(stored.get("title"), Some(&json!("second")));
}

#[test]
fn removing_an_absent_key_still_records_change_version() {
    let (notes, _storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(recorder.clone());

    assert!(notes.remove(&key("ghost"), Some("cv5".into())).unwrap().is_none());
    assert_eq!(recorder.count(), 0);
    assert!(notes.has_change_version_at(&"cv5".into()).unwrap());
}

#[test]
fn storage_failure_aborts_before_notification() {
    let (notes, storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(recorder.clone());

    let mut note = notes.create_entity(key("n1"));
    storage.fail_next_write("disk full");
    let err = notes.add(&mut note, Some("cv1".into())).unwrap_err();

    assert!(matches!(err, BucketError::Storage(StorageError::Unavailable(_))));
    assert_eq!(recorder.count(), 0);
    assert!(!notes.contains_key(&key("n1")).unwrap());
    assert!(!notes.has_change_version().unwrap());

    notes.add(&mut note, Some("cv1".into())).unwrap();
    assert_eq!(recorder.count(), 1);
}

#[test]
fn lookups_hydrate_attached_entities() {
    let (notes, _storage) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let mut note = notes.build_entity(key("n1"), Version::new(4), Default::default());
    note.set("pinned", true);
    notes.add(&mut note, None).unwrap();

    let all = notes.all_entities().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].bucket(), Some(notes.handle()));
    assert_eq!(all[0].get("pinned"), Some(&json!(true)));
    assert_eq!(notes.key_version(&key("n1")).unwrap(), Some(Version::new(4)));
    assert_eq!(notes.key_version(&key("n2")).unwrap(), None);
}

#[test]
fn entity_from_another_bucket_is_refused() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let (tags, _) = memory_bucket("tags", BucketOptions::default(), LogSink::default());

    let mut tag = tags.create_entity(key("t1"));
    let err = notes.add(&mut tag, None).unwrap_err();
    assert!(matches!(err, BucketError::ForeignEntity { ref bucket, .. } if bucket == "tags"));
    assert!(!notes.contains_key(&key("t1")).unwrap());
}

#[test]
fn start_without_channel_fails() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    assert!(matches!(notes.start(), Err(BucketError::NoChannel)));
}
