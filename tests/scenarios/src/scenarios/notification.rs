//! Listener fan-out.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use sync_core::{
    Bucket, BucketObject, BucketOptions, EntityKey, Listener, ListenerId, ListenerResult, LogSink,
};

use crate::harness::{
    key, memory_bucket, Event, FailingListener, Journal, LogCapture, PanickingListener,
    RecordingListener,
};

#[test]
fn listeners_run_in_subscription_order() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let journal = Journal::default();
    notes.add_listener(RecordingListener::with_journal("l1", &journal));
    notes.add_listener(RecordingListener::with_journal("l2", &journal));

    let mut note = notes.create_local(Some(key("n1"))).unwrap();
    notes.add(&mut note, None).unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec!["l1:created:n1", "l2:created:n1", "l1:added:n1", "l2:added:n1"]
    );
}

#[test]
fn failing_listener_is_logged_and_skipped() {
    let (log, capture) = LogCapture::sink();
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), log);
    let failing = FailingListener::new();
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(failing.clone());
    notes.add_listener(recorder.clone());

    let mut note = notes.create_entity(key("n1"));
    notes.add(&mut note, None).unwrap();

    assert_eq!(failing.calls(), 1);
    assert_eq!(recorder.events(), vec![Event::Added(key("n1"), Default::default())]);
    let warnings = capture.lines_with("failing-index");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("WARN"));
    assert!(warnings[0].contains("index offline while handling n1"));
}

#[test]
fn panicking_listener_does_not_stop_dispatch() {
    let (log, capture) = LogCapture::sink();
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), log);
    let recorder = RecordingListener::new("recorder");
    notes.add_listener(Arc::new(PanickingListener));
    notes.add_listener(recorder.clone());

    let mut note = notes.create_entity(key("n1"));
    notes.add(&mut note, None).unwrap();
    notes.add(&mut note, None).unwrap();

    assert_eq!(recorder.count(), 2);
    assert!(notes.contains_key(&key("n1")).unwrap());
    assert_eq!(capture.lines_with("panicking-renderer").len(), 2);
    assert!(capture.text().contains("renderer crashed on n1"));
}

#[test]
fn removed_listener_stops_receiving() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let recorder = RecordingListener::new("recorder");
    let id = notes.add_listener(recorder.clone());

    let mut note = notes.create_entity(key("n1"));
    notes.add(&mut note, None).unwrap();
    assert!(notes.remove_listener(id));
    assert!(!notes.remove_listener(id));
    notes.remove(&key("n1"), None).unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(notes.listener_count(), 0);
}

/// Subscribes `late` to the bucket from inside its first hook.
struct Recruiter {
    bucket: OnceLock<Weak<Bucket<BucketObject>>>,
    late: Arc<RecordingListener>,
    recruited: Mutex<Option<ListenerId>>,
}

impl Listener<BucketObject> for Recruiter {
    fn on_entity_added(&self, _key: &EntityKey, _entity: &BucketObject) -> ListenerResult {
        let mut recruited = self.recruited.lock().unwrap();
        if recruited.is_none() {
            if let Some(bucket) = self.bucket.get().and_then(Weak::upgrade) {
                *recruited = Some(bucket.add_listener(self.late.clone()));
            }
        }
        Ok(())
    }
}

#[test]
fn subscribing_during_dispatch_affects_later_events_only() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let late = RecordingListener::new("late");
    let recruiter = Arc::new(Recruiter {
        bucket: OnceLock::new(),
        late: late.clone(),
        recruited: Mutex::new(None),
    });
    let _ = recruiter.bucket.set(Arc::downgrade(&notes));
    notes.add_listener(recruiter.clone());

    let mut first = notes.create_entity(key("n1"));
    notes.add(&mut first, None).unwrap();
    assert_eq!(late.count(), 0);
    assert_eq!(notes.listener_count(), 2);

    let mut second = notes.create_entity(key("n2"));
    notes.add(&mut second, None).unwrap();
    assert_eq!(late.events(), vec![Event::Added(key("n2"), Default::default())]);
}

/// Reads the bucket back from inside its hooks.
struct Auditor {
    bucket: OnceLock<Weak<Bucket<BucketObject>>>,
    seen_stored: Mutex<Vec<(EntityKey, bool)>>,
}

impl Listener<BucketObject> for Auditor {
    fn on_entity_added(&self, key: &EntityKey, _entity: &BucketObject) -> ListenerResult {
        let bucket = self
            .bucket
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow::anyhow!("bucket dropped"))?;
        let stored = bucket.contains_key(key)?;
        self.seen_stored.lock().unwrap().push((key.clone(), stored));
        Ok(())
    }

    fn on_entity_removed(&self, key: &EntityKey, _entity: &BucketObject) -> ListenerResult {
        let bucket = self
            .bucket
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow::anyhow!("bucket dropped"))?;
        let stored = bucket.contains_key(key)?;
        self.seen_stored.lock().unwrap().push((key.clone(), stored));
        Ok(())
    }
}

#[test]
fn listeners_observe_committed_state() {
    let (notes, _) = memory_bucket("notes", BucketOptions::default(), LogSink::default());
    let auditor = Arc::new(Auditor {
        bucket: OnceLock::new(),
        seen_stored: Mutex::new(Vec::new()),
    });
    let _ = auditor.bucket.set(Arc::downgrade(&notes));
    notes.add_listener(auditor.clone());

    let mut note = notes.create_entity(key("n1"));
    notes.add(&mut note, None).unwrap();
    notes.remove(&key("n1"), None).unwrap();

    assert_eq!(
        *auditor.seen_stored.lock().unwrap(),
        vec![(key("n1"), true), (key("n1"), false)]
    );
}
