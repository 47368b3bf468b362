//! Two devices exchanging changes over loopback channels.

use std::sync::Arc;

use serde_json::json;
use sync_client::{LoopbackChannels, Session, SessionConfig};
use sync_core::{
    BucketObject, ChangeOp, ChangeVersion, Diffable, LocalChange, MemoryStorage, RemoteChange,
    Version,
};
use sync_types::EntityKey;

use crate::harness::{key, Event, LogCapture, RecordingListener};

fn device() -> Session<LoopbackChannels> {
    Session::with_storage(
        SessionConfig::default(),
        Arc::new(MemoryStorage::new()),
        LoopbackChannels::new(),
    )
}

/// What a relay would send back: the change acknowledged at `version`.
fn acknowledge(change: &LocalChange, version: u64, cv: &str) -> RemoteChange {
    RemoteChange {
        op: change.op,
        key: change.key().clone(),
        version: Version::new(version),
        properties: change.record.properties.clone(),
        change_version: Some(ChangeVersion::from(cv)),
    }
}

#[test]
fn note_travels_from_one_device_to_another() {
    let laptop = device();
    let phone = device();
    let laptop_notes = laptop.default_bucket("notes").unwrap();
    let phone_notes = phone.default_bucket("notes").unwrap();
    laptop.start_all().unwrap();
    phone.start_all().unwrap();

    let phone_view = RecordingListener::new("phone-ui");
    phone_notes.add_listener(phone_view.clone());

    let mut note = laptop_notes.create_local(Some(key("n1"))).unwrap();
    note.set("title", "groceries");
    laptop_notes.add(&mut note, None).unwrap();

    let laptop_channel = laptop.channels().channel::<BucketObject>("notes").unwrap();
    let phone_channel = phone.channels().channel::<BucketObject>("notes").unwrap();
    let outbound = laptop_channel.drain_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].op, ChangeOp::Add);

    let delta = acknowledge(&outbound[0], 1, "cv1");
    phone_channel.apply_remote(&delta).unwrap();
    laptop_channel.apply_remote(&delta).unwrap();

    let on_phone = phone_notes.get(&key("n1")).unwrap().unwrap();
    assert_eq!(on_phone.get("title"), Some(&json!("groceries")));
    assert_eq!(on_phone.version(), Version::new(1));
    assert!(phone_notes.has_change_version_at(&"cv1".into()).unwrap());
    assert!(laptop_notes.has_key_version(&key("n1"), Version::new(1)).unwrap());

    // Applied deltas reach the UI but are not sent back upstream.
    assert_eq!(phone_view.events(), vec![Event::Added(key("n1"), Version::new(1))]);
    assert_eq!(phone_channel.pending(), 0);
    assert_eq!(laptop_channel.pending(), 0);
}

#[test]
fn edits_and_deletes_round_trip() {
    let laptop = device();
    let phone = device();
    let laptop_notes = laptop.default_bucket("notes").unwrap();
    let phone_notes = phone.default_bucket("notes").unwrap();
    laptop.start_all().unwrap();
    phone.start_all().unwrap();
    let laptop_channel = laptop.channels().channel::<BucketObject>("notes").unwrap();
    let phone_channel = phone.channels().channel::<BucketObject>("notes").unwrap();

    let mut note = laptop_notes.create_local(Some(key("n1"))).unwrap();
    laptop_notes.add(&mut note, None).unwrap();
    for change in laptop_channel.drain_outbound() {
        phone_channel.apply_remote(&acknowledge(&change, 1, "cv1")).unwrap();
    }

    let mut on_phone = phone_notes.get(&key("n1")).unwrap().unwrap();
    on_phone.set("done", true);
    phone_notes.update(&mut on_phone, None).unwrap();
    phone_notes.remove(&key("n1"), None).unwrap();

    let outbound = phone_channel.drain_outbound();
    let ops: Vec<ChangeOp> = outbound.iter().map(|change| change.op).collect();
    assert_eq!(ops, vec![ChangeOp::Update, ChangeOp::Remove]);

    laptop_channel
        .apply_remote(&acknowledge(&outbound[0], 2, "cv2"))
        .unwrap();
    assert_eq!(
        laptop_notes.get(&key("n1")).unwrap().unwrap().get("done"),
        Some(&json!(true))
    );
    laptop_channel
        .apply_remote(&acknowledge(&outbound[1], 2, "cv3"))
        .unwrap();
    assert!(!laptop_notes.contains_key(&key("n1")).unwrap());
    assert!(laptop_notes.has_change_version_at(&"cv3".into()).unwrap());
}

#[test]
fn cursor_survives_restart_with_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SessionConfig::default();
    config.storage.path = Some(dir.path().to_path_buf());
    let remote = RemoteChange {
        op: ChangeOp::Add,
        key: EntityKey::new("n9").unwrap(),
        version: Version::new(7),
        properties: Default::default(),
        change_version: Some("cv-42".into()),
    };

    {
        let session = Session::open(config.clone(), LoopbackChannels::new()).unwrap();
        session.default_bucket("notes").unwrap();
        session
            .channels()
            .channel::<BucketObject>("notes")
            .unwrap()
            .apply_remote(&remote)
            .unwrap();
    }

    let session = Session::open(config, LoopbackChannels::new()).unwrap();
    let notes = session.default_bucket("notes").unwrap();
    assert!(notes.has_change_version_at(&"cv-42".into()).unwrap());
    assert!(notes.has_key_version(&key("n9"), Version::new(7)).unwrap());
}

#[test]
fn channel_rejections_reach_the_session_log() {
    let (log, capture) = LogCapture::sink();
    let session = Session::with_storage(
        SessionConfig::default(),
        Arc::new(MemoryStorage::new()),
        LoopbackChannels::new(),
    )
    .with_log_sink(log);
    let notes = session.default_bucket("notes").unwrap();
    session.start_all().unwrap();
    let channel = session.channels().channel::<BucketObject>("notes").unwrap();

    let current = RemoteChange {
        op: ChangeOp::Add,
        key: key("n1"),
        version: Version::new(3),
        properties: Default::default(),
        change_version: Some("cv3".into()),
    };
    channel.apply_remote(&current).unwrap();
    let stale = RemoteChange {
        op: ChangeOp::Update,
        version: Version::new(1),
        change_version: Some("cv4".into()),
        ..current
    };
    assert!(channel.apply_remote(&stale).is_err());

    assert_eq!(notes.key_version(&key("n1")).unwrap(), Some(Version::new(3)));
    let warnings = capture.lines_with("rejected remote change for n1");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("WARN"));
    assert_eq!(capture.lines_with("applied remote").len(), 1);
}

#[test]
fn file_storage_logs_to_the_session_sink() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SessionConfig::default();
    config.storage.path = Some(dir.path().to_path_buf());
    let (log, capture) = LogCapture::sink();

    let session = Session::open_with_log_sink(config, LoopbackChannels::new(), log).unwrap();
    session.default_bucket("notes").unwrap();

    assert_eq!(capture.lines_with("Opening file storage at").len(), 1);
}
