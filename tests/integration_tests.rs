// Integration tests for relaybox
// These tests drive the send and receive pipelines end to end against the
// in-memory relay, with real keys, real sealing and on-disk marks.

use indicatif::ProgressBar;
use relaybox::{
    bytes::Base64Codec,
    commands::receive::{receive_frames, receive_with, ChunkReassembler, ReceiveReport},
    commands::send::{send_with, ChunkSplitter},
    config::{ChunkPolicy, ReceiveSettings, SendSettings},
    cryptography::{topic_id, SealedBox, Sha256Hasher},
    keys::{public_key_path, Keypair, PublicKeyFile},
    mark::{CheckpointStore, FileCheckpointStore, MarkTracker},
    networking::Relay,
    testing::MemoryRelay,
    RelayboxError, MIN_CHUNK_LIMIT,
};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

const RELAY: &str = "https://relay.test";

fn setup_keypair(dir: &Path, name: &str) -> (Keypair, String) {
    let keypair = Keypair::generate(name);
    keypair.save(dir).unwrap();
    let topic = PublicKeyFile::resolve(dir, name).unwrap().topic(&Sha256Hasher);
    (keypair, topic)
}

fn send_settings(chunk_size: usize, delay: f64) -> SendSettings {
    SendSettings::resolve(&ChunkPolicy::default(), Some(chunk_size), Some(delay), true).unwrap()
}

fn splitter_for(
    dir: &Path,
    recipient: &str,
    chunk_size: usize,
) -> ChunkSplitter<Base64Codec, SealedBox> {
    let settings = send_settings(chunk_size, 0.0);
    let public = PublicKeyFile::resolve(dir, recipient).unwrap();
    ChunkSplitter::new(settings, Base64Codec, public.sealer())
}

fn clock_one() -> u64 {
    1_000
}

fn clock_two() -> u64 {
    2_000
}

fn tracker_at(dir: &Path, clock: fn() -> u64) -> MarkTracker<FileCheckpointStore> {
    MarkTracker::with_clock(FileCheckpointStore::open(dir).unwrap(), clock)
}

async fn receive_alice(
    reassembler: &ChunkReassembler<Base64Codec, SealedBox>,
    tracker: &mut MarkTracker<FileCheckpointStore>,
    relay: &Relay<&MemoryRelay>,
    topic: &str,
    settings: ReceiveSettings,
) -> (ReceiveReport, Vec<u8>) {
    let mut out: Vec<u8> = Vec::new();
    let report = receive_frames(reassembler, tracker, relay, "alice", topic, settings, &mut out)
        .await
        .unwrap();
    (report, out)
}

// ============================================================================
// End-to-End Send/Receive Tests
// ============================================================================

#[tokio::test]
async fn test_hello_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (keypair, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    // Send "hello" with chunk size 50: one chunk, one publish
    let report = splitter_for(dir.path(), "alice", 50)
        .send(&mut Cursor::new(b"hello".to_vec()), &topic, &relay)
        .await
        .unwrap();
    assert_eq!(report.chunks, 1);
    assert_eq!(memory.attempts(), 1);
    assert_eq!(memory.posts()[0].url, format!("{}/{}", RELAY, topic));

    // Receive with no mark: full-history poll, exactly "hello" out
    let store = FileCheckpointStore::open(dir.path()).unwrap();
    let mut tracker = MarkTracker::with_clock(store, clock_one);
    let reassembler = ChunkReassembler::new(Base64Codec, keypair.opener(), true);
    let mut out: Vec<u8> = Vec::new();
    let received = receive_frames(
        &reassembler,
        &mut tracker,
        &relay,
        "alice",
        &topic,
        ReceiveSettings::default(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(out, b"hello");
    assert_eq!(received.since, None);
    assert_eq!(memory.polls()[0].since(), None);
    assert_eq!(tracker.load_checkpoint("alice").unwrap(), Some(clock_one()));
}

#[tokio::test]
async fn test_thousand_bytes_in_eight_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let (keypair, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let input: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let report = splitter_for(dir.path(), "alice", 140)
        .send(&mut Cursor::new(input.clone()), &topic, &relay)
        .await
        .unwrap();
    assert_eq!(report.chunks, 8);
    assert_eq!(memory.posts().len(), 8);

    let reassembler = ChunkReassembler::new(Base64Codec, keypair.opener(), true);
    let sizes: Vec<usize> = memory
        .posts()
        .iter()
        .map(|post| reassembler.open_frame(&post.body).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![140, 140, 140, 140, 140, 140, 140, 20]);

    let mut out: Vec<u8> = Vec::new();
    let frames = memory.posts().into_iter().map(|post| post.body);
    reassembler.reassemble(frames, &mut out).unwrap();
    assert_eq!(out, input);
}

#[tokio::test(start_paused = true)]
async fn test_paced_send_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let (keypair, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let public = PublicKeyFile::resolve(dir.path(), "alice").unwrap();
    let splitter = ChunkSplitter::new(send_settings(140, 1.0), Base64Codec, public.sealer());

    let input = vec![b'x'; 1000];
    let start = tokio::time::Instant::now();
    splitter.send(&mut Cursor::new(input.clone()), &topic, &relay).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(7));

    let reassembler = ChunkReassembler::new(Base64Codec, keypair.opener(), true);
    let mut out: Vec<u8> = Vec::new();
    reassembler
        .reassemble(memory.posts().into_iter().map(|p| p.body), &mut out)
        .unwrap();
    assert_eq!(out, input);
}

#[tokio::test]
async fn test_out_of_range_chunk_size_uses_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let (_, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let splitter = splitter_for(dir.path(), "alice", 5000);
    assert_eq!(splitter.settings().chunk_size, MIN_CHUNK_LIMIT);

    let report = splitter
        .send(&mut Cursor::new(vec![0u8; 120]), &topic, &relay)
        .await
        .unwrap();
    assert_eq!(report.chunks, 3);
}

// ============================================================================
// Shared Topic Noise Tests
// ============================================================================

#[tokio::test]
async fn test_frames_for_other_recipients_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, alice_topic) = setup_keypair(dir.path(), "alice");
    let (_bob, _) = setup_keypair(dir.path(), "bob");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    // Noise first: a frame sealed to bob lands on alice's topic
    splitter_for(dir.path(), "bob", 50)
        .send(&mut Cursor::new(b"for bob".to_vec()), &alice_topic, &relay)
        .await
        .unwrap();
    memory.inject(&format!("{}/{}", RELAY, alice_topic), "garbage");
    splitter_for(dir.path(), "alice", 50)
        .send(&mut Cursor::new(b"for alice".to_vec()), &alice_topic, &relay)
        .await
        .unwrap();

    let mut tracker = MarkTracker::new(FileCheckpointStore::open(dir.path()).unwrap());
    let reassembler = ChunkReassembler::new(Base64Codec, alice.opener(), true);
    let mut out: Vec<u8> = Vec::new();
    let report = receive_frames(
        &reassembler,
        &mut tracker,
        &relay,
        "alice",
        &alice_topic,
        ReceiveSettings::default(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(out, b"for alice");
    assert_eq!(report.frames, 3);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn test_unrelated_topic_is_not_polled() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, alice_topic) = setup_keypair(dir.path(), "alice");
    let (_, bob_topic) = setup_keypair(dir.path(), "bob");
    assert_ne!(alice_topic, bob_topic);

    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);
    splitter_for(dir.path(), "bob", 50)
        .send(&mut Cursor::new(b"for bob".to_vec()), &bob_topic, &relay)
        .await
        .unwrap();

    let mut tracker = MarkTracker::new(FileCheckpointStore::open(dir.path()).unwrap());
    let reassembler = ChunkReassembler::new(Base64Codec, alice.opener(), true);
    let mut out: Vec<u8> = Vec::new();
    let report = receive_frames(
        &reassembler,
        &mut tracker,
        &relay,
        "alice",
        &alice_topic,
        ReceiveSettings::default(),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(report.frames, 0);
    assert!(out.is_empty());
}

// ============================================================================
// Mark Tests
// ============================================================================

#[tokio::test]
async fn test_repeated_receive_holds_mark_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);
    let reassembler = ChunkReassembler::new(Base64Codec, alice.opener(), true);

    // First-ever receive sets the mark to the clock
    let mut first = tracker_at(dir.path(), clock_one);
    receive_alice(&reassembler, &mut first, &relay, &topic, ReceiveSettings::default()).await;
    let mark_path = FileCheckpointStore::open(dir.path()).unwrap().path_for("alice");
    let written = fs::read(&mark_path).unwrap();

    // Two later receives with a later clock leave the mark untouched
    for _ in 0..2 {
        let mut tracker = tracker_at(dir.path(), clock_two);
        let (report, _) =
            receive_alice(&reassembler, &mut tracker, &relay, &topic, ReceiveSettings::default())
                .await;
        assert_eq!(report.since, Some(clock_one()));
    }
    assert_eq!(fs::read(&mark_path).unwrap(), written);
    let store = FileCheckpointStore::open(dir.path()).unwrap();
    assert_eq!(store.get("alice").unwrap().map(|c| c.since), Some(clock_one()));
}

#[tokio::test]
async fn test_fetch_all_refetches_history_and_advances_mark() {
    let dir = tempfile::tempdir().unwrap();
    let (alice, topic) = setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    memory.set_time(500);
    splitter_for(dir.path(), "alice", 50)
        .send(&mut Cursor::new(b"old news".to_vec()), &topic, &relay)
        .await
        .unwrap();

    let reassembler = ChunkReassembler::new(Base64Codec, alice.opener(), true);
    let mut tracker = tracker_at(dir.path(), clock_one);
    receive_alice(&reassembler, &mut tracker, &relay, &topic, ReceiveSettings::default()).await;

    // Incremental receive no longer sees the old frame
    let (_, out) =
        receive_alice(&reassembler, &mut tracker, &relay, &topic, ReceiveSettings::default()).await;
    assert!(out.is_empty());

    // Fetch-all does, and moves the mark to now
    let mut tracker = tracker_at(dir.path(), clock_two);
    let settings = ReceiveSettings {
        fetch_all: true,
        continue_on_error: true,
    };
    let (report, out) = receive_alice(&reassembler, &mut tracker, &relay, &topic, settings).await;
    assert_eq!(out, b"old news");
    assert_eq!(report.since, None);
    assert_eq!(tracker.load_checkpoint("alice").unwrap(), Some(clock_two()));
}

// ============================================================================
// Configuration Error Tests
// ============================================================================

#[tokio::test]
async fn test_send_and_receive_from_keys_dir() {
    let dir = tempfile::tempdir().unwrap();
    setup_keypair(dir.path(), "alice");
    let input = dir.path().join("message.txt");
    fs::write(&input, b"from a file").unwrap();
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let sent = send_with(
        &relay,
        dir.path(),
        "alice",
        &[&input],
        send_settings(50, 0.0),
        ProgressBar::hidden(),
    )
    .await
    .unwrap();
    assert_eq!(sent.published, 1);

    let mut out: Vec<u8> = Vec::new();
    let received = receive_with(&relay, dir.path(), "alice", ReceiveSettings::default(), &mut out)
        .await
        .unwrap();
    assert_eq!(received.emitted, 1);
    assert_eq!(out, b"from a file");
}

#[tokio::test]
async fn test_corrupt_mark_fails_before_poll() {
    let dir = tempfile::tempdir().unwrap();
    setup_keypair(dir.path(), "alice");
    let mark_path = FileCheckpointStore::open(dir.path()).unwrap().path_for("alice");
    fs::write(&mark_path, b"not a mark").unwrap();
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    for fetch_all in [false, true] {
        let settings = ReceiveSettings {
            fetch_all,
            continue_on_error: true,
        };
        let mut out: Vec<u8> = Vec::new();
        let result = receive_with(&relay, dir.path(), "alice", settings, &mut out).await;
        assert!(
            matches!(result, Err(RelayboxError::Checkpoint(_))),
            "fetch_all {}",
            fetch_all
        );
        assert!(out.is_empty());
    }
    assert!(memory.polls().is_empty());
    assert_eq!(fs::read(&mark_path).unwrap(), b"not a mark");
}

#[tokio::test]
async fn test_missing_keypair_fails_before_poll() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let mut out: Vec<u8> = Vec::new();
    let result =
        receive_with(&relay, dir.path(), "nobody", ReceiveSettings::default(), &mut out).await;
    assert!(matches!(result, Err(RelayboxError::KeyFile { .. })));
    assert!(memory.polls().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unwritable_keys_dir_fails_before_poll() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    setup_keypair(dir.path(), "alice");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
    let writable = fs::write(dir.path().join("check"), b"").is_ok();
    let _ = fs::remove_file(dir.path().join("check"));
    let mut out: Vec<u8> = Vec::new();
    let result =
        receive_with(&relay, dir.path(), "alice", ReceiveSettings::default(), &mut out).await;
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

    // Root can write regardless of mode bits; then the receive goes ahead.
    if writable {
        assert!(result.is_ok());
        assert_eq!(memory.polls().len(), 1);
    } else {
        assert!(matches!(result, Err(RelayboxError::Checkpoint(_))));
        assert!(memory.polls().is_empty());
    }
}

#[tokio::test]
async fn test_missing_input_file_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    setup_keypair(dir.path(), "alice");
    let present = dir.path().join("present.txt");
    fs::write(&present, b"data").unwrap();
    let missing = dir.path().join("missing.txt");
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let result = send_with(
        &relay,
        dir.path(),
        "alice",
        &[&present, &missing],
        send_settings(50, 0.0),
        ProgressBar::hidden(),
    )
    .await;
    assert!(matches!(result, Err(RelayboxError::Io(_))));
    assert_eq!(memory.attempts(), 0);
}

#[tokio::test]
async fn test_unknown_recipient_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("message.txt");
    fs::write(&input, b"data").unwrap();
    let memory = MemoryRelay::new();
    let relay = Relay::new(RELAY, &memory);

    let result = send_with(
        &relay,
        dir.path(),
        "nobody",
        &[&input],
        send_settings(50, 0.0),
        ProgressBar::hidden(),
    )
    .await;
    assert!(matches!(result, Err(RelayboxError::KeyFile { .. })));
    assert_eq!(memory.attempts(), 0);
}

// ============================================================================
// Topic and Key Tests
// ============================================================================

#[test]
fn test_topic_is_hash_of_public_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, topic) = setup_keypair(dir.path(), "alice");
    let bytes = fs::read(public_key_path(dir.path(), "alice")).unwrap();
    assert_eq!(topic, topic_id(&Sha256Hasher, &bytes));

    // Same bytes, fresh load, same topic
    let again = PublicKeyFile::load(&public_key_path(dir.path(), "alice")).unwrap();
    assert_eq!(again.topic(&Sha256Hasher), topic);
}

#[test]
fn test_receiver_derives_same_topic_as_sender() {
    let dir = tempfile::tempdir().unwrap();
    let (_, sender_topic) = setup_keypair(dir.path(), "alice");
    let loaded = Keypair::load(dir.path(), "alice").unwrap();
    assert_eq!(loaded.public_file(dir.path()).topic(&Sha256Hasher), sender_topic);
}
