use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};

use crate::bytes::{Base64Codec, Codec};
use crate::config::ReceiveSettings;
use crate::cryptography::{Encryptor, Sha256Hasher};
use crate::keys::Keypair;
use crate::mark::{CheckpointStore, FileCheckpointStore, MarkTracker};
use crate::networking::{Frames, HttpClient, Relay, ReqwestClient};
use crate::{RelayboxError, Result};

/// Outcome of one receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Frames returned by the poll.
    pub frames: usize,
    /// Frames that opened and were written out.
    pub emitted: usize,
    /// Frames that failed to decode or decrypt.
    pub skipped: usize,
    /// The `since` filter the poll used.
    pub since: Option<u64>,
}

/// Opens polled frames and writes their plaintext in arrival order.
///
/// Frames carry no sequence number or message boundary, so the output is
/// the plain concatenation of every frame that opens.
pub struct ChunkReassembler<C, E> {
    codec: C,
    encryptor: E,
    continue_on_error: bool,
}

impl<C: Codec, E: Encryptor> ChunkReassembler<C, E> {
    pub fn new(codec: C, encryptor: E, continue_on_error: bool) -> Self {
        ChunkReassembler {
            codec,
            encryptor,
            continue_on_error,
        }
    }

    /// Inverse of the sender's `encode(encrypt(encode(chunk)))`.
    pub fn open_frame(&self, frame: &str) -> Result<Vec<u8>> {
        let sealed = self.codec.decode(frame)?;
        let encoded = self.encryptor.decrypt(&sealed)?;
        let text = String::from_utf8_lossy(&encoded);
        self.codec.decode(&text)
    }

    /// Frames that fail to open are dropped, or abort the receive in strict
    /// mode. Output write errors always abort.
    pub fn reassemble<I, W>(&self, frames: I, out: &mut W) -> Result<ReceiveReport>
    where
        I: IntoIterator<Item = String>,
        W: Write,
    {
        let mut report = ReceiveReport::default();
        for (index, frame) in frames.into_iter().enumerate() {
            report.frames += 1;
            match self.open_frame(&frame) {
                Ok(chunk) => {
                    debug!("Frame {}: {} bytes", index, chunk.len());
                    out.write_all(&chunk)?;
                    report.emitted += 1;
                }
                Err(e) if self.continue_on_error => {
                    // Shared topics carry frames for other keys; not an error.
                    debug!("Frame {} skipped: {}", index, e);
                    report.skipped += 1;
                }
                Err(e) => {
                    return Err(RelayboxError::FrameFailed {
                        index,
                        source: Box::new(e),
                    })
                }
            }
        }
        out.flush()?;
        Ok(report)
    }
}

/// Poll `topic`, write what opens to `out`, then commit the mark for
/// `keypair_name`.
///
/// A failed poll counts as an empty result. The mark is committed even
/// then, following the hold-the-mark rule in [`crate::mark`].
pub async fn receive_frames<C, E, S, H, W>(
    reassembler: &ChunkReassembler<C, E>,
    tracker: &mut MarkTracker<S>,
    relay: &Relay<H>,
    keypair_name: &str,
    topic: &str,
    settings: ReceiveSettings,
    out: &mut W,
) -> Result<ReceiveReport>
where
    C: Codec,
    E: Encryptor,
    S: CheckpointStore,
    H: HttpClient,
    W: Write,
{
    let since = tracker.poll_since(keypair_name, settings.fetch_all)?;
    let frames = match relay.poll(topic, since).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Poll of {} failed, treating as empty: {}", topic, e);
            Frames::empty()
        }
    };

    let mut report = reassembler.reassemble(frames, out)?;
    report.since = since;
    tracker.commit_checkpoint(keypair_name, settings.fetch_all)?;
    Ok(report)
}

/// Receive for the keypair `name` through `relay`, writing plaintext to
/// `out`.
///
/// The keypair, the checkpoint directory and the stored mark are all
/// checked before the relay is polled.
pub async fn receive_with<H: HttpClient, W: Write>(
    relay: &Relay<H>,
    keys_dir: &Path,
    name: &str,
    settings: ReceiveSettings,
    out: &mut W,
) -> Result<ReceiveReport> {
    let keypair = Keypair::load(keys_dir, name)?;
    let topic = keypair.public_file(keys_dir).topic(&Sha256Hasher);
    let store = FileCheckpointStore::open(keys_dir)?;
    let mut tracker = MarkTracker::new(store);
    debug!("Receiving for {} on topic {}", name, topic);

    let reassembler =
        ChunkReassembler::new(Base64Codec, keypair.opener(), settings.continue_on_error);
    receive_frames(&reassembler, &mut tracker, relay, name, &topic, settings, out).await
}

/// Receive messages for the keypair `name` and write them to stdout.
pub async fn run(
    relay_base: &str,
    keys_dir: &Path,
    name: &str,
    settings: ReceiveSettings,
) -> Result<ReceiveReport> {
    let relay = Relay::new(relay_base, ReqwestClient::new());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let report = receive_with(&relay, keys_dir, name, settings, &mut out).await?;

    info!(
        "Received {} of {} frames ({} skipped)",
        report.emitted, report.frames, report.skipped
    );
    Ok(report)
}
