use std::io::Read;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::bytes::{open_sources, read_chunk, Base64Codec, Codec};
use crate::config::SendSettings;
use crate::cryptography::{Encryptor, Sha256Hasher};
use crate::keys::PublicKeyFile;
use crate::networking::{HttpClient, Relay, ReqwestClient};
use crate::{RelayboxError, Result};

/// Outcome of one send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Chunks read from the input.
    pub chunks: usize,
    /// Chunks accepted by the relay.
    pub published: usize,
    /// Chunks whose encryption or publish failed and were skipped.
    pub failed: usize,
    /// Plaintext bytes read.
    pub bytes: usize,
}

/// Splits a stream into chunks and publishes one sealed frame per chunk.
///
/// Each chunk is encoded, encrypted and encoded again before publishing:
/// `frame = encode(encrypt(encode(chunk)))`. Publishes are strictly
/// sequential in stream order, with `settings.delay` between consecutive
/// chunks.
pub struct ChunkSplitter<C, E> {
    settings: SendSettings,
    codec: C,
    encryptor: E,
    progress: ProgressBar,
}

impl<C: Codec, E: Encryptor> ChunkSplitter<C, E> {
    pub fn new(settings: SendSettings, codec: C, encryptor: E) -> Self {
        ChunkSplitter {
            settings,
            codec,
            encryptor,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &SendSettings {
        &self.settings
    }

    /// Build the relay frame for one chunk.
    pub fn seal_chunk(&self, chunk: &[u8]) -> Result<String> {
        let encoded = self.codec.encode(chunk);
        let sealed = self.encryptor.encrypt(encoded.as_bytes())?;
        Ok(self.codec.encode(&sealed))
    }

    async fn send_chunk<H: HttpClient>(
        &self,
        chunk: &[u8],
        topic: &str,
        relay: &Relay<H>,
    ) -> Result<()> {
        let frame = self.seal_chunk(chunk)?;
        relay.publish(topic, frame).await
    }

    /// Send everything readable from `source` to `topic`.
    ///
    /// A read error on the source always aborts. A failed chunk is skipped
    /// when `continue_on_error` is set and aborts the send otherwise.
    pub async fn send<R: Read, H: HttpClient>(
        &self,
        source: &mut R,
        topic: &str,
        relay: &Relay<H>,
    ) -> Result<SendReport> {
        let mut report = SendReport::default();
        let mut chunk = read_chunk(source, self.settings.chunk_size)?;

        while !chunk.is_empty() {
            let index = report.chunks;
            report.chunks += 1;
            report.bytes += chunk.len();
            debug!("Read chunk {}: {} bytes", index, chunk.len());

            match self.send_chunk(&chunk, topic, relay).await {
                Ok(()) => {
                    report.published += 1;
                    self.progress.set_message(format!("Sent chunk {}", index + 1));
                    self.progress.inc(1);
                }
                Err(e) if self.settings.continue_on_error => {
                    warn!("Chunk {} not delivered, continuing: {}", index, e);
                    report.failed += 1;
                }
                Err(e) => {
                    return Err(RelayboxError::ChunkFailed {
                        index,
                        source: Box::new(e),
                    })
                }
            }

            chunk = read_chunk(source, self.settings.chunk_size)?;
            if !chunk.is_empty() && self.settings.delay > Duration::ZERO {
                tokio::time::sleep(self.settings.delay).await;
            }
        }

        debug!("Finished reading all chunks, total chunks: {}", report.chunks);
        Ok(report)
    }
}

/// Send the named files (or stdin) to `recipient` through `relay`.
///
/// The recipient key and every input file are resolved before any network
/// activity.
pub async fn send_with<P: AsRef<Path>, H: HttpClient>(
    relay: &Relay<H>,
    keys_dir: &Path,
    recipient: &str,
    inputs: &[P],
    settings: SendSettings,
    progress: ProgressBar,
) -> Result<SendReport> {
    let public = PublicKeyFile::resolve(keys_dir, recipient)?;
    let topic = public.topic(&Sha256Hasher);
    let mut source = open_sources(inputs)?;
    debug!(
        "Sending to topic {} with chunk size {} and delay {:?}",
        topic, settings.chunk_size, settings.delay
    );

    let splitter =
        ChunkSplitter::new(settings, Base64Codec, public.sealer()).with_progress(progress);
    splitter.send(&mut source, &topic, relay).await
}

/// Send the named files (or stdin) to `recipient` over HTTP.
pub async fn run<P: AsRef<Path>>(
    relay_base: &str,
    keys_dir: &Path,
    recipient: &str,
    inputs: &[P],
    settings: SendSettings,
) -> Result<SendReport> {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        spinner.set_style(style);
    }

    let relay = Relay::new(relay_base, ReqwestClient::new());
    let result = send_with(&relay, keys_dir, recipient, inputs, settings, spinner.clone()).await;
    spinner.finish_and_clear();
    let report = result?;

    info!(
        "Sent {} bytes in {} chunks ({} published, {} failed)",
        report.bytes, report.chunks, report.published, report.failed
    );
    Ok(report)
}
