use std::time::Duration;

use log::debug;

use crate::{
    RelayboxError, Result, DEFAULT_CHUNK_SIZE, DEFAULT_DELAY_SECS, MAX_CHUNK_LIMIT,
    MIN_CHUNK_LIMIT, MIN_DELAY_SECS,
};

/// Size and pacing limits applied to every send.
///
/// The encoded frame grows well past the raw chunk (two base64 passes plus
/// the sealed-box header and tag), so `max_chunk` keeps the published body
/// under the relay's per-message limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPolicy {
    pub max_chunk: usize,
    pub min_chunk: usize,
    pub default_chunk: usize,
    pub default_delay: Duration,
    pub min_delay: Duration,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy {
            max_chunk: MAX_CHUNK_LIMIT,
            min_chunk: MIN_CHUNK_LIMIT,
            default_chunk: DEFAULT_CHUNK_SIZE,
            default_delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            min_delay: Duration::from_secs_f64(MIN_DELAY_SECS),
        }
    }
}

impl ChunkPolicy {
    /// Out-of-range sizes fall back to `min_chunk`, not to the nearest bound.
    pub fn clamp_chunk_size(&self, requested: usize) -> usize {
        if requested > self.max_chunk || requested < self.min_chunk {
            debug!(
                "Chunk size {} outside [{}, {}], using {}",
                requested, self.min_chunk, self.max_chunk, self.min_chunk
            );
            self.min_chunk
        } else {
            requested
        }
    }

    /// Negative and NaN delays are raised to `min_delay`. Infinite or
    /// overflowing delays are rejected.
    pub fn clamp_delay(&self, secs: f64) -> Result<Duration> {
        if secs.is_infinite() {
            return Err(RelayboxError::InvalidDelay(secs));
        }
        let floor = self.min_delay.as_secs_f64();
        let secs = if secs.is_nan() { floor } else { secs.max(floor) };
        Duration::try_from_secs_f64(secs).map_err(|_| RelayboxError::InvalidDelay(secs))
    }
}

/// Effective parameters for one send invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendSettings {
    pub chunk_size: usize,
    pub delay: Duration,
    pub continue_on_error: bool,
}

impl SendSettings {
    pub fn resolve(
        policy: &ChunkPolicy,
        chunk_size: Option<usize>,
        delay_secs: Option<f64>,
        continue_on_error: bool,
    ) -> Result<Self> {
        let chunk_size = policy.clamp_chunk_size(chunk_size.unwrap_or(policy.default_chunk));
        let delay = match delay_secs {
            Some(secs) => policy.clamp_delay(secs)?,
            None => policy.default_delay,
        };
        Ok(SendSettings {
            chunk_size,
            delay,
            continue_on_error,
        })
    }
}

impl Default for SendSettings {
    fn default() -> Self {
        let policy = ChunkPolicy::default();
        SendSettings {
            chunk_size: policy.default_chunk,
            delay: policy.default_delay,
            continue_on_error: true,
        }
    }
}

/// Effective parameters for one receive invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// Ignore the checkpoint and fetch all retained history.
    pub fetch_all: bool,
    pub continue_on_error: bool,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        ReceiveSettings {
            fetch_all: false,
            continue_on_error: true,
        }
    }
}
