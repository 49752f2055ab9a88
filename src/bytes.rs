use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;

use crate::{RelayboxError, Result};

/// Readable input for a send: files chained in order, or stdin.
pub type DataSource = Box<dyn Read>;

/// Reversible binary-to-text transport encoding.
pub trait Codec {
    fn encode(&self, bytes: &[u8]) -> String;
    fn decode(&self, text: &str) -> Result<Vec<u8>>;
}

/// Standard padded base64. Output never contains a newline, so every
/// encoded frame is exactly one line of relay output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl Codec for Base64Codec {
    fn encode(&self, bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(text.trim())?)
    }
}

/// Read up to `chunk_size` bytes from a data source.
///
/// Short reads from pipes are retried, so the chunk is only shorter than
/// `chunk_size` at the end of the stream. An empty buffer means the stream
/// is exhausted.
pub fn read_chunk<R: Read>(data_source: &mut R, chunk_size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(chunk_size);
    data_source
        .by_ref()
        .take(chunk_size as u64)
        .read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Open every named input up front and chain them into one stream.
///
/// With no inputs, standard input is used. A missing or unreadable file
/// fails here, before anything touches the network.
pub fn open_sources<P: AsRef<Path>>(paths: &[P]) -> Result<DataSource> {
    if paths.is_empty() {
        debug!("Reading from standard input");
        return Ok(Box::new(io::stdin()));
    }

    let mut source: DataSource = Box::new(io::empty());
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            RelayboxError::Io(io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        debug!("Queued input {}", path.display());
        source = Box::new(source.chain(file));
    }
    Ok(source)
}
