//! Byte source reader
//!
//! Turns a [`ByteSource`] into a [`ByteBuffer`], reporting progress along
//! the way. [`ReadStream`] is pulled one event at a time; every read ends
//! with exactly one [`ReadEvent::Finished`] and the stream is empty after it.

use crate::buffer::ByteBuffer;
use crate::source::ByteSource;
use tracing::{debug, info, warn};
use ww_core::error::ReadFailure;

/// Default number of bytes requested per read
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// One step of a read
#[derive(Debug)]
pub enum ReadEvent {
    /// Percentage of the announced length received so far
    Progress(u8),
    /// The source did not announce its length; no percentages will follow
    Indeterminate,
    /// Terminal event
    Finished(Result<ByteBuffer, ReadFailure>),
}

enum StreamState {
    Start,
    Reading,
    Finishing(ByteBuffer),
    Done,
}

/// Lazy sequence of read events for one source
pub struct ReadStream<S> {
    source: S,
    chunk_size: usize,
    state: StreamState,
    data: Vec<u8>,
    last_percent: u8,
}

impl<S: ByteSource> ReadStream<S> {
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            state: StreamState::Start,
            data: Vec::new(),
            last_percent: 0,
        }
    }

    /// Name of the underlying source
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Pull the next event, or `None` once the read has finished
    pub async fn next(&mut self) -> Option<ReadEvent> {
        match std::mem::replace(&mut self.state, StreamState::Done) {
            StreamState::Done => None,
            StreamState::Finishing(buffer) => Some(self.finish(Ok(buffer))),
            StreamState::Start => {
                self.state = StreamState::Reading;
                info!("Reading {}", self.source.name());
                match self.source.total_len() {
                    Some(0) => Some(self.finish(Err(ReadFailure::Empty {
                        name: self.source.name().to_string(),
                    }))),
                    Some(_) => Some(ReadEvent::Progress(0)),
                    None => Some(ReadEvent::Indeterminate),
                }
            }
            StreamState::Reading => Some(self.pump().await),
        }
    }

    /// Read chunks until there is something to report
    async fn pump(&mut self) -> ReadEvent {
        let total = self.source.total_len();

        loop {
            let chunk = match self.source.read_chunk(self.chunk_size).await {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Read of {} failed: {}", self.source.name(), e);
                    return self.finish(Err(ReadFailure::Unreadable {
                        name: self.source.name().to_string(),
                        source: e,
                    }));
                }
            };

            let Some(chunk) = chunk else {
                return self.end_of_source(total);
            };

            if self.data.is_empty() {
                self.data = chunk;
            } else {
                self.data.extend_from_slice(&chunk);
            }

            if let Some(total) = total {
                let percent = percent_of(self.data.len() as u64, total);
                if percent > self.last_percent {
                    self.last_percent = percent;
                    self.state = StreamState::Reading;
                    return ReadEvent::Progress(percent);
                }
            }
        }
    }

    fn end_of_source(&mut self, total: Option<u64>) -> ReadEvent {
        let received = self.data.len() as u64;
        let name = self.source.name().to_string();

        if received == 0 {
            return self.finish(Err(ReadFailure::Empty { name }));
        }

        if let Some(expected) = total {
            if received < expected {
                return self.finish(Err(ReadFailure::Truncated {
                    name,
                    expected,
                    actual: received,
                }));
            }
            if received > expected {
                debug!("{} delivered {} bytes, {} announced", name, received, expected);
            }
        }

        let buffer = ByteBuffer::new(std::mem::take(&mut self.data));
        if total.is_some() && self.last_percent < 100 {
            self.last_percent = 100;
            self.state = StreamState::Finishing(buffer);
            return ReadEvent::Progress(100);
        }

        self.finish(Ok(buffer))
    }

    fn finish(&mut self, result: Result<ByteBuffer, ReadFailure>) -> ReadEvent {
        self.state = StreamState::Done;
        self.data = Vec::new();
        if let Ok(buffer) = &result {
            info!("Read {} bytes from {}", buffer.len(), self.source.name());
        }
        ReadEvent::Finished(result)
    }
}

fn percent_of(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (received.saturating_mul(100) / total).min(100) as u8
}

/// Drive a [`ReadStream`] to completion
///
/// `on_progress` gets `Some(percent)` for each progress event and `None`
/// once if the length is unknown.
pub async fn read_to_buffer<S, F>(
    source: S,
    chunk_size: usize,
    mut on_progress: F,
) -> Result<ByteBuffer, ReadFailure>
where
    S: ByteSource,
    F: FnMut(Option<u8>),
{
    let mut stream = ReadStream::with_chunk_size(source, chunk_size);
    let name = stream.name().to_string();
    while let Some(event) = stream.next().await {
        match event {
            ReadEvent::Progress(p) => on_progress(Some(p)),
            ReadEvent::Indeterminate => on_progress(None),
            ReadEvent::Finished(result) => return result,
        }
    }

    Err(ReadFailure::Empty { name })
}
