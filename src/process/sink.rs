//! Output sinks and concurrent fan-out

use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use super::error::FanOutError;

/// Destination for a stream of output chunks.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()>;

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Collects everything written to it. Clones share the same buffer, so a
/// caller can read what has arrived so far while a command is still running.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

#[async_trait]
impl OutputSink for BufferSink {
    async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        self.buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(chunk);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdStream {
    Stdout,
    Stderr,
}

/// The current process's stdout or stderr.
#[derive(Debug, Clone, Copy)]
pub struct StdStreamSink {
    stream: StdStream,
}

impl StdStreamSink {
    pub fn stdout() -> Self {
        Self {
            stream: StdStream::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: StdStream::Stderr,
        }
    }
}

#[async_trait]
impl OutputSink for StdStreamSink {
    async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        match self.stream {
            StdStream::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(chunk).await?;
                out.flush().await
            }
            StdStream::Stderr => {
                let mut err = tokio::io::stderr();
                err.write_all(chunk).await?;
                err.flush().await
            }
        }
    }
}

/// Duplicates every write to all of its sinks. Writes run concurrently and
/// are all joined, so a failing or slow sink never prevents the others from
/// receiving the chunk.
#[derive(Clone)]
pub struct FanOut {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn write(&self, chunk: &[u8]) -> Result<(), FanOutError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.write_chunk(chunk))).await;
        self.collect(results)
    }

    pub async fn close(&self) -> Result<(), FanOutError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.close())).await;
        self.collect(results)
    }

    fn collect(&self, results: Vec<io::Result<()>>) -> Result<(), FanOutError> {
        let failures: Vec<io::Error> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanOutError {
                total: self.sinks.len(),
                failures,
            })
        }
    }
}
