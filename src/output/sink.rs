//! Shared output destination for reporters
//!
//! Several reporters write to the same stream. The sink serialises their
//! writes and can switch between buffered output and "sync" mode, where
//! every write is flushed immediately for live progress.

use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

struct SinkState {
    writer: Box<dyn Write + Send>,
    sync: bool,
}

/// Cloneable handle to a locked writer
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<SinkState>>,
}

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                writer: Box::new(writer),
                sync: false,
            })),
        }
    }

    /// Buffered standard output
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Sink writing into memory, plus a handle to read what was written
    pub fn memory() -> (Self, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_str(&self, text: &str) {
        let mut state = self.lock();
        let mut outcome = state.writer.write_all(text.as_bytes());
        if outcome.is_ok() && state.sync {
            outcome = state.writer.flush();
        }
        if let Err(e) = outcome {
            warn!("Failed to write report output: {}", e);
        }
    }

    pub fn write_line(&self, line: &str) {
        self.write_str(&format!("{line}\n"));
    }

    pub fn flush(&self) {
        if let Err(e) = self.lock().writer.flush() {
            warn!("Failed to flush report output: {}", e);
        }
    }

    pub fn is_sync(&self) -> bool {
        self.lock().sync
    }

    /// Switch sync mode, returning the previous setting
    pub fn set_sync(&self, sync: bool) -> bool {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.sync, sync)
        };
        if sync {
            self.flush();
        }
        previous
    }
}

/// In-memory writer whose contents can be read back
#[derive(Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
