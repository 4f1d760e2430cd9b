//! Run-time signal handling
//!
//! While a run is in progress a background thread watches for two things:
//! the status signal, which dumps the current failures to the diagnostic
//! stream when the run is failing, and an interrupt (Ctrl-C), which flags
//! the scheduler to stop dispatching. Distributed executors watch the same
//! flag and stop waiting on the network. Dropping the guard stops the thread.
//!
//! tokio cannot restore a previously installed OS handler, so once the
//! interrupt watcher has run, Ctrl-C no longer kills the process for its
//! remaining lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::output::OutputSink;
use crate::reporter::SharedReporter;

/// Signal that asks a running process for its current results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSignal {
    #[default]
    Usr1,
    Usr2,
    /// SIGINFO, only on the BSDs and macOS
    Info,
}

impl FromStr for StatusSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_start_matches("sig") {
            "usr1" => Ok(StatusSignal::Usr1),
            "usr2" => Ok(StatusSignal::Usr2),
            "info" => Ok(StatusSignal::Info),
            other => Err(format!("unknown status signal: {other}")),
        }
    }
}

impl fmt::Display for StatusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusSignal::Usr1 => "usr1",
            StatusSignal::Usr2 => "usr2",
            StatusSignal::Info => "info",
        };
        write!(f, "{name}")
    }
}

/// What the guard should watch
#[derive(Clone, Debug, Default)]
pub struct SignalConfig {
    pub status_signal: Option<StatusSignal>,
    pub catch_interrupt: bool,
}

/// Guard for the signal watcher of one run
pub struct RunSignals {
    requests: mpsc::UnboundedSender<()>,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RunSignals {
    /// Start watching. `interrupted` is set when an interrupt arrives.
    pub fn install(
        config: &SignalConfig,
        reporter: SharedReporter,
        diagnostics: OutputSink,
        interrupted: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let (requests, mut request_rx) = mpsc::unbounded_channel();
        let (cancel, mut cancel_rx) = oneshot::channel();
        let config = config.clone();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let handle = thread::Builder::new()
            .name("tally-signals".to_string())
            .spawn(move || {
                let dump = || dump_status(&reporter, &diagnostics);

                runtime.block_on(async move {
                    let mut status = config.status_signal.and_then(listen);
                    loop {
                        tokio::select! {
                            _ = &mut cancel_rx => break,
                            Some(()) = request_rx.recv() => dump(),
                            Some(()) = next_status(&mut status) => dump(),
                            Ok(()) = tokio::signal::ctrl_c(), if config.catch_interrupt => {
                                warn!("Interrupt received, no further tests will be dispatched");
                                interrupted.store(true, Ordering::SeqCst);
                            }
                        }
                    }

                    while request_rx.try_recv().is_ok() {
                        dump();
                    }
                });
                debug!("Signal watcher stopped");
            })?;

        Ok(Self {
            requests,
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    /// Ask for a status dump as if the status signal had arrived
    pub fn request_status(&self) {
        let _ = self.requests.send(());
    }
}

impl Drop for RunSignals {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Signal watcher panicked");
            }
        }
    }
}

fn dump_status(reporter: &SharedReporter, diagnostics: &OutputSink) {
    if reporter.passed() {
        return;
    }
    let status = reporter.status().unwrap_or_default();
    diagnostics.write_str(&format!("Current results:\n\n{status}\n"));
    diagnostics.flush();
}

#[cfg(unix)]
type StatusStream = tokio::signal::unix::Signal;

#[cfg(not(unix))]
type StatusStream = ();

#[cfg(unix)]
fn listen(signal: StatusSignal) -> Option<StatusStream> {
    use tokio::signal::unix::{signal as register, SignalKind};

    let kind = match signal {
        StatusSignal::Usr1 => SignalKind::user_defined1(),
        StatusSignal::Usr2 => SignalKind::user_defined2(),
        #[cfg(any(
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd"
        ))]
        StatusSignal::Info => SignalKind::info(),
        #[allow(unreachable_patterns)]
        StatusSignal::Info => {
            warn!("SIGINFO is not available on this platform, status dumps disabled");
            return None;
        }
    };

    match register(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Could not install {} handler: {}", signal, e);
            None
        }
    }
}

#[cfg(not(unix))]
fn listen(signal: StatusSignal) -> Option<StatusStream> {
    warn!("Status signal {} is not supported on this platform", signal);
    None
}

/// Wait for the next status signal, forever if none is installed
async fn next_status(status: &mut Option<StatusStream>) -> Option<()> {
    match status {
        #[cfg(unix)]
        Some(stream) => stream.recv().await,
        _ => std::future::pending().await,
    }
}
