//! Distributed executor, server side
//!
//! Holds the authoritative work queue. Each connected client runs a session
//! task that serves `Dequeue` from the shared queue and feeds `Record`
//! results into the server's reporter. `shutdown` pushes one "no more work"
//! marker per expected client and waits until that many clients finished.
//!
//! Work held by a client that disconnects goes back to the queue for the
//! remaining clients. Whatever no client was left to run is recorded as an
//! error when the server shuts down.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::framing::{read_frame, write_frame, FrameError};
use super::interrupted;
use super::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::executor::{Executor, ExecutorError, WorkItem};
use crate::models::{Failure, TestResult};
use crate::registry::Registry;
use crate::reporter::SharedReporter;

/// `None` is the poison pill: one per client
type QueueEntry = Option<WorkItem>;

/// State shared by every client session
struct Shared {
    jobs: Mutex<mpsc::UnboundedReceiver<QueueEntry>>,
    queue: mpsc::UnboundedSender<QueueEntry>,
    /// Items returned by disconnected clients, served before the queue
    returned: StdMutex<VecDeque<WorkItem>>,
    reporter: SharedReporter,
    record_lock: StdMutex<()>,
    finished: mpsc::UnboundedSender<SocketAddr>,
    digest: u64,
}

impl Shared {
    /// Hand a finished result to the server's reporter
    fn record_remote(&self, result: &TestResult) {
        let _guard = self.record_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reporter.prerecord(result.suite(), result.method());
        self.reporter.record(result);
    }

    fn give_back(&self, item: WorkItem) {
        self.returned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    fn take_returned(&self) -> Option<WorkItem> {
        self.returned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    async fn dequeue(&self) -> QueueEntry {
        let mut jobs = self.jobs.lock().await;
        if let Some(item) = self.take_returned() {
            return Some(item);
        }
        match jobs.recv().await.flatten() {
            Some(item) => Some(item),
            None => {
                let item = self.take_returned()?;
                // the marker stays in the queue for this client's next request
                let _ = self.queue.send(None);
                Some(item)
            }
        }
    }

    /// Items still waiting once every client is gone
    fn drain_unrun(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self
            .returned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if let Ok(mut jobs) = self.jobs.try_lock() {
            while let Ok(entry) = jobs.try_recv() {
                items.extend(entry);
            }
        }
        items
    }
}

/// Server half of the distributed executor
pub struct ServerExecutor {
    runtime: Runtime,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    client_count: usize,
    digest: u64,
    queue: mpsc::UnboundedSender<QueueEntry>,
    jobs: Option<mpsc::UnboundedReceiver<QueueEntry>>,
    acceptor: Option<JoinHandle<()>>,
    waiter: Option<JoinHandle<usize>>,
    shared: Option<Arc<Shared>>,
    interrupt: Arc<AtomicBool>,
}

impl ServerExecutor {
    /// Bind the listening socket. Clients may connect as soon as this
    /// returns, but are only served once the executor is started.
    pub fn bind(
        addr: SocketAddr,
        client_count: usize,
        registry: &Registry,
    ) -> Result<Self, ExecutorError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tally-server")
            .enable_all()
            .build()?;

        let listener = runtime.block_on(TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;
        info!(
            "Server listening on {} for {} client(s)",
            local_addr, client_count
        );

        let (queue, jobs) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            local_addr,
            listener: Some(listener),
            client_count,
            digest: registry.catalogue_digest(),
            queue,
            jobs: Some(jobs),
            acceptor: None,
            waiter: None,
            shared: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stop waiting for clients once `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.client_count
    }
}

impl Executor for ServerExecutor {
    fn start(&mut self, reporter: SharedReporter) -> Result<(), ExecutorError> {
        let (listener, jobs) = match (self.listener.take(), self.jobs.take()) {
            (Some(listener), Some(jobs)) => (listener, jobs),
            _ => return Ok(()),
        };

        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            jobs: Mutex::new(jobs),
            queue: self.queue.clone(),
            returned: StdMutex::new(VecDeque::new()),
            reporter,
            record_lock: StdMutex::new(()),
            finished: finished_tx,
            digest: self.digest,
        });

        self.acceptor = Some(self.runtime.spawn(accept_loop(listener, Arc::clone(&shared))));
        self.shared = Some(shared);

        let expected = self.client_count;
        self.waiter = Some(self.runtime.spawn(async move {
            let mut done = 0;
            while done < expected {
                match finished_rx.recv().await {
                    Some(peer) => {
                        done += 1;
                        info!("Client {} finished ({}/{})", peer, done, expected);
                    }
                    None => break,
                }
            }
            done
        }));

        Ok(())
    }

    fn submit(&mut self, item: WorkItem) -> Result<(), ExecutorError> {
        debug!("Enqueueing {}", item);
        self.queue
            .send(Some(item))
            .map_err(|_| ExecutorError::QueueClosed)
    }

    fn shutdown(&mut self) -> Result<(), ExecutorError> {
        let Some(waiter) = self.waiter.take() else {
            return Ok(());
        };

        for _ in 0..self.client_count {
            self.queue.send(None).map_err(|_| ExecutorError::QueueClosed)?;
        }

        info!("Waiting for {} client(s) to finish", self.client_count);
        let interrupt = Arc::clone(&self.interrupt);
        let done = self
            .runtime
            .block_on(async move {
                tokio::select! {
                    done = waiter => done.map(Some),
                    _ = interrupted(&interrupt) => Ok(None),
                }
            })
            .map_err(|e| ExecutorError::Remote(format!("completion waiter failed: {e}")))?;

        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }

        let Some(done) = done else {
            warn!("Interrupted while waiting for clients");
            return Err(ExecutorError::Interrupted);
        };

        if let Some(shared) = &self.shared {
            for item in shared.drain_unrun() {
                warn!("No client left to run {}", item);
                let message = format!("no connected client was left to run {item}");
                shared.record_remote(&unrun_result(&item, "ClientDisconnected", message));
            }
        }

        if done < self.client_count {
            return Err(ExecutorError::Remote(format!(
                "only {done} of {} client(s) finished",
                self.client_count
            )));
        }
        Ok(())
    }
}

impl Drop for ServerExecutor {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Client connected from {}", peer);
                tokio::spawn(serve_client(stream, peer, Arc::clone(&shared)));
            }
            Err(e) => {
                error!("Failed to accept client connection: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Per-connection bookkeeping
struct Session {
    peer: SocketAddr,
    joined: bool,
    finished: bool,
    in_flight: Option<WorkItem>,
}

async fn serve_client(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let mut session = Session {
        peer,
        joined: false,
        finished: false,
        in_flight: None,
    };

    match session.run(&mut stream, &shared).await {
        Ok(()) | Err(FrameError::EndOfStream) => {}
        Err(e) => warn!("Session with {} ended: {}", peer, e),
    }

    if let Some(item) = session.in_flight.take() {
        warn!(
            "Client {} disconnected while running {}, returning it to the queue",
            peer, item
        );
        shared.give_back(item);
    }

    if session.joined && !session.finished {
        warn!(
            "Client {} disconnected before finishing, counting it as finished",
            peer
        );
        let _ = shared.finished.send(peer);
    }
}

impl Session {
    async fn run(&mut self, stream: &mut TcpStream, shared: &Shared) -> Result<(), FrameError> {
        match read_frame(stream).await? {
            ClientMessage::Hello {
                protocol_version,
                catalogue_digest,
            } => {
                if let Some(reason) = handshake_problem(protocol_version, catalogue_digest, shared)
                {
                    warn!("Rejecting client {}: {}", self.peer, reason);
                    write_frame(stream, &ServerMessage::Rejected { reason }).await?;
                    return Ok(());
                }
            }
            other => {
                let message = format!("expected hello, got {}", other.kind());
                write_frame(stream, &ServerMessage::Error { message }).await?;
                return Ok(());
            }
        }

        self.joined = true;
        write_frame(stream, &ServerMessage::Welcome).await?;
        info!("Client {} joined", self.peer);

        loop {
            let request: ClientMessage = read_frame(stream).await?;
            let reply = match request {
                ClientMessage::Dequeue => {
                    if let Some(stale) = self.in_flight.take() {
                        warn!("Client {} dequeued without recording {}", self.peer, stale);
                        let message = format!("{} asked for work before recording it", self.peer);
                        shared.record_remote(&unrun_result(&stale, "ResultMissing", message));
                    }
                    let entry = tokio::select! {
                        entry = shared.dequeue() => entry,
                        gone = peer_gone(stream) => return Err(gone),
                    };
                    match entry {
                        Some(item) => {
                            self.in_flight = Some(item.clone());
                            ServerMessage::Job { item }
                        }
                        None => ServerMessage::NoMoreWork,
                    }
                }
                ClientMessage::Record { result } => {
                    if self
                        .in_flight
                        .as_ref()
                        .is_some_and(|i| i.suite == result.suite() && i.method == result.method())
                    {
                        self.in_flight = None;
                    }
                    shared.record_remote(&result);
                    ServerMessage::Ack
                }
                ClientMessage::Finished => {
                    self.finished = true;
                    let _ = shared.finished.send(self.peer);
                    write_frame(stream, &ServerMessage::Ack).await?;
                    return Ok(());
                }
                ClientMessage::Hello { .. } => ServerMessage::Error {
                    message: "duplicate hello".to_string(),
                },
            };
            write_frame(stream, &reply).await?;
        }
    }
}

fn handshake_problem(version: u32, digest: u64, shared: &Shared) -> Option<String> {
    if version != PROTOCOL_VERSION {
        return Some(format!(
            "protocol version {version} is not supported (server speaks {PROTOCOL_VERSION})"
        ));
    }
    if digest != shared.digest {
        return Some(format!(
            "registry mismatch: client catalogue {digest:016x}, server catalogue {:016x}",
            shared.digest
        ));
    }
    None
}

/// Resolves when a client that should be waiting for a reply closes the
/// connection or sends something anyway
async fn peer_gone(stream: &TcpStream) -> FrameError {
    let mut byte = [0u8; 1];
    match stream.peek(&mut byte).await {
        Ok(0) => FrameError::EndOfStream,
        Ok(_) => FrameError::InvalidFrame("request sent while waiting for work".to_string()),
        Err(e) => FrameError::Io(e),
    }
}

/// Result recorded for an item that never produced one
fn unrun_result(item: &WorkItem, error_type: &str, message: String) -> TestResult {
    let failure = Failure::UnexpectedError {
        error_type: error_type.to_string(),
        message,
        backtrace: vec!["No backtrace".to_string()],
    };
    TestResult::new(
        &item.suite,
        &item.method,
        0,
        Duration::ZERO,
        vec![failure],
        None,
    )
}
