//! Distributed executor, client side
//!
//! A client never owns work. `submit` is a no-op; `shutdown` is the run
//! loop: pull an item from the server, run it locally, record it locally and
//! remotely, repeat until the server says there is no more work. Setting
//! the interrupt flag abandons whatever request is waiting on the server.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use super::framing::{read_frame, write_frame};
use super::interrupted;
use super::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::executor::{run_and_record, Executor, ExecutorError, WorkItem};
use crate::models::BacktraceFilter;
use crate::registry::Registry;
use crate::reporter::SharedReporter;

/// Client half of the distributed executor
pub struct ClientExecutor {
    addr: SocketAddr,
    registry: Arc<Registry>,
    filter: BacktraceFilter,
    runtime: Runtime,
    connection: Option<Connection>,
    interrupt: Arc<AtomicBool>,
}

struct Connection {
    stream: TcpStream,
    reporter: SharedReporter,
}

impl ClientExecutor {
    pub fn new(
        addr: SocketAddr,
        registry: Arc<Registry>,
        filter: BacktraceFilter,
    ) -> Result<Self, ExecutorError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            addr,
            registry,
            filter,
            runtime,
            connection: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Give up on the server once `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Send one request and wait for its reply
    fn exchange(
        &self,
        stream: &mut TcpStream,
        request: &ClientMessage,
    ) -> Result<ServerMessage, ExecutorError> {
        self.runtime.block_on(async {
            tokio::select! {
                reply = round_trip(stream, request) => reply,
                _ = interrupted(&self.interrupt) => Err(ExecutorError::Interrupted),
            }
        })
    }

    fn expect_ack(reply: ServerMessage) -> Result<(), ExecutorError> {
        match reply {
            ServerMessage::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }
}

impl Executor for ClientExecutor {
    fn start(&mut self, reporter: SharedReporter) -> Result<(), ExecutorError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let mut stream = self.runtime.block_on(TcpStream::connect(self.addr))?;
        info!("Connected to server at {}", self.addr);

        let hello = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            catalogue_digest: self.registry.catalogue_digest(),
        };
        match self.exchange(&mut stream, &hello)? {
            ServerMessage::Welcome => {}
            ServerMessage::Rejected { reason } => return Err(ExecutorError::Rejected(reason)),
            other => return Err(unexpected("welcome", &other)),
        }

        self.connection = Some(Connection { stream, reporter });
        Ok(())
    }

    fn submit(&mut self, item: WorkItem) -> Result<(), ExecutorError> {
        debug!("Ignoring local submission of {}", item);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ExecutorError> {
        let Some(mut connection) = self.connection.take() else {
            return Err(ExecutorError::NotStarted);
        };

        let mut executed = 0usize;
        loop {
            let item = match self.exchange(&mut connection.stream, &ClientMessage::Dequeue)? {
                ServerMessage::Job { item } => item,
                ServerMessage::NoMoreWork => break,
                other => return Err(unexpected("job", &other)),
            };

            let result = run_and_record(
                &self.registry,
                &item,
                &self.filter,
                connection.reporter.as_ref(),
            );
            executed += 1;

            let reply = self.exchange(&mut connection.stream, &ClientMessage::Record { result })?;
            Self::expect_ack(reply)?;
        }

        let reply = self.exchange(&mut connection.stream, &ClientMessage::Finished)?;
        Self::expect_ack(reply)?;
        info!("Client finished after {} item(s)", executed);
        Ok(())
    }

    fn owns_queue(&self) -> bool {
        false
    }
}

async fn round_trip(
    stream: &mut TcpStream,
    request: &ClientMessage,
) -> Result<ServerMessage, ExecutorError> {
    write_frame(stream, request).await?;
    match read_frame(stream).await? {
        ServerMessage::Error { message } => Err(ExecutorError::Remote(message)),
        reply => Ok(reply),
    }
}

fn unexpected(expected: &str, got: &ServerMessage) -> ExecutorError {
    ExecutorError::UnexpectedReply {
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
}
