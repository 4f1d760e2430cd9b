//! Messages exchanged between a distributed server and its clients
//!
//! Every client request gets exactly one server reply:
//!
//! | client       | server                    |
//! |--------------|---------------------------|
//! | `Hello`      | `Welcome` or `Rejected`   |
//! | `Dequeue`    | `Job` or `NoMoreWork`     |
//! | `Record`     | `Ack`                     |
//! | `Finished`   | `Ack`                     |

use serde::{Deserialize, Serialize};

use crate::executor::WorkItem;
use crate::models::TestResult;

/// Bumped whenever a message changes shape
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame on every connection
    Hello {
        protocol_version: u32,
        catalogue_digest: u64,
    },
    Dequeue,
    Record { result: TestResult },
    Finished,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome,
    Rejected { reason: String },
    Job { item: WorkItem },
    NoMoreWork,
    Ack,
    Error { message: String },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Dequeue => "dequeue",
            ClientMessage::Record { .. } => "record",
            ClientMessage::Finished => "finished",
        }
    }
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome => "welcome",
            ServerMessage::Rejected { .. } => "rejected",
            ServerMessage::Job { .. } => "job",
            ServerMessage::NoMoreWork => "no_more_work",
            ServerMessage::Ack => "ack",
            ServerMessage::Error { .. } => "error",
        }
    }
}
