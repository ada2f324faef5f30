//! Final replies released to the packet owner

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{RequestId, WorkerId};
use super::strength::EventKind;

/// One result as delivered by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivered {
    pub kind: EventKind,
    #[serde(rename = "worker-id")]
    pub worker_id: WorkerId,
    pub strategy: String,
    pub payload: Value,
}

/// The main part of a final reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum MainReply {
    /// The strongest main result any worker delivered
    Delivered(Delivered),

    /// Nothing usable arrived; lists the strategies that were tried
    NoReply { tried: Vec<String> },
}

/// Exactly one of these is released per submitted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "request-id")]
    pub request_id: RequestId,
    pub identifier: String,
    pub main: MainReply,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplementary: Vec<Delivered>,
    /// Identifier aliases learned while answering, present only after a synonym update
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl Reply {
    /// Strength of the final answer; a synthesized no-reply counts as an error
    pub fn strength(&self) -> EventKind {
        match &self.main {
            MainReply::Delivered(d) => d.kind,
            MainReply::NoReply { .. } => EventKind::Error,
        }
    }

    pub fn is_no_reply(&self) -> bool {
        matches!(self.main, MainReply::NoReply { .. })
    }
}
