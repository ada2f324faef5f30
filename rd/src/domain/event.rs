//! Events delivered by workers and the patterns workers wait on

use serde::{Deserialize, Serialize};

use super::id::{RequestId, WorkerId};
use super::strength::{EventKind, ResultMask};

/// A single occurrence reported by a worker for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(rename = "request-id")]
    pub request_id: RequestId,
    #[serde(rename = "worker-id")]
    pub worker_id: WorkerId,
}

impl Event {
    pub fn new(kind: EventKind, request_id: RequestId, worker_id: WorkerId) -> Self {
        Self {
            kind,
            request_id,
            worker_id,
        }
    }
}

/// What a worker parked in a rendezvous is waiting to observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPattern {
    pub request_id: RequestId,
    pub kinds: ResultMask,
}

impl EventPattern {
    pub fn new(request_id: RequestId, kinds: impl Into<ResultMask>) -> Self {
        Self {
            request_id,
            kinds: kinds.into(),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.request_id == self.request_id && self.kinds.contains(event.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_request_and_kind() {
        let pattern = EventPattern::new(RequestId::new(1), ResultMask::STRONG_MAIN | ResultMask::WEAK_MAIN);

        assert!(pattern.matches(&Event::new(EventKind::WeakMain, RequestId::new(1), WorkerId::new(2))));
        assert!(!pattern.matches(&Event::new(EventKind::Error, RequestId::new(1), WorkerId::new(2))));
        assert!(!pattern.matches(&Event::new(EventKind::StrongMain, RequestId::new(0), WorkerId::new(2))));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventKind::StrongMain, RequestId::new(4), WorkerId::new(1));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("request-id"));
        assert!(json.contains("strong-main"));
    }
}
