//! Major events the packet owner is woken for

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// How an expired owner wait is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutMode {
    /// Running strategies become ready for another try; in-flight workers continue
    Soft,
    /// Everything is canceled and every open request is answered now
    Hard,
}

/// Bitmask of owner-facing events returned by `wait_for_major_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MajorEvents(u8);

impl MajorEvents {
    pub const NONE: MajorEvents = MajorEvents(0);
    pub const REPLY_AVAILABLE: MajorEvents = MajorEvents(1);
    pub const WORKER_READY: MajorEvents = MajorEvents(1 << 1);
    pub const FULLY_REPLIED: MajorEvents = MajorEvents(1 << 2);
    pub const TIMEOUT: MajorEvents = MajorEvents(1 << 3);

    pub fn contains(self, other: MajorEvents) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MajorEvents {
    type Output = MajorEvents;

    fn bitor(self, rhs: MajorEvents) -> MajorEvents {
        MajorEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for MajorEvents {
    fn bitor_assign(&mut self, rhs: MajorEvents) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MajorEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::REPLY_AVAILABLE, "reply-available"),
            (Self::WORKER_READY, "worker-ready"),
            (Self::FULLY_REPLIED, "fully-replied"),
            (Self::TIMEOUT, "timeout"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        write!(f, "[{}]", names.join(","))
    }
}
