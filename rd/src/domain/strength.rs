//! Result strength classification
//!
//! Main results are totally ordered: `Error < WeakMain < StrongMain`.
//! `Supplementary` answers live beside the main slot and are never compared,
//! and `SynonymUpdate` is a separate fact about identifiers rather than an answer.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Kind of an event delivered by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Error,
    Supplementary,
    WeakMain,
    StrongMain,
    SynonymUpdate,
}

impl EventKind {
    /// Every kind, weakest main first
    pub const ALL: [EventKind; 5] = [
        EventKind::Error,
        EventKind::Supplementary,
        EventKind::WeakMain,
        EventKind::StrongMain,
        EventKind::SynonymUpdate,
    ];

    /// The single-bit mask for this kind
    pub const fn bit(self) -> ResultMask {
        ResultMask(1 << (self as u8))
    }

    /// True for kinds that compete for the main result slot
    pub fn is_main(self) -> bool {
        matches!(self, Self::Error | Self::WeakMain | Self::StrongMain)
    }

    /// True for kinds accepted by the reply updater
    pub fn is_result(self) -> bool {
        self != Self::SynonymUpdate
    }

    /// Strengths that would justify replacing a main result held at `self`
    pub fn stronger_types(self) -> ResultMask {
        match self {
            Self::Error => ResultMask::WEAK_MAIN | ResultMask::STRONG_MAIN,
            Self::WeakMain => ResultMask::STRONG_MAIN,
            Self::StrongMain | Self::Supplementary | Self::SynonymUpdate => ResultMask::EMPTY,
        }
    }

    /// True if a main result of kind `self` replaces one held at `held`
    pub fn beats(self, held: EventKind) -> bool {
        held.stronger_types().contains(self)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Supplementary => write!(f, "supplementary"),
            Self::WeakMain => write!(f, "weak-main"),
            Self::StrongMain => write!(f, "strong-main"),
            Self::SynonymUpdate => write!(f, "synonym-update"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "error" => Ok(Self::Error),
            "supplementary" => Ok(Self::Supplementary),
            "weak-main" | "weak" => Ok(Self::WeakMain),
            "strong-main" | "strong" => Ok(Self::StrongMain),
            "synonym-update" | "synonym" => Ok(Self::SynonymUpdate),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Bitmask over [`EventKind`]s, used for forecasts and wait patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultMask(u8);

impl ResultMask {
    pub const EMPTY: ResultMask = ResultMask(0);
    pub const ERROR: ResultMask = EventKind::Error.bit();
    pub const SUPPLEMENTARY: ResultMask = EventKind::Supplementary.bit();
    pub const WEAK_MAIN: ResultMask = EventKind::WeakMain.bit();
    pub const STRONG_MAIN: ResultMask = EventKind::StrongMain.bit();
    pub const SYNONYM_UPDATE: ResultMask = EventKind::SynonymUpdate.bit();
    /// Conservative forecast for a worker nothing is known about yet
    pub const ANY: ResultMask = ResultMask(0b1_1111);

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit().0 != 0
    }

    pub fn intersects(self, other: ResultMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Copy of this mask with `kind` cleared
    pub fn without(self, kind: EventKind) -> ResultMask {
        ResultMask(self.0 & !kind.bit().0)
    }

    /// True when nothing but a synonym update can still arrive
    pub fn is_settled(self) -> bool {
        self.without(EventKind::SynonymUpdate).is_empty()
    }

    pub fn kinds(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<EventKind> for ResultMask {
    fn from(kind: EventKind) -> Self {
        kind.bit()
    }
}

impl FromIterator<EventKind> for ResultMask {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(ResultMask::EMPTY, |acc, k| acc | k.bit())
    }
}

impl BitOr for ResultMask {
    type Output = ResultMask;

    fn bitor(self, rhs: ResultMask) -> ResultMask {
        ResultMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResultMask {
    fn bitor_assign(&mut self, rhs: ResultMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ResultMask {
    type Output = ResultMask;

    fn bitand(self, rhs: ResultMask) -> ResultMask {
        ResultMask(self.0 & rhs.0)
    }
}

impl fmt::Display for ResultMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        let names: Vec<String> = self.kinds().map(|k| k.to_string()).collect();
        write!(f, "{{{}}}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stronger_types() {
        assert_eq!(
            EventKind::Error.stronger_types(),
            ResultMask::WEAK_MAIN | ResultMask::STRONG_MAIN
        );
        assert_eq!(EventKind::WeakMain.stronger_types(), ResultMask::STRONG_MAIN);
        assert!(EventKind::StrongMain.stronger_types().is_empty());
        assert!(EventKind::Supplementary.stronger_types().is_empty());
    }

    #[test]
    fn test_beats_is_strict() {
        assert!(EventKind::StrongMain.beats(EventKind::WeakMain));
        assert!(EventKind::WeakMain.beats(EventKind::Error));
        assert!(!EventKind::WeakMain.beats(EventKind::WeakMain));
        assert!(!EventKind::Error.beats(EventKind::StrongMain));
        assert!(!EventKind::Supplementary.beats(EventKind::Error));
    }

    #[test]
    fn test_mask_settled() {
        assert!(ResultMask::EMPTY.is_settled());
        assert!(ResultMask::SYNONYM_UPDATE.is_settled());
        assert!(!(ResultMask::SYNONYM_UPDATE | ResultMask::ERROR).is_settled());
        assert!(!ResultMask::ANY.is_settled());
    }

    #[test]
    fn test_mask_without_and_collect() {
        let mask: ResultMask = [EventKind::WeakMain, EventKind::StrongMain].into_iter().collect();
        assert!(mask.contains(EventKind::WeakMain));
        assert!(!mask.contains(EventKind::Error));
        assert_eq!(mask.without(EventKind::WeakMain), ResultMask::STRONG_MAIN);
        assert_eq!(ResultMask::ANY.kinds().count(), 5);
    }

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("strong".parse::<EventKind>().unwrap(), EventKind::StrongMain);
        assert_eq!("Weak_Main".parse::<EventKind>().unwrap(), EventKind::WeakMain);
        assert!("bogus".parse::<EventKind>().is_err());
        assert_eq!(EventKind::SynonymUpdate.to_string(), "synonym-update");
        assert_eq!(
            (ResultMask::ERROR | ResultMask::STRONG_MAIN).to_string(),
            "{error|strong-main}"
        );
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&EventKind::WeakMain).unwrap();
        assert_eq!(json, "\"weak-main\"");
        let kind: EventKind = serde_json::from_str("\"strong-main\"").unwrap();
        assert_eq!(kind, EventKind::StrongMain);
    }
}
