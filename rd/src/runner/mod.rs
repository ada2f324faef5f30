//! Packet runner - drives one packet from registration to the last reply

mod manager;

pub use manager::{PacketOutcome, PacketRunner, RunnerStats};
