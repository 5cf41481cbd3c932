//! Ports for the consensus subsystem

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;
