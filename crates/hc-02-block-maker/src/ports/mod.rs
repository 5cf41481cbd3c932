//! Ports layer - hexagonal architecture interfaces

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;
