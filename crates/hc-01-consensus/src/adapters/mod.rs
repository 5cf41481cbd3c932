//! Adapters for the consensus subsystem

mod memory_container;

pub use memory_container::InMemoryBlockContainer;
