//! Cross-crate flows: consensus core plus block maker.

pub mod fixtures;

mod flows;
