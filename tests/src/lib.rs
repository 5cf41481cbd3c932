//! # Hybrid-Chain Test Suite
//!
//! End-to-end flows running the block maker against the consensus core on
//! tokio's paused clock.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # Chain, pool, clock and node setup
//!     └── flows.rs      # Mining, enrollment, delegated and fork production
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hc-tests
//!
//! # With logs
//! RUST_LOG=hc_02_block_maker=debug cargo test -p hc-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;
