//! Integration tests for the capture controller against the simulated backend
//!
//! Run with: cargo test --test controller

mod lifecycle;
mod stills;
mod support;
mod video;
