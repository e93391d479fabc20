//! Streaming view generator
//!
//! Consumes enriched span records from a partitioned input topic, projects
//! each record into schema-versioned views and publishes every view to its
//! own output channel.

pub mod core;
pub mod data;
pub mod domain;
pub mod utils;

mod app;
