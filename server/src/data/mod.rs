//! Data layer
//!
//! - `topics` - Partitioned stream topics with consumer groups
//! - `input` - JSON lines replay into the input topic

pub mod input;
pub mod topics;

pub use topics::{TopicError, TopicService};
