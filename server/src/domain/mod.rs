//! Domain logic for span view generation
//!
//! - `views` - Enriched span → view record pipeline

pub mod views;
