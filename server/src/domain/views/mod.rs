//! View generation pipeline
//!
//! Projects enriched span records into schema-versioned view records and
//! publishes each view to its own output channel.
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  FETCH   │──▶│  DECODE    │──▶│ DISPATCH │──▶│  ROUTE   │──▶│  COMMIT  │
//! │          │   │            │   │          │   │          │   │          │
//! │ partition│   │ JSON →     │   │ one fn   │   │ retry +  │   │ ack      │
//! │ topic    │   │ Enriched   │   │ per view │   │ timeout  │   │ cursor   │
//! └──────────┘   └────────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! | Module      | Role                                                       |
//! |-------------|------------------------------------------------------------|
//! | `record`    | Input record and attribute keys                            |
//! | `view`      | View types, payloads, `ViewRecord`, `GenerationResult`     |
//! | `registry`  | View type → schema (name, version, fields, channel)        |
//! | `generators`| One pure generator per view type                           |
//! | `dispatch`  | Immutable generator table, per-view isolation              |
//! | `router`    | `ViewSink` boundary, per-view publish with retry           |
//! | `sinks`     | Topic and JSON lines file sinks                            |
//! | `source`    | `RecordSource` boundary over the input topic               |
//! | `driver`    | Per-partition fetch → dispatch → route → commit loop       |

pub mod dispatch;
pub mod driver;
pub mod error;
pub mod generators;
pub mod record;
pub mod registry;
pub mod router;
pub mod sinks;
pub mod source;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{DispatchOutcome, DispatchTable};
pub use driver::{DriverState, DriverStats, PipelineDriver};
pub use error::{ConfigurationError, MalformedInputError, PublishError};
pub use record::EnrichedRecord;
pub use registry::{SchemaRegistry, ViewSchema};
pub use router::{RecordRouter, RoutePolicy, RouteReport, ViewRouteOutcome, ViewSink};
pub use sinks::{FileSink, TopicSink};
pub use source::{Delivery, RecordSource, TopicSource};
pub use view::{GenerationResult, ViewRecord, ViewType};
