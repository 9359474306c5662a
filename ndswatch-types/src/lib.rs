//! # ndswatch-types
//!
//! Core types shared by the ndswatch crates: the decoded `ndsctl json` status
//! document and the metric points/batches written to the time-series store.
//!
//! ## Example
//!
//! ```rust
//! use ndswatch_types::{MetricBatch, StatusSnapshot, Tags};
//!
//! let raw = br#"{"client_list_length":"1","clients":{"1":{"id":1,"state":"Authenticated","downloaded":10,"uploaded":20}}}"#;
//! let snapshot = StatusSnapshot::parse(raw).unwrap();
//! assert_eq!(snapshot.state_counts(), (1, 0));
//!
//! let batch = MetricBatch::builder("nds")
//!     .point("Authenticated", Tags::new(), 1)
//!     .build();
//! assert_eq!(batch.len(), 1);
//! ```

mod decimal;
mod metrics;
mod status;

pub use decimal::*;
pub use metrics::*;
pub use status::*;
