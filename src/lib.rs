//! rclflow - entity catalog and message-flow records from ROS 2 traces
//!
//! The library consumes an already-decoded, time-ordered sequence of trace
//! events and provides:
//!
//! - an entity catalog (nodes, publishers, subscription and timer callbacks)
//!   with wildcard queries
//! - callback invocation records
//! - inter-process, intra-process and variable-passing communication records,
//!   with optional removal of messages whose journey was only partly observed
//!
//! ```text
//! EventLog ──► EntityCatalog ──► queries
//!     │              │
//!     └──► CallbackTimelineIndex ──► composers ──► records
//!                                       ▲
//!                           CommunicationMatcher
//! ```

pub mod catalog;
pub mod cli;
pub(crate) mod compose;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod matcher;
pub mod records;
pub mod report;
pub mod session;
pub mod timeline;

pub use error::{Result, TraceError};
pub use session::TraceSession;
