//! Session-based statistics sampling runtime.
//!
//! Sources advertise named 64-bit statistics, sinks consume them, and a
//! session binds the two together under a timing policy. Sampling is
//! driven either manually per session or through the thread-wide
//! [`poll`] driver.

mod configuration;
mod data;
mod error;
mod pattern;
mod registry;
mod session;
mod sink;
mod source;
pub mod sinks;

pub use self::{
    configuration::SessionConfig,
    data::{SampleBatch, StatDesc, MAX_FILTER_PATTERNS, MAX_STAT_NAME_LEN},
    error::{AdapterError, AdapterResult, Error},
    registry::poll,
    session::Session,
    sink::{SinkFlags, SinkHandle, SinkOps},
    source::{Source, SourceOps},
};
