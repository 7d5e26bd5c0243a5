//! Bundled sink adapters.
//!
//! These are ordinary [`SinkOps`](crate::SinkOps) implementations built on
//! the public registration API; nothing here is special-cased by the
//! runtime.

mod file;
mod ring;

pub use self::{
    file::{FileFormat, FileSink, FileSinkConfig},
    ring::{RingBufferReader, RingBufferSink, RingEntry},
};
