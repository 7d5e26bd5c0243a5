use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use quanta::Clock;

use crate::{
    data::SampleBatch,
    error::{AdapterResult, Error},
    session::Session,
    sink::{SinkFlags, SinkHandle, SinkOps},
};

/// One captured batch in the ring.
#[derive(Debug, Clone)]
pub struct RingEntry {
    /// Capture time in raw clock cycles.
    pub timestamp_cycles: u64,
    pub source_name: String,
    pub source_id: u16,
    pub ids: Vec<u64>,
    pub values: Vec<u64>,
}

struct RingInner {
    entries: VecDeque<RingEntry>,
    capacity: usize,
}

/// Bounded in-memory sink keeping the most recent batches.
///
/// Registers with [`SinkFlags::NO_NAMES`]: the ring stores ids and values
/// only, and a consumer that needs a name can resolve it on demand through
/// [`Source::stat_name`](crate::Source::stat_name). When the ring is full
/// the oldest entry is overwritten.
///
/// The paired [`RingBufferReader`] may be handed to another thread; the
/// shared state carries its own lock, which is an adapter concern and not
/// part of the (lock-free) core runtime.
pub struct RingBufferSink {
    shared: Arc<Mutex<RingInner>>,
    clock: Clock,
}

impl RingBufferSink {
    /// Register a ring of at most `capacity` entries on the session,
    /// returning the sink handle and the read side.
    pub fn create(
        session: &Session,
        name: &str,
        capacity: usize,
    ) -> Result<(SinkHandle, RingBufferReader), Error> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("ring capacity is zero"));
        }

        let shared = Arc::new(Mutex::new(RingInner {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }));
        let reader = RingBufferReader {
            shared: Arc::clone(&shared),
        };
        let handle = session.register_sink(
            name,
            RingBufferSink {
                shared,
                clock: Clock::new(),
            },
        )?;
        Ok((handle, reader))
    }
}

impl SinkOps for RingBufferSink {
    fn flags(&self) -> SinkFlags {
        SinkFlags::NO_NAMES
    }

    fn output(&mut self, batch: &SampleBatch<'_>) -> AdapterResult<()> {
        let mut inner = self.shared.lock();
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(RingEntry {
            timestamp_cycles: self.clock.raw(),
            source_name: batch.source_name().to_owned(),
            source_id: batch.source_id(),
            ids: batch.ids().to_vec(),
            values: batch.values().to_vec(),
        });
        Ok(())
    }
}

/// Read side of a [`RingBufferSink`].
#[derive(Clone)]
pub struct RingBufferReader {
    shared: Arc<Mutex<RingInner>>,
}

impl RingBufferReader {
    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out up to `max` entries, oldest first. Entries stay in the
    /// ring.
    pub fn read(&self, max: usize) -> Vec<RingEntry> {
        let inner = self.shared.lock();
        inner.entries.iter().take(max).cloned().collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.shared.lock().entries.clear();
    }
}
