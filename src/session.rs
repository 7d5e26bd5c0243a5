use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quanta::Clock;
use tracing::debug;

use crate::{
    configuration::SessionConfig,
    data::{clamp_name, SampleBatch},
    error::Error,
    registry,
    sink::{SinkFlags, SinkHandle, SinkOps, SinkRecord},
    source::{Source, SourceOps, SourceRecord},
};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_session_name() -> String {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("session_{}", seq)
}

pub(crate) struct SessionInner {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) duration: Duration,
    pub(crate) clock: Clock,

    pub(crate) start_cycles: u64,
    pub(crate) last_sample_cycles: u64,
    pub(crate) active: bool,

    pub(crate) sources: Vec<SourceRecord>,
    pub(crate) sinks: Vec<SinkRecord>,
}

impl SessionInner {
    /// Clear `active` once a bounded session's duration has elapsed.
    /// Checked lazily, on `is_active` queries and by the polling driver.
    pub(crate) fn check_expiry(&mut self) {
        if self.active && !self.duration.is_zero() {
            let elapsed = self.clock.delta(self.start_cycles, self.clock.raw());
            if elapsed >= self.duration {
                debug!(session = %self.name, "session duration elapsed");
                self.active = false;
            }
        }
    }

    /// Whether the interval since the last sample has elapsed. The
    /// interval is a lower bound: a late poll fires immediately, and
    /// missed windows are dropped rather than caught up.
    pub(crate) fn due(&self) -> bool {
        let elapsed = self.clock.delta(self.last_sample_cycles, self.clock.raw());
        elapsed >= self.interval
    }

    /// One sampling pass: per source, lazily cache the name table, fetch
    /// the filtered values, and fan the batch out to every sink. Adapter
    /// failures are absorbed so one bad source or sink never starves the
    /// rest.
    pub(crate) fn sample_pass(&mut self) {
        let SessionInner { sources, sinks, .. } = self;

        for record in sources.iter_mut().filter(|r| r.valid) {
            if !record.cached && !record.populate_cache() {
                continue;
            }
            if record.filtered_ids.is_empty() {
                continue;
            }

            let fetched = match record.ops.values(record.source_id, &record.filtered_ids) {
                Ok(values) => values,
                Err(err) => {
                    debug!(source = %record.name, error = %err, "value fetch failed");
                    continue;
                }
            };
            if fetched.len() != record.filtered_ids.len() {
                debug!(
                    source = %record.name,
                    expected = record.filtered_ids.len(),
                    got = fetched.len(),
                    "value fetch returned short"
                );
                continue;
            }

            for (slot, &pos) in record.filtered_pos.iter().enumerate() {
                record.values[pos] = fetched[slot];
            }

            for sink in sinks.iter_mut().filter(|s| s.valid) {
                let names = if sink.flags.contains(SinkFlags::NO_NAMES) {
                    None
                } else {
                    Some(record.filtered_names.as_slice())
                };
                let batch = SampleBatch::new(
                    &record.name,
                    record.source_id,
                    names,
                    &record.filtered_ids,
                    &fetched,
                    &record.names,
                    &record.ids,
                );
                if let Err(err) = sink.ops.output(&batch) {
                    debug!(
                        sink = %sink.name,
                        source = %record.name,
                        error = %err,
                        "sink output failed"
                    );
                }
            }
        }

        // Unconditional, even when individual sources failed.
        self.last_sample_cycles = self.clock.raw();
    }
}

/// A timing and composition context binding sources to sinks.
///
/// Sessions are created through [`SessionConfig`], start inactive, and are
/// driven either manually with [`sample`](Self::sample) or by the
/// process-wide [`poll`](crate::poll) driver once started. Dropping the
/// session stops it and releases every registered source and sink.
///
/// A session is confined to the thread that created it; the registry the
/// polling driver walks is thread-local.
pub struct Session {
    inner: Rc<RefCell<SessionInner>>,
}

impl Session {
    /// Configuration builder with manual-only interval, infinite duration
    /// and an auto-generated name.
    pub fn builder() -> SessionConfig {
        SessionConfig::new()
    }

    pub(crate) fn from_config(config: SessionConfig) -> Session {
        let name = clamp_name(config.name.unwrap_or_else(next_session_name));
        let clock = config.clock.unwrap_or_else(Clock::new);
        let now = clock.raw();

        let inner = Rc::new(RefCell::new(SessionInner {
            name,
            interval: config.interval,
            duration: config.duration,
            clock,
            start_cycles: now,
            last_sample_cycles: now,
            active: false,
            sources: Vec::new(),
            sinks: Vec::new(),
        }));
        registry::insert(&inner);

        Session { inner }
    }

    /// Display name of the session.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Activate the session and reset its clock. Starting an already
    /// active session is allowed and restarts the duration window.
    pub fn start(&self) {
        let mut inner = self.inner.borrow_mut();
        let now = inner.clock.raw();
        inner.start_cycles = now;
        inner.last_sample_cycles = now;
        inner.active = true;
    }

    /// Deactivate the session. Idempotent.
    pub fn stop(&self) {
        self.inner.borrow_mut().active = false;
    }

    /// Whether the session is currently active. A bounded session whose
    /// duration has elapsed is expired here as a side effect.
    pub fn is_active(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.check_expiry();
        inner.active
    }

    /// Run one sampling pass over every registered source.
    ///
    /// Adapter callbacks must not call back into this session's API; the
    /// session is borrowed for the whole pass.
    pub fn sample(&self) -> Result<(), Error> {
        self.inner.borrow_mut().sample_pass();
        Ok(())
    }

    /// Register a source adapter under the given display name and
    /// numeric id. No adapter I/O happens here; name discovery is
    /// deferred to the first sampling pass.
    pub fn register_source(
        &self,
        name: &str,
        source_id: u16,
        ops: impl SourceOps + 'static,
    ) -> Result<Source, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("source name is empty"));
        }
        let mut inner = self.inner.borrow_mut();
        let slot = inner.sources.len();
        inner.sources.push(SourceRecord::new(
            clamp_name(name.to_owned()),
            source_id,
            Box::new(ops),
        ));
        Ok(Source {
            session: Rc::downgrade(&self.inner),
            slot,
        })
    }

    /// Register a sink consumer under the given display name. The sink's
    /// flags are captured now.
    pub fn register_sink(
        &self,
        name: &str,
        ops: impl SinkOps + 'static,
    ) -> Result<SinkHandle, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("sink name is empty"));
        }
        let mut inner = self.inner.borrow_mut();
        let slot = inner.sinks.len();
        inner
            .sinks
            .push(SinkRecord::new(clamp_name(name.to_owned()), Box::new(ops)));
        Ok(SinkHandle {
            session: Rc::downgrade(&self.inner),
            slot,
        })
    }

    /// Snapshot of the cached stat names for one source, or concatenated
    /// over all valid sources when `source` is `None`.
    pub fn stat_names(&self, source: Option<&Source>) -> Result<Vec<String>, Error> {
        let inner = self.inner.borrow();
        match source {
            Some(source) => {
                let slot = self.resolve_slot(&inner, source)?;
                Ok(inner.sources[slot].names.clone())
            }
            None => Ok(inner
                .sources
                .iter()
                .filter(|r| r.valid)
                .flat_map(|r| r.names.iter().cloned())
                .collect()),
        }
    }

    /// Read values from the cache, i.e. the last sampling pass.
    ///
    /// With `ids = None` the cached buffer is returned in cache order;
    /// explicit ids are resolved against the cached table and an unknown
    /// id is [`Error::NotFound`]. Explicit ids require a specific source,
    /// since ids are only unique per source.
    pub fn stat_values(
        &self,
        source: Option<&Source>,
        ids: Option<&[u64]>,
    ) -> Result<Vec<u64>, Error> {
        let inner = self.inner.borrow();
        match source {
            Some(source) => {
                let slot = self.resolve_slot(&inner, source)?;
                record_values(&inner.sources[slot], ids)
            }
            None => {
                if ids.is_some() {
                    return Err(Error::InvalidArgument(
                        "explicit ids require a specific source",
                    ));
                }
                Ok(inner
                    .sources
                    .iter()
                    .filter(|r| r.valid)
                    .flat_map(|r| r.values.iter().copied())
                    .collect())
            }
        }
    }

    /// Propagate a reset to the adapter(s) and zero the affected cached
    /// values on success. For the all-sources form one failing source
    /// does not abort the others; the first error is reported after the
    /// walk.
    pub fn reset_stats(
        &self,
        source: Option<&Source>,
        ids: Option<&[u64]>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        match source {
            Some(source) => {
                let slot = self.resolve_slot(&inner, source)?;
                reset_record(&mut inner.sources[slot], ids)
            }
            None => {
                let mut first_err = None;
                for record in inner.sources.iter_mut().filter(|r| r.valid) {
                    if let Err(err) = reset_record(record, ids) {
                        debug!(source = %record.name, error = %err, "reset failed");
                        first_err.get_or_insert(err);
                    }
                }
                match first_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }

    fn resolve_slot(&self, inner: &SessionInner, source: &Source) -> Result<usize, Error> {
        let owner = source.session.upgrade().ok_or(Error::SessionGone)?;
        if !Rc::ptr_eq(&owner, &self.inner) {
            return Err(Error::InvalidArgument(
                "source belongs to a different session",
            ));
        }
        if !inner.sources[source.slot].valid {
            return Err(Error::Unregistered);
        }
        Ok(source.slot)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.borrow_mut().active = false;
        registry::remove(&self.inner);
    }
}

fn record_values(record: &SourceRecord, ids: Option<&[u64]>) -> Result<Vec<u64>, Error> {
    match ids {
        None => Ok(record.values.clone()),
        Some(ids) => ids
            .iter()
            .map(|&id| {
                record
                    .ids
                    .iter()
                    .position(|&cached| cached == id)
                    .map(|pos| record.values[pos])
                    .ok_or(Error::NotFound(id))
            })
            .collect(),
    }
}

fn reset_record(record: &mut SourceRecord, ids: Option<&[u64]>) -> Result<(), Error> {
    record
        .ops
        .reset(record.source_id, ids)
        .map_err(|err| Error::Adapter(err.to_string()))?;

    match ids {
        None => record.values.iter_mut().for_each(|v| *v = 0),
        Some(ids) => {
            for &id in ids {
                if let Some(pos) = record.ids.iter().position(|&cached| cached == id) {
                    record.values[pos] = 0;
                }
            }
        }
    }
    Ok(())
}
