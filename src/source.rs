use std::cell::RefCell;
use std::rc::Weak;

use tracing::debug;

use crate::{
    data::{clamp_name, StatDesc, MAX_FILTER_PATTERNS},
    error::{AdapterResult, Error},
    pattern,
    session::SessionInner,
};

/// Capability set a source adapter provides.
///
/// Adapter state (the handle to the underlying device, counters, open
/// files, ...) lives in the implementing type; the runtime passes the
/// numeric `source_id` it was registered under back on every call.
pub trait SourceOps {
    /// Advertise the full table of available stats.
    ///
    /// Called once per source, on the first sampling pass after
    /// registration; the returned table is cached and its length frozen
    /// for the life of the registration.
    fn names(&mut self, source_id: u16) -> AdapterResult<Vec<StatDesc>>;

    /// Fetch current values for the given ids, in order.
    ///
    /// The ids are always ones previously advertised by
    /// [`names`](Self::names). A short or failed return discards this
    /// source's data for the pass.
    fn values(&mut self, source_id: u16, ids: &[u64]) -> AdapterResult<Vec<u64>>;

    /// Reset the selected stats, or all of them when `ids` is `None`.
    ///
    /// Optional; sources with nothing to reset can rely on the default
    /// no-op.
    fn reset(&mut self, source_id: u16, ids: Option<&[u64]>) -> AdapterResult<()> {
        let _ = (source_id, ids);
        Ok(())
    }
}

/// Per-source state owned by a session.
pub(crate) struct SourceRecord {
    pub(crate) name: String,
    pub(crate) source_id: u16,
    pub(crate) ops: Box<dyn SourceOps>,

    // Cached name table, filled lazily on the first successful pass and
    // frozen thereafter. `values` holds the last sampled value per cache
    // position.
    pub(crate) names: Vec<String>,
    pub(crate) ids: Vec<u64>,
    pub(crate) values: Vec<u64>,
    pub(crate) cached: bool,

    pub(crate) patterns: Vec<String>,
    pub(crate) filter_active: bool,

    // Order-preserving projection of the cache through the filter. The
    // three vectors are index-parallel; `filtered_pos` holds cache
    // positions.
    pub(crate) filtered_pos: Vec<usize>,
    pub(crate) filtered_ids: Vec<u64>,
    pub(crate) filtered_names: Vec<String>,

    pub(crate) valid: bool,
}

impl SourceRecord {
    pub(crate) fn new(name: String, source_id: u16, ops: Box<dyn SourceOps>) -> Self {
        SourceRecord {
            name,
            source_id,
            ops,
            names: Vec::new(),
            ids: Vec::new(),
            values: Vec::new(),
            cached: false,
            patterns: Vec::new(),
            filter_active: false,
            filtered_pos: Vec::new(),
            filtered_ids: Vec::new(),
            filtered_names: Vec::new(),
            valid: true,
        }
    }

    /// First-pass name discovery. Returns false (leaving the record
    /// uncached, to be retried next pass) if the adapter fails or
    /// advertises nothing.
    pub(crate) fn populate_cache(&mut self) -> bool {
        let descs = match self.ops.names(self.source_id) {
            Ok(descs) => descs,
            Err(err) => {
                debug!(source = %self.name, error = %err, "stat name discovery failed");
                return false;
            }
        };
        if descs.is_empty() {
            debug!(source = %self.name, "source advertises no stats");
            return false;
        }

        self.names = descs.iter().map(|d| clamp_name(d.name.clone())).collect();
        self.ids = descs.iter().map(|d| d.id).collect();
        self.values = vec![0; descs.len()];
        self.cached = true;
        self.refresh_projection();
        true
    }

    /// Recompute the filtered projection from the cached table. A stat is
    /// included iff any pattern matches its name; with no active filter
    /// the projection is the whole cache.
    pub(crate) fn refresh_projection(&mut self) {
        self.filtered_pos.clear();
        self.filtered_ids.clear();
        self.filtered_names.clear();
        if !self.cached {
            return;
        }

        for (pos, name) in self.names.iter().enumerate() {
            let keep = !self.filter_active
                || self.patterns.iter().any(|p| pattern::matches(p, name));
            if keep {
                self.filtered_pos.push(pos);
                self.filtered_ids.push(self.ids[pos]);
                self.filtered_names.push(name.clone());
            }
        }
    }

    pub(crate) fn stat_count(&self) -> usize {
        if self.filter_active {
            self.filtered_ids.len()
        } else {
            self.ids.len()
        }
    }

    pub(crate) fn stat_name(&self, id: u64) -> Result<String, Error> {
        self.ids
            .iter()
            .position(|&cached| cached == id)
            .map(|pos| self.names[pos].clone())
            .ok_or(Error::NotFound(id))
    }
}

/// Owner-side handle to a registered source.
///
/// The handle holds a weak back-reference to its session; operations on a
/// handle whose session has been freed return [`Error::SessionGone`], and
/// operations after [`unregister`](Self::unregister) return
/// [`Error::Unregistered`].
pub struct Source {
    pub(crate) session: Weak<RefCell<SessionInner>>,
    pub(crate) slot: usize,
}

impl Source {
    fn with_record<T>(
        &self,
        op: impl FnOnce(&mut SourceRecord) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let session = self.session.upgrade().ok_or(Error::SessionGone)?;
        let mut inner = session.borrow_mut();
        let record = &mut inner.sources[self.slot];
        if !record.valid {
            return Err(Error::Unregistered);
        }
        op(record)
    }

    /// Replace the source's filter with copies of the given patterns and
    /// recompute the filtered projection.
    ///
    /// Patterns combine with OR semantics: a stat is sampled iff any
    /// pattern matches its name. An empty list is rejected; lists longer
    /// than [`MAX_FILTER_PATTERNS`] return [`Error::TooManyPatterns`].
    pub fn set_filter<S: AsRef<str>>(&self, patterns: &[S]) -> Result<(), Error> {
        if patterns.is_empty() {
            return Err(Error::InvalidArgument("empty pattern list"));
        }
        if patterns.len() > MAX_FILTER_PATTERNS {
            return Err(Error::TooManyPatterns(patterns.len()));
        }
        self.with_record(|record| {
            record.patterns = patterns.iter().map(|p| p.as_ref().to_owned()).collect();
            record.filter_active = true;
            record.refresh_projection();
            Ok(())
        })
    }

    /// Drop the filter and restore the full projection.
    pub fn clear_filter(&self) -> Result<(), Error> {
        self.with_record(|record| {
            record.patterns.clear();
            record.filter_active = false;
            record.refresh_projection();
            Ok(())
        })
    }

    /// The currently active patterns, empty when no filter is set.
    pub fn filter(&self) -> Result<Vec<String>, Error> {
        self.with_record(|record| Ok(record.patterns.clone()))
    }

    /// Number of stats a sampling pass will deliver for this source:
    /// the filtered count when a filter is active, the full cached count
    /// otherwise (zero until the first successful pass).
    pub fn stat_count(&self) -> Result<usize, Error> {
        self.with_record(|record| Ok(record.stat_count()))
    }

    /// Look up a stat name by id in the cached table.
    ///
    /// Exported so a sink that opted out of per-pass name delivery can
    /// resolve one on demand outside a sampling pass; during a pass use
    /// [`SampleBatch::lookup_name`](crate::SampleBatch::lookup_name).
    pub fn stat_name(&self, id: u64) -> Result<String, Error> {
        self.with_record(|record| record.stat_name(id))
    }

    /// Mark the source unregistered. It is skipped by subsequent sampling
    /// passes; its storage is reclaimed when the session is freed.
    pub fn unregister(self) {
        if let Some(session) = self.session.upgrade() {
            let mut inner = session.borrow_mut();
            inner.sources[self.slot].valid = false;
        }
    }
}
