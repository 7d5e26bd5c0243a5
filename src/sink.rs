use std::cell::RefCell;
use std::ops::BitOr;
use std::rc::Weak;

use crate::{
    data::SampleBatch,
    error::{AdapterResult, Error},
    session::SessionInner,
};

/// Behavior flags a sink declares at registration.
///
/// Flags are captured when the sink is registered; changing what
/// [`SinkOps::flags`] returns afterwards has no effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkFlags(u32);

impl SinkFlags {
    /// The sink does not want the names array each pass; the runtime
    /// passes `None` instead. Saves copying potentially hundreds of
    /// 128-byte names on every sample for high-frequency sessions.
    pub const NO_NAMES: SinkFlags = SinkFlags(1 << 0);

    pub const fn empty() -> Self {
        SinkFlags(0)
    }

    pub fn contains(self, other: SinkFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SinkFlags {
    type Output = SinkFlags;

    fn bitor(self, rhs: SinkFlags) -> SinkFlags {
        SinkFlags(self.0 | rhs.0)
    }
}

/// Capability set a sink consumer provides.
pub trait SinkOps {
    /// Flags sampled once at registration.
    fn flags(&self) -> SinkFlags {
        SinkFlags::empty()
    }

    /// Consume one source's batch of sampled values.
    ///
    /// Invoked once per valid source per sampling pass, in source
    /// registration order. An error is logged and absorbed; it never
    /// prevents other sinks from receiving the same batch.
    fn output(&mut self, batch: &SampleBatch<'_>) -> AdapterResult<()>;
}

/// Per-sink state owned by a session.
pub(crate) struct SinkRecord {
    pub(crate) name: String,
    pub(crate) ops: Box<dyn SinkOps>,
    pub(crate) flags: SinkFlags,
    pub(crate) valid: bool,
}

impl SinkRecord {
    pub(crate) fn new(name: String, ops: Box<dyn SinkOps>) -> Self {
        let flags = ops.flags();
        SinkRecord {
            name,
            ops,
            flags,
            valid: true,
        }
    }
}

/// Owner-side handle to a registered sink.
pub struct SinkHandle {
    pub(crate) session: Weak<RefCell<SessionInner>>,
    pub(crate) slot: usize,
}

impl SinkHandle {
    /// Display name the sink was registered under.
    pub fn name(&self) -> Result<String, Error> {
        let session = self.session.upgrade().ok_or(Error::SessionGone)?;
        let inner = session.borrow();
        let record = &inner.sinks[self.slot];
        if !record.valid {
            return Err(Error::Unregistered);
        }
        Ok(record.name.clone())
    }

    /// Mark the sink unregistered. It is skipped by subsequent sampling
    /// passes; there is no final drain notification. Storage is reclaimed
    /// when the session is freed.
    pub fn unregister(self) {
        if let Some(session) = self.session.upgrade() {
            let mut inner = session.borrow_mut();
            inner.sinks[self.slot].valid = false;
        }
    }
}
