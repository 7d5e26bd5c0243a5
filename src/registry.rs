//! Thread-local session registry backing the argument-less polling driver.
//!
//! Sessions are inserted at create and removed at drop. The registry holds
//! weak references only; it never keeps a session alive. Confining the
//! registry to the creating thread is what lets the runtime stay lock-free
//! while still offering a process-style `poll()` entry point.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::session::SessionInner;

thread_local! {
    static REGISTRY: RefCell<Vec<Weak<RefCell<SessionInner>>>> = RefCell::new(Vec::new());
}

pub(crate) fn insert(session: &Rc<RefCell<SessionInner>>) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if registry.try_reserve(1).is_err() {
            // The session still works, it just won't be polled.
            warn!("session registry growth failed; session is invisible to poll()");
            return;
        }
        registry.push(Rc::downgrade(session));
    });
}

pub(crate) fn remove(session: &Rc<RefCell<SessionInner>>) {
    let target = Rc::downgrade(session);
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .retain(|entry| !Weak::ptr_eq(entry, &target));
    });
}

/// Walk this thread's sessions and sample every one whose interval has
/// elapsed. Returns the number of sessions sampled.
///
/// Manual sessions (zero interval) and inactive sessions are skipped; a
/// bounded session whose duration has elapsed is expired here and will not
/// be sampled again.
pub fn poll() -> usize {
    // Upgrade outside the registry borrow so sink/source callbacks that
    // create or free sessions don't hit a reborrow.
    let sessions: Vec<Rc<RefCell<SessionInner>>> = REGISTRY.with(|registry| {
        registry.borrow().iter().filter_map(Weak::upgrade).collect()
    });

    let mut polled = 0;
    for session in sessions {
        let mut inner = session.borrow_mut();
        inner.check_expiry();
        if !inner.active || inner.interval.is_zero() {
            continue;
        }
        if inner.due() {
            inner.sample_pass();
            polled += 1;
        }
    }
    polled
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quanta::Clock;

    use super::poll;
    use crate::data::StatDesc;
    use crate::error::AdapterResult;
    use crate::session::Session;
    use crate::sink::SinkOps;
    use crate::source::SourceOps;
    use crate::SampleBatch;

    struct OneStat;

    impl SourceOps for OneStat {
        fn names(&mut self, _source_id: u16) -> AdapterResult<Vec<StatDesc>> {
            Ok(vec![StatDesc::new(0, "ticks")])
        }

        fn values(&mut self, _source_id: u16, ids: &[u64]) -> AdapterResult<Vec<u64>> {
            Ok(vec![1; ids.len()])
        }
    }

    struct CountCalls(std::rc::Rc<std::cell::Cell<u32>>);

    impl SinkOps for CountCalls {
        fn output(&mut self, _batch: &SampleBatch<'_>) -> AdapterResult<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    fn counted_session(interval_ms: u64) -> (Session, std::sync::Arc<quanta::Mock>, std::rc::Rc<std::cell::Cell<u32>>) {
        let (clock, mock) = Clock::mock();
        let session = Session::builder()
            .interval(Duration::from_millis(interval_ms))
            .clock(clock)
            .build();
        let hits = std::rc::Rc::new(std::cell::Cell::new(0));
        session.register_source("src", 0, OneStat).unwrap();
        session.register_sink("count", CountCalls(hits.clone())).unwrap();
        (session, mock, hits)
    }

    #[test]
    fn test_poll_skips_manual_sessions() {
        let (session, mock, hits) = counted_session(0);
        session.start();
        mock.increment(Duration::from_secs(10));
        poll();
        assert_eq!(hits.get(), 0);
        drop(session);
    }

    #[test]
    fn test_poll_skips_inactive_sessions() {
        let (_session, mock, hits) = counted_session(100);
        mock.increment(Duration::from_secs(10));
        poll();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_poll_respects_the_interval() {
        let (session, mock, hits) = counted_session(100);
        session.start();

        assert_eq!(poll(), 0);
        assert_eq!(hits.get(), 0);

        mock.increment(Duration::from_millis(100));
        assert_eq!(poll(), 1);
        assert_eq!(hits.get(), 1);

        // Interval not yet elapsed again.
        mock.increment(Duration::from_millis(50));
        assert_eq!(poll(), 0);
        assert_eq!(hits.get(), 1);

        mock.increment(Duration::from_millis(50));
        assert_eq!(poll(), 1);
        assert_eq!(hits.get(), 2);
        drop(session);
    }

    #[test]
    fn test_dropped_sessions_leave_the_registry() {
        let (session, mock, hits) = counted_session(100);
        session.start();
        mock.increment(Duration::from_millis(100));
        drop(session);
        poll();
        assert_eq!(hits.get(), 0);
    }
}
