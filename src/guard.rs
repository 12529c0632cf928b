//! Exactly-once settlement of an exchange.
//!
//! Three triggers race to end an exchange: end of response, connection
//! inactive and error. The first one to move the guard from `Open` to
//! `Closing` settles the [`Completion`] and closes the transport. Every
//! later trigger is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::transport::Closer;
use crate::Error;

/// Lifecycle of a [`CompletionGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl GuardState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => GuardState::Open,
            1 => GuardState::Closing,
            _ => GuardState::Closed,
        }
    }
}

// The slots below hold plain values, so a panic while holding the lock
// cannot leave them half-updated.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    slot: Mutex<Option<Result<(), Error>>>,
    cond: Condvar,
}

/// Settling side of a single-assignment result cell.
#[derive(Clone)]
pub struct Completion(Arc<Inner>);

/// Waiting side. There is exactly one and it is consumed by waiting.
pub struct CompletionWaiter(Arc<Inner>);

/// Create a connected [`Completion`] and [`CompletionWaiter`].
pub fn completion() -> (Completion, CompletionWaiter) {
    let inner = Arc::new(Inner {
        slot: Mutex::new(None),
        cond: Condvar::new(),
    });
    (Completion(inner.clone()), CompletionWaiter(inner))
}

impl Completion {
    /// Set the outcome. Returns `false` if it was already set, in which case
    /// `outcome` is dropped.
    pub fn settle(&self, outcome: Result<(), Error>) -> bool {
        let mut slot = lock(&self.0.slot);

        if slot.is_some() {
            return false;
        }

        *slot = Some(outcome);
        self.0.cond.notify_all();

        true
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.0.slot).is_some()
    }
}

impl CompletionWaiter {
    /// Block until the outcome is set and take it.
    pub fn wait(self) -> Result<(), Error> {
        let mut slot = lock(&self.0.slot);

        loop {
            if let Some(outcome) = slot.take() {
                // Keep the slot occupied so late settles are still rejected.
                *slot = Some(Ok(()));
                return outcome;
            }
            slot = self.0.cond.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Routes the terminal triggers of an exchange into one settlement and one
/// transport close.
pub struct CompletionGuard {
    state: AtomicU8,
    closer: Mutex<Option<Box<dyn Closer>>>,
    completion: Completion,
}

impl CompletionGuard {
    pub fn new() -> (Self, CompletionWaiter) {
        let (completion, waiter) = completion();

        let guard = CompletionGuard {
            state: AtomicU8::new(GuardState::Open as u8),
            closer: Mutex::new(None),
            completion,
        };

        (guard, waiter)
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Hand over the closer for the connection.
    ///
    /// If the guard already left `Open`, the connection is closed right away.
    pub fn attach(&self, closer: Box<dyn Closer>) {
        let mut slot = lock(&self.closer);

        if self.state() == GuardState::Open {
            *slot = Some(closer);
            return;
        }

        drop(slot);

        debug!("Closer attached after settlement, closing");
        close(closer.as_ref());
    }

    /// The response was read to its end.
    pub fn on_end(&self) -> bool {
        self.trigger("end", Ok(()))
    }

    /// The connection went away.
    ///
    /// Before end of response this is a failure. After settlement it is
    /// usually the echo of our own close and ignored.
    pub fn on_inactive(&self) -> bool {
        self.trigger("inactive", Err(Error::UnexpectedDisconnect))
    }

    pub fn on_error(&self, error: Error) -> bool {
        self.trigger("error", Err(error))
    }

    fn trigger(&self, name: &str, outcome: Result<(), Error>) -> bool {
        let won = self
            .state
            .compare_exchange(
                GuardState::Open as u8,
                GuardState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !won {
            debug!("Ignore {} trigger in state {:?}", name, self.state());
            return false;
        }

        debug!("Settle on {} trigger", name);

        self.completion.settle(outcome);

        let closer = lock(&self.closer).take();
        if let Some(closer) = closer {
            close(closer.as_ref());
        }

        self.state.store(GuardState::Closed as u8, Ordering::Release);

        true
    }
}

fn close(closer: &dyn Closer) {
    if let Err(e) = closer.close() {
        warn!("Close of connection failed: {}", e);
    }
}

impl fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("state", &self.state())
            .field("settled", &self.completion.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    #[derive(Clone, Default)]
    struct CountingCloser(Arc<AtomicUsize>);

    impl CountingCloser {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Closer for CountingCloser {
        fn close(&self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn guard_with_closer() -> (CompletionGuard, CompletionWaiter, CountingCloser) {
        let (guard, waiter) = CompletionGuard::new();
        let closer = CountingCloser::default();
        guard.attach(Box::new(closer.clone()));
        (guard, waiter, closer)
    }

    #[test]
    fn end_settles_success() {
        let (guard, waiter, closer) = guard_with_closer();

        assert_eq!(guard.state(), GuardState::Open);
        assert!(guard.on_end());
        assert_eq!(guard.state(), GuardState::Closed);
        assert_eq!(closer.count(), 1);

        assert!(waiter.wait().is_ok());
    }

    #[test]
    fn inactive_after_end_keeps_success() {
        let (guard, waiter, closer) = guard_with_closer();

        assert!(guard.on_end());
        assert!(!guard.on_inactive());
        assert!(!guard.on_error(Error::UnexpectedDisconnect));

        assert_eq!(closer.count(), 1);
        assert!(waiter.wait().is_ok());
    }

    #[test]
    fn inactive_before_end_is_failure() {
        let (guard, waiter, closer) = guard_with_closer();

        assert!(guard.on_inactive());
        assert!(!guard.on_end());

        assert_eq!(closer.count(), 1);
        assert!(matches!(waiter.wait(), Err(Error::UnexpectedDisconnect)));
    }

    #[test]
    fn error_is_carried() {
        let (guard, waiter, _closer) = guard_with_closer();

        guard.on_error(Error::TlsHandshake("bad cert".into()));

        match waiter.wait() {
            Err(Error::TlsHandshake(m)) => assert_eq!(m, "bad cert"),
            r => panic!("unexpected: {:?}", r),
        }
    }

    #[test]
    fn attach_after_settle_closes_once() {
        let (guard, waiter) = CompletionGuard::new();
        guard.on_error(Error::UnexpectedDisconnect);

        let closer = CountingCloser::default();
        guard.attach(Box::new(closer.clone()));

        assert_eq!(closer.count(), 1);
        assert!(waiter.wait().is_err());
    }

    #[test]
    fn settle_without_closer() {
        let (guard, waiter) = CompletionGuard::new();
        assert!(guard.on_end());
        assert!(waiter.wait().is_ok());
    }

    #[test]
    fn late_settle_is_rejected() {
        let (completion, waiter) = completion();
        assert!(completion.settle(Ok(())));
        assert!(!completion.settle(Err(Error::UnexpectedDisconnect)));
        assert!(waiter.wait().is_ok());
        assert!(!completion.settle(Err(Error::UnexpectedDisconnect)));
    }

    #[test]
    fn wait_blocks_until_settled() {
        let (completion, waiter) = completion();

        let t = thread::spawn(move || waiter.wait());
        thread::sleep(std::time::Duration::from_millis(20));
        completion.settle(Err(Error::UnexpectedDisconnect));

        assert!(matches!(t.join().unwrap(), Err(Error::UnexpectedDisconnect)));
    }

    #[test]
    fn racing_triggers_settle_once() {
        for i in 0..500 {
            let (guard, waiter, closer) = guard_with_closer();
            let guard = Arc::new(guard);
            let barrier = Arc::new(Barrier::new(3));

            let handles: Vec<_> = (0..3)
                .map(|n| {
                    let guard = guard.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        match (n + i) % 3 {
                            0 => guard.on_end(),
                            1 => guard.on_inactive(),
                            _ => guard.on_error(Error::UnexpectedDisconnect),
                        }
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();

            assert_eq!(wins, 1);
            assert_eq!(closer.count(), 1);
            assert_eq!(guard.state(), GuardState::Closed);

            let _ = waiter.wait();
        }
    }

    #[test]
    fn racing_attach_and_trigger_close_once() {
        for _ in 0..500 {
            let (guard, waiter) = CompletionGuard::new();
            let guard = Arc::new(guard);
            let closer = CountingCloser::default();
            let barrier = Arc::new(Barrier::new(2));

            let t = {
                let guard = guard.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    guard.on_inactive();
                })
            };

            barrier.wait();
            guard.attach(Box::new(closer.clone()));
            t.join().unwrap();

            assert_eq!(closer.count(), 1);
            assert!(waiter.wait().is_err());
        }
    }
}
