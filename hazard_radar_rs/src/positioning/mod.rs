//! Positioning source seam.
//!
//! A source delivers samples and errors asynchronously through a
//! [`SampleSink`] for as long as the [`Subscription`] it returned is alive.
//! Every delivery is tagged with the session that opened the watch so the
//! acquisition state machine can drop anything from a released session.

pub mod mock;
pub mod replay;
pub mod simulated;
pub mod termux;

pub use mock::MockSource;
pub use replay::{load_log, LoggedEvent, ReplaySource, SampleLog};
pub use simulated::{SimulatedDrive, SimulatedSource};
pub use termux::TermuxSource;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::radar::RadarEvent;
use crate::types::{PositionError, PositionSample};

/// Identifies one start..stop acquisition session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Options forwarded to the source when a watch opens
#[derive(Clone, Debug, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached reading the source may hand back
    pub maximum_age: Duration,
    /// How long the source may wait for any single reading
    pub sample_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            sample_timeout: Duration::from_secs(30),
        }
    }
}

/// Delivery endpoint handed to a source for one session
#[derive(Clone, Debug)]
pub struct SampleSink {
    session: SessionId,
    events: UnboundedSender<RadarEvent>,
}

impl SampleSink {
    pub fn new(session: SessionId, events: UnboundedSender<RadarEvent>) -> Self {
        Self { session, events }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns false once the engine side has gone away
    pub fn sample(&self, sample: PositionSample) -> bool {
        self.deliver(Ok(sample))
    }

    pub fn error(&self, error: PositionError) -> bool {
        self.deliver(Err(error))
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn deliver(&self, update: Result<PositionSample, PositionError>) -> bool {
        self.events
            .send(RadarEvent::Position {
                session: self.session,
                update,
            })
            .is_ok()
    }
}

/// Handle to a live watch. Cancelling (or dropping) it stops delivery.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Subscription whose delivery runs in a spawned task
    pub fn from_task(handle: JoinHandle<()>) -> Self {
        Self::new(move || handle.abort())
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Idempotent
    pub fn cancel(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

pub trait PositionSource {
    /// Open a continuous watch delivering into `sink`.
    ///
    /// Failing here (no positioning hardware, no permission) is reported as
    /// the error the session should fail with.
    fn watch(
        &mut self,
        options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError>;
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn watch(
        &mut self,
        options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError> {
        (**self).watch(options, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn test_subscription_cancel_is_idempotent() {
        let released = Arc::new(AtomicU32::new(0));
        let counter = released.clone();
        let mut sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.cancel();
        sub.cancel();
        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_releases() {
        let released = Arc::new(AtomicU32::new(0));
        let counter = released.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sink_tags_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionId::default().next().next();
        let sink = SampleSink::new(session, tx);

        assert!(sink.sample(PositionSample::new(1.0, 2.0, 3.0)));
        match rx.try_recv() {
            Ok(RadarEvent::Position { session: s, update }) => {
                assert_eq!(s.id(), 2);
                assert_eq!(update.unwrap().accuracy_m, 3.0);
            }
            _ => panic!("expected position event"),
        }

        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.error(PositionError::timeout("late")));
    }
}
