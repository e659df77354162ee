use std::sync::{Arc, Mutex};

use super::{PositionSource, SampleSink, SessionId, Subscription, WatchOptions};
use crate::types::{PositionError, PositionSample};

#[derive(Debug, Default)]
struct MockState {
    sink: Option<SampleSink>,
    retired: Vec<SampleSink>,
    watch_count: u32,
    cancel_count: u32,
    fail_next_watch: Option<PositionError>,
    last_options: Option<WatchOptions>,
}

/// Scriptable positioning source for tests and offline replay.
///
/// Clones share state, so a caller can keep a handle after moving the source
/// into the acquisition state machine and inject samples through it.
#[derive(Clone, Debug, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `watch` call fail with `error`
    pub fn fail_next_watch(&self, error: PositionError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_watch = Some(error);
        }
    }

    /// Deliver a sample on the live subscription. False when none is open.
    pub fn emit(&self, sample: PositionSample) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sink.as_ref().map(|sink| sink.sample(sample)))
            .unwrap_or(false)
    }

    pub fn emit_error(&self, error: PositionError) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sink.as_ref().map(|sink| sink.error(error)))
            .unwrap_or(false)
    }

    /// Deliver through the sink of an already released session, as a late
    /// callback from a platform API would.
    pub fn emit_stale(&self, session: SessionId, sample: PositionSample) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|s| {
                s.retired
                    .iter()
                    .find(|sink| sink.session() == session)
                    .map(|sink| sink.sample(sample))
            })
            .unwrap_or(false)
    }

    pub fn watch_count(&self) -> u32 {
        self.state.lock().map(|s| s.watch_count).unwrap_or(0)
    }

    pub fn cancel_count(&self) -> u32 {
        self.state.lock().map(|s| s.cancel_count).unwrap_or(0)
    }

    /// Number of watches opened and not yet released
    pub fn active_watches(&self) -> u32 {
        self.state
            .lock()
            .map(|s| s.watch_count - s.cancel_count)
            .unwrap_or(0)
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sink.as_ref().map(|sink| sink.session()))
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        self.state.lock().ok().and_then(|s| s.last_options.clone())
    }
}

impl PositionSource for MockSource {
    fn watch(
        &mut self,
        options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PositionError::unavailable("mock source state poisoned"))?;

        state.last_options = Some(options.clone());
        if let Some(error) = state.fail_next_watch.take() {
            return Err(error);
        }

        state.watch_count += 1;
        state.sink = Some(sink);

        let shared = self.state.clone();
        Ok(Subscription::new(move || {
            if let Ok(mut state) = shared.lock() {
                state.cancel_count += 1;
                if let Some(sink) = state.sink.take() {
                    state.retired.push(sink);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radar::RadarEvent;
    use tokio::sync::mpsc;

    #[test]
    fn test_mock_counts_watch_and_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = MockSource::new();
        let handle = source.clone();

        let session = SessionId::default().next();
        let mut sub = source
            .watch(&WatchOptions::default(), SampleSink::new(session, tx))
            .unwrap();
        assert_eq!(handle.active_watches(), 1);
        assert!(handle.emit(PositionSample::new(0.0, 0.0, 5.0)));
        assert!(matches!(rx.try_recv(), Ok(RadarEvent::Position { .. })));

        sub.cancel();
        assert_eq!(handle.active_watches(), 0);
        assert!(!handle.emit(PositionSample::new(0.0, 0.0, 5.0)));

        // late delivery still reaches the channel, tagged with the old session
        assert!(handle.emit_stale(session, PositionSample::new(0.0, 0.0, 5.0)));
        match rx.try_recv() {
            Ok(RadarEvent::Position { session: s, .. }) => assert_eq!(s, session),
            _ => panic!("expected stale delivery"),
        }
    }

    #[test]
    fn test_mock_watch_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut source = MockSource::new();
        source.fail_next_watch(PositionError::permission_denied("denied"));

        let result = source.watch(&WatchOptions::default(), SampleSink::new(SessionId::default(), tx));
        assert!(result.is_err());
        assert_eq!(source.watch_count(), 0);
        assert!(source.last_options().is_some());
    }
}
