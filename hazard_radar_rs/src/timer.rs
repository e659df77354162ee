//! Timer resources for the acquisition timeout and the repeating alert cues.
//!
//! Timers never call back into their owners directly. A firing is reported as
//! a [`TimerId`]; owners compare it with the id they currently hold, so a
//! firing that raced with a cancel is simply ignored.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::radar::RadarEvent;

/// Smallest period handed to tokio's interval (it rejects zero)
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(u64);

impl TimerId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait TimerService {
    /// Fire once after `delay`
    fn start_once(&mut self, delay: Duration) -> TimerId;

    /// Fire every `period`, first tick one period from now
    fn start_repeating(&mut self, period: Duration) -> TimerId;

    /// Release a timer. Unknown or already finished ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

/// Timers backed by tokio tasks. Must be used from inside a tokio runtime.
pub struct TokioTimers {
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    events: UnboundedSender<RadarEvent>,
}

impl TokioTimers {
    pub fn new(events: UnboundedSender<RadarEvent>) -> Self {
        Self {
            next_id: 0,
            tasks: HashMap::new(),
            events,
        }
    }

    fn allocate(&mut self) -> TimerId {
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.next_id += 1;
        TimerId(self.next_id)
    }

    /// Timers whose task is still pending
    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

impl TimerService for TokioTimers {
    fn start_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(RadarEvent::Timer(id));
        });
        self.tasks.insert(id, handle);
        id
    }

    fn start_repeating(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let events = self.events.clone();
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(RadarEvent::Timer(id)).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

/// Record of every call made against a [`ManualTimers`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerCall {
    StartOnce(TimerId, Duration),
    StartRepeating(TimerId, Duration),
    Cancel(TimerId),
}

#[derive(Clone, Debug)]
struct ManualTimer {
    due: Duration,
    period: Option<Duration>,
}

/// Deterministic virtual-clock timers for tests and offline replay.
///
/// Time only moves when the caller asks. [`ManualTimers::pop_due`] hands out
/// one firing at a time so the owner can react (and cancel) between firings.
#[derive(Debug, Default)]
pub struct ManualTimers {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
    journal: Vec<TimerCall>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time since creation
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn journal(&self) -> &[TimerCall] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// When the earliest pending timer is due
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.values().map(|t| t.due).min()
    }

    /// Fire the earliest timer due at or before `until`.
    ///
    /// Returns `None` once nothing else is due, leaving the clock at `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerId> {
        let (id, due) = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(id, t)| (t.due, **id))
            .map(|(id, t)| (*id, t.due))?;

        self.now = self.now.max(due);
        let rearm = self.timers.get(&id).and_then(|t| t.period);
        match rearm {
            Some(period) => {
                if let Some(timer) = self.timers.get_mut(&id) {
                    timer.due = due + period;
                }
            }
            None => {
                self.timers.remove(&id);
            }
        }
        Some(id)
    }

    /// Move the clock forward by `by`, returning every firing in order.
    ///
    /// Owners cannot react between these firings; use [`ManualTimers::pop_due`]
    /// when that matters.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        let until = self.now + by;
        let mut fired = Vec::new();
        while let Some(id) = self.pop_due(until) {
            fired.push(id);
        }
        self.now = until;
        fired
    }

    /// Move the clock to `until` without firing anything due before it.
    /// Only used after the caller drained [`ManualTimers::pop_due`].
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

impl TimerService for ManualTimers {
    fn start_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        self.timers.insert(
            id,
            ManualTimer {
                due: self.now + delay,
                period: None,
            },
        );
        self.journal.push(TimerCall::StartOnce(id, delay));
        id
    }

    fn start_repeating(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let period = period.max(MIN_PERIOD);
        self.timers.insert(
            id,
            ManualTimer {
                due: self.now + period,
                period: Some(period),
            },
        );
        self.journal.push(TimerCall::StartRepeating(id, period));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.timers.remove(&id);
        self.journal.push(TimerCall::Cancel(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_manual_once_fires_once() {
        let mut timers = ManualTimers::new();
        let id = timers.start_once(Duration::from_secs(5));

        assert!(timers.advance(Duration::from_secs(4)).is_empty());
        assert_eq!(timers.advance(Duration::from_secs(1)), vec![id]);
        assert!(timers.advance(Duration::from_secs(60)).is_empty());
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_manual_repeating_rearms() {
        let mut timers = ManualTimers::new();
        let id = timers.start_repeating(Duration::from_millis(300));

        let fired = timers.advance(Duration::from_millis(1000));
        assert_eq!(fired, vec![id, id, id]);
        assert!(timers.is_active(id));

        timers.cancel(id);
        assert!(timers.advance(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_manual_fires_in_due_order() {
        let mut timers = ManualTimers::new();
        let slow = timers.start_once(Duration::from_millis(900));
        let fast = timers.start_repeating(Duration::from_millis(400));

        let fired = timers.advance(Duration::from_millis(1000));
        assert_eq!(fired, vec![fast, fast, slow]);
        assert_eq!(timers.now(), Duration::from_millis(1000));
    }

    #[test]
    fn test_pop_due_lets_owner_cancel_between_firings() {
        let mut timers = ManualTimers::new();
        let a = timers.start_once(Duration::from_millis(100));
        let b = timers.start_once(Duration::from_millis(200));

        let until = Duration::from_millis(500);
        assert_eq!(timers.pop_due(until), Some(a));
        timers.cancel(b);
        assert_eq!(timers.pop_due(until), None);
        assert_eq!(
            timers.journal().last(),
            Some(&TimerCall::Cancel(b))
        );
    }

    #[test]
    fn test_cancel_unknown_is_harmless() {
        let mut timers = ManualTimers::new();
        let id = timers.start_once(Duration::from_secs(1));
        timers.cancel(id);
        timers.cancel(id);
        assert_eq!(timers.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_once_delivers_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        let id = timers.start_once(Duration::from_secs(30));

        match rx.recv().await {
            Some(RadarEvent::Timer(fired)) => assert_eq!(fired, id),
            _ => panic!("expected timer event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_fired_once_is_released() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        let id = timers.start_once(Duration::from_secs(30));
        assert!(matches!(rx.recv().await, Some(RadarEvent::Timer(fired)) if fired == id));

        timers.cancel(id);
        assert!(timers.tasks.is_empty());

        // finished one-shots are also pruned when the next timer starts
        let next = timers.start_once(Duration::from_millis(10));
        assert!(matches!(rx.recv().await, Some(RadarEvent::Timer(fired)) if fired == next));
        tokio::time::sleep(Duration::from_millis(10)).await;
        timers.start_repeating(Duration::from_secs(1));
        assert_eq!(timers.tasks.len(), 1);
        assert!(!timers.tasks.contains_key(&next));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_cancel_stops_repeating() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        let id = timers.start_repeating(Duration::from_millis(500));

        for _ in 0..3 {
            match rx.recv().await {
                Some(RadarEvent::Timer(fired)) => assert_eq!(fired, id),
                _ => panic!("expected timer event"),
            }
        }

        timers.cancel(id);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timers.active_count(), 0);
    }
}
