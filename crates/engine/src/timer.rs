use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fired,
    Cancelled,
}

/// A one-shot deadline polled by its owner. It fires at most once, and
/// cancelling after it fired or was cancelled is a no-op.
#[derive(Debug, Clone)]
pub struct DeferredTask {
    fire_at: Instant,
    state: TaskState,
}

impl DeferredTask {
    pub fn new(now: Instant, delay: Duration) -> Self {
        Self {
            fire_at: now + delay,
            state: TaskState::Pending,
        }
    }

    pub fn fire_at(&self) -> Instant {
        self.fire_at
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == TaskState::Pending
    }

    /// Returns true exactly once, on the first poll at or after the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.state == TaskState::Pending && now >= self.fire_at {
            self.state = TaskState::Fired;
            return true;
        }
        false
    }

    /// Returns whether this call cancelled a pending task.
    pub fn cancel(&mut self) -> bool {
        if self.state == TaskState::Pending {
            self.state = TaskState::Cancelled;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_deadline() {
        let start = Instant::now();
        let mut task = DeferredTask::new(start, Duration::from_millis(3000));
        assert!(!task.poll(start + Duration::from_millis(2999)));
        assert!(task.poll(start + Duration::from_millis(3000)));
        assert!(!task.poll(start + Duration::from_millis(5000)));
        assert_eq!(task.state(), TaskState::Fired);
    }

    #[test]
    fn cancel_is_idempotent() {
        let start = Instant::now();
        let mut task = DeferredTask::new(start, Duration::from_secs(1));
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(!task.poll(start + Duration::from_secs(2)));
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let start = Instant::now();
        let mut task = DeferredTask::new(start, Duration::ZERO);
        assert!(task.poll(start));
        assert!(!task.cancel());
        assert_eq!(task.state(), TaskState::Fired);
    }
}
