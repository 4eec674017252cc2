//! Minimal generic state machine whose state is persisted as a
//! current/previous/time-in-state snapshot.

/// Tracks the current state, the state it replaced, and how long the
/// current state has been active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMachine<S> {
    current: S,
    previous: Option<S>,
    time_in_state: f32,
}

impl<S: Clone + PartialEq> StateMachine<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            previous: None,
            time_in_state: 0.0,
        }
    }

    pub fn current(&self) -> &S {
        &self.current
    }

    pub fn previous(&self) -> Option<&S> {
        self.previous.as_ref()
    }

    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    /// Switch to `next`. Re-entering the current state is a no-op.
    pub fn transition(&mut self, next: S) {
        if next == self.current {
            return;
        }
        let old = std::mem::replace(&mut self.current, next);
        self.previous = Some(old);
        self.time_in_state = 0.0;
    }

    pub fn tick(&mut self, dt: f32) {
        self.time_in_state += dt;
    }

    /// Overwrite every part of the machine, used when restoring a snapshot.
    pub fn restore(&mut self, current: S, previous: Option<S>, time_in_state: f32) {
        self.current = current;
        self.previous = previous;
        self.time_in_state = time_in_state;
    }
}
