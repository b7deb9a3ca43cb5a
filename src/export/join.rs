// src/export/join.rs
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartSide {
    First,
    Second,
}

#[derive(Debug, PartialEq)]
pub enum JoinOutcome<T> {
    /// The other producer has not arrived yet.
    Waiting,
    /// Both values, in side order. Returned exactly once per barrier.
    Ready(T, T),
    /// Duplicate arrival, or the barrier already fired or was aborted.
    Ignored,
}

enum JoinState<T> {
    Collecting { first: Option<T>, second: Option<T> },
    Closed,
}

/// One-shot barrier over exactly two producers.
pub struct JoinBarrier<T> {
    state: Mutex<JoinState<T>>,
}

impl<T> Default for JoinBarrier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JoinBarrier<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(JoinState::Collecting { first: None, second: None }),
        }
    }

    pub fn arrive(&self, side: ChartSide, value: T) -> JoinOutcome<T> {
        let mut state = self.state.lock();
        let JoinState::Collecting { first, second } = &mut *state else {
            return JoinOutcome::Ignored;
        };

        let slot = match side {
            ChartSide::First => &mut *first,
            ChartSide::Second => &mut *second,
        };
        if slot.is_some() {
            return JoinOutcome::Ignored;
        }
        *slot = Some(value);

        if first.is_none() || second.is_none() {
            return JoinOutcome::Waiting;
        }
        match std::mem::replace(&mut *state, JoinState::Closed) {
            JoinState::Collecting { first: Some(a), second: Some(b) } => JoinOutcome::Ready(a, b),
            _ => JoinOutcome::Ignored,
        }
    }

    /// Closes the barrier without firing. Returns false if it was already closed.
    pub fn abort(&self) -> bool {
        let mut state = self.state.lock();
        !matches!(std::mem::replace(&mut *state, JoinState::Closed), JoinState::Closed)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), JoinState::Closed)
    }
}
