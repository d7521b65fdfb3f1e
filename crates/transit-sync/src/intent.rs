//! Pending-intent tracking for values with confirmation latency.
//!
//! A favorite toggle flips the local view immediately and then waits for the
//! backend to agree. During that window the view shows the intended value
//! with a pending hint; if the backend refuses, the value falls back to the
//! last confirmed one.
//!
//! ```text
//!  Confirmed(T)     backend agrees with what is shown
//!  Pending { .. }   request outstanding; `intended` is shown
//! ```
//!
//! Unlike a plain "confirm on match" machine, `Pending` may briefly carry
//! `intended == confirmed` (e.g. add then delete while the add is still in
//! flight). It only collapses to `Confirmed` through [`IntentState::settle`]
//! or a matching confirmation, so the queued request still gets its turn.

#[derive(Debug, Clone, PartialEq)]
pub enum IntentState<T: Clone + PartialEq> {
    Confirmed(T),
    Pending { intended: T, confirmed: T },
}

impl<T: Clone + PartialEq> IntentState<T> {
    pub fn new(value: T) -> Self {
        Self::Confirmed(value)
    }

    /// The value the user asked for (what views render).
    pub fn intended(&self) -> &T {
        match self {
            Self::Confirmed(v) => v,
            Self::Pending { intended, .. } => intended,
        }
    }

    /// The last value the backend acknowledged.
    pub fn confirmed(&self) -> &T {
        match self {
            Self::Confirmed(v) => v,
            Self::Pending { confirmed, .. } => confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Register a new user intent. Returns `true` if the intended value
    /// changed.
    pub fn set_intent(&mut self, value: T) -> bool {
        match self {
            Self::Confirmed(current) => {
                if *current == value {
                    return false;
                }
                *self = Self::Pending {
                    intended: value,
                    confirmed: current.clone(),
                };
                true
            }
            Self::Pending { intended, .. } => {
                if *intended == value {
                    return false;
                }
                *intended = value;
                true
            }
        }
    }

    /// The backend acknowledged `value`. Collapses to `Confirmed` when it is
    /// what the user wants, otherwise records it and stays pending.
    pub fn on_confirmed(&mut self, value: T) {
        match self {
            Self::Pending {
                intended,
                confirmed,
            } => {
                if *intended == value {
                    *self = Self::Confirmed(value);
                } else {
                    *confirmed = value;
                }
            }
            Self::Confirmed(_) => *self = Self::Confirmed(value),
        }
    }

    /// Give up on the intent and fall back to the confirmed value.
    pub fn rollback(&mut self) {
        if let Self::Pending { confirmed, .. } = self {
            *self = Self::Confirmed(confirmed.clone());
        }
    }

    /// Collapse a pending state whose intent already matches the backend.
    /// Returns `true` if it collapsed.
    pub fn settle(&mut self) -> bool {
        match self {
            Self::Pending {
                intended,
                confirmed,
            } if intended == confirmed => {
                *self = Self::Confirmed(confirmed.clone());
                true
            }
            _ => false,
        }
    }
}
