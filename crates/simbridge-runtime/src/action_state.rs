//! [`ActionState`] – the single shared actuation slot.
//!
//! Command handlers write it, the simulation loop reads it once per tick.
//! It is last-writer-wins shared state, not a queue: when several commands
//! arrive within one tick only the last completed write is observed.  The two
//! command sources are not ordered with respect to each other; each source's
//! own messages keep the order the transport delivers them in.
//!
//! # Example
//!
//! ```rust
//! use simbridge_runtime::action_state::ActionState;
//! use simbridge_types::ActionVector;
//!
//! let state = ActionState::new();
//! assert_eq!(state.read(), ActionVector::ZERO);
//!
//! let handle = state.clone();
//! handle.write(ActionVector::new(0.5, 0.5));
//! assert_eq!(state.read(), ActionVector::new(0.5, 0.5));
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use simbridge_types::ActionVector;

/// Mutex-guarded current [`ActionVector`].
///
/// Clones share the same slot.  Both operations hold the lock only for a
/// single copy of two `f64`s, so readers never observe a half-written pair.
#[derive(Debug, Clone, Default)]
pub struct ActionState {
    slot: Arc<Mutex<ActionVector>>,
}

impl ActionState {
    /// Create a slot holding `(0.0, 0.0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    pub fn write(&self, action: ActionVector) {
        // A poisoned guard still holds a whole value: the critical section is
        // a single assignment.
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = action;
    }

    /// The most recently completed write.
    pub fn read(&self) -> ActionVector {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
