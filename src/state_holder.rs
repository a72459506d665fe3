use atomic::{Atomic, Ordering};
#[cfg(feature = "dump")]
use core::cell::RefCell;
#[cfg(feature = "dump")]
use critical_section::{CriticalSection, Mutex};
#[cfg(feature = "dump")]
use heapless::Deque;

use crate::State;

/// Lock-free mirror of a unit's transaction state, readable from mainline
/// code while the interrupt owns the instance.
pub struct StateHolder<const HISTORY_SIZE: usize> {
    #[cfg(feature = "dump")]
    history: Mutex<RefCell<Deque<State, HISTORY_SIZE>>>,
    state: Atomic<State>,
}

impl<const HISTORY_SIZE: usize> StateHolder<HISTORY_SIZE> {
    pub const fn new() -> Self {
        Self {
            #[cfg(feature = "dump")]
            history: Mutex::new(RefCell::new(Deque::new())),
            state: Atomic::new(State::Idle),
        }
    }

    /// Publishes `state`. Consecutive duplicates are not added to the history.
    pub fn set_state(&self, state: State) {
        let previous = self.state.swap(state, Ordering::SeqCst);

        #[cfg(feature = "dump")]
        if previous != state {
            critical_section::with(|cs| self.push_history(cs, state));
        }
        #[cfg(not(feature = "dump"))]
        let _ = previous;
    }

    pub fn get_state(&self) -> State {
        self.state.load(Ordering::SeqCst)
    }

    #[cfg(feature = "dump")]
    pub fn history_into(&self, cs: CriticalSection, out: &mut [State; HISTORY_SIZE]) -> usize {
        let h = self.history.borrow_ref(cs);
        let n = h.len();
        for (slot, state) in out.iter_mut().zip(h.iter()) {
            *slot = *state;
        }
        n
    }

    #[cfg(feature = "dump")]
    fn push_history(&self, cs: CriticalSection, state: State) {
        let mut h = self.history.borrow_ref_mut(cs);
        if h.is_full() {
            h.pop_front();
        }
        // Room was made above.
        let _ = h.push_back(state);
    }
}
