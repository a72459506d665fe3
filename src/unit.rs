use core::cell::RefCell;

use critical_section::Mutex;

use crate::{engine::handle, slave::SlaveInstance, Application, SignalAdapter, State, Stats};

use crate::state_holder::StateHolder;

pub const STATES_HISTORY_SIZE: usize = 8;

/// Upper bound on events served per interrupt entry, so a stuck status flag
/// cannot keep the handler spinning.
pub const MAX_EVENTS_PER_ENTRY: usize = 8;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg(feature = "dump")]
pub struct StateDump {
    /// Oldest first. Only the first `recorded` entries are meaningful.
    pub state_history: [State; STATES_HISTORY_SIZE],
    pub recorded: usize,
    pub current_state: State,
    pub stats: Option<Stats>,
}

struct Attached<S, A, const N: usize> {
    slave: SlaveInstance<N>,
    adapter: S,
    app: A,
}

/// One peripheral unit: a slave instance together with the adapter for its
/// hardware and the application it talks to.
///
/// Meant to live in a `static` shared between `main` and the unit's
/// interrupt handlers:
///
/// ```ignore
/// static UNIT: Unit<MyAdapter, MyApp, 32> = Unit::new();
///
/// #[interrupt]
/// fn I2C1_EV() {
///     UNIT.service();
/// }
/// ```
pub struct Unit<S, A, const N: usize> {
    attached: Mutex<RefCell<Option<Attached<S, A, N>>>>,
    state_holder: StateHolder<STATES_HISTORY_SIZE>,
}

impl<S, A, const N: usize> Unit<S, A, N>
where
    S: SignalAdapter,
    A: Application,
{
    pub const fn new() -> Self {
        Self {
            attached: Mutex::new(RefCell::new(None)),
            state_holder: StateHolder::new(),
        }
    }

    /// Puts the unit into service. Returns the previously attached parts, if any.
    pub fn attach(
        &self,
        slave: SlaveInstance<N>,
        adapter: S,
        app: A,
    ) -> Option<(SlaveInstance<N>, S, A)> {
        self.state_holder.set_state(slave.state());

        critical_section::with(|cs| {
            self.attached
                .borrow_ref_mut(cs)
                .replace(Attached { slave, adapter, app })
                .map(|a| (a.slave, a.adapter, a.app))
        })
    }

    pub fn detach(&self) -> Option<(SlaveInstance<N>, S, A)> {
        let parts = critical_section::with(|cs| {
            self.attached
                .borrow_ref_mut(cs)
                .take()
                .map(|a| (a.slave, a.adapter, a.app))
        });
        self.state_holder.set_state(State::Idle);
        parts
    }

    /// Serves every event the adapter has pending, in order. Call this from
    /// the unit's interrupt handler, or in a loop when polling.
    ///
    /// Returns the number of events handled; zero when the unit is detached.
    pub fn service(&self) -> usize {
        critical_section::with(|cs| {
            let mut attached = self.attached.borrow_ref_mut(cs);
            let Some(Attached { slave, adapter, app }) = attached.as_mut() else {
                return 0;
            };

            let mut served = 0;
            while served < MAX_EVENTS_PER_ENTRY {
                let Some(event) = adapter.next_event() else {
                    break;
                };
                handle(slave, event, adapter, app);
                self.state_holder.set_state(slave.state());
                served += 1;
            }

            if served == MAX_EVENTS_PER_ENTRY {
                warn!("i2c: event limit reached in one entry");
            }

            served
        })
    }

    /// Transaction state as of the last handled event. Does not lock.
    pub fn state(&self) -> State {
        self.state_holder.get_state()
    }

    pub fn stats(&self) -> Option<Stats> {
        critical_section::with(|cs| {
            self.attached
                .borrow_ref(cs)
                .as_ref()
                .map(|a| a.slave.stats())
        })
    }

    /// Runs `f` on the attached application with interrupts masked.
    pub fn with_app<R>(&self, f: impl FnOnce(&mut A) -> R) -> Option<R> {
        critical_section::with(|cs| {
            self.attached
                .borrow_ref_mut(cs)
                .as_mut()
                .map(|a| f(&mut a.app))
        })
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> StateDump {
        let mut state_history = [State::Idle; STATES_HISTORY_SIZE];

        let (recorded, stats) = critical_section::with(|cs| {
            let recorded = self.state_holder.history_into(cs, &mut state_history);
            let stats = self.attached.borrow_ref(cs).as_ref().map(|a| a.slave.stats());
            (recorded, stats)
        });

        StateDump {
            state_history,
            recorded,
            current_state: self.state(),
            stats,
        }
    }
}

impl<S, A, const N: usize> Default for Unit<S, A, N>
where
    S: SignalAdapter,
    A: Application,
{
    fn default() -> Self {
        Self::new()
    }
}
