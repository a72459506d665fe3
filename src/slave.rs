use crate::{
    buffer::TransferBuffer, Address, Config, Direction, Fault, OverreadPolicy, State,
};

/// Fault and transaction counters of one slave instance. All counters wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Transactions started by an address match, repeated starts included.
    pub transactions: u32,
    /// Transactions closed by a stop condition.
    pub completed: u32,
    pub collisions: u32,
    /// Bytes dropped because the hardware flagged overflow or write collision.
    pub discarded: u32,
    /// Bytes that arrived with the buffer already full.
    pub overflows: u32,
    /// Bytes the master read past the end of the buffer.
    pub overreads: u32,
}

impl Stats {
    fn record(&mut self, fault: Fault) {
        let counter = match fault {
            Fault::BusCollision => &mut self.collisions,
            Fault::ReceiveOverflow | Fault::WriteCollision => &mut self.discarded,
            Fault::BufferOverflow(_) => &mut self.overflows,
            Fault::TransmitOverread => &mut self.overreads,
        };
        *counter = counter.wrapping_add(1);
    }
}

/// State of one slave peripheral unit: its address, its transfer buffer of
/// capacity `N` and the progress of the current transaction.
///
/// Only [`crate::handle`] mutates an instance. Between two events the cursor
/// is always within `0..=N`.
pub struct SlaveInstance<const N: usize> {
    address: Address,
    config: Config,
    buffer: TransferBuffer<N>,
    state: State,
    // Application::write already ran for the current transaction.
    primed: bool,
    stats: Stats,
}

impl<const N: usize> SlaveInstance<N> {
    pub const fn new(address: Address, config: Config) -> Self {
        Self {
            address,
            config,
            buffer: TransferBuffer::new(),
            state: State::Idle,
            primed: false,
            stats: Stats {
                transactions: 0,
                completed: 0,
                collisions: 0,
                discarded: 0,
                overflows: 0,
                overreads: 0,
            },
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn index(&self) -> usize {
        self.buffer.index()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Direction of the last data byte of the active transaction, if any.
    pub fn direction(&self) -> Option<Direction> {
        match self.state {
            State::Receiving => Some(Direction::MasterWrites),
            State::Transmitting => Some(Direction::MasterReads),
            State::Idle | State::Addressed | State::Aborted => None,
        }
    }

    /// True between an address match and the next stop, unless a collision
    /// abandoned the transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(
            self.state,
            State::Addressed | State::Receiving | State::Transmitting
        )
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn begin_transaction(&mut self) {
        self.buffer.rewind();
        self.primed = false;
        self.state = State::Addressed;
        self.stats.transactions = self.stats.transactions.wrapping_add(1);
    }

    pub(crate) fn end_transaction(&mut self) {
        self.state = State::Idle;
        self.stats.completed = self.stats.completed.wrapping_add(1);
    }

    pub(crate) fn abort(&mut self) {
        self.state = State::Aborted;
    }

    pub(crate) fn reset(&mut self) {
        self.state = State::Idle;
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub(crate) fn record(&mut self, fault: Fault) {
        self.stats.record(fault);
    }

    /// Appends a received byte. Fails, leaving the buffer untouched, when full.
    pub(crate) fn push(&mut self, byte: u8) -> Result<(), ()> {
        self.buffer.push(byte)
    }

    /// Discards the buffered bytes and stores `byte` at index 0.
    pub(crate) fn restart_with(&mut self, byte: u8) {
        self.buffer.restart_with(byte)
    }

    /// Received bytes not yet handed to the application.
    pub(crate) fn received(&self) -> &[u8] {
        self.buffer.filled()
    }

    /// Marks the buffer as handed to the application for filling. Returns the
    /// storage the first time per transaction only.
    pub(crate) fn prime(&mut self) -> Option<&mut [u8]> {
        if self.primed {
            None
        } else {
            self.primed = true;
            Some(self.buffer.storage_mut())
        }
    }

    /// Next byte to put on the wire. The second value is true when the master
    /// has read past the end of the buffer.
    pub(crate) fn next_outgoing(&mut self) -> (u8, bool) {
        if let Some(byte) = self.buffer.next() {
            return (byte, false);
        }

        let byte = match self.config.overread {
            OverreadPolicy::Filler(filler) => filler,
            OverreadPolicy::RepeatLast => self.buffer.last_byte(),
            OverreadPolicy::Wrap => {
                self.buffer.rewind();
                // Capacity is never zero, so this always yields.
                return (self.buffer.next().unwrap_or_default(), true);
            }
        };

        (byte, true)
    }
}
