use crate::{
    slave::SlaveInstance, Address, Direction, Event, Fault, OverflowPolicy, OverreadPolicy, State,
};

/// Register-level access to one peripheral unit.
///
/// Implementations classify raw status flags into [`Event`]s and expose the
/// data register. When one interrupt entry reports several conditions,
/// `next_event` yields them in bus order, a collision always first. A start
/// condition for a master read yields [`Event::AddressMatch`] followed by
/// `DataByte(MasterReads)` so that the first byte is loaded in the same entry.
pub trait SignalAdapter {
    /// Next pending event, or `None` once all pending conditions are served.
    fn next_event(&mut self) -> Option<Event>;

    /// Reads the data register, clearing the byte-ready condition.
    fn read_data(&mut self) -> u8;

    /// Loads the data register with the next byte to transmit.
    fn write_data(&mut self, byte: u8);

    /// Stops stretching the clock line.
    fn release_clock(&mut self);

    /// Clears receive overflow, write collision and bus collision flags.
    fn clear_errors(&mut self);
}

/// The four callbacks through which the engine exchanges data with the
/// surrounding program.
///
/// All of them run in interrupt context while the bus clock is stretched.
/// They must return well within the bus timeout (25 ms for SMBus-class
/// masters) and must not block.
pub trait Application {
    /// A transaction addressed to this unit has started.
    fn begin(&mut self, _address: Address) {}

    /// `data` holds between 1 and capacity received bytes. Called at stop and,
    /// under [`OverflowPolicy::TriggerFlush`], every time the buffer fills up.
    fn read(&mut self, data: &[u8]);

    /// Fill `buffer` with everything the master may read. Called once per
    /// transaction, before the first byte goes out. The master decides how
    /// many bytes it actually clocks out.
    fn write(&mut self, buffer: &mut [u8]);

    /// The transaction ended with a stop condition.
    fn end(&mut self) {}
}

impl<A: Application + ?Sized> Application for &mut A {
    fn begin(&mut self, address: Address) {
        (**self).begin(address)
    }

    fn read(&mut self, data: &[u8]) {
        (**self).read(data)
    }

    fn write(&mut self, buffer: &mut [u8]) {
        (**self).write(buffer)
    }

    fn end(&mut self) {
        (**self).end()
    }
}

impl<S: SignalAdapter + ?Sized> SignalAdapter for &mut S {
    fn next_event(&mut self) -> Option<Event> {
        (**self).next_event()
    }

    fn read_data(&mut self) -> u8 {
        (**self).read_data()
    }

    fn write_data(&mut self, byte: u8) {
        (**self).write_data(byte)
    }

    fn release_clock(&mut self) {
        (**self).release_clock()
    }

    fn clear_errors(&mut self) {
        (**self).clear_errors()
    }
}

/// Processes one event against `slave`, invoking `app` as required, and
/// releases the clock line exactly once.
///
/// Never blocks and never allocates. Every condition is recovered from
/// locally; nothing is reported to the application as an error.
pub fn handle<const N: usize, S, A>(
    slave: &mut SlaveInstance<N>,
    event: Event,
    hw: &mut S,
    app: &mut A,
) where
    S: SignalAdapter + ?Sized,
    A: Application + ?Sized,
{
    trace!("i2c: {} in state {}", event, slave.state());

    match event {
        Event::Collision => {
            // Let go of the bus before anything else is looked at.
            hw.release_clock();
            on_collision(slave, hw);
            return;
        }
        Event::AddressMatch(address) => on_address(slave, address, hw, app),
        Event::DataByte {
            direction: Direction::MasterWrites,
            overflow,
            collision,
        } => on_receive(slave, overflow, collision, hw, app),
        Event::DataByte {
            direction: Direction::MasterReads,
            overflow,
            collision,
        } => on_transmit(slave, overflow, collision, hw, app),
        Event::Stop => on_stop(slave, app),
    }

    hw.release_clock();
}

fn on_collision<const N: usize, S: SignalAdapter + ?Sized>(
    slave: &mut SlaveInstance<N>,
    hw: &mut S,
) {
    // Stale byte, must not be mistaken for data later.
    let _ = hw.read_data();
    hw.clear_errors();

    slave.record(Fault::BusCollision);
    if slave.in_transaction() {
        warn!("i2c: bus collision, transaction abandoned at index {}", slave.index());
        slave.abort();
    } else {
        warn!("i2c: bus collision while idle");
    }
}

fn on_address<const N: usize, S, A>(
    slave: &mut SlaveInstance<N>,
    address: Address,
    hw: &mut S,
    app: &mut A,
) where
    S: SignalAdapter + ?Sized,
    A: Application + ?Sized,
{
    // Already matched by the hardware.
    let _ = hw.read_data();

    if slave.in_transaction() {
        debug!("i2c: repeated start");
        // Hand over what was received before the restart, it would be lost otherwise.
        if slave.state() == State::Receiving && !slave.received().is_empty() {
            app.read(slave.received());
        }
    }

    slave.begin_transaction();
    debug!("i2c: begin {=u8:#x}", address.get());
    app.begin(address);
}

fn on_receive<const N: usize, S, A>(
    slave: &mut SlaveInstance<N>,
    overflow: bool,
    collision: bool,
    hw: &mut S,
    app: &mut A,
) where
    S: SignalAdapter + ?Sized,
    A: Application + ?Sized,
{
    let byte = hw.read_data();

    if overflow || collision {
        hw.clear_errors();
        let fault = if overflow {
            Fault::ReceiveOverflow
        } else {
            Fault::WriteCollision
        };
        warn!("i2c: {}, byte {=u8:#x} discarded", fault, byte);
        slave.record(fault);
        return;
    }

    if !slave.in_transaction() {
        trace!("i2c: byte {=u8:#x} outside a transaction dropped", byte);
        return;
    }

    slave.set_state(State::Receiving);

    if slave.push(byte).is_ok() {
        return;
    }

    let policy = slave.config().overflow;
    debug!("i2c: buffer full, {}", policy);
    slave.record(Fault::BufferOverflow(policy));

    match policy {
        OverflowPolicy::TriggerFlush => {
            app.read(slave.received());
            slave.restart_with(byte);
        }
        OverflowPolicy::Ignore => {}
        OverflowPolicy::Overwrite => slave.restart_with(byte),
    }
}

fn on_transmit<const N: usize, S, A>(
    slave: &mut SlaveInstance<N>,
    overflow: bool,
    collision: bool,
    hw: &mut S,
    app: &mut A,
) where
    S: SignalAdapter + ?Sized,
    A: Application + ?Sized,
{
    if overflow || collision {
        hw.clear_errors();
        let fault = if collision {
            Fault::WriteCollision
        } else {
            Fault::ReceiveOverflow
        };
        warn!("i2c: {} while transmitting", fault);
        slave.record(fault);
    }

    if !slave.in_transaction() {
        // Keep the master clocking something defined out of an abandoned transfer.
        hw.write_data(idle_byte(slave.config().overread));
        return;
    }

    slave.set_state(State::Transmitting);

    if let Some(storage) = slave.prime() {
        app.write(storage);
    }

    let (byte, overread) = slave.next_outgoing();
    if overread {
        debug!("i2c: master read past end of buffer");
        slave.record(Fault::TransmitOverread);
    }
    hw.write_data(byte);
}

fn on_stop<const N: usize, A: Application + ?Sized>(slave: &mut SlaveInstance<N>, app: &mut A) {
    match slave.state() {
        State::Addressed | State::Receiving | State::Transmitting => {
            if slave.state() == State::Receiving && !slave.received().is_empty() {
                app.read(slave.received());
            }
            slave.end_transaction();
            debug!("i2c: end");
            app.end();
        }
        State::Aborted => slave.reset(),
        State::Idle => trace!("i2c: stop while idle"),
    }
}

fn idle_byte(policy: OverreadPolicy) -> u8 {
    match policy {
        OverreadPolicy::Filler(filler) => filler,
        OverreadPolicy::RepeatLast | OverreadPolicy::Wrap => 0xFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Begin(u8),
        Read(Vec<u8>),
        Write,
        End,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        payload: Vec<u8>,
    }

    impl Application for Recorder {
        fn begin(&mut self, address: Address) {
            self.calls.push(Call::Begin(address.get()));
        }

        fn read(&mut self, data: &[u8]) {
            self.calls.push(Call::Read(data.to_vec()));
        }

        fn write(&mut self, buffer: &mut [u8]) {
            self.calls.push(Call::Write);
            let n = self.payload.len().min(buffer.len());
            buffer[..n].copy_from_slice(&self.payload[..n]);
        }

        fn end(&mut self) {
            self.calls.push(Call::End);
        }
    }

    #[derive(Default)]
    struct Bus {
        incoming: u8,
        sent: Vec<u8>,
        releases: usize,
        reads: usize,
        clears: usize,
    }

    impl SignalAdapter for Bus {
        fn next_event(&mut self) -> Option<Event> {
            None
        }

        fn read_data(&mut self) -> u8 {
            self.reads += 1;
            self.incoming
        }

        fn write_data(&mut self, byte: u8) {
            self.sent.push(byte);
        }

        fn release_clock(&mut self) {
            self.releases += 1;
        }

        fn clear_errors(&mut self) {
            self.clears += 1;
        }
    }

    struct Harness<const N: usize> {
        slave: SlaveInstance<N>,
        bus: Bus,
        app: Recorder,
    }

    impl<const N: usize> Harness<N> {
        fn new(overflow: OverflowPolicy) -> Self {
            Self {
                slave: SlaveInstance::new(
                    Address::new(0x18).unwrap(),
                    Config {
                        overflow,
                        ..Config::default()
                    },
                ),
                bus: Bus::default(),
                app: Recorder::default(),
            }
        }

        fn event(&mut self, event: Event) {
            handle(&mut self.slave, event, &mut self.bus, &mut self.app);
        }

        fn start(&mut self) {
            self.event(Event::AddressMatch(self.slave.address()));
        }

        fn receive(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.bus.incoming = b;
                self.event(Event::data(Direction::MasterWrites));
            }
        }

        fn transmit(&mut self, count: usize) {
            for _ in 0..count {
                self.event(Event::data(Direction::MasterReads));
            }
        }

        fn stop(&mut self) {
            self.event(Event::Stop);
        }
    }

    #[test]
    fn write_transaction_flushes_at_stop() {
        let mut h = Harness::<8>::new(OverflowPolicy::TriggerFlush);
        h.start();
        assert_eq!(h.slave.index(), 0);
        h.receive(&[0xDE, 0xAD]);
        assert_eq!(h.slave.direction(), Some(Direction::MasterWrites));
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![Call::Begin(0x18), Call::Read(vec![0xDE, 0xAD]), Call::End]
        );
        assert_eq!(h.slave.state(), State::Idle);
        assert_eq!(h.bus.releases, 4);
    }

    #[test]
    fn trigger_flush_hands_over_full_buffer() {
        let mut h = Harness::<3>::new(OverflowPolicy::TriggerFlush);
        h.start();
        h.receive(&[1, 2, 3, 4, 5]);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![
                Call::Begin(0x18),
                Call::Read(vec![1, 2, 3]),
                Call::Read(vec![4, 5]),
                Call::End
            ]
        );
        assert_eq!(h.slave.stats().overflows, 1);
    }

    #[test]
    fn trigger_flush_exactly_full_flushes_once() {
        let mut h = Harness::<3>::new(OverflowPolicy::TriggerFlush);
        h.start();
        h.receive(&[1, 2, 3]);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![Call::Begin(0x18), Call::Read(vec![1, 2, 3]), Call::End]
        );
    }

    #[test]
    fn ignore_drops_excess() {
        let mut h = Harness::<4>::new(OverflowPolicy::Ignore);
        h.start();
        h.receive(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(h.slave.index(), 4);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![Call::Begin(0x18), Call::Read(vec![1, 2, 3, 4]), Call::End]
        );
        assert_eq!(h.slave.stats().overflows, 2);
        // Every byte still has to be taken out of the data register.
        assert_eq!(h.bus.reads, 7);
    }

    #[test]
    fn overwrite_restarts_silently() {
        let mut h = Harness::<4>::new(OverflowPolicy::Overwrite);
        h.start();
        h.receive(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(h.slave.index(), 2);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![Call::Begin(0x18), Call::Read(vec![5, 6]), Call::End]
        );
    }

    #[test]
    fn hardware_flagged_bytes_are_discarded() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.start();
        h.receive(&[1]);
        h.bus.incoming = 0x55;
        h.event(Event::DataByte {
            direction: Direction::MasterWrites,
            overflow: true,
            collision: false,
        });
        h.event(Event::DataByte {
            direction: Direction::MasterWrites,
            overflow: false,
            collision: true,
        });
        assert_eq!(h.slave.index(), 1);
        h.receive(&[2]);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![Call::Begin(0x18), Call::Read(vec![1, 2]), Call::End]
        );
        assert_eq!(h.bus.clears, 2);
        assert_eq!(h.slave.stats().discarded, 2);
    }

    #[test]
    fn read_transaction_primes_once() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.app.payload = vec![0x60, 0x61, 0x62, 0x63];
        h.start();
        h.transmit(3);
        assert_eq!(h.slave.direction(), Some(Direction::MasterReads));
        h.stop();

        assert_eq!(h.app.calls, vec![Call::Begin(0x18), Call::Write, Call::End]);
        assert_eq!(h.bus.sent, vec![0x60, 0x61, 0x62]);
    }

    #[test]
    fn flagged_transmit_bytes_are_counted_and_still_sent() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.app.payload = vec![0x70, 0x71, 0x72, 0x73];
        h.start();
        h.event(Event::DataByte {
            direction: Direction::MasterReads,
            overflow: true,
            collision: false,
        });
        h.event(Event::DataByte {
            direction: Direction::MasterReads,
            overflow: false,
            collision: true,
        });
        h.transmit(1);
        h.stop();

        assert_eq!(h.bus.clears, 2);
        assert_eq!(h.slave.stats().discarded, 2);
        assert_eq!(h.slave.stats().collisions, 0);
        assert_eq!(h.bus.sent, vec![0x70, 0x71, 0x72]);
        assert_eq!(h.slave.index(), 3);
        assert_eq!(
            h.app.calls.iter().filter(|c| **c == Call::Write).count(),
            1
        );
        assert_eq!(h.app.calls, vec![Call::Begin(0x18), Call::Write, Call::End]);
        assert_eq!(h.bus.releases, 5);
    }

    #[test]
    fn overread_sends_filler_and_keeps_index_bounded() {
        let mut h = Harness::<2>::new(OverflowPolicy::TriggerFlush);
        h.app.payload = vec![1, 2];
        h.start();
        h.transmit(5);
        h.stop();

        assert_eq!(h.bus.sent, vec![1, 2, 0xFF, 0xFF, 0xFF]);
        assert_eq!(h.slave.index(), 2);
        assert_eq!(h.slave.stats().overreads, 3);
        assert_eq!(
            h.app.calls.iter().filter(|c| **c == Call::Write).count(),
            1
        );
    }

    #[test]
    fn collision_abandons_transaction() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.start();
        h.receive(&[1, 2]);
        h.event(Event::Collision);
        assert_eq!(h.slave.state(), State::Aborted);
        assert_eq!(h.slave.index(), 2);

        h.receive(&[3]);
        h.transmit(1);
        h.stop();
        assert_eq!(h.slave.state(), State::Idle);
        assert_eq!(h.app.calls, vec![Call::Begin(0x18)]);
        assert_eq!(h.bus.sent, vec![0xFF]);

        h.start();
        assert_eq!(h.slave.index(), 0);
        h.receive(&[9]);
        h.stop();
        assert_eq!(
            h.app.calls,
            vec![
                Call::Begin(0x18),
                Call::Begin(0x18),
                Call::Read(vec![9]),
                Call::End
            ]
        );
        assert_eq!(h.slave.stats().collisions, 1);
    }

    #[test]
    fn collision_releases_clock_once() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.event(Event::Collision);
        assert_eq!(h.bus.releases, 1);
        assert_eq!(h.bus.reads, 1);
        assert_eq!(h.bus.clears, 1);
        assert_eq!(h.slave.state(), State::Idle);
    }

    #[test]
    fn address_only_transaction_calls_begin_and_end() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.start();
        h.stop();
        assert_eq!(h.app.calls, vec![Call::Begin(0x18), Call::End]);
    }

    #[test]
    fn repeated_start_flushes_pending_bytes() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.app.payload = vec![0xAB];
        h.start();
        h.receive(&[0xF7]);
        h.start();
        h.transmit(1);
        h.stop();

        assert_eq!(
            h.app.calls,
            vec![
                Call::Begin(0x18),
                Call::Read(vec![0xF7]),
                Call::Begin(0x18),
                Call::Write,
                Call::End
            ]
        );
        assert_eq!(h.bus.sent, vec![0xAB]);
        assert_eq!(h.slave.stats().transactions, 2);
        assert_eq!(h.slave.stats().completed, 1);
    }

    #[test]
    fn events_outside_transaction_invoke_nothing() {
        let mut h = Harness::<4>::new(OverflowPolicy::TriggerFlush);
        h.receive(&[1]);
        h.transmit(1);
        h.stop();
        assert!(h.app.calls.is_empty());
        assert_eq!(h.slave.state(), State::Idle);
        assert_eq!(h.bus.releases, 3);
    }
}
