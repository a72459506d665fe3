#![allow(dead_code)]

use std::collections::VecDeque;

use i2c_slave_engine::{
    handle, Address, Application, Config, Direction, Event, OverflowPolicy, SignalAdapter,
    SlaveInstance,
};

pub const ADDRESS: u8 = 0x18;

pub fn address() -> Address {
    Address::new(ADDRESS).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin(u8),
    Read(Vec<u8>),
    Write,
    End,
}

/// Application that records every callback and serves `payload` on write.
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
    pub payload: Vec<u8>,
}

impl Recorder {
    pub fn received(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Read(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.iter().filter(|c| *c == wanted).count()
    }

    pub fn count_reads(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Read(_)))
            .count()
    }
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

/// Adapter replaying a fixed list of `(event, data register)` pairs.
#[derive(Default)]
pub struct ScriptedBus {
    pub pending: VecDeque<(Event, u8)>,
    pub data: u8,
    pub sent: Vec<u8>,
    pub releases: usize,
}

impl ScriptedBus {
    pub fn push(&mut self, event: Event, data: u8) {
        self.pending.push_back((event, data));
    }
}

impl SignalAdapter for ScriptedBus {
    fn next_event(&mut self) -> Option<Event> {
        let (event, data) = self.pending.pop_front()?;
        self.data = data;
        Some(event)
    }

    fn read_data(&mut self) -> u8 {
        self.data
    }

    fn write_data(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn release_clock(&mut self) {
        self.releases += 1;
    }

    fn clear_errors(&mut self) {}
}

pub fn slave<const N: usize>(overflow: OverflowPolicy) -> SlaveInstance<N> {
    SlaveInstance::new(
        address(),
        Config {
            overflow,
            ..Config::default()
        },
    )
}

/// Drives `slave` through `AddressMatch`, one write per byte, `Stop`.
pub fn write_transaction<const N: usize>(
    slave: &mut SlaveInstance<N>,
    bytes: &[u8],
    app: &mut Recorder,
) {
    let mut bus = ScriptedBus::default();
    bus.push(Event::AddressMatch(slave.address()), slave.address().write());
    for &b in bytes {
        bus.push(Event::data(Direction::MasterWrites), b);
    }
    bus.push(Event::Stop, 0);
    drain(slave, &mut bus, app);
}

/// Drives `slave` through `AddressMatch`, `count` reads, `Stop`; returns the bytes sent.
pub fn read_transaction<const N: usize>(
    slave: &mut SlaveInstance<N>,
    count: usize,
    app: &mut Recorder,
) -> Vec<u8> {
    let mut bus = ScriptedBus::default();
    bus.push(Event::AddressMatch(slave.address()), slave.address().read());
    for _ in 0..count {
        bus.push(Event::data(Direction::MasterReads), 0);
    }
    bus.push(Event::Stop, 0);
    drain(slave, &mut bus, app);
    bus.sent
}

pub fn drain<const N: usize>(
    slave: &mut SlaveInstance<N>,
    bus: &mut ScriptedBus,
    app: &mut Recorder,
) {
    while let Some(event) = bus.next_event() {
        handle(slave, event, bus, app);
    }
}
