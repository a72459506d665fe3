#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod address;
mod buffer;
mod engine;
mod registry;
mod slave;
mod state_holder;
#[cfg(feature = "stm32")]
mod stm32;
mod unit;

pub use address::{Address, AddressError};
pub use engine::{handle, Application, SignalAdapter};
pub use registry::{Registry, RegistryError, Service, UnitId};
pub use slave::{SlaveInstance, Stats};
#[cfg(feature = "stm32")]
pub use stm32::Stm32Adapter;
pub use unit::{Unit, MAX_EVENTS_PER_ENTRY};

#[cfg(feature = "dump")]
pub use unit::StateDump;

/// Transaction phase of a slave instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Idle,
    /// Address matched, no data byte seen yet.
    Addressed,
    Receiving,
    Transmitting,
    /// A bus collision abandoned the transaction; waiting for the next stop or start.
    Aborted,
}

/// Direction of a data byte, seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master writes, slave receives.
    MasterWrites,
    /// Master reads, slave transmits.
    MasterReads,
}

/// One classified hardware signal, as produced by a [`SignalAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Bus collision detected while the slave was driving the data line.
    Collision,
    /// Start condition followed by an address the hardware already matched.
    AddressMatch(Address),
    /// A data byte boundary. `overflow` and `collision` report hardware receive
    /// overflow and write collision coincident with this byte.
    DataByte {
        direction: Direction,
        overflow: bool,
        collision: bool,
    },
    /// Stop condition.
    Stop,
}

impl Event {
    /// A data byte with no hardware error flags set.
    pub const fn data(direction: Direction) -> Self {
        Event::DataByte {
            direction,
            overflow: false,
            collision: false,
        }
    }
}

/// What to do with a received byte when the buffer is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Hand the full buffer to [`Application::read`], then start over at index 0.
    #[default]
    TriggerFlush,
    /// Drop every byte that does not fit.
    Ignore,
    /// Start over at index 0 without telling the application.
    Overwrite,
}

/// What to transmit when the master keeps reading past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverreadPolicy {
    /// Send a fixed byte.
    Filler(u8),
    /// Keep sending the last byte of the buffer.
    RepeatLast,
    /// Continue from the start of the buffer. [`Application::write`] is not called again.
    Wrap,
}

impl Default for OverreadPolicy {
    fn default() -> Self {
        // Released SDA reads as 0xFF on the wire.
        OverreadPolicy::Filler(0xFF)
    }
}

/// Construction-time configuration of a [`SlaveInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub overflow: OverflowPolicy,
    pub overread: OverreadPolicy,
}

/// Recoverable conditions. None of them reach the application; they are
/// logged and counted in [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    BusCollision,
    ReceiveOverflow,
    WriteCollision,
    BufferOverflow(OverflowPolicy),
    TransmitOverread,
}
