#![no_main]
#![no_std]
#![feature(type_alias_impl_trait)]

use core::cell::RefCell;

use cortex_m::peripheral::NVIC;
use critical_section::Mutex;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32::{interrupt, peripherals::I2C1, time::Hertz};
use embassy_time::{Duration, Timer};
use i2c_slave_engine::{
    Address, Application, Config, OverflowPolicy, OverreadPolicy, Registry, SlaveInstance,
    Stm32Adapter, Unit, UnitId,
};
use panic_probe as _;

const I2C1_UNIT: UnitId = UnitId(1);
const BUFFER_SIZE: usize = 32;

const REG_CHIP_ID: u8 = 0xD0;
const CHIP_ID: u8 = 0x60;

/// 256 byte-wide registers behind an auto-incrementing pointer. The first byte
/// of a write selects the pointer, the rest is stored from there on. Reads
/// start at the pointer.
struct RegisterFile {
    regs: [u8; 256],
    pointer: u8,
    expect_pointer: bool,
}

impl RegisterFile {
    const fn new() -> Self {
        let mut regs = [0u8; 256];
        regs[REG_CHIP_ID as usize] = CHIP_ID;
        Self {
            regs,
            pointer: 0,
            expect_pointer: false,
        }
    }
}

impl Application for RegisterFile {
    fn begin(&mut self, _address: Address) {
        self.expect_pointer = true;
    }

    fn read(&mut self, data: &[u8]) {
        let mut data = data.iter().copied();

        if self.expect_pointer {
            if let Some(pointer) = data.next() {
                self.pointer = pointer;
                self.expect_pointer = false;
            }
        }

        for byte in data {
            if self.pointer != REG_CHIP_ID {
                self.regs[self.pointer as usize] = byte;
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn write(&mut self, buffer: &mut [u8]) {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.regs[self.pointer.wrapping_add(i as u8) as usize];
        }
    }
}

type I2c1Unit = Unit<Stm32Adapter<'static, I2C1>, RegisterFile, BUFFER_SIZE>;

static I2C1_SLAVE: I2c1Unit = Unit::new();
static REGISTRY: Mutex<RefCell<Registry<'static, 1>>> = Mutex::new(RefCell::new(Registry::new()));

fn dispatch(id: UnitId) {
    critical_section::with(|cs| {
        if let Err(err) = REGISTRY.borrow_ref(cs).dispatch(id) {
            defmt::error!("Dispatch failed: {}", err);
        }
    });
}

#[interrupt]
#[allow(non_snake_case)]
fn I2C1_EV() {
    dispatch(I2C1_UNIT);
}

#[interrupt]
#[allow(non_snake_case)]
fn I2C1_ER() {
    dispatch(I2C1_UNIT);
}

#[embassy_executor::main]
async fn main_task(_spawner: Spawner) {
    defmt::info!("Start!");

    let peripherals = embassy_stm32::init(Default::default());

    let address = Address::new(0x76).unwrap();
    let adapter = Stm32Adapter::new(
        peripherals.I2C1,
        peripherals.PB6,
        peripherals.PB7,
        Hertz(100_000),
        address,
    );
    let slave = SlaveInstance::new(
        address,
        Config {
            overflow: OverflowPolicy::TriggerFlush,
            overread: OverreadPolicy::Wrap,
        },
    );
    I2C1_SLAVE.attach(slave, adapter, RegisterFile::new());

    critical_section::with(|cs| {
        REGISTRY
            .borrow_ref_mut(cs)
            .register(I2C1_UNIT, &I2C1_SLAVE)
            .unwrap()
    });

    unsafe {
        NVIC::unmask(interrupt::I2C1_ER);
        NVIC::unmask(interrupt::I2C1_EV);
    }

    loop {
        Timer::after(Duration::from_secs(1)).await;

        let dump = I2C1_SLAVE.dump_state();
        defmt::info!("State: {}", dump);

        let pointer = I2C1_SLAVE.with_app(|regs| regs.pointer);
        defmt::info!("Register pointer: {}", pointer);
    }
}
