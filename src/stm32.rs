use core::marker::PhantomData;

use embassy_stm32::{
    gpio::{low_level::AFType, Pull},
    i2c::{self, SclPin, SdaPin},
    pac,
    time::Hertz,
    Peripheral,
};

use crate::{Address, Direction, Event, SignalAdapter};

/// [`SignalAdapter`] for the STM32 I2C v1 block (F1/F2/F4/L1).
///
/// On this peripheral the clock stays stretched until the data register is
/// accessed, so [`SignalAdapter::release_clock`] has nothing to do.
pub struct Stm32Adapter<'d, T: i2c::Instance> {
    address: Address,
    // Address byte latched at ADDR; the engine consumes it instead of DR.
    latched: Option<u8>,
    transmitting: bool,
    _marker: PhantomData<&'d mut T>,
}

impl<'d, T: i2c::Instance> Stm32Adapter<'d, T> {
    /// Configures the peripheral as a 7-bit slave answering to `address`, with
    /// event, buffer and error interrupts enabled. Unmasking the interrupts in
    /// the NVIC is left to the caller.
    pub fn new(
        _i2c: impl Peripheral<P = T> + 'd,
        scl: impl Peripheral<P = impl SclPin<T>> + 'd,
        sda: impl Peripheral<P = impl SdaPin<T>> + 'd,
        speed: Hertz,
        address: Address,
    ) -> Self {
        assert!(speed <= Hertz(100_000), "Fast-mode is not supported");
        let timing = StandardTiming::new(T::frequency(), speed);

        T::enable_and_reset();
        open_drain(scl, sda);

        let regs = T::regs();
        regs.cr1().modify(|w| w.set_pe(false));
        timing.apply(regs);
        listen_on(regs, address);
        regs.cr1().modify(|w| {
            // No general call: only our own address raises events.
            w.set_engc(false);
            w.set_ack(true);
            w.set_pe(true);
        });

        debug!("i2c: stm32 slave listening on {=u8:#x}", address.get());

        Self {
            address,
            latched: None,
            transmitting: false,
            _marker: PhantomData,
        }
    }

    fn set_buffer_interrupt(enabled: bool) {
        T::regs().cr2().modify(|w| w.set_itbufen(enabled));
    }
}

impl<'d, T: i2c::Instance> SignalAdapter for Stm32Adapter<'d, T> {
    fn next_event(&mut self) -> Option<Event> {
        let regs = T::regs();
        let sr1 = regs.sr1().read();

        if sr1.arlo() || sr1.berr() {
            regs.sr1().modify(|w| {
                w.set_arlo(false);
                w.set_berr(false);
            });
            self.transmitting = false;
            return Some(Event::Collision);
        }

        if sr1.af() {
            // The master NACKs the last byte it reads; no STOPF follows in
            // slave transmitter mode.
            regs.sr1().modify(|w| w.set_af(false));
            self.transmitting = false;
            Self::set_buffer_interrupt(false);
            return Some(Event::Stop);
        }

        if sr1.addr() {
            // SR1 then SR2 clears ADDR.
            let sr2 = regs.sr2().read();
            self.transmitting = sr2.tra();
            self.latched = Some(if self.transmitting {
                self.address.read()
            } else {
                self.address.write()
            });
            Self::set_buffer_interrupt(true);
            return Some(Event::AddressMatch(self.address));
        }

        if sr1.rxne() {
            return Some(Event::DataByte {
                direction: Direction::MasterWrites,
                overflow: sr1.ovr(),
                collision: false,
            });
        }

        if sr1.txe() && self.transmitting {
            return Some(Event::DataByte {
                direction: Direction::MasterReads,
                overflow: false,
                collision: sr1.ovr(),
            });
        }

        if sr1.stopf() {
            // STOPF clears on SR1 read followed by a CR1 write.
            regs.cr1().modify(|w| w.set_pe(true));
            self.transmitting = false;
            return Some(Event::Stop);
        }

        None
    }

    fn read_data(&mut self) -> u8 {
        match self.latched.take() {
            Some(byte) => byte,
            None => T::regs().dr().read().dr(),
        }
    }

    fn write_data(&mut self, byte: u8) {
        T::regs().dr().write(|w| w.set_dr(byte));
    }

    fn release_clock(&mut self) {}

    fn clear_errors(&mut self) {
        T::regs().sr1().modify(|w| {
            w.set_ovr(false);
            w.set_arlo(false);
            w.set_berr(false);
        });
    }
}

fn open_drain<'d, T: i2c::Instance>(
    scl: impl Peripheral<P = impl SclPin<T>> + 'd,
    sda: impl Peripheral<P = impl SdaPin<T>> + 'd,
) {
    let scl = scl.into_ref();
    let sda = sda.into_ref();

    scl.set_as_af_pull(scl.af_num(), AFType::OutputOpenDrain, Pull::None);
    sda.set_as_af_pull(sda.af_num(), AFType::OutputOpenDrain, Pull::None);
}

fn listen_on(regs: pac::i2c::I2c, address: Address) {
    regs.oar1().modify(|w| {
        w.set_addmode(pac::i2c::vals::Addmode::BIT7);
        w.set_add(address.write() as u16);
    });

    regs.cr2().modify(|w| {
        w.set_itbufen(true);
        w.set_itevten(true);
        w.set_iterren(true);
    });
}

/// Standard-mode clock settings derived from the peripheral clock.
struct StandardTiming {
    /// Peripheral clock in MHz, as CR2.FREQ wants it.
    freq_mhz: u8,
    ccr: u16,
}

impl StandardTiming {
    fn new(pclk: Hertz, speed: Hertz) -> Self {
        let freq_mhz = (pclk.0 / 1_000_000) as u8;
        assert!(
            freq_mhz >= 2,
            "Bus frequency in Standard Mode must be at least 2MHz"
        );

        Self {
            freq_mhz,
            // Thigh = Tlow = CCR * Tpclk in standard mode.
            ccr: (pclk.0 / speed.0 / 2) as u16,
        }
    }

    fn apply(&self, regs: pac::i2c::I2c) {
        regs.cr2().modify(|w| w.set_freq(self.freq_mhz));
        // 1000 ns maximum rise time.
        regs.trise().modify(|w| w.set_trise(self.freq_mhz + 1));
        regs.ccr().modify(|w| {
            w.set_ccr(self.ccr);
            w.set_duty(pac::i2c::vals::Duty::DUTY2_1);
            w.set_f_s(pac::i2c::vals::FS::STANDARD);
        });
    }
}
