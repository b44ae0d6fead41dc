//! Software serial bus on two GPIO lines
//!
//! SPI mode 0, MSB first: data is set while the clock is low and sampled by
//! the panel on the rising edge. The clock idles low between bytes. The panel
//! has no data output on this wiring, so reads clock out zeros and return
//! zeros.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{self, ErrorKind, ErrorType, SpiBus};

/// Pin fault while bit-banging
#[derive(Debug)]
pub struct BitBangError<E>(pub E);

impl<E: Debug> spi::Error for BitBangError<E> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Bit-banged [`SpiBus`] over a data line and a clock line
pub struct BitBangBus<MOSI, SCLK, D> {
    mosi: MOSI,
    sclk: SCLK,
    delay: D,
    half_period_ns: u32,
}

impl<MOSI, SCLK, D, PinErr> BitBangBus<MOSI, SCLK, D>
where
    MOSI: OutputPin<Error = PinErr>,
    SCLK: OutputPin<Error = PinErr>,
    D: DelayNs,
{
    /// Create a bus; each clock phase lasts `half_period_ns`
    pub fn new(mosi: MOSI, sclk: SCLK, delay: D, half_period_ns: u32) -> Self {
        Self {
            mosi,
            sclk,
            delay,
            half_period_ns,
        }
    }

    /// Give the data and clock lines back
    pub fn into_parts(self) -> (MOSI, SCLK) {
        (self.mosi, self.sclk)
    }

    fn shift_out(&mut self, byte: u8) -> Result<(), BitBangError<PinErr>> {
        for bit in (0..8).rev() {
            self.sclk.set_low().map_err(BitBangError)?;
            if (byte >> bit) & 1 == 1 {
                self.mosi.set_high().map_err(BitBangError)?;
            } else {
                self.mosi.set_low().map_err(BitBangError)?;
            }
            self.delay.delay_ns(self.half_period_ns);
            self.sclk.set_high().map_err(BitBangError)?;
            self.delay.delay_ns(self.half_period_ns);
        }
        self.sclk.set_low().map_err(BitBangError)
    }
}

impl<MOSI, SCLK, D, PinErr> ErrorType for BitBangBus<MOSI, SCLK, D>
where
    MOSI: OutputPin<Error = PinErr>,
    SCLK: OutputPin<Error = PinErr>,
    PinErr: Debug,
{
    type Error = BitBangError<PinErr>;
}

impl<MOSI, SCLK, D, PinErr> SpiBus<u8> for BitBangBus<MOSI, SCLK, D>
where
    MOSI: OutputPin<Error = PinErr>,
    SCLK: OutputPin<Error = PinErr>,
    D: DelayNs,
    PinErr: Debug,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            self.shift_out(0)?;
            *word = 0;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.shift_out(word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        for i in 0..len {
            self.shift_out(write.get(i).copied().unwrap_or(0))?;
            if let Some(word) = read.get_mut(i) {
                *word = 0;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            self.shift_out(*word)?;
            *word = 0;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    /// Expected pin activity for one byte
    fn byte_transactions(byte: u8) -> (Vec<PinTransaction>, Vec<PinTransaction>) {
        let mut mosi = Vec::new();
        let mut sclk = Vec::new();
        for bit in (0..8).rev() {
            sclk.push(PinTransaction::set(PinState::Low));
            let state = if (byte >> bit) & 1 == 1 {
                PinState::High
            } else {
                PinState::Low
            };
            mosi.push(PinTransaction::set(state));
            sclk.push(PinTransaction::set(PinState::High));
        }
        sclk.push(PinTransaction::set(PinState::Low));
        (mosi, sclk)
    }

    struct CountingDelay {
        calls: u32,
        total_ns: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls += 1;
            self.total_ns += u64::from(ns);
        }
    }

    #[test]
    fn test_write_shifts_msb_first() {
        let mut mosi_expect = Vec::new();
        let mut sclk_expect = Vec::new();
        for byte in [0xA5u8, 0x10] {
            let (m, s) = byte_transactions(byte);
            mosi_expect.extend(m);
            sclk_expect.extend(s);
        }
        let mut mosi = PinMock::new(&mosi_expect);
        let mut sclk = PinMock::new(&sclk_expect);

        let mut bus = BitBangBus::new(mosi.clone(), sclk.clone(), NoopDelay::new(), 500);
        bus.write(&[0xA5, 0x10]).unwrap();
        bus.flush().unwrap();

        mosi.done();
        sclk.done();
    }

    #[test]
    fn test_clock_timing() {
        let (m, s) = byte_transactions(0xFF);
        let mut mosi = PinMock::new(&m);
        let mut sclk = PinMock::new(&s);

        let delay = CountingDelay {
            calls: 0,
            total_ns: 0,
        };
        let mut bus = BitBangBus::new(mosi.clone(), sclk.clone(), delay, 250);
        bus.write(&[0xFF]).unwrap();

        // Two half periods per bit
        assert_eq!(bus.delay.calls, 16);
        assert_eq!(bus.delay.total_ns, 16 * 250);

        mosi.done();
        sclk.done();
    }

    #[test]
    fn test_read_clocks_zeros() {
        let (m, s) = byte_transactions(0x00);
        let mut mosi = PinMock::new(&m);
        let mut sclk = PinMock::new(&s);

        let mut bus = BitBangBus::new(mosi.clone(), sclk.clone(), NoopDelay::new(), 0);
        let mut buf = [0xEE];
        bus.read(&mut buf).unwrap();
        assert_eq!(buf, [0x00]);

        mosi.done();
        sclk.done();
    }
}
