//! Si549 register calculation and programming.
//!
//! The digital PLL takes a divider pair plus a 43 bit feedback divider
//! for a full retune, and a signed 24 bit ADPLL frequency delta for
//! small steps, which it applies without disturbing the output.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use embedded_hal::digital::v2::InputPin;

use crate::arith::{wide_div, wide_mul};
use crate::config::{BandFilter, ChipGrade, Config, ConfigFlags, Frequency};
use crate::constants::*;
use crate::errors::Error;
use crate::register::Si549Registers;
use crate::Synthesizer;

/// 1_000_000 / 2^6, the ppm scale folded into 16 bits.
const PPM_SCALE: u16 = 15_625;

/// ADPLL delta steps per ppm times four: 4 / 0.0001164 ppm per register
/// LSB, kept as an integer in `[14.2]`.
const DELTA_STEPS_Q2: u16 = 34_364;

// Bit length, clamped to the 2^5 maximum of the low speed divider.
fn log2(mut n: u16) -> u8 {
    let mut i = 0;
    while n != 0 {
        n >>= 1;
        i += 1;
    }
    if i > 5 {
        5
    } else {
        i
    }
}

/// Output divider pair `(HSDIV, LSDIV)` keeping the DCO above its
/// minimum.
///
/// The total divider is the ceiling of `dco_min / freq`; the low speed
/// divider takes the power of two that brings the high speed value into
/// its 11 bit range. With no low speed division, high speed values from
/// 34 up must be even. `freq` must be at least the chip minimum of
/// 0.2 MHz.
pub fn dividers(freq: Frequency, dco_min: u16) -> (u16, u8) {
    // [16.16] / [11.5] => [5.11]
    let dco = (u32::from(dco_min) << 16) / u32::from(freq.coarse());

    let mut div = (dco >> 11) as u16;
    if dco & 0x07FF != 0 {
        div += 1; // ceiling
    }

    let lsdiv = log2(div / 2046);
    let mut hsdiv = div >> lsdiv;
    if lsdiv == 0 && hsdiv >= 34 && hsdiv & 1 == 1 {
        hsdiv += 1;
    }

    (hsdiv, lsdiv)
}

/// Feedback divider `VCO / xtal` as `[14.32]` fixed point, 43
/// significant bits.
pub fn fbdiv(freq: Frequency, total_divider: u16, xtal: u32) -> u64 {
    // [27.21](48) = [11.21] * [16.0]
    let vco = wide_mul(freq.bits(), total_divider);
    // [25.21](46) / [8.24](32), 3 + 32 shift => [14.32](46)
    wide_div(vco, xtal, 3 + 32)
}

/// ADPLL delta register bytes for a small frequency step, or `None`
/// when the step needs the full divider sequence.
///
/// The step must stay below 2 MHz and strictly below the ppm limit.
/// The delta is `|Δf| * 15625 / nominal` (a `[10.14]` ppm value)
/// rescaled by [`DELTA_STEPS_Q2`], with the sign restored on the packed
/// 24 bit value.
pub fn adpll_delta(freq: Frequency, nominal: Frequency, ppm_limit: u16) -> Option<[u8; 3]> {
    if nominal.bits() == 0 {
        // center unknown, force the full sequence
        return None;
    }

    // [11.21] - [11.21], sign carried in bit 63
    let delta = u64::from(freq.bits()).wrapping_sub(u64::from(nominal.bits()));
    let negative = delta >> 63 != 0;
    let delta = if negative { delta.wrapping_neg() } else { delta };

    // Anything from 2 MHz up is out; the survivors fit [1.21].
    if (delta >> 16) as u16 & 0xFFC0 != 0 {
        return None;
    }

    // [15.21](36) = [1.21] * [14.0]
    let scaled = wide_mul(delta as u32, PPM_SCALE);
    // [15.21](36) / [11.21], 6 + 14 shift => [10.14](24)
    let ppm = wide_div(scaled, nominal.bits(), 6 + 14);

    if ppm >> 14 >= u64::from(ppm_limit) {
        return None;
    }

    // [24.16](40) = [10.14](24) * [14.2]
    let steps = wide_mul(ppm as u32, DELTA_STEPS_Q2);
    let steps = if negative { steps.wrapping_neg() } else { steps };

    // drop the 16 fractional bits, keep 24
    Some([(steps >> 16) as u8, (steps >> 24) as u8, (steps >> 32) as u8])
}

/// Si549 driver: owns the bus, the presence sense line and the band
/// filter collaborator.
pub struct Si549<I2C, CLK, FLT> {
    i2c: I2C,
    clk_sense: CLK,
    filter: FLT,
    config: Config,
    regs: Si549Registers,
    /// Center of the smooth tune window; 0 forces a full recompute.
    nominal: u32,
    /// Last requested frequency, replayed on the online transition.
    requested: Frequency,
    offline: bool,
    freq_min: u32,
    freq_max: u32,
}

impl<I2C, CLK, FLT, E> Si549<I2C, CLK, FLT>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    CLK: InputPin,
    FLT: BandFilter,
{
    /// Creates the driver. The chip counts as offline until
    /// [`poll`](Synthesizer::poll) has seen the bus clock line high.
    pub fn new(i2c: I2C, clk_sense: CLK, filter: FLT, config: Config) -> Self {
        let freq_max = match config.grade {
            ChipGrade::B => SI549_FREQ_MAX_B,
            ChipGrade::C => SI549_FREQ_MAX_C,
            _ => SI549_FREQ_MAX_A,
        };
        let requested = config.startup;

        Si549 {
            i2c,
            clk_sense,
            filter,
            config,
            regs: Si549Registers::default(),
            nominal: 0,
            requested,
            offline: true,
            freq_min: SI549_FREQ_MIN,
            freq_max,
        }
    }

    /// Reads the live register image: dividers, FBDIV and the ADPLL
    /// delta, 11 bytes.
    pub fn read_registers(&mut self) -> Result<[u8; 11], Error> {
        let addr = self.config.address;
        let mut buf = [0u8; 11];
        self.i2c
            .write_read(addr, &[SI549_REG_HSDIV], &mut buf[0..2])
            .map_err(|_| Error::Bus)?;
        self.i2c
            .write_read(addr, &[SI549_REG_FBDIV], &mut buf[2..8])
            .map_err(|_| Error::Bus)?;
        self.i2c
            .write_read(addr, &[SI549_REG_ADPLL_DELTA], &mut buf[8..11])
            .map_err(|_| Error::Bus)?;
        Ok(buf)
    }

    fn command(&mut self, register: u8, value: u8) -> Result<(), Error> {
        self.i2c
            .write(self.config.address, &[register, value])
            .map_err(|_| Error::Bus)
    }

    fn write_delta(&mut self) -> Result<(), Error> {
        let d = *self.regs.delta_bytes();
        self.i2c
            .write(self.config.address, &[SI549_REG_ADPLL_DELTA, d[0], d[1], d[2]])
            .map_err(|_| Error::Bus)
    }

    fn write_large_change(&mut self) -> Result<(), Error> {
        self.command(SI549_REG_PAGE, 0x00)?;
        self.command(SI549_REG_FCAL_OVERRIDE, 0x00)?;
        // the output is gated synchronously around the divider update
        self.command(SI549_REG_OUTPUT_ENABLE, 0x00)?;

        let d = *self.regs.divider_bytes();
        self.i2c
            .write(self.config.address, &[SI549_REG_HSDIV, d[0], d[1]])
            .map_err(|_| Error::Bus)?;

        let f = *self.regs.fbdiv_bytes();
        self.i2c
            .write(
                self.config.address,
                &[SI549_REG_FBDIV, f[0], f[1], f[2], f[3], f[4], f[5]],
            )
            .map_err(|_| Error::Bus)?;

        self.command(SI549_REG_FCAL_CTRL, SI549_FCAL_START)?;
        self.command(SI549_REG_OUTPUT_ENABLE, 0x01)
    }

    fn update(&mut self, freq: Frequency) -> Result<(), Error> {
        let in_range = freq.bits() >= self.freq_min && freq.bits() <= self.freq_max;
        if self.config.grade != ChipGrade::D && !in_range {
            return Err(Error::FrequencyOutOfRange);
        }

        if self.config.smooth_tune_ppm != 0 {
            if let Some(delta) = adpll_delta(
                freq,
                Frequency::from_bits(self.nominal),
                self.config.smooth_tune_ppm,
            ) {
                self.regs.set_delta(delta);

                #[cfg(feature = "defmt")]
                defmt::trace!("si549 smooth tune to {=u32:x}", freq.bits());

                return self.write_delta();
            }
        }

        self.nominal = freq.bits();

        let (hsdiv, lsdiv) = dividers(freq, self.config.dco_min);
        self.regs.set_dividers(hsdiv, lsdiv);
        self.regs.set_fbdiv(fbdiv(freq, hsdiv << lsdiv, self.config.xtal));

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "si549 large change to {=u32:x}, hsdiv={=u16} lsdiv={=u8}",
            freq.bits(),
            hsdiv,
            lsdiv
        );

        self.write_large_change()?;

        // A left over smooth tune offset would detune the fresh setting.
        if !self.regs.delta_is_zero() {
            self.regs.clear_delta();
            self.write_delta()?;
        }

        Ok(())
    }
}

impl<I2C, CLK, FLT, E> Synthesizer for Si549<I2C, CLK, FLT>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    CLK: InputPin,
    FLT: BandFilter,
{
    const REGISTER_BYTES: usize = 11;

    fn set_frequency(&mut self, freq: Frequency) -> Result<(), Error> {
        self.requested = freq;

        let band = self.config.bands[self.config.band_index(freq)];
        if self.config.flags.contains(ConfigFlags::AUTO_BPF) {
            self.filter.select(band.filter);
        }

        self.update(band.apply(freq))
    }

    fn poll<D: DelayUs<u16>>(&mut self, _delay: &mut D) -> Result<(), Error> {
        if !self.clk_sense.is_high().map_err(|_| Error::Bus)? {
            self.offline = true;
            return Ok(());
        }

        if self.offline {
            self.nominal = 0; // no smooth tune across a power cycle

            match self.set_frequency(self.requested) {
                Ok(()) => self.offline = false,
                Err(Error::Bus) => {
                    self.offline = true;
                    return Err(Error::Bus);
                }
                Err(e) => {
                    self.offline = false;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn is_offline(&self) -> bool {
        self.offline
    }
}
