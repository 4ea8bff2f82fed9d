#![no_std]

//! [Si570]/[Si549] programmable oscillator driver.
//!
//! Computes the divider and fractional multiplier registers for a
//! requested `[11.21]` fixed point output frequency and programs them
//! over the two wire bus, using the cheap smooth tune path (RFREQ only
//! rewrite on the Si570, ADPLL delta on the Si549) whenever the step
//! from the last fully programmed frequency is small enough.
//!
//! [Si570]: https://www.silabs.com/documents/public/data-sheets/si570.pdf
//! [Si549]: https://www.silabs.com/documents/public/data-sheets/si549-datasheet.pdf

pub mod arith;
pub mod config;
pub mod constants;
pub mod errors;
pub mod register;
pub mod si549;
pub mod si570;

use embedded_hal::blocking::delay::DelayUs;

use crate::config::Frequency;
use crate::errors::Error;

/// Common surface of the two synthesizer families. One device type is
/// chosen per board at startup; nothing is dispatched per call.
pub trait Synthesizer {
    /// Size of the chip's register image in bytes.
    const REGISTER_BYTES: usize;

    /// Applies the band plan to `freq`, switches the band filter and
    /// programs the chip.
    ///
    /// A rejected update (frequency range, divider search, DCO limit)
    /// leaves the previously programmed frequency and the smooth tune
    /// center untouched.
    fn set_frequency(&mut self, freq: Frequency) -> Result<(), Error>;

    /// Samples the bus clock line for chip presence. On the offline to
    /// online transition the last requested frequency is reprogrammed
    /// from scratch.
    fn poll<D: DelayUs<u16>>(&mut self, delay: &mut D) -> Result<(), Error>;

    /// Device presence as of the last [`poll`](Synthesizer::poll).
    fn is_offline(&self) -> bool;
}
