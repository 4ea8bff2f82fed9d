//! Driver errors.

/// Errors reported by the synthesizer drivers.
///
/// Every variant is local to a single update; the driver keeps serving
/// requests with whatever state resulted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A two wire bus transfer failed. The remainder of the current
    /// register write sequence is abandoned, without retry or rollback.
    Bus,
    /// The requested frequency is outside the chip's rated output range.
    FrequencyOutOfRange,
    /// No divider combination satisfies the chip grade restrictions.
    NoValidDivider,
    /// The computed DCO frequency exceeds the chip maximum.
    DcoOutOfRange,
}
