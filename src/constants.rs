//! Datasheet constants.
//!
//! Frequencies are `[11.21]` fixed point MHz unless noted; crystal
//! frequencies are `[8.24]`.

/// Default two wire bus address of both chips.
pub const DEFAULT_ADDRESS: u8 = 0x55;

// ---------------------------------------------------------------------
// Si570
// ---------------------------------------------------------------------

/// Si570 factory crystal frequency, 114.285 MHz `[8.24]`.
pub const SI570_XTAL: u32 = 0x7248_F5C2;

/// Minimal rated output frequency, 10.0 MHz.
pub const SI570_FREQ_MIN: u32 = 0x0140_0000;

/// Maximal output frequency of a grade A part, 1417.5 MHz.
pub const SI570_FREQ_MAX_A: u32 = 0xB130_0000;

/// Maximal output frequency of a grade B part, 810.0 MHz.
pub const SI570_FREQ_MAX_B: u32 = 0x6540_0000;

/// Maximal output frequency of a grade C part, 280.0 MHz.
pub const SI570_FREQ_MAX_C: u32 = 0x2300_0000;

/// DCO range in whole MHz.
pub const SI570_DCO_MIN: u16 = 4850;
pub const SI570_DCO_MAX: u16 = 5670;

/// Startup frequency of the SoftRock V9, 28.2 MHz (7.050 MHz dial, the
/// oscillator runs at four times the dial frequency).
pub const SI570_STARTUP_FREQ: u32 = 0x0386_6666;

/// Default smooth tune window in ppm.
pub const SI570_SMOOTH_PPM: u16 = 3500;

/// RFREQ register bank of the 20/50 ppm parts.
pub const SI570_BANK_50PPM: u8 = 7;

/// RFREQ register bank of the 7 ppm parts.
pub const SI570_BANK_7PPM: u8 = 13;

/// Reset/freeze control register.
pub const SI570_REG_CONTROL: u8 = 135;

/// DCO freeze register.
pub const SI570_REG_FREEZE_DCO: u8 = 137;

/// Control register bits: recall NVM, freeze M, new frequency strobe
/// (self clearing).
pub const SI570_CTRL_RECALL: u8 = 0x01;
pub const SI570_CTRL_FREEZE_M: u8 = 1 << 5;
pub const SI570_CTRL_NEW_FREQ: u8 = 1 << 6;

/// Freeze DCO bit of register 137.
pub const SI570_FREEZE_DCO_BIT: u8 = 1 << 4;

/// Register image the 20/50 ppm parts present at bank 13 after a
/// recall; the 7 ppm parts answer with their live bank instead.
pub const SI570_SIGNATURE: [u8; 6] = [0x07, 0xC2, 0xC0, 0x00, 0x00, 0x00];

// ---------------------------------------------------------------------
// Si549
// ---------------------------------------------------------------------

/// Si549 factory crystal frequency, 152.6 MHz `[8.24]`.
pub const SI549_XTAL: u32 = 0x9899_9999;

/// Minimal rated output frequency, 0.2 MHz.
pub const SI549_FREQ_MIN: u32 = 0x0006_6666;

/// Maximal output frequency of a grade A part, 1500.0 MHz.
pub const SI549_FREQ_MAX_A: u32 = 0xBB80_0000;

/// Maximal output frequency of a grade B part, 800.0 MHz.
pub const SI549_FREQ_MAX_B: u32 = 0x6400_0000;

/// Maximal output frequency of a grade C part, 325.0 MHz.
pub const SI549_FREQ_MAX_C: u32 = 0x28A0_0000;

/// DCO range in whole MHz (12511 truncates 12511.886114).
pub const SI549_DCO_MIN: u16 = 10800;
pub const SI549_DCO_MAX: u16 = 12511;

/// Startup frequency, 100.0 MHz.
pub const SI549_STARTUP_FREQ: u32 = 0x0C80_0000;

/// Default smooth tune window in ppm.
pub const SI549_SMOOTH_PPM: u16 = 950;

/// Register numbers of the Si549 programming sequence.
pub const SI549_REG_FCAL_CTRL: u8 = 7;
pub const SI549_REG_OUTPUT_ENABLE: u8 = 17;
pub const SI549_REG_HSDIV: u8 = 23;
pub const SI549_REG_FBDIV: u8 = 26;
pub const SI549_REG_FCAL_OVERRIDE: u8 = 69;
pub const SI549_REG_ADPLL_DELTA: u8 = 231;
pub const SI549_REG_PAGE: u8 = 255;

/// Start frequency calibration bit of register 7.
pub const SI549_FCAL_START: u8 = 0x08;
