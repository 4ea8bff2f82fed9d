//! Bus level sequencing of the Si549 driver.

use embedded_hal_mock::delay::MockNoop;
use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
use embedded_hal_mock::pin::{
    Mock as PinMock, State as PinState, Transaction as PinTransaction,
};

use si5xx::config::{Config, Frequency};
use si5xx::errors::Error;
use si5xx::si549::Si549;
use si5xx::Synthesizer;

const ADDR: u8 = 0x55;

/// 100.0 MHz startup default: HSDIV 108, LSDIV 0, FBDIV 70.773.
const STARTUP: u32 = 0x0C80_0000;

fn large_change(divider: [u8; 2], fbdiv: [u8; 6]) -> Vec<I2cTransaction> {
    vec![
        I2cTransaction::write(ADDR, vec![255, 0x00]),
        I2cTransaction::write(ADDR, vec![69, 0x00]),
        I2cTransaction::write(ADDR, vec![17, 0x00]),
        I2cTransaction::write(ADDR, vec![23, divider[0], divider[1]]),
        I2cTransaction::write(
            ADDR,
            vec![26, fbdiv[0], fbdiv[1], fbdiv[2], fbdiv[3], fbdiv[4], fbdiv[5]],
        ),
        I2cTransaction::write(ADDR, vec![7, 0x08]),
        I2cTransaction::write(ADDR, vec![17, 0x01]),
    ]
}

fn startup_large_change() -> Vec<I2cTransaction> {
    large_change([0x6C, 0x00], [0xEE, 0x97, 0xF4, 0xC5, 0x46, 0x00])
}

#[test]
fn online_transition_programs_the_startup_frequency() {
    let expectations = startup_large_change();

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[PinTransaction::get(PinState::High)]);
    let mut i2c_handle = i2c.clone();
    let mut clk_handle = clk.clone();

    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    assert!(vfo.is_offline());

    vfo.poll(&mut MockNoop::new()).unwrap();
    assert!(!vfo.is_offline());

    i2c_handle.done();
    clk_handle.done();
}

#[test]
fn smooth_tune_writes_only_the_delta_registers() {
    let mut expectations = startup_large_change();
    // +0.0906 MHz is 905 ppm of 100 MHz, inside the 950 ppm window
    expectations.push(I2cTransaction::write(ADDR, vec![231, 0xC5, 0xC3, 0x76]));

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[]);
    let mut i2c_handle = i2c.clone();

    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    vfo.set_frequency(Frequency::from_bits(STARTUP)).unwrap();
    vfo.set_frequency(Frequency::from_bits(STARTUP + 190_000)).unwrap();

    i2c_handle.done();
}

#[test]
fn a_stale_delta_is_cleared_after_a_large_change() {
    let mut expectations = startup_large_change();
    expectations.push(I2cTransaction::write(ADDR, vec![231, 0xC5, 0xC3, 0x76]));
    // 104.0 MHz: full sequence, then the left over delta is flushed
    expectations.extend(large_change(
        [0x68, 0x00],
        [0xEF, 0xFE, 0xCB, 0xE0, 0x46, 0x00],
    ));
    expectations.push(I2cTransaction::write(ADDR, vec![231, 0x00, 0x00, 0x00]));

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[]);
    let mut i2c_handle = i2c.clone();

    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    vfo.set_frequency(Frequency::from_bits(STARTUP)).unwrap();
    vfo.set_frequency(Frequency::from_bits(STARTUP + 190_000)).unwrap();
    vfo.set_frequency(Frequency::from_bits(0x0D00_0000)).unwrap();

    i2c_handle.done();
}

#[test]
fn consecutive_large_changes_skip_the_delta_flush() {
    let mut expectations = startup_large_change();
    expectations.extend(large_change(
        [0x68, 0x00],
        [0xEF, 0xFE, 0xCB, 0xE0, 0x46, 0x00],
    ));

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[]);
    let mut i2c_handle = i2c.clone();

    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    vfo.set_frequency(Frequency::from_bits(STARTUP)).unwrap();
    vfo.set_frequency(Frequency::from_bits(0x0D00_0000)).unwrap();

    i2c_handle.done();
}

#[test]
fn out_of_range_requests_produce_no_bus_traffic() {
    let i2c = I2cMock::new(&[]);
    let clk = PinMock::new(&[]);
    let mut i2c_handle = i2c.clone();

    // grade A tops out at 1500 MHz
    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    assert_eq!(
        vfo.set_frequency(Frequency::from_bits(1600 << 21)),
        Err(Error::FrequencyOutOfRange)
    );
    // and nothing below 0.2 MHz is programmable either
    assert_eq!(
        vfo.set_frequency(Frequency::from_bits(0x0003_3333)),
        Err(Error::FrequencyOutOfRange)
    );

    i2c_handle.done();
}

#[test]
fn coming_back_online_forces_a_full_recompute() {
    let mut expectations = startup_large_change();
    expectations.extend(startup_large_change());

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[
        PinTransaction::get(PinState::High),
        PinTransaction::get(PinState::Low),
        PinTransaction::get(PinState::High),
    ]);
    let mut i2c_handle = i2c.clone();
    let mut clk_handle = clk.clone();

    let mut delay = MockNoop::new();
    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());

    vfo.poll(&mut delay).unwrap();
    vfo.poll(&mut delay).unwrap();
    assert!(vfo.is_offline());
    vfo.poll(&mut delay).unwrap();
    assert!(!vfo.is_offline());

    i2c_handle.done();
    clk_handle.done();
}

#[test]
fn register_read_back() {
    let expectations = [
        I2cTransaction::write_read(ADDR, vec![23], vec![0x6C, 0x00]),
        I2cTransaction::write_read(
            ADDR,
            vec![26],
            vec![0xEE, 0x97, 0xF4, 0xC5, 0x46, 0x00],
        ),
        I2cTransaction::write_read(ADDR, vec![231], vec![0x00, 0x00, 0x00]),
    ];

    let i2c = I2cMock::new(&expectations);
    let clk = PinMock::new(&[]);
    let mut i2c_handle = i2c.clone();

    let mut vfo = Si549::new(i2c, clk, (), Config::si549_defaults());
    assert_eq!(
        vfo.read_registers().unwrap(),
        [0x6C, 0x00, 0xEE, 0x97, 0xF4, 0xC5, 0x46, 0x00, 0x00, 0x00, 0x00]
    );

    i2c_handle.done();
}
