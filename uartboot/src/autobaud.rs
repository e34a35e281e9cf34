//! Baud rate detection from the host's training character.
//!
//! The host opens the session with `0x7f`: the start bit is followed by a run of seven 1-bits
//! and then a single 0-bit. Timing the run gives seven bit periods, from which the UART
//! divider is derived with the usual 16x oversampling.

use crate::packet::Uart;
use crate::{BootReason, BootResult, DEVICE_SIGN, OK};

const OVERSAMPLING: u32 = 16;
const RUN_BITS: u32 = 7;
const FRACTION_STEPS: u32 = 64;

/// Line and timer capabilities needed before the UART is running.
pub trait LinkHal: Uart {
    /// Current level of the receive line.
    fn rx_level(&self) -> bool;

    /// Restarts the reference for [`LinkHal::timeout_expired`].
    fn timeout_start(&mut self);

    /// Whether [`crate::AUTOBAUD_TIMEOUT_MS`] have passed since the last restart.
    fn timeout_expired(&self) -> bool;

    /// Starts the measurement timer. It must tick at the UART reference clock.
    fn ticks_start(&mut self);

    /// Ticks counted since [`LinkHal::ticks_start`], wrapping.
    fn ticks(&self) -> u32;

    fn ticks_stop(&mut self);

    /// Configures and enables the UART: given divider, 8 data bits, FIFOs on.
    fn uart_enable(&mut self, divisor: Divisor);
}

/// UART baud rate divider, split as the hardware wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divisor {
    pub integer: u32,
    /// In 1/64 units.
    pub fraction: u32,
}

impl Divisor {
    /// Derives the divider from the length of the seven-bit run in reference clock ticks.
    pub const fn from_run_ticks(ticks: u32) -> Self {
        let per = OVERSAMPLING * RUN_BITS;
        let integer = ticks / per;
        let fraction = ((ticks % per) * FRACTION_STEPS + per / 2) / per;
        Divisor { integer, fraction }
    }

    /// Baud rate the divider yields for the given reference clock.
    pub fn baud(&self, clock_hz: u32) -> u32 {
        let div = u64::from(self.integer) * u64::from(FRACTION_STEPS) + u64::from(self.fraction);
        if div == 0 {
            return 0;
        }
        let scaled = u64::from(clock_hz) * u64::from(FRACTION_STEPS / OVERSAMPLING);
        (scaled / div) as u32
    }
}

fn wait_level<H: LinkHal + ?Sized>(hal: &mut H, level: bool) -> BootResult {
    hal.timeout_start();
    while hal.rx_level() != level {
        if hal.timeout_expired() {
            return Err(BootReason::NoHost);
        }
    }
    OK
}

fn measure<H: LinkHal + ?Sized>(hal: &mut H) -> BootResult<u32> {
    wait_level(hal, false)?;
    hal.ticks_start();

    wait_level(hal, true)?;
    let start = hal.ticks();

    wait_level(hal, false)?;
    Ok(hal.ticks().wrapping_sub(start))
}

/// Brings up the link. On success the UART runs at the host's rate and the device signature
/// has been sent, high byte first.
///
/// Any wait timing out means no host is attached; there is no retry.
pub fn sync<H: LinkHal + ?Sized>(hal: &mut H) -> BootResult<Divisor> {
    let ticks = measure(hal);
    hal.ticks_stop();
    let ticks = ticks?;
    let divisor = Divisor::from_run_ticks(ticks);

    // stop bit
    wait_level(hal, true)?;

    hal.uart_enable(divisor);
    for b in DEVICE_SIGN.to_be_bytes() {
        hal.tx_write(b);
    }

    log::debug!("autobaud: {ticks} ticks, divisor {}+{}/64", divisor.integer, divisor.fraction);
    Ok(divisor)
}
