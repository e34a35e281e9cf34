#![no_main]
#![no_std]

use cortex_m_rt::entry;

use k1921loader::{K1921Board, K1921Hal, PllSettings};
use uartboot::FIFO_BYTES;
use uartboot::fifo::RingBuffer;

struct DevBoard;

impl K1921Board for DevBoard {
    // 8 MHz internal oscillator to 100 MHz.
    const PLL: PllSettings = PllSettings { n: 1, m: 25, od: 1 };
    const SYSCLK_HZ: u32 = 100_000_000;
    const BOOTEN_PIN: u32 = 7;
    const UART_RX_PIN: u32 = 11;
    const UART_TX_PIN: u32 = 10;
    const UART_RX_IRQ: u16 = 23;
}

type Hal = K1921Hal<DevBoard>;

static RX_FIFO: RingBuffer<FIFO_BYTES> = RingBuffer::new();

#[entry]
fn main() -> ! {
    #[cfg(feature = "semihosting")]
    k1921loader::semihosting::init_logger();

    Hal::boot(&RX_FIFO, uart_rx_isr)
}

/// UART receive interrupt, reached through the RAM vector table. Runs while page erases and
/// writes hold the flash, so it must not fetch from there.
#[unsafe(link_section = ".data")]
#[inline(never)]
extern "C" fn uart_rx_isr() {
    k1921loader::uart_rx_drain(&RX_FIFO);
}

#[panic_handler]
fn panic(panic: &core::panic::PanicInfo<'_>) -> ! {
    Hal::panic(panic)
}
