#![cfg_attr(not(test), no_std)]

pub mod autobaud;
pub mod crc;
pub mod fifo;
pub mod flash;
pub mod packet;
pub mod session;

pub use session::Session;

/// Signature that opens every host-to-device frame.
pub const HOST_SIGN: u16 = 0x5C81;

/// Signature that opens every device-to-host frame.
pub const DEVICE_SIGN: u16 = 0x7EA3;

/// Capacity of the receive ring buffer.
pub const FIFO_BYTES: usize = 8192;

/// Capacity of the frame payload buffer: one flash page plus the fixed response fields.
pub const PAYLOAD_BYTES: usize = flash::PAGE_BYTES + 8;

/// Filler for unused bytes of the fixed response fields.
pub const EMPTY_DATA: u8 = 0x55;

/// Bound on each line-level wait during autobaud.
pub const AUTOBAUD_TIMEOUT_MS: u32 = 500;

pub const BOOT_VERSION: u32 = (0x0001 << 16) | 0x0003;

/// Name reported by the get-info command.
pub const BOOT_NAME: &str = "K1921VK035_BOOTLOADER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootReason {
    /// No host answered during link bring-up.
    NoHost,
    HalError(u16),
}

pub type BootResult<T = ()> = Result<T, BootReason>;

pub const OK: BootResult = Ok(());

/// Values reported by the get-info command.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub chip_id: u32,
    pub cpu_id: u32,
    pub version: u32,
    pub name: &'static str,
}

pub trait BootHal: flash::FlashController + packet::Uart {
    fn identity(&self) -> Identity;

    /// Resets the chip. Called by the exit command once the boot latch is cleared and the
    /// final response has left the transmitter.
    fn reset(&mut self) -> !;
}
