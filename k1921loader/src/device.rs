//! K1921VK035 peripheral register blocks, limited to what the bootloader touches.

use volatile_register::{RO, RW, WO};

pub const GPIOA: *const Gpio = 0x4000_0000 as *const Gpio;
pub const GPIOB: *const Gpio = 0x4001_0000 as *const Gpio;
pub const MFLASH: *const Mflash = 0x4002_0000 as *const Mflash;
pub const RCU: *const Rcu = 0x4006_0000 as *const Rcu;
pub const SIU: *const Siu = 0x4008_0000 as *const Siu;
pub const TMR0: *const Timer = 0x4000_a000 as *const Timer;
pub const TMR1: *const Timer = 0x4000_b000 as *const Timer;
pub const UART0: *const Uart = 0x4000_4000 as *const Uart;

#[repr(C)]
pub struct Gpio {
    pub data: RO<u32>,
    pub dataout: RW<u32>,
    pub dataoutset: WO<u32>,
    pub dataoutclr: WO<u32>,
    pub dataouttgl: WO<u32>,
    pub denset: WO<u32>,
    pub denclr: WO<u32>,
    pub inmode: RW<u32>,
    pub pullmode: RW<u32>,
    pub outmode: RW<u32>,
    pub drivemode: RW<u32>,
    pub outenset: WO<u32>,
    pub outenclr: WO<u32>,
    pub altfuncset: WO<u32>,
    pub altfuncclr: WO<u32>,
}

pub mod gpio {
    pub const PULL_UP: u32 = 0b01;
}

#[repr(C)]
pub struct Mflash {
    pub addr: RW<u32>,
    pub data: [RW<u32>; 2],
    _reserved0: [u32; 14],
    pub cmd: WO<u32>,
    pub stat: RO<u32>,
    _reserved1: u32,
    pub ctrl: RW<u32>,
    _reserved2: [u32; 3],
    pub bdis: RW<u32>,
}

pub mod mflash {
    pub const CMD_RD: u32 = 1 << 0;
    pub const CMD_WR: u32 = 1 << 1;
    pub const CMD_ERSEC: u32 = 1 << 2;
    pub const CMD_ERALL: u32 = 1 << 3;
    pub const CMD_NVRON: u32 = 1 << 8;
    pub const CMD_KEY: u32 = 0xc0de << 16;

    pub const STAT_BUSY: u32 = 1 << 0;

    pub const CTRL_LAT_POS: u32 = 0;

    pub const BDIS_BMDIS: u32 = 1 << 0;
}

#[repr(C)]
pub struct Rcu {
    pub hclkcfg: RW<u32>,
    pub pclkcfg: RW<u32>,
    _reserved0: [u32; 2],
    pub hrstcfg: RW<u32>,
    pub prstcfg: RW<u32>,
    _reserved1: [u32; 6],
    pub sysclkcfg: RW<u32>,
    _reserved2: [u32; 7],
    pub pllcfg: RW<u32>,
    _reserved3: [u32; 3],
    pub uartcfg: [RW<u32>; 2],
}

pub mod rcu {
    pub const HCLKCFG_GPIOAEN: u32 = 1 << 0;
    pub const HCLKCFG_GPIOBEN: u32 = 1 << 1;

    pub const PRSTCFG_TMR0EN: u32 = 1 << 0;
    pub const PRSTCFG_TMR1EN: u32 = 1 << 1;

    pub const SYSCLKCFG_SYSSEL_PLLCLK: u32 = 2;

    pub const PLLCFG_REFSRC_OSICLK: u32 = 0;
    pub const PLLCFG_N_POS: u32 = 8;
    pub const PLLCFG_M_POS: u32 = 16;
    pub const PLLCFG_OD_POS: u32 = 24;
    pub const PLLCFG_OUTEN: u32 = 1 << 28;
    pub const PLLCFG_LOCK: u32 = 1 << 31;

    pub const UARTCFG_CLKEN: u32 = 1 << 0;
    pub const UARTCFG_RSTDIS: u32 = 1 << 8;
    pub const UARTCFG_CLKSEL_PLLCLK: u32 = 2 << 16;
}

#[repr(C)]
pub struct Siu {
    _reserved0: [u32; 16],
    pub chipid: RO<u32>,
}

/// Down-counting 32-bit timer.
#[repr(C)]
pub struct Timer {
    pub ctrl: RW<u32>,
    pub value: RW<u32>,
    pub load: RW<u32>,
    pub intstatus: RW<u32>,
}

pub mod timer {
    pub const CTRL_ON: u32 = 1 << 0;
}

#[repr(C)]
pub struct Uart {
    pub dr: RW<u32>,
    pub rsr: RW<u32>,
    _reserved0: [u32; 4],
    pub fr: RO<u32>,
    _reserved1: u32,
    pub ilpr: RW<u32>,
    pub ibrd: RW<u32>,
    pub fbrd: RW<u32>,
    pub lcrh: RW<u32>,
    pub cr: RW<u32>,
    pub ifls: RW<u32>,
    pub imsc: RW<u32>,
    pub ris: RO<u32>,
    pub mis: RO<u32>,
    pub icr: WO<u32>,
}

pub mod uart {
    pub const FR_BUSY: u32 = 1 << 3;
    pub const FR_RXFE: u32 = 1 << 4;
    pub const FR_TXFF: u32 = 1 << 5;
    pub const FR_TXFE: u32 = 1 << 7;

    pub const LCRH_FEN: u32 = 1 << 4;
    pub const LCRH_WLEN_8: u32 = 3 << 5;

    pub const CR_UARTEN: u32 = 1 << 0;
    pub const CR_TXE: u32 = 1 << 8;
    pub const CR_RXE: u32 = 1 << 9;

    /// Receive interrupt at 1/8 full, for both FIFOs.
    pub const IFLS_1_8: u32 = 0;

    pub const INT_RX: u32 = 1 << 4;
    /// Receive timeout, picks up bytes left below the FIFO level.
    pub const INT_RT: u32 = 1 << 6;
}
