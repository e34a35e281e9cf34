//! The simulated chip: flash, boot latch, UART and link timers behind the bootloader HAL.

use std::io::Write;

use uartboot::autobaud::{Divisor, LinkHal};
use uartboot::flash::{FlashController, Region};
use uartboot::packet::Uart;
use uartboot::{BootHal, Identity};

pub mod flash;
pub mod intelhex;
pub mod line;

use flash::FlashArray;
use line::Line;

pub struct SimDevice<W: Write> {
    flash: FlashArray,
    line: Line,
    identity: Identity,
    clock_hz: u32,
    divisor: Option<Divisor>,
    host: W,
    tx: Vec<u8>,
    dump: Option<clio::OutputPath>,
}

impl<W: Write> SimDevice<W> {
    pub fn new(flash: FlashArray, line: Line, identity: Identity, clock_hz: u32, host: W) -> Self {
        SimDevice {
            flash,
            line,
            identity,
            clock_hz,
            divisor: None,
            host,
            tx: Vec::new(),
            dump: None,
        }
    }

    /// Main flash is written here as Intel HEX when the host exits the bootloader.
    pub fn dump_to(&mut self, path: clio::OutputPath) {
        self.dump = Some(path);
    }

    pub fn flash(&self) -> &FlashArray {
        &self.flash
    }

    fn write_dump(&mut self) -> Result<(), String> {
        let Some(path) = self.dump.take() else {
            return Ok(());
        };

        let image = intelhex::dump(0, self.flash.main())?;
        let mut out = path
            .create()
            .map_err(|e| format!("Could not create dump ({e})"))?;
        out.write_all(image.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| format!("Could not write dump ({e})"))?;

        log::info!("main flash dumped");
        Ok(())
    }
}

impl<W: Write> FlashController for SimDevice<W> {
    fn read(&mut self, addr: u32, region: Region) -> [u32; 2] {
        self.flash.read(addr, region)
    }

    fn write(&mut self, addr: u32, region: Region, data: [u32; 2]) {
        self.flash.write(addr, region, data)
    }

    fn erase_page(&mut self, addr: u32, region: Region) {
        self.flash.erase_page(addr, region)
    }

    fn erase_all(&mut self) {
        self.flash.erase_all()
    }

    fn disable_boot(&mut self) {
        log::debug!("boot latch cleared");
        self.flash.disable_boot()
    }
}

impl<W: Write> Uart for SimDevice<W> {
    fn tx_busy(&self) -> bool {
        false
    }

    fn tx_ready(&self) -> bool {
        true
    }

    fn tx_write(&mut self, byte: u8) {
        self.tx.push(byte);
    }

    fn tx_flush(&mut self) {
        if let Err(e) = self.host.write_all(&self.tx).and_then(|_| self.host.flush()) {
            log::error!("host write failed ({e})");
        }
        self.tx.clear();
    }
}

impl<W: Write> LinkHal for SimDevice<W> {
    fn rx_level(&self) -> bool {
        self.line.sample()
    }

    fn timeout_start(&mut self) {
        self.line.timeout_start()
    }

    fn timeout_expired(&self) -> bool {
        self.line.timeout_expired()
    }

    fn ticks_start(&mut self) {
        self.line.ticks_start()
    }

    fn ticks(&self) -> u32 {
        self.line.ticks()
    }

    fn ticks_stop(&mut self) {
        self.line.ticks_stop()
    }

    fn uart_enable(&mut self, divisor: Divisor) {
        log::info!(
            "link up: divisor {}+{}/64, {} baud",
            divisor.integer,
            divisor.fraction,
            divisor.baud(self.clock_hz)
        );
        self.divisor = Some(divisor);
    }
}

impl<W: Write> BootHal for SimDevice<W> {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn reset(&mut self) -> ! {
        self.tx_flush();
        if let Err(e) = self.write_dump() {
            log::error!("{e}");
            std::process::exit(1);
        }
        log::info!("reset, boot latch {}", self.flash().boot_latch());
        std::process::exit(0)
    }
}
