#![no_std]

pub mod device;

use uartboot::autobaud::{self, Divisor, LinkHal};
use uartboot::fifo::RingBuffer;
use uartboot::flash::{FlashController, Region};
use uartboot::packet::Uart;
use uartboot::{BOOT_NAME, BootHal, BootReason, BootResult, FIFO_BYTES, Identity, Session};

use device::{gpio, mflash, rcu, timer, uart};

/// PLL multiplier settings: `f = f_ref * m / (n * (od + 1))`.
pub struct PllSettings {
    pub n: u32,
    pub m: u32,
    pub od: u32,
}

pub trait K1921Board {
    const PLL: PllSettings;
    /// System clock once the PLL is running. Both timers and the UART run from it.
    const SYSCLK_HZ: u32;
    /// GPIOA pin that keeps the bootloader active while pulled low.
    const BOOTEN_PIN: u32;
    const UART_RX_PIN: u32;
    const UART_TX_PIN: u32;
    const UART_RX_IRQ: u16;
}

#[derive(Clone, Copy)]
struct UartRxIrq(u16);

// SAFETY: The number comes from the board definition and names a valid device interrupt.
unsafe impl cortex_m::interrupt::InterruptNumber for UartRxIrq {
    fn number(self) -> u16 {
        self.0
    }
}

mod flash_util {
    use super::device::{MFLASH, mflash};
    use uartboot::flash::Region;

    fn command(op: u32, region: Region) -> u32 {
        let nvr = match region {
            Region::Main => 0,
            Region::Nvr => mflash::CMD_NVRON,
        };
        mflash::CMD_KEY | nvr | op
    }

    fn wait_idle() {
        // SAFETY: MFLASH is a valid peripheral address.
        while unsafe { (*MFLASH).stat.read() } & mflash::STAT_BUSY != 0 {}
    }

    pub fn read(addr: u32, region: Region) -> [u32; 2] {
        wait_idle();
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).addr.write(addr);
        }
        flash_exec_wait(command(mflash::CMD_RD, region));

        // SAFETY: MFLASH is a valid peripheral address.
        unsafe { [(*MFLASH).data[0].read(), (*MFLASH).data[1].read()] }
    }

    pub fn write(addr: u32, region: Region, data: [u32; 2]) {
        wait_idle();
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).addr.write(addr);
            (*MFLASH).data[0].write(data[0]);
            (*MFLASH).data[1].write(data[1]);
        }
        flash_exec_wait(command(mflash::CMD_WR, region));
    }

    pub fn erase_page(addr: u32, region: Region) {
        wait_idle();
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).addr.write(addr);
        }
        flash_exec_wait(command(mflash::CMD_ERSEC, region));
    }

    pub fn erase_all() {
        wait_idle();
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).addr.write(0);
        }
        flash_exec_wait(command(mflash::CMD_ERALL, Region::Main));
    }

    pub fn disable_boot() {
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).bdis.write(mflash::BDIS_BMDIS);
        }
    }

    /// Issues a command and spins until the controller is idle again. Lives in RAM, as the
    /// flash stalls instruction fetches while busy.
    #[unsafe(link_section = ".data")]
    #[inline(never)]
    fn flash_exec_wait(cmd: u32) {
        // SAFETY: MFLASH is a valid peripheral address.
        unsafe {
            (*MFLASH).cmd.write(cmd);
            while (*MFLASH).stat.read() & mflash::STAT_BUSY != 0 {}
        }
    }
}

pub struct K1921Hal<B: K1921Board> {
    _marker: core::marker::PhantomData<B>,
}

// Written out by hand: deriving would require `B: Default`, which board types need not be.
impl<B: K1921Board> Default for K1921Hal<B> {
    fn default() -> Self {
        Self {
            _marker: core::marker::PhantomData,
        }
    }
}

impl<B: K1921Board> K1921Hal<B> {
    const TIMEOUT_TICKS: u32 = B::SYSCLK_HZ / 1000 * uartboot::AUTOBAUD_TIMEOUT_MS;
    const PLL_LOCK_SPINS: u32 = 1_000_000;
    const DWORD_SZ: pow2::Pow2 = pow2::Pow2::align_of::<u64>();

    /// Entry point after reset: brings up the chip, syncs with the host and serves it until the
    /// exit command. Leaves for the application straight away when the boot pin is released or
    /// no host shows up.
    ///
    /// `rx_isr` serves the UART receive interrupt. It must live in RAM and only call
    /// [`uart_rx_drain`].
    pub fn boot(fifo: &RingBuffer<FIFO_BYTES>, rx_isr: extern "C" fn()) -> ! {
        let mut hal: K1921Hal<B> = Default::default();

        if let Err(reason) = hal.bring_up() {
            Self::abort(reason)
        }

        if hal.boot_pin_released() {
            log::info!("boot pin released");
            hal.leave()
        }

        if let Err(reason) = autobaud::sync(&mut hal) {
            Self::abort(reason)
        }

        Self::install_rx_vector(rx_isr);

        // SAFETY: The handler only pushes into the ring buffer, which is built for exactly one
        // producer running concurrently with the session.
        unsafe {
            cortex_m::peripheral::NVIC::unmask(UartRxIrq(B::UART_RX_IRQ));
        }

        Session::new(hal, fifo).run()
    }

    pub fn abort(reason: BootReason) -> ! {
        log::error!("abort: {reason:?}");
        K1921Hal::<B>::default().leave()
    }

    pub fn panic(_panic: &core::panic::PanicInfo<'_>) -> ! {
        Self::abort(HalErr::Panic.into())
    }

    /// Switches to a vector table in RAM with `isr` on the UART receive slot. Flash commands
    /// stall every fetch from flash, vectors included, and a page erase outlasts the UART's own
    /// receive FIFO.
    fn install_rx_vector(isr: extern "C" fn()) {
        const { assert!(16 + (B::UART_RX_IRQ as usize) < RAM_VECTORS) };

        let table = &raw mut RAM_VECTOR_TABLE;
        // SAFETY: The UART interrupt is still masked and nothing else is enabled, so nothing
        // dispatches through either table while it is copied and switched. Slot 0 holds the initial stack pointer, which the core only
        // reads at reset, so copying starts at slot 1.
        unsafe {
            let scb = &*cortex_m::peripheral::SCB::PTR;
            let flash_table = scb.vtor.read() as usize;
            for slot in 1..RAM_VECTORS {
                (*table).0[slot] = ((flash_table + slot * 4) as *const usize).read_volatile();
            }
            (*table).0[16 + B::UART_RX_IRQ as usize] = isr as usize;

            cortex_m::asm::dsb();
            scb.vtor.write(table as u32);
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
    }

    fn leave(&mut self) -> ! {
        self.disable_boot();
        self.reset()
    }

    fn bring_up(&mut self) -> BootResult {
        let rcu = Self::rcu();
        let porta = Self::porta();
        let portb = Self::portb();
        let gpio_en = rcu::HCLKCFG_GPIOAEN | rcu::HCLKCFG_GPIOBEN;

        // SAFETY: Plain configuration writes, nothing else runs yet.
        unsafe {
            rcu.hclkcfg.modify(|v| v | gpio_en);
            rcu.hrstcfg.modify(|v| v | gpio_en);
            porta.denset.write(1 << B::BOOTEN_PIN);
            porta.pullmode.write(gpio::PULL_UP << (B::BOOTEN_PIN * 2));

            rcu.pllcfg.write(
                rcu::PLLCFG_REFSRC_OSICLK
                    | (B::PLL.n << rcu::PLLCFG_N_POS)
                    | (B::PLL.m << rcu::PLLCFG_M_POS)
                    | (B::PLL.od << rcu::PLLCFG_OD_POS)
                    | rcu::PLLCFG_OUTEN,
            );
        }

        let mut spins = Self::PLL_LOCK_SPINS;
        while rcu.pllcfg.read() & rcu::PLLCFG_LOCK == 0 {
            spins -= 1;
            if spins == 0 {
                return HalErr::PllLock.into();
            }
        }

        let pins = (1 << B::UART_RX_PIN) | (1 << B::UART_TX_PIN);
        let timers = rcu::PRSTCFG_TMR0EN | rcu::PRSTCFG_TMR1EN;

        // SAFETY: As above.
        unsafe {
            // Four wait states cover up to 120 MHz.
            (*device::MFLASH).ctrl.write(3 << mflash::CTRL_LAT_POS);
            rcu.sysclkcfg.write(rcu::SYSCLKCFG_SYSSEL_PLLCLK);

            portb.altfuncset.write(pins);
            portb.denset.write(pins);

            rcu.uartcfg[0].write(rcu::UARTCFG_CLKSEL_PLLCLK | rcu::UARTCFG_CLKEN | rcu::UARTCFG_RSTDIS);
            let uart = Self::uart();
            uart.ifls.write(uart::IFLS_1_8);
            uart.imsc.write(uart::INT_RX | uart::INT_RT);

            rcu.prstcfg.modify(|v| v | timers);
            rcu.pclkcfg.modify(|v| v | timers);
        }

        log::debug!("clocks up, {} Hz", B::SYSCLK_HZ);
        uartboot::OK
    }

    fn boot_pin_released(&self) -> bool {
        Self::porta().data.read() & (1 << B::BOOTEN_PIN) != 0
    }

    fn timer_restart(tmr: &device::Timer) {
        // SAFETY: Timer reconfiguration has no side effects beyond the timer itself.
        unsafe {
            tmr.ctrl.modify(|v| v & !timer::CTRL_ON);
            tmr.load.write(u32::MAX);
            tmr.value.write(u32::MAX);
            tmr.ctrl.modify(|v| v | timer::CTRL_ON);
        }
    }

    fn uart() -> &'static device::Uart {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::UART0 }
    }

    fn rcu() -> &'static device::Rcu {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::RCU }
    }

    fn porta() -> &'static device::Gpio {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::GPIOA }
    }

    fn portb() -> &'static device::Gpio {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::GPIOB }
    }

    fn timeout_timer() -> &'static device::Timer {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::TMR0 }
    }

    fn baud_timer() -> &'static device::Timer {
        // SAFETY: Fixed peripheral address.
        unsafe { &*device::TMR1 }
    }
}

/// Core exceptions plus the first 48 interrupts; enough for every source the bootloader
/// enables.
const RAM_VECTORS: usize = 64;

#[repr(C, align(256))]
struct VectorTable([usize; RAM_VECTORS]);

static mut RAM_VECTOR_TABLE: VectorTable = VectorTable([0; RAM_VECTORS]);

/// Moves everything in the UART receive FIFO into `fifo`. Called from the UART interrupt.
///
/// Always inlined, so that it ends up in the caller's RAM-resident handler together with
/// [`RingBuffer::push`].
#[inline(always)]
pub fn uart_rx_drain<const N: usize>(fifo: &RingBuffer<N>) {
    // SAFETY: Fixed peripheral address.
    let uart = unsafe { &*device::UART0 };

    // SAFETY: Clearing our own interrupt sources.
    unsafe {
        uart.icr.write(uart::INT_RX | uart::INT_RT);
    }

    while uart.fr.read() & uart::FR_RXFE == 0 {
        fifo.push(uart.dr.read() as u8);
    }
}

#[repr(u16)]
pub enum HalErr {
    Panic,
    PllLock,
}

impl From<HalErr> for BootReason {
    fn from(item: HalErr) -> Self {
        BootReason::HalError(item as u16)
    }
}
impl<T> From<HalErr> for BootResult<T> {
    fn from(item: HalErr) -> Self {
        Err(item.into())
    }
}

impl<B: K1921Board> FlashController for K1921Hal<B> {
    fn read(&mut self, addr: u32, region: Region) -> [u32; 2] {
        flash_util::read(addr, region)
    }

    fn write(&mut self, addr: u32, region: Region, data: [u32; 2]) {
        debug_assert!(Self::DWORD_SZ.is_aligned(addr));
        flash_util::write(addr, region, data)
    }

    fn erase_page(&mut self, addr: u32, region: Region) {
        flash_util::erase_page(addr, region)
    }

    fn erase_all(&mut self) {
        flash_util::erase_all()
    }

    fn disable_boot(&mut self) {
        flash_util::disable_boot()
    }
}

impl<B: K1921Board> Uart for K1921Hal<B> {
    fn tx_busy(&self) -> bool {
        let fr = Self::uart().fr.read();
        fr & uart::FR_BUSY != 0 || fr & uart::FR_TXFE == 0
    }

    fn tx_ready(&self) -> bool {
        Self::uart().fr.read() & uart::FR_TXFF == 0
    }

    fn tx_write(&mut self, byte: u8) {
        // SAFETY: Writing the data register only queues a byte.
        unsafe {
            Self::uart().dr.write(u32::from(byte));
        }
    }
}

impl<B: K1921Board> LinkHal for K1921Hal<B> {
    fn rx_level(&self) -> bool {
        Self::portb().data.read() & (1 << B::UART_RX_PIN) != 0
    }

    fn timeout_start(&mut self) {
        Self::timer_restart(Self::timeout_timer());
    }

    fn timeout_expired(&self) -> bool {
        let elapsed = u32::MAX.wrapping_sub(Self::timeout_timer().value.read());
        elapsed > Self::TIMEOUT_TICKS
    }

    fn ticks_start(&mut self) {
        Self::timer_restart(Self::baud_timer());
    }

    fn ticks(&self) -> u32 {
        u32::MAX.wrapping_sub(Self::baud_timer().value.read())
    }

    fn ticks_stop(&mut self) {
        // SAFETY: See timer_restart.
        unsafe {
            Self::baud_timer().ctrl.modify(|v| v & !timer::CTRL_ON);
        }
    }

    fn uart_enable(&mut self, divisor: Divisor) {
        let uart = Self::uart();
        // SAFETY: The UART is idle until enabled here.
        unsafe {
            uart.ibrd.write(divisor.integer);
            uart.fbrd.write(divisor.fraction);
            uart.lcrh.write(uart::LCRH_FEN | uart::LCRH_WLEN_8);
            uart.cr.write(uart::CR_RXE | uart::CR_TXE | uart::CR_UARTEN);
        }
        log::info!("link up at {} baud", divisor.baud(B::SYSCLK_HZ));
    }
}

impl<B: K1921Board> BootHal for K1921Hal<B> {
    fn identity(&self) -> Identity {
        // SAFETY: Fixed peripheral addresses, read only.
        let (chip_id, cpu_id) = unsafe {
            (
                (*device::SIU).chipid.read(),
                (*cortex_m::peripheral::CPUID::PTR).base.read(),
            )
        };
        Identity {
            chip_id,
            cpu_id,
            version: uartboot::BOOT_VERSION,
            name: BOOT_NAME,
        }
    }

    fn reset(&mut self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }
}

#[cfg(feature = "semihosting")]
pub mod semihosting {
    use cortex_m_semihosting::hprintln;
    use log::{Level, Log, Metadata, Record};

    struct Logger;

    impl Log for Logger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            hprintln!("[K1] {} - {}", record.level(), record.args());
        }

        fn flush(&self) {}
    }

    static LOGGER: Logger = Logger;

    /// Routes `log` output to the debugger. Halts the core when no debugger is attached.
    pub fn init_logger() {
        // SAFETY: Called once from the entry point, before interrupts are enabled.
        unsafe {
            let _ = log::set_logger_racy(&LOGGER);
            log::set_max_level_racy(Level::Debug.to_level_filter());
        }
    }
}
