//! In-memory flash with the programming rules of NOR cells: erase sets bits, programming can
//! only clear them.

use byteorder::{ByteOrder, LittleEndian};

use uartboot::flash::{CFGWORD_OFFSET, MAIN_PAGES, NVR_PAGES, PAGE_BYTES, Region};

const MAIN_BYTES: usize = MAIN_PAGES as usize * PAGE_BYTES;
const NVR_BYTES: usize = NVR_PAGES as usize * PAGE_BYTES;

pub struct FlashArray {
    main: Vec<u8>,
    nvr: Vec<u8>,
    boot_latch: bool,
}

impl FlashArray {
    /// Blank main array; NVR blank apart from the configuration word.
    pub fn new(cfgword: u32) -> Self {
        let mut nvr = vec![0xff; NVR_BYTES];
        LittleEndian::write_u32(&mut nvr[CFGWORD_OFFSET as usize..], cfgword);

        FlashArray {
            main: vec![0xff; MAIN_BYTES],
            nvr,
            boot_latch: true,
        }
    }

    pub fn main(&self) -> &[u8] {
        &self.main
    }

    pub fn boot_latch(&self) -> bool {
        self.boot_latch
    }

    pub fn cfgword(&self) -> u32 {
        LittleEndian::read_u32(&self.nvr[CFGWORD_OFFSET as usize..])
    }

    /// Places an image segment in main flash, as a programmer would.
    pub fn load(&mut self, address: usize, data: &[u8]) -> Result<(), String> {
        let end = address + data.len();
        if end > MAIN_BYTES {
            return Err(format!(
                "Segment at 0x{address:08x} ({} bytes) exceeds main flash",
                data.len()
            ));
        }

        log::debug!("Loading segment at 0x{address:08x} ({} bytes)", data.len());
        self.main[address..end].copy_from_slice(data);
        Ok(())
    }

    fn dword(&mut self, addr: u32, region: Region) -> &mut [u8] {
        let mem = match region {
            Region::Main => &mut self.main,
            Region::Nvr => &mut self.nvr,
        };
        // Addresses wrap within the array, as the controller ignores the upper bits.
        let offset = (addr as usize & !7) % mem.len();
        &mut mem[offset..offset + 8]
    }

    pub fn read(&mut self, addr: u32, region: Region) -> [u32; 2] {
        let dw = self.dword(addr, region);
        [LittleEndian::read_u32(dw), LittleEndian::read_u32(&dw[4..])]
    }

    pub fn write(&mut self, addr: u32, region: Region, data: [u32; 2]) {
        let dw = self.dword(addr, region);
        let old = [LittleEndian::read_u32(dw), LittleEndian::read_u32(&dw[4..])];
        if old != [u32::MAX; 2] {
            log::warn!("programming non-blank {region:?} 0x{addr:08x}");
        }
        LittleEndian::write_u32(dw, old[0] & data[0]);
        LittleEndian::write_u32(&mut dw[4..], old[1] & data[1]);
    }

    pub fn erase_page(&mut self, addr: u32, region: Region) {
        let mem = match region {
            Region::Main => &mut self.main,
            Region::Nvr => &mut self.nvr,
        };
        let base = (addr as usize & !(PAGE_BYTES - 1)) % mem.len();
        mem[base..base + PAGE_BYTES].fill(0xff);
        log::debug!("erased {region:?} page 0x{base:08x}");
    }

    pub fn erase_all(&mut self) {
        self.main.fill(0xff);
        log::debug!("erased main flash");
    }

    pub fn disable_boot(&mut self) {
        self.boot_latch = false;
    }
}
