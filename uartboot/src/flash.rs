//! Flash geometry, the controller capability and the host access policy.

use pow2::Pow2;

pub const PAGE_BYTES: usize = 1024;
pub const PAGE_SZ: Pow2 = pow2::pow2_const!(PAGE_BYTES);
const PAGE: u32 = PAGE_BYTES as u32;

pub const MAIN_PAGES: u32 = 64;
pub const NVR_PAGES: u32 = 4;

/// NVR pages holding the bootloader itself; never host-accessible.
pub const RESERVED_NVR_PAGES: u32 = 3;

/// NVR offset of the configuration word (first word of the last NVR page).
pub const CFGWORD_OFFSET: u32 = RESERVED_NVR_PAGES * PAGE;

/// Double-words (the programming unit) per page.
pub const DWORDS_PER_PAGE: usize = PAGE_BYTES / 8;

/// Double-word that reads back from an erased cell.
pub const BLANK: [u32; 2] = [u32::MAX; 2];

const ADDR_MASK: u32 = 0x00ff_ffff;
const OPT_ERASE: u32 = 1 << 30;
const OPT_NVR: u32 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Main,
    Nvr,
}

/// Raw flash controller operations.
///
/// Every call is a blocking transaction. Nothing here checks permissions, that is the job of
/// the command handlers.
pub trait FlashController {
    fn read(&mut self, addr: u32, region: Region) -> [u32; 2];

    /// Programs one double-word. The destination must have been erased beforehand; the result
    /// is undefined otherwise.
    fn write(&mut self, addr: u32, region: Region, data: [u32; 2]);

    fn erase_page(&mut self, addr: u32, region: Region);

    /// Erases the whole main array.
    fn erase_all(&mut self);

    /// Clears the latch that starts the bootloader on the next reset.
    fn disable_boot(&mut self);
}

/// Access-control word persisted in NVR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigWord(pub u32);

impl ConfigWord {
    pub const NVR_WE: u32 = 1 << 2;
    pub const FLASH_WE: u32 = 1 << 3;
    pub const NVR_RE: u32 = 1 << 6;
    pub const FLASH_RE: u32 = 1 << 7;

    /// Reads the live value from flash.
    pub fn load<F: FlashController + ?Sized>(flash: &mut F) -> Self {
        ConfigWord(flash.read(CFGWORD_OFFSET, Region::Nvr)[0])
    }

    pub fn write_enabled(self, region: Region) -> bool {
        match region {
            Region::Main => self.0 & Self::FLASH_WE != 0,
            Region::Nvr => self.0 & Self::NVR_WE != 0,
        }
    }

    pub fn read_enabled(self, region: Region) -> bool {
        match region {
            Region::Main => self.0 & Self::FLASH_RE != 0,
            Region::Nvr => self.0 & Self::NVR_RE != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Modify,
}

/// Page request decoded from the address-plus-options word of the page commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub region: Region,
    /// Page-aligned address within the region.
    pub addr: u32,
    pub erase: bool,
}

impl Target {
    pub fn decode(word: u32) -> Self {
        let region = if word & OPT_NVR != 0 {
            Region::Nvr
        } else {
            Region::Main
        };
        let addr = word & ADDR_MASK & !(PAGE - 1);
        debug_assert!(PAGE_SZ.is_aligned(addr));

        Target {
            region,
            addr,
            erase: word & OPT_ERASE != 0,
        }
    }

    /// Whether the page belongs to the bootloader's own footprint.
    pub fn is_reserved(&self) -> bool {
        self.region == Region::Nvr && self.addr < RESERVED_NVR_PAGES * PAGE
    }

    /// Applies the configuration word and the bootloader self-protection.
    ///
    /// The reserved pages are refused whatever the configuration word says.
    pub fn permitted(&self, cfg: ConfigWord, access: Access) -> bool {
        let enabled = match access {
            Access::Read => cfg.read_enabled(self.region),
            Access::Modify => cfg.write_enabled(self.region),
        };
        enabled && !self.is_reserved()
    }
}
