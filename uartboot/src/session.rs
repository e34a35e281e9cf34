//! The command loop.
//!
//! A [`Session`] lives from the end of link bring-up until the device resets. It owns the HAL
//! and the frame buffer, and reads the receive stream through the ring buffer filled by the
//! UART interrupt.
//!
//! Every response is a message frame whose payload starts with four fixed bytes: status, the
//! command being answered, and two filler bytes. Most commands echo their request word in the
//! following 32-bit slot.

use crate::flash::{self, Access, ConfigWord, Region, Target};
use crate::packet::{self, Command, Frame, Header, Status};
use crate::{BootHal, EMPTY_DATA, FIFO_BYTES, PAYLOAD_BYTES, crc, fifo::RingBuffer};

const FIXED_LEN: u16 = 4;
const ECHO_LEN: u16 = 8;
const NAME_OFFSET: usize = 16;
/// The name goes out followed by two NUL bytes.
const NAME_PAD: usize = 2;

pub struct Session<'a, H: BootHal, const N: usize = FIFO_BYTES> {
    hal: H,
    fifo: &'a RingBuffer<N>,
    frame: Frame,
}

impl<'a, H: BootHal, const N: usize> Session<'a, H, N> {
    pub fn new(hal: H, fifo: &'a RingBuffer<N>) -> Self {
        Session {
            hal,
            fifo,
            frame: Frame::new(),
        }
    }

    /// Gives the HAL back, for inspection once serving is done.
    pub fn into_hal(self) -> H {
        self.hal
    }

    /// Announces readiness and serves frames until the exit command resets the device.
    pub fn run(mut self) -> ! {
        self.announce();
        loop {
            self.serve();
        }
    }

    /// Sends the unsolicited ready message.
    pub fn announce(&mut self) {
        log::info!("bootloader ready");
        self.respond(Command::None, Status::Ready, FIXED_LEN);
    }

    /// Receives one frame and handles it.
    pub fn serve(&mut self) {
        if packet::receive(self.fifo, &mut self.frame) == Header::Malformed {
            self.respond(Command::None, Status::ErrCmd, FIXED_LEN);
            return;
        }

        let code = self.frame.code;
        match Command::from_code(code) {
            Some(Command::GetInfo) => self.get_info(),
            Some(Command::GetCfgWord) => self.get_cfgword(),
            Some(Command::SetCfgWord) => self.set_cfgword(),
            Some(Command::WritePage) => self.write_page(),
            Some(Command::ReadPage) => self.read_page(),
            Some(cmd @ (Command::EraseFull | Command::ErasePage)) => self.erase(cmd),
            Some(Command::Exit) => self.exit(),
            Some(Command::None) => self.respond(Command::None, Status::Ready, FIXED_LEN),
            Some(Command::Msg) | None => log::debug!("ignoring command {code:#04x}"),
        }
    }

    fn respond(&mut self, cmd: Command, status: Status, len: u16) {
        let payload = &mut self.frame.payload;
        payload.set_byte(0, status as u8);
        payload.set_byte(1, cmd as u8);
        payload.set_byte(2, EMPTY_DATA);
        payload.set_byte(3, EMPTY_DATA);

        self.frame.code = Command::Msg as u8;
        self.frame.len = len;

        if status != Status::Ok && status != Status::Ready {
            log::warn!("{cmd:?}: {status:?}");
        }
        packet::transmit(&mut self.hal, &self.frame);
    }

    /// Reads the trailing CRC and ranks the outcome: CRC errors first, then policy.
    fn verdict(&mut self, calc_crc: u16, permitted: bool) -> Status {
        let rx_crc = self.fifo.pop_u16();
        if calc_crc != rx_crc {
            Status::ErrCrc
        } else if !permitted {
            Status::Fail
        } else {
            Status::Ok
        }
    }

    fn get_info(&mut self) {
        let status = self.verdict(self.frame.crc, true);
        if status != Status::Ok {
            return self.respond(Command::GetInfo, status, FIXED_LEN);
        }

        let id = self.hal.identity();
        let name = id.name.as_bytes();
        let name = &name[..name.len().min(PAYLOAD_BYTES - NAME_OFFSET - NAME_PAD)];

        let payload = &mut self.frame.payload;
        payload.set_word(1, id.chip_id);
        payload.set_word(2, id.cpu_id);
        payload.set_word(3, id.version);
        payload.as_bytes_mut()[NAME_OFFSET..][..name.len()].copy_from_slice(name);
        payload.as_bytes_mut()[NAME_OFFSET + name.len()..][..NAME_PAD].fill(0);

        let len = (NAME_OFFSET + name.len() + NAME_PAD) as u16;
        self.respond(Command::GetInfo, Status::Ok, len);
    }

    fn get_cfgword(&mut self) {
        let status = self.verdict(self.frame.crc, true);
        if status != Status::Ok {
            return self.respond(Command::GetCfgWord, status, FIXED_LEN);
        }

        let cfg = ConfigWord::load(&mut self.hal);
        self.frame.payload.set_word(1, cfg.0);
        self.respond(Command::GetCfgWord, Status::Ok, ECHO_LEN);
    }

    fn set_cfgword(&mut self) {
        let current = ConfigWord::load(&mut self.hal);

        let word = self.fifo.pop_u32();
        let calc_crc = crc::update_u32(self.frame.crc, word);

        // The word can only be changed while it still permits NVR writes.
        let status = self.verdict(calc_crc, current.write_enabled(Region::Nvr));
        if status == Status::Ok {
            self.rewrite_cfgword(word);
            log::info!("config word {:#010x} -> {word:#010x}", current.0);
        }

        self.frame.payload.set_word(1, word);
        self.respond(Command::SetCfgWord, status, ECHO_LEN);
    }

    fn rewrite_cfgword(&mut self, word: u32) {
        let mut page = [flash::BLANK; flash::DWORDS_PER_PAGE];
        for (i, dw) in page.iter_mut().enumerate() {
            *dw = self.hal.read(dword_addr(flash::CFGWORD_OFFSET, i), Region::Nvr);
        }

        page[0][0] = word;
        self.hal.erase_page(flash::CFGWORD_OFFSET, Region::Nvr);

        // Blank double-words are already in place after the erase.
        for (i, dw) in page.iter().enumerate() {
            if *dw != flash::BLANK {
                self.hal.write(dword_addr(flash::CFGWORD_OFFSET, i), Region::Nvr, *dw);
            }
        }
    }

    fn write_page(&mut self) {
        let request = self.fifo.pop_u32();
        let target = Target::decode(request);

        let cfg = ConfigWord::load(&mut self.hal);
        let permitted = target.permitted(cfg, Access::Modify);

        if target.erase && permitted {
            self.hal.erase_page(target.addr, target.region);
        }

        // The data is programmed as it streams in, before the CRC is known. A CRC error is
        // reported but does not undo the write.
        let mut calc_crc = crc::update_u32(self.frame.crc, request);
        for i in 0..flash::DWORDS_PER_PAGE {
            let data = [self.fifo.pop_u32(), self.fifo.pop_u32()];
            if permitted {
                self.hal.write(dword_addr(target.addr, i), target.region, data);
            }
            calc_crc = crc::update_u32(calc_crc, data[0]);
            calc_crc = crc::update_u32(calc_crc, data[1]);
        }

        let status = self.verdict(calc_crc, permitted);

        self.frame.payload.set_word(1, request);
        self.respond(Command::WritePage, status, ECHO_LEN);
    }

    fn read_page(&mut self) {
        let request = self.fifo.pop_u32();
        let target = Target::decode(request);

        let cfg = ConfigWord::load(&mut self.hal);
        let permitted = target.permitted(cfg, Access::Read);

        let calc_crc = crc::update_u32(self.frame.crc, request);
        let status = self.verdict(calc_crc, permitted);

        let mut len = ECHO_LEN;
        if status == Status::Ok {
            for i in 0..flash::DWORDS_PER_PAGE {
                let data = self.hal.read(dword_addr(target.addr, i), target.region);
                self.frame.payload.set_word(2 + i * 2, data[0]);
                self.frame.payload.set_word(2 + i * 2 + 1, data[1]);
            }
            len += flash::PAGE_BYTES as u16;
        }

        self.frame.payload.set_word(1, request);
        self.respond(Command::ReadPage, status, len);
    }

    /// Page or full erase. Full erase always clears the whole main array, but is checked
    /// against the region and address the request names.
    fn erase(&mut self, cmd: Command) {
        let request = self.fifo.pop_u32();
        let target = Target::decode(request);

        let cfg = ConfigWord::load(&mut self.hal);
        let permitted = target.permitted(cfg, Access::Modify);

        let calc_crc = crc::update_u32(self.frame.crc, request);
        let status = self.verdict(calc_crc, permitted);

        if status == Status::Ok {
            match cmd {
                Command::EraseFull => self.hal.erase_all(),
                _ => self.hal.erase_page(target.addr, target.region),
            }
        }

        self.frame.payload.set_word(1, request);
        self.respond(cmd, status, ECHO_LEN);
    }

    fn exit(&mut self) -> ! {
        let status = self.verdict(self.frame.crc, true);
        self.respond(Command::Exit, status, FIXED_LEN);

        while self.hal.tx_busy() {
            core::hint::spin_loop();
        }

        log::info!("leaving bootloader");
        self.hal.disable_boot();
        self.hal.reset()
    }
}

fn dword_addr(base: u32, idx: usize) -> u32 {
    base + (idx * 8) as u32
}
