//! Frame transport: finding and parsing inbound frames in the receive stream, and serialising
//! outbound frames onto the UART.
//!
//! ```text
//!  signature  cmd  !cmd  length  payload...  crc16
//!  2 bytes    1    1     2 (LE)  length      2 (LE)
//! ```
//!
//! The CRC covers everything after the signature. On receive only the header is parsed here;
//! the command handler streams the body and checks the CRC itself.

use byteorder::{ByteOrder, LittleEndian};

use crate::crc;
use crate::fifo::RingBuffer;
use crate::{DEVICE_SIGN, HOST_SIGN, PAYLOAD_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    None = 0x00,
    GetInfo = 0x35,
    GetCfgWord = 0x3a,
    SetCfgWord = 0x65,
    WritePage = 0x9a,
    ReadPage = 0xa5,
    EraseFull = 0xc5,
    ErasePage = 0xca,
    Exit = 0xf5,
    Msg = 0xfa,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Command::None,
            0x35 => Command::GetInfo,
            0x3a => Command::GetCfgWord,
            0x65 => Command::SetCfgWord,
            0x9a => Command::WritePage,
            0xa5 => Command::ReadPage,
            0xc5 => Command::EraseFull,
            0xca => Command::ErasePage,
            0xf5 => Command::Exit,
            0xfa => Command::Msg,
            _ => return None,
        })
    }
}

/// Status byte at the start of every response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    None = 0,
    ErrCmd = 1,
    ErrCrc = 2,
    Ready = 3,
    Ok = 4,
    Fail = 5,
}

/// Byte-level UART capability used for transmission.
pub trait Uart {
    /// Transmitter still shifting, or its FIFO not yet empty.
    fn tx_busy(&self) -> bool;

    /// Room for at least one more byte in the transmit FIFO.
    fn tx_ready(&self) -> bool;

    fn tx_write(&mut self, byte: u8);

    /// Called once a whole frame has been queued.
    fn tx_flush(&mut self) {}
}

/// Frame payload storage, addressed as bytes or as little-endian 32-bit slots.
pub struct Payload([u8; PAYLOAD_BYTES]);

impl Payload {
    pub const fn new() -> Self {
        Payload([0; PAYLOAD_BYTES])
    }

    pub fn set_byte(&mut self, idx: usize, value: u8) {
        self.0[idx] = value;
    }

    #[cfg(test)]
    pub fn word(&self, slot: usize) -> u32 {
        LittleEndian::read_u32(&self.0[slot * 4..])
    }

    pub fn set_word(&mut self, slot: usize, value: u32) {
        LittleEndian::write_u32(&mut self.0[slot * 4..], value);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Frame {
    pub code: u8,
    /// Payload bytes following the header: as announced by the host on receive, as set by the
    /// handler on transmit.
    pub len: u16,
    /// CRC over the header fields consumed so far.
    pub crc: u16,
    pub payload: Payload,
}

impl Frame {
    pub const fn new() -> Self {
        Frame {
            code: Command::None as u8,
            len: 0,
            crc: 0,
            payload: Payload::new(),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Header accepted; `code`, `len` and `crc` of the frame are updated.
    Valid,
    /// Command byte and its complement disagree; the body was not consumed.
    Malformed,
}

/// Waits for the next frame header in the receive stream.
pub fn receive<const N: usize>(fifo: &RingBuffer<N>, frame: &mut Frame) -> Header {
    let mut sign: u16 = 0;
    while sign != HOST_SIGN {
        sign = (sign >> 8) | (u16::from(fifo.pop()) << 8);
    }

    let code = fifo.pop();
    let code_inv = fifo.pop();
    let len = fifo.pop_u16();

    if code ^ code_inv != 0xff {
        log::warn!("malformed header {code:#04x}/{code_inv:#04x}");
        return Header::Malformed;
    }

    let crc = crc::update(0, code);
    let crc = crc::update(crc, code_inv);
    frame.crc = crc::update_u16(crc, len);
    frame.code = code;
    frame.len = len;

    log::trace!("rx cmd {code:#04x} len {len}");
    Header::Valid
}

fn send<U: Uart + ?Sized>(uart: &mut U, byte: u8) {
    while !uart.tx_ready() {
        core::hint::spin_loop();
    }
    uart.tx_write(byte);
}

/// Serialises `frame` with `frame.len` payload bytes.
pub fn transmit<U: Uart + ?Sized>(uart: &mut U, frame: &Frame) {
    while uart.tx_busy() {
        core::hint::spin_loop();
    }

    for b in DEVICE_SIGN.to_le_bytes() {
        send(uart, b);
    }

    let [len_lo, len_hi] = frame.len.to_le_bytes();
    let header = [frame.code, !frame.code, len_lo, len_hi];
    let payload = &frame.payload.as_bytes()[..usize::from(frame.len)];

    let mut crc = 0;
    for &b in header.iter().chain(payload) {
        send(uart, b);
        crc = crc::update(crc, b);
    }

    for b in crc.to_le_bytes() {
        send(uart, b);
    }
    uart.tx_flush();

    log::trace!("tx cmd {:#04x} len {}", frame.code, frame.len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Wire {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl Uart for Wire {
        fn tx_busy(&self) -> bool {
            false
        }

        fn tx_ready(&self) -> bool {
            true
        }

        fn tx_write(&mut self, byte: u8) {
            self.bytes.push(byte);
        }

        fn tx_flush(&mut self) {
            self.flushes += 1;
        }
    }

    fn feed<const N: usize>(fifo: &RingBuffer<N>, bytes: &[u8]) {
        for &b in bytes {
            fifo.push(b);
        }
    }

    #[test]
    fn command_codes_round_trip() {
        for code in 0..=u8::MAX {
            if let Some(cmd) = Command::from_code(code) {
                assert_eq!(cmd as u8, code);
            }
        }
        assert_eq!(Command::from_code(0x42), None);
    }

    #[test]
    fn finds_signature_after_noise() {
        let fifo = RingBuffer::<64>::new();
        // Noise includes half a signature and a reversed one.
        feed(&fifo, &[0x00, 0x5c, 0x81, 0x13, 0x81, 0x81, 0x5c, 0x3a, 0xc5, 0x00, 0x00]);

        let mut frame = Frame::new();
        assert_eq!(receive(&fifo, &mut frame), Header::Valid);
        assert_eq!(frame.code, 0x3a);
        assert_eq!(frame.len, 0);
        assert_eq!(frame.crc, crc::update_slice(0, &[0x3a, 0xc5, 0x00, 0x00]));
        assert!(fifo.is_empty());
    }

    #[test]
    fn complement_mismatch_is_malformed() {
        let fifo = RingBuffer::<64>::new();
        feed(&fifo, &[0x81, 0x5c, 0x35, 0xcb, 0x04, 0x00, 0xaa, 0xbb]);

        let mut frame = Frame::new();
        frame.code = 0x77;
        assert_eq!(receive(&fifo, &mut frame), Header::Malformed);
        // Frame untouched, body left in the stream.
        assert_eq!(frame.code, 0x77);
        assert_eq!(fifo.pop(), 0xaa);
    }

    #[test]
    fn transmit_layout() {
        let mut frame = Frame::new();
        frame.code = Command::Msg as u8;
        frame.len = 5;
        frame.payload.as_bytes_mut()[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);

        let mut wire = Wire::default();
        transmit(&mut wire, &frame);

        let b = &wire.bytes;
        assert_eq!(b.len(), 2 + 4 + 5 + 2);
        assert_eq!(&b[..2], &[0xa3, 0x7e]);
        assert_eq!(&b[2..6], &[0xfa, 0x05, 0x05, 0x00]);
        assert_eq!(&b[6..11], &[1, 2, 3, 4, 5]);

        let crc = crc::update_slice(0, &b[2..11]);
        assert_eq!(&b[11..], &crc.to_le_bytes());
        assert_eq!(wire.flushes, 1);
    }

    #[test]
    fn payload_words_are_little_endian() {
        let mut p = Payload::new();
        p.set_word(1, 0x1122_3344);
        assert_eq!(&p.as_bytes()[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(p.word(1), 0x1122_3344);

        p.set_byte(7, 0xaa);
        assert_eq!(p.word(1), 0xaa22_3344);
    }
}
