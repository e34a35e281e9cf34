//! Receive line and timers for link bring-up.
//!
//! The host's first byte arrives over TCP, long after it was "sent". [`Line`] replays it as an
//! 8N1 waveform at the configured rate against a virtual clock that advances one tick per line
//! sample, so the autobaud logic measures it as it would on the wire.

use std::cell::Cell;

/// Idle time before the start bit, in bit periods.
const LEAD_BITS: u64 = 4;

pub struct Line {
    byte: u8,
    bit_ticks: u64,
    timeout_ticks: u64,
    now: Cell<u64>,
    timeout_ref: u64,
    timer_ref: Option<u64>,
}

impl Line {
    pub fn new(byte: u8, baud: u32, clock_hz: u32) -> Self {
        let timeout_ticks = u64::from(clock_hz) / 1000 * u64::from(uartboot::AUTOBAUD_TIMEOUT_MS);
        Line {
            byte,
            bit_ticks: u64::from(clock_hz / baud),
            timeout_ticks,
            now: Cell::new(0),
            timeout_ref: 0,
            timer_ref: None,
        }
    }

    fn level_at(&self, t: u64) -> bool {
        let Some(bit) = (t / self.bit_ticks).checked_sub(LEAD_BITS) else {
            return true;
        };
        match bit {
            0 => false,
            1..=8 => self.byte >> (bit - 1) & 1 != 0,
            _ => true,
        }
    }

    pub fn sample(&self) -> bool {
        let now = self.now.get() + 1;
        self.now.set(now);
        self.level_at(now)
    }

    pub fn timeout_start(&mut self) {
        self.timeout_ref = self.now.get();
    }

    pub fn timeout_expired(&self) -> bool {
        self.now.get() - self.timeout_ref > self.timeout_ticks
    }

    pub fn ticks_start(&mut self) {
        self.timer_ref = Some(self.now.get());
    }

    pub fn ticks(&self) -> u32 {
        self.timer_ref
            .map_or(0, |start| (self.now.get() - start) as u32)
    }

    pub fn ticks_stop(&mut self) {
        self.timer_ref = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_is_lsb_first_8n1() {
        let line = Line::new(0b1010_0110, 1000, 10_000);
        let levels: Vec<bool> = (0..14).map(|bit| line.level_at(bit * 10 + 5)).collect();
        assert_eq!(
            levels,
            [
                true, true, true, true, // idle
                false, // start
                false, true, true, false, false, true, false, true, // data
                true, // stop
            ]
        );
    }

    #[test]
    fn timer_counts_samples() {
        let mut line = Line::new(0x7f, 115_200, 100_000_000);
        assert_eq!(line.ticks(), 0);
        line.ticks_start();
        for _ in 0..100 {
            line.sample();
        }
        assert_eq!(line.ticks(), 100);
        line.ticks_stop();
        assert_eq!(line.ticks(), 0);
    }
}
