//! Receive ring buffer between the UART interrupt and the command loop.
//!
//! Single producer (the receive interrupt calls [`RingBuffer::push`]) and single consumer (the
//! command loop calls [`RingBuffer::pop`]). The read and write positions are free-running
//! counters published with release/acquire ordering, so no lock is needed and every slot is
//! usable: `full` and `empty` are derived from the distance between the two counters and can
//! never hold at the same time.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{ByteOrder, LittleEndian};

pub struct RingBuffer<const N: usize> {
    mem: UnsafeCell<[u8; N]>,
    wr: AtomicUsize,
    rd: AtomicUsize,
}

// SAFETY: The producer only writes the slot at `wr` before publishing it, and the consumer only
// reads the slot at `rd` after observing it published. As long as there is at most one producer
// and one consumer, no slot is ever accessed from both sides at once.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        const { assert!(N.is_power_of_two()) };
        Self {
            mem: UnsafeCell::new([0; N]),
            wr: AtomicUsize::new(0),
            rd: AtomicUsize::new(0),
        }
    }

    pub fn is_full(&self) -> bool {
        let wr = self.wr.load(Ordering::Acquire);
        let rd = self.rd.load(Ordering::Acquire);
        wr.wrapping_sub(rd) == N
    }

    pub fn is_empty(&self) -> bool {
        let wr = self.wr.load(Ordering::Acquire);
        let rd = self.rd.load(Ordering::Acquire);
        wr == rd
    }

    /// Appends a byte; the byte is dropped if the buffer is full.
    ///
    /// Producer side only. Never blocks. Always inlined, so a producer placed in RAM stays
    /// there.
    #[inline(always)]
    pub fn push(&self, byte: u8) {
        let wr = self.wr.load(Ordering::Relaxed);
        let rd = self.rd.load(Ordering::Acquire);

        if wr.wrapping_sub(rd) == N {
            return;
        }

        // SAFETY: Slot `wr` is outside the published range, so the consumer does not touch it.
        unsafe {
            self.mem.get().cast::<u8>().add(wr % N).write(byte);
        }
        self.wr.store(wr.wrapping_add(1), Ordering::Release);
    }

    /// Removes the oldest byte, if any.
    ///
    /// Consumer side only.
    pub fn try_pop(&self) -> Option<u8> {
        let rd = self.rd.load(Ordering::Relaxed);
        let wr = self.wr.load(Ordering::Acquire);

        if wr == rd {
            return None;
        }

        // SAFETY: Slot `rd` was published by the producer and is not reused until `rd` advances.
        let byte = unsafe { self.mem.get().cast::<u8>().add(rd % N).read() };
        self.rd.store(rd.wrapping_add(1), Ordering::Release);

        Some(byte)
    }

    /// Removes the oldest byte, spinning until one arrives.
    ///
    /// Consumer side only. There is no timeout; the loop stays preemptible by the producer.
    pub fn pop(&self) -> u8 {
        loop {
            if let Some(byte) = self.try_pop() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }

    pub fn pop_u16(&self) -> u16 {
        let buf = [self.pop(), self.pop()];
        LittleEndian::read_u16(&buf)
    }

    pub fn pop_u32(&self) -> u32 {
        let buf = [self.pop(), self.pop(), self.pop(), self.pop()];
        LittleEndian::read_u32(&buf)
    }
}
