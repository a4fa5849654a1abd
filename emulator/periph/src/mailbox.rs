/*++

Licensed under the Apache-2.0 license.

File Name:

    mailbox.rs

Abstract:

    File contains the mailbox register block of the emulated AMBT53: two word
    FIFOs with sticky errors whose clears take effect after a settle delay.

--*/

use ambt53_config::{MAILBOX_BASE_ADDR, MAILBOX_ERROR_SETTLE_CYCLES, MAILBOX_FIFO_DEPTH};
use ambt53_mailbox::registers::{
    self, MailboxErrorWord, MailboxIntWord, MailboxStatusWord, MBOX_ERROR, MBOX_INT, MBOX_STATUS,
};
use std::collections::VecDeque;

/// Bytes decoded by the mailbox block.
const MAILBOX_WINDOW: u32 = registers::D2M_INT_ENABLE + 4;

struct PendingClear {
    register: u32,
    bits: u32,
    deadline_ns: u64,
}

pub struct MailboxModel {
    base: u32,
    settle_ns: u64,
    m2d: VecDeque<u32>,
    d2m: VecDeque<u32>,
    m2d_error: MailboxErrorWord,
    d2m_error: MailboxErrorWord,
    m2d_threshold: u32,
    d2m_threshold: u32,
    m2d_int_status: MailboxIntWord,
    d2m_int_status: MailboxIntWord,
    m2d_int_enable: u32,
    d2m_int_enable: u32,
    pending_clears: Vec<PendingClear>,
}

impl MailboxModel {
    pub fn new(base: u32, clock_hz: u32) -> Self {
        Self {
            base,
            settle_ns: (MAILBOX_ERROR_SETTLE_CYCLES as u64 * 1_000_000_000)
                .div_ceil(clock_hz.max(1) as u64),
            m2d: VecDeque::with_capacity(MAILBOX_FIFO_DEPTH),
            d2m: VecDeque::with_capacity(MAILBOX_FIFO_DEPTH),
            m2d_error: MailboxErrorWord::new(0),
            d2m_error: MailboxErrorWord::new(0),
            m2d_threshold: 0,
            d2m_threshold: 0,
            m2d_int_status: MailboxIntWord::new(0),
            d2m_int_status: MailboxIntWord::new(0),
            m2d_int_enable: 0,
            d2m_int_enable: 0,
            pending_clears: Vec::new(),
        }
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address - self.base < MAILBOX_WINDOW
    }

    /// Power-on state; the DSP's global reset takes the block with it.
    pub fn reset(&mut self) {
        self.m2d.clear();
        self.d2m.clear();
        self.m2d_error.set(0);
        self.d2m_error.set(0);
        self.m2d_threshold = 0;
        self.d2m_threshold = 0;
        self.m2d_int_status.set(0);
        self.d2m_int_status.set(0);
        self.m2d_int_enable = 0;
        self.d2m_int_enable = 0;
        self.pending_clears.clear();
    }

    fn settle(&mut self, now_ns: u64) {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending_clears
            .drain(..)
            .partition(|clear| clear.deadline_ns <= now_ns);
        self.pending_clears = waiting;
        for clear in due {
            let register = if clear.register == registers::M2D_ERROR {
                &mut self.m2d_error
            } else {
                &mut self.d2m_error
            };
            register.set(register.get() & !clear.bits);
        }
    }

    fn status(&self) -> MailboxStatusWord {
        let mut status = MailboxStatusWord::new(0);
        let m2d = self.m2d.len() as u32;
        let d2m = self.d2m.len() as u32;
        status.modify(
            MBOX_STATUS::M2D_EMPTY.val((m2d == 0) as u32)
                + MBOX_STATUS::M2D_FULL.val((m2d as usize >= MAILBOX_FIFO_DEPTH) as u32)
                + MBOX_STATUS::M2D_THRESHOLD
                    .val((self.m2d_threshold != 0 && m2d >= self.m2d_threshold) as u32)
                + MBOX_STATUS::D2M_EMPTY.val((d2m == 0) as u32)
                + MBOX_STATUS::D2M_FULL.val((d2m as usize >= MAILBOX_FIFO_DEPTH) as u32)
                + MBOX_STATUS::D2M_THRESHOLD.val(self.d2m_above_threshold() as u32)
                + MBOX_STATUS::M2D_COUNT.val(m2d)
                + MBOX_STATUS::D2M_COUNT.val(d2m),
        );
        status
    }

    fn d2m_above_threshold(&self) -> bool {
        self.d2m_threshold != 0 && self.d2m.len() as u32 >= self.d2m_threshold
    }

    pub fn read(&mut self, address: u32, now_ns: u64) -> u32 {
        self.settle(now_ns);
        match address - self.base {
            registers::D2M_DATA => match self.d2m.pop_front() {
                Some(word) => word,
                None => {
                    self.d2m_error.modify(MBOX_ERROR::EMPTY::SET);
                    self.d2m_int_status.modify(MBOX_INT::ERROR::SET);
                    0
                }
            },
            registers::STATUS => self.status().get(),
            registers::M2D_ERROR => self.m2d_error.get(),
            registers::D2M_ERROR => self.d2m_error.get(),
            registers::M2D_THRESHOLD => self.m2d_threshold,
            registers::D2M_THRESHOLD => self.d2m_threshold,
            registers::M2D_INT_STATUS => self.m2d_int_status.get(),
            registers::D2M_INT_STATUS => self.d2m_int_status.get(),
            registers::M2D_INT_ENABLE => self.m2d_int_enable,
            registers::D2M_INT_ENABLE => self.d2m_int_enable,
            _ => 0,
        }
    }

    pub fn write(&mut self, address: u32, value: u32, now_ns: u64) {
        self.settle(now_ns);
        match address - self.base {
            registers::M2D_DATA => {
                if self.m2d.len() >= MAILBOX_FIFO_DEPTH {
                    self.m2d_error.modify(MBOX_ERROR::FULL::SET);
                    self.d2m_int_status.modify(MBOX_INT::ERROR::SET);
                } else {
                    self.m2d.push_back(value);
                }
            }
            register @ (registers::M2D_ERROR | registers::D2M_ERROR) => {
                self.pending_clears.push(PendingClear {
                    register,
                    bits: value,
                    deadline_ns: now_ns + self.settle_ns,
                });
            }
            registers::M2D_THRESHOLD => self.m2d_threshold = value,
            registers::D2M_THRESHOLD => self.d2m_threshold = value,
            registers::M2D_INT_STATUS => {
                self.m2d_int_status
                    .set(self.m2d_int_status.get() & !value);
            }
            registers::D2M_INT_STATUS => {
                self.d2m_int_status
                    .set(self.d2m_int_status.get() & !value);
                // level source: still above threshold means it fires again
                if self.d2m_above_threshold() {
                    self.d2m_int_status.modify(MBOX_INT::THRESHOLD::SET);
                }
            }
            registers::M2D_INT_ENABLE => self.m2d_int_enable = value,
            registers::D2M_INT_ENABLE => self.d2m_int_enable = value,
            _ => {}
        }
    }

    /// The DSP side pushes a word towards the host. False when the FIFO is full.
    pub fn remote_push(&mut self, word: u32) -> bool {
        if self.d2m.len() >= MAILBOX_FIFO_DEPTH {
            return false;
        }
        self.d2m.push_back(word);
        if self.d2m_above_threshold() {
            self.d2m_int_status.modify(MBOX_INT::THRESHOLD::SET);
        }
        true
    }

    /// The DSP side takes the oldest host word.
    pub fn remote_pop(&mut self) -> Option<u32> {
        self.m2d.pop_front()
    }

    /// Level of the mailbox interrupt line towards the host.
    pub fn host_interrupt_pending(&self) -> bool {
        self.d2m_int_status.get() & self.d2m_int_enable != 0
    }
}

impl Default for MailboxModel {
    fn default() -> Self {
        Self::new(MAILBOX_BASE_ADDR, 48_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = MAILBOX_BASE_ADDR;

    #[test]
    fn test_error_clear_waits_for_settle() {
        let mut mailbox = MailboxModel::new(BASE, 48_000_000);
        assert_eq!(mailbox.read(BASE + registers::D2M_DATA, 0), 0);
        assert_eq!(mailbox.read(BASE + registers::D2M_ERROR, 0), 2);

        mailbox.write(BASE + registers::D2M_ERROR, 2, 100);
        assert_eq!(mailbox.read(BASE + registers::D2M_ERROR, 101), 2);
        // 25 cycles at 48 MHz round up to 521 ns
        assert_eq!(mailbox.read(BASE + registers::D2M_ERROR, 621), 0);
    }

    #[test]
    fn test_threshold_interrupt_is_level() {
        let mut mailbox = MailboxModel::new(BASE, 48_000_000);
        mailbox.write(BASE + registers::D2M_THRESHOLD, 2, 0);
        mailbox.write(BASE + registers::D2M_INT_ENABLE, 1, 0);
        assert!(mailbox.remote_push(1));
        assert!(!mailbox.host_interrupt_pending());
        assert!(mailbox.remote_push(2));
        assert!(mailbox.host_interrupt_pending());

        mailbox.write(BASE + registers::D2M_INT_STATUS, 1, 0);
        assert!(mailbox.host_interrupt_pending());
        mailbox.read(BASE + registers::D2M_DATA, 0);
        mailbox.write(BASE + registers::D2M_INT_STATUS, 1, 0);
        assert!(!mailbox.host_interrupt_pending());
    }
}
