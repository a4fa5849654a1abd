// Licensed under the Apache-2.0 license.

use crate::registers::{
    self, MailboxErrorWord, MailboxIntWord, MailboxStatusWord, MBOX_ERROR, MBOX_INT, MBOX_STATUS,
};
use ambt53_config::{MAILBOX_BASE_ADDR, MAILBOX_ERROR_SETTLE_CYCLES, MAILBOX_FIFO_DEPTH};
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_mspi::RemoteRegisters;
use ambt53_poll::delay_cycles;
use bitflags::bitflags;
use core::cell::{Cell, RefCell};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Doorbell words that can be routed to separate clients.
pub const MAX_KICK_CLIENTS: usize = 4;

bitflags! {
    /// Remote-to-host interrupt sources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MailboxInterrupts: u32 {
        const THRESHOLD = 1 << 0;
        const ERROR = 1 << 1;
    }

    /// Sticky host-side FIFO errors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MailboxErrors: u32 {
        /// A word was written while the host-to-remote FIFO was full.
        const WRITE_FULL = 1 << 0;
        /// A word was read while the remote-to-host FIFO was empty.
        const READ_EMPTY = 1 << 1;
    }
}

/// Decoded mailbox status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStatus {
    pub m2d_empty: bool,
    pub m2d_full: bool,
    pub m2d_threshold: bool,
    pub m2d_count: u8,
    pub d2m_empty: bool,
    pub d2m_full: bool,
    pub d2m_threshold: bool,
    pub d2m_count: u8,
}

impl From<MailboxStatusWord> for MailboxStatus {
    fn from(word: MailboxStatusWord) -> Self {
        Self {
            m2d_empty: word.is_set(MBOX_STATUS::M2D_EMPTY),
            m2d_full: word.is_set(MBOX_STATUS::M2D_FULL),
            m2d_threshold: word.is_set(MBOX_STATUS::M2D_THRESHOLD),
            m2d_count: word.read(MBOX_STATUS::M2D_COUNT) as u8,
            d2m_empty: word.is_set(MBOX_STATUS::D2M_EMPTY),
            d2m_full: word.is_set(MBOX_STATUS::D2M_FULL),
            d2m_threshold: word.is_set(MBOX_STATUS::D2M_THRESHOLD),
            d2m_count: word.read(MBOX_STATUS::D2M_COUNT) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxConfig {
    pub base: u32,
    /// Bus clock used to turn the settle cycle count into a delay.
    pub clock_hz: u32,
    pub settle_cycles: u32,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            base: MAILBOX_BASE_ADDR,
            clock_hz: 48_000_000,
            settle_cycles: MAILBOX_ERROR_SETTLE_CYCLES,
        }
    }
}

/// Receives doorbell words pulled out of the remote-to-host FIFO.
pub trait KickClient {
    fn kicked(&self, word: u32);
}

pub struct MailboxChannel<'a, R: RemoteRegisters, D: DelayNs> {
    regs: &'a R,
    delay: RefCell<D>,
    config: MailboxConfig,
    kick_clients: [Cell<Option<(u32, &'a dyn KickClient)>>; MAX_KICK_CLIENTS],
}

impl<'a, R: RemoteRegisters, D: DelayNs> MailboxChannel<'a, R, D> {
    pub fn new(regs: &'a R, delay: D, config: MailboxConfig) -> Self {
        Self {
            regs,
            delay: RefCell::new(delay),
            config,
            kick_clients: Default::default(),
        }
    }

    fn read(&self, offset: u32) -> Ambt53Result<u32> {
        self.regs.read_reg32(self.config.base + offset)
    }

    fn write(&self, offset: u32, value: u32) -> Ambt53Result<()> {
        self.regs.write_reg32(self.config.base + offset, value)
    }

    /// Drop stale inbound words, clear sticky errors, program the remote-to-host
    /// threshold and enable `interrupts`.
    pub fn init(&self, threshold: u32, interrupts: MailboxInterrupts) -> Ambt53Result<()> {
        if threshold == 0 || threshold >= MAILBOX_FIFO_DEPTH as u32 {
            return Err(Ambt53Error::InvalidArg);
        }
        let flushed = self.flush_data(None)?;
        if flushed > 0 {
            debug!("ambt53-mailbox: dropped {} stale words", flushed);
        }
        let remaining = self.clear_errors_settled(MailboxErrors::all())?;
        if !remaining.is_empty() {
            warn!("ambt53-mailbox: errors {:?} still set after clear", remaining);
        }
        self.write(registers::D2M_THRESHOLD, threshold)?;
        self.write(registers::D2M_INT_ENABLE, interrupts.bits())?;
        Ok(())
    }

    pub fn status(&self) -> Ambt53Result<MailboxStatus> {
        Ok(MailboxStatusWord::new(self.read(registers::STATUS)?).into())
    }

    /// Push words until the FIFO reports full, at most one FIFO depth per call.
    /// Returns how many went out.
    pub fn write_data(&self, words: &[u32]) -> Ambt53Result<usize> {
        let words = &words[..words.len().min(MAILBOX_FIFO_DEPTH)];
        for (written, word) in words.iter().enumerate() {
            if self.status()?.m2d_full {
                return Ok(written);
            }
            self.write(registers::M2D_DATA, *word)?;
        }
        Ok(words.len())
    }

    /// Pull words until the FIFO reports empty or `words` is full.
    pub fn read_data(&self, words: &mut [u32]) -> Ambt53Result<usize> {
        for (read, slot) in words.iter_mut().enumerate() {
            if self.status()?.d2m_empty {
                return Ok(read);
            }
            *slot = self.read(registers::D2M_DATA)?;
        }
        Ok(words.len())
    }

    /// Drain the remote-to-host FIFO. Words beyond `keep` (or all of them without
    /// one) are discarded. Returns how many words were drained.
    pub fn flush_data(&self, mut keep: Option<&mut [u32]>) -> Ambt53Result<usize> {
        let mut drained = 0;
        while drained < MAILBOX_FIFO_DEPTH && !self.status()?.d2m_empty {
            let word = self.read(registers::D2M_DATA)?;
            if let Some(slot) = keep.as_deref_mut().and_then(|buf| buf.get_mut(drained)) {
                *slot = word;
            }
            drained += 1;
        }
        Ok(drained)
    }

    pub fn errors(&self) -> Ambt53Result<MailboxErrors> {
        let m2d = MailboxErrorWord::new(self.read(registers::M2D_ERROR)?);
        let d2m = MailboxErrorWord::new(self.read(registers::D2M_ERROR)?);
        let mut errors = MailboxErrors::empty();
        errors.set(MailboxErrors::WRITE_FULL, m2d.is_set(MBOX_ERROR::FULL));
        errors.set(MailboxErrors::READ_EMPTY, d2m.is_set(MBOX_ERROR::EMPTY));
        Ok(errors)
    }

    /// Write back only the requested error bits. The remote needs the settle delay
    /// before the bits read back as clear.
    pub fn clear_errors(&self, errors: MailboxErrors) -> Ambt53Result<()> {
        if errors.contains(MailboxErrors::WRITE_FULL) {
            let word = MailboxErrorWord::new(MBOX_ERROR::FULL::SET.value);
            self.write(registers::M2D_ERROR, word.get())?;
        }
        if errors.contains(MailboxErrors::READ_EMPTY) {
            let word = MailboxErrorWord::new(MBOX_ERROR::EMPTY::SET.value);
            self.write(registers::D2M_ERROR, word.get())?;
        }
        Ok(())
    }

    /// Clear `errors`, wait out the settle delay and return whatever is still set.
    pub fn clear_errors_settled(&self, errors: MailboxErrors) -> Ambt53Result<MailboxErrors> {
        self.clear_errors(errors)?;
        delay_cycles(
            &mut *self.delay.borrow_mut(),
            self.config.settle_cycles,
            self.config.clock_hz,
        );
        self.errors()
    }

    pub fn interrupt_status(&self) -> Ambt53Result<MailboxInterrupts> {
        let word = MailboxIntWord::new(self.read(registers::D2M_INT_STATUS)?);
        let mut pending = MailboxInterrupts::empty();
        pending.set(MailboxInterrupts::THRESHOLD, word.is_set(MBOX_INT::THRESHOLD));
        pending.set(MailboxInterrupts::ERROR, word.is_set(MBOX_INT::ERROR));
        Ok(pending)
    }

    pub fn interrupt_enable(&self, interrupts: MailboxInterrupts) -> Ambt53Result<()> {
        self.regs
            .modify_reg32(self.config.base + registers::D2M_INT_ENABLE, 0, interrupts.bits())
    }

    pub fn interrupt_disable(&self, interrupts: MailboxInterrupts) -> Ambt53Result<()> {
        self.regs
            .modify_reg32(self.config.base + registers::D2M_INT_ENABLE, interrupts.bits(), 0)
    }

    /// Route received `word`s to `client`.
    pub fn register_kick_client(&self, word: u32, client: &'a dyn KickClient) -> Ambt53Result<()> {
        let slot = self
            .kick_clients
            .iter()
            .find(|slot| slot.get().is_none())
            .ok_or(Ambt53Error::NoSpace)?;
        slot.set(Some((word, client)));
        Ok(())
    }

    fn dispatch(&self, word: u32) {
        let mut delivered = false;
        for (kick, client) in self.kick_clients.iter().filter_map(Cell::get) {
            if kick == word {
                client.kicked(word);
                delivered = true;
            }
        }
        if !delivered {
            debug!("ambt53-mailbox: no client for word {:#x}", word);
        }
    }

    fn service_pending(&self) -> Ambt53Result<()> {
        let pending = self.interrupt_status()?;
        if pending.contains(MailboxInterrupts::THRESHOLD) {
            let mut drained = 0;
            while drained < MAILBOX_FIFO_DEPTH && !self.status()?.d2m_empty {
                let word = self.read(registers::D2M_DATA)?;
                self.dispatch(word);
                drained += 1;
            }
        }
        if pending.contains(MailboxInterrupts::ERROR) {
            let errors = self.errors()?;
            warn!("ambt53-mailbox: FIFO errors {:?}", errors);
            self.clear_errors(errors)?;
        }
        Ok(())
    }

    /// Mailbox interrupt handler.
    ///
    /// Drains the FIFO before acknowledging so a retriggered threshold is not lost,
    /// then clears both interrupt bits and returns the status read afterwards.
    /// The acknowledgement is written even when servicing fails part way; the
    /// first failure is returned after it.
    pub fn service_interrupt(&self) -> Ambt53Result<MailboxInterrupts> {
        let serviced = self.service_pending();
        if let Err(err) = serviced {
            warn!("ambt53-mailbox: servicing failed: {}", err);
        }

        let ack = MBOX_INT::THRESHOLD::SET + MBOX_INT::ERROR::SET;
        let acked = self.write(registers::D2M_INT_STATUS, ack.value);
        let status = self.interrupt_status();
        serviced?;
        acked?;
        status
    }

    /// Ring the remote's doorbell with `word`.
    pub fn kick(&self, word: u32) -> Ambt53Result<()> {
        match self.write_data(&[word])? {
            0 => Err(Ambt53Error::Busy),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_status_decode() {
        let status: MailboxStatus = MailboxStatusWord::new(0x0520_0102 | (3 << 16)).into();
        assert!(status.m2d_full);
        assert!(!status.m2d_empty);
        assert!(status.d2m_empty);
        assert_eq!(status.m2d_count, 0x23);
        assert_eq!(status.d2m_count, 5);
    }

    /// Register file that fails the next read of one address.
    #[derive(Default)]
    struct FlakyRegisters {
        values: RefCell<BTreeMap<u32, u32>>,
        writes: RefCell<Vec<(u32, u32)>>,
        fail_read: Cell<Option<u32>>,
        status_reads: Cell<u32>,
    }

    impl RemoteRegisters for FlakyRegisters {
        fn read_reg32(&self, address: u32) -> Ambt53Result<u32> {
            if self.fail_read.get() == Some(address) {
                self.fail_read.set(None);
                return Err(Ambt53Error::Fail);
            }
            if address == MAILBOX_BASE_ADDR + registers::STATUS {
                self.status_reads.set(self.status_reads.get() + 1);
            }
            Ok(self.values.borrow().get(&address).copied().unwrap_or(0))
        }

        fn write_reg32(&self, address: u32, value: u32) -> Ambt53Result<()> {
            self.writes.borrow_mut().push((address, value));
            self.values.borrow_mut().insert(address, value);
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_service_acks_after_a_failed_read() {
        let regs = FlakyRegisters::default();
        regs.values.borrow_mut().extend([
            (MAILBOX_BASE_ADDR + registers::D2M_INT_STATUS, 0x3),
            (MAILBOX_BASE_ADDR + registers::STATUS, 0),
        ]);
        regs.fail_read.set(Some(MAILBOX_BASE_ADDR + registers::D2M_DATA));
        let mailbox = MailboxChannel::new(&regs, NoDelay, MailboxConfig::default());

        assert_eq!(mailbox.service_interrupt(), Err(Ambt53Error::Fail));
        assert_eq!(
            *regs.writes.borrow(),
            [(MAILBOX_BASE_ADDR + registers::D2M_INT_STATUS, 0x3)]
        );

        // a failed status read is acknowledged the same way
        regs.writes.borrow_mut().clear();
        regs.fail_read
            .set(Some(MAILBOX_BASE_ADDR + registers::D2M_INT_STATUS));
        assert_eq!(mailbox.service_interrupt(), Err(Ambt53Error::Fail));
        assert_eq!(
            *regs.writes.borrow(),
            [(MAILBOX_BASE_ADDR + registers::D2M_INT_STATUS, 0x3)]
        );
    }

    #[test]
    fn test_write_is_capped_at_fifo_depth() {
        let regs = FlakyRegisters::default();
        let mailbox = MailboxChannel::new(&regs, NoDelay, MailboxConfig::default());
        // the status register never reports full
        let words = [7u32; MAILBOX_FIFO_DEPTH + 8];
        assert_eq!(mailbox.write_data(&words).unwrap(), MAILBOX_FIFO_DEPTH);
        assert_eq!(regs.writes.borrow().len(), MAILBOX_FIFO_DEPTH);
        assert_eq!(regs.status_reads.get(), MAILBOX_FIFO_DEPTH as u32);
    }

    #[test]
    fn test_interrupt_bits_match_register() {
        assert_eq!(MailboxInterrupts::THRESHOLD.bits(), MBOX_INT::THRESHOLD::SET.value);
        assert_eq!(MailboxInterrupts::ERROR.bits(), MBOX_INT::ERROR::SET.value);
    }
}
