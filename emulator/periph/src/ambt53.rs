/*++

Licensed under the Apache-2.0 license.

File Name:

    ambt53.rs

Abstract:

    File contains the emulated AMBT53 as seen from the host's MSPI controller:
    the XSPI slave command set, remote memory, the mailbox block and the core
    reset lines. Every bus-visible action is recorded for inspection.

--*/

use crate::delay::TickDelay;
use crate::mailbox::MailboxModel;
use crate::memory::SparseMemory;
use ambt53_config::{
    Command, RemoteMemoryMap, BOOT_TEST_DATA_ADDRESS, BOOT_TEST_DATA_SIZE, MAILBOX_BASE_ADDR,
};
use ambt53_error::Ambt53Result;
use ambt53_fw_loader::PowerControl;
use ambt53_mspi::status::{XspiStatus, XSPI_STATUS, XSPI_STATUS_ERROR_MASK};
use ambt53_mspi::{
    BusConfig, BusError, BusInterrupts, DmaBuffer, DmaTransfer, MspiBus, PioData, PioTransfer,
    Priority, XipConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const SYNC_PATTERN: u32 = 0xA5;
const SOPM_OPCODES: core::ops::RangeInclusive<u8> = 0x20..=0x2A;

/// Bus-visible actions, in the order the device saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Configure(BusConfig),
    Pio {
        instruction: u8,
        address: Option<u32>,
    },
    Dma {
        address: u32,
        len: usize,
        write: bool,
        notify: bool,
        priority: Priority,
        scrambled: bool,
    },
    Scrambling(bool),
    XipRead {
        address: u32,
        len: usize,
    },
    XipWrite {
        address: u32,
        len: usize,
    },
    CoreHold,
    CoreRelease,
    GlobalResetAssert,
    GlobalResetRelease,
}

/// Remote bus fault: reported in BUS_ERR until it clears.
#[derive(Debug, Clone, Copy)]
enum BusFault {
    Persistent,
    /// Clears after this many more status reads.
    Transient(u32),
}

struct DeviceState {
    memory: SparseMemory,
    map: RemoteMemoryMap,
    mailbox: MailboxModel,
    xspi_errors: u32,
    bus_fault: Option<BusFault>,
    dummy_cycles: u8,
    sopm: Option<u8>,
    soft_resets: u32,
    version: u32,
    config_word: u32,
    enabled: bool,
    irq_pending: BusInterrupts,
    irq_enabled: BusInterrupts,
    xip: Option<XipConfig>,
    xip_enabled: bool,
    scrambling: bool,
    pio_busy: u32,
    not_idle: u32,
    dma_reject: bool,
    swallow_completion: bool,
    dma_error_next: bool,
    core_held: bool,
    global_reset: bool,
    boot_program: bool,
    log: Vec<Transaction>,
}

impl DeviceState {
    fn new(map: RemoteMemoryMap) -> Self {
        Self {
            memory: SparseMemory::default(),
            map,
            mailbox: MailboxModel::default(),
            xspi_errors: 0,
            bus_fault: None,
            dummy_cycles: 0,
            sopm: None,
            soft_resets: 0,
            version: 0x0001_0101,
            config_word: 0,
            enabled: false,
            irq_pending: BusInterrupts::empty(),
            irq_enabled: BusInterrupts::empty(),
            xip: None,
            xip_enabled: false,
            scrambling: false,
            pio_busy: 0,
            not_idle: 0,
            dma_reject: false,
            swallow_completion: false,
            dma_error_next: false,
            core_held: false,
            global_reset: false,
            boot_program: false,
            log: Vec::new(),
        }
    }

    fn status(&mut self) -> XspiStatus {
        let mut status = XspiStatus::new(self.xspi_errors);
        status.modify(
            XSPI_STATUS::DUMMY.val(self.dummy_cycles as u32) + XSPI_STATUS::SYNC.val(SYNC_PATTERN),
        );
        match self.bus_fault {
            Some(BusFault::Persistent) => status.modify(XSPI_STATUS::BUS_ERR::SET),
            Some(BusFault::Transient(0)) => self.bus_fault = None,
            Some(BusFault::Transient(reads)) => {
                status.modify(XSPI_STATUS::BUS_ERR::SET);
                self.bus_fault = Some(BusFault::Transient(reads - 1));
            }
            None => {}
        }
        status
    }

    /// PTCM is write-only from the bus and reads back as zero.
    fn read_memory(&self, address: u32, buf: &mut [u8]) {
        self.memory.read(address, buf);
        for (i, byte) in buf.iter_mut().enumerate() {
            if self.map.overlaps_ptcm(address.wrapping_add(i as u32), 1) {
                *byte = 0;
            }
        }
    }

    fn read_reg32(&mut self, address: u32, now_ns: u64) -> u32 {
        if self.mailbox.contains(address) {
            return self.mailbox.read(address, now_ns);
        }
        let mut word = [0u8; 4];
        self.read_memory(address, &mut word);
        u32::from_le_bytes(word)
    }

    fn write_reg32(&mut self, address: u32, value: u32, now_ns: u64) {
        if self.mailbox.contains(address) {
            self.mailbox.write(address, value, now_ns);
        } else {
            self.memory.write_u32(address, value);
        }
    }

    fn soft_reset(&mut self) {
        self.soft_resets += 1;
        self.xspi_errors = 0;
        self.dummy_cycles = 0;
        self.sopm = None;
    }

    fn pio(&mut self, transfer: PioTransfer<'_>, now_ns: u64) {
        let instruction = transfer.instruction;
        match (Command::try_from(instruction), transfer.data) {
            (Ok(Command::SoftReset), _) => self.soft_reset(),
            (Ok(Command::SetDummy), PioData::Write(data)) if !data.is_empty() => {
                self.dummy_cycles = data[0];
            }
            (Ok(Command::ReadStatus), PioData::Read(buf)) => {
                copy_word(buf, &self.status().get().to_be_bytes());
            }
            (Ok(Command::WriteStatus), PioData::Write(data)) => {
                let mut word = [0u8; 4];
                copy_word(&mut word, data);
                self.xspi_errors &= !(u32::from_be_bytes(word) & XSPI_STATUS_ERROR_MASK);
            }
            (Ok(Command::ReadVersion), PioData::Read(buf)) => {
                copy_word(buf, &self.version.to_le_bytes());
            }
            (Ok(Command::ReadConfig), PioData::Read(buf)) => {
                copy_word(buf, &self.config_word.to_le_bytes());
            }
            (Ok(Command::ReadBurst1), PioData::Read(buf)) => {
                let value = self.read_reg32(transfer.address.unwrap_or_default(), now_ns);
                copy_word(buf, &value.to_le_bytes());
            }
            (Ok(Command::WriteBurst1), PioData::Write(data)) => {
                let mut word = [0u8; 4];
                copy_word(&mut word, data);
                self.write_reg32(
                    transfer.address.unwrap_or_default(),
                    u32::from_le_bytes(word),
                    now_ns,
                );
            }
            (Ok(Command::ReadAddress | Command::ReadRxData | Command::ReadTxData), PioData::Read(buf)) => {
                buf.fill(0);
            }
            _ if SOPM_OPCODES.contains(&instruction) => self.sopm = Some(instruction),
            _ => self.xspi_errors |= XSPI_STATUS::INV_CMD::SET.value,
        }
    }

    fn dma(&mut self, transfer: DmaTransfer<'_>) {
        let write = matches!(transfer.buffer, DmaBuffer::Write(_));
        self.log.push(Transaction::Dma {
            address: transfer.address,
            len: transfer.buffer.len(),
            write,
            notify: transfer.notify,
            priority: transfer.priority,
            scrambled: transfer.scrambling,
        });
        match transfer.buffer {
            DmaBuffer::Read(buf) => self.read_memory(transfer.address, buf),
            DmaBuffer::Write(data) => self.memory.write(transfer.address, data),
        }
        if !transfer.notify || self.swallow_completion {
            return;
        }
        if self.dma_error_next {
            self.dma_error_next = false;
            self.irq_pending |= BusInterrupts::DMA_ERROR;
        } else {
            self.irq_pending |= BusInterrupts::DMA_COMPLETE;
        }
    }

    /// The firmware the boot check expects bumps every byte of its test region.
    fn run_boot_program(&mut self) {
        let mut region = [0u8; BOOT_TEST_DATA_SIZE];
        self.memory.read(BOOT_TEST_DATA_ADDRESS, &mut region);
        for byte in region.iter_mut() {
            *byte = byte.wrapping_add(1);
        }
        self.memory.write(BOOT_TEST_DATA_ADDRESS, &region);
    }
}

fn copy_word(dst: &mut [u8], src: &[u8]) {
    let len = dst.len().min(src.len());
    dst[..len].copy_from_slice(&src[..len]);
}

/// Handle on an emulated AMBT53. Clones share the same device.
#[derive(Clone)]
pub struct EmulatedAmbt53 {
    state: Arc<Mutex<DeviceState>>,
    now_ns: Arc<AtomicU64>,
}

impl Default for EmulatedAmbt53 {
    fn default() -> Self {
        Self::new(RemoteMemoryMap::default())
    }
}

impl EmulatedAmbt53 {
    pub fn new(map: RemoteMemoryMap) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::new(map))),
            now_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A delay that advances this device's clock.
    pub fn delay(&self) -> TickDelay {
        TickDelay::with_clock(self.now_ns.clone())
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }

    fn with<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.with(|state| state.log.clone())
    }

    pub fn clear_transactions(&self) {
        self.with(|state| state.log.clear())
    }

    /// DMA transactions only.
    pub fn dma_transactions(&self) -> Vec<Transaction> {
        self.with(|state| {
            state
                .log
                .iter()
                .filter(|t| matches!(t, Transaction::Dma { .. }))
                .cloned()
                .collect()
        })
    }

    /// Raw memory contents, bypassing the PTCM read restriction.
    pub fn memory(&self, address: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.with(|state| state.memory.read(address, &mut buf));
        buf
    }

    pub fn load_memory(&self, address: u32, data: &[u8]) {
        self.with(|state| state.memory.write(address, data))
    }

    pub fn dummy_cycles(&self) -> u8 {
        self.with(|state| state.dummy_cycles)
    }

    pub fn operating_mode_opcode(&self) -> Option<u8> {
        self.with(|state| state.sopm)
    }

    pub fn soft_resets(&self) -> u32 {
        self.with(|state| state.soft_resets)
    }

    pub fn is_enabled(&self) -> bool {
        self.with(|state| state.enabled)
    }

    pub fn bus_configs(&self) -> Vec<BusConfig> {
        self.with(|state| {
            state
                .log
                .iter()
                .filter_map(|t| match t {
                    Transaction::Configure(config) => Some(*config),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn set_version(&self, version: u32, config: u32) {
        self.with(|state| {
            state.version = version;
            state.config_word = config;
        })
    }

    /// Sticky XSPI error bits, without the bus fault.
    pub fn xspi_errors(&self) -> u32 {
        self.with(|state| state.xspi_errors)
    }

    pub fn inject_xspi_errors(&self, bits: u32) {
        self.with(|state| state.xspi_errors |= bits & XSPI_STATUS_ERROR_MASK)
    }

    /// Report BUS_ERR for the next `reads` status reads, or forever with `None`.
    pub fn inject_bus_fault(&self, reads: Option<u32>) {
        self.with(|state| {
            state.bus_fault = Some(match reads {
                Some(reads) => BusFault::Transient(reads),
                None => BusFault::Persistent,
            })
        })
    }

    /// The controller reports busy for the next `count` PIO commands.
    pub fn inject_pio_busy(&self, count: u32) {
        self.with(|state| state.pio_busy = count)
    }

    /// The controller reports activity for the next `count` idle checks.
    pub fn hold_busy(&self, count: u32) {
        self.with(|state| state.not_idle = count)
    }

    pub fn reject_dma(&self, reject: bool) {
        self.with(|state| state.dma_reject = reject)
    }

    /// Run DMA transfers but never raise their completion.
    pub fn swallow_completion(&self, swallow: bool) {
        self.with(|state| state.swallow_completion = swallow)
    }

    /// The next notifying DMA transfer ends with an error interrupt.
    pub fn fail_next_dma(&self) {
        self.with(|state| state.dma_error_next = true)
    }

    /// Behave as if the loaded firmware runs its boot check routine.
    pub fn set_boot_program(&self, enabled: bool) {
        self.with(|state| state.boot_program = enabled)
    }

    pub fn is_core_held(&self) -> bool {
        self.with(|state| state.core_held)
    }

    pub fn is_xip_enabled(&self) -> bool {
        self.with(|state| state.xip_enabled)
    }

    pub fn is_scrambling(&self) -> bool {
        self.with(|state| state.scrambling)
    }

    /// Last XIP aperture programmed by the host.
    pub fn xip_config(&self) -> Option<XipConfig> {
        self.with(|state| state.xip)
    }

    /// DSP side of the mailbox: send `word` to the host.
    pub fn mailbox_push(&self, word: u32) -> bool {
        self.with(|state| state.mailbox.remote_push(word))
    }

    /// DSP side of the mailbox: take the oldest host word.
    pub fn mailbox_pop(&self) -> Option<u32> {
        self.with(|state| state.mailbox.remote_pop())
    }

    pub fn mailbox_interrupt_pending(&self) -> bool {
        self.with(|state| state.mailbox.host_interrupt_pending())
    }

    pub fn mailbox_base(&self) -> u32 {
        MAILBOX_BASE_ADDR
    }

    pub(crate) fn set_core_held(&self, held: bool) {
        self.with(|state| {
            state.log.push(if held {
                Transaction::CoreHold
            } else {
                Transaction::CoreRelease
            });
            let releasing = state.core_held && !held;
            state.core_held = held;
            if releasing && state.boot_program {
                state.run_boot_program();
            }
        })
    }

    pub(crate) fn set_global_reset(&self, asserted: bool) {
        self.with(|state| {
            state.log.push(if asserted {
                Transaction::GlobalResetAssert
            } else {
                Transaction::GlobalResetRelease
            });
            if asserted && !state.global_reset {
                state.mailbox.reset();
            }
            state.global_reset = asserted;
        })
    }
}

impl MspiBus for EmulatedAmbt53 {
    fn configure(&self, config: &BusConfig) -> Result<(), BusError> {
        if config.clock_hz == 0 {
            return Err(BusError::InvalidConfig);
        }
        self.with(|state| state.log.push(Transaction::Configure(*config)));
        Ok(())
    }

    fn enable(&self) -> Result<(), BusError> {
        self.with(|state| state.enabled = true);
        Ok(())
    }

    fn disable(&self) -> Result<(), BusError> {
        self.with(|state| state.enabled = false);
        Ok(())
    }

    fn enable_fault_capture(&self) -> Result<(), BusError> {
        Ok(())
    }

    fn pio_transfer(&self, transfer: PioTransfer<'_>) -> Result<(), BusError> {
        let now_ns = self.now_ns();
        self.with(|state| {
            if !state.enabled {
                return Err(BusError::InvalidOperation);
            }
            if state.pio_busy > 0 {
                state.pio_busy -= 1;
                return Err(BusError::Busy);
            }
            state.log.push(Transaction::Pio {
                instruction: transfer.instruction,
                address: transfer.address,
            });
            state.pio(transfer, now_ns);
            Ok(())
        })
    }

    fn dma_transfer(&self, transfer: DmaTransfer<'_>) -> Result<(), BusError> {
        self.with(|state| {
            if !state.enabled || state.dma_reject {
                return Err(BusError::Fault);
            }
            state.dma(transfer);
            Ok(())
        })
    }

    fn interrupt_status(&self) -> BusInterrupts {
        self.with(|state| state.irq_pending & state.irq_enabled)
    }

    fn interrupt_clear(&self, interrupts: BusInterrupts) {
        self.with(|state| state.irq_pending.remove(interrupts))
    }

    fn interrupt_enable(&self, interrupts: BusInterrupts) {
        self.with(|state| state.irq_enabled.insert(interrupts))
    }

    fn interrupt_disable(&self, interrupts: BusInterrupts) {
        self.with(|state| state.irq_enabled.remove(interrupts))
    }

    fn is_idle(&self) -> bool {
        self.with(|state| {
            if state.not_idle > 0 {
                state.not_idle -= 1;
                return false;
            }
            true
        })
    }

    fn xip_configure(&self, config: &XipConfig) -> Result<(), BusError> {
        if config.aperture_size == 0 {
            return Err(BusError::InvalidConfig);
        }
        self.with(|state| state.xip = Some(*config));
        Ok(())
    }

    fn xip_enable(&self) -> Result<(), BusError> {
        self.with(|state| {
            if state.xip.is_none() {
                return Err(BusError::InvalidOperation);
            }
            state.xip_enabled = true;
            Ok(())
        })
    }

    fn xip_disable(&self) -> Result<(), BusError> {
        self.with(|state| state.xip_enabled = false);
        Ok(())
    }

    fn set_scrambling(&self, enable: bool) -> Result<(), BusError> {
        self.with(|state| {
            state.scrambling = enable;
            state.log.push(Transaction::Scrambling(enable));
        });
        Ok(())
    }

    fn xip_read(&self, offset: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let now_ns = self.now_ns();
        self.with(|state| {
            if !state.xip_enabled {
                return Err(BusError::InvalidOperation);
            }
            state.log.push(Transaction::XipRead {
                address: offset,
                len: buf.len(),
            });
            if state.mailbox.contains(offset) && buf.len() == 4 {
                let value = state.mailbox.read(offset, now_ns);
                buf.copy_from_slice(&value.to_le_bytes());
            } else {
                state.read_memory(offset, buf);
            }
            Ok(())
        })
    }

    fn xip_write(&self, offset: u32, data: &[u8]) -> Result<(), BusError> {
        let now_ns = self.now_ns();
        self.with(|state| {
            if !state.xip_enabled {
                return Err(BusError::InvalidOperation);
            }
            state.log.push(Transaction::XipWrite {
                address: offset,
                len: data.len(),
            });
            if state.mailbox.contains(offset) && data.len() == 4 {
                let mut word = [0u8; 4];
                word.copy_from_slice(data);
                state.mailbox.write(offset, u32::from_le_bytes(word), now_ns);
            } else {
                state.memory.write(offset, data);
            }
            Ok(())
        })
    }
}

impl PowerControl for EmulatedAmbt53 {
    fn core_hold(&self) -> Ambt53Result<()> {
        self.set_core_held(true);
        Ok(())
    }

    fn core_release(&self) -> Ambt53Result<()> {
        self.set_core_held(false);
        Ok(())
    }

    fn global_reset_assert(&self) -> Ambt53Result<()> {
        self.set_global_reset(true);
        Ok(())
    }

    fn global_reset_release(&self) -> Ambt53Result<()> {
        self.set_global_reset(false);
        Ok(())
    }
}
