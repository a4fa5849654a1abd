// Licensed under the Apache-2.0 license.

//! HIL interface between the AMBT53 transport and the platform's MSPI controller,
//! plus the access traits the transport offers to the drivers stacked on top of it.

use ambt53_config::OperatingMode;
use ambt53_error::{Ambt53Error, Ambt53Result};
use bitflags::bitflags;
use thiserror::Error;

/// Errors reported by the MSPI controller itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The controller is still working on an earlier transaction.
    #[error("bus busy")]
    Busy,
    /// The request is not valid in the controller's current state,
    /// typically because queued non-blocking transfers have not drained.
    #[error("invalid operation")]
    InvalidOperation,
    #[error("invalid bus configuration")]
    InvalidConfig,
    #[error("bus transfer fault")]
    Fault,
}

impl From<BusError> for Ambt53Error {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Busy => Ambt53Error::Busy,
            BusError::InvalidOperation => Ambt53Error::InvalidOperation,
            BusError::InvalidConfig => Ambt53Error::InvalidArg,
            BusError::Fault => Ambt53Error::Fail,
        }
    }
}

bitflags! {
    /// Controller interrupt sources the transport cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusInterrupts: u32 {
        const DMA_COMPLETE = 1 << 0;
        const DMA_ERROR = 1 << 1;
        const COMMAND_QUEUE_UPDATE = 1 << 2;
        const FAULT = 1 << 3;
    }
}

/// Controller settings applied by [`MspiBus::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub mode: OperatingMode,
    pub dqs: bool,
    pub clock_hz: u32,
    pub read_opcode: u8,
    pub write_opcode: u8,
    pub dummy_cycles: u8,
}

/// Execute-in-place aperture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XipConfig {
    /// Local address the aperture is mapped at.
    pub aperture_base: u32,
    pub aperture_size: u32,
    /// Remote range `[start, end)` that is scrambled on the wire.
    pub scrambling: Option<(u32, u32)>,
    /// Let the controller merge adjacent CPU reads, where supported.
    pub read_combine: bool,
}

impl Default for XipConfig {
    fn default() -> Self {
        Self {
            aperture_base: 0x1400_0000,
            aperture_size: 0x0400_0000,
            scrambling: None,
            read_combine: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Data phase of a PIO command.
#[derive(Debug)]
pub enum PioData<'b> {
    None,
    Read(&'b mut [u8]),
    Write(&'b [u8]),
}

/// A single blocking command: instruction, optional address and up to four data bytes.
#[derive(Debug)]
pub struct PioTransfer<'b> {
    pub instruction: u8,
    pub address: Option<u32>,
    pub data: PioData<'b>,
}

#[derive(Debug)]
pub enum DmaBuffer<'b> {
    Read(&'b mut [u8]),
    Write(&'b [u8]),
}

impl DmaBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            DmaBuffer::Read(buf) => buf.len(),
            DmaBuffer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One DMA transaction of at most one chunk.
#[derive(Debug)]
pub struct DmaTransfer<'b> {
    pub address: u32,
    pub buffer: DmaBuffer<'b>,
    pub priority: Priority,
    pub scrambling: bool,
    /// Raise [`BusInterrupts::DMA_COMPLETE`] when this transaction finishes.
    pub notify: bool,
}

/// The MSPI controller as seen by the transport.
///
/// All methods take `&self`; implementations keep their own interior state so the
/// transport can be shared with its interrupt handler.
pub trait MspiBus {
    /// Apply lane layout, clock and opcodes.
    fn configure(&self, config: &BusConfig) -> Result<(), BusError>;

    fn enable(&self) -> Result<(), BusError>;

    fn disable(&self) -> Result<(), BusError>;

    /// Latch the address of faulting transactions for later inspection.
    fn enable_fault_capture(&self) -> Result<(), BusError>;

    /// Execute a command and wait for it on the controller.
    ///
    /// # Arguments
    /// * `transfer` - instruction, address and data phase.
    ///
    /// # Returns
    /// * `Err(BusError::InvalidOperation)` while queued DMA transfers are still running.
    fn pio_transfer(&self, transfer: PioTransfer<'_>) -> Result<(), BusError>;

    /// Queue a DMA transaction.
    ///
    /// The buffer must stay untouched until the transaction completes; the transport
    /// either waits for completion before returning to its caller or keeps ownership
    /// of a `'static` buffer until the completion interrupt.
    fn dma_transfer(&self, transfer: DmaTransfer<'_>) -> Result<(), BusError>;

    fn interrupt_status(&self) -> BusInterrupts;

    fn interrupt_clear(&self, interrupts: BusInterrupts);

    fn interrupt_enable(&self, interrupts: BusInterrupts);

    fn interrupt_disable(&self, interrupts: BusInterrupts);

    /// No command, DMA or XIP activity on the controller.
    fn is_idle(&self) -> bool;

    fn xip_configure(&self, config: &XipConfig) -> Result<(), BusError>;

    /// Program the CPU read-combine policy. Controllers without one accept and ignore it.
    fn xip_read_combine(&self, _enable: bool) -> Result<(), BusError> {
        Ok(())
    }

    fn xip_enable(&self) -> Result<(), BusError>;

    fn xip_disable(&self) -> Result<(), BusError>;

    fn set_scrambling(&self, enable: bool) -> Result<(), BusError>;

    /// Load through the XIP aperture at `offset` from its base.
    fn xip_read(&self, offset: u32, buf: &mut [u8]) -> Result<(), BusError>;

    /// Store through the XIP aperture at `offset` from its base.
    fn xip_write(&self, offset: u32, data: &[u8]) -> Result<(), BusError>;
}

/// Receives completion of non-blocking DMA transfers.
pub trait DmaClient {
    /// The last chunk of a read finished. `buffer` is handed back to the caller.
    fn read_done(&self, buffer: &'static mut [u8], result: Ambt53Result<()>);

    /// The last chunk of a write finished. `buffer` is handed back to the caller.
    fn write_done(&self, buffer: &'static mut [u8], result: Ambt53Result<()>);
}

/// Cache maintenance for buffers the DMA engine touches.
pub trait CacheMaintenance {
    /// Write dirty lines covering `buffer` back to memory before the engine reads it.
    fn clean(&self, buffer: &[u8]);

    /// Drop lines covering `buffer` after the engine wrote it.
    fn invalidate(&self, buffer: &[u8]);
}

/// 32-bit register access on the remote.
pub trait RemoteRegisters {
    fn read_reg32(&self, address: u32) -> Ambt53Result<u32>;

    fn write_reg32(&self, address: u32, value: u32) -> Ambt53Result<()>;

    fn modify_reg32(&self, address: u32, clear: u32, set: u32) -> Ambt53Result<()> {
        let value = self.read_reg32(address)?;
        self.write_reg32(address, (value & !clear) | set)
    }
}

/// Blocking bulk access to remote memory.
pub trait RemoteMemory {
    fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()>;

    fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()>;
}
