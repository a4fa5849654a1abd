// Licensed under the Apache-2.0 license.

// Command/address/data transport to the AMBT53 over an MSPI controller.
//
// PIO carries register-sized commands, DMA carries bulk data split at the
// chunk limit negotiated from the configured opcodes, and the XIP aperture maps
// remote memory into the local address space.

use crate::hil::{
    BusConfig, BusError, BusInterrupts, CacheMaintenance, DmaBuffer, DmaClient, DmaTransfer,
    MspiBus, PioData, PioTransfer, Priority, RemoteMemory, RemoteRegisters, XipConfig,
};
use crate::status::{has_errors, XspiStatus, XSPI_STATUS, XSPI_STATUS_ERRORS};
use ambt53_config::opcode::{read_limit, write_limit};
use ambt53_config::{
    Command, OpcodeLimit, OperatingMode, DEFAULT_OPCODE_TABLE, MSPI_DEFAULT_DUMMY_CYCLES,
    MSPI_IDLE_TIMEOUT_US, MSPI_MIN_DUMMY_CYCLES, MSPI_TRANSFER_TIMEOUT,
};
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_poll::{delay_cycles, poll_until, SharedDelay};
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

/// Largest data phase of a PIO command.
pub const PIO_MAX_BYTES: usize = 4;

/// Bus cycles the remote needs after a soft reset.
const SOFT_RESET_SETTLE_CYCLES: u32 = 5;

/// How DMA completion reaches a blocking caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// The platform calls [`MspiTransport::handle_interrupt`] from the MSPI interrupt.
    Interrupt,
    /// Blocking waits service the controller status themselves.
    Polled,
}

#[derive(Debug, Clone, Copy)]
pub struct MspiConfig {
    pub mode: OperatingMode,
    pub dqs: bool,
    pub clock_hz: u32,
    pub read_opcode: u8,
    pub write_opcode: u8,
    pub dummy_cycles: u8,
    /// Opcode pairs and their chunk limits; the configured opcodes are looked up here.
    pub opcode_table: &'static [OpcodeLimit],
    pub xip: XipConfig,
    pub completion: CompletionMode,
    /// Iterations of roughly 1 us before a blocking transfer gives up.
    pub transfer_timeout: u32,
    pub idle_timeout_us: u32,
}

impl Default for MspiConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Serial1_1_1,
            dqs: false,
            clock_hz: 48_000_000,
            read_opcode: 0xC0,
            write_opcode: 0x7F,
            dummy_cycles: MSPI_DEFAULT_DUMMY_CYCLES,
            opcode_table: DEFAULT_OPCODE_TABLE,
            xip: XipConfig::default(),
            completion: CompletionMode::Interrupt,
            transfer_timeout: MSPI_TRANSFER_TIMEOUT,
            idle_timeout_us: MSPI_IDLE_TIMEOUT_US,
        }
    }
}

impl MspiConfig {
    fn bus_config(&self, mode: OperatingMode, dqs: bool) -> BusConfig {
        BusConfig {
            mode,
            dqs,
            clock_hz: self.clock_hz,
            read_opcode: self.read_opcode,
            write_opcode: self.write_opcode,
            dummy_cycles: self.dummy_cycles,
        }
    }
}

/// One piece of a transfer split at the chunk limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub address: u32,
    /// Offset of this piece in the caller's buffer.
    pub offset: usize,
    pub len: usize,
    pub last: bool,
}

/// Iterator over the chunks tiling `[address, address + len)`.
pub struct Chunks {
    address: u32,
    offset: usize,
    len: usize,
    limit: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.len {
            return None;
        }
        let size = self.limit.min(self.len - self.offset);
        let chunk = Chunk {
            address: self.address.wrapping_add(self.offset as u32),
            offset: self.offset,
            len: size,
            last: self.offset + size == self.len,
        };
        self.offset += size;
        Some(chunk)
    }
}

pub fn chunks(address: u32, len: usize, limit: usize) -> Chunks {
    Chunks {
        address,
        offset: 0,
        len,
        limit: limit.max(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

struct PendingDma {
    buffer: &'static mut [u8],
    len: usize,
    direction: Direction,
}

pub struct MspiTransport<'a, B: MspiBus, D: DelayNs> {
    bus: B,
    delay: RefCell<D>,
    config: MspiConfig,
    max_read_chunk: usize,
    max_write_chunk: usize,
    xip_enabled: Cell<bool>,
    scrambling: Cell<bool>,
    dma_complete: AtomicBool,
    dma_failed: AtomicBool,
    async_busy: Cell<bool>,
    pending: Cell<Option<PendingDma>>,
    client: Cell<Option<&'a dyn DmaClient>>,
    cache: Cell<Option<&'a dyn CacheMaintenance>>,
}

impl<'a, B: MspiBus, D: DelayNs> MspiTransport<'a, B, D> {
    /// Bring up the bus and the remote XSPI slave.
    ///
    /// The bus starts in serial mode, the remote is soft-reset and told its dummy
    /// cycle count and operating mode, then the bus switches to the requested mode.
    pub fn open(bus: B, delay: D, config: MspiConfig) -> Ambt53Result<Self> {
        if config.clock_hz == 0 || config.dummy_cycles < MSPI_MIN_DUMMY_CYCLES {
            error!(
                "ambt53-mspi: bad clock {} or dummy cycles {}",
                config.clock_hz, config.dummy_cycles
            );
            return Err(Ambt53Error::InvalidArg);
        }
        let sopm = config.mode.sopm_opcode(config.dqs).ok_or_else(|| {
            error!("ambt53-mspi: no DQS variant for {:?}", config.mode);
            Ambt53Error::InvalidArg
        })?;
        let max_write_chunk = write_limit(config.opcode_table, config.write_opcode);
        let max_read_chunk = read_limit(config.opcode_table, config.read_opcode);
        let (Some(max_write_chunk), Some(max_read_chunk)) = (max_write_chunk, max_read_chunk)
        else {
            error!(
                "ambt53-mspi: opcodes {:#x}/{:#x} not in the opcode table",
                config.write_opcode, config.read_opcode
            );
            return Err(Ambt53Error::InvalidArg);
        };
        if config.xip.aperture_size == 0 {
            return Err(Ambt53Error::InvalidArg);
        }

        let transport = Self {
            bus,
            delay: RefCell::new(delay),
            config,
            max_read_chunk: max_read_chunk as usize,
            max_write_chunk: max_write_chunk as usize,
            xip_enabled: Cell::new(false),
            scrambling: Cell::new(false),
            dma_complete: AtomicBool::new(false),
            dma_failed: AtomicBool::new(false),
            async_busy: Cell::new(false),
            pending: Cell::new(None),
            client: Cell::new(None),
            cache: Cell::new(None),
        };
        transport.bring_up(sopm).map_err(|err| {
            error!("ambt53-mspi: bring-up failed: {}", err);
            Ambt53Error::BusInitFailed
        })?;
        info!(
            "ambt53-mspi: open in {:?} (dqs {}), read chunk {} write chunk {}",
            config.mode, config.dqs, transport.max_read_chunk, transport.max_write_chunk
        );
        Ok(transport)
    }

    fn bring_up(&self, sopm: u8) -> Ambt53Result<()> {
        let serial = self.config.bus_config(OperatingMode::Serial1_1_1, false);
        self.bus.configure(&serial)?;
        self.bus.enable_fault_capture()?;
        self.bus.enable()?;

        self.remote_reset()?;
        self.pio_write_raw(Command::SetDummy.into(), None, &[self.config.dummy_cycles])?;
        self.pio_write_raw(sopm, None, &[])?;

        let target = self.config.bus_config(self.config.mode, self.config.dqs);
        self.bus.configure(&target)?;
        self.bus
            .interrupt_enable(BusInterrupts::DMA_COMPLETE | BusInterrupts::DMA_ERROR);
        self.status_check()?;
        Ok(())
    }

    fn remote_reset(&self) -> Ambt53Result<()> {
        self.pio_write_raw(Command::SoftReset.into(), None, &[])?;
        delay_cycles(
            &mut *self.delay.borrow_mut(),
            SOFT_RESET_SETTLE_CYCLES,
            self.config.clock_hz,
        );
        Ok(())
    }

    /// Shut the bus down and hand back the controller and delay.
    pub fn close(self) -> (B, D) {
        if self.xip_enabled.get() {
            if let Err(err) = self.bus.xip_disable() {
                warn!("ambt53-mspi: xip disable on close failed: {}", err);
            }
        }
        self.bus.interrupt_disable(BusInterrupts::all());
        if let Err(err) = self.bus.disable() {
            warn!("ambt53-mspi: bus disable on close failed: {}", err);
        }
        debug!("ambt53-mspi: closed");
        (self.bus, self.delay.into_inner())
    }

    pub fn set_client(&self, client: &'a dyn DmaClient) {
        self.client.set(Some(client));
    }

    pub fn set_cache(&self, cache: &'a dyn CacheMaintenance) {
        self.cache.set(Some(cache));
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &MspiConfig {
        &self.config
    }

    pub fn max_read_chunk(&self) -> usize {
        self.max_read_chunk
    }

    pub fn max_write_chunk(&self) -> usize {
        self.max_write_chunk
    }

    pub fn is_xip_enabled(&self) -> bool {
        self.xip_enabled.get()
    }

    /// A non-blocking transfer is still waiting for its completion interrupt.
    pub fn is_transfer_pending(&self) -> bool {
        self.async_busy.get()
    }

    fn delay_us(&self, us: u32) {
        self.delay.borrow_mut().delay_us(us);
    }

    /// Retry a controller call while it reports busy, up to the transfer timeout.
    fn retry_on_busy<F>(&self, mut attempt: F) -> Ambt53Result<()>
    where
        F: FnMut() -> Result<(), BusError>,
    {
        let mut last = BusError::Busy;
        for _ in 0..=self.config.transfer_timeout {
            match attempt() {
                Ok(()) => return Ok(()),
                Err(err @ (BusError::Busy | BusError::InvalidOperation)) => {
                    last = err;
                    self.delay_us(1);
                }
                Err(err) => {
                    warn!("ambt53-mspi: PIO transfer failed: {}", err);
                    return Err(Ambt53Error::Fail);
                }
            }
        }
        warn!("ambt53-mspi: PIO transfer timed out ({})", last);
        Err(match last {
            BusError::Busy => Ambt53Error::Busy,
            _ => Ambt53Error::Fail,
        })
    }

    fn pio_read_raw(&self, instruction: u8, address: Option<u32>, buf: &mut [u8]) -> Ambt53Result<()> {
        self.retry_on_busy(|| {
            self.bus.pio_transfer(PioTransfer {
                instruction,
                address,
                data: PioData::Read(&mut *buf),
            })
        })
    }

    fn pio_write_raw(&self, instruction: u8, address: Option<u32>, data: &[u8]) -> Ambt53Result<()> {
        self.retry_on_busy(|| {
            self.bus.pio_transfer(PioTransfer {
                instruction,
                address,
                data: if data.is_empty() {
                    PioData::None
                } else {
                    PioData::Write(data)
                },
            })
        })
    }

    /// Blocking command with a data phase read back from the remote.
    pub fn pio_read(&self, instruction: u8, address: Option<u32>, buf: &mut [u8]) -> Ambt53Result<()> {
        if buf.is_empty() || buf.len() > PIO_MAX_BYTES {
            return Err(Ambt53Error::InvalidArg);
        }
        self.wait_idle(self.config.idle_timeout_us)?;
        self.status_check()?;
        self.pio_read_raw(instruction, address, buf)?;
        self.wait_idle(self.config.idle_timeout_us)
    }

    /// Blocking command with an optional data phase sent to the remote.
    pub fn pio_write(&self, instruction: u8, address: Option<u32>, data: &[u8]) -> Ambt53Result<()> {
        if data.len() > PIO_MAX_BYTES {
            return Err(Ambt53Error::InvalidArg);
        }
        self.wait_idle(self.config.idle_timeout_us)?;
        self.status_check()?;
        self.pio_write_raw(instruction, address, data)?;
        self.wait_idle(self.config.idle_timeout_us)
    }

    pub fn read_version(&self) -> Ambt53Result<u32> {
        let mut word = [0u8; 4];
        self.pio_read(Command::ReadVersion.into(), None, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    pub fn read_config(&self) -> Ambt53Result<u32> {
        let mut word = [0u8; 4];
        self.pio_read(Command::ReadConfig.into(), None, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Wait until the controller reports no activity at all.
    pub fn wait_idle(&self, budget_us: u32) -> Ambt53Result<()> {
        let mut delay = SharedDelay(&self.delay);
        poll_until(&mut delay, budget_us, 1, || Ok(self.bus.is_idle())).inspect_err(|_| {
            error!("ambt53-mspi: wait for bus idle timed out");
        })
    }

    fn read_status(&self) -> Ambt53Result<XspiStatus> {
        let mut word = [0u8; 4];
        self.pio_read_raw(Command::ReadStatus.into(), None, &mut word)?;
        Ok(XspiStatus::new(u32::from_be_bytes(word)))
    }

    fn write_status(&self, status: XspiStatus) -> Ambt53Result<()> {
        self.pio_write_raw(Command::WriteStatus.into(), None, &status.get().to_be_bytes())
    }

    /// Read the remote status and acknowledge any sticky error flags.
    ///
    /// A reported bus error holds everything up until the remote drops it; if it is
    /// still set after the transfer timeout the check fails with `HardwareFault`.
    pub fn status_check(&self) -> Ambt53Result<XspiStatus> {
        let status = self.read_status()?;
        if !has_errors(&status) {
            return Ok(status);
        }
        for (field, reason) in XSPI_STATUS_ERRORS.iter() {
            if status.is_set(*field) {
                warn!("ambt53-mspi: AMBT53 XSPI {} detected", reason);
            }
        }
        if status.is_set(XSPI_STATUS::BUS_ERR) {
            let mut delay = SharedDelay(&self.delay);
            poll_until(&mut delay, self.config.transfer_timeout, 1, || {
                Ok(!self.read_status()?.is_set(XSPI_STATUS::BUS_ERR))
            })
            .map_err(|err| match err {
                Ambt53Error::Timeout => {
                    error!("ambt53-mspi: remote bus error did not clear");
                    Ambt53Error::HardwareFault
                }
                other => other,
            })?;
        }
        self.write_status(status)?;
        Ok(status)
    }

    /// Single-attempt status acknowledge used from the completion path, which must
    /// not sleep.
    fn clear_status_errors_once(&self) {
        let mut word = [0u8; 4];
        let read = self.bus.pio_transfer(PioTransfer {
            instruction: Command::ReadStatus.into(),
            address: None,
            data: PioData::Read(&mut word),
        });
        if read.is_err() {
            return;
        }
        let status = XspiStatus::new(u32::from_be_bytes(word));
        if has_errors(&status) {
            debug!("ambt53-mspi: clearing status {:#010x} after DMA", status.get());
            let value = status.get().to_be_bytes();
            if let Err(err) = self.bus.pio_transfer(PioTransfer {
                instruction: Command::WriteStatus.into(),
                address: None,
                data: PioData::Write(&value),
            }) {
                debug!("ambt53-mspi: status clear after DMA failed: {}", err);
            }
        }
    }

    fn begin_dma(&self) -> Ambt53Result<()> {
        if self.async_busy.get() {
            return Err(Ambt53Error::AlreadyInProgress);
        }
        self.wait_idle(self.config.idle_timeout_us)?;
        self.status_check()?;
        self.dma_complete.store(false, Ordering::Release);
        self.dma_failed.store(false, Ordering::Release);
        Ok(())
    }

    fn wait_dma_complete(&self) -> Ambt53Result<()> {
        let mut delay = SharedDelay(&self.delay);
        poll_until(&mut delay, self.config.transfer_timeout, 1, || {
            if self.config.completion == CompletionMode::Polled {
                self.handle_interrupt();
            }
            Ok(self.dma_complete.load(Ordering::Acquire))
        })
        .map_err(|err| match err {
            Ambt53Error::Timeout => {
                error!("ambt53-mspi: DMA completion timed out");
                Ambt53Error::Fail
            }
            other => other,
        })?;
        if self.dma_failed.swap(false, Ordering::AcqRel) {
            return Err(Ambt53Error::Fail);
        }
        Ok(())
    }

    fn issue_failed(&self, err: BusError, chunk: &Chunk) -> Ambt53Error {
        error!(
            "ambt53-mspi: DMA chunk at {:#x} ({} bytes) rejected: {}",
            chunk.address, chunk.len, err
        );
        Ambt53Error::Fail
    }

    /// Read `buf.len()` bytes from `address`, waiting for the last chunk.
    pub fn dma_read(&self, address: u32, buf: &mut [u8], priority: Priority) -> Ambt53Result<()> {
        if buf.is_empty() {
            return Err(Ambt53Error::InvalidArg);
        }
        self.begin_dma()?;
        for chunk in chunks(address, buf.len(), self.max_read_chunk) {
            self.bus
                .dma_transfer(DmaTransfer {
                    address: chunk.address,
                    buffer: DmaBuffer::Read(&mut buf[chunk.offset..chunk.offset + chunk.len]),
                    priority,
                    scrambling: self.scrambling.get(),
                    notify: chunk.last,
                })
                .map_err(|err| self.issue_failed(err, &chunk))?;
        }
        self.wait_dma_complete()?;
        if let Some(cache) = self.cache.get() {
            cache.invalidate(buf);
        }
        Ok(())
    }

    /// Write `data` to `address`, waiting for the last chunk.
    pub fn dma_write(&self, address: u32, data: &[u8], priority: Priority) -> Ambt53Result<()> {
        if data.is_empty() {
            return Err(Ambt53Error::InvalidArg);
        }
        self.begin_dma()?;
        if let Some(cache) = self.cache.get() {
            cache.clean(data);
        }
        for chunk in chunks(address, data.len(), self.max_write_chunk) {
            self.bus
                .dma_transfer(DmaTransfer {
                    address: chunk.address,
                    buffer: DmaBuffer::Write(&data[chunk.offset..chunk.offset + chunk.len]),
                    priority,
                    scrambling: self.scrambling.get(),
                    notify: chunk.last,
                })
                .map_err(|err| self.issue_failed(err, &chunk))?;
        }
        self.wait_dma_complete()
    }

    /// Start reading `len` bytes into `buffer`; the client's `read_done` gets the
    /// buffer back after the last chunk.
    pub fn dma_read_async(
        &self,
        address: u32,
        buffer: &'static mut [u8],
        len: usize,
        priority: Priority,
    ) -> Result<(), (Ambt53Error, &'static mut [u8])> {
        self.start_async(address, buffer, len, priority, Direction::Read)
    }

    /// Start writing the first `len` bytes of `buffer`; the client's `write_done`
    /// gets the buffer back after the last chunk.
    pub fn dma_write_async(
        &self,
        address: u32,
        buffer: &'static mut [u8],
        len: usize,
        priority: Priority,
    ) -> Result<(), (Ambt53Error, &'static mut [u8])> {
        self.start_async(address, buffer, len, priority, Direction::Write)
    }

    fn start_async(
        &self,
        address: u32,
        buffer: &'static mut [u8],
        len: usize,
        priority: Priority,
        direction: Direction,
    ) -> Result<(), (Ambt53Error, &'static mut [u8])> {
        if len == 0 || len > buffer.len() {
            return Err((Ambt53Error::InvalidArg, buffer));
        }
        if let Err(err) = self.begin_dma() {
            return Err((err, buffer));
        }
        let limit = match direction {
            Direction::Read => self.max_read_chunk,
            Direction::Write => {
                if let Some(cache) = self.cache.get() {
                    cache.clean(&buffer[..len]);
                }
                self.max_write_chunk
            }
        };

        // keep the completion from racing the bookkeeping below
        let irqs = BusInterrupts::DMA_COMPLETE | BusInterrupts::DMA_ERROR;
        self.bus.interrupt_disable(irqs);
        for chunk in chunks(address, len, limit) {
            let range = chunk.offset..chunk.offset + chunk.len;
            let dma_buffer = match direction {
                Direction::Read => DmaBuffer::Read(&mut buffer[range]),
                Direction::Write => DmaBuffer::Write(&buffer[range]),
            };
            let issued = self.bus.dma_transfer(DmaTransfer {
                address: chunk.address,
                buffer: dma_buffer,
                priority,
                scrambling: self.scrambling.get(),
                notify: chunk.last,
            });
            if let Err(err) = issued {
                self.bus.interrupt_enable(irqs);
                return Err((self.issue_failed(err, &chunk), buffer));
            }
        }
        self.async_busy.set(true);
        self.pending.set(Some(PendingDma {
            buffer,
            len,
            direction,
        }));
        self.bus.interrupt_enable(irqs);
        Ok(())
    }

    /// Service the MSPI interrupt: acknowledge controller status, record DMA
    /// completion and hand a non-blocking transfer's buffer back to its client.
    pub fn handle_interrupt(&self) {
        let status = self.bus.interrupt_status();
        if status.is_empty() {
            return;
        }
        self.bus.interrupt_clear(status);

        if status.intersects(BusInterrupts::DMA_ERROR | BusInterrupts::FAULT) {
            warn!("ambt53-mspi: controller reported {:?}", status);
            self.dma_failed.store(true, Ordering::Release);
        }
        if !status.intersects(BusInterrupts::DMA_COMPLETE | BusInterrupts::DMA_ERROR) {
            return;
        }
        self.dma_complete.store(true, Ordering::Release);
        self.clear_status_errors_once();

        let Some(pending) = self.pending.take() else {
            return;
        };
        self.async_busy.set(false);
        let result = if self.dma_failed.swap(false, Ordering::AcqRel) {
            Err(Ambt53Error::Fail)
        } else {
            Ok(())
        };
        match pending.direction {
            Direction::Read => {
                if let Some(cache) = self.cache.get() {
                    cache.invalidate(&pending.buffer[..pending.len]);
                }
                if let Some(client) = self.client.get() {
                    client.read_done(pending.buffer, result);
                }
            }
            Direction::Write => {
                if let Some(client) = self.client.get() {
                    client.write_done(pending.buffer, result);
                }
            }
        }
    }

    /// Map the remote into the XIP aperture.
    pub fn enable_xip(&self) -> Ambt53Result<()> {
        let xip = &self.config.xip;
        self.bus.xip_configure(xip).map_err(|err| {
            error!("ambt53-mspi: XIP config failed: {}", err);
            Ambt53Error::Fail
        })?;
        if xip.read_combine {
            self.bus
                .xip_read_combine(true)
                .map_err(|_| Ambt53Error::Fail)?;
        }
        self.bus.xip_enable().map_err(|_| Ambt53Error::Fail)?;
        self.xip_enabled.set(true);
        debug!(
            "ambt53-mspi: XIP enabled at {:#x} size {:#x}",
            xip.aperture_base, xip.aperture_size
        );
        Ok(())
    }

    pub fn disable_xip(&self) -> Ambt53Result<()> {
        self.bus.xip_disable().map_err(|_| Ambt53Error::Fail)?;
        self.xip_enabled.set(false);
        Ok(())
    }

    /// Toggle wire scrambling for the configured scrambling region.
    pub fn set_scrambling(&self, enable: bool) -> Ambt53Result<()> {
        if enable && self.config.xip.scrambling.is_none() {
            return Err(Ambt53Error::InvalidOperation);
        }
        self.bus
            .set_scrambling(enable)
            .map_err(|_| Ambt53Error::Fail)?;
        self.scrambling.set(enable);
        Ok(())
    }

    pub fn is_scrambling(&self) -> bool {
        self.scrambling.get()
    }

    fn check_aperture(&self, address: u32, len: usize) -> Ambt53Result<()> {
        if !self.xip_enabled.get() {
            return Err(Ambt53Error::InvalidOperation);
        }
        if address as u64 + len as u64 > self.config.xip.aperture_size as u64 {
            return Err(Ambt53Error::OutOfRange);
        }
        Ok(())
    }

    /// Memory-mapped read of remote `address` through the XIP aperture.
    pub fn xip_read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()> {
        self.check_aperture(address, buf.len())?;
        self.bus
            .xip_read(address, buf)
            .map_err(|_| Ambt53Error::Fail)
    }

    /// Memory-mapped write of remote `address` through the XIP aperture.
    pub fn xip_write(&self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        self.check_aperture(address, data.len())?;
        self.bus
            .xip_write(address, data)
            .map_err(|_| Ambt53Error::Fail)
    }
}

impl<B: MspiBus, D: DelayNs> RemoteRegisters for MspiTransport<'_, B, D> {
    fn read_reg32(&self, address: u32) -> Ambt53Result<u32> {
        self.wait_idle(self.config.idle_timeout_us)?;
        self.status_check()?;
        let mut word = [0u8; 4];
        self.pio_read_raw(Command::ReadBurst1.into(), Some(address), &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    fn write_reg32(&self, address: u32, value: u32) -> Ambt53Result<()> {
        self.wait_idle(self.config.idle_timeout_us)?;
        self.status_check()?;
        if self.xip_enabled.get() {
            return self
                .bus
                .xip_write(address, &value.to_le_bytes())
                .map_err(|_| Ambt53Error::Fail);
        }
        self.pio_write_raw(Command::WriteBurst1.into(), Some(address), &value.to_le_bytes())
    }
}

impl<B: MspiBus, D: DelayNs> RemoteMemory for MspiTransport<'_, B, D> {
    fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()> {
        self.dma_read(address, buf, Priority::Normal)
    }

    fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        self.dma_write(address, data, Priority::Normal)
    }
}
