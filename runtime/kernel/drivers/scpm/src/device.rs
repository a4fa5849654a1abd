// Licensed under the Apache-2.0 license.

use crate::registers::{self, DspCtrl1, DSP_CTRL1};
use ambt53_config::SCPM_I2C_ADDRESS;
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_fw_loader::PowerControl;
use core::cell::{Cell, RefCell};
use embedded_hal::i2c::{Error as _, I2c};
use log::{debug, error, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tock_registers::fields::Field;

/// Interrupt sources behind the companion's GPIO line.
pub const SCPM_IRQ_COUNT: usize = 64;

/// Passes over the status registers before a busy source is left for the next edge.
const MAX_SERVICE_PASSES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum IrqMode {
    Disabled = 0,
    NegativeEdge = 1,
    PositiveEdge = 2,
    BothEdges = 3,
    LowLevel = 4,
    HighLevel = 5,
}

impl IrqMode {
    fn is_edge(&self) -> bool {
        matches!(
            self,
            IrqMode::NegativeEdge | IrqMode::PositiveEdge | IrqMode::BothEdges
        )
    }
}

/// Called from [`ScpmDevice::service_interrupt`] for each pending source.
pub trait ScpmClient {
    fn interrupt(&self, irq: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScpmConfig {
    pub i2c_address: u8,
}

impl Default for ScpmConfig {
    fn default() -> Self {
        Self {
            i2c_address: SCPM_I2C_ADDRESS,
        }
    }
}

pub struct ScpmDevice<'a, I: I2c> {
    i2c: RefCell<I>,
    config: ScpmConfig,
    /// Enabled-and-unmasked sources per bank, kept locally so the handler does not
    /// have to read the mask registers back.
    enabled: [Cell<u32>; 2],
    handlers: [Cell<Option<&'a dyn ScpmClient>>; SCPM_IRQ_COUNT],
}

impl<'a, I: I2c> ScpmDevice<'a, I> {
    pub fn new(i2c: I, config: ScpmConfig) -> Self {
        Self {
            i2c: RefCell::new(i2c),
            config,
            enabled: [Cell::new(0), Cell::new(0)],
            handlers: core::array::from_fn(|_| Cell::new(None)),
        }
    }

    /// Hand the bus back.
    pub fn release(self) -> I {
        self.i2c.into_inner()
    }

    /// Drop interrupts latched before the driver took over.
    pub fn init(&self) -> Ambt53Result<()> {
        for bank in [0u8, 32] {
            let (_, clear, _) = registers::bank_registers(bank);
            self.write_reg32(clear, u32::MAX)?;
        }
        Ok(())
    }

    /// Read one register into `buf`, which must hold exactly four bytes.
    pub fn blocking_read(&self, address: u16, buf: &mut [u8]) -> Ambt53Result<()> {
        if address % 4 != 0 || buf.len() != 4 {
            return Err(Ambt53Error::InvalidArg);
        }
        self.i2c
            .borrow_mut()
            .write_read(self.config.i2c_address, &address.to_be_bytes(), buf)
            .map_err(|err| {
                error!("ambt53-scpm: read of {:#06x} failed: {:?}", address, err.kind());
                Ambt53Error::Fail
            })
    }

    /// Write the four bytes of `data` to one register.
    pub fn blocking_write(&self, address: u16, data: &[u8]) -> Ambt53Result<()> {
        if address % 4 != 0 || data.len() != 4 {
            return Err(Ambt53Error::InvalidArg);
        }
        let mut frame = [0u8; 6];
        frame[..2].copy_from_slice(&address.to_be_bytes());
        frame[2..].copy_from_slice(data);
        self.i2c
            .borrow_mut()
            .write(self.config.i2c_address, &frame)
            .map_err(|err| {
                error!("ambt53-scpm: write of {:#06x} failed: {:?}", address, err.kind());
                Ambt53Error::Fail
            })
    }

    pub fn read_reg32(&self, address: u16) -> Ambt53Result<u32> {
        let mut word = [0u8; 4];
        self.blocking_read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    pub fn write_reg32(&self, address: u16, value: u32) -> Ambt53Result<()> {
        self.blocking_write(address, &value.to_le_bytes())
    }

    fn modify_reg32(&self, address: u16, clear: u32, set: u32) -> Ambt53Result<u32> {
        let value = (self.read_reg32(address)? & !clear) | set;
        self.write_reg32(address, value)?;
        Ok(value)
    }

    /// Route `irq` to `handler`, triggered on `mode`.
    pub fn register_interrupt(
        &self,
        irq: u8,
        mode: IrqMode,
        handler: &'a dyn ScpmClient,
    ) -> Ambt53Result<()> {
        if irq as usize >= SCPM_IRQ_COUNT || !mode.is_edge() {
            return Err(Ambt53Error::InvalidArg);
        }
        let bit = 1u32 << (irq % 32);
        let (mode_register, shift) = registers::mode_field(irq);
        let (_, _, enable) = registers::bank_registers(irq);

        self.modify_reg32(mode_register, 0x7 << shift, u32::from(mode) << shift)?;
        let enabled = self.modify_reg32(enable, 0, bit)?;
        let mask = self.modify_reg32(registers::mask_register(irq), bit, 0)?;
        self.enabled[irq as usize / 32].set(enabled & !mask);
        self.handlers[irq as usize].set(Some(handler));
        debug!("ambt53-scpm: irq {} registered ({:?})", irq, mode);
        Ok(())
    }

    pub fn unregister_interrupt(&self, irq: u8) -> Ambt53Result<()> {
        if irq as usize >= SCPM_IRQ_COUNT {
            return Err(Ambt53Error::InvalidArg);
        }
        let bank = irq as usize / 32;
        let bit = 1u32 << (irq % 32);
        if self.enabled[bank].get() & bit == 0 {
            return Ok(());
        }
        let (mode_register, shift) = registers::mode_field(irq);
        let (_, _, enable) = registers::bank_registers(irq);

        let mask = self.modify_reg32(registers::mask_register(irq), 0, bit)?;
        let enabled = self.modify_reg32(enable, bit, 0)?;
        self.modify_reg32(mode_register, 0x7 << shift, 0)?;
        self.enabled[bank].set(enabled & !mask);
        self.handlers[irq as usize].set(None);
        Ok(())
    }

    /// GPIO edge handler: drain both status banks and dispatch every set and
    /// enabled source, lowest first, until nothing enabled is pending.
    pub fn service_interrupt(&self) -> Ambt53Result<()> {
        for _ in 0..MAX_SERVICE_PASSES {
            let mut pending = [0u32; 2];
            for (bank, status) in pending.iter_mut().enumerate() {
                let (status_register, clear, _) = registers::bank_registers(bank as u8 * 32);
                *status = self.read_reg32(status_register)?;
                if *status != 0 {
                    self.write_reg32(clear, *status)?;
                }
            }

            let mut any = false;
            for (bank, status) in pending.iter().enumerate() {
                let mut active = status & self.enabled[bank].get();
                any |= active != 0;
                while active != 0 {
                    let bit = active.trailing_zeros();
                    active &= !(1 << bit);
                    let irq = bank * 32 + bit as usize;
                    if let Some(handler) = self.handlers[irq].get() {
                        handler.interrupt(irq as u8);
                    }
                }
            }
            if !any {
                return Ok(());
            }
        }
        warn!("ambt53-scpm: interrupts still pending after {} passes", MAX_SERVICE_PASSES);
        Ok(())
    }

    pub fn dsp_status(&self) -> Ambt53Result<u32> {
        self.read_reg32(registers::DSP_STATUS)
    }

    pub fn set_dsp_evector(&self, evector: u32) -> Ambt53Result<()> {
        self.write_reg32(registers::DSP_EVECTOR, evector)
    }

    fn set_ctrl_bit(&self, field: Field<u32, DSP_CTRL1::Register>, set: bool) -> Ambt53Result<()> {
        let mut ctrl = DspCtrl1::new(self.read_reg32(registers::DSP_CTRL1)?);
        ctrl.modify(if set { field.val(1) } else { field.val(0) });
        self.write_reg32(registers::DSP_CTRL1, ctrl.get())
    }

    pub fn dsp_control(&self) -> Ambt53Result<DspCtrl1> {
        Ok(DspCtrl1::new(self.read_reg32(registers::DSP_CTRL1)?))
    }

    pub fn set_global_reset(&self, asserted: bool) -> Ambt53Result<()> {
        self.set_ctrl_bit(DSP_CTRL1::GLOBAL_RESET, asserted)
    }

    pub fn set_core_reset(&self, asserted: bool) -> Ambt53Result<()> {
        self.set_ctrl_bit(DSP_CTRL1::CORE_RESET, asserted)
    }

    /// Wake the DSP. Release once the oscillator-enable interrupt arrived.
    pub fn set_ext_wakeup(&self, asserted: bool) -> Ambt53Result<()> {
        self.set_ctrl_bit(DSP_CTRL1::EXT_WAKEUP, asserted)
    }

    /// Keep the DSP out of power down.
    pub fn set_force_active(&self, active: bool) -> Ambt53Result<()> {
        self.set_ctrl_bit(DSP_CTRL1::FORCE_ACTIVE, active)
    }
}

impl<I: I2c> PowerControl for ScpmDevice<'_, I> {
    fn core_hold(&self) -> Ambt53Result<()> {
        self.set_core_reset(true)
    }

    fn core_release(&self) -> Ambt53Result<()> {
        self.set_core_reset(false)
    }

    fn global_reset_assert(&self) -> Ambt53Result<()> {
        self.set_global_reset(true)
    }

    fn global_reset_release(&self) -> Ambt53Result<()> {
        self.set_global_reset(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_edge_modes() {
        assert!(IrqMode::PositiveEdge.is_edge());
        assert!(!IrqMode::HighLevel.is_edge());
        assert!(!IrqMode::Disabled.is_edge());
        assert!(matches!(IrqMode::try_from(3u32), Ok(IrqMode::BothEdges)));
    }
}
