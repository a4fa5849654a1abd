/*++

Licensed under the Apache-2.0 license.

File Name:

    scpm.rs

Abstract:

    File contains the emulated SCPM power-management companion on I2C. Its
    interrupt controller latches edge sources, and its DSP control register
    drives the reset lines of an attached emulated AMBT53.

--*/

use crate::ambt53::EmulatedAmbt53;
use ambt53_config::SCPM_I2C_ADDRESS;
use ambt53_scpm::registers::{self, DspCtrl1, DSP_CTRL1};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct ScpmState {
    registers: HashMap<u16, u32>,
    pointer: u16,
    writes: Vec<(u16, u32)>,
    dsp: Option<EmulatedAmbt53>,
}

impl ScpmState {
    fn get(&self, address: u16) -> u32 {
        self.registers.get(&address).copied().unwrap_or_default()
    }

    fn write(&mut self, address: u16, value: u32) {
        self.writes.push((address, value));
        let (status0, clear0, _) = registers::bank_registers(0);
        let (status1, clear1, _) = registers::bank_registers(32);
        match address {
            a if a == clear0 => self.clear_status(status0, value),
            a if a == clear1 => self.clear_status(status1, value),
            // read-only
            a if a == status0 || a == status1 || a == registers::DSP_STATUS => {}
            registers::DSP_CTRL1 => self.write_dsp_ctrl(value),
            _ => {
                self.registers.insert(address, value);
            }
        }
    }

    fn clear_status(&mut self, status: u16, bits: u32) {
        let value = self.get(status) & !bits;
        self.registers.insert(status, value);
    }

    fn write_dsp_ctrl(&mut self, value: u32) {
        let old = DspCtrl1::new(self.get(registers::DSP_CTRL1));
        let new = DspCtrl1::new(value);
        self.registers.insert(registers::DSP_CTRL1, value);
        let Some(dsp) = self.dsp.as_ref() else {
            return;
        };
        if old.read(DSP_CTRL1::GLOBAL_RESET) != new.read(DSP_CTRL1::GLOBAL_RESET) {
            dsp.set_global_reset(new.is_set(DSP_CTRL1::GLOBAL_RESET));
        }
        if old.read(DSP_CTRL1::CORE_RESET) != new.read(DSP_CTRL1::CORE_RESET) {
            dsp.set_core_held(new.is_set(DSP_CTRL1::CORE_RESET));
        }
    }

    fn line_level(&self) -> bool {
        (0u8..2).any(|bank| {
            let irq = bank * 32;
            let (status, _, enable) = registers::bank_registers(irq);
            self.get(status) & self.get(enable) & !self.get(registers::mask_register(irq)) != 0
        })
    }
}

/// Handle on an emulated SCPM. Clones share the same device.
#[derive(Clone, Default)]
pub struct EmulatedScpm {
    state: Arc<Mutex<ScpmState>>,
}

impl EmulatedScpm {
    /// Companion whose DSP control register drives `dsp`'s reset lines.
    pub fn with_dsp(dsp: EmulatedAmbt53) -> Self {
        let scpm = Self::default();
        scpm.state.lock().unwrap().dsp = Some(dsp);
        scpm
    }

    /// Latch an edge on source `irq` if it is enabled.
    pub fn raise(&self, irq: u8) {
        let mut state = self.state.lock().unwrap();
        let (status, _, enable) = registers::bank_registers(irq);
        let bit = 1u32 << (irq % 32);
        if state.get(enable) & bit != 0 {
            let value = state.get(status) | bit;
            state.registers.insert(status, value);
        }
    }

    /// Level of the GPIO line towards the host.
    pub fn interrupt_pending(&self) -> bool {
        self.state.lock().unwrap().line_level()
    }

    pub fn register(&self, address: u16) -> u32 {
        self.state.lock().unwrap().get(address)
    }

    pub fn set_register(&self, address: u16, value: u32) {
        self.state
            .lock()
            .unwrap()
            .registers
            .insert(address, value);
    }

    /// Register writes in the order they arrived.
    pub fn writes(&self) -> Vec<(u16, u32)> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl ErrorType for EmulatedScpm {
    type Error = ErrorKind;
}

impl I2c for EmulatedScpm {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != SCPM_I2C_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        let mut state = self.state.lock().unwrap();
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if bytes.len() < 2 {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }
                    let register = u16::from_be_bytes([bytes[0], bytes[1]]);
                    state.pointer = register;
                    match bytes.len() {
                        2 => {}
                        6 => {
                            let value = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
                            state.write(register, value);
                        }
                        _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
                    }
                }
                Operation::Read(buf) => {
                    let value = state.get(state.pointer).to_le_bytes();
                    let len = buf.len().min(4);
                    buf[..len].copy_from_slice(&value[..len]);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_address_nacks() {
        let mut scpm = EmulatedScpm::default();
        assert_eq!(
            scpm.write(0x10, &[0x01, 0x00]),
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
    }

    #[test]
    fn test_clear_is_write_one_to_clear() {
        let mut scpm = EmulatedScpm::default();
        scpm.set_register(registers::IRQ_ENABLE0, 0b110);
        scpm.raise(1);
        scpm.raise(2);
        scpm.raise(3);
        assert_eq!(scpm.register(registers::IRQ_STATUS0), 0b110);
        let mut frame = [0u8; 6];
        frame[..2].copy_from_slice(&registers::IRQ_CLEAR0.to_be_bytes());
        frame[2..].copy_from_slice(&0b010u32.to_le_bytes());
        scpm.write(SCPM_I2C_ADDRESS, &frame).unwrap();
        assert_eq!(scpm.register(registers::IRQ_STATUS0), 0b100);
    }
}
