/*++

Licensed under the Apache-2.0 license.

File Name:

    gpio.rs

Abstract:

    File contains the emulated extended GPIO block. Pads are driven from the
    test, the output latch follows the set and clear registers, and edges or
    levels latch into the raw interrupt status as the block is configured.

--*/

use ambt53_config::GPIO_BASE_ADDR;
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_gpio::registers::{self, GROUP_COUNT};
use ambt53_mspi::RemoteRegisters;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct GpioState {
    base: u32,
    registers: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
    fail_reads: u32,
}

impl GpioState {
    fn address(&self, group: u8, offset: u32) -> u32 {
        registers::group_register(self.base, group, offset)
    }

    fn get(&self, group: u8, offset: u32) -> u32 {
        let address = self.address(group, offset);
        self.registers.get(&address).copied().unwrap_or_default()
    }

    fn set(&mut self, group: u8, offset: u32, value: u32) {
        let address = self.address(group, offset);
        self.registers.insert(address, value);
    }

    /// Group and register offset of `address`, if it is inside the block.
    fn decode(&self, address: u32) -> Option<(u8, u32)> {
        let relative = address.checked_sub(self.base)?;
        let group = relative / registers::GROUP_STRIDE;
        (group < GROUP_COUNT as u32 && relative % 4 == 0)
            .then_some((group as u8, relative % registers::GROUP_STRIDE))
    }

    fn read(&self, group: u8, offset: u32) -> u32 {
        match offset {
            registers::SET | registers::CLR | registers::IC => 0,
            registers::MIS => self.get(group, registers::RIS) & !self.get(group, registers::IM),
            _ => self.get(group, offset),
        }
    }

    fn write(&mut self, group: u8, offset: u32, value: u32) {
        let value = value & registers::GROUP_MASKS[group as usize];
        match offset {
            registers::SET => {
                let odata = self.get(group, registers::ODATA) | value;
                self.set(group, registers::ODATA, odata);
            }
            registers::CLR => {
                let odata = self.get(group, registers::ODATA) & !value;
                self.set(group, registers::ODATA, odata);
            }
            registers::IC => {
                let ris = self.get(group, registers::RIS) & !value;
                self.set(group, registers::RIS, ris);
            }
            // read-only
            registers::IDATA | registers::RIS | registers::MIS => {}
            _ => self.set(group, offset, value),
        }
    }

    fn drive(&mut self, pin: u8, high: bool) {
        let (group, bit) = registers::locate(pin);
        let mask = 1u32 << bit;
        let was_high = self.get(group, registers::IDATA) & mask != 0;
        let idata = if high {
            self.get(group, registers::IDATA) | mask
        } else {
            self.get(group, registers::IDATA) & !mask
        };
        self.set(group, registers::IDATA, idata);

        if self.get(group, registers::IEN) & mask == 0 {
            return;
        }
        let bit_set = |offset| self.get(group, offset) & mask != 0;
        let rising = bit_set(registers::IEV);
        let fire = if bit_set(registers::IS) {
            high == rising
        } else if was_high == high {
            false
        } else {
            bit_set(registers::IBE) || high == rising
        };
        if fire {
            let ris = self.get(group, registers::RIS) | mask;
            self.set(group, registers::RIS, ris);
        }
    }
}

/// Handle on an emulated GPIO block. Clones share the same device.
#[derive(Clone)]
pub struct EmulatedGpio {
    state: Arc<Mutex<GpioState>>,
}

impl Default for EmulatedGpio {
    fn default() -> Self {
        Self::new(GPIO_BASE_ADDR)
    }
}

impl EmulatedGpio {
    pub fn new(base: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(GpioState {
                base,
                registers: HashMap::new(),
                writes: Vec::new(),
                fail_reads: 0,
            })),
        }
    }

    /// Drive the pad of `pin`, latching an interrupt if it is enabled and the
    /// change matches the pin's sense.
    pub fn drive(&self, pin: u8, high: bool) {
        self.state.lock().unwrap().drive(pin, high);
    }

    /// Register `offset` of `group`.
    pub fn register(&self, group: u8, offset: u32) -> u32 {
        self.state.lock().unwrap().get(group, offset)
    }

    pub fn set_register(&self, group: u8, offset: u32, value: u32) {
        self.state.lock().unwrap().set(group, offset, value);
    }

    /// Whether any enabled and unmasked pin is pending.
    pub fn interrupt_pending(&self) -> bool {
        let state = self.state.lock().unwrap();
        (0..GROUP_COUNT).any(|group| {
            state.read(group, registers::MIS) & state.get(group, registers::IEN) != 0
        })
    }

    /// Fail the next `count` register reads.
    pub fn fail_reads(&self, count: u32) {
        self.state.lock().unwrap().fail_reads = count;
    }

    /// Register writes in the order they arrived, as absolute addresses.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

impl RemoteRegisters for EmulatedGpio {
    fn read_reg32(&self, address: u32) -> Ambt53Result<u32> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(Ambt53Error::Fail);
        }
        let (group, offset) = state.decode(address).ok_or(Ambt53Error::OutOfRange)?;
        Ok(state.read(group, offset))
    }

    fn write_reg32(&self, address: u32, value: u32) -> Ambt53Result<()> {
        let mut state = self.state.lock().unwrap();
        let (group, offset) = state.decode(address).ok_or(Ambt53Error::OutOfRange)?;
        state.writes.push((address, value));
        state.write(group, offset, value);
        Ok(())
    }
}
