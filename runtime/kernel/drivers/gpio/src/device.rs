// Licensed under the Apache-2.0 license.

use crate::registers::{self, GPIO_COUNT, GROUP_COUNT, GROUP_MASKS};
use ambt53_config::GPIO_BASE_ADDR;
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_mspi::RemoteRegisters;
use core::cell::Cell;
use log::{debug, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// No clock drives the filter counter, so an all-ones filter never settles.
const DEBOUNCE_FORBIDDEN: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Direction {
    Input = 0,
    Output = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Trigger {
    Edge = 0,
    Level = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum EdgeSelect {
    Single = 0,
    Both = 1,
}

/// Falling edge or low level, rising edge or high level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Polarity {
    Negative = 0,
    Positive = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Sampled pad level.
    Input,
    /// Driven output latch.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub direction: Direction,
    pub trigger: Trigger,
    pub edges: EdgeSelect,
    pub polarity: Polarity,
    pub debounce: bool,
    /// Debounce filter of the pin's group. Every pin in the group shares it.
    pub debounce_value: u32,
}

impl PinConfig {
    pub const INPUT: Self = Self {
        direction: Direction::Input,
        trigger: Trigger::Edge,
        edges: EdgeSelect::Single,
        polarity: Polarity::Positive,
        debounce: false,
        debounce_value: 0,
    };

    pub const OUTPUT: Self = Self {
        direction: Direction::Output,
        ..Self::INPUT
    };
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::Negative,
            ..Self::INPUT
        }
    }
}

/// Called from [`GpioDevice::service_interrupt`] for each pending pin.
pub trait GpioClient {
    fn interrupt(&self, pin: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioConfig {
    pub base: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            base: GPIO_BASE_ADDR,
        }
    }
}

fn check_pin(pin: u8) -> Ambt53Result<(u8, u32)> {
    if pin >= GPIO_COUNT {
        return Err(Ambt53Error::InvalidArg);
    }
    Ok(registers::locate(pin))
}

fn check_group(group: u8) -> Ambt53Result<()> {
    if group >= GROUP_COUNT {
        return Err(Ambt53Error::InvalidArg);
    }
    Ok(())
}

fn field<T: TryFromPrimitive<Primitive = u32>>(word: u32, bit: u32) -> Ambt53Result<T> {
    T::try_from_primitive((word >> bit) & 1).map_err(|_| Ambt53Error::Fail)
}

pub struct GpioDevice<'a, R: RemoteRegisters> {
    regs: &'a R,
    config: GpioConfig,
    handlers: [Cell<Option<&'a dyn GpioClient>>; GPIO_COUNT as usize],
}

impl<'a, R: RemoteRegisters> GpioDevice<'a, R> {
    pub fn new(regs: &'a R, config: GpioConfig) -> Self {
        Self {
            regs,
            config,
            handlers: core::array::from_fn(|_| Cell::new(None)),
        }
    }

    fn address(&self, group: u8, offset: u32) -> u32 {
        registers::group_register(self.config.base, group, offset)
    }

    fn read(&self, group: u8, offset: u32) -> Ambt53Result<u32> {
        self.regs.read_reg32(self.address(group, offset))
    }

    fn write(&self, group: u8, offset: u32, value: u32) -> Ambt53Result<()> {
        self.regs.write_reg32(self.address(group, offset), value)
    }

    /// Read-modify-write one pin's bit in a per-pin register.
    fn write_bit(&self, pin: u8, offset: u32, value: u32) -> Ambt53Result<()> {
        let (group, bit) = registers::locate(pin);
        let mask = 1 << bit;
        let set = if value & 1 != 0 { mask } else { 0 };
        self.regs
            .modify_reg32(self.address(group, offset), mask, set)
    }

    /// Program `pin` in software mode with `config`.
    pub fn configure(&self, pin: u8, config: &PinConfig) -> Ambt53Result<()> {
        let (group, _) = check_pin(pin)?;
        if config.debounce && config.debounce_value == DEBOUNCE_FORBIDDEN {
            return Err(Ambt53Error::InvalidArg);
        }
        self.write_bit(pin, registers::CTRL, 0)?;
        self.write_bit(pin, registers::DIR, config.direction.into())?;
        self.write_bit(pin, registers::IS, config.trigger.into())?;
        self.write_bit(pin, registers::IBE, config.edges.into())?;
        self.write_bit(pin, registers::IEV, config.polarity.into())?;
        self.write_bit(pin, registers::DB, config.debounce as u32)?;
        self.write(group, registers::DFG, config.debounce_value)?;
        debug!("ambt53-gpio: pin {} configured {:?}", pin, config);
        Ok(())
    }

    pub fn pin_config(&self, pin: u8) -> Ambt53Result<PinConfig> {
        let (group, bit) = check_pin(pin)?;
        Ok(PinConfig {
            direction: field(self.read(group, registers::DIR)?, bit)?,
            trigger: field(self.read(group, registers::IS)?, bit)?,
            edges: field(self.read(group, registers::IBE)?, bit)?,
            polarity: field(self.read(group, registers::IEV)?, bit)?,
            debounce: (self.read(group, registers::DB)? >> bit) & 1 != 0,
            debounce_value: self.read(group, registers::DFG)?,
        })
    }

    pub fn read_pin(&self, pin: u8, source: ReadSource) -> Ambt53Result<bool> {
        let (group, bit) = check_pin(pin)?;
        let offset = match source {
            ReadSource::Input => registers::IDATA,
            ReadSource::Output => registers::ODATA,
        };
        Ok((self.read(group, offset)? >> bit) & 1 != 0)
    }

    /// Drive `pin` high or low through the set and clear registers.
    pub fn write_pin(&self, pin: u8, high: bool) -> Ambt53Result<()> {
        let (group, bit) = check_pin(pin)?;
        let offset = if high { registers::SET } else { registers::CLR };
        self.write(group, offset, 1 << bit)
    }

    /// Enable and unmask `pin`'s interrupt.
    pub fn interrupt_enable(&self, pin: u8) -> Ambt53Result<()> {
        check_pin(pin)?;
        self.write_bit(pin, registers::IEN, 1)?;
        self.write_bit(pin, registers::IM, 0)
    }

    /// Disable and mask `pin`'s interrupt.
    pub fn interrupt_disable(&self, pin: u8) -> Ambt53Result<()> {
        check_pin(pin)?;
        self.write_bit(pin, registers::IEN, 0)?;
        self.write_bit(pin, registers::IM, 1)
    }

    /// Split a 64-bit pin mask into per-group words.
    fn group_words(pins: u64) -> Ambt53Result<[u32; GROUP_COUNT as usize]> {
        if pins >> GPIO_COUNT != 0 {
            return Err(Ambt53Error::InvalidArg);
        }
        Ok([pins as u32 & GROUP_MASKS[0], (pins >> 32) as u32 & GROUP_MASKS[1]])
    }

    /// Enable every pin set in `pins` (bit n is pin n). Masks are left alone.
    pub fn interrupt_enable_mask(&self, pins: u64) -> Ambt53Result<()> {
        for (group, word) in Self::group_words(pins)?.into_iter().enumerate() {
            self.regs
                .modify_reg32(self.address(group as u8, registers::IEN), 0, word)?;
        }
        Ok(())
    }

    pub fn interrupt_disable_mask(&self, pins: u64) -> Ambt53Result<()> {
        for (group, word) in Self::group_words(pins)?.into_iter().enumerate() {
            self.regs
                .modify_reg32(self.address(group as u8, registers::IEN), word, 0)?;
        }
        Ok(())
    }

    /// Raw status of `group`, optionally limited to enabled pins.
    pub fn interrupt_status(&self, group: u8, enabled_only: bool) -> Ambt53Result<u32> {
        check_group(group)?;
        let mask = if enabled_only {
            self.read(group, registers::IEN)?
        } else {
            u32::MAX
        };
        Ok(self.read(group, registers::RIS)? & mask)
    }

    pub fn interrupt_clear(&self, group: u8, pins: u32) -> Ambt53Result<()> {
        check_group(group)?;
        self.write(group, registers::IC, pins)
    }

    pub fn register_interrupt(&self, pin: u8, handler: &'a dyn GpioClient) -> Ambt53Result<()> {
        check_pin(pin)?;
        self.handlers[pin as usize].set(Some(handler));
        Ok(())
    }

    pub fn unregister_interrupt(&self, pin: u8) -> Ambt53Result<()> {
        check_pin(pin)?;
        self.handlers[pin as usize].set(None);
        Ok(())
    }

    /// Dispatch every pin set in `status` of `group`, lowest first.
    ///
    /// Pins without a handler are skipped and reported as `InvalidOperation`
    /// once every handled pin has run.
    pub fn service_interrupt(&self, group: u8, status: u32) -> Ambt53Result<()> {
        check_group(group)?;
        let mut unhandled = 0u32;
        let mut pending = status & GROUP_MASKS[group as usize];
        while pending != 0 {
            let bit = pending.trailing_zeros();
            pending &= !(1 << bit);
            let pin = group * 32 + bit as u8;
            match self.handlers[pin as usize].get() {
                Some(handler) => handler.interrupt(pin),
                None => unhandled |= 1 << bit,
            }
        }
        if unhandled != 0 {
            warn!(
                "ambt53-gpio: group {} pins {:#x} have no handler",
                group, unhandled
            );
            return Err(Ambt53Error::InvalidOperation);
        }
        Ok(())
    }

    /// Interrupt line handler for `group`: clear the enabled pending pins, then
    /// dispatch them.
    pub fn handle_interrupt(&self, group: u8) -> Ambt53Result<()> {
        let status = self.interrupt_status(group, true)?;
        if status == 0 {
            return Ok(());
        }
        self.interrupt_clear(group, status)?;
        self.service_interrupt(group, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(PinConfig::OUTPUT.direction, Direction::Output);
        assert_eq!(PinConfig::OUTPUT.polarity, Polarity::Positive);
        assert_eq!(PinConfig::default().polarity, Polarity::Negative);
        assert_eq!(PinConfig::default().direction, Direction::Input);
    }

    #[test]
    fn test_field_decode() {
        assert_eq!(field::<Trigger>(0b100, 2), Ok(Trigger::Level));
        assert_eq!(field::<EdgeSelect>(0b100, 1), Ok(EdgeSelect::Single));
        assert_eq!(check_pin(44), Err(Ambt53Error::InvalidArg));
        assert_eq!(check_pin(43), Ok((1, 11)));
    }
}
