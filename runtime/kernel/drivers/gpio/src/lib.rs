// Licensed under the Apache-2.0 license.

//! Driver for the extended GPIO block of the AMBT53.
//!
//! The block sits in the companion's register space and is reached through any
//! 32-bit remote register path. Its 44 pins are split into two groups of
//! identical registers; group 1 only implements its low 12 bits.

#![cfg_attr(target_os = "none", no_std)]

mod device;
pub mod registers;

pub use device::{
    Direction, EdgeSelect, GpioClient, GpioConfig, GpioDevice, PinConfig, Polarity, ReadSource,
    Trigger,
};
