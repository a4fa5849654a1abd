// Licensed under the Apache-2.0 license.

//! Driver for the SCPM power-management companion of the AMBT53.
//!
//! The companion sits on I2C. It owns the DSP's reset and wake lines and
//! multiplexes 64 interrupt sources onto one GPIO edge towards the host.

#![cfg_attr(target_os = "none", no_std)]

mod device;
pub mod registers;

pub use device::{IrqMode, ScpmClient, ScpmConfig, ScpmDevice, SCPM_IRQ_COUNT};

use ambt53_config::SCPM_MAX_DEVICES;
use ambt53_pool::DevicePool;

pub type ScpmPool<'a, I> = DevicePool<ScpmDevice<'a, I>, SCPM_MAX_DEVICES>;
