// Licensed under the Apache-2.0 license.

//! Loads DSP firmware into the AMBT53 over the MSPI transport.

#![cfg_attr(target_os = "none", no_std)]

mod loader;

pub use loader::{FirmwareLoader, LoaderConfig, States as LoaderState};

use ambt53_error::Ambt53Result;

/// Reset lines of the remote DSP, usually driven through the power-management companion.
pub trait PowerControl {
    /// Keep the DSP core in reset while its memories are rewritten.
    fn core_hold(&self) -> Ambt53Result<()>;

    fn core_release(&self) -> Ambt53Result<()>;

    fn global_reset_assert(&self) -> Ambt53Result<()>;

    fn global_reset_release(&self) -> Ambt53Result<()>;
}
