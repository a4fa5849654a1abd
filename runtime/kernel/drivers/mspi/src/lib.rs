// Licensed under the Apache-2.0 license.

//! MSPI transport to the AMBT53 co-processor.

#![cfg_attr(target_os = "none", no_std)]

pub mod hil;
pub mod status;
pub mod transport;

pub use hil::{
    BusConfig, BusError, BusInterrupts, CacheMaintenance, DmaBuffer, DmaClient, DmaTransfer,
    MspiBus, PioData, PioTransfer, Priority, RemoteMemory, RemoteRegisters, XipConfig,
};
pub use transport::{chunks, Chunk, CompletionMode, MspiConfig, MspiTransport, PIO_MAX_BYTES};

use ambt53_config::MSPI_MAX_DEVICES;
use ambt53_pool::DevicePool;

/// Open transports, at most [`MSPI_MAX_DEVICES`] at a time.
pub type MspiPool<'a, B, D> = DevicePool<MspiTransport<'a, B, D>, MSPI_MAX_DEVICES>;
