// Licensed under the Apache-2.0 license

//! rpmsg over static head/tail rings between the host and the AMBT53 DSP.
//!
//! The rings live in DSP data RAM and are reached over the MSPI XIP aperture;
//! the mailbox doorbell signals new messages in both directions.

#![cfg_attr(target_os = "none", no_std)]

pub mod hil;
pub mod instance;
pub mod registry;
pub mod vring;
pub mod wire;

pub use hil::{Notifier, SharedMemory};
pub use instance::{IpcBackend, IpcInstanceTable, IPC_MAX_INSTANCES};
pub use registry::{
    EndpointCallbacks, EndpointName, EndpointState, EndpointToken, InstanceState, IpcConfig,
    Role, RpmsgEndpointRegistry, TxBuffer, RPMSG_MAX_ENDPOINTS,
};
pub use vring::{optimal_num_desc, Ring, StaticVrings};
