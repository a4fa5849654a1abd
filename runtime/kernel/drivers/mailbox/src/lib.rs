// Licensed under the Apache-2.0 license.

//! Doorbell mailbox between the host and the AMBT53 DSP core.
//!
//! Two 32-entry word FIFOs, one per direction, reached through the remote register
//! window of the MSPI transport.

#![cfg_attr(target_os = "none", no_std)]

mod channel;
pub mod registers;

pub use channel::{
    KickClient, MailboxChannel, MailboxConfig, MailboxErrors, MailboxInterrupts, MailboxStatus,
    MAX_KICK_CLIENTS,
};
