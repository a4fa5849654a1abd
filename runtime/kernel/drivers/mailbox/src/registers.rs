// Licensed under the Apache-2.0 license.

//! Mailbox register block of the remote, as word offsets from the mailbox base.
//!
//! `M2D` is the host-to-remote direction, `D2M` remote-to-host.

use tock_registers::{register_bitfields, LocalRegisterCopy};

pub const M2D_DATA: u32 = 0x00;
pub const D2M_DATA: u32 = 0x04;
pub const STATUS: u32 = 0x08;
pub const M2D_ERROR: u32 = 0x0C;
pub const D2M_ERROR: u32 = 0x10;
pub const M2D_THRESHOLD: u32 = 0x14;
pub const D2M_THRESHOLD: u32 = 0x18;
pub const M2D_INT_STATUS: u32 = 0x1C;
pub const D2M_INT_STATUS: u32 = 0x20;
pub const M2D_INT_ENABLE: u32 = 0x24;
pub const D2M_INT_ENABLE: u32 = 0x28;

register_bitfields![u32,
    pub MBOX_STATUS [
        M2D_EMPTY OFFSET(0) NUMBITS(1) [],
        M2D_FULL OFFSET(1) NUMBITS(1) [],
        M2D_THRESHOLD OFFSET(2) NUMBITS(1) [],
        D2M_EMPTY OFFSET(8) NUMBITS(1) [],
        D2M_FULL OFFSET(9) NUMBITS(1) [],
        D2M_THRESHOLD OFFSET(10) NUMBITS(1) [],
        M2D_COUNT OFFSET(16) NUMBITS(6) [],
        D2M_COUNT OFFSET(24) NUMBITS(6) []
    ],
    pub MBOX_ERROR [
        /// Written while the FIFO was full; the word was dropped.
        FULL OFFSET(0) NUMBITS(1) [],
        /// Read while the FIFO was empty.
        EMPTY OFFSET(1) NUMBITS(1) []
    ],
    pub MBOX_INT [
        THRESHOLD OFFSET(0) NUMBITS(1) [],
        ERROR OFFSET(1) NUMBITS(1) []
    ]
];

pub type MailboxStatusWord = LocalRegisterCopy<u32, MBOX_STATUS::Register>;
pub type MailboxErrorWord = LocalRegisterCopy<u32, MBOX_ERROR::Register>;
pub type MailboxIntWord = LocalRegisterCopy<u32, MBOX_INT::Register>;
