// Licensed under the Apache-2.0 license.

//! Layout of the remote XSPI transfer status register.

use tock_registers::fields::Field;
use tock_registers::{register_bitfields, LocalRegisterCopy};

register_bitfields![u32,
    pub XSPI_STATUS [
        BUSY OFFSET(0) NUMBITS(1) [],
        WRITE OFFSET(1) NUMBITS(1) [],
        INV_CMD OFFSET(2) NUMBITS(1) [],
        INV_LEN OFFSET(3) NUMBITS(1) [],
        BUS_ERR OFFSET(4) NUMBITS(1) [],
        UNDERRUN OFFSET(5) NUMBITS(1) [],
        OVERRUN OFFSET(6) NUMBITS(1) [],
        BURST_ERR OFFSET(7) NUMBITS(1) [],
        DMODE OFFSET(8) NUMBITS(2) [],
        AMODE OFFSET(10) NUMBITS(2) [],
        CMODE OFFSET(12) NUMBITS(2) [],
        DQS_EN OFFSET(15) NUMBITS(1) [],
        DUMMY OFFSET(16) NUMBITS(8) [],
        SYNC OFFSET(24) NUMBITS(8) []
    ]
];

pub type XspiStatus = LocalRegisterCopy<u32, XSPI_STATUS::Register>;

/// Sticky error bits; writing them back clears them.
pub const XSPI_STATUS_ERROR_MASK: u32 = 0x0000_00FC;

pub const XSPI_STATUS_ERRORS: [(Field<u32, XSPI_STATUS::Register>, &str); 6] = [
    (XSPI_STATUS::INV_CMD, "INV_CMD ERROR"),
    (XSPI_STATUS::INV_LEN, "INV_LEN ERROR"),
    (XSPI_STATUS::BUS_ERR, "BUS ERROR"),
    (XSPI_STATUS::UNDERRUN, "UNDERRUN"),
    (XSPI_STATUS::OVERRUN, "OVERRUN"),
    (XSPI_STATUS::BURST_ERR, "BURST ERROR"),
];

pub fn has_errors(status: &XspiStatus) -> bool {
    status.get() & XSPI_STATUS_ERROR_MASK != 0
}
