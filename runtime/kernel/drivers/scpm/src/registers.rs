// Licensed under the Apache-2.0 license.

//! Register offsets of the SCPM power-management companion.

use tock_registers::{register_bitfields, LocalRegisterCopy};

/// Edge interrupt status of sources 0..=31; source 32..=63 at `+ IRQ_BANK_STRIDE`.
pub const IRQ_STATUS0: u16 = 0x0100;
/// Write-one-to-clear companion of the status register.
pub const IRQ_CLEAR0: u16 = 0x0104;
pub const IRQ_ENABLE0: u16 = 0x0108;
pub const IRQ_BANK_STRIDE: u16 = 0x10;
pub const IRQ_MASK0: u16 = 0x0120;
pub const IRQ_MASK1: u16 = 0x0124;
/// First of the mode select registers, ten 3-bit fields each.
pub const IRQ_MODE_SELECT0: u16 = 0x0130;
pub const IRQ_MODES_PER_REGISTER: u8 = 10;
pub const IRQ_MODE_BITS: u8 = 3;

pub const DSP_STATUS: u16 = 0x0200;
pub const DSP_CTRL1: u16 = 0x0204;
pub const DSP_EVECTOR: u16 = 0x0208;

register_bitfields![u32,
    pub DSP_CTRL1 [
        GLOBAL_RESET OFFSET(0) NUMBITS(1) [],
        /// Core reset (`cxrstn`).
        CORE_RESET OFFSET(1) NUMBITS(1) [],
        EXT_WAKEUP OFFSET(2) NUMBITS(1) [],
        FORCE_ACTIVE OFFSET(3) NUMBITS(1) []
    ]
];

pub type DspCtrl1 = LocalRegisterCopy<u32, DSP_CTRL1::Register>;

/// Status, clear and enable registers of the bank holding `irq`.
pub fn bank_registers(irq: u8) -> (u16, u16, u16) {
    let stride = (irq as u16 / 32) * IRQ_BANK_STRIDE;
    (
        IRQ_STATUS0 + stride,
        IRQ_CLEAR0 + stride,
        IRQ_ENABLE0 + stride,
    )
}

pub fn mask_register(irq: u8) -> u16 {
    if irq < 32 {
        IRQ_MASK0
    } else {
        IRQ_MASK1
    }
}

/// Mode select register and bit position of `irq`'s mode field.
pub fn mode_field(irq: u8) -> (u16, u32) {
    let register = IRQ_MODE_SELECT0 + (irq / IRQ_MODES_PER_REGISTER) as u16 * 4;
    let shift = (irq % IRQ_MODES_PER_REGISTER) as u32 * IRQ_MODE_BITS as u32;
    (register, shift)
}
