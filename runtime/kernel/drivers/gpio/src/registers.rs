// Licensed under the Apache-2.0 license.

//! Register offsets of one GPIO group, relative to the group base.

pub const GPIO_COUNT: u8 = 44;
pub const GROUP_COUNT: u8 = 2;
/// Distance between the register sets of group 0 and group 1.
pub const GROUP_STRIDE: u32 = 0x80;
/// Implemented pins per group.
pub const GROUP_MASKS: [u32; GROUP_COUNT as usize] = [0xFFFF_FFFF, 0xFFF];

pub const DIR: u32 = 0x00;
/// Software or hardware control. Only software mode is wired up.
pub const CTRL: u32 = 0x04;
/// Write-one-to-set of the output data.
pub const SET: u32 = 0x08;
/// Write-one-to-clear of the output data.
pub const CLR: u32 = 0x0C;
pub const ODATA: u32 = 0x10;
pub const IDATA: u32 = 0x14;
pub const IEN: u32 = 0x18;
/// Interrupt sense, edge (0) or level (1).
pub const IS: u32 = 0x1C;
/// Interrupt on both edges.
pub const IBE: u32 = 0x20;
/// Interrupt event, falling/low (0) or rising/high (1).
pub const IEV: u32 = 0x24;
/// Raw interrupt status.
pub const RIS: u32 = 0x28;
pub const IM: u32 = 0x2C;
/// Masked interrupt status.
pub const MIS: u32 = 0x30;
/// Write-one-to-clear of the raw status.
pub const IC: u32 = 0x34;
/// Debounce enable.
pub const DB: u32 = 0x38;
/// Debounce filter value, one per group.
pub const DFG: u32 = 0x3C;

/// Group and bit index of `pin`.
pub fn locate(pin: u8) -> (u8, u32) {
    (pin / 32, (pin % 32) as u32)
}

/// Absolute address of `offset` in `group` for a block at `base`.
pub fn group_register(base: u32, group: u8, offset: u32) -> u32 {
    base + group as u32 * GROUP_STRIDE + offset
}
