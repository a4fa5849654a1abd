// Licensed under the Apache-2.0 license

use crate::MSPI_MAX_PACKET_SIZE;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Fixed command opcodes understood by the remote XSPI slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    ReadStatus = 0x10,
    ReadAddress = 0x11,
    ReadRxData = 0x12,
    ReadTxData = 0x13,
    WriteStatus = 0x14,
    ReadConfig = 0x15,
    ReadVersion = 0x16,
    SetDummy = 0x40,
    WriteBurst1 = 0x70,
    SoftReset = 0x99,
    ReadBurst1 = 0xA0,
}

/// Bus lane layout as instruction-address-data widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    #[default]
    Serial1_1_1,
    Dual1_2_2,
    Quad1_4_4,
    Octal1_8_8,
    Dual2_2_2,
    Quad4_4_4,
    Octal8_8_8,
}

impl OperatingMode {
    /// Set-operating-mode opcode for this mode. `None` when the mode has no DQS variant.
    pub fn sopm_opcode(&self, dqs: bool) -> Option<u8> {
        let opcode = match (self, dqs) {
            (OperatingMode::Serial1_1_1, false) => 0x20,
            (OperatingMode::Dual1_2_2, false) => 0x21,
            (OperatingMode::Quad1_4_4, false) => 0x22,
            (OperatingMode::Octal1_8_8, false) => 0x23,
            (OperatingMode::Dual2_2_2, false) => 0x24,
            (OperatingMode::Quad4_4_4, false) => 0x25,
            (OperatingMode::Octal8_8_8, false) => 0x26,
            (OperatingMode::Quad1_4_4, true) => 0x27,
            (OperatingMode::Octal1_8_8, true) => 0x28,
            (OperatingMode::Quad4_4_4, true) => 0x29,
            (OperatingMode::Octal8_8_8, true) => 0x2A,
            _ => return None,
        };
        Some(opcode)
    }
}

/// A write/read opcode pair and the largest transfer it may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeLimit {
    pub write: u8,
    pub read: u8,
    pub max_bytes: u32,
}

impl OpcodeLimit {
    pub const fn new(write: u8, read: u8, max_bytes: u32) -> Self {
        Self {
            write,
            read,
            max_bytes,
        }
    }
}

pub const DEFAULT_OPCODE_TABLE: &[OpcodeLimit] = &[
    OpcodeLimit::new(0x60, 0x80, 1),
    OpcodeLimit::new(0x61, 0x81, 2),
    OpcodeLimit::new(0x70, 0xA0, 4),
    OpcodeLimit::new(0x71, 0xA1, 8),
    OpcodeLimit::new(0x72, 0xA2, 16),
    OpcodeLimit::new(0x73, 0xA3, 32),
    OpcodeLimit::new(0x74, 0xA4, 64),
    OpcodeLimit::new(0x75, 0xA5, 128),
    OpcodeLimit::new(0x76, 0xA6, 256),
    OpcodeLimit::new(0x77, 0xA7, 512),
    OpcodeLimit::new(0x78, 0xA8, 1024),
    OpcodeLimit::new(0x7F, 0xC0, MSPI_MAX_PACKET_SIZE),
];

/// Chunk limit for a configured write opcode.
pub fn write_limit(table: &[OpcodeLimit], opcode: u8) -> Option<u32> {
    table
        .iter()
        .find(|entry| entry.write == opcode)
        .map(|entry| entry.max_bytes)
}

/// Chunk limit for a configured read opcode.
pub fn read_limit(table: &[OpcodeLimit], opcode: u8) -> Option<u32> {
    table
        .iter()
        .find(|entry| entry.read == opcode)
        .map(|entry| entry.max_bytes)
}
