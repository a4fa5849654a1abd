// Licensed under the Apache-2.0 license

#![cfg_attr(target_os = "none", no_std)]

pub mod opcode;

pub use opcode::{Command, OperatingMode, OpcodeLimit, DEFAULT_OPCODE_TABLE};

/// Largest transfer the unlimited-length opcodes accept.
pub const MSPI_MAX_PACKET_SIZE: u32 = 0x400_0000;
/// Iteration budget for every blocking bus wait (about 1 us per iteration).
pub const MSPI_TRANSFER_TIMEOUT: u32 = 1_000_000;
/// Budget for the bus-idle wait in front of register access.
pub const MSPI_IDLE_TIMEOUT_US: u32 = 1000;
/// Transport handles that can be open at the same time.
pub const MSPI_MAX_DEVICES: usize = 2;
pub const SCPM_MAX_DEVICES: usize = 1;
/// 7-bit I2C address of the power-management companion.
pub const SCPM_I2C_ADDRESS: u8 = 0x3A;
/// Dummy cycles programmed into the remote when none are configured.
pub const MSPI_DEFAULT_DUMMY_CYCLES: u8 = 32;
pub const MSPI_MIN_DUMMY_CYCLES: u8 = 4;
/// XSPI transfer status register of the remote.
pub const XSPI_TRANSFER_STATUS_ADDR: u32 = 0x0300_0B00;

/// Scratch block size used for erase and read-back verification.
pub const LOAD_FW_BUFFER_SIZE: usize = 4 * 1024;
/// Region the loaded program increments once it runs.
pub const BOOT_TEST_DATA_ADDRESS: u32 = 0x21000;
pub const BOOT_TEST_DATA_SIZE: usize = 16;

pub const MAILBOX_BASE_ADDR: u32 = 0x0300_1000;
pub const MAILBOX_FIFO_DEPTH: usize = 32;
/// Bus cycles before a cleared mailbox error bit reads back as clear.
pub const MAILBOX_ERROR_SETTLE_CYCLES: u32 = 25;

/// Extended GPIO block inside the SCPM register space.
pub const GPIO_BASE_ADDR: u32 = 0x0300_0100;

/// Silicon revisions with different SRAM bank layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HwRevision {
    Rtl1_0_1,
    #[default]
    Rtl1_1_1,
}

/// Memory types of the remote core, in image table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Ptcm,
    Dtcm,
    Csram,
    Dsram,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Ptcm,
        MemoryType::Dtcm,
        MemoryType::Csram,
        MemoryType::Dsram,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MemoryType::Ptcm => "PTCM",
            MemoryType::Dtcm => "DTCM",
            MemoryType::Csram => "CSRAM",
            MemoryType::Dsram => "DSRAM",
        }
    }
}

/// Configures the memory map of the remote core as seen over the bus.
/// These are hardware constants; the defaults describe the current silicon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMemoryMap {
    pub dtcm_offset: u32,
    pub dtcm_size: u32,
    pub ptcm_offset: u32,
    pub ptcm_size: u32,
    pub sram_bank0_offset: u32,
    pub csram_offset: u32,
    pub csram_size: u32,
    pub dsram_offset: u32,
    pub dsram_size: u32,
}

impl Default for RemoteMemoryMap {
    fn default() -> Self {
        Self::for_revision(HwRevision::default())
    }
}

impl RemoteMemoryMap {
    pub const fn for_revision(revision: HwRevision) -> Self {
        match revision {
            HwRevision::Rtl1_1_1 => RemoteMemoryMap {
                dtcm_offset: 0x0000_0000,
                dtcm_size: 0x8_0000,
                ptcm_offset: 0x0020_0000,
                ptcm_size: 0x4_0000,
                sram_bank0_offset: 0x0100_0000,
                // banks 0..=2 are contiguous
                csram_offset: 0x0100_0000,
                csram_size: 0x18_0000,
                dsram_offset: 0x0118_0000,
                dsram_size: 0x4_0000,
            },
            HwRevision::Rtl1_0_1 => RemoteMemoryMap {
                dtcm_offset: 0x0000_0000,
                dtcm_size: 0x8_0000,
                ptcm_offset: 0x0020_0000,
                ptcm_size: 0x4_0000,
                sram_bank0_offset: 0x0100_0000,
                csram_offset: 0x0100_0000,
                csram_size: 0x20_0000,
                dsram_offset: 0x0200_0000,
                dsram_size: 0x8_0000,
            },
        }
    }

    /// Sector base address and size for a memory type.
    pub fn sector(&self, memory: MemoryType) -> (u32, u32) {
        match memory {
            MemoryType::Ptcm => (self.ptcm_offset, self.ptcm_size),
            MemoryType::Dtcm => (self.dtcm_offset, self.dtcm_size),
            MemoryType::Csram => (self.csram_offset, self.csram_size),
            MemoryType::Dsram => (self.dsram_offset, self.dsram_size),
        }
    }

    /// True when `[address, address + len)` touches the write-only program TCM.
    pub fn overlaps_ptcm(&self, address: u32, len: u32) -> bool {
        let start = address as u64;
        let end = start + len as u64;
        let ptcm_start = self.ptcm_offset as u64;
        let ptcm_end = ptcm_start + self.ptcm_size as u64;
        start < ptcm_end && end > ptcm_start
    }

    /// Destination for code linked at a TCM-relative address.
    pub fn remap_executable(&self, vaddr: u32, executable: bool) -> u32 {
        if vaddr < self.sram_bank0_offset && executable {
            self.ptcm_offset + vaddr
        } else {
            vaddr
        }
    }
}
