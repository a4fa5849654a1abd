// Licensed under the Apache-2.0 license.

//! Message layouts shared with the DSP's rpmsg stack.

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of one buffer in a ring, header included.
pub const RPMSG_BUFFER_SIZE: usize = 512;
pub const RPMSG_HEADER_SIZE: usize = core::mem::size_of::<RpmsgHeader>();
/// Largest payload a single message carries.
pub const RPMSG_PAYLOAD_SIZE: usize = RPMSG_BUFFER_SIZE - RPMSG_HEADER_SIZE;
/// Destination of name-service announcements.
pub const RPMSG_NS_ADDR: u32 = 0x35;
/// Local endpoint addresses start above the reserved range.
pub const RPMSG_RESERVED_ADDRESSES: u32 = 1024;
/// Address not yet known.
pub const RPMSG_ADDR_ANY: u32 = u32::MAX;
pub const RPMSG_NAME_SIZE: usize = 32;

pub const RPMSG_NS_CREATE: u32 = 0;
pub const RPMSG_NS_DESTROY: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RpmsgHeader {
    pub src: U32,
    pub dst: U32,
    pub reserved: U32,
    pub len: U16,
    pub flags: U16,
}

impl RpmsgHeader {
    pub fn new(src: u32, dst: u32, len: usize) -> Self {
        Self {
            src: U32::new(src),
            dst: U32::new(dst),
            reserved: U32::new(0),
            len: U16::new(len as u16),
            flags: U16::new(0),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NsAnnounce {
    /// NUL-padded endpoint name.
    pub name: [u8; RPMSG_NAME_SIZE],
    pub addr: U32,
    pub flags: U32,
}

impl NsAnnounce {
    pub fn new(name: &str, addr: u32, flags: u32) -> Self {
        let mut padded = [0u8; RPMSG_NAME_SIZE];
        let len = name.len().min(RPMSG_NAME_SIZE - 1);
        padded[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            name: padded,
            addr: U32::new(addr),
            flags: U32::new(flags),
        }
    }

    /// Name up to the first NUL, `None` when it is not UTF-8.
    pub fn name(&self) -> Option<&str> {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RPMSG_NAME_SIZE);
        core::str::from_utf8(&self.name[..end]).ok()
    }
}
