// Licensed under the Apache-2.0 license.

//! Static rings in the shared region.
//!
//! These are plain head/tail index rings over fixed-size buffers, not virtio
//! descriptor/avail/used rings. Each slot is one rpmsg buffer, so there is no
//! descriptor table and no buffer chaining.
//!
//! ```text
//! base + 0x00  status word
//! base + 0x08  ring 0 head, tail
//! base + 0x10  ring 1 head, tail
//! base + 0x20  ring 0 buffers, then ring 1 buffers
//! ```
//!
//! Ring 0 carries host-to-remote messages, ring 1 remote-to-host. The sender owns
//! `head`, the receiver owns `tail`; both only ever increment.

use crate::hil::SharedMemory;
use crate::wire::RPMSG_BUFFER_SIZE;
use ambt53_error::{Ambt53Error, Ambt53Result};

/// Status word value once the host has laid out the rings.
pub const VDEV_STATUS_DRIVER_OK: u32 = 0x4;
const CONTROL_SIZE: u32 = 0x20;
const RING_CONTROL: [u32; 2] = [0x08, 0x10];

/// Largest power-of-two ring length that fits twice into `shm_size`.
pub fn optimal_num_desc(shm_size: u32) -> u32 {
    let available = shm_size.saturating_sub(CONTROL_SIZE) / (2 * RPMSG_BUFFER_SIZE as u32);
    if available == 0 {
        0
    } else {
        1 << (31 - available.leading_zeros())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    HostToRemote = 0,
    RemoteToHost = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticVrings {
    base: u32,
    num_desc: u32,
}

impl StaticVrings {
    pub fn configure(base: u32, size: u32) -> Ambt53Result<Self> {
        let num_desc = optimal_num_desc(size);
        if num_desc == 0 {
            return Err(Ambt53Error::NoMemory {
                available: size as usize,
            });
        }
        Ok(Self { base, num_desc })
    }

    pub fn num_desc(&self) -> u32 {
        self.num_desc
    }

    fn head_addr(&self, ring: Ring) -> u32 {
        self.base + RING_CONTROL[ring as usize]
    }

    fn tail_addr(&self, ring: Ring) -> u32 {
        self.head_addr(ring) + 4
    }

    /// Address of the buffer at ring position `index`.
    pub fn buffer_addr(&self, ring: Ring, index: u32) -> u32 {
        let ring_base = self.base + CONTROL_SIZE + ring as u32 * self.num_desc * RPMSG_BUFFER_SIZE as u32;
        ring_base + (index % self.num_desc) * RPMSG_BUFFER_SIZE as u32
    }

    /// Host side: zero both rings, then publish them.
    pub fn init<S: SharedMemory>(&self, shm: &S) -> Ambt53Result<()> {
        shm.write_u32(self.base, 0)?;
        for ring in [Ring::HostToRemote, Ring::RemoteToHost] {
            shm.write_u32(self.head_addr(ring), 0)?;
            shm.write_u32(self.tail_addr(ring), 0)?;
        }
        shm.write_u32(self.base, VDEV_STATUS_DRIVER_OK)
    }

    pub fn is_ready<S: SharedMemory>(&self, shm: &S) -> Ambt53Result<bool> {
        Ok(shm.read_u32(self.base)? == VDEV_STATUS_DRIVER_OK)
    }

    pub fn head<S: SharedMemory>(&self, shm: &S, ring: Ring) -> Ambt53Result<u32> {
        shm.read_u32(self.head_addr(ring))
    }

    pub fn tail<S: SharedMemory>(&self, shm: &S, ring: Ring) -> Ambt53Result<u32> {
        shm.read_u32(self.tail_addr(ring))
    }

    pub fn set_head<S: SharedMemory>(&self, shm: &S, ring: Ring, head: u32) -> Ambt53Result<()> {
        shm.write_u32(self.head_addr(ring), head)
    }

    pub fn set_tail<S: SharedMemory>(&self, shm: &S, ring: Ring, tail: u32) -> Ambt53Result<()> {
        shm.write_u32(self.tail_addr(ring), tail)
    }

    /// Buffers the sender may still fill.
    pub fn free<S: SharedMemory>(&self, shm: &S, ring: Ring) -> Ambt53Result<u32> {
        let used = self.head(shm, ring)?.wrapping_sub(self.tail(shm, ring)?);
        Ok(self.num_desc.saturating_sub(used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_desc_power_of_two() {
        assert_eq!(optimal_num_desc(0x8000), 16);
        assert_eq!(optimal_num_desc(0x20 + 2 * 512), 1);
        assert_eq!(optimal_num_desc(0x20 + 6 * 512), 2);
        assert_eq!(optimal_num_desc(0x20 + 1023), 0);
    }

    #[test]
    fn test_too_small_region() {
        assert_eq!(
            StaticVrings::configure(0, 0x100),
            Err(Ambt53Error::NoMemory { available: 0x100 })
        );
    }

    #[test]
    fn test_buffer_layout() {
        let vrings = StaticVrings::configure(0x1000, 0x20 + 4 * 512).unwrap();
        assert_eq!(vrings.num_desc(), 2);
        assert_eq!(vrings.buffer_addr(Ring::HostToRemote, 0), 0x1020);
        assert_eq!(vrings.buffer_addr(Ring::HostToRemote, 3), 0x1220);
        assert_eq!(vrings.buffer_addr(Ring::RemoteToHost, 0), 0x1420);
    }
}
