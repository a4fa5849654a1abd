// Licensed under the Apache-2.0 license.

//! What the IPC backend needs from the platform: the shared region and a doorbell.

use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_mailbox::MailboxChannel;
use ambt53_mspi::{MspiBus, MspiTransport, RemoteRegisters};
use embedded_hal::delay::DelayNs;

/// Byte access to the memory both cores see, by remote address.
pub trait SharedMemory {
    fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()>;

    fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()>;

    fn read_u32(&self, address: u32) -> Ambt53Result<u32> {
        let mut word = [0u8; 4];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    fn write_u32(&self, address: u32, value: u32) -> Ambt53Result<()> {
        self.write(address, &value.to_le_bytes())
    }
}

/// Tells the peer that a ring has new messages.
pub trait Notifier {
    fn notify(&self, word: u32) -> Ambt53Result<()>;
}

/// The host reaches the shared region through the XIP aperture.
impl<B: MspiBus, D: DelayNs> SharedMemory for MspiTransport<'_, B, D> {
    fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()> {
        self.xip_read(address, buf)
    }

    fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        self.xip_write(address, data)
    }
}

impl<R: RemoteRegisters, D: DelayNs> Notifier for MailboxChannel<'_, R, D> {
    fn notify(&self, word: u32) -> Ambt53Result<()> {
        self.kick(word).map_err(|err| match err {
            // a full doorbell FIFO means the peer has not caught up yet
            Ambt53Error::Busy => Ambt53Error::NoMemory { available: 0 },
            other => other,
        })
    }
}
