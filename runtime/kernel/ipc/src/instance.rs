// Licensed under the Apache-2.0 license.

use crate::hil::{Notifier, SharedMemory};
use crate::registry::RpmsgEndpointRegistry;
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_mailbox::KickClient;
use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use log::{error, info};

pub const IPC_MAX_INSTANCES: usize = 2;

/// An IPC backend that can be brought up and serviced from the doorbell.
pub trait IpcBackend {
    fn name(&self) -> &str;

    /// Doorbell word that means "messages are waiting for you".
    fn receive_word(&self) -> u32;

    fn open(&self) -> Ambt53Result<()>;

    /// Drain inbound messages, returning how many were handled.
    fn receive(&self) -> Ambt53Result<usize>;
}

impl<S: SharedMemory, N: Notifier, D: DelayNs, M: RawMutex> IpcBackend
    for RpmsgEndpointRegistry<'_, S, N, D, M>
{
    fn name(&self) -> &str {
        RpmsgEndpointRegistry::name(self)
    }

    fn receive_word(&self) -> u32 {
        self.config().receive_word
    }

    fn open(&self) -> Ambt53Result<()> {
        RpmsgEndpointRegistry::open(self)
    }

    fn receive(&self) -> Ambt53Result<usize> {
        RpmsgEndpointRegistry::receive(self)
    }
}

/// Named IPC instances sharing one doorbell.
pub struct IpcInstanceTable<'r, const N: usize = IPC_MAX_INSTANCES> {
    instances: [Cell<Option<&'r dyn IpcBackend>>; N],
}

impl<const N: usize> Default for IpcInstanceTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, const N: usize> IpcInstanceTable<'r, N> {
    pub fn new() -> Self {
        Self {
            instances: core::array::from_fn(|_| Cell::new(None)),
        }
    }

    /// Open `instance` and add it under its name. Nothing is added when the
    /// open fails.
    pub fn create(&self, instance: &'r dyn IpcBackend) -> Ambt53Result<()> {
        let name = instance.name();
        if name.is_empty() || self.get(name).is_some() {
            return Err(Ambt53Error::InvalidArg);
        }
        let slot = self
            .instances
            .iter()
            .find(|slot| slot.get().is_none())
            .ok_or(Ambt53Error::NoSpace)?;
        instance.open()?;
        slot.set(Some(instance));
        info!("ambt53-ipc: instance {} created", name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'r dyn IpcBackend> {
        self.instances
            .iter()
            .filter_map(Cell::get)
            .find(|instance| instance.name() == name)
    }

    pub fn len(&self) -> usize {
        self.instances.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> KickClient for IpcInstanceTable<'_, N> {
    fn kicked(&self, word: u32) {
        for instance in self.instances.iter().filter_map(Cell::get) {
            if instance.receive_word() != word {
                continue;
            }
            if let Err(err) = instance.receive() {
                error!("ambt53-ipc: {} receive failed: {}", instance.name(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        name: &'static str,
        word: u32,
        open_result: Ambt53Result<()>,
        opened: Cell<u32>,
        received: Cell<u32>,
    }

    impl Fake {
        fn new(name: &'static str, word: u32) -> Self {
            Self {
                name,
                word,
                open_result: Ok(()),
                opened: Cell::new(0),
                received: Cell::new(0),
            }
        }
    }

    impl IpcBackend for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn receive_word(&self) -> u32 {
            self.word
        }

        fn open(&self) -> Ambt53Result<()> {
            self.opened.set(self.opened.get() + 1);
            self.open_result
        }

        fn receive(&self) -> Ambt53Result<usize> {
            self.received.set(self.received.get() + 1);
            Ok(0)
        }
    }

    #[test]
    fn test_create_rules() {
        let a = Fake::new("a", 2);
        let again = Fake::new("a", 2);
        let b = Fake::new("b", 3);
        let c = Fake::new("c", 3);
        let unnamed = Fake::new("", 2);
        let table: IpcInstanceTable<'_, 2> = IpcInstanceTable::new();

        assert_eq!(table.create(&unnamed), Err(Ambt53Error::InvalidArg));
        table.create(&a).unwrap();
        assert_eq!(table.create(&again), Err(Ambt53Error::InvalidArg));
        table.create(&b).unwrap();
        assert_eq!(table.create(&c), Err(Ambt53Error::NoSpace));
        assert_eq!(a.opened.get(), 1);
        assert_eq!(again.opened.get(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let mut a = Fake::new("a", 2);
        a.open_result = Err(Ambt53Error::Timeout);
        let retry = Fake::new("a", 2);
        let table: IpcInstanceTable<'_> = IpcInstanceTable::new();
        assert_eq!(table.create(&a), Err(Ambt53Error::Timeout));
        assert!(table.is_empty());
        assert!(table.get("a").is_none());

        // the name is free again, and the failed instance is never kicked
        table.create(&retry).unwrap();
        table.kicked(2);
        assert_eq!(a.received.get(), 0);
        assert_eq!(retry.received.get(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_kick_routes_by_word() {
        let a = Fake::new("a", 2);
        let b = Fake::new("b", 3);
        let table: IpcInstanceTable<'_> = IpcInstanceTable::new();
        table.create(&a).unwrap();
        table.create(&b).unwrap();
        table.kicked(3);
        table.kicked(7);
        assert_eq!(a.received.get(), 0);
        assert_eq!(b.received.get(), 1);
    }
}
