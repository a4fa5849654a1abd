// Licensed under the Apache-2.0 license

//! Bounded arena of device instances addressed by index handles.

#![cfg_attr(target_os = "none", no_std)]

use ambt53_error::{Ambt53Error, Ambt53Result};
use log::debug;

/// Index into a [`DevicePool`]. The generation catches handles used after release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle {
    index: usize,
    generation: u32,
}

impl PoolHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct DevicePool<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T, const N: usize> Default for DevicePool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> DevicePool<T, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                value: None,
            }),
        }
    }

    /// Moves `value` into the first free slot.
    pub fn acquire(&mut self, value: T) -> Ambt53Result<PoolHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())
            .ok_or(Ambt53Error::OutOfRange)?;
        slot.value = Some(value);
        debug!("pool: acquired slot {}", index);
        Ok(PoolHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Takes the instance back out, invalidating `handle`.
    pub fn release(&mut self, handle: PoolHandle) -> Ambt53Result<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take().ok_or(Ambt53Error::InvalidArg)?;
        slot.generation = slot.generation.wrapping_add(1);
        debug!("pool: released slot {}", handle.index);
        Ok(value)
    }

    pub fn get(&self, handle: PoolHandle) -> Ambt53Result<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(Ambt53Error::InvalidArg)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Ambt53Result<&mut T> {
        self.slot_mut(handle)?
            .value
            .as_mut()
            .ok_or(Ambt53Error::InvalidArg)
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn slot_mut(&mut self, handle: PoolHandle) -> Ambt53Result<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(Ambt53Error::InvalidArg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_full() {
        let mut pool: DevicePool<u32, 2> = DevicePool::new();
        let a = pool.acquire(1).unwrap();
        let b = pool.acquire(2).unwrap();
        assert_ne!(a.index(), b.index());
        assert_eq!(pool.acquire(3), Err(Ambt53Error::OutOfRange));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_release_frees_slot_and_invalidates_handle() {
        let mut pool: DevicePool<u32, 1> = DevicePool::new();
        let a = pool.acquire(7).unwrap();
        assert_eq!(pool.release(a), Ok(7));
        assert_eq!(pool.get(a), Err(Ambt53Error::InvalidArg));
        assert_eq!(pool.release(a), Err(Ambt53Error::InvalidArg));

        let b = pool.acquire(8).unwrap();
        assert_eq!(b.index(), a.index());
        assert_eq!(pool.get(b), Ok(&8));
        assert_eq!(pool.get(a), Err(Ambt53Error::InvalidArg));
    }
}
