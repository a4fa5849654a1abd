// Licensed under the Apache-2.0 license

//! Bounded polling used by every blocking wait on the AMBT53 bus.

#![cfg_attr(target_os = "none", no_std)]

use ambt53_error::{Ambt53Error, Ambt53Result};
use embedded_hal::delay::DelayNs;

/// Calls `condition` until it returns `Ok(true)`, sleeping `interval_us` between
/// attempts. Gives up with [`Ambt53Error::Timeout`] after `iterations` attempts.
/// An `Err` from the condition ends the wait immediately.
pub fn poll_until<D, F>(
    delay: &mut D,
    iterations: u32,
    interval_us: u32,
    mut condition: F,
) -> Ambt53Result<()>
where
    D: DelayNs,
    F: FnMut() -> Ambt53Result<bool>,
{
    for _ in 0..iterations {
        if condition()? {
            return Ok(());
        }
        delay.delay_us(interval_us);
    }
    // one last look so a zero budget still samples the condition
    if condition()? {
        return Ok(());
    }
    Err(Ambt53Error::Timeout)
}

/// Delay of `cycles` bus clock periods, rounded up to a whole nanosecond.
pub fn delay_cycles<D: DelayNs>(delay: &mut D, cycles: u32, clock_hz: u32) {
    if clock_hz == 0 {
        return;
    }
    let ns = (cycles as u64 * 1_000_000_000).div_ceil(clock_hz as u64);
    delay.delay_ns(ns.min(u32::MAX as u64) as u32);
}

/// Borrows a shared delay only for the duration of each call, so a driver holding
/// its delay in a `RefCell` can poll while nested calls also delay.
pub struct SharedDelay<'a, D>(pub &'a core::cell::RefCell<D>);

impl<D: DelayNs> DelayNs for SharedDelay<'_, D> {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().delay_ns(ns);
    }
}
