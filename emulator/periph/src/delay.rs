/*++

Licensed under the Apache-2.0 license.

File Name:

    delay.rs

Abstract:

    File contains a delay that advances the emulated clock instead of sleeping.

--*/

use embedded_hal::delay::DelayNs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct TickDelay {
    now_ns: Arc<AtomicU64>,
}

impl TickDelay {
    pub(crate) fn with_clock(now_ns: Arc<AtomicU64>) -> Self {
        Self { now_ns }
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }
}

impl DelayNs for TickDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns.fetch_add(ns as u64, Ordering::Relaxed);
    }
}
