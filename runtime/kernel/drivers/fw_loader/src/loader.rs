// Licensed under the Apache-2.0 license.

use crate::PowerControl;
use ambt53_config::{
    MemoryType, RemoteMemoryMap, BOOT_TEST_DATA_ADDRESS, BOOT_TEST_DATA_SIZE, LOAD_FW_BUFFER_SIZE,
};
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_fw_image::{find_section, load_segments, Image};
use ambt53_mspi::RemoteMemory;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use smlang::statemachine;

statemachine! {
    derive_states: [Clone, Copy, Debug],
    transitions: {
        // syntax: CurrentState Event = NextState

        // a new load may start from scratch, after a failure or over a running core
        *Idle + HoldCore = CoreHeld,
        Failed + HoldCore = CoreHeld,
        Running + HoldCore = CoreHeld,

        // every region goes erase -> write -> optional verify
        CoreHeld + BeginRegion = Erasing,
        Writing + BeginRegion = Erasing,
        Verifying + BeginRegion = Erasing,
        Erasing + Erased = Writing,
        Writing + Verify = Verifying,

        CoreHeld + ReleaseCore = CoreReleased,
        Writing + ReleaseCore = CoreReleased,
        Verifying + ReleaseCore = CoreReleased,
        CoreReleased + Started = Running,

        CoreHeld + Fail = Failed,
        Erasing + Fail = Failed,
        Writing + Fail = Failed,
        Verifying + Fail = Failed,
        CoreReleased + Fail = Failed,
    }
}

pub(crate) struct Context;

impl StateMachineContext for Context {}

#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    pub memory_map: RemoteMemoryMap,
    /// Read every written chunk back and compare it.
    pub verify: bool,
    /// Check that the test region moved after the core left reset.
    pub boot_verify: bool,
    pub reset_settle_us: u32,
    pub boot_settle_us: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            memory_map: RemoteMemoryMap::default(),
            verify: true,
            boot_verify: false,
            reset_settle_us: 10,
            boot_settle_us: 1000,
        }
    }
}

fn check_alignment(address: u32, size: usize) -> Ambt53Result<()> {
    if address % 4 != 0 || size % 4 != 0 {
        error!(
            "ambt53-fw-loader: address {:#x} or size {:#x} not word aligned",
            address, size
        );
        return Err(Ambt53Error::SegmentSizeError);
    }
    Ok(())
}

/// `size` bytes at `address` must end inside the 32-bit address space.
fn check_range(address: u32, size: usize) -> Ambt53Result<()> {
    let end = u32::try_from(size)
        .ok()
        .and_then(|size| address.checked_add(size));
    if end.is_none() {
        error!(
            "ambt53-fw-loader: {:#x} bytes at {:#x} run past the address space",
            size, address
        );
        return Err(Ambt53Error::InvalidArg);
    }
    Ok(())
}

pub struct FirmwareLoader<'a, M: RemoteMemory, P: PowerControl, D: DelayNs> {
    memory: &'a M,
    power: &'a P,
    delay: D,
    config: LoaderConfig,
    machine: StateMachine<Context>,
    scratch: [u8; LOAD_FW_BUFFER_SIZE],
}

impl<'a, M: RemoteMemory, P: PowerControl, D: DelayNs> FirmwareLoader<'a, M, P, D> {
    pub fn new(memory: &'a M, power: &'a P, delay: D, config: LoaderConfig) -> Self {
        Self {
            memory,
            power,
            delay,
            config,
            machine: StateMachine::new(Context),
            scratch: [0; LOAD_FW_BUFFER_SIZE],
        }
    }

    pub fn state(&self) -> States {
        *self.machine.state()
    }

    fn advance(&mut self, event: Events) -> Ambt53Result<()> {
        let from = self.state();
        self.machine.process_event(event).map_err(|_| {
            warn!("ambt53-fw-loader: event not valid in state {:?}", from);
            Ambt53Error::InvalidOperation
        })?;
        debug!("ambt53-fw-loader: {:?} -> {:?}", from, self.state());
        Ok(())
    }

    fn fail(&mut self) {
        // only in-load states can fail; anything else stays where it is
        let _ = self.machine.process_event(Events::Fail);
    }

    /// Zero `[address, address + size)` with blocking block-sized writes.
    pub fn erase(&mut self, address: u32, size: usize) -> Ambt53Result<()> {
        check_alignment(address, size)?;
        check_range(address, size)?;
        self.scratch.fill(0);
        let mut offset = 0;
        while offset < size {
            let len = LOAD_FW_BUFFER_SIZE.min(size - offset);
            self.memory
                .write(address + offset as u32, &self.scratch[..len])?;
            offset += len;
        }
        Ok(())
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        check_alignment(address, data.len())?;
        check_range(address, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.memory.write(address, data)
    }

    /// Read `data`'s destination back block by block and compare. Blocks that
    /// touch the write-only program TCM are skipped.
    pub fn verify(&mut self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        check_range(address, data.len())?;
        for (index, expected) in data.chunks(LOAD_FW_BUFFER_SIZE).enumerate() {
            let block = address + (index * LOAD_FW_BUFFER_SIZE) as u32;
            if self
                .config
                .memory_map
                .overlaps_ptcm(block, expected.len() as u32)
            {
                continue;
            }
            let actual = &mut self.scratch[..expected.len()];
            self.memory.read(block, actual)?;
            if let Some(at) = actual.iter().zip(expected).position(|(a, e)| a != e) {
                let address = block + at as u32;
                error!("ambt53-fw-loader: read-back mismatch at {:#x}", address);
                return Err(Ambt53Error::VerifyMismatch { address });
            }
        }
        Ok(())
    }

    fn load_region(&mut self, address: u32, erase_size: usize, payload: &[u8]) -> Ambt53Result<()> {
        // alignment first so a bad region never touches the bus
        check_alignment(address, erase_size)?;
        check_alignment(address, payload.len())?;
        check_range(address, erase_size.max(payload.len()))?;
        self.advance(Events::BeginRegion)?;
        self.erase(address, erase_size)?;
        self.advance(Events::Erased)?;
        self.write(address, payload)?;
        if self.config.verify {
            self.advance(Events::Verify)?;
            self.verify(address, payload)?;
        }
        Ok(())
    }

    fn hold_core(&mut self) -> Ambt53Result<()> {
        self.advance(Events::HoldCore)?;
        let held = self
            .power
            .core_hold()
            .and_then(|_| self.power.global_reset_assert())
            .and_then(|_| {
                self.delay.delay_us(self.config.reset_settle_us);
                self.power.global_reset_release()
            });
        if let Err(err) = held {
            error!("ambt53-fw-loader: failed to hold the core: {}", err);
            self.fail();
            return Err(err);
        }
        Ok(())
    }

    fn sample_boot_region(&mut self) -> Ambt53Result<[u8; BOOT_TEST_DATA_SIZE]> {
        let mut sample = [0u8; BOOT_TEST_DATA_SIZE];
        self.memory.read(BOOT_TEST_DATA_ADDRESS, &mut sample)?;
        Ok(sample)
    }

    fn release_core(&mut self) -> Ambt53Result<()> {
        let before = if self.config.boot_verify {
            Some(self.sample_boot_region()?)
        } else {
            None
        };
        self.power.core_release()?;
        self.advance(Events::ReleaseCore)?;
        self.delay.delay_us(self.config.boot_settle_us);

        if let Some(before) = before {
            let after = self.sample_boot_region()?;
            let booted = before
                .iter()
                .zip(after.iter())
                .all(|(b, a)| b.wrapping_add(1) == *a);
            if !booted {
                error!(
                    "ambt53-fw-loader: boot check failed, {:02x?} -> {:02x?}",
                    before, after
                );
                return Err(Ambt53Error::Fail);
            }
            info!("ambt53-fw-loader: boot check passed");
        }
        self.advance(Events::Started)
    }

    fn run<F>(&mut self, body: F) -> Ambt53Result<()>
    where
        F: FnOnce(&mut Self) -> Ambt53Result<()>,
    {
        self.hold_core()?;
        let result = body(self).and_then(|_| self.release_core());
        if result.is_err() {
            self.fail();
        }
        result
    }

    /// Write every non-empty region of `image`, bracketed by core hold and release.
    ///
    /// A failing region aborts the load with the core still held.
    pub fn load(&mut self, image: Image<'_>) -> Ambt53Result<()> {
        self.run(|loader| {
            for region in image.loadable() {
                info!(
                    "ambt53-fw-loader: loading {} ({} bytes) at {:#x}",
                    region.memory.name(),
                    region.payload.len(),
                    region.address
                );
                loader
                    .load_region(region.address, region.size as usize, region.payload)
                    .inspect_err(|err| {
                        error!(
                            "ambt53-fw-loader: {} load failed: {}",
                            region.memory.name(),
                            err
                        )
                    })?;
            }
            Ok(())
        })
    }

    /// Load the `PT_LOAD` segments of an ELF file, bracketed by core hold and release.
    pub fn load_elf(&mut self, elf: &[u8]) -> Ambt53Result<()> {
        let segments = load_segments(&self.config.memory_map, elf)?;
        self.run(|loader| {
            for segment in segments.iter() {
                debug!(
                    "ambt53-fw-loader: ELF segment at {:#x}, {} of {} bytes",
                    segment.address,
                    segment.data.len(),
                    segment.mem_size
                );
                loader
                    .load_region(segment.address, segment.mem_size as usize, segment.data)
                    .inspect_err(|err| {
                        error!(
                            "ambt53-fw-loader: segment at {:#x} failed: {}",
                            segment.address, err
                        )
                    })?;
            }
            Ok(())
        })
    }

    /// Load one named section into a running core. The core is not reset.
    pub fn load_section_by_name(&mut self, elf: &[u8], name: &str) -> Ambt53Result<()> {
        let section = find_section(&self.config.memory_map, elf, name)?;
        check_alignment(section.address, section.mem_size as usize)?;
        check_alignment(section.address, section.data.len())?;
        check_range(section.address, section.data.len().max(section.mem_size as usize))?;
        info!(
            "ambt53-fw-loader: loading section {} at {:#x}",
            name, section.address
        );
        self.erase(section.address, section.mem_size as usize)?;
        self.write(section.address, section.data)?;
        if self.config.verify {
            self.verify(section.address, section.data)?;
        }
        Ok(())
    }

    /// Sector of `memory` in the configured memory map.
    pub fn sector(&self, memory: MemoryType) -> (u32, u32) {
        self.config.memory_map.sector(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambt53_fw_image::ImageTables;
    use core::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeMemory {
        bytes: RefCell<BTreeMap<u32, u8>>,
        writes: RefCell<Vec<(u32, usize)>>,
        stuck: Cell<Option<u32>>,
    }

    impl RemoteMemory for FakeMemory {
        fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()> {
            let bytes = self.bytes.borrow();
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = *bytes.get(&(address + i as u32)).unwrap_or(&0);
            }
            Ok(())
        }

        fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()> {
            self.writes.borrow_mut().push((address, data.len()));
            let mut bytes = self.bytes.borrow_mut();
            for (i, byte) in data.iter().enumerate() {
                let at = address + i as u32;
                if self.stuck.get() != Some(at) {
                    bytes.insert(at, *byte);
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePower {
        calls: RefCell<Vec<&'static str>>,
        fail_assert: bool,
    }

    impl FakePower {
        fn record(&self, call: &'static str) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl PowerControl for FakePower {
        fn core_hold(&self) -> Ambt53Result<()> {
            self.record("hold");
            Ok(())
        }

        fn core_release(&self) -> Ambt53Result<()> {
            self.record("release");
            Ok(())
        }

        fn global_reset_assert(&self) -> Ambt53Result<()> {
            self.record("assert");
            if self.fail_assert {
                return Err(Ambt53Error::HardwareFault);
            }
            Ok(())
        }

        fn global_reset_release(&self) -> Ambt53Result<()> {
            self.record("deassert");
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn small_map() -> RemoteMemoryMap {
        let mut map = RemoteMemoryMap::default();
        map.dtcm_size = 0x100;
        map.ptcm_size = 0x100;
        map
    }

    fn loader<'a>(
        memory: &'a FakeMemory,
        power: &'a FakePower,
    ) -> FirmwareLoader<'a, FakeMemory, FakePower, NoDelay> {
        let config = LoaderConfig {
            memory_map: small_map(),
            ..Default::default()
        };
        FirmwareLoader::new(memory, power, NoDelay, config)
    }

    #[test]
    fn test_erase_covers_remainder() {
        let memory = FakeMemory::default();
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);
        loader.erase(0x1000, LOAD_FW_BUFFER_SIZE + 8).unwrap();
        assert_eq!(
            *memory.writes.borrow(),
            [(0x1000, LOAD_FW_BUFFER_SIZE), (0x2000, 8)]
        );
        assert_eq!(
            loader.erase(0x1000, 6),
            Err(Ambt53Error::SegmentSizeError)
        );
    }

    #[test]
    fn test_load_runs_the_state_machine() {
        let memory = FakeMemory::default();
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);
        assert!(matches!(loader.state(), States::Idle));

        let dtcm = [7u8; 16];
        let tables = ImageTables {
            dtcm: &dtcm,
            ..Default::default()
        };
        let image = Image::from_tables(&small_map(), &tables).unwrap();
        loader.load(image.clone()).unwrap();
        assert!(matches!(loader.state(), States::Running));
        assert_eq!(*power.calls.borrow(), ["hold", "assert", "deassert", "release"]);

        // reloading over a running core starts again from a hold
        loader.load(image).unwrap();
        assert!(matches!(loader.state(), States::Running));
        assert_eq!(power.calls.borrow().len(), 8);
    }

    #[test]
    fn test_verify_mismatch_keeps_core_held() {
        let memory = FakeMemory::default();
        memory.stuck.set(Some(8));
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);

        let dtcm = [1u8; 16];
        let tables = ImageTables {
            dtcm: &dtcm,
            ..Default::default()
        };
        let image = Image::from_tables(&small_map(), &tables).unwrap();
        assert_eq!(
            loader.load(image),
            Err(Ambt53Error::VerifyMismatch { address: 8 })
        );
        assert!(matches!(loader.state(), States::Failed));
        assert_eq!(*power.calls.borrow(), ["hold", "assert", "deassert"]);
    }

    #[test]
    fn test_verify_skips_ptcm() {
        let memory = FakeMemory::default();
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);
        loader.verify(0x20_0000, &[0xFF; 16]).unwrap();
        assert_eq!(
            loader.verify(0x1000, &[0xFF; 4]),
            Err(Ambt53Error::VerifyMismatch { address: 0x1000 })
        );
    }

    #[test]
    fn test_power_failure_fails_before_writing() {
        let memory = FakeMemory::default();
        let power = FakePower {
            fail_assert: true,
            ..Default::default()
        };
        let mut loader = loader(&memory, &power);
        let image = Image::from_tables(&small_map(), &ImageTables::default()).unwrap();
        assert_eq!(loader.load(image), Err(Ambt53Error::HardwareFault));
        assert!(matches!(loader.state(), States::Failed));
        assert!(memory.writes.borrow().is_empty());
    }

    #[test]
    fn test_misaligned_region_never_touches_the_bus() {
        let memory = FakeMemory::default();
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);
        let dsram = [1u8; 6];
        let tables = ImageTables {
            dsram: &dsram,
            ..Default::default()
        };
        let image = Image::from_tables(&small_map(), &tables).unwrap();
        assert_eq!(loader.load(image), Err(Ambt53Error::SegmentSizeError));
        assert!(memory.writes.borrow().is_empty());
        assert!(matches!(loader.state(), States::Failed));
    }

    #[test]
    fn test_ranges_past_the_address_space_are_rejected() {
        let memory = FakeMemory::default();
        let power = FakePower::default();
        let mut loader = loader(&memory, &power);

        assert_eq!(loader.erase(0xFFFF_F000, 0x2000), Err(Ambt53Error::InvalidArg));
        assert_eq!(
            loader.write(0xFFFF_FFFC, &[0; 8]),
            Err(Ambt53Error::InvalidArg)
        );
        assert_eq!(
            loader.verify(0xFFFF_FFF0, &[0; 0x20]),
            Err(Ambt53Error::InvalidArg)
        );
        assert!(memory.writes.borrow().is_empty());

        // the last word of the address space is still reachable
        loader.erase(0xFFFF_FFF8, 4).unwrap();
        assert_eq!(*memory.writes.borrow(), [(0xFFFF_FFF8, 4)]);
    }
}
