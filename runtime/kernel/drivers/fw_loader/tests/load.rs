// Licensed under the Apache-2.0 license

use ambt53_config::{MemoryType, RemoteMemoryMap, BOOT_TEST_DATA_ADDRESS};
use ambt53_emulator::{ElfBuilder, EmulatedAmbt53, TickDelay, Transaction};
use ambt53_error::Ambt53Error;
use ambt53_fw_image::{Image, ImageTables};
use ambt53_fw_loader::{FirmwareLoader, LoaderConfig, LoaderState};
use ambt53_mspi::{CompletionMode, MspiConfig, MspiTransport};
use log::LevelFilter;
use simple_logger::SimpleLogger;

fn setup_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

fn open(emu: &EmulatedAmbt53) -> MspiTransport<'static, EmulatedAmbt53, TickDelay> {
    let config = MspiConfig {
        completion: CompletionMode::Polled,
        ..Default::default()
    };
    MspiTransport::open(emu.clone(), emu.delay(), config).unwrap()
}

fn is_power_event(transaction: &Transaction) -> bool {
    matches!(
        transaction,
        Transaction::CoreHold
            | Transaction::CoreRelease
            | Transaction::GlobalResetAssert
            | Transaction::GlobalResetRelease
    )
}

#[test]
fn test_erase_zeroes_and_is_idempotent() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), LoaderConfig::default());

    emu.load_memory(0x0118_0000, &[0x5A; 64]);
    loader.erase(0x0118_0000, 48).unwrap();
    assert_eq!(emu.memory(0x0118_0000, 48), [0; 48]);
    assert_eq!(emu.memory(0x0118_0030, 16), [0x5A; 16]);
    loader.erase(0x0118_0000, 48).unwrap();
    assert_eq!(emu.memory(0x0118_0000, 48), [0; 48]);

    emu.clear_transactions();
    assert_eq!(
        loader.erase(0x0118_0002, 48),
        Err(Ambt53Error::SegmentSizeError)
    );
    assert_eq!(
        loader.write(0x0118_0000, &[1, 2, 3]),
        Err(Ambt53Error::SegmentSizeError)
    );
    assert!(emu.transactions().is_empty());
}

#[test]
fn test_ptcm_image_boots_without_read_back() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), LoaderConfig::default());
    let (ptcm_base, ptcm_size) = loader.sector(MemoryType::Ptcm);
    assert_eq!((ptcm_base, ptcm_size), (0x20_0000, 0x4_0000));

    let ptcm = vec![0xFFu8; ptcm_size as usize];
    let tables = ImageTables {
        ptcm: &ptcm,
        ..Default::default()
    };
    let image = Image::from_tables(&RemoteMemoryMap::default(), &tables).unwrap();
    emu.clear_transactions();
    loader.load(image).unwrap();

    assert!(matches!(loader.state(), LoaderState::Running));
    assert!(!emu.is_core_held());
    assert_eq!(emu.memory(ptcm_base, 16), [0xFF; 16]);
    assert_eq!(emu.memory(ptcm_base + ptcm_size - 16, 16), [0xFF; 16]);

    let log = emu.transactions();
    let power: Vec<&Transaction> = log.iter().filter(|t| is_power_event(t)).collect();
    assert_eq!(
        power,
        [
            &Transaction::CoreHold,
            &Transaction::GlobalResetAssert,
            &Transaction::GlobalResetRelease,
            &Transaction::CoreRelease,
        ]
    );
    let release = log
        .iter()
        .position(|t| *t == Transaction::GlobalResetRelease)
        .unwrap();
    let first_write = log
        .iter()
        .position(|t| matches!(t, Transaction::Dma { write: true, .. }))
        .unwrap();
    assert!(release < first_write);
    assert_eq!(log.last(), Some(&Transaction::CoreRelease));
    assert!(!log
        .iter()
        .any(|t| matches!(t, Transaction::Dma { write: false, .. })));
}

#[test]
fn test_load_elf_and_section() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), LoaderConfig::default());

    let elf = ElfBuilder::new(0x100)
        .segment(0x100, &[0x11; 64], 64, true)
        .segment(0x0118_0000, &[0x22; 16], 48, false)
        .build();
    loader.load_elf(&elf).unwrap();
    assert!(matches!(loader.state(), LoaderState::Running));
    assert_eq!(emu.memory(0x20_0100, 64), [0x11; 64]);
    assert_eq!(emu.memory(0x0118_0000, 16), [0x22; 16]);
    assert_eq!(emu.memory(0x0118_0010, 32), [0; 32]);

    let update = ElfBuilder::new(0x100)
        .section(".data", 0x0118_0000, &[0x33; 8], false)
        .build();
    emu.clear_transactions();
    loader.load_section_by_name(&update, ".data").unwrap();
    assert_eq!(emu.memory(0x0118_0000, 8), [0x33; 8]);
    assert_eq!(emu.memory(0x0118_0008, 8), [0x22; 8]);
    assert!(!emu.transactions().iter().any(is_power_event));
    assert!(matches!(loader.state(), LoaderState::Running));

    assert_eq!(
        loader.load_section_by_name(&update, ".text"),
        Err(Ambt53Error::InvalidArg)
    );
    assert_eq!(loader.load_elf(&[0u8; 16]), Err(Ambt53Error::InvalidImage));
}

#[test]
fn test_boot_verify() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let config = LoaderConfig {
        boot_verify: true,
        ..Default::default()
    };
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), config);
    let dtcm = [0x40u8; 64];
    let tables = ImageTables {
        dtcm: &dtcm,
        ..Default::default()
    };
    let map = RemoteMemoryMap::default();

    emu.set_boot_program(true);
    loader
        .load(Image::from_tables(&map, &tables).unwrap())
        .unwrap();
    assert!(matches!(loader.state(), LoaderState::Running));
    // erased with the rest of DTCM, then bumped once by the boot program
    assert_eq!(emu.memory(BOOT_TEST_DATA_ADDRESS, 4), [1; 4]);

    emu.set_boot_program(false);
    assert_eq!(
        loader.load(Image::from_tables(&map, &tables).unwrap()),
        Err(Ambt53Error::Fail)
    );
    assert!(matches!(loader.state(), LoaderState::Failed));
}

#[test]
fn test_failed_load_leaves_core_held() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), LoaderConfig::default());
    let dsram = [9u8; 32];
    let tables = ImageTables {
        dsram: &dsram,
        ..Default::default()
    };
    let image = Image::from_tables(&RemoteMemoryMap::default(), &tables).unwrap();

    emu.fail_next_dma();
    assert_eq!(loader.load(image.clone()), Err(Ambt53Error::Fail));
    assert!(matches!(loader.state(), LoaderState::Failed));
    assert!(emu.is_core_held());

    // a retry starts over from the hold
    loader.load(image).unwrap();
    assert!(matches!(loader.state(), LoaderState::Running));
    assert_eq!(emu.memory(0x0118_0000, 32), [9; 32]);
}

#[test]
fn test_bad_elf_segments_never_reset_the_core() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mut loader = FirmwareLoader::new(&transport, &emu, emu.delay(), LoaderConfig::default());
    emu.clear_transactions();

    let oversized = ElfBuilder::new(0x100)
        .segment(0x0118_0000, &[0x22; 64], 16, false)
        .build();
    assert_eq!(loader.load_elf(&oversized), Err(Ambt53Error::InvalidImage));
    let wrapping = ElfBuilder::new(0x100)
        .segment(0xFFFF_F000, &[0; 16], 0x2000, false)
        .build();
    assert_eq!(loader.load_elf(&wrapping), Err(Ambt53Error::InvalidImage));
    assert!(emu.transactions().is_empty());
    assert!(matches!(loader.state(), LoaderState::Idle));

    assert_eq!(loader.erase(0xFFFF_F000, 0x2000), Err(Ambt53Error::InvalidArg));
    assert!(emu.transactions().is_empty());
}
