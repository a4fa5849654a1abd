// Licensed under the Apache-2.0 license

use ambt53_config::MAILBOX_BASE_ADDR;
use ambt53_emulator::{EmulatedAmbt53, TickDelay};
use ambt53_error::Ambt53Error;
use ambt53_mailbox::registers;
use ambt53_mailbox::{KickClient, MailboxChannel, MailboxConfig, MailboxErrors, MailboxInterrupts};
use ambt53_mspi::{MspiConfig, MspiTransport, RemoteRegisters};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::cell::RefCell;

fn setup_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

fn open(emu: &EmulatedAmbt53) -> MspiTransport<'static, EmulatedAmbt53, TickDelay> {
    MspiTransport::open(emu.clone(), emu.delay(), MspiConfig::default()).unwrap()
}

#[derive(Default)]
struct Recorder {
    words: RefCell<Vec<u32>>,
}

impl KickClient for Recorder {
    fn kicked(&self, word: u32) {
        self.words.borrow_mut().push(word);
    }
}

#[test]
fn test_write_stops_at_full() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    transport.enable_xip().unwrap();
    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());

    let words: Vec<u32> = (0..40).collect();
    assert_eq!(mailbox.write_data(&words).unwrap(), 32);
    let status = mailbox.status().unwrap();
    assert!(status.m2d_full);
    assert_eq!(status.m2d_count, 32);
    assert!(mailbox.errors().unwrap().is_empty());
    assert_eq!(mailbox.kick(99), Err(Ambt53Error::Busy));

    let popped: Vec<u32> = std::iter::from_fn(|| emu.mailbox_pop()).collect();
    assert_eq!(popped, (0..32).collect::<Vec<_>>());

    mailbox.kick(5).unwrap();
    assert_eq!(emu.mailbox_pop(), Some(5));
}

#[test]
fn test_read_empty_and_error_settle() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());

    let mut words = [0u32; 4];
    assert_eq!(mailbox.read_data(&mut words).unwrap(), 0);
    assert!(mailbox.errors().unwrap().is_empty());

    // bypassing the status check underflows the FIFO
    assert_eq!(
        transport
            .read_reg32(MAILBOX_BASE_ADDR + registers::D2M_DATA)
            .unwrap(),
        0
    );
    assert_eq!(mailbox.errors().unwrap(), MailboxErrors::READ_EMPTY);
    assert!(mailbox
        .interrupt_status()
        .unwrap()
        .contains(MailboxInterrupts::ERROR));

    mailbox.clear_errors(MailboxErrors::READ_EMPTY).unwrap();
    assert_eq!(mailbox.errors().unwrap(), MailboxErrors::READ_EMPTY);
    assert!(mailbox
        .clear_errors_settled(MailboxErrors::READ_EMPTY)
        .unwrap()
        .is_empty());
}

#[test]
fn test_service_dispatches_by_word() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let ones = Recorder::default();
    let twos = Recorder::default();
    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());
    mailbox
        .init(2, MailboxInterrupts::THRESHOLD | MailboxInterrupts::ERROR)
        .unwrap();
    mailbox.register_kick_client(1, &ones).unwrap();
    mailbox.register_kick_client(2, &twos).unwrap();

    assert!(emu.mailbox_push(1));
    assert!(!emu.mailbox_interrupt_pending());
    for word in [2, 1, 7] {
        assert!(emu.mailbox_push(word));
    }
    assert!(emu.mailbox_interrupt_pending());

    assert!(mailbox.service_interrupt().unwrap().is_empty());
    assert!(!emu.mailbox_interrupt_pending());
    assert_eq!(*ones.words.borrow(), [1, 1]);
    assert_eq!(*twos.words.borrow(), [2]);
    assert!(mailbox.status().unwrap().d2m_empty);
}

#[test]
fn test_kick_client_table_is_bounded() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let client = Recorder::default();
    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());
    for word in 0..4 {
        mailbox.register_kick_client(word, &client).unwrap();
    }
    assert_eq!(
        mailbox.register_kick_client(4, &client),
        Err(Ambt53Error::NoSpace)
    );
}

#[test]
fn test_init_validates_and_flushes() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open(&emu);
    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());

    assert_eq!(
        mailbox.init(0, MailboxInterrupts::THRESHOLD),
        Err(Ambt53Error::InvalidArg)
    );
    assert_eq!(
        mailbox.init(32, MailboxInterrupts::THRESHOLD),
        Err(Ambt53Error::InvalidArg)
    );

    for word in 0..3 {
        assert!(emu.mailbox_push(word));
    }
    mailbox.init(4, MailboxInterrupts::THRESHOLD).unwrap();
    assert!(mailbox.status().unwrap().d2m_empty);
    assert!(mailbox.errors().unwrap().is_empty());
    assert_eq!(
        transport
            .read_reg32(MAILBOX_BASE_ADDR + registers::D2M_THRESHOLD)
            .unwrap(),
        4
    );

    mailbox.interrupt_disable(MailboxInterrupts::THRESHOLD).unwrap();
    for word in 0..4 {
        assert!(emu.mailbox_push(word));
    }
    assert!(!emu.mailbox_interrupt_pending());
    mailbox.interrupt_enable(MailboxInterrupts::THRESHOLD).unwrap();
    assert!(emu.mailbox_interrupt_pending());
}
