// Licensed under the Apache-2.0 license

//! rpmsg between a host on the MSPI transport and a DSP-side registry running on
//! the emulated device's memory and mailbox.

use ambt53_emulator::{EmulatedAmbt53, TickDelay};
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_ipc::{
    EndpointCallbacks, EndpointState, EndpointToken, IpcConfig, IpcInstanceTable, Notifier, Role,
    RpmsgEndpointRegistry, SharedMemory,
};
use ambt53_mailbox::{KickClient, MailboxChannel, MailboxConfig, MailboxInterrupts};
use ambt53_mspi::{MspiConfig, MspiTransport, RemoteRegisters};
use embedded_hal::delay::DelayNs;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::cell::{Cell, RefCell};

const HOST_KICK: u32 = 0x1;
const REMOTE_KICK: u32 = 0x2;

fn setup_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

/// The DSP's view: direct memory access and its end of the mailbox.
struct DspSide(EmulatedAmbt53);

impl SharedMemory for DspSide {
    fn read(&self, address: u32, buf: &mut [u8]) -> Ambt53Result<()> {
        buf.copy_from_slice(&self.0.memory(address, buf.len()));
        Ok(())
    }

    fn write(&self, address: u32, data: &[u8]) -> Ambt53Result<()> {
        self.0.load_memory(address, data);
        Ok(())
    }
}

impl Notifier for DspSide {
    fn notify(&self, word: u32) -> Ambt53Result<()> {
        if self.0.mailbox_push(word) {
            Ok(())
        } else {
            Err(Ambt53Error::NoMemory { available: 0 })
        }
    }
}

#[derive(Default)]
struct Endpoint {
    bound: Cell<u32>,
    received: RefCell<Vec<Vec<u8>>>,
}

impl EndpointCallbacks for Endpoint {
    fn bound(&self, _token: EndpointToken) {
        self.bound.set(self.bound.get() + 1);
    }

    fn received(&self, _token: EndpointToken, data: &[u8]) {
        self.received.borrow_mut().push(data.to_vec());
    }
}

fn host_config() -> IpcConfig {
    IpcConfig {
        role: Role::Host,
        send_word: HOST_KICK,
        receive_word: REMOTE_KICK,
        ..Default::default()
    }
}

fn remote_config() -> IpcConfig {
    IpcConfig {
        role: Role::Remote,
        send_word: REMOTE_KICK,
        receive_word: HOST_KICK,
        ..Default::default()
    }
}

fn open_transport(emu: &EmulatedAmbt53) -> MspiTransport<'static, EmulatedAmbt53, TickDelay> {
    let transport = MspiTransport::open(emu.clone(), emu.delay(), MspiConfig::default()).unwrap();
    transport.enable_xip().unwrap();
    transport
}

/// Deliver doorbells both ways until neither side has anything left to say.
fn pump<R: RemoteRegisters, D: DelayNs>(
    emu: &EmulatedAmbt53,
    mailbox: &MailboxChannel<'_, R, D>,
    remote: &dyn KickClient,
) {
    for _ in 0..16 {
        let mut idle = true;
        while let Some(word) = emu.mailbox_pop() {
            remote.kicked(word);
            idle = false;
        }
        if emu.mailbox_interrupt_pending() {
            mailbox.service_interrupt().unwrap();
            idle = false;
        }
        if idle {
            return;
        }
    }
    panic!("ipc traffic did not settle");
}

#[test]
fn test_chat_host_registers_first() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open_transport(&emu);
    let dsp = DspSide(emu.clone());
    let host_ep = Endpoint::default();
    let remote_ep = Endpoint::default();

    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());
    mailbox.init(1, MailboxInterrupts::THRESHOLD).unwrap();
    let host: RpmsgEndpointRegistry<'_, _, _, _> =
        RpmsgEndpointRegistry::new("host", &transport, &mailbox, emu.delay(), host_config());
    let remote: RpmsgEndpointRegistry<'_, _, _, _> =
        RpmsgEndpointRegistry::new("dsp", &dsp, &dsp, emu.delay(), remote_config());
    mailbox.register_kick_client(REMOTE_KICK, &host).unwrap();

    host.open().unwrap();
    remote.open().unwrap();

    let host_token = host.register_endpoint("chat", &host_ep).unwrap();
    assert_eq!(host.endpoint_state(host_token), EndpointState::NameCached);
    pump(&emu, &mailbox, &remote);

    let remote_token = remote.register_endpoint("chat", &remote_ep).unwrap();
    pump(&emu, &mailbox, &remote);

    assert_eq!(host.endpoint_state(host_token), EndpointState::Bound);
    assert_eq!(remote.endpoint_state(remote_token), EndpointState::Bound);
    assert_eq!(host_ep.bound.get(), 1);
    assert_eq!(remote_ep.bound.get(), 1);

    host.send(host_token, b"hello").unwrap();
    pump(&emu, &mailbox, &remote);
    assert_eq!(*remote_ep.received.borrow(), [b"hello".to_vec()]);

    remote.send(remote_token, b"hi").unwrap();
    pump(&emu, &mailbox, &remote);
    assert_eq!(*host_ep.received.borrow(), [b"hi".to_vec()]);
}

#[test]
fn test_chat_remote_registers_first() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let transport = open_transport(&emu);
    let dsp = DspSide(emu.clone());
    let host_ep = Endpoint::default();
    let remote_ep = Endpoint::default();

    let mailbox = MailboxChannel::new(&transport, emu.delay(), MailboxConfig::default());
    mailbox.init(1, MailboxInterrupts::THRESHOLD).unwrap();
    let host: RpmsgEndpointRegistry<'_, _, _, _> =
        RpmsgEndpointRegistry::new("host", &transport, &mailbox, emu.delay(), host_config());
    let remote: RpmsgEndpointRegistry<'_, _, _, _> =
        RpmsgEndpointRegistry::new("dsp", &dsp, &dsp, emu.delay(), remote_config());
    let instances: IpcInstanceTable<'_> = IpcInstanceTable::new();
    mailbox.register_kick_client(REMOTE_KICK, &instances).unwrap();

    instances.create(&host).unwrap();
    assert_eq!(instances.create(&host), Err(Ambt53Error::InvalidArg));
    remote.open().unwrap();

    let remote_token = remote.register_endpoint("chat", &remote_ep).unwrap();
    pump(&emu, &mailbox, &remote);
    assert!(host.find("chat").is_some());
    assert_eq!(remote.endpoint_state(remote_token), EndpointState::NameCached);

    let host_token = host.register_endpoint("chat", &host_ep).unwrap();
    pump(&emu, &mailbox, &remote);

    assert_eq!(host.bound_endpoints(), 1);
    assert_eq!(remote.bound_endpoints(), 1);
    assert_eq!(host_ep.bound.get(), 1);
    assert_eq!(remote_ep.bound.get(), 1);

    host.send(host_token, b"hello").unwrap();
    pump(&emu, &mailbox, &remote);
    assert_eq!(*remote_ep.received.borrow(), [b"hello".to_vec()]);
    assert!(host_ep.received.borrow().is_empty());
}

#[test]
fn test_remote_waits_for_host_rings() {
    setup_logger();
    let emu = EmulatedAmbt53::default();
    let dsp = DspSide(emu.clone());
    let remote: RpmsgEndpointRegistry<'_, _, _, _> =
        RpmsgEndpointRegistry::new("dsp", &dsp, &dsp, emu.delay(), remote_config());
    assert_eq!(remote.open(), Err(Ambt53Error::Timeout));
    assert!(emu.now_ns() >= 1_000_000);
}
