// Licensed under the Apache-2.0 license.

// rpmsg endpoint registry over static vrings.
//
// The host and the remote each run one registry over the same shared region.
// The remote announces every endpoint it registers; the host binds an endpoint
// once both its own registration and the remote's announcement have been seen,
// in whichever order they arrive. A zero-length message completes the binding
// on the other side.

use crate::hil::{Notifier, SharedMemory};
use crate::vring::{Ring, StaticVrings};
use crate::wire::{
    NsAnnounce, RpmsgHeader, RPMSG_ADDR_ANY, RPMSG_HEADER_SIZE, RPMSG_NAME_SIZE, RPMSG_NS_ADDR,
    RPMSG_NS_CREATE, RPMSG_PAYLOAD_SIZE, RPMSG_RESERVED_ADDRESSES,
};
use ambt53_config::RemoteMemoryMap;
use ambt53_error::{Ambt53Error, Ambt53Result};
use ambt53_mailbox::KickClient;
use ambt53_poll::{poll_until, SharedDelay};
use arrayvec::ArrayString;
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use zerocopy::{FromBytes, IntoBytes};

pub const RPMSG_MAX_ENDPOINTS: usize = 8;

/// Endpoint names travel NUL-terminated in a 32-byte field.
pub type EndpointName = ArrayString<{ RPMSG_NAME_SIZE - 1 }>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Lays out the rings and binds announced endpoints.
    Host,
    /// Announces its endpoints.
    Remote,
}

impl Role {
    fn tx_ring(&self) -> Ring {
        match self {
            Role::Host => Ring::HostToRemote,
            Role::Remote => Ring::RemoteToHost,
        }
    }

    fn rx_ring(&self) -> Ring {
        match self {
            Role::Host => Ring::RemoteToHost,
            Role::Remote => Ring::HostToRemote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Ready,
    Busy,
    Inited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Empty,
    NameCached,
    Bound,
}

/// Identifies a registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointToken(usize);

impl EndpointToken {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Endpoint events. Both run without the registry lock held.
pub trait EndpointCallbacks {
    fn bound(&self, _token: EndpointToken) {}

    /// `data` is only valid for the call; hold the ring buffer with
    /// [`RpmsgEndpointRegistry::hold_rx_buffer`] to keep later messages queued.
    fn received(&self, _token: EndpointToken, _data: &[u8]) {}
}

#[derive(Debug, Clone, Copy)]
pub struct IpcConfig {
    pub role: Role,
    /// Remote address of the shared region.
    pub shm_base: u32,
    pub shm_size: u32,
    /// Doorbell word sent after queueing a message.
    pub send_word: u32,
    /// Doorbell word the peer sends.
    pub receive_word: u32,
    /// How long the remote waits for the host to publish the rings.
    pub open_timeout_us: u32,
    /// How long a waiting `get_tx_buffer` polls for a free buffer.
    pub tx_wait_us: u32,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            role: Role::Host,
            shm_base: RemoteMemoryMap::default().dsram_offset,
            shm_size: 0x8000,
            send_word: 0x1,
            receive_word: 0x2,
            open_timeout_us: 1000,
            tx_wait_us: 1000,
        }
    }
}

/// A reserved transmit buffer, filled in place and handed back through
/// [`RpmsgEndpointRegistry::send_nocopy`].
#[derive(Debug, PartialEq, Eq)]
pub struct TxBuffer {
    token: EndpointToken,
    index: u32,
    capacity: usize,
}

impl TxBuffer {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn token(&self) -> EndpointToken {
        self.token
    }
}

#[derive(Clone, Copy)]
struct Slot<'a> {
    name: EndpointName,
    local: Option<u32>,
    dest: u32,
    bound: bool,
    callbacks: Option<&'a dyn EndpointCallbacks>,
}

impl Slot<'_> {
    const EMPTY: Self = Self {
        name: EndpointName::new_const(),
        local: None,
        dest: RPMSG_ADDR_ANY,
        bound: false,
        callbacks: None,
    };

    fn state(&self) -> EndpointState {
        if self.name.is_empty() {
            EndpointState::Empty
        } else if self.bound {
            EndpointState::Bound
        } else {
            EndpointState::NameCached
        }
    }
}

struct SlotTable<'a> {
    slots: [Slot<'a>; RPMSG_MAX_ENDPOINTS],
    next_addr: u32,
}

impl<'a> SlotTable<'a> {
    /// The slot holding `name`, else the first free one. True when `name` was found.
    fn get_or_cache(&self, name: &str) -> Option<(usize, bool)> {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| !slot.name.is_empty() && slot.name.as_str() == name)
        {
            return Some((index, true));
        }
        self.free_slot().map(|index| (index, false))
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name.is_empty())
    }

    fn allocate_address(&mut self) -> u32 {
        let addr = self.next_addr;
        self.next_addr += 1;
        addr
    }
}

/// Everything the bound path needs, copied out from under the lock.
struct Binding<'a> {
    token: EndpointToken,
    local: u32,
    dest: u32,
    callbacks: Option<&'a dyn EndpointCallbacks>,
}

pub struct RpmsgEndpointRegistry<
    'a,
    S: SharedMemory,
    N: Notifier,
    D: DelayNs,
    M: RawMutex = CriticalSectionRawMutex,
> {
    name: &'static str,
    shm: &'a S,
    notifier: &'a N,
    delay: RefCell<D>,
    config: IpcConfig,
    state: Cell<InstanceState>,
    vrings: Cell<Option<StaticVrings>>,
    table: Mutex<M, RefCell<SlotTable<'a>>>,
    rx_current: Cell<Option<EndpointToken>>,
    rx_held: Cell<Option<EndpointToken>>,
    tx_reserved: Cell<Option<u32>>,
}

impl<'a, S: SharedMemory, N: Notifier, D: DelayNs, M: RawMutex>
    RpmsgEndpointRegistry<'a, S, N, D, M>
{
    pub fn new(
        name: &'static str,
        shm: &'a S,
        notifier: &'a N,
        delay: D,
        config: IpcConfig,
    ) -> Self {
        Self {
            name,
            shm,
            notifier,
            delay: RefCell::new(delay),
            config,
            state: Cell::new(InstanceState::Ready),
            vrings: Cell::new(None),
            table: Mutex::new(RefCell::new(SlotTable {
                slots: [Slot::EMPTY; RPMSG_MAX_ENDPOINTS],
                next_addr: RPMSG_RESERVED_ADDRESSES,
            })),
            rx_current: Cell::new(None),
            rx_held: Cell::new(None),
            tx_reserved: Cell::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        self.state.get()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut SlotTable<'a>) -> T) -> T {
        self.table.lock(|table| f(&mut table.borrow_mut()))
    }

    /// Lay out (host) or wait for (remote) the rings. Falls back to `Ready` on failure.
    pub fn open(&self) -> Ambt53Result<()> {
        if self.state.get() != InstanceState::Ready {
            return Err(Ambt53Error::AlreadyInProgress);
        }
        self.state.set(InstanceState::Busy);
        match self.bring_up() {
            Ok(vrings) => {
                self.vrings.set(Some(vrings));
                self.state.set(InstanceState::Inited);
                info!(
                    "ambt53-ipc: {} open as {:?}, {} buffers per ring",
                    self.name,
                    self.config.role,
                    vrings.num_desc()
                );
                Ok(())
            }
            Err(err) => {
                error!("ambt53-ipc: {} open failed: {}", self.name, err);
                self.state.set(InstanceState::Ready);
                Err(err)
            }
        }
    }

    fn bring_up(&self) -> Ambt53Result<StaticVrings> {
        let vrings = StaticVrings::configure(self.config.shm_base, self.config.shm_size)?;
        match self.config.role {
            Role::Host => vrings.init(self.shm)?,
            Role::Remote => {
                let mut delay = SharedDelay(&self.delay);
                poll_until(&mut delay, self.config.open_timeout_us, 1, || {
                    vrings.is_ready(self.shm)
                })?;
            }
        }
        Ok(vrings)
    }

    fn vrings(&self) -> Ambt53Result<StaticVrings> {
        match (self.state.get(), self.vrings.get()) {
            (InstanceState::Inited, Some(vrings)) => Ok(vrings),
            _ => Err(Ambt53Error::Busy),
        }
    }

    /// Claim the slot for `name`, caching the name in a free slot if it is new.
    /// Returns the slot and whether the name was already there.
    pub fn get_or_cache(&self, name: &str) -> Ambt53Result<(EndpointToken, bool)> {
        let name = EndpointName::from(name).map_err(|_| Ambt53Error::InvalidArg)?;
        self.with_table(|table| {
            let (index, cached) = table.get_or_cache(&name).ok_or(Ambt53Error::NoSpace)?;
            if !cached {
                table.slots[index].name = name;
            }
            Ok((EndpointToken(index), cached))
        })
    }

    pub fn find(&self, name: &str) -> Option<EndpointToken> {
        self.with_table(|table| match table.get_or_cache(name) {
            Some((index, true)) => Some(EndpointToken(index)),
            _ => None,
        })
    }

    pub fn endpoint_state(&self, token: EndpointToken) -> EndpointState {
        self.with_table(|table| {
            table
                .slots
                .get(token.0)
                .map(Slot::state)
                .unwrap_or(EndpointState::Empty)
        })
    }

    pub fn bound_endpoints(&self) -> usize {
        self.with_table(|table| table.slots.iter().filter(|slot| slot.bound).count())
    }

    /// Register `name` with its callbacks.
    ///
    /// On the host this binds at once if the remote already announced `name`,
    /// otherwise the name is cached until the announcement arrives. On the remote
    /// the endpoint is created and announced.
    pub fn register_endpoint(
        &self,
        name: &str,
        callbacks: &'a dyn EndpointCallbacks,
    ) -> Ambt53Result<EndpointToken> {
        self.vrings()?;
        if name.is_empty() {
            return Err(Ambt53Error::InvalidArg);
        }
        let name = EndpointName::from(name).map_err(|_| Ambt53Error::InvalidArg)?;
        match self.config.role {
            Role::Host => self.register_on_host(name, callbacks),
            Role::Remote => self.register_on_remote(name, callbacks),
        }
    }

    fn register_on_host(
        &self,
        name: EndpointName,
        callbacks: &'a dyn EndpointCallbacks,
    ) -> Ambt53Result<EndpointToken> {
        let (token, announced) = self.with_table(|table| {
            let (index, cached) = table.get_or_cache(&name).ok_or(Ambt53Error::NoSpace)?;
            let slot = &mut table.slots[index];
            // an announced name whose bind failed may be registered again
            let retry = slot.local.is_none() && slot.dest != RPMSG_ADDR_ANY;
            if cached && slot.callbacks.is_some() && !retry {
                return Err(Ambt53Error::InvalidArg);
            }
            slot.name = name;
            slot.callbacks = Some(callbacks);
            slot.bound = false;
            Ok((EndpointToken(index), cached.then_some(slot.dest)))
        })?;

        match announced {
            Some(dest) => self.advertise(token, dest)?,
            None => debug!("ambt53-ipc: {} cached, waiting for announce", name),
        }
        Ok(token)
    }

    fn register_on_remote(
        &self,
        name: EndpointName,
        callbacks: &'a dyn EndpointCallbacks,
    ) -> Ambt53Result<EndpointToken> {
        let (token, local) = self.with_table(|table| {
            let index = table.free_slot().ok_or(Ambt53Error::NoSpace)?;
            let local = table.allocate_address();
            table.slots[index] = Slot {
                name,
                local: Some(local),
                dest: RPMSG_ADDR_ANY,
                bound: false,
                callbacks: Some(callbacks),
            };
            Ok::<_, Ambt53Error>((EndpointToken(index), local))
        })?;

        let announce = NsAnnounce::new(&name, local, RPMSG_NS_CREATE);
        self.send_raw(local, RPMSG_NS_ADDR, announce.as_bytes())?;
        debug!("ambt53-ipc: announced {} at {}", name, local);
        Ok(token)
    }

    /// Create the local endpoint for a cached slot, bound to `dest`, and run the
    /// bound path. A failed handshake leaves the slot cached with no endpoint.
    fn advertise(&self, token: EndpointToken, dest: u32) -> Ambt53Result<()> {
        self.vrings()?;
        let binding = self.with_table(|table| {
            let local = table.allocate_address();
            let slot = &mut table.slots[token.0];
            slot.local = Some(local);
            slot.dest = dest;
            slot.bound = false;
            Binding {
                token,
                local,
                dest,
                callbacks: slot.callbacks,
            }
        });
        debug!(
            "ambt53-ipc: endpoint {} binding {} -> {}",
            token.0, binding.local, dest
        );
        self.bound_path(binding, true)
    }

    /// Handshake to the peer, then mark the slot bound and run the bound callback.
    ///
    /// The slot stays unbound when the handshake cannot be sent. With
    /// `release_local` the endpoint address is dropped as well, so a later
    /// announce or registration creates it again.
    fn bound_path(&self, binding: Binding<'a>, release_local: bool) -> Ambt53Result<()> {
        let sent = self.send_raw(binding.local, binding.dest, &[]);
        let committed = self.with_table(|table| {
            let slot = &mut table.slots[binding.token.0];
            if slot.local != Some(binding.local) {
                return false;
            }
            match sent {
                Ok(()) => slot.bound = true,
                Err(_) if release_local => slot.local = None,
                Err(_) => {}
            }
            sent.is_ok()
        });
        if let Err(err) = sent {
            warn!(
                "ambt53-ipc: handshake {} -> {} failed: {}",
                binding.local, binding.dest, err
            );
            return Err(err);
        }
        if !committed {
            debug!("ambt53-ipc: endpoint {} released during handshake", binding.local);
            return Ok(());
        }
        if let Some(callbacks) = binding.callbacks {
            callbacks.bound(binding.token);
        }
        Ok(())
    }

    fn ns_bind(&self, name: &str, dest: u32) -> Ambt53Result<()> {
        let Ok(name) = EndpointName::from(name) else {
            warn!("ambt53-ipc: announced name too long");
            return Ok(());
        };
        let advertise = self.with_table(|table| {
            let Some((index, cached)) = table.get_or_cache(&name) else {
                warn!("ambt53-ipc: no free slot for announced {}", name);
                return None;
            };
            let slot = &mut table.slots[index];
            if !cached {
                slot.name = name;
                slot.dest = dest;
                return None;
            }
            if slot.callbacks.is_some() && slot.local.is_none() {
                Some(EndpointToken(index))
            } else {
                debug!("ambt53-ipc: repeated announce for {}", name);
                None
            }
        });
        match advertise {
            Some(token) => self.advertise(token, dest),
            None => Ok(()),
        }
    }

    fn addresses(&self, token: EndpointToken) -> Ambt53Result<(u32, u32)> {
        self.with_table(|table| {
            let slot = table.slots.get(token.0).ok_or(Ambt53Error::InvalidArg)?;
            match slot.local {
                Some(local) if slot.dest != RPMSG_ADDR_ANY => Ok((local, slot.dest)),
                _ => Err(Ambt53Error::InvalidOperation),
            }
        })
    }

    fn send_raw(&self, src: u32, dst: u32, payload: &[u8]) -> Ambt53Result<()> {
        let vrings = self.vrings()?;
        if payload.len() > RPMSG_PAYLOAD_SIZE {
            return Err(Ambt53Error::NoMemory {
                available: RPMSG_PAYLOAD_SIZE,
            });
        }
        if self.tx_reserved.get().is_some() {
            return Err(Ambt53Error::Busy);
        }
        let ring = self.config.role.tx_ring();
        if vrings.free(self.shm, ring)? == 0 {
            return Err(Ambt53Error::NoMemory { available: 0 });
        }
        let head = vrings.head(self.shm, ring)?;
        let buffer = vrings.buffer_addr(ring, head);
        if !payload.is_empty() {
            self.shm.write(buffer + RPMSG_HEADER_SIZE as u32, payload)?;
        }
        self.publish(ring, head, RpmsgHeader::new(src, dst, payload.len()))
    }

    fn publish(&self, ring: Ring, head: u32, header: RpmsgHeader) -> Ambt53Result<()> {
        let vrings = self.vrings()?;
        self.shm
            .write(vrings.buffer_addr(ring, head), header.as_bytes())?;
        vrings.set_head(self.shm, ring, head.wrapping_add(1))?;
        self.notifier.notify(self.config.send_word)
    }

    /// Copy `data` into a ring buffer and send it to the endpoint's peer.
    pub fn send(&self, token: EndpointToken, data: &[u8]) -> Ambt53Result<()> {
        self.vrings()?;
        if data.is_empty() {
            return Err(Ambt53Error::BadMsg);
        }
        let (local, dest) = self.addresses(token)?;
        self.send_raw(local, dest, data)
    }

    /// Payload bytes one buffer holds.
    pub fn tx_buffer_size(&self) -> usize {
        RPMSG_PAYLOAD_SIZE
    }

    /// Reserve the next transmit buffer. `size` 0 asks for whatever a buffer holds.
    /// With `wait` the call polls for a free buffer up to the configured budget.
    pub fn get_tx_buffer(
        &self,
        token: EndpointToken,
        size: usize,
        wait: bool,
    ) -> Ambt53Result<TxBuffer> {
        let vrings = self.vrings()?;
        if size > RPMSG_PAYLOAD_SIZE {
            return Err(Ambt53Error::NoMemory {
                available: RPMSG_PAYLOAD_SIZE,
            });
        }
        if self.tx_reserved.get().is_some() {
            return Err(Ambt53Error::Busy);
        }
        let ring = self.config.role.tx_ring();
        let budget = if wait { self.config.tx_wait_us } else { 0 };
        let mut delay = SharedDelay(&self.delay);
        poll_until(&mut delay, budget, 1, || Ok(vrings.free(self.shm, ring)? > 0)).map_err(
            |err| match err {
                Ambt53Error::Timeout => Ambt53Error::NoMemory { available: 0 },
                other => other,
            },
        )?;
        let index = vrings.head(self.shm, ring)?;
        self.tx_reserved.set(Some(index));
        Ok(TxBuffer {
            token,
            index,
            capacity: RPMSG_PAYLOAD_SIZE,
        })
    }

    /// Fill part of a reserved buffer.
    pub fn write_tx_buffer(&self, buffer: &TxBuffer, offset: usize, data: &[u8]) -> Ambt53Result<()> {
        if offset + data.len() > buffer.capacity {
            return Err(Ambt53Error::OutOfRange);
        }
        let vrings = self.vrings()?;
        let address = vrings.buffer_addr(self.config.role.tx_ring(), buffer.index);
        self.shm
            .write(address + (RPMSG_HEADER_SIZE + offset) as u32, data)
    }

    /// Send the first `len` bytes of a reserved buffer. On error the buffer comes back.
    pub fn send_nocopy(&self, buffer: TxBuffer, len: usize) -> Result<(), (Ambt53Error, TxBuffer)> {
        if let Err(err) = self.vrings() {
            return Err((err, buffer));
        }
        if len == 0 {
            return Err((Ambt53Error::BadMsg, buffer));
        }
        if len > buffer.capacity {
            return Err((Ambt53Error::InvalidArg, buffer));
        }
        let (local, dest) = match self.addresses(buffer.token) {
            Ok(addresses) => addresses,
            Err(err) => return Err((err, buffer)),
        };
        self.tx_reserved.set(None);
        let ring = self.config.role.tx_ring();
        if let Err(err) = self.publish(ring, buffer.index, RpmsgHeader::new(local, dest, len)) {
            self.tx_reserved.set(Some(buffer.index));
            return Err((err, buffer));
        }
        Ok(())
    }

    /// Giving a reserved buffer back unsent is not supported; send it instead.
    pub fn drop_tx_buffer(&self, buffer: TxBuffer) -> Result<(), (Ambt53Error, TxBuffer)> {
        Err((Ambt53Error::NotSupported, buffer))
    }

    /// Keep the message being delivered in its ring buffer past the callback.
    /// Later messages stay queued until it is released.
    pub fn hold_rx_buffer(&self, token: EndpointToken) -> Ambt53Result<()> {
        if self.rx_current.get() != Some(token) {
            return Err(Ambt53Error::InvalidOperation);
        }
        self.rx_held.set(Some(token));
        Ok(())
    }

    pub fn release_rx_buffer(&self, token: EndpointToken) -> Ambt53Result<()> {
        if self.rx_held.get() != Some(token) {
            return Err(Ambt53Error::InvalidArg);
        }
        let vrings = self.vrings()?;
        let ring = self.config.role.rx_ring();
        let tail = vrings.tail(self.shm, ring)?;
        vrings.set_tail(self.shm, ring, tail.wrapping_add(1))?;
        self.rx_held.set(None);
        Ok(())
    }

    /// Deliver every queued inbound message. Returns how many were handled.
    ///
    /// A message that fails is logged and consumed, the rest of the ring is still
    /// drained, and the first failure is returned at the end.
    pub fn receive(&self) -> Ambt53Result<usize> {
        let vrings = self.vrings()?;
        if self.rx_held.get().is_some() {
            return Ok(0);
        }
        let ring = self.config.role.rx_ring();
        let mut payload = [0u8; RPMSG_PAYLOAD_SIZE];
        let mut handled = 0;
        let mut first_err = None;
        loop {
            let tail = vrings.tail(self.shm, ring)?;
            if tail == vrings.head(self.shm, ring)? {
                break;
            }
            let buffer = vrings.buffer_addr(ring, tail);
            let mut raw = [0u8; RPMSG_HEADER_SIZE];
            self.shm.read(buffer, &mut raw)?;
            let header = RpmsgHeader::read_from_bytes(&raw).map_err(|_| Ambt53Error::BadMsg)?;
            let len = header.len.get() as usize;

            let result = if len > RPMSG_PAYLOAD_SIZE {
                warn!("ambt53-ipc: message of {} bytes dropped", len);
                Err(Ambt53Error::BadMsg)
            } else {
                let data = &mut payload[..len];
                if len > 0 {
                    self.shm.read(buffer + RPMSG_HEADER_SIZE as u32, data)?;
                }
                self.dispatch(header.src.get(), header.dst.get(), data)
            };
            handled += 1;
            if let Err(err) = result {
                warn!("ambt53-ipc: {} message {} failed: {}", self.name, tail, err);
                first_err.get_or_insert(err);
            }
            if self.rx_held.get().is_some() {
                break;
            }
            vrings.set_tail(self.shm, ring, tail.wrapping_add(1))?;
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(handled),
        }
    }

    fn dispatch(&self, src: u32, dst: u32, data: &[u8]) -> Ambt53Result<()> {
        if dst == RPMSG_NS_ADDR {
            return self.handle_announce(data);
        }
        let found = self.with_table(|table| {
            let index = table.slots.iter().position(|slot| slot.local == Some(dst))?;
            let slot = &mut table.slots[index];
            if slot.dest == RPMSG_ADDR_ANY {
                slot.dest = src;
            }
            let newly_bound = data.is_empty() && !slot.bound;
            Some((
                newly_bound,
                Binding {
                    token: EndpointToken(index),
                    local: dst,
                    dest: slot.dest,
                    callbacks: slot.callbacks,
                },
            ))
        });
        let Some((newly_bound, binding)) = found else {
            debug!("ambt53-ipc: no endpoint at {}, message from {} dropped", dst, src);
            return Ok(());
        };

        if data.is_empty() {
            if newly_bound {
                debug!("ambt53-ipc: endpoint {} bound by handshake", binding.local);
                self.bound_path(binding, false)?;
            }
            return Ok(());
        }
        if let Some(callbacks) = binding.callbacks {
            self.rx_current.set(Some(binding.token));
            callbacks.received(binding.token, data);
            self.rx_current.set(None);
        }
        Ok(())
    }

    fn handle_announce(&self, data: &[u8]) -> Ambt53Result<()> {
        if self.config.role != Role::Host {
            debug!("ambt53-ipc: announce ignored on the remote");
            return Ok(());
        }
        let announce = NsAnnounce::read_from_bytes(data).map_err(|_| Ambt53Error::BadMsg)?;
        let Some(name) = announce.name().filter(|name| !name.is_empty()) else {
            return Ok(());
        };
        if announce.flags.get() != RPMSG_NS_CREATE {
            debug!("ambt53-ipc: {} withdrawn by the remote", name);
            return Ok(());
        }
        self.ns_bind(name, announce.addr.get())
    }
}

impl<S: SharedMemory, N: Notifier, D: DelayNs, M: RawMutex> KickClient
    for RpmsgEndpointRegistry<'_, S, N, D, M>
{
    fn kicked(&self, word: u32) {
        if word != self.config.receive_word {
            return;
        }
        if let Err(err) = self.receive() {
            error!("ambt53-ipc: {} receive failed: {}", self.name, err);
        }
    }
}
