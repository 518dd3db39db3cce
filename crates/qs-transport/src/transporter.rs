//! State of one transporter.

use qs_core::{FailureClock, SimTime, StationId, TransporterTypeId};
use qs_entity::Client;

/// Addresses one transporter: its type and its index within the fleet.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TransporterRef {
    pub ty:    TransporterTypeId,
    pub index: usize,
}

impl TransporterRef {
    pub fn new(ty: TransporterTypeId, index: usize) -> Self {
        Self { ty, index }
    }
}

#[derive(Debug)]
pub struct Transporter {
    pub index:                  usize,
    pub(crate) capacity:        u32,
    pub(crate) position:        StationId,
    pub(crate) last_position:   StationId,
    pub(crate) in_transfer:     bool,
    /// End of the current failure pause.
    pub(crate) online_again_at: Option<SimTime>,
    pub(crate) clients:         Vec<Box<Client>>,
    pub(crate) clocks:          Vec<FailureClock>,
}

impl Transporter {
    pub(crate) fn new(index: usize, capacity: u32, position: StationId, failures: usize) -> Self {
        Self {
            index,
            capacity,
            position,
            last_position: position,
            in_transfer: false,
            online_again_at: None,
            clients: Vec::new(),
            clocks: vec![FailureClock::default(); failures],
        }
    }

    /// Current station, or the destination while moving.
    #[inline]
    pub fn position(&self) -> StationId {
        self.position
    }

    #[inline]
    pub fn last_position(&self) -> StationId {
        self.last_position
    }

    #[inline]
    pub fn is_in_transfer(&self) -> bool {
        self.in_transfer
    }

    pub fn online_again_at(&self) -> Option<SimTime> {
        self.online_again_at
    }

    /// `false` during a failure pause.
    #[inline]
    pub fn is_online(&self) -> bool {
        self.online_again_at.is_none()
    }

    /// Parked at a station, online and empty.
    pub fn is_idle(&self) -> bool {
        !self.in_transfer && self.is_online() && self.clients.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn clients(&self) -> &[Box<Client>] {
        &self.clients
    }

    pub fn free_places(&self) -> u32 {
        self.capacity.saturating_sub(self.clients.len() as u32)
    }

    /// Put `client` on board.  Hands the client back when the transporter
    /// is full.
    pub fn load(&mut self, client: Box<Client>) -> Result<(), Box<Client>> {
        if self.free_places() == 0 {
            return Err(client);
        }
        self.clients.push(client);
        Ok(())
    }

    /// Take every carried client off board, in loading order.
    pub fn unload_all(&mut self) -> Vec<Box<Client>> {
        std::mem::take(&mut self.clients)
    }

    pub fn clocks(&self) -> &[FailureClock] {
        &self.clocks
    }
}
