//! Client pool: allocation, recycling, in-system counting and client
//! statistics.
//!
//! # Ownership
//!
//! The pool never holds live clients.  `acquire` hands out a `Box<Client>`
//! and the caller passes ownership along until the box comes back through
//! [`ClientPool::dispose_without_statistics`].  Returned boxes are kept on a
//! bounded free list and fully reset on reuse.
//!
//! The full disposal sequence (sections, logic stack, batch dissolution,
//! statistics, confidence test) needs station callbacks and therefore lives
//! in `SimulationData::dispose_client`; the pool provides the steps.

use std::sync::Arc;

use qs_core::{ClientTypeId, SimTime, StationId};
use qs_stats::{IndicatorCache, Statistics};
use tracing::warn;

use crate::client::{Client, ClientType};
use crate::error::{EntityError, EntityResult};

/// Live-client ceiling per thread when several threads run.
pub const MAX_CLIENTS_MULTI_CORE: u64 = 180_000;
/// Live-client budget of a single-threaded run, shared by all threads.
pub const MAX_CLIENTS_SINGLE_CORE: u64 = 6_000_000;
/// Live-client ceiling of an animation run.
pub const MAX_CLIENTS_ANIMATION: u64 = 150_000;
/// Capacity of the free list.
pub const CLIENT_CACHE_SIZE: usize = 5_000;
/// The confidence test runs on every this-many-th disposal.
pub const CONFIDENCE_TEST_INTERVAL: u64 = 500;

/// Live-client ceiling for one thread.  A model override wins.
pub fn client_ceiling(threads: usize, animation: bool, model_override: Option<u64>) -> u64 {
    if let Some(n) = model_override {
        return n;
    }
    if animation {
        return MAX_CLIENTS_ANIMATION;
    }
    MAX_CLIENTS_MULTI_CORE.max(MAX_CLIENTS_SINGLE_CORE / threads.max(1) as u64)
}

/// Switches for what `log_client_data` records.
#[derive(Copy, Clone, Debug, Default)]
pub struct ClientRecording {
    pub paths:          bool,
    pub station_totals: bool,
}

pub struct ClientPool {
    types:         Arc<[ClientType]>,
    station_names: Arc<[String]>,
    recording:     ClientRecording,
    ceiling:       u64,

    free:               Vec<Box<Client>>,
    next_number:        u64,
    live:               u64,
    acquired:           u64,
    disposed:           u64,
    in_system_by_type:  Vec<u64>,
    last_leave_by_type: Vec<SimTime>,
    confidence_counter: u64,

    cache_in_system:    IndicatorCache,
    cache_waiting:      IndicatorCache,
    cache_transfer:     IndicatorCache,
    cache_process:      IndicatorCache,
    cache_residence:    IndicatorCache,
    cache_leave:        IndicatorCache,
    cache_st_waiting:   IndicatorCache,
    cache_st_transfer:  IndicatorCache,
    cache_st_process:   IndicatorCache,
    cache_st_residence: IndicatorCache,
}

impl ClientPool {
    pub fn new(
        types:         Arc<[ClientType]>,
        station_names: Arc<[String]>,
        recording:     ClientRecording,
        ceiling:       u64,
    ) -> Self {
        let n = types.len();
        Self {
            types,
            station_names,
            recording,
            ceiling,
            free: Vec::new(),
            next_number: 0,
            live: 0,
            acquired: 0,
            disposed: 0,
            in_system_by_type: vec![0; n],
            last_leave_by_type: vec![SimTime::ZERO; n],
            confidence_counter: 0,
            cache_in_system: IndicatorCache::new(),
            cache_waiting: IndicatorCache::new(),
            cache_transfer: IndicatorCache::new(),
            cache_process: IndicatorCache::new(),
            cache_residence: IndicatorCache::new(),
            cache_leave: IndicatorCache::new(),
            cache_st_waiting: IndicatorCache::new(),
            cache_st_transfer: IndicatorCache::new(),
            cache_st_process: IndicatorCache::new(),
            cache_st_residence: IndicatorCache::new(),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Clients currently alive (acquired and not yet disposed).
    #[inline]
    pub fn live(&self) -> u64 {
        self.live
    }

    pub fn live_of_type(&self, client_type: ClientTypeId) -> u64 {
        self.in_system_by_type.get(client_type.index()).copied().unwrap_or(0)
    }

    pub fn acquired(&self) -> u64 {
        self.acquired
    }

    pub fn disposed(&self) -> u64 {
        self.disposed
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn client_types(&self) -> &[ClientType] {
        &self.types
    }

    pub fn type_name(&self, client_type: ClientTypeId) -> &str {
        self.types.get(client_type.index()).map_or("", |t| t.name.as_str())
    }

    // ── Acquire ───────────────────────────────────────────────────────────

    /// A fresh client of `client_type`.  `is_warm_up` marks the client as
    /// created during the warm-up phase.
    pub fn acquire(
        &mut self,
        client_type: ClientTypeId,
        is_warm_up:  bool,
        now:         SimTime,
        stats:       &mut Statistics,
    ) -> EntityResult<Box<Client>> {
        if client_type.index() >= self.types.len() {
            return Err(EntityError::UnknownClientType(client_type));
        }
        if self.live >= self.ceiling {
            warn!(live = self.live, ceiling = self.ceiling, "client ceiling reached");
            return Err(EntityError::CeilingExceeded { ceiling: self.ceiling });
        }

        self.next_number += 1;
        let client = match self.free.pop() {
            Some(mut c) => {
                c.reset(self.next_number, client_type, is_warm_up);
                c
            }
            None => Box::new(Client::new(self.next_number, client_type, is_warm_up)),
        };

        self.live += 1;
        self.acquired += 1;
        self.log_in_system_change(client_type, 1, now, stats);
        Ok(client)
    }

    /// A new client carrying a deep copy of `source`'s mutable state.  A live
    /// batch is cloned member by member.
    pub fn clone_of(
        &mut self,
        source:     &Client,
        is_warm_up: bool,
        now:        SimTime,
        stats:      &mut Statistics,
    ) -> EntityResult<Box<Client>> {
        let mut clone = self.acquire(source.client_type, is_warm_up, now, stats)?;
        clone.copy_data_from(source);
        if let Some(members) = source.batch_members() {
            for m in members {
                let member = self.clone_of(m, is_warm_up, now, stats)?;
                clone.add_to_batch(member);
            }
        }
        Ok(clone)
    }

    /// Switch `client` to `new_type`, moving it between the per-type
    /// in-system counters.
    pub fn change_type(
        &mut self,
        client:     &mut Client,
        new_type:   ClientTypeId,
        station:    StationId,
        now:        SimTime,
        stats:      &mut Statistics,
    ) -> EntityResult<()> {
        if new_type.index() >= self.types.len() {
            return Err(EntityError::UnknownClientType(new_type));
        }
        if client.client_type == new_type {
            return Ok(());
        }
        self.log_in_system_change(client.client_type, -1, now, stats);
        client.type_last = client.client_type;
        client.client_type = new_type;
        client.source_station = station;
        self.log_in_system_change(new_type, 1, now, stats);
        Ok(())
    }

    // ── Dispose ───────────────────────────────────────────────────────────

    /// Return `client` to the free list (dropped when the list is full) and
    /// decrement the live counts.  Nothing is recorded about the client.
    /// Members of a batch that was never dissolved go the same way.
    pub fn dispose_without_statistics(
        &mut self,
        mut client: Box<Client>,
        now:        SimTime,
        stats:      &mut Statistics,
    ) {
        if let Some(members) = client.dissolve_batch() {
            for m in members {
                self.dispose_without_statistics(m, now, stats);
            }
        }
        let client_type = client.client_type;
        if self.free.len() < CLIENT_CACHE_SIZE {
            self.free.push(client);
        }
        self.live = self.live.saturating_sub(1);
        self.disposed += 1;
        self.log_in_system_change(client_type, -1, now, stats);
    }

    /// Advance the disposal counter.  `true` on every
    /// [`CONFIDENCE_TEST_INTERVAL`]-th call.
    pub fn confidence_tick(&mut self) -> bool {
        self.confidence_counter += 1;
        self.confidence_counter % CONFIDENCE_TEST_INTERVAL == 0
    }

    /// Record a departing client: times per type and overall, costs, user
    /// data, path and the inter-departure time of its type.
    pub fn log_client_data(&mut self, client: &Client, now: SimTime, stats: &mut Statistics) {
        let t = client.client_type.index();
        let Some(ct) = self.types.get(t) else {
            return;
        };
        let name = ct.name.as_str();

        let waiting = client.times.waiting_ms as f64 / 1_000.0;
        let transfer = client.times.transfer_ms as f64 / 1_000.0;
        let process = client.times.process_ms as f64 / 1_000.0;
        let residence = client.times.residence_ms as f64 / 1_000.0;

        self.cache_waiting.get_mut(&mut stats.client_waiting, t, name).add(waiting);
        self.cache_transfer.get_mut(&mut stats.client_transfer, t, name).add(transfer);
        self.cache_process.get_mut(&mut stats.client_process, t, name).add(process);
        self.cache_residence.get_mut(&mut stats.client_residence, t, name).add(residence);

        if self.recording.station_totals {
            for (station, times) in &client.station_times {
                let s = station.index();
                let Some(sname) = self.station_names.get(s) else {
                    continue;
                };
                self.cache_st_waiting
                    .get_mut(&mut stats.station_waiting, s, sname)
                    .add(times.waiting_ms as f64 / 1_000.0);
                self.cache_st_transfer
                    .get_mut(&mut stats.station_transfer, s, sname)
                    .add(times.transfer_ms as f64 / 1_000.0);
                self.cache_st_process
                    .get_mut(&mut stats.station_process, s, sname)
                    .add(times.process_ms as f64 / 1_000.0);
                self.cache_st_residence
                    .get_mut(&mut stats.station_residence, s, sname)
                    .add(times.residence_ms as f64 / 1_000.0);
            }
        }

        stats.waiting_all.add(waiting);
        stats.transfer_all.add(transfer);
        stats.process_all.add(process);
        stats.residence_all.add(residence);

        let [cost_w, cost_t, cost_p] = ct.costs_per_sec;
        let d1 = cost_w * waiting + client.waiting_costs;
        if d1 != 0.0 {
            stats.client_costs_waiting.entry(name).add(d1);
        }
        let d2 = cost_t * transfer + client.transfer_costs;
        if d2 != 0.0 {
            stats.client_costs_transfer.entry(name).add(d2);
        }
        let d3 = cost_p * process + client.process_costs;
        if d3 != 0.0 {
            stats.client_costs_process.entry(name).add(d3);
        }

        for (index, value) in client.user_data_in_use() {
            stats.client_data.entry(&index.to_string()).add(value);
        }

        if self.recording.paths && !client.path().is_empty() {
            stats.client_paths.entry(&client.path_name(&self.station_names)).add();
        }

        let last = self.last_leave_by_type[t];
        if last > SimTime::ZERO && last <= now {
            let secs = now.since(last) as f64 / 1_000.0;
            self.cache_leave.get_mut(&mut stats.client_leave_inter, t, name).add(secs);
        }
        self.last_leave_by_type[t] = now;
    }

    /// Write the current in-system counts at `now` (replication end).
    pub fn finalize_clients_in_system(
        &mut self,
        is_warm_up: bool,
        now:        SimTime,
        stats:      &mut Statistics,
    ) {
        if is_warm_up {
            return;
        }
        let t = now.as_secs_f64();
        stats.clients_in_system.set(t, self.live as u32);
        for i in 0..self.types.len() {
            let count = self.in_system_by_type[i] as u32;
            self.cache_in_system
                .get_mut(&mut stats.clients_in_system_by_type, i, &self.types[i].name)
                .set(t, count);
        }
    }

    /// Keep the in-system indicators current, warm-up included, so the
    /// reset at the end of the warm-up restarts them from the right state.
    fn log_in_system_change(
        &mut self,
        client_type: ClientTypeId,
        delta:       i64,
        now:         SimTime,
        stats:       &mut Statistics,
    ) {
        let i = client_type.index();
        if let Some(count) = self.in_system_by_type.get_mut(i) {
            *count = count.saturating_add_signed(delta);
        }
        let t = now.as_secs_f64();
        stats.clients_in_system.set(t, self.live as u32);
        if let Some(ct) = self.types.get(i) {
            let count = self.in_system_by_type[i] as u32;
            self.cache_in_system
                .get_mut(&mut stats.clients_in_system_by_type, i, &ct.name)
                .set(t, count);
        }
    }
}
