//! The simulated client and the client-type table.
//!
//! A `Client` is always owned through a `Box<Client>` by whatever currently
//! holds it: a station queue, a scheduled event, a transporter, or a batch
//! parent.  Boxes are recycled by [`ClientPool`](crate::ClientPool), so every
//! field must be re-initialised by [`Client::reset`].

use qs_core::{ClientTypeId, SimTime, StationId};
use rustc_hash::FxHashMap;

/// Highest index accepted by [`Client::set_user_data`].
pub const MAX_USER_DATA_INDEX: usize = 10_000;

// ── ClientType ────────────────────────────────────────────────────────────────

/// One entry of the model's client-type table.
#[derive(Clone, Debug, Default)]
pub struct ClientType {
    pub name: String,
    /// Costs per second of waiting, transfer and process time.
    pub costs_per_sec: [f64; 3],
}

impl ClientType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), costs_per_sec: [0.0; 3] }
    }

    pub fn with_costs(mut self, waiting: f64, transfer: f64, process: f64) -> Self {
        self.costs_per_sec = [waiting, transfer, process];
        self
    }
}

// ── Times ─────────────────────────────────────────────────────────────────────

/// Waiting, transfer, process and residence time in milliseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientTimes {
    pub waiting_ms:   u64,
    pub transfer_ms:  u64,
    pub process_ms:   u64,
    pub residence_ms: u64,
}

impl ClientTimes {
    pub fn add(&mut self, other: &ClientTimes) {
        self.waiting_ms += other.waiting_ms;
        self.transfer_ms += other.transfer_ms;
        self.process_ms += other.process_ms;
        self.residence_ms += other.residence_ms;
    }

    /// Component-wise `self - earlier`, saturating at zero.
    pub fn since(&self, earlier: &ClientTimes) -> ClientTimes {
        ClientTimes {
            waiting_ms:   self.waiting_ms.saturating_sub(earlier.waiting_ms),
            transfer_ms:  self.transfer_ms.saturating_sub(earlier.transfer_ms),
            process_ms:   self.process_ms.saturating_sub(earlier.process_ms),
            residence_ms: self.residence_ms.saturating_sub(earlier.residence_ms),
        }
    }
}

/// A section the client entered, with the times it had accumulated then.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectionEntry {
    pub section: StationId,
    pub times:   ClientTimes,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Client {
    /// Running number, unique within one replication of one thread.
    pub number:                    u64,
    pub client_type:               ClientTypeId,
    /// Type before the last [`ClientPool::change_type`](crate::ClientPool::change_type).
    pub type_last:                 ClientTypeId,
    /// Station that created the client or last changed its type.
    pub source_station:            StationId,
    /// Created during the warm-up phase; never recorded.
    pub is_warm_up:                bool,
    pub in_statistics:             bool,
    pub is_last_client:            bool,
    pub last_station:              StationId,
    pub next_station:              StationId,
    pub arrival_processed_station: StationId,
    pub times:                     ClientTimes,
    /// Per-station totals, only kept when the model records them.
    pub station_times:             FxHashMap<StationId, ClientTimes>,
    pub waiting_costs:             f64,
    pub transfer_costs:            f64,
    pub process_costs:             f64,
    pub last_waiting_start:        SimTime,
    pub last_alternative:          u32,
    pub sequence_nr:               Option<u32>,
    pub sequence_step:             u32,
    /// `true` while the client is listed in a parent's batch.
    pub batched:                   bool,

    batch:            Vec<Box<Client>>,
    batch_done:       bool,
    user_data:        Vec<f64>,
    user_data_in_use: Vec<bool>,
    /// Keyed by the lower-cased key; holds the original key and the value.
    user_text:        FxHashMap<String, (String, String)>,
    sections:         Vec<SectionEntry>,
    logic:            Vec<bool>,
    path:             Vec<StationId>,
}

impl Client {
    pub(crate) fn new(number: u64, client_type: ClientTypeId, is_warm_up: bool) -> Self {
        let mut c = Client::default();
        c.reset(number, client_type, is_warm_up);
        c
    }

    /// Re-initialise every field for reuse.  Buffers keep their capacity.
    pub fn reset(&mut self, number: u64, client_type: ClientTypeId, is_warm_up: bool) {
        self.number = number;
        self.client_type = client_type;
        self.type_last = client_type;
        self.source_station = StationId::INVALID;
        self.is_warm_up = is_warm_up;
        self.in_statistics = true;
        self.is_last_client = false;
        self.last_station = StationId::INVALID;
        self.next_station = StationId::INVALID;
        self.arrival_processed_station = StationId::INVALID;
        self.times = ClientTimes::default();
        self.station_times.clear();
        self.waiting_costs = 0.0;
        self.transfer_costs = 0.0;
        self.process_costs = 0.0;
        self.last_waiting_start = SimTime::ZERO;
        self.last_alternative = 0;
        self.sequence_nr = None;
        self.sequence_step = 0;
        self.batched = false;
        self.batch.clear();
        self.batch_done = false;
        self.user_data.clear();
        self.user_data_in_use.clear();
        self.user_text.clear();
        self.sections.clear();
        self.logic.clear();
        self.path.clear();
    }

    /// Copy the mutable state of `source`.  Identity (number, type, warm-up
    /// flag), routing (last/next station), the last-client flag, sections and
    /// the batch are left alone; the pool clones batch members separately.
    pub(crate) fn copy_data_from(&mut self, source: &Client) {
        self.in_statistics = source.in_statistics;
        self.times = source.times;
        self.station_times.clone_from(&source.station_times);
        self.waiting_costs = source.waiting_costs;
        self.transfer_costs = source.transfer_costs;
        self.process_costs = source.process_costs;
        self.last_waiting_start = source.last_waiting_start;
        self.last_alternative = source.last_alternative;
        self.sequence_nr = source.sequence_nr;
        self.sequence_step = source.sequence_step;
        self.user_data.clone_from(&source.user_data);
        self.user_data_in_use.clone_from(&source.user_data_in_use);
        self.user_text.clone_from(&source.user_text);
        self.logic.clone_from(&source.logic);
        self.path.clone_from(&source.path);
    }

    /// Add time spent at `station`.  With `per_station` the totals by station
    /// are updated as well.
    pub fn add_station_time(&mut self, station: StationId, add: ClientTimes, per_station: bool) {
        self.times.add(&add);
        if per_station {
            self.station_times.entry(station).or_default().add(&add);
        }
    }

    // ── User data ─────────────────────────────────────────────────────────

    /// Numeric user data; unset indexes read as 0.
    pub fn user_data(&self, index: usize) -> f64 {
        self.user_data.get(index).copied().unwrap_or(0.0)
    }

    /// Indexes above [`MAX_USER_DATA_INDEX`] are ignored.
    pub fn set_user_data(&mut self, index: usize, value: f64) {
        if index > MAX_USER_DATA_INDEX {
            return;
        }
        if self.user_data.len() <= index {
            self.user_data.resize(index + 1, 0.0);
            self.user_data_in_use.resize(index + 1, false);
        }
        self.user_data[index] = value;
        self.user_data_in_use[index] = true;
    }

    /// `(index, value)` of every user data field that was set.
    pub fn user_data_in_use(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.user_data
            .iter()
            .zip(&self.user_data_in_use)
            .enumerate()
            .filter(|(_, (_, used))| **used)
            .map(|(i, (v, _))| (i, *v))
    }

    /// Text user data; keys are case-insensitive, missing keys read as "".
    pub fn user_text(&self, key: &str) -> &str {
        self.user_text.get(&key.to_lowercase()).map_or("", |(_, v)| v.as_str())
    }

    pub fn set_user_text(&mut self, key: &str, value: impl Into<String>) {
        self.user_text.insert(key.to_lowercase(), (key.to_owned(), value.into()));
    }

    /// Original spelling of every text key.
    pub fn user_text_keys(&self) -> impl Iterator<Item = &str> {
        self.user_text.values().map(|(k, _)| k.as_str())
    }

    // ── Batches ───────────────────────────────────────────────────────────

    /// Append `child` to this client's batch.  A batch that was already
    /// dissolved is started afresh.
    pub fn add_to_batch(&mut self, mut child: Box<Client>) {
        if self.batch_done {
            self.batch.clear();
            self.batch_done = false;
        }
        child.batched = true;
        self.batch.push(child);
    }

    /// Members of a live batch; `None` if there is none or it was dissolved.
    pub fn batch_members(&self) -> Option<&[Box<Client>]> {
        if self.batch.is_empty() || self.batch_done {
            None
        } else {
            Some(&self.batch)
        }
    }

    /// Hand the members out, pushing this client's accumulated times, costs,
    /// routing state and path onto each of them.  Returns `None` on every
    /// call after the first.
    pub fn dissolve_batch(&mut self) -> Option<Vec<Box<Client>>> {
        if self.batch.is_empty() || self.batch_done {
            return None;
        }
        self.batch_done = true;
        let mut members = std::mem::take(&mut self.batch);
        for m in &mut members {
            m.times.add(&self.times);
            for (station, t) in &self.station_times {
                m.station_times.entry(*station).or_default().add(t);
            }
            m.waiting_costs += self.waiting_costs;
            m.transfer_costs += self.transfer_costs;
            m.process_costs += self.process_costs;
            m.batched = false;
            if self.last_alternative > 0 {
                m.last_alternative = self.last_alternative;
            }
            m.last_station = self.last_station;
            m.next_station = self.next_station;
            m.arrival_processed_station = self.arrival_processed_station;
            m.sequence_nr = self.sequence_nr;
            m.sequence_step = self.sequence_step;
            for &step in &self.path {
                m.record_path_step(step);
            }
        }
        Some(members)
    }

    // ── Sections ──────────────────────────────────────────────────────────

    /// Enter `section`, snapshotting the current times.  Re-entering only
    /// refreshes the snapshot.
    pub fn enter_section(&mut self, section: StationId) {
        let times = self.times;
        match self.sections.iter_mut().find(|e| e.section == section) {
            Some(e) => e.times = times,
            None => self.sections.push(SectionEntry { section, times }),
        }
    }

    /// Leave `section`.  Returns the entry snapshot, or `None` if the client
    /// was not inside it.
    pub fn leave_section(&mut self, section: StationId) -> Option<SectionEntry> {
        let pos = self.sections.iter().position(|e| e.section == section)?;
        Some(self.sections.remove(pos))
    }

    pub fn sections(&self) -> &[SectionEntry] {
        &self.sections
    }

    /// Remove and return all section entries.
    pub fn take_sections(&mut self) -> Vec<SectionEntry> {
        std::mem::take(&mut self.sections)
    }

    // ── Logic stack ───────────────────────────────────────────────────────

    pub fn enter_logic(&mut self, condition_ok: bool) {
        self.logic.push(condition_ok);
    }

    /// Value of the innermost logic block; `false` outside any block.
    pub fn test_logic(&self) -> bool {
        self.logic.last().copied().unwrap_or(false)
    }

    /// Mark the innermost logic block as satisfied.
    pub fn update_logic(&mut self) {
        if let Some(top) = self.logic.last_mut() {
            *top = true;
        }
    }

    pub fn leave_logic(&mut self) {
        self.logic.pop();
    }

    pub fn leave_all_logic(&mut self) {
        self.logic.clear();
    }

    pub fn logic_depth(&self) -> usize {
        self.logic.len()
    }

    // ── Path recording ────────────────────────────────────────────────────

    /// Append `station` to the recorded path.  Warm-up clients and clients
    /// excluded from the statistics record nothing.
    pub fn record_path_step(&mut self, station: StationId) {
        if self.is_warm_up || !self.in_statistics {
            return;
        }
        self.path.push(station);
    }

    pub fn path(&self) -> &[StationId] {
        &self.path
    }

    /// Path as `"A -> B -> C"`.  Unknown ids print as their number.
    pub fn path_name(&self, station_names: &[String]) -> String {
        let mut out = String::new();
        for (i, s) in self.path.iter().enumerate() {
            if i > 0 {
                out.push_str(" -> ");
            }
            match station_names.get(s.index()) {
                Some(name) => out.push_str(name),
                None => out.push_str(&s.0.to_string()),
            }
        }
        out
    }
}
