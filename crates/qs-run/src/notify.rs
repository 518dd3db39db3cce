//! Notification rounds.
//!
//! Every round follows the same shape: fetch the listener list (built on
//! first use), iterate over an `Arc` clone of it while stations run with
//! `&mut SimulationData`, then apply the removals they requested.

use std::sync::Arc;

use qs_core::{CalcOrigin, SimTime, StationId};
use qs_entity::Client;
use qs_resource::SecondaryPriority;
use qs_transport::TransporterRef;
use tracing::info;

use crate::event::{StateChangeEvent, TimedCheckEvent};
use crate::run_data::{FreeResourcesListener, ListenerKind};
use crate::sim_data::{SimulationData, eval_ctx};

/// Name of the start or end point of a station transition.
const TRANSITION_START: &str = "START";
const TRANSITION_END: &str = "END";

impl SimulationData {
    // ── State change ──────────────────────────────────────────────────────

    /// Tell the state-change listeners that something happened, then test
    /// the termination condition and time.
    ///
    /// At most one round runs per millisecond; a second call at the same
    /// time schedules one follow-up round 1 ms later.  The round stops at the
    /// first listener that scheduled new events, and a follow-up is
    /// scheduled so the others see the updated state.
    pub fn fire_state_change_notify(&mut self) {
        if self.run_data.stopped {
            return;
        }
        let model = Arc::clone(&self.model);
        let listeners = Arc::clone(&self.run_data.listeners(&model).state_change);
        let termination = &model.termination;
        if listeners.is_empty() && termination.condition.is_none() && termination.time_secs.is_none() {
            return;
        }

        let now = self.now();
        if !now.is_zero() && self.run_data.last_state_change == Some(now) {
            self.schedule_state_change_follow_up();
            return;
        }
        self.run_data.last_state_change = Some(now);

        if !listeners.is_empty() {
            let mut changed = false;
            for &id in listeners.iter() {
                let Some(station) = model.station(id) else {
                    continue;
                };
                if station.state_change(id, self) {
                    changed = true;
                    break;
                }
            }
            self.run_data.listeners(&model).apply_removals();
            if changed {
                self.schedule_state_change_follow_up();
            }
        }

        if let Some(condition) = &termination.condition {
            self.set_client_variable_values(None);
            if self.eval(condition.as_ref(), &CalcOrigin::Model, 0.0) != 0.0 {
                info!(
                    thread = self.thread_nr(),
                    at = %now,
                    condition = condition.text(),
                    "termination condition met"
                );
                self.shutdown();
                return;
            }
        }
        if let Some(secs) = termination.time_secs
            && now.as_millis() as f64 > secs * 1_000.0
        {
            info!(thread = self.thread_nr(), at = %now, "termination time reached");
            self.shutdown();
        }
    }

    fn schedule_state_change_follow_up(&mut self) {
        let at = self.now().offset(1);
        if self.run_data.last_triggered == Some(at) {
            return;
        }
        self.run_data.last_triggered = Some(at);
        self.queue.schedule(at, Box::new(StateChangeEvent));
    }

    // ── Released resources ────────────────────────────────────────────────

    /// Offer released resources to the waiting stations, highest priority
    /// first.  Stations with equal priority are notified in random order, or
    /// by their best waiting client with [`SecondaryPriority::ClientPriority`].
    pub fn fire_released_resources_notify(&mut self) {
        let model = Arc::clone(&self.model);
        let mut ctx = eval_ctx!(self);
        self.run_data.resources.update_status(&mut ctx, &mut self.stats);
        self.drain_checks();

        let listeners = Arc::clone(&self.run_data.listeners(&model).free_resources);
        if listeners.is_empty() {
            return;
        }

        self.set_client_variable_values(None);
        let mut priorities: Vec<f64> = listeners
            .iter()
            .map(|l| match l.constant {
                Some(v) => v,
                None => self.eval(l.priority.as_ref(), &CalcOrigin::Station(l.station), 0.0),
            })
            .collect();

        let mut ties: Vec<usize> = Vec::with_capacity(listeners.len());
        loop {
            ties.clear();
            let mut max = f64::MIN;
            for (i, &p) in priorities.iter().enumerate() {
                if p > max {
                    max = p;
                    ties.clear();
                    ties.push(i);
                } else if p == max && max > f64::MIN {
                    ties.push(i);
                }
            }
            if ties.is_empty() {
                break;
            }
            while !ties.is_empty() {
                let select = if ties.len() == 1 { 0 } else { self.secondary_pick(&listeners, &ties) };
                let index = ties.remove(select);
                let id = listeners[index].station;
                if let Some(station) = model.station(id) {
                    station.released_resources(id, self);
                }
                priorities[index] = f64::MIN;
            }
        }
    }

    /// Position in `ties` of the listener to notify next.
    fn secondary_pick(&mut self, listeners: &[FreeResourcesListener], ties: &[usize]) -> usize {
        if self.run_data.resources.secondary_priority == SecondaryPriority::ClientPriority {
            let model = Arc::clone(&self.model);
            let mut best = Vec::with_capacity(ties.len());
            let mut best_priority = f64::NEG_INFINITY;
            for (pos, &index) in ties.iter().enumerate() {
                let id = listeners[index].station;
                let Some(station) = model.station(id) else {
                    continue;
                };
                let p = station.secondary_resource_priority(id, self);
                if p > best_priority {
                    best_priority = p;
                    best.clear();
                    best.push(pos);
                } else if p == best_priority {
                    best.push(pos);
                }
            }
            if let Some(&pos) = self.rng.choose(&best) {
                return pos;
            }
        }
        self.rng.pick_index(ties.len())
    }

    // ── Released transporter ──────────────────────────────────────────────

    /// Offer the free transporter `unit` to the stations asking for it.
    /// Requests not above the stay-here priority of the station the unit is
    /// parked at are ignored.  Stops as soon as the unit was sent off.
    pub fn fire_release_transporter_notify(&mut self, unit: TransporterRef) {
        let model = Arc::clone(&self.model);
        let listeners = Arc::clone(&self.run_data.listeners(&model).transporter_position);
        let Some(position) = self.run_data.transporters.transporter(unit).map(|t| t.position()) else {
            return;
        };

        let stay_here = match model.station(position) {
            Some(station) if listeners.contains(&position) => {
                station.stay_here_priority(position, self, unit).unwrap_or(f64::MIN)
            }
            _ => f64::MIN,
        };

        let mut priorities: Vec<Option<f64>> = Vec::with_capacity(listeners.len());
        for &id in listeners.iter() {
            let request = match model.station(id) {
                Some(station) if id != position => station.transporter_request_priority(id, self, unit),
                _ => None,
            };
            priorities.push(request.filter(|&p| p > stay_here));
        }
        if priorities.iter().all(Option::is_none) {
            return;
        }

        let mut ties: Vec<usize> = Vec::with_capacity(listeners.len());
        loop {
            ties.clear();
            let mut max = f64::MIN;
            for (i, p) in priorities.iter().enumerate() {
                let Some(p) = *p else {
                    continue;
                };
                if p > max || ties.is_empty() {
                    max = p;
                    ties.clear();
                    ties.push(i);
                } else if p == max {
                    ties.push(i);
                }
            }
            if ties.is_empty() {
                break;
            }
            while !ties.is_empty() {
                let select = self.rng.pick_index(ties.len());
                let index = ties.remove(select);
                let id = listeners[index];
                if let Some(station) = model.station(id) {
                    station.transporter_free(id, self, unit);
                }
                if self.run_data.transporters.transporter(unit).is_some_and(|t| t.is_in_transfer()) {
                    return;
                }
                priorities[index] = None;
            }
        }
    }

    // ── Moves / signals ───────────────────────────────────────────────────

    /// Record the move of `client` from `last_station` to `next_station`
    /// (path step, station transition) and tell the client-move listeners.
    pub fn fire_client_move_notify(&mut self, client: &mut Client, by_transport: bool) {
        self.record_client_movement(client);

        let model = Arc::clone(&self.model);
        let listeners = Arc::clone(&self.run_data.listeners(&model).client_move);
        if listeners.is_empty() {
            return;
        }
        for &id in listeners.iter() {
            if let Some(station) = model.station(id) {
                station.client_move(id, self, client, by_transport);
            }
        }
        self.run_data.listeners(&model).apply_removals();
    }

    fn record_client_movement(&mut self, client: &mut Client) {
        if client.is_warm_up || !client.in_statistics {
            return;
        }
        let from = client.last_station;
        let to = client.next_station;

        if self.model.recording.paths && to.is_valid() {
            client.record_path_step(to);
        }
        if self.model.recording.transitions {
            let handle = match self.run_data.transitions.get(&(from, to)) {
                Some(&h) => h,
                None => {
                    let name = format!("{} -> {}", self.endpoint_name(from, true), self.endpoint_name(to, false));
                    let h = self.stats.station_transitions.register(&name);
                    self.run_data.transitions.insert((from, to), h);
                    h
                }
            };
            self.stats.station_transitions.get_mut(handle).add();
        }
    }

    fn endpoint_name(&self, id: StationId, start: bool) -> String {
        match self.model.station_names.get(id.index()) {
            Some(name) if id.is_valid() => name.clone(),
            _ if start => TRANSITION_START.to_owned(),
            _ => TRANSITION_END.to_owned(),
        }
    }

    /// Tell the transporter-move listeners that `unit` moved.
    pub fn fire_transporter_move_notify(&mut self, unit: TransporterRef) {
        let model = Arc::clone(&self.model);
        let listeners = Arc::clone(&self.run_data.listeners(&model).transporter_move);
        for &id in listeners.iter() {
            if let Some(station) = model.station(id) {
                station.transporter_move(id, self, unit);
            }
        }
        self.run_data.listeners(&model).apply_removals();
    }

    /// Send the signal `name` to every signal listener.
    pub fn fire_signal(&mut self, name: &str) {
        let model = Arc::clone(&self.model);
        let listeners = Arc::clone(&self.run_data.listeners(&model).signal);
        for &id in listeners.iter() {
            if let Some(station) = model.station(id) {
                station.signal(id, self, name);
            }
        }
    }

    /// Remove `station` from a listener list once the running round ends.
    pub fn remove_listener(&mut self, kind: ListenerKind, station: StationId) {
        let model = Arc::clone(&self.model);
        self.run_data.listeners(&model).mark_removed(kind, station);
    }

    // ── Timed checks ──────────────────────────────────────────────────────

    /// Ask for periodic state-change calls at `station` while it reports
    /// interest.  Ignored when the model has no check interval.
    pub fn request_timed_checks(&mut self, station: StationId) {
        let every = self.model.timed_checks_ms;
        if every == 0 || self.run_data.timed_checks.contains(&station) {
            return;
        }
        self.run_data.timed_checks.push(station);
        if !self.run_data.timed_checks_on {
            self.run_data.timed_checks_on = true;
            let at = self.now().offset(every);
            self.queue.schedule(at, Box::new(TimedCheckEvent));
        }
    }

    /// One timed-check round.  Stations that lost interest are dropped; the
    /// first one reporting new events ends the round.
    pub(crate) fn run_timed_checks(&mut self) {
        let model = Arc::clone(&self.model);
        let stations = std::mem::take(&mut self.run_data.timed_checks);
        let mut keep = Vec::with_capacity(stations.len());
        let mut changed = false;
        for (pos, &id) in stations.iter().enumerate() {
            if changed {
                keep.extend_from_slice(&stations[pos..]);
                break;
            }
            let Some(station) = model.station(id) else {
                continue;
            };
            if !station.interested_in_timed_checks(id, self) {
                continue;
            }
            keep.push(id);
            if station.state_change(id, self) {
                changed = true;
            }
        }
        if changed {
            self.schedule_state_change_follow_up();
        }
        // Stations may have asked for checks while the round ran.
        for id in std::mem::take(&mut self.run_data.timed_checks) {
            if !keep.contains(&id) {
                keep.push(id);
            }
        }
        self.run_data.timed_checks = keep;

        if self.run_data.timed_checks.is_empty() {
            self.run_data.timed_checks_on = false;
        } else {
            let at = self.now().offset(self.model.timed_checks_ms);
            self.queue.schedule(at, Box::new(TimedCheckEvent));
        }
    }

    /// Follow-up time of a rate-limited state-change round, if one is queued.
    pub fn pending_state_change(&self) -> Option<SimTime> {
        self.run_data.last_triggered.filter(|&at| at > self.now())
    }
}
