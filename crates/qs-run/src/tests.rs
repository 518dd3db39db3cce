//! Unit tests for qs-run.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use qs_core::{
    CalcError, ClientTypeId, Constant, Expression, FailureSpec, FailureTrigger, FnExpression, ResourceId,
    SimTime, StationId, TimeSource, TransporterTypeId,
};
use qs_entity::{Client, ClientTimes, ClientType};
use qs_resource::{ResourceTemplate, SecondaryPriority};
use qs_transport::{TransporterRef, TransporterTemplate};
use tracing_test::traced_test;

use crate::{
    ArrivalPackages, ConfidenceRule, EventQueue, Interests, ListenerKind, Recording, RunData, RunModel,
    SimulationData, Station, Termination, ThreadSetup, ThreadSplit, WarmUp,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

const SOURCE: StationId = StationId(0);
const PROCESS: StationId = StationId(1);
const SINK: StationId = StationId(2);
const CLIENT: ClientTypeId = ClientTypeId(0);

type Log<T> = Arc<Mutex<Vec<T>>>;

fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

fn constant(value: f64) -> Option<Arc<dyn Expression>> {
    let expr: Arc<dyn Expression> = Arc::new(Constant::new(value));
    Some(expr)
}

fn clients() -> Vec<ClientType> {
    vec![ClientType::new("Client")]
}

fn station(s: impl Station + 'static) -> Arc<dyn Station> {
    Arc::new(s)
}

fn sim_of(model: RunModel) -> SimulationData {
    SimulationData::new(Arc::new(model), ThreadSetup::single(42))
}

/// Generates one client every `interval_ms`, starting at time zero, until
/// the arrival count says the client was the last one.
#[derive(Debug)]
struct Source {
    interval_ms: u64,
    next:        StationId,
}

impl Source {
    fn to(next: StationId, interval_ms: u64) -> Self {
        Self { interval_ms, next }
    }
}

fn generate(sim: &mut SimulationData, id: StationId, next: StationId, interval_ms: u64) {
    let last = sim.register_arrival();
    let Some(mut client) = sim.acquire_client(CLIENT) else {
        return;
    };
    client.source_station = id;
    client.is_last_client = last;
    client.last_waiting_start = sim.now();
    sim.move_client(client, id, next);
    if !last && !sim.is_stopped() {
        let at = sim.now().offset(interval_ms);
        sim.queue.schedule_fn(at, move |sim: &mut SimulationData| generate(sim, id, next, interval_ms));
    }
}

impl Station for Source {
    fn name(&self) -> &str {
        "Source"
    }

    fn init(&self, id: StationId, sim: &mut SimulationData) {
        let (next, interval_ms) = (self.next, self.interval_ms);
        sim.queue
            .schedule_fn(SimTime::ZERO, move |sim: &mut SimulationData| generate(sim, id, next, interval_ms));
    }
}

#[derive(Default)]
struct Waiting(VecDeque<Box<Client>>);

/// Serves one client per unit of the "Server" resource.  Logs
/// `(client number, start, end)` for every job.
#[derive(Debug)]
struct Process {
    service_secs: f64,
    next:         StationId,
    jobs:         Log<(u64, SimTime, SimTime)>,
}

impl Process {
    fn new(service_secs: f64) -> Self {
        Self { service_secs, next: SINK, jobs: log() }
    }

    fn try_start(&self, id: StationId, sim: &mut SimulationData) {
        loop {
            if sim.run_data.state::<Waiting>(id).is_none_or(|w| w.0.is_empty()) {
                return;
            }
            let demand = sim.resource_demand(&[("Server", 1)]).unwrap();
            if sim.try_lock_resources(&demand, id).is_none() {
                return;
            }
            let mut client = sim.run_data.state_mut::<Waiting>(id).and_then(|w| w.0.pop_front()).unwrap();

            let now = sim.now();
            let service_ms = SimTime::from_secs_f64(self.service_secs).as_millis();
            let waited = now.since(client.last_waiting_start);
            let times = ClientTimes {
                waiting_ms: waited,
                process_ms: service_ms,
                residence_ms: waited + service_ms,
                ..ClientTimes::default()
            };
            client.add_station_time(id, times, true);
            let end = now.offset(service_ms);
            self.jobs.lock().unwrap().push((client.number, now, end));

            let next = self.next;
            sim.queue.schedule_fn(end, move |sim: &mut SimulationData| {
                sim.station_clients_changed(id, -1);
                sim.release_resources(&demand);
                sim.move_client(client, id, next);
            });
        }
    }
}

impl Station for Process {
    fn name(&self) -> &str {
        "Process"
    }

    fn arrival(&self, id: StationId, sim: &mut SimulationData, mut client: Box<Client>) {
        client.last_waiting_start = sim.now();
        sim.station_clients_changed(id, 1);
        sim.run_data.with_state(id, Waiting::default, |w: &mut Waiting| w.0.push_back(client));
        self.try_start(id, sim);
    }

    fn resource_priority(&self) -> Option<Arc<dyn Expression>> {
        constant(1.0)
    }

    fn released_resources(&self, id: StationId, sim: &mut SimulationData) {
        self.try_start(id, sim);
    }
}

#[derive(Debug)]
struct Sink;

impl Station for Sink {
    fn name(&self) -> &str {
        "Sink"
    }
}

/// Source, Process, Sink with a single-unit server.
fn line(process: Process, interval_ms: u64, termination: Termination) -> RunModel {
    let stations: Vec<Arc<dyn Station>> =
        vec![Arc::new(Source::to(PROCESS, interval_ms)), Arc::new(process), Arc::new(Sink)];
    RunModel::new(stations, clients())
        .with_resource(ResourceTemplate::fixed("Server", 1))
        .with_termination(termination)
}

/// Source feeding the sink directly.
fn source_to_sink(interval_ms: u64, termination: Termination) -> RunModel {
    let stations: Vec<Arc<dyn Station>> = vec![Arc::new(Source::to(StationId(1), interval_ms)), Arc::new(Sink)];
    RunModel::new(stations, clients()).with_termination(termination)
}

fn count(n: u64) -> Termination {
    Termination { client_count: n, ..Termination::default() }
}

fn sink_only() -> RunModel {
    RunModel::new(vec![station(Sink)], clients())
}

/// Records the times of its state-change calls.  Reports new events on
/// the first `changes` calls.
#[derive(Debug)]
struct Watcher {
    calls:       Log<SimTime>,
    changes:     usize,
    remove_self: bool,
}

impl Watcher {
    fn new() -> Self {
        Self { calls: log(), changes: 0, remove_self: false }
    }
}

impl Station for Watcher {
    fn name(&self) -> &str {
        "Watcher"
    }

    fn interests(&self) -> Interests {
        Interests { state_change: true, ..Interests::NONE }
    }

    fn state_change(&self, id: StationId, sim: &mut SimulationData) -> bool {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(sim.now());
            calls.len()
        };
        if self.remove_self {
            sim.remove_listener(ListenerKind::StateChange, id);
        }
        calls <= self.changes
    }
}

/// Listener of the released-resources round.
#[derive(Debug)]
struct Waiter {
    name:      &'static str,
    priority:  f64,
    secondary: f64,
    notified:  Log<StationId>,
}

impl Station for Waiter {
    fn name(&self) -> &str {
        self.name
    }

    fn resource_priority(&self) -> Option<Arc<dyn Expression>> {
        constant(self.priority)
    }

    fn released_resources(&self, id: StationId, _sim: &mut SimulationData) {
        self.notified.lock().unwrap().push(id);
    }

    fn secondary_resource_priority(&self, _id: StationId, _sim: &mut SimulationData) -> f64 {
        self.secondary
    }
}

fn waiters(priorities: &[(f64, f64)], notified: &Log<StationId>) -> Vec<Arc<dyn Station>> {
    const NAMES: [&str; 4] = ["W0", "W1", "W2", "W3"];
    priorities
        .iter()
        .zip(NAMES)
        .map(|(&(priority, secondary), name)| {
            let w: Arc<dyn Station> = Arc::new(Waiter { name, priority, secondary, notified: notified.clone() });
            w
        })
        .collect()
}

// ── Event queue ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod event_queue {
    use super::*;

    #[test]
    fn pops_in_time_order_and_clamps_the_past() {
        let mut q = EventQueue::new();
        q.schedule_fn(SimTime(5_000), |_| {});
        q.schedule_fn(SimTime(2_000), |_| {});
        assert_eq!(q.len(), 2);
        assert_eq!(q.next_time(), Some(SimTime(2_000)));

        let (at, _) = q.pop().unwrap();
        assert_eq!(at, SimTime(2_000));
        assert_eq!(q.now(), SimTime(2_000));
        assert_eq!(q.executed(), 1);

        q.schedule_fn(SimTime(1_000), |_| {});
        assert_eq!(q.next_time(), Some(SimTime(2_000)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn cancel_keeps_the_clock_and_reset_rewinds_it() {
        let mut q = EventQueue::new();
        q.schedule_fn(SimTime(3_000), |_| {});
        q.schedule_fn(SimTime(4_000), |_| {});
        q.pop();
        q.cancel_all();
        assert!(q.is_empty());
        assert!(q.pop().is_none());
        assert_eq!(q.now(), SimTime(3_000));

        q.reset();
        assert_eq!(q.now(), SimTime::ZERO);
        assert_eq!(q.executed(), 0);
    }

    #[test]
    fn same_time_events_run_in_insertion_order() {
        let mut sim = sim_of(sink_only());
        sim.init_day(0);
        let order = log::<u32>();
        for (i, secs) in [(1, 5), (2, 5), (0, 2), (3, 5)] {
            let order = order.clone();
            sim.queue.schedule_fn(SimTime::from_secs(secs), move |_: &mut SimulationData| {
                order.lock().unwrap().push(i)
            });
        }
        let late = order.clone();
        sim.queue.schedule_fn(SimTime::from_secs(5), move |sim: &mut SimulationData| {
            let late = late.clone();
            sim.queue.schedule_fn(SimTime::from_secs(1), move |sim: &mut SimulationData| {
                assert_eq!(sim.now(), SimTime::from_secs(5));
                late.lock().unwrap().push(4);
            });
        });
        sim.run_events();
        assert_eq!(entries(&order), vec![0, 1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn execution_order_is_a_stable_sort_by_time(times in prop::collection::vec(0u64..5, 1..30)) {
            let mut sim = sim_of(sink_only());
            sim.init_day(0);
            let order = log::<usize>();
            for (i, &secs) in times.iter().enumerate() {
                let order = order.clone();
                sim.queue.schedule_fn(SimTime::from_secs(secs), move |_: &mut SimulationData| {
                    order.lock().unwrap().push(i)
                });
            }
            sim.run_events();

            let mut expected: Vec<usize> = (0..times.len()).collect();
            expected.sort_by_key(|&i| times[i]);
            prop_assert_eq!(entries(&order), expected);
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod model {
    use super::*;

    #[test]
    fn validation() {
        assert!(line(Process::new(1.0), 0, count(1)).validate().is_ok());
        assert!(RunModel::new(Vec::new(), clients()).validate().is_err());
        assert!(RunModel::new(vec![station(Sink)], Vec::new()).validate().is_err());

        let mut missing_initial = sink_only();
        missing_initial.variable_names.push("x".into());
        assert!(missing_initial.validate().is_err());

        let bad_rule = sink_only().with_termination(Termination {
            confidence: Some(ConfidenceRule { half_width: 1.0, alpha: 1.5 }),
            ..Termination::default()
        });
        assert!(bad_rule.validate().is_err());

        let unknown_placement = sink_only().with_transporter(TransporterTemplate::new("Truck", 1).place(StationId(7), 1));
        assert!(unknown_placement.validate().is_err());
    }

    #[test]
    fn lookups_and_variable_slots() {
        let model = line(Process::new(1.0), 0, count(1)).with_variable("x", None);
        assert_eq!(model.station_id("process"), Some(PROCESS));
        assert_eq!(model.station_id("nowhere"), None);
        assert_eq!(model.station_name(SINK), "Sink");
        assert_eq!(model.station_name(StationId::INVALID), "");
        assert_eq!(model.variable_slots(), 4);
    }

    #[test]
    fn warm_up_activity() {
        assert!(!WarmUp::None.is_active());
        assert!(!WarmUp::Arrivals(0).is_active());
        assert!(WarmUp::Arrivals(3).is_active());
        assert!(WarmUp::Time(SimTime::from_secs(1)).is_active());
    }
}

// ── Run data ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod run_data {
    use super::*;

    #[derive(Debug)]
    struct Packages(Mutex<Vec<u64>>);

    impl ArrivalPackages for Packages {
        fn take_arrivals(&self) -> u64 {
            self.0.lock().unwrap().pop().unwrap_or(0)
        }
    }

    fn thread(nr: usize, count: usize) -> ThreadSetup {
        ThreadSetup {
            thread_nr: nr,
            thread_count: count,
            split: ThreadSplit { sim_days: 1, days_by_other_threads: 0, client_count_div: count as u64 },
            ..ThreadSetup::single(0)
        }
    }

    /// Arrivals a thread generates until one is reported as the last.
    fn share(model: &RunModel, setup: &ThreadSetup, limit: u64) -> u64 {
        let mut data = RunData::new(model, setup);
        for n in 1..=limit {
            data.arrivals = n;
            if data.next_client_is_last(model, setup) {
                return n;
            }
        }
        limit
    }

    #[test]
    fn last_thread_takes_the_remainder() {
        let model = source_to_sink(0, count(10));
        assert_eq!(share(&model, &thread(0, 3), 100), 3);
        assert_eq!(share(&model, &thread(1, 3), 100), 3);
        assert_eq!(share(&model, &thread(2, 3), 100), 4);
        assert_eq!(share(&model, &ThreadSetup::single(0), 100), 10);
    }

    #[test]
    fn no_client_is_last_without_a_count_or_during_warm_up() {
        let unlimited = source_to_sink(0, Termination::default());
        assert_eq!(share(&unlimited, &ThreadSetup::single(0), 50), 50);

        let warm = source_to_sink(0, count(2)).with_warm_up(WarmUp::Arrivals(5));
        let setup = ThreadSetup::single(0);
        let mut data = RunData::new(&warm, &setup);
        data.arrivals = 9;
        assert!(!data.next_client_is_last(&warm, &setup));
    }

    #[test]
    fn balancer_packages_decide_the_last_client() {
        let model = source_to_sink(0, count(100));
        let balancer: Arc<dyn ArrivalPackages> = Arc::new(Packages(Mutex::new(vec![2, 3])));
        let setup = ThreadSetup { balancer: Some(balancer), ..thread(0, 2) };
        let mut data = RunData::new(&model, &setup);
        let last: Vec<bool> = (0..7).map(|_| data.next_client_is_last(&model, &setup)).collect();
        // Package of 3, then 2, then nothing left.
        assert_eq!(last, vec![false, false, false, false, false, true, true]);
    }

    #[test]
    fn state_arena() {
        let model = sink_only();
        let mut data = RunData::new(&model, &ThreadSetup::single(0));
        let id = StationId(0);
        assert!(data.state::<u32>(id).is_none());

        data.with_state(id, || 0u32, |n| *n += 1);
        let seen = data.with_state(id, || 0u32, |n| {
            *n += 1;
            *n
        });
        assert_eq!(seen, 2);
        assert_eq!(data.state::<u32>(id), Some(&2));

        assert!(data.take_state::<String>(id).is_none());
        assert_eq!(data.state::<u32>(id), Some(&2));
        assert_eq!(data.take_state::<u32>(id).map(|b| *b), Some(2));
        assert!(data.state::<u32>(id).is_none());

        data.put_state(StationId(3), Box::new(String::from("far")));
        assert_eq!(data.state::<String>(StationId(3)).map(String::as_str), Some("far"));
        assert!(data.state_mut::<u32>(StationId(3)).is_none());
    }

    proptest! {
        #[test]
        fn thread_shares_add_up_to_the_count(total in 1u64..400, threads in 1usize..8) {
            prop_assume!(total >= threads as u64);
            let model = source_to_sink(0, count(total));
            let sum: u64 = (0..threads).map(|nr| share(&model, &thread(nr, threads), total + 1)).sum();
            prop_assert_eq!(sum, total);
        }
    }
}

// ── Replications ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod replication {
    use super::*;

    #[test]
    fn single_server_queues_the_second_client() {
        let process = Process::new(10.0);
        let jobs = process.jobs.clone();
        let mut sim = sim_of(line(process, 0, count(2)));
        sim.run_day(0);
        assert_eq!(sim.now(), SimTime::from_secs(20));

        let jobs: Vec<_> = entries(&jobs).into_iter().map(|(_, start, end)| (start, end)).collect();
        assert_eq!(
            jobs,
            vec![
                (SimTime::ZERO, SimTime::from_secs(10)),
                (SimTime::from_secs(10), SimTime::from_secs(20)),
            ]
        );

        let stats = sim.into_statistics();
        assert_eq!(stats.arrivals, 2);
        assert_eq!(stats.repeat_count, 1);
        assert_eq!(stats.waiting_all.count(), 2);
        assert!((stats.waiting_all.mean() - 5.0).abs() < 1e-9);
        assert!((stats.process_all.mean() - 10.0).abs() < 1e-9);
        let at_process = stats.station_clients.by_name("Process").unwrap();
        assert!((at_process.time_mean() - 1.5).abs() < 1e-9);
        assert!(!stats.run_error);
    }

    #[test]
    fn served_count_failure_delays_the_next_job() {
        let process = Process::new(10.0);
        let jobs = process.jobs.clone();
        let failing = ResourceTemplate::fixed("Server", 1)
            .with_failure(FailureSpec::new(FailureTrigger::ServedCount(1), TimeSource::fixed(5.0)));
        let stations: Vec<Arc<dyn Station>> =
            vec![Arc::new(Source::to(PROCESS, 0)), Arc::new(process), Arc::new(Sink)];
        let model = RunModel::new(stations, clients()).with_resource(failing).with_termination(count(2));
        let mut sim = sim_of(model);
        sim.run_day(0);

        let starts: Vec<_> = entries(&jobs).into_iter().map(|(_, start, _)| start).collect();
        assert_eq!(starts, vec![SimTime::ZERO, SimTime::from_secs(15)]);
        assert_eq!(sim.into_statistics().waiting_all.count(), 2);
    }

    #[test]
    fn warm_up_by_arrivals() {
        let model = source_to_sink(1_000, count(4)).with_warm_up(WarmUp::Arrivals(2));
        let mut sim = sim_of(model);
        assert!(sim.is_warm_up());
        sim.run_day(0);
        assert!(!sim.is_warm_up());

        let stats = sim.into_statistics();
        // The arrival ending the warm-up is not counted; its client is.
        assert_eq!(stats.arrivals, 4);
        assert_eq!(stats.waiting_all.count(), 5);
    }

    #[test]
    fn clients_present_at_the_end_of_the_warm_up_are_counted() {
        #[derive(Debug)]
        struct Keeper;

        impl Station for Keeper {
            fn name(&self) -> &str {
                "Keeper"
            }

            fn arrival(&self, id: StationId, sim: &mut SimulationData, client: Box<Client>) {
                sim.run_data.with_state(id, Waiting::default, |w: &mut Waiting| w.0.push_back(client));
            }
        }

        // Arrivals at 0, 2, 4 s fall into the warm-up; 6 and 8 s follow it.
        let stations: Vec<Arc<dyn Station>> = vec![Arc::new(Source::to(StationId(1), 2_000)), Arc::new(Keeper)];
        let termination = Termination { time_secs: Some(8.0), ..Termination::default() };
        let model = RunModel::new(stations, clients())
            .with_termination(termination)
            .with_warm_up(WarmUp::Time(SimTime::from_secs(5)));
        let mut sim = sim_of(model);
        sim.run_day(0);
        assert_eq!(sim.now(), SimTime::from_secs(8));

        let stats = sim.into_statistics();
        let in_system = &stats.clients_in_system;
        assert_eq!(in_system.time_sum(), 3.0);
        assert!((in_system.time_mean() - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(in_system.min(), 3);
    }

    #[test]
    fn warm_up_by_time() {
        let termination = Termination { time_secs: Some(9.5), ..Termination::default() };
        let model = source_to_sink(1_000, termination).with_warm_up(WarmUp::Time(SimTime::from_secs(5)));
        let mut sim = sim_of(model);
        sim.run_day(0);
        assert_eq!(sim.now(), SimTime::from_secs(9));

        let stats = sim.into_statistics();
        assert_eq!(stats.arrivals, 5);
        assert_eq!(stats.waiting_all.count(), 5);
    }

    #[test]
    fn termination_time_bounds_the_run() {
        let termination = Termination { time_secs: Some(10.0), ..Termination::default() };
        let mut sim = sim_of(source_to_sink(1_000, termination));
        sim.run_day(0);
        assert!(sim.is_stopped());
        assert_eq!(sim.now(), SimTime::from_secs(10));
        assert_eq!(sim.into_statistics().arrivals, 11);
    }

    #[test]
    fn termination_condition_stops_at_the_first_true_round() {
        let condition: Arc<dyn Expression> =
            Arc::new(FnExpression::new("x>=3", |v| Ok(if v[0] >= 3.0 { 1.0 } else { 0.0 })));
        let termination = Termination { condition: Some(condition), ..Termination::default() };
        let mut sim = sim_of(sink_only().with_variable("x", None).with_termination(termination));
        sim.init_day(0);
        for secs in 1..=5 {
            sim.queue.schedule_fn(SimTime::from_secs(secs), |sim: &mut SimulationData| {
                sim.run_data.variables[0] += 1.0;
                sim.fire_state_change_notify();
            });
        }
        sim.run_events();
        assert!(sim.is_stopped());
        assert_eq!(sim.now(), SimTime::from_secs(3));
        assert_eq!(sim.run_data.variables[0], 3.0);
    }

    #[test]
    fn confidence_rule_stops_the_run() {
        let termination = Termination {
            time_secs: Some(10_000.0),
            confidence: Some(ConfidenceRule { half_width: 1.0, alpha: 0.05 }),
            ..Termination::default()
        };
        let mut model = line(Process::new(0.5), 1_000, termination);
        model.batch_size = 10;
        let mut sim = sim_of(model);
        sim.run_day(0);
        assert!(sim.is_stopped());
        assert!(sim.now() < SimTime::from_secs(10_000));
        assert_eq!(sim.into_statistics().waiting_all.count(), 500);
    }

    #[test]
    fn replications_are_merged() {
        let setup = ThreadSetup {
            split: ThreadSplit { sim_days: 2, days_by_other_threads: 0, client_count_div: 1 },
            ..ThreadSetup::single(3)
        };
        let mut sim = SimulationData::new(Arc::new(line(Process::new(10.0), 0, count(2))), setup);
        sim.run();
        assert_eq!(sim.global_day(), 1);

        let stats = sim.into_statistics();
        assert_eq!(stats.repeat_count, 2);
        assert_eq!(stats.arrivals, 4);
        assert_eq!(stats.waiting_all.count(), 4);
        assert!((stats.waiting_all.mean() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn client_ceiling_triggers_an_emergency_shutdown() {
        let mut model = line(Process::new(10.0), 0, count(2));
        model.client_ceiling = Some(1);
        let mut sim = sim_of(model);
        sim.run_day(0);
        assert!(sim.is_stopped());

        let stats = sim.into_statistics();
        assert!(stats.run_error);
        assert!(stats.error_message.as_deref().is_some_and(|m| m.contains("limit 1")));
        assert!(!stats.warnings.is_empty());
    }

    #[test]
    fn clients_left_in_stations_are_disposed_on_request() {
        #[derive(Debug)]
        struct Holder;

        impl Station for Holder {
            fn name(&self) -> &str {
                "Holder"
            }

            fn arrival(&self, id: StationId, sim: &mut SimulationData, client: Box<Client>) {
                sim.run_data.with_state(id, Waiting::default, |w: &mut Waiting| w.0.push_back(client));
            }

            fn take_clients(&self, id: StationId, sim: &mut SimulationData) -> Vec<Box<Client>> {
                sim.run_data.take_state::<Waiting>(id).map(|w| w.0.into_iter().collect()).unwrap_or_default()
            }
        }

        let model = || {
            let stations: Vec<Arc<dyn Station>> = vec![Arc::new(Source::to(StationId(1), 1_000)), Arc::new(Holder)];
            Arc::new(RunModel::new(stations, clients()).with_termination(count(3)))
        };

        let mut keep = SimulationData::new(model(), ThreadSetup::single(0));
        keep.run_day(0);
        assert_eq!(keep.into_statistics().waiting_all.count(), 0);

        let setup = ThreadSetup { dispose_at_end: true, ..ThreadSetup::single(0) };
        let mut dispose = SimulationData::new(model(), setup);
        dispose.run_day(0);
        assert_eq!(dispose.run_data.clients.live(), 0);
        assert_eq!(dispose.into_statistics().waiting_all.count(), 3);
    }

    #[test]
    fn disposing_a_batch_records_its_members() {
        let mut sim = sim_of(sink_only());
        sim.init_day(0);

        let mut parent = sim.acquire_client(CLIENT).unwrap();
        parent.times.waiting_ms = 4_000;
        for waiting_ms in [1_000, 2_000, 3_000] {
            let mut member = sim.acquire_client(CLIENT).unwrap();
            member.times.waiting_ms = waiting_ms;
            parent.add_to_batch(member);
        }
        assert_eq!(sim.run_data.clients.live(), 4);

        sim.dispose_client(parent);
        assert_eq!(sim.run_data.clients.live(), 0);

        // Each member carries its own waiting time plus the 4 s of the batch.
        let stats = sim.into_statistics();
        assert_eq!(stats.waiting_all.count(), 3);
        assert!((stats.waiting_all.mean() - 6.0).abs() < 1e-9);
        assert_eq!(stats.waiting_all.min(), 5.0);
        assert_eq!(stats.client_waiting.by_name("Client").map(|i| i.count()), Some(3));
    }

    #[test]
    fn nested_batches_are_dissolved_level_by_level() {
        let mut sim = sim_of(sink_only());
        sim.init_day(0);

        let mut outer = sim.acquire_client(CLIENT).unwrap();
        let mut inner = sim.acquire_client(CLIENT).unwrap();
        for waiting_ms in [1_000, 5_000] {
            let mut member = sim.acquire_client(CLIENT).unwrap();
            member.times.waiting_ms = waiting_ms;
            inner.add_to_batch(member);
        }
        let mut single = sim.acquire_client(CLIENT).unwrap();
        single.times.waiting_ms = 3_000;
        outer.add_to_batch(inner);
        outer.add_to_batch(single);

        sim.dispose_client(outer);
        assert_eq!(sim.run_data.clients.live(), 0);

        let stats = sim.into_statistics();
        assert_eq!(stats.waiting_all.count(), 3);
        assert!((stats.waiting_all.mean() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn transitions_and_paths_are_recorded() {
        let mut model = line(Process::new(1.0), 0, count(2));
        model.recording = Recording { paths: true, station_totals: true, transitions: true };
        let mut sim = sim_of(model);
        sim.run_day(0);

        let stats = sim.into_statistics();
        let transitions = &stats.station_transitions;
        assert_eq!(transitions.by_name("Source -> Process").unwrap().count(), 2);
        assert_eq!(transitions.by_name("Process -> Sink").unwrap().count(), 2);
        assert_eq!(transitions.by_name("Sink -> END").unwrap().count(), 2);
        assert_eq!(stats.client_paths.by_name("Process -> Sink").unwrap().count(), 2);
        assert_eq!(stats.station_process.by_name("Process").unwrap().count(), 2);
    }

    #[test]
    fn output_records_are_written_and_closed() {
        #[derive(Debug)]
        struct Writer {
            path: PathBuf,
        }

        impl Station for Writer {
            fn name(&self) -> &str {
                "Writer"
            }

            fn arrival(&self, id: StationId, sim: &mut SimulationData, client: Box<Client>) {
                let header: &[&str] = &["client", "time"];
                let fields = [client.number.to_string(), sim.now().as_millis().to_string()];
                assert!(sim.write_output(&self.path, Some(header), &fields));
                sim.leave_system(id, client);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        let stations: Vec<Arc<dyn Station>> =
            vec![Arc::new(Source::to(StationId(1), 1_000)), Arc::new(Writer { path: path.clone() })];
        let mut sim = sim_of(RunModel::new(stations, clients()).with_termination(count(2)));
        sim.run_day(0);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["client,time", "1,0", "2,1000"]);
        assert!(sim.into_statistics().warnings.is_empty());
    }
}

// ── Calculation errors ────────────────────────────────────────────────────────

#[cfg(test)]
mod calc_errors {
    use super::*;

    fn failing_initial() -> RunModel {
        let initial: Arc<dyn Expression> = Arc::new(FnExpression::new("1/0", |_| Err(CalcError::DivisionByZero)));
        sink_only().with_variable("x", Some(initial)).with_variable("y", constant(4.0))
    }

    #[traced_test]
    #[test]
    fn default_value_is_used_and_reported_once() {
        let mut sim = sim_of(failing_initial());
        sim.run_day(0);
        assert_eq!(sim.run_data.variables[..2], [0.0, 4.0]);
        assert!(logs_contain("calculation error, default value used"));
        assert!(!sim.into_statistics().run_error);
    }

    #[traced_test]
    #[test]
    fn stop_policy_aborts_the_run() {
        let mut model = failing_initial();
        model.stop_on_calc_error = true;
        let mut sim = sim_of(model);
        sim.run_day(0);
        assert!(sim.is_stopped());
        assert!(logs_contain("emergency shutdown"));

        let stats = sim.into_statistics();
        assert!(stats.run_error);
        assert!(stats.error_message.as_deref().is_some_and(|m| m.contains("1/0")));
    }
}

// ── Notification rounds ───────────────────────────────────────────────────────

#[cfg(test)]
mod notify {
    use super::*;

    #[test]
    fn state_change_rounds_are_rate_limited() {
        let watcher = Watcher::new();
        let calls = watcher.calls.clone();
        let mut sim = sim_of(RunModel::new(vec![station(watcher)], clients()));
        sim.init_day(0);
        sim.queue.schedule_fn(SimTime::from_secs(5), |sim: &mut SimulationData| {
            sim.fire_state_change_notify();
            sim.fire_state_change_notify();
            assert_eq!(sim.pending_state_change(), Some(SimTime(5_001)));
            sim.fire_state_change_notify();
        });
        sim.run_events();
        assert_eq!(entries(&calls), vec![SimTime::ZERO, SimTime(5_000), SimTime(5_001)]);
    }

    #[test]
    fn round_stops_at_the_first_listener_that_changed_something() {
        let first = Watcher { changes: 1, ..Watcher::new() };
        let second = Watcher::new();
        let (first_calls, second_calls) = (first.calls.clone(), second.calls.clone());
        let mut sim = sim_of(RunModel::new(vec![station(first), station(second)], clients()));
        sim.init_day(0);
        sim.run_events();
        assert_eq!(entries(&first_calls), vec![SimTime::ZERO, SimTime(1)]);
        assert_eq!(entries(&second_calls), vec![SimTime(1)]);
    }

    #[test]
    fn listeners_can_remove_themselves() {
        let watcher = Watcher { remove_self: true, ..Watcher::new() };
        let calls = watcher.calls.clone();
        let mut sim = sim_of(RunModel::new(vec![station(watcher)], clients()));
        sim.init_day(0);
        sim.queue.schedule_fn(SimTime::from_secs(5), |sim: &mut SimulationData| sim.fire_state_change_notify());
        sim.run_events();
        assert_eq!(entries(&calls), vec![SimTime::ZERO]);
    }

    #[test]
    fn released_resources_go_to_the_highest_priority_first() {
        let mut first_of_ties = Vec::new();
        for seed in 0..32 {
            let notified = log();
            let stations = waiters(&[(1.0, 0.0), (5.0, 0.0), (1.0, 0.0)], &notified);
            let model = RunModel::new(stations, clients());
            let mut sim = SimulationData::new(Arc::new(model), ThreadSetup::single(seed));
            sim.init_day(0);
            sim.fire_released_resources_notify();

            let order = entries(&notified);
            assert_eq!(order.len(), 3);
            assert_eq!(order[0], StationId(1));
            first_of_ties.push(order[1]);
        }
        assert!(first_of_ties.contains(&StationId(0)));
        assert!(first_of_ties.contains(&StationId(2)));
    }

    #[test]
    fn equal_priorities_are_drawn_at_random() {
        let mut winners = Vec::new();
        for seed in 0..64 {
            let notified = log();
            let stations = waiters(&[(2.0, 0.0), (2.0, 0.0), (2.0, 0.0), (1.0, 0.0)], &notified);
            let model = RunModel::new(stations, clients());
            let mut sim = SimulationData::new(Arc::new(model), ThreadSetup::single(seed));
            sim.init_day(0);
            sim.fire_released_resources_notify();

            let order = entries(&notified);
            assert_eq!(order.len(), 4);
            assert_ne!(order[0], StationId(3));
            assert_eq!(order[3], StationId(3));
            winners.push(order[0]);
        }
        for tied in [StationId(0), StationId(1), StationId(2)] {
            assert!(winners.contains(&tied), "station {} never went first", tied.0);
        }
    }

    #[test]
    fn client_priority_breaks_resource_ties() {
        for seed in 0..16 {
            let notified = log();
            let stations = waiters(&[(1.0, 3.0), (1.0, 7.0)], &notified);
            let mut model = RunModel::new(stations, clients());
            model.secondary_priority = SecondaryPriority::ClientPriority;
            let mut sim = SimulationData::new(Arc::new(model), ThreadSetup::single(seed));
            sim.init_day(0);
            sim.fire_released_resources_notify();
            assert_eq!(entries(&notified), vec![StationId(1), StationId(0)]);
        }
    }

    #[test]
    fn resizing_a_group_offers_the_new_units() {
        let notified = log();
        let model = RunModel::new(waiters(&[(1.0, 0.0)], &notified), clients())
            .with_resource(ResourceTemplate::fixed("Server", 1));
        let mut sim = sim_of(model);
        sim.init_day(0);

        assert!(sim.resize_resource(ResourceId(0), 3));
        assert_eq!(sim.resource_count(ResourceId(0)), 3);
        assert_eq!(sim.resource_down_count(ResourceId(0)), 0);
        assert_eq!(entries(&notified).len(), 1);

        assert!(!sim.resize_resource(ResourceId(0), 0));
        assert!(sim.resize_resource(ResourceId(0), 2));
        assert_eq!(entries(&notified).len(), 1);
    }

    #[test]
    fn client_moves_and_signals_reach_their_listeners() {
        #[derive(Debug)]
        struct Spy {
            moves:   Log<(StationId, StationId)>,
            signals: Log<String>,
        }

        impl Station for Spy {
            fn name(&self) -> &str {
                "Spy"
            }

            fn interests(&self) -> Interests {
                Interests { client_move: true, signal: true, ..Interests::NONE }
            }

            fn client_move(&self, _id: StationId, _sim: &mut SimulationData, client: &Client, _by_transport: bool) {
                self.moves.lock().unwrap().push((client.last_station, client.next_station));
            }

            fn signal(&self, _id: StationId, _sim: &mut SimulationData, name: &str) {
                self.signals.lock().unwrap().push(name.to_owned());
            }
        }

        let spy = Spy { moves: log(), signals: log() };
        let (moves, signals) = (spy.moves.clone(), spy.signals.clone());
        let stations: Vec<Arc<dyn Station>> = vec![Arc::new(Source::to(StationId(1), 0)), Arc::new(Sink), Arc::new(spy)];
        let mut sim = sim_of(RunModel::new(stations, clients()).with_termination(count(1)));
        sim.run_day(0);
        sim.fire_signal("go");

        assert_eq!(entries(&moves), vec![(SOURCE, StationId(1)), (StationId(1), StationId::INVALID)]);
        assert_eq!(entries(&signals), vec!["go".to_owned()]);
    }

    #[test]
    fn timed_checks_run_while_the_station_is_interested() {
        #[derive(Debug)]
        struct Checker {
            calls: Log<SimTime>,
        }

        impl Station for Checker {
            fn name(&self) -> &str {
                "Checker"
            }

            fn init(&self, id: StationId, sim: &mut SimulationData) {
                sim.request_timed_checks(id);
                sim.request_timed_checks(id);
            }

            fn interested_in_timed_checks(&self, _id: StationId, _sim: &mut SimulationData) -> bool {
                self.calls.lock().unwrap().len() < 3
            }

            fn state_change(&self, _id: StationId, sim: &mut SimulationData) -> bool {
                self.calls.lock().unwrap().push(sim.now());
                false
            }
        }

        let checker = Checker { calls: log() };
        let calls = checker.calls.clone();
        let mut model = RunModel::new(vec![station(checker)], clients());
        model.timed_checks_ms = 1_000;
        let mut sim = sim_of(model);
        sim.run_day(0);

        assert_eq!(entries(&calls), vec![SimTime::from_secs(1), SimTime::from_secs(2), SimTime::from_secs(3)]);
        assert_eq!(sim.now(), SimTime::from_secs(4));
    }

    #[test]
    fn timed_checks_are_off_without_an_interval() {
        let mut sim = sim_of(sink_only());
        sim.init_day(0);
        sim.request_timed_checks(StationId(0));
        assert!(sim.queue.is_empty());
    }
}

// ── Transporters ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod transporters {
    use super::*;

    const DEPOT: StationId = StationId(0);
    const NEAR: StationId = StationId(1);
    const FAR: StationId = StationId(2);
    const TRUCK: TransporterTypeId = TransporterTypeId(0);

    /// Parks transporters and keeps them with a fixed priority.
    #[derive(Debug)]
    struct Depot {
        stay: f64,
    }

    impl Station for Depot {
        fn name(&self) -> &str {
            "Depot"
        }

        fn interests(&self) -> Interests {
            Interests { transporter_position: true, ..Interests::NONE }
        }

        fn stay_here_priority(&self, _id: StationId, _sim: &SimulationData, _unit: TransporterRef) -> Option<f64> {
            Some(self.stay)
        }
    }

    /// Requests every free transporter and calls it over.
    #[derive(Debug)]
    struct Caller {
        name:     &'static str,
        request:  f64,
        called:   Log<StationId>,
        arrivals: Log<SimTime>,
    }

    impl Station for Caller {
        fn name(&self) -> &str {
            self.name
        }

        fn interests(&self) -> Interests {
            Interests { transporter_position: true, transporter_move: true, ..Interests::NONE }
        }

        fn transporter_request_priority(
            &self,
            _id:   StationId,
            _sim:  &mut SimulationData,
            _unit: TransporterRef,
        ) -> Option<f64> {
            Some(self.request)
        }

        fn transporter_free(&self, id: StationId, sim: &mut SimulationData, unit: TransporterRef) {
            self.called.lock().unwrap().push(id);
            sim.move_transporter(unit, id, 0).unwrap();
        }

        fn transporter_move(&self, id: StationId, sim: &mut SimulationData, unit: TransporterRef) {
            let here = sim.run_data.transporters.transporter(unit).map(|t| t.position());
            if here == Some(id) {
                self.arrivals.lock().unwrap().push(sim.now());
            }
        }
    }

    fn depot_model(stay: f64, called: &Log<StationId>, arrivals: &Log<SimTime>) -> RunModel {
        let caller = |name, request| Caller { name, request, called: called.clone(), arrivals: arrivals.clone() };
        let stations: Vec<Arc<dyn Station>> =
            vec![Arc::new(Depot { stay }), Arc::new(caller("Near", 3.0)), Arc::new(caller("Far", 7.0))];
        let truck = TransporterTemplate::new("Truck", 1)
            .with_distance(DEPOT, NEAR, 10.0)
            .with_distance(DEPOT, FAR, 20.0)
            .place(DEPOT, 1);
        RunModel::new(stations, clients()).with_transporter(truck)
    }

    #[test]
    fn requests_above_the_stay_here_priority_win() {
        let (called, arrivals) = (log(), log());
        let mut sim = sim_of(depot_model(5.0, &called, &arrivals));
        sim.init_day(0);
        let unit = TransporterRef::new(TRUCK, 0);
        assert_eq!(sim.waiting_transporter(TRUCK, DEPOT), Some(unit));
        assert_eq!(sim.waiting_transporter(TRUCK, NEAR), None);
        assert_eq!(sim.request_transporter(TRUCK, NEAR, 6.0), Some(unit));
        assert_eq!(sim.request_transporter(TRUCK, NEAR, 4.0), None);
        assert_eq!(sim.request_transporter(TRUCK, DEPOT, 9.0), None);

        sim.free_transporter(unit);
        assert_eq!(entries(&called), vec![FAR]);
        assert!(sim.run_data.transporters.transporter(unit).is_some_and(|t| t.is_in_transfer()));

        sim.run_events();
        assert_eq!(entries(&arrivals), vec![SimTime::from_secs(20)]);
        let truck = sim.run_data.transporters.transporter(unit).unwrap();
        assert_eq!(truck.position(), FAR);
        assert!(!truck.is_in_transfer());
    }

    #[test]
    fn a_high_stay_here_priority_keeps_the_transporter() {
        let (called, arrivals) = (log(), log());
        let mut sim = sim_of(depot_model(8.0, &called, &arrivals));
        sim.init_day(0);
        let unit = TransporterRef::new(TRUCK, 0);
        sim.free_transporter(unit);
        assert!(entries(&called).is_empty());
        assert_eq!(sim.run_data.transporters.transporter(unit).map(|t| t.position()), Some(DEPOT));
        assert!(sim.queue.is_empty());
    }
}
