//! two-stations: an airport check-in line on the rust_qs simulator.
//!
//! Passengers arrive at random, queue for one of two check-in desks, then
//! for a single security scanner that breaks down every 50 passengers.
//! Logging follows `RUST_LOG` (default `info`).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use qs_core::{
    CalcOrigin, ClientTypeId, Exponential, FailureSpec, FailureTrigger, SimConfig, SimTime, StationId,
    TimeSource, Uniform,
};
use qs_entity::{Client, ClientTimes, ClientType};
use qs_output::{CsvWriter, write_summary};
use qs_resource::ResourceTemplate;
use qs_run::{RunModel, SimulationData, Station, Termination, WarmUp};
use qs_sim::{DayReport, SimBuilder, SimObserver};
use qs_stats::Statistics;

// ── Constants ─────────────────────────────────────────────────────────────────

const CLIENT_COUNT:  u64 = 200_000;
const WARM_UP:       u64 = 2_000;
const SEED:          u64 = 42;
const SUMMARY_PATH:  &str = "output/two-stations/summary.csv";

const PASSENGER: ClientTypeId = ClientTypeId(0);
const CHECK_IN:  StationId = StationId(1);
const SECURITY:  StationId = StationId(2);
const EXIT:      StationId = StationId(3);

// ── Stations ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Source {
    inter_arrival: TimeSource,
    next:          StationId,
}

impl Source {
    fn schedule_next(&self, id: StationId, sim: &mut SimulationData) {
        let secs = sim.sample_secs(&self.inter_arrival, &CalcOrigin::Station(id));
        let at = sim.now().offset(SimTime::from_secs_f64(secs).as_millis());
        let inter_arrival = self.inter_arrival.clone();
        let next = self.next;
        sim.queue.schedule_fn(at, move |sim: &mut SimulationData| {
            let source = Source { inter_arrival, next };
            source.arrive(id, sim);
        });
    }

    fn arrive(self, id: StationId, sim: &mut SimulationData) {
        let last = sim.register_arrival();
        let Some(mut client) = sim.acquire_client(PASSENGER) else {
            return;
        };
        client.source_station = id;
        client.is_last_client = last;
        sim.move_client(client, id, self.next);
        if !last && !sim.is_stopped() {
            self.schedule_next(id, sim);
        }
    }
}

impl Station for Source {
    fn name(&self) -> &str {
        "Arrivals"
    }

    fn init(&self, id: StationId, sim: &mut SimulationData) {
        self.schedule_next(id, sim);
    }
}

#[derive(Default)]
struct Queue(VecDeque<Box<Client>>);

/// First come, first served with one unit of `resource` per client.
#[derive(Debug)]
struct Process {
    name:     &'static str,
    resource: &'static str,
    service:  TimeSource,
    next:     StationId,
}

impl Process {
    fn try_start(&self, id: StationId, sim: &mut SimulationData) {
        let demand = match sim.resource_demand(&[(self.resource, 1)]) {
            Ok(demand) => demand,
            Err(err) => {
                sim.emergency_shutdown(err.to_string());
                return;
            }
        };
        loop {
            if sim.run_data.state::<Queue>(id).is_none_or(|q| q.0.is_empty()) {
                return;
            }
            let Some(setup_secs) = sim.try_lock_resources(&demand, id) else {
                return;
            };
            let Some(mut client) = sim.run_data.state_mut::<Queue>(id).and_then(|q| q.0.pop_front()) else {
                sim.release_resources(&demand);
                return;
            };

            let now = sim.now();
            let secs = setup_secs + sim.sample_secs(&self.service, &CalcOrigin::Station(id));
            let service_ms = SimTime::from_secs_f64(secs).as_millis();
            let waited = now.since(client.last_waiting_start);
            let times = ClientTimes {
                waiting_ms: waited,
                process_ms: service_ms,
                residence_ms: waited + service_ms,
                ..ClientTimes::default()
            };
            client.add_station_time(id, times, true);

            let next = self.next;
            let demand = demand.clone();
            sim.queue.schedule_fn(now.offset(service_ms), move |sim: &mut SimulationData| {
                sim.station_clients_changed(id, -1);
                sim.release_resources(&demand);
                sim.move_client(client, id, next);
            });
        }
    }
}

impl Station for Process {
    fn name(&self) -> &str {
        self.name
    }

    fn arrival(&self, id: StationId, sim: &mut SimulationData, mut client: Box<Client>) {
        client.last_waiting_start = sim.now();
        sim.station_clients_changed(id, 1);
        sim.run_data.with_state(id, Queue::default, |q: &mut Queue| q.0.push_back(client));
        self.try_start(id, sim);
    }

    fn resource_priority(&self) -> Option<Arc<dyn qs_core::Expression>> {
        Some(Arc::new(qs_core::Constant::new(1.0)))
    }

    fn released_resources(&self, id: StationId, sim: &mut SimulationData) {
        self.try_start(id, sim);
    }

    fn take_clients(&self, id: StationId, sim: &mut SimulationData) -> Vec<Box<Client>> {
        sim.run_data.take_state::<Queue>(id).map(|q| q.0.into()).unwrap_or_default()
    }
}

#[derive(Debug)]
struct Exit;

impl Station for Exit {
    fn name(&self) -> &str {
        "Exit"
    }
}

fn build_model() -> RunModel {
    let stations: Vec<Arc<dyn Station>> = vec![
        Arc::new(Source {
            inter_arrival: TimeSource::Distribution(Arc::new(Exponential { mean: 60.0 })),
            next:          CHECK_IN,
        }),
        Arc::new(Process {
            name:     "Check-in",
            resource: "Desk",
            service:  TimeSource::Distribution(Arc::new(Exponential { mean: 100.0 })),
            next:     SECURITY,
        }),
        Arc::new(Process {
            name:     "Security",
            resource: "Scanner",
            service:  TimeSource::Distribution(Arc::new(Uniform { low: 20.0, high: 40.0 })),
            next:     EXIT,
        }),
        Arc::new(Exit),
    ];
    debug_assert_eq!(stations.len(), EXIT.index() + 1);

    let scanner_failure = FailureSpec::new(FailureTrigger::ServedCount(50), TimeSource::fixed(300.0));
    RunModel::new(stations, vec![ClientType::new("Passenger")])
        .with_resource(ResourceTemplate::fixed("Desk", 2))
        .with_resource(ResourceTemplate::fixed("Scanner", 1).with_failure(scanner_failure))
        .with_termination(Termination { client_count: CLIENT_COUNT, ..Termination::default() })
        .with_warm_up(WarmUp::Arrivals(WARM_UP))
}

// ── Observer ──────────────────────────────────────────────────────────────────

struct Progress;

impl SimObserver for Progress {
    fn on_sim_start(&mut self, threads: usize) {
        println!("Running on {threads} thread(s)");
    }

    fn on_day_done(&mut self, report: &DayReport) {
        println!(
            "  thread {:>2}  day {:>2}  arrivals {:>7}  events {:>9}  ended at {}",
            report.thread_nr, report.day, report.arrivals, report.events, report.end
        );
    }

    fn on_sim_end(&mut self, stats: &Statistics) {
        println!("Done: {} arrivals over {} replication(s)", stats.arrivals, stats.repeat_count);
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== two-stations: rust_qs queueing simulator ===");
    println!("Passengers: {CLIENT_COUNT}  |  Warm-up: {WARM_UP}  |  Seed: {SEED}");
    println!();

    let config = SimConfig { seed: SEED, ..SimConfig::default() };
    let mut sim = SimBuilder::new(config, Arc::new(build_model())).build()?;
    let stats = sim.run(&mut Progress)?;
    println!();

    if stats.run_error {
        eprintln!("run failed: {}", stats.error_message.as_deref().unwrap_or("unknown error"));
    }
    for warning in &stats.warnings {
        eprintln!("warning: {warning}");
    }

    println!("{:<10} {:>12} {:>12}", "Station", "Waiting [s]", "Process [s]");
    println!("{}", "-".repeat(36));
    for (name, waiting) in stats.station_waiting.iter() {
        let process = stats.station_process.iter().find(|(n, _)| *n == name).map_or(0.0, |(_, p)| p.mean());
        println!("{:<10} {:>12.1} {:>12.1}", name, waiting.mean(), process);
    }
    println!();
    for (name, usage) in stats.resource_usage.iter() {
        println!("{name:<10} busy units on average: {:.3}", usage.time_mean());
    }
    println!("Passengers in the system on average: {:.2}", stats.clients_in_system.time_mean());
    println!("Thread balance: {:.4}", stats.thread_balance);

    std::fs::create_dir_all("output/two-stations")?;
    let mut writer = CsvWriter::create(Path::new(SUMMARY_PATH), None)?;
    write_summary(&stats, &mut writer)?;
    tracing::info!(path = SUMMARY_PATH, "summary written");

    Ok(())
}
