//! Export of a finished run's [`Statistics`] as long-format rows.

use qs_stats::{DataIndicator, Statistics, TimeIndicator};

use crate::OutputResult;
use crate::writer::OutputWriter;

pub const SUMMARY_HEADER: [&str; 4] = ["section", "name", "measure", "value"];

/// One exported number.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub section: &'static str,
    pub name:    String,
    pub measure: &'static str,
    pub value:   f64,
}

impl SummaryRow {
    fn new(section: &'static str, name: &str, measure: &'static str, value: f64) -> Self {
        Self { section, name: name.to_owned(), measure, value }
    }

    pub fn to_record(&self) -> Vec<String> {
        vec![self.section.to_owned(), self.name.clone(), self.measure.to_owned(), self.value.to_string()]
    }
}

fn data(out: &mut Vec<SummaryRow>, section: &'static str, name: &str, d: &DataIndicator) {
    if d.count() == 0 {
        return;
    }
    out.push(SummaryRow::new(section, name, "count", d.count() as f64));
    out.push(SummaryRow::new(section, name, "mean", d.mean()));
    out.push(SummaryRow::new(section, name, "sd", d.sd()));
    out.push(SummaryRow::new(section, name, "min", d.min()));
    out.push(SummaryRow::new(section, name, "max", d.max()));
}

fn time(out: &mut Vec<SummaryRow>, section: &'static str, name: &str, t: &TimeIndicator) {
    out.push(SummaryRow::new(section, name, "mean", t.time_mean()));
    out.push(SummaryRow::new(section, name, "min", t.min() as f64));
    out.push(SummaryRow::new(section, name, "max", t.max() as f64));
}

/// Every indicator worth reporting, in a stable order: run information,
/// clients, stations, resources, transporters.
pub fn summary_rows(stats: &Statistics) -> Vec<SummaryRow> {
    let mut out = Vec::new();
    out.push(SummaryRow::new("run", "", "arrivals", stats.arrivals as f64));
    out.push(SummaryRow::new("run", "", "repetitions", stats.repeat_count as f64));
    out.push(SummaryRow::new("run", "", "threads", stats.threads as f64));
    out.push(SummaryRow::new("run", "", "thread_balance", stats.thread_balance));

    time(&mut out, "clients", "in_system", &stats.clients_in_system);
    data(&mut out, "clients", "waiting", &stats.waiting_all);
    data(&mut out, "clients", "transfer", &stats.transfer_all);
    data(&mut out, "clients", "process", &stats.process_all);
    data(&mut out, "clients", "residence", &stats.residence_all);
    for (name, d) in stats.client_waiting.iter() {
        data(&mut out, "client_waiting", name, d);
    }
    for (name, d) in stats.client_residence.iter() {
        data(&mut out, "client_residence", name, d);
    }
    for (name, v) in stats.client_costs_waiting.iter() {
        out.push(SummaryRow::new("client_costs", name, "waiting", v.value()));
    }
    for (name, v) in stats.client_costs_transfer.iter() {
        out.push(SummaryRow::new("client_costs", name, "transfer", v.value()));
    }
    for (name, v) in stats.client_costs_process.iter() {
        out.push(SummaryRow::new("client_costs", name, "process", v.value()));
    }
    for (path, c) in stats.client_paths.iter() {
        out.push(SummaryRow::new("client_paths", path, "count", c.count() as f64));
    }

    for (name, d) in stats.station_waiting.iter() {
        data(&mut out, "station_waiting", name, d);
    }
    for (name, t) in stats.station_clients.iter() {
        time(&mut out, "station_clients", name, t);
    }
    for (name, c) in stats.station_transitions.iter() {
        out.push(SummaryRow::new("station_transitions", name, "count", c.count() as f64));
    }

    time(&mut out, "resources", "usage_all", &stats.resource_usage_all);
    for (name, t) in stats.resource_usage.iter() {
        time(&mut out, "resource_usage", name, t);
    }
    for (name, t) in stats.resource_count.iter() {
        time(&mut out, "resource_count", name, t);
    }
    for (name, t) in stats.resource_down_time.iter() {
        time(&mut out, "resource_down_time", name, t);
    }
    for (name, v) in stats.resource_costs_active.iter() {
        out.push(SummaryRow::new("resource_costs", name, "active", v.value()));
    }
    for (name, v) in stats.resource_costs_process.iter() {
        out.push(SummaryRow::new("resource_costs", name, "process", v.value()));
    }
    for (name, v) in stats.resource_costs_idle.iter() {
        out.push(SummaryRow::new("resource_costs", name, "idle", v.value()));
    }

    for (name, t) in stats.transporter_usage.iter() {
        time(&mut out, "transporter_usage", name, t);
    }
    for (name, t) in stats.transporter_down_time.iter() {
        time(&mut out, "transporter_down_time", name, t);
    }
    out
}

/// Write the header and all [`summary_rows`] to `writer`, then finish it.
pub fn write_summary(stats: &Statistics, writer: &mut dyn OutputWriter) -> OutputResult<()> {
    writer.write_record(&SUMMARY_HEADER.map(str::to_owned))?;
    for row in summary_rows(stats) {
        writer.write_record(&row.to_record())?;
    }
    writer.finish()
}
