//! Run summary: counters accumulated while splitting, reported once at the end

use std::collections::BTreeMap;
use std::time::Duration;

use cardsplit_core::{fmt_mb, fmt_num};
use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::key::{DerivedKey, FieldIssue, PartitionKey, UNKNOWN_COUNTRY, UNKNOWN_MONTH};

/// Counters for one split run.
///
/// Built incrementally; also returned (partially filled) when a run fails.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// Records routed to an output file
    pub records: u64,
    /// Records with at least one sentinel key field
    pub degraded: u64,
    pub country_missing: u64,
    pub country_invalid: u64,
    pub date_missing: u64,
    pub date_invalid: u64,
    /// Records per partition
    pub partitions: BTreeMap<PartitionKey, u64>,
    /// Output files from an earlier run that were appended to
    pub files_resumed: usize,
    /// Files closed early to stay under `max_open_files`
    pub evictions: usize,
    /// Source bytes consumed (compressed bytes for `.gz`)
    pub bytes_read: u64,
    pub elapsed: Duration,
}

impl Summary {
    /// Count one routed record.
    pub fn record(&mut self, derived: &DerivedKey) {
        self.records += 1;
        *self.partitions.entry(derived.key.clone()).or_default() += 1;

        let d = &derived.degradation;
        if d.is_degraded() {
            self.degraded += 1;
        }
        match d.country {
            Some(FieldIssue::Missing) => self.country_missing += 1,
            Some(FieldIssue::Invalid) => self.country_invalid += 1,
            None => {}
        }
        match d.date {
            Some(FieldIssue::Missing) => self.date_missing += 1,
            Some(FieldIssue::Invalid) => self.date_invalid += 1,
            None => {}
        }
    }

    /// Distinct partitions written
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Distinct months (including `unknown`)
    pub fn month_count(&self) -> usize {
        let mut months: Vec<&str> = self.partitions.keys().map(|k| k.month.as_str()).collect();
        months.dedup();
        months.len()
    }

    /// Records routed to a sentinel country or month
    pub fn sentinel_records(&self) -> u64 {
        self.partitions
            .iter()
            .filter(|(k, _)| k.country == UNKNOWN_COUNTRY || k.month == UNKNOWN_MONTH)
            .map(|(_, n)| n)
            .sum()
    }

    /// Largest partitions, biggest first
    pub fn top_partitions(&self, n: usize) -> Vec<(&PartitionKey, u64)> {
        let mut all: Vec<_> = self.partitions.iter().map(|(k, v)| (k, *v)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all.truncate(n);
        all
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Split").fg(Color::Cyan).add_attribute(Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        let row = |table: &mut Table, label: &str, value: u64| {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(fmt_num(value)),
                Cell::new(format!("{:.2}", pct(value, self.records))),
            ]);
        };

        table.add_row(vec![
            Cell::new("Records"),
            Cell::new(fmt_num(self.records)),
            Cell::new(""),
        ]);
        row(&mut table, "Degraded", self.degraded);
        row(&mut table, "  country missing", self.country_missing);
        row(&mut table, "  country invalid", self.country_invalid);
        row(&mut table, "  date missing", self.date_missing);
        row(&mut table, "  date invalid", self.date_invalid);
        table.add_row(vec![
            Cell::new("Partitions"),
            Cell::new(format!(
                "{} ({} months)",
                fmt_num(self.partition_count() as u64),
                self.month_count()
            )),
            Cell::new(""),
        ]);
        if self.files_resumed > 0 {
            table.add_row(vec![
                Cell::new("Files appended"),
                Cell::new(fmt_num(self.files_resumed as u64)),
                Cell::new(""),
            ]);
        }
        if self.evictions > 0 {
            table.add_row(vec![
                Cell::new("Files evicted"),
                Cell::new(fmt_num(self.evictions as u64)),
                Cell::new(""),
            ]);
        }
        table.add_row(vec![
            Cell::new("Read"),
            Cell::new(fmt_mb(self.bytes_read)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed").fg(Color::Green),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())).fg(Color::Green),
            Cell::new(""),
        ]);

        table.to_string()
    }

    /// Log the summary (one line, non-TTY friendly).
    pub fn log(&self) {
        log::info!(
            "Split: {} records into {} files ({} degraded) [{:.1}s]",
            fmt_num(self.records),
            fmt_num(self.partition_count() as u64),
            fmt_num(self.degraded),
            self.elapsed.as_secs_f64()
        );
        for (key, count) in self.top_partitions(5) {
            log::debug!("  {key}: {}", fmt_num(count));
        }
    }
}

fn pct(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
