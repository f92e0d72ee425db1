//! The per-epoch metrics table.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use log::warn;

use crate::error::Result;

const MAX_KEY_WIDTH: usize = 30;

/// Accumulates `key = value` records and flushes them as one row per epoch.
///
/// Flushing prints an aligned table to stdout and, when a log directory was given,
/// appends a row to its `progress.csv`.
#[derive(Debug, Default)]
pub struct TabularLogger {
    records: Vec<(String, f64)>,
    csv: Option<CsvOutput>,
}

#[derive(Debug)]
struct CsvOutput {
    writer: BufWriter<File>,
    keys: Option<Vec<String>>,
}

impl TabularLogger {
    /// Creates a logger that only prints to stdout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logger that also writes `progress.csv` inside `dir`.
    ///
    /// # Errors
    /// An io error if the directory or the file cannot be created.
    pub fn with_csv(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join("progress.csv"))?;

        Ok(Self {
            records: Vec::new(),
            csv: Some(CsvOutput {
                writer: BufWriter::new(file),
                keys: None,
            }),
        })
    }

    /// Records `value` under `key`, replacing any value recorded earlier this round.
    pub fn record(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        match self.records.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.records.push((key, value)),
        }
    }

    pub fn records(&self) -> &[(String, f64)] {
        &self.records
    }

    /// Drains the records without writing them anywhere.
    pub fn take(&mut self) -> Vec<(String, f64)> {
        std::mem::take(&mut self.records)
    }

    /// Prints the records as a table, appends them to the csv output and drains them.
    ///
    /// # Returns
    /// The drained records.
    pub fn dump(&mut self) -> Result<Vec<(String, f64)>> {
        let records = self.take();
        if records.is_empty() {
            return Ok(records);
        }

        print!("{}", render(&records));
        if let Some(csv) = &mut self.csv {
            csv.append(&records)?;
        }

        Ok(records)
    }
}

impl CsvOutput {
    fn append(&mut self, records: &[(String, f64)]) -> Result<()> {
        if self.keys.is_none() {
            let keys: Vec<_> = records.iter().map(|(k, _)| k.clone()).collect();
            writeln!(self.writer, "{}", keys.join(","))?;
            self.keys = Some(keys);
        }

        let Some(keys) = &self.keys else {
            return Ok(());
        };

        for (key, _) in records.iter().filter(|(k, _)| !keys.contains(k)) {
            warn!("metric {key} appeared after the csv header was written, skipping it");
        }

        let row: Vec<_> = keys
            .iter()
            .map(|key| {
                records
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            })
            .collect();

        writeln!(self.writer, "{}", row.join(","))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Renders records as a two column table.
pub fn render(records: &[(String, f64)]) -> String {
    let rows: Vec<_> = records
        .iter()
        .map(|(k, v)| (truncate(k), format_value(*v)))
        .collect();

    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let val_width = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let dashes = "-".repeat(key_width + val_width + 7);

    let mut out = format!("{dashes}\n");
    for (k, v) in rows {
        out.push_str(&format!("| {k:<key_width$} | {v:<val_width$} |\n"));
    }
    out.push_str(&dashes);
    out.push('\n');
    out
}

fn truncate(key: &str) -> String {
    if key.chars().count() > MAX_KEY_WIDTH {
        let head: String = key.chars().take(MAX_KEY_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        key.to_string()
    }
}

fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if value.fract() == 0.0 && magnitude < 1e9 {
        format!("{value:.0}")
    } else if magnitude != 0.0 && !(1e-3..1e4).contains(&magnitude) {
        format!("{value:.3e}")
    } else {
        format!("{value:.4}")
    }
}
