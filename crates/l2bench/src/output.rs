//! Output formatting

use clap::ValueEnum;
use l2bench_dataplane::{GlobalCounters, SweepRecord};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// `<size> <min_rtt_us> <bandwidth>` per line
    Text,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// Print one sweep result to stdout
    pub fn print_record(&self, record: &SweepRecord) {
        match self {
            OutputFormat::Text => println!("{}", record),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(record).unwrap_or_default())
            }
        }
    }

    /// Report forwarder totals: to the log in text mode, to stdout as JSON otherwise
    pub fn print_totals(&self, totals: &GlobalCounters) {
        match self {
            OutputFormat::Text => {
                for line in totals.to_string().lines() {
                    tracing::info!("{}", line);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(totals).unwrap_or_default())
            }
        }
    }
}
