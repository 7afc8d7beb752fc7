use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use netmon_core::capture::{Dispatcher, LifecycleEvent, RequestRecord, RowSink, RowUpdate, TabId};
use netmon_core::export::curl_command;
use netmon_core::settings::{KindFilter, ViewSettings};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::ReplayArgs;

/// Keeps the rows the dispatcher currently shows.
#[derive(Default)]
struct TableSink {
    rows: Mutex<Vec<RequestRecord>>,
}

impl TableSink {
    fn rows(&self) -> Vec<RequestRecord> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl RowSink for TableSink {
    fn add_rows(&self, rows: Vec<RequestRecord>) {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).extend(rows);
    }

    fn update_row(&self, update: RowUpdate) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(row) = rows.iter_mut().find(|row| row.id == update.row.id) {
            *row = update.row;
        }
    }

    fn reset(&self, rows: Vec<RequestRecord>) {
        *self.rows.lock().unwrap_or_else(PoisonError::into_inner) = rows;
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read events from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read event file '{input}'"))
}

/// Parses JSON-lines events; malformed lines are skipped with a warning.
fn parse_events(raw: &str) -> Vec<LifecycleEvent> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping malformed event");
                None
            }
        })
        .collect()
}

fn format_row(row: &RequestRecord) -> String {
    let status = row.status.map_or_else(|| "-".to_string(), |s| s.to_string());
    let content_type = if row.content_type.is_empty() { "-" } else { &row.content_type };
    format!(
        "{}\t{}\t{status}\t{}\t{}\t{}\t{content_type}\t{}",
        row.id.as_str(),
        row.tab_id.0,
        row.method,
        row.kind.as_str(),
        row.size,
        row.url
    )
}

pub async fn run_replay_command(args: ReplayArgs) -> Result<()> {
    let kinds = match &args.kinds {
        Some(list) => KindFilter::parse_list(list).map_err(|label| anyhow!("unknown kind '{label}'"))?,
        None => KindFilter::all(),
    };
    let view = ViewSettings {
        kinds,
        tab_filter: args.tab.map(TabId),
    };

    let events = parse_events(&read_input(&args.input)?);
    debug!(events = events.len(), "replaying events");

    let sink = Arc::new(TableSink::default());
    let dispatcher = Dispatcher::new(sink.clone(), view);
    let (sender, receiver) = mpsc::unbounded_channel();
    for event in events {
        sender.send(event).context("event channel closed")?;
    }
    drop(sender);
    dispatcher.run(receiver).await;

    for row in sink.rows() {
        if args.curl {
            println!("{}", curl_command(&row));
        } else {
            println!("{}", format_row(&row));
        }
    }
    Ok(())
}
