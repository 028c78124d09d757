//! pagepulse - record pageviews and events from the command line
//!
//! Observations are queued in the durable store and delivered to the
//! collector with `pagepulse flush`. Nothing is sent until then, so the CLI
//! works offline.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/pagepulse/state.db (~/.local/share/pagepulse/state.db)
//! - Config: $XDG_CONFIG_HOME/pagepulse/config.toml (~/.config/pagepulse/config.toml)
//! - Logs: $XDG_STATE_HOME/pagepulse/pagepulse.log

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pagepulse_core::queue::EventQueue;
use pagepulse_core::store::{SESSION_KEY, USER_ID_KEY};
use pagepulse_core::{
    Config, EventOptions, FlushOutcome, PageviewOptions, QueuedEvent, Session, SkipReason,
    SqliteStore, StaticEnvironment, Store, Tracker,
};

#[derive(Parser)]
#[command(name = "pagepulse")]
#[command(about = "Record pageviews and events, deliver them in batches")]
#[command(version)]
struct Args {
    /// Verbose output (writes the log file)
    #[arg(short, long)]
    verbose: bool,

    /// Site identifier (overrides tracker.site_id)
    #[arg(long, global = true)]
    site_id: Option<String>,

    /// Collector event endpoint (overrides tracker.event_endpoint)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration, identity, session and queue state
    Status,

    /// Queue a pageview
    Pageview {
        /// Page path (default: page.path from config)
        path: Option<String>,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// Referrer
        #[arg(long)]
        referrer: Option<String>,

        /// Content type of the page
        #[arg(long)]
        content_type: Option<String>,

        /// Mark as a virtual (in-app) pageview
        #[arg(long = "virtual")]
        is_virtual: bool,
    },

    /// Queue a custom event
    Event {
        /// Event name
        name: String,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        label: Option<String>,

        #[arg(long)]
        value: Option<f64>,

        /// Extra property as key=value (repeatable; JSON values are parsed)
        #[arg(short, long = "prop", value_parser = parse_property)]
        props: Vec<(String, serde_json::Value)>,
    },

    /// Deliver queued events to the collector
    Flush,

    /// List queued events
    Queue {
        /// Print the queue as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_property(raw: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err("property key must not be empty".to_string());
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(site_id) = args.site_id {
        config.tracker.site_id = site_id;
    }
    if let Some(endpoint) = args.endpoint {
        config.tracker.event_endpoint = endpoint;
    }

    let _log_guard = if args.verbose {
        let guard = pagepulse_core::logging::init(&config.logging)
            .context("failed to initialize logging")?;
        Some(guard)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Pageview {
            path,
            title,
            referrer,
            content_type,
            is_virtual,
        } => {
            let opts = PageviewOptions {
                path,
                content_type,
                referrer,
                language: None,
                title,
                is_virtual,
            };
            cmd_pageview(&config, opts)
        }
        Command::Event {
            name,
            category,
            label,
            value,
            props,
        } => {
            let mut opts = EventOptions::new(name);
            opts.event_category = category;
            opts.event_label = label;
            opts.event_value = value;
            for (key, value) in props {
                opts = opts.property(key, value);
            }
            cmd_event(&config, opts)
        }
        Command::Flush => cmd_flush(&config).await,
        Command::Queue { json } => cmd_queue(json),
    }
}

/// Build a tracker that only queues; delivery happens in `flush`
fn open_tracker(config: &Config) -> Result<Tracker> {
    let mut tracker_config = config.tracker.clone();
    tracker_config.manual_flush = true;
    tracker_config.auto_track = false;
    tracker_config.enable_offline_tracking = true;

    let db_path = Config::database_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;

    Tracker::builder(tracker_config)
        .store(Arc::new(store))
        .environment(Arc::new(StaticEnvironment::new(config.page.clone())))
        .build()
        .context("failed to start tracker")
}

/// Open the store only if it already exists
fn existing_store() -> Result<Option<SqliteStore>> {
    let db_path = Config::database_path();
    if !db_path.exists() {
        return Ok(None);
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    Ok(Some(store))
}

fn cmd_status(config: &Config) -> Result<()> {
    let tracker = &config.tracker;

    println!("pagepulse Configuration");
    println!("=======================");
    println!();
    println!(
        "Site ID:         {}",
        if tracker.site_id.is_empty() {
            "<not set>"
        } else {
            tracker.site_id.as_str()
        }
    );
    println!("Batch Endpoint:  {}", tracker.batch_endpoint());
    println!("Batch Size:      {}", tracker.batch_size);
    println!("Sampling Rate:   {}%", tracker.sampling_rate);
    println!("Session Timeout: {}m", tracker.session_timeout_minutes);

    println!();
    let db_path = Config::database_path();
    println!("Store:           {}", db_path.display());

    let Some(store) = existing_store()? else {
        println!("User ID:         <not assigned>");
        println!("Queued Events:   0");
        return Ok(());
    };

    let user_id = store.get(USER_ID_KEY)?;
    println!(
        "User ID:         {}",
        user_id.as_deref().unwrap_or("<not assigned>")
    );

    let session = store
        .get(SESSION_KEY)?
        .and_then(|raw| serde_json::from_str::<Session>(&raw).ok());
    match session {
        Some(session) => {
            let expired = session.is_expired(chrono::Utc::now(), tracker.session_timeout());
            println!(
                "Session:         {}{}",
                session.id,
                if expired { " (expired)" } else { "" }
            );
            println!(
                "  Started:       {}",
                session.start_time.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Last Activity: {}",
                session.last_activity.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Observations:  {} pageview(s), {} event(s)",
                session.pageview_count, session.event_count
            );
        }
        None => println!("Session:         <none>"),
    }

    let queue = EventQueue::rehydrate(Arc::new(store), false);
    println!("Queued Events:   {}", queue.len());
    if !queue.is_empty() {
        println!();
        println!("Run 'pagepulse flush' to deliver them.");
    }

    Ok(())
}

fn cmd_pageview(config: &Config, opts: PageviewOptions) -> Result<()> {
    let tracker = open_tracker(config)?;
    tracker.track_pageview(opts)?;
    println!(
        "Queued pageview ({} event(s) pending)",
        tracker.queue_status().queue_length
    );
    Ok(())
}

fn cmd_event(config: &Config, opts: EventOptions) -> Result<()> {
    let tracker = open_tracker(config)?;
    let name = opts.event_name.clone();
    tracker.track_event(opts)?;
    println!(
        "Queued event '{}' ({} event(s) pending)",
        name,
        tracker.queue_status().queue_length
    );
    Ok(())
}

async fn cmd_flush(config: &Config) -> Result<()> {
    let tracker = open_tracker(config)?;

    let pending = tracker.queue_status().queue_length;
    if pending > 0 {
        println!(
            "Flushing {} pending event(s) to {}...",
            pending,
            tracker.config().batch_endpoint()
        );
    }

    match tracker.flush(false).await {
        FlushOutcome::Sent { events } => {
            println!("Flushed {} event(s)", events);
            Ok(())
        }
        FlushOutcome::Skipped(SkipReason::Empty) => {
            println!("No pending events to flush.");
            Ok(())
        }
        FlushOutcome::Skipped(reason) => {
            println!("Flush skipped: {:?}", reason);
            Ok(())
        }
        FlushOutcome::Requeued { events } => {
            bail!(
                "delivery failed, {} event(s) kept in queue (run with --verbose for details)",
                events
            )
        }
        FlushOutcome::Dispatched { events, .. } => {
            println!("Dispatched {} event(s)", events);
            Ok(())
        }
    }
}

fn cmd_queue(json: bool) -> Result<()> {
    let events = match existing_store()? {
        Some(store) => EventQueue::rehydrate(Arc::new(store), false).snapshot(),
        None => Vec::new(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{:<10} {:<24} {:>24}", "Type", "Name / Path", "Queued At");
    println!("{:-<60}", "");
    for event in &events {
        let label = match event {
            QueuedEvent::Pageview(pv) => pv.path.as_str(),
            QueuedEvent::Event(ev) => ev.event_name.as_str(),
        };
        let queued_at = chrono::DateTime::from_timestamp_millis(event.timestamp())
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| event.timestamp().to_string());
        println!(
            "{:<10} {:<24} {:>24}",
            event.kind().as_str(),
            label,
            queued_at
        );
    }
    println!();
    println!("{} event(s) queued", events.len());

    Ok(())
}
