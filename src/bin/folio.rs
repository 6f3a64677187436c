//! Folio CLI: drive a simulated page session against in-memory collaborators.
//!
//! Usage:
//!   folio simulate --page <url> [--existing N] [--fail-persistence] [--share] [--config path]
//!   folio config show [--config path]

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use folio::bus::drain;
use folio::cache::{generate_annotation_local_id, Anchor, CacheEvent};
use folio::gateway::{
    AnnotationRecord, ListRecord, MemoryAnchoring, MemoryLoader, MemoryPersistence,
    MemoryPreferences, Selection,
};
use folio::logging::init_logging;
use folio::{FolioConfig, PageInfo, PageSession, PageSessionDeps, PrivacyLevel};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "folio",
    version,
    about = "Per-page annotation cache and in-page UI orchestration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Hydrate a page, create a highlight and report what happened
    Simulate {
        /// URL of the simulated page
        #[arg(long)]
        page: String,
        /// Number of stored annotations to hydrate
        #[arg(long, default_value_t = 3)]
        existing: usize,
        /// Make every storage write fail
        #[arg(long)]
        fail_persistence: bool,
        /// Share the new highlight
        #[arg(long)]
        share: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as YAML
    Show,
}

fn seed_store(store: &MemoryPersistence, page: &PageInfo, existing: usize) {
    store.insert_list(ListRecord {
        local_id: 1,
        remote_id: None,
        name: "Reading list".into(),
        description: None,
    });
    store.add_page_to_list(page.full_page_url.clone(), 1);

    let base = Utc::now() - Duration::hours(1);
    for i in 0..existing {
        let created_when = base + Duration::seconds(i as i64);
        let quote = format!("Existing highlight {}", i + 1);
        store.insert_annotation(
            page.full_page_url.clone(),
            AnnotationRecord {
                local_id: generate_annotation_local_id(
                    &page.full_page_url,
                    created_when.timestamp_millis(),
                ),
                remote_id: None,
                body: Some(quote.clone()),
                comment: None,
                selector: Some(Anchor::new(quote)),
                color: None,
                created_when,
                last_edited: created_when,
                privacy_level: PrivacyLevel::Private,
                local_list_ids: if i % 2 == 0 { vec![1] } else { Vec::new() },
            },
        );
    }
}

fn count_kinds(events: &[CacheEvent]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.kind()).or_insert(0) += 1;
    }
    counts
}

async fn simulate(config: &FolioConfig, url: &str, existing: usize, fail: bool, share: bool) -> i32 {
    let page = PageInfo::from_url(url);
    let store = Arc::new(MemoryPersistence::new());
    seed_store(&store, &page, existing);
    store.set_fail_writes(fail);

    let session = PageSession::new(
        page.clone(),
        PageSessionDeps {
            anchoring: Arc::new(MemoryAnchoring::new()),
            persistence: store.clone(),
            preferences: Arc::new(MemoryPreferences::new(config.auto_share)),
            loader: Arc::new(MemoryLoader::new()),
            user: None,
        },
        config,
    );
    let mut cache_events = session.cache().events().subscribe();
    let mut ui_events = session.ui().subscribe();

    let summary = match session.hydrate().await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: hydration failed: {}", e);
            return 1;
        }
    };
    let hydration_events = drain(&mut cache_events);
    println!("Page:        {}", page.normalized_page_url);
    println!(
        "Hydrated:    {} annotations, {} lists ({} cache events)",
        summary.annotations,
        summary.lists,
        hydration_events.len()
    );

    match session.ui().show_highlights().await {
        Ok(true) => println!("Highlights:  shown"),
        Ok(false) => println!("Highlights:  nothing to draw"),
        Err(e) => eprintln!("Warning: highlights unavailable: {}", e),
    }

    let selection = Selection::new("Selected text from the page");
    let should_share = share.then_some(true);
    let created = match session
        .pipeline()
        .create_highlight(Some(&selection), should_share)
        .await
    {
        Ok(Some(created)) => created,
        Ok(None) => {
            eprintln!("Error: selection produced no annotation");
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let id = created.unified_id.clone();
    println!(
        "Created:     {} (cached before save: {})",
        id,
        session.cache().has_annotation(&id)
    );

    let code = match created.persisted().await {
        Ok(saved) => {
            let remote = saved
                .remote_id
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".into());
            println!("Saved:       remote id {}", remote);
            0
        }
        Err(e) => {
            println!(
                "Rolled back: {} (still cached: {})",
                e,
                session.cache().has_annotation(&id)
            );
            2
        }
    };

    println!();
    println!("{:<28}  {:>5}", "CACHE EVENT", "COUNT");
    println!("{}", "-".repeat(35));
    for (kind, count) in count_kinds(&drain(&mut cache_events)) {
        println!("{:<28}  {:>5}", kind, count);
    }
    println!();
    println!("UI events:   {}", drain(&mut ui_events).len());
    println!("Annotations: {}", session.cache().annotation_count());
    println!("State:       {:?}", session.pipeline().creation_state());
    if let Some(error) = session.ui().error() {
        println!("Error shown: {}", error);
    }
    code
}

fn cmd_simulate(config: &FolioConfig, url: &str, existing: usize, fail: bool, share: bool) -> i32 {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 1;
        }
    };
    runtime.block_on(simulate(config, url, existing, fail, share))
}

fn cmd_config_show(config: &FolioConfig) -> i32 {
    match config.to_yaml() {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match FolioConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level);

    let code = match cli.command {
        Commands::Simulate {
            page,
            existing,
            fail_persistence,
            share,
        } => cmd_simulate(&config, &page, existing, fail_persistence, share),
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config),
        },
    };
    std::process::exit(code);
}
