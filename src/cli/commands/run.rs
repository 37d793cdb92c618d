//! Run command implementation.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sentinel_alerts::{
    CooldownSnapshot, Dispatcher, LogNotifier, TelegramNotifier, TemplateSet, WebhookNotifier,
    DEFAULT_TEMPLATE,
};
use sentinel_config::{load_config, NotifierKind, SentinelConfig};
use sentinel_core::traits::{FeedControl, Notifier};
use sentinel_engine::{Pipeline, PipelineConfig};
use sentinel_feed::{load_csv_bars, load_json_lines, ReconnectSupervisor, ReplayFeed};

use crate::cli::RunArgs;

pub async fn run(args: RunArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let (engine, indicators) = config.build_engine().context("Invalid rule configuration")?;
    info!(rules = engine.len(), indicators = indicators.len(), "Rules loaded");

    let notifier = build_notifier(&config, args.dry_run)?;
    notifier
        .check()
        .await
        .with_context(|| format!("Notifier {} is not usable", notifier.name()))?;
    info!(notifier = notifier.name(), "Notifier check passed");
    let default_template = config
        .dispatcher
        .template
        .clone()
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let templates = TemplateSet::new(default_template, engine.templates());
    let dispatcher = Dispatcher::new(notifier, templates, config.dispatcher.dispatcher_config());

    let pipeline = Pipeline::new(
        engine,
        indicators,
        dispatcher,
        PipelineConfig {
            window_capacity: config.feed.window_capacity,
            shards: config.feed.shards,
            shard_queue: config.feed.shard_queue,
            alert_queue: config.dispatcher.queue_capacity,
            default_cooldown: config.cooldown.default_cooldown(),
            ..Default::default()
        },
    );

    if let Some(path) = &config.cooldown.state_file {
        if path.exists() {
            let snapshot = CooldownSnapshot::load(path)
                .with_context(|| format!("Failed to read cooldown state {}", path.display()))?;
            pipeline.deduplicator().restore(snapshot);
        }
    }

    // Feed
    let mut symbols = config.feed.normalized_symbols();
    let messages = match &args.csv_symbol {
        Some(symbol) => {
            let symbol = symbol.trim().to_uppercase();
            symbols.push(symbol.clone());
            load_csv_bars(&args.feed, &symbol)?
        }
        None => load_json_lines(&args.feed)?,
    };
    info!(feed = %args.feed.display(), messages = messages.len(), "Feed loaded");

    let mut replay = ReplayFeed::new(args.feed.display().to_string(), messages);
    if let Some(pace) = config.feed.replay_pace() {
        replay = replay.with_pace(pace);
    }
    let replay = Arc::new(replay);

    let announce = config.notifier.announce;
    if announce {
        let outcome = pipeline
            .dispatcher()
            .announce(&startup_message(&symbols, pipeline.rules().len()))
            .await;
        if !outcome.is_delivered() {
            warn!(?outcome, "Startup notice not delivered");
        }
    }

    let cancel = CancellationToken::new();
    let supervisor = ReconnectSupervisor::new(
        Arc::clone(&replay) as Arc<dyn FeedControl>,
        config.supervisor.backoff,
    )
    .spawn(symbols.clone(), cancel.child_token());

    let (tx, rx) = mpsc::channel(config.feed.ingress_buffer);
    let producer = {
        let replay = Arc::clone(&replay);
        let cancel = cancel.clone();
        tokio::spawn(async move { replay.run(tx, cancel).await })
    };

    // Ctrl-C stops the feed; the pipeline then drains
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                cancel.cancel();
            }
        });
    }

    let snapshot = pipeline.run(rx, Some(&supervisor)).await;
    match producer.await {
        Ok(Ok(sent)) => info!(sent, "Feed finished"),
        Ok(Err(e)) => warn!(error = %e, "Feed stopped early"),
        Err(e) => error!(error = %e, "Feed task failed"),
    }
    supervisor.shutdown().await;

    if announce {
        let outcome = pipeline.dispatcher().announce(&shutdown_message()).await;
        if !outcome.is_delivered() {
            warn!(?outcome, "Shutdown notice not delivered");
        }
    }

    if let Some(path) = &config.cooldown.state_file {
        pipeline
            .deduplicator()
            .snapshot()
            .save(path)
            .with_context(|| format!("Failed to save cooldown state {}", path.display()))?;
        info!(path = %path.display(), "Cooldown state saved");
    }

    snapshot.log_summary();
    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        _ => {
            println!(
                "Events:  {} received, {} applied, {} malformed, {} stale, {} gaps",
                snapshot.events_received,
                snapshot.events_applied,
                snapshot.events_malformed,
                snapshot.events_stale,
                snapshot.sequence_gaps
            );
            println!(
                "Signals: {} fired, {} admitted, {} suppressed, {} rule errors",
                snapshot.signals_fired,
                snapshot.signals_admitted,
                snapshot.signals_suppressed,
                snapshot.rule_errors
            );
            println!(
                "Alerts:  {} delivered, {} failed, {} dropped, {} reconnects",
                snapshot.alerts_delivered,
                snapshot.alerts_failed,
                snapshot.alerts_dropped,
                snapshot.reconnect_attempts
            );
        }
    }

    Ok(())
}

fn startup_message(symbols: &[String], rules: usize) -> String {
    format!(
        "🚀 <b>Sentinel started</b>\n\n⏰ Started at: {}\n📊 Monitoring: {}\n📐 Rules: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        if symbols.is_empty() { "all symbols".to_string() } else { symbols.join(", ") },
        rules
    )
}

fn shutdown_message() -> String {
    format!(
        "🛑 <b>Sentinel stopped</b>\n\n⏰ Stopped at: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn build_notifier(config: &SentinelConfig, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run {
        info!("Dry run, alerts are logged only");
        return Ok(Arc::new(LogNotifier::new()));
    }

    let settings = &config.notifier;
    let notifier: Arc<dyn Notifier> = match settings.kind {
        NotifierKind::Log => Arc::new(LogNotifier::new()),
        NotifierKind::Webhook => {
            let url = settings
                .url
                .clone()
                .context("notifier.url is required for the webhook notifier")?;
            Arc::new(WebhookNotifier::new(url, settings.timeout())?)
        }
        NotifierKind::Telegram => {
            let token = settings.telegram_token()?;
            let notifier = match &settings.base_url {
                Some(base) => TelegramNotifier::with_base_url(base.clone(), token, settings.timeout())?,
                None => TelegramNotifier::new(token, settings.timeout())?,
            };
            Arc::new(notifier)
        }
    };
    info!(notifier = notifier.name(), "Notifier ready");
    Ok(notifier)
}
