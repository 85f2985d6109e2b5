//! Run configured task groups and feed-driven automations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::task::JoinHandle;

use super::output;
use crate::checkout::{CheckoutOptions, CheckoutTask};
use crate::config::{resolve_config_path, Config};
use crate::events::EventBus;
use crate::feed::{feed_channel, FeedClient, FeedDispatcher, StdinFeed};
use crate::notify::{MultiNotifier, Notifier, TracingNotifier, WebhookNotifier};
use crate::orchestrator::{Manager, TaskGroup, TaskRunner};

/// Where live products come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    None,
    Stdin,
    WebSocket,
}

impl FeedSource {
    pub fn select(config: &Config, stdin: bool) -> Self {
        if stdin {
            FeedSource::Stdin
        } else if config.feed.is_some() {
            FeedSource::WebSocket
        } else {
            FeedSource::None
        }
    }
}

/// Log sink plus the webhook when one is configured.
pub fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let mut sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(TracingNotifier)];
    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(WebhookNotifier::new(url.clone())));
    }
    Arc::new(MultiNotifier::new(sinks))
}

/// Register the selected groups (all when `only` is empty) and the
/// automations. Returns the registered group names.
pub async fn build_manager(
    config: &Config,
    base_dir: &Path,
    only: &[String],
    manager: &Manager<CheckoutTask>,
    notifier: Arc<dyn Notifier>,
) -> Result<Vec<String>> {
    for name in only {
        if !config.groups.iter().any(|g| &g.name == name) {
            bail!("no group named '{name}' in config");
        }
    }

    let proxy_lists = config.build_proxy_lists(base_dir)?;
    let options = CheckoutOptions {
        timings: config.timings,
        deposit_url: config.deposit_url.clone(),
    };

    let mut names = Vec::new();
    for group in &config.groups {
        if !only.is_empty() && !only.contains(&group.name) {
            continue;
        }
        let mut tasks = TaskGroup::new(&group.name);
        tasks.extend(
            config
                .task_settings(group, &proxy_lists)?
                .into_iter()
                .map(|settings| {
                    CheckoutTask::new(
                        settings,
                        options.clone(),
                        notifier.clone(),
                        manager.events().clone(),
                    )
                }),
        );
        if manager.add_group(tasks).await {
            names.push(group.name.clone());
        }
    }

    for rule in &config.automations {
        manager.add_automation(rule.clone()).await;
    }
    Ok(names)
}

fn spawn_feed(
    config: &Config,
    source: FeedSource,
    dispatcher: FeedDispatcher,
    events: Arc<EventBus>,
) -> Option<JoinHandle<()>> {
    match (source, &config.feed) {
        (FeedSource::Stdin, _) => Some(tokio::spawn(async move {
            let handled = StdinFeed::new(dispatcher).run().await;
            tracing::info!("Feed input ended after {handled} messages");
        })),
        (FeedSource::WebSocket, Some(feed)) => {
            let client = FeedClient::new(feed.clone(), dispatcher, events);
            Some(tokio::spawn(client.run()))
        }
        _ => None,
    }
}

/// Print every event as a JSON line until the bus closes.
fn spawn_event_printer(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_value(&event) {
                    Ok(value) => output::print_json(&value),
                    Err(e) => tracing::warn!("Failed to encode event: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event printer lagged, dropped {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub async fn run(
    config_path: Option<&Path>,
    groups: &[String],
    feed_stdin: bool,
    print_events: bool,
) -> Result<()> {
    let path = resolve_config_path(config_path);
    let config = Config::load(&path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    tracing::info!("Loaded config {}", path.display());

    let events = Arc::new(EventBus::default());
    let printer = print_events.then(|| spawn_event_printer(&events));
    let notifier = build_notifier(&config);
    let manager = Arc::new(Manager::<CheckoutTask>::new(notifier.clone(), events.clone()));
    let names = build_manager(&config, base_dir, groups, &manager, notifier).await?;

    let source = FeedSource::select(&config, feed_stdin);
    let (products_tx, products_rx) = feed_channel();
    let listener = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.listen_for_products(products_rx).await })
    };
    let feed = if config.automations.is_empty() && source == FeedSource::None {
        drop(products_tx);
        None
    } else {
        if source == FeedSource::None {
            tracing::warn!("Automations configured but no feed source");
        }
        spawn_feed(&config, source, FeedDispatcher::new(products_tx), events.clone())
    };

    let mut started = 0;
    for name in &names {
        started += manager.start_group(name).await;
    }
    tracing::info!(groups = names.len(), tasks = started, "Started tasks");

    if started == 0 && feed.is_none() {
        bail!("nothing to run: no tasks selected and no feed configured");
    }

    let finished = async {
        if started > 0 {
            manager.wait().await;
        }
        if let Some(feed) = feed {
            feed.await.ok();
        }
    };
    tokio::select! {
        _ = finished => tracing::info!("All tasks finished"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, stopping tasks"),
    }

    manager.stop_all().await;
    manager.wait().await;
    listener.abort();

    for name in &names {
        let Some(group) = manager.get_group(name).await else {
            continue;
        };
        for task in group.tasks() {
            let status = task.status();
            if !output::is_json() && !print_events {
                println!("{name} {} [{}] {}", task.id(), status.state, status.message);
            }
        }
    }

    if let Some(printer) = printer {
        // Let the printer drain what the shutdown emitted.
        tokio::task::yield_now().await;
        printer.abort();
    }
    Ok(())
}
