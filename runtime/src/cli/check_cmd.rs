//! Validate a config file and summarize what `run` would do with it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use dropcart::ProxyList;
use serde_json::{json, Value};

use super::output;
use crate::config::{resolve_config_path, Config};

/// Summary of a loaded config.
pub fn report(config: &Config, proxy_lists: &HashMap<String, Arc<ProxyList>>) -> Value {
    let groups: Vec<Value> = config
        .groups
        .iter()
        .map(|g| {
            let tasks: u32 = g.tasks.iter().map(|t| t.count).sum();
            json!({"name": g.name, "tasks": tasks})
        })
        .collect();

    let mut lists: Vec<Value> = proxy_lists
        .iter()
        .map(|(name, list)| json!({"name": name, "proxies": list.len()}))
        .collect();
    lists.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    json!({
        "profiles": config.profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "proxyLists": lists,
        "groups": groups,
        "automations": config.automations.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        "feed": config.feed.as_ref().map(|f| f.url.as_str()),
        "webhook": config.webhook_url.is_some(),
    })
}

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path);
    let config = Config::load(&path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let proxy_lists = config.build_proxy_lists(base_dir)?;
    let summary = report(&config, &proxy_lists);

    if output::is_json() {
        output::print_json(&json!({"config": path.display().to_string(), "summary": summary}));
        return Ok(());
    }

    println!("Config: {}", path.display());
    println!("[OK] {} profile(s)", config.profiles.len());
    for list in summary["proxyLists"].as_array().into_iter().flatten() {
        let count = list["proxies"].as_u64().unwrap_or(0);
        let mark = if count == 0 { "[!!]" } else { "[OK]" };
        println!("{mark} proxy list {}: {count} proxies", list["name"].as_str().unwrap_or(""));
    }
    for group in summary["groups"].as_array().into_iter().flatten() {
        println!(
            "[OK] group {}: {} task(s)",
            group["name"].as_str().unwrap_or(""),
            group["tasks"]
        );
    }
    println!("[OK] {} automation(s)", config.automations.len());
    match &config.feed {
        Some(feed) => println!("[OK] feed: {}", feed.url),
        None if !config.automations.is_empty() => {
            println!("[!!] automations configured but no feed (use `run --feed-stdin`)")
        }
        None => {}
    }
    Ok(())
}
