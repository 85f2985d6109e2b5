//! Classify monitor inputs and optionally test keywords against a title.

use anyhow::Result;
use dropcart::{classify, is_keyword_match, ItemDescriptor};
use serde_json::{json, Value};

use super::output;

/// Describe how one input would be monitored.
pub fn describe(input: &str, title: Option<&str>) -> Value {
    let descriptor = classify(input);
    let mut value = match &descriptor {
        ItemDescriptor::Identifier(id) => json!({
            "kind": "variant",
            "value": id,
            "numeric": id.parse::<u64>().is_ok(),
        }),
        ItemDescriptor::Url(url) => json!({"kind": "url", "value": url.as_str()}),
        ItemDescriptor::Keywords(expr) => {
            let terms: Vec<&str> = expr
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            json!({
                "kind": "keywords",
                "value": expr,
                "positive": terms.iter().filter_map(|t| t.strip_prefix('+')).collect::<Vec<_>>(),
                "negative": terms.iter().filter_map(|t| t.strip_prefix('-')).collect::<Vec<_>>(),
            })
        }
    };

    if let (ItemDescriptor::Keywords(expr), Some(title)) = (&descriptor, title) {
        value["title"] = json!(title);
        value["matches"] = json!(is_keyword_match(title, expr));
    }
    value
}

pub async fn run(inputs: &[String], title: Option<&str>) -> Result<()> {
    for input in inputs {
        let value = describe(input, title);
        if output::is_json() {
            output::print_json(&value);
            continue;
        }

        let kind = value["kind"].as_str().unwrap_or("unknown");
        println!("{input}");
        println!("  kind: {kind}");
        if kind == "variant" && value["numeric"] == json!(false) {
            println!("  [!!] not a numeric variant id");
        }
        if let Some(matches) = value["matches"].as_bool() {
            let verdict = if matches { "match" } else { "no match" };
            println!("  {verdict}: {}", title.unwrap_or_default());
        }
    }
    Ok(())
}
