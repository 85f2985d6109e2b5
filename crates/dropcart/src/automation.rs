//! Automation rules evaluated against live feed products.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::feed::{LiveProductEvent, LiveVariant};
use crate::keywords::{classify, is_keyword_match};
use crate::variants::size_matches;

/// A declarative rule deciding whether a live product should be bought.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationRule {
    /// Unique name of the rule.
    pub name: String,
    /// Keyword expressions, product URLs, or variant ids.
    pub monitor_inputs: Vec<String>,
    /// Sizes to buy. Empty means any size.
    pub sizes: Vec<String>,
    /// Profiles tasks are spread across.
    pub profiles: Vec<String>,
    pub proxy_list: Option<String>,
    /// Also match keywords against the product handle.
    pub check_url: bool,
    pub price_min: f64,
    pub price_max: f64,
    pub quantity: u32,
    pub total_task_count: u32,
    /// When non-empty, only these sites match and the blacklist is ignored.
    pub site_whitelist: Vec<String>,
    pub site_blacklist: Vec<String>,
    pub payment_retries: u32,
    pub stop_after_minutes: u32,
}

fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

impl AutomationRule {
    /// First variant price within `[price_min, price_max]`.
    pub fn matches_price(&self, event: &LiveProductEvent) -> bool {
        match event.product.first_variant().and_then(|v| v.price) {
            Some(price) => price >= self.price_min && price <= self.price_max,
            None => {
                tracing::debug!(rule = %self.name, "No priced variant on {}", event.product.title);
                false
            }
        }
    }

    /// Store host allowed by the whitelist, or not excluded by the blacklist.
    pub fn matches_site(&self, event: &LiveProductEvent) -> bool {
        let Some(store) = hostname(&event.store) else {
            tracing::warn!(rule = %self.name, "Unparseable store URL: {}", event.store);
            return false;
        };

        if !self.site_whitelist.is_empty() {
            return self
                .site_whitelist
                .iter()
                .any(|site| hostname(site).as_deref() == Some(store.as_str()));
        }

        !self
            .site_blacklist
            .iter()
            .any(|site| hostname(site).as_deref() == Some(store.as_str()))
    }

    /// Any keyword input matching the title, handle, first SKU or first variant name.
    pub fn matches_product(&self, event: &LiveProductEvent) -> bool {
        let product = &event.product;
        let first = product.first_variant();

        self.monitor_inputs
            .iter()
            .filter(|input| classify(input).is_keywords())
            .any(|input| {
                is_keyword_match(&product.title, input)
                    || (self.check_url && is_keyword_match(&product.handle, input))
                    || first.is_some_and(|v| {
                        is_keyword_match(&v.sku, input) || is_keyword_match(&v.name, input)
                    })
            })
    }

    /// Available variants in the rule's size range.
    pub fn matching_size_variants<'a>(&self, event: &'a LiveProductEvent) -> Vec<&'a LiveVariant> {
        event
            .product
            .variants
            .iter()
            .filter(|v| v.available)
            .filter(|v| {
                self.sizes.is_empty() || self.sizes.iter().any(|s| size_matches(&v.title, s))
            })
            .collect()
    }

    /// Full match: price, site, keywords and at least one size.
    pub fn matches(&self, event: &LiveProductEvent) -> bool {
        self.matches_price(event)
            && self.matches_site(event)
            && self.matches_product(event)
            && !self.matching_size_variants(event).is_empty()
    }

    /// Human readable size range.
    pub fn sizes_label(&self) -> String {
        if self.sizes.is_empty() {
            "Random".to_string()
        } else {
            self.sizes.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::LiveProduct;

    fn kith_dunk() -> LiveProductEvent {
        LiveProductEvent {
            store: "https://kith.com/".into(),
            channel: "store".into(),
            event: "newProduct".into(),
            product: LiveProduct {
                title: "Nike Dunk High Retro BTTYS - Noble Green / White".into(),
                handle: "nkdd1399-300".into(),
                variants: vec![LiveVariant {
                    title: "9".into(),
                    name: "Nike Dunk High Retro BTTYS - 9".into(),
                    sku: "DD1399-300-9".into(),
                    available: true,
                    price: Some(124.69),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    fn saint_alfred_retro() -> LiveProductEvent {
        let sizes = [
            ("8", true),
            ("8.5", true),
            ("9", true),
            ("9.5", true),
            ("10", false),
            ("10.5", false),
            ("11", false),
        ];
        LiveProductEvent {
            store: "https://www.saintalfred.com/".into(),
            channel: "store".into(),
            event: "newProduct".into(),
            product: LiveProduct {
                title: "12 RETRO".into(),
                handle: "12-retro-6".into(),
                variants: sizes
                    .iter()
                    .enumerate()
                    .map(|(i, (size, available))| LiveVariant {
                        id: i as u64,
                        title: size.to_string(),
                        name: format!("12 RETRO - {size}"),
                        sku: format!("CT8013-071-{size}"),
                        available: *available,
                        price: Some(200.0),
                    })
                    .collect(),
                ..Default::default()
            },
        }
    }

    fn rule(inputs: &[&str]) -> AutomationRule {
        AutomationRule {
            name: "test".into(),
            monitor_inputs: inputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_kith_dunk_full_match() {
        let mut r = rule(&["+dunk,+high,+bttys"]);
        r.price_min = 90.0;
        r.price_max = 125.0;
        let event = kith_dunk();
        assert!(r.matches_price(&event));
        assert!(r.matches_product(&event));
        assert!(r.matches_site(&event));
        assert!(r.matches(&event));
    }

    #[test]
    fn test_handle_only_with_check_url() {
        let mut r = rule(&["+nkdd1399,+300"]);
        assert!(!r.matches_product(&kith_dunk()));
        r.check_url = true;
        assert!(r.matches_product(&kith_dunk()));
    }

    #[test]
    fn test_sku_match() {
        assert!(rule(&["+dd1399-300"]).matches_product(&kith_dunk()));
    }

    #[test]
    fn test_non_keyword_inputs_never_match() {
        assert!(!rule(&["39654439321703"]).matches_product(&kith_dunk()));
        assert!(!rule(&[]).matches_product(&kith_dunk()));
    }

    #[test]
    fn test_price_band() {
        let mut r = rule(&["+dunk"]);
        r.price_min = 130.0;
        r.price_max = 200.0;
        assert!(!r.matches_price(&kith_dunk()));

        let mut no_variants = kith_dunk();
        no_variants.product.variants.clear();
        r.price_min = 0.0;
        assert!(!r.matches_price(&no_variants));
    }

    #[test]
    fn test_whitelist_ignores_blacklist() {
        let mut r = rule(&[]);
        r.site_whitelist = vec!["https://www.shoepalace.com".into()];
        r.site_blacklist = vec!["https://www.shoepalace.com".into()];

        let mut event = kith_dunk();
        event.store = "https://www.shoepalace.com/".into();
        assert!(r.matches_site(&event));

        assert!(!r.matches_site(&kith_dunk()));
    }

    #[test]
    fn test_blacklist() {
        let mut r = rule(&[]);
        r.site_blacklist = vec!["https://kith.com".into()];
        assert!(!r.matches_site(&kith_dunk()));

        let mut event = kith_dunk();
        event.store = "https://www.shoepalace.com/".into();
        assert!(r.matches_site(&event));

        event.store = "not a url".into();
        assert!(!r.matches_site(&event));
    }

    #[test]
    fn test_matching_size_variants() {
        let event = saint_alfred_retro();
        let mut r = rule(&["+retro"]);
        assert_eq!(r.matching_size_variants(&event).len(), 4);

        r.sizes = vec!["9".into(), "8".into()];
        let mut titles: Vec<&str> = r
            .matching_size_variants(&event)
            .iter()
            .map(|v| v.title.as_str())
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["8", "9"]);

        r.sizes = vec!["10".into()];
        assert!(r.matching_size_variants(&event).is_empty());
    }

    #[test]
    fn test_sizes_label() {
        let mut r = rule(&[]);
        assert_eq!(r.sizes_label(), "Random");
        r.sizes = vec!["9".into(), "10".into()];
        assert_eq!(r.sizes_label(), "9, 10");
    }
}
