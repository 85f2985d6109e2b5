//! Product resolution: monitor inputs to a concrete variant.

use dropcart::variants::find_product;
use dropcart::{classify, select_variant, ItemDescriptor, Product, Site, Variant};
use serde::Deserialize;
use url::Url;

use super::http_client::{HttpClient, ACCEPT_JSON};
use crate::error::ResolveError;

/// A resolved purchase target.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Known only when the input was a URL or keywords.
    pub product: Option<Product>,
    pub variant: Variant,
}

#[derive(Deserialize)]
struct ProductsFeed {
    #[serde(default)]
    products: Vec<Product>,
}

/// Resolves monitor inputs against one storefront.
pub struct ProductResolver<'a> {
    client: &'a HttpClient,
    site: &'a Site,
}

impl<'a> ProductResolver<'a> {
    pub fn new(client: &'a HttpClient, site: &'a Site) -> Self {
        Self { client, site }
    }

    /// Resolve the first usable input.
    ///
    /// Variant ids and URLs are tried in input order and the first one
    /// wins; keyword inputs are searched together in a single catalog pass.
    pub async fn resolve(
        &self,
        inputs: &[String],
        sizes: &[String],
    ) -> Result<Resolved, ResolveError> {
        let mut keywords = Vec::new();

        for input in inputs {
            match classify(input) {
                ItemDescriptor::Identifier(raw) => return Self::resolve_identifier(&raw),
                ItemDescriptor::Url(url) => return self.resolve_url(&url, sizes).await,
                ItemDescriptor::Keywords(expr) => keywords.push(expr),
            }
        }

        if keywords.is_empty() {
            return Err(ResolveError::NotFound);
        }
        self.resolve_keywords(&keywords, sizes).await
    }

    fn resolve_identifier(raw: &str) -> Result<Resolved, ResolveError> {
        let id: u64 = raw
            .parse()
            .map_err(|_| ResolveError::InvalidIdentifier(raw.to_string()))?;
        Ok(Resolved {
            product: None,
            variant: Variant::stub(id),
        })
    }

    async fn resolve_url(&self, url: &Url, sizes: &[String]) -> Result<Resolved, ResolveError> {
        let mut product_url = url.clone();
        product_url.set_query(None);
        product_url.set_fragment(None);
        let endpoint = format!("{}.js", product_url.as_str().trim_end_matches('/'));

        let resp = self.client.get(&endpoint, ACCEPT_JSON).await?;
        if resp.status == 404 {
            return Err(ResolveError::NotFound);
        }
        if !resp.is_success() {
            return Err(ResolveError::Status(resp.status));
        }

        let product: Product = serde_json::from_str(&resp.body)?;
        let variant = select_variant(&product.variants, sizes)?.clone();
        Ok(Resolved {
            product: Some(product),
            variant,
        })
    }

    async fn resolve_keywords(
        &self,
        expressions: &[String],
        sizes: &[String],
    ) -> Result<Resolved, ResolveError> {
        let resp = self
            .client
            .get(&self.site.endpoint("/products.json"), ACCEPT_JSON)
            .await?;
        if !resp.is_success() {
            return Err(ResolveError::Status(resp.status));
        }

        let feed: ProductsFeed = serde_json::from_str(&resp.body)?;
        let product = find_product(&feed.products, expressions).ok_or(ResolveError::NotFound)?;
        let variant = select_variant(&product.variants, sizes)?.clone();

        tracing::debug!(site = %self.site.name, "Matched {} ({})", product.title, variant.id);
        Ok(Resolved {
            product: Some(product.clone()),
            variant,
        })
    }
}
