//! Async storefront HTTP client wrapping reqwest.
//!
//! One client per task: it owns the cookie jar (cart, checkout and queue
//! cookies live here) and the proxy chosen when the task started. Two
//! reqwest clients share the jar: one follows redirects, one does not
//! (checkout creation reads the `Location` header itself).

use std::sync::Arc;
use std::time::Duration;

use dropcart::{Page, Proxy};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, LOCATION, REFERER};
use reqwest::redirect::Policy;
use serde::Serialize;
use url::Url;

/// Accept header for HTML documents.
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
/// Accept header for JSON endpoints.
pub const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Response from a storefront request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// `Location` header, if any.
    pub location: Option<String>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Anything below 400 counts as success (redirects included).
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// The response as a checkout page.
    pub fn page(&self) -> Page {
        Page::new(self.final_url.clone(), self.body.clone())
    }

    /// `Location` resolved against the requested URL.
    pub fn resolved_location(&self) -> Option<Url> {
        let location = self.location.as_deref()?;
        Url::parse(&self.url).ok()?.join(location).ok()
    }
}

/// HTTP client for one checkout task.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
    jar: Arc<Jar>,
}

impl HttpClient {
    /// Create a client with a fresh cookie jar, optionally through a proxy.
    pub fn new(timeout: Duration, proxy: Option<&Proxy>) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let builder = |redirect: Policy| -> Result<reqwest::Client, reqwest::Error> {
            let mut b = reqwest::Client::builder()
                .timeout(timeout)
                .redirect(redirect)
                .user_agent(USER_AGENT)
                .default_headers(headers.clone())
                .cookie_provider(jar.clone());
            if let Some(proxy) = proxy {
                b = b.proxy(reqwest::Proxy::all(proxy.url())?);
            }
            b.build()
        };

        Ok(Self {
            client: builder(Policy::limited(10))?,
            no_redirect: builder(Policy::none())?,
            jar,
        })
    }

    /// GET following redirects.
    pub async fn get(&self, url: &str, accept: &str) -> Result<HttpResponse, reqwest::Error> {
        let resp = self.client.get(url).header(ACCEPT, accept).send().await?;
        Self::read(url, resp).await
    }

    /// GET without following redirects.
    pub async fn get_no_redirect(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let resp = self
            .no_redirect
            .get(url)
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await?;
        Self::read(url, resp).await
    }

    /// POST an ordered, url-encoded form. Repeated keys are kept.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        accept: &str,
        referer: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.post(url).header(ACCEPT, accept).form(form);
        if let Some(referer) = referer {
            builder = builder.header(REFERER, referer);
        }
        let resp = builder.send().await?;
        Self::read(url, resp).await
    }

    /// POST a JSON body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        referer: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.post(url).header(ACCEPT, "*/*").json(body);
        if let Some(referer) = referer {
            builder = builder.header(REFERER, referer);
        }
        let resp = builder.send().await?;
        Self::read(url, resp).await
    }

    /// Value of a cookie the jar would send to `url`.
    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let raw = header.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    /// Store a cookie for `url`.
    pub fn set_cookie(&self, url: &Url, name: &str, value: &str) {
        self.jar.add_cookie_str(&format!("{name}={value}; Path=/"), url);
    }

    async fn read(url: &str, resp: reqwest::Response) -> Result<HttpResponse, reqwest::Error> {
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            location,
            body,
        })
    }
}
