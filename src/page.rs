use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;

/// One page of results plus the provider's more-pages signal.
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// A paginated result provider. The two platform conventions (offset-based
/// and next-link-based continuation) both implement this, so the crawl loop
/// is shared.
pub trait PageSource {
    type Item;

    fn next_page(&mut self) -> Result<Page<Self::Item>>;
}

/// Drain a page source until it reports no more pages or fails.
///
/// A failure stops collection but keeps the pages gathered so far; the
/// caller decides how to report the returned error.
pub fn collect_pages<S: PageSource>(source: &mut S) -> (Vec<S::Item>, Option<anyhow::Error>) {
    let mut items = Vec::new();

    loop {
        match source.next_page() {
            Ok(mut page) => {
                items.append(&mut page.items);
                if !page.has_more {
                    return (items, None);
                }
            }
            Err(error) => return (items, Some(error)),
        }
    }
}

/// Shared blocking HTTP client for the REST crawlers.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("upstream-report/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")
}

/// Page source for servers that hand out the next page as a
/// `Link: <url>; rel="next"` response header (github, patchwork).
///
/// Yields raw JSON values; a response body that is not a list (a
/// rate-limit or error page) fails the source.
pub struct LinkedPageSource<'a> {
    client: &'a Client,
    next_url: Option<String>,
    auth: Option<(String, String)>,
}

impl<'a> LinkedPageSource<'a> {
    pub fn new(client: &'a Client, url: String, auth: Option<(String, String)>) -> Self {
        Self {
            client,
            next_url: Some(url),
            auth,
        }
    }
}

impl PageSource for LinkedPageSource<'_> {
    type Item = Value;

    fn next_page(&mut self) -> Result<Page<Value>> {
        let Some(url) = self.next_url.take() else {
            return Ok(Page {
                items: Vec::new(),
                has_more: false,
            });
        };

        let mut request = self.client.get(&url);
        if let Some((username, token)) = &self.auth {
            request = request.basic_auth(username, Some(token));
        }

        let response = request
            .send()
            .with_context(|| format!("request to {} failed", url))?;

        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_link);

        let body: Value = response
            .json()
            .with_context(|| format!("invalid JSON from {}", url))?;

        let Value::Array(items) = body else {
            bail!("unexpected response from {} (not a list)", url);
        };

        self.next_url = next;

        Ok(Page {
            has_more: self.next_url.is_some(),
            items,
        })
    }
}

/// Prepend https to bare host[:port] endpoints from the config file.
pub fn ensure_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Extract the `rel="next"` target from a Link header value.
fn parse_next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();

        let is_next = segments
            .any(|param| param.trim().eq_ignore_ascii_case("rel=\"next\""));

        if is_next {
            return Some(target.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }

    None
}
