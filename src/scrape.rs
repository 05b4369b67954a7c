//! Page scraping for link previews
//!
//! The worker pipeline only depends on the [`Scraper`] capability. The
//! default engine, [`HtmlScraper`], fetches the page with reqwest, follows
//! redirects under an explicit depth budget, and extracts Open Graph and
//! plain HTML metadata.

use crate::{extract_domain, normalize_text, parse_target_url, resolve_href, PreviewError, PreviewFields};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Capability for turning a URL into preview fields.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch `url` and extract its preview fields, following at most
    /// `max_redirects` redirects.
    async fn scrape(&self, url: &str, max_redirects: usize) -> Result<PreviewFields, PreviewError>;
}

/// Default scraper backed by reqwest and the `scraper` HTML parser.
#[derive(Debug, Clone)]
pub struct HtmlScraper {
    client: reqwest::Client,
}

impl HtmlScraper {
    pub fn new(user_agent: &str) -> Result<Self, PreviewError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::none())
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Use a prebuilt client. It should not follow redirects on its own,
    /// otherwise the redirect budget is not enforced.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn spend_redirect(redirects: &mut usize, max_redirects: usize) -> Result<(), PreviewError> {
        *redirects += 1;
        if *redirects > max_redirects {
            return Err(PreviewError::TooManyRedirects(max_redirects));
        }
        Ok(())
    }
}

#[async_trait]
impl Scraper for HtmlScraper {
    async fn scrape(&self, url: &str, max_redirects: usize) -> Result<PreviewFields, PreviewError> {
        let mut current = parse_target_url(url)?;
        let mut redirects = 0;

        loop {
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        PreviewError::ScrapeFailed(format!("redirect without location from {current}"))
                    })?;
                let next = current.join(location)?;

                Self::spend_redirect(&mut redirects, max_redirects)?;
                debug!("Following redirect {} -> {} ({}/{})", current, next, redirects, max_redirects);
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(PreviewError::HttpStatus {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let body = response.text().await?;
            let page = parse_document(&body, &current);

            if let Some(target) = page.refresh {
                if target != current {
                    Self::spend_redirect(&mut redirects, max_redirects)?;
                    debug!("Following meta refresh {} -> {} ({}/{})", current, target, redirects, max_redirects);
                    current = target;
                    continue;
                }
            }

            return Ok(page.fields);
        }
    }
}

/// Result of parsing one HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub fields: PreviewFields,
    /// Target of a `<meta http-equiv="refresh">` redirect, if any
    pub refresh: Option<Url>,
}

/// Extract preview fields from `html`, resolving relative references
/// against `base` (the URL the document was served from).
pub fn parse_document(html: &str, base: &Url) -> ParsedDocument {
    let doc = Html::parse_document(html);

    let title = first_non_empty([
        meta_content(&doc, "meta[property=\"og:title\"]"),
        first_text(&doc, "title"),
    ]);

    let description = first_non_empty([
        meta_content(&doc, "meta[property=\"og:description\"]"),
        meta_content(&doc, "meta[name=\"description\"]"),
    ]);

    let name = first_non_empty([
        meta_content(&doc, "meta[property=\"og:site_name\"]"),
        extract_domain(base.as_str()).unwrap_or_default(),
    ]);

    let icon = extract_icon(&doc)
        .and_then(|href| resolve_href(base, &href))
        .or_else(|| resolve_href(base, "/favicon.ico"))
        .unwrap_or_default();

    let link = resolve_href(base, &meta_content(&doc, "meta[property=\"og:url\"]"))
        .unwrap_or_else(|| base.to_string());

    let mut images = attr_values(&doc, "meta[property=\"og:image\"]", "content");
    if images.is_empty() {
        images = attr_values(&doc, "img[src]", "src");
    }

    let mut seen = std::collections::HashSet::new();
    let images = images
        .iter()
        .filter_map(|href| resolve_href(base, href))
        .filter(|resolved| seen.insert(resolved.clone()))
        .collect();

    let refresh = refresh_directive(&doc)
        .and_then(|content| refresh_target(&content))
        .and_then(|target| base.join(&target).ok());

    ParsedDocument {
        fields: PreviewFields {
            name,
            title,
            description,
            icon,
            link,
            images,
        },
        refresh,
    }
}

fn refresh_directive(doc: &Html) -> Option<String> {
    let selector = Selector::parse("meta[http-equiv][content]").ok()?;

    doc.select(&selector)
        .find(|el| {
            el.value()
                .attr("http-equiv")
                .map(|equiv| equiv.trim().eq_ignore_ascii_case("refresh"))
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.to_string())
}

/// Parse the URL out of a refresh directive such as `0; url=/next`.
fn refresh_target(content: &str) -> Option<String> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let lower = rest.to_ascii_lowercase();
    if !lower.starts_with("url") {
        return None;
    }

    let target = rest[3..].trim_start().strip_prefix('=')?.trim();
    let target = target.trim_matches(|c| c == '\'' || c == '"').trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

fn extract_icon(doc: &Html) -> Option<String> {
    let selector = Selector::parse("link[rel][href]").ok()?;

    doc.select(&selector)
        .find(|el| {
            el.value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("icon")))
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> String {
    candidates
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or_default()
}

fn first_text(doc: &Html, selector: &str) -> String {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return String::new(),
    };

    doc.select(&selector)
        .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn meta_content(doc: &Html, selector: &str) -> String {
    attr_values(doc, selector, "content")
        .into_iter()
        .map(|content| normalize_text(&content))
        .find(|content| !content.is_empty())
        .unwrap_or_default()
}

fn attr_values(doc: &Html, selector: &str, attr: &str) -> Vec<String> {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    doc.select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|value| value.to_string())
        .collect()
}
