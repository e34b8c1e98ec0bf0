//! Page retrieval and text extraction.
//!
//! One URL in, extracted text (title, body, word count) or an explicit
//! failure out. The pipeline depends only on the [`PageFetcher`] trait;
//! the production fetcher does a plain GET and pulls readable text out
//! of the HTML.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::ScrapeError;
use crate::types::ScrapedPage;

const USER_AGENT: &str = concat!("synthforge/", env!("CARGO_PKG_VERSION"));

/// Elements whose text makes up the readable body of a page. Leaf-level
/// selectors, so nested containers do not duplicate their children.
const CONTENT_SELECTORS: &str = "p, h1, h2, h3, h4, li, blockquote, td, pre";

/// Anything that can retrieve a page and extract its text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, ScrapeError>;
}

/// HTTP page fetcher.
pub struct HttpPageFetcher {
    http_client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::RequestFailed(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Err(ScrapeError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::RequestFailed(e.to_string()))?;

        let page = if content_type.contains("text/plain") {
            plain_text_page(url, &body)
        } else {
            extract_page(url, &body)
        };

        if page.text.trim().is_empty() {
            return Err(ScrapeError::EmptyContent(url.to_string()));
        }
        debug!(url, words = page.word_count, "page scraped");
        Ok(page)
    }
}

/// Extracts the title and readable body text from an HTML document.
pub fn extract_page(url: &str, html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let mut paragraphs = Vec::new();
    if let Ok(sel) = Selector::parse(CONTENT_SELECTORS) {
        for element in document.select(&sel) {
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                paragraphs.push(text);
            }
        }
    }
    let text = paragraphs.join("\n\n");
    let word_count = text.split_whitespace().count();

    ScrapedPage {
        url: url.to_string(),
        title,
        text,
        word_count,
    }
}

fn plain_text_page(url: &str, body: &str) -> ScrapedPage {
    let text = body.trim().to_string();
    let word_count = text.split_whitespace().count();
    ScrapedPage {
        url: url.to_string(),
        title: String::new(),
        text,
        word_count,
    }
}
