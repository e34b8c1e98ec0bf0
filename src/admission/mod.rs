//! Content admission and deduplication.
//!
//! Every unit produced by search, scraping, or generation passes through
//! the [`AdmissionFilter`] before it is persisted as part of a stage
//! asset. A unit is admitted at most once per run: candidates are
//! canonicalized and checked against the run-scoped set of previously
//! admitted keys. URL keys and content keys live in separate namespaces.
//!
//! The membership-test-and-insert step is a single atomic operation under
//! a mutex, so two workers racing on the same key cannot both admit it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use url::Url;

/// File extensions that are never worth scraping.
const BLOCKED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".zip", ".rar", ".tar", ".gz",
    ".mp4", ".avi", ".mp3", ".jpg", ".jpeg", ".png", ".gif", ".bmp",
];

/// Hosts that consistently defeat text extraction (login walls, feeds).
const BLOCKED_HOSTS: &[&str] = &[
    "twitter.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "reddit.com",
];

/// Minimum plausible URL length.
const MIN_URL_LEN: usize = 10;

/// Why a candidate unit was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidUrl,
    BlockedExtension,
    BlockedHost,
    UrlTooShort,
    DuplicateUrl,
    DuplicateContent,
    MalformedRecord,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::InvalidUrl => "invalid_url",
            RejectReason::BlockedExtension => "blocked_extension",
            RejectReason::BlockedHost => "blocked_host",
            RejectReason::UrlTooShort => "url_too_short",
            RejectReason::DuplicateUrl => "duplicate_url",
            RejectReason::DuplicateContent => "duplicate_content",
            RejectReason::MalformedRecord => "malformed_record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct KeySets {
    urls: HashSet<String>,
    content: HashSet<String>,
}

/// Run-scoped admission filter.
#[derive(Debug, Default)]
pub struct AdmissionFilter {
    keys: Mutex<KeySets>,
}

impl AdmissionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and canonicalizes a URL, admitting it if its canonical
    /// key has not been seen in this run. Returns the canonical key.
    pub fn admit_url(&self, raw: &str) -> Result<String, RejectReason> {
        let key = Self::canonical_url(raw)?;
        let mut keys = self.keys.lock().expect("admission filter poisoned");
        if keys.urls.insert(key.clone()) {
            Ok(key)
        } else {
            Err(RejectReason::DuplicateUrl)
        }
    }

    /// Validates a generated record and admits it if its canonical
    /// content key has not been seen in this run. Returns the key.
    pub fn admit_content(&self, record: &serde_json::Value) -> Result<String, RejectReason> {
        let key = Self::content_key(record).ok_or(RejectReason::MalformedRecord)?;
        let mut keys = self.keys.lock().expect("admission filter poisoned");
        if keys.content.insert(key.clone()) {
            Ok(key)
        } else {
            Err(RejectReason::DuplicateContent)
        }
    }

    /// Number of URL keys admitted so far.
    pub fn admitted_urls(&self) -> usize {
        self.keys.lock().expect("admission filter poisoned").urls.len()
    }

    /// Number of content keys admitted so far.
    pub fn admitted_content(&self) -> usize {
        self.keys
            .lock()
            .expect("admission filter poisoned")
            .content
            .len()
    }

    /// Structural validity check plus canonicalization for URLs:
    /// lowercase scheme + host + path, trailing slash stripped, query and
    /// fragment dropped.
    pub fn canonical_url(raw: &str) -> Result<String, RejectReason> {
        let trimmed = raw.trim();
        if trimmed.len() < MIN_URL_LEN {
            return Err(RejectReason::UrlTooShort);
        }

        let parsed = Url::parse(trimmed).map_err(|_| RejectReason::InvalidUrl)?;
        let host = parsed.host_str().ok_or(RejectReason::InvalidUrl)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RejectReason::InvalidUrl);
        }

        let host = host.to_lowercase();
        if BLOCKED_HOSTS
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
        {
            return Err(RejectReason::BlockedHost);
        }

        let path = parsed.path().to_lowercase();
        if BLOCKED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Err(RejectReason::BlockedExtension);
        }

        let path = path.trim_end_matches('/');
        Ok(format!("{}://{}{}", parsed.scheme(), host, path))
    }

    /// Canonical key for a generated record: the record must be a JSON
    /// object; its canonical serialization (serde_json orders keys) is
    /// whitespace-normalized, case-folded, and digested.
    pub fn content_key(record: &serde_json::Value) -> Option<String> {
        if !record.is_object() || record.as_object().is_some_and(|m| m.is_empty()) {
            return None;
        }
        let serialized = record.to_string();
        let normalized = serialized
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Some(hex::encode(Sha256::digest(normalized.as_bytes())))
    }
}
