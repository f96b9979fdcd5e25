use crate::extract::{ExtractedRecord, NodeMatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Why a fetch did not produce a clean record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "kebab-case")]
pub enum ErrorKind {
    /// robots.txt disallows the URL (plain-HTTP engine only)
    RobotsBlocked,
    /// Non-2xx response
    HttpStatus(u16),
    /// Connection, DNS, TLS or proxy failure
    Network,
    /// The request or render exceeded its timeout
    Timeout,
    /// The browser failed to load or render the page
    Render,
    /// The page loaded but no rule produced a value; the result is still a success
    NoFieldsMatched,
    /// The record matched an earlier one; the result is still a success
    DuplicateContent,
    /// A stop request interrupted the fetch
    Cancelled,
    /// The fetch task itself failed
    Internal,
}

impl ErrorKind {
    /// Returns true for 4xx status failures
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::HttpStatus(code) if (400..500).contains(code))
    }

    /// Returns true for kinds that annotate a successful result
    pub fn is_annotation(&self) -> bool {
        matches!(self, Self::NoFieldsMatched | Self::DuplicateContent)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RobotsBlocked => write!(f, "robots_blocked"),
            Self::HttpStatus(code) => write!(f, "http_{}", code),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Render => write!(f, "render"),
            Self::NoFieldsMatched => write!(f, "no_fields_matched"),
            Self::DuplicateContent => write!(f, "duplicate"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Outcome of fetching and extracting one URL
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,

    pub success: bool,

    /// One entry per field rule; always `None` for failed results
    pub extracted_data: Option<ExtractedRecord>,

    pub error_kind: Option<ErrorKind>,

    /// Human-readable description of the failure or annotation
    pub error: Option<String>,

    pub http_status: Option<u16>,

    pub elapsed_ms: u64,

    /// Page markup, kept for crawling on success and for debugging on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    /// Creates a successful result
    pub fn success(url: impl Into<String>, record: ExtractedRecord, status: u16) -> Self {
        Self {
            url: url.into(),
            success: true,
            extracted_data: Some(record),
            error_kind: None,
            error: None,
            http_status: Some(status),
            elapsed_ms: 0,
            raw_html: None,
            fetched_at: Utc::now(),
        }
    }

    /// Creates a failed result from a fetch error
    pub fn failure(url: impl Into<String>, error: FetchError) -> Self {
        Self {
            url: url.into(),
            success: false,
            extracted_data: None,
            error_kind: Some(error.kind),
            error: Some(error.message),
            http_status: error.status,
            elapsed_ms: 0,
            raw_html: error.html,
            fetched_at: Utc::now(),
        }
    }

    /// Returns true if the result was flagged as duplicate content
    pub fn is_duplicate(&self) -> bool {
        self.error_kind == Some(ErrorKind::DuplicateContent)
    }

    pub(crate) fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

/// Failure of a single load attempt
#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Body received with the failure, if any
    pub html: Option<String>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            html: None,
        }
    }

    /// A non-2xx response, formatted as `HTTP 404: Not Found`
    pub fn http_status(status: u16, reason: Option<&str>, body: Option<String>) -> Self {
        let message = match reason {
            Some(reason) => format!("HTTP {}: {}", status, reason),
            None => format!("HTTP {}", status),
        };
        Self {
            kind: ErrorKind::HttpStatus(status),
            message,
            status: Some(status),
            html: body,
        }
    }

    /// Classifies a transport error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::new(ErrorKind::Timeout, format!("Request timeout: {}", error))
        } else if error.is_connect() {
            Self::new(ErrorKind::Network, format!("Connection failed: {}", error))
        } else {
            Self::new(ErrorKind::Network, format!("Request failed: {}", error))
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for FetchError {}

/// robots.txt disallows a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotsWarning {
    pub url: String,
    pub disallowed_paths: Vec<String>,
    pub message: String,
}

/// Matches of a single selector, for trying out rules before a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub selector: String,
    /// Total number of matches on the page
    pub count: usize,
    /// At most [`ProbeResult::MAX_SAMPLES`] matches in document order
    pub samples: Vec<NodeMatch>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub const MAX_SAMPLES: usize = 10;
}
