//! Error taxonomy shared by the archive and live clients.

use thiserror::Error;

/// Help page shown when the archive service looks unreachable.
pub const ARCHIVE_DOWN_HELP: &str = "/about#psdown";

/// Failure of a single HTTP exchange (one attempt, before any retry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset, timeout: the service may be down.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Errors surfaced to callers of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-positive limiter/queue parameters or an unusable base URL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The HTTP client could not be set up (TLS backend, invalid user agent).
    #[error("failed to build HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),

    /// The archive kept failing after the retry budget was spent.
    #[error("{context}: {cause}")]
    Archive {
        context: &'static str,
        #[source]
        cause: TransportError,
        help_url: Option<&'static str>,
    },

    /// The live Reddit API failed.
    #[error("{context}: {cause}")]
    Live {
        context: &'static str,
        #[source]
        cause: TransportError,
    },
}

impl Error {
    /// Wraps an archive failure, attaching the outage hint for network-level causes.
    pub fn archive(context: &'static str, cause: TransportError) -> Self {
        let help_url = cause.is_network().then_some(ARCHIVE_DOWN_HELP);
        Error::Archive { context, cause, help_url }
    }

    pub fn live(context: &'static str, cause: TransportError) -> Self {
        Error::Live { context, cause }
    }

    /// Remediation page for the UI, when one applies.
    pub fn help_url(&self) -> Option<&'static str> {
        match self {
            Error::Archive { help_url, .. } => *help_url,
            _ => None,
        }
    }

    /// True when the failure looks like the archive service being down.
    pub fn is_likely_outage(&self) -> bool {
        self.help_url() == Some(ARCHIVE_DOWN_HELP)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
