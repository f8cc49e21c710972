//! crmboot-wizard — non-interactive ("silent") install over HTTP.
//!
//! The application's first-run setup is a browser wizard; this crate
//! drives it headlessly: one GET to establish a session (and confirm the
//! application is actually uninstalled), then form-encoded POSTs for the
//! install itself and the optional SMTP configuration.
//!
//! Success and failure are detected by marker substrings in the returned
//! HTML. That is inherently fragile — it string-matches an upstream UI —
//! so the matching lives behind one narrow, pure function
//! ([`driver::parse_outcome`]) that is unit-tested in isolation and easy
//! to swap when the upstream markup changes.

pub mod client;
pub mod driver;
pub mod jar;

pub use client::{PageResponse, WizardClient};
pub use driver::{InstallWizard, OutcomeMarkers, StepOutcome, smtp_encryption_code};
pub use jar::CookieJar;

// ── Errors & policy ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("building request: {0}")]
    Request(#[from] http::Error),

    #[error("http: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("reading response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("request to {uri} timed out after {timeout:?}")]
    Timeout {
        uri: String,
        timeout: std::time::Duration,
    },

    #[error("application did not present the install wizard: {0}")]
    NotInstallable(String),

    #[error("wizard step {step:?} rejected: {reason}")]
    StepRejected { step: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure policy for the wizard sequence.
///
/// The main install step failing is always fatal. Historically the SMTP
/// step's failure was only logged; that asymmetry is kept, but as an
/// explicit choice rather than an accident of control flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct WizardPolicy {
    /// Treat an SMTP configuration failure as fatal.
    pub smtp_failure_fatal: bool,
}
