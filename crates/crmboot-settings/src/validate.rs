//! Aggregate settings validation.
//!
//! Collects every violated constraint before reporting, so a broken
//! deployment surfaces all of its problems in a single boot attempt.

use tracing::{error, warn};

use crate::{Settings, parse_flag};

/// Accepted SMTP protocol names. Anything else is a validation error;
/// the wizard's encryption-code mapping never sees unvalidated input
/// on the happy path.
pub const SMTP_PROTOCOLS: &[&str] = &["ssl", "tls", "none"];

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The setting (environment variable) at fault.
    pub setting: String,
    /// Human-readable description of the constraint.
    pub message: String,
}

impl Violation {
    fn new(setting: &str, message: impl Into<String>) -> Self {
        Self {
            setting: setting.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.setting, self.message)
    }
}

/// External infrastructure check folded into the aggregate result.
///
/// The orchestrator registers checks for collaborators this crate has no
/// business knowing about (web server config sanity, writable web root).
pub trait EnvCheck {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;
    /// `Err(reason)` becomes one violation in the aggregate result.
    fn check(&self) -> Result<(), String>;
}

/// Validate settings and run the supplied infrastructure checks.
///
/// Returns every violation found (possibly empty). Each violation is also
/// logged at error level; warnings (the empty-password override) are
/// logged but do not appear in the returned list. `settings` is never
/// mutated.
pub fn validate(settings: &Settings, checks: &[&dyn EnvCheck]) -> Vec<Violation> {
    let mut violations = Vec::new();

    // Boolean-ish flags must use a recognized spelling.
    for (name, value) in [
        ("SUITECRM_ENABLE_HTTPS", &settings.enable_https),
        ("SUITECRM_SKIP_BOOTSTRAP", &settings.skip_wizard),
        ("ALLOW_EMPTY_PASSWORD", &settings.allow_empty_password),
    ] {
        if parse_flag(value).is_none() {
            violations.push(Violation::new(
                name,
                format!("invalid value {value:?}, expected yes/no (or true/false, 1/0)"),
            ));
        }
    }

    // Credentials must be non-empty unless the override is enabled.
    let allow_empty = settings.allow_empty_password();
    for (name, value) in [
        ("SUITECRM_PASSWORD", &settings.password),
        ("SUITECRM_DATABASE_PASSWORD", &settings.db.password),
    ] {
        if value.is_empty() {
            if allow_empty {
                warn!(setting = name, "empty password accepted (ALLOW_EMPTY_PASSWORD)");
            } else {
                violations.push(Violation::new(
                    name,
                    "must not be empty (set ALLOW_EMPTY_PASSWORD=yes to override)",
                ));
            }
        }
    }

    // The SMTP group is only validated when its trigger field is set.
    if !settings.smtp.host.is_empty() {
        for (name, value) in [
            ("SUITECRM_SMTP_PORT_NUMBER", &settings.smtp.port),
            ("SUITECRM_SMTP_USER", &settings.smtp.user),
            ("SUITECRM_SMTP_PASSWORD", &settings.smtp.password),
            ("SUITECRM_SMTP_PROTOCOL", &settings.smtp.protocol),
        ] {
            if value.is_empty() {
                violations.push(Violation::new(
                    name,
                    "required when SUITECRM_SMTP_HOST is set",
                ));
            }
        }
        let protocol = settings.smtp.protocol.to_ascii_lowercase();
        if !protocol.is_empty() && !SMTP_PROTOCOLS.contains(&protocol.as_str()) {
            violations.push(Violation::new(
                "SUITECRM_SMTP_PROTOCOL",
                format!(
                    "invalid value {:?}, expected one of {}",
                    settings.smtp.protocol,
                    SMTP_PROTOCOLS.join("/"),
                ),
            ));
        }
    }

    // Delegated infrastructure checks.
    for check in checks {
        if let Err(reason) = check.check() {
            violations.push(Violation::new(check.name(), reason));
        }
    }

    for violation in &violations {
        error!(setting = %violation.setting, "{}", violation.message);
    }

    violations
}
