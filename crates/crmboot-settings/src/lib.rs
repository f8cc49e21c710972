//! crmboot-settings — operator-supplied settings and their validation.
//!
//! `Settings` is constructed exactly once, at process start, from the
//! container environment ([`Settings::from_env`]). Every other crate takes
//! it by reference; nothing else reads the ambient environment.
//!
//! Validation is aggregate: [`validate`] returns *every* violated
//! constraint, so an operator fixes a bad deployment in one round trip
//! instead of one error at a time.

pub mod validate;

pub use validate::{EnvCheck, Violation, validate};

use serde::{Deserialize, Serialize};

// ── Flag parsing ─────────────────────────────────────────────────────

/// Accepted spellings for boolean-ish flags (case-insensitive).
///
/// Returns `None` when the value is not a recognized spelling — the
/// validator reports that as a violation rather than guessing.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

// ── Settings ─────────────────────────────────────────────────────────

/// Database connection settings as supplied by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Outbound-mail settings. The group is only validated (and only acted
/// on) when `host` is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    /// One of `ssl`, `tls`, `none`.
    pub protocol: String,
    pub notify_name: String,
    pub notify_address: String,
}

/// The full set of operator-supplied settings.
///
/// Flags are kept as the raw strings the operator supplied; the validator
/// checks spelling, and the typed accessors (`https_enabled`,
/// `skip_wizard`) resolve them with a documented default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Admin account user name.
    pub username: String,
    /// Admin account password.
    pub password: String,
    /// Admin account email address.
    pub email: String,
    /// Admin account last name.
    pub last_name: String,
    /// Externally reachable host name of the application.
    pub host: String,
    /// Raw HTTPS enable flag ("yes"/"no" + synonyms).
    pub enable_https: String,
    /// Raw "skip bootstrap wizard" flag.
    pub skip_wizard: String,
    /// Raw "allow empty passwords" override flag.
    pub allow_empty_password: String,
    pub smtp: SmtpSettings,
    pub db: DbSettings,
}

impl Settings {
    /// Construct settings from the process environment.
    ///
    /// This is the single boundary where the ambient environment is read.
    /// Unset variables fall back to the documented defaults.
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| -> String {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };

        let db_port = var("SUITECRM_DATABASE_PORT_NUMBER", "3306")
            .parse()
            .unwrap_or(3306);

        Settings {
            username: var("SUITECRM_USERNAME", "user"),
            password: var("SUITECRM_PASSWORD", ""),
            email: var("SUITECRM_EMAIL", "user@example.com"),
            last_name: var("SUITECRM_LASTNAME", "Name"),
            host: var("SUITECRM_HOST", "localhost"),
            enable_https: var("SUITECRM_ENABLE_HTTPS", "no"),
            skip_wizard: var("SUITECRM_SKIP_BOOTSTRAP", "no"),
            allow_empty_password: var("ALLOW_EMPTY_PASSWORD", "no"),
            smtp: SmtpSettings {
                host: var("SUITECRM_SMTP_HOST", ""),
                port: var("SUITECRM_SMTP_PORT_NUMBER", ""),
                user: var("SUITECRM_SMTP_USER", ""),
                password: var("SUITECRM_SMTP_PASSWORD", ""),
                protocol: var("SUITECRM_SMTP_PROTOCOL", ""),
                notify_name: var("SUITECRM_SMTP_NOTIFY_NAME", "SuiteCRM"),
                notify_address: var("SUITECRM_SMTP_NOTIFY_ADDRESS", "suitecrm@example.com"),
            },
            db: DbSettings {
                host: var("SUITECRM_DATABASE_HOST", "mariadb"),
                port: db_port,
                name: var("SUITECRM_DATABASE_NAME", "bitnami_suitecrm"),
                user: var("SUITECRM_DATABASE_USER", "bn_suitecrm"),
                password: var("SUITECRM_DATABASE_PASSWORD", ""),
            },
        }
    }

    /// Resolved HTTPS flag; unrecognized spellings count as disabled.
    pub fn https_enabled(&self) -> bool {
        parse_flag(&self.enable_https).unwrap_or(false)
    }

    /// Resolved skip-wizard flag.
    pub fn skip_wizard(&self) -> bool {
        parse_flag(&self.skip_wizard).unwrap_or(false)
    }

    /// Resolved empty-password override.
    pub fn allow_empty_password(&self) -> bool {
        parse_flag(&self.allow_empty_password).unwrap_or(false)
    }

    /// Whether the operator configured outbound mail at all.
    pub fn smtp_configured(&self) -> bool {
        !self.smtp.host.is_empty()
    }
}
