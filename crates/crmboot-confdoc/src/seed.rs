//! Seed documents rendered from operator settings.
//!
//! Two documents are derived from [`Settings`]:
//!
//! - the silent-install seed (`$sugar_config_si`), written to a transient
//!   file next to the application and consumed by the install wizard;
//! - the minimal runtime config (`$sugar_config`), used on the
//!   skip-wizard path as input to the application's own rebuild routine.
//!
//! The reverse direction, [`db_settings`], reads database connection
//! parameters back out of a restored runtime config — on the resume path
//! the persisted file is authoritative, not the fresh environment.

use crmboot_settings::{DbSettings, Settings};

use crate::value::{ConfMap, ConfValue};
use crate::{ConfDoc, Error, Result};

/// Scheme + host for the application, honoring the HTTPS flag.
pub fn site_url(settings: &Settings) -> String {
    let scheme = if settings.https_enabled() {
        "https"
    } else {
        "http"
    };
    format!("{scheme}://{}", settings.host)
}

/// Render the silent-install seed document.
pub fn seed_silent_install(settings: &Settings) -> ConfDoc {
    let mut doc = ConfDoc::new("sugar_config_si");
    let entries = [
        ("setup_db_host_name", ConfValue::str(&settings.db.host)),
        ("setup_db_port_num", ConfValue::Int(settings.db.port as i64)),
        ("setup_db_database_name", ConfValue::str(&settings.db.name)),
        ("setup_db_admin_user_name", ConfValue::str(&settings.db.user)),
        (
            "setup_db_admin_password",
            ConfValue::str(&settings.db.password),
        ),
        ("setup_db_create_database", ConfValue::Bool(false)),
        ("setup_db_drop_tables", ConfValue::Bool(false)),
        ("demoData", ConfValue::str("no")),
        (
            "setup_site_admin_user_name",
            ConfValue::str(&settings.username),
        ),
        (
            "setup_site_admin_password",
            ConfValue::str(&settings.password),
        ),
        ("setup_site_url", ConfValue::str(site_url(settings))),
        ("default_from_address", ConfValue::str(&settings.email)),
        ("default_from_name", ConfValue::str(&settings.last_name)),
    ];
    for (key, value) in entries {
        // set() on a fresh map never traverses a scalar.
        let _ = doc.set(key, value);
    }
    doc
}

/// Render the minimal runtime config: connection parameters only.
///
/// Everything else is filled in by the config repairer, which is also
/// what makes this path safe against an already-initialized database.
pub fn seed_runtime_config(settings: &Settings) -> ConfDoc {
    let mut doc = ConfDoc::new("sugar_config");
    let dbconfig: ConfMap = [
        ("db_host_name", ConfValue::str(&settings.db.host)),
        ("db_port", ConfValue::Int(settings.db.port as i64)),
        ("db_name", ConfValue::str(&settings.db.name)),
        ("db_user_name", ConfValue::str(&settings.db.user)),
        ("db_password", ConfValue::str(&settings.db.password)),
        ("db_type", ConfValue::str("mysql")),
        ("db_manager", ConfValue::str("MysqliManager")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let _ = doc.set("dbconfig", ConfValue::Map(dbconfig));
    let _ = doc.set("site_url", ConfValue::str(site_url(settings)));
    let _ = doc.set("installer_locked", ConfValue::Bool(true));
    doc
}

fn require_str(doc: &ConfDoc, path: &str) -> Result<String> {
    match doc.get(path) {
        Some(ConfValue::Str(s)) => Ok(s.clone()),
        Some(_) => Err(Error::BadValue {
            path: path.to_string(),
            message: "expected a string".into(),
        }),
        None => Err(Error::KeyNotFound(path.to_string())),
    }
}

/// Read database connection parameters out of a runtime config document.
///
/// The port is accepted as either an integer or a numeric string; the
/// application has emitted both over the years.
pub fn db_settings(doc: &ConfDoc) -> Result<DbSettings> {
    let port = match doc.get("dbconfig.db_port") {
        Some(ConfValue::Int(n)) if (1..=i64::from(u16::MAX)).contains(n) => *n as u16,
        Some(ConfValue::Str(s)) => s.parse().map_err(|_| Error::BadValue {
            path: "dbconfig.db_port".into(),
            message: format!("not a port number: {s:?}"),
        })?,
        Some(_) => {
            return Err(Error::BadValue {
                path: "dbconfig.db_port".into(),
                message: "expected an integer or numeric string".into(),
            });
        }
        None => 3306,
    };

    Ok(DbSettings {
        host: require_str(doc, "dbconfig.db_host_name")?,
        port,
        name: require_str(doc, "dbconfig.db_name")?,
        user: require_str(doc, "dbconfig.db_user_name")?,
        password: require_str(doc, "dbconfig.db_password")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmboot_settings::SmtpSettings;

    fn settings() -> Settings {
        Settings {
            username: "admin".into(),
            password: "secret".into(),
            email: "admin@example.com".into(),
            last_name: "Admin".into(),
            host: "crm.example.com".into(),
            enable_https: "yes".into(),
            skip_wizard: "no".into(),
            allow_empty_password: "no".into(),
            smtp: SmtpSettings::default(),
            db: DbSettings {
                host: "mariadb".into(),
                port: 3306,
                name: "bitnami_suitecrm".into(),
                user: "bn_suitecrm".into(),
                password: "dbpass".into(),
            },
        }
    }

    #[test]
    fn site_url_honors_https_flag() {
        let mut s = settings();
        assert_eq!(site_url(&s), "https://crm.example.com");
        s.enable_https = "no".into();
        assert_eq!(site_url(&s), "http://crm.example.com");
    }

    #[test]
    fn runtime_seed_round_trips_db_settings() {
        let s = settings();
        let doc = seed_runtime_config(&s);
        let parsed = ConfDoc::parse(&doc.to_php()).unwrap();

        let db = db_settings(&parsed).unwrap();
        assert_eq!(db.host, "mariadb");
        assert_eq!(db.port, 3306);
        assert_eq!(db.name, "bitnami_suitecrm");
        assert_eq!(db.user, "bn_suitecrm");
        assert_eq!(db.password, "dbpass");
    }

    #[test]
    fn db_settings_accepts_string_port() {
        let source = r#"<?php
$sugar_config = array (
  'dbconfig' => array (
    'db_host_name' => 'db',
    'db_port' => '3307',
    'db_name' => 'crm',
    'db_user_name' => 'u',
    'db_password' => 'p',
  ),
);
"#;
        let doc = ConfDoc::parse(source).unwrap();
        assert_eq!(db_settings(&doc).unwrap().port, 3307);
    }

    #[test]
    fn db_settings_reports_missing_keys() {
        let doc = ConfDoc::parse("<?php $sugar_config = array();").unwrap();
        assert!(matches!(
            db_settings(&doc),
            Err(Error::KeyNotFound(_)) | Err(Error::BadValue { .. }),
        ));
    }

    #[test]
    fn silent_install_seed_contains_credentials() {
        let doc = seed_silent_install(&settings());
        assert_eq!(doc.var_name(), "sugar_config_si");
        assert_eq!(doc.get_str("setup_site_admin_user_name"), Some("admin"));
        assert_eq!(doc.get_str("setup_site_url"), Some("https://crm.example.com"));
    }
}
