//! Wizard steps: session, silent install, SMTP configuration.

use crmboot_settings::SmtpSettings;
use tracing::{error, info, warn};

use crate::client::{PageResponse, WizardClient};
use crate::{Error, Result, WizardPolicy};

/// Install wizard entry point, session + silent install.
const INSTALL_PATH: &str = "/install.php?goto=Start";
const SILENT_INSTALL_PATH: &str = "/install.php?goto=SilentInstall&cli=true";
/// Admin email-settings endpoint for the SMTP sub-wizard.
const SMTP_CONFIG_PATH: &str = "/index.php?module=EmailMan&action=config";

// ── Outcome parsing ──────────────────────────────────────────────────

/// Marker substrings that decide a step's outcome.
///
/// These mirror strings in the upstream UI's HTML and will drift with
/// upstream releases; that is why they are data, not code.
#[derive(Debug, Clone)]
pub struct OutcomeMarkers {
    /// Expected on the first wizard page of an uninstalled application.
    pub not_installed: String,
    /// Any of these in a step response means the step completed.
    pub success: Vec<String>,
    /// Reported as the reason when no success marker is present.
    pub failure: Vec<String>,
}

impl Default for OutcomeMarkers {
    fn default() -> Self {
        Self {
            not_installed: "Setup Wizard".into(),
            success: vec!["Success!".into()],
            failure: vec!["Exception".into(), "Fatal error".into(), "failed".into()],
        }
    }
}

/// Outcome of a single wizard step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Rejected(String),
}

/// Decide a step outcome from a response body.
///
/// A success marker wins over a failure marker — upstream pages mention
/// the word "failed" in help text even on success. No marker at all is a
/// rejection: the page changed, or the step silently did nothing.
pub fn parse_outcome(body: &str, markers: &OutcomeMarkers) -> StepOutcome {
    if markers.success.iter().any(|m| body.contains(m.as_str())) {
        return StepOutcome::Completed;
    }
    if let Some(marker) = markers.failure.iter().find(|m| body.contains(m.as_str())) {
        return StepOutcome::Rejected(format!("failure marker {marker:?} in response"));
    }
    StepOutcome::Rejected("no success marker in response".into())
}

/// Map a protocol name to the encryption code the application expects.
///
/// Unrecognized values deliberately map to "no encryption" instead of an
/// error; allowed spellings were already enforced during validation.
pub fn smtp_encryption_code(protocol: &str) -> &'static str {
    match protocol.to_ascii_lowercase().as_str() {
        "ssl" => "1",
        "tls" => "2",
        _ => "0",
    }
}

// ── Wizard driver ────────────────────────────────────────────────────

/// Drives the install wizard through a [`WizardClient`].
pub struct InstallWizard {
    client: WizardClient,
    markers: OutcomeMarkers,
    policy: WizardPolicy,
}

impl InstallWizard {
    pub fn new(client: WizardClient, policy: WizardPolicy) -> Self {
        Self {
            client,
            markers: OutcomeMarkers::default(),
            policy,
        }
    }

    /// Override the default outcome markers.
    pub fn with_markers(mut self, markers: OutcomeMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Establish the wizard session.
    ///
    /// The first page must present the setup wizard; anything else means
    /// the application is already installed or is refusing us, and the
    /// silent install would fail in confusing ways later.
    pub async fn open_session(&mut self) -> Result<()> {
        let page = self.client.get(INSTALL_PATH).await?;
        if !page.contains(&self.markers.not_installed) {
            return Err(Error::NotInstallable(format!(
                "install page (status {}) does not contain {:?}",
                page.status, self.markers.not_installed,
            )));
        }
        info!("install wizard session established");
        Ok(())
    }

    /// Run the silent install against the seed config the application
    /// already has on disk. Failure here is always fatal.
    pub async fn run_silent_install(&mut self) -> Result<()> {
        info!("running silent install (this can take a few minutes)");
        let page = self
            .client
            .post_form(SILENT_INSTALL_PATH, &[("current_step", "8"), ("goto", "Next")])
            .await?;
        match self.outcome("silent-install", &page) {
            StepOutcome::Completed => {
                info!("silent install completed");
                Ok(())
            }
            StepOutcome::Rejected(reason) => Err(Error::StepRejected {
                step: "silent-install".into(),
                reason,
            }),
        }
    }

    /// Configure outbound mail. Failure is logged and swallowed unless
    /// the policy says otherwise.
    pub async fn configure_smtp(&mut self, smtp: &SmtpSettings) -> Result<()> {
        info!(host = %smtp.host, "configuring SMTP");
        let result = self.try_configure_smtp(smtp).await;
        match result {
            Ok(()) => {
                info!("SMTP configured");
                Ok(())
            }
            Err(e) if !self.policy.smtp_failure_fatal => {
                error!(error = %e, "SMTP configuration failed; continuing without it");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn try_configure_smtp(&mut self, smtp: &SmtpSettings) -> Result<()> {
        let fields = [
            ("mail_sendtype", "SMTP"),
            ("mail_smtpserver", smtp.host.as_str()),
            ("mail_smtpport", smtp.port.as_str()),
            ("mail_smtpuser", smtp.user.as_str()),
            ("mail_smtppass", smtp.password.as_str()),
            ("mail_smtpauth_req", "1"),
            ("mail_smtpssl", smtp_encryption_code(&smtp.protocol)),
            ("notify_fromname", smtp.notify_name.as_str()),
            ("notify_fromaddress", smtp.notify_address.as_str()),
        ];
        let page = self.client.post_form(SMTP_CONFIG_PATH, &fields).await?;
        match self.outcome("smtp-config", &page) {
            StepOutcome::Completed => Ok(()),
            StepOutcome::Rejected(reason) => Err(Error::StepRejected {
                step: "smtp-config".into(),
                reason,
            }),
        }
    }

    fn outcome(&self, step: &str, page: &PageResponse) -> StepOutcome {
        if !page.status.is_success() {
            warn!(step, status = %page.status, "wizard step returned non-2xx");
        }
        parse_outcome(&page.body, &self.markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_protocol_mapping() {
        assert_eq!(smtp_encryption_code("ssl"), "1");
        assert_eq!(smtp_encryption_code("SSL"), "1");
        assert_eq!(smtp_encryption_code("tls"), "2");
        assert_eq!(smtp_encryption_code("none"), "0");
        // Never an error at this stage, whatever the input.
        assert_eq!(smtp_encryption_code("starttls"), "0");
        assert_eq!(smtp_encryption_code(""), "0");
    }

    #[test]
    fn success_marker_completes_a_step() {
        let markers = OutcomeMarkers::default();
        let body = "<html><body><h1>Success!</h1></body></html>";
        assert_eq!(parse_outcome(body, &markers), StepOutcome::Completed);
    }

    #[test]
    fn success_wins_over_incidental_failure_words() {
        let markers = OutcomeMarkers::default();
        let body = "If the install had failed... but: Success!";
        assert_eq!(parse_outcome(body, &markers), StepOutcome::Completed);
    }

    #[test]
    fn failure_marker_is_named_in_the_reason() {
        let markers = OutcomeMarkers::default();
        let body = "PHP Fatal error: out of memory";
        match parse_outcome(body, &markers) {
            StepOutcome::Rejected(reason) => assert!(reason.contains("Fatal error")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn no_marker_at_all_is_a_rejection() {
        let markers = OutcomeMarkers::default();
        assert!(matches!(
            parse_outcome("<html>login page</html>", &markers),
            StepOutcome::Rejected(_),
        ));
    }
}
