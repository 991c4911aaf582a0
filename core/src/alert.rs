//! Alerting — compose and dispatch a run summary to a distribution list.
//!
//! The mail transport is an external collaborator behind the `Mailer`
//! trait. Delivery failures are logged per recipient and never
//! propagate; an empty recipient list is a logged no-op. The triggering
//! workflow is never blocked or failed by alerting.

use crate::model::ReconciliationRun;

/// Outbound mail seam. Implementations live outside this crate
/// (SMTP relay, provider API); tests record or fail on purpose.
pub trait Mailer {
    fn send_mail(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Writes the message to the log instead of sending it. Used when no
/// real transport is wired in (headless runs).
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_mail(&self, to: &str, subject: &str, _html: &str) -> anyhow::Result<()> {
        log::info!("mail to {to}: {subject}");
        Ok(())
    }
}

pub struct Alerter {
    recipients: Vec<String>,
    mailer: Box<dyn Mailer>,
}

impl Alerter {
    pub fn new(recipients: Vec<String>, mailer: Box<dyn Mailer>) -> Self {
        Self { recipients, mailer }
    }

    /// Send one summary mail per recipient. Counts only: the body
    /// carries nothing beyond what the run summary already holds.
    pub fn alert_run(&self, run: &ReconciliationRun, reason: &str) {
        if self.recipients.is_empty() {
            log::info!(
                "run {}: no alert recipients configured, skipping notification",
                run.id
            );
            return;
        }

        let discrepancies = run.summary.orphaned_webhook_count
            + run.summary.missing_webhook_count
            + run.summary.amount_mismatch_count;
        let subject = format!(
            "Reconciliation run {}: {discrepancies} discrepancies",
            run.id
        );
        let html = compose_html(run, reason);

        for recipient in &self.recipients {
            if let Err(e) = self.mailer.send_mail(recipient, &subject, &html) {
                log::warn!("alert for run {} not delivered to {recipient}: {e}", run.id);
            }
        }
    }
}

fn compose_html(run: &ReconciliationRun, reason: &str) -> String {
    let s = &run.summary;
    format!(
        "<h2>Payment reconciliation run {}</h2>\
         <p>Reason: {}</p>\
         <p>Provider: {}</p>\
         <p>Status: {}</p>\
         <ul>\
         <li>Total payments: {}</li>\
         <li>Total webhooks: {}</li>\
         <li>Matched: {}</li>\
         <li>Orphaned webhooks: {}</li>\
         <li>Missing webhooks: {}</li>\
         <li>Amount mismatches: {}</li>\
         </ul>",
        run.id,
        reason,
        run.provider.as_deref().unwrap_or("all"),
        run.status.as_str(),
        s.total_payments,
        s.total_webhooks,
        s.matched_count,
        s.orphaned_webhook_count,
        s.missing_webhook_count,
        s.amount_mismatch_count,
    )
}
