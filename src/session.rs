use std::fmt;
use std::io::Write;

use anyhow::Result;

use crate::cancel::CancelFlag;
use crate::model::config::ReactivatePolicy;
use crate::model::update::PendingUpdate;
use crate::plugin::{Activation, UpdateSource, UpgradeExecutor, UpgradeOptions};
use crate::prompt::{LineSource, ReadLine};

pub const NO_UPDATES: &str = "No plugins require updates.";
pub const QUESTION: &str = "Would you like to upgrade this plugin (y/n)?";
pub const AFFIRMATIVE: &str = "y";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub prompted: usize,
    pub upgraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// One interactive pass over the pending updates.
pub struct Session<'a> {
    source: &'a mut dyn UpdateSource,
    upgrader: &'a mut dyn UpgradeExecutor,
    activation: &'a mut dyn Activation,
    input: &'a mut dyn LineSource,
    out: &'a mut dyn Write,
    policy: ReactivatePolicy,
    cancel: CancelFlag,
}

impl<'a> Session<'a> {
    pub fn new(
        source: &'a mut dyn UpdateSource,
        upgrader: &'a mut dyn UpgradeExecutor,
        activation: &'a mut dyn Activation,
        input: &'a mut dyn LineSource,
        out: &'a mut dyn Write,
    ) -> Self {
        Self {
            source,
            upgrader,
            activation,
            input,
            out,
            policy: ReactivatePolicy::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_policy(mut self, policy: ReactivatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(mut self) -> Result<SessionReport> {
        let pending = self.source.list_pending()?;
        let mut report = SessionReport::default();

        if pending.is_empty() {
            self.say(format_args!("{NO_UPDATES}"));
            tracing::info!("no pending updates");
            return Ok(report);
        }

        tracing::info!("{} pending updates", pending.len());

        for update in &pending {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            self.say(format_args!("{} -> {}", update.plugin_id, update.new_version));
            self.say(format_args!("{QUESTION}"));
            report.prompted += 1;

            if self.confirmed(update, &mut report) {
                if self.upgrade_one(update) {
                    report.upgraded += 1;
                } else {
                    report.failed += 1;
                }
            } else {
                report.skipped += 1;
            }

            self.say(format_args!(""));
        }

        report.cancelled |= self.cancel.is_cancelled() && report.prompted < pending.len();
        report.skipped += pending.len() - report.prompted;

        if let Err(err) = self.source.invalidate() {
            tracing::warn!("could not invalidate update cache: {err}");
            self.say(format_args!(
                "Warning: could not refresh update information: {err}"
            ));
        }

        tracing::info!(
            upgraded = report.upgraded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "session finished"
        );
        Ok(report)
    }

    /// Writes one line to the operator. A broken output stream is logged and
    /// the session carries on.
    fn say(&mut self, line: fmt::Arguments<'_>) {
        let written = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
        if let Err(err) = written {
            tracing::warn!("could not write to output: {err}");
        }
    }

    fn confirmed(&mut self, update: &PendingUpdate, report: &mut SessionReport) -> bool {
        match self.input.read_line() {
            ReadLine::Line(answer) => answer.trim() == AFFIRMATIVE,
            ReadLine::Eof => {
                tracing::debug!(plugin = %update.plugin_id, "input closed, skipping");
                false
            }
            ReadLine::TimedOut => {
                tracing::info!(plugin = %update.plugin_id, "prompt timed out, skipping");
                false
            }
            ReadLine::Cancelled => {
                tracing::info!(plugin = %update.plugin_id, "cancelled at prompt, skipping");
                report.cancelled = true;
                false
            }
        }
    }

    /// Deactivate, upgrade, reactivate. Returns whether the upgrade succeeded.
    ///
    /// A plugin that cannot be deactivated is never handed to the upgrader.
    fn upgrade_one(&mut self, update: &PendingUpdate) -> bool {
        let id = &update.plugin_id;

        if let Err(err) = self.activation.deactivate(id) {
            tracing::warn!(plugin = %id, "deactivate failed, not upgrading: {err}");
            self.say(format_args!("Could not deactivate {id}: {err}"));
            self.say(format_args!("{id} was not upgraded."));
            return false;
        }

        let outcome = self.upgrader.upgrade(
            id,
            UpgradeOptions {
                invalidate_after: false,
            },
        );
        let upgraded = outcome.success();
        if let Some(detail) = outcome.error_detail() {
            self.say(format_args!(
                "Upgrade failed for {}: {detail}",
                outcome.plugin_id
            ));
        }

        if self.policy.should_reactivate(upgraded) {
            if let Err(err) = self.activation.activate(id) {
                tracing::warn!(plugin = %id, "reactivate failed: {err}");
                self.say(format_args!("Could not reactivate {id}: {err}"));
            }
        } else if upgraded {
            self.say(format_args!("{id} was left inactive; reactivate it manually."));
        } else {
            self.say(format_args!("{id} was left inactive."));
        }

        upgraded
    }
}
