//! Orchestrator - applies a configuration file to every switch it names
//!
//! Per switch, in name order:
//! login → backup (optional, written to disk before any change) →
//! reconcile → restore from that backup on failure (optional) → logout.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use prosafe_common::{SwitchDriver, SwitchError, SwitchInfo, SwitchResult};

use crate::config::{Config, SwitchConfig};
use crate::plan::ReconcilePlan;
use crate::reconciler::{ReconcileReport, VlanReconciler};

/// Builds the driver for a configured switch.
pub trait DriverFactory {
    fn create(&self, switch: &SwitchConfig, timeout: Duration)
        -> SwitchResult<Box<dyn SwitchDriver>>;
}

/// Factory for real switches, talking HTTP to their web UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpDriverFactory;

impl DriverFactory for HttpDriverFactory {
    fn create(
        &self,
        switch: &SwitchConfig,
        timeout: Duration,
    ) -> SwitchResult<Box<dyn SwitchDriver>> {
        prosafe_drivers::connect(switch.model, &switch.address, &switch.password, timeout)
    }
}

/// Why a switch failed
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error("Failed to write backup {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to the restore after a failed reconcile
#[derive(Debug)]
pub enum RestoreOutcome {
    /// Not requested, or no backup was taken
    Skipped,
    Restored,
    Failed(SwitchError),
}

/// Result of processing one switch
#[derive(Debug)]
pub enum SwitchStatus {
    Applied(ReconcileReport),
    /// Dry run: the plan that would have been applied
    Planned(ReconcilePlan),
    Failed {
        error: ApplyError,
        restore: RestoreOutcome,
    },
    /// Not processed because an earlier switch failed
    Skipped,
}

#[derive(Debug)]
pub struct SwitchOutcome {
    pub name: String,
    pub status: SwitchStatus,
}

impl SwitchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            SwitchStatus::Applied(_) | SwitchStatus::Planned(_)
        )
    }
}

/// Outcomes of one `apply` run, in processing order
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub outcomes: Vec<SwitchOutcome>,
}

impl ApplySummary {
    /// True only if every switch was processed successfully
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(SwitchOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SwitchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Run options, usually from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Directory receiving `<switch>.cfg` backups; no backup when `None`
    pub backup_dir: Option<PathBuf>,
    /// Upload the backup again when reconciliation fails
    pub restore_on_failure: bool,
    /// Process remaining switches after a failure (ORed with the file option)
    pub continue_on_error: bool,
    /// Compute and report plans only
    pub dry_run: bool,
}

/// Applies configurations switch by switch.
pub struct Orchestrator<F: DriverFactory> {
    factory: F,
    options: ApplyOptions,
}

impl<F: DriverFactory> Orchestrator<F> {
    pub fn new(factory: F, options: ApplyOptions) -> Self {
        Self { factory, options }
    }

    /// Backup file of `switch` under `dir`
    pub fn backup_path(dir: &Path, switch: &str) -> PathBuf {
        dir.join(format!("{}.cfg", switch))
    }

    /// Processes every switch of `config` in name order.
    ///
    /// Stops at the first failed switch unless continuing on error is
    /// enabled, marking the rest as skipped.
    pub async fn apply(&self, config: &Config) -> ApplySummary {
        let continue_on_error = self.options.continue_on_error || config.options.continue_on_error;
        let timeout = config.options.timeout();
        let mut summary = ApplySummary::default();
        let mut aborted = false;

        for (name, switch) in &config.switches {
            let status = if aborted {
                SwitchStatus::Skipped
            } else {
                self.process(switch, timeout).await
            };
            let outcome = SwitchOutcome {
                name: name.clone(),
                status,
            };
            if !aborted && !outcome.is_success() && !continue_on_error {
                error!("Switch {} failed, skipping remaining switches", name);
                aborted = true;
            }
            summary.outcomes.push(outcome);
        }
        summary
    }

    #[instrument(skip(self, switch, timeout), fields(switch = %switch.name))]
    async fn process(&self, switch: &SwitchConfig, timeout: Duration) -> SwitchStatus {
        let mut driver = match self.factory.create(switch, timeout) {
            Ok(driver) => driver,
            Err(e) => return failed(e.into(), RestoreOutcome::Skipped),
        };

        let status = self.run_session(driver.as_mut(), switch).await;
        driver.logout().await;

        match &status {
            SwitchStatus::Failed { error, restore } => {
                error!("Failed: {} (restore: {:?})", error, restore)
            }
            _ => info!("Done"),
        }
        status
    }

    async fn run_session(
        &self,
        driver: &mut dyn SwitchDriver,
        switch: &SwitchConfig,
    ) -> SwitchStatus {
        if let Err(e) = driver.login().await {
            return failed(e.into(), RestoreOutcome::Skipped);
        }
        let desired = switch.desired_state();

        if self.options.dry_run {
            return match VlanReconciler::new(&mut *driver).dry_run(&desired).await {
                Ok(plan) => SwitchStatus::Planned(plan),
                Err(e) => failed(e.into(), RestoreOutcome::Skipped),
            };
        }

        let backup = match self.take_backup(&mut *driver, &switch.name).await {
            Ok(backup) => backup,
            Err(e) => return failed(e, RestoreOutcome::Skipped),
        };

        let result = VlanReconciler::new(&mut *driver).reconcile(&desired).await;
        match result {
            Ok(report) => SwitchStatus::Applied(report),
            Err(e) => {
                let restore = self.restore(driver, backup.as_deref()).await;
                failed(e.into(), restore)
            }
        }
    }

    /// Captures the configuration and writes it to disk, if a backup
    /// directory is set and the model supports it.
    async fn take_backup(
        &self,
        driver: &mut dyn SwitchDriver,
        name: &str,
    ) -> Result<Option<Vec<u8>>, ApplyError> {
        let Some(dir) = &self.options.backup_dir else {
            return Ok(None);
        };

        let blob = match driver.backup().await {
            Ok(blob) => blob,
            Err(SwitchError::Unsupported { model, .. }) => {
                warn!("{} has no configuration backup, continuing without one", model);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let path = Self::backup_path(dir, name);
        let written = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::write(&path, &blob).await,
            Err(e) => Err(e),
        };
        written.map_err(|source| ApplyError::Backup {
            path: path.clone(),
            source,
        })?;

        info!(bytes = blob.len(), "Backup written to {}", path.display());
        Ok(Some(blob))
    }

    async fn restore(&self, driver: &mut dyn SwitchDriver, backup: Option<&[u8]>) -> RestoreOutcome {
        if !self.options.restore_on_failure {
            return RestoreOutcome::Skipped;
        }
        let Some(blob) = backup else {
            warn!("No backup taken, cannot restore");
            return RestoreOutcome::Skipped;
        };

        warn!("Restoring configuration from backup");
        match driver.restore(blob).await {
            Ok(()) => {
                info!("Configuration restored");
                RestoreOutcome::Restored
            }
            Err(e) => {
                error!("Restore failed: {}", e);
                RestoreOutcome::Failed(e)
            }
        }
    }

    /// Logs in to `switch` and reads its descriptive properties
    #[instrument(skip(self, switch, timeout), fields(switch = %switch.name))]
    pub async fn switch_info(
        &self,
        switch: &SwitchConfig,
        timeout: Duration,
    ) -> SwitchResult<SwitchInfo> {
        let mut driver = self.factory.create(switch, timeout)?;
        let result = match driver.login().await {
            Ok(()) => driver.fetch_information().await,
            Err(e) => Err(e),
        };
        driver.logout().await;
        result
    }
}

fn failed(error: ApplyError, restore: RestoreOutcome) -> SwitchStatus {
    SwitchStatus::Failed { error, restore }
}
