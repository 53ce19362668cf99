use crate::db::storage::Storage;
use crate::error::PortalError;
use crate::types::SchemaVersion;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

pub type StepFuture<'a> = BoxFuture<'a, Result<(), PortalError>>;

/// One-time upgrade to `version`. The action may be empty.
pub struct UpgradeStep<S: ?Sized> {
    version: SchemaVersion,
    action: Box<dyn for<'a> Fn(&'a S) -> StepFuture<'a> + Send + Sync>,
}

impl<S: Storage + ?Sized> UpgradeStep<S> {
    pub fn new<F>(version: &str, action: F) -> Result<Self, PortalError>
    where
        F: for<'a> Fn(&'a S) -> StepFuture<'a> + Send + Sync + 'static,
    {
        Ok(Self {
            version: version.parse()?,
            action: Box::new(action),
        })
    }

    /// A step that only bumps the stored version.
    pub fn noop(version: &str) -> Result<Self, PortalError> {
        Self::new(version, |_| async { Ok(()) }.boxed())
    }

    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub applied: Vec<SchemaVersion>,
}

/// Applies ordered upgrade steps, each at most once per installation.
///
/// The installed version lives in a single option. When the option is absent
/// the installation is treated as `baseline`. The stored version is advanced
/// right after each step's action succeeds, so a failing step leaves the
/// marker at the last completed step and is retried on the next run.
pub struct VersionGate<'s, S: ?Sized> {
    storage: &'s S,
    option_key: String,
    baseline: SchemaVersion,
    steps: Vec<UpgradeStep<S>>,
}

impl<'s, S: Storage + ?Sized> VersionGate<'s, S> {
    pub fn new(
        storage: &'s S,
        option_key: &str,
        baseline: &str,
        steps: Vec<UpgradeStep<S>>,
    ) -> Result<Self, PortalError> {
        for pair in steps.windows(2) {
            if pair[0].version >= pair[1].version {
                return Err(PortalError::UnorderedSteps {
                    previous: pair[0].version.to_string(),
                    next: pair[1].version.to_string(),
                });
            }
        }
        Ok(Self {
            storage,
            option_key: option_key.to_string(),
            baseline: baseline.parse()?,
            steps,
        })
    }

    /// Latest version any step knows about, or the baseline.
    pub fn target(&self) -> &SchemaVersion {
        self.steps
            .last()
            .map(UpgradeStep::version)
            .unwrap_or(&self.baseline)
    }

    pub async fn installed_version(&self) -> Result<SchemaVersion, PortalError> {
        match self.storage.get_option(&self.option_key).await? {
            Some(stored) => stored.parse(),
            None => Ok(self.baseline.clone()),
        }
    }

    pub async fn upgrade(&self) -> Result<UpgradeReport, PortalError> {
        let from = self.installed_version().await?;
        let mut current = from.clone();
        let mut applied = Vec::new();

        for step in &self.steps {
            if current >= step.version {
                debug!(installed = %current, step = %step.version, "upgrade step already satisfied");
                continue;
            }

            info!(installed = %current, step = %step.version, "running upgrade step");
            if let Err(e) = (step.action)(self.storage).await {
                warn!(step = %step.version, error = %e, "upgrade step failed; version not advanced");
                return Err(PortalError::UpgradeStep {
                    version: step.version.to_string(),
                    source: Box::new(e),
                });
            }

            self.storage
                .set_option(&self.option_key, &step.version.to_string())
                .await?;
            current = step.version.clone();
            applied.push(current.clone());
        }

        Ok(UpgradeReport {
            from,
            to: current,
            applied,
        })
    }
}
