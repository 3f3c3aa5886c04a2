//! Fleet lifecycle
//!
//! Creates the worker instances of an experiment and deletes exactly those
//! instances again once it is over. The cloud API sits behind
//! [`ControlPlane`] so the lifecycle rules can be exercised without a cloud.

#[cfg(test)]
pub mod fake;
pub mod gce;

use async_trait::async_trait;
use benchfleet_client::ClientError;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

pub use gce::GceControlPlane;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
}

pub type Result<T> = std::result::Result<T, FleetError>;

/// Machine shape shared by every worker of an experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineProfile {
    pub project: String,
    pub region: String,
    pub zone: String,
    pub image: String,
    pub machine_type: String,
    pub disk_size_gb: u32,
    pub service_account: String,
}

/// Everything needed to create one worker instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub startup_script_url: String,
    pub profile: MachineProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub status: String,
}

/// Compute API used by the fleet manager
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates an instance, returning once the remote operation is done
    async fn create(&self, spec: &InstanceSpec) -> Result<()>;

    /// Lists every instance in `zone`
    async fn list(&self, zone: &str) -> Result<Vec<Instance>>;

    /// Deletes an instance, returning once the remote operation is done
    async fn delete(&self, zone: &str, name: &str) -> Result<()>;
}

/// Name of the `index`-th worker of the orchestrator `base`
pub fn instance_name(base: &str, index: u32) -> String {
    format!("{}-instance-{}", base, index)
}

pub struct FleetManager {
    control: Arc<dyn ControlPlane>,
    profile: MachineProfile,
    provisioned: Mutex<Vec<String>>,
}

impl FleetManager {
    pub fn new(control: Arc<dyn ControlPlane>, profile: MachineProfile) -> Self {
        Self {
            control,
            profile,
            provisioned: Mutex::new(Vec::new()),
        }
    }

    /// Creates `count` workers one after another
    ///
    /// # Arguments
    /// * `base` - Orchestrator instance name the workers are named after
    /// * `count` - Number of workers
    /// * `startup_script_url` - Launcher each worker runs on boot
    ///
    /// # Returns
    /// The names of the created workers
    pub async fn provision(
        &self,
        base: &str,
        count: u32,
        startup_script_url: &str,
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(count as usize);

        for index in 0..count {
            let spec = InstanceSpec {
                name: instance_name(base, index),
                startup_script_url: startup_script_url.to_string(),
                profile: self.profile.clone(),
            };

            info!("Creating instance {}", spec.name);
            self.control.create(&spec).await?;
            debug!("Finished creating instance {}", spec.name);

            self.provisioned
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(spec.name.clone());
            names.push(spec.name);
        }

        Ok(names)
    }

    /// Names of every instance created so far, including those of a
    /// provisioning call that failed part way
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deletes the instances of the zone whose names are in `names`
    ///
    /// Instances not in `names` are never touched, so the orchestrator's own
    /// instance and unrelated machines survive.
    ///
    /// # Returns
    /// The number of deleted instances
    pub async fn decommission(&self, names: &[String]) -> Result<usize> {
        info!("Removing {} instances", names.len());
        let zone = &self.profile.zone;
        let mut removed = 0;

        for instance in self.control.list(zone).await? {
            if !names.contains(&instance.name) {
                continue;
            }
            debug!("Removing instance {}", instance.name);
            self.control.delete(zone, &instance.name).await?;
            removed += 1;
        }

        info!("Finished removing {} instances", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeControlPlane, profile};
    use super::*;

    #[tokio::test]
    async fn test_provision_names_workers() {
        let control = Arc::new(FakeControlPlane::with(&[]));
        let fleet = FleetManager::new(control.clone(), profile());

        let names = fleet
            .provision("orchestrator", 3, "https://example/startup.sh")
            .await
            .unwrap();

        assert_eq!(
            names,
            vec![
                "orchestrator-instance-0",
                "orchestrator-instance-1",
                "orchestrator-instance-2"
            ]
        );
        assert_eq!(control.names(), names);
        assert_eq!(fleet.provisioned(), names);
    }

    #[tokio::test]
    async fn test_decommission_only_touches_listed_instances() {
        let control = Arc::new(FakeControlPlane::with(&["other-instance-9"]));
        let fleet = FleetManager::new(control.clone(), profile());

        let names = fleet.provision("orch", 2, "url").await.unwrap();
        assert_eq!(
            control.names(),
            vec!["other-instance-9", "orch-instance-0", "orch-instance-1"]
        );

        let removed = fleet.decommission(&names).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(control.names(), vec!["other-instance-9"]);
        assert_eq!(control.deleted(), vec!["orch-instance-0", "orch-instance-1"]);
    }

    #[tokio::test]
    async fn test_failed_create_keeps_partial_fleet() {
        let control = Arc::new(FakeControlPlane::with(&[]).failing_on("orchestrator-instance-1"));
        let fleet = FleetManager::new(control.clone(), profile());

        let err = fleet.provision("orchestrator", 3, "url").await.unwrap_err();
        assert!(matches!(err, FleetError::OperationFailed { .. }));
        assert_eq!(fleet.provisioned(), vec!["orchestrator-instance-0"]);

        fleet.decommission(&fleet.provisioned()).await.unwrap();
        assert!(control.names().is_empty());
    }
}
