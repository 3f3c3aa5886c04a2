//! In-memory control plane for tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ControlPlane, FleetError, Instance, InstanceSpec, MachineProfile, Result};

/// Instance names of a single zone, plus every deletion in order
#[derive(Default)]
pub struct FakeControlPlane {
    instances: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_on_create: Option<String>,
}

impl FakeControlPlane {
    pub fn with(existing: &[&str]) -> Self {
        Self {
            instances: Mutex::new(existing.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Makes creating the instance called `name` fail
    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_on_create = Some(name.to_string());
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.instances.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create(&self, spec: &InstanceSpec) -> Result<()> {
        if self.fail_on_create.as_deref() == Some(spec.name.as_str()) {
            return Err(FleetError::OperationFailed {
                operation: format!("insert-{}", spec.name),
                message: "QUOTA_EXCEEDED".to_string(),
            });
        }
        self.instances.lock().unwrap().push(spec.name.clone());
        Ok(())
    }

    async fn list(&self, _zone: &str) -> Result<Vec<Instance>> {
        Ok(self
            .names()
            .into_iter()
            .map(|name| Instance {
                name,
                status: "RUNNING".to_string(),
            })
            .collect())
    }

    async fn delete(&self, _zone: &str, name: &str) -> Result<()> {
        self.instances.lock().unwrap().retain(|n| n != name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

pub fn profile() -> MachineProfile {
    MachineProfile {
        project: "bench-project".to_string(),
        region: "europe-west3".to_string(),
        zone: "europe-west3-c".to_string(),
        image: "bench-image".to_string(),
        machine_type: "e2-standard-2".to_string(),
        disk_size_gb: 20,
        service_account: "default".to_string(),
    }
}
