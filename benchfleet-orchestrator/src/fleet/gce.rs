//! Compute Engine control plane over the REST API

use async_trait::async_trait;
use benchfleet_client::ClientError;
use benchfleet_client::auth::TokenSource;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{ControlPlane, FleetError, Instance, InstanceSpec, Result};

const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";

pub struct GceControlPlane {
    client: Client,
    project: String,
    tokens: TokenSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    status: String,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceList {
    #[serde(default)]
    items: Vec<InstanceItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceItem {
    name: String,
    #[serde(default)]
    status: String,
}

impl GceControlPlane {
    pub fn new(project: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            client: Client::new(),
            project: project.into(),
            tokens,
        }
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/projects/{}/zones/{}", COMPUTE_API, self.project, zone)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.tokens.token(&self.client).await?;
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), message).into());
        }

        Ok(response.json().await?)
    }

    /// Blocks until a zone operation is done, surfacing its error if any
    async fn wait(&self, zone: &str, mut op: Operation) -> Result<()> {
        while op.status != "DONE" {
            debug!("Waiting for operation {} ({})", op.name, op.status);
            let url = format!("{}/operations/{}/wait", self.zone_url(zone), op.name);
            op = self.call(Method::POST, &url, None, &[]).await?;
        }

        match op.error {
            Some(error) if !error.errors.is_empty() => Err(FleetError::OperationFailed {
                operation: op.name,
                message: error
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
            _ => Ok(()),
        }
    }
}

/// Request body for `instances.insert`
fn instance_resource(project: &str, spec: &InstanceSpec) -> Value {
    let profile = &spec.profile;
    json!({
        "name": spec.name,
        "canIpForward": false,
        "machineType": format!(
            "projects/{}/zones/{}/machineTypes/{}",
            project, profile.zone, profile.machine_type
        ),
        "disks": [{
            "autoDelete": true,
            "boot": true,
            "deviceName": spec.name,
            "mode": "READ_WRITE",
            "type": "PERSISTENT",
            "initializeParams": {
                "diskSizeGb": profile.disk_size_gb.to_string(),
                "diskType": format!("projects/{}/zones/{}/diskTypes/pd-balanced", project, profile.zone),
                "sourceImage": format!("projects/{}/global/images/{}", project, profile.image),
            }
        }],
        "networkInterfaces": [{
            "stackType": "IPV4_ONLY",
            "subnetwork": format!("projects/{}/regions/{}/subnetworks/default", project, profile.region),
            "accessConfigs": [{
                "name": "External NAT",
                "networkTier": "PREMIUM",
            }]
        }],
        "metadata": {
            "items": [{
                "key": "startup-script-url",
                "value": spec.startup_script_url,
            }]
        },
        "serviceAccounts": [{
            "email": profile.service_account,
            "scopes": [STORAGE_SCOPE],
        }]
    })
}

#[async_trait]
impl ControlPlane for GceControlPlane {
    async fn create(&self, spec: &InstanceSpec) -> Result<()> {
        let zone = &spec.profile.zone;
        let body = instance_resource(&self.project, spec);
        let url = format!("{}/instances", self.zone_url(zone));

        let op: Operation = self.call(Method::POST, &url, Some(&body), &[]).await?;
        self.wait(zone, op).await
    }

    async fn list(&self, zone: &str) -> Result<Vec<Instance>> {
        let url = format!("{}/instances", self.zone_url(zone));
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match &page_token {
                Some(token) => vec![("pageToken", token.as_str())],
                None => Vec::new(),
            };
            let page: InstanceList = self.call(Method::GET, &url, None, &query).await?;

            instances.extend(page.items.into_iter().map(|item| Instance {
                name: item.name,
                status: item.status,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(instances)
    }

    async fn delete(&self, zone: &str, name: &str) -> Result<()> {
        let url = format!("{}/instances/{}", self.zone_url(zone), name);
        let op: Operation = self.call(Method::DELETE, &url, None, &[]).await?;
        self.wait(zone, op).await
    }
}
