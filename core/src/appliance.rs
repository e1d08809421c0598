//! One appliance connection bundled with its operation registry and schema
//! locations. This is what command front-ends hold on to.

use tracing::{debug, info};

use crate::catalog::{self, REQUEST_STATUS, REQUEST_STATUS_PATH};
use crate::client::{ApiResponse, ApplianceClient, ClientConfig};
use crate::endpoint::{
    operation_id, EndpointDescriptor, HttpMethod, ResolvedOperation, VersionCandidate,
};
use crate::error::{Error, OperationError, Result};
use crate::fetcher::fetch_schema;
use crate::invoker::{OperationInvoker, OperationRegistry, Payload};
use crate::job::{JobHandle, JobRecord};
use crate::orchestrator::{run_async_operation, RunOptions, RunOutcome};
use crate::resolver::{available_versions, resolve};
use crate::schema::{SchemaDocument, SchemaLocations};

#[derive(Debug, Clone)]
pub struct Appliance {
    client: ApplianceClient,
    registry: OperationRegistry,
    locations: SchemaLocations,
}

impl Appliance {
    pub fn new(
        client: ApplianceClient,
        registry: OperationRegistry,
        locations: SchemaLocations,
    ) -> Self {
        Self {
            client,
            registry,
            locations,
        }
    }

    /// Client for `config` with the built-in catalog and default schema locations.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Ok(Self::new(
            ApplianceClient::new(config)?,
            catalog::default_registry(),
            SchemaLocations::default(),
        ))
    }

    pub fn with_locations(mut self, locations: SchemaLocations) -> Self {
        self.locations = locations;
        self
    }

    pub fn client(&self) -> &ApplianceClient {
        &self.client
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn locations(&self) -> &SchemaLocations {
        &self.locations
    }

    pub async fn schema(&self) -> Result<SchemaDocument> {
        fetch_schema(&self.client, &self.locations).await
    }

    pub async fn resolve(
        &self,
        descriptor: &EndpointDescriptor,
        requested_version: Option<u32>,
        suffix: &str,
    ) -> Result<ResolvedOperation> {
        let schema = self.schema().await?;
        let version = resolve(&schema, descriptor, requested_version)?;
        info!(
            path = descriptor.path_template(),
            version = %version,
            suffix,
            "resolved operation"
        );
        Ok(ResolvedOperation::new(version, suffix))
    }

    pub async fn invoke(
        &self,
        version: &VersionCandidate,
        suffix: &str,
        payload: &Payload,
    ) -> Result<ApiResponse, OperationError> {
        OperationInvoker::new(&self.client, &self.registry)
            .invoke(version, suffix, payload)
            .await
    }

    /// Invokes a submission and reads the job handle from its response.
    pub async fn submit(
        &self,
        version: &VersionCandidate,
        suffix: &str,
        payload: &Payload,
    ) -> Result<JobHandle, OperationError> {
        let resp = self.invoke(version, suffix, payload).await?;
        let handle: JobHandle = resp.json()?;
        debug!(request_id = handle.request_id(), url = %resp.url, "submission accepted");
        Ok(handle)
    }

    /// One status query for `handle` using the given request-status version.
    pub async fn job_status(
        &self,
        version: &VersionCandidate,
        handle: &JobHandle,
    ) -> Result<JobRecord, OperationError> {
        let payload = Payload::default().path_param("id", handle.request_id());
        self.invoke(version, REQUEST_STATUS, &payload).await?.json()
    }

    /// Highest request-status version in `schema` that the registry has a
    /// binding for. The schema may advertise newer ones this client cannot call.
    pub fn status_version(&self, schema: &SchemaDocument) -> Result<VersionCandidate> {
        available_versions(schema, &EndpointDescriptor::get(REQUEST_STATUS_PATH))
            .into_iter()
            .rev()
            .find(|v| self.registry.lookup(&operation_id(v, REQUEST_STATUS)).is_some())
            .ok_or_else(|| Error::VersionNotFound {
                path: REQUEST_STATUS_PATH.to_string(),
                method: Some(HttpMethod::Get.as_str().to_string()),
                version: None,
            })
    }

    /// Resolves both the submission and the status endpoint from a single
    /// schema fetch, submits once and polls the handle to completion.
    pub async fn run(
        &self,
        descriptor: &EndpointDescriptor,
        suffix: &str,
        requested_version: Option<u32>,
        payload: &Payload,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let schema = self.schema().await?;
        let version = resolve(&schema, descriptor, requested_version)?;
        let status_version = self.status_version(&schema)?;
        info!(
            operation_id = %operation_id(&version, suffix),
            status_version = %status_version,
            "running async operation"
        );
        self.watch_with(
            self.submit(&version, suffix, payload),
            &status_version,
            options,
        )
        .await
    }

    /// Polls an existing job to completion; nothing is submitted.
    pub async fn watch(&self, handle: JobHandle, options: &RunOptions) -> Result<RunOutcome> {
        let schema = self.schema().await?;
        let status_version = self.status_version(&schema)?;
        self.watch_with(std::future::ready(Ok(handle)), &status_version, options)
            .await
    }

    async fn watch_with<S>(
        &self,
        submit: S,
        status_version: &VersionCandidate,
        options: &RunOptions,
    ) -> Result<RunOutcome>
    where
        S: std::future::Future<Output = std::result::Result<JobHandle, OperationError>>,
    {
        let this = self;
        let poll = move |h: &JobHandle| {
            let handle = h.clone();
            async move { this.job_status(status_version, &handle).await }
        };
        run_async_operation(submit, poll, options).await
    }
}
