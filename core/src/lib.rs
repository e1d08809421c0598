//! Version resolution and async job orchestration for an HCI appliance
//! management API.
//!
//! The appliance serves the same logical operation under several
//! incompatible API versions at once, and mutating operations answer with a
//! request id that has to be polled. This crate picks the version to call
//! from the appliance's own API description, invokes registered operations,
//! and watches submitted jobs to a terminal state.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.

pub mod appliance;
pub mod catalog;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod fetcher;
pub mod invoker;
pub mod job;
pub mod literal;
pub mod orchestrator;
pub mod poller;
pub mod reducer;
pub mod resolver;
pub mod schema;

pub use appliance::Appliance;
pub use client::{ApiResponse, ApplianceClient, ClientConfig, Credentials};
pub use endpoint::{EndpointDescriptor, HttpMethod, ResolvedOperation, VersionCandidate};
pub use error::{Error, OperationError, Result};
pub use fetcher::fetch_schema;
pub use invoker::{OperationInvoker, OperationRegistry, Payload, RestBinding};
pub use job::{JobHandle, JobRecord, JobState};
pub use orchestrator::{
    resolve_operation, resolve_version, run_async_operation, AlreadyCompleteRule, RunOptions,
    RunOutcome,
};
pub use poller::{JobPoller, PollOutcome, PollPolicy, PollProfile, PollReport, PollState};
pub use reducer::{reduce, DecodedField, JobOutcome};
pub use resolver::{available_versions, available_versions_with, resolve, resolve_with, PathMatch};
pub use schema::{SchemaDocument, SchemaLocations};
