//! adi-providers: abstractions over the two external subprocess families
//! the daemon drives (spec.md §1) — the container runtime used for
//! preprocessing, and the image repository's session/import-CLI/
//! managed-tree surface. Both are modeled as small traits with a single
//! CLI-backed implementation, so `adi-adapters` and `adi-policies` can be
//! tested against mocks instead of a real `podman`/`omero` binary.

pub mod container_runtime;
pub mod error;
pub mod omero_gateway;

pub use container_runtime::{BindMount, CapturedOutput, CliContainerRuntime, ContainerInvocation, ContainerRuntime};
pub use error::ProviderError;
pub use omero_gateway::{
    CliOmeroGateway, DestinationRef, ImportInvocation, ImportOutcome, ManagedSymlink, OmeroGateway,
    SessionHandle,
};
