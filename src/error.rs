//! Error taxonomy for the reconciliation engine.
//!
//! Each layer gets one `thiserror` enum (`ConsulError`, `DockerHostError`,
//! `AllocatorError`); the lifecycle engine's own [`LifecycleError`] wraps
//! them via `#[from]` and adds the error kinds from spec §7 that have no
//! natural home in a single collaborator (`Validation`, `Precondition`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsulError {
    #[error("coordination store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordination store value is not valid ASCII: {0}")]
    Decode(String),
    #[error("key not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum DockerHostError {
    #[error("container-host connection failed: {0}")]
    ConnectionFailed(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("network not found: {0}")]
    NetworkNotFound(String),
    #[error("bollard error: {0}")]
    Bollard(#[from] bollard::errors::Error),
    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),
    #[error("container-host call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("no host satisfies memsize {memsize} GiB with anti-affinity against {excluded:?}")]
    Capacity { memsize: f64, excluded: Vec<String> },
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Capacity(#[from] AllocatorError),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("exec failed: {0}")]
    ExecFailed(String),
    #[error(transparent)]
    Consul(#[from] ConsulError),
    #[error(transparent)]
    DockerHost(#[from] DockerHostError),
}

impl LifecycleError {
    /// True for errors that §7 says should be downgraded to an informational
    /// log when encountered by an idempotent remove/unregister step.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::NotFound(_))
            || matches!(self, LifecycleError::Consul(ConsulError::NotFound(_)))
            || matches!(
                self,
                LifecycleError::DockerHost(DockerHostError::ContainerNotFound(_))
            )
    }
}
