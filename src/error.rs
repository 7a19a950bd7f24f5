use std::fmt::Debug;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },
    #[error("Failed to load in-cluster configuration: {0}")]
    InClusterConfig(#[from] kube::config::InClusterError),
    #[error("{0}")]
    UserInput(String),
    #[error("Unnamed k8s object")]
    UnnamedObject,
    #[error("StatefulSet '{statefulset}' has no pod template spec")]
    MissingPodSpec { statefulset: String },
    #[error("StatefulSet '{statefulset}' has no container named '{container}'")]
    MissingContainer { statefulset: String, container: String },

    /// The Pebble socket of a workload container could not be reached. Handlers defer the
    /// current hook when they see this.
    #[error("Pebble in container '{container}' is not reachable: {source}")]
    WorkloadUnavailable {
        container: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Pebble API error ({code}): {message}")]
    Pebble { code: u16, message: String },
    #[error("Hook tool '{tool}' failed: {message}")]
    HookTool { tool: String, message: String },
    #[error("Unknown hook '{0}'")]
    UnknownHook(String),
    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for errors of the binary and of custom handlers
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Returns the HTTP status code when the error is an API error reported by Kubernetes.
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(response),
            } => Some(response.code),
            _ => None,
        }
    }

    /// The service account lacks the RBAC permissions for the request.
    pub fn is_forbidden(&self) -> bool {
        self.api_code() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::Http(e.to_string())
    }
}
