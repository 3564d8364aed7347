//! # Stackform
//!
//! Stackform declares the infrastructure of a small serverless application on
//! AWS: an IAM role with an attached permissions policy, a Lambda function
//! packaged from a single source file, and an API Gateway route table in front
//! of it.
//!
//! The builders in this crate do not talk to a cloud themselves. Each one
//! turns its fields into [`ResourceRequest`]s and hands them to a
//! [`Provisioner`], the engine that actually creates resources. Two engines
//! ship with the crate:
//!
//! - [`DryRun`] records requests and answers with placeholder handles. It is
//!   what `plan` runs and what the tests use.
//! - [`aws::AwsProvisioner`] issues the create calls with the AWS SDK.
//!
//! The work that is owned here, rather than delegated to an engine, is small:
//!
//! - **Policy templating** ([`policy`]): `${name}` placeholders in JSON policy
//!   documents are replaced with literal values before parsing.
//! - **Package assembly** ([`package`]): a source file and an optional
//!   dependency archive are staged in a private temporary directory, zipped,
//!   and hashed so the engine can redeploy only on change.
//! - **Route validation** ([`apigateway`]): a route table with two routes on
//!   the same method and path is rejected before the API is requested.
//!
//! ## Error Handling
//!
//! Every fallible operation returns this crate's [`Error`]. Nothing is
//! retried; an error aborts the declaration pass.

pub mod apigateway;
pub mod aws;
pub mod iam;
pub mod lambda;
pub mod package;
pub mod policy;
pub mod provision;
pub mod utils;

pub use provision::{DryRun, Provisioner, ResourceHandle, ResourceRef, ResourceRequest, Tags};

/// Marker trait for userland errors.
pub trait UserError: core::fmt::Display + core::fmt::Debug + Send + Sync + 'static {}
impl<T: core::fmt::Display + core::fmt::Debug + Send + Sync + 'static> UserError for T {}

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
pub enum Error {
    #[snafu(display("{source}:\n{}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Other { source: anyhow::Error },

    #[snafu(display("Could not read '{path:?}': {source}"))]
    NotFound {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse '{path:?}' after substitution: {source}"))]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("I/O error at '{path:?}': {source}"))]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Archive error at '{path:?}': {source}"))]
    Archive {
        path: std::path::PathBuf,
        source: zip::result::ZipError,
    },

    #[snafu(display("Route is duplicated: {method} {path}"))]
    DuplicateRoute {
        method: apigateway::Method,
        path: String,
    },

    #[snafu(display("Error during '{name}' creation: {error}"))]
    Provision {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Resource '{name}' was created without a required '{output}'"))]
    MissingOutput { name: String, output: &'static str },

    #[snafu(display("Packaging task did not complete: {source}"))]
    Task { source: tokio::task::JoinError },
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Other { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
