//! The resource-creation engine contract.
//!
//! Builders describe what they want as [`ResourceRequest`]s. A [`Provisioner`]
//! turns each request into a [`ResourceHandle`], an opaque reference to the
//! (possibly not yet materialized) resource. Nothing in this crate inspects a
//! handle beyond its identifier, ARN and submitted fields.
use std::{collections::BTreeMap, future::Future, path::PathBuf, sync::Mutex};

use crate::{apigateway::Route, Error, Result, UserError};

/// Resource tags, applied to every resource a builder requests.
pub type Tags = BTreeMap<String, String>;

/// The kinds of resource the builders request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Role,
    Policy,
    PolicyAttachment,
    LogGroup,
    Function,
    RestApi,
}

impl ResourceKind {
    /// The AWS service namespace the resource lives in.
    pub fn service(&self) -> &'static str {
        match self {
            ResourceKind::Role | ResourceKind::Policy | ResourceKind::PolicyAttachment => "iam",
            ResourceKind::LogGroup => "logs",
            ResourceKind::Function => "lambda",
            ResourceKind::RestApi => "apigateway",
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResourceKind::Role => "role",
            ResourceKind::Policy => "policy",
            ResourceKind::PolicyAttachment => "policy attachment",
            ResourceKind::LogGroup => "log group",
            ResourceKind::Function => "function",
            ResourceKind::RestApi => "rest api",
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoleSpec {
    pub name: String,
    /// Compact JSON text of the trust policy.
    pub assume_role_policy: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PolicySpec {
    pub name: String,
    /// Compact JSON text of the policy document.
    pub policy: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PolicyAttachmentSpec {
    pub name: String,
    /// Names of the roles the policy is attached to.
    pub roles: Vec<String>,
    pub policy_arn: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogGroupSpec {
    pub name: String,
    pub retention_in_days: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "Text",
            LogFormat::Json => "JSON",
        }
    }
}

/// Function logging settings.
///
/// There is no system log level: the `Text` format does not accept one.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoggingConfig {
    pub log_format: LogFormat,
    pub log_group: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// ARN of the execution role.
    pub role: String,
    /// Path of the zipped deployment package.
    pub code: PathBuf,
    /// Base64 sha256 of `code`, used to redeploy only on change.
    pub source_code_hash: String,
    pub handler: String,
    pub runtime: String,
    pub timeout: i32,
    pub logging_config: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RestApiSpec {
    pub name: String,
    pub stage_name: String,
    pub routes: Vec<Route>,
}

/// What is being requested, with its resource specific fields.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Role(RoleSpec),
    Policy(PolicySpec),
    PolicyAttachment(PolicyAttachmentSpec),
    LogGroup(LogGroupSpec),
    Function(FunctionSpec),
    RestApi(RestApiSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Role(_) => ResourceKind::Role,
            ResourceSpec::Policy(_) => ResourceKind::Policy,
            ResourceSpec::PolicyAttachment(_) => ResourceKind::PolicyAttachment,
            ResourceSpec::LogGroup(_) => ResourceKind::LogGroup,
            ResourceSpec::Function(_) => ResourceKind::Function,
            ResourceSpec::RestApi(_) => ResourceKind::RestApi,
        }
    }

    /// The name the resource carries on the platform.
    pub fn physical_name(&self) -> &str {
        match self {
            ResourceSpec::Role(s) => &s.name,
            ResourceSpec::Policy(s) => &s.name,
            ResourceSpec::PolicyAttachment(s) => &s.name,
            ResourceSpec::LogGroup(s) => &s.name,
            ResourceSpec::Function(s) => &s.name,
            ResourceSpec::RestApi(s) => &s.name,
        }
    }
}

/// A reference to a resource, as stored in other resources' fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ResourceRef {
    /// Name of the request that produced the resource.
    pub name: String,
    pub id: String,
    pub arn: Option<String>,
}

impl From<&ResourceHandle> for ResourceRef {
    fn from(handle: &ResourceHandle) -> Self {
        ResourceRef {
            name: handle.name.clone(),
            id: handle.id.clone(),
            arn: handle.arn.clone(),
        }
    }
}

/// A named request for one resource.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceRequest {
    /// Name of the request from the user's perspective.
    pub name: String,
    pub spec: ResourceSpec,
    pub tags: Tags,
    /// Resources that must exist before this one.
    pub depends_on: Vec<ResourceRef>,
    /// Named provider context to create the resource with.
    pub provider: Option<String>,
}

impl ResourceRequest {
    pub fn new(name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            tags: Tags::default(),
            depends_on: vec![],
            provider: None,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<ResourceRef>) -> Self {
        let dependency = dependency.into();
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }
}

/// The engine's answer to a [`ResourceRequest`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceHandle {
    pub name: String,
    pub kind: ResourceKind,
    pub id: String,
    pub arn: Option<String>,
    pub tags: Tags,
    /// The submitted spec, plus any outputs the engine reported.
    pub state: serde_json::Value,
}

impl ResourceHandle {
    /// Builds a handle for `request`, merging `outputs` over the submitted
    /// fields.
    pub fn new(
        request: &ResourceRequest,
        id: impl Into<String>,
        arn: Option<String>,
        outputs: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut state = match serde_json::to_value(&request.spec) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::default(),
        };
        state.remove("kind");
        state.extend(outputs);
        Self {
            name: request.name.clone(),
            kind: request.spec.kind(),
            id: id.into(),
            arn,
            tags: request.tags.clone(),
            state: serde_json::Value::Object(state),
        }
    }

    /// Looks up a submitted field or engine output.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::from(self)
    }
}

/// A resource-creation engine.
pub trait Provisioner {
    /// Errors that may occur interacting with the platform.
    type Error: UserError;

    /// Requests creation of one resource.
    fn provision(
        &self,
        request: ResourceRequest,
    ) -> impl Future<Output = Result<ResourceHandle, Self::Error>>;
}

/// Submits `request` to `engine`, wrapping any failure in
/// [`Error::Provision`].
pub(crate) async fn submit<P: Provisioner>(
    engine: &P,
    request: ResourceRequest,
) -> Result<ResourceHandle> {
    let name = request.name.clone();
    log::info!("requesting {} '{name}'", request.spec.kind());
    let handle = engine
        .provision(request)
        .await
        .map_err(|error| Error::Provision {
            name: name.clone(),
            error: Box::new(error),
        })?;
    log::debug!("  '{name}' is {}", handle.id);
    Ok(handle)
}

/// An engine that records requests instead of creating anything.
///
/// Handles get the id `<name>_id` and the ARN `arn:dryrun:<service>:<name>`,
/// where `<name>` is the resource's platform name, and carry the submitted
/// fields as their state.
#[derive(Debug, Default)]
pub struct DryRun {
    requests: Mutex<Vec<ResourceRequest>>,
    reject: Option<String>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dry run that fails the request named `name`.
    pub fn rejecting(name: impl Into<String>) -> Self {
        Self {
            requests: Default::default(),
            reject: Some(name.into()),
        }
    }

    /// Every request seen so far, in submission order.
    pub fn requests(&self) -> Vec<ResourceRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The request named `name`, if one was seen.
    pub fn request(&self, name: &str) -> Option<ResourceRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|request| request.name == name)
            .cloned()
    }
}

impl Provisioner for DryRun {
    type Error = String;

    async fn provision(&self, request: ResourceRequest) -> Result<ResourceHandle, Self::Error> {
        if self.reject.as_deref() == Some(request.name.as_str()) {
            return Err(format!("dry run rejected '{}'", request.name));
        }
        let physical_name = request.spec.physical_name().to_owned();
        let arn = format!(
            "arn:dryrun:{}:{physical_name}",
            request.spec.kind().service()
        );
        let handle = ResourceHandle::new(
            &request,
            format!("{physical_name}_id"),
            Some(arn),
            Default::default(),
        );
        self.requests.lock().unwrap().push(request);
        Ok(handle)
    }
}
