//! Stackform for AWS.
//!
//! [`AwsProvisioner`] creates each requested resource with the AWS SDK. It
//! only creates: updating, deleting and retrying are left to whoever runs
//! it.
use std::collections::HashMap;

use anyhow::Context;
pub use aws_config::SdkConfig;

use crate::{provision::ResourceSpec, Provisioner, ResourceHandle, ResourceRequest};

pub mod apigatewayv2;
pub mod iam;
pub mod lambda;
pub mod logs;

/// What a create call reported back.
pub(crate) struct Created {
    pub id: String,
    pub arn: Option<String>,
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl Created {
    pub fn new(id: impl Into<String>, arn: Option<String>) -> Self {
        Self {
            id: id.into(),
            arn,
            outputs: Default::default(),
        }
    }

    pub fn with_output(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.outputs.insert(key.to_owned(), value.into());
        self
    }
}

/// Converts tags into the map form most AWS APIs take.
pub(crate) fn tag_map(tags: &crate::Tags) -> HashMap<String, String> {
    tags.clone().into_iter().collect()
}

/// Creates resources on AWS.
///
/// Requests without a provider use the default `SdkConfig`. Requests naming
/// a provider use the `SdkConfig` registered under that name.
pub struct AwsProvisioner {
    default: SdkConfig,
    providers: HashMap<String, SdkConfig>,
    account_id: Option<String>,
}

impl AwsProvisioner {
    pub fn new(default: SdkConfig) -> Self {
        Self {
            default,
            providers: Default::default(),
            account_id: None,
        }
    }

    /// Registers a named provider context.
    pub fn with_provider(mut self, name: impl Into<String>, cfg: SdkConfig) -> Self {
        self.providers.insert(name.into(), cfg);
        self
    }

    /// The account resources are created in, used to scope invoke
    /// permissions.
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    fn config(&self, provider: Option<&str>) -> anyhow::Result<&SdkConfig> {
        match provider {
            None => Ok(&self.default),
            Some(name) => self
                .providers
                .get(name)
                .with_context(|| format!("unknown provider '{name}'")),
        }
    }
}

impl Provisioner for AwsProvisioner {
    type Error = anyhow::Error;

    async fn provision(&self, request: ResourceRequest) -> anyhow::Result<ResourceHandle> {
        let cfg = self.config(request.provider.as_deref())?;
        let tags = &request.tags;
        let created = match &request.spec {
            ResourceSpec::Role(role) => iam::create_role(cfg, role, tags).await?,
            ResourceSpec::Policy(policy) => iam::create_policy(cfg, policy, tags).await?,
            ResourceSpec::PolicyAttachment(attachment) => {
                iam::attach_policy(cfg, attachment).await?
            }
            ResourceSpec::LogGroup(group) => logs::create_log_group(cfg, group, tags).await?,
            ResourceSpec::Function(function) => {
                lambda::create_function(cfg, function, tags).await?
            }
            ResourceSpec::RestApi(api) => {
                apigatewayv2::create_api(cfg, api, tags, self.account_id.as_deref()).await?
            }
        };
        Ok(ResourceHandle::new(
            &request,
            created.id,
            created.arn,
            created.outputs,
        ))
    }
}
