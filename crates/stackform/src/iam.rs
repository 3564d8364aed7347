//! IAM role and policy declarations.
use std::path::PathBuf;

use snafu::OptionExt;

use crate::{
    policy::{self, Substitutions},
    provision::{submit, PolicyAttachmentSpec, PolicySpec, ResourceSpec, RoleSpec},
    MissingOutputSnafu, Provisioner, ResourceHandle, ResourceRequest, Result, Tags,
};

/// Declares a role, a permissions policy and the attachment between them.
///
/// The tags are applied to the role and the policy.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoleBuilder {
    pub role_name: String,
    pub policy_name: String,
    /// Permissions policy template.
    pub policy_file: PathBuf,
    /// Trust policy template. Rendered without substitutions.
    pub assume_policy_file: PathBuf,
    pub tags: Tags,
    pub provider: Option<String>,
}

/// Handles of everything a [`RoleBuilder`] requested.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleResources {
    pub role: ResourceHandle,
    pub policy: ResourceHandle,
    pub attachment: ResourceHandle,
}

impl RoleBuilder {
    pub fn new(
        role_name: impl Into<String>,
        policy_name: impl Into<String>,
        policy_file: impl Into<PathBuf>,
        assume_policy_file: impl Into<PathBuf>,
        tags: Tags,
    ) -> Self {
        Self {
            role_name: role_name.into(),
            policy_name: policy_name.into(),
            policy_file: policy_file.into(),
            assume_policy_file: assume_policy_file.into(),
            tags,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn role_request(&self) -> Result<ResourceRequest> {
        let assume_role_policy =
            policy::render_string(&self.assume_policy_file, &Substitutions::new())?;
        Ok(ResourceRequest::new(
            format!("Role_{}", self.role_name),
            ResourceSpec::Role(RoleSpec {
                name: self.role_name.clone(),
                assume_role_policy,
            }),
        )
        .with_tags(self.tags.clone())
        .with_provider(self.provider.clone()))
    }

    /// Renders the permissions policy with `substitutions`.
    ///
    /// Callers supply every value the template needs, `aws_account_id`
    /// included.
    pub fn policy_request(&self, substitutions: &Substitutions) -> Result<ResourceRequest> {
        let policy = policy::render_string(&self.policy_file, substitutions)?;
        Ok(ResourceRequest::new(
            format!("Policy_{}", self.policy_name),
            ResourceSpec::Policy(PolicySpec {
                name: self.policy_name.clone(),
                policy,
            }),
        )
        .with_tags(self.tags.clone())
        .with_provider(self.provider.clone()))
    }

    fn attachment_request(
        &self,
        role: &ResourceHandle,
        policy: &ResourceHandle,
    ) -> Result<ResourceRequest> {
        let policy_arn = policy.arn.clone().context(MissingOutputSnafu {
            name: policy.name.clone(),
            output: "arn",
        })?;
        let name = format!("Role_Attachment_{}", self.role_name);
        Ok(ResourceRequest::new(
            name.clone(),
            ResourceSpec::PolicyAttachment(PolicyAttachmentSpec {
                name,
                roles: vec![self.role_name.clone()],
                policy_arn,
            }),
        )
        .with_dependency(role)
        .with_dependency(policy)
        .with_provider(self.provider.clone()))
    }

    /// Requests the role, the policy and the attachment, in that order.
    ///
    /// Both templates are rendered before anything is requested, so a bad
    /// template fails the call without side effects.
    pub async fn create<P: Provisioner>(
        &self,
        engine: &P,
        substitutions: &Substitutions,
    ) -> Result<RoleResources> {
        let role_request = self.role_request()?;
        let policy_request = self.policy_request(substitutions)?;

        let role = submit(engine, role_request).await?;
        let policy = submit(engine, policy_request).await?;
        let attachment = submit(engine, self.attachment_request(&role, &policy)?).await?;
        Ok(RoleResources {
            role,
            policy,
            attachment,
        })
    }
}
