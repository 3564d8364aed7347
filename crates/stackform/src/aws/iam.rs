//! IAM infrastructure.
use anyhow::Context;
use aws_config::SdkConfig;

use super::Created;
use crate::{
    provision::{PolicyAttachmentSpec, PolicySpec, RoleSpec},
    Tags,
};

fn iam_tags(tags: &Tags) -> anyhow::Result<Vec<aws_sdk_iam::types::Tag>> {
    tags.iter()
        .map(|(key, value)| {
            aws_sdk_iam::types::Tag::builder()
                .key(key)
                .value(value)
                .build()
                .context("invalid tag")
        })
        .collect()
}

pub(crate) async fn create_role(
    cfg: &SdkConfig,
    role: &RoleSpec,
    tags: &Tags,
) -> anyhow::Result<Created> {
    let client = aws_sdk_iam::Client::new(cfg);
    let iam_role = client
        .create_role()
        .role_name(&role.name)
        .assume_role_policy_document(&role.assume_role_policy)
        .set_tags(Some(iam_tags(tags)?))
        .send()
        .await?
        .role
        .context("no role")?;
    log::info!("...created role {}", role.name);
    Ok(Created::new(iam_role.role_id, Some(iam_role.arn)))
}

pub(crate) async fn create_policy(
    cfg: &SdkConfig,
    policy: &PolicySpec,
    tags: &Tags,
) -> anyhow::Result<Created> {
    let client = aws_sdk_iam::Client::new(cfg);
    let iam_policy = client
        .create_policy()
        .policy_name(&policy.name)
        .policy_document(&policy.policy)
        .set_tags(Some(iam_tags(tags)?))
        .send()
        .await?
        .policy
        .context("no policy")?;
    let arn = iam_policy
        .arn
        .context("missing arn from policy creation")?;
    log::info!("...created policy {}", policy.name);
    Ok(Created::new(
        iam_policy.policy_id.unwrap_or_else(|| arn.clone()),
        Some(arn),
    ))
}

/// Attaches the policy to every listed role.
pub(crate) async fn attach_policy(
    cfg: &SdkConfig,
    attachment: &PolicyAttachmentSpec,
) -> anyhow::Result<Created> {
    let client = aws_sdk_iam::Client::new(cfg);
    for role_name in attachment.roles.iter() {
        client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(&attachment.policy_arn)
            .send()
            .await
            .with_context(|| {
                format!(
                    "could not attach {} to role {role_name}",
                    attachment.policy_arn
                )
            })?;
        log::info!(
            "...attached policy {} to role {role_name}",
            attachment.policy_arn
        );
    }
    Ok(Created::new(attachment.name.clone(), None))
}
