//! CloudWatch Logs infrastructure.
use aws_config::SdkConfig;

use super::{tag_map, Created};
use crate::{provision::LogGroupSpec, Tags};

pub(crate) async fn create_log_group(
    cfg: &SdkConfig,
    group: &LogGroupSpec,
    tags: &Tags,
) -> anyhow::Result<Created> {
    let client = aws_sdk_cloudwatchlogs::Client::new(cfg);
    client
        .create_log_group()
        .log_group_name(&group.name)
        .set_tags(Some(tag_map(tags)))
        .send()
        .await?;
    client
        .put_retention_policy()
        .log_group_name(&group.name)
        .retention_in_days(group.retention_in_days)
        .send()
        .await?;
    log::info!(
        "...created log group {} ({} day retention)",
        group.name,
        group.retention_in_days
    );
    Ok(Created::new(group.name.clone(), None))
}
