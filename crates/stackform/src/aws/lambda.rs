//! AWS Lambda infrastructure.
use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_lambda::types::{FunctionCode, LogFormat, LoggingConfig, PackageType, Runtime};

use super::{tag_map, Created};
use crate::{provision::FunctionSpec, Tags};

pub(crate) async fn create_function(
    cfg: &SdkConfig,
    function: &FunctionSpec,
    tags: &Tags,
) -> anyhow::Result<Created> {
    let client = aws_sdk_lambda::Client::new(cfg);
    let bytes = tokio::fs::read(&function.code)
        .await
        .with_context(|| format!("could not read deployment package {:?}", function.code))?;
    log::debug!("sending {} bytes of code", bytes.len());
    let out = client
        .create_function()
        .function_name(&function.name)
        .package_type(PackageType::Zip)
        .runtime(Runtime::from(function.runtime.as_str()))
        .role(&function.role)
        .handler(&function.handler)
        .timeout(function.timeout)
        .logging_config(
            LoggingConfig::builder()
                .log_format(LogFormat::from(function.logging_config.log_format.as_str()))
                .log_group(&function.logging_config.log_group)
                .build(),
        )
        .set_tags(Some(tag_map(tags)))
        .publish(true)
        .code(
            FunctionCode::builder()
                .zip_file(aws_sdk_lambda::primitives::Blob::new(bytes))
                .build(),
        )
        .send()
        .await?;

    let arn = out.function_arn.context("missing arn")?;
    let version = out.version.context("missing version")?;
    if let Some(code_sha256) = out.code_sha256.as_deref() {
        if code_sha256 != function.source_code_hash {
            log::warn!(
                "uploaded code hash {code_sha256} differs from the packaged {}",
                function.source_code_hash
            );
        }
    }
    log::info!("...created lambda {} version {version}", function.name);
    Ok(Created::new(function.name.clone(), Some(arn)).with_output("version", version))
}

/// Lets API Gateway invoke the function at `function_arn`.
pub(crate) async fn allow_invoke_from_api(
    cfg: &SdkConfig,
    function_arn: &str,
    statement_id: &str,
    source_arn: Option<String>,
) -> anyhow::Result<()> {
    let client = aws_sdk_lambda::Client::new(cfg);
    let out = client
        .add_permission()
        .function_name(function_arn)
        .statement_id(statement_id)
        .action("lambda:InvokeFunction")
        .principal("apigateway.amazonaws.com")
        .set_source_arn(source_arn)
        .send()
        .await
        .with_context(|| format!("could not add invoke permission to {function_arn}"))?;
    log::debug!("added permission:\n{:#?}", out.statement());
    Ok(())
}
