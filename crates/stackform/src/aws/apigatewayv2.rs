//! ApiGatewayV2 infrastructure.
//!
//! A route table becomes an HTTP API with one Lambda proxy integration per
//! handler, one request authorizer per authorizing function, and an
//! auto-deployed stage.
use std::collections::{HashMap, HashSet};

use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_apigatewayv2::types::{
    AuthorizationType, AuthorizerType, IntegrationType, ProtocolType,
};

use super::{lambda::allow_invoke_from_api, tag_map, Created};
use crate::{
    apigateway::{Authorizer, Route},
    provision::RestApiSpec,
    ResourceRef, Tags,
};

fn arn_of<'a>(resource: &'a ResourceRef, route: &Route) -> anyhow::Result<&'a str> {
    resource.arn.as_deref().with_context(|| {
        format!(
            "cannot create route {} - '{}' has no arn",
            route.route_key(),
            resource.name
        )
    })
}

/// Tracks what has been created for one API so shared handlers and
/// authorizers are set up once.
struct ApiBuilder<'a> {
    cfg: &'a SdkConfig,
    client: aws_sdk_apigatewayv2::Client,
    api_id: String,
    region: String,
    source_arn: Option<String>,
    integrations: HashMap<String, String>,
    authorizers: HashMap<(String, String), String>,
    permitted: HashSet<String>,
}

impl ApiBuilder<'_> {
    async fn permit(&mut self, function_arn: &str) -> anyhow::Result<()> {
        if self.permitted.insert(function_arn.to_owned()) {
            let statement_id = format!("apigateway-{}-{}", self.api_id, self.permitted.len());
            allow_invoke_from_api(self.cfg, function_arn, &statement_id, self.source_arn.clone())
                .await?;
        }
        Ok(())
    }

    async fn integration(&mut self, function_arn: &str) -> anyhow::Result<String> {
        if let Some(id) = self.integrations.get(function_arn) {
            return Ok(id.clone());
        }
        let out = self
            .client
            .create_integration()
            .api_id(&self.api_id)
            .integration_type(IntegrationType::AwsProxy)
            .integration_uri(function_arn)
            .payload_format_version("2.0")
            .send()
            .await?;
        let id = out.integration_id.context("missing integration_id")?;
        self.permit(function_arn).await?;
        self.integrations.insert(function_arn.to_owned(), id.clone());
        Ok(id)
    }

    async fn authorizer(
        &mut self,
        handler: &ResourceRef,
        function_arn: &str,
        parameter_name: &str,
    ) -> anyhow::Result<String> {
        let key = (function_arn.to_owned(), parameter_name.to_owned());
        if let Some(id) = self.authorizers.get(&key) {
            return Ok(id.clone());
        }
        let out = self
            .client
            .create_authorizer()
            .api_id(&self.api_id)
            .name(format!("{}-{parameter_name}", handler.name))
            .authorizer_type(AuthorizerType::Request)
            .authorizer_uri(format!(
                "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{function_arn}/invocations",
                self.region
            ))
            .identity_source(format!("$request.header.{parameter_name}"))
            .authorizer_payload_format_version("2.0")
            .enable_simple_responses(true)
            .send()
            .await?;
        let id = out.authorizer_id.context("missing authorizer_id")?;
        self.permit(function_arn).await?;
        self.authorizers.insert(key, id.clone());
        Ok(id)
    }

    async fn route(&mut self, route: &Route) -> anyhow::Result<()> {
        let integration_id = self.integration(arn_of(&route.handler, route)?).await?;
        let mut create = self
            .client
            .create_route()
            .api_id(&self.api_id)
            .route_key(route.route_key())
            .target(format!("integrations/{integration_id}"));
        if let Authorizer::Lambda {
            handler,
            parameter_name,
        } = &route.authorizer
        {
            let authorizer_id = self
                .authorizer(handler, arn_of(handler, route)?, parameter_name)
                .await?;
            create = create
                .authorization_type(AuthorizationType::Custom)
                .authorizer_id(authorizer_id);
        }
        let out = create.send().await?;
        log::info!(
            "...created route {} ({})",
            route.route_key(),
            out.route_id.as_deref().unwrap_or("unknown id")
        );
        Ok(())
    }
}

pub(crate) async fn create_api(
    cfg: &SdkConfig,
    api: &RestApiSpec,
    tags: &Tags,
    account_id: Option<&str>,
) -> anyhow::Result<Created> {
    let region = cfg
        .region()
        .context("cannot create api - missing region")?
        .to_string();
    let client = aws_sdk_apigatewayv2::Client::new(cfg);
    let out = client
        .create_api()
        .name(&api.name)
        .protocol_type(ProtocolType::Http)
        .set_tags(Some(tag_map(tags)))
        .send()
        .await?;
    let api_id = out.api_id.context("missing api_id")?;
    let api_endpoint = out.api_endpoint.context("missing api_endpoint")?;
    log::info!("...created api {} ({api_id})", api.name);

    let mut builder = ApiBuilder {
        cfg,
        client: client.clone(),
        source_arn: account_id
            .map(|account| format!("arn:aws:execute-api:{region}:{account}:{api_id}/*")),
        api_id: api_id.clone(),
        region: region.clone(),
        integrations: Default::default(),
        authorizers: Default::default(),
        permitted: Default::default(),
    };
    for route in api.routes.iter() {
        builder.route(route).await?;
    }

    client
        .create_stage()
        .api_id(&api_id)
        .stage_name(&api.stage_name)
        .auto_deploy(true)
        .set_tags(Some(tag_map(tags)))
        .send()
        .await?;
    log::info!("...created stage {}", api.stage_name);

    let url = format!("{api_endpoint}/{}", api.stage_name);
    Ok(Created::new(
        api_id.clone(),
        Some(format!("arn:aws:apigateway:{region}::/apis/{api_id}")),
    )
    .with_output("api_endpoint", api_endpoint)
    .with_output("url", url))
}
