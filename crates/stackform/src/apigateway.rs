//! API Gateway route table declarations.
use std::collections::HashSet;

use crate::{
    provision::{submit, ResourceSpec, RestApiSpec},
    DuplicateRouteSnafu, Provisioner, ResourceHandle, ResourceRef, ResourceRequest, Result, Tags,
};

/// Header that carries the token checked by a route's authorizer.
pub const DEFAULT_AUTHORIZER_PARAMETER: &str = "Bearer";

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Any,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Any => "ANY",
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who checks a route's callers, if anyone.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Authorizer {
    /// The route is open.
    #[default]
    None,
    /// A Lambda function authorizes each call using the `parameter_name`
    /// header.
    Lambda {
        handler: ResourceRef,
        parameter_name: String,
    },
}

impl Authorizer {
    pub fn lambda(handler: &ResourceHandle) -> Self {
        Authorizer::Lambda {
            handler: handler.reference(),
            parameter_name: DEFAULT_AUTHORIZER_PARAMETER.to_owned(),
        }
    }
}

/// One entry of an API surface.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: ResourceRef,
    #[serde(default)]
    pub authorizer: Authorizer,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: &ResourceHandle) -> Self {
        Self {
            method,
            path: path.into(),
            handler: handler.reference(),
            authorizer: Authorizer::None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Method and path, eg "POST /picToTxt".
    pub fn route_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Fails with [`Error::DuplicateRoute`](crate::Error::DuplicateRoute) if two
/// routes share a method and a path.
///
/// The same path under different methods is allowed.
pub fn validate(routes: &[Route]) -> Result<()> {
    let mut seen = HashSet::new();
    for route in routes {
        snafu::ensure!(
            seen.insert((route.method, route.path.as_str())),
            DuplicateRouteSnafu {
                method: route.method,
                path: route.path.clone(),
            }
        );
    }
    Ok(())
}

/// Declares a REST API serving a set of routes on one stage.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RouteTableBuilder {
    pub api_name: String,
    pub routes: Vec<Route>,
    pub stage_name: String,
    pub tags: Tags,
    pub provider: Option<String>,
}

impl RouteTableBuilder {
    pub fn new(
        api_name: impl Into<String>,
        routes: Vec<Route>,
        stage_name: impl Into<String>,
        tags: Tags,
    ) -> Self {
        Self {
            api_name: api_name.into(),
            routes,
            stage_name: stage_name.into(),
            tags,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Validates the routes and builds the API request.
    ///
    /// Every route handler and authorizer becomes a dependency of the API.
    pub fn request(&self) -> Result<ResourceRequest> {
        validate(&self.routes)?;
        let request = ResourceRequest::new(
            self.api_name.clone(),
            ResourceSpec::RestApi(RestApiSpec {
                name: self.api_name.clone(),
                stage_name: self.stage_name.clone(),
                routes: self.routes.clone(),
            }),
        )
        .with_tags(self.tags.clone())
        .with_provider(self.provider.clone());
        Ok(self
            .routes
            .iter()
            .fold(request, |request, route| {
                let request = request.with_dependency(route.handler.clone());
                match &route.authorizer {
                    Authorizer::None => request,
                    Authorizer::Lambda { handler, .. } => request.with_dependency(handler.clone()),
                }
            }))
    }

    pub async fn create<P: Provisioner>(&self, engine: &P) -> Result<ResourceHandle> {
        submit(engine, self.request()?).await
    }
}
