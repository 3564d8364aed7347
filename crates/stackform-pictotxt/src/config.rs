//! The stack file.
//!
//! Relative paths in the file are resolved against the directory the file
//! lives in, so `infra` can be run from anywhere.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use stack::{apigateway::Method, Tags};

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default)]
    pub tags: Tags,
    /// Provider context every resource is created with.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    pub role: RoleConfig,
    #[serde(rename = "function")]
    pub functions: Vec<FunctionConfig>,
    pub api: ApiConfig,
}

/// Where a named provider context gets its credentials and region.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub role_name: String,
    pub policy_name: String,
    pub policy_file: PathBuf,
    pub assume_policy_file: PathBuf,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
    pub function_name: String,
    pub code_file: PathBuf,
    #[serde(default)]
    pub dependency_archive: Option<PathBuf>,
    #[serde(default)]
    pub handler: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub api_name: String,
    pub stage_name: String,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub method: Method,
    pub path: String,
    /// Name of the function serving the route.
    pub handler: String,
    /// Name of the function authorizing callers. The route is open if absent.
    #[serde(default)]
    pub authorizer: Option<String>,
}

impl StackConfig {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: StackConfig = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        log::debug!("reading stack file {path:?}");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read stack file {path:?}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("invalid stack file {path:?}"))?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(config.resolve(base))
    }

    fn check(&self) -> anyhow::Result<()> {
        if let Some(provider) = self.provider.as_ref() {
            anyhow::ensure!(
                self.providers.contains_key(provider),
                "provider '{provider}' is not declared in [providers]"
            );
        }
        anyhow::ensure!(!self.functions.is_empty(), "at least one function is required");
        for route in self.api.routes.iter() {
            let names = std::iter::once(&route.handler).chain(route.authorizer.as_ref());
            for name in names {
                anyhow::ensure!(
                    self.function(name).is_some(),
                    "route {} {} refers to unknown function '{name}'",
                    route.method,
                    route.path
                );
            }
        }
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionConfig> {
        self.functions.iter().find(|f| f.function_name == name)
    }

    /// Makes every relative path relative to `base` instead.
    pub fn resolve(mut self, base: &Path) -> Self {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.role.policy_file);
        join(&mut self.role.assume_policy_file);
        for function in self.functions.iter_mut() {
            join(&mut function.code_file);
            if let Some(archive) = function.dependency_archive.as_mut() {
                join(archive);
            }
        }
        self
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    const STACK: &str = r#"
provider = "privileged"

[tags]
App = "PicToTxt"

[providers.privileged]
profile = "cicd"

[role]
role_name = "roleLambdaPicToTxt"
policy_name = "policyLambdaPicToTxt"
policy_file = "iam/policies/lambda_app_policy.json"
assume_policy_file = "/abs/assume.json"

[[function]]
function_name = "FunctionLambdaPicToTxt"
code_file = "lambda/src/lambda_function.py"
dependency_archive = "lambda/src/packages.zip"

[api]
api_name = "ApiPicToTxt"
stage_name = "dev"

[[api.routes]]
method = "POST"
path = "/picToTxt"
handler = "FunctionLambdaPicToTxt"
"#;

    #[test]
    fn parses_and_resolves() {
        let config = StackConfig::from_toml(STACK)
            .unwrap()
            .resolve(Path::new("/stack"));
        assert_eq!(Some("PicToTxt"), config.tags.get("App").map(String::as_str));
        assert_eq!(
            PathBuf::from("/stack/iam/policies/lambda_app_policy.json"),
            config.role.policy_file
        );
        assert_eq!(PathBuf::from("/abs/assume.json"), config.role.assume_policy_file);
        let function = config.function("FunctionLambdaPicToTxt").unwrap();
        assert_eq!(
            Some(PathBuf::from("/stack/lambda/src/packages.zip")),
            function.dependency_archive
        );
        assert_eq!(Method::Post, config.api.routes[0].method);
        assert_eq!(None, config.api.routes[0].authorizer);
        assert_eq!(Some("cicd".to_owned()), config.providers["privileged"].profile);
    }

    #[test]
    fn unknown_route_handler_is_rejected() {
        let stack = STACK.replace(
            "handler = \"FunctionLambdaPicToTxt\"",
            "handler = \"Nope\"",
        );
        let err = StackConfig::from_toml(&stack).unwrap_err();
        assert!(err.to_string().contains("unknown function 'Nope'"), "{err}");
    }

    #[test]
    fn undeclared_provider_is_rejected() {
        let stack = STACK.replace("provider = \"privileged\"", "provider = \"other\"");
        assert!(StackConfig::from_toml(&stack).is_err());
    }

    #[test]
    fn shipped_stack_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("Stack.toml");
        let config = StackConfig::load(&path).unwrap();
        assert!(config.role.policy_file.exists());
        assert!(config.role.assume_policy_file.exists());
        for function in config.functions.iter() {
            assert!(function.code_file.exists(), "{:?}", function.code_file);
        }
    }

    #[test]
    fn shipped_policies_are_well_formed() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("iam/policies");
        let substitutions = stack::policy::Substitutions::from([
            ("aws_account_id".to_owned(), "123456789012".to_owned()),
            ("lambda_func_name".to_owned(), "FunctionLambdaPicToTxt".to_owned()),
        ]);
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let policy = stack::policy::render(&path, &substitutions).unwrap();
            assert_eq!(Some("2012-10-17"), policy["Version"].as_str(), "{path:?}");
            assert!(policy["Statement"].is_array(), "{path:?}");
        }
    }
}
