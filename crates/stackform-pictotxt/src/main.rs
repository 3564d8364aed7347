//! Declares the PicToTxt serverless stack: an IAM role, the Lambda
//! functions it runs, and the HTTP API routing to them.
//!
//! ```sh
//! aws_account_id=123456789012 cargo run -p stackform-pictotxt -- plan
//! aws_account_id=123456789012 cargo run -p stackform-pictotxt -- apply
//! ```
//!
//! Run with `RUST_LOG=info` to see each resource as it is requested.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use colored::Colorize;
use stack::{
    apigateway::{Authorizer, Route, RouteTableBuilder},
    aws::{AwsProvisioner, SdkConfig},
    iam::{RoleBuilder, RoleResources},
    lambda::{FunctionBuilder, FunctionResources, DEFAULT_ARCHIVE_DIR},
    policy::Substitutions,
    DryRun, Provisioner, ResourceHandle, ResourceRequest,
};

mod config;

use config::StackConfig;

#[derive(Parser)]
#[command(name = "infra", about = "Declare the PicToTxt serverless stack")]
struct Cli {
    /// The stack file.
    #[arg(long, default_value = "Stack.toml")]
    stack: PathBuf,

    /// Account the stack lives in, substituted into policy templates.
    #[arg(long, env = "aws_account_id")]
    aws_account_id: String,

    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Where deployment packages are written.
    #[arg(long, default_value = DEFAULT_ARCHIVE_DIR)]
    archive_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resources that would be requested.
    Plan,
    /// Create the resources on AWS.
    Apply,
}

type Error = Box<dyn std::error::Error>;

struct Outputs {
    role: RoleResources,
    functions: BTreeMap<String, FunctionResources>,
    api: ResourceHandle,
}

/// Requests the role, then each function with the role's arn, then the API
/// routing to the functions.
async fn declare_stack<P: Provisioner>(
    engine: &P,
    config: &StackConfig,
    account_id: &str,
    archive_dir: &Path,
) -> Result<Outputs, Error> {
    let first = config.functions.first().ok_or("no functions declared")?;
    let substitutions = Substitutions::from([
        ("aws_account_id".to_owned(), account_id.to_owned()),
        ("lambda_func_name".to_owned(), first.function_name.clone()),
    ]);

    let mut role = RoleBuilder::new(
        &config.role.role_name,
        &config.role.policy_name,
        &config.role.policy_file,
        &config.role.assume_policy_file,
        config.tags.clone(),
    );
    if let Some(provider) = config.provider.as_ref() {
        role = role.with_provider(provider);
    }
    let role = role.create(engine, &substitutions).await?;
    let role_arn = role
        .role
        .arn
        .clone()
        .ok_or_else(|| format!("role '{}' has no arn", role.role.name))?;

    let mut functions = BTreeMap::new();
    for function in config.functions.iter() {
        let mut builder = FunctionBuilder::new(
            &role_arn,
            &function.function_name,
            &function.code_file,
            config.tags.clone(),
        )
        .with_archive_dir(archive_dir);
        if let Some(handler) = function.handler.as_ref() {
            builder = builder.with_handler(handler);
        }
        if let Some(provider) = config.provider.as_ref() {
            builder = builder.with_provider(provider);
        }
        let resources = builder
            .create(engine, function.dependency_archive.as_deref())
            .await?;
        log::info!(
            "packaged {} as {:?} ({})",
            function.function_name,
            resources.archive.path,
            resources.archive.sha256_base64
        );
        functions.insert(function.function_name.clone(), resources);
    }

    let handle = |name: &str| {
        functions
            .get(name)
            .map(|resources| &resources.function)
            .ok_or_else(|| format!("no function named '{name}'"))
    };
    let mut routes = vec![];
    for route in config.api.routes.iter() {
        let mut next = Route::new(route.method, &route.path, handle(&route.handler)?);
        if let Some(authorizer) = route.authorizer.as_ref() {
            next = next.with_authorizer(Authorizer::lambda(handle(authorizer)?));
        }
        routes.push(next);
    }
    let mut api = RouteTableBuilder::new(
        &config.api.api_name,
        routes,
        &config.api.stage_name,
        config.tags.clone(),
    );
    if let Some(provider) = config.provider.as_ref() {
        api = api.with_provider(provider);
    }
    let api = api.create(engine).await?;

    Ok(Outputs {
        role,
        functions,
        api,
    })
}

async fn load_sdk_config(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_owned()));
    }
    loader.load().await
}

fn print_request(step: usize, request: &ResourceRequest) {
    println!(
        "{} {} {}",
        format!("{step:>2}.").cyan(),
        "+".green().bold(),
        format!("{} {}", request.spec.kind(), request.name).bold()
    );
    if let Some(provider) = request.provider.as_ref() {
        println!("      provider: {provider}");
    }
    for dependency in request.depends_on.iter() {
        println!("      after: {}", dependency.name);
    }
    if !request.tags.is_empty() {
        let tags = request
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("      tags: {tags}");
    }
}

fn print_outputs(outputs: &Outputs) {
    let mut handles = vec![&outputs.role.role, &outputs.role.policy, &outputs.role.attachment];
    for resources in outputs.functions.values() {
        handles.push(&resources.log_group);
        handles.push(&resources.function);
    }
    handles.push(&outputs.api);
    for handle in handles {
        println!(
            "{} {} {}",
            "OK".green().bold(),
            format!("{} {}", handle.kind, handle.name).bold(),
            handle.arn.as_deref().unwrap_or(&handle.id)
        );
    }
    if let Some(url) = outputs.api.field("url").and_then(|url| url.as_str()) {
        println!("{}: {url}", "url".cyan().bold());
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();
    let config = StackConfig::load(&cli.stack)?;

    match cli.command {
        Command::Plan => {
            let engine = DryRun::new();
            declare_stack(&engine, &config, &cli.aws_account_id, &cli.archive_dir).await?;
            println!("Plan:");
            for (step, request) in engine.requests().iter().enumerate() {
                print_request(step + 1, request);
            }
        }
        Command::Apply => {
            let default = load_sdk_config(None, cli.region.as_deref()).await;
            let mut engine =
                AwsProvisioner::new(default).with_account_id(cli.aws_account_id.clone());
            for (name, provider) in config.providers.iter() {
                let region = provider.region.as_deref().or(cli.region.as_deref());
                let cfg = load_sdk_config(provider.profile.as_deref(), region).await;
                engine = engine.with_provider(name, cfg);
            }
            println!("Applying...");
            let outputs =
                declare_stack(&engine, &config, &cli.aws_account_id, &cli.archive_dir).await?;
            print_outputs(&outputs);
            println!("Done.");
        }
    }
    Ok(())
}
