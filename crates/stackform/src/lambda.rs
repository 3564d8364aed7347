//! Lambda function declarations.
use std::path::{Path, PathBuf};

use crate::{
    package::{self, Archive, PackageSpec},
    provision::{submit, FunctionSpec, LogFormat, LogGroupSpec, LoggingConfig, ResourceSpec},
    Provisioner, ResourceHandle, ResourceRequest, Result, Tags,
};

pub const DEFAULT_RUNTIME: &str = "python3.9";
pub const DEFAULT_HANDLER: &str = "lambda_function.lambda_handler";
pub const DEFAULT_ARCHIVE_DIR: &str = "zipArchives/python";
pub const DEFAULT_TIMEOUT_SECS: i32 = 30;
pub const DEFAULT_LOG_RETENTION_DAYS: i32 = 14;

/// Declares a function packaged from one source file, and its log group.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionBuilder {
    /// ARN of the execution role.
    pub role_arn: String,
    pub function_name: String,
    /// The entry point source file.
    pub code_file: PathBuf,
    pub tags: Tags,
    pub provider: Option<String>,
    /// Directory the deployment archive is written to.
    pub archive_dir: PathBuf,
    /// Parent of the staging directory, the system temp dir if `None`.
    pub staging_root: Option<PathBuf>,
    pub handler: String,
    pub runtime: String,
    pub timeout_secs: i32,
    pub log_retention_days: i32,
}

/// Handles of everything a [`FunctionBuilder`] requested.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionResources {
    pub log_group: ResourceHandle,
    pub function: ResourceHandle,
    pub archive: Archive,
}

impl FunctionBuilder {
    pub fn new(
        role_arn: impl Into<String>,
        function_name: impl Into<String>,
        code_file: impl Into<PathBuf>,
        tags: Tags,
    ) -> Self {
        Self {
            role_arn: role_arn.into(),
            function_name: function_name.into(),
            code_file: code_file.into(),
            tags,
            provider: None,
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            staging_root: None,
            handler: DEFAULT_HANDLER.to_owned(),
            runtime: DEFAULT_RUNTIME.to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = archive_dir.into();
        self
    }

    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(staging_root.into());
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.archive_dir.join(format!("{}.zip", self.function_name))
    }

    pub fn log_group_name(&self) -> String {
        format!("/aws/lambda/{}", self.function_name)
    }

    pub fn package_spec(&self, dependency_archive: Option<&Path>) -> PackageSpec {
        PackageSpec {
            function_name: self.function_name.clone(),
            source_file: self.code_file.clone(),
            output_path: self.archive_path(),
            dependency_archive: dependency_archive.map(Path::to_path_buf),
            staging_root: self.staging_root.clone(),
        }
    }

    fn log_group_request(&self) -> ResourceRequest {
        ResourceRequest::new(
            format!("LogGroup_{}", self.function_name),
            ResourceSpec::LogGroup(LogGroupSpec {
                name: self.log_group_name(),
                retention_in_days: self.log_retention_days,
            }),
        )
        .with_tags(self.tags.clone())
        .with_provider(self.provider.clone())
    }

    fn function_request(&self, archive: &Archive, log_group: &ResourceHandle) -> ResourceRequest {
        ResourceRequest::new(
            self.function_name.clone(),
            ResourceSpec::Function(FunctionSpec {
                name: self.function_name.clone(),
                role: self.role_arn.clone(),
                code: archive.path.clone(),
                source_code_hash: archive.sha256_base64.clone(),
                handler: self.handler.clone(),
                runtime: self.runtime.clone(),
                timeout: self.timeout_secs,
                logging_config: LoggingConfig {
                    log_format: LogFormat::Text,
                    log_group: self.log_group_name(),
                },
            }),
        )
        .with_tags(self.tags.clone())
        .with_dependency(log_group)
        .with_provider(self.provider.clone())
    }

    /// Packages the code, then requests the log group and the function.
    ///
    /// `dependency_archive` is a zip whose contents are merged into the
    /// package root next to the code file.
    pub async fn create<P: Provisioner>(
        &self,
        engine: &P,
        dependency_archive: Option<&Path>,
    ) -> Result<FunctionResources> {
        let archive = package::assemble(self.package_spec(dependency_archive)).await?;
        let log_group = submit(engine, self.log_group_request()).await?;
        let function = submit(engine, self.function_request(&archive, &log_group)).await?;
        Ok(FunctionResources {
            log_group,
            function,
            archive,
        })
    }
}
