//! Deployment package assembly.
//!
//! A package is built in a [`StagingDir`]: the function's source file is
//! copied in, an optional dependency archive is extracted next to it, and the
//! whole directory is zipped. The staging directory is private to one build
//! (its name carries a random suffix) and is removed when it is dropped, so
//! two builds of the same function never share one.
//!
//! Archives are written deterministically. Entries are sorted and carry a
//! fixed timestamp and fixed permissions, which makes the archive hash a
//! function of entry names and contents only.
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use snafu::ResultExt;

use crate::{ArchiveSnafu, Error, IoSnafu, Result, TaskSnafu};

/// Inputs of one package build.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageSpec {
    /// Identifier of the target function, used to name the staging directory.
    pub function_name: String,
    /// The function's entry point source file.
    pub source_file: PathBuf,
    /// Where the zip archive is written.
    pub output_path: PathBuf,
    /// Zip archive of dependencies to merge into the package root.
    pub dependency_archive: Option<PathBuf>,
    /// Parent of the staging directory. Defaults to the system temp dir.
    pub staging_root: Option<PathBuf>,
}

/// A finished deployment archive.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Archive {
    pub path: PathBuf,
    /// Base64 encoded sha256 of the archive file.
    pub sha256_base64: String,
    /// Sorted, `/`-separated paths of the files in the archive.
    pub entries: Vec<String>,
}

/// Maps a failure to read one of the build's inputs.
fn input_error(path: &Path, source: std::io::Error) -> Error {
    if source.kind() == ErrorKind::NotFound {
        Error::NotFound {
            path: path.to_path_buf(),
            source,
        }
    } else {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A uniquely named staging directory, removed recursively on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: tempfile::TempDir,
}

impl StagingDir {
    /// Creates `<root>/stage-<function_name>-<random>`, creating `root` first
    /// if it does not exist.
    pub fn create(root: impl AsRef<Path>, function_name: &str) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).context(IoSnafu { path: root })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("stage-{function_name}-"))
            .tempdir_in(root)
            .context(IoSnafu { path: root })?;
        log::debug!("staging {function_name} in {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copies `source` into the staging directory under its base name,
    /// overwriting any earlier copy.
    pub fn stage_source(&self, source: impl AsRef<Path>) -> Result<PathBuf> {
        let source = source.as_ref();
        std::fs::metadata(source).map_err(|e| input_error(source, e))?;
        let file_name = source.file_name().ok_or_else(|| Error::Io {
            path: source.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "source file has no base name"),
        })?;
        let destination = self.path().join(file_name);
        std::fs::copy(source, &destination).map_err(|e| input_error(source, e))?;
        log::debug!("  staged {source:?}");
        Ok(destination)
    }

    /// Extracts every entry of the zip at `archive` into the staging
    /// directory, merging with what is already there.
    pub fn extract_dependencies(&self, archive: impl AsRef<Path>) -> Result<()> {
        let archive = archive.as_ref();
        let file = std::fs::File::open(archive).map_err(|e| input_error(archive, e))?;
        let mut zip = zip::ZipArchive::new(file).context(ArchiveSnafu { path: archive })?;
        log::debug!("  extracting {} entries from {archive:?}", zip.len());
        zip.extract(self.path()).context(ArchiveSnafu { path: archive })?;
        Ok(())
    }

    /// Lists the staged files as sorted `/`-separated relative paths.
    pub fn entries(&self) -> Result<Vec<String>> {
        let root = self.path();
        let mut entries = vec![];
        for entry in walkdir::WalkDir::new(root).min_depth(1) {
            let entry = entry
                .map_err(std::io::Error::from)
                .context(IoSnafu { path: root })?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                log::warn!("  skipping {:?}, not a regular file", entry.path());
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(relative);
        }
        entries.sort();
        Ok(entries)
    }

    /// Zips the staged files into `output` and hashes the result.
    pub fn compress(&self, output: impl AsRef<Path>) -> Result<Archive> {
        let output = output.as_ref();
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }

        let entries = self.entries()?;
        let file = std::fs::File::create(output).context(IoSnafu { path: output })?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);
        for entry in entries.iter() {
            log::trace!("  adding {entry}");
            writer
                .start_file(entry.as_str(), options)
                .context(ArchiveSnafu { path: output })?;
            let staged = self.path().join(entry);
            let mut reader = std::fs::File::open(&staged).context(IoSnafu { path: staged })?;
            std::io::copy(&mut reader, &mut writer).context(IoSnafu { path: output })?;
        }
        writer.finish().context(ArchiveSnafu { path: output })?;

        let sha256_base64 = crate::utils::sha256_base64(output).context(IoSnafu { path: output })?;
        log::info!(
            "packaged {} files into {output:?} ({sha256_base64})",
            entries.len()
        );
        Ok(Archive {
            path: output.to_path_buf(),
            sha256_base64,
            entries,
        })
    }

    /// Removes the staging directory, reporting any failure.
    pub fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir.close().context(IoSnafu { path })
    }
}

/// Builds the package described by `spec` on the calling thread.
///
/// The staging directory is removed whether or not the build succeeds.
pub fn assemble_blocking(spec: &PackageSpec) -> Result<Archive> {
    let root = spec
        .staging_root
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    let staging = StagingDir::create(&root, &spec.function_name)?;
    staging.stage_source(&spec.source_file)?;
    if let Some(dependencies) = spec.dependency_archive.as_ref() {
        staging.extract_dependencies(dependencies)?;
    }
    let archive = staging.compress(&spec.output_path)?;
    staging.close()?;
    Ok(archive)
}

/// Builds the package described by `spec` on tokio's blocking pool.
///
/// Resolves to the finished [`Archive`], whose hash callers use to decide
/// whether the function code changed.
pub async fn assemble(spec: PackageSpec) -> Result<Archive> {
    tokio::task::spawn_blocking(move || assemble_blocking(&spec))
        .await
        .context(TaskSnafu)?
}

#[cfg(test)]
mod test;
