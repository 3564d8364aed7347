use std::{io::Write, path::Path};

use pretty_assertions::assert_eq;

use super::*;

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Writes a zip holding the given `(name, contents)` pairs.
fn write_dependency_zip(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn read_zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let zip = zip::ZipArchive::new(file).unwrap();
    let mut names = zip.file_names().map(str::to_owned).collect::<Vec<_>>();
    names.sort();
    names
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let fixture = Fixture {
            dir: tempfile::tempdir().unwrap(),
        };
        write_file(&fixture.source(), "def lambda_handler(event, context):\n    return 1\n");
        write_dependency_zip(
            &fixture.dependencies(),
            &[("lib1", "one"), ("lib2", "two")],
        );
        fixture
    }

    fn source(&self) -> PathBuf {
        self.dir.path().join("src").join("lambda_function.py")
    }

    fn dependencies(&self) -> PathBuf {
        self.dir.path().join("packages.zip")
    }

    fn staging_root(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    fn spec(&self, with_dependencies: bool) -> PackageSpec {
        PackageSpec {
            function_name: "picToTxt".to_owned(),
            source_file: self.source(),
            output_path: self.dir.path().join("out").join("picToTxt.zip"),
            dependency_archive: with_dependencies.then(|| self.dependencies()),
            staging_root: Some(self.staging_root()),
        }
    }
}

#[test]
fn stages_source_and_dependencies() {
    let fixture = Fixture::new();
    let staging = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    staging.stage_source(fixture.source()).unwrap();
    staging.extract_dependencies(fixture.dependencies()).unwrap();
    assert_eq!(
        vec!["lambda_function.py", "lib1", "lib2"],
        staging.entries().unwrap()
    );
}

#[test]
fn stages_only_source_without_dependencies() {
    let fixture = Fixture::new();
    let staging = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    staging.stage_source(fixture.source()).unwrap();
    assert_eq!(vec!["lambda_function.py"], staging.entries().unwrap());
}

#[test]
fn staging_dirs_are_unique_and_removed_on_drop() {
    let fixture = Fixture::new();
    let a = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    let b = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    assert_ne!(a.path(), b.path());
    assert!(a
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("stage-picToTxt-"));

    drop(a);
    b.close().unwrap();
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[test]
fn restaging_overwrites_the_copy() {
    let fixture = Fixture::new();
    let staging = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    staging.stage_source(fixture.source()).unwrap();
    write_file(&fixture.source(), "changed");
    let staged = staging.stage_source(fixture.source()).unwrap();
    assert_eq!("changed", std::fs::read_to_string(staged).unwrap());
}

#[test]
fn nested_dependencies_keep_their_layout() {
    let fixture = Fixture::new();
    let nested = fixture.dir.path().join("nested.zip");
    write_dependency_zip(
        &nested,
        &[("pkg/__init__.py", ""), ("pkg/sub/mod.py", "x = 1")],
    );
    let staging = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    staging.stage_source(fixture.source()).unwrap();
    staging.extract_dependencies(&nested).unwrap();
    let output = fixture.dir.path().join("nested-out.zip");
    let archive = staging.compress(&output).unwrap();
    let expected = vec!["lambda_function.py", "pkg/__init__.py", "pkg/sub/mod.py"];
    assert_eq!(expected, archive.entries);
    assert_eq!(expected, read_zip_entries(&output));
}

#[tokio::test]
async fn assemble_zips_staged_files_and_cleans_up() {
    let fixture = Fixture::new();
    let spec = fixture.spec(true);
    let archive = assemble(spec.clone()).await.unwrap();

    assert_eq!(spec.output_path, archive.path);
    assert_eq!(
        vec!["lambda_function.py", "lib1", "lib2"],
        read_zip_entries(&archive.path)
    );
    assert_eq!(
        crate::utils::sha256_base64(&archive.path).unwrap(),
        archive.sha256_base64
    );
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[tokio::test]
async fn assemble_without_dependencies_holds_only_source() {
    let fixture = Fixture::new();
    let archive = assemble(fixture.spec(false)).await.unwrap();
    assert_eq!(vec!["lambda_function.py"], archive.entries);
}

#[tokio::test]
async fn hash_tracks_contents() {
    let fixture = Fixture::new();
    let first = assemble(fixture.spec(true)).await.unwrap();
    let second = assemble(fixture.spec(true)).await.unwrap();
    assert_eq!(first.sha256_base64, second.sha256_base64);

    write_file(&fixture.source(), "def lambda_handler(event, context):\n    return 2\n");
    let third = assemble(fixture.spec(true)).await.unwrap();
    assert_ne!(first.sha256_base64, third.sha256_base64);

    write_dependency_zip(&fixture.dependencies(), &[("lib1", "one"), ("lib2", "TWO")]);
    let fourth = assemble(fixture.spec(true)).await.unwrap();
    assert_ne!(third.sha256_base64, fourth.sha256_base64);
}

#[tokio::test]
async fn missing_source_is_not_found_and_cleans_up() {
    let fixture = Fixture::new();
    let mut spec = fixture.spec(true);
    spec.source_file = fixture.dir.path().join("missing.py");
    let err = assemble(spec).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[tokio::test]
async fn corrupt_dependencies_are_an_archive_error() {
    let fixture = Fixture::new();
    write_file(&fixture.dependencies(), "this is not a zip file");
    let err = assemble(fixture.spec(true)).await.unwrap_err();
    assert!(matches!(err, Error::Archive { .. }), "{err}");
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[tokio::test]
async fn concurrent_builds_of_one_function_do_not_collide() {
    let fixture = Fixture::new();
    let mut a = fixture.spec(true);
    a.output_path = fixture.dir.path().join("a.zip");
    let mut b = fixture.spec(true);
    b.output_path = fixture.dir.path().join("b.zip");

    let (a, b) = tokio::join!(assemble(a), assemble(b));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.entries, b.entries);
    assert_eq!(a.sha256_base64, b.sha256_base64);
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[tokio::test]
async fn unwritable_output_is_io_and_cleans_up() {
    let fixture = Fixture::new();
    let blocker = fixture.dir.path().join("blocker");
    write_file(&blocker, "a file, not a directory");
    let mut spec = fixture.spec(true);
    spec.output_path = blocker.join("out.zip");
    let err = assemble(spec).await.unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
    assert!(is_empty_dir(&fixture.staging_root()));
}

#[tokio::test]
async fn assemble_can_run_on_a_spawned_task() {
    let fixture = Fixture::new();
    let archive = tokio::spawn(assemble(fixture.spec(false)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vec!["lambda_function.py"], archive.entries);

    let mut spec = fixture.spec(false);
    spec.source_file = fixture.dir.path().join("missing.py");
    let err = tokio::spawn(assemble(spec)).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");
}

#[cfg(unix)]
#[test]
fn symlinks_are_left_out_of_entries() {
    let fixture = Fixture::new();
    let staging = StagingDir::create(fixture.staging_root(), "picToTxt").unwrap();
    let staged = staging.stage_source(fixture.source()).unwrap();
    std::os::unix::fs::symlink(&staged, staging.path().join("link.py")).unwrap();
    assert_eq!(vec!["lambda_function.py"], staging.entries().unwrap());
}
