use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

const MATRIX: &str = r#"
repository = "node"
default_branch = "main"

[variants.release]
base_image = "node:22-bookworm-slim"
architectures = ["amd64", "arm64"]
packages = ["git", "curl"]
default = true

[variants.release.env]
NODE_ENV = "production"

[variants.alpine]
base_image = "node:22-alpine"
architectures = ["arm/v7"]

[variants.legacy]
base_image = "node:16-bullseye"
channel = "archived"
architectures = ["amd64"]
"#;

fn write_matrix(dir: &Path, content: &str) -> Result<std::path::PathBuf> {
    let path = dir.join("matrix.toml");
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Command with the CI environment cleared so tests do not pick up the
/// ref of the job running them
fn imgmatrix() -> Result<Command> {
    let mut cmd = Command::cargo_bin("imgmatrix")?;
    cmd.env_remove("GITHUB_REF")
        .env_remove("GITHUB_SHA")
        .env_remove("GITHUB_REPOSITORY_OWNER")
        .env_remove("DOCKERHUB_NAMESPACE")
        .env_remove("IMGMATRIX_MATRIX");
    Ok(cmd)
}

#[test]
fn test_version_command() -> Result<()> {
    let mut cmd = imgmatrix()?;
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("imgmatrix 0.1.0"));
    Ok(())
}

#[test]
fn test_version_subcommand() -> Result<()> {
    let mut cmd = imgmatrix()?;
    cmd.arg("version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("imgmatrix 0.1.0"));
    Ok(())
}

#[test]
fn test_help_command() -> Result<()> {
    let mut cmd = imgmatrix()?;
    cmd.arg("--help");
    cmd.assert().success().stdout(predicate::str::contains(
        "Render, tag and measure multi-architecture Node.js base images",
    ));
    Ok(())
}

#[test]
fn test_build_help() -> Result<()> {
    let mut cmd = imgmatrix()?;
    cmd.arg("build").arg("--help");
    cmd.assert().success().stdout(predicate::str::contains(
        "Render, build, tag and measure every matrix entry",
    ));
    Ok(())
}

#[test]
fn test_render_writes_dockerfiles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;
    let out = dir.path().join("out");

    let mut cmd = imgmatrix()?;
    cmd.arg("render")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--out")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("release/arm64/Dockerfile"))
        .stdout(predicate::str::contains("alpine/arm-v7/Dockerfile"));

    let release = std::fs::read_to_string(out.join("release/amd64/Dockerfile"))?;
    assert!(release.starts_with("FROM --platform=$TARGETPLATFORM node:22-bookworm-slim\n"));
    assert!(release.contains("ENV NODE_ENV=\"production\"\n"));
    assert!(release.contains("apt-get install -y --no-install-recommends curl git"));
    assert!(release.contains("USER 1000:1000\n"));
    assert!(release.ends_with("CMD [\"node\"]\n"));

    // Same text for every architecture
    let arm64 = std::fs::read_to_string(out.join("release/arm64/Dockerfile"))?;
    assert_eq!(release, arm64);

    let alpine = std::fs::read_to_string(out.join("alpine/arm-v7/Dockerfile"))?;
    assert!(alpine.contains("addgroup -g 1000"));
    assert!(!alpine.contains("apt-get"));

    // Archived entries only take part in tagging
    assert!(!out.join("legacy").exists());
    Ok(())
}

#[test]
fn test_render_is_deterministic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;

    for out in ["a", "b"] {
        let mut cmd = imgmatrix()?;
        cmd.arg("render")
            .arg("--matrix")
            .arg(&matrix)
            .arg("--out")
            .arg(dir.path().join(out))
            .arg("--variant")
            .arg("release")
            .arg("--arch")
            .arg("amd64");
        cmd.assert().success();
    }

    let a = std::fs::read(dir.path().join("a/release/amd64/Dockerfile"))?;
    let b = std::fs::read(dir.path().join("b/release/amd64/Dockerfile"))?;
    assert_eq!(a, b);
    assert!(!dir.path().join("a/release/arm64").exists());
    Ok(())
}

#[test]
fn test_tags_for_release_tag() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;

    let mut cmd = imgmatrix()?;
    cmd.arg("tags")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--ref")
        .arg("refs/tags/v1.2.3")
        .arg("--sha")
        .arg(SHA)
        .arg("--ghcr-owner")
        .arg("Acme")
        .arg("--variant")
        .arg("release")
        .arg("--arch")
        .arg("amd64");
    let output = cmd.assert().success().get_output().stdout.clone();

    let report: serde_json::Value = serde_json::from_slice(&output)?;
    let entries = report.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["ghcr_repository"], "ghcr.io/acme/node");
    assert_eq!(entries[0]["dockerhub_repository"], "docker.io/imgmatrix/node");
    let tags: Vec<&str> = entries[0]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["1", "1.2", "1.2.3", "latest", "sha-0123456"]);
    Ok(())
}

#[test]
fn test_tags_feature_branch_from_env() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;
    let output = dir.path().join("tags.json");

    let mut cmd = imgmatrix()?;
    cmd.arg("tags")
        .arg("--output")
        .arg(&output)
        .arg("--variant")
        .arg("alpine")
        .env("IMGMATRIX_MATRIX", &matrix)
        .env("GITHUB_REF", "refs/heads/feature/X");
    cmd.assert().success();

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(output)?)?;
    assert_eq!(report[0]["tags"], serde_json::json!(["feature-x-alpine-arm-v7"]));
    Ok(())
}

#[test]
fn test_tags_requires_source_ref() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;

    let mut cmd = imgmatrix()?;
    cmd.arg("tags").arg("--matrix").arg(&matrix);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No source ref"));
    Ok(())
}

#[test]
fn test_tags_archived_feature_branch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;

    let mut cmd = imgmatrix()?;
    cmd.arg("tags")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--branch")
        .arg("feature/y")
        .arg("--variant")
        .arg("legacy");
    let output = cmd.assert().success().get_output().stdout.clone();

    let report: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(report[0]["tags"], serde_json::json!(["feature-y"]));
    Ok(())
}

#[test]
fn test_tags_reserved_branch_name_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(dir.path(), MATRIX)?;

    let mut cmd = imgmatrix()?;
    cmd.arg("tags")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--branch")
        .arg("latest")
        .arg("--variant")
        .arg("release");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Tag collision"));
    Ok(())
}

#[test]
fn test_invalid_matrix_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let matrix = write_matrix(
        dir.path(),
        r#"
repository = "node"

[variants.release]
base_image = "node:22"
architectures = ["amd64", "mips"]
"#,
    )?;

    let mut cmd = imgmatrix()?;
    cmd.arg("render")
        .arg("--matrix")
        .arg(&matrix)
        .arg("--out")
        .arg(dir.path().join("out"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported architecture: mips"));
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test]
fn test_missing_matrix_file() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let mut cmd = imgmatrix()?;
    cmd.arg("render")
        .arg("--matrix")
        .arg(dir.path().join("nope.toml"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load matrix"));
    Ok(())
}

#[test]
fn test_unknown_arch_filter_rejected() -> Result<()> {
    let mut cmd = imgmatrix()?;
    cmd.arg("render").arg("--arch").arg("sparc");
    cmd.assert().failure();
    Ok(())
}
