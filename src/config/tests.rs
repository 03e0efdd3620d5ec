use super::*;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.registries.ghcr_owner, "imgmatrix");
    assert_eq!(config.build.tool, "docker");
    assert_eq!(config.build.concurrency, 2);
    assert!(config.build.context.is_none());
    assert_eq!(config.inspect.retry_policy(), RetryPolicy::default());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[registries]
ghcr_owner = "Acme"

[build]
concurrency = 8

[inspect]
max_attempts = 5
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.registries.ghcr_owner, "Acme");
    assert_eq!(config.registries.dockerhub_namespace, "imgmatrix");
    assert_eq!(config.build.concurrency, 8);
    assert_eq!(config.build.timeout(), Duration::from_secs(3600));

    let policy = config.inspect.retry_policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.initial_backoff, Duration::from_millis(500));
    assert_eq!(config.inspect.timeout(), Duration::from_secs(30));

    let mapping = config.registries.mapping();
    assert_eq!(mapping.ghcr_owner, "Acme");
}

#[test]
fn test_zero_concurrency_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[build]\nconcurrency = 0\n").unwrap();
    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_missing_explicit_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from(&dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_malformed_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[build\n").unwrap();
    assert!(Config::load_from(&path).is_err());
}
