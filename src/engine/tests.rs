use super::docker::{classify_inspect_failure, image_ref_from_iid, parse_inspect_output};
use super::*;
use crate::error::Error;

#[test]
fn test_parse_inspect_output_takes_first_image() {
    let stdout = br#"[{"Id": "sha256:abc", "Size": 1024}, {"Id": "sha256:def"}]"#;
    let value = parse_inspect_output("node:test", stdout).unwrap();
    assert_eq!(value["Id"], "sha256:abc");
    assert_eq!(value["Size"], 1024);
}

#[test]
fn test_parse_inspect_output_empty_array() {
    let err = parse_inspect_output("node:test", b"[]").unwrap_err();
    assert!(matches!(err, Error::ImageNotFound { image } if image == "node:test"));
}

#[test]
fn test_parse_inspect_output_plain_object() {
    let value = parse_inspect_output("node:test", br#"{"digest": "sha256:abc"}"#).unwrap();
    assert_eq!(value["digest"], "sha256:abc");
}

#[test]
fn test_parse_inspect_output_garbage() {
    let err = parse_inspect_output("node:test", b"not json").unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn test_classify_missing_image() {
    let err = classify_inspect_failure("node:test", "\nError: No such image: node:test\n");
    assert!(matches!(err, Error::ImageNotFound { .. }));
    assert!(!err.is_transient());

    let err = classify_inspect_failure("node:test", "Error response from daemon: No such object: x");
    assert!(matches!(err, Error::ImageNotFound { .. }));
}

#[test]
fn test_classify_daemon_failure_is_transient() {
    let stderr = "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n";
    let err = classify_inspect_failure("node:test", stderr);
    match &err {
        Error::InspectionFailed { image, reason } => {
            assert_eq!(image, "node:test");
            assert!(reason.starts_with("Cannot connect"));
        }
        other => panic!("expected InspectionFailed, got {:?}", other),
    }
    assert!(err.is_transient());
}

#[test]
fn test_image_ref_from_iid() {
    assert_eq!(
        image_ref_from_iid(Ok("sha256:abc\n".to_string()), "node:release-amd64"),
        "sha256:abc"
    );
    assert_eq!(
        image_ref_from_iid(Ok("  ".to_string()), "node:release-amd64"),
        "node:release-amd64"
    );
}

#[test]
fn test_unreadable_iid_falls_back_to_tag() {
    let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no iid file");
    assert_eq!(
        image_ref_from_iid(Err(missing), "node:release-amd64"),
        "node:release-amd64"
    );
}

#[test]
fn test_docker_cli_name() {
    let tool = DockerCli::new("/usr/bin/docker")
        .with_build_timeout(std::time::Duration::from_secs(5))
        .with_inspect_timeout(std::time::Duration::from_secs(1));
    assert_eq!(tool.name(), "docker");
}

#[tokio::test]
async fn test_build_with_missing_binary_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tool = DockerCli::new(dir.path().join("no-such-docker"));
    let request = BuildRequest {
        dockerfile: "FROM scratch\n",
        context: dir.path(),
        platform: "linux/amd64",
        tag: "imgmatrix-test:latest",
    };
    let err = tool
        .build(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BuildFailed { platform, .. } if platform == "linux/amd64"));
}

#[tokio::test]
async fn test_inspect_with_missing_binary_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let tool = DockerCli::new(dir.path().join("no-such-docker"));
    let err = tool.inspect("node:test").await.unwrap_err();
    assert!(err.is_transient());
}
