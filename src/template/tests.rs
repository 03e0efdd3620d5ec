use super::*;
use crate::matrix::Channel;

fn entry(base: &str, variant: &str, packages: &[&str], env: &[(&str, &str)]) -> MatrixEntry {
    MatrixEntry::new(
        base,
        variant,
        Architecture::Amd64,
        packages.iter().map(|p| p.to_string()).collect(),
        env.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        Channel::Stable,
    )
    .unwrap()
}

fn release(packages: &[&str]) -> MatrixEntry {
    entry("debian:bookworm-slim", "release", packages, &[])
}

#[test]
fn test_render_is_deterministic() {
    let e = entry(
        "node:22-bookworm-slim",
        "release",
        &["git", "curl"],
        &[("NODE_ENV", "production"), ("A", "1")],
    );
    let first = render(&e).unwrap().to_text();
    for _ in 0..5 {
        assert_eq!(render(&e).unwrap().to_text(), first);
    }
}

#[test]
fn test_render_ignores_input_order() {
    let a = entry("node:22", "release", &["git", "curl", "tini"], &[("B", "2"), ("A", "1")]);
    let b = entry("node:22", "release", &["tini", "curl", "git"], &[("A", "1"), ("B", "2")]);
    assert_eq!(render(&a).unwrap().to_text(), render(&b).unwrap().to_text());
}

#[test]
fn test_render_is_architecture_independent() {
    let amd = release(&["curl"]);
    let arm = MatrixEntry::new(
        "debian:bookworm-slim",
        "release",
        Architecture::Arm64,
        vec!["curl".to_string()],
        Vec::<(String, String)>::new(),
        Channel::Stable,
    )
    .unwrap();
    assert_eq!(render(&amd).unwrap(), render(&arm).unwrap());
}

#[test]
fn test_scenario_packages_sorted_single_user_block() {
    let spec = render(&release(&["curl", "git"])).unwrap();

    let install = spec.block_lines(InstructionBlock::Packages);
    assert_eq!(install.len(), 1);
    let line = install[0];
    let curl = line.find(" curl").unwrap();
    let git = line.find(" git").unwrap();
    assert!(curl < git, "packages not sorted: {}", line);
    assert!(line.contains("apt-get install -y --no-install-recommends curl git"));

    let text = spec.to_text();
    let user_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("USER ")).collect();
    assert_eq!(user_lines, vec!["USER 1000:1000"]);
    assert_eq!(
        text.lines().filter(|l| l.contains("useradd")).count(),
        1
    );
}

#[test]
fn test_scenario_no_packages_omits_block_only() {
    let with = render(&release(&["curl", "git"])).unwrap();
    let without = render(&release(&[])).unwrap();

    assert!(without.block_lines(InstructionBlock::Packages).is_empty());
    assert!(!without.to_text().contains("apt-get"));

    let mut expected = with.blocks();
    expected.retain(|b| *b != InstructionBlock::Packages);
    assert_eq!(without.blocks(), expected);

    // Every other line is unchanged
    let strip = |spec: &DockerfileSpec| -> Vec<String> {
        spec.instructions()
            .iter()
            .filter(|i| i.block != InstructionBlock::Packages)
            .map(|i| i.line.clone())
            .collect()
    };
    assert_eq!(strip(&with), strip(&without));
}

#[test]
fn test_block_order_with_all_fields() {
    let spec = render(&entry("node:22", "release", &["curl"], &[("NODE_ENV", "production")])).unwrap();
    assert_eq!(
        spec.blocks(),
        vec![
            InstructionBlock::Base,
            InstructionBlock::BuildArgs,
            InstructionBlock::Environment,
            InstructionBlock::Packages,
            InstructionBlock::User,
            InstructionBlock::Entrypoint,
        ]
    );
}

#[test]
fn test_block_order_is_monotonic_for_every_combination() {
    let package_sets: [&[&str]; 2] = [&[], &["curl", "git"]];
    let env_sets: [&[(&str, &str)]; 2] = [&[], &[("NODE_ENV", "production")]];
    for packages in package_sets {
        for env in env_sets {
            for base in ["node:22-alpine", "debian:bookworm-slim"] {
                let spec = render(&entry(base, "release", packages, env)).unwrap();
                let blocks = spec.blocks();
                let mut sorted = blocks.clone();
                sorted.sort();
                assert_eq!(blocks, sorted);
                assert_eq!(blocks.first(), Some(&InstructionBlock::Base));
                assert_eq!(blocks.last(), Some(&InstructionBlock::Entrypoint));
                assert!(blocks.contains(&InstructionBlock::User));
            }
        }
    }
}

#[test]
fn test_env_lines_sorted_and_quoted() {
    let spec = render(&entry(
        "node:22",
        "release",
        &[],
        &[("Z_LAST", "z"), ("A_FIRST", "say \"hi\" \\o/")],
    ))
    .unwrap();
    assert_eq!(
        spec.block_lines(InstructionBlock::Environment),
        vec![
            r#"ENV A_FIRST="say \"hi\" \\o/""#,
            r#"ENV Z_LAST="z""#,
        ]
    );
}

#[test]
fn test_env_values_are_not_expanded() {
    let spec = render(&entry(
        "node:22",
        "release",
        &[],
        &[("NODE_PATH", "$HOME/lib"), ("PRICE", "${X:-5}\\$")],
    ))
    .unwrap();
    assert_eq!(
        spec.block_lines(InstructionBlock::Environment),
        vec![
            r#"ENV NODE_PATH="\$HOME/lib""#,
            r#"ENV PRICE="\${X:-5}\\\$""#,
        ]
    );
}

#[test]
fn test_duplicate_packages_collapse() {
    let spec = render(&release(&["curl", "curl", "git"])).unwrap();
    let line = spec.block_lines(InstructionBlock::Packages)[0];
    assert_eq!(line.matches("curl").count(), 1);
}

#[test]
fn test_alpine_uses_apk() {
    let spec = render(&entry("node:22-alpine", "alpine", &["tini", "curl"], &[])).unwrap();
    assert_eq!(
        spec.block_lines(InstructionBlock::Packages),
        vec!["RUN apk add --no-cache curl tini"]
    );
    let user = spec.block_lines(InstructionBlock::User);
    assert!(user[0].contains("-u 1000"));
    assert!(user[0].contains("-g 1000"));
}

#[test]
fn test_base_block_labels() {
    let digest = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    let spec = render(&entry(&format!("node:22@{}", digest), "release", &[], &[])).unwrap();
    let base = spec.block_lines(InstructionBlock::Base);
    assert_eq!(base[0], format!("FROM --platform=$TARGETPLATFORM node:22@{}", digest));
    assert_eq!(
        base[1],
        format!(
            "LABEL org.opencontainers.image.base.name=\"docker.io/library/node:22@{}\"",
            digest
        )
    );
    assert_eq!(
        base[2],
        format!("LABEL org.opencontainers.image.base.digest=\"{}\"", digest)
    );

    let unpinned = render(&release(&[])).unwrap();
    assert_eq!(unpinned.block_lines(InstructionBlock::Base).len(), 2);
    assert!(!unpinned.to_text().contains("image.created"));
    assert!(!unpinned.to_text().contains("image.revision"));
}

#[test]
fn test_build_args_use_platform_placeholders() {
    let spec = render(&release(&[])).unwrap();
    assert_eq!(
        spec.block_lines(InstructionBlock::BuildArgs),
        vec![
            "ARG TARGETPLATFORM",
            "ARG TARGETOS",
            "ARG TARGETARCH",
            "ARG TARGETVARIANT",
        ]
    );
}

#[test]
fn test_entrypoint_per_variant() {
    let release = render(&release(&[])).unwrap();
    assert_eq!(
        release.block_lines(InstructionBlock::Entrypoint),
        vec![r#"ENTRYPOINT ["docker-entrypoint.sh"]"#, r#"CMD ["node"]"#]
    );

    let dev = render(&entry("node:22", "dev", &[], &[])).unwrap();
    assert_eq!(
        dev.block_lines(InstructionBlock::Entrypoint)[1],
        r#"CMD ["sh"]"#
    );
}

#[test]
fn test_text_has_no_header_or_footer() {
    let spec = render(&release(&[])).unwrap();
    let text = spec.to_text();
    assert!(text.starts_with("FROM "));
    assert!(text.ends_with("CMD [\"node\"]\n"));
    assert_eq!(text.lines().count(), spec.instructions().len());
}

#[test]
fn test_content_digest_tracks_text() {
    let a = render(&release(&["curl"])).unwrap();
    let b = render(&release(&["git"])).unwrap();
    assert_eq!(a.content_digest(), render(&release(&["curl"])).unwrap().content_digest());
    assert_ne!(a.content_digest(), b.content_digest());
    assert!(a.content_digest().starts_with("sha256:"));
}
