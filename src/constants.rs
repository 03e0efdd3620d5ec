/// Platform constants for container images
pub mod platform {
    /// Linux AMD64 platform identifier
    pub const LINUX_AMD64: &str = "linux/amd64";

    /// Linux ARM64 platform identifier
    pub const LINUX_ARM64: &str = "linux/arm64";

    /// Linux ARMv7 platform identifier
    pub const LINUX_ARM_V7: &str = "linux/arm/v7";

    /// Linux PowerPC 64 LE platform identifier
    pub const LINUX_PPC64LE: &str = "linux/ppc64le";

    /// Linux S390X platform identifier
    pub const LINUX_S390X: &str = "linux/s390x";
}

/// Container image tag constants
pub mod tag {
    /// Moving tag for the stable channel
    pub const LATEST: &str = "latest";

    /// Moving tag for the edge channel
    pub const EDGE: &str = "edge";

    /// Prefix of the immutable commit tag
    pub const SHA_PREFIX: &str = "sha-";

    /// Number of commit sha characters kept in the commit tag
    pub const SHORT_SHA_LEN: usize = 7;

    /// Registry limit on tag length
    pub const MAX_LEN: usize = 128;
}

/// User and group constants
pub mod user {
    /// Name of the non-root account created in every image
    pub const NAME: &str = "app";

    /// Non-root user UID
    pub const UID: u32 = 1000;

    /// Non-root user GID
    pub const GID: u32 = 1000;
}

/// Registry hosts
pub mod registry {
    pub const GHCR: &str = "ghcr.io";

    pub const DOCKERHUB: &str = "docker.io";
}

/// OCI annotation keys written as image labels
pub mod label {
    pub const BASE_NAME: &str = "org.opencontainers.image.base.name";

    pub const BASE_DIGEST: &str = "org.opencontainers.image.base.digest";
}
