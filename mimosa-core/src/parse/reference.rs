/*!
Small value types for OCI image references, in the spirit of
`oci-cli-wrapper`'s `DockerArchitecture`: a tiny type with a `Display` and a
fallible `TryFrom<&str>`, kept close to the data it models instead of reaching
for a full reference-parsing crate.
*/
use std::fmt;

pub const CACHE_TAG_PREFIX: &str = "mimosa-content-hash-";

/// `{registry, repository}` — the part of two tag references that must match
/// for a retag or a cache-tag lookup to be valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub registry: String,
    pub repository: String,
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}

/// `{registry, repository, tag}`, canonical string form `registry/repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl TagRef {
    /// Parse a `docker build -t` style value. Digest references
    /// (`repo@sha256:...`) are intentionally not accepted here: the spec
    /// only asks tag references to participate in `tagsByTarget`.
    pub fn parse(reference: &str) -> Option<Self> {
        if reference.is_empty() || reference.contains('@') {
            return None;
        }

        let last_slash = reference.rfind('/');
        let last_colon = reference.rfind(':');
        let (repo_and_registry, tag) = match last_colon {
            Some(ci) if last_slash.map_or(true, |si| ci > si) => {
                (&reference[..ci], reference[ci + 1..].to_string())
            }
            _ => (reference, "latest".to_string()),
        };

        if repo_and_registry.is_empty() || tag.is_empty() {
            return None;
        }

        let parts: Vec<&str> = repo_and_registry.splitn(2, '/').collect();
        let (registry, repository) = if parts.len() == 2
            && (parts[0].contains('.') || parts[0].contains(':') || parts[0] == "localhost")
        {
            (parts[0].to_string(), parts[1].to_string())
        } else {
            ("docker.io".to_string(), repo_and_registry.to_string())
        };

        Some(Self {
            registry,
            repository,
            tag,
        })
    }

    pub fn repository_ref(&self) -> RepositoryRef {
        RepositoryRef {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
        }
    }

    pub fn same_repository(&self, other: &TagRef) -> bool {
        self.registry == other.registry && self.repository == other.repository
    }

    /// The cache-tag reference a fingerprint maps to in this tag's
    /// repository: `mimosa-content-hash-<hash>`.
    pub fn cache_tag(&self, hash: &str) -> TagRef {
        TagRef {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: format!("{CACHE_TAG_PREFIX}{hash}"),
        }
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}
