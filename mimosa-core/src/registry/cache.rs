/*!
The three cache operations layered on top of `RegistryClient`: existence
lookup, marker save, and retag. Each takes the parsed command's per-target
tag map and drives one or more manifest round trips, aggregating per-target
failures rather than stopping at the first one.
*/
use super::error::Error as RegistryError;
use super::{Manifest, RegistryClient};
use crate::parse::TagRef;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    #[snafu(display("No targets were supplied to check against the cache"))]
    NoTargetsToCheck,

    #[snafu(display("No cache tag pairs were supplied to retag"))]
    NoPairs,

    #[snafu(display(
        "Retag pair crosses repositories: cache tag '{}' vs new tag '{}'",
        cache_tag,
        new_tag
    ))]
    CrossRepoRetag { cache_tag: String, new_tag: String },

    #[snafu(display("Cache lookup failed for target '{}': {}", target, source))]
    LookupFailed {
        target: String,
        source: RegistryError,
    },

    #[snafu(display("Saving cache tags failed for {} target(s): {:?}", failures.len(), failures))]
    SomeCacheTagsFailed { failures: Vec<(String, String)> },

    #[snafu(display("Retagging failed: {}", source))]
    RetagFailed { source: RegistryError },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A `{cacheTag, newTag}` pair produced by a cache hit: the manifest stored
/// under `cache_tag` should be published at `new_tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTagPair {
    pub cache_tag: TagRef,
    pub new_tag: TagRef,
}

/// `Exists(hash, tagsByTarget)`. Checks one cache tag per target (derived
/// from that target's first requested tag) and, on an all-targets hit,
/// returns one `CacheTagPair` per requested tag across every target.
pub async fn exists(
    client: &dyn RegistryClient,
    hash: &str,
    targets: &[(String, Vec<TagRef>)],
) -> Result<(bool, Vec<CacheTagPair>)> {
    snafu::ensure!(!targets.is_empty(), NoTargetsToCheckSnafu);

    let mut all_present = true;
    let mut per_target_cache_tag = Vec::with_capacity(targets.len());

    for (name, tags) in targets {
        let first = match tags.first() {
            Some(t) => t,
            None => {
                all_present = false;
                continue;
            }
        };
        let cache_tag = first.cache_tag(hash);
        let present = client
            .exists(&cache_tag)
            .await
            .context(LookupFailedSnafu { target: name.clone() })?;
        if !present {
            all_present = false;
        }
        per_target_cache_tag.push((name.clone(), cache_tag, tags.clone()));
    }

    if !all_present {
        return Ok((false, Vec::new()));
    }

    let mut pairs = Vec::new();
    for (_, cache_tag, tags) in per_target_cache_tag {
        for new_tag in tags {
            pairs.push(CacheTagPair {
                cache_tag: cache_tag.clone(),
                new_tag,
            });
        }
    }

    Ok((true, pairs))
}

/// `SaveCacheTags(hash, tagsByTarget, dryRun)`. For each target, copies the
/// manifest at the first requested tag to `mimosa-content-hash-<hash>` in
/// the same repository. Failures across targets are collected and reported
/// together; this never aborts early so a transient failure on one target
/// doesn't block markers for the others.
pub async fn save_cache_tags(
    client: &dyn RegistryClient,
    hash: &str,
    targets: &[(String, Vec<TagRef>)],
    dry_run: bool,
) -> Result<()> {
    let mut failures = Vec::new();

    for (name, tags) in targets {
        let Some(source_tag) = tags.first() else {
            continue;
        };
        let cache_tag = source_tag.cache_tag(hash);

        let result = save_one(client, source_tag, &cache_tag, dry_run).await;
        if let Err(e) = result {
            failures.push((name.clone(), e.to_string()));
        }
    }

    snafu::ensure!(failures.is_empty(), SomeCacheTagsFailedSnafu { failures });
    Ok(())
}

async fn save_one(
    client: &dyn RegistryClient,
    source_tag: &TagRef,
    cache_tag: &TagRef,
    dry_run: bool,
) -> std::result::Result<(), RegistryError> {
    let manifest = client.get_manifest(source_tag).await?;
    if dry_run {
        return Ok(());
    }
    client.put_manifest(cache_tag, &manifest).await
}

/// `RetagFromCacheTags(pairs, dryRun)`. Copies the manifest at each pair's
/// `cache_tag` to its `new_tag`, both required to be in the same repository.
pub async fn retag_from_cache_tags(
    client: &dyn RegistryClient,
    pairs: &[CacheTagPair],
    dry_run: bool,
) -> Result<()> {
    snafu::ensure!(!pairs.is_empty(), NoPairsSnafu);

    for pair in pairs {
        snafu::ensure!(
            pair.cache_tag.same_repository(&pair.new_tag),
            CrossRepoRetagSnafu {
                cache_tag: pair.cache_tag.to_string(),
                new_tag: pair.new_tag.to_string(),
            }
        );
    }

    if dry_run {
        return Ok(());
    }

    for pair in pairs {
        let manifest = client
            .get_manifest(&pair.cache_tag)
            .await
            .context(RetagFailedSnafu)?;
        client
            .put_manifest(&pair.new_tag, &manifest)
            .await
            .context(RetagFailedSnafu)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRegistry {
        manifests: Mutex<HashMap<String, Manifest>>,
    }

    impl FakeRegistry {
        fn with(entries: &[(&str, &str)]) -> Self {
            let mut m = HashMap::new();
            for (reference, body) in entries {
                m.insert(
                    reference.to_string(),
                    Manifest {
                        media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
                        bytes: body.as_bytes().to_vec(),
                    },
                );
            }
            Self {
                manifests: Mutex::new(m),
            }
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn exists(&self, reference: &TagRef) -> super::super::error::Result<bool> {
            Ok(self.manifests.lock().unwrap().contains_key(&reference.to_string()))
        }

        async fn get_manifest(&self, reference: &TagRef) -> super::super::error::Result<Manifest> {
            self.manifests
                .lock()
                .unwrap()
                .get(&reference.to_string())
                .cloned()
                .ok_or_else(|| RegistryError::UnexpectedStatus {
                    reference: reference.to_string(),
                    status: 404,
                })
        }

        async fn put_manifest(&self, reference: &TagRef, manifest: &Manifest) -> super::super::error::Result<()> {
            self.manifests
                .lock()
                .unwrap()
                .insert(reference.to_string(), manifest.clone());
            Ok(())
        }

        async fn delete_manifest(&self, reference: &TagRef) -> super::super::error::Result<()> {
            self.manifests.lock().unwrap().remove(&reference.to_string());
            Ok(())
        }
    }

    fn tag(s: &str) -> TagRef {
        TagRef::parse(s).unwrap()
    }

    #[tokio::test]
    async fn exists_is_a_miss_when_marker_absent() {
        let registry = FakeRegistry::default();
        let targets = vec![("default".to_string(), vec![tag("reg.local/app:v1")])];
        let (hit, pairs) = exists(&registry, "abc123", &targets).await.unwrap();
        assert!(!hit);
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn exists_is_a_hit_when_marker_present_and_fans_out_tags() {
        let registry = FakeRegistry::with(&[("reg.local/app:mimosa-content-hash-abc123", "m")]);
        let targets = vec![(
            "default".to_string(),
            vec![tag("reg.local/app:v1"), tag("reg.local/app:v2")],
        )];
        let (hit, pairs) = exists(&registry, "abc123", &targets).await.unwrap();
        assert!(hit);
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn exists_requires_all_targets_present() {
        let registry = FakeRegistry::with(&[("reg.local/front:mimosa-content-hash-h", "m")]);
        let targets = vec![
            ("frontend".to_string(), vec![tag("reg.local/front:v1")]),
            ("backend".to_string(), vec![tag("reg.local/back:v1")]),
        ];
        let (hit, _) = exists(&registry, "h", &targets).await.unwrap();
        assert!(!hit);
    }

    #[tokio::test]
    async fn exists_rejects_empty_target_list() {
        let registry = FakeRegistry::default();
        let err = exists(&registry, "h", &[]).await.unwrap_err();
        assert!(matches!(err, CacheError::NoTargetsToCheck));
    }

    #[tokio::test]
    async fn save_cache_tags_copies_source_manifest_to_cache_tag() {
        let registry = FakeRegistry::with(&[("reg.local/app:v1", "manifest-bytes")]);
        let targets = vec![("default".to_string(), vec![tag("reg.local/app:v1")])];
        save_cache_tags(&registry, "h", &targets, false).await.unwrap();

        let stored = registry
            .get_manifest(&tag("reg.local/app:mimosa-content-hash-h"))
            .await
            .unwrap();
        assert_eq!(stored.bytes, b"manifest-bytes");
    }

    #[tokio::test]
    async fn save_cache_tags_dry_run_performs_no_writes() {
        let registry = FakeRegistry::with(&[("reg.local/app:v1", "manifest-bytes")]);
        let targets = vec![("default".to_string(), vec![tag("reg.local/app:v1")])];
        save_cache_tags(&registry, "h", &targets, true).await.unwrap();

        assert!(registry
            .get_manifest(&tag("reg.local/app:mimosa-content-hash-h"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn retag_rejects_empty_pairs() {
        let registry = FakeRegistry::default();
        let err = retag_from_cache_tags(&registry, &[], false).await.unwrap_err();
        assert!(matches!(err, CacheError::NoPairs));
    }

    #[tokio::test]
    async fn retag_rejects_cross_repository_pairs() {
        let registry = FakeRegistry::default();
        let pairs = vec![CacheTagPair {
            cache_tag: tag("reg.local/a:mimosa-content-hash-h"),
            new_tag: tag("reg.local/b:v1"),
        }];
        let err = retag_from_cache_tags(&registry, &pairs, false).await.unwrap_err();
        assert!(matches!(err, CacheError::CrossRepoRetag { .. }));
    }

    #[tokio::test]
    async fn retag_copies_manifest_to_new_tag() {
        let registry = FakeRegistry::with(&[("reg.local/app:mimosa-content-hash-h", "manifest-bytes")]);
        let pairs = vec![CacheTagPair {
            cache_tag: tag("reg.local/app:mimosa-content-hash-h"),
            new_tag: tag("reg.local/app:v2"),
        }];
        retag_from_cache_tags(&registry, &pairs, false).await.unwrap();

        let stored = registry.get_manifest(&tag("reg.local/app:v2")).await.unwrap();
        assert_eq!(stored.bytes, b"manifest-bytes");
    }
}
