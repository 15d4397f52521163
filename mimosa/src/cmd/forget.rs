use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use mimosa_core::registry::HttpRegistryClient;
use mimosa_core::RegistryClient;

/// Delete the cache marker for a tag, so the next matching build or bake is
/// treated as a miss. A thin, non-authoritative caller of `RegistryClient`:
/// it never touches the image tag itself, only the marker tag alongside it.
#[derive(Debug, Parser)]
pub(crate) struct Forget {
    /// The tag a previous cache hit would have retagged, e.g. `reg.local/app:v1`.
    tag: String,

    /// The content hash the marker was stored under.
    hash: String,
}

impl Forget {
    pub(crate) async fn run(&self) -> Result<()> {
        let Some(tag) = mimosa_core::parse::TagRef::parse(&self.tag) else {
            bail!("'{}' is not a valid tag reference", self.tag);
        };
        let cache_tag = tag.cache_tag(&self.hash);

        let registry = HttpRegistryClient::new();
        registry
            .delete_manifest(&cache_tag)
            .await
            .with_context(|| format!("failed to delete cache marker '{cache_tag}'"))?;

        info!("forgot cache marker '{cache_tag}'");
        Ok(())
    }
}
