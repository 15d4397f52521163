use anyhow::{bail, Context, Result};
use clap::Parser;
use mimosa_core::registry::HttpRegistryClient;
use mimosa_core::RegistryClient;

/// Report whether a cache marker exists for a tag, without running or
/// mutating anything. A thin, non-authoritative caller of `RegistryClient`:
/// the real hit/miss decision is made by `dispatch`, this only echoes what
/// one marker lookup would find.
#[derive(Debug, Parser)]
pub(crate) struct CacheInspect {
    /// The tag a cache hit would retag, e.g. `reg.local/app:v1`.
    tag: String,

    /// The content hash to check the marker for.
    hash: String,
}

impl CacheInspect {
    pub(crate) async fn run(&self) -> Result<()> {
        let Some(tag) = mimosa_core::parse::TagRef::parse(&self.tag) else {
            bail!("'{}' is not a valid tag reference", self.tag);
        };
        let cache_tag = tag.cache_tag(&self.hash);

        let registry = HttpRegistryClient::new();
        let present = registry
            .exists(&cache_tag)
            .await
            .with_context(|| format!("failed to look up cache marker '{cache_tag}'"))?;

        println!("mimosa-cache-marker: {cache_tag} present={present}");
        Ok(())
    }
}
