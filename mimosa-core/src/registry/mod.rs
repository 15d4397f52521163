/*!
Speaks the OCI Distribution v2 manifest endpoints directly over HTTP(S), in
the trait-object style `oci-cli-wrapper` uses for its `ImageToolImpl`: a
narrow async trait plus one default implementation, so callers depend on the
trait and tests can substitute a fake without a registry on the other end.

Authentication is read from the ambient Docker config the same way the
`docker`/`crane` binaries `oci-cli-wrapper` shells out to would pick it up;
mimosa does not run credential helpers, it only understands the inline
`auths` entries `docker login` writes.
*/
pub mod cache;
pub mod error;

use async_trait::async_trait;
use error::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::parse::TagRef;

pub const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.index.v1+json, application/vnd.docker.distribution.manifest.list.v2+json";

/// A manifest as fetched from or about to be pushed to a registry: its raw
/// bytes plus the media type under which they were served or should be
/// served. Content identity, not a parsed structure: mimosa only ever copies
/// manifests between tags, it never needs to understand their insides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// The registry operations the cache protocol needs. A trait so tests can
/// swap in an in-process fake instead of requiring a live registry.
#[async_trait]
pub trait RegistryClient: Send + Sync + 'static {
    /// True if `reference` resolves to an existing manifest.
    async fn exists(&self, reference: &TagRef) -> Result<bool>;

    /// Fetch a manifest's bytes and media type.
    async fn get_manifest(&self, reference: &TagRef) -> Result<Manifest>;

    /// Upload `manifest` under `reference`, creating or overwriting the tag.
    async fn put_manifest(&self, reference: &TagRef, manifest: &Manifest) -> Result<()>;

    /// Delete the tag, if the registry supports tag deletion. Not part of
    /// the cache protocol proper; used only by the `forget` auxiliary tool.
    async fn delete_manifest(&self, reference: &TagRef) -> Result<()>;
}

#[derive(Debug, Deserialize, Default)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct DockerAuthEntry {
    auth: Option<String>,
}

fn docker_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    home::home_dir().map(|home| home.join(".docker").join("config.json"))
}

fn load_basic_auth(registry: &str) -> Option<String> {
    let path = docker_config_path()?;
    let contents = std::fs::read_to_string(path).ok()?;
    let config: DockerConfig = serde_json::from_str(&contents).ok()?;
    config
        .auths
        .get(registry)
        .and_then(|entry| entry.auth.clone())
}

/// Map `docker.io` to the host the registry protocol actually serves from.
/// Direct HTTP calls need the real endpoint; Docker Hub's API does not
/// listen on `docker.io` itself.
fn registry_host(registry: &str) -> &str {
    if registry == "docker.io" {
        "registry-1.docker.io"
    } else {
        registry
    }
}

fn manifest_url(reference: &TagRef) -> String {
    format!(
        "https://{}/v2/{}/manifests/{}",
        registry_host(&reference.registry),
        reference.repository,
        reference.tag
    )
}

/// Default `RegistryClient`, backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: Client,
}

impl HttpRegistryClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        reference: &TagRef,
    ) -> reqwest::RequestBuilder {
        match load_basic_auth(&reference.registry) {
            Some(auth) => builder.header("Authorization", format!("Basic {auth}")),
            None => builder,
        }
    }
}

impl Default for HttpRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn exists(&self, reference: &TagRef) -> Result<bool> {
        let url = manifest_url(reference);
        let request = self.authorize(
            self.client.head(&url).header("Accept", MANIFEST_ACCEPT),
            reference,
        );
        let response = request.send().await.context(error::RequestSnafu {
            reference: reference.to_string(),
        })?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => error::UnexpectedStatusSnafu {
                reference: reference.to_string(),
                status: other.as_u16(),
            }
            .fail(),
        }
    }

    async fn get_manifest(&self, reference: &TagRef) -> Result<Manifest> {
        let url = manifest_url(reference);
        let request = self.authorize(
            self.client.get(&url).header("Accept", MANIFEST_ACCEPT),
            reference,
        );
        let response = request.send().await.context(error::RequestSnafu {
            reference: reference.to_string(),
        })?;

        if response.status() != StatusCode::OK {
            return error::UnexpectedStatusSnafu {
                reference: reference.to_string(),
                status: response.status().as_u16(),
            }
            .fail();
        }

        let media_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context(error::MissingContentTypeSnafu {
                reference: reference.to_string(),
            })?;

        let bytes = response
            .bytes()
            .await
            .context(error::ReadBodySnafu {
                reference: reference.to_string(),
            })?
            .to_vec();

        Ok(Manifest { media_type, bytes })
    }

    async fn put_manifest(&self, reference: &TagRef, manifest: &Manifest) -> Result<()> {
        let url = manifest_url(reference);
        let request = self
            .authorize(self.client.put(&url), reference)
            .header("Content-Type", &manifest.media_type)
            .body(manifest.bytes.clone());

        let response = request.send().await.context(error::RequestSnafu {
            reference: reference.to_string(),
        })?;

        if !response.status().is_success() {
            return error::UnexpectedStatusSnafu {
                reference: reference.to_string(),
                status: response.status().as_u16(),
            }
            .fail();
        }

        Ok(())
    }

    async fn delete_manifest(&self, reference: &TagRef) -> Result<()> {
        let url = manifest_url(reference);
        let request = self.authorize(self.client.delete(&url), reference);
        let response = request.send().await.context(error::RequestSnafu {
            reference: reference.to_string(),
        })?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return error::UnexpectedStatusSnafu {
                reference: reference.to_string(),
                status: response.status().as_u16(),
            }
            .fail();
        }

        Ok(())
    }
}
