//! Synchronous registry facade over the async distribution client.
//!
//! One [`RegistryClient`] lives for one command invocation: it owns its
//! HTTP client and a private tokio runtime, and dropping it at the end of
//! the command releases both.

use crate::error::{LensError, Result};
use crate::extract::BlobSource;
use crate::history::{HistoryEntry, ManifestLayer};
use crate::platform::PlatformFilter;
use log::{debug, info};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use oci_spec::image::ImageConfiguration;
use tokio::runtime::Runtime;

/// Everything later stages need to know about one resolved image.
#[derive(Debug)]
pub struct ResolvedImage {
    pub reference: Reference,
    /// Digest of the platform-resolved manifest.
    pub manifest_digest: String,
    /// The manifest's own media type, when it names one.
    pub media_type: Option<String>,
    pub layers: Vec<ManifestLayer>,
    pub history: Vec<HistoryEntry>,
    descriptors: Vec<OciDescriptor>,
}

impl ResolvedImage {
    /// The manifest descriptor for a layer blob of this image.
    pub fn descriptor(&self, digest: &str) -> Option<&OciDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.digest.eq_ignore_ascii_case(digest))
    }

    /// Descriptor by manifest layer position.
    pub fn descriptor_at(&self, index: usize) -> Option<&OciDescriptor> {
        self.descriptors.get(index)
    }
}

/// Parses user input into a normalized reference.
pub fn parse_reference(image: &str) -> Result<Reference> {
    Reference::try_from(image).map_err(|e| {
        LensError::InvalidInput(format!("cannot parse image reference {:?}: {}", image, e))
    })
}

fn auth_from_env() -> RegistryAuth {
    match (
        std::env::var("REGISTRY_USERNAME"),
        std::env::var("REGISTRY_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => RegistryAuth::Basic(username, password),
        _ => RegistryAuth::Anonymous,
    }
}

/// Maps a transport failure onto the fault taxonomy by message shape:
/// credential problems and media-type problems get their own classes.
fn registry_error(reference: &Reference, err: impl std::fmt::Display) -> LensError {
    let registry = reference.registry().to_string();
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("401")
        || lowered.contains("unauthorized")
        || lowered.contains("authentication")
    {
        LensError::RegistryAuth { registry, message }
    } else if lowered.contains("media type") {
        LensError::UnsupportedMediaType(message)
    } else {
        LensError::Registry { registry, message }
    }
}

/// Re-targets a reference at a digest picked out of a manifest list.
fn pinned_reference(reference: &Reference, digest: &str) -> Result<Reference> {
    let pinned = format!(
        "{}/{}@{}",
        reference.registry(),
        reference.repository(),
        digest
    );
    pinned.parse::<Reference>().map_err(|e| {
        LensError::DataInconsistency(format!(
            "manifest list names digest {:?} which does not form a valid reference: {}",
            digest, e
        ))
    })
}

fn history_from_config(config: &ImageConfiguration) -> Vec<HistoryEntry> {
    config
        .history()
        .as_ref()
        .map(|entries| {
            entries
                .iter()
                .map(|h| HistoryEntry {
                    created_by: h.created_by().clone().unwrap_or_default(),
                    empty_layer: h.empty_layer().unwrap_or(false),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Blocking registry client scoped to one command invocation.
pub struct RegistryClient {
    client: Client,
    auth: RegistryAuth,
    runtime: Runtime,
}

impl RegistryClient {
    /// `plain_http` switches every request to HTTP, for localhost
    /// registries. Credentials come from the environment, anonymous
    /// otherwise.
    pub fn new(plain_http: bool) -> Result<Self> {
        let protocol = if plain_http {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        let runtime = Runtime::new()?;
        Ok(Self {
            client,
            auth: auth_from_env(),
            runtime,
        })
    }

    /// Fetches and platform-resolves the manifest, then the config blob,
    /// and returns the image's layer list and history.
    pub fn resolve_image(&self, image: &str, platform: &PlatformFilter) -> Result<ResolvedImage> {
        let reference = parse_reference(image)?;
        info!("resolving {}", reference);

        let (manifest, manifest_digest) = self
            .runtime
            .block_on(self.pull_platform_manifest(&reference, platform))?;
        let history = self
            .runtime
            .block_on(self.pull_config_history(&reference, &manifest))?;

        let layers = manifest
            .layers
            .iter()
            .map(|l| ManifestLayer {
                digest: l.digest.clone(),
                compressed_size: l.size,
            })
            .collect();

        debug!(
            "{} resolved to {} ({} layers, {} history entries)",
            reference,
            manifest_digest,
            manifest.layers.len(),
            history.len()
        );
        Ok(ResolvedImage {
            reference,
            manifest_digest,
            media_type: manifest.media_type.clone(),
            layers,
            history,
            descriptors: manifest.layers,
        })
    }

    /// Downloads one blob of the image into memory.
    pub fn fetch_blob(&self, reference: &Reference, descriptor: &OciDescriptor) -> Result<Vec<u8>> {
        self.runtime.block_on(async {
            let mut out: Vec<u8> = Vec::new();
            self.client
                .pull_blob(reference, descriptor, &mut out)
                .await
                .map_err(|e| registry_error(reference, e))?;
            debug!("downloaded {} ({} bytes)", descriptor.digest, out.len());
            Ok(out)
        })
    }

    /// Existence probe that opens the blob and drops the connection
    /// without reading the body.
    pub fn blob_exists(&self, reference: &Reference, descriptor: &OciDescriptor) -> Result<bool> {
        self.runtime.block_on(async {
            match self.client.pull_blob_stream(reference, descriptor).await {
                Ok(_) => Ok(true),
                Err(err) => {
                    let message = err.to_string();
                    let lowered = message.to_lowercase();
                    if lowered.contains("404") || lowered.contains("not found") {
                        Ok(false)
                    } else {
                        Err(registry_error(reference, message))
                    }
                }
            }
        })
    }

    async fn pull_platform_manifest(
        &self,
        reference: &Reference,
        platform: &PlatformFilter,
    ) -> Result<(OciImageManifest, String)> {
        let (manifest, digest) = self
            .client
            .pull_manifest(reference, &self.auth)
            .await
            .map_err(|e| registry_error(reference, e))?;

        match manifest {
            OciManifest::Image(image) => Ok((image, digest)),
            OciManifest::ImageIndex(index) => {
                debug!(
                    "{} is a manifest list with {} entries",
                    reference,
                    index.manifests.len()
                );
                let entry = platform.select(&index.manifests)?;
                let pinned = pinned_reference(reference, &entry.digest)?;
                let (resolved, resolved_digest) = self
                    .client
                    .pull_manifest(&pinned, &self.auth)
                    .await
                    .map_err(|e| registry_error(&pinned, e))?;
                match resolved {
                    OciManifest::Image(image) => Ok((image, resolved_digest)),
                    OciManifest::ImageIndex(_) => Err(LensError::UnsupportedMediaType(format!(
                        "{} resolved to a nested manifest list",
                        reference
                    ))),
                }
            }
        }
    }

    async fn pull_config_history(
        &self,
        reference: &Reference,
        manifest: &OciImageManifest,
    ) -> Result<Vec<HistoryEntry>> {
        if manifest.config.digest.is_empty() {
            return Err(LensError::DataInconsistency(
                "manifest carries no config digest".to_string(),
            ));
        }
        let mut raw: Vec<u8> = Vec::new();
        self.client
            .pull_blob(reference, &manifest.config, &mut raw)
            .await
            .map_err(|e| registry_error(reference, e))?;
        let config: ImageConfiguration = serde_json::from_slice(&raw).map_err(|e| {
            LensError::DataInconsistency(format!("image config does not parse: {}", e))
        })?;
        Ok(history_from_config(&config))
    }
}

/// Serves the layer blobs of one resolved image.
pub struct RegistryBlobSource<'a> {
    client: &'a RegistryClient,
    image: &'a ResolvedImage,
}

impl<'a> RegistryBlobSource<'a> {
    pub fn new(client: &'a RegistryClient, image: &'a ResolvedImage) -> Self {
        Self { client, image }
    }
}

impl BlobSource for RegistryBlobSource<'_> {
    fn fetch_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let descriptor = self.image.descriptor(digest).ok_or_else(|| {
            LensError::DataInconsistency(format!(
                "blob {} is not part of {}",
                digest, self.image.reference
            ))
        })?;
        info!("downloading layer {}", digest);
        self.client.fetch_blob(&self.image.reference, descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_parse_with_docker_normalization() {
        let reference = parse_reference("alpine:3.20").unwrap();
        assert_eq!(reference.repository(), "library/alpine");
        assert_eq!(reference.tag(), Some("3.20"));
    }

    #[test]
    fn garbage_references_are_input_faults() {
        let err = parse_reference("not??a//reference").unwrap_err();
        assert!(matches!(err, LensError::InvalidInput(_)));
    }

    #[test]
    fn unauthorized_errors_become_auth_faults() {
        let reference = parse_reference("ghcr.io/acme/app:1").unwrap();
        let err = registry_error(&reference, "server returned 401 Unauthorized");
        assert!(matches!(err, LensError::RegistryAuth { .. }));
        assert!(err.to_string().contains("REGISTRY_USERNAME"));
    }

    #[test]
    fn media_type_errors_get_their_own_class() {
        let reference = parse_reference("ghcr.io/acme/app:1").unwrap();
        let err = registry_error(&reference, "unsupported media type foo/bar");
        assert!(matches!(err, LensError::UnsupportedMediaType(_)));
    }

    #[test]
    fn other_errors_stay_registry_faults() {
        let reference = parse_reference("ghcr.io/acme/app:1").unwrap();
        let err = registry_error(&reference, "connection reset by peer");
        assert!(matches!(err, LensError::Registry { .. }));
    }

    #[test]
    fn history_reads_created_by_and_empty_layer() {
        let config: ImageConfiguration = serde_json::from_value(serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": [] },
            "history": [
                { "created_by": "ADD rootfs.tar /", "empty_layer": false },
                { "created_by": "CMD [\"sh\"]", "empty_layer": true },
                { "created_by": "RUN apk add curl" }
            ]
        }))
        .unwrap();

        let history = history_from_config(&config);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].created_by, "ADD rootfs.tar /");
        assert!(!history[0].empty_layer);
        assert!(history[1].empty_layer);
        // empty_layer defaults to false when absent
        assert!(!history[2].empty_layer);
    }

    #[test]
    fn config_without_history_resolves_to_no_entries() {
        let config: ImageConfiguration = serde_json::from_value(serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": [] }
        }))
        .unwrap();
        assert!(history_from_config(&config).is_empty());
    }

    #[test]
    fn descriptor_lookup_ignores_digest_case() {
        let descriptors: Vec<OciDescriptor> = serde_json::from_value(serde_json::json!([{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": "sha256:ABCDEF0000000000000000000000000000000000000000000000000000000000",
            "size": 128
        }]))
        .unwrap();
        let image = ResolvedImage {
            reference: parse_reference("ghcr.io/acme/app:1").unwrap(),
            manifest_digest: "sha256:feed".to_string(),
            media_type: None,
            layers: Vec::new(),
            history: Vec::new(),
            descriptors,
        };

        assert!(image
            .descriptor("sha256:abcdef0000000000000000000000000000000000000000000000000000000000")
            .is_some());
        assert!(image.descriptor("sha256:0000").is_none());
        assert!(image.descriptor_at(0).is_some());
        assert!(image.descriptor_at(1).is_none());
    }

    #[test]
    fn pinned_reference_keeps_registry_and_repository() {
        let reference = parse_reference("ghcr.io/acme/app:1").unwrap();
        let pinned = pinned_reference(
            &reference,
            "sha256:1111111111111111111111111111111111111111111111111111111111111111",
        )
        .unwrap();
        assert_eq!(pinned.registry(), "ghcr.io");
        assert_eq!(pinned.repository(), "acme/app");
        assert!(pinned.digest().is_some());
    }
}
