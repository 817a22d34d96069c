//! Platform selection over multi-platform manifest lists.

use crate::error::{LensError, Result};
use crate::settings::Settings;
use oci_distribution::manifest::{ImageIndexEntry, Platform};

/// Criteria for resolving a manifest list to a single platform.
///
/// Unset criteria match anything. A criterion is taken from the CLI flag
/// when given, otherwise from the persisted setting of the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformFilter {
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub arch: Option<String>,
}

impl PlatformFilter {
    pub fn resolve(
        os: Option<String>,
        os_version: Option<String>,
        arch: Option<String>,
        settings: &Settings,
    ) -> Self {
        Self {
            os: os.or_else(|| settings.os.clone()),
            os_version: os_version.or_else(|| settings.os_version.clone()),
            arch: arch.or_else(|| settings.arch.clone()),
        }
    }

    fn matches(&self, entry: &ImageIndexEntry) -> bool {
        // attestation manifests and the like carry no platform block
        let Some(platform) = entry.platform.as_ref() else {
            return false;
        };
        if let Some(os) = &self.os {
            if &platform.os != os {
                return false;
            }
        }
        if let Some(version) = &self.os_version {
            if platform.os_version.as_deref() != Some(version.as_str()) {
                return false;
            }
        }
        if let Some(arch) = &self.arch {
            if &platform.architecture != arch {
                return false;
            }
        }
        true
    }

    /// Picks exactly one entry from a manifest list; zero or several
    /// matches are resolution faults naming the candidates.
    pub fn select<'a>(&self, entries: &'a [ImageIndexEntry]) -> Result<&'a ImageIndexEntry> {
        let matching: Vec<&ImageIndexEntry> = entries.iter().filter(|e| self.matches(e)).collect();
        match matching.as_slice() {
            [one] => Ok(one),
            [] => Err(LensError::PlatformResolution(format!(
                "no platform in the manifest list matches {}; available: {}",
                self.describe(),
                describe_platforms(entries.iter()),
            ))),
            several => Err(LensError::PlatformResolution(format!(
                "{} platforms match {}; narrow the choice with --os, --os-version or --arch \
                 (or persist defaults via `config set`): {}",
                several.len(),
                self.describe(),
                describe_platforms(several.iter().copied()),
            ))),
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(os) = &self.os {
            parts.push(format!("os={}", os));
        }
        if let Some(version) = &self.os_version {
            parts.push(format!("os-version={}", version));
        }
        if let Some(arch) = &self.arch {
            parts.push(format!("arch={}", arch));
        }
        if parts.is_empty() {
            "any platform".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn format_platform(platform: &Platform) -> String {
    match &platform.os_version {
        Some(version) => format!("{}/{} ({})", platform.os, platform.architecture, version),
        None => format!("{}/{}", platform.os, platform.architecture),
    }
}

fn describe_platforms<'a>(entries: impl Iterator<Item = &'a ImageIndexEntry>) -> String {
    let described: Vec<String> = entries
        .filter_map(|e| e.platform.as_ref())
        .map(format_platform)
        .collect();
    if described.is_empty() {
        "none".to_string()
    } else {
        described.join(", ")
    }
}
