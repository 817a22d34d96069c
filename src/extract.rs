//! Layer extraction and application.
//!
//! Extraction turns a compressed layer blob into a plain directory tree in
//! the cache, keyed by digest. Whiteout markers are preserved as ordinary
//! files at this stage; they are interpreted only when a layer is *applied*
//! onto a destination (squashing). That keeps the cached tree a faithful
//! copy of the archive, which the separate (no-squash) export relies on.

use crate::cache::{digest_hex, LayerCache};
use crate::error::{LensError, Result};
use crate::history::ManifestLayer;
use crate::whiteout::{classify, WhiteoutKind};
use flate2::read::GzDecoder;
use log::{debug, warn};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;
use walkdir::WalkDir;

/// Supplies compressed layer blobs by digest.
///
/// The registry client implements this for real images; tests feed blobs
/// from memory.
pub trait BlobSource {
    fn fetch_blob(&self, digest: &str) -> Result<Vec<u8>>;
}

/// Downloads, caches and applies image layers.
pub struct ExtractionEngine {
    cache: LayerCache,
}

impl ExtractionEngine {
    pub fn new(cache: LayerCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Returns the extracted tree for a layer, fetching and unpacking the
    /// blob only when the cache has no entry for its digest yet.
    ///
    /// A present cache directory is trusted as-is. Unpacking goes into a
    /// temporary sibling directory that is renamed into place, so a
    /// concurrent extraction of the same digest can never observe a
    /// half-written tree; losing the rename race counts as a cache hit.
    pub fn ensure_extracted(&self, digest: &str, source: &dyn BlobSource) -> Result<PathBuf> {
        let layer_dir = self.cache.layer_dir(digest)?;
        if layer_dir.exists() {
            debug!("layer {} already extracted, reusing cache", digest);
            return Ok(layer_dir);
        }

        let layers_dir = self.cache.layers_dir();
        fs::create_dir_all(&layers_dir).map_err(|e| LensError::filesystem(&layers_dir, e))?;

        debug!("extracting layer {}", digest);
        let blob = source.fetch_blob(digest)?;
        let staging = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(&layers_dir)
            .map_err(|e| LensError::filesystem(&layers_dir, e))?;
        unpack_layer(&blob, staging.path())?;

        let staged = staging.keep();
        match fs::rename(&staged, &layer_dir) {
            Ok(()) => Ok(layer_dir),
            Err(_) if layer_dir.exists() => {
                // another extraction won the rename race
                let _ = fs::remove_dir_all(&staged);
                Ok(layer_dir)
            }
            Err(err) => {
                let _ = fs::remove_dir_all(&staged);
                Err(LensError::filesystem(&layer_dir, err))
            }
        }
    }

    /// Applies one extracted layer onto `dest`, interpreting whiteouts.
    ///
    /// All markers are processed before any content is copied, so
    /// enumeration order within the layer cannot delete files the same
    /// layer just added.
    pub fn apply_layer(&self, layer_dir: &Path, dest: &Path) -> Result<()> {
        apply_markers(layer_dir, dest)?;
        apply_content(layer_dir, dest)
    }

    /// Squashes the selected layers onto `dest`, strictly in ascending
    /// order. `cap` limits the range to `0..=cap`.
    pub fn squash(
        &self,
        source: &dyn BlobSource,
        layers: &[ManifestLayer],
        cap: Option<usize>,
        dest: &Path,
    ) -> Result<()> {
        let selected = select_layers(layers, cap)?;
        fs::create_dir_all(dest).map_err(|e| LensError::filesystem(dest, e))?;
        for (index, layer) in selected.iter().enumerate() {
            debug!("applying layer {} ({})", index, layer.digest);
            let layer_dir = self.ensure_extracted(&layer.digest, source)?;
            self.apply_layer(&layer_dir, dest)?;
        }
        Ok(())
    }

    /// Copies each selected layer's tree verbatim into
    /// `layer<i>-<digest-hex>/` under `dest`. No whiteout interpretation:
    /// markers stay as plain files.
    pub fn extract_separate(
        &self,
        source: &dyn BlobSource,
        layers: &[ManifestLayer],
        cap: Option<usize>,
        dest: &Path,
    ) -> Result<()> {
        let selected = select_layers(layers, cap)?;
        fs::create_dir_all(dest).map_err(|e| LensError::filesystem(dest, e))?;
        for (index, layer) in selected.iter().enumerate() {
            let layer_dir = self.ensure_extracted(&layer.digest, source)?;
            let out = dest.join(format!("layer{}-{}", index, digest_hex(&layer.digest)?));
            copy_tree(&layer_dir, &out)?;
        }
        Ok(())
    }
}

/// Restricts `layers` to `0..=cap`; `None` selects everything.
pub fn select_layers(layers: &[ManifestLayer], cap: Option<usize>) -> Result<&[ManifestLayer]> {
    match cap {
        None => Ok(layers),
        Some(index) if index < layers.len() => Ok(&layers[..=index]),
        Some(index) => Err(LensError::InvalidInput(format!(
            "layer index {} is out of range 0..{}",
            index,
            layers.len()
        ))),
    }
}

const INVALID_COMPONENT_CHARS: &[char] = &['<', '>', ':', '"', '\\', '|', '?', '*'];

fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if INVALID_COMPONENT_CHARS.contains(&c) || (c as u32) < 0x20 {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Normalizes an archive path for extraction: no escaping the layer root,
/// no absolute prefixes, and every component stripped of characters the
/// host filesystem may reject.
fn sanitize_layer_path(raw: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in raw.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) => {}
            Component::Normal(c) => out.push(sanitize_component(&c.to_string_lossy())),
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn unpack_layer(blob: &[u8], dest: &Path) -> Result<()> {
    let reader: Box<dyn Read + '_> = if blob.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(blob))
    } else {
        Box::new(blob)
    };
    let mut archive = tar::Archive::new(reader);

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();
        let raw_path = entry.path()?.into_owned();
        let Some(rel_path) = sanitize_layer_path(&raw_path) else {
            continue;
        };
        let dest_path = dest.join(&rel_path);

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest_path)
                    .map_err(|e| LensError::filesystem(&dest_path, e))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mode = entry.header().mode().unwrap_or(0o755);
                    // owner must keep rwx so later layers can write into it
                    let _ = fs::set_permissions(
                        &dest_path,
                        fs::Permissions::from_mode(mode | 0o700),
                    );
                }
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                match entry.link_name()? {
                    Some(link_name) => {
                        // the raw link-name string is the symlink target,
                        // never resolved against either tree
                        if let Some(parent) = dest_path.parent() {
                            fs::create_dir_all(parent)
                                .map_err(|e| LensError::filesystem(parent, e))?;
                        }
                        materialize_symlink(link_name.as_os_str(), &dest_path)?;
                    }
                    None => write_file(&mut entry, &dest_path)?,
                }
            }
            _ => write_file(&mut entry, &dest_path)?,
        }
    }
    Ok(())
}

fn write_file<R: Read>(entry: &mut tar::Entry<'_, R>, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| LensError::filesystem(parent, e))?;
    }
    remove_existing(dest);

    let mut out = File::create(dest).map_err(|e| LensError::filesystem(dest, e))?;
    std::io::copy(entry, &mut out).map_err(|e| LensError::filesystem(dest, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(mode) = entry.header().mode() {
            // keep the file readable by the owner whatever the archive says
            let _ = fs::set_permissions(dest, fs::Permissions::from_mode(mode | 0o400));
        }
    }
    Ok(())
}

fn materialize_symlink(target: &OsStr, dest: &Path) -> Result<()> {
    remove_existing(dest);
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, dest).map_err(|e| LensError::symlink(dest, e))?;
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, dest)
            .map_err(|e| LensError::symlink(dest, e))?;
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = target;
        warn!("symlinks unsupported on this platform, skipping {}", dest.display());
    }
    Ok(())
}

/// Lenient pre-overwrite cleanup; write errors surface on the write itself.
fn remove_existing(path: &Path) {
    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.is_dir() && !meta.file_type().is_symlink() {
            let _ = fs::remove_dir_all(path);
        } else {
            let _ = fs::remove_file(path);
        }
    }
}

/// Strict deletion used for whiteouts; a marker whose victim cannot be
/// removed would silently corrupt the squash result.
fn remove_any(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) => {
            let removed = if meta.is_dir() && !meta.file_type().is_symlink() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            removed.map_err(|e| LensError::filesystem(path, e))
        }
        Err(_) => Ok(()),
    }
}

fn apply_markers(layer_dir: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(layer_dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| LensError::filesystem(layer_dir, e))?;
        let ft = entry.file_type();
        if !(ft.is_file() || ft.is_symlink()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(layer_dir)
            .map_err(|e| LensError::filesystem(entry.path(), e))?;
        let Some(name) = rel.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match classify(name) {
            WhiteoutKind::Content => {}
            WhiteoutKind::Opaque => {
                let parent = rel.parent().unwrap_or_else(|| Path::new(""));
                if parent.as_os_str().is_empty() {
                    return Err(LensError::DataInconsistency(
                        "opaque whiteout marker at the layer root".to_string(),
                    ));
                }
                let doomed = dest.join(parent);
                if doomed.exists() {
                    debug!("opaque marker clears {}", doomed.display());
                    fs::remove_dir_all(&doomed).map_err(|e| LensError::filesystem(&doomed, e))?;
                }
            }
            WhiteoutKind::Whiteout(victim) => {
                if victim.is_empty() {
                    // ".wh." with no name would resolve to the parent itself
                    warn!("ignoring nameless whiteout marker {}", rel.display());
                    continue;
                }
                let parent = rel.parent().unwrap_or_else(|| Path::new(""));
                let doomed = dest.join(parent).join(&victim);
                debug!("whiteout marker deletes {}", doomed.display());
                remove_any(&doomed)?;
            }
        }
    }
    Ok(())
}

fn apply_content(layer_dir: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(layer_dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| LensError::filesystem(layer_dir, e))?;
        let rel = entry
            .path()
            .strip_prefix(layer_dir)
            .map_err(|e| LensError::filesystem(entry.path(), e))?;
        let ft = entry.file_type();

        if ft.is_dir() {
            let dir = dest.join(rel);
            fs::create_dir_all(&dir).map_err(|e| LensError::filesystem(&dir, e))?;
            continue;
        }

        let Some(name) = rel.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !matches!(classify(name), WhiteoutKind::Content) {
            continue;
        }

        let dest_path = dest.join(rel);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LensError::filesystem(parent, e))?;
        }
        if ft.is_symlink() {
            let target = fs::read_link(entry.path())
                .map_err(|e| LensError::filesystem(entry.path(), e))?;
            materialize_symlink(target.as_os_str(), &dest_path)?;
        } else if ft.is_file() {
            remove_existing(&dest_path);
            fs::copy(entry.path(), &dest_path)
                .map_err(|e| LensError::filesystem(&dest_path, e))?;
        }
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| LensError::filesystem(to, e))?;
    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| LensError::filesystem(from, e))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| LensError::filesystem(entry.path(), e))?;
        let dest_path = to.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| LensError::filesystem(&dest_path, e))?;
        } else if ft.is_symlink() {
            let target = fs::read_link(entry.path())
                .map_err(|e| LensError::filesystem(entry.path(), e))?;
            materialize_symlink(target.as_os_str(), &dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| LensError::filesystem(parent, e))?;
            }
            fs::copy(entry.path(), &dest_path)
                .map_err(|e| LensError::filesystem(&dest_path, e))?;
        }
    }
    Ok(())
}
