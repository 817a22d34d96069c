//! Pairing of image-config history entries with manifest layers.
//!
//! The config's history is at least as long as the manifest's layer list:
//! empty entries (`ENV`, `LABEL`, ...) produced no filesystem layer, while
//! every non-empty entry pairs 1:1, in order, with a manifest layer. The
//! resolver walks the history with a manifest cursor and produces one
//! [`LayerInfo`] row per emitted entry.

use crate::error::{LensError, Result};
use log::debug;
use serde::Serialize;

/// One entry of the manifest's ordered compressed-layer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLayer {
    /// `<algorithm>:<hex>`, e.g. `sha256:ab12...`.
    pub digest: String,
    /// Compressed blob size as reported by the manifest.
    pub compressed_size: i64,
}

/// One entry of the image config's ordered build history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub created_by: String,
    pub empty_layer: bool,
}

/// A resolved per-layer row.
///
/// `history` and `compressed_size` are filled according to
/// [`ResolveOptions`]; `digest` is present for every non-empty entry and
/// absent for empty ones, regardless of options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<i64>,
}

/// Field selection for the resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Emit rows for empty history entries too.
    pub include_empty_layers: bool,
    /// Fill [`LayerInfo::history`] with the entry's `created_by` text.
    pub include_history: bool,
    /// Fill [`LayerInfo::compressed_size`] (0 for empty entries).
    pub include_compressed_size: bool,
}

/// Resolves a single history entry against the manifest cursor.
///
/// Returns the row to emit (if any) and the next cursor position. A
/// non-empty entry always consumes one manifest layer, whether or not its
/// row is emitted; an empty entry never does.
pub fn resolve_entry(
    entry: &HistoryEntry,
    manifest_layers: &[ManifestLayer],
    cursor: usize,
    options: ResolveOptions,
) -> Result<(Option<LayerInfo>, usize)> {
    if entry.empty_layer {
        let row = options.include_empty_layers.then(|| LayerInfo {
            digest: None,
            history: options.include_history.then(|| entry.created_by.clone()),
            compressed_size: options.include_compressed_size.then_some(0),
        });
        return Ok((row, cursor));
    }

    let layer = manifest_layers.get(cursor).ok_or_else(|| {
        LensError::DataInconsistency(format!(
            "history names at least {} filesystem layers but the manifest provides only {}",
            cursor + 1,
            manifest_layers.len()
        ))
    })?;

    let row = LayerInfo {
        digest: Some(layer.digest.clone()),
        history: options.include_history.then(|| entry.created_by.clone()),
        compressed_size: options
            .include_compressed_size
            .then_some(layer.compressed_size),
    };
    Ok((Some(row), cursor + 1))
}

/// Resolves the whole history as a fold over [`resolve_entry`].
///
/// Fails when the two sequences disagree on the number of filesystem layers
/// in either direction.
pub fn resolve_layer_history(
    history: &[HistoryEntry],
    manifest_layers: &[ManifestLayer],
    options: ResolveOptions,
) -> Result<Vec<LayerInfo>> {
    let (rows, consumed) = history.iter().try_fold(
        (Vec::with_capacity(history.len()), 0usize),
        |(mut rows, cursor), entry| {
            let (row, next) = resolve_entry(entry, manifest_layers, cursor, options)?;
            rows.extend(row);
            Ok::<_, LensError>((rows, next))
        },
    )?;

    if consumed != manifest_layers.len() {
        return Err(LensError::DataInconsistency(format!(
            "manifest provides {} layers but history names only {}",
            manifest_layers.len(),
            consumed
        )));
    }

    debug!(
        "resolved {} history entries into {} rows over {} manifest layers",
        history.len(),
        rows.len(),
        manifest_layers.len()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(digest: &str, size: i64) -> ManifestLayer {
        ManifestLayer {
            digest: digest.to_string(),
            compressed_size: size,
        }
    }

    fn run(cmd: &str) -> HistoryEntry {
        HistoryEntry {
            created_by: cmd.to_string(),
            empty_layer: false,
        }
    }

    fn meta(cmd: &str) -> HistoryEntry {
        HistoryEntry {
            created_by: cmd.to_string(),
            empty_layer: true,
        }
    }

    #[test]
    fn non_empty_entries_consume_manifest_layers_in_order() {
        let history = [run("ADD rootfs.tar /"), run("RUN apk add curl")];
        let layers = [layer("sha256:aaa", 10), layer("sha256:bbb", 20)];

        let rows = resolve_layer_history(&history, &layers, ResolveOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(rows[1].digest.as_deref(), Some("sha256:bbb"));
        // no options requested, so only digests are present
        assert!(rows[0].history.is_none());
        assert!(rows[0].compressed_size.is_none());
    }

    #[test]
    fn empty_entry_leaves_cursor_in_place() {
        let layers = [layer("sha256:aaa", 10)];
        let (row, next) =
            resolve_entry(&meta("ENV A=1"), &layers, 0, ResolveOptions::default()).unwrap();
        assert!(row.is_none());
        assert_eq!(next, 0);

        let (row, next) = resolve_entry(&run("COPY . /"), &layers, 0, ResolveOptions::default())
            .unwrap();
        assert!(row.is_some());
        assert_eq!(next, 1);
    }

    #[test]
    fn empty_entries_emit_rows_only_on_request() {
        let history = [meta("ENV A=1"), run("COPY . /")];
        let layers = [layer("sha256:aaa", 10)];

        let rows = resolve_layer_history(&history, &layers, ResolveOptions::default()).unwrap();
        assert_eq!(rows.len(), 1);

        let opts = ResolveOptions {
            include_empty_layers: true,
            include_history: true,
            include_compressed_size: true,
        };
        let rows = resolve_layer_history(&history, &layers, opts).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].digest, None);
        assert_eq!(rows[0].history.as_deref(), Some("ENV A=1"));
        assert_eq!(rows[0].compressed_size, Some(0));
        assert_eq!(rows[1].digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(rows[1].compressed_size, Some(10));
    }

    #[test]
    fn more_filesystem_entries_than_manifest_layers_is_inconsistent() {
        let history = [run("a"), run("b"), run("c")];
        let layers = [layer("sha256:aaa", 1), layer("sha256:bbb", 2)];

        let err = resolve_layer_history(&history, &layers, ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, LensError::DataInconsistency(_)));
    }

    #[test]
    fn unconsumed_manifest_layers_are_inconsistent() {
        let history = [run("a")];
        let layers = [layer("sha256:aaa", 1), layer("sha256:bbb", 2)];

        let err = resolve_layer_history(&history, &layers, ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, LensError::DataInconsistency(_)));
    }
}
