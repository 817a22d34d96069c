//! Overlayfs whiteout marker classification, shared by every consumer that
//! walks layer contents.

/// Prefix marking a deleted entry (`.wh.<name>`).
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Opaque directory marker: everything under its parent directory from lower
/// layers is hidden.
pub const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// What a layer entry's base name means for layer application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhiteoutKind {
    /// Ordinary content, copied into the destination.
    Content,
    /// `.wh.<name>` marker: the named sibling is deleted in the destination.
    Whiteout(String),
    /// `.wh..wh..opq` marker: the containing directory is cleared in the
    /// destination.
    Opaque,
}

/// Classifies a base name. The opaque marker is checked before the whiteout
/// prefix since it is itself prefixed with `.wh.`.
pub fn classify(file_name: &str) -> WhiteoutKind {
    if file_name == OPAQUE_MARKER {
        WhiteoutKind::Opaque
    } else if let Some(target) = file_name.strip_prefix(WHITEOUT_PREFIX) {
        WhiteoutKind::Whiteout(target.to_string())
    } else {
        WhiteoutKind::Content
    }
}
