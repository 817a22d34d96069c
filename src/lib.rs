pub mod cache;
pub mod cli;
pub mod commands;
pub mod compare;
pub mod error;
pub mod extract;
pub mod history;
pub mod notifier;
pub mod platform;
pub mod registry;
pub mod render;
pub mod settings;
pub mod whiteout;

// Re-exports for easy access
pub use cache::LayerCache;
pub use compare::{compare_layers, CompareResult, CompareSummary, LayerComparison, LayerDiff};
pub use error::{LensError, Result};
pub use extract::{BlobSource, ExtractionEngine};
pub use history::{resolve_layer_history, HistoryEntry, LayerInfo, ManifestLayer, ResolveOptions};
pub use notifier::Notifier;
pub use platform::PlatformFilter;
pub use registry::{RegistryBlobSource, RegistryClient, ResolvedImage};
pub use render::OutputFormat;
pub use settings::Settings;
