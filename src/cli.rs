//! Command-line surface.

use crate::render::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "layerlens",
    about = "Inspect and compare container image layers straight from a registry",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose mode (-v info, -vv debug, -vvv trace); quiet runs show a spinner
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two images
    #[command(subcommand)]
    Compare(CompareCommand),
    /// Download an image's layers into a directory
    SaveLayers(SaveLayersArgs),
    /// Read or write persisted defaults
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum CompareCommand {
    /// Compare layer digests and build history
    Layers(CompareLayersArgs),
    /// Squash both images and diff the resulting file trees
    Files(CompareFilesArgs),
}

#[derive(Args)]
pub struct CompareLayersArgs {
    /// Base image reference (e.g. ubuntu:24.04)
    pub base: String,
    /// Target image reference
    pub target: String,

    /// Report format
    #[arg(long, value_enum, default_value = "inline")]
    pub output: OutputFormat,

    /// Show build history and include empty layers
    #[arg(long)]
    pub history: bool,

    /// Show compressed layer sizes
    #[arg(long)]
    pub compressed_size: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Operating system to pick from a multi-platform image
    #[arg(long)]
    pub os: Option<String>,

    /// Operating system version to pick from a multi-platform image
    #[arg(long)]
    pub os_version: Option<String>,

    /// Architecture to pick from a multi-platform image
    #[arg(long)]
    pub arch: Option<String>,

    /// Talk to the registry over HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,
}

#[derive(Args)]
pub struct CompareFilesArgs {
    /// Base image reference
    pub base: String,
    /// Target image reference
    pub target: String,

    /// Stop applying base layers after this index
    #[arg(long)]
    pub base_layer_index: Option<usize>,

    /// Stop applying target layers after this index
    #[arg(long)]
    pub target_layer_index: Option<usize>,

    /// Operating system to pick from a multi-platform image
    #[arg(long)]
    pub os: Option<String>,

    /// Operating system version to pick from a multi-platform image
    #[arg(long)]
    pub os_version: Option<String>,

    /// Architecture to pick from a multi-platform image
    #[arg(long)]
    pub arch: Option<String>,

    /// Talk to the registry over HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,
}

#[derive(Args)]
pub struct SaveLayersArgs {
    /// Image reference
    pub image: String,
    /// Directory to write into
    pub output: PathBuf,

    /// Keep every layer in its own directory instead of squashing
    #[arg(long)]
    pub no_squash: bool,

    /// Only include layers up to this index
    #[arg(long)]
    pub layer_index: Option<usize>,

    /// Operating system to pick from a multi-platform image
    #[arg(long)]
    pub os: Option<String>,

    /// Operating system version to pick from a multi-platform image
    #[arg(long)]
    pub os_version: Option<String>,

    /// Architecture to pick from a multi-platform image
    #[arg(long)]
    pub arch: Option<String>,

    /// Talk to the registry over HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print one setting
    Get { key: String },
    /// Persist one setting
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_compare_layers() {
        let cli = Cli::try_parse_from([
            "layerlens",
            "compare",
            "layers",
            "alpine:3.19",
            "alpine:3.20",
            "--history",
            "--output",
            "side-by-side",
        ])
        .unwrap();
        match cli.command {
            Command::Compare(CompareCommand::Layers(args)) => {
                assert_eq!(args.base, "alpine:3.19");
                assert_eq!(args.target, "alpine:3.20");
                assert!(args.history);
                assert!(!args.compressed_size);
                assert_eq!(args.output, OutputFormat::SideBySide);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn compare_layers_defaults_to_inline() {
        let cli =
            Cli::try_parse_from(["layerlens", "compare", "layers", "a:1", "b:2"]).unwrap();
        match cli.command {
            Command::Compare(CompareCommand::Layers(args)) => {
                assert_eq!(args.output, OutputFormat::Inline);
                assert!(!args.no_color);
                assert!(!args.plain_http);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn parse_compare_files_with_caps() {
        let cli = Cli::try_parse_from([
            "layerlens",
            "compare",
            "files",
            "a:1",
            "b:2",
            "--base-layer-index",
            "2",
            "--target-layer-index",
            "4",
        ])
        .unwrap();
        match cli.command {
            Command::Compare(CompareCommand::Files(args)) => {
                assert_eq!(args.base_layer_index, Some(2));
                assert_eq!(args.target_layer_index, Some(4));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn parse_save_layers() {
        let cli = Cli::try_parse_from([
            "layerlens",
            "save-layers",
            "nginx:1.27",
            "/tmp/out",
            "--no-squash",
            "--layer-index",
            "3",
            "--arch",
            "arm64",
        ])
        .unwrap();
        match cli.command {
            Command::SaveLayers(args) => {
                assert_eq!(args.image, "nginx:1.27");
                assert_eq!(args.output, PathBuf::from("/tmp/out"));
                assert!(args.no_squash);
                assert_eq!(args.layer_index, Some(3));
                assert_eq!(args.arch.as_deref(), Some("arm64"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn parse_config_set() {
        let cli =
            Cli::try_parse_from(["layerlens", "config", "set", "diff-tool", "meld"]).unwrap();
        match cli.command {
            Command::Config(ConfigCommand::Set { key, value }) => {
                assert_eq!(key, "diff-tool");
                assert_eq!(value, "meld");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn verbose_flag_is_global_and_counted() {
        let cli =
            Cli::try_parse_from(["layerlens", "compare", "layers", "a:1", "b:2", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
