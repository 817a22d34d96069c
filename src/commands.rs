//! Command implementations tying the registry client, history resolver,
//! comparator and extraction engine together.

use crate::cache::LayerCache;
use crate::cli::{
    Cli, Command, CompareCommand, CompareFilesArgs, CompareLayersArgs, ConfigCommand,
    SaveLayersArgs,
};
use crate::compare;
use crate::error::{LensError, Result};
use crate::extract::{select_layers, ExtractionEngine};
use crate::history::{resolve_layer_history, ResolveOptions};
use crate::notifier::Notifier;
use crate::platform::PlatformFilter;
use crate::registry::{RegistryBlobSource, RegistryClient, ResolvedImage};
use crate::render;
use crate::settings::Settings;
use console::Emoji;
use indicatif::HumanDuration;
use log::debug;
use std::time::Instant;

static SPARK: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn run(cli: Cli) -> Result<()> {
    let notifier = Notifier::new(cli.verbose);
    match cli.command {
        Command::Compare(CompareCommand::Layers(args)) => compare_layers(&args, &notifier),
        Command::Compare(CompareCommand::Files(args)) => compare_files(&args, &notifier),
        Command::SaveLayers(args) => save_layers(&args, &notifier),
        Command::Config(ConfigCommand::Get { key }) => config_get(&key),
        Command::Config(ConfigCommand::Set { key, value }) => config_set(&key, &value),
    }
}

fn compare_layers(args: &CompareLayersArgs, notifier: &Notifier) -> Result<()> {
    if args.no_color {
        console::set_colors_enabled(false);
    }
    let settings = Settings::load()?;
    let platform = PlatformFilter::resolve(
        args.os.clone(),
        args.os_version.clone(),
        args.arch.clone(),
        &settings,
    );

    let (base, target) = {
        let client = RegistryClient::new(args.plain_http)?;
        notifier.phase(&format!("Resolving {}", args.base));
        let base = client.resolve_image(&args.base, &platform)?;
        notifier.phase(&format!("Resolving {}", args.target));
        let target = client.resolve_image(&args.target, &platform)?;
        (base, target)
    };

    let options = ResolveOptions {
        include_empty_layers: args.history,
        include_history: args.history,
        include_compressed_size: args.compressed_size,
    };
    let base_rows = resolve_layer_history(&base.history, &base.layers, options)?;
    let target_rows = resolve_layer_history(&target.history, &target.layers, options)?;

    let result = compare::compare_layers(&base_rows, &target_rows);
    let rendered = render::render(&result, args.output)?;
    notifier.finish();
    print!("{}", rendered);
    Ok(())
}

fn save_layers(args: &SaveLayersArgs, notifier: &Notifier) -> Result<()> {
    let started = Instant::now();
    let settings = Settings::load()?;
    let platform = PlatformFilter::resolve(
        args.os.clone(),
        args.os_version.clone(),
        args.arch.clone(),
        &settings,
    );

    let client = RegistryClient::new(args.plain_http)?;
    notifier.phase(&format!("Resolving {}", args.image));
    let image = client.resolve_image(&args.image, &platform)?;

    if let Some(index) = args.layer_index {
        check_layer_present(&client, &image, index, notifier)?;
    }
    let count = select_layers(&image.layers, args.layer_index)?.len();

    let engine = ExtractionEngine::new(LayerCache::new(LayerCache::default_root()));
    let source = RegistryBlobSource::new(&client, &image);
    if args.no_squash {
        notifier.phase(&format!("Extracting {} layers separately", count));
        engine.extract_separate(&source, &image.layers, args.layer_index, &args.output)?;
    } else {
        notifier.phase(&format!("Squashing {} layers", count));
        engine.squash(&source, &image.layers, args.layer_index, &args.output)?;
    }

    notifier.finish();
    println!(
        "{}Wrote {} layers of {} to {} in {}",
        SPARK,
        count,
        args.image,
        args.output.display(),
        HumanDuration(started.elapsed())
    );
    Ok(())
}

fn compare_files(args: &CompareFilesArgs, notifier: &Notifier) -> Result<()> {
    let settings = Settings::load()?;
    let platform = PlatformFilter::resolve(
        args.os.clone(),
        args.os_version.clone(),
        args.arch.clone(),
        &settings,
    );

    let engine = ExtractionEngine::new(LayerCache::new(LayerCache::default_root()));
    let (base_dir, target_dir) = engine.cache().compare_scratch()?;

    {
        let client = RegistryClient::new(args.plain_http)?;
        notifier.phase(&format!("Resolving {}", args.base));
        let base = client.resolve_image(&args.base, &platform)?;
        notifier.phase(&format!("Resolving {}", args.target));
        let target = client.resolve_image(&args.target, &platform)?;

        notifier.phase(&format!("Squashing {}", args.base));
        let base_source = RegistryBlobSource::new(&client, &base);
        engine.squash(&base_source, &base.layers, args.base_layer_index, &base_dir)?;

        notifier.phase(&format!("Squashing {}", args.target));
        let target_source = RegistryBlobSource::new(&client, &target);
        engine.squash(
            &target_source,
            &target.layers,
            args.target_layer_index,
            &target_dir,
        )?;
    }

    notifier.finish();
    match settings.diff_tool.as_deref() {
        Some(tool) => {
            debug!("launching {} on the squashed trees", tool);
            let status = std::process::Command::new(tool)
                .arg(&base_dir)
                .arg(&target_dir)
                .status()
                .map_err(|e| {
                    LensError::InvalidInput(format!("cannot launch diff tool {:?}: {}", tool, e))
                })?;
            debug!("diff tool exited with {}", status);
        }
        None => {
            println!("base:   {}", base_dir.display());
            println!("target: {}", target_dir.display());
            println!("hint: `layerlens config set diff-tool <tool>` opens a diff automatically");
        }
    }
    Ok(())
}

/// Preflight for `--layer-index`: the capped layer must exist in the
/// manifest and its blob must be present in the registry.
fn check_layer_present(
    client: &RegistryClient,
    image: &ResolvedImage,
    index: usize,
    notifier: &Notifier,
) -> Result<()> {
    let descriptor = image.descriptor_at(index).ok_or_else(|| {
        LensError::InvalidInput(format!(
            "layer index {} is out of range 0..{}",
            index,
            image.layers.len()
        ))
    })?;
    notifier.phase(&format!("Checking layer {} is present", index));
    if !client.blob_exists(&image.reference, descriptor)? {
        return Err(LensError::Registry {
            registry: image.reference.registry().to_string(),
            message: format!("layer blob {} is missing", descriptor.digest),
        });
    }
    Ok(())
}

fn config_get(key: &str) -> Result<()> {
    let settings = Settings::load()?;
    if let Some(value) = settings.get(key)? {
        println!("{}", value);
    }
    Ok(())
}

fn config_set(key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load()?;
    settings.set(key, value)?;
    settings.save()?;
    Ok(())
}
