pub mod convert;
pub mod currencies;
pub mod setup;
pub mod ui;

use crate::core::config::AppConfig;
use crate::core::{ConverterOptions, CurrencyConverter, Rate};
use anyhow::Result;
use std::path::PathBuf;

/// Files given with `-f` replace the configured sources.
pub fn source_paths(files: &[PathBuf], config: &AppConfig) -> Result<Vec<PathBuf>> {
    if files.is_empty() {
        config.source_paths()
    } else {
        Ok(files.to_vec())
    }
}

/// Loads and merges `paths` in order, showing progress when there are several.
pub fn load_converter<R: Rate>(
    paths: &[PathBuf],
    options: ConverterOptions,
) -> Result<CurrencyConverter<R>> {
    let mut builder = CurrencyConverter::<R>::table_builder(&options);

    let pb = (paths.len() > 1).then(|| ui::new_progress_bar(paths.len() as u64));
    for path in paths {
        if let Some(pb) = &pb {
            pb.set_message(path.display().to_string());
        }
        builder.add_path(path)?;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(CurrencyConverter::from_builder(builder, options)?)
}
