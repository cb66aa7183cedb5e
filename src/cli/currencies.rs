use super::ui;
use crate::core::config::AppConfig;
use crate::core::{Bounds, Currency, Rate, RateSnapshot};
use anyhow::Result;
use clap::Args;
use comfy_table::Table;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Args)]
pub struct CurrenciesArgs {
    /// Rate file to read instead of the configured sources, may be repeated
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &CurrenciesArgs, config: &AppConfig) -> Result<()> {
    let paths = super::source_paths(&args.files, config)?;
    let converter = super::load_converter::<f64>(&paths, config.converter.clone())?;
    let snapshot = converter.snapshot();

    println!(
        "\n{} {}",
        ui::style_text("Currencies against", ui::StyleType::Title),
        ui::style_text(converter.base_currency().as_str(), ui::StyleType::Title)
    );
    println!("{}", currency_table(&snapshot));
    Ok(())
}

/// Currencies ordered by first date, longest-lived first among equals.
pub(crate) fn sorted_bounds<R: Rate>(snapshot: &RateSnapshot<R>) -> Vec<(&Currency, Bounds)> {
    let mut entries: Vec<(&Currency, Bounds)> = snapshot
        .bounds_index()
        .iter()
        .map(|(currency, bounds)| (currency, *bounds))
        .collect();
    entries.sort_by(|(ca, a), (cb, b)| {
        a.first_date
            .cmp(&b.first_date)
            .then(b.last_date.cmp(&a.last_date))
            .then(ca.cmp(cb))
    });
    entries
}

fn currency_table<R: Rate>(snapshot: &RateSnapshot<R>) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell("From"),
        ui::header_cell("To"),
        ui::header_cell("Days"),
        ui::header_cell("Missing"),
    ]);

    for (currency, bounds) in sorted_bounds(snapshot) {
        // the base currency has no series of its own
        let missing = snapshot
            .table()
            .series(currency.as_str())
            .map(|series| series.missing_days());
        table.add_row(vec![
            comfy_table::Cell::new(currency),
            comfy_table::Cell::new(bounds.first_date),
            comfy_table::Cell::new(bounds.last_date),
            ui::number_cell(bounds.days()),
            ui::format_optional_cell(missing, |days| days.to_string()),
        ]);
    }
    table
}
