use super::{currencies, ui};
use crate::core::config::AppConfig;
use crate::core::table::parse_date;
use crate::core::{ConverterError, Currency, CurrencyConverter, Rate};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Clone, Args)]
pub struct ConvertArgs {
    /// Amount to convert
    pub amount: String,

    /// Currency of the amount
    pub currency: String,

    /// Target currency, defaults to the reference currency
    #[arg(short, long)]
    pub to: Option<String>,

    /// Date of the rates (YYYY-MM-DD), defaults to the last date CURRENCY has rates for
    #[arg(short, long, value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,

    /// Use exact decimal arithmetic
    #[arg(long)]
    pub decimal: bool,

    /// Rate file to read instead of the configured sources, may be repeated
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("invalid date {s:?}, expected YYYY-MM-DD"))
}

/// Converts with both fallbacks enabled so any date and gap yields a result.
pub fn run<R: Rate>(args: &ConvertArgs, config: &AppConfig, verbosity: u8) -> Result<()> {
    let mut options = config
        .converter
        .clone()
        .with_fallbacks(config.converter.fallback_on_missing_rate_method);
    options.verbose = options.verbose || verbosity > 1;

    let paths = super::source_paths(&args.files, config)?;
    let converter = super::load_converter::<R>(&paths, options)?;

    let line = convert_line(&converter, args, verbosity)?;
    println!("{line}");
    Ok(())
}

fn convert_line<R: Rate>(
    converter: &CurrencyConverter<R>,
    args: &ConvertArgs,
    verbosity: u8,
) -> Result<String> {
    let snapshot = converter.snapshot();
    let available: Vec<Currency> = snapshot.currencies().into_iter().collect();

    if verbosity > 0 {
        println!("{} available currencies:", available.len());
        ui::print_grouped(&available, 10);
        println!();
        for (currency, bounds) in currencies::sorted_bounds(&snapshot) {
            println!(
                "{currency}: from {} to {} ({} days)",
                bounds.first_date,
                bounds.last_date,
                bounds.days()
            );
        }
        println!();
    }

    if !snapshot.contains(&args.currency) {
        let warning = format!("/!\\ {:?} is not in available currencies:", args.currency);
        println!("{}", ui::style_text(&warning, ui::StyleType::Error));
        ui::print_grouped(&available, 10);
        return Err(ConverterError::UnknownCurrency(args.currency.clone()).into());
    }

    let to = args
        .to
        .clone()
        .unwrap_or_else(|| converter.base_currency().to_string());
    let date = match args.date {
        Some(date) => date,
        None => snapshot.bounds(&args.currency)?.last_date,
    };
    let amount = R::parse_number(&args.amount)
        .with_context(|| format!("Invalid amount: {:?}", args.amount))?;

    let conversion = converter.convert_detailed(amount, &args.currency, &to, date)?;

    let mut lines: Vec<String> = Vec::new();
    if converter.options().verbose {
        lines.extend(
            conversion
                .notices
                .iter()
                .map(|notice| ui::style_text(&notice.to_string(), ui::StyleType::Subtle)),
        );
    }
    lines.push(format!(
        "{} {} = {} {} on {}",
        ui::format_amount(amount),
        args.currency,
        ui::style_text(&ui::format_amount(conversion.amount), ui::StyleType::Result),
        to,
        date
    ));
    Ok(lines.join("\n"))
}
