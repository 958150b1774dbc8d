use std::path::PathBuf;

use clap::builder::styling::AnsiColor;
use clap::builder::{PossibleValue, Styles};
use clap::Parser;

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Patch country data in a MaxMind database from a CSV block list.
#[derive(Parser, Debug, Clone)]
#[command(version, styles = get_styles())]
pub struct Cli {
    /// Source MaxMind database.
    #[arg(short, long, default_value = "GeoLite2-City.mmdb")]
    pub input: PathBuf,

    /// Where the patched database is written.
    #[arg(short, long, default_value = "GeoLite2-City_patched.mmdb")]
    pub output: PathBuf,

    /// SQLite database with the `countries` table.
    #[arg(long = "db", default_value = "country.db")]
    pub lookup_store: PathBuf,

    /// CSV list of networks and their geoname ids.
    #[arg(long = "csv", default_value = "GeoLite2-Country-Blocks-IPv4.csv")]
    pub block_list: PathBuf,

    /// Log level for application output.
    #[arg(
        long = "log",
        default_value = "info",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error"),
            PossibleValue::new("trace"),
            PossibleValue::new("off"),
        ])
    )]
    pub log_level: String,
}
