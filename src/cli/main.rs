use argument::Cli;
use clap::Parser;
#[cfg(feature = "log")]
use geopatch::initialize_logging;
use geopatch::{patch_database, Config};

mod argument;

fn main() {
    if let Err(e) = run_application() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_application() -> anyhow::Result<()> {
    let options = Cli::parse();

    #[cfg(feature = "log")]
    {
        let log_level = match options.log_level.as_str() {
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Off,
        };
        initialize_logging(log_level)?;
    }

    let config = Config {
        input_database: options.input,
        output_database: options.output,
        lookup_store: options.lookup_store,
        block_list: options.block_list,
    };
    let report = patch_database(&config)?;

    #[cfg(feature = "log")]
    log::info!(
        "Patched {} of {} networks ({} skipped), wrote {}",
        report.merged,
        report.rows,
        report.skipped.len(),
        config.output_database.display()
    );
    #[cfg(not(feature = "log"))]
    let _ = report;
    Ok(())
}
