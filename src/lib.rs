pub mod blocks;
pub mod error;
pub mod geolookup;
pub mod mmdb;
pub mod patcher;
pub mod progress;

pub use blocks::NetworkBlock;
pub use error::PatchError;
pub use geolookup::{models::GeoIdentity, GeoResolver, MemoryResolver, SqliteResolver};
pub use mmdb::{DataValue, PrefixTree};
pub use patcher::{patch_database, Config, PatchReport, Patcher, RowOutcome, SkipReason};

/// Initializes the logging system for the application.
///
/// This function configures the logging system with the specified verbosity level.
///
/// # Arguments
///
/// * `log_level`: The desired verbosity level for logging. Determines which log messages will be displayed.
///
/// # Returns
///
/// A result indicating the success or failure of the logging setup.
#[cfg(feature = "log")]
pub fn initialize_logging(log_level: log::LevelFilter) -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .show_module_names(true)
        .verbosity(log_level)
        .init()?;
    Ok(())
}
