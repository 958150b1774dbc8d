pub mod config;
pub mod record;

use std::net::Ipv4Addr;

pub use config::Config;
use ip_network::Ipv4Network;
pub use record::{AttributeRecord, CountryRecord, Names};
use thiserror::Error;

use crate::{
    blocks::{self, NetworkBlock},
    error::PatchError,
    geolookup::{
        models::{GeoIdentity, LookupError},
        GeoResolver, SqliteResolver,
    },
    mmdb::{DataValue, MergeTarget, PrefixTree},
    progress::ProgressDisplay,
};

/// Why a row was left out of the database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("{field} {text:?} is not a geoname id")]
    InvalidIdentifier { field: &'static str, text: String },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Result of processing one block-list row.
#[derive(Debug)]
pub enum RowOutcome {
    /// The record was merged at this network.
    Merged(Ipv4Network),
    /// The row was skipped and the run continues.
    Skipped(SkipReason),
    /// The run must stop.
    Fatal(PatchError),
}

/// A row left out of the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub network: String,
    pub reason: SkipReason,
}

/// Summary of a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// Rows processed.
    pub rows: usize,
    /// Rows merged into the database.
    pub merged: usize,
    /// Rows skipped, in input order.
    pub skipped: Vec<SkippedRow>,
}

/// Applies block-list rows to a merge target.
pub struct Patcher<'a, R: GeoResolver + ?Sized, T: MergeTarget + ?Sized> {
    resolver: &'a R,
    target: &'a mut T,
}

impl<'a, R: GeoResolver + ?Sized, T: MergeTarget + ?Sized> Patcher<'a, R, T> {
    pub fn new(resolver: &'a R, target: &'a mut T) -> Self {
        Self { resolver, target }
    }

    /// Parses, resolves, builds and merges a single row.
    pub fn process(&mut self, block: &NetworkBlock) -> RowOutcome {
        let network = match parse_network(&block.network) {
            Some(network) => network,
            None => {
                return RowOutcome::Fatal(PatchError::InvalidNetwork {
                    line: block.line,
                    text: block.network.clone(),
                })
            }
        };

        let country = match self.identify("geoname_id", &block.country_geoname_id) {
            Ok(identity) => identity,
            Err(reason) => return RowOutcome::Skipped(reason),
        };
        let registered_country = match self.identify(
            "registered_country_geoname_id",
            &block.registered_country_geoname_id,
        ) {
            Ok(identity) => identity,
            Err(reason) => return RowOutcome::Skipped(reason),
        };

        let record = AttributeRecord::build(&country, &registered_country);
        match self.target.merge_insert(network, DataValue::from(record)) {
            Ok(()) => RowOutcome::Merged(network),
            Err(source) => RowOutcome::Fatal(PatchError::Insert {
                network: network.to_string(),
                source,
            }),
        }
    }

    /// Processes `blocks` in order, calling `on_row` with the running count
    /// after each row that did not stop the run.
    ///
    /// # Returns
    ///
    /// The report, or the first fatal error.
    pub fn run(
        &mut self,
        blocks: &[NetworkBlock],
        mut on_row: impl FnMut(usize),
    ) -> Result<PatchReport, PatchError> {
        let mut report = PatchReport::default();
        for block in blocks {
            match self.process(block) {
                RowOutcome::Merged(_network) => {
                    #[cfg(feature = "log")]
                    log::trace!("Merged {} (line {})", _network, block.line);
                    report.merged += 1;
                }
                RowOutcome::Skipped(reason) => {
                    #[cfg(feature = "log")]
                    log::warn!("{}: {}", block.network, reason);
                    report.skipped.push(SkippedRow {
                        line: block.line,
                        network: block.network.clone(),
                        reason,
                    });
                }
                RowOutcome::Fatal(error) => return Err(error),
            }
            report.rows += 1;
            on_row(report.rows);
        }
        Ok(report)
    }

    fn identify(&self, field: &'static str, text: &str) -> Result<GeoIdentity, SkipReason> {
        let geoname_id = text
            .trim()
            .parse::<u32>()
            .map_err(|_| SkipReason::InvalidIdentifier {
                field,
                text: text.to_string(),
            })?;
        Ok(self.resolver.resolve(geoname_id)?)
    }
}

/// Parses `a.b.c.d/len` with host bits cleared.
fn parse_network(text: &str) -> Option<Ipv4Network> {
    let (address, netmask) = text.trim().split_once('/')?;
    let address = address.parse::<Ipv4Addr>().ok()?;
    if netmask.is_empty() || !netmask.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let netmask = netmask.parse::<u8>().ok()?;
    Ipv4Network::new_truncate(address, netmask).ok()
}

/// Runs a full patch: load, enrich every block, write.
///
/// # Arguments
///
/// * `config`: The files to read and write.
///
/// # Returns
///
/// The run report. Nothing is written when an error is returned.
pub fn patch_database(config: &Config) -> Result<PatchReport, PatchError> {
    #[cfg(feature = "log")]
    log::info!("Loading {}", config.input_database.display());
    let mut tree = PrefixTree::load(&config.input_database).map_err(PatchError::Database)?;

    #[cfg(feature = "log")]
    log::info!("Opening lookup store {}", config.lookup_store.display());
    let resolver =
        SqliteResolver::open(&config.lookup_store).map_err(|e| PatchError::LookupStore {
            path: config.lookup_store.clone(),
            message: format!("{:#}", e),
        })?;

    let blocks = match blocks::read_blocks(&config.block_list) {
        Ok(blocks) => blocks,
        Err(error) => {
            resolver.close();
            return Err(error);
        }
    };
    #[cfg(feature = "log")]
    log::info!(
        "Patching {} networks from {}",
        blocks.len(),
        config.block_list.display()
    );

    let progress = ProgressDisplay::new(blocks.len());
    let result = Patcher::new(&resolver, &mut tree).run(&blocks, |_| progress.advance());
    drop(progress);
    resolver.close();
    let report = result?;

    #[cfg(feature = "log")]
    log::info!("Writing {}", config.output_database.display());
    tree.write(&config.output_database).map_err(PatchError::Write)?;

    Ok(report)
}
