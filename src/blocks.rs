use std::{fs::File, io::Read, path::Path};

use crate::error::PatchError;

/// One row of the block list, still in text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBlock {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    /// CIDR text, e.g. `203.0.113.0/24`.
    pub network: String,
    /// Country geoname identifier text.
    pub country_geoname_id: String,
    /// Registered-country geoname identifier text.
    pub registered_country_geoname_id: String,
}

impl NetworkBlock {
    pub fn new(network: &str, country: &str, registered_country: &str) -> Self {
        Self {
            line: 0,
            network: network.to_string(),
            country_geoname_id: country.to_string(),
            registered_country_geoname_id: registered_country.to_string(),
        }
    }
}

/// Reads every block from the CSV file at `path`.
///
/// The header row is skipped. Only the first three columns are used, so
/// GeoLite2 block files with their extra flag columns load as they are.
pub fn read_blocks(path: &Path) -> Result<Vec<NetworkBlock>, PatchError> {
    let file = File::open(path).map_err(|e| PatchError::BlockList {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_blocks(file).map_err(|e| match e {
        PatchError::BlockList { message, .. } => PatchError::BlockList {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Parses blocks from any CSV reader.
pub fn parse_blocks<R: Read>(input: R) -> Result<Vec<NetworkBlock>, PatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut blocks = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PatchError::BlockList {
            path: Default::default(),
            message: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        match (record.get(0), record.get(1), record.get(2)) {
            (Some(network), Some(country), Some(registered)) => blocks.push(NetworkBlock {
                line,
                network: network.to_string(),
                country_geoname_id: country.to_string(),
                registered_country_geoname_id: registered.to_string(),
            }),
            _ => {
                return Err(PatchError::MalformedRow {
                    line,
                    fields: record.len(),
                })
            }
        }
    }

    #[cfg(feature = "log")]
    log::debug!("Read {} blocks", blocks.len());
    Ok(blocks)
}
