use std::path::PathBuf;

/// Files taking part in a patch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source MaxMind database.
    pub input_database: PathBuf,
    /// Where the patched database is written.
    pub output_database: PathBuf,
    /// SQLite database with the `countries` table.
    pub lookup_store: PathBuf,
    /// CSV list of networks and their geoname identifiers.
    pub block_list: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_database: PathBuf::from("GeoLite2-City.mmdb"),
            output_database: PathBuf::from("GeoLite2-City_patched.mmdb"),
            lookup_store: PathBuf::from("country.db"),
            block_list: PathBuf::from("GeoLite2-Country-Blocks-IPv4.csv"),
        }
    }
}
