// Shared fixtures for patch runs: a small City database, a lookup store
// and block lists, all under a temporary directory.

use std::path::{Path, PathBuf};

use geopatch::{
    mmdb::{Metadata, PrefixTree},
    Config, DataValue,
};
use ip_network::Ipv4Network;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use tempfile::TempDir;

pub const BLOCKS_HEADER: &str = "network,geoname_id,registered_country_geoname_id,represented_country_geoname_id,is_anonymous_proxy,is_satellite_provider";

/// A patch run's files inside a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    /// Source database, lookup store and a block list made of `rows`.
    pub fn new(rows: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = Config {
            input_database: dir.path().join("GeoLite2-City.mmdb"),
            output_database: dir.path().join("GeoLite2-City_patched.mmdb"),
            lookup_store: dir.path().join("country.db"),
            block_list: dir.path().join("blocks.csv"),
        };

        source_tree()
            .write(&config.input_database)
            .expect("Failed to write source database");
        create_lookup_store(&config.lookup_store);
        write_blocks(&config.block_list, rows);

        Self { dir, config }
    }

    /// The same files with the output written somewhere else.
    #[allow(dead_code)]
    pub fn with_output(&self, name: &str) -> Config {
        Config {
            output_database: self.dir.path().join(name),
            ..self.config.clone()
        }
    }
}

pub fn net(text: &str) -> Ipv4Network {
    let (address, netmask) = text.split_once('/').expect("not a network");
    Ipv4Network::new(address.parse().expect("bad address"), netmask.parse().expect("bad netmask"))
        .expect("bad network")
}

/// An IPv6 City database with a city record over 203.0.113.0/24 and a
/// country-only record over 198.51.100.0/22.
pub fn source_tree() -> PrefixTree {
    let mut metadata = Metadata::new("GeoLite2-City", 6);
    metadata.build_epoch = 1_700_000_000;
    metadata.record_size = 28;
    metadata
        .description
        .insert("en".to_string(), "Fixture City database".to_string());
    let mut tree = PrefixTree::new(metadata);

    let city = DataValue::from_iter([
        (
            "city",
            DataValue::from_iter([
                ("geoname_id", DataValue::Uint32(202061)),
                (
                    "names",
                    DataValue::from_iter([("en", DataValue::from("Kigali"))]),
                ),
            ]),
        ),
        (
            "country",
            DataValue::from_iter([
                ("geoname_id", DataValue::Uint32(2635167)),
                ("iso_code", DataValue::from("GB")),
                (
                    "names",
                    DataValue::from_iter([("en", DataValue::from("United Kingdom"))]),
                ),
            ]),
        ),
        (
            "location",
            DataValue::from_iter([
                ("latitude", DataValue::Double(-1.9441)),
                ("longitude", DataValue::Double(30.0619)),
            ]),
        ),
    ]);
    let other = DataValue::from_iter([(
        "continent",
        DataValue::from_iter([("code", DataValue::from("NA"))]),
    )]);

    tree.insert(net("203.0.113.0/24"), &city)
        .expect("Failed to insert city");
    tree.insert(net("198.51.100.0/22"), &other)
        .expect("Failed to insert continent");
    tree.alias_ipv4().expect("Failed to alias IPv4");
    tree
}

/// Creates the `countries` table with Rwanda and the United Kingdom.
pub fn create_lookup_store(path: &Path) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");
    runtime.block_on(async {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .expect("Failed to create lookup store");
        sqlx::query("CREATE TABLE countries (gid INTEGER PRIMARY KEY, ISO TEXT, name_eng TEXT)")
            .execute(&pool)
            .await
            .expect("Failed to create countries table");
        for (gid, iso, name) in [(49518_i64, "RW", "Rwanda"), (2635167, "GB", "United Kingdom")] {
            sqlx::query("INSERT INTO countries (gid, ISO, name_eng) VALUES (?, ?, ?)")
                .bind(gid)
                .bind(iso)
                .bind(name)
                .execute(&pool)
                .await
                .expect("Failed to insert country");
        }
        pool.close().await;
    });
}

pub fn write_blocks(path: &Path, rows: &[&str]) {
    let mut text = String::from(BLOCKS_HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    std::fs::write(path, text).expect("Failed to write block list");
}

#[allow(dead_code)]
pub fn read(path: &PathBuf) -> Vec<u8> {
    std::fs::read(path).expect("Failed to read database")
}
