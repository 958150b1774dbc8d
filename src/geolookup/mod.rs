pub mod models;

use std::{cell::RefCell, path::Path};

use hashbrown::HashMap;
use models::{GeoIdentity, LookupError};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tokio::runtime;

/// Query used to resolve one identifier.
const LOOKUP_QUERY: &str = "SELECT ISO, name_eng FROM countries WHERE gid = ?";

/// Checked once when the store is opened so a wrong file fails the run early.
const PROBE_QUERY: &str = "SELECT ISO, name_eng FROM countries LIMIT 1";

/// Resolves geoname identifiers to country identities.
pub trait GeoResolver {
    /// Looks up `geoname_id`.
    ///
    /// # Returns
    ///
    /// The identity, or a `LookupError` naming the identifier that failed.
    fn resolve(&self, geoname_id: u32) -> Result<GeoIdentity, LookupError>;
}

/// Resolver backed by the `countries` table of a SQLite database.
///
/// The store is opened read-only. Queries run on a private current-thread
/// runtime, so `resolve` is an ordinary blocking call.
pub struct SqliteResolver {
    runtime: runtime::Runtime,
    pool: SqlitePool,
    cache: RefCell<HashMap<u32, GeoIdentity>>,
}

impl SqliteResolver {
    /// Opens the lookup store at `path`.
    ///
    /// # Arguments
    ///
    /// * `path`: SQLite database holding the `countries` table.
    ///
    /// # Returns
    ///
    /// The resolver, or an error if the file cannot be opened or does not
    /// have the `ISO`/`name_eng` columns.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = runtime.block_on(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;
        runtime.block_on(sqlx::query(PROBE_QUERY).fetch_optional(&pool))?;

        #[cfg(feature = "log")]
        log::debug!("Opened lookup store {}", path.display());

        Ok(Self {
            runtime,
            pool,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Closes the connection pool.
    pub fn close(self) {
        self.runtime.block_on(self.pool.close());
        #[cfg(feature = "log")]
        log::debug!(
            "Closed lookup store ({} identities resolved)",
            self.cache.borrow().len()
        );
    }

    async fn query(&self, geoname_id: u32) -> Result<Option<(String, String)>, sqlx::Error> {
        sqlx::query_as::<_, (String, String)>(LOOKUP_QUERY)
            .bind(geoname_id as i64)
            .fetch_optional(&self.pool)
            .await
    }
}

impl GeoResolver for SqliteResolver {
    fn resolve(&self, geoname_id: u32) -> Result<GeoIdentity, LookupError> {
        if let Some(identity) = self.cache.borrow().get(&geoname_id) {
            return Ok(identity.clone());
        }

        let row = self
            .runtime
            .block_on(self.query(geoname_id))
            .map_err(|e| LookupError::Store {
                geoname_id,
                message: e.to_string(),
            })?;
        let (iso_code, name) = row.ok_or(LookupError::NotFound { geoname_id })?;

        let identity = GeoIdentity {
            geoname_id,
            iso_code,
            name,
        };
        self.cache
            .borrow_mut()
            .insert(geoname_id, identity.clone());
        Ok(identity)
    }
}

/// Resolver over an in-memory table.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
    identities: HashMap<u32, GeoIdentity>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the identity stored under its geoname id.
    pub fn insert(&mut self, identity: GeoIdentity) {
        self.identities.insert(identity.geoname_id, identity);
    }
}

impl FromIterator<GeoIdentity> for MemoryResolver {
    fn from_iter<I: IntoIterator<Item = GeoIdentity>>(iter: I) -> Self {
        let mut resolver = Self::new();
        for identity in iter {
            resolver.insert(identity);
        }
        resolver
    }
}

impl GeoResolver for MemoryResolver {
    fn resolve(&self, geoname_id: u32) -> Result<GeoIdentity, LookupError> {
        self.identities
            .get(&geoname_id)
            .cloned()
            .ok_or(LookupError::NotFound { geoname_id })
    }
}

impl<R: GeoResolver + ?Sized> GeoResolver for &R {
    fn resolve(&self, geoname_id: u32) -> Result<GeoIdentity, LookupError> {
        (**self).resolve(geoname_id)
    }
}
