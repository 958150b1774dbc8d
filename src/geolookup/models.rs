use serde::Serialize;
use thiserror::Error;

/// Resolved form of one geoname identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoIdentity {
    /// Geoname identifier the identity was resolved from.
    pub geoname_id: u32,
    /// Two-letter ISO country code.
    pub iso_code: String,
    /// English display name.
    pub name: String,
}

impl GeoIdentity {
    pub fn new(geoname_id: u32, iso_code: &str, name: &str) -> Self {
        Self {
            geoname_id,
            iso_code: iso_code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Failure to resolve a single identifier. Only ever affects one row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("geoname id {geoname_id} not found")]
    NotFound { geoname_id: u32 },

    #[error("lookup of geoname id {geoname_id} failed: {message}")]
    Store { geoname_id: u32, message: String },
}

impl LookupError {
    /// The identifier that failed to resolve.
    pub fn geoname_id(&self) -> u32 {
        match self {
            Self::NotFound { geoname_id } | Self::Store { geoname_id, .. } => *geoname_id,
        }
    }
}
