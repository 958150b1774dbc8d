use std::{collections::BTreeMap, path::PathBuf};

use thiserror::Error;

use super::value::DataValue;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section.
pub const DATA_SECTION_SEPARATOR: usize = 16;

/// Errors raised while loading, mutating or writing a database.
#[derive(Error, Debug)]
pub enum MmdbError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid metadata")]
    Metadata(#[from] maxminddb::MaxMindDBError),

    #[error("invalid database: {0}")]
    InvalidFormat(String),

    #[error("data section offset {offset}: {message}")]
    Decode { offset: usize, message: String },

    #[error("{0} lies inside an aliased part of the tree")]
    AliasedNetwork(String),

    #[error("network {0} does not fit a {1}-bit tree")]
    NetworkOutOfRange(String, u16),

    #[error("tree needs {0} records, more than 32-bit records can address")]
    TooLarge(u64),
}

/// Width of one search-tree record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordSize {
    Bits24,
    Bits28,
    Bits32,
}

impl RecordSize {
    pub fn from_bits(bits: u16) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(Self::Bits24),
            28 => Ok(Self::Bits28),
            32 => Ok(Self::Bits32),
            _ => Err(MmdbError::InvalidFormat(format!(
                "invalid record size: {} bits",
                bits
            ))),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            Self::Bits24 => 24,
            Self::Bits28 => 28,
            Self::Bits32 => 32,
        }
    }

    /// Bytes taken by one node (two records).
    pub fn node_bytes(self) -> usize {
        self.bits() as usize / 4
    }

    /// Largest record value this size can hold.
    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Smallest record size that can hold `value`.
    pub fn fitting(value: u64) -> Result<Self, MmdbError> {
        [Self::Bits24, Self::Bits28, Self::Bits32]
            .into_iter()
            .find(|size| value <= size.max_value())
            .ok_or(MmdbError::TooLarge(value))
    }
}

/// Database metadata carried from the source file to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub binary_format_major_version: u16,
    pub binary_format_minor_version: u16,
    pub build_epoch: u64,
    pub database_type: String,
    pub description: BTreeMap<String, String>,
    pub ip_version: u16,
    pub languages: Vec<String>,
    pub node_count: u32,
    pub record_size: u16,
}

impl Metadata {
    /// Metadata for a new, empty database.
    pub fn new(database_type: &str, ip_version: u16) -> Self {
        Self {
            binary_format_major_version: 2,
            binary_format_minor_version: 0,
            build_epoch: 0,
            database_type: database_type.to_string(),
            description: BTreeMap::new(),
            ip_version,
            languages: vec!["en".to_string()],
            node_count: 0,
            record_size: 24,
        }
    }

    /// Depth of the search tree in bits.
    pub fn tree_depth(&self) -> usize {
        if self.ip_version == 4 {
            32
        } else {
            128
        }
    }

    pub(crate) fn to_value(&self) -> DataValue {
        DataValue::from_iter([
            (
                "binary_format_major_version",
                DataValue::Uint16(self.binary_format_major_version),
            ),
            (
                "binary_format_minor_version",
                DataValue::Uint16(self.binary_format_minor_version),
            ),
            ("build_epoch", DataValue::Uint64(self.build_epoch)),
            ("database_type", DataValue::from(self.database_type.as_str())),
            (
                "description",
                self.description
                    .iter()
                    .map(|(lang, text)| (lang.as_str(), DataValue::from(text.as_str())))
                    .collect(),
            ),
            ("ip_version", DataValue::Uint16(self.ip_version)),
            (
                "languages",
                DataValue::Array(
                    self.languages
                        .iter()
                        .map(|lang| DataValue::from(lang.as_str()))
                        .collect(),
                ),
            ),
            ("node_count", DataValue::Uint32(self.node_count)),
            ("record_size", DataValue::Uint16(self.record_size)),
        ])
    }
}

impl From<&maxminddb::Metadata> for Metadata {
    fn from(meta: &maxminddb::Metadata) -> Self {
        Self {
            binary_format_major_version: meta.binary_format_major_version,
            binary_format_minor_version: meta.binary_format_minor_version,
            build_epoch: meta.build_epoch,
            database_type: meta.database_type.clone(),
            description: meta.description.clone(),
            ip_version: meta.ip_version,
            languages: meta.languages.clone(),
            node_count: meta.node_count,
            record_size: meta.record_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_fitting() {
        assert_eq!(RecordSize::fitting(0).unwrap(), RecordSize::Bits24);
        assert_eq!(RecordSize::fitting(1 << 24).unwrap(), RecordSize::Bits28);
        assert_eq!(RecordSize::fitting(1 << 28).unwrap(), RecordSize::Bits32);
        assert!(RecordSize::fitting(1 << 32).is_err());
    }

    #[test]
    fn node_bytes() {
        assert_eq!(RecordSize::Bits24.node_bytes(), 6);
        assert_eq!(RecordSize::Bits28.node_bytes(), 7);
        assert_eq!(RecordSize::Bits32.node_bytes(), 8);
    }
}
