//! Reading, patching and writing MaxMind DB files.
//!
//! A database is loaded whole into a [`PrefixTree`], mutated with
//! deep-merge inserts and serialized back out in canonical form.

pub mod decoder;
pub mod encoder;
pub mod models;
pub mod reader;
pub mod tree;
pub mod value;
pub mod writer;

use std::path::Path;

pub use models::{Metadata, MmdbError, RecordSize};
pub use tree::{MergeTarget, Node, PrefixTree};
pub use value::DataValue;

impl PrefixTree {
    /// Loads the database at `path` into memory.
    ///
    /// # Arguments
    ///
    /// * `path`: The MaxMind DB file to read.
    ///
    /// # Returns
    ///
    /// The tree with every data record decoded, or an error if the file is
    /// unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MmdbError> {
        reader::load(path.as_ref())
    }

    /// Writes the tree to `path` as a new database.
    ///
    /// # Arguments
    ///
    /// * `path`: Destination file. It is replaced only once the whole
    ///   database has been written.
    ///
    /// # Returns
    ///
    /// A result indicating whether the database was written.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), MmdbError> {
        writer::write(self, path.as_ref())
    }

    /// Serializes the tree without touching the filesystem.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MmdbError> {
        writer::to_bytes(self)
    }
}
