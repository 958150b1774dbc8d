use std::{fs, path::Path};

use byteorder::{BigEndian, ByteOrder};

use super::{
    decoder::DataDecoder,
    models::{Metadata, MmdbError, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER},
    tree::{Node, PrefixTree},
};

/// Loads a whole database file into an in-memory [`PrefixTree`].
///
/// # Arguments
///
/// * `path`: The MaxMind DB file to read.
///
/// # Returns
///
/// The loaded tree, or an `MmdbError` naming what could not be read.
pub fn load(path: &Path) -> Result<PrefixTree, MmdbError> {
    let bytes = fs::read(path).map_err(|source| MmdbError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    from_bytes(&bytes)
}

/// Builds a [`PrefixTree`] from the bytes of a database.
///
/// `maxminddb` validates the file and parses its metadata; the search tree
/// is then walked record by record and every data record decoded once.
pub fn from_bytes(bytes: &[u8]) -> Result<PrefixTree, MmdbError> {
    let reader = maxminddb::Reader::from_source(bytes)?;
    let metadata = Metadata::from(&reader.metadata);
    let record_size = RecordSize::from_bits(metadata.record_size)?;

    let node_count = metadata.node_count as usize;
    let tree_size = node_count * record_size.node_bytes();
    let marker = bytes
        .windows(METADATA_MARKER.len())
        .rposition(|window| window == METADATA_MARKER)
        .ok_or_else(|| MmdbError::InvalidFormat("metadata marker not found".into()))?;
    let data_start = tree_size + DATA_SECTION_SEPARATOR;
    if node_count == 0 || data_start > marker {
        return Err(MmdbError::InvalidFormat(format!(
            "search tree of {} nodes does not fit before the metadata",
            node_count
        )));
    }

    let mut walker = TreeWalker {
        tree: &bytes[..tree_size],
        record_size,
        node_count,
        max_depth: metadata.tree_depth(),
        ipv4_start: None,
        ipv4_seen: false,
        visited: vec![false; node_count],
        decoder: DataDecoder::new(&bytes[data_start..marker]),
    };
    if metadata.ip_version == 6 {
        walker.ipv4_start = walker.find_ipv4_start()?;
    }
    let root = walker.branch(0, 0)?;

    #[cfg(feature = "log")]
    log::debug!(
        "Loaded {} search tree nodes ({}-bit records, IPv{})",
        node_count,
        record_size.bits(),
        metadata.ip_version
    );

    Ok(PrefixTree::from_parts(root, metadata))
}

struct TreeWalker<'a> {
    tree: &'a [u8],
    record_size: RecordSize,
    node_count: usize,
    max_depth: usize,
    ipv4_start: Option<usize>,
    ipv4_seen: bool,
    visited: Vec<bool>,
    decoder: DataDecoder<'a>,
}

impl TreeWalker<'_> {
    fn record(&self, node: usize, side: usize) -> Result<usize, MmdbError> {
        let size = self.record_size.node_bytes();
        let base = node * size;
        let bytes = self.tree.get(base..base + size).ok_or_else(|| {
            MmdbError::InvalidFormat(format!("node {} is outside the search tree", node))
        })?;

        let value = match self.record_size {
            RecordSize::Bits24 => BigEndian::read_u24(&bytes[side * 3..side * 3 + 3]),
            RecordSize::Bits28 => {
                let middle = bytes[3] as u32;
                if side == 0 {
                    ((middle & 0xf0) << 20) | BigEndian::read_u24(&bytes[0..3])
                } else {
                    ((middle & 0x0f) << 24) | BigEndian::read_u24(&bytes[4..7])
                }
            }
            RecordSize::Bits32 => BigEndian::read_u32(&bytes[side * 4..side * 4 + 4]),
        };
        Ok(value as usize)
    }

    /// Node reached by following 96 zero bits, where IPv4 lives.
    fn find_ipv4_start(&self) -> Result<Option<usize>, MmdbError> {
        let mut node = 0;
        for _ in 0..96 {
            let next = self.record(node, 0)?;
            if next >= self.node_count {
                return Ok(None);
            }
            node = next;
        }
        Ok(Some(node))
    }

    fn branch(&mut self, node: usize, depth: usize) -> Result<Node, MmdbError> {
        if depth >= self.max_depth {
            return Err(MmdbError::InvalidFormat(format!(
                "search tree is deeper than {} bits",
                self.max_depth
            )));
        }
        if std::mem::replace(&mut self.visited[node], true) {
            return Err(MmdbError::InvalidFormat(format!(
                "node {} is reached twice",
                node
            )));
        }
        if Some(node) == self.ipv4_start {
            self.ipv4_seen = true;
        }

        let left = self.record(node, 0)?;
        let right = self.record(node, 1)?;
        let left = self.resolve(node, left, depth + 1)?;
        let right = self.resolve(node, right, depth + 1)?;
        Ok(Node::Branch(Box::new([left, right])))
    }

    fn resolve(&mut self, parent: usize, record: usize, depth: usize) -> Result<Node, MmdbError> {
        if record < self.node_count {
            // the first visit of ::/96 comes before any alias, as zero bits
            // are walked first
            if self.ipv4_seen && Some(record) == self.ipv4_start {
                return Ok(Node::Alias);
            }
            if record <= parent {
                return Err(MmdbError::InvalidFormat(format!(
                    "node {} points back at node {}",
                    parent, record
                )));
            }
            return self.branch(record, depth);
        }
        if record == self.node_count {
            return Ok(Node::Empty);
        }

        let offset = record
            .checked_sub(self.node_count + DATA_SECTION_SEPARATOR)
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!("record {} points into the separator", record))
            })?;
        Ok(Node::Data(self.decoder.record(offset)?))
    }
}
