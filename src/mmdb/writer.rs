use std::{fs, path::Path, ptr};

use byteorder::{BigEndian, ByteOrder};

use super::{
    encoder::{encode_value, DataSectionWriter},
    models::{MmdbError, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER},
    tree::{Node, PrefixTree},
};

/// Writes `tree` to `path`.
///
/// The bytes go to a sibling `.tmp` file first and are renamed into place,
/// so `path` never holds a partially written database.
///
/// # Arguments
///
/// * `tree`: The tree to serialize.
/// * `path`: Destination file.
///
/// # Returns
///
/// A result indicating success, or the serialization or I/O failure.
pub fn write(tree: &PrefixTree, path: &Path) -> Result<(), MmdbError> {
    let bytes = to_bytes(tree)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = fs::write(&tmp_path, &bytes).and_then(|_| fs::rename(&tmp_path, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(MmdbError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    #[cfg(feature = "log")]
    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Serializes `tree` into MMDB bytes.
///
/// Branches are numbered breadth-first and data values are stored once, in
/// first-use order, so the same tree always produces the same bytes.
///
/// # Returns
///
/// The database bytes, or `MmdbError::TooLarge` if no record size can
/// address the tree.
pub fn to_bytes(tree: &PrefixTree) -> Result<Vec<u8>, MmdbError> {
    let wrapped;
    let root: &[Node; 2] = match &tree.root {
        Node::Branch(children) => &**children,
        other => {
            wrapped = [other.clone(), other.clone()];
            &wrapped
        }
    };

    let mut branches: Vec<&[Node; 2]> = vec![root];
    let mut index = 0;
    while index < branches.len() {
        let children = branches[index];
        for child in children.iter() {
            if let Node::Branch(grandchildren) = child {
                branches.push(&**grandchildren);
            }
        }
        index += 1;
    }
    let node_count = branches.len() as u64;

    let mut data = DataSectionWriter::new();
    let mut ipv4_record: Option<u64> = None;
    let mut records = Vec::with_capacity(branches.len() * 2);
    let mut next_id = 1u64;
    for children in &branches {
        for child in children.iter() {
            let record = match child {
                Node::Empty => node_count,
                Node::Data(value) => {
                    node_count + DATA_SECTION_SEPARATOR as u64 + data.intern(value) as u64
                }
                Node::Branch(_) => {
                    next_id += 1;
                    next_id - 1
                }
                Node::Alias => match ipv4_record {
                    Some(record) => record,
                    None => {
                        let record = ipv4_start_record(root, &branches, &mut data, node_count)?;
                        ipv4_record = Some(record);
                        record
                    }
                },
            };
            records.push(record);
        }
    }

    let max_record = node_count + DATA_SECTION_SEPARATOR as u64 + data.len() as u64;
    let record_size = match RecordSize::from_bits(tree.metadata.record_size) {
        Ok(size) if max_record <= size.max_value() => size,
        _ => RecordSize::fitting(max_record)?,
    };

    let node_bytes = record_size.node_bytes();
    let mut out = vec![0u8; records.len() / 2 * node_bytes];
    for (node, pair) in records.chunks(2).enumerate() {
        let slot = &mut out[node * node_bytes..(node + 1) * node_bytes];
        write_node(slot, record_size, pair[0] as u32, pair[1] as u32);
    }
    out.extend_from_slice(&[0u8; DATA_SECTION_SEPARATOR]);
    out.extend_from_slice(&data.into_bytes());

    let mut metadata = tree.metadata.clone();
    metadata.node_count = node_count as u32;
    metadata.record_size = record_size.bits();
    out.extend_from_slice(METADATA_MARKER);
    encode_value(&metadata.to_value(), &mut out);

    #[cfg(feature = "log")]
    log::debug!(
        "Serialized {} nodes with {}-bit records",
        node_count,
        record_size.bits()
    );
    Ok(out)
}

fn write_node(slot: &mut [u8], record_size: RecordSize, left: u32, right: u32) {
    match record_size {
        RecordSize::Bits24 => {
            BigEndian::write_u24(&mut slot[0..3], left);
            BigEndian::write_u24(&mut slot[3..6], right);
        }
        RecordSize::Bits28 => {
            BigEndian::write_u24(&mut slot[0..3], left & 0x00ff_ffff);
            slot[3] = (((left >> 24) & 0x0f) << 4 | ((right >> 24) & 0x0f)) as u8;
            BigEndian::write_u24(&mut slot[4..7], right & 0x00ff_ffff);
        }
        RecordSize::Bits32 => {
            BigEndian::write_u32(&mut slot[0..4], left);
            BigEndian::write_u32(&mut slot[4..8], right);
        }
    }
}

/// Record value of `::/96`, which alias records repeat.
fn ipv4_start_record(
    root: &[Node; 2],
    branches: &[&[Node; 2]],
    data: &mut DataSectionWriter,
    node_count: u64,
) -> Result<u64, MmdbError> {
    let mut children = root;
    let mut depth = 0;
    let target = loop {
        let child = &children[0];
        depth += 1;
        match child {
            Node::Branch(next) if depth < 96 => children = &**next,
            other => break other,
        }
    };

    match target {
        Node::Branch(start) => branches
            .iter()
            .position(|candidate| ptr::eq(*candidate, &**start))
            .map(|id| id as u64)
            .ok_or_else(|| MmdbError::InvalidFormat("IPv4 subtree was not numbered".into())),
        Node::Data(value) => {
            Ok(node_count + DATA_SECTION_SEPARATOR as u64 + data.intern(value) as u64)
        }
        Node::Empty => Ok(node_count),
        Node::Alias => Err(MmdbError::InvalidFormat("::/96 cannot be an alias".into())),
    }
}

#[cfg(test)]
mod tests {
    use ip_network::Ipv4Network;

    use super::*;
    use crate::mmdb::{models::Metadata, reader::from_bytes, value::DataValue};

    fn sample(ip_version: u16) -> PrefixTree {
        let mut tree = PrefixTree::new(Metadata::new("GeoLite2-Country", ip_version));
        let record = DataValue::from_iter([
            (
                "country",
                DataValue::from_iter([
                    ("geoname_id", DataValue::Uint32(49518)),
                    ("iso_code", DataValue::from("RW")),
                ]),
            ),
            ("patched", DataValue::Bool(true)),
        ]);
        let other = DataValue::from_iter([("continent", DataValue::from("EU"))]);
        tree.insert(Ipv4Network::new("203.0.113.0".parse().unwrap(), 24).unwrap(), &record)
            .unwrap();
        tree.insert(Ipv4Network::new("198.51.100.0".parse().unwrap(), 22).unwrap(), &other)
            .unwrap();
        tree
    }

    #[test]
    fn ipv4_tree_round_trips() {
        let tree = sample(4);
        let bytes = to_bytes(&tree).unwrap();
        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(loaded.root(), tree.root());
        assert_eq!(loaded.metadata().node_count as usize, count_branches(tree.root()));
    }

    #[test]
    fn ipv6_tree_with_aliases_round_trips() {
        let mut tree = sample(6);
        tree.alias_ipv4().unwrap();
        let bytes = to_bytes(&tree).unwrap();
        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(loaded.root(), tree.root());
        assert_eq!(to_bytes(&loaded).unwrap(), bytes);
    }

    #[test]
    fn empty_tree_gets_a_root_node() {
        let tree = PrefixTree::new(Metadata::new("Empty", 4));
        let bytes = to_bytes(&tree).unwrap();
        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(loaded.metadata().node_count, 1);
        assert!(loaded.networks().is_empty());
    }

    #[test]
    fn keeps_larger_source_record_size() {
        let mut tree = sample(4);
        tree.metadata.record_size = 32;
        let loaded = from_bytes(&to_bytes(&tree).unwrap()).unwrap();
        assert_eq!(loaded.metadata().record_size, 32);
        assert_eq!(loaded.root(), tree.root());

        tree.metadata.record_size = 28;
        let loaded = from_bytes(&to_bytes(&tree).unwrap()).unwrap();
        assert_eq!(loaded.metadata().record_size, 28);
        assert_eq!(loaded.root(), tree.root());
    }

    #[test]
    fn readable_by_maxminddb() {
        let bytes = to_bytes(&sample(6)).unwrap();
        let reader = maxminddb::Reader::from_source(bytes).unwrap();
        let country: maxminddb::geoip2::Country = reader
            .lookup("203.0.113.10".parse().unwrap())
            .unwrap();
        let country = country.country.unwrap();
        assert_eq!(country.iso_code, Some("RW"));
        assert_eq!(country.geoname_id, Some(49518));
    }

    fn count_branches(node: &Node) -> usize {
        match node {
            Node::Branch(children) => {
                1 + count_branches(&children[0]) + count_branches(&children[1])
            }
            _ => 0,
        }
    }
}
