use std::{net::Ipv4Addr, sync::Arc};

use ip_network::Ipv4Network;

use super::{
    models::{Metadata, MmdbError},
    value::DataValue,
};

/// Bits of the IPv6 prefix `::/96` under which IPv4 addresses live.
const IPV4_IN_IPV6_OFFSET: usize = 96;

/// One slot of the in-memory search tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Empty,
    /// Record that points back at the IPv4 subtree (`::ffff:0:0/96`, `2002::/16`).
    Alias,
    Data(Arc<DataValue>),
    Branch(Box<[Node; 2]>),
}

impl Node {
    fn branch(left: Node, right: Node) -> Self {
        Self::Branch(Box::new([left, right]))
    }

    /// Folds a branch whose two halves hold the same data (or nothing).
    fn collapse(&mut self) {
        if let Self::Branch(children) = self {
            let same = match (&children[0], &children[1]) {
                (Self::Empty, Self::Empty) => true,
                (Self::Data(a), Self::Data(b)) => Arc::ptr_eq(a, b) || a == b,
                _ => false,
            };
            if same {
                let [left, _] = std::mem::replace(&mut **children, [Self::Empty, Self::Empty]);
                *self = left;
            }
        }
    }

    /// Deep-merges `record` into every data leaf below this node and fills
    /// empty space with `record` itself.
    fn merge_all(&mut self, record: &Arc<DataValue>) {
        match self {
            Self::Empty => *self = Self::Data(Arc::clone(record)),
            Self::Data(existing) => {
                *existing = Arc::new(existing.deep_merged(record));
            }
            Self::Branch(children) => {
                for child in children.iter_mut() {
                    child.merge_all(record);
                }
                self.collapse();
            }
            Self::Alias => {}
        }
    }

    fn merge_at(
        &mut self,
        key: u128,
        depth: usize,
        prefix_len: usize,
        total_bits: usize,
        record: &Arc<DataValue>,
    ) -> Result<(), MmdbError> {
        if depth == prefix_len {
            self.merge_all(record);
            return Ok(());
        }

        match self {
            Self::Alias => {
                return Err(MmdbError::AliasedNetwork(format_key(
                    key, prefix_len, total_bits,
                )))
            }
            Self::Empty => *self = Self::branch(Self::Empty, Self::Empty),
            Self::Data(value) => {
                let value = Arc::clone(value);
                *self = Self::branch(Self::Data(Arc::clone(&value)), Self::Data(value));
            }
            Self::Branch(_) => {}
        }

        if let Self::Branch(children) = self {
            let bit = ((key >> (total_bits - 1 - depth)) & 1) as usize;
            children[bit].merge_at(key, depth + 1, prefix_len, total_bits, record)?;
        }
        self.collapse();
        Ok(())
    }
}

fn format_key(key: u128, prefix_len: usize, total_bits: usize) -> String {
    if total_bits == 32 {
        format!("{}/{}", Ipv4Addr::from(key as u32), prefix_len)
    } else {
        format!("{}/{}", std::net::Ipv6Addr::from(key), prefix_len)
    }
}

/// Something a patch record can be merged into at an IPv4 prefix.
pub trait MergeTarget {
    fn merge_insert(&mut self, network: Ipv4Network, record: DataValue) -> Result<(), MmdbError>;
}

/// In-memory longest-prefix-match tree of an MMDB database.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixTree {
    pub(crate) root: Node,
    pub(crate) metadata: Metadata,
}

impl PrefixTree {
    /// Creates an empty tree.
    pub fn new(metadata: Metadata) -> Self {
        Self {
            root: Node::Empty,
            metadata,
        }
    }

    pub(crate) fn from_parts(root: Node, metadata: Metadata) -> Self {
        Self { root, metadata }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Marks the IPv4-mapped (`::ffff:0:0/96`) and 6to4 (`2002::/16`)
    /// ranges of an IPv6 tree as aliases of `::/96`.
    pub fn alias_ipv4(&mut self) -> Result<(), MmdbError> {
        if self.metadata.ip_version != 6 {
            return Ok(());
        }
        self.set_alias(0xffff_u128 << 32, 96)?;
        self.set_alias(0x2002_u128 << 112, 16)
    }

    fn set_alias(&mut self, key: u128, prefix_len: usize) -> Result<(), MmdbError> {
        let mut node = &mut self.root;
        for depth in 0..prefix_len {
            match node {
                Node::Empty => *node = Node::branch(Node::Empty, Node::Empty),
                Node::Data(value) => {
                    let value = Arc::clone(value);
                    *node = Node::branch(Node::Data(Arc::clone(&value)), Node::Data(value));
                }
                Node::Alias => return Ok(()),
                Node::Branch(_) => {}
            }
            let Node::Branch(children) = node else {
                return Err(MmdbError::InvalidFormat("alias path is not a branch".into()));
            };
            let bit = ((key >> (127 - depth)) & 1) as usize;
            node = &mut children[bit];
        }
        *node = Node::Alias;
        Ok(())
    }

    /// Deep-merges `record` into the part of the tree covered by `network`.
    ///
    /// Data covering the whole network is split so the network owns a copy,
    /// data inside it is merged with `record`, and empty space inside it
    /// takes `record` as is.
    ///
    /// # Arguments
    ///
    /// * `network`: The IPv4 network to patch. In an IPv6 tree it is placed
    ///   under `::/96`.
    /// * `record`: The value to merge.
    ///
    /// # Returns
    ///
    /// An error if the network runs through an alias or the tree has an
    /// unknown IP version.
    pub fn insert(&mut self, network: Ipv4Network, record: &DataValue) -> Result<(), MmdbError> {
        let record = Arc::new(record.clone());
        let address = u32::from(network.network_address()) as u128;
        let netmask = network.netmask() as usize;
        match self.metadata.ip_version {
            4 => self.root.merge_at(address, 0, netmask, 32, &record),
            6 => self.root.merge_at(
                address,
                0,
                IPV4_IN_IPV6_OFFSET + netmask,
                128,
                &record,
            ),
            other => Err(MmdbError::NetworkOutOfRange(network.to_string(), other)),
        }
    }

    /// Longest-prefix lookup of an IPv4 address.
    ///
    /// # Arguments
    ///
    /// * `address`: The address to look up.
    ///
    /// # Returns
    ///
    /// The record of the most specific network holding `address`, if any.
    pub fn lookup(&self, address: Ipv4Addr) -> Option<&DataValue> {
        // IPv4 lives at ::a.b.c.d in an IPv6 tree, so the key is the same
        let key = u32::from(address) as u128;
        let total_bits = self.metadata.tree_depth();
        let mut node = &self.root;
        let mut depth = 0;
        loop {
            match node {
                Node::Data(value) => return Some(value),
                Node::Empty | Node::Alias => return None,
                Node::Branch(children) => {
                    let bit = ((key >> (total_bits - 1 - depth)) & 1) as usize;
                    node = &children[bit];
                    depth += 1;
                }
            }
        }
    }

    /// Every network that holds data, in address order.
    #[cfg(test)]
    pub(crate) fn networks(&self) -> Vec<(u128, usize, Arc<DataValue>)> {
        let mut found = Vec::new();
        collect(&self.root, 0, 0, self.metadata.tree_depth(), &mut found);
        found
    }
}

#[cfg(test)]
fn collect(
    node: &Node,
    key: u128,
    depth: usize,
    total_bits: usize,
    found: &mut Vec<(u128, usize, Arc<DataValue>)>,
) {
    match node {
        Node::Data(value) => found.push((key, depth, Arc::clone(value))),
        Node::Branch(children) => {
            let bit = 1u128 << (total_bits - 1 - depth);
            collect(&children[0], key, depth + 1, total_bits, found);
            collect(&children[1], key | bit, depth + 1, total_bits, found);
        }
        Node::Empty | Node::Alias => {}
    }
}

impl MergeTarget for PrefixTree {
    fn merge_insert(&mut self, network: Ipv4Network, record: DataValue) -> Result<(), MmdbError> {
        self.insert(network, &record)
    }
}
