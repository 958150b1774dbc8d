use std::collections::BTreeMap;

/// A decoded MMDB data-section value.
///
/// Maps keep their keys ordered so that encoding the same value always
/// produces the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    String(String),
    Double(f64),
    Bytes(Vec<u8>),
    Uint16(u16),
    Uint32(u32),
    Map(BTreeMap<String, DataValue>),
    Int32(i32),
    Uint64(u64),
    Uint128(u128),
    Array(Vec<DataValue>),
    Bool(bool),
    Float(f32),
}

impl DataValue {
    /// Returns the entry stored under `key` if this value is a map.
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follows a path of map keys, e.g. `["country", "names", "en"]`.
    pub fn path(&self, keys: &[&str]) -> Option<&DataValue> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Merges `other` into `self`, with `other` winning on conflicts.
    ///
    /// Maps are merged key by key and arrays element by element (the longer
    /// tail is kept). Any other combination is replaced by `other`.
    pub fn deep_merge(&mut self, other: &DataValue) {
        match (self, other) {
            (Self::Map(existing), Self::Map(incoming)) => {
                for (key, value) in incoming {
                    match existing.get_mut(key) {
                        Some(slot) => slot.deep_merge(value),
                        None => {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (Self::Array(existing), Self::Array(incoming)) => {
                for (index, value) in incoming.iter().enumerate() {
                    match existing.get_mut(index) {
                        Some(slot) => slot.deep_merge(value),
                        None => existing.push(value.clone()),
                    }
                }
            }
            (slot, value) => *slot = value.clone(),
        }
    }

    /// Returns a copy of `self` with `other` deep-merged into it.
    pub fn deep_merged(&self, other: &DataValue) -> DataValue {
        let mut merged = self.clone();
        merged.deep_merge(other);
        merged
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u32> for DataValue {
    fn from(value: u32) -> Self {
        Self::Uint32(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<K: Into<String>> FromIterator<(K, DataValue)> for DataValue {
    fn from_iter<I: IntoIterator<Item = (K, DataValue)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city() -> DataValue {
        DataValue::from_iter([
            (
                "city",
                DataValue::from_iter([("geoname_id", DataValue::Uint32(2643743))]),
            ),
            (
                "country",
                DataValue::from_iter([
                    ("geoname_id", DataValue::Uint32(2635167)),
                    ("iso_code", DataValue::from("GB")),
                    ("is_in_european_union", DataValue::Bool(false)),
                ]),
            ),
        ])
    }

    #[test]
    fn merge_keeps_sibling_keys() {
        let patch = DataValue::from_iter([(
            "country",
            DataValue::from_iter([("iso_code", DataValue::from("RW"))]),
        )]);
        let merged = city().deep_merged(&patch);

        assert_eq!(
            merged.path(&["country", "iso_code"]),
            Some(&DataValue::from("RW"))
        );
        assert_eq!(
            merged.path(&["country", "is_in_european_union"]),
            Some(&DataValue::Bool(false))
        );
        assert_eq!(
            merged.path(&["city", "geoname_id"]),
            Some(&DataValue::Uint32(2643743))
        );
    }

    #[test]
    fn merge_replaces_mismatched_types() {
        let mut value = DataValue::from_iter([("names", DataValue::from("plain"))]);
        let patch =
            DataValue::from_iter([("names", DataValue::from_iter([("en", DataValue::from("x"))]))]);
        value.deep_merge(&patch);
        assert_eq!(value, patch);
    }

    #[test]
    fn merge_arrays_elementwise() {
        let mut value = DataValue::Array(vec![DataValue::Uint16(1), DataValue::Uint16(2)]);
        value.deep_merge(&DataValue::Array(vec![DataValue::Uint16(7)]));
        assert_eq!(
            value,
            DataValue::Array(vec![DataValue::Uint16(7), DataValue::Uint16(2)])
        );

        value.deep_merge(&DataValue::Array(vec![
            DataValue::Uint16(7),
            DataValue::Uint16(2),
            DataValue::Uint16(3),
        ]));
        assert_eq!(
            value,
            DataValue::Array(vec![
                DataValue::Uint16(7),
                DataValue::Uint16(2),
                DataValue::Uint16(3)
            ])
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let patch = DataValue::from_iter([
            ("patched", DataValue::Bool(true)),
            (
                "country",
                DataValue::from_iter([("iso_code", DataValue::from("RW"))]),
            ),
        ]);
        let once = city().deep_merged(&patch);
        let twice = once.deep_merged(&patch);
        assert_eq!(once, twice);
    }
}
