use hashbrown::HashMap;

use super::{
    decoder::{
        TYPE_ARRAY, TYPE_BOOL, TYPE_BYTES, TYPE_DOUBLE, TYPE_FLOAT, TYPE_INT32, TYPE_MAP,
        TYPE_STRING, TYPE_UINT128, TYPE_UINT16, TYPE_UINT32, TYPE_UINT64,
    },
    value::DataValue,
};

/// Appends `value` to `out` in MMDB data-section encoding.
///
/// Integers use the fewest bytes that hold them and map keys are written in
/// sorted order, so equal values always encode to equal bytes.
///
/// # Arguments
///
/// * `value`: The value to encode.
/// * `out`: Buffer the encoded bytes are appended to.
pub fn encode_value(value: &DataValue, out: &mut Vec<u8>) {
    match value {
        DataValue::String(s) => {
            write_control(TYPE_STRING, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(v) => {
            write_control(TYPE_DOUBLE, 8, out);
            out.extend_from_slice(&v.to_be_bytes());
        }
        DataValue::Float(v) => {
            write_control(TYPE_FLOAT, 4, out);
            out.extend_from_slice(&v.to_be_bytes());
        }
        DataValue::Bytes(bytes) => {
            write_control(TYPE_BYTES, bytes.len(), out);
            out.extend_from_slice(bytes);
        }
        DataValue::Uint16(v) => write_uint(TYPE_UINT16, &v.to_be_bytes(), out),
        DataValue::Uint32(v) => write_uint(TYPE_UINT32, &v.to_be_bytes(), out),
        DataValue::Uint64(v) => write_uint(TYPE_UINT64, &v.to_be_bytes(), out),
        DataValue::Uint128(v) => write_uint(TYPE_UINT128, &v.to_be_bytes(), out),
        DataValue::Int32(v) => {
            // negative values need all four bytes to keep the sign
            if *v < 0 {
                write_control(TYPE_INT32, 4, out);
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                write_uint(TYPE_INT32, &v.to_be_bytes(), out);
            }
        }
        DataValue::Bool(v) => write_control(TYPE_BOOL, *v as usize, out),
        DataValue::Map(map) => {
            write_control(TYPE_MAP, map.len(), out);
            for (key, value) in map {
                write_control(TYPE_STRING, key.len(), out);
                out.extend_from_slice(key.as_bytes());
                encode_value(value, out);
            }
        }
        DataValue::Array(items) => {
            write_control(TYPE_ARRAY, items.len(), out);
            for item in items {
                encode_value(item, out);
            }
        }
    }
}

fn write_uint(type_num: u8, be_bytes: &[u8], out: &mut Vec<u8>) {
    let start = be_bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(be_bytes.len());
    let significant = &be_bytes[start..];
    write_control(type_num, significant.len(), out);
    out.extend_from_slice(significant);
}

fn write_control(type_num: u8, size: usize, out: &mut Vec<u8>) {
    let (size_bits, extra): (u8, Vec<u8>) = match size {
        0..=28 => (size as u8, vec![]),
        29..=284 => (29, vec![(size - 29) as u8]),
        285..=65820 => (30, ((size - 285) as u16).to_be_bytes().to_vec()),
        _ => (31, ((size - 65821) as u32).to_be_bytes()[1..].to_vec()),
    };

    if type_num > 7 {
        out.push(size_bits);
        out.push(type_num - 7);
    } else {
        out.push((type_num << 5) | size_bits);
    }
    out.extend_from_slice(&extra);
}

/// Builds a data section, storing each distinct value once.
///
/// Values are laid out in the order they are first interned, so interning
/// the same sequence of values always yields the same bytes.
#[derive(Default)]
pub struct DataSectionWriter {
    buf: Vec<u8>,
    offsets: HashMap<Vec<u8>, u32>,
}

impl DataSectionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset of `value` within the section, encoding it if needed.
    pub fn intern(&mut self, value: &DataValue) -> u32 {
        let mut encoded = Vec::new();
        encode_value(value, &mut encoded);
        if let Some(offset) = self.offsets.get(&encoded) {
            return *offset;
        }
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(&encoded);
        self.offsets.insert(encoded, offset);
        offset
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::decoder::DataDecoder;

    fn roundtrip(value: &DataValue) -> DataValue {
        let mut buf = Vec::new();
        encode_value(value, &mut buf);
        let (decoded, next) = DataDecoder::new(&buf).decode(0).unwrap();
        assert_eq!(next, buf.len());
        decoded
    }

    #[test]
    fn geoip_shaped_record_survives_encoding() {
        let value = DataValue::from_iter([
            (
                "location",
                DataValue::from_iter([
                    ("latitude", DataValue::Double(-1.9536)),
                    ("longitude", DataValue::Double(30.0605)),
                    ("accuracy_radius", DataValue::Uint16(1000)),
                ]),
            ),
            ("names", DataValue::Array(vec![DataValue::from("Kigali")])),
            ("offset", DataValue::Int32(-7200)),
            ("patched", DataValue::Bool(true)),
            ("big", DataValue::Uint128(u128::MAX)),
            ("weight", DataValue::Float(0.5)),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn long_strings_use_size_extensions() {
        for len in [28, 29, 284, 285, 65820, 65821, 70000] {
            let value = DataValue::String("x".repeat(len));
            assert_eq!(roundtrip(&value), value, "length {}", len);
        }
    }

    #[test]
    fn integers_use_minimal_width() {
        let mut buf = Vec::new();
        encode_value(&DataValue::Uint32(0), &mut buf);
        assert_eq!(buf, [0xc0]);

        buf.clear();
        encode_value(&DataValue::Uint32(49518), &mut buf);
        assert_eq!(buf, [0xc2, 0xc1, 0x6e]);
    }

    #[test]
    fn interning_deduplicates() {
        let mut section = DataSectionWriter::new();
        let first = section.intern(&DataValue::from("RW"));
        let other = section.intern(&DataValue::from("GB"));
        let again = section.intern(&DataValue::from("RW"));
        assert_eq!(first, 0);
        assert_eq!(other, 3);
        assert_eq!(again, first);
        assert_eq!(section.len(), 6);
    }
}
