use std::{collections::BTreeMap, sync::Arc};

use byteorder::{BigEndian, ByteOrder};
use hashbrown::HashMap;

use super::{models::MmdbError, value::DataValue};

pub(crate) const TYPE_EXTENDED: u8 = 0;
pub(crate) const TYPE_POINTER: u8 = 1;
pub(crate) const TYPE_STRING: u8 = 2;
pub(crate) const TYPE_DOUBLE: u8 = 3;
pub(crate) const TYPE_BYTES: u8 = 4;
pub(crate) const TYPE_UINT16: u8 = 5;
pub(crate) const TYPE_UINT32: u8 = 6;
pub(crate) const TYPE_MAP: u8 = 7;
pub(crate) const TYPE_INT32: u8 = 8;
pub(crate) const TYPE_UINT64: u8 = 9;
pub(crate) const TYPE_UINT128: u8 = 10;
pub(crate) const TYPE_ARRAY: u8 = 11;
pub(crate) const TYPE_BOOL: u8 = 14;
pub(crate) const TYPE_FLOAT: u8 = 15;

/// Deepest map/array nesting accepted in one value.
const MAX_NESTING: usize = 256;

/// Decodes values out of an MMDB data section.
///
/// Offsets are relative to the start of the data section, the same base
/// that pointers use. Values reached through a search-tree record are
/// cached so records shared by many networks decode once.
pub struct DataDecoder<'a> {
    buf: &'a [u8],
    cache: HashMap<usize, Arc<DataValue>>,
}

impl<'a> DataDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cache: HashMap::new(),
        }
    }

    /// Decodes the record a search-tree leaf points at.
    ///
    /// # Arguments
    ///
    /// * `offset`: Offset of the record in the data section.
    ///
    /// # Returns
    ///
    /// The shared decoded value. Later calls with the same offset return
    /// the same `Arc`.
    pub fn record(&mut self, offset: usize) -> Result<Arc<DataValue>, MmdbError> {
        if let Some(value) = self.cache.get(&offset) {
            return Ok(Arc::clone(value));
        }
        let (value, _) = self.decode(offset)?;
        let value = Arc::new(value);
        self.cache.insert(offset, Arc::clone(&value));
        Ok(value)
    }

    /// Decodes the value at `offset`.
    ///
    /// # Arguments
    ///
    /// * `offset`: Position of the value's control byte in the data section.
    ///
    /// # Returns
    ///
    /// The value and the offset just past it. A pointer is followed, but the
    /// returned offset is the one after the pointer itself.
    pub fn decode(&self, offset: usize) -> Result<(DataValue, usize), MmdbError> {
        self.decode_nested(offset, 0)
    }

    fn decode_nested(&self, offset: usize, depth: usize) -> Result<(DataValue, usize), MmdbError> {
        if depth > MAX_NESTING {
            return Err(self.error(
                offset,
                &format!("values nested deeper than {} levels", MAX_NESTING),
            ));
        }
        let (type_num, size, next) = self.control(offset)?;
        if type_num == TYPE_POINTER {
            let (target, after) = self.pointer(size, next)?;
            let (type_num, size, next) = self.control(target)?;
            if type_num == TYPE_POINTER {
                return Err(self.error(target, "pointer to pointer"));
            }
            let (value, _) = self.decode_typed(type_num, size, next, depth)?;
            return Ok((value, after));
        }
        self.decode_typed(type_num, size, next, depth)
    }

    fn decode_typed(
        &self,
        type_num: u8,
        size: usize,
        offset: usize,
        depth: usize,
    ) -> Result<(DataValue, usize), MmdbError> {
        match type_num {
            TYPE_STRING => {
                let bytes = self.bytes(offset, size)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| self.error(offset, &format!("invalid utf-8: {}", e)))?;
                Ok((DataValue::String(s.to_string()), offset + size))
            }
            TYPE_DOUBLE => {
                if size != 8 {
                    return Err(self.error(offset, "double must be 8 bytes"));
                }
                let bytes = self.bytes(offset, size)?;
                Ok((DataValue::Double(BigEndian::read_f64(bytes)), offset + size))
            }
            TYPE_FLOAT => {
                if size != 4 {
                    return Err(self.error(offset, "float must be 4 bytes"));
                }
                let bytes = self.bytes(offset, size)?;
                Ok((DataValue::Float(BigEndian::read_f32(bytes)), offset + size))
            }
            TYPE_BYTES => Ok((
                DataValue::Bytes(self.bytes(offset, size)?.to_vec()),
                offset + size,
            )),
            TYPE_UINT16 => {
                let v = self.uint(offset, size, 2)?;
                Ok((DataValue::Uint16(v as u16), offset + size))
            }
            TYPE_UINT32 => {
                let v = self.uint(offset, size, 4)?;
                Ok((DataValue::Uint32(v as u32), offset + size))
            }
            TYPE_INT32 => {
                let v = self.uint(offset, size, 4)?;
                Ok((DataValue::Int32(v as u32 as i32), offset + size))
            }
            TYPE_UINT64 => {
                let v = self.uint(offset, size, 8)?;
                Ok((DataValue::Uint64(v as u64), offset + size))
            }
            TYPE_UINT128 => {
                let v = self.uint(offset, size, 16)?;
                Ok((DataValue::Uint128(v), offset + size))
            }
            TYPE_BOOL => {
                if size > 1 {
                    return Err(self.error(offset, "bool size must be 0 or 1"));
                }
                Ok((DataValue::Bool(size == 1), offset))
            }
            TYPE_MAP => {
                let mut map = BTreeMap::new();
                let mut next = offset;
                for _ in 0..size {
                    let (key, after_key) = self.decode_nested(next, depth + 1)?;
                    let DataValue::String(key) = key else {
                        return Err(self.error(next, "map key is not a string"));
                    };
                    let (value, after_value) = self.decode_nested(after_key, depth + 1)?;
                    map.insert(key, value);
                    next = after_value;
                }
                Ok((DataValue::Map(map), next))
            }
            TYPE_ARRAY => {
                let mut items = Vec::with_capacity(size.min(1024));
                let mut next = offset;
                for _ in 0..size {
                    let (value, after) = self.decode_nested(next, depth + 1)?;
                    items.push(value);
                    next = after;
                }
                Ok((DataValue::Array(items), next))
            }
            other => Err(self.error(offset, &format!("unknown data type {}", other))),
        }
    }

    /// Reads a control byte (plus extended type and size bytes).
    fn control(&self, offset: usize) -> Result<(u8, usize, usize), MmdbError> {
        let ctrl = *self.byte(offset)?;
        let mut next = offset + 1;
        let mut type_num = ctrl >> 5;
        if type_num == TYPE_EXTENDED {
            type_num = match self.byte(next)?.checked_add(7) {
                Some(t) if t >= TYPE_INT32 => t,
                _ => return Err(self.error(offset, "invalid extended type")),
            };
            next += 1;
        }

        let size = (ctrl & 0x1f) as usize;
        if type_num == TYPE_POINTER {
            return Ok((type_num, size, next));
        }

        let (size, next) = match size {
            0..=28 => (size, next),
            29 => (29 + *self.byte(next)? as usize, next + 1),
            30 => (
                285 + BigEndian::read_u16(self.bytes(next, 2)?) as usize,
                next + 2,
            ),
            _ => (
                65821 + BigEndian::read_u24(self.bytes(next, 3)?) as usize,
                next + 3,
            ),
        };
        Ok((type_num, size, next))
    }

    fn pointer(&self, size: usize, offset: usize) -> Result<(usize, usize), MmdbError> {
        let len = ((size >> 3) & 0x3) + 1;
        let bytes = self.bytes(offset, len)?;
        let high = size & 0x7;
        let target = match len {
            1 => (high << 8) | bytes[0] as usize,
            2 => ((high << 16) | BigEndian::read_u16(bytes) as usize) + 2048,
            3 => ((high << 24) | BigEndian::read_u24(bytes) as usize) + 526336,
            _ => BigEndian::read_u32(bytes) as usize,
        };
        Ok((target, offset + len))
    }

    fn uint(&self, offset: usize, size: usize, max: usize) -> Result<u128, MmdbError> {
        if size > max {
            return Err(self.error(offset, &format!("integer wider than {} bytes", max)));
        }
        Ok(self
            .bytes(offset, size)?
            .iter()
            .fold(0u128, |acc, b| (acc << 8) | *b as u128))
    }

    fn byte(&self, offset: usize) -> Result<&u8, MmdbError> {
        self.buf
            .get(offset)
            .ok_or_else(|| self.error(offset, "unexpected end of data section"))
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], MmdbError> {
        self.buf
            .get(offset..offset + len)
            .ok_or_else(|| self.error(offset, "unexpected end of data section"))
    }

    fn error(&self, offset: usize, message: &str) -> MmdbError {
        MmdbError::Decode {
            offset,
            message: message.to_string(),
        }
    }
}
