use types::PointValue;

use crate::DecodeError;

/// Storage of a single field inside a register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U16,
    I16,
    U32,
    I32,
    U64,
    F32,
    /// Fixed-width text, NUL padded on the right.
    Text(usize),
    /// Bytes that are part of the block but not decoded.
    Reserved(usize),
}

impl FieldKind {
    pub const fn width(&self) -> usize {
        match self {
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Text(width) | FieldKind::Reserved(width) => *width,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::U16 => "u16",
            FieldKind::I16 => "i16",
            FieldKind::U32 => "u32",
            FieldKind::I32 => "i32",
            FieldKind::U64 => "u64",
            FieldKind::F32 => "f32",
            FieldKind::Text(_) => "text",
            FieldKind::Reserved(_) => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn u16(name: &'static str) -> Self {
        Self { name, kind: FieldKind::U16 }
    }

    pub const fn i16(name: &'static str) -> Self {
        Self { name, kind: FieldKind::I16 }
    }

    pub const fn u32(name: &'static str) -> Self {
        Self { name, kind: FieldKind::U32 }
    }

    pub const fn i32(name: &'static str) -> Self {
        Self { name, kind: FieldKind::I32 }
    }

    pub const fn u64(name: &'static str) -> Self {
        Self { name, kind: FieldKind::U64 }
    }

    pub const fn f32(name: &'static str) -> Self {
        Self { name, kind: FieldKind::F32 }
    }

    pub const fn text(name: &'static str, width: usize) -> Self {
        Self { name, kind: FieldKind::Text(width) }
    }

    pub const fn reserved(name: &'static str, width: usize) -> Self {
        Self { name, kind: FieldKind::Reserved(width) }
    }
}

/// Total byte length of a layout.
pub const fn layout_len(fields: &[Field]) -> usize {
    let mut total = 0;
    let mut idx = 0;
    while idx < fields.len() {
        total += fields[idx].kind.width();
        idx += 1;
    }
    total
}

/// Word order of multi-register numeric fields.
///
/// Every 16-bit register is big-endian on the wire. `WordSwapped` blocks store
/// 32- and 64-bit values with their registers in reverse order, so the
/// registers `[0x1234, 0x5678]` hold the value `0x5678_1234`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    WordSwapped,
}

impl ByteOrder {
    /// Rearranges raw field bytes into big-endian order.
    pub fn normalize<const N: usize>(self, raw: [u8; N]) -> [u8; N] {
        match self {
            ByteOrder::BigEndian => raw,
            ByteOrder::WordSwapped => {
                let mut out = raw;
                let words = N / 2;
                for word in 0..words {
                    let src = (words - 1 - word) * 2;
                    out[word * 2] = raw[src];
                    out[word * 2 + 1] = raw[src + 1];
                }
                out
            }
        }
    }
}

/// A decoded field value. Reserved spans produce no value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Point(PointValue),
    Text(String),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Point(point) => point.kind(),
            FieldValue::Text(_) => "text",
        }
    }
}

impl From<PointValue> for FieldValue {
    fn from(value: PointValue) -> Self {
        FieldValue::Point(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Reads every non-reserved field of `fields` from `data`, in layout order.
pub fn read_fields(
    fields: &'static [Field],
    order: ByteOrder,
    data: &[u8],
) -> Result<Vec<(&'static Field, FieldValue)>, DecodeError> {
    let mut pos = 0usize;
    let mut values = Vec::with_capacity(fields.len());

    for field in fields {
        let width = field.kind.width();
        let remaining = data.len().saturating_sub(pos);
        if remaining < width {
            return Err(DecodeError::Truncated {
                field: field.name,
                needed: width,
                remaining,
            });
        }
        let raw = &data[pos..pos + width];
        pos += width;

        let value = match field.kind {
            FieldKind::U16 => PointValue::U16(u16::from_be_bytes(fixed(raw))).into(),
            FieldKind::I16 => PointValue::I16(i16::from_be_bytes(fixed(raw))).into(),
            FieldKind::U32 => PointValue::U32(u32::from_be_bytes(order.normalize(fixed(raw)))).into(),
            FieldKind::I32 => PointValue::I32(i32::from_be_bytes(order.normalize(fixed(raw)))).into(),
            FieldKind::U64 => PointValue::U64(u64::from_be_bytes(order.normalize(fixed(raw)))).into(),
            FieldKind::F32 => PointValue::F32(f32::from_be_bytes(order.normalize(fixed(raw)))).into(),
            FieldKind::Text(_) => FieldValue::Text(trim_text(raw)),
            FieldKind::Reserved(_) => continue,
        };
        values.push((field, value));
    }

    Ok(values)
}

fn fixed<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[..N]);
    out
}

fn trim_text(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|byte| *byte != 0).map_or(0, |idx| idx + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encodes field values into a register block for a layout.
///
/// Fields that are not set are written as zeros. Text longer than its field
/// width is cut off at the width.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    fields: &'static [Field],
    order: ByteOrder,
    values: Vec<Option<FieldValue>>,
    error: Option<DecodeError>,
}

impl BlockBuilder {
    pub fn new(fields: &'static [Field], order: ByteOrder) -> Self {
        Self {
            fields,
            order,
            values: vec![None; fields.len()],
            error: None,
        }
    }

    pub fn for_model<M: crate::Model>() -> Self {
        Self::new(M::LAYOUT, M::BYTE_ORDER)
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn set(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        match self.fields.iter().position(|field| field.name == name) {
            Some(idx) => self.values[idx] = Some(value.into()),
            None => {
                if self.error.is_none() {
                    self.error = Some(DecodeError::UnknownField(name.to_string()));
                }
            }
        }
        self
    }

    pub fn build(&self) -> Result<Vec<u8>, DecodeError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut out = Vec::with_capacity(layout_len(self.fields));
        for (field, value) in self.fields.iter().zip(&self.values) {
            match value {
                None => out.resize(out.len() + field.kind.width(), 0),
                Some(value) => self.write(&mut out, field, value)?,
            }
        }
        Ok(out)
    }

    fn write(&self, out: &mut Vec<u8>, field: &'static Field, value: &FieldValue) -> Result<(), DecodeError> {
        let order = self.order;
        match (field.kind, value) {
            (FieldKind::U16, FieldValue::Point(PointValue::U16(v))) => out.extend(v.to_be_bytes()),
            (FieldKind::I16, FieldValue::Point(PointValue::I16(v))) => out.extend(v.to_be_bytes()),
            // normalize is its own inverse, so the same call encodes.
            (FieldKind::U32, FieldValue::Point(PointValue::U32(v))) => out.extend(order.normalize(v.to_be_bytes())),
            (FieldKind::I32, FieldValue::Point(PointValue::I32(v))) => out.extend(order.normalize(v.to_be_bytes())),
            (FieldKind::U64, FieldValue::Point(PointValue::U64(v))) => out.extend(order.normalize(v.to_be_bytes())),
            (FieldKind::F32, FieldValue::Point(PointValue::F32(v))) => out.extend(order.normalize(v.to_be_bytes())),
            (FieldKind::Text(width), FieldValue::Text(text)) => {
                let bytes = text.as_bytes();
                let len = bytes.len().min(width);
                out.extend_from_slice(&bytes[..len]);
                out.resize(out.len() + (width - len), 0);
            }
            (kind, value) => {
                return Err(DecodeError::FieldType {
                    field: field.name,
                    expected: kind.type_name(),
                    found: value.type_name(),
                })
            }
        }
        Ok(())
    }
}

/// Decoded values of one block, consumed in layout order by a record constructor.
pub struct FieldValues {
    values: std::vec::IntoIter<(&'static Field, FieldValue)>,
}

impl FieldValues {
    pub fn new(values: Vec<(&'static Field, FieldValue)>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    fn next_point(&mut self, expected: &'static str) -> Result<(&'static Field, PointValue), DecodeError> {
        match self.values.next() {
            Some((field, FieldValue::Point(point))) => Ok((field, point)),
            Some((field, value)) => Err(DecodeError::FieldType {
                field: field.name,
                expected,
                found: value.type_name(),
            }),
            None => Err(DecodeError::Exhausted),
        }
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        match self.next_point("u16")? {
            (_, PointValue::U16(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "u16", other)),
        }
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        match self.next_point("i16")? {
            (_, PointValue::I16(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "i16", other)),
        }
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        match self.next_point("u32")? {
            (_, PointValue::U32(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "u32", other)),
        }
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        match self.next_point("i32")? {
            (_, PointValue::I32(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "i32", other)),
        }
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        match self.next_point("u64")? {
            (_, PointValue::U64(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "u64", other)),
        }
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        match self.next_point("f32")? {
            (_, PointValue::F32(v)) => Ok(v),
            (field, other) => Err(mismatch(field, "f32", other)),
        }
    }

    pub fn text(&mut self) -> Result<String, DecodeError> {
        match self.values.next() {
            Some((_, FieldValue::Text(text))) => Ok(text),
            Some((field, value)) => Err(DecodeError::FieldType {
                field: field.name,
                expected: "text",
                found: value.type_name(),
            }),
            None => Err(DecodeError::Exhausted),
        }
    }
}

fn mismatch(field: &'static Field, expected: &'static str, found: PointValue) -> DecodeError {
    DecodeError::FieldType {
        field: field.name,
        expected,
        found: found.kind(),
    }
}
