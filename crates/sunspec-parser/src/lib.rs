//! Decoding of SolarEdge SunSpec register blocks.
//!
//! Each record type declares its register address and a field layout; one
//! generic reader interprets the layout for any record.

use thiserror::Error;
use types::PointValue;

pub mod layout;
pub mod models;

pub use layout::{layout_len, BlockBuilder, ByteOrder, Field, FieldKind, FieldValue, FieldValues};
pub use models::{
    battery_status, inverter_status, BatteryInfo, BatterySample, CommonInfo, InverterCommon,
    InverterSample, MeterCommon, MeterSample, SUNSPEC_ID,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("improper data size for {model}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("truncated data at field {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("field {field} holds {found}, expected {expected}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no field named {0}")]
    UnknownField(String),
    #[error("field values exhausted before record was complete")]
    Exhausted,
}

/// A register block with a fixed address and layout.
pub trait Model: Sized {
    const NAME: &'static str;
    /// First holding register of instance 0.
    const ADDRESS: u16;
    /// Register distance between consecutive instances of the block.
    const INSTANCE_STRIDE: u16 = 0;
    const BYTE_ORDER: ByteOrder = ByteOrder::BigEndian;
    const LAYOUT: &'static [Field];

    fn from_values(values: FieldValues) -> Result<Self, DecodeError>;

    fn byte_len() -> usize {
        layout_len(Self::LAYOUT)
    }

    fn register_count() -> u16 {
        (Self::byte_len() / 2) as u16
    }

    fn address(instance: u8) -> u16 {
        Self::ADDRESS + Self::INSTANCE_STRIDE * u16::from(instance)
    }
}

/// Decodes a block using the record's own byte order.
pub fn decode<M: Model>(data: &[u8]) -> Result<M, DecodeError> {
    decode_with::<M>(data, M::BYTE_ORDER)
}

pub fn decode_with<M: Model>(data: &[u8], order: ByteOrder) -> Result<M, DecodeError> {
    let expected = M::byte_len();
    if data.len() != expected {
        return Err(DecodeError::SizeMismatch {
            model: M::NAME,
            expected,
            actual: data.len(),
        });
    }

    let values = layout::read_fields(M::LAYOUT, order, data)?;
    M::from_values(FieldValues::new(values))
}

/// Decoded fields by name, for diagnostics.
pub fn decode_named<M: Model>(data: &[u8]) -> Result<Vec<(&'static str, FieldValue)>, DecodeError> {
    let expected = M::byte_len();
    if data.len() != expected {
        return Err(DecodeError::SizeMismatch {
            model: M::NAME,
            expected,
            actual: data.len(),
        });
    }

    Ok(layout::read_fields(M::LAYOUT, M::BYTE_ORDER, data)?
        .into_iter()
        .map(|(field, value)| (field.name, value))
        .collect())
}

/// `raw * 10^scale_factor`.
pub fn apply_scale(raw: PointValue, scale_factor: i16) -> f64 {
    raw.as_f64() * 10f64.powi(i32::from(scale_factor))
}
