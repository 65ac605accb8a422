use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raw point values before SunSpec scale factors are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
    F32(f32),
}

impl PointValue {
    pub fn as_f64(self) -> f64 {
        match self {
            PointValue::I16(v) => f64::from(v),
            PointValue::U16(v) => f64::from(v),
            PointValue::I32(v) => f64::from(v),
            PointValue::U32(v) => f64::from(v),
            PointValue::U64(v) => v as f64,
            PointValue::F32(v) => f64::from(v),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PointValue::I16(_) => "i16",
            PointValue::U16(_) => "u16",
            PointValue::I32(_) => "i32",
            PointValue::U32(_) => "u32",
            PointValue::U64(_) => "u64",
            PointValue::F32(_) => "f32",
        }
    }
}

/// How appliance power draw is charged against the surplus budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /// Fixed appliance list, each start deducts its configured power.
    #[default]
    Manual,
    /// Appliances discovered every cycle, each start deducts the threshold.
    #[serde(alias = "auto")]
    AutoSingle,
    /// Appliances discovered every cycle, the threshold gates each start on its own.
    AutoAll,
}

impl DispatchMode {
    pub fn is_automatic(self) -> bool {
        !matches!(self, DispatchMode::Manual)
    }

    /// Whether a successful start reduces the budget left for later appliances.
    pub fn deducts_budget(self) -> bool {
        !matches!(self, DispatchMode::AutoAll)
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchMode::Manual => "manual",
            DispatchMode::AutoSingle => "auto-single",
            DispatchMode::AutoAll => "auto-all",
        };
        f.write_str(name)
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "manual" => Ok(DispatchMode::Manual),
            "auto-single" | "auto" => Ok(DispatchMode::AutoSingle),
            "auto-all" => Ok(DispatchMode::AutoAll),
            other => Err(format!("unknown dispatch mode {other:?}")),
        }
    }
}
