//! Static description of the configurable registers on a LArPix chip.

use serde_json::Value;
use shared::domain::{RegisterKind, RegisterValue, CHANNELS};

pub const PIXEL_TRIM_THRESHOLDS: &str = "pixel_trim_thresholds";
pub const GLOBAL_THRESHOLD: &str = "global_threshold";
pub const CHANNEL_MASK: &str = "channel_mask";

const DEFAULT_TRIM: u32 = 16;
const DEFAULT_GLOBAL_THRESHOLD: &str = "16";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub default: RegisterValue,
}

impl RegisterSpec {
    pub fn kind(&self) -> RegisterKind {
        self.default.kind()
    }

    /// Converts a retrieved JSON field into a value of this register's shape.
    ///
    /// Scalars accept strings and numbers (numbers are kept in their textual form).
    /// Per-channel registers need exactly [`CHANNELS`] elements.
    pub fn decode(&self, raw: &Value) -> Result<RegisterValue, String> {
        match self.kind() {
            RegisterKind::Scalar => match raw {
                Value::String(text) => Ok(RegisterValue::Scalar(text.clone())),
                Value::Number(number) => Ok(RegisterValue::Scalar(number.to_string())),
                other => Err(format!("expected string or number, got {other}")),
            },
            RegisterKind::PerChannelValue => serde_json::from_value::<[u32; CHANNELS]>(raw.clone())
                .map(RegisterValue::PerChannelValue)
                .map_err(|err| format!("expected {CHANNELS} unsigned values: {err}")),
            RegisterKind::PerChannelFlag => serde_json::from_value::<[bool; CHANNELS]>(raw.clone())
                .map(RegisterValue::PerChannelFlag)
                .map_err(|err| format!("expected {CHANNELS} flags: {err}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterCatalog {
    registers: Vec<RegisterSpec>,
}

impl RegisterCatalog {
    pub fn new(registers: Vec<RegisterSpec>) -> Self {
        Self { registers }
    }

    pub fn larpix() -> Self {
        Self::new(vec![
            RegisterSpec {
                name: PIXEL_TRIM_THRESHOLDS,
                default: RegisterValue::PerChannelValue([DEFAULT_TRIM; CHANNELS]),
            },
            RegisterSpec {
                name: GLOBAL_THRESHOLD,
                default: RegisterValue::Scalar(DEFAULT_GLOBAL_THRESHOLD.to_string()),
            },
            RegisterSpec {
                name: CHANNEL_MASK,
                default: RegisterValue::PerChannelFlag([false; CHANNELS]),
            },
        ])
    }

    pub fn lookup(&self, name: &str) -> Option<&RegisterSpec> {
        self.registers.iter().find(|spec| spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterSpec> {
        self.registers.iter()
    }
}

impl Default for RegisterCatalog {
    fn default() -> Self {
        Self::larpix()
    }
}
