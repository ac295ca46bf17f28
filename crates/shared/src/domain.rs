use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of channels on every LArPix chip.
pub const CHANNELS: usize = 32;

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ChipId, u32);
id_newtype!(CommandId, u64);

/// Chips wired to the rig, in display order. The first one is selected at startup.
pub const DEFAULT_CHIP_IDS: [ChipId; 4] = [ChipId(246), ChipId(245), ChipId(252), ChipId(243)];

/// Coarse lifecycle state reported by the DAQ core.
///
/// Stored verbatim: the core is free to report values that are not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState(pub String);

impl RunState {
    pub const START: &'static str = "START";
    pub const INIT: &'static str = "INIT";
    pub const READY: &'static str = "READY";
    pub const RUN: &'static str = "RUN";
    pub const SUBROUTINE: &'static str = "SUBROUTINE";
    pub const STOP: &'static str = "STOP";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    Scalar,
    PerChannelValue,
    PerChannelFlag,
}

/// Value held by one register of one chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Scalar(String),
    PerChannelValue([u32; CHANNELS]),
    PerChannelFlag([bool; CHANNELS]),
}

impl RegisterValue {
    pub fn kind(&self) -> RegisterKind {
        match self {
            RegisterValue::Scalar(_) => RegisterKind::Scalar,
            RegisterValue::PerChannelValue(_) => RegisterKind::PerChannelValue,
            RegisterValue::PerChannelFlag(_) => RegisterKind::PerChannelFlag,
        }
    }
}

/// One element written into a per-channel register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelValue {
    Value(u32),
    Flag(bool),
}
