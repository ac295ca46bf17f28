use std::collections::BTreeMap;

use serde_json::{Map, Value};
use shared::domain::{ChannelValue, ChipId, RegisterValue, CHANNELS};
use thiserror::Error;
use tracing::debug;

use crate::catalog::RegisterCatalog;

/// Register name to value, for a single chip.
pub type DeviceConfiguration = BTreeMap<String, RegisterValue>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceStoreError {
    #[error("device store needs at least one chip")]
    NoChips,
    #[error("unknown chip {0}")]
    UnknownChip(ChipId),
    #[error("chip {chip} has no register {register}")]
    UnknownRegister { chip: ChipId, register: String },
    #[error("register {register} does not hold {expected} values")]
    KindMismatch {
        register: String,
        expected: &'static str,
    },
    #[error("channel {channel} out of range 0..{CHANNELS}")]
    ChannelOutOfRange { channel: usize },
    #[error("retrieved field {register} is malformed: {reason}")]
    MalformedField { register: String, reason: String },
}

/// Per-chip register state plus the chip currently shown in the configuration pane.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    catalog: RegisterCatalog,
    chip_ids: Vec<ChipId>,
    devices: BTreeMap<ChipId, DeviceConfiguration>,
    selected: ChipId,
}

impl DeviceStore {
    /// Gives every chip every catalog default and selects the first chip.
    pub fn seed(chip_ids: &[ChipId], catalog: RegisterCatalog) -> Result<Self, DeviceStoreError> {
        let Some(&selected) = chip_ids.first() else {
            return Err(DeviceStoreError::NoChips);
        };
        let defaults: DeviceConfiguration = catalog
            .iter()
            .map(|spec| (spec.name.to_string(), spec.default.clone()))
            .collect();
        let devices = chip_ids
            .iter()
            .map(|chip| (*chip, defaults.clone()))
            .collect();
        Ok(Self {
            catalog,
            chip_ids: chip_ids.to_vec(),
            devices,
            selected,
        })
    }

    pub fn chip_ids(&self) -> &[ChipId] {
        &self.chip_ids
    }

    pub fn get(&self, chip: ChipId) -> Option<&DeviceConfiguration> {
        self.devices.get(&chip)
    }

    pub fn selected_device(&self) -> ChipId {
        self.selected
    }

    pub fn select_device(&mut self, chip: ChipId) -> Result<(), DeviceStoreError> {
        if !self.devices.contains_key(&chip) {
            return Err(DeviceStoreError::UnknownChip(chip));
        }
        self.selected = chip;
        Ok(())
    }

    /// The selected chip together with its configuration.
    pub fn active(&self) -> Option<(ChipId, &DeviceConfiguration)> {
        self.devices
            .get(&self.selected)
            .map(|config| (self.selected, config))
    }

    pub fn set_scalar(
        &mut self,
        chip: ChipId,
        register: &str,
        value: impl Into<String>,
    ) -> Result<(), DeviceStoreError> {
        match self.register_mut(chip, register)? {
            RegisterValue::Scalar(current) => {
                *current = value.into();
                Ok(())
            }
            _ => Err(DeviceStoreError::KindMismatch {
                register: register.to_string(),
                expected: "scalar",
            }),
        }
    }

    pub fn set_channel(
        &mut self,
        chip: ChipId,
        register: &str,
        channel: usize,
        value: ChannelValue,
    ) -> Result<(), DeviceStoreError> {
        if channel >= CHANNELS {
            return Err(DeviceStoreError::ChannelOutOfRange { channel });
        }
        match (self.register_mut(chip, register)?, value) {
            (RegisterValue::PerChannelValue(values), ChannelValue::Value(value)) => {
                values[channel] = value;
                Ok(())
            }
            (RegisterValue::PerChannelFlag(flags), ChannelValue::Flag(flag)) => {
                flags[channel] = flag;
                Ok(())
            }
            (_, ChannelValue::Value(_)) => Err(DeviceStoreError::KindMismatch {
                register: register.to_string(),
                expected: "per-channel numeric",
            }),
            (_, ChannelValue::Flag(_)) => Err(DeviceStoreError::KindMismatch {
                register: register.to_string(),
                expected: "per-channel flag",
            }),
        }
    }

    /// Overwrites the registers present in `fields`; every other register keeps its value.
    ///
    /// All known fields are decoded before anything is written, so a malformed field
    /// leaves the chip untouched. Fields outside the catalog are skipped.
    /// Returns the names of the registers that were written.
    pub fn merge_retrieved(
        &mut self,
        chip: ChipId,
        fields: &Map<String, Value>,
    ) -> Result<Vec<String>, DeviceStoreError> {
        if !self.devices.contains_key(&chip) {
            return Err(DeviceStoreError::UnknownChip(chip));
        }

        let mut decoded = Vec::with_capacity(fields.len());
        for (name, raw) in fields {
            let Some(spec) = self.catalog.lookup(name) else {
                debug!(chip = chip.0, register = %name, "skipping retrieved field outside catalog");
                continue;
            };
            let value = spec
                .decode(raw)
                .map_err(|reason| DeviceStoreError::MalformedField {
                    register: name.clone(),
                    reason,
                })?;
            decoded.push((name.clone(), value));
        }

        let Some(config) = self.devices.get_mut(&chip) else {
            return Err(DeviceStoreError::UnknownChip(chip));
        };
        let written = decoded.iter().map(|(name, _)| name.clone()).collect();
        for (name, value) in decoded {
            config.insert(name, value);
        }
        Ok(written)
    }

    fn register_mut(
        &mut self,
        chip: ChipId,
        register: &str,
    ) -> Result<&mut RegisterValue, DeviceStoreError> {
        self.devices
            .get_mut(&chip)
            .ok_or(DeviceStoreError::UnknownChip(chip))?
            .get_mut(register)
            .ok_or_else(|| DeviceStoreError::UnknownRegister {
                chip,
                register: register.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "tests/device_store_tests.rs"]
mod tests;
