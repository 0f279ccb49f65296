//! Station configuration.
//!
//! Loaded from TOML at startup and fixed for the lifetime of the process.
//! [`StationConfig::default`] describes the two-space rack with its five
//! factory cards.
//!
//! ```toml
//! bays = [1, 2]
//!
//! [timing]
//! lock_duration_ms = 8000
//!
//! [[credentials]]
//! uid = "3CA0FFE2"
//! role = "owner"
//! bay = 1
//!
//! [[credentials]]
//! uid = "DDDDDDDD"
//! role = "reset"
//! ```

use crate::actuator::DEFAULT_SETTLE_MS;
use crate::alert::AlertTiming;
use crate::bay::{BayId, MAX_BAYS};
use crate::credentials::{CredentialAllowList, CredentialId, CredentialRole};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the sense → decide → act → report cycle.
    pub poll_period_ms: u64,
    /// Actuator travel time for a full lock or unlock.
    pub lock_duration_ms: u64,
    pub settle_ms: u32,
    pub ack_pulse_ms: u64,
    pub theft_high_ms: u64,
    pub theft_low_ms: u64,
    pub theft_cycles: u8,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let alerts = AlertTiming::default();
        Self {
            poll_period_ms: 50,
            lock_duration_ms: 8000,
            settle_ms: DEFAULT_SETTLE_MS,
            ack_pulse_ms: alerts.ack_pulse_ms,
            theft_high_ms: alerts.theft_high_ms,
            theft_low_ms: alerts.theft_low_ms,
            theft_cycles: alerts.theft_cycles,
        }
    }
}

impl TimingConfig {
    pub fn alert_timing(&self) -> AlertTiming {
        AlertTiming {
            ack_pulse_ms: self.ack_pulse_ms,
            theft_high_ms: self.theft_high_ms,
            theft_low_ms: self.theft_low_ms,
            theft_cycles: self.theft_cycles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardRole {
    Owner,
    /// Reserve card: unlocks any bay.
    Master,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub uid: String,
    pub role: CardRole,
    /// Required for owner cards, rejected for the others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bay: Option<BayId>,
}

impl CredentialEntry {
    fn new(uid: &str, role: CardRole, bay: Option<u8>) -> Self {
        Self {
            uid: uid.to_string(),
            role,
            bay: bay.map(BayId),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub frequency_hz: u32,
    pub sync_word: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 433_000_000,
            sync_word: 0xF1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub bays: Vec<BayId>,
    pub timing: TimingConfig,
    pub credentials: Vec<CredentialEntry>,
    pub radio: RadioConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            bays: vec![BayId(1), BayId(2)],
            timing: TimingConfig::default(),
            credentials: vec![
                CredentialEntry::new("3CA0FFE2", CardRole::Owner, Some(1)),
                CredentialEntry::new("AA2B0C7D", CardRole::Owner, Some(2)),
                CredentialEntry::new("BBBBBBBB", CardRole::Master, None),
                CredentialEntry::new("CCCCCCCC", CardRole::Master, None),
                CredentialEntry::new("DDDDDDDD", CardRole::Reset, None),
            ],
            radio: RadioConfig::default(),
        }
    }
}

impl StationConfig {
    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, `Parse` on bad
    /// TOML and `Validation` if the contents are inconsistent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bay_ids(&self) -> impl Iterator<Item = BayId> + '_ {
        self.bays.iter().copied()
    }

    /// Check semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bays.is_empty() || self.bays.len() > MAX_BAYS {
            return Err(ConfigError::Validation(format!(
                "between 1 and {} bays required, got {}",
                MAX_BAYS,
                self.bays.len()
            )));
        }
        for (index, bay) in self.bays.iter().enumerate() {
            if bay.get() == 0 {
                return Err(ConfigError::Validation("bay ids start at 1".to_string()));
            }
            if self.bays[..index].contains(bay) {
                return Err(ConfigError::Validation(format!("duplicate bay id {}", bay)));
            }
        }

        let t = &self.timing;
        if t.poll_period_ms == 0
            || t.lock_duration_ms == 0
            || t.ack_pulse_ms == 0
            || t.theft_high_ms == 0
            || t.theft_low_ms == 0
            || t.theft_cycles == 0
        {
            return Err(ConfigError::Validation(
                "timing values must be non-zero".to_string(),
            ));
        }
        if u64::from(t.settle_ms) >= t.poll_period_ms {
            return Err(ConfigError::Validation(format!(
                "settle_ms ({}) must be shorter than poll_period_ms ({})",
                t.settle_ms, t.poll_period_ms
            )));
        }

        let mut seen: Vec<CredentialId> = Vec::with_capacity(self.credentials.len());
        for entry in &self.credentials {
            let id = CredentialId::new(&entry.uid)?;
            if seen.contains(&id) {
                return Err(ConfigError::Validation(format!("duplicate credential {}", id)));
            }
            match (entry.role, entry.bay) {
                (CardRole::Owner, Some(bay)) if !self.bays.contains(&bay) => {
                    return Err(ConfigError::Validation(format!(
                        "credential {} assigned to unknown bay {}",
                        id, bay
                    )));
                }
                (CardRole::Owner, None) => {
                    return Err(ConfigError::Validation(format!(
                        "owner credential {} has no bay",
                        id
                    )));
                }
                (CardRole::Master | CardRole::Reset, Some(_)) => {
                    return Err(ConfigError::Validation(format!(
                        "credential {} is not an owner card but names a bay",
                        id
                    )));
                }
                _ => {}
            }
            seen.push(id);
        }

        Ok(())
    }

    /// Build the static allow-list. Call after [`validate`](Self::validate).
    pub fn allow_list(&self) -> Result<CredentialAllowList, ConfigError> {
        let mut list = CredentialAllowList::new();
        for entry in &self.credentials {
            let id = CredentialId::new(&entry.uid)?;
            let role = match (entry.role, entry.bay) {
                (CardRole::Owner, Some(bay)) => CredentialRole::BayOwner(bay),
                (CardRole::Owner, None) => {
                    return Err(ConfigError::Validation(format!(
                        "owner credential {} has no bay",
                        id
                    )));
                }
                (CardRole::Master, _) => CredentialRole::MasterOverride,
                (CardRole::Reset, _) => CredentialRole::ResetAuthority,
            };
            list.insert(id, role)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = StationConfig::default();
        config.validate().unwrap();

        let list = config.allow_list().unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(
            list.resolve(&CredentialId::new("AA2B0C7D").unwrap()),
            CredentialRole::BayOwner(BayId(2))
        );
        assert_eq!(
            list.resolve(&CredentialId::new("dddddddd").unwrap()),
            CredentialRole::ResetAuthority
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StationConfig::from_toml_str(
            r#"
            bays = [1, 2, 3]

            [timing]
            lock_duration_ms = 4000

            [[credentials]]
            uid = "01020304"
            role = "owner"
            bay = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.bays.len(), 3);
        assert_eq!(config.timing.lock_duration_ms, 4000);
        assert_eq!(config.timing.settle_ms, 10);
        assert_eq!(config.timing.theft_cycles, 5);
        assert_eq!(config.radio.sync_word, 0xF1);
        assert_eq!(config.credentials.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_configs() {
        let mut duplicate_bay = StationConfig::default();
        duplicate_bay.bays = vec![BayId(1), BayId(1)];
        assert!(matches!(duplicate_bay.validate(), Err(ConfigError::Validation(_))));

        let mut orphan_owner = StationConfig::default();
        orphan_owner.credentials[1].bay = Some(BayId(9));
        assert!(matches!(orphan_owner.validate(), Err(ConfigError::Validation(_))));

        let mut slow_settle = StationConfig::default();
        slow_settle.timing.settle_ms = 50;
        assert!(matches!(slow_settle.validate(), Err(ConfigError::Validation(_))));

        let mut duplicate_uid = StationConfig::default();
        duplicate_uid.credentials[3].uid = "bbbbbbbb".to_string();
        assert!(matches!(duplicate_uid.validate(), Err(ConfigError::Validation(_))));

        let mut empty_uid = StationConfig::default();
        empty_uid.credentials[0].uid = String::new();
        assert!(matches!(empty_uid.validate(), Err(ConfigError::Credential(_))));

        let mut no_bays = StationConfig::default();
        no_bays.bays.clear();
        assert!(no_bays.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bays = [4]").unwrap();
        writeln!(file, "[[credentials]]").unwrap();
        writeln!(file, "uid = \"CAFEBABE\"").unwrap();
        writeln!(file, "role = \"master\"").unwrap();

        let config = StationConfig::load(file.path()).unwrap();
        assert_eq!(config.bays, vec![BayId(4)]);
        assert_eq!(
            config.allow_list().unwrap().resolve(&CredentialId::new("CAFEBABE").unwrap()),
            CredentialRole::MasterOverride
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = StationConfig::load(Path::new("/nonexistent/bikebay.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let result = StationConfig::from_toml_str("bays = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
