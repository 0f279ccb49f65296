use crate::bay::{BayId, MAX_BAYS};
use crate::error::CredentialError;
use arrayvec::ArrayString;
use heapless::Vec;
use serde::{Deserialize, Serialize};

pub const MAX_CREDENTIAL_LEN: usize = 20;
pub const MAX_CREDENTIALS: usize = MAX_BAYS * 2 + 8;

/// Identifier read from a card. Stored upper-case so reader output and
/// configured UIDs compare equal regardless of hex casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialId(ArrayString<MAX_CREDENTIAL_LEN>);

impl CredentialId {
    pub fn new(raw: &str) -> Result<Self, CredentialError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::Empty);
        }
        if trimmed.len() > MAX_CREDENTIAL_LEN {
            return Err(CredentialError::TooLong { max: MAX_CREDENTIAL_LEN });
        }
        if !trimmed.chars().all(|c| c.is_ascii_graphic()) {
            return Err(CredentialError::InvalidCharacter);
        }

        let mut id = ArrayString::new();
        for c in trimmed.chars() {
            id.push(c.to_ascii_uppercase());
        }
        Ok(Self(id))
    }

    /// Hex-encode raw UID bytes the way the card reader reports them.
    pub fn from_uid_bytes(bytes: &[u8]) -> Result<Self, CredentialError> {
        if bytes.is_empty() {
            return Err(CredentialError::Empty);
        }
        if bytes.len() * 2 > MAX_CREDENTIAL_LEN {
            return Err(CredentialError::TooLong { max: MAX_CREDENTIAL_LEN });
        }

        let mut id = ArrayString::new();
        for byte in bytes {
            // capacity checked above
            let _ = core::fmt::Write::write_fmt(&mut id, format_args!("{:02X}", byte));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CredentialId {
    type Error = CredentialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CredentialId> for String {
    fn from(id: CredentialId) -> Self {
        id.0.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialRole {
    BayOwner(BayId),
    /// Reserve cards: unlock any locked or stolen bay, never lock.
    MasterOverride,
    ResetAuthority,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct CredentialAllowList {
    entries: Vec<(CredentialId, CredentialRole), MAX_CREDENTIALS>,
}

impl CredentialAllowList {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a card. Re-registering an identifier replaces its role.
    pub fn insert(&mut self, id: CredentialId, role: CredentialRole) -> Result<(), &'static str> {
        if role == CredentialRole::Unknown {
            return Err("Unknown is not an assignable role");
        }
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = role;
            return Ok(());
        }
        self.entries.push((id, role)).map_err(|_| "Credential allow-list full")
    }

    pub fn resolve(&self, id: &CredentialId) -> CredentialRole {
        self.entries
            .iter()
            .find(|(known, _)| known == id)
            .map_or(CredentialRole::Unknown, |(_, role)| *role)
    }

    pub fn owner_of(&self, bay: BayId) -> Option<&CredentialId> {
        self.entries
            .iter()
            .find(|(_, role)| *role == CredentialRole::BayOwner(bay))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CredentialAllowList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_normalised_to_uppercase() {
        let id = CredentialId::new(" 3ca0ffe2 ").unwrap();
        assert_eq!(id.as_str(), "3CA0FFE2");
        assert_eq!(id, CredentialId::new("3CA0FFE2").unwrap());
    }

    #[test]
    fn test_credential_rejects_bad_input() {
        assert_eq!(CredentialId::new("   "), Err(CredentialError::Empty));
        assert_eq!(
            CredentialId::new("0123456789ABCDEF01234"),
            Err(CredentialError::TooLong { max: MAX_CREDENTIAL_LEN })
        );
        assert_eq!(CredentialId::new("AB\u{7}CD"), Err(CredentialError::InvalidCharacter));
    }

    #[test]
    fn test_credential_from_uid_bytes() {
        let id = CredentialId::from_uid_bytes(&[0x3C, 0xA0, 0xFF, 0xE2]).unwrap();
        assert_eq!(id.as_str(), "3CA0FFE2");

        let short = CredentialId::from_uid_bytes(&[0x0A]).unwrap();
        assert_eq!(short.as_str(), "0A");
    }

    #[test]
    fn test_allow_list_resolution() {
        let mut list = CredentialAllowList::new();
        let owner = CredentialId::new("3CA0FFE2").unwrap();
        let master = CredentialId::new("BBBBBBBB").unwrap();
        list.insert(owner.clone(), CredentialRole::BayOwner(BayId(1))).unwrap();
        list.insert(master.clone(), CredentialRole::MasterOverride).unwrap();

        assert_eq!(list.resolve(&owner), CredentialRole::BayOwner(BayId(1)));
        assert_eq!(list.resolve(&master), CredentialRole::MasterOverride);
        assert_eq!(
            list.resolve(&CredentialId::new("12345678").unwrap()),
            CredentialRole::Unknown
        );
        assert_eq!(list.owner_of(BayId(1)), Some(&owner));
        assert_eq!(list.owner_of(BayId(2)), None);
    }

    #[test]
    fn test_allow_list_rejects_unknown_role() {
        let mut list = CredentialAllowList::new();
        let id = CredentialId::new("DEADBEEF").unwrap();
        assert!(list.insert(id, CredentialRole::Unknown).is_err());
        assert!(list.is_empty());
    }
}
