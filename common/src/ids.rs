//! Target and region identifiers (§3 "Data model").
//!
//! `TargetId` is a plain UUID, printed in the canonical hyphenated form.
//! `RegionId` is a fixed-width, backend-discriminated token: it carries a
//! one-byte tag plus a backend-specific payload, zero-padded out to
//! [`REGION_ID_BYTES`], and is printed as base-64 for external use — the
//! same "declare a fixed byte array, give it one canonical text form"
//! shape as `declare_byte_array_type!` elsewhere in this stack, but
//! base64-encoded (per the wire format) instead of hex and carrying a
//! payload discriminator instead of a flat byte string.

use crate::error::BakeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Total on-the-wire width of a region id, chosen large enough to carry
/// the largest backend-specific descriptor (§3: "at most N bytes").
pub const REGION_ID_BYTES: usize = 64;

const TAG_FILE: u8 = 0;
const TAG_MEM: u8 = 1;

/// Opaque 16-byte target identifier, generated once at target creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(Uuid);

impl TargetId {
    pub fn new() -> Self {
        TargetId(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        TargetId(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for TargetId {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TargetId)
            .map_err(|e| BakeError::InvalidArg(format!("bad target id {s:?}: {e}")))
    }
}

/// File-backend region descriptor: which log shard, at what offset, how
/// large the extent is (§3 "File backend payload").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRegionPayload {
    pub log_index: u32,
    pub log_offset: u64,
    pub log_entry_size: u64,
}

/// Memory-backend region descriptor: a persistent-memory object handle
/// (§3 "Memory backend payload").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegionPayload {
    pub pool_uuid_lo: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPayload {
    File(FileRegionPayload),
    Mem(MemRegionPayload),
}

/// Fixed-width, backend-discriminated region id. Encodes/decodes to
/// exactly [`REGION_ID_BYTES`] bytes; printed as base-64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId {
    bytes: [u8; REGION_ID_BYTES],
}

impl RegionId {
    pub fn from_file_payload(p: FileRegionPayload) -> Self {
        let mut bytes = [0u8; REGION_ID_BYTES];
        bytes[0] = TAG_FILE;
        bytes[1..5].copy_from_slice(&p.log_index.to_le_bytes());
        bytes[5..13].copy_from_slice(&p.log_offset.to_le_bytes());
        bytes[13..21].copy_from_slice(&p.log_entry_size.to_le_bytes());
        RegionId { bytes }
    }

    pub fn from_mem_payload(p: MemRegionPayload) -> Self {
        let mut bytes = [0u8; REGION_ID_BYTES];
        bytes[0] = TAG_MEM;
        bytes[1..9].copy_from_slice(&p.pool_uuid_lo.to_le_bytes());
        bytes[9..17].copy_from_slice(&p.offset.to_le_bytes());
        RegionId { bytes }
    }

    pub fn payload(&self) -> Result<RegionPayload, BakeError> {
        match self.bytes[0] {
            TAG_FILE => {
                let log_index = u32::from_le_bytes(self.bytes[1..5].try_into().unwrap());
                let log_offset = u64::from_le_bytes(self.bytes[5..13].try_into().unwrap());
                let log_entry_size = u64::from_le_bytes(self.bytes[13..21].try_into().unwrap());
                Ok(RegionPayload::File(FileRegionPayload {
                    log_index,
                    log_offset,
                    log_entry_size,
                }))
            }
            TAG_MEM => {
                let pool_uuid_lo = u64::from_le_bytes(self.bytes[1..9].try_into().unwrap());
                let offset = u64::from_le_bytes(self.bytes[9..17].try_into().unwrap());
                Ok(RegionPayload::Mem(MemRegionPayload {
                    pool_uuid_lo,
                    offset,
                }))
            }
            tag => Err(BakeError::InvalidArg(format!("unknown region tag {tag}"))),
        }
    }

    pub fn as_bytes(&self) -> &[u8; REGION_ID_BYTES] {
        &self.bytes
    }

    pub fn from_bytes(bytes: [u8; REGION_ID_BYTES]) -> Self {
        RegionId { bytes }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(self.bytes))
    }
}

impl FromStr for RegionId {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = STANDARD
            .decode(s)
            .map_err(|e| BakeError::InvalidArg(format!("bad region id {s:?}: {e}")))?;
        let bytes: [u8; REGION_ID_BYTES] = decoded.try_into().map_err(|v: Vec<u8>| {
            BakeError::InvalidArg(format!(
                "region id has wrong length: {} (want {REGION_ID_BYTES})",
                v.len()
            ))
        })?;
        Ok(RegionId { bytes })
    }
}

impl Serialize for RegionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RegionId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_round_trips_through_text() {
        let id = TargetId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        let parsed: TargetId = text.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn region_id_file_payload_round_trips() {
        let rid = RegionId::from_file_payload(FileRegionPayload {
            log_index: 2,
            log_offset: 4096,
            log_entry_size: 8192,
        });
        let text = rid.to_string();
        let parsed: RegionId = text.parse().unwrap();
        assert_eq!(rid, parsed);
        match parsed.payload().unwrap() {
            RegionPayload::File(p) => {
                assert_eq!(p.log_index, 2);
                assert_eq!(p.log_offset, 4096);
                assert_eq!(p.log_entry_size, 8192);
            }
            RegionPayload::Mem(_) => panic!("expected file payload"),
        }
    }

    #[test]
    fn region_id_mem_payload_round_trips() {
        let rid = RegionId::from_mem_payload(MemRegionPayload {
            pool_uuid_lo: 0xdead_beef,
            offset: 0x1000,
        });
        let parsed: RegionId = rid.to_string().parse().unwrap();
        assert_eq!(rid, parsed);
    }

    #[test]
    fn region_id_rejects_wrong_length() {
        let err = "AAAA".parse::<RegionId>().unwrap_err();
        assert!(matches!(err, BakeError::InvalidArg(_)));
    }
}
