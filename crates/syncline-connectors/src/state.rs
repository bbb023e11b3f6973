//! Enumerator checkpoint state and its on-the-wire encoding.
//!
//! ## Frame layout
//!
//! ```text
//! +--------+---------+----------------+----------------+
//! | "SNES" | version | SHA-256 digest |  JSON payload  |
//! | 4 B    | u16 BE  | 32 B           |  remainder     |
//! +--------+---------+----------------+----------------+
//! ```
//!
//! The digest covers the payload only. Any mismatch on decode is reported
//! as [`StateError::Corruption`]; a corrupt snapshot must never be restored.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StateError;
use crate::split::{SplitDescriptor, SplitId, SubtaskId, TablePath};

/// Snapshot of the enumerator's undelivered work.
///
/// Splits already handed to readers are part of the readers' own state and
/// do not appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratorState {
    /// Tables not yet expanded into splits, in expansion order.
    pub pending_tables: Vec<TablePath>,
    /// Splits earmarked per reader but not yet delivered.
    pub pending_splits: BTreeMap<SubtaskId, Vec<SplitDescriptor>>,
}

impl EnumeratorState {
    /// A state with no pending work.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of pending splits across all readers.
    #[must_use]
    pub fn split_count(&self) -> usize {
        self.pending_splits.values().map(Vec::len).sum()
    }

    /// Whether no tables and no splits are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_tables.is_empty() && self.split_count() == 0
    }

    /// Whether a split with `split_id` is pending for any reader.
    #[must_use]
    pub fn contains_split(&self, split_id: &SplitId) -> bool {
        self.pending_splits
            .values()
            .flatten()
            .any(|s| s.split_id() == split_id)
    }
}

/// Binary codec for [`EnumeratorState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StateCodec;

impl StateCodec {
    /// Frame magic.
    pub const MAGIC: [u8; 4] = *b"SNES";
    /// Current frame format version.
    pub const VERSION: u16 = 1;

    const DIGEST_LEN: usize = 32;
    const HEADER_LEN: usize = Self::MAGIC.len() + 2 + Self::DIGEST_LEN;

    /// Encodes `state` into a framed byte buffer.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Serialization` if the state cannot be serialized.
    pub fn encode(state: &EnumeratorState) -> Result<Bytes, StateError> {
        let payload = serde_json::to_vec(state)?;
        let digest = Sha256::digest(&payload);

        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + payload.len());
        buf.put_slice(&Self::MAGIC);
        buf.put_u16(Self::VERSION);
        buf.put_slice(&digest);
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    /// Decodes and validates a framed buffer.
    ///
    /// # Errors
    ///
    /// - `StateError::Corruption` on truncation, bad magic, or digest mismatch
    /// - `StateError::UnsupportedVersion` on an unknown format version
    /// - `StateError::Serialization` if the payload is not a valid state
    pub fn decode(bytes: &[u8]) -> Result<EnumeratorState, StateError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(StateError::Corruption(format!(
                "truncated frame: {} bytes, header needs {}",
                bytes.len(),
                Self::HEADER_LEN
            )));
        }

        let mut buf = bytes;
        if buf[..Self::MAGIC.len()] != Self::MAGIC {
            return Err(StateError::Corruption("bad magic".into()));
        }
        buf.advance(Self::MAGIC.len());

        let version = buf.get_u16();
        if version != Self::VERSION {
            return Err(StateError::UnsupportedVersion(version));
        }

        let (expected, payload) = buf.split_at(Self::DIGEST_LEN);
        let actual = Sha256::digest(payload);
        if actual.as_slice() != expected {
            return Err(StateError::Corruption("payload digest mismatch".into()));
        }

        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::SplitCursor;

    fn sample_state() -> EnumeratorState {
        let t1 = TablePath::new("shop", "orders");
        let t2 = TablePath::new("shop", "customers");
        let mut pending_splits = BTreeMap::new();
        pending_splits.insert(
            SubtaskId(0),
            vec![
                SplitDescriptor::new("s1", t1.clone(), SplitCursor::Range { start: 0, end: 10 }),
                SplitDescriptor::new("s2", t1, SplitCursor::Range { start: 10, end: 20 }),
            ],
        );
        pending_splits.insert(SubtaskId(1), Vec::new());
        EnumeratorState {
            pending_tables: vec![t2],
            pending_splits,
        }
    }

    #[test]
    fn test_codec_preserves_order_and_empty_entries() {
        let state = sample_state();
        let bytes = StateCodec::encode(&state).unwrap();
        assert_eq!(&bytes[..4], b"SNES");

        let decoded = StateCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, state);
        let ids: Vec<&str> = decoded.pending_splits[&SubtaskId(0)]
            .iter()
            .map(|s| s.split_id().as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(decoded.pending_splits[&SubtaskId(1)].is_empty());
    }

    #[test]
    fn test_codec_detects_flipped_payload_byte() {
        let mut bytes = StateCodec::encode(&sample_state()).unwrap().to_vec();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        assert!(matches!(
            StateCodec::decode(&bytes),
            Err(StateError::Corruption(_))
        ));
    }

    #[test]
    fn test_codec_rejects_bad_header() {
        let bytes = StateCodec::encode(&EnumeratorState::empty()).unwrap().to_vec();

        assert!(matches!(
            StateCodec::decode(&bytes[..10]),
            Err(StateError::Corruption(_))
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            StateCodec::decode(&bad_magic),
            Err(StateError::Corruption(_))
        ));

        let mut future = bytes;
        future[5] = 9;
        assert!(matches!(
            StateCodec::decode(&future),
            Err(StateError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_state_helpers() {
        let state = sample_state();
        assert_eq!(state.split_count(), 2);
        assert!(!state.is_empty());
        assert!(state.contains_split(&SplitId::new("s2")));
        assert!(!state.contains_split(&SplitId::new("s3")));
        assert!(EnumeratorState::empty().is_empty());
    }
}
