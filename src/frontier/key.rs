use crate::storage::StorageError;
use crate::url::DocId;

/// Claim order of a pending URL: priority, then depth, then discovery order
///
/// The byte form is big-endian so that byte-wise comparison in the store
/// agrees with the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrontierKey {
    pub priority: u8,
    pub depth: u32,
    pub doc_id: DocId,
}

impl FrontierKey {
    pub const ENCODED_LEN: usize = 13;

    pub fn new(priority: u8, depth: u32, doc_id: DocId) -> Self {
        Self {
            priority,
            depth,
            doc_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[0] = self.priority;
        bytes[1..5].copy_from_slice(&self.depth.to_be_bytes());
        bytes[5..].copy_from_slice(&self.doc_id.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(StorageError::Corrupt(format!(
                "frontier key has {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }

        let mut depth = [0u8; 4];
        depth.copy_from_slice(&bytes[1..5]);
        let mut doc_id = [0u8; 8];
        doc_id.copy_from_slice(&bytes[5..]);

        Ok(Self {
            priority: bytes[0],
            depth: u32::from_be_bytes(depth),
            doc_id: u64::from_be_bytes(doc_id),
        })
    }
}

/// Encodes a doc id as a store key
pub(crate) fn doc_id_bytes(doc_id: DocId) -> [u8; 8] {
    doc_id.to_be_bytes()
}

/// Decodes a doc id written by [`doc_id_bytes`]
pub(crate) fn doc_id_from_bytes(bytes: &[u8]) -> Result<DocId, StorageError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("doc id has {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}
