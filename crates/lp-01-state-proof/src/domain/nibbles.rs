// =============================================================================
// NIBBLES: Half-byte path representation
// =============================================================================

use super::errors::ProofError;

/// Leaf flag in the first nibble of a hex-prefix path.
pub const IS_LEAF_MASK: u8 = 0x20;
/// Odd-length flag in the first nibble of a hex-prefix path.
pub const IS_PATH_ODD_MASK: u8 = 0x10;

/// Nibble path for trie traversal.
///
/// State keys are arbitrary byte strings; each byte becomes two nibbles.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nibbles(pub Vec<u8>);

impl Nibbles {
    /// Create nibbles from key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0F);
        }
        Nibbles(nibbles)
    }

    /// Pack back into bytes. `None` for an odd number of nibbles.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.0.len() % 2 == 1 {
            return None;
        }
        Some(
            self.0
                .chunks(2)
                .map(|pair| (pair[0] << 4) | pair[1])
                .collect(),
        )
    }

    /// Nibbles from `start` to the end.
    pub fn slice(&self, start: usize) -> Self {
        Nibbles(self.0[start.min(self.0.len())..].to_vec())
    }

    /// Whether `prefix` is a prefix of this path.
    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether one of the two paths is a prefix of the other.
    pub fn is_compatible(&self, other: &Nibbles) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// New path with `other` appended.
    pub fn join(&self, other: &Nibbles) -> Self {
        let mut joined = self.0.clone();
        joined.extend_from_slice(&other.0);
        Nibbles(joined)
    }

    /// New path with one nibble appended.
    pub fn push(&self, nibble: u8) -> Self {
        let mut joined = self.0.clone();
        joined.push(nibble);
        Nibbles(joined)
    }

    /// Common prefix length with another path.
    pub fn common_prefix_len(&self, other: &Nibbles) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Nibble at index.
    pub fn at(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Hex-prefix encode: flag nibble (leaf `2`, odd `1`), then the path.
    pub fn encode_hex_prefix(&self, is_leaf: bool) -> Vec<u8> {
        let odd = self.len() % 2 == 1;
        let mut flags = if is_leaf { IS_LEAF_MASK } else { 0 };
        if odd {
            flags |= IS_PATH_ODD_MASK;
        }

        let mut result = Vec::with_capacity(self.len() / 2 + 1);
        let rest = if odd {
            result.push(flags | self.0[0]);
            &self.0[1..]
        } else {
            result.push(flags);
            &self.0[..]
        };
        for chunk in rest.chunks(2) {
            result.push((chunk[0] << 4) | chunk.get(1).copied().unwrap_or(0));
        }
        result
    }

    /// Decode a hex-prefix path into `(nibbles, is_leaf)`.
    ///
    /// Flag nibbles above 3 and even paths with a non-zero padding nibble
    /// are rejected.
    pub fn decode_hex_prefix(encoded: &[u8]) -> Result<(Self, bool), ProofError> {
        let Some(&first) = encoded.first() else {
            return Err(ProofError::MalformedProof("empty node path".into()));
        };

        let flags = first >> 4;
        if flags > 3 {
            return Err(ProofError::MalformedProof(format!(
                "invalid path flag nibble {flags:#x}"
            )));
        }
        let is_leaf = first & IS_LEAF_MASK != 0;
        let odd = first & IS_PATH_ODD_MASK != 0;

        let mut nibbles = Vec::with_capacity(encoded.len() * 2);
        if odd {
            nibbles.push(first & 0x0F);
        } else if first & 0x0F != 0 {
            return Err(ProofError::MalformedProof(
                "non-zero padding in even path".into(),
            ));
        }
        for &byte in &encoded[1..] {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0F);
        }

        Ok((Nibbles(nibbles), is_leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_from_bytes() {
        let nibbles = Nibbles::from_bytes(&[0xAB, 0x0F]);
        assert_eq!(nibbles.0, vec![0x0A, 0x0B, 0x00, 0x0F]);
        assert_eq!(nibbles.to_bytes(), Some(vec![0xAB, 0x0F]));
        assert_eq!(Nibbles(vec![1, 2, 3]).to_bytes(), None);
    }

    #[test]
    fn test_hex_prefix_encoding() {
        let encoded = Nibbles(vec![1, 2, 3, 4]).encode_hex_prefix(true);
        assert_eq!(encoded, vec![0x20, 0x12, 0x34]);

        let encoded = Nibbles(vec![1, 2, 3]).encode_hex_prefix(true);
        assert_eq!(encoded, vec![0x31, 0x23]);

        let encoded = Nibbles(vec![1, 2, 3, 4]).encode_hex_prefix(false);
        assert_eq!(encoded, vec![0x00, 0x12, 0x34]);

        let encoded = Nibbles(vec![0x0F]).encode_hex_prefix(false);
        assert_eq!(encoded, vec![0x1F]);
    }

    #[test]
    fn test_hex_prefix_roundtrip() {
        for (path, leaf) in [(vec![1, 2, 3, 4, 5], true), (vec![0, 9], false), (vec![], true)] {
            let original = Nibbles(path);
            let encoded = original.encode_hex_prefix(leaf);
            let (decoded, is_leaf) = Nibbles::decode_hex_prefix(&encoded).unwrap();
            assert_eq!(is_leaf, leaf);
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_bad_flag_nibble_rejected() {
        assert!(matches!(
            Nibbles::decode_hex_prefix(&[0x40, 0x12]),
            Err(ProofError::MalformedProof(_))
        ));
        assert!(matches!(
            Nibbles::decode_hex_prefix(&[0x05]),
            Err(ProofError::MalformedProof(_))
        ));
        assert!(Nibbles::decode_hex_prefix(&[]).is_err());
    }

    #[test]
    fn test_compatibility() {
        let a = Nibbles(vec![1, 2, 3]);
        assert!(a.is_compatible(&Nibbles(vec![1, 2])));
        assert!(a.is_compatible(&Nibbles(vec![1, 2, 3, 4])));
        assert!(!a.is_compatible(&Nibbles(vec![1, 3])));
        assert_eq!(a.common_prefix_len(&Nibbles(vec![1, 2, 7])), 2);
    }
}
