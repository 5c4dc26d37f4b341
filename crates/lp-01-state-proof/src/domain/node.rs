use rlp::Rlp;

use super::errors::ProofError;
use super::nibbles::Nibbles;
use super::Hash;

// =============================================================================
// TRIE NODE: node shapes found in a proof set
// =============================================================================

/// Reference from a node to one of its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// No child.
    Blank,
    /// Child stored separately, identified by the SHA3-256 of its RLP.
    Hash(Hash),
    /// Child short enough to be embedded in its parent.
    Inline(Box<TrieNode>),
}

/// Decoded Patricia-Merkle trie node.
///
/// RLP shapes:
/// - Full: `[child_0, ..., child_15, value]`
/// - Leaf: `[hex_prefix(path, leaf), value]`
/// - Extension: `[hex_prefix(path, ext), child]`
/// - Blank: empty string
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    /// Empty node.
    Blank,

    /// Remaining key path and the stored value.
    Leaf {
        /// Remaining path.
        path: Nibbles,
        /// RLP-encoded value list.
        value: Vec<u8>,
    },

    /// Shared prefix with a single child.
    Extension {
        /// Shared path.
        path: Nibbles,
        /// Child node.
        child: NodeRef,
    },

    /// 16-way branch with an optional value for keys ending here.
    Full {
        /// One reference per nibble.
        children: Vec<NodeRef>,
        /// RLP-encoded value list, if a key terminates here.
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// Decode a node from its RLP item.
    pub fn decode(rlp: &Rlp<'_>) -> Result<Self, ProofError> {
        if rlp.is_data() {
            return if rlp.data()?.is_empty() {
                Ok(TrieNode::Blank)
            } else {
                Err(ProofError::MalformedProof(
                    "node is a non-empty string".into(),
                ))
            };
        }

        match rlp.item_count()? {
            17 => {
                let mut children = Vec::with_capacity(16);
                for i in 0..16 {
                    children.push(NodeRef::decode(&rlp.at(i)?)?);
                }
                let value_item = rlp.at(16)?;
                let data = value_item.data()?;
                let value = (!data.is_empty()).then(|| data.to_vec());
                Ok(TrieNode::Full { children, value })
            }
            2 => Self::decode_pair(&rlp.at(0)?, &rlp.at(1)?),
            other => Err(ProofError::MalformedProof(format!(
                "node has {other} items"
            ))),
        }
    }

    /// Leaf or extension, checked against the shape of the second item.
    fn decode_pair(path_item: &Rlp<'_>, second: &Rlp<'_>) -> Result<Self, ProofError> {
        let (path, is_leaf) = Nibbles::decode_hex_prefix(path_item.data()?)?;

        if second.is_list() {
            if is_leaf {
                return Err(ProofError::MalformedProof(
                    "leaf flag on a node with an embedded child".into(),
                ));
            }
            let child = NodeRef::Inline(Box::new(TrieNode::decode(second)?));
            return Ok(TrieNode::Extension { path, child });
        }

        let data = second.data()?;
        match (is_leaf, data.len()) {
            (true, _) => Ok(TrieNode::Leaf {
                path,
                value: data.to_vec(),
            }),
            (false, 32) => Ok(TrieNode::Extension {
                path,
                child: NodeRef::Hash(to_hash(data)?),
            }),
            (false, len) => Err(ProofError::MalformedProof(format!(
                "extension flag on a node holding a {len}-byte value"
            ))),
        }
    }
}

impl NodeRef {
    /// Decode a child slot.
    pub fn decode(rlp: &Rlp<'_>) -> Result<Self, ProofError> {
        if rlp.is_list() {
            return Ok(NodeRef::Inline(Box::new(TrieNode::decode(rlp)?)));
        }
        let data = rlp.data()?;
        match data.len() {
            0 => Ok(NodeRef::Blank),
            32 => Ok(NodeRef::Hash(to_hash(data)?)),
            len => Err(ProofError::MalformedProof(format!(
                "child reference of {len} bytes"
            ))),
        }
    }
}

fn to_hash(data: &[u8]) -> Result<Hash, ProofError> {
    data.try_into()
        .map_err(|_| ProofError::MalformedProof("hash reference is not 32 bytes".into()))
}

/// Extract the value from a stored RLP value list (its last element).
pub fn decode_value(encoded: &[u8]) -> Result<Vec<u8>, ProofError> {
    let rlp = Rlp::new(encoded);
    if rlp.is_data() {
        return Ok(rlp.data()?.to_vec());
    }
    let count = rlp.item_count()?;
    if count == 0 {
        return Err(ProofError::MalformedProof("empty value list".into()));
    }
    Ok(rlp.at(count - 1)?.data()?.to_vec())
}
