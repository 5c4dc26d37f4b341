//! # Channel Session Keys
//!
//! One x25519 key per connection pool. Per node, the shared secret with the
//! node's public key is expanded into one key per direction, and every
//! frame is sealed with XChaCha20-Poly1305 under a random 24-byte nonce.
//!
//! ```text
//! k_c2s = SHA3-256(LABEL ‖ "c2s" ‖ shared ‖ client_pk ‖ node_pk)
//! k_s2c = SHA3-256(LABEL ‖ "s2c" ‖ shared ‖ client_pk ‖ node_pk)
//! frame = u32 BE len ‖ nonce(24) ‖ ciphertext
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use sha3::{Digest, Sha3_256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::errors::NetworkerError;

const KEY_LABEL: &[u8] = b"ledger-pool channel v1";

/// XChaCha20 nonce length.
pub const NONCE_LEN: usize = 24;

/// Largest frame body accepted from a node.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// The pool's own x25519 key.
pub struct ClientSecret {
    secret: StaticSecret,
    public: PublicKey,
}

impl ClientSecret {
    /// Fresh random key.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Key from fixed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key sent to a node when a channel opens.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Directional keys for a channel to the node with `node_pk`.
    pub fn session_keys(&self, node_pk: &[u8; 32]) -> SessionKeys {
        let node_public = PublicKey::from(*node_pk);
        let shared = self.secret.diffie_hellman(&node_public);
        let client_pk = self.public.to_bytes();
        SessionKeys {
            outbound: derive_key(b"c2s", shared.as_bytes(), &client_pk, node_pk),
            inbound: derive_key(b"s2c", shared.as_bytes(), &client_pk, node_pk),
        }
    }
}

impl ClientSecret {
    /// Keys for the node end of a channel opened by `client_pk`.
    pub fn accept_keys(&self, client_pk: &[u8; 32]) -> SessionKeys {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*client_pk));
        let node_pk = self.public.to_bytes();
        SessionKeys {
            outbound: derive_key(b"s2c", shared.as_bytes(), client_pk, &node_pk),
            inbound: derive_key(b"c2s", shared.as_bytes(), client_pk, &node_pk),
        }
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

fn derive_key(direction: &[u8], shared: &[u8; 32], client_pk: &[u8; 32], node_pk: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(KEY_LABEL);
    hasher.update(direction);
    hasher.update(shared);
    hasher.update(client_pk);
    hasher.update(node_pk);
    hasher.finalize().into()
}

/// Client-to-node and node-to-client keys of one channel.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeys {
    outbound: [u8; 32],
    inbound: [u8; 32],
}

impl SessionKeys {
    /// Cipher for frames this side writes.
    pub fn sealer(&self) -> FrameCipher {
        FrameCipher::new(&self.outbound)
    }

    /// Cipher for frames this side reads.
    pub fn opener(&self) -> FrameCipher {
        FrameCipher::new(&self.inbound)
    }
}

/// Seals and opens frame bodies (`nonce ‖ ciphertext`).
pub struct FrameCipher {
    cipher: XChaCha20Poly1305,
}

impl FrameCipher {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.into()),
        }
    }

    /// Encrypt `plaintext` into a frame body.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, NetworkerError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| NetworkerError::Crypto(e.to_string()))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);
        Ok(body)
    }

    /// Decrypt a frame body.
    pub fn open(&self, body: &[u8]) -> Result<Vec<u8>, NetworkerError> {
        if body.len() < NONCE_LEN {
            return Err(NetworkerError::Crypto("frame shorter than nonce".into()));
        }
        let (nonce, ciphertext) = body.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| NetworkerError::Crypto(e.to_string()))
    }
}

/// Prefix a frame body with its big-endian length.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, NetworkerError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(NetworkerError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Validate a length prefix read from a node.
pub fn check_frame_len(header: [u8; 4]) -> Result<usize, NetworkerError> {
    let size = u32::from_be_bytes(header) as usize;
    if size > MAX_FRAME_LEN {
        return Err(NetworkerError::FrameTooLarge {
            size,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_keys() -> (ClientSecret, ClientSecret) {
        (ClientSecret::from_bytes([1u8; 32]), ClientSecret::from_bytes([2u8; 32]))
    }

    #[test]
    fn test_both_sides_derive_matching_keys() {
        let (client, node) = node_keys();
        let client_keys = client.session_keys(&node.public_bytes());
        let node_keys = node.accept_keys(&client.public_bytes());

        assert_eq!(client_keys.outbound, node_keys.inbound);
        assert_eq!(client_keys.inbound, node_keys.outbound);
        assert_ne!(client_keys.outbound, client_keys.inbound);
    }

    #[test]
    fn test_seal_open_between_peers() {
        let (client, node) = node_keys();
        let client_keys = client.session_keys(&node.public_bytes());
        let node_keys = node.accept_keys(&client.public_bytes());

        let body = client_keys.sealer().seal(b"{\"op\":\"LEDGER_STATUS\"}").unwrap();
        assert_eq!(node_keys.opener().open(&body).unwrap(), b"{\"op\":\"LEDGER_STATUS\"}");

        let reply = node_keys.sealer().seal(b"pong").unwrap();
        assert_eq!(client_keys.opener().open(&reply).unwrap(), b"pong");
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let (client, node) = node_keys();
        let keys = client.session_keys(&node.public_bytes());

        let mut body = keys.sealer().seal(b"payload").unwrap();
        let last = body.len() - 1;
        body[last] ^= 0xFF;
        assert!(node.accept_keys(&client.public_bytes()).opener().open(&body).is_err());
        assert!(keys.opener().open(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let (client, node) = node_keys();
        let keys = client.session_keys(&node.public_bytes());
        let body = keys.sealer().seal(b"payload").unwrap();
        assert!(keys.opener().open(&body).is_err());
    }

    #[test]
    fn test_frame_length_prefix() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 3]);
        assert_eq!(check_frame_len([0, 0, 0, 3]).unwrap(), 3);
        assert!(matches!(
            check_frame_len([0xFF, 0xFF, 0xFF, 0xFF]),
            Err(NetworkerError::FrameTooLarge { .. })
        ));
    }
}
