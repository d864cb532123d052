//! Ephemeral key exchange for unauthenticated clients.
//!
//! A client sends its X25519 public key; the server answers with its own
//! public key, a request id and a 192-bit initialization vector. Both sides
//! then derive the same XChaCha20-Poly1305 key and walk the same nonce
//! sequence (IV + 1, IV + 2, ...), so a handful of messages can be exchanged
//! confidentially even over plaintext HTTP.
//!
//! The server side of an exchange is single use: the supervisor removes it
//! from its store before the first decryption.

use std::fmt;
use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CoreError, Result};

/// Size of an X25519 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (and of the IV) in bytes.
pub const NONCE_SIZE: usize = 24;

/// Default lifetime of a key exchange, in seconds.
pub const DEFAULT_KEX_EXPIRY_SECS: u64 = 60;

/// Bytes of OS randomness drawn per keypair (1024 bits).
const ENTROPY_SIZE: usize = 128;

/// BLAKE3 derive-key context for the session key.
const SESSION_KEY_CONTEXT: &str = "warden 2024-01 kex session key";

/// One side of a key exchange.
pub struct KeyExchange {
    request_id: Uuid,
    public_key: [u8; KEY_SIZE],
    private_key: StaticSecret,
    peer_key: Option<[u8; KEY_SIZE]>,
    initialization_vector: [u8; NONCE_SIZE],
    nonce_counter: u64,
    source_address: Option<IpAddr>,
    created_at: DateTime<Utc>,
    expiry: Duration,
}

impl KeyExchange {
    /// Create a new exchange with a fresh keypair and IV.
    pub fn create(expiry: Duration) -> Result<Self> {
        let (private_key, public_key) = generate_keypair()?;

        let mut initialization_vector = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut initialization_vector)
            .map_err(|_| CoreError::Crypto)?;

        Ok(Self {
            request_id: Uuid::nil(),
            public_key: *public_key.as_bytes(),
            private_key,
            peer_key: None,
            initialization_vector,
            nonce_counter: 0,
            source_address: None,
            created_at: Utc::now(),
            expiry,
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn set_request_id(&mut self, id: Uuid) {
        self.request_id = id;
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        &self.public_key
    }

    /// Record the other side's public key.
    pub fn set_peer_key(&mut self, key: [u8; KEY_SIZE]) {
        self.peer_key = Some(key);
    }

    pub fn initialization_vector(&self) -> &[u8; NONCE_SIZE] {
        &self.initialization_vector
    }

    /// Adopt the IV chosen by the other side.
    ///
    /// Clients call this with the IV from the server's `kex_init` reply.
    /// Resets the nonce counter.
    pub fn set_initialization_vector(&mut self, iv: [u8; NONCE_SIZE]) {
        self.initialization_vector = iv;
        self.nonce_counter = 0;
    }

    pub fn set_source_address(&mut self, addr: IpAddr) {
        self.source_address = Some(addr);
    }

    pub fn source_address(&self) -> Option<IpAddr> {
        self.source_address
    }

    /// Whether the exchange has outlived its expiry window.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + self.expiry
    }

    /// Whether `addr` is the address that opened this exchange.
    ///
    /// This binds the follow-up request to the same client; it is not an
    /// authentication step.
    pub fn is_same_source(&self, addr: IpAddr) -> bool {
        self.source_address == Some(addr)
    }

    /// Produce the next nonce: IV + invocation count, as a 192-bit
    /// big-endian integer.
    ///
    /// The counter is advanced before use, so the IV itself is never
    /// returned. Fails with [`CoreError::NonceOverflow`] once the sum no
    /// longer fits in 24 bytes.
    pub fn next_nonce(&mut self) -> Result<[u8; NONCE_SIZE]> {
        let count = self
            .nonce_counter
            .checked_add(1)
            .ok_or(CoreError::NonceOverflow)?;
        let nonce = add_to_iv(&self.initialization_vector, count)?;
        self.nonce_counter = count;
        Ok(nonce)
    }

    /// Encrypt `plaintext` under the session key and base64-encode it.
    pub fn encrypt_and_encode(&mut self, plaintext: &[u8]) -> Result<String> {
        let cipher = self.session_cipher()?;
        let nonce = self.next_nonce().map_err(|_| CoreError::Crypto)?;

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CoreError::Crypto)?;

        Ok(STANDARD.encode(ciphertext))
    }

    /// Base64-decode and decrypt a message from the peer.
    ///
    /// Every failure is reported as [`CoreError::Crypto`]; no partial
    /// plaintext is ever returned.
    pub fn decode_and_decrypt(&mut self, encoded: &str) -> Result<Vec<u8>> {
        let cipher = self.session_cipher()?;
        let ciphertext = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CoreError::Crypto)?;
        let nonce = self.next_nonce().map_err(|_| CoreError::Crypto)?;

        cipher
            .decrypt(XNonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CoreError::Crypto)
    }

    /// The public half of this exchange, ready for the wire.
    pub fn to_message(&self) -> KexMessage {
        KexMessage {
            public_key: hex::encode(self.public_key),
            request_id: self.request_id,
            initialization_vector: hex::encode(self.initialization_vector),
        }
    }

    fn session_cipher(&self) -> Result<XChaCha20Poly1305> {
        if self.is_expired() {
            return Err(CoreError::Crypto);
        }
        let peer = self.peer_key.ok_or(CoreError::Crypto)?;

        let shared = self.private_key.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CoreError::Crypto);
        }

        let key = blake3::derive_key(SESSION_KEY_CONTEXT, shared.as_bytes());
        XChaCha20Poly1305::new_from_slice(&key).map_err(|_| CoreError::Crypto)
    }
}

impl fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchange")
            .field("request_id", &self.request_id)
            .field("public_key", &hex::encode(self.public_key))
            .field("peer_key_set", &self.peer_key.is_some())
            .field("nonce_counter", &self.nonce_counter)
            .field("source_address", &self.source_address)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Wire form of a key exchange: `{public_key, request_id, initialization_vector}`.
///
/// Clients send only `public_key`; the server fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KexMessage {
    /// Hex-encoded X25519 public key.
    pub public_key: String,
    #[serde(default = "Uuid::nil")]
    pub request_id: Uuid,
    /// Hex-encoded 24-byte IV.
    #[serde(default)]
    pub initialization_vector: String,
}

impl KexMessage {
    /// Decode the public key.
    pub fn public_key_bytes(&self) -> Result<[u8; KEY_SIZE]> {
        decode_fixed(&self.public_key)
            .map_err(|e| CoreError::InvalidKey(format!("public key: {e}")))
    }

    /// Decode the initialization vector.
    pub fn initialization_vector_bytes(&self) -> Result<[u8; NONCE_SIZE]> {
        decode_fixed(&self.initialization_vector)
            .map_err(|e| CoreError::DecodingError(format!("initialization vector: {e}")))
    }
}

/// Draw 1024 bits from the OS, hash them down to 32 bytes and use the
/// result as the X25519 secret.
fn generate_keypair() -> Result<(StaticSecret, PublicKey)> {
    let mut entropy = [0u8; ENTROPY_SIZE];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|_| CoreError::Crypto)?;

    let seed = blake3::hash(&entropy);
    entropy.fill(0);

    let secret = StaticSecret::from(*seed.as_bytes());
    let public = PublicKey::from(&secret);
    Ok((secret, public))
}

/// Fixed-width big-endian addition of `count` to `iv`.
fn add_to_iv(iv: &[u8; NONCE_SIZE], count: u64) -> Result<[u8; NONCE_SIZE]> {
    let mut out = *iv;
    let mut carry = count;

    for byte in out.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = u64::from(*byte) + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }

    if carry != 0 {
        return Err(CoreError::NonceOverflow);
    }
    Ok(out)
}

fn decode_fixed<const N: usize>(s: &str) -> std::result::Result<[u8; N], hex::FromHexError> {
    let bytes = hex::decode(s)?;
    bytes
        .try_into()
        .map_err(|_| hex::FromHexError::InvalidStringLength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Server and client halves wired together the way `kex_init` does it.
    fn handshake() -> (KeyExchange, KeyExchange) {
        let expiry = Duration::seconds(60);
        let mut client = KeyExchange::create(expiry).unwrap();
        let mut server = KeyExchange::create(expiry).unwrap();

        server.set_peer_key(*client.public_key());
        server.set_request_id(Uuid::new_v4());

        let reply = server.to_message();
        client.set_peer_key(reply.public_key_bytes().unwrap());
        client.set_request_id(reply.request_id);
        client.set_initialization_vector(reply.initialization_vector_bytes().unwrap());

        (server, client)
    }

    #[test]
    fn test_nonce_never_equals_iv() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        let iv = *kex.initialization_vector();
        assert_ne!(kex.next_nonce().unwrap(), iv);
    }

    #[test]
    fn test_consecutive_nonces_differ() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        let a = kex.next_nonce().unwrap();
        let b = kex.next_nonce().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_carries_across_bytes() {
        let mut iv = [0u8; NONCE_SIZE];
        iv[NONCE_SIZE - 1] = 0xff;
        iv[NONCE_SIZE - 2] = 0xff;

        let nonce = add_to_iv(&iv, 1).unwrap();
        assert_eq!(nonce[NONCE_SIZE - 1], 0);
        assert_eq!(nonce[NONCE_SIZE - 2], 0);
        assert_eq!(nonce[NONCE_SIZE - 3], 1);
    }

    #[test]
    fn test_nonce_overflow_is_an_error() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        kex.set_initialization_vector([0xff; NONCE_SIZE]);

        assert!(matches!(kex.next_nonce(), Err(CoreError::NonceOverflow)));
        // A failed call must not move the counter.
        assert!(matches!(kex.next_nonce(), Err(CoreError::NonceOverflow)));
    }

    #[test]
    fn test_round_trip_both_directions() {
        let (mut server, mut client) = handshake();

        let request = client.encrypt_and_encode(b"{\"username\":\"root\"}").unwrap();
        assert_eq!(
            server.decode_and_decrypt(&request).unwrap(),
            b"{\"username\":\"root\"}"
        );

        let reply = server.encrypt_and_encode(b"token").unwrap();
        assert_eq!(client.decode_and_decrypt(&reply).unwrap(), b"token");
    }

    #[test]
    fn test_out_of_order_nonce_fails() {
        let (mut server, mut client) = handshake();

        let _skipped = client.encrypt_and_encode(b"first").unwrap();
        let second = client.encrypt_and_encode(b"second").unwrap();

        assert!(matches!(
            server.decode_and_decrypt(&second),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (mut server, mut client) = handshake();

        let encoded = client.encrypt_and_encode(b"payload").unwrap();
        let mut raw = STANDARD.decode(&encoded).unwrap();
        raw[0] ^= 0x01;

        assert!(matches!(
            server.decode_and_decrypt(&STANDARD.encode(raw)),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_garbage_input_fails_closed() {
        let (mut server, _client) = handshake();
        assert!(matches!(
            server.decode_and_decrypt("not base64 at all!"),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_missing_peer_key_fails() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        assert!(matches!(
            kex.encrypt_and_encode(b"x"),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_low_order_peer_key_rejected() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        kex.set_peer_key([0u8; KEY_SIZE]);
        assert!(matches!(
            kex.encrypt_and_encode(b"x"),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_expired_exchange_fails() {
        let (mut server, mut client) = handshake();
        let encoded = client.encrypt_and_encode(b"late").unwrap();

        server.created_at = Utc::now() - Duration::seconds(120);
        assert!(server.is_expired());
        assert!(matches!(
            server.decode_and_decrypt(&encoded),
            Err(CoreError::Crypto)
        ));
    }

    #[test]
    fn test_same_source() {
        let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
        let addr: IpAddr = "192.0.2.10".parse().unwrap();

        assert!(!kex.is_same_source(addr));
        kex.set_source_address(addr);
        assert!(kex.is_same_source(addr));
        assert!(!kex.is_same_source("192.0.2.11".parse().unwrap()));
    }

    #[test]
    fn test_message_rejects_short_key() {
        let msg = KexMessage {
            public_key: "abcd".into(),
            request_id: Uuid::nil(),
            initialization_vector: String::new(),
        };
        assert!(matches!(msg.public_key_bytes(), Err(CoreError::InvalidKey(_))));
    }

    #[test]
    fn test_client_message_defaults() {
        let msg: KexMessage =
            serde_json::from_str(&format!("{{\"public_key\":\"{}\"}}", "00".repeat(32))).unwrap();
        assert!(msg.request_id.is_nil());
        assert!(msg.initialization_vector.is_empty());
    }

    proptest! {
        #[test]
        fn prop_nonces_strictly_increase(iv in any::<[u8; NONCE_SIZE]>(), calls in 1usize..64) {
            prop_assume!(iv[..8] != [0xff; 8]);

            let mut kex = KeyExchange::create(Duration::seconds(60)).unwrap();
            kex.set_initialization_vector(iv);

            let mut previous = iv;
            for _ in 0..calls {
                let nonce = kex.next_nonce().unwrap();
                prop_assert!(nonce > previous);
                previous = nonce;
            }
        }
    }
}
