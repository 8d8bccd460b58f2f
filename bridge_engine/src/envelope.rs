//! Pairwise encryption envelope and event signing.
//!
//! Shared secrets are the ECDH x coordinate between the service key and a
//! peer's x-only key, used directly as an AES-256-CBC key. Payload wire
//! format is `base64(ciphertext) "?iv=" base64(iv)`.

use std::str::FromStr;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use secp256k1::schnorr::Signature;
use secp256k1::{ecdh, Keypair, Message, Parity, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use core_types::event::Event;
use xerror::envelope::EnvelopeError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Process-wide service identity. Immutable after init.
#[derive(Clone)]
pub struct ServiceKeys {
    secret_key: SecretKey,
    keypair: Keypair,
    public_key: String,
}

impl ServiceKeys {
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, EnvelopeError> {
        let secret_key = SecretKey::from_str(secret_hex).map_err(|_| EnvelopeError::InvalidKey)?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        let (xonly, _) = keypair.x_only_public_key();
        Ok(Self {
            secret_key,
            keypair,
            public_key: xonly.to_string(),
        })
    }

    /// X-only public key, lowercase hex.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

/// ECDH x coordinate with the peer's x-only key lifted to even parity.
pub fn shared_secret(peer_pubkey_hex: &str, own_secret: &SecretKey) -> Result<[u8; 32], EnvelopeError> {
    let xonly = XOnlyPublicKey::from_str(peer_pubkey_hex).map_err(|_| EnvelopeError::InvalidKey)?;
    let peer = PublicKey::from_x_only_public_key(xonly, Parity::Even);
    let point = ecdh::shared_secret_point(&peer, own_secret);
    let mut key = [0u8; 32];
    key.copy_from_slice(&point[..32]);
    Ok(key)
}

pub fn encrypt(plaintext: &str, key: &[u8; 32]) -> String {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    let cipher = Aes256CbcEnc::new(key.into(), &iv.into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    format!("{}?iv={}", base64::encode(&ciphertext), base64::encode(iv))
}

pub fn decrypt(content: &str, key: &[u8; 32]) -> Result<String, EnvelopeError> {
    let (ciphertext_b64, iv_b64) = content.split_once("?iv=").ok_or(EnvelopeError::InvalidCiphertext)?;
    let ciphertext = base64::decode(ciphertext_b64).map_err(|_| EnvelopeError::InvalidCiphertext)?;
    let iv = base64::decode(iv_b64).map_err(|_| EnvelopeError::InvalidCiphertext)?;
    let cipher = Aes256CbcDec::new_from_slices(key, &iv).map_err(|_| EnvelopeError::InvalidCiphertext)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| EnvelopeError::InvalidPadding)?;
    String::from_utf8(plaintext).map_err(|_| EnvelopeError::InvalidCiphertext)
}

/// SHA-256 over the canonical serialization
/// `[0, pubkey, created_at, kind, tags, content]`.
pub fn event_hash(event: &Event) -> Result<[u8; 32], EnvelopeError> {
    let arr = serde_json::json!([
        0,
        event.pubkey,
        event.created_at,
        event.kind,
        event.tags,
        event.content
    ]);
    let data = serde_json::to_vec(&arr).map_err(|_| EnvelopeError::SerializationFailed)?;
    Ok(Sha256::digest(&data).into())
}

/// Fill in `id` and `sig`. `pubkey` must already match the signing key.
pub fn sign_event(event: &mut Event, keys: &ServiceKeys) -> Result<(), EnvelopeError> {
    let hash = event_hash(event)?;
    event.id = hex::encode(hash);
    let msg = Message::from_digest_slice(&hash).map_err(|_| EnvelopeError::SerializationFailed)?;
    let secp = Secp256k1::new();
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keys.keypair);
    event.sig = sig.to_string();
    Ok(())
}

/// Verify the event id and its Schnorr signature.
pub fn verify_event(event: &Event) -> Result<(), EnvelopeError> {
    let hash = event_hash(event)?;
    if hex::encode(hash) != event.id {
        return Err(EnvelopeError::IdMismatch);
    }
    let sig_bytes = hex::decode(&event.sig).map_err(|_| EnvelopeError::InvalidSignature)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| EnvelopeError::InvalidSignature)?;
    let pk = XOnlyPublicKey::from_str(&event.pubkey).map_err(|_| EnvelopeError::InvalidKey)?;
    let msg = Message::from_digest_slice(&hash).map_err(|_| EnvelopeError::SerializationFailed)?;
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&sig, &msg, &pk)
        .map_err(|_| EnvelopeError::InvalidSignature)
}
