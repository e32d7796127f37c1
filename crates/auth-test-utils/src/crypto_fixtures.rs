//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that can sign tokens and describe
//! themselves as JWKs. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// An Ed25519 keypair with a key id, standing in for an identity provider
/// signing key.
pub struct TestKeypair {
    pub kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from a seed. The same seed always produces the same
    /// key, whatever the `kid`.
    ///
    /// # Panics
    ///
    /// Panics if ring rejects the derived seed, which does not happen for
    /// any `u8` input.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("Failed to create test keypair")
    }

    /// Fallible variant of [`TestKeypair::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {e:?}")))?;

        Ok(Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    /// Sign `claims` with this key, putting `kid` in the header.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with an explicit header (e.g. a different `kid`).
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// The public half as a JWK.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// A JWKS document holding the given keys.
pub fn jwks_json(keys: &[&TestKeypair]) -> serde_json::Value {
    serde_json::json!({
        "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>()
    })
}

/// Replace the signature segment of a token with a different (valid-looking)
/// one, keeping header and payload intact.
pub fn tamper_signature(token: &str) -> String {
    let mut parts: Vec<&str> = token.split('.').collect();
    let bogus = URL_SAFE_NO_PAD.encode([0x42u8; 64]);
    if let Some(signature) = parts.get_mut(2) {
        *signature = &bogus;
    }
    parts.join(".")
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    // Create deterministic 32-byte seed from input
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code never holds signing keys.
pub fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 format for Ed25519 (RFC 5208):
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier,
    //   privateKey      OCTET STRING
    // }
    // Where privateKey for Ed25519 is:
    // OCTET STRING containing OCTET STRING with 32-byte seed

    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier with OID 1.3.101.112 (Ed25519)
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // privateKey: OCTET STRING (34) wrapping OCTET STRING (32)
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
