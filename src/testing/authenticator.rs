//! Software FIDO2 authenticator
//!
//! Holds a P-256 key pair and produces genuine attestation objects and
//! signed assertions, so ceremony tests verify real cryptography instead of
//! fixtures. The internal counter increments on every assertion unless a
//! test overrides it to simulate a cloned key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::ser::into_writer;
use ciborium::value::Value;
use rand::RngCore;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

use crate::ceremony::cbor::{
    FLAG_ATTESTED_CREDENTIAL_DATA, FLAG_USER_PRESENT, FLAG_USER_VERIFIED,
};
use crate::ceremony::crypto::sha256;
use crate::ceremony::types::{
    AssertionResponse, AttestationResponse, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse,
};

/// A software authenticator bound to one credential key pair
pub struct SoftwareAuthenticator {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
    credential_id: Vec<u8>,
    aaguid: [u8; 16],
    counter: u32,
    user_verified: bool,
}

impl SoftwareAuthenticator {
    /// Generate a fresh authenticator with a random credential id
    ///
    /// # Panics
    ///
    /// Panics if the system CSPRNG fails; test-only code.
    #[must_use]
    pub fn new() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("parse generated key");

        let mut credential_id = vec![0u8; 32];
        rand::rng().fill_bytes(&mut credential_id);
        let mut aaguid = [0u8; 16];
        rand::rng().fill_bytes(&mut aaguid);

        Self {
            key_pair,
            rng,
            credential_id,
            aaguid,
            counter: 0,
            user_verified: false,
        }
    }

    /// Simulate an authenticator that also verifies the user (UV flag)
    #[must_use]
    pub fn with_user_verification(mut self) -> Self {
        self.user_verified = true;
        self
    }

    /// Base64url credential id as it appears on the wire
    #[must_use]
    pub fn credential_id(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.credential_id)
    }

    #[must_use]
    pub fn aaguid_hex(&self) -> String {
        hex::encode(self.aaguid)
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// COSE EC2/ES256 encoding of the credential public key
    fn cose_public_key(&self) -> Vec<u8> {
        // Uncompressed SEC1 point: 0x04 || x || y
        let point = self.key_pair.public_key().as_ref();
        let cose = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())), // kty: EC2
            (Value::Integer(3.into()), Value::Integer((-7).into())), // alg: ES256
            (Value::Integer((-1).into()), Value::Integer(1.into())), // crv: P-256
            (
                Value::Integer((-2).into()),
                Value::Bytes(point[1..33].to_vec()),
            ),
            (
                Value::Integer((-3).into()),
                Value::Bytes(point[33..65].to_vec()),
            ),
        ]);
        encode_cbor(&cose)
    }

    fn base_flags(&self) -> u8 {
        if self.user_verified {
            FLAG_USER_PRESENT | FLAG_USER_VERIFIED
        } else {
            FLAG_USER_PRESENT
        }
    }

    /// Produce the attestation response completing a registration ceremony
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding fails; test-only code.
    #[must_use]
    pub fn attestation_response(
        &self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
    ) -> AttestationResponse {
        let client_data_json = client_data("webauthn.create", challenge, origin);

        let mut auth_data = sha256(rp_id.as_bytes());
        auth_data.push(self.base_flags() | FLAG_ATTESTED_CREDENTIAL_DATA);
        auth_data.extend_from_slice(&self.counter.to_be_bytes());
        auth_data.extend_from_slice(&self.aaguid);
        auth_data.extend_from_slice(
            &u16::try_from(self.credential_id.len())
                .expect("credential id fits u16")
                .to_be_bytes(),
        );
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_public_key());

        let attestation_object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);

        AttestationResponse {
            id: self.credential_id(),
            raw_id: self.credential_id(),
            r#type: "public-key".into(),
            response: AuthenticatorAttestationResponse {
                client_data_json: URL_SAFE_NO_PAD.encode(&client_data_json),
                attestation_object: URL_SAFE_NO_PAD.encode(encode_cbor(&attestation_object)),
            },
        }
    }

    /// Produce a signed assertion, incrementing the internal counter
    ///
    /// # Panics
    ///
    /// Panics if signing fails; test-only code.
    pub fn assertion_response(
        &mut self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
    ) -> AssertionResponse {
        self.counter += 1;
        let counter = self.counter;
        self.signed_assertion(challenge, origin, rp_id, counter)
    }

    /// Produce a signed assertion reporting an arbitrary counter value;
    /// a stalled or decreased value simulates a cloned authenticator
    ///
    /// # Panics
    ///
    /// Panics if signing fails; test-only code.
    pub fn assertion_response_with_counter(
        &mut self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
        counter: u32,
    ) -> AssertionResponse {
        self.signed_assertion(challenge, origin, rp_id, counter)
    }

    fn signed_assertion(
        &self,
        challenge: &str,
        origin: &str,
        rp_id: &str,
        counter: u32,
    ) -> AssertionResponse {
        let client_data_json = client_data("webauthn.get", challenge, origin);

        let mut auth_data = sha256(rp_id.as_bytes());
        auth_data.push(self.base_flags());
        auth_data.extend_from_slice(&counter.to_be_bytes());

        let mut message = auth_data.clone();
        message.extend_from_slice(&sha256(&client_data_json));
        let signature = self
            .key_pair
            .sign(&self.rng, &message)
            .expect("sign assertion");

        AssertionResponse {
            id: self.credential_id(),
            raw_id: self.credential_id(),
            r#type: "public-key".into(),
            response: AuthenticatorAssertionResponse {
                client_data_json: URL_SAFE_NO_PAD.encode(&client_data_json),
                authenticator_data: URL_SAFE_NO_PAD.encode(&auth_data),
                signature: URL_SAFE_NO_PAD.encode(signature.as_ref()),
                user_handle: None,
            },
        }
    }
}

impl Default for SoftwareAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

fn client_data(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": type_,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false,
    }))
    .expect("serialize client data")
}

fn encode_cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    into_writer(value, &mut out).expect("encode CBOR");
    out
}
