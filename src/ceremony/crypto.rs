//! Client-data and signature verification
//!
//! The assertion message is `authenticatorData || SHA-256(clientDataJSON)`.
//! ES256 verification goes through `ring` over the uncompressed SEC1 point;
//! RS256 reconstructs the RSA public key from the COSE modulus/exponent.

use ring::digest;
use ring::signature;
use serde::Deserialize;

use super::cbor::CoseKey;
use crate::error::Error;

/// Client data type for registration ceremonies
pub const CLIENT_DATA_CREATE: &str = "webauthn.create";
/// Client data type for authentication ceremonies
pub const CLIENT_DATA_GET: &str = "webauthn.get";

/// The fields of clientDataJSON the ceremonies verify
#[derive(Debug, Deserialize)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub type_: String,
    pub challenge: String,
    pub origin: String,
}

/// Parse and check client data against the expected ceremony type, live
/// challenge value and configured origin.
///
/// # Errors
///
/// A challenge mismatch is [`Error::ChallengeExpiredOrMissing`]: the client
/// signed over a value that is no longer the live challenge (superseded or
/// stale). Type and origin mismatches are verification failures built with
/// `verification_failed`; undecodable input uses `malformed`.
pub fn verify_client_data(
    client_data_json: &[u8],
    expected_type: &str,
    expected_challenge: &str,
    expected_origin: &str,
    malformed: fn(String) -> Error,
    verification_failed: fn(String) -> Error,
) -> Result<ClientData, Error> {
    let client_data: ClientData = serde_json::from_slice(client_data_json)
        .map_err(|_| malformed("invalid client data JSON".into()))?;

    if client_data.type_ != expected_type {
        return Err(verification_failed(format!(
            "unexpected client data type {:?}",
            client_data.type_
        )));
    }
    if client_data.challenge != expected_challenge {
        // The signed challenge is not the live one for this user and ceremony
        return Err(Error::ChallengeExpiredOrMissing);
    }
    if client_data.origin != expected_origin {
        return Err(verification_failed(format!(
            "unexpected origin {:?}",
            client_data.origin
        )));
    }

    Ok(client_data)
}

/// SHA-256 digest
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Verify an assertion signature over
/// `authenticator_data || SHA-256(client_data_json)` with the stored
/// credential public key.
///
/// # Errors
///
/// Returns [`Error::AssertionVerificationFailed`] when the signature does
/// not verify or the key material is unusable.
pub fn verify_assertion_signature(
    public_key: &CoseKey,
    authenticator_data: &[u8],
    client_data_json: &[u8],
    signature_bytes: &[u8],
) -> Result<(), Error> {
    let client_data_hash = sha256(client_data_json);
    let mut message = Vec::with_capacity(authenticator_data.len() + client_data_hash.len());
    message.extend_from_slice(authenticator_data);
    message.extend_from_slice(&client_data_hash);

    match public_key {
        CoseKey::Ec2 { x, y } => {
            // Uncompressed SEC1 point: 0x04 || x || y
            let mut point = Vec::with_capacity(1 + x.len() + y.len());
            point.push(0x04);
            point.extend_from_slice(x);
            point.extend_from_slice(y);

            let verification_key =
                signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, &point);
            verification_key
                .verify(&message, signature_bytes)
                .map_err(|_| {
                    Error::AssertionVerificationFailed("ES256 signature rejected".into())
                })
        }
        CoseKey::Rsa { n, e } => {
            use rsa::signature::Verifier;
            use sha2::Sha256;

            let rsa_key = rsa::RsaPublicKey::new(
                rsa::BigUint::from_bytes_be(n),
                rsa::BigUint::from_bytes_be(e),
            )
            .map_err(|err| {
                Error::AssertionVerificationFailed(format!("invalid RSA key: {err}"))
            })?;
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa_key);
            let signature =
                rsa::pkcs1v15::Signature::try_from(signature_bytes).map_err(|err| {
                    Error::AssertionVerificationFailed(format!(
                        "invalid RSA signature format: {err}"
                    ))
                })?;
            verifying_key.verify(&message, &signature).map_err(|_| {
                Error::AssertionVerificationFailed("RS256 signature rejected".into())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_data(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": type_,
            "challenge": challenge,
            "origin": origin,
        }))
        .unwrap()
    }

    #[test]
    fn valid_client_data_passes() {
        let bytes = client_data(CLIENT_DATA_CREATE, "abc123", "https://example.com");
        let parsed = verify_client_data(
            &bytes,
            CLIENT_DATA_CREATE,
            "abc123",
            "https://example.com",
            Error::MalformedAttestation,
            Error::AttestationVerificationFailed,
        )
        .unwrap();
        assert_eq!(parsed.origin, "https://example.com");
    }

    #[test]
    fn challenge_mismatch_is_expired_or_missing() {
        let bytes = client_data(CLIENT_DATA_GET, "superseded", "https://example.com");
        let err = verify_client_data(
            &bytes,
            CLIENT_DATA_GET,
            "live-value",
            "https://example.com",
            Error::MalformedAssertion,
            Error::AssertionVerificationFailed,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ChallengeExpiredOrMissing));
    }

    #[test]
    fn origin_mismatch_is_verification_failure() {
        let bytes = client_data(CLIENT_DATA_GET, "abc123", "https://evil.example.com");
        let err = verify_client_data(
            &bytes,
            CLIENT_DATA_GET,
            "abc123",
            "https://example.com",
            Error::MalformedAssertion,
            Error::AssertionVerificationFailed,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AssertionVerificationFailed(_)));
    }

    #[test]
    fn wrong_ceremony_type_is_verification_failure() {
        let bytes = client_data(CLIENT_DATA_CREATE, "abc123", "https://example.com");
        let err = verify_client_data(
            &bytes,
            CLIENT_DATA_GET,
            "abc123",
            "https://example.com",
            Error::MalformedAssertion,
            Error::AssertionVerificationFailed,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AssertionVerificationFailed(_)));
    }

    #[test]
    fn garbage_client_data_is_malformed() {
        let err = verify_client_data(
            b"\x00\x01",
            CLIENT_DATA_GET,
            "abc123",
            "https://example.com",
            Error::MalformedAssertion,
            Error::AssertionVerificationFailed,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedAssertion(_)));
    }

    #[test]
    fn es256_signature_round_trip() {
        use ring::rand::SystemRandom;
        use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();

        // Uncompressed point: 0x04 || x || y
        let point = key_pair.public_key().as_ref();
        let cose = CoseKey::Ec2 {
            x: point[1..33].to_vec(),
            y: point[33..65].to_vec(),
        };

        let auth_data = vec![0xaa; 37];
        let client_data_json = client_data(CLIENT_DATA_GET, "abc", "https://example.com");
        let mut message = auth_data.clone();
        message.extend_from_slice(&sha256(&client_data_json));
        let signature = key_pair.sign(&rng, &message).unwrap();

        verify_assertion_signature(&cose, &auth_data, &client_data_json, signature.as_ref())
            .unwrap();

        // Tampered authenticator data must fail
        let mut tampered = auth_data;
        tampered[0] ^= 0xff;
        assert!(verify_assertion_signature(
            &cose,
            &tampered,
            &client_data_json,
            signature.as_ref()
        )
        .is_err());
    }
}
