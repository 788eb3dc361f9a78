//! CBOR and authenticator-data decoding
//!
//! Handles the binary formats crossing the trust boundary during ceremonies:
//! the CBOR attestation object, the packed authenticator-data structure and
//! the COSE public key embedded in attested credential data. All input here
//! is untrusted; every decode error maps to a `Malformed*` error.

use ciborium::de::from_reader;
use ciborium::value::Value;

use crate::error::Error;

/// Authenticator data flag: user present
pub const FLAG_USER_PRESENT: u8 = 0x01;
/// Authenticator data flag: user verified
pub const FLAG_USER_VERIFIED: u8 = 0x04;
/// Authenticator data flag: attested credential data included
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// Parsed attestation object
#[derive(Debug)]
pub struct AttestationObject {
    /// Attestation statement format ("none", "packed", ...)
    pub fmt: String,
    /// Raw authenticator data bytes
    pub auth_data: Vec<u8>,
}

/// Parsed authenticator data
#[derive(Debug)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested_credential: Option<AttestedCredential>,
}

/// Attested credential data, present at registration
#[derive(Debug)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE-encoded credential public key
    pub public_key: Vec<u8>,
}

impl AuthenticatorData {
    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }
}

/// Parse a decoded attestation object (CBOR map with `fmt`, `attStmt` and
/// `authData` entries)
///
/// # Errors
///
/// Returns [`Error::MalformedAttestation`] when the CBOR structure is not
/// the expected map shape.
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, Error> {
    let attestation: Value = from_reader(bytes)
        .map_err(|_| Error::MalformedAttestation("invalid CBOR attestation object".into()))?;

    let map = attestation
        .as_map()
        .ok_or_else(|| Error::MalformedAttestation("attestation object is not a map".into()))?;

    let fmt = map
        .iter()
        .find(|(k, _)| k.as_text() == Some("fmt"))
        .and_then(|(_, v)| v.as_text())
        .ok_or_else(|| Error::MalformedAttestation("missing fmt in attestation".into()))?
        .to_string();

    let auth_data = map
        .iter()
        .find(|(k, _)| k.as_text() == Some("authData"))
        .and_then(|(_, v)| v.as_bytes())
        .ok_or_else(|| Error::MalformedAttestation("missing authData in attestation".into()))?
        .clone();

    Ok(AttestationObject { fmt, auth_data })
}

/// Parse packed authenticator data.
///
/// Layout:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags
/// - 4 bytes: signature counter (big endian)
/// - if the AT flag is set, attested credential data:
///   - 16 bytes: AAGUID
///   - 2 bytes: credential ID length (L)
///   - L bytes: credential ID
///   - remaining: COSE public key
///
/// # Errors
///
/// Returns the error built by `malformed` when the data is truncated.
pub fn parse_authenticator_data(
    bytes: &[u8],
    malformed: fn(String) -> Error,
) -> Result<AuthenticatorData, Error> {
    if bytes.len() < 37 {
        return Err(malformed("authenticator data too short".into()));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&bytes[..32]);
    let flags = bytes[32];
    let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

    let attested_credential = if flags & FLAG_ATTESTED_CREDENTIAL_DATA == 0 {
        None
    } else {
        let mut pos = 37;
        if bytes.len() < pos + 18 {
            return Err(malformed("authenticator data truncated at aaguid".into()));
        }
        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&bytes[pos..pos + 16]);
        pos += 16;

        let id_len = (usize::from(bytes[pos]) << 8) | usize::from(bytes[pos + 1]);
        pos += 2;
        if bytes.len() < pos + id_len {
            return Err(malformed(
                "authenticator data truncated at credential id".into(),
            ));
        }
        let credential_id = bytes[pos..pos + id_len].to_vec();
        pos += id_len;

        if bytes.len() <= pos {
            return Err(malformed(
                "authenticator data truncated at public key".into(),
            ));
        }
        let public_key = bytes[pos..].to_vec();

        Some(AttestedCredential {
            aaguid,
            credential_id,
            public_key,
        })
    };

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        counter,
        attested_credential,
    })
}

/// Credential public key material extracted from a COSE key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// EC2 key on P-256 with ES256 (COSE alg -7)
    Ec2 { x: Vec<u8>, y: Vec<u8> },
    /// RSA key with RS256 (COSE alg -257)
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

fn map_get<'a>(map: &'a [(Value, Value)], label: i64) -> Option<&'a Value> {
    let key = Value::Integer(label.into());
    map.iter().find(|(k, _)| k == &key).map(|(_, v)| v)
}

fn map_get_bytes(map: &[(Value, Value)], label: i64) -> Option<Vec<u8>> {
    match map_get(map, label) {
        Some(Value::Bytes(bytes)) => Some(bytes.clone()),
        _ => None,
    }
}

/// Parse a COSE public key, accepting only the algorithms advertised in the
/// creation options (ES256, RS256)
///
/// # Errors
///
/// Returns the error built by `malformed` for undecodable input or an
/// unsupported key type/algorithm.
pub fn parse_cose_key(bytes: &[u8], malformed: fn(String) -> Error) -> Result<CoseKey, Error> {
    let value: Value =
        from_reader(bytes).map_err(|_| malformed("invalid COSE key encoding".into()))?;
    let Value::Map(map) = value else {
        return Err(malformed("COSE key is not a map".into()));
    };

    // kty (label 1): 2 = EC2, 3 = RSA
    let kty = match map_get(&map, 1) {
        Some(Value::Integer(i)) => i128::from(*i),
        _ => return Err(malformed("missing COSE key type".into())),
    };
    // alg (label 3) must match the key type when present
    let alg = match map_get(&map, 3) {
        Some(Value::Integer(i)) => Some(i128::from(*i)),
        _ => None,
    };

    match kty {
        2 => {
            if alg.is_some_and(|alg| alg != -7) {
                return Err(malformed("unsupported EC2 algorithm".into()));
            }
            let x = map_get_bytes(&map, -2)
                .ok_or_else(|| malformed("missing EC2 x coordinate".into()))?;
            let y = map_get_bytes(&map, -3)
                .ok_or_else(|| malformed("missing EC2 y coordinate".into()))?;
            Ok(CoseKey::Ec2 { x, y })
        }
        3 => {
            if alg.is_some_and(|alg| alg != -257) {
                return Err(malformed("unsupported RSA algorithm".into()));
            }
            let n = map_get_bytes(&map, -1)
                .ok_or_else(|| malformed("missing RSA modulus".into()))?;
            let e = map_get_bytes(&map, -2)
                .ok_or_else(|| malformed("missing RSA exponent".into()))?;
            Ok(CoseKey::Rsa { n, e })
        }
        _ => Err(malformed("unsupported COSE key type".into())),
    }
}

/// Normalize an AAGUID to its lowercase hex representation.
///
/// An all-zero AAGUID carries no model information and maps to `None`.
#[must_use]
pub fn normalize_aaguid(aaguid: [u8; 16]) -> Option<String> {
    if aaguid.iter().all(|&b| b == 0) {
        None
    } else {
        Some(hex::encode(aaguid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::ser::into_writer;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        into_writer(value, &mut out).unwrap();
        out
    }

    fn sample_auth_data(flags: u8, counter: u32, attested: bool) -> Vec<u8> {
        let mut data = vec![0xab; 32];
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        if attested {
            data.extend_from_slice(&[0x11; 16]); // aaguid
            let credential_id = [0x22; 20];
            data.extend_from_slice(&u16::try_from(credential_id.len()).unwrap().to_be_bytes());
            data.extend_from_slice(&credential_id);
            let cose = Value::Map(vec![
                (Value::Integer(1.into()), Value::Integer(2.into())),
                (Value::Integer(3.into()), Value::Integer((-7).into())),
                (Value::Integer((-1).into()), Value::Integer(1.into())),
                (Value::Integer((-2).into()), Value::Bytes(vec![0x33; 32])),
                (Value::Integer((-3).into()), Value::Bytes(vec![0x44; 32])),
            ]);
            data.extend_from_slice(&encode(&cose));
        }
        data
    }

    #[test]
    fn attestation_object_round_trip() {
        let auth_data = sample_auth_data(0x41, 7, true);
        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (
                Value::Text("authData".into()),
                Value::Bytes(auth_data.clone()),
            ),
        ]);

        let parsed = parse_attestation_object(&encode(&object)).unwrap();
        assert_eq!(parsed.fmt, "none");
        assert_eq!(parsed.auth_data, auth_data);
    }

    #[test]
    fn attestation_object_rejects_non_cbor() {
        assert!(parse_attestation_object(b"not cbor").is_err());
    }

    #[test]
    fn authenticator_data_parses_attested_credential() {
        let bytes = sample_auth_data(0x45, 7, true);
        let parsed = parse_authenticator_data(&bytes, Error::MalformedAttestation).unwrap();
        assert_eq!(parsed.counter, 7);
        assert!(parsed.user_present());
        assert!(parsed.user_verified());
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.aaguid, [0x11; 16]);
        assert_eq!(attested.credential_id, vec![0x22; 20]);

        let key = parse_cose_key(&attested.public_key, Error::MalformedAttestation).unwrap();
        assert_eq!(
            key,
            CoseKey::Ec2 {
                x: vec![0x33; 32],
                y: vec![0x44; 32],
            }
        );
    }

    #[test]
    fn authenticator_data_without_at_flag_has_no_credential() {
        let bytes = sample_auth_data(0x01, 3, false);
        let parsed = parse_authenticator_data(&bytes, Error::MalformedAssertion).unwrap();
        assert!(parsed.attested_credential.is_none());
        assert!(!parsed.user_verified());
    }

    #[test]
    fn truncated_authenticator_data_is_malformed() {
        let err = parse_authenticator_data(&[0u8; 10], Error::MalformedAssertion).unwrap_err();
        assert!(matches!(err, Error::MalformedAssertion(_)));

        let mut truncated = sample_auth_data(0x41, 1, true);
        truncated.truncate(40);
        assert!(parse_authenticator_data(&truncated, Error::MalformedAttestation).is_err());
    }

    #[test]
    fn cose_key_rejects_unknown_type() {
        let okp = Value::Map(vec![(Value::Integer(1.into()), Value::Integer(1.into()))]);
        let err = parse_cose_key(&encode(&okp), Error::MalformedAttestation).unwrap_err();
        assert!(matches!(err, Error::MalformedAttestation(_)));
    }

    #[test]
    fn cose_key_parses_rsa() {
        let rsa = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Integer(3.into()), Value::Integer((-257).into())),
            (Value::Integer((-1).into()), Value::Bytes(vec![0x55; 256])),
            (
                Value::Integer((-2).into()),
                Value::Bytes(vec![0x01, 0x00, 0x01]),
            ),
        ]);
        let key = parse_cose_key(&encode(&rsa), Error::MalformedAttestation).unwrap();
        assert!(matches!(key, CoseKey::Rsa { .. }));
    }

    #[test]
    fn zero_aaguid_normalizes_to_none() {
        assert_eq!(normalize_aaguid([0u8; 16]), None);
        let aaguid = normalize_aaguid([0xf8; 16]).unwrap();
        assert_eq!(aaguid, "f8".repeat(16));
    }
}
