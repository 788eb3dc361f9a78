//! WebAuthn wire structures
//!
//! Field names and binary encodings follow the standard WebAuthn JSON
//! serialization: camelCase names, `clientDataJSON` spelled exactly, and
//! every binary field base64url-encoded without padding.

use serde::{Deserialize, Serialize};

/// Identity fields the options structures need from the external user record
#[derive(Debug, Clone)]
pub struct RegisteringUser {
    /// Opaque user reference
    pub id: String,
    /// Account name, typically the email address
    pub name: String,
    pub display_name: String,
}

/// Registration (attestation) options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    /// Base64url-encoded random challenge
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    /// Timeout in milliseconds
    pub timeout: u32,
    /// "none", "indirect", "direct"
    pub attestation: String,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
}

/// Authentication (assertion) options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestOptions {
    /// Base64url-encoded random challenge
    pub challenge: String,
    /// Timeout in milliseconds
    pub timeout: u32,
    pub rp_id: String,
    /// Exactly the credentials actively assigned to the user
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    /// "required", "preferred", "discouraged"
    pub user_verification: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RelyingParty {
    /// Effective domain (e.g. "example.com")
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Base64url-encoded user handle
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialParameters {
    /// Always "public-key"
    pub r#type: String,
    /// COSE algorithm identifier (-7 ES256, -257 RS256)
    pub alg: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialDescriptor {
    /// Always "public-key"
    pub r#type: String,
    /// Base64url-encoded credential id
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transports: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    pub require_resident_key: bool,
    pub user_verification: String,
}

/// Attestation response returned by the client at registration completion
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    /// Base64url-encoded credential id
    pub id: String,
    /// Base64url-encoded raw credential id
    pub raw_id: String,
    pub response: AuthenticatorAttestationResponse,
    /// Always "public-key"
    pub r#type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
}

/// Assertion response returned by the client at authentication completion
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    /// Base64url-encoded credential id
    pub id: String,
    /// Base64url-encoded raw credential id
    pub raw_id: String,
    pub response: AuthenticatorAssertionResponse,
    /// Always "public-key"
    pub r#type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}
