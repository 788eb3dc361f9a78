//! Ceremony engine
//!
//! Orchestrates the registration and authentication ceremonies: challenge
//! issuance and consumption, attestation/assertion verification, credential
//! persistence and audit emission. The engine is stateless between calls —
//! everything lives in the challenge store and the key repository, so
//! concurrent requests only interact through those records.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::cbor::{
    normalize_aaguid, parse_attestation_object, parse_authenticator_data, parse_cose_key,
};
use super::crypto::{
    sha256, verify_assertion_signature, verify_client_data, CLIENT_DATA_CREATE, CLIENT_DATA_GET,
};
use super::types::{
    AssertionResponse, AttestationResponse, AuthenticatorSelectionCriteria,
    CredentialCreationOptions, CredentialRequestOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, RegisteringUser, RelyingParty, UserEntity,
};
use crate::audit::{emit, AuditAction, AuditRecord, AuditSink};
use crate::error::Error;
use crate::keys::KeyService;
use crate::models::{Assignment, CeremonyType, Challenge, Credential, KeyStatus};
use crate::settings::VaultkeySettings;
use crate::storage::{ChallengeStore, KeyRepository};
use crate::utils::crypto::generate_serial_number;

/// Transports advertised in assertion allow-lists
const ALLOWED_TRANSPORTS: [&str; 3] = ["usb", "nfc", "ble"];

/// Successful authentication result
#[derive(Debug, Clone)]
pub struct AuthenticationOutcome {
    pub credential_id: String,
    /// Counter persisted after this authentication
    pub sign_count: u32,
    /// Set when the authenticator reported a stalled or decreased counter —
    /// a possible cloned-key signal. Authentication still succeeded; the
    /// operational response is a deployment decision.
    pub counter_warning: bool,
    pub authenticated_at: chrono::DateTime<Utc>,
}

/// WebAuthn ceremony engine
pub struct CeremonyEngine {
    rp_id: String,
    rp_name: String,
    origin: String,
    timeout_ms: u32,
    attestation: String,
    user_verification: String,
    authenticator_attachment: Option<String>,
    challenge_ttl: chrono::Duration,
    challenges: Arc<dyn ChallengeStore>,
    keys: Arc<dyn KeyRepository>,
    audit: Arc<dyn AuditSink>,
    assignments: KeyService,
}

impl std::fmt::Debug for CeremonyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyEngine")
            .field("rp_id", &self.rp_id)
            .field("rp_name", &self.rp_name)
            .field("origin", &self.origin)
            .field("timeout_ms", &self.timeout_ms)
            .field("attestation", &self.attestation)
            .field("user_verification", &self.user_verification)
            .field("authenticator_attachment", &self.authenticator_attachment)
            .field("challenge_ttl", &self.challenge_ttl)
            .finish_non_exhaustive()
    }
}

impl CeremonyEngine {
    /// Create an engine from deployment settings and store handles
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the relying party id is empty or
    /// the origin is not https (localhost excepted).
    pub fn new(
        settings: &VaultkeySettings,
        challenges: Arc<dyn ChallengeStore>,
        keys: Arc<dyn KeyRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, Error> {
        let rp = &settings.relying_party;
        if rp.id.is_empty() {
            return Err(Error::Configuration(
                "relying party id cannot be empty".into(),
            ));
        }
        if !rp.origin.starts_with("https://") && !rp.origin.starts_with("http://localhost") {
            return Err(Error::Configuration(
                "origin must be https:// except for localhost".into(),
            ));
        }

        let challenge_ttl = chrono::Duration::seconds(
            i64::try_from(settings.challenge.ttl_seconds).unwrap_or(i64::MAX),
        );

        Ok(Self {
            rp_id: rp.id.clone(),
            rp_name: rp.name.clone(),
            origin: rp.origin.clone(),
            timeout_ms: u32::try_from(rp.timeout_seconds * 1000).unwrap_or(u32::MAX),
            attestation: rp.attestation.clone(),
            user_verification: rp.user_verification.clone(),
            authenticator_attachment: rp.authenticator_attachment.clone(),
            challenge_ttl,
            challenges: Arc::clone(&challenges),
            keys: Arc::clone(&keys),
            audit: Arc::clone(&audit),
            assignments: KeyService::new(keys, audit),
        })
    }

    /// Start a registration ceremony for `user`
    ///
    /// Issues a Registration challenge (replacing any live one) and returns
    /// the creation options the client hands to its authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the challenge store is unreachable.
    pub async fn begin_registration(
        &self,
        user: &RegisteringUser,
    ) -> Result<CredentialCreationOptions, Error> {
        let challenge = self
            .challenges
            .issue(&user.id, CeremonyType::Registration)
            .await?;

        log::debug!("registration ceremony started for user {}", user.id);

        Ok(CredentialCreationOptions {
            challenge: challenge.value,
            rp: RelyingParty {
                id: self.rp_id.clone(),
                name: self.rp_name.clone(),
            },
            user: UserEntity {
                id: URL_SAFE_NO_PAD.encode(user.id.as_bytes()),
                name: user.name.clone(),
                display_name: user.display_name.clone(),
            },
            pub_key_cred_params: vec![
                // ES256 (ECDSA P-256 with SHA-256)
                PublicKeyCredentialParameters {
                    r#type: "public-key".to_string(),
                    alg: -7,
                },
                // RS256 (RSASSA-PKCS1-v1_5 with SHA-256)
                PublicKeyCredentialParameters {
                    r#type: "public-key".to_string(),
                    alg: -257,
                },
            ],
            timeout: self.timeout_ms,
            attestation: self.attestation.clone(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.authenticator_attachment.clone(),
                require_resident_key: false,
                user_verification: self.user_verification.clone(),
            },
        })
    }

    /// Complete a registration ceremony.
    ///
    /// Verifies the attestation against the live challenge, persists the new
    /// credential and immediately self-assigns it to the registering user —
    /// registration and initial assignment are one operation from the
    /// caller's point of view.
    ///
    /// # Errors
    ///
    /// - [`Error::ChallengeExpiredOrMissing`] — no live Registration
    ///   challenge, or the response was built over a superseded value
    /// - [`Error::MalformedAttestation`] — transport decoding failed
    /// - [`Error::AttestationVerificationFailed`] — origin, rp id or policy
    ///   mismatch
    /// - retryable [`Error::Conflict`] — generated serial number collided
    pub async fn complete_registration(
        &self,
        response: &AttestationResponse,
        user_ref: &str,
    ) -> Result<Credential, Error> {
        match self.try_complete_registration(response, user_ref).await {
            Ok(credential) => Ok(credential),
            Err(err) => {
                // Specific reason stays server-side; callers get the generic message
                log::warn!("registration failed for user {user_ref}: {err}");
                Err(err)
            }
        }
    }

    async fn try_complete_registration(
        &self,
        response: &AttestationResponse,
        user_ref: &str,
    ) -> Result<Credential, Error> {
        let challenge = self
            .live_challenge(user_ref, CeremonyType::Registration)
            .await?;

        // Decode every transport-encoded field before touching its contents
        decode_b64(&response.id, "id", Error::MalformedAttestation)?;
        let raw_id = decode_b64(&response.raw_id, "rawId", Error::MalformedAttestation)?;
        let client_data_json = decode_b64(
            &response.response.client_data_json,
            "clientDataJSON",
            Error::MalformedAttestation,
        )?;
        let attestation_object = decode_b64(
            &response.response.attestation_object,
            "attestationObject",
            Error::MalformedAttestation,
        )?;

        verify_client_data(
            &client_data_json,
            CLIENT_DATA_CREATE,
            &challenge.value,
            &self.origin,
            Error::MalformedAttestation,
            Error::AttestationVerificationFailed,
        )?;

        let attestation = parse_attestation_object(&attestation_object)?;
        let auth_data =
            parse_authenticator_data(&attestation.auth_data, Error::MalformedAttestation)?;

        if sha256(self.rp_id.as_bytes()) != auth_data.rp_id_hash {
            return Err(Error::AttestationVerificationFailed(
                "relying party id hash mismatch".into(),
            ));
        }
        // Factor policy "either": presence or verification is acceptable
        if !presence_policy_satisfied(&auth_data) {
            return Err(Error::AttestationVerificationFailed(
                "user presence not asserted".into(),
            ));
        }

        let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
            Error::AttestationVerificationFailed("no attested credential data".into())
        })?;
        if attested.credential_id != raw_id {
            return Err(Error::AttestationVerificationFailed(
                "credential id does not match attested data".into(),
            ));
        }
        // Rejects unsupported key types/algorithms up front
        parse_cose_key(&attested.public_key, Error::AttestationVerificationFailed)?;

        log::debug!(
            "attestation verified for user {user_ref} (fmt {})",
            attestation.fmt
        );

        let credential_id = URL_SAFE_NO_PAD.encode(&raw_id);
        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            serial_number: generate_serial_number(),
            credential_id: credential_id.clone(),
            public_key: attested.public_key.clone(),
            aaguid: normalize_aaguid(attested.aaguid),
            status: KeyStatus::Available,
            sign_count: auth_data.counter,
            current_assignment_id: None,
            user_handle: Some(credential_id),
            device_name: Some("Security Key".to_string()),
            notes: None,
            created_at: Utc::now(),
            last_used: None,
            revoked_at: None,
            revoked_by: None,
            version: 0,
        };

        let credential = self.keys.insert_credential(credential).await?;

        emit(
            self.audit.as_ref(),
            AuditRecord::new(
                AuditAction::KeyRegistered,
                user_ref,
                &credential.id,
                json!({
                    "credentialId": credential.credential_id,
                    "serialNumber": credential.serial_number,
                }),
            ),
        )
        .await;

        // Self-assignment: the registering user is both assignee and assigner
        self.assignments
            .assign_key(&credential.id, user_ref, user_ref)
            .await?;

        self.challenges
            .delete(user_ref, CeremonyType::Registration)
            .await?;

        self.keys
            .credential(&credential.id)
            .await?
            .ok_or_else(|| Error::Unavailable("credential vanished after registration".into()))
    }

    /// Start an authentication ceremony for `user_ref`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCredentialsAssigned`] when the user has no
    /// actively assigned keys.
    pub async fn begin_authentication(
        &self,
        user_ref: &str,
    ) -> Result<CredentialRequestOptions, Error> {
        let assignments = self.keys.active_assignments_for_user(user_ref).await?;
        if assignments.is_empty() {
            return Err(Error::NoCredentialsAssigned);
        }

        let mut allow_credentials = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let credential = self.keys.credential(&assignment.key_ref).await?;
            if let Some(credential) =
                credential.filter(|credential| credential.status == KeyStatus::Assigned)
            {
                allow_credentials.push(PublicKeyCredentialDescriptor {
                    r#type: "public-key".to_string(),
                    id: credential.credential_id,
                    transports: ALLOWED_TRANSPORTS.iter().map(ToString::to_string).collect(),
                });
            }
        }
        if allow_credentials.is_empty() {
            return Err(Error::NoCredentialsAssigned);
        }

        let challenge = self
            .challenges
            .issue(user_ref, CeremonyType::Authentication)
            .await?;

        log::debug!(
            "authentication ceremony started for user {user_ref} ({} allowed credentials)",
            allow_credentials.len()
        );

        Ok(CredentialRequestOptions {
            challenge: challenge.value,
            timeout: self.timeout_ms,
            rp_id: self.rp_id.clone(),
            allow_credentials,
            user_verification: self.user_verification.clone(),
        })
    }

    /// Complete an authentication ceremony.
    ///
    /// # Errors
    ///
    /// All failure reasons are specific internally (see [`Error`]); surface
    /// them to callers via [`Error::public_message`], which collapses every
    /// verification failure into a generic authentication failure.
    pub async fn complete_authentication(
        &self,
        response: &AssertionResponse,
        user_ref: &str,
    ) -> Result<AuthenticationOutcome, Error> {
        match self.try_complete_authentication(response, user_ref).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::warn!("authentication failed for user {user_ref}: {err}");
                Err(err)
            }
        }
    }

    async fn try_complete_authentication(
        &self,
        response: &AssertionResponse,
        user_ref: &str,
    ) -> Result<AuthenticationOutcome, Error> {
        let challenge = self
            .live_challenge(user_ref, CeremonyType::Authentication)
            .await?;

        // Resolve the asserted credential; only assigned keys may authenticate
        let raw_id = decode_b64(&response.raw_id, "rawId", Error::MalformedAssertion)?;
        let credential_id = URL_SAFE_NO_PAD.encode(&raw_id);
        let credential = self
            .keys
            .credential_by_credential_id(&credential_id)
            .await?
            .filter(|credential| credential.status == KeyStatus::Assigned)
            .ok_or(Error::CredentialNotFound)?;

        // Cross-user replay guard: the active assignment must belong to the
        // authenticating user
        let assignment_id = credential
            .current_assignment_id
            .as_deref()
            .ok_or(Error::CredentialNotFound)?;
        let assignment = self
            .keys
            .assignment(assignment_id)
            .await?
            .filter(Assignment::is_active)
            .ok_or_else(|| Error::Unavailable("active assignment record missing".into()))?;
        if assignment.user_ref != user_ref {
            return Err(Error::CredentialNotOwnedByUser);
        }

        let client_data_json = decode_b64(
            &response.response.client_data_json,
            "clientDataJSON",
            Error::MalformedAssertion,
        )?;
        let authenticator_data = decode_b64(
            &response.response.authenticator_data,
            "authenticatorData",
            Error::MalformedAssertion,
        )?;
        let signature = decode_b64(
            &response.response.signature,
            "signature",
            Error::MalformedAssertion,
        )?;

        verify_client_data(
            &client_data_json,
            CLIENT_DATA_GET,
            &challenge.value,
            &self.origin,
            Error::MalformedAssertion,
            Error::AssertionVerificationFailed,
        )?;

        let auth_data = parse_authenticator_data(&authenticator_data, Error::MalformedAssertion)?;
        if sha256(self.rp_id.as_bytes()) != auth_data.rp_id_hash {
            return Err(Error::AssertionVerificationFailed(
                "relying party id hash mismatch".into(),
            ));
        }
        if !presence_policy_satisfied(&auth_data) {
            return Err(Error::AssertionVerificationFailed(
                "user presence not asserted".into(),
            ));
        }

        // The stored key was validated at registration; an unparsable key now
        // means the record was corrupted, not that the caller failed
        let public_key = parse_cose_key(&credential.public_key, Error::Unavailable)?;
        verify_assertion_signature(
            &public_key,
            &authenticator_data,
            &client_data_json,
            &signature,
        )?;

        // Counter policy: the previous counter is supplied here and the new
        // value persisted below. A stall or decrease is a possible-clone
        // signal surfaced as a warning, not a hard failure; the stored
        // counter is never lowered.
        let reported = auth_data.counter;
        let stored = credential.sign_count;
        let counter_warning = if reported > stored {
            false
        } else if reported == 0 && stored == 0 {
            // Authenticator without a counter
            false
        } else {
            log::warn!(
                "possible cloned authenticator for credential {}: counter reported {reported}, stored {stored}",
                credential.id
            );
            true
        };

        let now = Utc::now();
        let mut updated = credential.clone();
        updated.sign_count = stored.max(reported);
        updated.last_used = Some(now);
        let updated = self.keys.update_credential(updated).await?;

        self.challenges
            .delete(user_ref, CeremonyType::Authentication)
            .await?;

        emit(
            self.audit.as_ref(),
            AuditRecord::new(
                AuditAction::KeyAuthenticated,
                user_ref,
                &updated.id,
                json!({
                    "credentialId": updated.credential_id,
                    "signCount": updated.sign_count,
                    "counterWarning": counter_warning,
                }),
            ),
        )
        .await;

        Ok(AuthenticationOutcome {
            credential_id: updated.credential_id,
            sign_count: updated.sign_count,
            counter_warning,
            authenticated_at: now,
        })
    }

    /// Fetch the live challenge, re-checking the TTL at use time — an
    /// expired entry must never verify even if the store has not swept it
    async fn live_challenge(
        &self,
        user_ref: &str,
        ceremony: CeremonyType,
    ) -> Result<Challenge, Error> {
        let challenge = self
            .challenges
            .lookup(user_ref, ceremony)
            .await?
            .ok_or(Error::ChallengeExpiredOrMissing)?;
        if challenge.is_expired(self.challenge_ttl) {
            self.challenges.delete(user_ref, ceremony).await?;
            return Err(Error::ChallengeExpiredOrMissing);
        }
        Ok(challenge)
    }
}

fn presence_policy_satisfied(auth_data: &super::cbor::AuthenticatorData) -> bool {
    auth_data.user_present() || auth_data.user_verified()
}

fn decode_b64(value: &str, field: &str, malformed: fn(String) -> Error) -> Result<Vec<u8>, Error> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| malformed(format!("invalid base64url in {field}")))
}
