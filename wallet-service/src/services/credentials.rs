//! Scoped API keys: issuance, rollover, validation and revocation.
//!
//! Secrets are only ever stored as salted Argon2id hashes, so validation
//! cannot look a key up by value. It compares the presented secret against
//! every unrevoked key instead, and that scan grows with the number of keys.

use std::str::FromStr;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Duration, Months, Utc};
use rand::RngCore;
use tracing::{info, instrument, warn};

use crate::config::Environment;
use crate::models::Credential;
use crate::services::error::WalletError;
use crate::services::metrics::CREDENTIAL_VALIDATIONS_TOTAL;
use crate::services::store::CredentialStore;

/// Active (unrevoked, unexpired) keys a user may hold when issuing another.
pub const MAX_ACTIVE_CREDENTIALS: u64 = 5;

/// Random bytes behind every secret, hex-encoded after the prefix.
const SECRET_BYTES: usize = 24;

/// Key lifetime from a compact token such as `30D` or `1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Hours(u32),
    Days(u32),
    Months(u32),
    Years(u32),
}

impl FromStr for Ttl {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = s.chars().last().ok_or(WalletError::InvalidDuration)?;
        let digits = &s[..s.len() - unit.len_utf8()];
        // `u32::from_str` alone would also take a leading `+`.
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::InvalidDuration);
        }
        let magnitude: u32 = digits.parse().map_err(|_| WalletError::InvalidDuration)?;
        if magnitude == 0 {
            return Err(WalletError::InvalidDuration);
        }

        match unit.to_ascii_uppercase() {
            'H' => Ok(Self::Hours(magnitude)),
            'D' => Ok(Self::Days(magnitude)),
            'M' => Ok(Self::Months(magnitude)),
            'Y' => Ok(Self::Years(magnitude)),
            _ => Err(WalletError::InvalidDuration),
        }
    }
}

impl Ttl {
    /// Calendar-aware expiry: months and years keep the day of month,
    /// clamped to the last day when the target month is shorter.
    pub fn expires_from(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, WalletError> {
        let expiry = match *self {
            Self::Hours(n) => from.checked_add_signed(Duration::hours(i64::from(n))),
            Self::Days(n) => from.checked_add_signed(Duration::days(i64::from(n))),
            Self::Months(n) => from.checked_add_months(Months::new(n)),
            Self::Years(n) => n
                .checked_mul(12)
                .and_then(|months| from.checked_add_months(Months::new(months))),
        };
        expiry.ok_or(WalletError::InvalidDuration)
    }
}

/// Argon2id hashing for API key secrets.
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl SecretHasher {
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, anyhow::Error> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// PHC string with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash API key: {}", e))?;
        Ok(hash.to_string())
    }

    /// Constant-time verification; a malformed hash never matches.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// A freshly minted key. The only place the plaintext secret ever appears.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub id: String,
    pub api_key: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Trim, lower-case and de-duplicate, keeping first-seen order.
fn normalize_capabilities(capabilities: &[String]) -> Result<Vec<String>, WalletError> {
    let mut normalized: Vec<String> = Vec::with_capacity(capabilities.len());
    for capability in capabilities {
        let capability = capability.trim().to_ascii_lowercase();
        if capability.is_empty() {
            return Err(WalletError::Validation(
                "permissions must not contain empty names".into(),
            ));
        }
        if !normalized.contains(&capability) {
            normalized.push(capability);
        }
    }
    if normalized.is_empty() {
        return Err(WalletError::Validation(
            "at least one permission is required".into(),
        ));
    }
    Ok(normalized)
}

fn generate_secret(prefix: &str) -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{}{}", prefix, hex::encode(bytes))
}

#[derive(Clone)]
pub struct CredentialAuthority {
    store: Arc<dyn CredentialStore>,
    hasher: SecretHasher,
    environment: Environment,
}

impl CredentialAuthority {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: SecretHasher,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            hasher,
            environment,
        }
    }

    /// Mint a new key for `user_id`.
    #[instrument(skip(self, capabilities), fields(user_id = %user_id))]
    pub async fn issue(
        &self,
        user_id: &str,
        name: &str,
        capabilities: &[String],
        ttl: &str,
    ) -> Result<IssuedCredential, WalletError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::Validation("name must not be empty".into()));
        }
        let capabilities = normalize_capabilities(capabilities)?;
        let ttl: Ttl = ttl.parse()?;
        let now = Utc::now();
        let expires_at = ttl.expires_from(now)?;

        self.mint(user_id, name.to_string(), capabilities, expires_at, now)
            .await
    }

    /// Replace an expired key with a new one carrying its name and
    /// capabilities. The old key is left as it is. A revoked key stays
    /// revoked and cannot be rolled over.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn rollover(
        &self,
        user_id: &str,
        expired_key_id: &str,
        ttl: &str,
    ) -> Result<IssuedCredential, WalletError> {
        let ttl: Ttl = ttl.parse()?;
        let old = self
            .store
            .find_credential(user_id, expired_key_id)
            .await?
            .filter(|credential| !credential.revoked)
            .ok_or(WalletError::NotFound("API key"))?;

        let now = Utc::now();
        if !old.is_expired(now) {
            return Err(WalletError::NotExpired);
        }
        let expires_at = ttl.expires_from(now)?;

        self.mint(user_id, old.name, old.capabilities, expires_at, now)
            .await
    }

    async fn mint(
        &self,
        user_id: &str,
        name: String,
        capabilities: Vec<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, WalletError> {
        // Skip hashing when the quota is already visibly full. The insert
        // below re-checks atomically.
        let active = self.store.count_active_credentials(user_id, now).await?;
        if active >= MAX_ACTIVE_CREDENTIALS {
            return Err(WalletError::QuotaExceeded);
        }

        let api_key = generate_secret(self.environment.api_key_prefix());
        let hasher = self.hasher.clone();
        let secret = api_key.clone();
        let key_hash = tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| WalletError::Storage(anyhow::Error::new(e)))?
            .map_err(WalletError::Storage)?;

        let credential = Credential::new(user_id, key_hash, name, capabilities, expires_at);
        if !self
            .store
            .insert_within_quota(&credential, MAX_ACTIVE_CREDENTIALS, now)
            .await?
        {
            return Err(WalletError::QuotaExceeded);
        }

        info!(
            credential_id = %credential.id,
            expires_at = %credential.expires_at,
            "API key issued"
        );

        Ok(IssuedCredential {
            id: credential.id,
            api_key,
            name: credential.name,
            capabilities: credential.capabilities,
            expires_at: credential.expires_at,
        })
    }

    /// Resolve a presented secret to its credential.
    ///
    /// Every unrevoked candidate is checked, even after a match, so timing
    /// does not reveal where in the set the key sits. An expired match
    /// resolves to `None`. A live match has its last-used time updated.
    pub async fn validate(&self, presented: &str) -> Result<Option<Credential>, WalletError> {
        if !presented.starts_with(Environment::Prod.api_key_prefix())
            && !presented.starts_with(Environment::Dev.api_key_prefix())
        {
            CREDENTIAL_VALIDATIONS_TOTAL
                .with_label_values(&["malformed"])
                .inc();
            return Ok(None);
        }

        let candidates = self.store.list_unrevoked_credentials().await?;
        let hasher = self.hasher.clone();
        let secret = presented.to_string();
        let matched = tokio::task::spawn_blocking(move || {
            let mut matched = None;
            for candidate in candidates {
                let is_match = hasher.verify(&secret, &candidate.key_hash);
                if is_match && matched.is_none() {
                    matched = Some(candidate);
                }
            }
            matched
        })
        .await
        .map_err(|e| WalletError::Storage(anyhow::Error::new(e)))?;

        let Some(credential) = matched else {
            CREDENTIAL_VALIDATIONS_TOTAL
                .with_label_values(&["unknown"])
                .inc();
            return Ok(None);
        };

        let now = Utc::now();
        if credential.is_expired(now) {
            warn!(credential_id = %credential.id, "Expired API key presented");
            CREDENTIAL_VALIDATIONS_TOTAL
                .with_label_values(&["expired"])
                .inc();
            return Ok(None);
        }

        self.store.touch_credential(&credential.id, now).await?;
        CREDENTIAL_VALIDATIONS_TOTAL
            .with_label_values(&["valid"])
            .inc();
        Ok(Some(credential))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn revoke(&self, user_id: &str, credential_id: &str) -> Result<(), WalletError> {
        if !self.store.revoke_credential(user_id, credential_id).await? {
            return Err(WalletError::NotFound("API key"));
        }
        info!(credential_id = %credential_id, "API key revoked");
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Credential>, WalletError> {
        Ok(self.store.list_credentials(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_duration_tokens() {
        assert_eq!("1H".parse::<Ttl>().unwrap(), Ttl::Hours(1));
        assert_eq!("30d".parse::<Ttl>().unwrap(), Ttl::Days(30));
        assert_eq!("6M".parse::<Ttl>().unwrap(), Ttl::Months(6));
        assert_eq!(" 2y ".parse::<Ttl>().unwrap(), Ttl::Years(2));
    }

    #[test]
    fn rejects_malformed_duration_tokens() {
        for token in ["", "D", "10", "1W", "0D", "-1D", "+5D", "1 D", "1.5H", "xD", "1DD"] {
            assert!(
                matches!(token.parse::<Ttl>(), Err(WalletError::InvalidDuration)),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn month_arithmetic_clamps_to_month_end() {
        let jan_31 = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let expiry = Ttl::Months(1).expires_from(jan_31).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());

        let expiry = Ttl::Years(1).expires_from(jan_31).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap());

        let expiry = Ttl::Hours(36).expires_from(jan_31).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn secrets_carry_prefix_and_hex_body() {
        let secret = generate_secret("sk_test_");
        let body = secret.strip_prefix("sk_test_").unwrap();
        assert_eq!(body.len(), SECRET_BYTES * 2);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret("sk_test_"));
    }

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let hasher = SecretHasher::new(8, 1).unwrap();
        let first = hasher.hash("sk_test_abc").unwrap();
        let second = hasher.hash("sk_test_abc").unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
        assert!(hasher.verify("sk_test_abc", &first));
        assert!(!hasher.verify("sk_test_abd", &first));
        assert!(!hasher.verify("sk_test_abc", "not-a-phc-string"));
    }

    #[test]
    fn capabilities_are_normalized() {
        let normalized = normalize_capabilities(&[
            " Read ".to_string(),
            "TRANSFER".to_string(),
            "read".to_string(),
        ])
        .unwrap();
        assert_eq!(normalized, vec!["read", "transfer"]);

        assert!(normalize_capabilities(&[]).is_err());
        assert!(normalize_capabilities(&["  ".to_string()]).is_err());
    }
}
