//! [`CryptoEngine`]: turns plaintext into versioned ciphertext and back.
//!
//! # Dispatch
//!
//! | tag | encrypt | decrypt | key |
//! |---|---|---|---|
//! | `pt` | only without a secret provider | lenient base64 | none |
//! | `2` | default with a provider | AES-256-GCM, base64 | PBKDF2-SHA512 or raw key |
//! | `1` | never | AES-256-GCM, hex | PBKDF2-SHA512 or raw key |
//! | `c<base64(name)>` | when a custom config is current | custom cipher | integrator |
//!
//! The engine holds no mutable cryptographic state; `encrypt` and `decrypt`
//! may run concurrently on one instance.

pub mod tag;

pub use tag::VersionTag;

use common::error::Result;
use common::protocol::{Encrypted, SecretRecord};
use common::CryptError;
use futures::future::join_all;
use tracing::{debug, instrument};

use crate::crypto::cipher::{self, random_iv, random_salt, CipherError, SealedPayload};
use crate::crypto::encoding::{decode_base64, decode_base64_lenient, decode_hex, encode_base64};
use crate::crypto::kdf::derive_key;
use crate::custom::{CustomEncryptionConfig, CustomEncryptionRegistry};
use crate::secrets::SecretProvider;
use tag::{split_message, CURRENT_TAG, PLAIN_TAG, SEPARATOR};

/// Secret version reported for plaintext passthrough.
const PLAIN_SECRET_VERSION: u32 = 0;

/// The encryption engine.
///
/// Cheap to clone: the provider and the registry are shared.
#[derive(Clone, Debug, Default)]
pub struct CryptoEngine {
    provider: Option<SecretProvider>,
    registry: CustomEncryptionRegistry,
}

/// Builder for [`CryptoEngine`].
#[derive(Debug, Default)]
pub struct CryptoEngineBuilder {
    provider: Option<SecretProvider>,
    custom: Option<Vec<CustomEncryptionConfig>>,
}

impl CryptoEngineBuilder {
    /// Enable encryption with secrets from `provider`.
    pub fn secret_provider(mut self, provider: SecretProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register custom ciphers.
    pub fn custom_encryption(mut self, configs: Vec<CustomEncryptionConfig>) -> Self {
        self.custom = Some(configs);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`CryptError::ConfigValidation`] if the custom configs are malformed.
    pub fn build(self) -> Result<CryptoEngine> {
        let registry = match self.custom {
            Some(configs) => CustomEncryptionRegistry::from_configs(configs)?,
            None => CustomEncryptionRegistry::new(),
        };
        Ok(CryptoEngine {
            provider: self.provider,
            registry,
        })
    }
}

impl CryptoEngine {
    /// An engine without custom ciphers. `None` means plaintext passthrough.
    pub fn new(provider: Option<SecretProvider>) -> Self {
        Self {
            provider,
            registry: CustomEncryptionRegistry::new(),
        }
    }

    /// Start a [`CryptoEngineBuilder`].
    pub fn builder() -> CryptoEngineBuilder {
        CryptoEngineBuilder::default()
    }

    /// Whether a secret provider is configured.
    pub fn encryption_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// The custom cipher registry.
    pub fn custom_registry(&self) -> &CustomEncryptionRegistry {
        &self.registry
    }

    /// Replace every registered custom cipher at once.
    pub fn set_custom_encryption(&self, configs: Vec<CustomEncryptionConfig>) -> Result<()> {
        self.registry.register(configs)
    }

    /// An engine whose provider serves one fetched snapshot of the secrets.
    ///
    /// The registry is shared with `self`.
    pub async fn pinned(&self) -> Result<CryptoEngine> {
        let provider = match &self.provider {
            Some(p) => Some(p.snapshot().await?),
            None => None,
        };
        Ok(CryptoEngine {
            provider,
            registry: self.registry.clone(),
        })
    }

    /// Encrypt `plaintext` with the current secret.
    ///
    /// # Errors
    ///
    /// Secret resolution errors, or [`CryptError::Crypto`] if the current
    /// custom cipher misbehaves.
    #[instrument(level = "debug", skip_all)]
    pub async fn encrypt(&self, plaintext: &str) -> Result<Encrypted> {
        let Some(provider) = &self.provider else {
            return Ok(Encrypted {
                message: format!("{PLAIN_TAG}{SEPARATOR}{}", encode_base64(plaintext.as_bytes())),
                secret_version: PLAIN_SECRET_VERSION,
            });
        };

        let secret = provider.get_secret(None).await?;

        if let Some(config) = self.registry.current_config() {
            let payload = config.guarded_encrypt(plaintext, &secret).await?;
            debug!(version = %config.version, secret_version = secret.version, "custom encrypt");
            return Ok(Encrypted {
                message: format!("{}{SEPARATOR}{payload}", config.tag()),
                secret_version: secret.version,
            });
        }

        let salt = random_salt();
        let key = derive_key(&secret, &salt).await?;
        let sealed = cipher::seal(plaintext.as_bytes(), &key, salt, random_iv())?;
        debug!(secret_version = secret.version, "encrypt");
        Ok(Encrypted {
            message: format!("{CURRENT_TAG}{SEPARATOR}{}", encode_base64(&sealed.to_bytes())),
            secret_version: secret.version,
        })
    }

    /// Decrypt a message produced by [`CryptoEngine::encrypt`].
    ///
    /// `secret_version` selects the secret; `None` means the current one.
    ///
    /// # Errors
    ///
    /// [`CryptError::Crypto`] for malformed messages, unknown tags, failed
    /// authentication, or a missing provider; secret resolution errors otherwise.
    #[instrument(level = "debug", skip_all)]
    pub async fn decrypt(&self, message: &str, secret_version: Option<u32>) -> Result<String> {
        let (tag, payload) =
            split_message(message).ok_or_else(|| CryptError::Crypto("Invalid ciphertext".into()))?;

        if tag == VersionTag::Plain {
            return Ok(decode_plain(payload));
        }

        let provider = self.provider.as_ref().ok_or_else(|| {
            CryptError::Crypto(format!(
                "Cannot decrypt '{tag}' ciphertext without a secret provider"
            ))
        })?;
        let secret = provider.get_secret(secret_version).await?;
        debug!(tag = %tag, secret_version = secret.version, "decrypt");

        match tag {
            VersionTag::Legacy => open_builtin(&decode_hex(payload)?, &secret).await,
            VersionTag::Current => open_builtin(&decode_base64(payload)?, &secret).await,
            VersionTag::Other(raw) => match self.registry.lookup(raw) {
                Some(config) => config.guarded_decrypt(payload, &secret).await,
                None => Err(CryptError::Crypto(format!(
                    "Unknown decryptor version requested: {raw}"
                ))),
            },
            VersionTag::Plain => Ok(decode_plain(payload)),
        }
    }

    /// Version of the secret new writes use.
    ///
    /// # Errors
    ///
    /// [`CryptError::Crypto`] if no provider is configured.
    pub async fn get_current_secret_version(&self) -> Result<u32> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| CryptError::Crypto("No secret provider configured".into()))?;
        Ok(provider.get_secret(None).await?.version)
    }

    /// Fail fast on bad secrets or broken custom ciphers.
    pub async fn validate(&self) -> Result<()> {
        match &self.provider {
            Some(provider) => {
                provider.validate().await?;
                if !self.registry.is_empty() {
                    self.registry.validate_round_trip(provider).await?;
                }
                Ok(())
            }
            None if !self.registry.is_empty() => Err(CryptError::Crypto(
                "Custom encryption not supported without a secret provider".into(),
            )),
            None => Ok(()),
        }
    }

    /// Encrypt every item concurrently; results keep input order.
    pub async fn encrypt_many<S: AsRef<str>>(&self, plaintexts: &[S]) -> Vec<Result<Encrypted>> {
        join_all(plaintexts.iter().map(|p| self.encrypt(p.as_ref()))).await
    }

    /// Decrypt every `(message, secret_version)` concurrently; results keep input order.
    pub async fn decrypt_many<S: AsRef<str>>(
        &self,
        messages: &[(S, Option<u32>)],
    ) -> Vec<Result<String>> {
        join_all(
            messages
                .iter()
                .map(|(m, v)| self.decrypt(m.as_ref(), *v)),
        )
        .await
    }
}

/// `pt` payloads decode leniently and never fail.
fn decode_plain(payload: &str) -> String {
    String::from_utf8_lossy(&decode_base64_lenient(payload)).into_owned()
}

async fn open_builtin(bytes: &[u8], secret: &SecretRecord) -> Result<String> {
    let sealed = SealedPayload::from_bytes(bytes)?;
    let key = derive_key(secret, &sealed.salt).await?;
    let plaintext = cipher::open(&sealed, &key)?;
    String::from_utf8(plaintext)
        .map_err(|_| CipherError::InvalidEncoding("plaintext is not valid UTF-8".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::testing::*;
    use crate::custom::pack_tag;
    use crate::secrets::SecretsData;
    use common::protocol::{SecretCollection, SecretRole};
    use common::BoxError;
    use std::sync::Arc;

    const GOLDEN_V2: &str = "2:AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7PD0+P6WlpaWlpaWlpaWlpS6sfR8UTnHt7BbZqjV6XSGl+8SkR2bJ0lU=";
    const GOLDEN_V1: &str = "1:11111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111000102030405060708090a0b4668937a2659a4b0111b12581d94cc10e41936ca71f84e2351b659fad9cf90618c3d";
    const GOLDEN_RAW_KEY_V2: &str = "2:AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7PD0+P6WlpaWlpaWlpaWlpVMm64BZ+VGpWM3ajsdCE8UWKDon7tjtSW7IGUsygGA=";
    const RAW_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn password_engine() -> CryptoEngine {
        CryptoEngine::new(Some(SecretProvider::from_static(SecretCollection::new(
            vec![SecretRecord::new(0, "password", SecretRole::Generic)],
            0,
        ))))
    }

    fn rotated_provider() -> SecretProvider {
        SecretProvider::from_static(SecretCollection::new(
            vec![
                SecretRecord::new(0, "password", SecretRole::Generic),
                SecretRecord::new(1, "supersecret", SecretRole::Generic),
                SecretRecord::new(2, RAW_KEY, SecretRole::RawKey),
                SecretRecord::new(3, "custom-key", SecretRole::CustomEncryptionKey),
            ],
            1,
        ))
    }

    fn custom_engine(current_secret: u32) -> CryptoEngine {
        let provider = SecretProvider::from_static(SecretCollection::new(
            vec![
                SecretRecord::new(0, "password", SecretRole::Generic),
                SecretRecord::new(3, "custom-key", SecretRole::CustomEncryptionKey),
            ],
            current_secret,
        ));
        CryptoEngine::builder()
            .secret_provider(provider)
            .custom_encryption(vec![CustomEncryptionConfig::new("rev", ReverseCipher, true)])
            .build()
            .unwrap()
    }

    fn flip_payload_byte(message: &str, index: usize) -> String {
        let (_, payload) = message.split_once(':').unwrap();
        let mut bytes = decode_base64(payload).unwrap();
        bytes[index] ^= 0x01;
        format!("2:{}", encode_base64(&bytes))
    }

    #[tokio::test]
    async fn password_scenario() {
        let engine = password_engine();
        let enc = engine.encrypt("InCountry").await.unwrap();
        assert!(enc.message.starts_with("2:"));
        assert_eq!(enc.secret_version, 0);
        assert_eq!(engine.decrypt(&enc.message, Some(0)).await.unwrap(), "InCountry");
    }

    #[tokio::test]
    async fn no_provider_is_plaintext_passthrough() {
        let engine = CryptoEngine::new(None);
        let enc = engine.encrypt("").await.unwrap();
        assert_eq!(enc.message, "pt:");
        assert_eq!(enc.secret_version, 0);
        assert_eq!(engine.decrypt(&enc.message, None).await.unwrap(), "");

        let enc = engine.encrypt("InCountry").await.unwrap();
        assert_eq!(enc.message, "pt:SW5Db3VudHJ5");
        assert!(!engine.encryption_enabled());
    }

    #[tokio::test]
    async fn plaintext_tag_never_touches_provider() {
        let provider = SecretProvider::from_fn(|| async {
            Err::<SecretsData, BoxError>("must not be called".into())
        });
        let engine = CryptoEngine::new(Some(provider));
        assert_eq!(engine.decrypt("pt:SW5Db3VudHJ5", None).await.unwrap(), "InCountry");
        // Lenient: garbage still decodes to something.
        assert!(engine.decrypt("pt:@@@", None).await.is_ok());
    }

    #[tokio::test]
    async fn round_trips_in_every_mode() {
        let inputs = ["", "InCountry", "Ünïcödé ✓ 漢字 🚀", "with:colons:inside"];
        let engines = [CryptoEngine::new(None), password_engine(), custom_engine(3)];
        for engine in &engines {
            for input in inputs {
                let enc = engine.encrypt(input).await.unwrap();
                let out = engine.decrypt(&enc.message, Some(enc.secret_version)).await.unwrap();
                assert_eq!(out, input);
            }
        }
    }

    #[tokio::test]
    async fn golden_v2_password() {
        let engine = password_engine();
        assert_eq!(engine.decrypt(GOLDEN_V2, Some(0)).await.unwrap(), "InCountry");
    }

    #[tokio::test]
    async fn golden_v1_legacy_hex() {
        let engine = CryptoEngine::new(Some(rotated_provider()));
        assert_eq!(
            engine.decrypt(GOLDEN_V1, Some(1)).await.unwrap(),
            "legacy record 😀"
        );
        // Current version is 1, so the hint can be omitted.
        assert_eq!(engine.decrypt(GOLDEN_V1, None).await.unwrap(), "legacy record 😀");
    }

    #[tokio::test]
    async fn golden_v2_raw_key() {
        let engine = CryptoEngine::new(Some(rotated_provider()));
        assert_eq!(
            engine.decrypt(GOLDEN_RAW_KEY_V2, Some(2)).await.unwrap(),
            "raw key payload"
        );
    }

    #[tokio::test]
    async fn wrong_secret_version_fails_auth() {
        let engine = CryptoEngine::new(Some(rotated_provider()));
        let err = engine.decrypt(GOLDEN_V2, Some(1)).await.unwrap_err();
        assert_eq!(err, CryptError::Crypto("bad auth tag".into()));
    }

    #[tokio::test]
    async fn unknown_secret_version_is_validation_error() {
        let err = password_engine().decrypt(GOLDEN_V2, Some(9)).await.unwrap_err();
        assert_eq!(err.code(), "secrets_validation");
    }

    #[tokio::test]
    async fn tampering_detected() {
        let engine = password_engine();
        let enc = engine.encrypt("tamper me").await.unwrap();
        let len = decode_base64(&enc.message[2..]).unwrap().len();
        // salt start, salt end, iv, ciphertext, tag end
        for index in [0, 63, 70, 76, len - 1] {
            let tampered = flip_payload_byte(&enc.message, index);
            let err = engine.decrypt(&tampered, Some(0)).await.unwrap_err();
            assert_eq!(err.code(), "crypto", "byte {index}");
        }
    }

    #[tokio::test]
    async fn malformed_messages_rejected() {
        let engine = password_engine();
        let err = engine.decrypt("no separator", None).await.unwrap_err();
        assert_eq!(err, CryptError::Crypto("Invalid ciphertext".into()));

        let err = engine.decrypt("2:AAAA", None).await.unwrap_err();
        assert!(err.message().contains("too short"), "{err}");

        let err = engine.decrypt("2:***", None).await.unwrap_err();
        assert!(err.message().contains("invalid encoding"), "{err}");

        let err = engine.decrypt("1:xyz", None).await.unwrap_err();
        assert!(err.message().contains("invalid encoding"), "{err}");
    }

    #[tokio::test]
    async fn extra_separators_rejected() {
        for message in ["pt:SGk=:x", "2:AAAA:BBBB", "cmV2:a:b", "::"] {
            let plain = CryptoEngine::new(None).decrypt(message, None).await;
            let encrypted = password_engine().decrypt(message, None).await;
            let invalid = Err(CryptError::Crypto("Invalid ciphertext".into()));
            assert_eq!(plain, invalid, "{message}");
            assert_eq!(encrypted, invalid, "{message}");
        }
    }

    #[tokio::test]
    async fn custom_output_with_separator_fails_encrypt_and_validate() {
        let provider = SecretProvider::from_static(SecretCollection::new(
            vec![SecretRecord::new(3, "custom-key", SecretRole::CustomEncryptionKey)],
            3,
        ));
        let engine = CryptoEngine::builder()
            .secret_provider(provider)
            .custom_encryption(vec![CustomEncryptionConfig::new("colon", ColonCipher, true)])
            .build()
            .unwrap();
        let err = engine.encrypt("x").await.unwrap_err();
        assert!(err.message().contains("must not contain ':'"), "{err}");
        assert_eq!(engine.validate().await.unwrap_err(), err);
    }

    #[tokio::test]
    async fn unknown_tag_rejected() {
        let err = password_engine().decrypt("7:abc", None).await.unwrap_err();
        assert_eq!(err.code(), "crypto");
        assert!(err.message().contains("Unknown decryptor version requested"));
    }

    #[tokio::test]
    async fn encrypted_tag_requires_provider() {
        let err = CryptoEngine::new(None).decrypt(GOLDEN_V2, None).await.unwrap_err();
        assert_eq!(err.code(), "crypto");
    }

    #[tokio::test]
    async fn format_prefix_per_mode() {
        let enc = custom_engine(3).encrypt("x").await.unwrap();
        assert!(enc.message.starts_with(&format!("{}:", pack_tag("rev"))));
        assert_eq!(enc.secret_version, 3);
        assert!(password_engine().encrypt("x").await.unwrap().message.starts_with("2:"));
        assert!(CryptoEngine::new(None).encrypt("x").await.unwrap().message.starts_with("pt:"));
    }

    #[tokio::test]
    async fn custom_encrypt_requires_marked_secret() {
        let err = custom_engine(0).encrypt("x").await.unwrap_err();
        assert_eq!(
            err,
            CryptError::Crypto("Secret with version 0 is not marked for custom encryption".into())
        );
    }

    #[tokio::test]
    async fn custom_without_current_still_decrypts() {
        let writer = custom_engine(3);
        let enc = writer.encrypt("legacy custom").await.unwrap();

        let reader = custom_engine(3);
        reader
            .set_custom_encryption(vec![CustomEncryptionConfig::new("rev", ReverseCipher, false)])
            .unwrap();
        assert_eq!(reader.custom_registry().len(), 1);
        assert!(reader.custom_registry().current_config().is_none());
        assert!(reader.encrypt("new").await.unwrap().message.starts_with("2:"));
        assert_eq!(reader.decrypt(&enc.message, Some(3)).await.unwrap(), "legacy custom");
    }

    #[tokio::test]
    async fn non_string_custom_output_fails_encrypt_and_validate() {
        let provider = SecretProvider::from_static(SecretCollection::new(
            vec![SecretRecord::new(3, "custom-key", SecretRole::CustomEncryptionKey)],
            3,
        ));
        let engine = CryptoEngine::builder()
            .secret_provider(provider)
            .custom_encryption(vec![CustomEncryptionConfig::new("bin", BinaryCipher, true)])
            .build()
            .unwrap();
        let enc_err = engine.encrypt("x").await.unwrap_err();
        let val_err = engine.validate().await.unwrap_err();
        assert_eq!(enc_err.code(), val_err.code());
        assert!(enc_err.message().contains("must return a string"));
        assert!(val_err.message().contains("must return a string"));
    }

    #[tokio::test]
    async fn validate_checks_provider_and_registry() {
        assert!(CryptoEngine::new(None).validate().await.is_ok());
        assert!(password_engine().validate().await.is_ok());
        assert!(custom_engine(3).validate().await.is_ok());

        let no_provider = CryptoEngine::builder()
            .custom_encryption(vec![CustomEncryptionConfig::new("rev", ReverseCipher, true)])
            .build()
            .unwrap();
        let err = no_provider.validate().await.unwrap_err();
        assert_eq!(
            err,
            CryptError::Crypto("Custom encryption not supported without a secret provider".into())
        );

        let broken = CryptoEngine::new(Some(SecretProvider::from_static(SecretCollection::new(
            vec![SecretRecord::new(0, "pw", SecretRole::Generic)],
            4,
        ))));
        assert_eq!(broken.validate().await.unwrap_err().code(), "secrets_validation");
    }

    #[tokio::test]
    async fn builder_rejects_bad_configs() {
        let err = CryptoEngine::builder()
            .custom_encryption(vec![])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "config_validation");
    }

    #[tokio::test]
    async fn current_secret_version() {
        let engine = CryptoEngine::new(Some(rotated_provider()));
        assert_eq!(engine.get_current_secret_version().await.unwrap(), 1);
        assert_eq!(engine.encrypt("x").await.unwrap().secret_version, 1);
        assert!(CryptoEngine::new(None).get_current_secret_version().await.is_err());
    }

    #[tokio::test]
    async fn pinned_engine_ignores_rotation() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = calls.clone();
        let provider = SecretProvider::from_fn(move || {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                Ok::<_, BoxError>(SecretsData::Collection(SecretCollection::new(
                    vec![
                        SecretRecord::new(0, "a", SecretRole::Generic),
                        SecretRecord::new(1, "b", SecretRole::Generic),
                    ],
                    n.min(1),
                )))
            }
        });
        let engine = CryptoEngine::new(Some(provider));
        let pinned = engine.pinned().await.unwrap();
        assert_eq!(pinned.get_current_secret_version().await.unwrap(), 0);
        assert_eq!(engine.get_current_secret_version().await.unwrap(), 1);
        assert_eq!(pinned.get_current_secret_version().await.unwrap(), 0);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batch_helpers_keep_order() {
        let engine = password_engine();
        let encrypted = engine.encrypt_many(&["a", "b", "c"]).await;
        let messages: Vec<(String, Option<u32>)> = encrypted
            .into_iter()
            .map(|r| {
                let e = r.unwrap();
                (e.message, Some(e.secret_version))
            })
            .chain(std::iter::once(("bogus".to_owned(), None)))
            .collect();
        let decrypted = engine.decrypt_many(&messages).await;
        assert_eq!(decrypted[0].as_deref().unwrap(), "a");
        assert_eq!(decrypted[2].as_deref().unwrap(), "c");
        assert!(decrypted[3].is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_one_engine() {
        let engine = Arc::new(password_engine());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let engine = engine.clone();
            tasks.spawn(async move {
                let text = format!("record-{i}");
                let enc = engine.encrypt(&text).await.unwrap();
                assert_eq!(engine.decrypt(&enc.message, Some(0)).await.unwrap(), text);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
    }
}
