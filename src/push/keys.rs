use std::sync::{Arc, Mutex, RwLock};

use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use time::OffsetDateTime;

use crate::error::EngineError;
use crate::ports::RecordStore;
use crate::types::push::SigningKeyPair;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VapidCredentials {
    pub(crate) private_key: String,
    pub(crate) public_key: String,
}

pub(crate) fn generate_vapid_credentials() -> Result<VapidCredentials, EngineError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

/// Fresh P-256 keypair: PKCS#8 PEM private key, uncompressed public point
/// encoded as URL-safe unpadded base64.
pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, EngineError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let raw_private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&raw_private_key, URL_SAFE_NO_PAD)
            .map_err(|err| EngineError::KeyGeneration(err.to_string()))?
            .get_public_key();
    let private_key = key_pair
        .to_pem()
        .map_err(|err| EngineError::KeyGeneration(err.to_string()))?;

    Ok(VapidCredentials {
        private_key,
        public_key: encode_config(public_key, URL_SAFE_NO_PAD),
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

#[derive(Debug, Clone)]
enum CachedKeys {
    Unloaded,
    Loaded(Option<SigningKeyPair>),
}

/// Owner of the active signing keypair.
///
/// The first `get` reads storage once; later reads are served from memory.
/// Rotation replaces storage and cache while holding the rotation lock, so a
/// reader never sees the old key after a rotation has returned.
pub(crate) struct KeyStore<S> {
    store: Arc<S>,
    subject: String,
    cache: RwLock<CachedKeys>,
    rotation: Mutex<()>,
}

impl<S: RecordStore> KeyStore<S> {
    pub(crate) fn new(store: Arc<S>, subject: impl Into<String>) -> Self {
        Self {
            store,
            subject: subject.into(),
            cache: RwLock::new(CachedKeys::Unloaded),
            rotation: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self) -> Result<Option<SigningKeyPair>, EngineError> {
        if let CachedKeys::Loaded(keys) = &*self.cache.read().expect("key cache lock") {
            return Ok(keys.clone());
        }

        let mut cache = self.cache.write().expect("key cache lock");
        if let CachedKeys::Loaded(keys) = &*cache {
            return Ok(keys.clone());
        }
        let keys = self.store.signing_keys()?;
        *cache = CachedKeys::Loaded(keys.clone());
        Ok(keys)
    }

    pub(crate) fn generate(&self, now: OffsetDateTime) -> Result<SigningKeyPair, EngineError> {
        let credentials = generate_vapid_credentials()?;
        let keys = self.install(credentials.public_key, credentials.private_key, now)?;
        tracing::info!(public_key = %keys.public_key, "generated new signing keypair");
        Ok(keys)
    }

    /// Installs caller-supplied key material as-is; malformed keys only show
    /// up later as delivery failures.
    pub(crate) fn import(
        &self,
        public_key: String,
        private_key: String,
        now: OffsetDateTime,
    ) -> Result<SigningKeyPair, EngineError> {
        let keys = self.install(public_key, private_key, now)?;
        tracing::info!(public_key = %keys.public_key, "imported signing keypair");
        Ok(keys)
    }

    fn install(
        &self,
        public_key: String,
        private_key: String,
        now: OffsetDateTime,
    ) -> Result<SigningKeyPair, EngineError> {
        let keys = SigningKeyPair {
            public_key,
            private_key,
            subject: self.subject.clone(),
            created_at: now,
        };

        let _rotation = self.rotation.lock().expect("key rotation lock");
        let mut cache = self.cache.write().expect("key cache lock");
        self.store.replace_signing_keys(keys.clone())?;
        *cache = CachedKeys::Loaded(Some(keys.clone()));
        Ok(keys)
    }
}
