use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use ring::hmac;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{validate_key, ObjectStore, ObjectStoreError};

/// Signs and verifies download URLs served by the `/objects` route.
#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    key: hmac::Key,
}

impl UrlSigner {
    pub fn new(base_url: &str, secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    fn message(bucket: &str, key: &str, expires: i64) -> String {
        format!("{bucket}/{key}\n{expires}")
    }

    /// Build a URL valid until `expires` (unix seconds).
    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        let tag = hmac::sign(&self.key, Self::message(bucket, key, expires).as_bytes());
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag.as_ref());
        let path = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/objects/{}/{path}?expires={expires}&signature={signature}",
            self.base_url,
            urlencoding::encode(bucket),
        )
    }

    /// Check a signature produced by [`UrlSigner::sign`] and that it has not expired.
    pub fn verify(&self, bucket: &str, key: &str, expires: i64, signature: &str) -> bool {
        if expires < chrono::Utc::now().timestamp() {
            return false;
        }
        let Ok(tag) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        hmac::verify(
            &self.key,
            Self::message(bucket, key, expires).as_bytes(),
            &tag,
        )
        .is_ok()
    }
}

/// Local filesystem object store for development and testing.
/// Each bucket is a subdirectory of the base path.
pub struct LocalStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P, signer: UrlSigner) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, signer })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if bucket.contains('/') {
            return Err(ObjectStoreError::Backend(format!("invalid bucket: {bucket}")));
        }
        validate_key(bucket)?;
        validate_key(key)?;
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}")));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        Ok(path.exists())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        self.object_path(bucket, key)?;
        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(self.signer.sign(bucket, key, expires))
    }
}
