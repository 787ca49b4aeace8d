//! Storage client for the Tencent-COS-compatible bucket.
//!
//! Every bucket request carries an `Authorization` token from the core
//! signer; tokens are cached per request shape for their validity window.
//! The listing endpoint answers with an XML document whose `Contents`
//! entries are scraped for `<Key>` values — a listing with exactly one
//! object serializes the entry as a bare element rather than a list, and the
//! scrape normalizes both shapes to the same vector.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use tracing::{error, info};

use blog_sync_core::auth::{canonical_pairs, CachedSigner, SigningContext};
use blog_sync_core::contract::{ClientError, StorageClient};

use crate::load_config::CosSettings;

pub struct CosClient {
    http: reqwest::Client,
    base_url: String,
    secret_id: String,
    secret_key: String,
    signer: CachedSigner,
}

impl CosClient {
    pub fn new(settings: &CosSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url(),
            secret_id: settings.secret_id.clone(),
            secret_key: settings.secret_key.clone(),
            signer: CachedSigner::new(),
        }
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn authorization(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> String {
        self.signer.sign(&SigningContext {
            access_key_id: &self.secret_id,
            access_key_secret: &self.secret_key,
            method,
            path,
            query,
            headers,
            now: Self::unix_now(),
        })
    }
}

/// Pull every object key out of a bucket-listing XML document. Works for
/// zero, one, or many `Contents` entries; the one-entry case is the XML
/// ambiguity the caller must not trip over.
pub(crate) fn parse_bucket_listing(xml: &str) -> Vec<String> {
    let pattern = Regex::new(r"<Key>([^<]+)</Key>").unwrap();
    pattern
        .captures_iter(xml)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[async_trait]
impl StorageClient for CosClient {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ClientError> {
        let query = vec![("prefix".to_string(), prefix.to_string())];
        let authorization = self.authorization("GET", "/", &query, &[]);
        let url = format!("{}?{}", self.base_url, canonical_pairs(&query));
        info!(url = %url, "Listing bucket objects");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = ?e, "Bucket listing request failed");
                Box::new(e) as ClientError
            })?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Bucket listing returned an error status");
            return Err(format!("bucket listing failed with status {status}").into());
        }
        let xml = response.text().await.map_err(|e| {
            error!(url = %url, error = ?e, "Failed to read bucket listing body");
            Box::new(e) as ClientError
        })?;
        let keys = parse_bucket_listing(&xml);
        info!(count = keys.len(), prefix = %prefix, "Bucket listing parsed");
        Ok(keys)
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), ClientError> {
        let path = format!("/{key}");
        let headers = vec![("Content-Type".to_string(), content_type.to_string())];
        let authorization = self.authorization("PUT", &path, &[], &headers);
        let url = format!("{}/{}", self.base_url, key);
        info!(url = %url, content_type = %content_type, bytes = body.len(), "Uploading bucket object");

        let response = self
            .http
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = ?e, "Object upload request failed");
                Box::new(e) as ClientError
            })?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Object upload returned an error status");
            return Err(format!("object upload failed with status {status}").into());
        }
        info!(key = %key, "Object uploaded");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ClientError> {
        let path = format!("/{key}");
        let authorization = self.authorization("DELETE", &path, &[], &[]);
        let url = format!("{}/{}", self.base_url, key);
        info!(url = %url, "Deleting bucket object");

        let response = self
            .http
            .delete(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = ?e, "Object delete request failed");
                Box::new(e) as ClientError
            })?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Object delete returned an error status");
            return Err(format!("object delete failed with status {status}").into());
        }
        info!(key = %key, "Object deleted");
        Ok(())
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        info!(url = %url, "Fetching asset from origin");
        let response = self.http.get(url).send().await.map_err(|e| {
            error!(url = %url, error = ?e, "Asset fetch request failed");
            Box::new(e) as ClientError
        })?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Asset fetch returned an error status");
            return Err(format!("asset fetch failed with status {status}").into());
        }
        let bytes = response.bytes().await.map_err(|e| {
            error!(url = %url, error = ?e, "Failed to read asset body");
            Box::new(e) as ClientError
        })?;
        Ok(bytes.to_vec())
    }
}
