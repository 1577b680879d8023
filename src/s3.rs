use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use rusty_s3::actions::ListObjectsV2;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};

use crate::config::StoreSettings;
use crate::error::HarvestError;

/// Lifetime of the presigned URLs; each one is used right after signing.
const SIGNATURE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

pub trait ObjectStore: Send + Sync {
    /// Every object whose key starts with `prefix`, in store order.
    fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, HarvestError>;
    fn download(&self, key: &str, destination: &Path) -> Result<(), HarvestError>;
}

#[derive(Debug, PartialEq, Eq)]
struct ListPage {
    objects: Vec<StoredObject>,
    next_token: Option<String>,
}

/// Blocking S3 client. Requests go out as presigned URLs, unsigned when no credentials are set.
#[derive(Clone)]
pub struct S3HttpClient {
    client: Client,
    bucket: Bucket,
    credentials: Option<Credentials>,
}

impl S3HttpClient {
    pub fn new(settings: &StoreSettings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sfa-harvester/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::StoreHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HarvestError::StoreHttp(err.to_string()))?;

        Ok(Self {
            client,
            bucket: bucket(settings)?,
            credentials: settings
                .credentials
                .as_ref()
                .map(|creds| Credentials::new(&creds.access_key, &creds.secret_key)),
        })
    }

    fn get(&self, url: Url) -> Result<reqwest::blocking::Response, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HarvestError::StoreHttp(err.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "object store request failed".to_string());
        Err(HarvestError::StoreStatus { status, message })
    }

    fn list_url(&self, prefix: &str, token: Option<&str>) -> Url {
        let mut action = self.bucket.list_objects_v2(self.credentials.as_ref());
        action.with_prefix(prefix);
        if let Some(token) = token {
            action.with_continuation_token(token);
        }
        action.sign(SIGNATURE_TTL)
    }
}

impl ObjectStore for S3HttpClient {
    fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, HarvestError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let body = self
                .get(self.list_url(prefix, token.as_deref()))?
                .text()
                .map_err(|err| HarvestError::StoreHttp(err.to_string()))?;
            let page = parse_list_page(&body)?;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        tracing::debug!(prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    fn download(&self, key: &str, destination: &Path) -> Result<(), HarvestError> {
        let url = self
            .bucket
            .get_object(self.credentials.as_ref(), key)
            .sign(SIGNATURE_TTL);
        let mut response = self.get(url)?;
        let mut file =
            File::create(destination).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn bucket(settings: &StoreSettings) -> Result<Bucket, HarvestError> {
    let endpoint: Url = format!("https://{}", settings.host)
        .parse()
        .map_err(|err| HarvestError::InvalidConfig(format!("store_host: {err}")))?;
    Bucket::new(
        endpoint,
        UrlStyle::VirtualHost,
        settings.bucket.clone(),
        settings.region.clone(),
    )
    .map_err(|err| HarvestError::InvalidConfig(format!("bucket: {err}")))
}

fn parse_list_page(body: &str) -> Result<ListPage, HarvestError> {
    let response = ListObjectsV2::parse_response(body)
        .map_err(|err| HarvestError::StoreHttp(format!("invalid listing: {err}")))?;
    Ok(ListPage {
        objects: response
            .contents
            .into_iter()
            .map(|entry| StoredObject {
                key: entry.key,
                size: entry.size,
            })
            .collect(),
        next_token: response.next_continuation_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials as StoreCredentials;

    fn settings(credentials: Option<StoreCredentials>) -> StoreSettings {
        StoreSettings {
            bucket: "bar-opendata-ch".to_string(),
            host: "s3.amazonaws.com".to_string(),
            region: "eu-west-1".to_string(),
            credentials,
        }
    }

    #[test]
    fn parse_listing() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bar-opendata-ch</Name>
  <Prefix>ch.bar.x1/</Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>ch.bar.x1/</Key><LastModified>2024-03-01T10:00:00.000Z</LastModified><ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag><Size>0</Size><StorageClass>STANDARD</StorageClass></Contents>
  <Contents><Key>ch.bar.x1/file.csv</Key><LastModified>2024-03-01T10:00:00.000Z</LastModified><ETag>"9b2cf535f27731c974343645a3985328"</ETag><Size>120</Size><StorageClass>STANDARD</StorageClass></Contents>
  <NextContinuationToken>abc</NextContinuationToken>
</ListBucketResult>"#;
        let page = parse_list_page(body).unwrap();
        assert_eq!(page.objects.len(), 2);
        assert_eq!(
            page.objects[1],
            StoredObject {
                key: "ch.bar.x1/file.csv".to_string(),
                size: 120,
            }
        );
        assert_eq!(page.next_token.as_deref(), Some("abc"));
    }

    #[test]
    fn anonymous_list_url_is_unsigned() {
        let settings = settings(None);
        let client = S3HttpClient::new(&settings).unwrap();
        let url = client.list_url("ch.bar.x1/", None);
        assert!(url.as_str().starts_with(&settings.endpoint()));
        let query = url.query().unwrap_or_default();
        assert!(query.contains("list-type=2"));
        assert!(query.contains("prefix=ch.bar.x1"));
        assert!(!query.contains("X-Amz-Signature"));
    }

    #[test]
    fn credentials_sign_the_url() {
        let credentials = StoreCredentials {
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
        };
        let client = S3HttpClient::new(&settings(Some(credentials))).unwrap();
        let url = client.list_url("ch.bar.x1/", Some("abc"));
        let query = url.query().unwrap_or_default();
        assert!(query.contains("X-Amz-Signature="));
        assert!(query.contains("X-Amz-Credential=AKIDEXAMPLE"));
        assert!(query.contains("continuation-token=abc"));
    }
}
