//! S3-compatible object store client
//!
//! Built once at startup from static credentials and shared by every request.

use crate::config::RemoteStoreSettings;
use crate::remote::{ObjectPage, ObjectStore, RemoteResult, RemoteSyncError};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{
    BehaviorVersion, Builder, Credentials, Region, RequestChecksumCalculation,
};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::info;

/// Object store backed by `aws-sdk-s3`, addressed path-style
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds the client from configured settings
    pub fn new(settings: &RemoteStoreSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "site-mirror-config",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            // Some S3-compatible stores reject trailing checksums on streamed uploads.
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            // A single call never outlives the whole sync.
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(settings.sync_timeout)
                    .build(),
            )
            .build();

        info!(
            endpoint = %settings.endpoint,
            bucket = %settings.bucket,
            "Remote storage configured"
        );

        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket.clone(),
        }
    }
}

/// True for `NoSuchKey` errors and any HTTP 404
fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool
where
    E: ProvideErrorMetadata,
{
    let code = err.as_service_error().and_then(|e| e.code());
    code == Some("NoSuchKey")
        || err
            .raw_response()
            .is_some_and(|response| response.status().as_u16() == 404)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<String>) -> RemoteResult<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|e| {
            if is_not_found(&e) {
                RemoteSyncError::NotFound(prefix.to_string())
            } else {
                RemoteSyncError::List {
                    prefix: prefix.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                }
            }
        })?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage { keys, next_token })
    }

    async fn delete_batch(&self, keys: &[String]) -> RemoteResult<()> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteSyncError::Client(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| RemoteSyncError::Client(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RemoteSyncError::NotFound(format!("{} keys", keys.len()))
                } else {
                    RemoteSyncError::Delete(DisplayErrorContext(&e).to_string())
                }
            })?;

        // Quiet mode only reports the keys that failed.
        let failures: Vec<String> = output
            .errors()
            .iter()
            .filter(|e| e.code() != Some("NoSuchKey"))
            .map(|e| {
                format!(
                    "{}: {}",
                    e.key().unwrap_or("<unknown>"),
                    e.message().or(e.code()).unwrap_or("unknown error")
                )
            })
            .collect();
        if !failures.is_empty() {
            return Err(RemoteSyncError::Delete(failures.join("; ")));
        }

        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path) -> RemoteResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| RemoteSyncError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteSyncError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteSync;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BUCKET: &str = "mirror-bucket";

    fn settings(endpoint: &str) -> RemoteStoreSettings {
        RemoteStoreSettings {
            endpoint: endpoint.to_string(),
            access_key: "test-access".to_string(),
            secret_key: "test-secret".to_string(),
            bucket: BUCKET.to_string(),
            region: "auto".to_string(),
            sync_timeout: Duration::from_secs(1),
        }
    }

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<html>home</html>").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_missing_prefix_then_upload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}", BUCKET)))
            .and(query_param("list-type", "2"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(format!("/{}/example.com/index.html", BUCKET)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3ObjectStore::new(&settings(&server.uri()));
        let sync = RemoteSync::new(Arc::new(store));
        let ws = workspace();

        let report = sync.sync(ws.path(), "example.com").await.unwrap().unwrap();

        assert_eq!(report.delete_requests, 0);
        assert_eq!(report.uploaded, 1);
    }

    #[tokio::test]
    async fn test_existing_objects_are_deleted() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}", BUCKET)))
            .and(query_param("list-type", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <Name>mirror-bucket</Name><Prefix>example.com/</Prefix>\
                 <KeyCount>2</KeyCount><MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>\
                 <Contents><Key>example.com/index.html</Key><Size>5</Size></Contents>\
                 <Contents><Key>example.com/old.html</Key><Size>5</Size></Contents>\
                 </ListBucketResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/{}", BUCKET)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <DeleteResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"></DeleteResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(format!("/{}/example.com/index.html", BUCKET)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3ObjectStore::new(&settings(&server.uri()));
        let sync = RemoteSync::new(Arc::new(store));
        let ws = workspace();

        let report = sync.sync(ws.path(), "example.com").await.unwrap().unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.delete_requests, 1);
        assert_eq!(report.uploaded, 1);
    }

    #[tokio::test]
    async fn test_access_denied_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let store = S3ObjectStore::new(&settings(&server.uri()));
        let result = store.list_page("example.com/", None).await;

        assert!(matches!(result, Err(RemoteSyncError::List { .. })));
    }

    #[tokio::test]
    async fn test_stalled_listing_hits_operation_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(600)))
            .mount(&server)
            .await;

        let store = S3ObjectStore::new(&settings(&server.uri()));
        let started = Instant::now();
        let result = store.list_page("example.com/", None).await;

        assert!(matches!(result, Err(RemoteSyncError::List { .. })));
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
