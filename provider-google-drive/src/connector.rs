//! Google Drive API connector implementation
//!
//! Implements [`RemoteFileStore`] for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::remote::{NewRemoteFile, RemoteFileStore, RemoteStoreFactory};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{is_rate_limited, GoogleDriveError, Result as DriveResult};
use crate::types::{CreateFileRequest, DriveFile, FilesListResponse, FOLDER_MIME_TYPE};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive upload endpoint base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,parents,trashed";

/// Attempts per request, including the first one
const MAX_ATTEMPTS: u32 = 3;

const MULTIPART_BOUNDARY: &str = "lexicon_sync_boundary";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Drive API connector
///
/// # Features
///
/// - Exact-name lookup inside a folder, skipping trashed files
/// - Multipart create and in-place media update
/// - Exponential backoff on HTTP 429, rate-limited 403 and 5xx
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::RemoteFileStore;
///
/// let connector = GoogleDriveConnector::new(http_client, access_token);
/// let folder = connector.get_or_create_folder("LexiconSync").await?;
/// let id = connector.list_by_name_in_folder("tags.json", &folder).await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token with `drive.file` scope
    access_token: String,

    api_base: String,
    upload_base: String,
}

impl GoogleDriveConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Point the connector at different API hosts.
    pub fn with_endpoints(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Escape a value for use inside a single-quoted Drive query string.
    fn escape_query_value(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn files_url(&self, query: &str) -> String {
        format!(
            "{}/files?q={}&spaces=drive&pageSize=10&fields=nextPageToken,files({})",
            self.api_base,
            urlencoding::encode(query),
            FILE_FIELDS
        )
    }

    /// Run a query and return the first matching, non-trashed file.
    async fn find_first(&self, query: &str) -> DriveResult<Option<DriveFile>> {
        let request = HttpRequest::new(HttpMethod::Get, self.files_url(query))
            .header("Accept", "application/json");
        let response = self.execute_with_retry(request).await?;

        let list: FilesListResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
        })?;

        let mut matches = list.files.into_iter().filter(|f| !f.trashed);
        let first = matches.next();
        if matches.next().is_some() {
            warn!(query, "Multiple files match, using the first one");
        }
        Ok(first)
    }

    fn multipart_body(metadata: &[u8], mime_type: &str, content: &[u8]) -> Bytes {
        let mut body = BytesMut::with_capacity(metadata.len() + content.len() + 256);
        body.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(metadata);
        body.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.put_slice(content);
        body.put_slice(format!("\r\n--{}--", MULTIPART_BOUNDARY).as_bytes());
        body.freeze()
    }

    fn parse_created(response: &HttpResponse) -> DriveResult<String> {
        let file: DriveFile = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse created file: {}", e))
        })?;
        Ok(file.id)
    }

    /// Execute API request with retry logic
    ///
    /// Retries HTTP 429, 5xx and transport failures with exponential
    /// backoff. Other statuses fail immediately.
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> DriveResult<HttpResponse> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = request
                .clone()
                .bearer_token(&self.access_token)
                .timeout(REQUEST_TIMEOUT);

            let retry_reason = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!("API request succeeded: status={}", response.status);
                    return Ok(response);
                }
                Ok(response)
                    if is_rate_limited(response.status, &response.body)
                        || response.is_server_error() =>
                {
                    let rate_limited = is_rate_limited(response.status, &response.body);
                    if attempt >= MAX_ATTEMPTS {
                        warn!(
                            "API request failed after {} attempts: status={}",
                            attempt, response.status
                        );
                        return Err(if rate_limited {
                            GoogleDriveError::RateLimitExceeded { attempts: attempt }
                        } else {
                            GoogleDriveError::from_status(response.status, &response.body)
                        });
                    }
                    format!("status={}", response.status)
                }
                Ok(response) => {
                    warn!("API request failed: status={}", response.status);
                    return Err(GoogleDriveError::from_status(response.status, &response.body));
                }
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => e.to_string(),
                Err(e) => {
                    warn!("API request failed after {} attempts: {}", attempt, e);
                    return Err(e.into());
                }
            };

            let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
            warn!(
                "API request failed (attempt {}/{}): {}, retrying in {}ms",
                attempt, MAX_ATTEMPTS, retry_reason, backoff_ms
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

#[async_trait]
impl RemoteFileStore for GoogleDriveConnector {
    #[instrument(skip(self))]
    async fn list_by_name_in_folder(&self, name: &str, folder_id: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            Self::escape_query_value(name),
            Self::escape_query_value(folder_id)
        );
        let found = self.find_first(&query).await?;
        debug!(found = found.is_some(), "Looked up file by name");
        Ok(found.map(|f| f.id))
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn create(&self, metadata: NewRemoteFile, content: Bytes) -> Result<String> {
        let resource = CreateFileRequest {
            name: &metadata.name,
            mime_type: &metadata.mime_type,
            parents: vec![metadata.parent_id.as_str()],
        };
        let resource_json = serde_json::to_vec(&resource).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;

        let url = format!("{}/files?uploadType=multipart&fields=id", self.upload_base);
        let request = HttpRequest::new(HttpMethod::Post, url)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Self::multipart_body(&resource_json, &metadata.mime_type, &content));

        let response = self.execute_with_retry(request).await?;
        let id = Self::parse_created(&response)?;
        info!(file_id = %id, name = %metadata.name, "Created file in Google Drive");
        Ok(id)
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn update_content(&self, file_id: &str, content: Bytes) -> Result<()> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields=id",
            self.upload_base,
            urlencoding::encode(file_id)
        );
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .header("Content-Type", "application/json")
            .body(content);

        match self.execute_with_retry(request).await {
            Ok(_) => {
                debug!("Updated file content");
                Ok(())
            }
            Err(GoogleDriveError::ApiError {
                status_code: 404, ..
            }) => Err(GoogleDriveError::FileNotFound {
                file_id: file_id.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, file_id: &str) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}?alt=media",
            self.api_base,
            urlencoding::encode(file_id)
        );
        let response = self
            .execute_with_retry(HttpRequest::new(HttpMethod::Get, url))
            .await?;
        debug!(size = response.body.len(), "Downloaded file");
        Ok(response.body)
    }

    #[instrument(skip(self))]
    async fn get_or_create_folder(&self, name: &str) -> Result<String> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and 'root' in parents and trashed = false",
            Self::escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        if let Some(folder) = self.find_first(&query).await? {
            debug!(folder_id = %folder.id, "Found app folder");
            return Ok(folder.id);
        }

        let resource = CreateFileRequest {
            name,
            mime_type: FOLDER_MIME_TYPE,
            parents: vec![],
        };
        let url = format!("{}/files?fields=id", self.api_base);
        let request = HttpRequest::new(HttpMethod::Post, url).json(&resource)?;
        let response = self.execute_with_retry(request).await?;
        let id = Self::parse_created(&response)?;
        info!(folder_id = %id, name, "Created app folder in Google Drive");
        Ok(id)
    }
}

/// Builds a [`GoogleDriveConnector`] per access token.
pub struct GoogleDriveConnectorFactory {
    http_client: Arc<dyn HttpClient>,
}

impl GoogleDriveConnectorFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl RemoteStoreFactory for GoogleDriveConnectorFactory {
    fn connect(&self, access_token: &str) -> Arc<dyn RemoteFileStore> {
        Arc::new(GoogleDriveConnector::new(
            self.http_client.clone(),
            access_token.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &[u8]) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::copy_from_slice(body),
        })
    }

    fn connector(mock_http: MockHttpClient) -> GoogleDriveConnector {
        GoogleDriveConnector::new(Arc::new(mock_http), "test_token".to_string())
    }

    #[test]
    fn test_escape_query_value() {
        assert_eq!(
            GoogleDriveConnector::escape_query_value(r"it's a \ test"),
            r"it\'s a \\ test"
        );
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = GoogleDriveConnector::multipart_body(b"{\"name\":\"a\"}", "application/json", b"[]");
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.starts_with("--lexicon_sync_boundary\r\n"));
        assert!(text.contains("{\"name\":\"a\"}\r\n--lexicon_sync_boundary\r\n"));
        assert!(text.ends_with("\r\n\r\n[]\r\n--lexicon_sync_boundary--"));
    }

    #[tokio::test]
    async fn test_list_by_name_builds_escaped_query() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Get);
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer test_token")
            );
            let decoded = urlencoding::decode(&req.url).unwrap().into_owned();
            assert!(decoded.contains("name = 'o\\'brien.json'"));
            assert!(decoded.contains("'folder-1' in parents"));
            assert!(decoded.contains("trashed = false"));

            response(
                200,
                br#"{"files":[{"id":"file1","name":"o'brien.json","mimeType":"application/json"}]}"#,
            )
        });

        let id = connector(mock_http)
            .list_by_name_in_folder("o'brien.json", "folder-1")
            .await
            .unwrap();

        assert_eq!(id, Some("file1".to_string()));
    }

    #[tokio::test]
    async fn test_list_by_name_not_found_is_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(200, br#"{"files":[]}"#));

        let id = connector(mock_http)
            .list_by_name_in_folder("tags.json", "folder-1")
            .await
            .unwrap();

        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_create_uses_multipart_upload() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert!(req.url.starts_with(DRIVE_UPLOAD_BASE));
            assert!(req.url.contains("uploadType=multipart"));
            assert_eq!(
                req.headers.get("Content-Type").map(String::as_str),
                Some("multipart/related; boundary=lexicon_sync_boundary")
            );
            let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
            assert!(body.contains(r#""parents":["folder-1"]"#));
            assert!(body.contains(r#""name":"tags.json""#));

            response(200, br#"{"id":"new-file"}"#)
        });

        let id = connector(mock_http)
            .create(NewRemoteFile::json("tags.json", "folder-1"), Bytes::from_static(b"[]"))
            .await
            .unwrap();

        assert_eq!(id, "new-file");
    }

    #[tokio::test]
    async fn test_update_content_patches_media() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Patch);
            assert!(req.url.contains("/files/file1?uploadType=media"));
            assert_eq!(req.body.as_deref(), Some(&b"[1]"[..]));
            response(200, br#"{"id":"file1"}"#)
        });

        connector(mock_http)
            .update_content("file1", Bytes::from_static(b"[1]"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_file_is_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(404, br#"{"error":{"code":404,"message":"File not found"}}"#));

        let result = connector(mock_http)
            .update_content("gone", Bytes::from_static(b"[]"))
            .await;

        assert!(matches!(result, Err(BridgeError::NotFound(id)) if id == "gone"));
    }

    #[tokio::test]
    async fn test_get_downloads_media() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("alt=media"));
            response(200, &[1, 2, 3, 4, 5])
        });

        let data = connector(mock_http).get("file1").await.unwrap();

        assert_eq!(&data[..], &[1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_get_or_create_folder_reuses_existing() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            let decoded = urlencoding::decode(&req.url).unwrap().into_owned();
            assert!(decoded.contains(FOLDER_MIME_TYPE));
            response(200, br#"{"files":[{"id":"folder-1","name":"LexiconSync"}]}"#)
        });

        let id = connector(mock_http)
            .get_or_create_folder("LexiconSync")
            .await
            .unwrap();

        assert_eq!(id, "folder-1");
    }

    #[tokio::test]
    async fn test_get_or_create_folder_creates_missing() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| response(200, br#"{"files":[]}"#));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert_eq!(req.method, HttpMethod::Post);
                let body: serde_json::Value = serde_json::from_slice(&req.body.unwrap()).unwrap();
                assert_eq!(body["name"], "LexiconSync");
                assert_eq!(body["mimeType"], FOLDER_MIME_TYPE);
                response(200, br#"{"id":"folder-new"}"#)
            });

        let id = connector(mock_http)
            .get_or_create_folder("LexiconSync")
            .await
            .unwrap();

        assert_eq!(id, "folder-new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors_then_succeeds() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| response(503, b"unavailable"));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| response(200, b"[]"));

        let data = connector(mock_http).get("file1").await.unwrap();

        assert_eq!(&data[..], b"[]");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_gives_up_after_max_attempts() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(MAX_ATTEMPTS as usize)
            .returning(|_| response(429, b"slow down"));

        let result = connector(mock_http).get("file1").await;

        assert!(matches!(result, Err(BridgeError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rate_limit_forbidden_is_retried() {
        const THROTTLED: &[u8] = br#"{"error":{"code":403,"errors":[{"domain":"usageLimits","reason":"userRateLimitExceeded"}],"message":"User Rate Limit Exceeded"}}"#;
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| response(403, THROTTLED));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| response(200, b"[]"));

        let data = connector(mock_http).get("file1").await.unwrap();

        assert_eq!(&data[..], b"[]");
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_forbidden_is_network_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(MAX_ATTEMPTS as usize)
            .returning(|_| {
                response(
                    403,
                    br#"{"error":{"errors":[{"reason":"rateLimitExceeded"}],"message":"Rate Limit Exceeded"}}"#,
                )
            });

        let result = connector(mock_http).get("file1").await;

        assert!(matches!(result, Err(BridgeError::Network(_))));
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            response(
                403,
                br#"{"error":{"code":403,"message":"Request had insufficient authentication scopes."}}"#,
            )
        });

        let result = connector(mock_http)
            .list_by_name_in_folder("tags.json", "folder-1")
            .await;

        assert!(matches!(result, Err(BridgeError::PermissionDenied(_))));
    }

    #[test]
    fn test_factory_binds_token() {
        let factory = GoogleDriveConnectorFactory::new(Arc::new(MockHttpClient::new()));
        let _store: Arc<dyn RemoteFileStore> = factory.connect("token");
    }
}
