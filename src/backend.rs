// src/backend.rs
//! Backend contract and its HTTP implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{header, multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    Dataset, DatasetId, LoginRequest, RecordFilter, RecordsPage, RegisterRequest, SummaryStats,
    User, UserId,
};
use crate::session::AuthSession;

lazy_static! {
    static ref DISPOSITION_FILENAME: Regex =
        Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).unwrap();
}

/// File selected for upload.
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl DatasetUpload {
    pub fn from_path(path: &Path) -> ClientResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::validation("Invalid file name"))?
            .to_string();
        let bytes = std::fs::read(path)?;
        Ok(Self { file_name, bytes })
    }

    pub fn is_csv(&self) -> bool {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"))
    }
}

/// Binary report body plus the server-suggested file name.
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> ClientResult<User>;
    async fn register(&self, request: &RegisterRequest) -> ClientResult<User>;

    async fn list_datasets(&self) -> ClientResult<Vec<Dataset>>;
    async fn create_dataset(&self, upload: &DatasetUpload) -> ClientResult<Dataset>;
    async fn delete_dataset(&self, id: DatasetId) -> ClientResult<()>;

    async fn get_summary(&self, id: DatasetId) -> ClientResult<SummaryStats>;
    async fn get_records(&self, id: DatasetId, filter: &RecordFilter) -> ClientResult<RecordsPage>;
    async fn get_report(&self, id: DatasetId) -> ClientResult<ReportPayload>;

    async fn list_users(&self) -> ClientResult<Vec<User>>;
    async fn delete_user(&self, id: UserId) -> ClientResult<()>;
}

// ==================== HTTP ====================

pub struct HttpBackend {
    client: Client,
    base_url: String,
    session: Arc<AuthSession>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig, session: Arc<AuthSession>) -> ClientResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        self.session.attach(self.request(method, path))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.ok();
        log::debug!("Backend answered {}", status);
        Err(ClientError::from_status(status.as_u16(), body.as_deref()))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> ClientResult<User> {
        self.json(self.request(Method::POST, "auth/login").json(request)).await
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<User> {
        self.json(self.request(Method::POST, "auth/register").json(request)).await
    }

    async fn list_datasets(&self) -> ClientResult<Vec<Dataset>> {
        self.json(self.authed(Method::GET, "datasets")).await
    }

    async fn create_dataset(&self, upload: &DatasetUpload) -> ClientResult<Dataset> {
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str("text/csv")
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        self.json(self.authed(Method::POST, "datasets").multipart(form)).await
    }

    async fn delete_dataset(&self, id: DatasetId) -> ClientResult<()> {
        self.send(self.authed(Method::DELETE, &format!("datasets/{}", id))).await?;
        Ok(())
    }

    async fn get_summary(&self, id: DatasetId) -> ClientResult<SummaryStats> {
        self.json(self.authed(Method::GET, &format!("datasets/{}/summary", id))).await
    }

    async fn get_records(&self, id: DatasetId, filter: &RecordFilter) -> ClientResult<RecordsPage> {
        let request = self
            .authed(Method::GET, &format!("datasets/{}/records", id))
            .query(&filter.query_pairs());
        self.json(request).await
    }

    async fn get_report(&self, id: DatasetId) -> ClientResult<ReportPayload> {
        let response = self
            .send(self.authed(Method::GET, &format!("datasets/{}/download_pdf", id)))
            .await?;

        let file_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name);
        let bytes = response.bytes().await?.to_vec();

        Ok(ReportPayload { bytes, file_name })
    }

    async fn list_users(&self) -> ClientResult<Vec<User>> {
        self.json(self.authed(Method::GET, "admin/users")).await
    }

    async fn delete_user(&self, id: UserId) -> ClientResult<()> {
        self.send(self.authed(Method::DELETE, &format!("admin/users/{}", id))).await?;
        Ok(())
    }
}

/// Extracts a bare file name from a Content-Disposition header. Directory
/// components are dropped.
pub fn disposition_file_name(value: &str) -> Option<String> {
    let raw = DISPOSITION_FILENAME.captures(value)?.get(1)?.as_str().trim();
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
