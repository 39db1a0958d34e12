//! Getting documents to the server.
//!
//! Two paths: the signed-url flow (create the job, then PUT each document straight to
//! storage) for anything large, and the single-step flow that inlines base64 content in
//! the creation request. Every variant (file or bytes, raw or base64, with or without a
//! selfie / extra document) is described by one [`Submission`] and goes through the same
//! pipeline.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Method;
use serde_json::{Map, Value, json};
use std::fmt;
use std::path::PathBuf;

use crate::client::{Client, QueryParams, check_status, decode};
use crate::config::{
    BASE64_ATTRIBUTE, FLAG_TRUE, KEY_DOCUMENT, KEY_EXTRA, KEY_EXTRA_URL, KEY_FACEMATCH, KEY_SELFIE,
};
use crate::error::{Error, Result};
use crate::models::{CreatedJob, SignedUrl};
use crate::transport::HttpRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Job,
    Batch,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Job => "job",
            ResourceKind::Batch => "batch",
        }
    }

    /// `{}` for a job, `[]` for a batch (one entry per document in the batch)
    fn empty_metadata(&self) -> Value {
        match self {
            ResourceKind::Job => json!({}),
            ResourceKind::Batch => json!([]),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a document's bytes come from
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl DocumentSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DocumentSource::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        DocumentSource::Bytes(bytes.into())
    }

    pub(crate) async fn load(&self) -> Result<Vec<u8>> {
        match self {
            DocumentSource::Path(path) => {
                tokio::fs::read(path).await.map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })
            }
            DocumentSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// How the content is handed over.
///
/// `Base64` means the caller already supplies base64 text: the signed-url flow sends it
/// as-is with `base64=true` so the server decodes it. `Raw` content going through the
/// single-step flow is encoded by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Raw,
    Base64,
}

/// Everything needed to create one job or batch
#[derive(Debug, Clone)]
pub struct Submission {
    document: DocumentSource,
    facematch: Option<DocumentSource>,
    extra_document: Option<DocumentSource>,
    encoding: Encoding,
    metadata: Option<Value>,
    params: QueryParams,
}

impl Submission {
    pub fn new(document: DocumentSource) -> Self {
        Self {
            document,
            facematch: None,
            extra_document: None,
            encoding: Encoding::Raw,
            metadata: None,
            params: QueryParams::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(DocumentSource::path(path))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(DocumentSource::bytes(bytes))
    }

    /// Selfie for facematch. Only uploaded when `facematch=true` is also set.
    pub fn with_facematch(mut self, source: DocumentSource) -> Self {
        self.facematch = Some(source);
        self
    }

    /// Only uploaded when `extra-document=true` is also set
    pub fn with_extra_document(mut self, source: DocumentSource) -> Self {
        self.extra_document = Some(source);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn base64(self) -> Self {
        self.with_encoding(Encoding::Base64)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Caller params, plus `base64=true` for base64 content
    fn signed_url_params(&self) -> QueryParams {
        let mut params = self.params.clone();
        if self.encoding == Encoding::Base64 {
            params.insert(BASE64_ATTRIBUTE, FLAG_TRUE);
        }
        params
    }

    fn metadata_for(&self, kind: ResourceKind) -> Value {
        self.metadata
            .clone()
            .unwrap_or_else(|| kind.empty_metadata())
    }

    /// Secondary documents that take part in this submission: supplied AND flagged
    fn secondary_documents(&self) -> Vec<(&'static str, &'static str, &DocumentSource)> {
        let mut documents = Vec::new();
        if let Some(facematch) = &self.facematch {
            if self.params.has_flag(KEY_FACEMATCH) {
                documents.push((KEY_FACEMATCH, KEY_SELFIE, facematch));
            }
        }
        if let Some(extra) = &self.extra_document {
            if self.params.has_flag(KEY_EXTRA) {
                documents.push((KEY_EXTRA, KEY_EXTRA_URL, extra));
            }
        }
        documents
    }

    /// Content as the base64 text the single-step body carries
    async fn load_text(&self, source: &DocumentSource) -> Result<String> {
        let bytes = source.load().await?;
        match self.encoding {
            Encoding::Raw => Ok(encode_base64(&bytes)),
            Encoding::Base64 => {
                String::from_utf8(bytes).map_err(|e| Error::InvalidDocument(e.to_string()))
            }
        }
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

impl Client {
    /// Creates a job or batch and returns its upload targets
    pub async fn generate_signed_url(
        &self,
        service: &str,
        kind: ResourceKind,
        metadata: &Value,
        params: &QueryParams,
    ) -> Result<SignedUrl> {
        let url = self.api_url(&["ocr", kind.as_str(), service]);

        let response = self.post(&url, metadata, params).await?;
        let response = check_status(response, |status, body| Error::Submission {
            status,
            body,
        })?;
        decode(&response)
    }

    /// PUT to a pre-signed url. No auth headers, the signature is the auth.
    pub async fn upload_file(&self, url: &str, body: Vec<u8>) -> Result<()> {
        tracing::debug!("Uploading {} bytes", body.len());
        let request = HttpRequest::new(Method::PUT, url).body(body);

        let response = self.transport().send(request).await?;
        check_status(response, |status, body| Error::Upload { status, body })?;
        Ok(())
    }

    pub async fn upload_file_with_path(&self, url: &str, path: impl Into<PathBuf>) -> Result<()> {
        let body = DocumentSource::path(path).load().await?;
        self.upload_file(url, body).await
    }

    /// Signed-url flow for a single job
    pub async fn send_job(&self, service: &str, submission: &Submission) -> Result<CreatedJob> {
        self.submit(ResourceKind::Job, service, submission).await
    }

    /// Signed-url flow for a batch (one file holding many documents)
    pub async fn send_batch(&self, service: &str, submission: &Submission) -> Result<CreatedJob> {
        self.submit(ResourceKind::Batch, service, submission).await
    }

    /// Creates a job with the content inline in the request, no upload round-trip
    pub async fn send_job_single_step(
        &self,
        service: &str,
        submission: &Submission,
    ) -> Result<CreatedJob> {
        let url = self.api_url(&["ocr", "job", "send", service]);

        let mut body = Map::new();
        body.insert(
            "data".to_string(),
            Value::String(submission.load_text(&submission.document).await?),
        );
        body.insert(
            "metadata".to_string(),
            submission.metadata_for(ResourceKind::Job),
        );
        for (key, _, source) in submission.secondary_documents() {
            body.insert(key.to_string(), Value::String(submission.load_text(source).await?));
        }

        let response = self.post(&url, &body, &submission.params).await?;
        let response = check_status(response, |status, body| Error::Submission {
            status,
            body,
        })?;
        let created: CreatedJob = decode(&response)?;

        tracing::info!("Created job {} for service {} (single step)", created.id, service);
        Ok(created)
    }

    // a failed secondary upload leaves the primary upload in place, there is no rollback
    async fn submit(
        &self,
        kind: ResourceKind,
        service: &str,
        submission: &Submission,
    ) -> Result<CreatedJob> {
        let params = submission.signed_url_params();
        let metadata = submission.metadata_for(kind);

        let signed = self
            .generate_signed_url(service, kind, &metadata, &params)
            .await?;

        self.upload_role(&signed, KEY_DOCUMENT, &submission.document)
            .await?;
        for (_, role, source) in submission.secondary_documents() {
            self.upload_role(&signed, role, source).await?;
        }

        tracing::info!("Created {} {} for service {}", kind, signed.id, service);
        Ok(CreatedJob {
            id: signed.id,
            status_url: signed.status_url,
        })
    }

    async fn upload_role(
        &self,
        signed: &SignedUrl,
        role: &str,
        source: &DocumentSource,
    ) -> Result<()> {
        let url = signed.urls.get(role).ok_or_else(|| {
            Error::MalformedResponse(format!("no `{}` upload url for {}", role, signed.id))
        })?;
        let body = source.load().await?;
        self.upload_file(url, body).await
    }
}
