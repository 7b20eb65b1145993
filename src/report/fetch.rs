use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::ReportRequest;
use crate::documents::{DOCX_MIME_TYPE, Document, DocumentKind};
use crate::{DobbError, Result};

/// Downloads PRD documents, optionally restricted to one URL prefix
#[derive(Debug, Clone)]
pub struct PrdFetcher {
    allowed_prefix: Option<String>,
    agent: ureq::Agent,
}

impl PrdFetcher {
    #[inline]
    pub fn new(allowed_prefix: Option<String>, timeout_seconds: u64) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            allowed_prefix,
            agent,
        }
    }

    /// Reject URLs that are malformed, not http(s), or outside the allowed prefix
    #[inline]
    pub fn check_url(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url)
            .map_err(|e| DobbError::Validation(format!("Invalid PRD URL '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(DobbError::Validation(format!(
                "PRD URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if let Some(prefix) = &self.allowed_prefix {
            if !url.starts_with(prefix.as_str()) {
                return Err(DobbError::Validation(format!(
                    "PRD URL must start with {}",
                    prefix
                )));
            }
        }
        Ok(parsed)
    }

    /// Fetch a PRD and return its text. Blocking.
    #[inline]
    pub fn fetch(&self, url: &str) -> Result<String> {
        let parsed = self.check_url(url)?;
        debug!("Fetching PRD from {}", parsed);

        let mut response = self
            .agent
            .get(parsed.as_str())
            .call()
            .map_err(|e| DobbError::Upstream(format!("Failed to fetch PRD from {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("PRD download from {} answered {}", url, status);
            return Err(DobbError::Upstream(format!(
                "PRD download from {} returned {}",
                url, status
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let kind = DocumentKind::from_file_name(parsed.path())
            .or_else(|| kind_from_content_type(&content_type))
            .unwrap_or(DocumentKind::Text);
        debug!("PRD at {} read as {:?}", url, kind);

        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| DobbError::Upstream(format!("Failed to read PRD body: {}", e)))?;

        Ok(Document::from_bytes(url, kind, &bytes)?.text)
    }

    /// PRD text from the request, downloading it when only a URL is given
    #[inline]
    pub async fn resolve(&self, request: ReportRequest) -> Result<String> {
        let prd = match (request.prd_text, request.prd_url) {
            (Some(text), _) if !text.trim().is_empty() => text,
            (_, Some(url)) if !url.trim().is_empty() => {
                let url = url.trim().to_string();
                self.check_url(&url)?;
                let fetcher = self.clone();
                tokio::task::spawn_blocking(move || fetcher.fetch(&url))
                    .await
                    .map_err(|e| {
                        DobbError::Other(anyhow::anyhow!("PRD fetch task failed: {}", e))
                    })??
            }
            _ => {
                return Err(DobbError::Validation(
                    "PRD cannot be empty: provide prd_text or prd_url".to_string(),
                ));
            }
        };

        if prd.trim().is_empty() {
            return Err(DobbError::Validation("PRD cannot be empty".to_string()));
        }
        Ok(prd)
    }
}

fn kind_from_content_type(content_type: &str) -> Option<DocumentKind> {
    if content_type.starts_with("application/pdf") {
        Some(DocumentKind::Pdf)
    } else if content_type.starts_with(DOCX_MIME_TYPE) {
        Some(DocumentKind::Docx)
    } else {
        None
    }
}
