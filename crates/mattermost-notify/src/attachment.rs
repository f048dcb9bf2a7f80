//! Loading file attachments from disk or from a remote URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{redirect, Url};
use tracing::{debug, instrument, warn};

use crate::config::NotifyConfig;
use crate::error::BridgeError;
use crate::message::{BasicAuth, FileSource};

/// Name used when a URL has no usable last path segment.
const FALLBACK_FILENAME: &str = "attachment";

/// Redirect hops followed when downloading a remote attachment.
const MAX_REDIRECTS: usize = 10;

/// File contents ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Where attachments may come from and how large they may be.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    allowed_paths: Vec<PathBuf>,
    allowed_urls: Vec<Url>,
    restrict_urls: bool,
    max_file_size: u64,
}

impl AttachmentPolicy {
    /// Build a policy. Allowed directories are canonicalized up front so
    /// symlinked roots still match. URL entries that do not parse are
    /// dropped with a warning; they never widen the allow-list.
    #[must_use]
    pub fn new(allowed_paths: &[PathBuf], allowed_urls: &[String], max_file_size: u64) -> Self {
        let parsed = allowed_urls
            .iter()
            .filter_map(|entry| match Url::parse(entry) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "Ignoring invalid allowed URL");
                    None
                }
            })
            .collect();

        Self {
            allowed_paths: allowed_paths
                .iter()
                .map(|dir| std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
                .collect(),
            allowed_urls: parsed,
            restrict_urls: !allowed_urls.is_empty(),
            max_file_size,
        }
    }

    /// A policy with no path or URL restrictions.
    #[must_use]
    pub fn unrestricted(max_file_size: u64) -> Self {
        Self::new(&[], &[], max_file_size)
    }

    #[must_use]
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(
            &config.allowed_paths,
            &config.allowed_urls,
            config.max_file_size,
        )
    }

    /// Check a canonical path against the allowed directories.
    #[must_use]
    pub fn is_allowed_path(&self, path: &Path) -> bool {
        self.allowed_paths.is_empty() || self.allowed_paths.iter().any(|dir| path.starts_with(dir))
    }

    /// Check a URL against the allowed prefixes.
    ///
    /// A prefix matches when scheme, host and port are equal and its path
    /// is a whole-segment prefix of the URL's path.
    #[must_use]
    pub fn is_allowed_url(&self, url: &Url) -> bool {
        !self.restrict_urls || self.allowed_urls.iter().any(|prefix| url_has_prefix(url, prefix))
    }

    /// HTTP client for attachment downloads. Every redirect hop is checked
    /// against the URL allow-list; the bot token is never attached.
    ///
    /// # Errors
    /// Returns [`BridgeError::Transport`] if the client cannot be built.
    pub fn download_client(&self, timeout: Duration) -> Result<reqwest::Client, BridgeError> {
        let policy = self.clone();
        let redirects = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if policy.is_allowed_url(attempt.url()) {
                attempt.follow()
            } else {
                let reason = format!("redirect to {} is not allowed", attempt.url());
                attempt.error(reason)
            }
        });

        reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirects)
            .user_agent(concat!("mattermost-notify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Transport(format!("failed to build HTTP client: {e}")))
    }

    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn check_size(&self, size: u64, what: &str) -> Result<(), BridgeError> {
        if size > self.max_file_size {
            return Err(BridgeError::File(format!(
                "{what} is {size} bytes, limit is {} bytes",
                self.max_file_size
            )));
        }
        Ok(())
    }
}

fn url_has_prefix(url: &Url, prefix: &Url) -> bool {
    if url.scheme() != prefix.scheme()
        || url.host_str() != prefix.host_str()
        || url.port_or_known_default() != prefix.port_or_known_default()
    {
        return false;
    }

    let base = prefix.path();
    match url.path().strip_prefix(base) {
        Some(rest) => base.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Load an attachment from its source.
///
/// # Errors
/// Returns [`BridgeError::File`] if the source is not allowed, cannot be
/// read or fetched, or exceeds the size limit.
pub async fn load(
    source: &FileSource,
    policy: &AttachmentPolicy,
    http: &reqwest::Client,
) -> Result<LoadedFile, BridgeError> {
    match source {
        FileSource::Path(path) => load_local(path, policy).await,
        FileSource::Url { url, credentials } => {
            load_remote(url, credentials.as_ref(), policy, http).await
        }
    }
}

#[instrument(skip(path, policy), fields(path = %path.display()))]
async fn load_local(path: &Path, policy: &AttachmentPolicy) -> Result<LoadedFile, BridgeError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| BridgeError::File(format!("{}: {e}", path.display())))?;

    if !policy.is_allowed_path(&canonical) {
        return Err(BridgeError::File(format!(
            "{} is not in an allowed directory",
            path.display()
        )));
    }

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| BridgeError::File(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(BridgeError::File(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    policy.check_size(metadata.len(), &path.display().to_string())?;

    let bytes = tokio::fs::read(&canonical)
        .await
        .map_err(|e| BridgeError::File(format!("{}: {e}", path.display())))?;

    let filename = canonical
        .file_name()
        .map_or_else(|| FALLBACK_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());

    debug!(filename = %filename, size = bytes.len(), "Loaded local attachment");
    Ok(LoadedFile { filename, bytes })
}

#[instrument(skip(credentials, policy, http))]
async fn load_remote(
    url: &str,
    credentials: Option<&BasicAuth>,
    policy: &AttachmentPolicy,
    http: &reqwest::Client,
) -> Result<LoadedFile, BridgeError> {
    let parsed = Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| BridgeError::File(format!("invalid attachment URL: {url}")))?;

    if !policy.is_allowed_url(&parsed) {
        return Err(BridgeError::File(format!("URL is not allowed: {url}")));
    }

    let mut request = http.get(parsed.clone());
    if let Some(auth) = credentials {
        request = request.basic_auth(&auth.username, Some(&auth.password));
    }

    let response = request
        .send()
        .await
        .map_err(|e| BridgeError::File(format!("failed to download {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BridgeError::File(format!(
            "failed to download {url}: server returned {status}"
        )));
    }
    if let Some(length) = response.content_length() {
        policy.check_size(length, url)?;
    }

    // Chunked responses carry no length; enforce the limit as data arrives.
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| BridgeError::File(format!("failed to download {url}: {e}")))?;
        policy.check_size((bytes.len() + chunk.len()) as u64, url)?;
        bytes.extend_from_slice(&chunk);
    }

    let filename = filename_from_url(&parsed);
    debug!(filename = %filename, size = bytes.len(), "Downloaded remote attachment");

    Ok(LoadedFile { filename, bytes })
}

/// Last non-empty path segment of a URL.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map_or_else(|| FALLBACK_FILENAME.to_string(), str::to_string)
}
