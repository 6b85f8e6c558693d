use crate::error::AppError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{Builder, TempPath};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_IMAGES: &str = "image/jpeg,image/png,image/webp,image/*,*/*;q=0.8";

pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads remote images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedImage, AppError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedImage, AppError> {
        log::debug!("Downloading {} (timeout {:?})", url, timeout);
        let referer = format!("{}://{}/", url.scheme(), url.host_str().unwrap_or_default());

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(ACCEPT, ACCEPT_IMAGES)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(REFERER, referer)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        log::trace!("Downloaded {} bytes from {} ({:?})", bytes.len(), url, content_type);

        Ok(FetchedImage { bytes, content_type })
    }
}

/// A readable local file for one request. Temporary files are removed when
/// this is dropped.
#[derive(Debug)]
pub struct ResolvedImage {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl ResolvedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    fn temporary(bytes: &[u8], suffix: &str) -> Result<Self, AppError> {
        let mut file = Builder::new().prefix("c2pa_").suffix(suffix).tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        let temp = file.into_temp_path();
        log::trace!("Wrote {} bytes to {:?}", bytes.len(), temp);
        Ok(Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        })
    }
}

impl Drop for ResolvedImage {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                log::error!("Failed to remove temporary file {:?}: {}", self.path, e);
            }
        }
    }
}

fn remote_url(uri: &str) -> Option<Url> {
    Url::parse(uri)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Turns a local path or an http(s) URL into a file on disk.
pub async fn resolve(
    uri: &str,
    fetcher: &dyn ImageFetcher,
    timeout: Duration,
) -> Result<ResolvedImage, AppError> {
    match remote_url(uri) {
        Some(url) => {
            let fetched = fetcher.fetch(&url, timeout).await?;
            let suffix = infer_extension(fetched.content_type.as_deref(), &url);
            ResolvedImage::temporary(&fetched.bytes, suffix)
        }
        None => {
            let path = PathBuf::from(uri);
            if !path.is_file() {
                log::debug!("Local image not found: {:?}", path);
                return Err(AppError::NotFound("Image file not found".to_string()));
            }
            Ok(ResolvedImage { path, temp: None })
        }
    }
}

/// Stores uploaded bytes, keeping the extension of the uploaded file name.
pub fn from_upload(bytes: &[u8], filename: Option<&str>) -> Result<ResolvedImage, AppError> {
    let suffix = filename
        .and_then(|name| Path::new(name).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    ResolvedImage::temporary(bytes, &suffix)
}

pub fn infer_extension(content_type: Option<&str>, url: &Url) -> &'static str {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("jpeg") || content_type.contains("jpg") {
        ".jpg"
    } else if content_type.contains("png") || url.path().to_ascii_lowercase().ends_with(".png") {
        ".png"
    } else {
        ".jpg"
    }
}

/// Last path segment of a URL, or the file name of a local path.
pub fn display_name(uri: &str) -> String {
    let name = match remote_url(uri) {
        Some(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        None => Path::new(uri)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| "image".to_string())
}
