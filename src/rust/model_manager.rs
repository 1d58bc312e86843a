use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::architecture::ModelArchitecture;
use crate::grader::GraderError;

/// Size of the write buffer used while streaming weights to disk
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Environment variable holding the remote location of the weights file
pub const WEIGHTS_URL_ENV: &str = "WEIGHTS_DOWNLOAD_URL";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("WEIGHTS_DOWNLOAD_URL is not set and no weights file exists at {0:?}")]
    MissingDownloadUrl(PathBuf),
    /// Stored without the request URL
    #[error("Download error: {0}")]
    DownloadError(reqwest::Error),
    #[error("Download failed with HTTP status {0}")]
    DownloadStatus(reqwest::StatusCode),
    #[error("Download incomplete: expected {expected} bytes, received {received}")]
    IncompleteDownload { expected: u64, received: u64 },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
    #[error("Architecture file not found: {0:?}")]
    ArchitectureNotFound(PathBuf),
    #[error("Architecture parse error: {0}")]
    ArchitectureParse(#[from] serde_json::Error),
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),
    #[error("Failed to load model: {0}")]
    LoadFailed(#[from] GraderError),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::DownloadError(err.without_url())
    }
}

/// Owns the local models directory and fetches weights into it.
#[derive(Clone, Debug)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
    client: reqwest::Client,
}

impl ModelManager {
    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("KNEEGRADE_CACHE") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("kneegrade").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("kneegrade").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("kneegrade").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
            client: reqwest::Client::new(),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_weights_path(&self, architecture: &ModelArchitecture) -> PathBuf {
        self.models_dir.join(&architecture.weights_file)
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    pub fn is_weights_downloaded(&self, architecture: &ModelArchitecture) -> bool {
        let path = self.get_weights_path(architecture);
        log::info!("Weights path: {:?} (exists: {})", path, path.exists());
        path.exists()
    }

    /// Makes sure the weights file described by `architecture` exists locally.
    ///
    /// An existing file is used as-is without touching the network (it is only
    /// re-hashed when the architecture pins a digest). Otherwise `url` is
    /// required and the file is streamed to disk in a single attempt; a partial
    /// transfer never ends up at the final path.
    ///
    /// # Errors
    /// - `MissingDownloadUrl` if the file is absent and no URL was given
    /// - `DownloadError`, `DownloadStatus`, `IncompleteDownload` if the transfer fails
    /// - `HashMismatch` if a pinned digest does not match
    pub async fn ensure_weights_present(
        &self,
        architecture: &ModelArchitecture,
        url: Option<&str>,
    ) -> Result<PathBuf, ModelError> {
        let _lock = self.download_lock.lock().await;
        let path = self.get_weights_path(architecture);

        if path.exists() {
            log::info!("Model weights found locally at {:?}", path);
            if let Some(expected) = &architecture.weights_sha256 {
                let hash_path = path.clone();
                let actual = tokio::task::spawn_blocking(move || hash_file(&hash_path))
                    .await
                    .map_err(io::Error::other)??;
                let expected = expected.to_lowercase();
                if actual != expected {
                    log::error!("Local weights hash mismatch: expected {}, got {}", expected, actual);
                    return Err(ModelError::HashMismatch {
                        file_type: "weights".to_string(),
                        expected,
                        actual,
                    });
                }
                log::info!("Existing weights file verified successfully");
            }
            return Ok(path);
        }

        let url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => {
                log::error!("{} is not set and {:?} does not exist", WEIGHTS_URL_ENV, path);
                return Err(ModelError::MissingDownloadUrl(path));
            }
        };

        self.download_to_file(url, &path, architecture.weights_sha256.as_deref())
            .await?;
        Ok(path)
    }

    async fn download_to_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<u64, ModelError> {
        log::info!("Downloading weights from {} to {:?}", redact_url(url), path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = Self::partial_path(path);
        let result = match self.stream_to_file(url, &partial, expected_hash).await {
            Ok(received) => tokio::fs::rename(&partial, path)
                .await
                .map(|_| received)
                .map_err(ModelError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(received) => {
                log::info!("Download complete: {} bytes written to {:?}", received, path);
                Ok(received)
            }
            Err(e) => {
                log::error!("Weights download failed: {}", e);
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        log::warn!("Failed to remove partial download {:?}: {}", partial, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        partial: &Path,
        expected_hash: Option<&str>,
    ) -> Result<u64, ModelError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        log::info!("Download response status: {}", status);
        if !status.is_success() {
            return Err(ModelError::DownloadStatus(status));
        }
        let expected_len = response.content_length();

        let file = tokio::fs::File::create(partial).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            writer.write_all(&chunk).await?;
            received += chunk.len() as u64;
        }
        writer.flush().await?;
        writer.get_mut().sync_all().await?;

        if let Some(expected) = expected_len {
            if received != expected {
                return Err(ModelError::IncompleteDownload { expected, received });
            }
        }

        let hash = format!("{:x}", hasher.finalize());
        log::info!("Calculated hash: {}", hash);
        if let Some(expected) = expected_hash {
            let expected = expected.to_lowercase();
            if hash != expected {
                return Err(ModelError::HashMismatch {
                    file_type: "weights".to_string(),
                    expected,
                    actual: hash,
                });
            }
        }

        Ok(received)
    }

    /// Checks the local weights against the pinned digest.
    ///
    /// Returns `false` when the file is missing, `true` when it exists and either
    /// matches or no digest is pinned.
    pub fn verify_weights(&self, architecture: &ModelArchitecture) -> Result<bool, ModelError> {
        let path = self.get_weights_path(architecture);
        if !path.exists() {
            log::info!("Weights file {:?} does not exist", path);
            return Ok(false);
        }
        match &architecture.weights_sha256 {
            Some(expected) => Ok(hash_file(&path)? == expected.to_lowercase()),
            None => Ok(true),
        }
    }

    /// Deletes the cached weights (and any leftover partial download)
    pub fn remove_download(&self, architecture: &ModelArchitecture) -> Result<(), ModelError> {
        let path = self.get_weights_path(architecture);
        let partial = Self::partial_path(&path);

        if path.exists() {
            log::info!("Removing cached weights {:?}", path);
            fs::remove_file(&path)?;
        }
        if partial.exists() {
            fs::remove_file(&partial)?;
        }
        Ok(())
    }
}

/// Drops credentials, query and fragment so a pre-signed URL can be logged
pub(crate) fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    log::info!("Verifying file: {:?}", path);
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
