//! HTTP fetch-and-cache for version manifests and server artifacts.
//!
//! Everything here is blocking (ureq); installers run on the blocking pool.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use ureq::{Agent, AgentBuilder};

const USER_AGENT: &str = concat!("server-installer/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the content returned by [`Fetch::fetch_or_cache`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Downloaded now and written to the cache
    Fresh,
    /// Cache younger than the max age
    Cache,
    /// Network failed, an expired cache was used instead
    StaleCache,
}

pub trait Fetch: Send + Sync {
    /// GET `url` as text.
    fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Download `url` to `target`, returning the number of bytes written.
    fn download(&self, url: &str, target: &Path) -> Result<u64, FetchError>;

    /// Text content of `url`, served from `cache_path` while it is younger
    /// than `max_age`. An expired cache still answers when the network fails.
    fn fetch_or_cache(
        &self,
        url: &str,
        cache_path: &Path,
        max_age: Duration,
    ) -> Result<(String, FetchOrigin), FetchError> {
        if let Some(age) = cache_age(cache_path) {
            if age < max_age {
                let content = fs::read_to_string(cache_path).map_err(|e| FetchError::io(cache_path, e))?;
                tracing::debug!("Using cached {} ({}s old)", cache_path.display(), age.as_secs());
                return Ok((content, FetchOrigin::Cache));
            }
        }

        match self.fetch_text(url) {
            Ok(content) => {
                if let Err(e) = write_cache(cache_path, &content) {
                    tracing::warn!("Failed to write cache {}: {}", cache_path.display(), e);
                }
                Ok((content, FetchOrigin::Fresh))
            }
            Err(err) => match fs::read_to_string(cache_path) {
                Ok(content) => {
                    tracing::warn!("{}; falling back to stale cache {}", err, cache_path.display());
                    Ok((content, FetchOrigin::StaleCache))
                }
                Err(_) => Err(err),
            },
        }
    }
}

fn cache_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    // A timestamp in the future counts as brand new
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}

fn write_cache(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

// ─── HTTP implementation ─────────────────────────────────────

pub struct HttpFetcher {
    agent: Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn get(&self, url: &str) -> Result<ureq::Response, FetchError> {
        tracing::debug!("GET {}", url);
        match self.agent.get(url).call() {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Err(e) => Err(FetchError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.get(url)?;
        resp.into_string().map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn download(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
        let resp = self.get(url)?;
        let total: Option<u64> = resp.header("Content-Length").and_then(|v| v.parse().ok());
        match total {
            Some(total) => tracing::info!("Downloading {} ({})", url, format_size(total)),
            None => tracing::info!("Downloading {}", url),
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        save_stream(resp.into_reader(), url, target, total)
    }
}

/// Stream `reader` into `<target>.part`, then rename it over `target`.
/// The partial file is removed when anything fails on the way.
fn save_stream<R: Read>(reader: R, url: &str, target: &Path, total: Option<u64>) -> Result<u64, FetchError> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    let part = target.with_file_name(format!("{}.part", name));

    let result = copy_to_part(reader, url, &name, &part, total)
        .and_then(|written| fs::rename(&part, target).map(|_| written).map_err(|e| FetchError::io(target, e)));
    match result {
        Ok(written) => {
            tracing::info!("Saved {} ({})", target.display(), format_size(written));
            Ok(written)
        }
        Err(e) => {
            if part.exists() {
                if let Err(rm) = fs::remove_file(&part) {
                    tracing::warn!("Cannot remove {}: {}", part.display(), rm);
                }
            }
            Err(e)
        }
    }
}

fn copy_to_part<R: Read>(
    mut reader: R,
    url: &str,
    name: &str,
    part: &Path,
    total: Option<u64>,
) -> Result<u64, FetchError> {
    let mut file = fs::File::create(part).map_err(|e| FetchError::io(part, e))?;
    let mut buf = [0u8; 64 * 1024];
    let mut written: u64 = 0;
    let mut next_report = 10u64;
    loop {
        let n = reader.read(&mut buf).map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(|e| FetchError::io(part, e))?;
        written += n as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = written * 100 / total;
            if percent >= next_report {
                tracing::info!("  {}: {}% ({}/{})", name, percent, format_size(written), format_size(total));
                next_report = (percent / 10 + 1) * 10;
            }
        }
    }
    file.flush().map_err(|e| FetchError::io(part, e))?;
    Ok(written)
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
