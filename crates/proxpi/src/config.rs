//! Typed configuration assembled once at startup from CLI flags / environment
//! variables, per REDESIGN FLAGS (spec.md §9): no module-level singletons, no
//! scattered `env::var` calls. Uses `clap`'s `env` feature the way
//! `rattler-bin` uses `clap::Parser` for its CLI surface -- every field here
//! doubles as a flag, but proxpi is normally run with only environment
//! variables set (spec.md §6), matching the source service's deployment
//! style.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";
const DEFAULT_INDEX_TTL_SECS: u64 = 1800;
const DEFAULT_EXTRA_TTL_SECS: u64 = 180;
const DEFAULT_CACHE_SIZE: u64 = 5_000_000_000;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: f64 = 0.9;

/// A fixed companion value used when only one of `--connect-timeout` /
/// `--read-timeout` is set (spec.md §6 calls for "a fixed companion value"
/// without naming one; documented as an Open Question resolution in
/// DESIGN.md).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "PROXPI_EXTRA_INDEX_TTLS has {got} entries but PROXPI_EXTRA_INDEX_URLS has {expected}; \
         they must be position-aligned"
    )]
    ExtraTtlMismatch { expected: usize, got: usize },
}

/// Raw CLI/environment surface. Kept separate from [`Config`] so the
/// cross-field validation below (extras alignment, timeout defaulting) has a
/// single place to live instead of being spread across `#[arg]` attributes.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "proxpi",
    about = "Caching reverse proxy for simple-repository package indexes"
)]
pub struct CliArgs {
    #[arg(long, env = "PROXPI_INDEX_URL", default_value = DEFAULT_INDEX_URL)]
    pub index_url: Url,

    #[arg(long, env = "PROXPI_INDEX_TTL", default_value_t = DEFAULT_INDEX_TTL_SECS)]
    pub index_ttl: u64,

    #[arg(long, env = "PROXPI_EXTRA_INDEX_URLS", value_delimiter = ',')]
    pub extra_index_urls: Vec<Url>,

    #[arg(long, env = "PROXPI_EXTRA_INDEX_TTLS", value_delimiter = ',')]
    pub extra_index_ttls: Vec<u64>,

    /// Legacy singular name, applied to every extra when `extra_index_ttls`
    /// is empty.
    #[arg(long, env = "PROXPI_EXTRA_INDEX_TTL")]
    pub extra_index_ttl: Option<u64>,

    #[arg(long, env = "PROXPI_CACHE_SIZE", default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: u64,

    #[arg(long, env = "PROXPI_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, env = "PROXPI_BINARY_FILE_MIME_TYPE", default_value_t = false)]
    pub binary_file_mime_type: bool,

    #[arg(long, env = "PROXPI_DISABLE_INDEX_SSL_VERIFICATION", default_value_t = false)]
    pub disable_index_ssl_verification: bool,

    #[arg(long, env = "PROXPI_DOWNLOAD_TIMEOUT", default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    pub download_timeout: f64,

    #[arg(long, env = "PROXPI_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<f64>,

    #[arg(long, env = "PROXPI_READ_TIMEOUT")]
    pub read_timeout: Option<f64>,

    #[arg(long, env = "PROXPI_LOGGING_LEVEL", default_value = "info")]
    pub logging_level: String,

    #[arg(long, env = "PROXPI_BIND", default_value = "0.0.0.0:5000")]
    pub bind: std::net::SocketAddr,
}

/// The validated, ready-to-use configuration threaded through `AppState`.
pub struct Config {
    pub index_url: Url,
    pub index_ttl: Duration,
    pub extra_index_urls: Vec<Url>,
    pub extra_index_ttls: Vec<Duration>,
    pub cache_size: u64,
    pub cache_dir: PathBuf,
    /// `Some` when proxpi created `cache_dir` itself (no `PROXPI_CACHE_DIR`
    /// given); dropping it removes the directory on shutdown. `None` when
    /// the operator supplied the directory, which is never deleted for them.
    pub owned_cache_dir: Option<tempfile::TempDir>,
    pub binary_file_mime_type: bool,
    pub disable_index_ssl_verification: bool,
    pub download_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub logging_level: String,
    pub bind: std::net::SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::try_from(CliArgs::parse())
    }
}

impl TryFrom<CliArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, ConfigError> {
        let extra_index_ttls = resolve_extra_ttls(&args.extra_index_urls, &args.extra_index_ttls, args.extra_index_ttl)?;
        let (connect_timeout, read_timeout) = resolve_timeouts(args.connect_timeout, args.read_timeout);

        let (cache_dir, owned_cache_dir) = match args.cache_dir {
            Some(dir) => (dir, None),
            None => {
                // A broken/unwritable system temp directory means the
                // process cannot do anything useful; treated the same way
                // `clap`'s own validation failures are (exit immediately),
                // not threaded through `ConfigError`.
                let tempdir = tempfile::Builder::new()
                    .prefix("proxpi-")
                    .tempdir()
                    .expect("failed to create process-owned cache directory");
                (tempdir.path().to_path_buf(), Some(tempdir))
            }
        };

        Ok(Self {
            index_url: args.index_url,
            index_ttl: Duration::from_secs(args.index_ttl),
            extra_index_urls: args.extra_index_urls,
            extra_index_ttls,
            cache_size: args.cache_size,
            cache_dir,
            owned_cache_dir,
            binary_file_mime_type: args.binary_file_mime_type,
            disable_index_ssl_verification: args.disable_index_ssl_verification,
            download_timeout: Duration::from_secs_f64(args.download_timeout),
            connect_timeout,
            read_timeout,
            logging_level: args.logging_level,
            bind: args.bind,
        })
    }
}

fn resolve_extra_ttls(urls: &[Url], explicit: &[u64], legacy_single: Option<u64>) -> Result<Vec<Duration>, ConfigError> {
    if !explicit.is_empty() {
        if explicit.len() != urls.len() {
            return Err(ConfigError::ExtraTtlMismatch {
                expected: urls.len(),
                got: explicit.len(),
            });
        }
        return Ok(explicit.iter().map(|&s| Duration::from_secs(s)).collect());
    }
    let default_secs = legacy_single.unwrap_or(DEFAULT_EXTRA_TTL_SECS);
    Ok(urls.iter().map(|_| Duration::from_secs(default_secs)).collect())
}

fn resolve_timeouts(connect: Option<f64>, read: Option<f64>) -> (Duration, Duration) {
    let connect = connect.map(Duration::from_secs_f64).unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    let read = read.map(Duration::from_secs_f64).unwrap_or(DEFAULT_READ_TIMEOUT);
    (connect, read)
}
