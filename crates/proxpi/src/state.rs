//! The application state threaded through every handler via `axum::State`,
//! constructed once at startup -- replaces the module-level singletons the
//! source service used (spec.md §9 REDESIGN FLAGS).

use proxpi_cache::FileCache;
use proxpi_index::{client, CacheAggregator, IndexSource};

use crate::config::Config;

pub struct AppState {
    pub aggregator: CacheAggregator,
    pub file_cache: FileCache,
    pub binary_file_mime_type: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let client_config = client::ClientConfig {
            user_agent: format!("proxpi/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            danger_accept_invalid_certs: config.disable_index_ssl_verification,
        };
        let index_client = client::build_client(&client_config).expect("failed to build index HTTP client");

        let root = IndexSource::new(0, config.index_url.clone(), config.index_ttl, index_client.clone());
        let extras = config
            .extra_index_urls
            .iter()
            .zip(config.extra_index_ttls.iter())
            .enumerate()
            .map(|(i, (url, ttl))| IndexSource::new(i + 1, url.clone(), *ttl, index_client.clone()))
            .collect();
        let aggregator = CacheAggregator::new(root, extras);

        let download_client = reqwest_middleware::ClientBuilder::new(
            reqwest::Client::builder()
                .user_agent(client_config.user_agent)
                .danger_accept_invalid_certs(config.disable_index_ssl_verification)
                .build()
                .expect("failed to build file-download HTTP client"),
        )
        .build();

        let file_cache = FileCache::new(
            config.cache_dir.clone(),
            config.cache_size,
            download_client,
            config.download_timeout,
        );

        if config.owned_cache_dir.is_none() {
            let num_indexes = 1 + config.extra_index_urls.len();
            match file_cache.adopt_existing(num_indexes) {
                Ok(0) => {}
                Ok(n) => tracing::info!(adopted = n, "adopted pre-existing cached files from supplied cache dir"),
                Err(e) => tracing::warn!(error = %e, "failed to scan supplied cache dir for pre-existing files"),
            }
        }

        Self {
            aggregator,
            file_cache,
            binary_file_mime_type: config.binary_file_mime_type,
        }
    }
}

