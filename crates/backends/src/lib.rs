//! Fetchers and compositors for the try-on bot.
//!
//! All fetchers implement `tryon_core::Fetcher` and all compositors implement
//! `tryon_core::Compositor`. [`build_fetcher`] and [`build_compositor`] pick
//! implementations from configuration.

pub mod file_fetcher;
pub mod http_compositor;
pub mod http_fetcher;
pub mod merge;
pub mod router;

pub use file_fetcher::FileFetcher;
pub use http_compositor::HttpCompositor;
pub use http_fetcher::HttpFetcher;
pub use merge::MergeCompositor;
pub use router::{FetchRouter, RefuseLocal};

use std::sync::Arc;

use tryon_config::AppConfig;
use tryon_core::{Compositor, Error, Fetcher};

/// Build the fetcher for attachments arriving over the webhook.
///
/// Only network locators are accepted; a local path is refused with a 400
/// status instead of being read from disk.
pub fn build_remote_fetcher(config: &AppConfig) -> Result<Arc<dyn Fetcher>, Error> {
    let http = Arc::new(http_fetcher_from(config)?);
    Ok(Arc::new(FetchRouter::new(http, Arc::new(RefuseLocal))))
}

/// Build the fetcher for local sessions.
///
/// `http://` and `https://` references go to the network, everything else is
/// read from the local filesystem.
pub fn build_fetcher(config: &AppConfig) -> Result<Arc<dyn Fetcher>, Error> {
    let http = Arc::new(http_fetcher_from(config)?);
    Ok(Arc::new(FetchRouter::new(http, Arc::new(FileFetcher))))
}

fn http_fetcher_from(config: &AppConfig) -> Result<HttpFetcher, Error> {
    let fetch = &config.fetch;
    HttpFetcher::new(
        fetch.attempt_timeout(),
        fetch.username.clone(),
        fetch.password.clone(),
    )
}

/// Build the configured composition backend.
pub fn build_compositor(config: &AppConfig) -> Result<Arc<dyn Compositor>, Error> {
    let comp = &config.composition;
    let output_dir = config.storage.output_dir.clone();
    match comp.backend.as_str() {
        "http" => {
            let endpoint = comp.endpoint.clone().ok_or_else(|| Error::Config {
                message: "composition.endpoint is required for the http backend".into(),
            })?;
            Ok(Arc::new(HttpCompositor::new(
                endpoint,
                comp.api_token.clone(),
                comp.seed,
                comp.timeout(),
                output_dir,
            )?))
        }
        "merge" | "stub" => Ok(Arc::new(MergeCompositor::new(output_dir))),
        other => Err(Error::Config {
            message: format!("unknown composition backend '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_merge() {
        let mut config = AppConfig::default();
        let compositor = build_compositor(&config).unwrap();
        assert_eq!(compositor.name(), "merge");

        config.composition.backend = "stub".into();
        assert_eq!(build_compositor(&config).unwrap().name(), "merge");
        let fetcher = build_fetcher(&config).unwrap();
        assert_eq!(fetcher.name(), "router");
    }

    #[tokio::test]
    async fn remote_fetcher_refuses_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.png");
        tokio::fs::write(&path, b"secret").await.unwrap();

        let fetcher = build_remote_fetcher(&AppConfig::default()).unwrap();
        let err = fetcher.fetch(path.to_str().unwrap()).await.unwrap_err();
        assert_eq!(err, tryon_core::error::FetchFailure::Status(400));

        let local = build_fetcher(&AppConfig::default()).unwrap();
        assert_eq!(local.fetch(path.to_str().unwrap()).await.unwrap(), b"secret");
    }

    #[test]
    fn http_backend_without_endpoint_fails() {
        let mut config = AppConfig::default();
        config.composition.backend = "http".into();
        assert!(matches!(
            build_compositor(&config),
            Err(Error::Config { .. })
        ));

        config.composition.endpoint = Some("http://127.0.0.1:9/tryon".into());
        assert_eq!(build_compositor(&config).unwrap().name(), "http");
    }
}
