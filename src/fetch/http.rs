use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{detect_challenge, FetchOptions, PageFetcher};
use crate::config::{FetchConfig, FetchMode};
use crate::error::FetchError;

enum Route {
    Direct,
    /// Hosted scraping API: the target URL is passed as a query parameter
    Api { endpoint: String, api_key: String },
}

/// Plain HTTP transport, direct or through a scraping API
pub struct HttpFetcher {
    client: Client,
    route: Route,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, api_key: Option<String>) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        let route = match (config.mode, api_key) {
            (FetchMode::Direct, _) => Route::Direct,
            (FetchMode::ScrapingApi, Some(api_key)) => Route::Api {
                endpoint: config.endpoint.clone(),
                api_key,
            },
            (FetchMode::ScrapingApi, None) => {
                return Err(FetchError::Credentials(format!("{} is not set", config.api_key_env)));
            }
        };

        Ok(Self { client, route, timeout })
    }

    fn request(&self, url: &str, options: &FetchOptions) -> reqwest::RequestBuilder {
        let builder = match &self.route {
            Route::Direct => self.client.get(url),
            Route::Api { endpoint, api_key } => self.client.get(endpoint).query(&[
                ("api_key", api_key.as_str()),
                ("url", url),
                ("render_js", if options.render_js { "true" } else { "false" }),
            ]),
        };
        match options.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let timeout = options.timeout.unwrap_or(self.timeout);
        debug!(url = %url, fetcher = self.name(), "Fetching");

        let response = self.request(url, options).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        if matches!(self.route, Route::Api { .. }) && status == 401 {
            return Err(FetchError::Credentials("scraping API rejected the key".to_string()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::from(e)
            }
        })?;

        if let Some(reason) = detect_challenge(status, &body) {
            return Err(FetchError::Blocked { status, reason });
        }
        if !(200..300).contains(&status) {
            return Err(FetchError::Status(status));
        }

        debug!(url = %url, bytes = body.len(), "Fetched");
        Ok(body)
    }

    fn name(&self) -> &'static str {
        match self.route {
            Route::Direct => "http",
            Route::Api { .. } => "scraping_api",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_mode_requires_key() {
        let config = FetchConfig {
            mode: FetchMode::ScrapingApi,
            ..FetchConfig::default()
        };
        assert!(matches!(HttpFetcher::new(&config, None), Err(FetchError::Credentials(_))));
        let fetcher = HttpFetcher::new(&config, Some("key".into())).unwrap();
        assert_eq!(fetcher.name(), "scraping_api");
    }

    #[test]
    fn test_api_request_carries_target_url() {
        let config = FetchConfig {
            mode: FetchMode::ScrapingApi,
            endpoint: "https://api.example.com/v1/".to_string(),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config, Some("secret".into())).unwrap();
        let options = FetchOptions {
            render_js: true,
            timeout: None,
        };
        let request = fetcher
            .request("https://carsandbids.com/auctions/x?y=1", &options)
            .build()
            .unwrap();
        let url = request.url().as_str();
        assert!(url.starts_with("https://api.example.com/v1/?api_key=secret"));
        assert!(url.contains("url=https%3A%2F%2Fcarsandbids.com%2Fauctions%2Fx%3Fy%3D1"));
        assert!(url.contains("render_js=true"));
    }

    #[test]
    fn test_direct_mode_ignores_key() {
        let fetcher = HttpFetcher::new(&FetchConfig::default(), None).unwrap();
        assert_eq!(fetcher.name(), "http");
        let request = fetcher
            .request("https://bringatrailer.com/porsche/", &FetchOptions::default())
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "https://bringatrailer.com/porsche/");
    }
}
