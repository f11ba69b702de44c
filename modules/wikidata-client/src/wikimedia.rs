//! Wikimedia REST and action API fetchers: pageviews, backlinks, article summaries.

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use timeline_common::Config;
use tracing::{debug, info};
use url::Url;

use crate::bindings::article_title_from_url;
use crate::error::{check_status, Result, WikidataError};
use crate::retry::{RetryExecutor, RetryPolicy};

const PAGEVIEWS_BASE: &str =
    "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article/en.wikipedia.org/all-access/all-agents";
const ACTION_API: &str = "https://en.wikipedia.org/w/api.php";
const SUMMARY_BASE: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";

pub const BACKLINKS_LIMIT: u32 = 500;
const PAGEVIEW_WINDOW_DAYS: i64 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Engagement metrics for one article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub pageviews_30d: u64,
    pub backlinks: u32,
}

#[derive(Debug, Deserialize)]
struct PageviewsResponse {
    #[serde(default)]
    items: Vec<PageviewItem>,
}

#[derive(Debug, Deserialize)]
struct PageviewItem {
    #[serde(default)]
    views: u64,
}

#[derive(Debug, Default, Deserialize)]
struct BacklinksResponse {
    #[serde(default)]
    query: BacklinksQuery,
}

#[derive(Debug, Default, Deserialize)]
struct BacklinksQuery {
    #[serde(default)]
    backlinks: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    extract: Option<String>,
}

pub struct WikimediaClient {
    http: reqwest::Client,
    retry: RetryExecutor,
    request_delay: Duration,
    summary_delay: Duration,
}

impl WikimediaClient {
    pub fn new(
        user_agent: &str,
        retry: RetryExecutor,
        request_delay: Duration,
        summary_delay: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            retry,
            request_delay,
            summary_delay,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = RetryPolicy::new(config.wikimedia_max_attempts, config.wikimedia_backoff);
        Self::new(
            &config.user_agent(),
            RetryExecutor::new(policy),
            config.request_delay,
            config.summary_delay,
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, operation: &str, url: &Url) -> Result<T> {
        self.retry
            .run(operation, || async {
                let resp = self.http.get(url.clone()).send().await?;
                let body = check_status(resp).await?.text().await?;
                serde_json::from_str::<T>(&body).map_err(WikidataError::from)
            })
            .await
    }

    /// Sum of daily views over the trailing 30 days. Empty titles cost no request.
    pub async fn pageviews_30d(&self, title: &str) -> Result<u64> {
        if title.trim().is_empty() {
            return Ok(0);
        }
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(PAGEVIEW_WINDOW_DAYS);
        let url = pageviews_url(title, start, end)?;
        let data: PageviewsResponse = self.get_json("pageviews", &url).await?;
        Ok(data.items.iter().map(|item| item.views).sum())
    }

    /// Count of linking articles, bounded by [`BACKLINKS_LIMIT`].
    pub async fn backlink_count(&self, title: &str) -> Result<u32> {
        if title.trim().is_empty() {
            return Ok(0);
        }
        let url = backlinks_url(title)?;
        let data: BacklinksResponse = self.get_json("backlinks", &url).await?;
        Ok((data.query.backlinks.len() as u32).min(BACKLINKS_LIMIT))
    }

    /// Pageviews then backlinks, pacing each call. A missing title yields zeros
    /// without any request.
    pub async fn engagement(&self, title: Option<&str>) -> Result<Engagement> {
        let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
            return Ok(Engagement::default());
        };
        let pageviews_30d = paced(self.request_delay, self.pageviews_30d(title)).await?;
        let backlinks = paced(self.request_delay, self.backlink_count(title)).await?;
        debug!(title, pageviews_30d, backlinks, "Fetched engagement");
        Ok(Engagement {
            pageviews_30d,
            backlinks,
        })
    }

    /// Plain-text lead extract for an article URL. `None` when the URL has no
    /// article title or the summary carries no text.
    pub async fn summary_extract(&self, article_url: &str) -> Result<Option<String>> {
        let Some(url) = summary_url(article_url)? else {
            return Ok(None);
        };
        let data: SummaryResponse =
            paced(self.summary_delay, self.get_json("article summary", &url)).await?;
        let extract = data
            .extract
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if extract.is_some() {
            info!(article_url, "Fetched article extract");
        }
        Ok(extract)
    }
}

/// Wait `delay`, then run `call`.
pub(crate) async fn paced<T>(delay: Duration, call: impl Future<Output = T>) -> T {
    tokio::time::sleep(delay).await;
    call.await
}

// --- Title encoding ---

fn decode(title: &str) -> String {
    urlencoding::decode(title)
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| title.to_string())
}

/// Title form used by the pageviews and summary APIs: decoded, spaces as underscores.
pub fn path_title(title: &str) -> String {
    decode(title.trim()).replace(' ', "_")
}

/// Title form used by the backlinks API: decoded, underscores as spaces.
pub fn query_title(title: &str) -> String {
    decode(title.trim()).replace('_', " ")
}

fn with_segments(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| WikidataError::Parse(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| WikidataError::Parse(format!("{base} cannot take path segments")))?
        .extend(segments);
    Ok(url)
}

pub fn pageviews_url(title: &str, start: NaiveDate, end: NaiveDate) -> Result<Url> {
    let start = start.format("%Y%m%d").to_string();
    let end = end.format("%Y%m%d").to_string();
    let title = path_title(title);
    with_segments(
        PAGEVIEWS_BASE,
        &[title.as_str(), "daily", start.as_str(), end.as_str()],
    )
}

pub fn backlinks_url(title: &str) -> Result<Url> {
    let limit = BACKLINKS_LIMIT.to_string();
    Url::parse_with_params(
        ACTION_API,
        &[
            ("action", "query"),
            ("list", "backlinks"),
            ("bltitle", query_title(title).as_str()),
            ("bllimit", limit.as_str()),
            ("format", "json"),
        ],
    )
    .map_err(|e| WikidataError::Parse(format!("{ACTION_API}: {e}")))
}

pub fn summary_url(article_url: &str) -> Result<Option<Url>> {
    let Some(title) = article_title_from_url(article_url.trim()) else {
        return Ok(None);
    };
    with_segments(SUMMARY_BASE, &[path_title(&title).as_str()]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pageviews_url_encodes_title_with_underscores() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let url = pageviews_url("Battle of Midway", start, end).unwrap();
        assert!(url
            .as_str()
            .ends_with("/all-agents/Battle_of_Midway/daily/20240501/20240531"));
    }

    #[test]
    fn pageviews_url_keeps_encoded_titles_single_encoded() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let url = pageviews_url("Siege_of_Orl%C3%A9ans", start, start).unwrap();
        assert!(url.as_str().contains("/Siege_of_Orl%C3%A9ans/daily/"));
    }

    #[test]
    fn backlinks_query_uses_spaces() {
        let url = backlinks_url("Battle_of_Midway").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("bltitle".into(), "Battle of Midway".into())));
        assert!(pairs.contains(&("bllimit".into(), "500".into())));
    }

    #[test]
    fn summary_url_from_article_url() {
        let url = summary_url("https://en.wikipedia.org/wiki/Treaty_of_Versailles")
            .unwrap()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Treaty_of_Versailles"
        );
        assert!(summary_url("https://example.org/about").unwrap().is_none());
        assert!(summary_url("").unwrap().is_none());
    }

    #[test]
    fn title_forms() {
        assert_eq!(path_title("Fall of Rome"), "Fall_of_Rome");
        assert_eq!(query_title("Fall_of_Rome"), "Fall of Rome");
        assert_eq!(query_title("D%C3%BCppel"), "Düppel");
    }

    #[tokio::test]
    async fn missing_title_costs_nothing() {
        let client = WikimediaClient::new(
            "test-agent",
            RetryExecutor::new(RetryPolicy::new(1, Duration::ZERO)),
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(client.engagement(None).await.unwrap(), Engagement::default());
        assert_eq!(client.engagement(Some("  ")).await.unwrap(), Engagement::default());
        assert_eq!(client.pageviews_30d("").await.unwrap(), 0);
        assert_eq!(client.summary_extract("not a url").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_calls_wait_before_each_request() {
        let delay = Duration::from_millis(250);
        let start = tokio::time::Instant::now();

        let first = paced(delay, async { tokio::time::Instant::now() }).await;
        let second = paced(delay, async { tokio::time::Instant::now() }).await;

        assert_eq!(first - start, delay);
        assert_eq!(second - first, delay);
        assert_eq!(start.elapsed(), 2 * delay);
    }
}
