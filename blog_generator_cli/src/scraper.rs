use crate::error::{Error, Result};
use crate::{ExtractionResult, Job};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Retrieves a document and pulls out the paragraphs a job asks for.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult>;
}

pub fn out_of_range_message(index: usize) -> String {
    format!("Paragraph index {index} out of range.")
}

/// Picks `selectors` out of the paragraph blocks of `body`.
///
/// Blocks are counted in document order, empty ones included, so an index
/// means the same thing it does when reading the page source.
pub fn select_paragraphs(body: &str, paragraph_selector: &Selector, selectors: &[usize]) -> Vec<String> {
    let doc = Html::parse_document(body);
    let blocks: Vec<String> = doc
        .select(paragraph_selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    selectors
        .iter()
        .map(|&index| match blocks.get(index) {
            Some(text) => text.clone(),
            None => out_of_range_message(index),
        })
        .collect()
}

pub struct HtmlExtractor {
    client: Client,
    paragraph_selector: Selector,
    timeout: Duration,
}

impl HtmlExtractor {
    pub fn new(timeout: Duration, paragraph_selector: &str) -> Result<Self> {
        let paragraph_selector = Selector::parse(paragraph_selector).map_err(|e| {
            Error::config(
                format!("invalid paragraph selector '{paragraph_selector}': {e:?}"),
                "BLOG_PARAGRAPH_SELECTOR",
            )
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blog_generator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            paragraph_selector,
            timeout,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        tracing::debug!(url = %url, "fetching document");

        let res = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    stage: "fetch".into(),
                    after: self.timeout,
                }
            } else {
                Error::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        if let Some(content_type) = res.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default().to_lowercase();
            let readable = content_type.is_empty()
                || content_type.starts_with("text/")
                || content_type.contains("html")
                || content_type.contains("xml");
            if !readable {
                return Err(Error::Parse {
                    url: url.to_string(),
                    message: format!("unsupported content type '{content_type}'"),
                });
            }
        }

        let body = res.text().await.map_err(|e| Error::Parse {
            url: url.to_string(),
            message: format!("unreadable body: {e}"),
        })?;

        Ok(body)
    }
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult> {
        let body = self.fetch(&job.source).await?;
        let segments = select_paragraphs(&body, &self.paragraph_selector, &job.selectors);
        let missing = job
            .selectors
            .iter()
            .zip(&segments)
            .filter(|(i, s)| **s == out_of_range_message(**i))
            .count();
        if missing > 0 {
            tracing::warn!(url = %job.source, ordinal = job.ordinal, missing, "paragraph indices out of range");
        }
        Ok(ExtractionResult {
            job_ordinal: job.ordinal,
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>t</title></head><body>
        <p>First <b>bold</b> paragraph.</p>
        <div><p>  Second one.  </p></div>
        <p></p>
        <p>Fourth.</p>
    </body></html>"#;

    fn p() -> Selector {
        Selector::parse("p").unwrap()
    }

    #[test]
    fn selects_in_requested_order() {
        let segments = select_paragraphs(PAGE, &p(), &[1, 0]);
        assert_eq!(segments, vec!["Second one.", "First bold paragraph."]);
    }

    #[test]
    fn empty_paragraphs_keep_their_index() {
        let segments = select_paragraphs(PAGE, &p(), &[2, 3]);
        assert_eq!(segments, vec!["".to_string(), "Fourth.".to_string()]);
    }

    #[test]
    fn out_of_range_index_yields_placeholder() {
        let segments = select_paragraphs(PAGE, &p(), &[0, 4, 99]);
        assert_eq!(segments[0], "First bold paragraph.");
        assert_eq!(segments[1], "Paragraph index 4 out of range.");
        assert_eq!(segments[2], "Paragraph index 99 out of range.");
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let err = HtmlExtractor::new(Duration::from_secs(1), "p[").err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn extracts_from_served_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(PAGE, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let extractor = HtmlExtractor::new(Duration::from_secs(5), "p").unwrap();
        let job = Job::new(
            7,
            Url::parse(&format!("{}/article", server.uri())).unwrap(),
            vec![3, 10],
        );
        let result = extractor.extract(&job).await.unwrap();
        assert_eq!(result.job_ordinal, 7);
        assert_eq!(result.segments, vec!["Fourth.", "Paragraph index 10 out of range."]);
    }

    #[tokio::test]
    async fn article_mentioning_browser_checks_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<p>Tips: when a site shows Checking your browser, wait.</p><p>Second.</p>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let extractor = HtmlExtractor::new(Duration::from_secs(5), "p").unwrap();
        let job = Job::new(0, Url::parse(&server.uri()).unwrap(), vec![1]);
        let result = extractor.extract(&job).await.unwrap();
        assert_eq!(result.segments, vec!["Second."]);
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let extractor = HtmlExtractor::new(Duration::from_secs(5), "p").unwrap();
        let job = Job::new(0, Url::parse(&server.uri()).unwrap(), vec![0]);
        let err = extractor.extract(&job).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn binary_content_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0x25, 0x50, 0x44, 0x46], "application/pdf"),
            )
            .mount(&server)
            .await;

        let extractor = HtmlExtractor::new(Duration::from_secs(5), "p").unwrap();
        let job = Job::new(0, Url::parse(&server.uri()).unwrap(), vec![0]);
        let err = extractor.extract(&job).await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(PAGE, "text/html")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let extractor = HtmlExtractor::new(Duration::from_millis(50), "p").unwrap();
        let job = Job::new(0, Url::parse(&server.uri()).unwrap(), vec![0]);
        let err = extractor.extract(&job).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Timeout);
    }
}
