//! Static page fetching over HTTP and from local files.

use async_trait::async_trait;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Url};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::CODE_PARAM;
use crate::config::ScraperConfig;
use crate::error::FetchError;

/// Endpoint that only answers a form POST of its detail code
const POST_ENDPOINT_PREFIX: &str = "/JRADB/accessK.html";

/// Anything that can turn a URL into page markup.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// How a URL is requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Get(String),
    /// Form POST of `cname=<code>` to `url`
    PostCode { url: String, code: String },
}

/// Decide between GET and the hidden-form POST the site expects for
/// jockey pages.
pub fn plan_request(url: &str) -> FetchRequest {
    let Ok(parsed) = Url::parse(url) else {
        return FetchRequest::Get(url.to_string());
    };
    if !parsed.path().starts_with(POST_ENDPOINT_PREFIX) {
        return FetchRequest::Get(url.to_string());
    }
    match parsed
        .query_pairs()
        .find(|(k, v)| k == CODE_PARAM && !v.is_empty())
    {
        Some((_, code)) => FetchRequest::PostCode {
            url: url.to_string(),
            code: code.into_owned(),
        },
        None => FetchRequest::Get(url.to_string()),
    }
}

/// Charsets tried for network responses after any declared charset
pub fn network_charsets() -> [&'static Encoding; 2] {
    [SHIFT_JIS, UTF_8]
}

/// Charsets tried for local files
pub fn file_charsets() -> [&'static Encoding; 2] {
    [UTF_8, SHIFT_JIS]
}

/// Decode with the first charset that fits the bytes exactly, else lossy UTF-8.
pub fn decode_bytes(bytes: &[u8], charsets: &[&'static Encoding]) -> String {
    for encoding in charsets {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Charset named by a `Content-Type` header value, if encoding_rs knows it.
fn declared_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Encoding::for_label(value.trim().trim_matches('"').as_bytes()))
}

/// Static HTTP fetcher
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn send(&self, request: &FetchRequest) -> Result<reqwest::Response, reqwest::Error> {
        match request {
            FetchRequest::Get(url) => {
                self.client
                    .get(url)
                    .header(USER_AGENT, &self.user_agent)
                    .send()
                    .await
            }
            FetchRequest::PostCode { url, code } => {
                self.client
                    .post(url)
                    .header(USER_AGENT, &self.user_agent)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(format!("{CODE_PARAM}={code}"))
                    .send()
                    .await
            }
        }
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let request = plan_request(url);
        debug!(url, post = matches!(request, FetchRequest::PostCode { .. }), "Fetching");

        let response = self.send(&request).await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(declared_charset);

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let mut charsets: Vec<&'static Encoding> = declared.into_iter().collect();
        charsets.extend(network_charsets());
        Ok(decode_bytes(&bytes, &charsets))
    }
}

/// Read a local HTML file, detecting its charset.
pub async fn read_html_file(path: &Path) -> Result<String, FetchError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| FetchError::File {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decode_bytes(&bytes, &file_charsets()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_request_posts_jockey_code() {
        let url = "https://www.jra.go.jp/JRADB/accessK.html?cname=pw04kmk001158/EF";
        assert_eq!(
            plan_request(url),
            FetchRequest::PostCode {
                url: url.to_string(),
                code: "pw04kmk001158/EF".to_string(),
            }
        );
    }

    #[test]
    fn test_plan_request_gets_everything_else() {
        for url in [
            "https://www.jra.go.jp/JRADB/accessU.html?cname=pw01dud001/AA",
            "https://www.jra.go.jp/JRADB/accessK.html",
            "https://www.jra.go.jp/JRADB/accessK.html?cname=",
            "not a url",
        ] {
            assert_eq!(plan_request(url), FetchRequest::Get(url.to_string()));
        }
    }

    #[test]
    fn test_decode_shift_jis() {
        let (encoded, _, _) = SHIFT_JIS.encode("出馬表 中山");
        assert!(std::str::from_utf8(&encoded).is_err());
        assert_eq!(decode_bytes(&encoded, &network_charsets()), "出馬表 中山");
    }

    #[test]
    fn test_decode_prefers_first_matching_charset() {
        // ASCII decodes under every charset
        assert_eq!(decode_bytes(b"<html></html>", &file_charsets()), "<html></html>");
        assert_eq!(decode_bytes("馬名".as_bytes(), &file_charsets()), "馬名");
    }

    #[test]
    fn test_decode_falls_back_to_lossy() {
        // 0x82 followed by 0xFF is neither valid UTF-8 nor Shift_JIS
        let bytes = [b'a', 0x82, 0xFF, b'b'];
        let text = decode_bytes(&bytes, &network_charsets());
        assert!(text.starts_with('a'));
        assert!(text.ends_with('b'));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_declared_charset() {
        assert_eq!(declared_charset("text/html; charset=Shift_JIS"), Some(SHIFT_JIS));
        assert_eq!(declared_charset("text/html;charset=\"utf-8\""), Some(UTF_8));
        assert_eq!(declared_charset("text/html"), None);
        assert_eq!(declared_charset("text/html; charset=bogus"), None);
    }

    #[tokio::test]
    async fn test_read_html_file_shift_jis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.html");
        let (encoded, _, _) = SHIFT_JIS.encode("<p>有馬記念</p>");
        std::fs::write(&path, &encoded).unwrap();

        assert_eq!(read_html_file(&path).await.unwrap(), "<p>有馬記念</p>");
    }

    #[tokio::test]
    async fn test_read_html_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_html_file(&dir.path().join("none.html")).await.unwrap_err();
        assert!(matches!(err, FetchError::File { .. }));
    }
}
