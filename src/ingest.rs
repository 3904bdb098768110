//! URL ingestion: fetch a page and capture it as a document entry

use std::time::Duration;

use crate::VaultError;

/// Response body cap; pages past this are truncated before conversion.
const MAX_FETCH_BYTES: usize = 2 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A fetched page ready to save.
pub struct FetchedPage {
    pub title: Option<String>,
    pub markdown: String,
    pub content_type: String,
}

/// Fetch a URL and convert the payload to markdown.
///
/// HTML goes through `fast_html2md`; plain text and markdown pass through
/// unchanged. Anything else is rejected.
pub fn fetch_url(url: &str) -> Result<FetchedPage, VaultError> {
    let _span = tracing::info_span!("ingest_url", url).entered();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(VaultError::InvalidInput(format!(
            "unsupported URL scheme: {url}"
        )));
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("context-vault/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VaultError::Unknown(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| VaultError::InvalidInput(format!("fetch failed: {e}")))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .split(';')
        .next()
        .unwrap_or("text/html")
        .trim()
        .to_string();

    let mut body = response
        .text()
        .map_err(|e| VaultError::InvalidInput(format!("unreadable response body: {e}")))?;
    if body.len() > MAX_FETCH_BYTES {
        tracing::warn!(bytes = body.len(), cap = MAX_FETCH_BYTES, "Truncating oversized page");
        body.truncate(MAX_FETCH_BYTES);
    }

    match content_type.as_str() {
        "text/html" | "application/xhtml+xml" => {
            let title = extract_html_title(&body);
            let markdown = html2md::rewrite_html(&body, false);
            if markdown.trim().is_empty() {
                return Err(VaultError::InvalidInput(
                    "page converted to empty markdown".into(),
                ));
            }
            Ok(FetchedPage { title, markdown, content_type })
        }
        "text/plain" | "text/markdown" => Ok(FetchedPage {
            title: None,
            markdown: body,
            content_type,
        }),
        other => Err(VaultError::InvalidInput(format!(
            "unsupported content type: {other}"
        ))),
    }
}

fn extract_html_title(html: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    let raw = re.captures(html)?.get(1)?.as_str();
    let title = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_html_title("<html><head><title>A &amp; B</title></head></html>"),
            Some("A & B".to_string())
        );
        assert_eq!(
            extract_html_title("<TITLE>\n  spread\n  over lines\n</TITLE>"),
            Some("spread over lines".to_string())
        );
        assert_eq!(extract_html_title("<p>no title</p>"), None);
        assert_eq!(extract_html_title("<title></title>"), None);
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(matches!(
            fetch_url("file:///etc/passwd"),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            fetch_url("ftp://example.com"),
            Err(VaultError::InvalidInput(_))
        ));
    }
}
