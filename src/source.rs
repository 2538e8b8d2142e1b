use log::warn;
use std::time::Duration;

/// URLs fetched per lesson, and characters kept per page.
const MAX_SOURCE_URLS: usize = 3;
const MAX_CHARS_PER_SOURCE: usize = 3000;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches reference pages and reduces them to plain text for the outline
/// prompt. Source material is best effort: any URL that cannot be fetched or
/// converted is skipped with a warning, and an empty result means the lesson
/// is generated from the topic alone.
pub async fn fetch_source_context(urls: &[String]) -> Option<String> {
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Source fetching disabled: {}", e);
            return None;
        }
    };

    let mut sections = Vec::new();
    for raw in urls.iter().take(MAX_SOURCE_URLS) {
        let url = match url::Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
            _ => {
                warn!("Skipping non-http source URL: {}", raw);
                continue;
            }
        };
        // Video pages have no extractable text.
        if url
            .host_str()
            .is_some_and(|h| h.contains("youtube.com") || h.contains("youtu.be"))
        {
            warn!("Skipping video source URL: {}", raw);
            continue;
        }

        match fetch_one(&client, url.as_str()).await {
            Ok(text) if !text.trim().is_empty() => {
                sections.push(format!("Source ({}):\n{}", raw, text));
            }
            Ok(_) => warn!("Source URL yielded no text: {}", raw),
            Err(e) => warn!("Failed to fetch source URL {}: {}", raw, e),
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let html = resp.text().await?;
    let text = html2text::from_read(html.as_bytes(), 120)?;
    Ok(truncate_chars(&text, MAX_CHARS_PER_SOURCE))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        // Multibyte input must not split a character.
        let s = "日本語テキスト";
        assert_eq!(truncate_chars(s, 3), "日本語");
    }

    #[tokio::test]
    async fn test_bad_urls_are_skipped_not_fatal() {
        let urls = vec![
            "not a url".to_string(),
            "ftp://example.com/file".to_string(),
            "https://www.youtube.com/watch?v=x".to_string(),
        ];
        assert!(fetch_source_context(&urls).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_url_list_yields_none() {
        assert!(fetch_source_context(&[]).await.is_none());
    }
}
