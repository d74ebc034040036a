//! Re-encode remote image URLs as inline `data:` URIs.

use base64::Engine;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};
use crate::models::ScrapedContent;
use crate::scrapers::context::ScrapeContext;
use crate::scrapers::http_client::HttpClient;

const DEFAULT_IMAGE_MIME: &str = "application/octet-stream";

/// Build a `data:` URI, taking the mime from the header or sniffing it.
pub fn to_data_uri(mime_type: Option<&str>, body: &[u8]) -> String {
    let mime = mime_type
        .filter(|m| m.starts_with("image/"))
        .map(str::to_string)
        .or_else(|| infer::get(body).map(|t| t.mime_type().to_string()))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
    let encoded = base64::engine::general_purpose::STANDARD.encode(body);
    format!("data:{};base64,{}", mime, encoded)
}

fn is_remote(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Replace one image value in place. Fetch failures keep the original URL.
async fn encode_one(http: &HttpClient, ctx: &ScrapeContext, slot: &mut Option<String>) -> Result<()> {
    let Some(url) = slot.as_deref().filter(|u| is_remote(u)) else {
        return Ok(());
    };

    match http.get_body(ctx, url, &[]).await {
        Ok(fetched) => {
            debug!("Encoded image {} ({} bytes)", url, fetched.body.len());
            *slot = Some(to_data_uri(fetched.mime_type.as_deref(), &fetched.body));
            Ok(())
        }
        Err(e @ (ScrapeError::Cancelled | ScrapeError::DeadlineExceeded)) => Err(e),
        Err(e) => {
            warn!("Could not set image using URL {}: {}", url, e);
            Ok(())
        }
    }
}

/// Encode every image field of a scraped record.
pub async fn encode_images(http: &HttpClient, ctx: &ScrapeContext, content: &mut ScrapedContent) -> Result<()> {
    match content {
        ScrapedContent::Performer(p) => {
            encode_one(http, ctx, &mut p.image).await?;
        }
        ScrapedContent::Scene(s) => {
            encode_one(http, ctx, &mut s.image).await?;
            for movie in &mut s.movies {
                encode_one(http, ctx, &mut movie.front_image).await?;
                encode_one(http, ctx, &mut movie.back_image).await?;
            }
        }
        ScrapedContent::Movie(m) => {
            encode_one(http, ctx, &mut m.front_image).await?;
            encode_one(http, ctx, &mut m.back_image).await?;
        }
        ScrapedContent::Studio(s) => {
            encode_one(http, ctx, &mut s.image).await?;
        }
        ScrapedContent::Gallery(_) | ScrapedContent::Tag(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_data_uri_from_header() {
        assert_eq!(to_data_uri(Some("image/jpeg"), b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_data_uri_sniffs_when_header_is_useless() {
        let uri = to_data_uri(Some("application/octet-stream"), PNG_HEADER);
        assert!(uri.starts_with("data:image/png;base64,"));
        let uri = to_data_uri(None, PNG_HEADER);
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_non_remote_values_are_untouched() {
        let http = HttpClient::new(&Default::default()).unwrap();
        let ctx = ScrapeContext::new();
        let mut slot = Some("data:image/png;base64,AAAA".to_string());
        encode_one(&http, &ctx, &mut slot).await.unwrap();
        assert_eq!(slot.as_deref(), Some("data:image/png;base64,AAAA"));

        let mut empty = None;
        encode_one(&http, &ctx, &mut empty).await.unwrap();
        assert!(empty.is_none());
    }
}
