//! Remote metadata enrichment through the Gemini generateContent API.
//!
//! Used when a book has no entry in the local metadata index. The model is
//! asked for a JSON object with the catalogue fields of the book.

use std::thread::sleep;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metadata::Metadata;

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned no content")]
    EmptyResponse,
    #[error("model response is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnrichError {
    /// Rate limits, server errors and transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EnrichError::Http(_) => true,
            EnrichError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Remote source of book metadata
pub trait MetadataEnricher: Send + Sync {
    fn enrich(&self, title: &str) -> Result<Metadata, EnrichError>;
}

pub fn build_prompt(title: &str) -> String {
    format!(
        r#"Cung cấp thông tin metadata chi tiết về bộ kinh Phật giáo có tên tiếng Việt là "{title}" từ nguồn Đại Chánh Tân Tu (Taisho Tripitaka).
Vui lòng cung cấp các thông tin sau dưới dạng JSON. Nếu không có thông tin cụ thể cho một trường, hãy để giá trị là "Not_Available".
Đảm bảo phản hồi chỉ là một đối tượng JSON hợp lệ và không có thêm văn bản nào khác ngoài JSON.

{{
    "STT": "số thứ tự của kinh trong tạng (nếu có)",
    "Tên Tạng": "Tên tạng kinh (ví dụ: A Hàm, Bát Nhã)",
    "Bộ": "Tên bộ kinh (ví dụ: Trường A Hàm, Trung A Hàm)",
    "Tập Số (Đại Chánh)": "Số tập theo Đại Chánh Tân Tu (ví dụ: T1, T2)",
    "Số Hiệu (Đại Chánh)": "Số hiệu kinh theo Đại Chánh Tân Tu (ví dụ: 1, 125)",
    "Việt Dịch (Số tập)": "Số tập bản dịch tiếng Việt",
    "Tên Kinh Đầy Đủ": "Tên tiếng Việt đầy đủ của kinh",
    "Tên Tiếng Hán": "Tên tiếng Hán (nếu có)",
    "Tên Kinh rút gọn": "Tên rút gọn tiếng Việt",
    "Hán Dịch": "Thông tin Hán dịch (người dịch, đời dịch)",
    "Việt Dịch": "Thông tin Việt dịch (người dịch)",
    "Khảo Dịch - Hiệu đính": "Người khảo dịch hoặc hiệu đính bản Việt",
    "Năm xuất bản": "Năm xuất bản bản dịch tiếng Việt",
    "Số Quyển": "Số quyển của bộ kinh (theo Hán tạng hoặc Việt dịch)",
    "Chủ đề chính": "Các chủ đề chính của kinh",
    "Từ khóa liên quan": "Các từ khóa liên quan (phân cách bằng dấu phẩy)",
    "ONIX tương ứng (gợi ý)": "Thông tin ONIX tương ứng (nếu biết)",
    "Ghi chú": "Các ghi chú khác (ví dụ: nguồn thông tin tra cứu)"
}}"#
    )
}

/// Extract the metadata object from a generateContent response body.
pub fn parse_generate_content_response(body: &Value) -> Result<Metadata, EnrichError> {
    let text = body.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(EnrichError::EmptyResponse)?;

    // Models sometimes wrap the JSON in a markdown fence
    let text = text
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(EnrichError::EmptyResponse);
    }

    Ok(Metadata::book_from_value(&value))
}

pub struct GeminiEnricher {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    retries: u32,
    backoff: Duration,
}

impl GeminiEnricher {
    pub fn new(api_key: &str, model: &str) -> Result<Self, EnrichError> {
        if api_key.trim().is_empty() {
            return Err(EnrichError::MissingApiKey);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(GeminiEnricher {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            retries: 2,
            backoff: Duration::from_secs(2),
        })
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    fn request_body(title: &str) -> Value {
        let safety_settings: Vec<Value> = [
            "HARM_CATEGORY_DANGEROUS_CONTENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_HARASSMENT",
        ]
        .iter()
        .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
        .collect();

        json!({
            "contents": [{ "parts": [{ "text": build_prompt(title) }] }],
            "generationConfig": { "responseMimeType": "application/json" },
            "safetySettings": safety_settings,
        })
    }

    fn request_once(&self, title: &str) -> Result<Metadata, EnrichError> {
        let url = format!("{}/{}:generateContent", GEMINI_API_URL, self.model);

        let response = self.client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(title))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EnrichError::Status { status: status.as_u16(), body });
        }

        let body: Value = response.json()?;
        debug!("Gemini response for '{}': {}", title, body);
        parse_generate_content_response(&body)
    }
}

impl MetadataEnricher for GeminiEnricher {
    fn enrich(&self, title: &str) -> Result<Metadata, EnrichError> {
        info!("Querying {} for metadata of '{}'", self.model, title);

        let mut attempt = 0;
        loop {
            match self.request_once(title) {
                Ok(m) => return Ok(m),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let wait = self.backoff * 2u32.pow(attempt);
                    warn!("Enrichment attempt {} for '{}' failed: {}, retrying in {:?}", attempt + 1, title, e, wait);
                    sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NOT_AVAILABLE;

    #[test]
    fn test_parse_response() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"Bộ\": \"Trường A Hàm\", \"Số Quyển\": 22}" }] }
            }]
        });
        let m = parse_generate_content_response(&body).unwrap();
        assert_eq!(m.get("Bộ"), Some("Trường A Hàm"));
        assert_eq!(m.get("Số Quyển"), Some("22"));
        assert_eq!(m.get("STT"), Some(NOT_AVAILABLE));
    }

    #[test]
    fn test_parse_fenced_response() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"Bộ\": \"Trung A Hàm\"}\n```" }] }
            }]
        });
        let m = parse_generate_content_response(&body).unwrap();
        assert_eq!(m.get("Bộ"), Some("Trung A Hàm"));
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(matches!(
            parse_generate_content_response(&json!({ "candidates": [] })),
            Err(EnrichError::EmptyResponse)
        ));
        assert!(matches!(
            parse_generate_content_response(&json!({ "candidates": [{ "content": { "parts": [{ "text": "not json" }] } }] })),
            Err(EnrichError::Json(_))
        ));
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(GeminiEnricher::new("  ", DEFAULT_GEMINI_MODEL), Err(EnrichError::MissingApiKey)));
    }

    #[test]
    fn test_transient_errors() {
        assert!(EnrichError::Status { status: 429, body: String::new() }.is_transient());
        assert!(EnrichError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!EnrichError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!EnrichError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_prompt_mentions_title() {
        assert!(build_prompt("Trường A Hàm").contains("\"Trường A Hàm\""));
    }
}
