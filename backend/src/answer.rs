//! Question answering over retrieved passages
//!
//! Retrieval (embedding and vector search) happens elsewhere and is seen
//! here only through the `Retriever` trait. Answers come from a hosted chat
//! API which is told to use nothing but the given passages.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

pub const CHATLING_API_URL: &str = "https://api.chatling.ai/v2/chatbots";

/// Returned whenever the passages don't contain the answer.
pub const NO_INFO_ANSWER: &str = "Xin lỗi, tôi không tìm thấy thông tin đủ chi tiết trong các Kinh đã được cung cấp để trả lời câu hỏi này.";

/// Prefix of the user-facing message when answering failed
pub const ANSWER_ERROR_PREFIX: &str = "Xin lỗi, có lỗi xảy ra khi xử lý yêu cầu của bạn:";

const NO_INFO_PHRASES: [&str; 2] = ["tôi không tìm thấy thông tin", "không có thông tin này"];

const REQUEST_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
    #[error("Invalid AI model id: '{0}'")]
    InvalidModelId(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Retrieval failed: {0}")]
    Retrieval(String),
}

pub trait QueryAnswerer: Send + Sync {
    fn answer(&self, question: &str, passages: &[String]) -> Result<String, AnswerError>;
}

pub trait Retriever: Send + Sync {
    fn retrieve(&self, question: &str, limit: usize) -> Result<Vec<String>, AnswerError>;
}

/// Always returns the same passages. Used when the caller already has them.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    pub passages: Vec<String>,
}

impl Retriever for StaticRetriever {
    fn retrieve(&self, _question: &str, limit: usize) -> Result<Vec<String>, AnswerError> {
        Ok(self.passages.iter().take(limit).cloned().collect())
    }
}

/// True if the answer is empty or says the information is missing.
pub fn is_no_info_answer(answer: &str) -> bool {
    let lower = answer.trim().to_lowercase();
    lower.is_empty()
        || lower.contains(&NO_INFO_ANSWER.to_lowercase())
        || NO_INFO_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn build_prompt(question: &str, passages: &[String]) -> String {
    let context = passages.join("\n");
    let context = context.trim();
    if context.is_empty() {
        return question.to_string();
    }

    format!(
        "Dựa vào các đoạn văn sau, hãy trả lời câu hỏi: '{question}'. \
Nếu câu trả lời không thể tìm thấy trực tiếp hoặc suy luận rõ ràng từ các đoạn văn được cung cấp, \
hãy nói chính xác: '{no_info}' \
Không suy diễn thông tin từ kiến thức chung của bạn. \
\n\nCác đoạn văn được cung cấp:\n'''\n{context}\n'''",
        question = question,
        no_info = NO_INFO_ANSWER,
        context = context,
    )
}

pub struct ChatlingAnswerer {
    client: reqwest::blocking::Client,
    api_key: String,
    bot_id: String,
    ai_model_id: i64,
}

impl ChatlingAnswerer {
    pub fn new(api_key: Option<&str>, bot_id: Option<&str>, ai_model_id: Option<&str>) -> Result<Self, AnswerError> {
        let api_key = api_key.ok_or(AnswerError::MissingSetting("CHATLING_API_KEY"))?;
        let bot_id = bot_id.ok_or(AnswerError::MissingSetting("CHATLING_BOT_ID"))?;
        let model_id = ai_model_id.ok_or(AnswerError::MissingSetting("CHATLING_AI_MODEL_ID"))?;
        let ai_model_id = model_id.trim().parse::<i64>()
            .map_err(|_| AnswerError::InvalidModelId(model_id.to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(ChatlingAnswerer {
            client,
            api_key: api_key.to_string(),
            bot_id: bot_id.to_string(),
            ai_model_id,
        })
    }

    pub fn request_body(&self, question: &str, passages: &[String]) -> Value {
        json!({
            "message": build_prompt(question, passages),
            "context": [],
            "ai_model_id": self.ai_model_id,
            "context_strategy": "strict",
        })
    }
}

/// The answer text of a chat API response. Missing or "no information"
/// answers become `NO_INFO_ANSWER`.
pub fn parse_chat_response(body: &Value) -> String {
    match body.pointer("/data/response").and_then(|v| v.as_str()) {
        Some(answer) if !is_no_info_answer(answer) => answer.to_string(),
        _ => NO_INFO_ANSWER.to_string(),
    }
}

impl QueryAnswerer for ChatlingAnswerer {
    fn answer(&self, question: &str, passages: &[String]) -> Result<String, AnswerError> {
        let url = format!("{}/{}/ai/kb/chat", CHATLING_API_URL, self.bot_id);
        info!("Sending question to chat API: '{}'", question);

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(question, passages))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnswerError::Status { status: status.as_u16(), body });
        }

        let body: Value = response.json()?;
        Ok(parse_chat_response(&body))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagAnswer {
    pub passages: Vec<String>,
    pub answer: String,
}

pub struct RagService<R: Retriever, A: QueryAnswerer> {
    retriever: R,
    answerer: A,
    num_results: usize,
}

impl<R: Retriever, A: QueryAnswerer> RagService<R, A> {
    pub fn new(retriever: R, answerer: A) -> Self {
        RagService { retriever, answerer, num_results: 5 }
    }

    pub fn with_num_results(mut self, n: usize) -> Self {
        self.num_results = n;
        self
    }

    pub fn try_query(&self, question: &str) -> Result<RagAnswer, AnswerError> {
        let passages = self.retriever.retrieve(question, self.num_results)?;
        info!("Retrieved {} passages for '{}'", passages.len(), question);

        if passages.is_empty() {
            warn!("No passages found for '{}'", question);
            return Ok(RagAnswer { passages, answer: NO_INFO_ANSWER.to_string() });
        }

        let answer = self.answerer.answer(question, &passages)?;
        Ok(RagAnswer { passages, answer })
    }

    /// Like `try_query`, with failures turned into a user-facing message.
    pub fn query(&self, question: &str) -> RagAnswer {
        match self.try_query(question) {
            Ok(a) => a,
            Err(e) => {
                error!("Answering '{}' failed: {}", question, e);
                RagAnswer {
                    passages: Vec::new(),
                    answer: format!("{} {}", ANSWER_ERROR_PREFIX, e),
                }
            }
        }
    }
}
