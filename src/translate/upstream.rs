//! Chat-completions upstream client: assembles, sends, and parses one
//! request per translation attempt. Connection pooling via reqwest; every
//! wait races the stop token so cancellation is observed immediately.

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Per-request transfer timeout.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(45);
/// Outer wall-clock limit for send plus body read.
pub const OUTER_WAIT: Duration = Duration::from_secs(40);

/// Fixed appendix teaching the model the placeholder discipline. Appended
/// to the configured system prompt on every attempt.
const PLACEHOLDER_RULES: &str = "\n\n【Translation Rules】:\n\
1. PRESERVE TAGS: You will see tags like '[T_0]', '[T_1]'.\n\
   - These replace newlines or code. Keep them EXACTLY as is.\n\
   - Input: \"Hello [T_0] World\"\n\
   - Output: \"你好 [T_0] 世界\"\n\
2. NO CLEANUP: Do NOT remove the tags.\n\
3. TERM CODES: Keep 'Z[A-Z]{2}Z' (e.g., 'ZMCZ') codes exactly as is.\n\
4. Translate the text BETWEEN the tags naturally.\n\
5. Output ONLY the translated result.\n";

/// Appended when term extraction is requested for the attempt.
const TERM_EXTRACTION_RULES: &str = "\n【Term Extraction】:\n\
1. Wrap translation in <tl>...</tl>.\n\
2. If you find Proper Nouns (Names) NOT in glossary, append <tm>Src=Trgt</tm> AFTER the translation.\n\
3. Keep <tm> tags OUTSIDE of <tl> tags.\n";

#[derive(Debug)]
pub enum UpstreamError {
    InvalidKey,
    Timeout,
    Network(String),
    Format,
    Parse(String),
    Cancelled,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::InvalidKey => write!(f, "invalid API key"),
            UpstreamError::Timeout => write!(f, "request timeout"),
            UpstreamError::Network(msg) => write!(f, "network error: {msg}"),
            UpstreamError::Format => write!(f, "invalid response format"),
            UpstreamError::Parse(msg) => write!(f, "response parse error: {msg}"),
            UpstreamError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

/// Token counts reported by the upstream, when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One parsed assistant reply.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<ChatUsage>,
}

/// Thin client over the OpenAI-style `/chat/completions` endpoint.
pub struct ChatClient {
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new() -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    /// POST one chat payload and read the whole body, honoring the transfer
    /// timeout, the outer wait, and the stop token.
    pub async fn send(
        &self,
        base: &str,
        api_key: &str,
        payload: &Value,
        stop: &CancellationToken,
    ) -> Result<ChatReply, UpstreamError> {
        let request = self
            .http
            .post(format!("{base}/chat/completions"))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .timeout(TRANSFER_TIMEOUT)
            .json(payload);

        let outcome = tokio::select! {
            res = tokio::time::timeout(OUTER_WAIT, async {
                let response = request.send().await?;
                response.bytes().await
            }) => res,
            _ = stop.cancelled() => return Err(UpstreamError::Cancelled),
        };

        let body = match outcome {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) if e.is_timeout() => return Err(UpstreamError::Timeout),
            Ok(Err(e)) => return Err(UpstreamError::Network(e.to_string())),
            Err(_) => return Err(UpstreamError::Timeout),
        };

        parse_reply(&body)
    }
}

/// Extract `choices[0].message.content` and the optional usage numbers.
pub fn parse_reply(body: &[u8]) -> Result<ChatReply, UpstreamError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Parse(e.to_string()))?;

    let usage = value.get("usage").map(|u| ChatUsage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    });

    let choices = value
        .get("choices")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
        .ok_or(UpstreamError::Format)?;

    let content = choices[0]
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::Parse("choices[0].message.content missing".to_string()))?;

    Ok(ChatReply {
        content: content.to_string(),
        usage,
    })
}

/// The configured system prompt plus the fixed preservation appendix, the
/// glossary block when present, and the extraction block when requested.
pub fn build_system_prompt(configured: &str, glossary_block: &str, extract_terms: bool) -> String {
    let mut prompt = String::with_capacity(
        configured.len() + PLACEHOLDER_RULES.len() + glossary_block.len() + 64,
    );
    prompt.push_str(configured);
    prompt.push_str(PLACEHOLDER_RULES);
    if !glossary_block.is_empty() {
        prompt.push('\n');
        prompt.push_str(glossary_block);
    }
    if extract_terms {
        prompt.push_str(TERM_EXTRACTION_RULES);
    }
    prompt
}

/// Assemble `{model, messages, temperature}`: the system prompt, the
/// interleaved history, then the current user turn.
pub fn build_payload(
    model: &str,
    temperature: f64,
    system_prompt: &str,
    history: &[(String, String)],
    user_content: &str,
) -> Value {
    let mut messages = Vec::with_capacity(2 + 2 * history.len());
    messages.push(json!({"role": "system", "content": system_prompt}));
    for (user, assistant) in history {
        messages.push(json!({"role": "user", "content": user}));
        messages.push(json!({"role": "assistant", "content": assistant}));
    }
    messages.push(json!({"role": "user", "content": user_content}));

    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
    })
}
