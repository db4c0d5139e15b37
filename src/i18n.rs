//! Bilingual log messages for the UI event sink.
//! Index 0 selects English, 1 selects Chinese, matching the `language`
//! field of the configuration snapshot.

/// A message pair: `[english, chinese]`.
pub type Msg = [&'static str; 2];

pub const SERVER_STARTED: Msg = [
    "Server started. Port: {port}, Threads: {threads}",
    "服务已启动，端口：{port}，并发线程数：{threads}",
];
pub const SERVER_STOPPED: Msg = ["Server stopped", "服务已停止"];
pub const REQUEST_RECEIVED: Msg = ["Request received: ", "收到请求: "];
pub const INVALID_KEY: Msg = ["Error: Invalid API Key", "错误：API 密钥无效"];
pub const FORMAT_ERROR: Msg = ["Error: Invalid Response Format", "错误：响应格式无效"];
pub const PARSE_ERROR: Msg = ["Error: JSON Parse Error", "错误：JSON 解析失败"];
pub const NETWORK_ERROR: Msg = ["Network Error: {error}", "网络错误：{error}"];
pub const REQUEST_TIMEOUT: Msg = ["Request Timeout", "请求超时"];
pub const NEW_TERM: Msg = ["✨ New Term Discovered: ", "✨ 发现新术语: "];
pub const RETRY_ATTEMPT: Msg = [
    "🔄 Retry translation ({attempt}/{max}): ",
    "🔄 重试翻译 ({attempt}/{max}): ",
];
pub const RETRY_SUCCESS: Msg = ["✅ Retry successful", "✅ 重试成功"];
pub const RETRY_FAILED: Msg = ["❌ Retry failed, skipping text", "❌ 重试失败，跳过文本"];
pub const ABORTED: Msg = ["⛔ Translation Aborted", "⛔ 翻译已终止"];
pub const CONTEXT_CLEARED: Msg = ["🧹 Context memory cleared.", "🧹 上下文记忆已清空。"];

/// Select one side of a message pair. Any index other than 1 falls back to
/// English.
pub fn text(msg: Msg, lang: usize) -> &'static str {
    msg[if lang == 1 { 1 } else { 0 }]
}

/// Replace `{name}` placeholders in a message template.
pub fn interpolate(template: &str, values: &[(&str, String)]) -> String {
    let mut result = template.to_owned();
    for (key, value) in values {
        let placeholder = format!("{{{key}}}");
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_language_by_index() {
        assert_eq!(text(SERVER_STOPPED, 0), "Server stopped");
        assert_eq!(text(SERVER_STOPPED, 1), "服务已停止");
        // Out-of-range indices fall back to English.
        assert_eq!(text(SERVER_STOPPED, 7), "Server stopped");
    }

    #[test]
    fn interpolates_named_placeholders() {
        let msg = interpolate(
            text(SERVER_STARTED, 0),
            &[("port", "6800".to_string()), ("threads", "8".to_string())],
        );
        assert_eq!(msg, "Server started. Port: 6800, Threads: 8");
    }

    #[test]
    fn interpolate_leaves_unknown_placeholders() {
        let msg = interpolate("a {x} b {y}", &[("x", "1".to_string())]);
        assert_eq!(msg, "a 1 b {y}");
    }
}
