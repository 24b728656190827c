use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

pub const SYSTEM_PROMPT: &str = "You are a frontend design engineer that helps build designs and elements for the user. \
The output should be in HTML and Tailwind classes. \
If the user's request is simple (e.g., \"green button\"), return only the specific element without additional HTML, <style>, or <script> tags. \
If the design requires animations, interactions, or advanced styling, enclose the entire output within a <div> element that wraps both the HTML structure and any necessary <style> or <script> tags. \
If the user pastes an element, improve or edit it according to their description and follow the same rules for simplicity or complexity.";

pub const TEMPERATURE: f32 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn request_element(
        &self,
        user_prompt: &str,
        endpoint_url: &str,
        model_name: &str,
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: ChatOptions,
    format: Value,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ElementPayload {
    element: String,
}

fn element_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "element": { "type": "string" }
        },
        "required": ["element"]
    })
}

fn build_request(user_prompt: &str, model_name: &str) -> ChatRequest {
    ChatRequest {
        model: model_name.to_string(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: format!("\"{}\"", user_prompt),
            },
        ],
        stream: false,
        options: ChatOptions {
            temperature: TEMPERATURE,
        },
        format: element_schema(),
    }
}

// First balanced {...} in text, skipping braces inside string literals.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_element_content(content: &str) -> Result<String, CompletionError> {
    let payload = match serde_json::from_str::<ElementPayload>(content) {
        Ok(payload) => payload,
        Err(direct_err) => {
            let embedded = extract_json_object(content).ok_or_else(|| {
                CompletionError::MalformedResponse(format!(
                    "message content is not JSON: {}",
                    direct_err
                ))
            })?;
            serde_json::from_str::<ElementPayload>(embedded).map_err(|e| {
                CompletionError::MalformedResponse(format!(
                    "no string \"element\" field in message content: {}",
                    e
                ))
            })?
        }
    };
    Ok(payload.element)
}

/// Pulls the generated element out of a raw chat response body.
pub fn extract_element(body: &str) -> Result<String, CompletionError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::MalformedResponse(format!("unexpected response shape: {}", e))
    })?;
    parse_element_content(&response.message.content)
}

pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(OllamaClient {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn request_element(
        &self,
        user_prompt: &str,
        endpoint_url: &str,
        model_name: &str,
    ) -> Result<String, CompletionError> {
        let request = build_request(user_prompt, model_name);
        info!(endpoint = endpoint_url, model = model_name, "requesting element");

        let response = self
            .client
            .post(endpoint_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Network(format!("HTTP {}: {}", status, body)));
        }

        debug!(bytes = body.len(), "completion response received");
        extract_element(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one request with the given status and body, handing back the
    /// request body it received.
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/chat", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);

            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8(buf[header_end..header_end + content_length].to_vec()).unwrap()
        });

        (url, handle)
    }

    fn reply_with_content(content: &str) -> String {
        json!({
            "model": "llama3",
            "created_at": "2024-06-01T00:00:00Z",
            "message": { "role": "assistant", "content": content },
            "done": true
        })
        .to_string()
    }

    #[test]
    fn test_request_body_shape() {
        let request = serde_json::to_value(build_request("green button", "llama3")).unwrap();

        assert_eq!(request["model"], "llama3");
        assert_eq!(request["stream"], false);
        assert_eq!(request["options"]["temperature"], 0.5);
        assert_eq!(request["messages"].as_array().unwrap().len(), 2);
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(request["messages"][1]["role"], "user");
        assert_eq!(request["messages"][1]["content"], "\"green button\"");
        assert_eq!(request["format"]["type"], "object");
        assert_eq!(request["format"]["properties"]["element"]["type"], "string");
        assert_eq!(request["format"]["required"], json!(["element"]));
    }

    #[test]
    fn test_extract_element() {
        let body = r#"{"message":{"content":"{\"element\":\"<button class=\\\"bg-green-500\\\">Click</button>\"}"}}"#;
        assert_eq!(
            extract_element(body).unwrap(),
            r#"<button class="bg-green-500">Click</button>"#
        );
    }

    #[test]
    fn test_extract_element_wrapped_in_prose() {
        let content = "Sure! Here it is: {\"element\": \"<p>{braces}</p>\"} Enjoy.";
        assert_eq!(
            extract_element(&reply_with_content(content)).unwrap(),
            "<p>{braces}</p>"
        );
    }

    #[test]
    fn test_missing_element_is_malformed() {
        let err = extract_element(&reply_with_content(r#"{"html":"<div/>"}"#)).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));

        let err = extract_element(&reply_with_content(r#"{"element":42}"#)).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));

        let err = extract_element(&reply_with_content("no json here")).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));

        let err = extract_element(r#"{"error":"model not found"}"#).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\":{\"b\":1}} y"), Some("{\"a\":{\"b\":1}}"));
        assert_eq!(extract_json_object("{\"a\":\"}\"}"), Some("{\"a\":\"}\"}"));
        assert_eq!(extract_json_object("{ unterminated"), None);
        assert_eq!(extract_json_object("nothing"), None);
    }

    #[tokio::test]
    async fn test_request_element_end_to_end() {
        let (url, server) = serve_once(
            "200 OK",
            reply_with_content(r#"{"element":"<button class=\"bg-green-500\">Click</button>"}"#),
        )
        .await;

        let client = OllamaClient::new(Some(Duration::from_secs(10))).unwrap();
        let element = client
            .request_element("green button", &url, "llama3")
            .await
            .unwrap();
        assert_eq!(element, r#"<button class="bg-green-500">Click</button>"#);

        let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["model"], "llama3");
        assert_eq!(sent["messages"][1]["content"], "\"green button\"");
    }

    #[tokio::test]
    async fn test_http_error_status_is_network_error() {
        let (url, server) = serve_once(
            "404 Not Found",
            r#"{"error":"model \"nope\" not found"}"#.to_string(),
        )
        .await;

        let client = OllamaClient::new(None).unwrap();
        let err = client.request_element("card", &url, "nope").await.unwrap_err();
        match err {
            CompletionError::Network(msg) => assert!(msg.contains("404")),
            other => panic!("expected network error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let url = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/api/chat", listener.local_addr().unwrap())
        };

        let client = OllamaClient::new(None).unwrap();
        let err = client.request_element("card", &url, "llama3").await.unwrap_err();
        assert!(matches!(err, CompletionError::Network(_)));
    }

    #[tokio::test]
    async fn test_malformed_url_is_network_error() {
        let client = OllamaClient::new(None).unwrap();
        let err = client
            .request_element("card", "undefined", "llama3")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Network(_)));
    }
}
