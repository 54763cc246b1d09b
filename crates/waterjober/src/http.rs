use async_trait::async_trait;
use std::sync::Arc;
use watercore::{FlowData, Jober, JoberSpec, NodeError};
use waterstream::{JoberFactory, JoberMetadata};

/// HTTP jober: sends each payload's business data to a configured endpoint
/// and merges the response back into the payload.
///
/// Properties: `url` (required), `method` (GET/POST/PUT/DELETE, default
/// POST), `headers` (object of string values).
pub struct HttpJober {
    client: reqwest::Client,
    url: String,
    method: String,
    headers: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
impl Jober for HttpJober {
    fn jober_type(&self) -> &str {
        "http.request"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        let mut out = Vec::with_capacity(batch.len());
        for mut data in batch {
            tracing::debug!(method = %self.method, url = %self.url, "http jober request");

            let mut request = match self.method.to_uppercase().as_str() {
                "GET" => self.client.get(&self.url),
                "POST" => self.client.post(&self.url).json(&data.business),
                "PUT" => self.client.put(&self.url).json(&data.business),
                "DELETE" => self.client.delete(&self.url),
                other => {
                    return Err(NodeError::Jober(format!("Unsupported method: {}", other)));
                }
            };
            for (key, value) in &self.headers {
                if let Some(text) = value.as_str() {
                    request = request.header(key.as_str(), text);
                }
            }

            let response = request
                .send()
                .await
                .map_err(|e| NodeError::Jober(format!("HTTP request failed: {}", e)))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| NodeError::Jober(format!("Failed to read response: {}", e)))?;

            data.set("http_status", serde_json::json!(status));
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => data.set("response", json),
                Err(_) => data.set("response", serde_json::Value::String(body)),
            }
            out.push(data);
        }
        Ok(out)
    }
}

pub struct HttpJoberFactory;

impl JoberFactory for HttpJoberFactory {
    fn create(&self, spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        let url = spec
            .properties
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NodeError::Jober("http jober requires a 'url' property".to_string()))?
            .to_string();
        let method = spec
            .properties
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("POST")
            .to_string();
        let headers = spec
            .properties
            .get("headers")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        Ok(Arc::new(HttpJober {
            client: reqwest::Client::new(),
            url,
            method,
            headers,
        }))
    }

    fn jober_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> JoberMetadata {
        JoberMetadata {
            description: "Send business data to an HTTP endpoint".to_string(),
            category: "http".to_string(),
        }
    }
}
