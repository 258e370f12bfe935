//! Streaming echo pipeline.
//!
//! Writes the request body back chunk by chunk as it arrives, then closes.
//! A body larger than the limit ends the stream early.

use futures_util::StreamExt;

use super::{CometPipeline, PipelineConfig, PipelineError};
use crate::http::request::NormalizedRequest;
use crate::http::writer::ResponseWriter;

/// Init parameter overriding the body limit.
pub const MAX_BODY_PARAM: &str = "maxBodyBytes";

pub struct EchoPipeline {
    max_body_bytes: usize,
}

impl EchoPipeline {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

impl CometPipeline for EchoPipeline {
    fn init(&mut self, config: &PipelineConfig) -> Result<(), PipelineError> {
        if let Some(raw) = config.init_parameter(MAX_BODY_PARAM) {
            self.max_body_bytes = raw
                .parse()
                .map_err(|e| PipelineError::Init(format!("{MAX_BODY_PARAM}={raw}: {e}")))?;
        }
        config.environment().log(&format!(
            "{} ready (echo, max body {} bytes)",
            config.name(),
            self.max_body_bytes
        ));
        Ok(())
    }

    fn service(
        &self,
        mut request: NormalizedRequest,
        writer: ResponseWriter,
    ) -> Result<(), PipelineError> {
        let limit = self.max_body_bytes;
        let mut body = request.take_body().into_stream();

        tokio::spawn(async move {
            let mut total = 0usize;
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %writer.connection_id(),
                            error = %e,
                            "Request body failed"
                        );
                        break;
                    }
                };
                total += chunk.len();
                if total > limit {
                    let _ = writer.write_error(413, "Payload Too Large");
                    break;
                }
                if writer.write(chunk).is_err() {
                    // Client went away.
                    return;
                }
            }
            let _ = writer.close();
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::{Body, Bytes};
    use axum::http::{header, Request, StatusCode};

    use crate::environment::Environment;
    use crate::http::request::{translate, TranslatorOptions};
    use crate::http::writer::Frame;
    use crate::net::ConnectionId;

    fn config(params: &[(&str, &str)]) -> PipelineConfig {
        let environment = Arc::new(Environment::builder().build().unwrap());
        let params: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::new("Echo", environment, params)
    }

    fn request(body: &'static str) -> NormalizedRequest {
        let event = Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::HOST, "localhost")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(body))
            .unwrap();
        translate(event, &TranslatorOptions::default()).unwrap()
    }

    #[test]
    fn init_reads_limit_param() {
        let mut pipeline = EchoPipeline::new(10);
        pipeline.init(&config(&[(MAX_BODY_PARAM, "64")])).unwrap();
        assert_eq!(pipeline.max_body_bytes(), 64);
    }

    #[test]
    fn init_rejects_bad_limit() {
        let mut pipeline = EchoPipeline::new(10);
        let err = pipeline.init(&config(&[(MAX_BODY_PARAM, "lots")])).unwrap_err();
        assert!(matches!(err, PipelineError::Init(_)));
    }

    #[tokio::test]
    async fn echoes_body_then_closes() {
        let pipeline = EchoPipeline::new(1024);
        let (writer, mut frames) = ResponseWriter::channel(ConnectionId::new());

        pipeline.service(request("ping"), writer).unwrap();

        assert_eq!(frames.next_frame().await, Some(Frame::Data(Bytes::from("ping"))));
        assert_eq!(frames.next_frame().await, Some(Frame::Close));
    }

    #[tokio::test]
    async fn oversized_body_gets_413() {
        let pipeline = EchoPipeline::new(3);
        let (writer, mut frames) = ResponseWriter::channel(ConnectionId::new());

        pipeline.service(request("too long"), writer).unwrap();

        assert_eq!(
            frames.next_frame().await,
            Some(Frame::Status {
                code: StatusCode::PAYLOAD_TOO_LARGE,
                message: "Payload Too Large".into()
            })
        );
        assert_eq!(frames.next_frame().await, Some(Frame::Close));
    }
}
