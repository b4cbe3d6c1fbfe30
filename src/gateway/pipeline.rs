//! Ordered gateway stages and the axum middleware that runs them.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::error::GatewayError;

/// What a stage decided about the request.
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    Halt(GatewayError),
}

/// Request body as seen by the stages: untouched until a stage buffers it.
pub enum InboundBody {
    Pending(Body),
    Buffered(Bytes),
}

pub struct InboundRequest {
    pub parts: Parts,
    pub body: InboundBody,
}

impl InboundRequest {
    pub fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            parts,
            body: InboundBody::Pending(body),
        }
    }

    /// Takes the unread body, leaving an empty buffer behind.
    pub fn take_pending_body(&mut self) -> Option<Body> {
        match std::mem::replace(&mut self.body, InboundBody::Buffered(Bytes::new())) {
            InboundBody::Pending(body) => Some(body),
            buffered => {
                self.body = buffered;
                None
            }
        }
    }

    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            InboundBody::Buffered(bytes) => Some(bytes),
            InboundBody::Pending(_) => None,
        }
    }

    /// Reassembles the request. A buffered body may have been rewritten, so
    /// its `Content-Length` is recomputed.
    pub fn into_request(mut self) -> Request {
        let body = match self.body {
            InboundBody::Pending(body) => body,
            InboundBody::Buffered(bytes) => {
                self.parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                Body::from(bytes)
            }
        };
        Request::from_parts(self.parts, body)
    }
}

#[async_trait]
pub trait GatewayStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, ctx: &mut RequestContext, request: &mut InboundRequest) -> StageOutcome;
}

pub struct GatewayPipeline {
    stages: Vec<Box<dyn GatewayStage>>,
    trust_proxy: bool,
}

impl GatewayPipeline {
    pub fn new(trust_proxy: bool) -> Self {
        Self {
            stages: Vec::new(),
            trust_proxy,
        }
    }

    pub fn with_stage(mut self, stage: impl GatewayStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }

    /// Runs every stage in order, stopping at the first halt.
    pub async fn run(
        &self,
        ctx: &mut RequestContext,
        request: &mut InboundRequest,
    ) -> Result<(), GatewayError> {
        for stage in &self.stages {
            match stage.apply(ctx, request).await {
                StageOutcome::Continue => {}
                StageOutcome::Halt(err) => {
                    debug!(
                        "[{}] halted by stage '{}': {}",
                        ctx.request_id,
                        stage.name(),
                        err
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

/// Middleware running the pipeline in front of a route. On success the
/// [`RequestContext`] is handed to the handler through request extensions.
pub async fn gateway_layer(
    State(pipeline): State<Arc<GatewayPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let mut inbound = InboundRequest::from_request(request);
    let mut ctx = RequestContext::from_parts(&inbound.parts, pipeline.trust_proxy());

    let outcome = pipeline.run(&mut ctx, &mut inbound).await;
    let rate_limit = ctx.rate_limit;

    let mut response = match outcome {
        Ok(()) => {
            let mut request = inbound.into_request();
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            warn!(
                "[{}] {} {} rejected for {}: {}",
                ctx.request_id,
                ctx.method,
                ctx.path,
                ctx.client_label(),
                err
            );
            err.into_response()
        }
    };

    if let Some(status) = rate_limit {
        status.apply_headers(response.headers_mut());
    }
    response
}
