use super::handlers::bad_request;
use super::{AppState, ChatStreamQuery};
use crate::pipeline::{EventSink, Request};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use std::sync::Arc;

/// GET /chat-stream?message=...: pipeline events as Server-Sent Events.
///
/// The pipeline runs on its own task and feeds a capacity-1 channel; when the
/// client disconnects the body stream (and the receiver) drops, which stops
/// the pipeline at its next await.
pub(super) async fn handle_chat_stream(
    State(state): State<AppState>,
    Query(query): Query<ChatStreamQuery>,
) -> axum::response::Response {
    let request = match Request::new(query.message) {
        Ok(request) => request,
        Err(e) => return bad_request(e.to_string()),
    };

    let (sink, mut rx) = EventSink::channel();
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run(&request, &sink).await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok::<_, std::convert::Infallible>(format!("data:{json}\n\n")),
                Err(e) => tracing::warn!("dropping unserializable event: {e}"),
            }
        }
    };

    sse_response(Body::from_stream(stream)).into_response()
}

fn sse_response(body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response.headers_mut().insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    response
}
