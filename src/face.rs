use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::orchestrator::{BatchReport, RunEvent};
use crate::records::{self, Record};

/// A batch queued for the worker that owns the page.
pub struct Job {
    pub records: Vec<Record>,
    pub reply: oneshot::Sender<BatchReport>,
}

impl RunEvent {
    fn to_sse_event(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Event::default().event(self.name()).data(data)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub job_tx: mpsc::Sender<Job>,
    pub event_tx: broadcast::Sender<RunEvent>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/fill-forms", post(fill_forms_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(Arc::new(state))
}

/// Bind on `port`, falling back through the next nine ports, and serve in
/// the background. Returns the job queue and the event channel.
pub async fn start_server(
    port: u16,
) -> std::io::Result<(mpsc::Receiver<Job>, broadcast::Sender<RunEvent>)> {
    let (job_tx, job_rx) = mpsc::channel::<Job>(8);
    let (event_tx, _) = broadcast::channel::<RunEvent>(64);

    let app = router(AppState {
        job_tx,
        event_tx: event_tx.clone(),
    });

    let mut last_err = None;
    let mut bound = None;
    for p in port..port.saturating_add(10) {
        match tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            Ok(l) => {
                bound = Some((l, p));
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let (listener, port) = match bound {
        Some(b) => b,
        None => {
            return Err(last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::AddrInUse, "no port available")
            }));
        }
    };

    tracing::info!("form API listening at http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    Ok((job_rx, event_tx))
}

async fn fill_forms_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let records = records::records_from_value(payload);
    if records.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No data provided"})),
        );
    }

    tracing::info!(entries = records.len(), "received form fill request");

    let (reply, done) = oneshot::channel();
    if state.job_tx.send(Job { records, reply }).await.is_err() {
        return internal_error("worker is not running");
    }
    match done.await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({"message": "Processing complete", "results": report})),
        ),
        Err(_) => internal_error("worker dropped the batch"),
    }
}

fn internal_error(details: &str) -> (StatusCode, Json<Value>) {
    tracing::error!(details, "could not process batch");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error", "details": details})),
    )
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (Arc<AppState>, mpsc::Receiver<Job>) {
        let (job_tx, job_rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(4);
        (Arc::new(AppState { job_tx, event_tx }), job_rx)
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let (state, _rx) = state();
        let (status, Json(body)) = fill_forms_handler(State(state), Json(json!([]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No data provided");
    }

    #[tokio::test]
    async fn batch_is_handed_to_worker_and_report_returned() {
        let (state, mut rx) = state();
        let worker = tokio::spawn(async move {
            let job = rx.recv().await.unwrap();
            assert_eq!(job.records.len(), 1);
            let _ = job.reply.send(BatchReport::default());
        });

        let (status, Json(body)) =
            fill_forms_handler(State(state), Json(json!({"First Name": "Ada"}))).await;
        worker.await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Processing complete");
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn stopped_worker_is_a_server_error() {
        let (state, rx) = state();
        drop(rx);
        let (status, _) = fill_forms_handler(State(state), Json(json!([{"a": "b"}]))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn events_serialize_with_their_tag() {
        let event = RunEvent::RecordFinished {
            index: 2,
            applied: 5,
            failed: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "record_finished");
        assert_eq!(value["applied"], 5);
        assert_eq!(event.name(), "record_finished");
    }
}
