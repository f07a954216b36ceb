//! HTTP Surface
//!
//! Thin JSON layer over [`RankingCoordinator`], served with hyper HTTP/1.
//!
//! | Method | Path              | Operation                         |
//! |--------|-------------------|-----------------------------------|
//! | POST   | `/student`        | create a student                  |
//! | POST   | `/student/{id}`   | update scores                     |
//! | GET    | `/rank/{subject}` | leaderboard, `?number=N`          |
//! | GET    | `/students`       | batch read, `?ids=a,b,c`          |
//! | GET    | `/healthz`        | store reachability                |
//!
//! `/metrics` is served by a separate listener, see [`serve_metrics`].

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::coordinator::RankingCoordinator;
use crate::error::{Error, ErrorKind, Result};

pub type HttpResponse = Response<Full<Bytes>>;

/// Largest request body the API reads
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateResponse<'a> {
    student_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    scores: BTreeMap<String, ScoreValue>,
}

/// A score given either bare or as a `{"subject", "score"}` object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Bare(f64),
    Tagged {
        #[serde(default)]
        subject: Option<String>,
        score: f64,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl UpdateRequest {
    fn into_scores(self) -> Result<BTreeMap<String, f64>> {
        self.scores
            .into_iter()
            .map(|(key, value)| match value {
                ScoreValue::Bare(score) => Ok((key, score)),
                ScoreValue::Tagged { subject, score } => match subject {
                    Some(subject) if subject != key => Err(Error::Validation(format!(
                        "score under {:?} names subject {:?}",
                        key, subject
                    ))),
                    _ => Ok((key, score)),
                },
            })
            .collect()
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Route one API request.
pub async fn handle(
    coordinator: &RankingCoordinator,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
) -> HttpResponse {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let params = parse_query(query);

    let result = match (method, segments.as_slice()) {
        (&Method::POST, ["student"]) => create(coordinator, &body).await,
        (&Method::POST, ["student", id]) => update(coordinator, id, &body).await,
        (&Method::GET, ["rank", subject]) => {
            let count = params.get("number").map(String::as_str);
            coordinator
                .get_rank(subject, count)
                .await
                .and_then(|entries| json(StatusCode::OK, &entries))
        }
        (&Method::GET, ["students"]) => {
            let ids: Vec<String> = params
                .get("ids")
                .map(|raw| {
                    raw.split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            coordinator
                .get_students(&ids)
                .await
                .and_then(|views| json(StatusCode::OK, &views))
        }
        (&Method::GET, ["healthz"]) => health(coordinator).await,
        (_, ["student"] | ["student", _] | ["rank", _] | ["students"] | ["healthz"]) => {
            Ok(error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"))
        }
        _ => Ok(error_response(StatusCode::NOT_FOUND, "not found")),
    };

    result.unwrap_or_else(|e| {
        debug!(%method, path, error = %e, "Request failed");
        error_response(status_for(&e), &e.to_string())
    })
}

/// Route one request on the operations listener.
pub async fn handle_ops(coordinator: &RankingCoordinator, path: &str) -> HttpResponse {
    let result = match path {
        "/metrics" => coordinator.metrics().encode().map(|text| {
            let mut response = Response::new(Full::new(Bytes::from(text)));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }),
        "/healthz" | "/readyz" => health(coordinator).await,
        _ => Ok(error_response(StatusCode::NOT_FOUND, "not found")),
    };
    result.unwrap_or_else(|e| error_response(status_for(&e), &e.to_string()))
}

async fn create(coordinator: &RankingCoordinator, body: &Bytes) -> Result<HttpResponse> {
    let request: CreateRequest = decode(body)?;
    let id = coordinator.create_student(&request.name).await?;
    json(
        StatusCode::OK,
        &CreateResponse {
            student_id: id.as_str(),
        },
    )
}

async fn update(coordinator: &RankingCoordinator, id: &str, body: &Bytes) -> Result<HttpResponse> {
    let request: UpdateRequest = decode(body)?;
    let report = coordinator
        .update_scores(id, &request.into_scores()?)
        .await?;
    json(StatusCode::OK, &report)
}

async fn health(coordinator: &RankingCoordinator) -> Result<HttpResponse> {
    let report = coordinator.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json(status, &report)
}

// =============================================================================
// Helpers
// =============================================================================

/// Map an error onto a response status
pub fn status_for(error: &Error) -> StatusCode {
    match error.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::Validation(format!("invalid request body: {}", e)))
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<HttpResponse> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    let body = ErrorBody {
        error: message.to_string(),
    };
    json(status, &body).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from_static(b"{}")));
        *response.status_mut() = status;
        response
    })
}

fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

async fn read_request<B>(coordinator: &RankingCoordinator, req: Request<B>) -> HttpResponse
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("failed to read request body: {}", e),
            )
        }
    };

    handle(coordinator, &method, &path, query.as_deref(), body).await
}

// =============================================================================
// Listeners
// =============================================================================

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<RankingCoordinator>,
    shutdown: CancellationToken,
) -> Result<()> {
    serve_with(listener, shutdown, "API", move |req| {
        let coordinator = coordinator.clone();
        async move { read_request(&coordinator, req).await }
    })
    .await
}

/// Serve `/metrics` and `/healthz` until `shutdown` is cancelled.
pub async fn serve_metrics(
    listener: TcpListener,
    coordinator: Arc<RankingCoordinator>,
    shutdown: CancellationToken,
) -> Result<()> {
    serve_with(listener, shutdown, "Metrics", move |req: Request<Incoming>| {
        let coordinator = coordinator.clone();
        async move { handle_ops(&coordinator, req.uri().path()).await }
    })
    .await
}

async fn serve_with<H, F>(
    listener: TcpListener,
    shutdown: CancellationToken,
    name: &'static str,
    handler: H,
) -> Result<()>
where
    H: Fn(Request<Incoming>) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = HttpResponse> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.map_err(|e| {
                Error::Internal(format!("{} server accept error: {}", name, e))
            })?,
        };

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req);
                async move { Ok::<_, Infallible>(response.await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(%peer, "{} server connection error: {}", name, e);
            }
        });
    }

    info!("{} server stopped", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryRankCache, InMemoryRecordStore};
    use crate::coordinator::CoordinatorConfig;
    use crate::domain::ports::Subject;
    use serde_json::Value;

    fn coordinator() -> (RankingCoordinator, Arc<InMemoryRecordStore>) {
        let records = Arc::new(InMemoryRecordStore::new());
        let coordinator = RankingCoordinator::new(
            CoordinatorConfig::default(),
            records.clone(),
            Arc::new(InMemoryRankCache::with_seed(3)),
        )
        .unwrap()
        .with_score_source(Arc::new(|subject: Subject| match subject {
            Subject::Math => 40.0,
            Subject::Chinese => 50.0,
            Subject::English => 60.0,
        }));
        (coordinator, records)
    }

    async fn call(
        coordinator: &RankingCoordinator,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let response = handle(
            coordinator,
            &method,
            path,
            query,
            Bytes::from(body.to_string()),
        )
        .await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let (c, _) = coordinator();
        let (status, body) = call(&c, Method::POST, "/student/", None, r#"{"name":"Alice"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["student_id"], "R0000000001");

        let (status, body) = call(
            &c,
            Method::POST,
            "/student/R0000000001",
            None,
            r#"{"scores":{"math":90,"english":{"subject":"english","score":70}}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score_total"], 210.0);
        assert_eq!(body["rejected"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (c, records) = coordinator();
        let padding = " ".repeat(MAX_BODY_BYTES);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/student")
            .body(Full::new(Bytes::from(format!(r#"{{"name":"Alice"}}{}"#, padding))))
            .unwrap();

        let response = read_request(&c, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(records.is_empty());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/student")
            .body(Full::new(Bytes::from(r#"{"name":"Alice"}"#)))
            .unwrap();
        assert_eq!(read_request(&c, req).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_error_statuses() {
        let (c, _) = coordinator();
        call(&c, Method::POST, "/student", None, r#"{"name":"Alice"}"#).await;

        let (status, body) = call(
            &c,
            Method::POST,
            "/student/R0000000001",
            None,
            r#"{"scores":{"music":80}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("music"));

        let (status, _) = call(
            &c,
            Method::POST,
            "/student/R0000000009",
            None,
            r#"{"scores":{"math":80}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&c, Method::POST, "/student/R1", None, r#"{"scores":{}}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&c, Method::POST, "/student", None, "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rank_and_students() {
        let (c, _) = coordinator();
        call(&c, Method::POST, "/student", None, r#"{"name":"Alice"}"#).await;
        call(&c, Method::POST, "/student", None, r#"{"name":"Bob"}"#).await;

        let (status, body) = call(&c, Method::GET, "/rank/total", Some("number=1"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["student_id"], "R0000000001");
        assert_eq!(body[0]["position"], 1);

        let (status, _) = call(&c, Method::GET, "/rank/total", Some("number=abc"), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&c, Method::GET, "/rank/music", None, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &c,
            Method::GET,
            "/students",
            Some("ids=R0000000002%2CR0000000001,nope"),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["student_id"], "R0000000001");
        assert_eq!(body[1]["student_id"], "R0000000002");
        assert_eq!(body[1]["ranks"]["total"], 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_maps_to_503() {
        let (c, records) = coordinator();
        records.faults().set_available(false);
        let (status, body) = call(&c, Method::POST, "/student", None, r#"{"name":"Alice"}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());

        let (status, _) = call(&c, Method::GET, "/healthz", None, "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let (c, _) = coordinator();
        let (status, _) = call(&c, Method::GET, "/nowhere", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&c, Method::DELETE, "/student/R0000000001", None, "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (c, _) = coordinator();
        c.create_student("Alice").await.unwrap();
        let response = handle_ops(&c, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("leaderboard_operations_total"));
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("ids=R0000000001%2CR0000000002&number=5&flag"));
        assert_eq!(params["ids"], "R0000000001,R0000000002");
        assert_eq!(params["number"], "5");
        assert_eq!(params["flag"], "");
        assert!(parse_query(None).is_empty());
    }
}
