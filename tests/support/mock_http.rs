use std::{
    collections::HashMap,
    convert::Infallible,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Request, Response, Server, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const SLOW_HEADERS_DELAY: Duration = Duration::from_secs(5);
pub const STALL_DELAY: Duration = Duration::from_secs(30);

/// Request counters per path, shared between the server and the test.
#[derive(Clone, Default)]
pub struct HitLog {
    hits: Arc<Mutex<HashMap<String, u64>>>,
}

impl HitLog {
    fn record(&self, path: &str) {
        let mut hits = self.hits.lock().expect("hit log poisoned");
        *hits.entry(path.to_owned()).or_insert(0) += 1;
    }

    pub fn count(&self, path: &str) -> u64 {
        self.hits
            .lock()
            .expect("hit log poisoned")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.hits.lock().expect("hit log poisoned").values().sum()
    }
}

/// Serves a fixed set of routes:
///
/// * `/ok/<name>`        200 with body `content of <name>`
/// * `/redirect/<name>`  302 to `/ok/<name>`
/// * `/missing`          404
/// * `/error`            500
/// * `/slow-headers`     200 after [`SLOW_HEADERS_DELAY`]
/// * `/stall-body`       200, a few bytes, then silence for [`STALL_DELAY`]
/// * `/truncated`        200 announcing more bytes than it sends before aborting
pub struct MockHttpServer {
    base: String,
    hits: HitLog,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock HTTP listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let hits = HitLog::default();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let service_hits = hits.clone();
        let make_service = make_service_fn(move |_| {
            let hits = service_hits.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(hits.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock HTTP server stopped: {err}");
            }
        });

        Ok(Self {
            base: format!("http://{addr}"),
            hits,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> &HitLog {
        &self.hits
    }

    /// Stops accepting connections. Stalled responses are abandoned rather
    /// than awaited.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub fn body_for(name: &str) -> String {
    format!("content of {name}")
}

async fn serve_request(hits: HitLog, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();
    hits.record(&path);

    let response = if let Some(name) = path.strip_prefix("/ok/") {
        let body = body_for(name);
        Response::builder()
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
    } else if let Some(name) = path.strip_prefix("/redirect/") {
        Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, format!("/ok/{name}"))
            .body(Body::empty())
    } else {
        match path.as_str() {
            "/missing" => status(StatusCode::NOT_FOUND),
            "/error" => status(StatusCode::INTERNAL_SERVER_ERROR),
            "/slow-headers" => {
                sleep(SLOW_HEADERS_DELAY).await;
                Response::builder().body(Body::from("late"))
            }
            "/stall-body" => {
                let chunks = stream::once(async { Ok::<_, io::Error>(vec![b'x'; 16]) }).chain(
                    stream::once(async {
                        sleep(STALL_DELAY).await;
                        Ok(vec![b'y'; 16])
                    }),
                );
                Response::builder()
                    .header(header::CONTENT_LENGTH, 32)
                    .body(Body::wrap_stream(chunks))
            }
            "/truncated" => {
                let chunks = stream::once(async { Ok::<_, io::Error>(vec![b'x'; 16]) })
                    .chain(stream::once(async { Err(io::Error::other("connection dropped")) }));
                Response::builder()
                    .header(header::CONTENT_LENGTH, 1024)
                    .body(Body::wrap_stream(chunks))
            }
            _ => status(StatusCode::NOT_FOUND),
        }
    };

    Ok(response.unwrap_or_else(|err| {
        let mut response = Response::new(Body::from(format!("mock response error: {err}")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }))
}

fn status(code: StatusCode) -> hyper::http::Result<Response<Body>> {
    Response::builder()
        .status(code)
        .body(Body::from(code.to_string()))
}

/// Address that refuses connections: bound once, then released.
pub async fn refused_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind probe listener")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}/gone"))
}
