use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use rustls::ServerConfig;
use shared::http::run_http_service;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Starts an in-process member answering every request with `handler`.
/// Returns its `host:port`.
pub async fn spawn_member<F, Fut>(handler: F) -> String
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let handler = handler.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(req).await) }
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// A member that returns the request body and reports what it received as
/// `x-echo-*` response headers.
pub async fn echo_member() -> String {
    spawn_member(|req: Request<Incoming>| async move {
        let (parts, body) = req.into_parts();
        let body = body.collect().await.unwrap().to_bytes();

        let mut response = Response::new(Full::new(body));
        let headers = response.headers_mut();
        for (name, value) in &parts.headers {
            let echoed = HeaderName::from_bytes(format!("x-echo-{name}").as_bytes()).unwrap();
            headers.append(echoed, value.clone());
        }
        headers.insert(
            "x-echo-method",
            HeaderValue::from_str(parts.method.as_str()).unwrap(),
        );
        headers.insert(
            "x-echo-uri",
            HeaderValue::from_str(&parts.uri.to_string()).unwrap(),
        );
        response
    })
    .await
}

/// A member that accepts connections but never answers.
pub async fn silent_member() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            held.push(stream);
        }
    });

    addr
}

/// A member that counts accepted connections and closes each one unanswered.
pub async fn closing_member(accepts: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            accepts.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    addr
}

/// Serves `body` over https through the production listener loop.
pub async fn spawn_tls_member(tls: ServerConfig, body: &'static str) -> String {
    let addr = closed_port().await;
    let (host, port) = addr.rsplit_once(':').unwrap();
    let (host, port) = (host.to_string(), port.parse::<u16>().unwrap());

    let service = service_fn(move |_req: Request<Incoming>| async move {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
    });
    tokio::spawn(async move { run_http_service(&host, port, Some(Arc::new(tls)), service).await });

    for _ in 0..100 {
        if TcpStream::connect(&addr).await.is_ok() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tls member on {addr} did not start listening");
}

/// An address nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
