//! Segment requests against a throwaway local HTTP server.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use vodpipe::Error;
use vodpipe::domain::{ContainerFormat, SegmentDescriptor};
use vodpipe::downloader::{HttpSegmentOpener, SegmentOpener};
use vodpipe::utils::http_client::install_rustls_provider;

/// Serve one request with `status` and `body`; the raw request head is sent back
/// through the channel.
async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        let _ = tx.send(String::from_utf8_lossy(&head).into_owned());

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\n\
             Content-Type: video/x-flv\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (format!("http://{addr}/segments/0.flv"), rx)
}

fn segment(url: String, size: u64) -> SegmentDescriptor {
    SegmentDescriptor {
        order: 0,
        url,
        size,
        duration_ms: 1000,
        format: ContainerFormat::Flv,
    }
}

fn opener() -> HttpSegmentOpener {
    install_rustls_provider();
    // Environment proxies must not intercept loopback traffic.
    let client = reqwest::Client::builder()
        .user_agent("vodpipe-test/1.0")
        .connect_timeout(Duration::from_secs(5))
        .no_proxy()
        .build()
        .unwrap();
    HttpSegmentOpener::new(client)
}

#[tokio::test]
async fn test_streams_body_with_segment_headers() {
    let body: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    let (url, request) = serve_once("206 Partial Content", body.clone()).await;

    let mut source = opener()
        .open(&segment(url, body.len() as u64), "https://www.example.com/video/av1")
        .await
        .unwrap();

    let mut received = Vec::new();
    loop {
        let chunk = source.read_chunk(4096).await.unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= 4096);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, body);

    let head = request.await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /segments/0.flv "), "{head}");
    assert!(head.contains("range: bytes=0-"), "{head}");
    assert!(head.contains("referer: https://www.example.com/video/av1"), "{head}");
    assert!(head.contains("origin: https://www.example.com"), "{head}");
    assert!(head.contains("user-agent: vodpipe-test/1.0"), "{head}");
}

#[tokio::test]
async fn test_missing_segment_is_not_found() {
    let (url, _request) = serve_once("404 Not Found", Vec::new()).await;
    let result = opener().open(&segment(url, 0), "").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_server_error_is_transfer_error() {
    let (url, _request) = serve_once("503 Service Unavailable", b"busy".to_vec()).await;
    let result = opener().open(&segment(url, 4), "").await;
    assert!(matches!(result, Err(Error::Transfer(_))));
}
