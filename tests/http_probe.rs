use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use webpshift_core::capability::{probe_payload, CapabilityDetector};
use webpshift_core::config::ResolverConfig;
use webpshift_core::document::{Document, FormatOutcome, ImageElement};
use webpshift_core::probe::{DecodeProbe, HttpByteSource, ImageProbe};
use webpshift_core::resolver::FormatResolver;

#[tokio::test]
async fn http_probe_accepts_served_decodable_candidate() {
    let base = spawn_site_server().await;

    let probe = DecodeProbe::new(HttpByteSource::new(base));
    assert!(probe.exists("/assets/images-webp/hero.webp").await);
    assert!(!probe.exists("/assets/images-webp/missing.webp").await);
    assert!(!probe.exists("/assets/images-webp/broken.webp").await);
}

#[tokio::test]
async fn end_to_end_batch_against_http_site() {
    let base = spawn_site_server().await;

    let detector = Arc::new(CapabilityDetector::new());
    let probe = Arc::new(DecodeProbe::new(HttpByteSource::new(base)));
    let resolver = FormatResolver::new(ResolverConfig::default(), detector, probe);

    let document = Document::from_elements([
        ImageElement::with_staged_src("/assets/images/hero.png"),
        ImageElement::with_staged_src("/assets/images/absent.jpeg"),
    ]);

    let processed = resolver.process_all(&document).await;
    assert_eq!(processed, 2);

    let snapshot = document.snapshot();
    assert_eq!(snapshot[0].src(), Some("/assets/images-webp/hero.webp"));
    assert_eq!(snapshot[0].outcome(), Some(FormatOutcome::Optimized));
    assert_eq!(snapshot[1].src(), Some("/assets/images/absent.jpeg"));
    assert_eq!(snapshot[1].outcome(), Some(FormatOutcome::Original));
}

/// One-connection-at-a-time HTTP server exposing the optimized tree:
/// `hero.webp` serves the valid probe payload, `broken.webp` serves bytes
/// that do not decode, everything else is 404.
async fn spawn_site_server() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            handle_connection(stream).await;
        }
    });

    Url::parse(format!("http://{addr}/").as_str()).expect("base url should parse")
}

async fn handle_connection(mut stream: TcpStream) {
    let mut buf = vec![0u8; 4096];
    let mut read = 0usize;
    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => return,
            Ok(n) => read += n,
        }
        if read == buf.len() {
            return;
        }
    }

    let request = String::from_utf8_lossy(&buf[..read]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, body): (&str, Vec<u8>) = match path {
        "/assets/images-webp/hero.webp" => ("200 OK", probe_payload()),
        "/assets/images-webp/broken.webp" => ("200 OK", b"junk bytes".to_vec()),
        _ => ("404 Not Found", Vec::new()),
    };

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(body.as_slice()).await;
    let _ = stream.shutdown().await;
}
