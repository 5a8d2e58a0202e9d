//! In-process HTTP mock for tests
//!
//! A `tiny_http` server on an ephemeral loopback port that answers with
//! queued canned responses and records every request it sees.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query, e.g. `/me/player/currently-playing`
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    delay: Duration,
}

pub struct MockServer {
    server: Arc<Server>,
    port: u16,
    queue: Arc<Mutex<VecDeque<Canned>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock server"));
        let port = server
            .server_addr()
            .to_ip()
            .expect("mock server has an IP address")
            .port();
        let queue: Arc<Mutex<VecDeque<Canned>>> = Arc::default();
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();

        let handle = {
            let server = server.clone();
            let queue = queue.clone();
            let requests = requests.clone();
            std::thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    requests.lock().push(RecordedRequest {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        headers: request
                            .headers()
                            .iter()
                            .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
                            .collect(),
                        body,
                    });

                    let canned = queue.lock().pop_front().unwrap_or(Canned {
                        status: 500,
                        content_type: "text/plain",
                        body: b"no canned response".to_vec(),
                        delay: Duration::ZERO,
                    });
                    if !canned.delay.is_zero() {
                        std::thread::sleep(canned.delay);
                    }
                    let header = Header::from_bytes(&b"Content-Type"[..], canned.content_type.as_bytes())
                        .expect("valid header");
                    let response = Response::from_data(canned.body)
                        .with_status_code(canned.status)
                        .with_header(header);
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            port,
            queue,
            requests,
            handle: Some(handle),
        }
    }

    /// Absolute URL for `path` on this server
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// `host:port`, the shape a WLED device target takes
    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn enqueue_json(&self, status: u16, body: &str) {
        self.push(status, "application/json", body.as_bytes().to_vec(), Duration::ZERO);
    }

    pub fn enqueue_text(&self, status: u16, body: &str) {
        self.push(status, "text/plain", body.as_bytes().to_vec(), Duration::ZERO);
    }

    pub fn enqueue_bytes(&self, status: u16, content_type: &'static str, body: Vec<u8>) {
        self.push(status, content_type, body, Duration::ZERO);
    }

    /// Like `enqueue_bytes`, but the response is held back for `delay`
    pub fn enqueue_delayed(
        &self,
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
        delay: Duration,
    ) {
        self.push(status, content_type, body, delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn push(&self, status: u16, content_type: &'static str, body: Vec<u8>, delay: Duration) {
        self.queue.lock().push_back(Canned {
            status,
            content_type,
            body,
            delay,
        });
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// PNG bytes of a `width` x `height` image filled by `pixel(x, y)`
pub fn png_bytes(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb(pixel(x, y)));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
