//! Loopback listener for the OAuth redirect
//!
//! Binds the redirect URI's host and port, waits for the browser to come back
//! with `code` or `error`, then redirects it to the same path without the
//! one-time parameters so they never linger in the address bar or history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tiny_http::{Header, Request, Response, Server};
use url::Url;

use super::flow::CallbackParams;
use crate::error::AuthError;

const DONE_PAGE: &str = "<!doctype html><html><head><title>wledify</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">\
<h2>Spotify login received</h2><p>You can close this tab and return to wledify.</p>\
</body></html>";

const WAITING_PAGE: &str = "<!doctype html><html><head><title>wledify</title></head>\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">\
<h2>wledify is waiting for Spotify</h2></body></html>";

/// How long to keep serving after the code arrived, for the redirected page load
const FOLLOW_UP_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on a single blocking receive, so cancellation is noticed
const RECV_SLICE: Duration = Duration::from_millis(200);

/// Listener bound to the redirect URI
pub struct CallbackListener {
    server: Arc<Server>,
    cancelled: Arc<AtomicBool>,
    path: String,
    port: u16,
}

/// Stops a listener blocked in [`CallbackListener::wait`] from another thread
#[derive(Clone)]
pub struct CallbackCancel {
    server: Arc<Server>,
    cancelled: Arc<AtomicBool>,
}

impl CallbackCancel {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.server.unblock();
    }
}

impl CallbackListener {
    /// Bind the host and port named by `redirect_uri`
    pub fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::NotConfigured(format!("invalid redirect_uri: {}", e)))?;
        if url.scheme() != "http" {
            return Err(AuthError::NotConfigured(
                "redirect_uri must be a plain http loopback address".to_string(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| AuthError::NotConfigured("redirect_uri has no host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        Self::bind_addr(&format!("{}:{}", host, port), url.path())
    }

    /// Bind an explicit `host:port`, answering on `path`
    pub fn bind_addr(addr: &str, path: &str) -> Result<Self, AuthError> {
        let server = Server::http(addr)
            .map_err(|e| AuthError::CallbackServer(format!("cannot listen on {}: {}", addr, e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .ok_or_else(|| AuthError::CallbackServer("listener has no IP address".to_string()))?;
        tracing::debug!(port, path, "OAuth callback listener bound");
        Ok(Self {
            server: Arc::new(server),
            cancelled: Arc::new(AtomicBool::new(false)),
            path: path.to_string(),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cancel_handle(&self) -> CallbackCancel {
        CallbackCancel {
            server: self.server.clone(),
            cancelled: self.cancelled.clone(),
        }
    }

    /// Block until the redirect arrives, `timeout` elapses, or the listener is cancelled
    pub fn wait(self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let deadline = Instant::now() + timeout;

        let params = loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(AuthError::CallbackServer("login cancelled".to_string()));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AuthError::CallbackServer(
                    "timed out waiting for the browser".to_string(),
                ));
            }
            let request = match self.server.recv_timeout(remaining.min(RECV_SLICE)) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => return Err(AuthError::CallbackServer(e.to_string())),
            };

            if !self.matches_path(request.url()) {
                respond(request, Response::from_string("Not found").with_status_code(404));
                continue;
            }

            let params = CallbackParams::from_request_target(request.url());
            if !params.is_present() {
                respond(request, html(WAITING_PAGE));
                continue;
            }

            // Normalize the visible URL: same path, no one-time parameters
            match Header::from_bytes(&b"Location"[..], self.path.as_bytes()) {
                Ok(location) => respond(
                    request,
                    Response::from_string("").with_status_code(303).with_header(location),
                ),
                Err(_) => respond(request, html(DONE_PAGE)),
            }
            break params;
        };

        self.serve_follow_up();
        Ok(params)
    }

    /// Answer the redirected page load with the "close this tab" page
    fn serve_follow_up(&self) {
        let deadline = Instant::now() + FOLLOW_UP_GRACE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            match self.server.recv_timeout(remaining.min(RECV_SLICE)) {
                Ok(Some(request)) if self.matches_path(request.url()) => {
                    respond(request, html(DONE_PAGE));
                    return;
                }
                Ok(Some(request)) => {
                    respond(request, Response::from_string("Not found").with_status_code(404));
                }
                Ok(None) => continue,
                Err(_) => return,
            }
        }
    }

    fn matches_path(&self, target: &str) -> bool {
        let path = target.split('?').next().unwrap_or(target);
        path == self.path
    }
}

fn html(body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let response = Response::from_string(body);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(_) => response,
    }
}

fn respond<R: std::io::Read>(request: Request, response: Response<R>) {
    if let Err(e) = request.respond(response) {
        tracing::debug!("Failed to answer callback request: {}", e);
    }
}
