//! Thin HTTP client over hyper with cookie capture and form encoding.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::jar::CookieJar;
use crate::{Error, Result};

/// Guard against a runaway response; wizard pages are small.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

const AGENT: &str = "crmboot-wizard/0.1";

/// A decoded wizard page.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: StatusCode,
    pub body: String,
}

impl PageResponse {
    /// Substring check against the HTML body.
    pub fn contains(&self, marker: &str) -> bool {
        self.body.contains(marker)
    }
}

/// Percent-encode form fields into an `application/x-www-form-urlencoded`
/// body.
pub fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HTTP client bound to the application's base URL, with a cookie jar
/// preserving session state between wizard steps.
pub struct WizardClient {
    base: String,
    client: Client<HttpConnector, Full<Bytes>>,
    jar: CookieJar,
    timeout: Duration,
}

impl WizardClient {
    /// `base` is scheme + authority, e.g. `http://127.0.0.1:8080`.
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            base,
            client: Client::builder(TokioExecutor::new()).build_http(),
            jar: CookieJar::new(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Override the per-request timeout. Install steps can legitimately
    /// run for minutes while the application populates its schema.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The captured session cookies.
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// GET a path (leading `/` included, query string allowed).
    pub async fn get(&mut self, path: &str) -> Result<PageResponse> {
        self.execute(Method::GET, path, None).await
    }

    /// POST form fields to a path.
    pub async fn post_form(
        &mut self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<PageResponse> {
        self.execute(Method::POST, path, Some(encode_form(fields)))
            .await
    }

    async fn execute(
        &mut self,
        method: Method,
        path: &str,
        form_body: Option<String>,
    ) -> Result<PageResponse> {
        let uri = format!("{}{}", self.base, path);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(USER_AGENT, AGENT);
        if let Some(cookie) = self.jar.header() {
            builder = builder.header(COOKIE, cookie);
        }
        let body = match form_body {
            Some(form) => {
                builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                Full::new(Bytes::from(form))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder.body(body)?;

        debug!(%method, %uri, "wizard request");
        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| Error::Timeout {
                uri: uri.clone(),
                timeout: self.timeout,
            })??;

        for value in response.headers().get_all(SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                self.jar.store(value);
            }
        }

        let status = response.status();
        let mut incoming = response.into_body();
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let frame = match tokio::time::timeout(self.timeout, incoming.frame()).await {
                Ok(Some(frame)) => frame?,
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::Timeout {
                        uri: uri.clone(),
                        timeout: self.timeout,
                    });
                }
            };
            if let Ok(data) = frame.into_data() {
                let room = MAX_BODY_BYTES - buf.len();
                buf.extend_from_slice(&data[..std::cmp::min(data.len(), room)]);
                if buf.len() >= MAX_BODY_BYTES {
                    debug!(%uri, "response body hit the size cap, truncating");
                    break;
                }
            }
        }
        let body = String::from_utf8_lossy(&buf).into_owned();

        debug!(%status, bytes = body.len(), "wizard response");
        Ok(PageResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn form_encoding_escapes_reserved_characters() {
        let body = encode_form(&[
            ("setup_site_url", "http://crm.example.com"),
            ("password", "p&ss wörd"),
        ]);
        assert_eq!(
            body,
            "setup_site_url=http%3A%2F%2Fcrm.example.com&password=p%26ss%20w%C3%B6rd",
        );
    }

    /// One-shot HTTP server: answers `responses` in order, captures the
    /// raw request heads it saw.
    async fn serve(
        listener: TcpListener,
        responses: Vec<String>,
    ) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let mut head = String::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if let Some(idx) = head.find("\r\n\r\n") {
                        let declared = head[..idx]
                            .to_ascii_lowercase()
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:").map(str::to_string))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if head.len() >= idx + 4 + declared {
                            break;
                        }
                    }
                }
                seen.push(head);
                socket.write_all(response.as_bytes()).await.unwrap();
            }
            seen
        })
    }

    fn page(set_cookie: Option<&str>, body: &str) -> String {
        let cookie_line = set_cookie
            .map(|c| format!("Set-Cookie: {c}\r\n"))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            body.len(),
            cookie_line,
            body,
        )
    }

    #[tokio::test]
    async fn oversized_bodies_are_truncated_at_the_cap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            socket.read(&mut buf).await.unwrap();
            let huge = "x".repeat(MAX_BODY_BYTES + 1024);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                huge.len(),
            );
            // The client hangs up once the cap is hit; write errors are
            // expected and irrelevant here.
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(huge.as_bytes()).await;
        });

        let mut client = WizardClient::new(format!("http://{addr}"));
        let page = client.get("/install.php").await.unwrap();
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.body.len(), MAX_BODY_BYTES);
    }

    #[tokio::test]
    async fn captures_cookies_and_replays_them() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = serve(
            listener,
            vec![
                page(Some("PHPSESSID=s3ss10n; path=/"), "wizard start"),
                page(None, "step two"),
            ],
        )
        .await;

        let mut client = WizardClient::new(format!("http://{addr}"));
        let first = client.get("/install.php").await.unwrap();
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.contains("wizard start"));

        let second = client
            .post_form("/install.php", &[("goto", "SilentInstall")])
            .await
            .unwrap();
        assert!(second.contains("step two"));

        // hyper emits lowercase header names on the wire.
        let seen = server.await.unwrap();
        assert!(!seen[0].to_ascii_lowercase().contains("cookie:"));
        let second_head = seen[1].to_ascii_lowercase();
        assert!(second_head.contains("cookie: phpsessid=s3ss10n"));
        assert!(second_head.contains("content-type: application/x-www-form-urlencoded"));
        assert!(seen[1].ends_with("goto=SilentInstall"));
    }
}
