// src/server.rs
use crate::dispatcher::Dispatcher;
use crate::error::TabservResult;
use crate::http::{Response, status_text};
use crate::metrics::ServerMetrics;
use crate::parser;
use memchr::memmem;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

const MAX_HEAD_BYTES: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

pub struct Server {
    addr: String,
}

impl Server {
    pub fn bind(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }

    /// Serve until ctrl-c. Each accepted connection gets its own worker
    /// thread, handles exactly one request, and closes.
    pub fn serve(self, dispatcher: Dispatcher) -> TabservResult<()> {
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("received SIGINT, shutting down");
            flag.store(true, Ordering::SeqCst);
        }) {
            warn!("could not install ctrl-c handler: {e}");
        }

        self.serve_with_shutdown(dispatcher, shutdown)
    }

    /// Serve until `shutdown` flips; on stop, all session cursors are
    /// dropped in bulk.
    pub fn serve_with_shutdown(
        self,
        dispatcher: Dispatcher,
        shutdown: Arc<AtomicBool>,
    ) -> TabservResult<()> {
        let listener = TcpListener::bind(&self.addr)?;
        listener.set_nonblocking(true)?;
        info!("listening on {}", self.addr);

        let dispatcher = Arc::new(dispatcher);
        let metrics = Arc::new(ServerMetrics::new());

        // periodic counters report
        let report_metrics = metrics.clone();
        let report_shutdown = shutdown.clone();
        thread::Builder::new()
            .name("tabserv-metrics".to_string())
            .spawn(move || {
                while !report_shutdown.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_secs(10));
                    debug!(
                        requests = report_metrics.requests.load(Ordering::Relaxed),
                        active = report_metrics.active_connections.load(Ordering::Relaxed),
                        bytes = report_metrics.bytes_written.load(Ordering::Relaxed),
                        "server counters"
                    );
                }
            })
            .ok();

        while !shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    let dispatcher = dispatcher.clone();
                    let metrics = metrics.clone();
                    let spawned = thread::Builder::new()
                        .name("tabserv-conn".to_string())
                        .spawn(move || handle_connection(stream, &dispatcher, &metrics));
                    if let Err(e) = spawned {
                        warn!("could not spawn connection thread: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }

        dispatcher.cursors().clear();
        info!("server stopped");
        Ok(())
    }
}

fn handle_connection(mut stream: TcpStream, dispatcher: &Dispatcher, metrics: &ServerMetrics) {
    metrics.inc_connection();
    let started = Instant::now();

    match read_request(&mut stream) {
        Ok(buf) => match parser::parse_head(&buf) {
            Ok((raw, _)) => {
                let req = parser::parse_request(&raw);
                metrics.inc_request();

                let resp = dispatcher.handle(&req);
                info!(
                    uri = %req.uri,
                    status = resp.status,
                    ms = started.elapsed().as_millis() as u64,
                    "request"
                );
                if let Err(e) = write_response(&mut stream, &resp, metrics) {
                    debug!("response write failed: {e}");
                }
            }
            Err(e) => {
                warn!("malformed request head: {:?}", e);
                let _ = write_response(&mut stream, &Response::bad_request(), metrics);
            }
        },
        Err(e) => debug!("request read failed: {e}"),
    }

    metrics.dec_connection();
}

/// Read the request head up to the blank line, then as much body as
/// Content-Length announces. A truncated body is returned as-is; the parser
/// is lenient about it.
fn read_request(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    // the listener polls non-blocking; accepted sockets must not inherit that
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let head_end = loop {
        if let Some(at) = memmem::find(&buf, b"\r\n\r\n") {
            break at + 4;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let wanted = head_end + content_length_of(&buf[..head_end]);
    while buf.len() < wanted {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(buf)
}

fn content_length_of(head: &[u8]) -> usize {
    for line in head.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            let name = &line[..colon];
            if name.eq_ignore_ascii_case(b"Content-Length") {
                return std::str::from_utf8(&line[colon + 1..])
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
            }
        }
    }
    0
}

/// One response per connection: status line, Date, Content-Type, any
/// negotiated Content-Encoding, Content-Length, response cookies, and
/// Connection: close.
fn write_response(
    stream: &mut TcpStream,
    resp: &Response,
    metrics: &ServerMetrics,
) -> io::Result<()> {
    let mut head = String::with_capacity(256);
    head.push_str("HTTP/1.1 ");
    head.push_str(status_text(resp.status));
    head.push_str("\r\nDate: ");
    head.push_str(&httpdate::fmt_http_date(SystemTime::now()));
    head.push_str("\r\nContent-Type: ");
    head.push_str(&resp.content_type);
    head.push_str("\r\n");

    for (name, value) in &resp.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }

    for (name, value) in &resp.cookies {
        head.push_str("Set-Cookie: ");
        head.push_str(name);
        head.push('=');
        head.push_str(value);
        head.push_str("\r\n");
    }

    head.push_str("Content-Length: ");
    head.push_str(&resp.body.len().to_string());
    head.push_str("\r\nConnection: close\r\n\r\n");

    stream.write_all(head.as_bytes())?;
    stream.write_all(&resp.body)?;
    stream.flush()?;

    metrics.add_bytes(head.len() + resp.body.len());
    Ok(())
}
