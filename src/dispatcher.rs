// src/dispatcher.rs
use crate::compress;
use crate::error::TabservError;
use crate::http::{ParsedRequest, Response};
use crate::serializer;
use crate::session::{SessionCursor, SessionCursorStore, lock_cursor};
use crate::signature::signature_of;
use crate::source::{ResourceKind, ScriptHost, TabularSource};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes parsed requests to the folder/table/stream handlers and owns the
/// session cursor store. Shared across all request threads.
pub struct Dispatcher {
    source: Arc<dyn TabularSource>,
    scripts: Option<Arc<dyn ScriptHost>>,
    cursors: SessionCursorStore,
    root: String,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn TabularSource>) -> Self {
        Self {
            source,
            scripts: None,
            cursors: SessionCursorStore::new(),
            root: String::new(),
        }
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptHost>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Prefix prepended to every request path before resolution.
    pub fn with_root(mut self, root: &str) -> Self {
        self.root = root.trim_end_matches('/').to_string();
        self
    }

    pub fn cursors(&self) -> &SessionCursorStore {
        &self.cursors
    }

    pub fn handle(&self, req: &ParsedRequest) -> Response {
        let uri = self.resolve_uri(&req.uri);

        let Some(meta) = self.source.resource_meta(&uri) else {
            debug!(%uri, "no such resource");
            return Response::not_found();
        };

        let ext = extension_of(&uri);

        if meta.mime_type.as_deref() == Some("text/html") || ext == "html" || ext == "htm" {
            return match self.source.open_stream(&uri) {
                Ok(body) => Response::html(body),
                Err(_) => Response::not_found(),
            };
        }

        if ext == "sjs" {
            return self.run_script(&uri, req);
        }

        match meta.kind {
            ResourceKind::Folder => match self.source.open_folder(&uri) {
                Ok(entries) => self.json_response(req, serializer::folder_envelope(&entries)),
                Err(_) => Response::not_found(),
            },
            ResourceKind::Table => match req.get_value("method") {
                Some("select") => self.select(&uri, req),
                _ => self.describe(&uri, req),
            },
            ResourceKind::Stream => match self.source.open_stream(&uri) {
                Ok(body) => Response::bytes(body, mime_for_extension(&ext)),
                Err(_) => Response::not_found(),
            },
        }
    }

    fn resolve_uri(&self, raw: &str) -> String {
        let mut uri = format!("{}/{}", self.root, raw);
        while let Some(at) = uri.find("//") {
            uri.remove(at);
        }
        while uri.len() > 1 && uri.ends_with('/') {
            uri.pop();
        }
        uri
    }

    /// `describe` is the default table method: structure only, no cursor.
    fn describe(&self, uri: &str, req: &ParsedRequest) -> Response {
        match self.source.open_table(uri) {
            Ok(schema) => self.json_response(req, serializer::describe_envelope(&schema)),
            Err(_) => Response::not_found(),
        }
    }

    /// `select` pages through a server-side cursor keyed by the request
    /// signature, so repeated windows never re-run the query.
    fn select(&self, uri: &str, req: &ParsedRequest) -> Response {
        let signature = signature_of(req);

        let cursor = self.cursors.get_or_create(signature, || {
            let mut sql = format!("SELECT * FROM {uri}");
            if let Some(order) = req.get_value("order")
                && !order.is_empty()
            {
                sql.push_str(" ORDER BY ");
                sql.push_str(order);
            }
            Ok(SessionCursor::new(self.source.execute_query(&sql)?))
        });

        let cursor = match cursor {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(%uri, "select failed: {e}");
                return Response::not_found();
            }
        };

        let start = int_param(req, "start").unwrap_or(1);
        let limit = int_param(req, "limit").unwrap_or(0);

        let batch = lock_cursor(&cursor).fetch(start, limit);

        let start_echo = req.get_params.contains_key("start").then_some(start.max(1));
        let limit_echo = req.get_params.contains_key("limit");
        self.json_response(req, serializer::rows_envelope(&batch, start_echo, limit_echo))
    }

    fn run_script(&self, uri: &str, req: &ParsedRequest) -> Response {
        let Some(scripts) = &self.scripts else {
            return Response::not_found();
        };
        match scripts.run_script(uri, req) {
            Ok(output) => Response::html(output),
            Err(TabservError::ResourceNotFound) => Response::not_found(),
            // script errors are rendered into the page
            Err(e) => Response::html(e.to_string()),
        }
    }

    /// Serialize an envelope and deflate it when the client negotiated it.
    fn json_response(&self, req: &ParsedRequest, envelope: serde_json::Value) -> Response {
        let body = envelope.to_string().into_bytes();
        let (body, encoding) = compress::maybe_compress(body, req.accept_compressed);
        let mut resp = Response::json(body);
        if let Some(token) = encoding {
            resp = resp.header("Content-Encoding", token);
        }
        resp
    }
}

fn int_param(req: &ParsedRequest, key: &str) -> Option<u64> {
    req.get_value(key).and_then(|v| v.parse().ok())
}

fn extension_of(uri: &str) -> String {
    match uri.rfind('.') {
        Some(idx) => uri[idx + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "css" => "text/css",
        "js" => "text/javascript",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, ParsedRequest};
    use crate::source::{ColumnInfo, ColumnType, Datum, MemorySource};

    fn dispatcher() -> Dispatcher {
        let mut source = MemorySource::new();
        source.add_table(
            "/data",
            vec![
                ColumnInfo::new("id", ColumnType::Integer),
                ColumnInfo::new("name", ColumnType::Character),
            ],
            vec![
                vec![Datum::Integer(1), Datum::Text("A".into())],
                vec![Datum::Integer(2), Datum::Text("B".into())],
                vec![Datum::Integer(3), Datum::Text("C".into())],
            ],
        );
        source.add_stream("/app.js", "application/octet-stream", b"var x;".to_vec());
        source.add_stream("/index.html", "text/html", b"<html></html>".to_vec());
        Dispatcher::new(Arc::new(source))
    }

    fn get(uri: &str, params: &[(&str, &str)]) -> ParsedRequest {
        let mut req = ParsedRequest::new(Method::Get, uri);
        for (k, v) in params {
            req.get_params.insert(k.to_string(), v.to_string());
        }
        req
    }

    #[test]
    fn test_select_window() {
        let d = dispatcher();
        let resp = d.handle(&get(
            "/data",
            &[("method", "select"), ("start", "1"), ("limit", "2")],
        ));

        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/json");
        assert_eq!(
            String::from_utf8(resp.body).unwrap(),
            r#"{"total_count":3,"start":1,"limit":2,"items":[{"id":"1","name":"A"},{"id":"2","name":"B"}]}"#
        );
    }

    #[test]
    fn test_describe_is_default() {
        let d = dispatcher();
        let resp = d.handle(&get("/data", &[]));
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();

        assert_eq!(v["total_count"], 2);
        assert_eq!(v["row_count"], 3);
        assert_eq!(v["items"][1]["name"], "name");
    }

    #[test]
    fn test_folder_and_stream_and_missing() {
        let d = dispatcher();

        let resp = d.handle(&get("/", &[]));
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["total_count"], 3);

        let resp = d.handle(&get("/app.js", &[]));
        assert_eq!(resp.content_type, "text/javascript");
        assert_eq!(resp.body, b"var x;");

        let resp = d.handle(&get("/index.html", &[]));
        assert_eq!(resp.content_type, "text/html");

        let resp = d.handle(&get("/missing", &[]));
        assert_eq!(resp.status, 404);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_trailing_slash_resolves() {
        let d = dispatcher();
        let resp = d.handle(&get("/data/", &[]));
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_root_prefix() {
        let mut source = MemorySource::new();
        source.add_folder("/app");
        source.add_table(
            "/app/data",
            vec![ColumnInfo::new("id", ColumnType::Integer)],
            vec![vec![Datum::Integer(1)]],
        );
        let d = Dispatcher::new(Arc::new(source)).with_root("/app");

        let resp = d.handle(&get("/data", &[]));
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_select_compressed_when_negotiated() {
        let d = dispatcher();
        let mut req = get("/data", &[("method", "select")]);
        req.accept_compressed = true;

        let resp = d.handle(&req);
        assert!(resp
            .headers
            .iter()
            .any(|(k, v)| *k == "Content-Encoding" && v == "deflate"));

        let body = crate::compress::decompress(&resp.body).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["total_count"], 3);
    }

    #[test]
    fn test_select_pages_share_one_cursor() {
        let d = dispatcher();
        let first = d.handle(&get(
            "/data",
            &[("method", "select"), ("start", "1"), ("limit", "2")],
        ));
        let second = d.handle(&get(
            "/data",
            &[("method", "select"), ("start", "3"), ("limit", "2")],
        ));

        assert_eq!(d.cursors().len(), 1);
        let v: serde_json::Value = serde_json::from_slice(&second.body).unwrap();
        assert_eq!(v["items"][0]["id"], "3");
        assert_eq!(v["limit"], 1);
        drop(first);
    }

    #[test]
    fn test_order_param_changes_signature_and_rows() {
        let d = dispatcher();
        let resp = d.handle(&get(
            "/data",
            &[("method", "select"), ("order", "name DESC")],
        ));
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["items"][0]["name"], "C");

        d.handle(&get("/data", &[("method", "select")]));
        assert_eq!(d.cursors().len(), 2);
    }
}
