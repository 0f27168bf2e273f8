// src/http.rs
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
    Unknown,
}

impl Method {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"GET" => Method::Get,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"PATCH" => Method::Patch,
            b"HEAD" => Method::Head,
            b"OPTIONS" => Method::Options,
            b"TRACE" => Method::Trace,
            b"CONNECT" => Method::Connect,
            _ => Method::Unknown,
        }
    }
}

pub const MAX_HEADERS: usize = 32;

/// Borrowed view of a request head, produced by `parser::parse_head`.
/// `body` is whatever followed the blank line in the supplied buffer.
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: [(&'a str, &'a str); MAX_HEADERS],
    pub header_count: u8,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn header(&self, name: &str) -> Option<&'a str> {
        for i in 0..self.header_count as usize {
            if self.headers[i].0.eq_ignore_ascii_case(name) {
                return Some(self.headers[i].1);
            }
        }
        None
    }
}

/// One decoded request field. Exactly one representation is populated:
/// simple GET/POST fields decode to text, multipart file parts keep raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(s) => s.as_bytes(),
            FieldValue::Bytes(b) => b,
        }
    }
}

/// Fully decoded request, owned by the handling thread for its lifetime.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub uri: String,
    pub raw_query: String,
    pub get_params: BTreeMap<String, String>,
    pub post_params: BTreeMap<String, FieldValue>,
    pub file_params: BTreeMap<String, FieldValue>,
    pub cookies: BTreeMap<String, String>,
    pub accept_compressed: bool,
}

impl ParsedRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            raw_query: String::new(),
            get_params: BTreeMap::new(),
            post_params: BTreeMap::new(),
            file_params: BTreeMap::new(),
            cookies: BTreeMap::new(),
            accept_compressed: false,
        }
    }

    /// POST field first, then GET parameter.
    pub fn value(&self, key: &str) -> Option<String> {
        if let Some(v) = self.post_params.get(key) {
            return Some(v.as_text());
        }
        self.get_params.get(key).cloned()
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get_params.get(key).map(String::as_str)
    }
}

pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(&'static str, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let mut r = Self::new(200);
        r.body = body.into();
        r
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        let mut r = Self::ok(body);
        r.content_type = "application/json".to_string();
        r
    }

    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        let mut r = Self::ok(body);
        r.content_type = "text/html".to_string();
        r
    }

    pub fn bytes(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        let mut r = Self::ok(body);
        r.content_type = content_type.to_string();
        r
    }

    /// 404 with an empty body; handler paths never surface error details.
    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }
}

pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        _ => "200 OK",
    }
}
