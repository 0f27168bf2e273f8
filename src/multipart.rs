// src/multipart.rs
use crate::error::TabservError;
use memchr::{memchr, memmem};

/// One decoded body part. `filename` present marks a file upload.
#[derive(Debug)]
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

/// Iterator over the parts of a `multipart/form-data` body.
///
/// All scanning happens over the supplied slice with explicit offsets; a
/// candidate `--boundary` only counts when it sits at a line start (buffer
/// start or right after CRLF), so the boundary bytes occurring inside file
/// content are passed through untouched. A body whose closing boundary
/// never appears yields `Err(UnterminatedMultipart)` after the last
/// complete part.
pub struct Multipart<'a> {
    body: &'a [u8],
    marker: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<'a> Multipart<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut marker = Vec::with_capacity(boundary.len() + 2);
        marker.extend_from_slice(b"--");
        marker.extend_from_slice(boundary.as_bytes());
        Self {
            body,
            marker,
            pos: 0,
            done: false,
        }
    }

    /// Offset of the next line-start-anchored `--boundary` at or after
    /// `from`, never reading past the end of `body`.
    fn find_boundary(&self, from: usize) -> Option<usize> {
        let mut at = from;
        while at + self.marker.len() <= self.body.len() {
            let rel = memchr(b'-', &self.body[at..self.body.len() - self.marker.len() + 1])?;
            let i = at + rel;
            let line_start = i == 0 || (i >= 2 && &self.body[i - 2..i] == b"\r\n");
            if line_start && self.body[i..i + self.marker.len()] == self.marker[..] {
                return Some(i);
            }
            at = i + 1;
        }
        None
    }
}

impl<'a> Iterator for Multipart<'a> {
    type Item = Result<Part<'a>, TabservError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            let Some(bpos) = self.find_boundary(self.pos) else {
                self.done = true;
                return Some(Err(TabservError::UnterminatedMultipart));
            };

            let mut p = bpos + self.marker.len();

            // --boundary-- closes the body
            if p + 2 <= self.body.len() && &self.body[p..p + 2] == b"--" {
                self.done = true;
                return None;
            }

            if p + 2 <= self.body.len() && &self.body[p..p + 2] == b"\r\n" {
                p += 2;
            }

            // part headers run up to the first blank line
            let Some(rel) = memmem::find(&self.body[p..], b"\r\n\r\n") else {
                self.done = true;
                return Some(Err(TabservError::UnterminatedMultipart));
            };
            let headers = &self.body[p..p + rel];
            let data_start = p + rel + 4;

            let Some(next_b) = self.find_boundary(data_start) else {
                self.done = true;
                return Some(Err(TabservError::UnterminatedMultipart));
            };

            // the CRLF before the next boundary belongs to the framing
            let mut data_end = next_b;
            if data_end >= data_start + 2 && &self.body[data_end - 2..data_end] == b"\r\n" {
                data_end -= 2;
            }

            self.pos = next_b;

            let (name, filename) = match disposition(headers) {
                Some(v) => v,
                None => continue,
            };
            if name.is_empty() {
                // nameless parts are dropped
                continue;
            }

            return Some(Ok(Part {
                name,
                filename,
                data: &self.body[data_start..data_end],
            }));
        }
    }
}

/// Pull `name="..."` and `filename="..."` out of a part's
/// Content-Disposition header line.
fn disposition(headers: &[u8]) -> Option<(&str, Option<&str>)> {
    let text = std::str::from_utf8(headers).ok()?;
    for line in text.split("\r\n") {
        if line.len() >= 20 && line[..20].eq_ignore_ascii_case("content-disposition:") {
            let name = header_param(line, "name")?;
            return Some((name, header_param(line, "filename")));
        }
    }
    None
}

/// Locate `key="value"` within a header line. The key must follow a
/// delimiter so that `name` never matches inside `filename`.
fn header_param<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let lower = line.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find(key) {
        let at = from + rel;
        let delimited = at == 0 || matches!(lower.as_bytes()[at - 1], b' ' | b';' | b':');
        let after = at + key.len();
        if delimited && lower[after..].starts_with('=') {
            let rest = &line[after + 1..];
            let rest = rest.strip_prefix('"').unwrap_or(rest);
            let end = rest
                .find('"')
                .or_else(|| rest.find(';'))
                .unwrap_or(rest.len());
            return Some(&rest[..end]);
        }
        from = after;
    }
    None
}
