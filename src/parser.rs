// src/parser.rs
use crate::http::{FieldValue, MAX_HEADERS, Method, ParsedRequest, Request};
use crate::multipart::Multipart;
use crate::query_string;
use memchr::memchr;
use tracing::warn;

#[derive(Debug)]
pub enum ParseError {
    Incomplete,
    InvalidFormat,
    TooLarge,
}

/// End offset of the CRLF-terminated line starting at `from`.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(rel) = memchr(b'\r', &buf[at..]) {
        let i = at + rel;
        if i + 1 >= buf.len() {
            return None;
        }
        if buf[i + 1] == b'\n' {
            return Some(i);
        }
        at = i + 1;
    }
    None
}

/// Parses the request line and headers out of the given buffer.
/// Returns the borrowed head view and the offset where the body begins.
pub fn parse_head(buf: &[u8]) -> Result<(Request<'_>, usize), ParseError> {
    // request line: METHOD SP PATH SP HTTP/1.x CRLF
    let line_end = find_crlf(buf, 0).ok_or(ParseError::Incomplete)?;
    let line = &buf[..line_end];

    let space1 = memchr(b' ', line).ok_or(ParseError::InvalidFormat)?;
    let method = Method::from_bytes(&line[..space1]);

    let rest = &line[space1 + 1..];
    let space2 = memchr(b' ', rest).ok_or(ParseError::InvalidFormat)?;
    let target = std::str::from_utf8(&rest[..space2]).map_err(|_| ParseError::InvalidFormat)?;

    let (path, query) = match target.find('?') {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    };

    let mut headers = [("", ""); MAX_HEADERS];
    let mut header_count: u8 = 0;
    let mut cursor = line_end + 2;

    loop {
        if cursor + 1 < buf.len() && buf[cursor] == b'\r' && buf[cursor + 1] == b'\n' {
            cursor += 2;
            break; // end of headers
        }

        let line_end = find_crlf(buf, cursor).ok_or(ParseError::Incomplete)?;
        if header_count as usize >= MAX_HEADERS {
            return Err(ParseError::TooLarge);
        }

        let colon = memchr(b':', &buf[cursor..line_end]).ok_or(ParseError::InvalidFormat)?;
        let name = std::str::from_utf8(&buf[cursor..cursor + colon])
            .map_err(|_| ParseError::InvalidFormat)?;

        let mut val_start = cursor + colon + 1;
        while val_start < line_end && buf[val_start] == b' ' {
            val_start += 1;
        }
        let val = std::str::from_utf8(&buf[val_start..line_end])
            .map_err(|_| ParseError::InvalidFormat)?;

        headers[header_count as usize] = (name, val);
        header_count += 1;
        cursor = line_end + 2;
    }

    Ok((
        Request {
            method,
            path,
            query,
            headers,
            header_count,
            body: &buf[cursor..],
        },
        cursor,
    ))
}

/// `boundary=` token from a Content-Type value, surrounding quotes stripped.
fn boundary_token(content_type: &str) -> Option<&str> {
    let idx = content_type.find("boundary=")?;
    let mut token = &content_type[idx + 9..];
    token = token.strip_prefix('"').unwrap_or(token);
    token = token.strip_suffix('"').unwrap_or(token);
    if token.is_empty() { None } else { Some(token) }
}

/// Assemble an owned `ParsedRequest` from a parsed head and its body.
///
/// This stage is deliberately lenient: a multipart Content-Type without a
/// boundary leaves the POST params empty, and a body whose closing boundary
/// never arrives keeps the fields decoded before the break.
pub fn parse_request(raw: &Request<'_>) -> ParsedRequest {
    let mut req = ParsedRequest::new(raw.method, raw.path);

    let mut boundary: Option<String> = None;
    let mut multipart_body = false;

    for i in 0..raw.header_count as usize {
        let (name, val) = raw.headers[i];
        if name.eq_ignore_ascii_case("Content-Type") {
            multipart_body = val.to_ascii_lowercase().starts_with("multipart/");
            boundary = boundary_token(val).map(str::to_string);
        } else if name.eq_ignore_ascii_case("Cookie") {
            // one name=value pair per header occurrence, split on the first '='
            if let Some(eq) = val.find('=') {
                req.cookies
                    .insert(val[..eq].to_string(), val[eq + 1..].to_string());
            }
        } else if name.eq_ignore_ascii_case("Accept-Encoding") {
            if val.contains("deflate") {
                req.accept_compressed = true;
            }
        }
    }

    if let Some(q) = raw.query {
        req.raw_query = q.to_string();
        for (k, v) in query_string::decode(q.as_bytes()) {
            req.get_params.insert(k, v);
        }
    }

    if raw.method != Method::Get && !raw.body.is_empty() {
        if let Some(boundary) = boundary {
            for item in Multipart::new(raw.body, &boundary) {
                match item {
                    Ok(part) => {
                        if part.filename.is_some() {
                            req.file_params.insert(
                                part.name.to_string(),
                                FieldValue::Bytes(part.data.to_vec()),
                            );
                        } else {
                            req.post_params.insert(
                                part.name.to_string(),
                                FieldValue::Text(
                                    String::from_utf8_lossy(part.data).into_owned(),
                                ),
                            );
                        }
                    }
                    Err(e) => {
                        warn!(uri = raw.path, "{e}; keeping fields decoded so far");
                        break;
                    }
                }
            }
        } else if !multipart_body {
            for (k, v) in query_string::decode(raw.body) {
                req.post_params.insert(k, FieldValue::Text(v));
            }
        }
        // multipart Content-Type without a boundary: POST params stay empty
    }

    req
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_head() {
        let buf =
            b"GET /sales/by_region?method=select&start=1 HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, deflate\r\n\r\n";
        let (raw, consumed) = parse_head(buf).unwrap();

        assert_eq!(raw.method, Method::Get);
        assert_eq!(raw.path, "/sales/by_region");
        assert_eq!(raw.query, Some("method=select&start=1"));
        assert_eq!(raw.header_count, 2);
        assert_eq!(raw.headers[0], ("Host", "localhost"));
        assert_eq!(consumed, buf.len());
        assert!(raw.body.is_empty());
    }

    #[test]
    fn test_parse_incomplete_head() {
        assert!(matches!(
            parse_head(b"GET /x HTT"),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(
            parse_head(b"GET /x HTTP/1.1\r\nHost: localhost\r\n"),
            Err(ParseError::Incomplete)
        ));
    }

    #[test]
    fn test_get_params_decoded() {
        let buf = b"GET /t?order=region%2Cname&limit=5 HTTP/1.1\r\n\r\n";
        let (raw, _) = parse_head(buf).unwrap();
        let req = parse_request(&raw);

        assert_eq!(req.uri, "/t");
        assert_eq!(req.raw_query, "order=region%2Cname&limit=5");
        assert_eq!(req.get_params["order"], "region,name");
        assert_eq!(req.get_params["limit"], "5");
        assert!(req.post_params.is_empty());
    }

    #[test]
    fn test_urlencoded_post_body() {
        let buf = b"POST /t HTTP/1.1\r\nContent-Length: 11\r\n\r\na=1&b=x%20y";
        let (raw, _) = parse_head(buf).unwrap();
        let req = parse_request(&raw);

        assert_eq!(req.post_params["a"], FieldValue::Text("1".to_string()));
        assert_eq!(req.post_params["b"], FieldValue::Text("x y".to_string()));
    }

    #[test]
    fn test_multipart_post_body() {
        let body = b"--sep\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--sep\r\nContent-Disposition: form-data; name=\"up\"; filename=\"f.bin\"\r\n\r\nDATA\r\n--sep--\r\n";
        let mut buf = format!(
            "POST /t HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=\"sep\"\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buf.extend_from_slice(body);

        let (raw, _) = parse_head(&buf).unwrap();
        let req = parse_request(&raw);

        assert_eq!(req.post_params["a"], FieldValue::Text("1".to_string()));
        assert_eq!(req.file_params["up"], FieldValue::Bytes(b"DATA".to_vec()));
    }

    #[test]
    fn test_multipart_without_boundary_is_not_fatal() {
        let buf = b"POST /t HTTP/1.1\r\nContent-Type: multipart/form-data\r\n\r\nnot=form";
        let (raw, _) = parse_head(buf).unwrap();
        let req = parse_request(&raw);

        assert!(req.post_params.is_empty());
        assert!(req.file_params.is_empty());
    }

    #[test]
    fn test_unterminated_multipart_keeps_prior_fields() {
        let buf = b"POST /t HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=sep\r\n\r\n--sep\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--sep\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\ntrunc";
        let (raw, _) = parse_head(buf).unwrap();
        let req = parse_request(&raw);

        assert_eq!(req.post_params["a"], FieldValue::Text("1".to_string()));
        assert!(!req.post_params.contains_key("b"));
    }

    #[test]
    fn test_cookies_and_deflate() {
        let buf = b"GET / HTTP/1.1\r\nCookie: sid=abc123\r\nCookie: theme=dark\r\nAccept-Encoding: deflate\r\n\r\n";
        let (raw, _) = parse_head(buf).unwrap();
        let req = parse_request(&raw);

        assert_eq!(req.cookies["sid"], "abc123");
        assert_eq!(req.cookies["theme"], "dark");
        assert!(req.accept_compressed);

        let buf = b"GET / HTTP/1.1\r\nAccept-Encoding: gzip\r\n\r\n";
        let (raw, _) = parse_head(buf).unwrap();
        assert!(!parse_request(&raw).accept_compressed);
    }

    #[test]
    fn test_boundary_token_forms() {
        assert_eq!(
            boundary_token("multipart/form-data; boundary=abc"),
            Some("abc")
        );
        assert_eq!(
            boundary_token("multipart/form-data; boundary=\"abc\""),
            Some("abc")
        );
        assert_eq!(boundary_token("application/x-www-form-urlencoded"), None);
    }
}
