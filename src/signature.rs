// src/signature.rs
use crate::http::ParsedRequest;
use sha2::{Digest, Sha256};
use std::fmt;

/// 128-bit identity of a request: URI plus every GET parameter except the
/// pagination window. Two requests that differ only in `start`/`limit`
/// collapse to the same signature and therefore share one server-side
/// cursor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature([u8; 16]);

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestSignature({})", self)
    }
}

/// Signature over `uri?k=v&...` with parameters in sorted key order, so the
/// order they appeared on the URL does not matter.
pub fn signature_of(req: &ParsedRequest) -> RequestSignature {
    let mut canonical = String::with_capacity(req.uri.len() + req.raw_query.len() + 1);
    canonical.push_str(&req.uri);

    let mut first = true;
    for (key, value) in &req.get_params {
        if key == "start" || key == "limit" {
            continue;
        }
        canonical.push(if first { '?' } else { '&' });
        first = false;
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);
    RequestSignature(id)
}
