// src/compress.rs
use flate2::Compression;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use std::io::{self, Write};
use tracing::warn;

/// Token for the Content-Encoding header when a body was compressed.
pub const DEFLATE: &str = "deflate";

fn deflate(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(body.len() / 2 + 64),
        Compression::default(),
    );
    encoder.write_all(body)?;
    encoder.finish()
}

/// Compress `body` when the client asked for it. Compression is best-effort:
/// any encoder failure falls back to the original bytes with no header, it
/// never fails the request.
pub fn maybe_compress(body: Vec<u8>, requested: bool) -> (Vec<u8>, Option<&'static str>) {
    if !requested {
        return (body, None);
    }
    match deflate(&body) {
        Ok(compressed) => (compressed, Some(DEFLATE)),
        Err(e) => {
            warn!("deflate failed, sending uncompressed: {e}");
            (body, None)
        }
    }
}

/// Inverse of the deflate step; restores the exact original byte sequence.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(Vec::new());
    decoder.write_all(data)?;
    decoder.finish()
}
