//! Static files served from the document root.
//!
//! Content is deterministic so clients can compare bodies byte-for-byte, and
//! `index.html` is large and repetitive enough that gzip visibly shrinks it.

use crate::{error::HarnessResult, server::types::ScratchArea};

pub const INDEX_FILE: &str = "index.html";
pub const BENCH_FILE: &str = "bench-1k.txt";
pub const BENCH_SIZE: usize = 1024;

const INDEX_PARAGRAPHS: usize = 512;

pub fn index_html() -> String {
    let mut body = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>service harness</title></head>\n<body>\n",
    );
    for i in 0..INDEX_PARAGRAPHS {
        body.push_str(&format!(
            "<p id=\"p{i:04}\">Paragraph {i:04}: the quick brown fox jumps over the lazy dog.</p>\n"
        ));
    }
    body.push_str("</body>\n</html>");
    body
}

/// Exactly [`BENCH_SIZE`] bytes of `a..z`, newline-terminated every 64 bytes.
pub fn bench_payload() -> Vec<u8> {
    (0..BENCH_SIZE)
        .map(|i| {
            if i % 64 == 63 {
                b'\n'
            } else {
                b'a' + (i % 26) as u8
            }
        })
        .collect()
}

pub fn write_payloads(scratch: &ScratchArea) -> HarnessResult<()> {
    let root = scratch.doc_root();
    scratch.write(&root.join(INDEX_FILE), index_html())?;
    scratch.write(&root.join(BENCH_FILE), bench_payload())?;
    Ok(())
}
