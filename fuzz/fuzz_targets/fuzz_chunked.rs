#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shiguredo_http1_server::{Request, RequestDecoder, encode_chunk, encode_chunks};

#[derive(Arbitrary, Debug)]
struct FuzzChunked {
    chunks: Vec<Vec<u8>>,
    split_hint: u8,
}

fn normalize_chunks(mut chunks: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    chunks.retain(|chunk| !chunk.is_empty());
    if chunks.len() > 64 {
        chunks.truncate(64);
    }
    // 累積サイズ制限にかからない範囲に抑える
    let mut total = 0usize;
    chunks.retain(|chunk| {
        total += chunk.len();
        total <= 64 * 1024
    });
    chunks
}

fn decode_body(encoded: &[u8], split_size: usize) -> Option<Vec<u8>> {
    let mut decoder = RequestDecoder::new();
    for part in encoded.chunks(split_size) {
        if decoder.feed(part).is_err() {
            return None;
        }
        match decoder.decode() {
            Ok(Some(request)) => return Some(request.body),
            Ok(None) => {}
            Err(_) => return None,
        }
    }
    None
}

fuzz_target!(|input: FuzzChunked| {
    let chunks = normalize_chunks(input.chunks);
    let expected: Vec<u8> = chunks.concat();
    let split_size = (input.split_hint as usize % 32) + 1;

    let mut request = Request::new("POST", "/").header("Host", "example.com");
    request.add_header("Transfer-Encoding", "chunked");
    let head = request.encode_headers();

    // encode_chunks による一括エンコード
    let chunk_refs: Vec<&[u8]> = chunks.iter().map(|chunk| chunk.as_slice()).collect();
    let mut encoded = head.clone();
    encoded.extend_from_slice(&encode_chunks(&chunk_refs));
    if let Some(body) = decode_body(&encoded, split_size) {
        assert_eq!(body, expected);
    }

    // encode_chunk の逐次エンコード
    let mut encoded = head;
    for chunk in &chunks {
        encoded.extend_from_slice(&encode_chunk(chunk));
    }
    encoded.extend_from_slice(&encode_chunk(&[]));
    if let Some(body) = decode_body(&encoded, split_size) {
        assert_eq!(body, expected);
    }
});
