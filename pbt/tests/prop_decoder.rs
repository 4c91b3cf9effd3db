//! リクエストデコーダーのプロパティテスト
//!
//! 中心となる性質は 2 つ:
//! - ラウンドトリップ: エンコードしたリクエストをデコードすると元に戻る
//! - 分割不変性: どう分割して feed しても結果の列は同一になる

use pbt::{body, chunks, headers, http_method, http_uri, split_size, trailers};
use proptest::prelude::*;
use shiguredo_http1_server::{
    DecoderLimits, Request, RequestDecoder, encode_chunk, encode_chunks,
};

/// 分割サイズを指定してリクエストをデコードする
fn decode_split(data: &[u8], split: usize) -> Result<Option<Request>, shiguredo_http1_server::Error> {
    let mut decoder = RequestDecoder::new();
    for part in data.chunks(split) {
        decoder.feed(part)?;
        if let Some(request) = decoder.decode()? {
            return Ok(Some(request));
        }
    }
    decoder.decode()
}

/// 生成パラメータから有効なリクエストを構築する
fn build_request(
    method: &str,
    uri: &str,
    extra_headers: &[(String, String)],
    body: &[u8],
) -> Request {
    let mut request = Request::new(method, uri).header("Host", "example.com");
    for (name, value) in extra_headers {
        request.add_header(name, value);
    }
    request.body(body.to_vec())
}

proptest! {
    /// エンコード → デコードで主要フィールドが保存される
    #[test]
    fn roundtrip_request(
        method in http_method(),
        uri in http_uri(),
        extra_headers in headers(),
        request_body in body(),
    ) {
        let request = build_request(&method, &uri, &extra_headers, &request_body);
        let encoded = request.encode();

        let decoded = decode_split(&encoded, encoded.len().max(1))
            .unwrap()
            .expect("complete request should decode");

        prop_assert_eq!(&decoded.method, &method);
        prop_assert_eq!(&decoded.uri, &uri);
        prop_assert_eq!(&decoded.version, "HTTP/1.1");
        prop_assert_eq!(&decoded.body, &request_body);
        for (name, value) in &extra_headers {
            let values = decoded.get_headers(name);
            prop_assert!(
                values.iter().any(|v| *v == value.as_str()),
                "header {} missing", name
            );
        }
    }

    /// 分割不変性: 一括 feed と任意サイズの分割 feed で結果が一致する
    #[test]
    fn split_invariance(
        method in http_method(),
        uri in http_uri(),
        extra_headers in headers(),
        request_body in body(),
        split in split_size(),
    ) {
        let request = build_request(&method, &uri, &extra_headers, &request_body);
        let encoded = request.encode();

        let whole = decode_split(&encoded, encoded.len().max(1)).unwrap();
        let parts = decode_split(&encoded, split).unwrap();
        let byte_by_byte = decode_split(&encoded, 1).unwrap();

        prop_assert_eq!(&whole, &parts);
        prop_assert_eq!(&whole, &byte_by_byte);
    }

    /// chunked ボディ: チャンク分割に関係なく連結結果が保存される
    #[test]
    fn chunked_body_roundtrip(
        body_chunks in chunks(),
        message_trailers in trailers(),
        split in split_size(),
    ) {
        let mut request = Request::new("POST", "/upload").header("Host", "example.com");
        request.add_header("Transfer-Encoding", "chunked");
        let mut encoded = request.encode_headers();
        for chunk in &body_chunks {
            encoded.extend_from_slice(&encode_chunk(chunk));
        }
        // 終端チャンクとトレーラー
        encoded.extend_from_slice(b"0\r\n");
        for (name, value) in &message_trailers {
            encoded.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        encoded.extend_from_slice(b"\r\n");

        let expected: Vec<u8> = body_chunks.concat();
        let decoded = decode_split(&encoded, split)
            .unwrap()
            .expect("complete chunked request should decode");

        prop_assert_eq!(&decoded.body, &expected);
        prop_assert_eq!(&decoded.trailers, &message_trailers);
    }

    /// encode_chunks と encode_chunk の逐次適用は同じバイト列になる
    #[test]
    fn encode_chunks_equivalence(body_chunks in chunks()) {
        let refs: Vec<&[u8]> = body_chunks.iter().map(|c| c.as_slice()).collect();
        let combined = encode_chunks(&refs);

        let mut sequential = Vec::new();
        for chunk in &body_chunks {
            sequential.extend_from_slice(&encode_chunk(chunk));
        }
        sequential.extend_from_slice(&encode_chunk(&[]));

        prop_assert_eq!(combined, sequential);
    }

    /// Content-Length と Transfer-Encoding の併用は常に拒否される
    #[test]
    fn content_length_with_chunked_always_rejected(length in 0usize..10_000) {
        let data = format!(
            "POST / HTTP/1.1\r\nHost: a\r\nContent-Length: {length}\r\nTransfer-Encoding: chunked\r\n\r\n"
        );
        let mut decoder = RequestDecoder::new();
        decoder.feed(data.as_bytes()).unwrap();
        prop_assert!(decoder.decode().is_err());
    }

    /// 制限超過のスタートラインは終端が来なくてもエラーになる
    #[test]
    fn oversized_start_line_rejected(extra in 1usize..64) {
        let limits = DecoderLimits {
            max_start_line_size: 64,
            ..DecoderLimits::default()
        };
        let mut decoder = RequestDecoder::with_limits(limits);
        decoder.feed(&vec![b'A'; 64 + extra]).unwrap();
        prop_assert!(decoder.decode_headers().is_err());
    }
}

// ========================================
// ヘッダー文法のエラーケース (固定入力)
// ========================================

#[test]
fn header_obs_fold_space_error() {
    let data = b"GET / HTTP/1.1\r\nHost: a\r\n folded: value\r\n\r\n";
    let mut decoder = RequestDecoder::new();
    decoder.feed(data).unwrap();
    assert!(decoder.decode().is_err());
}

#[test]
fn header_obs_fold_tab_error() {
    let data = b"GET / HTTP/1.1\r\nHost: a\r\n\tfolded\r\n\r\n";
    let mut decoder = RequestDecoder::new();
    decoder.feed(data).unwrap();
    assert!(decoder.decode().is_err());
}

#[test]
fn header_missing_colon_error() {
    let data = b"GET / HTTP/1.1\r\nHeader value\r\n\r\n";
    let mut decoder = RequestDecoder::new();
    decoder.feed(data).unwrap();
    assert!(decoder.decode().is_err());
}

#[test]
fn header_empty_name_error() {
    let data = b"GET / HTTP/1.1\r\n: value\r\n\r\n";
    let mut decoder = RequestDecoder::new();
    decoder.feed(data).unwrap();
    assert!(decoder.decode().is_err());
}

#[test]
fn header_name_with_space_error() {
    let data = b"GET / HTTP/1.1\r\nHead er: value\r\n\r\n";
    let mut decoder = RequestDecoder::new();
    decoder.feed(data).unwrap();
    assert!(decoder.decode().is_err());
}

#[test]
fn valid_header_name_chars() {
    let valid_names = [
        "Accept",
        "Content-Language",
        "X-Custom-Header",
        "X_Custom_Header",
        "X.Custom.Header",
        "Header123",
        "X!Header",
        "X#Header",
        "X$Header",
        "X%Header",
        "X&Header",
        "X'Header",
        "X*Header",
        "X+Header",
        "X^Header",
        "X`Header",
        "X|Header",
        "X~Header",
    ];

    for name in valid_names {
        let data = format!("GET / HTTP/1.1\r\nHost: a\r\n{}: value\r\n\r\n", name);
        let mut decoder = RequestDecoder::new();
        decoder.feed(data.as_bytes()).unwrap();
        assert!(
            decoder.decode().is_ok(),
            "Header name '{}' should be valid",
            name
        );
    }
}
