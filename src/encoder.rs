//! HTTP エンコーダー
//!
//! レスポンスのシリアライズ (ResponseWriter) を提供する。
//! `ResponseEncoder` はヘッダーフィルタリングと転送エンコーディングの決定を行い、
//! 書き込み済みオフセットを保持する。部分書き込みが発生しても
//! ヘッダーを再シリアライズせずに続きから再開できる。
//!
//! 一括エンコードのヘルパー (`encode_request` / `encode_response` /
//! `encode_chunk`) はテストやピア側実装向けのユーティリティ。

use std::time::{SystemTime, UNIX_EPOCH};

use crate::date::HttpDate;
use crate::error::EncodeError;
use crate::request::Request;
use crate::response::Response;
use crate::status::default_reason_phrase;
use crate::trailer::is_prohibited_trailer_field;

/// レスポンスエンコード時のリクエスト側コンテキスト
///
/// keep-alive 判定や HEAD のボディ抑止はリクエストに依存するため、
/// エンコーダーにリクエスト側の情報を渡す。
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    /// リクエストの HTTP バージョン (HTTP/1.0 または HTTP/1.1)
    pub request_version: &'a str,
    /// HEAD リクエストへのレスポンスかどうか
    pub head_request: bool,
    /// リクエスト側がキープアライブを希望しているかどうか
    ///
    /// `Request::is_keep_alive()` の結果 (HTTP/1.0 のデフォルト close を含む)
    pub request_keep_alive: bool,
}

impl Default for EncodeContext<'_> {
    fn default() -> Self {
        Self {
            request_version: "HTTP/1.1",
            head_request: false,
            request_keep_alive: true,
        }
    }
}

/// ボディの送出モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    /// 固定ボディ (ヘッダーと共にシリアライズ済み)
    Fixed,
    /// Transfer-Encoding: chunked でストリーミング
    StreamChunked,
    /// Content-Length 既知のストリーミング (フレーミングなし)
    StreamIdentity,
    /// close-delimited ストリーミング (HTTP/1.0 で長さ不明の場合)
    StreamCloseDelimited,
    /// ボディ送出なし (HEAD / 1xx / 204 / 304)
    Suppressed,
}

/// HTTP レスポンスエンコーダー (Sans I/O)
///
/// 生成時にステータスライン、フィルタリング済みヘッダー、固定ボディを
/// シリアライズする。ストリーミングの場合は `push_chunk()` / `finish()` で
/// ボディを追記する。
///
/// # ヘッダーフィルタリング
///
/// - reason-phrase が空の場合はステータスコードから補う
/// - `Date` がなければ自動付与する (1xx を除く)
/// - 固定ボディで `Content-Length` がなければ自動付与する
/// - ストリーミングで長さ不明の場合、HTTP/1.1 なら
///   `Transfer-Encoding: chunked` を付与し、HTTP/1.0 なら
///   close-delimited (接続クローズでボディ終端) にする
/// - 1xx / 204 は `Content-Length` を除去し、304 と HEAD はボディバイトを
///   送出しない
/// - クローズすべき接続には `Connection: close` を付与する
///
/// # 再開可能性
///
/// `pending()` で未送出バイトを取得し、書き込めた分だけ `consume()` で
/// 進める。部分書き込み後もヘッダーが再シリアライズされることはない。
#[derive(Debug)]
pub struct ResponseEncoder {
    pending: Vec<u8>,
    offset: usize,
    mode: BodyMode,
    should_close: bool,
    finished: bool,
}

impl ResponseEncoder {
    /// 固定ボディのレスポンス用エンコーダーを作成
    ///
    /// ボディは `response.body` の内容で確定しており、生成時に
    /// すべてシリアライズされる。
    pub fn new(response: &Response, ctx: &EncodeContext<'_>) -> Result<Self, EncodeError> {
        Self::build(response, ctx, false)
    }

    /// ストリーミングボディのレスポンス用エンコーダーを作成
    ///
    /// ヘッダーのみシリアライズされる。ボディは `push_chunk()` で供給し、
    /// `finish()` で終端する。`response.body` は無視される。
    pub fn streaming(response: &Response, ctx: &EncodeContext<'_>) -> Result<Self, EncodeError> {
        Self::build(response, ctx, true)
    }

    fn build(
        response: &Response,
        ctx: &EncodeContext<'_>,
        streaming: bool,
    ) -> Result<Self, EncodeError> {
        let status = response.status_code;
        if !(100..=599).contains(&status) {
            return Err(EncodeError::InvalidStatusCode(status));
        }

        // ボディを持たないステータス (RFC 9112 Section 6.3)
        let bodyless_status = (100..200).contains(&status) || status == 204 || status == 304;
        let suppress_body = bodyless_status || ctx.head_request;

        let explicit_content_length = response.has_header("Content-Length");
        let explicit_transfer_encoding = response.has_header("Transfer-Encoding");
        let explicit_chunked = response.is_chunked();

        if explicit_transfer_encoding && explicit_content_length {
            return Err(EncodeError::ConflictingTransferEncodingAndContentLength);
        }
        if explicit_transfer_encoding && ((100..200).contains(&status) || status == 204) {
            return Err(EncodeError::ForbiddenTransferEncoding {
                status_code: status,
            });
        }
        if explicit_transfer_encoding && !explicit_chunked {
            return Err(EncodeError::InvalidState(
                "unsupported Transfer-Encoding".to_string(),
            ));
        }

        let http11_request = ctx.request_version.ends_with("/1.1");

        // ボディモードと自動付与ヘッダーの決定
        let mut auto_headers: Vec<(&str, String)> = Vec::new();
        let mode = if suppress_body {
            // HEAD レスポンスは GET と同じ Content-Length を返すべき
            // (RFC 9110 Section 9.3.2)
            if ctx.head_request
                && !bodyless_status
                && !explicit_content_length
                && !response.omit_content_length
            {
                auto_headers.push(("Content-Length", response.body.len().to_string()));
            }
            BodyMode::Suppressed
        } else if streaming {
            if explicit_content_length {
                BodyMode::StreamIdentity
            } else if explicit_chunked {
                BodyMode::StreamChunked
            } else if http11_request {
                auto_headers.push(("Transfer-Encoding", "chunked".to_string()));
                BodyMode::StreamChunked
            } else {
                // HTTP/1.0 では chunked が使えないため接続クローズで終端する
                BodyMode::StreamCloseDelimited
            }
        } else {
            if !explicit_content_length && !explicit_chunked && !response.omit_content_length {
                auto_headers.push(("Content-Length", response.body.len().to_string()));
            }
            BodyMode::Fixed
        };

        let should_close = response.wants_close()
            || !ctx.request_keep_alive
            || mode == BodyMode::StreamCloseDelimited;

        // Connection: close の付与 (1xx の中間レスポンスには付けない)
        if should_close && status >= 200 && !response.has_header("Connection") {
            auto_headers.push(("Connection", "close".to_string()));
        }

        // Date の自動付与 (1xx を除く)
        if status >= 200 && !response.has_header("Date") {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            auto_headers.push(("Date", HttpDate::from_unix_time(now.as_secs()).to_string()));
        }

        let mut pending = Vec::new();

        // Status line: VERSION SP STATUS-CODE SP REASON-PHRASE CRLF
        pending.extend_from_slice(response.version.as_bytes());
        pending.push(b' ');
        pending.extend_from_slice(status.to_string().as_bytes());
        pending.push(b' ');
        if response.reason_phrase.is_empty() {
            pending.extend_from_slice(default_reason_phrase(status).as_bytes());
        } else {
            pending.extend_from_slice(response.reason_phrase.as_bytes());
        }
        pending.extend_from_slice(b"\r\n");

        // Headers (フィルタリング付き)
        for (name, value) in &response.headers {
            // 1xx / 204 の Content-Length は除去する (304 は検証メタデータとして保持)
            if ((100..200).contains(&status) || status == 204)
                && name.eq_ignore_ascii_case("Content-Length")
            {
                continue;
            }
            // 304 の Transfer-Encoding は除去する
            if status == 304 && name.eq_ignore_ascii_case("Transfer-Encoding") {
                continue;
            }
            pending.extend_from_slice(name.as_bytes());
            pending.extend_from_slice(b": ");
            pending.extend_from_slice(value.as_bytes());
            pending.extend_from_slice(b"\r\n");
        }
        for (name, value) in &auto_headers {
            pending.extend_from_slice(name.as_bytes());
            pending.extend_from_slice(b": ");
            pending.extend_from_slice(value.as_bytes());
            pending.extend_from_slice(b"\r\n");
        }

        // End of headers
        pending.extend_from_slice(b"\r\n");

        // Body (固定ボディのみ)
        if mode == BodyMode::Fixed {
            pending.extend_from_slice(&response.body);
        }

        // ストリーミングは finish() まで未完了
        let finished = !streaming;

        Ok(Self {
            pending,
            offset: 0,
            mode,
            should_close,
            finished,
        })
    }

    /// ボディデータを追記する (ストリーミング用)
    ///
    /// chunked の場合はチャンクフレームに包む。
    /// 抑止モード (HEAD 等) ではデータは捨てられる。
    pub fn push_chunk(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.finished {
            return Err(EncodeError::InvalidState(
                "push_chunk after finish".to_string(),
            ));
        }
        match self.mode {
            BodyMode::StreamChunked => {
                if !data.is_empty() {
                    self.pending
                        .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                    self.pending.extend_from_slice(data);
                    self.pending.extend_from_slice(b"\r\n");
                }
                Ok(())
            }
            BodyMode::StreamIdentity | BodyMode::StreamCloseDelimited => {
                self.pending.extend_from_slice(data);
                Ok(())
            }
            BodyMode::Suppressed => Ok(()),
            BodyMode::Fixed => Err(EncodeError::InvalidState(
                "push_chunk on fixed-body encoder".to_string(),
            )),
        }
    }

    /// ボディを終端する (ストリーミング用)
    ///
    /// chunked の場合は終端チャンクとトレーラーを書き出す。
    /// トレーラーは chunked 以外のモードでは送出できない。
    pub fn finish(&mut self, trailers: &[(String, String)]) -> Result<(), EncodeError> {
        if self.finished {
            return Err(EncodeError::InvalidState("finish after finish".to_string()));
        }
        match self.mode {
            BodyMode::StreamChunked => {
                for (name, _) in trailers {
                    if is_prohibited_trailer_field(name) {
                        return Err(EncodeError::ProhibitedTrailerField(name.clone()));
                    }
                }
                self.pending.extend_from_slice(b"0\r\n");
                for (name, value) in trailers {
                    self.pending.extend_from_slice(name.as_bytes());
                    self.pending.extend_from_slice(b": ");
                    self.pending.extend_from_slice(value.as_bytes());
                    self.pending.extend_from_slice(b"\r\n");
                }
                self.pending.extend_from_slice(b"\r\n");
            }
            BodyMode::StreamIdentity | BodyMode::StreamCloseDelimited | BodyMode::Suppressed => {
                if !trailers.is_empty() && self.mode != BodyMode::Suppressed {
                    return Err(EncodeError::InvalidState(
                        "trailers require chunked encoding".to_string(),
                    ));
                }
            }
            BodyMode::Fixed => {
                return Err(EncodeError::InvalidState(
                    "finish on fixed-body encoder".to_string(),
                ));
            }
        }
        self.finished = true;
        Ok(())
    }

    /// 未送出バイトを取得
    pub fn pending(&self) -> &[u8] {
        &self.pending[self.offset..]
    }

    /// 送出済みバイト数を進める
    ///
    /// 部分書き込み後に呼ぶ。ヘッダーの再シリアライズは起きない。
    pub fn consume(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.pending.len());
        if self.offset == self.pending.len() {
            self.pending.clear();
            self.offset = 0;
        }
    }

    /// 未送出バイトを取り出す (内部バッファはクリアされる)
    pub fn take_pending(&mut self) -> Vec<u8> {
        let bytes = self.pending[self.offset..].to_vec();
        self.pending.clear();
        self.offset = 0;
        bytes
    }

    /// すべてのバイトが生成済みかどうか (ストリーミングは finish 後)
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// すべてのバイトが生成・送出済みかどうか
    pub fn is_flushed(&self) -> bool {
        self.finished && self.pending.len() == self.offset
    }

    /// このレスポンスの後に接続を閉じるべきかどうか
    pub fn should_close(&self) -> bool {
        self.should_close
    }
}

/// リクエストをエンコード
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut buf = Vec::new();

    // Request line: METHOD SP URI SP VERSION CRLF
    buf.extend_from_slice(request.method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.uri.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    // Headers
    for (name, value) in &request.headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Content-Length (if body is present and not already set)
    if !request.body.is_empty() && !request.has_header("Content-Length") {
        buf.extend_from_slice(b"Content-Length: ");
        buf.extend_from_slice(request.body.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // End of headers
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&request.body);

    buf
}

/// レスポンスを一括でエンコード
///
/// ヘッダーフィルタリングは行わない素朴なシリアライズ。
/// サーバーの応答経路では `ResponseEncoder` を使うこと。
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line: VERSION SP STATUS-CODE SP REASON-PHRASE CRLF
    buf.extend_from_slice(response.version.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(response.status_code.to_string().as_bytes());
    buf.push(b' ');
    if response.reason_phrase.is_empty() {
        buf.extend_from_slice(default_reason_phrase(response.status_code).as_bytes());
    } else {
        buf.extend_from_slice(response.reason_phrase.as_bytes());
    }
    buf.extend_from_slice(b"\r\n");

    // Headers
    for (name, value) in &response.headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Content-Length (if not already set and not chunked)
    if !response.omit_content_length
        && !response.has_header("Content-Length")
        && !response.has_header("Transfer-Encoding")
    {
        buf.extend_from_slice(b"Content-Length: ");
        buf.extend_from_slice(response.body.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // End of headers
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&response.body);

    buf
}

/// Chunked Transfer Encoding 用のチャンクをエンコード
///
/// データを HTTP chunked 形式にエンコードします。
/// 空のデータを渡すと終端チャンク (0\r\n\r\n) を生成します。
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();

    if data.is_empty() {
        // 終端チャンク
        buf.extend_from_slice(b"0\r\n\r\n");
    } else {
        // チャンクサイズ (16進数)
        buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
        // チャンクデータ
        buf.extend_from_slice(data);
        // CRLF
        buf.extend_from_slice(b"\r\n");
    }

    buf
}

/// 複数のデータを chunked 形式でエンコード
///
/// すべてのチャンクを結合し、終端チャンクも追加します。
pub fn encode_chunks(chunks: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();

    for chunk in chunks {
        buf.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        buf.extend_from_slice(chunk);
        buf.extend_from_slice(b"\r\n");
    }

    // 終端チャンク
    buf.extend_from_slice(b"0\r\n\r\n");

    buf
}

/// リクエストヘッダーのみをエンコード (ボディなし)
///
/// Chunked Transfer Encoding を使う場合に便利です。
/// ヘッダー送信後に `encode_chunk` でボディを送信できます。
pub fn encode_request_headers(request: &Request) -> Vec<u8> {
    let mut buf = Vec::new();

    // Request line: METHOD SP URI SP VERSION CRLF
    buf.extend_from_slice(request.method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.uri.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    // Headers
    for (name, value) in &request.headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // End of headers
    buf.extend_from_slice(b"\r\n");

    buf
}

/// レスポンスヘッダーのみをエンコード (ボディなし)
///
/// Chunked Transfer Encoding を使う場合に便利です。
/// ヘッダー送信後に `encode_chunk` でボディを送信できます。
pub fn encode_response_headers(response: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line: VERSION SP STATUS-CODE SP REASON-PHRASE CRLF
    buf.extend_from_slice(response.version.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(response.status_code.to_string().as_bytes());
    buf.push(b' ');
    if response.reason_phrase.is_empty() {
        buf.extend_from_slice(default_reason_phrase(response.status_code).as_bytes());
    } else {
        buf.extend_from_slice(response.reason_phrase.as_bytes());
    }
    buf.extend_from_slice(b"\r\n");

    // Headers
    for (name, value) in &response.headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // End of headers
    buf.extend_from_slice(b"\r\n");

    buf
}

impl Request {
    /// リクエストをバイト列にエンコード
    pub fn encode(&self) -> Vec<u8> {
        encode_request(self)
    }

    /// ヘッダーのみをエンコード (Chunked Transfer Encoding 用)
    pub fn encode_headers(&self) -> Vec<u8> {
        encode_request_headers(self)
    }
}

impl Response {
    /// レスポンスをバイト列にエンコード (素朴なシリアライズ)
    pub fn encode(&self) -> Vec<u8> {
        encode_response(self)
    }

    /// ヘッダーのみをエンコード (Chunked Transfer Encoding 用)
    pub fn encode_headers(&self) -> Vec<u8> {
        encode_response_headers(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(response: &Response, ctx: &EncodeContext<'_>) -> Vec<u8> {
        let mut encoder = ResponseEncoder::new(response, ctx).unwrap();
        encoder.take_pending()
    }

    fn header_section(bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        let end = text.find("\r\n\r\n").expect("header terminator");
        text[..end + 4].to_string()
    }

    #[test]
    fn fixed_body_adds_content_length_and_date() {
        let response = Response::new(200).body(b"hello".to_vec());
        let bytes = encode_all(&response, &EncodeContext::default());
        let head = header_section(&bytes);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Length: 5\r\n"));
        assert!(head.contains("Date: "));
        assert!(bytes.ends_with(b"hello"));
    }

    #[test]
    fn empty_body_still_gets_content_length() {
        let response = Response::new(200);
        let bytes = encode_all(&response, &EncodeContext::default());
        assert!(header_section(&bytes).contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn reason_phrase_defaulted() {
        let response = Response::new(404);
        let bytes = encode_all(&response, &EncodeContext::default());
        assert!(bytes.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn status_204_with_body_sends_no_body() {
        let response = Response::new(204)
            .header("Content-Length", "11")
            .body(b"should drop".to_vec());
        let bytes = encode_all(&response, &EncodeContext::default());
        let head = header_section(&bytes);
        // ボディもヘッダー後のバイトも存在しない
        assert_eq!(head.len(), bytes.len());
        assert!(!head.contains("Content-Length"));
    }

    #[test]
    fn status_304_keeps_explicit_content_length() {
        let response = Response::new(304)
            .header("Content-Length", "100")
            .body(b"ignored".to_vec());
        let bytes = encode_all(&response, &EncodeContext::default());
        let head = header_section(&bytes);
        assert_eq!(head.len(), bytes.len());
        assert!(head.contains("Content-Length: 100\r\n"));
    }

    #[test]
    fn interim_100_is_minimal() {
        let response = Response::new(100);
        let bytes = encode_all(&response, &EncodeContext::default());
        let head = header_section(&bytes);
        assert!(head.starts_with("HTTP/1.1 100 Continue\r\n"));
        assert!(!head.contains("Date: "));
        assert!(!head.contains("Content-Length"));
        assert!(!head.contains("Connection"));
    }

    #[test]
    fn head_request_suppresses_body_but_keeps_length() {
        let ctx = EncodeContext {
            head_request: true,
            ..EncodeContext::default()
        };
        let response = Response::new(200).body(b"hello".to_vec());
        let bytes = encode_all(&response, &ctx);
        let head = header_section(&bytes);
        assert_eq!(head.len(), bytes.len());
        assert!(head.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn http10_request_without_keep_alive_closes() {
        let ctx = EncodeContext {
            request_version: "HTTP/1.0",
            request_keep_alive: false,
            ..EncodeContext::default()
        };
        let response = Response::new(200).body(b"x".to_vec());
        let encoder = ResponseEncoder::new(&response, &ctx).unwrap();
        assert!(encoder.should_close());
    }

    #[test]
    fn response_close_header_forces_close() {
        let response = Response::new(200).header("Connection", "close");
        let encoder = ResponseEncoder::new(&response, &EncodeContext::default()).unwrap();
        assert!(encoder.should_close());
    }

    #[test]
    fn close_adds_connection_header() {
        let ctx = EncodeContext {
            request_keep_alive: false,
            ..EncodeContext::default()
        };
        let response = Response::new(200);
        let bytes = encode_all(&response, &ctx);
        assert!(header_section(&bytes).contains("Connection: close\r\n"));
    }

    #[test]
    fn streaming_http11_uses_chunked() {
        let response = Response::new(200);
        let mut encoder =
            ResponseEncoder::streaming(&response, &EncodeContext::default()).unwrap();
        assert!(!encoder.is_finished());
        encoder.push_chunk(b"hello").unwrap();
        encoder.push_chunk(b"").unwrap(); // 空チャンクは無視される
        encoder.finish(&[]).unwrap();
        assert!(encoder.is_finished());
        let bytes = encoder.take_pending();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.ends_with("5\r\nhello\r\n0\r\n\r\n"));
    }

    #[test]
    fn streaming_with_trailers() {
        let response = Response::new(200).header("Trailer", "X-Checksum");
        let mut encoder =
            ResponseEncoder::streaming(&response, &EncodeContext::default()).unwrap();
        encoder.push_chunk(b"data").unwrap();
        encoder
            .finish(&[("X-Checksum".to_string(), "abc".to_string())])
            .unwrap();
        let bytes = encoder.take_pending();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.ends_with("4\r\ndata\r\n0\r\nX-Checksum: abc\r\n\r\n"));
    }

    #[test]
    fn streaming_prohibited_trailer_rejected() {
        let response = Response::new(200);
        let mut encoder =
            ResponseEncoder::streaming(&response, &EncodeContext::default()).unwrap();
        assert!(matches!(
            encoder.finish(&[("Content-Length".to_string(), "4".to_string())]),
            Err(EncodeError::ProhibitedTrailerField(_))
        ));
    }

    #[test]
    fn streaming_http10_is_close_delimited() {
        let ctx = EncodeContext {
            request_version: "HTTP/1.0",
            request_keep_alive: true,
            ..EncodeContext::default()
        };
        let response = Response::new(200);
        let mut encoder = ResponseEncoder::streaming(&response, &ctx).unwrap();
        assert!(encoder.should_close());
        encoder.push_chunk(b"raw").unwrap();
        encoder.finish(&[]).unwrap();
        let bytes = encoder.take_pending();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("Transfer-Encoding"));
        assert!(text.ends_with("\r\n\r\nraw"));
    }

    #[test]
    fn conflicting_length_headers_rejected() {
        let response = Response::new(200)
            .header("Content-Length", "4")
            .header("Transfer-Encoding", "chunked");
        assert!(matches!(
            ResponseEncoder::new(&response, &EncodeContext::default()),
            Err(EncodeError::ConflictingTransferEncodingAndContentLength)
        ));
    }

    #[test]
    fn partial_write_resume_keeps_offset() {
        let response = Response::new(200).body(b"hello world".to_vec());
        let mut encoder = ResponseEncoder::new(&response, &EncodeContext::default()).unwrap();
        let total = encoder.pending().to_vec();

        // 3 バイトずつの部分書き込みをシミュレート
        let mut written = Vec::new();
        while !encoder.is_flushed() {
            let chunk: Vec<u8> = encoder.pending().iter().take(3).copied().collect();
            written.extend_from_slice(&chunk);
            encoder.consume(chunk.len());
        }
        assert_eq!(written, total);
    }

    #[test]
    fn invalid_status_code_rejected() {
        let response = Response::new(600);
        assert!(matches!(
            ResponseEncoder::new(&response, &EncodeContext::default()),
            Err(EncodeError::InvalidStatusCode(600))
        ));
    }

    #[test]
    fn encode_chunk_roundtrip_shapes() {
        assert_eq!(encode_chunk(b"hello"), b"5\r\nhello\r\n");
        assert_eq!(encode_chunk(b""), b"0\r\n\r\n");
        assert_eq!(
            encode_chunks(&[b"he", b"llo"]),
            b"2\r\nhe\r\n3\r\nllo\r\n0\r\n\r\n"
        );
    }
}
