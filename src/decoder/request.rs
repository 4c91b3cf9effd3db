//! HTTP リクエストデコーダー

use crate::error::Error;
use crate::host::Host;
use crate::limits::DecoderLimits;
use crate::request::Request;

use super::body::{
    BodyDecoder, BodyKind, BodyProgress, find_line, is_http_version_shape,
    is_supported_http_version, is_valid_method, is_valid_request_target, parse_header_line,
    resolve_body_headers,
};
use super::head::RequestHead;
use super::phase::DecodePhase;

/// HTTP リクエストデコーダー (Sans I/O)
///
/// サーバー側でクライアントからのリクエストをパースする際に使用。
/// I/O は行わず、呼び出し側がバイト列を `feed()` で供給して
/// 結果を取り出す。1 バイトずつ供給しても一括で供給しても
/// 得られる結果の列は同一になる。
///
/// # 使い方
///
/// ```rust
/// use shiguredo_http1_server::{BodyKind, BodyProgress, RequestDecoder};
///
/// let mut decoder = RequestDecoder::new();
/// decoder.feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
/// let request = decoder.decode().unwrap().unwrap();
/// assert_eq!(request.method, "GET");
/// assert_eq!(request.uri, "/");
/// assert!(request.body.is_empty());
/// ```
#[derive(Debug)]
pub struct RequestDecoder {
    buf: Vec<u8>,
    phase: DecodePhase,
    start_line: Option<String>,
    headers: Vec<(String, String)>,
    /// 現在のメッセージで消費済みのヘッダーブロックバイト数
    header_bytes: usize,
    body_decoder: BodyDecoder,
    limits: DecoderLimits,
    /// 設定由来のボディ上限 (increase_body_limit はメッセージ単位)
    base_max_body_size: usize,
    /// decode() 用: デコード済みヘッダー
    decoded_head: Option<RequestHead>,
    /// decode() 用: ボディ種別
    decoded_body_kind: Option<BodyKind>,
    /// decode() 用: デコード済みボディ
    decoded_body: Vec<u8>,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    /// 新しいデコーダーを作成
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    /// 制限付きでデコーダーを作成
    pub fn with_limits(limits: DecoderLimits) -> Self {
        let base_max_body_size = limits.max_body_size;
        Self {
            buf: Vec::new(),
            phase: DecodePhase::StartLine,
            start_line: None,
            headers: Vec::new(),
            header_bytes: 0,
            body_decoder: BodyDecoder::new(),
            limits,
            base_max_body_size,
            decoded_head: None,
            decoded_body_kind: None,
            decoded_body: Vec::new(),
        }
    }

    /// 制限設定を取得
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// 現在のメッセージのボディ上限を引き上げる
    ///
    /// 引き上げはメッセージ単位で、メッセージ完了時に設定値へ戻る。
    /// 現在の上限より小さい値は無視される (引き下げはできない)。
    /// Content-Length ボディの上限はヘッダー完了時に検査されるため、
    /// 固定長ボディに対してはヘッダーデコード前に呼ぶ必要がある。
    /// chunked ボディには読み取り中の引き上げも反映される。
    pub fn increase_body_limit(&mut self, max_body_size: usize) {
        if max_body_size > self.limits.max_body_size {
            self.limits.max_body_size = max_body_size;
        }
    }

    /// バッファにデータを追加
    pub fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        let new_size = self.buf.len() + data.len();
        if new_size > self.limits.max_buffer_size {
            return Err(Error::BufferOverflow {
                size: new_size,
                limit: self.limits.max_buffer_size,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// バッファにデータを追加 (制限チェックなし)
    pub fn feed_unchecked(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// バッファの残りデータを取得
    ///
    /// プロトコルアップグレード時に未消費バイトを引き渡す用途にも使う。
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    /// バッファ済みバイト数を取得
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// メッセージの途中でないかを判定
    ///
    /// バッファが空で、スタートライン待ちの状態なら true。
    /// アイドルタイムアウト時の「正常な切断」判定に使う。
    pub fn is_idle(&self) -> bool {
        self.buf.is_empty()
            && matches!(self.phase, DecodePhase::StartLine | DecodePhase::Complete)
            && self.decoded_head.is_none()
    }

    /// デコーダーをリセット
    pub fn reset(&mut self) {
        self.buf.clear();
        self.phase = DecodePhase::StartLine;
        self.start_line = None;
        self.headers.clear();
        self.header_bytes = 0;
        self.body_decoder.reset();
        self.limits.max_body_size = self.base_max_body_size;
        self.decoded_head = None;
        self.decoded_body_kind = None;
        self.decoded_body.clear();
    }

    /// 次のメッセージのために状態を戻す
    fn restart(&mut self) {
        self.phase = DecodePhase::StartLine;
        self.start_line = None;
        self.headers.clear();
        self.header_bytes = 0;
        self.body_decoder.reset();
        self.limits.max_body_size = self.base_max_body_size;
    }

    /// スタートラインをパース・検証
    fn parse_start_line(&self, line: &str) -> Result<(), Error> {
        if line.contains('\r') || line.contains('\n') {
            return Err(Error::InvalidStartLine("contains CR/LF".to_string()));
        }

        // Parse: METHOD SP TARGET SP VERSION CRLF
        let parts: Vec<&str> = line.splitn(3, ' ').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidStartLine(line.to_string()));
        }

        // メソッド名の検証 (RFC 9110 Section 9)
        if !is_valid_method(parts[0]) {
            return Err(Error::InvalidStartLine("invalid method".to_string()));
        }

        // リクエストターゲットの検証 (RFC 9112 Section 3)
        if !is_valid_request_target(parts[1]) {
            return Err(Error::InvalidStartLine(
                "invalid request-target".to_string(),
            ));
        }

        // HTTP バージョンの検証 (RFC 9112 Section 2.3)
        // 文法には合致するが 1.0/1.1 でないバージョンは 505 相当として区別する
        if !is_supported_http_version(parts[2]) {
            if is_http_version_shape(parts[2]) {
                return Err(Error::UnsupportedVersion(parts[2].to_string()));
            }
            return Err(Error::InvalidStartLine("invalid HTTP version".to_string()));
        }

        Ok(())
    }

    /// Host ヘッダーを検証 (RFC 9112 Section 3.2)
    ///
    /// HTTP/1.1 リクエストではちょうど 1 つの有効な Host ヘッダーが必須
    fn validate_host(&self, version: &str) -> Result<(), Error> {
        if version != "HTTP/1.1" {
            return Ok(());
        }

        let host_headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("Host"))
            .collect();
        if host_headers.is_empty() {
            return Err(Error::MissingHost);
        }
        if host_headers.len() > 1 {
            return Err(Error::InvalidHost("multiple Host headers".to_string()));
        }

        let (_, host_value) = host_headers[0];
        if Host::parse(host_value).is_err() {
            return Err(Error::InvalidHost("invalid host value".to_string()));
        }
        Ok(())
    }

    /// ボディモードを決定
    ///
    /// RFC 9112 Section 6: HTTP/1.0 では Transfer-Encoding は定義されていないため、
    /// HTTP/1.0 リクエストで Transfer-Encoding が指定されている場合はエラーとする。
    /// リクエストは close-delimited を使わない。
    fn determine_body_kind(&self, version: &str) -> Result<BodyKind, Error> {
        let (transfer_encoding_chunked, content_length) = resolve_body_headers(&self.headers)?;

        if transfer_encoding_chunked {
            if version == "HTTP/1.0" {
                return Err(Error::InvalidHeader(
                    "Transfer-Encoding is not defined in HTTP/1.0".to_string(),
                ));
            }
            return Ok(BodyKind::Chunked);
        }

        if let Some(len) = content_length {
            if len > self.limits.max_body_size {
                return Err(Error::BodyTooLarge {
                    size: len,
                    limit: self.limits.max_body_size,
                });
            }
            return Ok(BodyKind::ContentLength(len));
        }

        Ok(BodyKind::None)
    }

    /// ヘッダーをデコード
    ///
    /// ヘッダーが完了したら `Some((RequestHead, BodyKind))` を返す
    /// データ不足の場合は `None` を返す
    /// ボディデコード中に呼ぶとエラー
    pub fn decode_headers(&mut self) -> Result<Option<(RequestHead, BodyKind)>, Error> {
        loop {
            match &self.phase {
                DecodePhase::StartLine => {
                    let Some((pos, eol)) = find_line(&self.buf) else {
                        // 終端が見つかる前にサイズ制限を検査する
                        if self.buf.len() > self.limits.max_start_line_size {
                            return Err(Error::StartLineTooLong {
                                size: self.buf.len(),
                                limit: self.limits.max_start_line_size,
                            });
                        }
                        return Ok(None);
                    };
                    if pos > self.limits.max_start_line_size {
                        return Err(Error::StartLineTooLong {
                            size: pos,
                            limit: self.limits.max_start_line_size,
                        });
                    }

                    let line = String::from_utf8(self.buf[..pos].to_vec())
                        .map_err(|e| Error::InvalidStartLine(format!("invalid UTF-8: {e}")))?;
                    self.buf.drain(..eol);

                    self.parse_start_line(&line)?;

                    self.start_line = Some(line);
                    self.phase = DecodePhase::Headers;
                }
                DecodePhase::Headers => {
                    let Some((pos, eol)) = find_line(&self.buf) else {
                        // ヘッダーブロック全体の制限も終端前に検査する
                        let pending = self.header_bytes + self.buf.len();
                        if pending > self.limits.max_header_block_size {
                            return Err(Error::HeaderSectionTooLarge {
                                size: pending,
                                limit: self.limits.max_header_block_size,
                            });
                        }
                        return Ok(None);
                    };
                    if pos == 0 {
                        // Empty line - end of headers
                        self.buf.drain(..eol);

                        let start_line_ref = self
                            .start_line
                            .as_ref()
                            .ok_or_else(|| Error::InvalidData("missing request line".to_string()))?;
                        let version = start_line_ref.split(' ').nth(2).unwrap_or("").to_string();

                        self.validate_host(&version)?;

                        let body_kind = self.determine_body_kind(&version)?;

                        // ヘッダー完了、ボディフェーズに遷移
                        match body_kind {
                            BodyKind::ContentLength(len) => {
                                if len > 0 {
                                    self.phase = DecodePhase::BodyContentLength { remaining: len };
                                } else {
                                    self.phase = DecodePhase::Complete;
                                }
                            }
                            BodyKind::Chunked => {
                                self.phase = DecodePhase::BodyChunkedSize;
                            }
                            BodyKind::CloseDelimited | BodyKind::None => {
                                self.phase = DecodePhase::Complete;
                            }
                        }

                        // RequestHead を構築
                        let start_line = self
                            .start_line
                            .take()
                            .ok_or_else(|| Error::InvalidData("missing request line".to_string()))?;
                        let parts: Vec<&str> = start_line.splitn(3, ' ').collect();

                        let head = RequestHead {
                            method: parts[0].to_string(),
                            uri: parts[1].to_string(),
                            version: parts[2].to_string(),
                            headers: std::mem::take(&mut self.headers),
                        };

                        return Ok(Some((head, body_kind)));
                    }

                    // Check header line size limit
                    if pos > self.limits.max_header_line_size {
                        return Err(Error::HeaderLineTooLong {
                            size: pos,
                            limit: self.limits.max_header_line_size,
                        });
                    }

                    // Check header block size limit
                    self.header_bytes += eol;
                    if self.header_bytes > self.limits.max_header_block_size {
                        return Err(Error::HeaderSectionTooLarge {
                            size: self.header_bytes,
                            limit: self.limits.max_header_block_size,
                        });
                    }

                    // Check header count limit
                    if self.headers.len() >= self.limits.max_headers_count {
                        return Err(Error::TooManyHeaders {
                            count: self.headers.len() + 1,
                            limit: self.limits.max_headers_count,
                        });
                    }

                    let line = String::from_utf8(self.buf[..pos].to_vec())
                        .map_err(|e| Error::InvalidHeader(format!("invalid UTF-8: {e}")))?;
                    self.buf.drain(..eol);

                    let (name, value) = parse_header_line(&line)?;
                    self.headers.push((name, value));
                }
                DecodePhase::Complete => {
                    // 完了状態から次のメッセージへ遷移 (パイプライン対応)
                    self.restart();
                    continue;
                }
                _ => {
                    return Err(Error::InvalidData(
                        "decode_headers called during body decoding".to_string(),
                    ));
                }
            }
        }
    }

    /// 利用可能なボディデータを覗く（ゼロコピー）
    ///
    /// `decode_headers()` 成功後に呼ぶ
    /// データがある場合はスライスを返す
    /// ボディがない場合や完了済みの場合は `None` を返す
    pub fn peek_body(&self) -> Option<&[u8]> {
        self.body_decoder.peek_body(&self.buf, &self.phase)
    }

    /// 利用可能なボディデータのバイト数を取得
    fn available_body_len(&self) -> usize {
        match &self.phase {
            DecodePhase::BodyContentLength { remaining } => self.buf.len().min(*remaining),
            DecodePhase::BodyChunkedData { remaining } => self.buf.len().min(*remaining),
            _ => 0,
        }
    }

    /// ボディデータを消費
    ///
    /// `peek_body()` で取得したデータを処理した後に呼ぶ
    /// `len` は消費するバイト数 (1 以上)
    pub fn consume_body(&mut self, len: usize) -> Result<BodyProgress, Error> {
        if len == 0 {
            return Err(Error::InvalidData(
                "consume_body(0) is not allowed, use progress() instead".to_string(),
            ));
        }
        self.body_decoder
            .consume_body(&mut self.buf, &mut self.phase, len, &self.limits)
    }

    /// 状態機械を進める (ボディデータは消費しない)
    ///
    /// Chunked エンコーディングの場合、チャンクサイズ行のパースや
    /// 終端チャンクの処理を行う。
    pub fn progress(&mut self) -> Result<BodyProgress, Error> {
        self.body_decoder
            .consume_body(&mut self.buf, &mut self.phase, 0, &self.limits)
    }

    /// リクエスト全体を一括でデコード
    ///
    /// ストリーミング API (`decode_headers()` / `peek_body()` / `consume_body()`) を
    /// 内部で使用して、リクエスト全体をデコードする。
    /// トレーラーがあればデコード結果の `Request` に含まれる。
    ///
    /// データ不足の場合は `None` を返す。
    /// ストリーミング API と混在使用するとエラーを返す。
    pub fn decode(&mut self) -> Result<Option<Request>, Error> {
        // ヘッダーがまだデコードされていない場合はデコード
        if self.decoded_head.is_none() {
            match self.phase {
                DecodePhase::StartLine | DecodePhase::Headers | DecodePhase::Complete => {
                    match self.decode_headers()? {
                        Some((head, body_kind)) => {
                            self.decoded_head = Some(head);
                            self.decoded_body_kind = Some(body_kind);
                        }
                        None => return Ok(None),
                    }
                }
                _ => {
                    return Err(Error::InvalidData(
                        "decode cannot be mixed with streaming API".to_string(),
                    ));
                }
            }
        }

        // ボディを読む
        let body_kind = *self.decoded_body_kind.as_ref().ok_or_else(|| {
            Error::InvalidData("missing body kind after decode_headers".to_string())
        })?;
        let mut trailers = Vec::new();
        match body_kind {
            BodyKind::ContentLength(_) | BodyKind::Chunked => loop {
                // 直接バッファから利用可能なデータ長を取得（コピーなし）
                let available = self.available_body_len();
                if available > 0 {
                    self.decoded_body.extend_from_slice(&self.buf[..available]);
                    match self.consume_body(available)? {
                        BodyProgress::Complete { trailers: t } => {
                            trailers = t;
                            break;
                        }
                        BodyProgress::Continue => continue,
                    }
                }

                // データがない場合、状態機械を進める
                match self.progress()? {
                    BodyProgress::Complete { trailers: t } => {
                        trailers = t;
                        break;
                    }
                    BodyProgress::Continue => {
                        // 状態遷移後にデータが利用可能になったか確認
                        if self.available_body_len() > 0 {
                            continue;
                        }
                        // データ不足
                        return Ok(None);
                    }
                }
            },
            BodyKind::CloseDelimited | BodyKind::None => {}
        }

        // Request を構築
        let head = self
            .decoded_head
            .take()
            .ok_or_else(|| Error::InvalidData("missing decoded head".to_string()))?;
        let body = std::mem::take(&mut self.decoded_body);

        // Keep-Alive 対応: 次のリクエストのために状態をリセット
        self.decoded_body_kind = None;
        self.restart();

        Ok(Some(Request {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            body,
            trailers,
        }))
    }
}
