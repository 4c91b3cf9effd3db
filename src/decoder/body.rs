//! ボディデコーダーの定義

use crate::error::Error;
use crate::limits::DecoderLimits;
use crate::trailer::is_prohibited_trailer_field;

use super::phase::DecodePhase;

/// ボディの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Content-Length で指定された固定長
    ContentLength(usize),
    /// Transfer-Encoding: chunked
    Chunked,
    /// 接続が閉じるまでがボディ (close-delimited)
    ///
    /// RFC 9112: レスポンスで Transfer-Encoding も Content-Length もない場合、
    /// 接続が閉じられるまでをボディとして扱う。リクエストでは使われない。
    CloseDelimited,
    /// ボディなし
    None,
}

/// ボディデコードの進捗
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyProgress {
    /// まだデータがある（続きを読む）
    Continue,
    /// 完了（トレーラーがある場合は含む）
    Complete { trailers: Vec<(String, String)> },
}

/// ボディデコーダー (内部用)
///
/// RequestDecoder と ResponseDecoder で共有されるボディデコードロジック
#[derive(Debug)]
pub(crate) struct BodyDecoder {
    /// トレーラーヘッダー
    trailers: Vec<(String, String)>,
    /// ボディ内での消費済みバイト数
    body_consumed: usize,
    /// トレーラー数
    trailer_count: usize,
}

impl Default for BodyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyDecoder {
    /// 新しいボディデコーダーを作成
    pub fn new() -> Self {
        Self {
            trailers: Vec::new(),
            body_consumed: 0,
            trailer_count: 0,
        }
    }

    /// リセット
    pub fn reset(&mut self) {
        self.trailers.clear();
        self.body_consumed = 0;
        self.trailer_count = 0;
    }

    /// 利用可能なボディデータを覗く（ゼロコピー）
    pub fn peek_body<'a>(&self, buf: &'a [u8], phase: &DecodePhase) -> Option<&'a [u8]> {
        match phase {
            DecodePhase::BodyContentLength { remaining }
            | DecodePhase::BodyChunkedData { remaining } => {
                let available = buf.len().min(*remaining);
                if available > 0 {
                    Some(&buf[..available])
                } else {
                    None
                }
            }
            DecodePhase::BodyCloseDelimited => {
                if buf.is_empty() {
                    return None;
                }
                Some(buf)
            }
            DecodePhase::BodyChunkedSize
            | DecodePhase::BodyChunkedDataCrlf
            | DecodePhase::ChunkedTrailer
            | DecodePhase::Complete
            | DecodePhase::StartLine
            | DecodePhase::Headers => None,
        }
    }

    /// ボディデータを消費
    pub fn consume_body(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        len: usize,
        limits: &DecoderLimits,
    ) -> Result<BodyProgress, Error> {
        match phase {
            DecodePhase::BodyContentLength { remaining } => {
                if len > *remaining {
                    return Err(Error::InvalidData(
                        "consume_body: len exceeds remaining".to_string(),
                    ));
                }
                if len > buf.len() {
                    return Err(Error::InvalidData(
                        "consume_body: len exceeds buffer".to_string(),
                    ));
                }

                buf.drain(..len);
                *remaining -= len;
                self.body_consumed =
                    self.body_consumed
                        .checked_add(len)
                        .ok_or(Error::BodyTooLarge {
                            size: usize::MAX,
                            limit: limits.max_body_size,
                        })?;

                if *remaining == 0 {
                    *phase = DecodePhase::Complete;
                    return Ok(BodyProgress::Complete {
                        trailers: Vec::new(),
                    });
                }

                Ok(BodyProgress::Continue)
            }
            DecodePhase::BodyChunkedSize => {
                self.process_chunked_size(buf, phase, limits)?;

                match phase {
                    DecodePhase::Complete => Ok(BodyProgress::Complete {
                        trailers: std::mem::take(&mut self.trailers),
                    }),
                    _ => Ok(BodyProgress::Continue),
                }
            }
            DecodePhase::BodyChunkedData { remaining } => {
                if len > *remaining {
                    return Err(Error::InvalidData(
                        "consume_body: len exceeds chunk remaining".to_string(),
                    ));
                }
                if len > buf.len() {
                    return Err(Error::InvalidData(
                        "consume_body: len exceeds buffer".to_string(),
                    ));
                }

                buf.drain(..len);
                *remaining -= len;
                self.body_consumed =
                    self.body_consumed
                        .checked_add(len)
                        .ok_or(Error::BodyTooLarge {
                            size: usize::MAX,
                            limit: limits.max_body_size,
                        })?;

                if *remaining == 0 {
                    // チャンクデータ終了、行終端待ちへ遷移
                    *phase = DecodePhase::BodyChunkedDataCrlf;
                    // 行終端が既にバッファにあれば即座に処理
                    if consume_chunk_data_terminator(buf)? {
                        *phase = DecodePhase::BodyChunkedSize;
                    }
                }

                Ok(BodyProgress::Continue)
            }
            DecodePhase::BodyChunkedDataCrlf => {
                // 行終端待ち状態: バッファに終端があれば処理
                if consume_chunk_data_terminator(buf)? {
                    *phase = DecodePhase::BodyChunkedSize;
                }
                Ok(BodyProgress::Continue)
            }
            DecodePhase::ChunkedTrailer => {
                self.process_trailers(buf, phase, limits)?;

                match phase {
                    DecodePhase::Complete => Ok(BodyProgress::Complete {
                        trailers: std::mem::take(&mut self.trailers),
                    }),
                    _ => Ok(BodyProgress::Continue),
                }
            }
            DecodePhase::BodyCloseDelimited => {
                // close-delimited: バッファにあるデータをすべて消費可能
                // Complete への遷移は mark_eof() で行う
                if len > buf.len() {
                    return Err(Error::InvalidData(
                        "consume_body: len exceeds buffer".to_string(),
                    ));
                }

                // max_body_size チェック (加算前にオーバーフロー検出)
                let new_size = self
                    .body_consumed
                    .checked_add(len)
                    .ok_or(Error::BodyTooLarge {
                        size: usize::MAX,
                        limit: limits.max_body_size,
                    })?;
                if new_size > limits.max_body_size {
                    return Err(Error::BodyTooLarge {
                        size: new_size,
                        limit: limits.max_body_size,
                    });
                }

                buf.drain(..len);
                self.body_consumed = new_size;

                // close-delimited は mark_eof() が呼ばれるまで Continue
                Ok(BodyProgress::Continue)
            }
            DecodePhase::Complete => Ok(BodyProgress::Complete {
                trailers: std::mem::take(&mut self.trailers),
            }),
            DecodePhase::StartLine | DecodePhase::Headers => Err(Error::InvalidData(
                "consume_body called before decode_headers".to_string(),
            )),
        }
    }

    /// chunked のチャンクサイズ行を処理
    fn process_chunked_size(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        limits: &DecoderLimits,
    ) -> Result<(), Error> {
        if !matches!(phase, DecodePhase::BodyChunkedSize) {
            return Ok(());
        }

        if let Some((pos, eol)) = find_line(buf) {
            // チャンクサイズ行の長さ制限チェック
            if pos > limits.max_chunk_line_size {
                return Err(Error::ChunkLineTooLong {
                    size: pos,
                    limit: limits.max_chunk_line_size,
                });
            }

            let line = String::from_utf8(buf[..pos].to_vec())
                .map_err(|e| Error::InvalidChunk(format!("invalid UTF-8: {e}")))?;
            buf.drain(..eol);

            // チャンクサイズをパース (拡張は無視)
            let size_str = line.split(';').next().unwrap_or(&line).trim();
            if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::InvalidChunk(format!(
                    "invalid chunk size: {}",
                    size_str
                )));
            }
            let chunk_size = usize::from_str_radix(size_str, 16)
                .map_err(|_| Error::InvalidChunk(format!("invalid chunk size: {}", size_str)))?;

            if chunk_size == 0 {
                *phase = DecodePhase::ChunkedTrailer;
                return self.process_trailers(buf, phase, limits);
            } else {
                // 累積ボディサイズの上限はチャンクデータを取り込む前に検査する
                let new_size =
                    self.body_consumed
                        .checked_add(chunk_size)
                        .ok_or(Error::BodyTooLarge {
                            size: usize::MAX,
                            limit: limits.max_body_size,
                        })?;
                if new_size > limits.max_body_size {
                    return Err(Error::BodyTooLarge {
                        size: new_size,
                        limit: limits.max_body_size,
                    });
                }
                *phase = DecodePhase::BodyChunkedData {
                    remaining: chunk_size,
                };
            }
        } else if buf.len() > limits.max_chunk_line_size + 2 {
            // 終端のないチャンクサイズ行が伸び続けるのを防ぐ
            return Err(Error::ChunkLineTooLong {
                size: buf.len(),
                limit: limits.max_chunk_line_size,
            });
        }
        Ok(())
    }

    /// トレーラーヘッダーを処理
    ///
    /// トレーラーはヘッダーと同じ文法に従うが、RFC 9112 Section 7.1.2 の
    /// 禁止フィールド (Transfer-Encoding, Content-Length, Host 等) は
    /// エラーとして拒否する。
    fn process_trailers(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        limits: &DecoderLimits,
    ) -> Result<(), Error> {
        while matches!(phase, DecodePhase::ChunkedTrailer) {
            if let Some((pos, eol)) = find_line(buf) {
                if pos == 0 {
                    buf.drain(..eol);
                    *phase = DecodePhase::Complete;
                    return Ok(());
                } else {
                    // 行長制限チェック
                    if pos > limits.max_header_line_size {
                        return Err(Error::HeaderLineTooLong {
                            size: pos,
                            limit: limits.max_header_line_size,
                        });
                    }

                    // 数制限チェック
                    if self.trailer_count >= limits.max_headers_count {
                        return Err(Error::TooManyHeaders {
                            count: self.trailer_count + 1,
                            limit: limits.max_headers_count,
                        });
                    }

                    let line = String::from_utf8(buf[..pos].to_vec())
                        .map_err(|e| Error::InvalidHeader(format!("invalid UTF-8: {e}")))?;
                    buf.drain(..eol);

                    // 不正なトレーラー行はエラーにする
                    let (name, value) = parse_header_line(&line)?;
                    if is_prohibited_trailer_field(&name) {
                        return Err(Error::InvalidHeader(format!(
                            "prohibited trailer field: {}",
                            name
                        )));
                    }
                    self.trailers.push((name, value));
                    self.trailer_count += 1;
                }
            } else {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// 行終端を探す
///
/// LF を走査し、`(行の長さ, 終端を含む消費長)` を返す。
/// 行末の CR は行の長さに含めない。CRLF だけでなく bare LF も
/// 行終端として受理する (空行は `\r\n\r\n` でも `\n\n` でも成立する)。
pub(crate) fn find_line(buf: &[u8]) -> Option<(usize, usize)> {
    let nl = buf.iter().position(|&b| b == b'\n')?;
    let line_len = if nl > 0 && buf[nl - 1] == b'\r' {
        nl - 1
    } else {
        nl
    };
    Some((line_len, nl + 1))
}

/// チャンクデータ後の行終端 (CRLF または bare LF) を消費する
///
/// 終端を消費したら true、データ不足なら false を返す。
pub(crate) fn consume_chunk_data_terminator(buf: &mut Vec<u8>) -> Result<bool, Error> {
    let Some(&first) = buf.first() else {
        return Ok(false);
    };
    match first {
        b'\n' => {
            buf.drain(..1);
            Ok(true)
        }
        b'\r' => {
            if buf.len() < 2 {
                return Ok(false);
            }
            if buf[1] != b'\n' {
                return Err(Error::InvalidChunk(
                    "expected CRLF after chunk data".to_string(),
                ));
            }
            buf.drain(..2);
            Ok(true)
        }
        _ => Err(Error::InvalidChunk(
            "expected CRLF after chunk data".to_string(),
        )),
    }
}

/// ヘッダー行をパース
///
/// obs-fold (SP/HTAB で始まる継続行) は RFC 9112 Section 5.2 に従い
/// 常にハードエラーとして拒否する。空白置換による寛容なマージは行わない。
pub(crate) fn parse_header_line(line: &str) -> Result<(String, String), Error> {
    if line.starts_with(' ') || line.starts_with('\t') {
        return Err(Error::InvalidHeader("obs-fold".to_string()));
    }
    if line.contains('\r') || line.contains('\n') {
        return Err(Error::InvalidHeader("contains CR/LF".to_string()));
    }

    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHeader("missing colon".to_string()))?;
    if name.is_empty() {
        return Err(Error::InvalidHeader("empty name".to_string()));
    }
    if name != name.trim() || name.bytes().any(|b| b == b' ' || b == b'\t') {
        return Err(Error::InvalidHeader("invalid name whitespace".to_string()));
    }
    if !is_valid_header_name(name) {
        return Err(Error::InvalidHeader("invalid name".to_string()));
    }

    // ヘッダー値の検証 (RFC 9110 Section 5.5)
    // 値は前後の空白を除去し、元の大文字小文字は保持する
    let trimmed_value = value.trim();
    if !is_valid_field_value(trimmed_value) {
        return Err(Error::InvalidHeader(
            "invalid value (contains control characters)".to_string(),
        ));
    }

    Ok((name.to_string(), trimmed_value.to_string()))
}

/// ヘッダー名が有効か確認
pub(crate) fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_char)
}

/// トークン文字か確認
pub(crate) fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~'
    )
}

/// ヘッダー値に許可される文字か確認 (RFC 9110 Section 5.5)
///
/// field-value = *field-content
/// field-vchar = VCHAR / obs-text
/// VCHAR = %x21-7E (可視文字)
/// obs-text = %x80-FF
///
/// SP (0x20) と HTAB (0x09) も許可される (field-content の一部)
pub(crate) fn is_valid_field_vchar(b: u8) -> bool {
    matches!(b, 0x09 | 0x20..=0x7E | 0x80..=0xFF)
}

/// ヘッダー値が有効か確認 (RFC 9110 Section 5.5)
///
/// 制御文字 (0x00-0x08, 0x0A-0x1F, 0x7F) を含む場合は無効
pub(crate) fn is_valid_field_value(value: &str) -> bool {
    value.bytes().all(is_valid_field_vchar)
}

/// メソッド名が有効か確認
///
/// RFC 9110 Section 9 では method = token と定義されているが、
/// セキュリティ上の理由から大文字アルファベット、アンダースコア、ハイフンのみを許可する。
/// 小文字メソッドは正当なクライアントが使用しないため拒否する。
pub(crate) fn is_valid_method(method: &str) -> bool {
    !method.is_empty()
        && method
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'_' | b'-'))
}

/// `HTTP/DIGIT.DIGIT` の形式か確認 (RFC 9112 Section 2.3)
///
/// HTTP-version = HTTP-name "/" DIGIT "." DIGIT
/// HTTP-name = %s"HTTP"
pub(crate) fn is_http_version_shape(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 8
        && &bytes[..5] == b"HTTP/"
        && bytes[5].is_ascii_digit()
        && bytes[6] == b'.'
        && bytes[7].is_ascii_digit()
}

/// サポートされる HTTP バージョンか確認
///
/// HTTP/1.0 または HTTP/1.1 のみ許可
pub(crate) fn is_supported_http_version(version: &str) -> bool {
    matches!(version, "HTTP/1.0" | "HTTP/1.1")
}

/// RFC 3986 で除外されている文字および request-target で許可されない文字
///
/// RFC 3986: absolute-URI にはフラグメントが含まれない
/// したがって request-target では "#" (フラグメント区切り) は許可されない
const RFC3986_EXCLUDED: &[u8] = b"\"#<>\\^`{|}";

/// リクエストターゲット (URI) が有効か確認
///
/// RFC 9112 Section 3: request-target には制御文字を含めない
/// RFC 3986 Section 2: URI で許可されない文字を拒否
///
/// 拒否する文字:
/// - 制御文字 (0x00-0x20, 0x7F)
/// - RFC 3986 で除外されている文字: " # < > \ ^ ` { | }
/// - 不正なパーセントエンコーディング (% の後に 2 桁の 16 進数がない)
/// - パーセントエンコーディングされた NUL バイト (%00)
pub(crate) fn is_valid_request_target(target: &str) -> bool {
    if target.is_empty() {
        return false;
    }

    let bytes = target.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // 制御文字の拒否 (0x00-0x20, 0x7F)
        if b <= 0x20 || b == 0x7F {
            return false;
        }

        // RFC 3986 除外文字の拒否
        if RFC3986_EXCLUDED.contains(&b) {
            return false;
        }

        // パーセントエンコーディングの検証
        if b == b'%' {
            if i + 2 >= bytes.len() {
                return false; // 不完全
            }
            let high = bytes[i + 1];
            let low = bytes[i + 2];

            if !high.is_ascii_hexdigit() || !low.is_ascii_hexdigit() {
                return false; // 不正な 16 進数
            }

            // %00 (NUL) の拒否
            if high == b'0' && low == b'0' {
                return false;
            }

            i += 3;
            continue;
        }

        i += 1;
    }

    true
}

/// ステータスコードが有効か確認 (RFC 9110 Section 15)
///
/// ステータスコードは 3 桁の数字で、100-599 の範囲
pub(crate) fn is_valid_status_code(code: u16) -> bool {
    (100..=599).contains(&code)
}

/// reason-phrase が有効か確認 (RFC 9112 Section 4)
///
/// reason-phrase = 1*( HTAB / SP / VCHAR / obs-text )
pub(crate) fn is_valid_reason_phrase(phrase: &str) -> bool {
    phrase
        .bytes()
        .all(|b| matches!(b, 0x09 | 0x20..=0x7E | 0x80..=0xFF))
}

/// Transfer-Encoding ヘッダーを解析
///
/// 複数の Transfer-Encoding ヘッダーは連結して単一のトークンリストとして扱い、
/// 最後のエンコーディングがボディのフレーミングを決める:
///
/// - 最後が chunked → chunked デコード
/// - chunked が最後以外に現れる、または重複する → エラー (RFC 9112 Section 6.1)
/// - 最後が chunked 以外 → フレーミング不能のためエラー
pub(crate) fn parse_transfer_encoding_chunked(headers: &[(String, String)]) -> Result<bool, Error> {
    let mut tokens: Vec<String> = Vec::new();

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("Transfer-Encoding") {
            for token in value.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    return Err(Error::InvalidHeader(
                        "invalid Transfer-Encoding: empty token".to_string(),
                    ));
                }
                tokens.push(token.to_ascii_lowercase());
            }
        }
    }

    if tokens.is_empty() {
        return Ok(false);
    }

    let chunked_count = tokens.iter().filter(|t| *t == "chunked").count();
    if chunked_count > 1 {
        return Err(Error::InvalidHeader(
            "invalid Transfer-Encoding: duplicate chunked".to_string(),
        ));
    }

    let last_is_chunked = tokens.last().is_some_and(|t| t == "chunked");
    if chunked_count == 1 && !last_is_chunked {
        // chunked が最終エンコーディングでない場合、メッセージ長が決定できない
        return Err(Error::InvalidHeader(
            "invalid Transfer-Encoding: chunked must be the final coding".to_string(),
        ));
    }
    if !last_is_chunked {
        return Err(Error::InvalidHeader(
            "invalid Transfer-Encoding: unsupported coding".to_string(),
        ));
    }

    Ok(true)
}

/// Content-Length ヘッダーを解析
pub(crate) fn parse_content_length(headers: &[(String, String)]) -> Result<Option<usize>, Error> {
    let mut value: Option<usize> = None;
    for (name, raw_value) in headers {
        if name.eq_ignore_ascii_case("Content-Length") {
            let parsed = parse_content_length_value(raw_value)?;
            if let Some(prev) = value {
                if prev != parsed {
                    return Err(Error::InvalidHeader(
                        "invalid Content-Length: mismatched values".to_string(),
                    ));
                }
            } else {
                value = Some(parsed);
            }
        }
    }
    Ok(value)
}

/// Content-Length 値をパース
fn parse_content_length_value(input: &str) -> Result<usize, Error> {
    let input = input.trim();
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidHeader(
            "invalid Content-Length: not a number".to_string(),
        ));
    }
    input
        .parse::<usize>()
        .map_err(|_| Error::InvalidHeader("invalid Content-Length: overflow".to_string()))
}

/// ボディ関連ヘッダーを解決
///
/// Content-Length と Transfer-Encoding: chunked の併用はリクエスト
/// スマグリング対策として拒否する (RFC 9112 Section 6.1)。
pub(crate) fn resolve_body_headers(
    headers: &[(String, String)],
) -> Result<(bool, Option<usize>), Error> {
    let transfer_encoding_chunked = parse_transfer_encoding_chunked(headers)?;
    let content_length = parse_content_length(headers)?;

    if transfer_encoding_chunked && content_length.is_some() {
        return Err(Error::InvalidHeader(
            "both Transfer-Encoding and Content-Length".to_string(),
        ));
    }

    Ok((transfer_encoding_chunked, content_length))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn transfer_encoding_chunked_last_wins() {
        assert!(parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "chunked")])).unwrap());
        assert!(
            parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "gzip, chunked")])).unwrap()
        );
        assert!(
            parse_transfer_encoding_chunked(&h(&[
                ("Transfer-Encoding", "gzip"),
                ("Transfer-Encoding", "chunked"),
            ]))
            .unwrap()
        );
        assert!(!parse_transfer_encoding_chunked(&h(&[("Host", "example.com")])).unwrap());
    }

    #[test]
    fn transfer_encoding_chunked_not_last_rejected() {
        assert!(
            parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "chunked, gzip")])).is_err()
        );
        assert!(
            parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "chunked, chunked")]))
                .is_err()
        );
        assert!(parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "gzip")])).is_err());
        assert!(parse_transfer_encoding_chunked(&h(&[("Transfer-Encoding", "")])).is_err());
    }

    #[test]
    fn content_length_duplicates() {
        assert_eq!(
            parse_content_length(&h(&[("Content-Length", "5"), ("Content-Length", "5")])).unwrap(),
            Some(5)
        );
        assert!(
            parse_content_length(&h(&[("Content-Length", "5"), ("Content-Length", "6")])).is_err()
        );
        assert!(parse_content_length(&h(&[("Content-Length", "-1")])).is_err());
        assert!(parse_content_length(&h(&[("Content-Length", "5x")])).is_err());
    }

    #[test]
    fn smuggling_defense() {
        let headers = h(&[("Content-Length", "5"), ("Transfer-Encoding", "chunked")]);
        assert!(resolve_body_headers(&headers).is_err());
    }

    #[test]
    fn header_line_grammar() {
        assert_eq!(
            parse_header_line("Host: example.com").unwrap(),
            ("Host".to_string(), "example.com".to_string())
        );
        // 値は空白除去、大文字小文字は保持
        assert_eq!(
            parse_header_line("X-Test:  MiXeD  ").unwrap(),
            ("X-Test".to_string(), "MiXeD".to_string())
        );
        assert!(parse_header_line(" folded").is_err());
        assert!(parse_header_line("\tfolded").is_err());
        assert!(parse_header_line("no colon").is_err());
        assert!(parse_header_line("Bad Name: x").is_err());
        assert!(parse_header_line("Name : x").is_err());
        assert!(parse_header_line(": empty").is_err());
    }

    #[test]
    fn find_line_accepts_bare_lf() {
        assert_eq!(find_line(b"abc\r\ndef"), Some((3, 5)));
        assert_eq!(find_line(b"abc\ndef"), Some((3, 4)));
        assert_eq!(find_line(b"\r\n"), Some((0, 2)));
        assert_eq!(find_line(b"\n"), Some((0, 1)));
        assert_eq!(find_line(b"abc\r"), None);
        assert_eq!(find_line(b"abc"), None);
    }

    #[test]
    fn chunk_data_terminator_accepts_bare_lf() {
        let mut buf = b"\r\nrest".to_vec();
        assert!(consume_chunk_data_terminator(&mut buf).unwrap());
        assert_eq!(buf, b"rest");

        let mut buf = b"\nrest".to_vec();
        assert!(consume_chunk_data_terminator(&mut buf).unwrap());
        assert_eq!(buf, b"rest");

        // データ不足
        let mut buf = b"\r".to_vec();
        assert!(!consume_chunk_data_terminator(&mut buf).unwrap());
        let mut buf = Vec::new();
        assert!(!consume_chunk_data_terminator(&mut buf).unwrap());

        // 終端以外のバイトはエラー
        let mut buf = b"x".to_vec();
        assert!(consume_chunk_data_terminator(&mut buf).is_err());
        let mut buf = b"\rx".to_vec();
        assert!(consume_chunk_data_terminator(&mut buf).is_err());
    }

    #[test]
    fn http_version_shapes() {
        assert!(is_http_version_shape("HTTP/1.1"));
        assert!(is_http_version_shape("HTTP/2.0"));
        assert!(!is_http_version_shape("HTTP/11"));
        assert!(!is_http_version_shape("http/1.1"));
        assert!(!is_http_version_shape("HTTP/1.1 "));
        assert!(is_supported_http_version("HTTP/1.0"));
        assert!(!is_supported_http_version("HTTP/2.0"));
    }

    #[test]
    fn request_target_validation() {
        assert!(is_valid_request_target("/"));
        assert!(is_valid_request_target("/path?query=1"));
        assert!(is_valid_request_target("http://example.com/"));
        assert!(is_valid_request_target("/%20ok"));
        assert!(!is_valid_request_target(""));
        assert!(!is_valid_request_target("/with space"));
        assert!(!is_valid_request_target("/frag#ment"));
        assert!(!is_valid_request_target("/%zz"));
        assert!(!is_valid_request_target("/%00"));
        assert!(!is_valid_request_target("/%2"));
    }
}
