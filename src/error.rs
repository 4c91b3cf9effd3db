use std::fmt;

/// HTTP パースエラー
///
/// 各バリアントは接続境界でのステータスコードに対応する
/// (`status_code()` を参照)。パースエラーは現在のメッセージに対して
/// 致命的であり、エラーレスポンス送信後に接続を閉じることを想定している。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// 不正なデータ (API 誤用や UTF-8 エラーを含む)
    InvalidData(String),
    /// 不正なスタートライン
    InvalidStartLine(String),
    /// スタートラインが長すぎる
    StartLineTooLong { size: usize, limit: usize },
    /// 未対応の HTTP バージョン
    ///
    /// `HTTP/DIGIT.DIGIT` の形式には合致するが、HTTP/1.0 / HTTP/1.1 の
    /// いずれでもないバージョン。
    UnsupportedVersion(String),
    /// 不正なヘッダー行 (obs-fold、不正なフィールド名/値を含む)
    InvalidHeader(String),
    /// ヘッダーブロックサイズ超過
    HeaderSectionTooLarge { size: usize, limit: usize },
    /// ヘッダー行が長すぎる
    HeaderLineTooLong { size: usize, limit: usize },
    /// ヘッダー数超過
    TooManyHeaders { count: usize, limit: usize },
    /// HTTP/1.1 リクエストに Host ヘッダーがない
    MissingHost,
    /// 不正な Host ヘッダー (複数指定を含む)
    InvalidHost(String),
    /// 不正な chunked エンコーディング
    InvalidChunk(String),
    /// チャンクサイズ行が長すぎる
    ChunkLineTooLong { size: usize, limit: usize },
    /// ボディサイズ超過
    BodyTooLarge { size: usize, limit: usize },
    /// バッファサイズ超過
    BufferOverflow { size: usize, limit: usize },
    /// ボディ読み取り中にピアが切断した
    ///
    /// ボディ消費者 (ハンドラー) への配送用。レスポンスとして
    /// 送出されることはない。
    Disconnected,
}

impl Error {
    /// エラーに対応する HTTP ステータスコードを取得
    ///
    /// - スタートライン超過: 414 URI Too Long
    /// - ヘッダー関連の超過: 431 Request Header Fields Too Large
    /// - 未対応バージョン: 505 HTTP Version Not Supported
    /// - ボディ超過: 413 Content Too Large
    /// - その他の構文エラー: 400 Bad Request
    pub fn status_code(&self) -> u16 {
        match self {
            Error::StartLineTooLong { .. } => 414,
            Error::HeaderSectionTooLarge { .. }
            | Error::HeaderLineTooLong { .. }
            | Error::TooManyHeaders { .. }
            | Error::BufferOverflow { .. } => 431,
            Error::UnsupportedVersion(_) => 505,
            Error::BodyTooLarge { .. } => 413,
            Error::InvalidData(_)
            | Error::InvalidStartLine(_)
            | Error::InvalidHeader(_)
            | Error::MissingHost
            | Error::InvalidHost(_)
            | Error::InvalidChunk(_)
            | Error::ChunkLineTooLong { .. }
            | Error::Disconnected => 400,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {}", msg),
            Error::InvalidStartLine(msg) => write!(f, "invalid start line: {}", msg),
            Error::StartLineTooLong { size, limit } => {
                write!(f, "start line too long: {} > {}", size, limit)
            }
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported HTTP version: {}", version)
            }
            Error::InvalidHeader(msg) => write!(f, "invalid header line: {}", msg),
            Error::HeaderSectionTooLarge { size, limit } => {
                write!(f, "header section too large: {} > {}", size, limit)
            }
            Error::HeaderLineTooLong { size, limit } => {
                write!(f, "header line too long: {} > {}", size, limit)
            }
            Error::TooManyHeaders { count, limit } => {
                write!(f, "too many headers: {} > {}", count, limit)
            }
            Error::MissingHost => write!(f, "HTTP/1.1 request missing Host header"),
            Error::InvalidHost(msg) => write!(f, "invalid Host header: {}", msg),
            Error::InvalidChunk(msg) => write!(f, "invalid chunked encoding: {}", msg),
            Error::ChunkLineTooLong { size, limit } => {
                write!(f, "chunk line too long: {} > {}", size, limit)
            }
            Error::BodyTooLarge { size, limit } => {
                write!(f, "body too large: {} > {}", size, limit)
            }
            Error::BufferOverflow { size, limit } => {
                write!(f, "buffer overflow: {} > {}", size, limit)
            }
            Error::Disconnected => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for Error {}

/// HTTP エンコードエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Transfer-Encoding と Content-Length が同時に設定されている
    /// RFC 9112 Section 6.2: 送信者は Transfer-Encoding を含むメッセージに
    /// Content-Length を含めてはならない (MUST NOT)
    ConflictingTransferEncodingAndContentLength,
    /// 1xx / 204 レスポンスで Transfer-Encoding が設定されている
    /// RFC 9112 Section 6.1: サーバーは 1xx または 204 レスポンスに
    /// Transfer-Encoding を含めてはならない (MUST NOT)
    ForbiddenTransferEncoding { status_code: u16 },
    /// ステータスコードが範囲外 (100-599)
    InvalidStatusCode(u16),
    /// ストリーミング API 誤用 (完了後の書き込み等)
    InvalidState(String),
    /// トレーラーで禁止されているフィールド
    ProhibitedTrailerField(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::ConflictingTransferEncodingAndContentLength => {
                write!(
                    f,
                    "conflicting Transfer-Encoding and Content-Length headers (RFC 9112 Section 6.2)"
                )
            }
            EncodeError::ForbiddenTransferEncoding { status_code } => {
                write!(
                    f,
                    "Transfer-Encoding not allowed for {} response (RFC 9112 Section 6.1)",
                    status_code
                )
            }
            EncodeError::InvalidStatusCode(code) => {
                write!(f, "invalid status code: {}", code)
            }
            EncodeError::InvalidState(msg) => write!(f, "invalid encoder state: {}", msg),
            EncodeError::ProhibitedTrailerField(name) => {
                write!(f, "prohibited trailer field: {}", name)
            }
        }
    }
}

impl std::error::Error for EncodeError {}
