/// デコーダーの制限設定
///
/// サイズ制限はいずれも「終端が見つかる前」に検査される。
/// 例えばスタートラインの終端 CRLF がまだ届いていなくても、
/// バッファ済みバイト数が `max_start_line_size` を超えた時点でエラーになる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderLimits {
    /// 最大バッファサイズ (デフォルト: 64KB)
    pub max_buffer_size: usize,
    /// 最大スタートライン長 (デフォルト: 2KB)
    pub max_start_line_size: usize,
    /// 最大ヘッダーブロックサイズ (デフォルト: 32KB)
    ///
    /// スタートライン後、空行までのヘッダー行全体に適用される。
    pub max_header_block_size: usize,
    /// 最大ヘッダー数 (デフォルト: 100)
    pub max_headers_count: usize,
    /// 最大ヘッダー行長 (デフォルト: 8KB)
    pub max_header_line_size: usize,
    /// 最大ボディサイズ (デフォルト: 128KB)
    ///
    /// Content-Length ボディと chunked ボディの累積サイズの両方に適用される。
    /// メッセージ単位で `RequestDecoder::increase_body_limit` により
    /// 引き上げられる。
    pub max_body_size: usize,
    /// 最大チャンクサイズ行長 (デフォルト: 64バイト)
    ///
    /// chunked 転送エンコーディングのチャンクサイズ行の最大長。
    /// チャンクサイズは 16 進数で表現されるため、通常は非常に短い。
    /// 例: "FFFFFFFF\r\n" (4GB) でも 10 バイト程度。
    pub max_chunk_line_size: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 64 * 1024,       // 64KB
            max_start_line_size: 2 * 1024,    // 2KB
            max_header_block_size: 32 * 1024, // 32KB
            max_headers_count: 100,
            max_header_line_size: 8 * 1024, // 8KB
            max_body_size: 128 * 1024,      // 128KB
            max_chunk_line_size: 64,        // 64 bytes
        }
    }
}

impl DecoderLimits {
    /// 制限なしの設定を作成
    pub fn unlimited() -> Self {
        Self {
            max_buffer_size: usize::MAX,
            max_start_line_size: usize::MAX,
            max_header_block_size: usize::MAX,
            max_headers_count: usize::MAX,
            max_header_line_size: usize::MAX,
            max_body_size: usize::MAX,
            max_chunk_line_size: usize::MAX,
        }
    }
}
