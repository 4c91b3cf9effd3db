//! # shiguredo_http1_server
//!
//! 依存なしの HTTP/1.x サーバーエンジンライブラリ (Sans I/O)
//!
//! ## 特徴
//!
//! - **依存なし**: 標準ライブラリのみ使用
//! - **Sans I/O**: I/O を完全に分離した設計。ソケットとの接続は
//!   アダプター (tokio_http1_server 等) が行う
//! - **堅牢性**: サイズ制限・スマグリング対策・厳格な文法検証を備えた
//!   インクリメンタルパーサー
//! - **接続ライフサイクル**: パイプライン化、keep-alive、100-continue、
//!   プロトコルアップグレードを扱う接続ドライバー
//!
//! ## 使い方
//!
//! ### デコーダー / エンコーダー (メッセージ単位)
//!
//! ```rust
//! use shiguredo_http1_server::{RequestDecoder, Response};
//!
//! // リクエストをデコード
//! let mut decoder = RequestDecoder::new();
//! decoder.feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//! let request = decoder.decode().unwrap().unwrap();
//! assert_eq!(request.method, "GET");
//!
//! // レスポンスを作成してエンコード
//! let response = Response::new(200)
//!     .header("Content-Type", "text/plain")
//!     .body(b"Hello, World!".to_vec());
//! let bytes = response.encode();
//! // bytes を送信...
//! ```
//!
//! ### 接続ドライバー (接続単位)
//!
//! ```rust
//! use shiguredo_http1_server::{DriverConfig, Http1Driver, Response};
//!
//! let mut driver = Http1Driver::new(DriverConfig::default());
//!
//! // ソケットから読んだバイトを投入
//! driver.feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//!
//! // 完成したリクエストを取り出してレスポンスを対応付ける
//! while let Some((token, request)) = driver.poll_request().unwrap() {
//!     let _ = request;
//!     driver.respond(token, Response::new(200)).unwrap();
//! }
//!
//! // 送出待ちバイトをソケットへ書く
//! let n = driver.pending_output().len();
//! driver.consume_output(n);
//! ```

pub mod date;
mod decoder;
mod driver;
mod encoder;
mod error;
pub mod expect;
pub mod host;
mod limits;
mod request;
mod response;
mod status;
pub mod trailer;
pub mod upgrade;

pub use decoder::{
    BodyKind, BodyProgress, HttpHead, RequestDecoder, RequestHead, ResponseDecoder, ResponseHead,
};
pub use driver::{
    DriverConfig, Http1Driver, RequestBodyProgress, ResponseToken, error_response,
};
pub use encoder::{
    EncodeContext, ResponseEncoder, encode_chunk, encode_chunks, encode_request,
    encode_request_headers, encode_response, encode_response_headers,
};
pub use error::{EncodeError, Error};
pub use limits::DecoderLimits;
pub use request::Request;
pub use response::Response;
pub use status::default_reason_phrase;
