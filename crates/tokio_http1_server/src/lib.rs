//! tokio_http1_server - Tokio integration for shiguredo_http1_server
//!
//! tokio と tokio-rustls を使用した非同期 HTTP/1.x サーバーライブラリ。
//!
//! ## 特徴
//!
//! - **shiguredo_http1_server ベース**: Sans I/O の接続ドライバーを
//!   ソケットに接続するだけの薄いアダプター
//! - **非同期 I/O**: tokio による完全非同期対応
//! - **TLS 対応**: tokio-rustls による HTTPS 対応
//! - **パイプライン / Keep-Alive**: レスポンスはリクエスト到着順に送出
//! - **ストリーミング / アップグレード**: chunked ストリーミング応答と
//!   101 Switching Protocols によるソケット引き渡し
//!
//! ## サーバー
//!
//! ```ignore
//! use tokio_http1_server::{Request, RequestBody, Response, Server};
//!
//! async fn handler(request: Request, mut body: RequestBody) -> Response {
//!     // ボディはプル型で遅延読み取りする
//!     let uploaded = body.read_all().await.unwrap_or_default();
//!     Response::new(200)
//!         .header("Content-Type", "text/plain")
//!         .body(uploaded)
//! }
//!
//! // HTTP
//! let server = Server::bind("0.0.0.0:8080").await?;
//! server.serve(handler).await?;
//!
//! // HTTPS
//! let server = Server::bind("0.0.0.0:8443").await?.tls(tls_config);
//! server.serve(handler).await?;
//! ```
//!
//! ## ストリーミング応答
//!
//! ```ignore
//! use tokio_http1_server::{Reply, Request, RequestBody, Response};
//!
//! async fn handler(request: Request, _body: RequestBody) -> Reply {
//!     let (reply, writer) = Reply::streaming(Response::new(200));
//!     tokio::spawn(async move {
//!         writer.write(b"hello ".to_vec()).await.ok();
//!         writer.write(b"world".to_vec()).await.ok();
//!         writer.finish(Vec::new()).await.ok();
//!     });
//!     reply
//! }
//! ```

pub mod conn;
pub mod error;
pub mod server;

pub use conn::{AsyncStream, BodyWriter, Reply, RequestBody, Upgraded};
pub use error::{Error, Result};
pub use server::{Handler, Server};

// shiguredo_http1_server の型を re-export
pub use shiguredo_http1_server::{DecoderLimits, Request, Response};
