//! HTTP/HTTPS サーバー
//!
//! tokio と tokio-rustls を使用した非同期 HTTP/1.x サーバー。
//! 接続ごとの状態機械は shiguredo_http1_server の `Http1Driver` が持ち、
//! ここではリスナーと TLS ハンドシェイク、接続タスクの起動だけを行う。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_http1_server::{Request, RequestBody, Response, Server};
//!
//! async fn handler(request: Request, mut body: RequestBody) -> Response {
//!     let uploaded = body.read_all().await.unwrap_or_default();
//!     Response::new(200)
//!         .header("Content-Type", "text/plain")
//!         .body(uploaded)
//! }
//!
//! // HTTP サーバー
//! let server = Server::bind("0.0.0.0:8080").await?;
//! server.serve(handler).await?;
//!
//! // HTTPS サーバー
//! let server = Server::bind("0.0.0.0:8443").await?.tls(tls_config);
//! server.serve(handler).await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use shiguredo_http1_server::{DecoderLimits, DriverConfig, Request};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::conn::{ConnectionConfig, Reply, RequestBody, serve_connection};
use crate::error::{Error, Result};

/// HTTP リクエストハンドラー
///
/// リクエストのヘッダーが揃った時点で、リクエストごとに個別のタスクで
/// 呼び出される。ボディは `body` ハンドルからプル型で読み取る
/// (読まずに応答した場合、残りは読み捨てられる)。
/// `Response` または `Reply` (ストリーミング / アップグレード) を返す。
pub trait Handler: Send + Sync + 'static {
    /// リクエストを処理して応答を返す
    fn handle(&self, request: Request, body: RequestBody) -> impl Future<Output = Reply> + Send;
}

/// 関数からハンドラーを作成
impl<F, Fut, R> Handler for F
where
    F: Fn(Request, RequestBody) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: Into<Reply> + Send,
{
    fn handle(&self, request: Request, body: RequestBody) -> impl Future<Output = Reply> + Send {
        let future = (self)(request, body);
        async move { future.await.into() }
    }
}

/// HTTP サーバー
///
/// HTTP と HTTPS の両方に対応。HTTPS を使用する場合は `tls()` で TLS 設定を指定する。
pub struct Server {
    listener: TcpListener,
    idle_timeout: Duration,
    header_read_timeout: Duration,
    max_requests_per_connection: u32,
    read_buffer_size: usize,
    max_pipelined: usize,
    limits: DecoderLimits,
    allowed_methods: Vec<String>,
    debug: bool,
    tls_acceptor: Option<TlsAcceptor>,
}

impl Server {
    /// 指定アドレスにバインド
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            idle_timeout: Duration::from_secs(60),
            header_read_timeout: Duration::from_secs(10),
            max_requests_per_connection: 1000,
            read_buffer_size: 8192,
            max_pipelined: 32,
            limits: DecoderLimits::default(),
            allowed_methods: DriverConfig::default().allowed_methods,
            debug: false,
            tls_acceptor: None,
        })
    }

    /// TLS 設定を指定 (HTTPS 用)
    pub fn tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls_acceptor = Some(TlsAcceptor::from(config));
        self
    }

    /// アイドルタイムアウトを設定
    ///
    /// keep-alive 接続で次のリクエストを待つ時間。メッセージの途中で
    /// 停滞した接続はレスポンスなしで閉じられる。
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// 接続後に最初のバイトが届くまでのタイムアウトを設定
    ///
    /// アイドルタイムアウトより長い値を指定した場合はアイドル
    /// タイムアウトに切り詰められる。
    pub fn header_read_timeout(mut self, timeout: Duration) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    /// 1 接続あたりの最大リクエスト数を設定
    pub fn max_requests_per_connection(mut self, max: u32) -> Self {
        self.max_requests_per_connection = max;
        self
    }

    /// 読み取りバッファサイズを設定
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// パース済みで未応答のリクエスト数の上限を設定 (パイプライン)
    pub fn max_pipelined(mut self, max: usize) -> Self {
        self.max_pipelined = max;
        self
    }

    /// デコーダーの制限設定を指定
    pub fn limits(mut self, limits: DecoderLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 許可する HTTP メソッドを指定
    ///
    /// GET と HEAD は常に許可される。リストにないメソッドには 501 を返す。
    pub fn allowed_methods(mut self, methods: Vec<String>) -> Self {
        self.allowed_methods = methods;
        self
    }

    /// デバッグモードを設定
    ///
    /// 有効にするとハンドラーのエラー詳細が 500 レスポンスに含まれる。
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// ローカルアドレスを取得
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// TLS が有効かどうかを返す
    pub fn is_tls(&self) -> bool {
        self.tls_acceptor.is_some()
    }

    fn connection_config(&self) -> Arc<ConnectionConfig> {
        Arc::new(ConnectionConfig {
            idle_timeout: self.idle_timeout,
            header_read_timeout: self.header_read_timeout.min(self.idle_timeout),
            max_requests_per_connection: self.max_requests_per_connection,
            read_buffer_size: self.read_buffer_size,
            driver: DriverConfig {
                limits: self.limits.clone(),
                max_pipelined: self.max_pipelined,
                max_body_buffer: DriverConfig::default().max_body_buffer,
                allowed_methods: self.allowed_methods.clone(),
            },
            debug: self.debug,
        })
    }

    /// サーバーを起動
    ///
    /// 接続ごとにタスクを起動する。1 つの接続のエラーは他の接続にも
    /// アクセプトループにも影響しない。
    pub async fn serve<H: Handler>(self, handler: H) -> Result<()> {
        let config = self.connection_config();
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let config = config.clone();
            let handler = handler.clone();
            let tls_acceptor = self.tls_acceptor.clone();

            tokio::spawn(async move {
                let result = if let Some(acceptor) = tls_acceptor {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            serve_connection(tls_stream, peer_addr, config, handler).await
                        }
                        Err(e) => Err(Error::Tls(e.to_string())),
                    }
                } else {
                    serve_connection(stream, peer_addr, config, handler).await
                };

                if let Err(error) = result {
                    tracing::warn!(%peer_addr, %error, "connection error");
                }
            });
        }
    }

    /// 単一の接続を処理 (テスト用)
    pub async fn handle_one<H: Handler>(self, handler: H) -> Result<()> {
        let (stream, peer_addr) = self.listener.accept().await?;
        let config = self.connection_config();
        let handler = Arc::new(handler);

        if let Some(ref acceptor) = self.tls_acceptor {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            serve_connection(tls_stream, peer_addr, config, handler).await
        } else {
            serve_connection(stream, peer_addr, config, handler).await
        }
    }
}
