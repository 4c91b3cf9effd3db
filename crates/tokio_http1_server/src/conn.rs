//! 接続処理
//!
//! 1 接続 1 タスク。`Http1Driver` (Sans I/O) が接続状態を持ち、
//! このモジュールはソケットとの橋渡しだけを行う:
//!
//! - 非同期読み取り → `driver.feed()`
//! - ヘッダー完了したリクエスト → ボディハンドル (`RequestBody`) と共に
//!   ハンドラータスクへディスパッチ
//! - ハンドラーのボディ読み取り → `driver.poll_body()` (プル型。
//!   ハンドラーが引き取らない間はドライバーの水位でパースが中断される)
//! - ハンドラーの応答 → `driver.respond()` (送出順序はドライバーが保証)
//! - `driver.pending_output()` → 非同期書き込み (部分書き込みは
//!   `consume_output()` で再開)
//!
//! ハンドラーはリクエストごとに個別のタスクで実行されるため、
//! 遅いハンドラーがあっても後続のパイプラインリクエストのパースは
//! 止まらない。応答の完成順序に関係なく、送出はリクエスト到着順になる。

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use shiguredo_http1_server::{
    DriverConfig, Error as HttpError, Http1Driver, Request, RequestBodyProgress, Response,
    ResponseToken,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::server::Handler;

/// 非同期双方向ストリーム
///
/// アップグレード後の生ストリームを型消去して渡すためのトレイト。
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// アップグレード後の接続
///
/// 101 レスポンスのフラッシュ完了後、ソケットの所有権は HTTP レイヤーを
/// 離れてアップグレード継続処理に移る。
pub struct Upgraded {
    /// 生の双方向ストリーム (TLS の場合は復号済み)
    pub stream: Box<dyn AsyncStream>,
    /// HTTP レイヤーが消費しなかった受信済みバイト
    ///
    /// アップグレード後プロトコルの先頭バイトが 101 より先に届いていた
    /// 場合にここに入る。継続処理はソケットより先にこれを読むこと。
    pub leftover: Vec<u8>,
}

type UpgradeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type UpgradeFn = Box<dyn FnOnce(Upgraded) -> UpgradeFuture + Send>;

/// ハンドラーが返す応答
///
/// 固定ボディ、ストリーミングボディ、アップグレード継続の 3 形態。
/// `Response` からの `From` 実装があるため、通常のハンドラーは
/// `Response` をそのまま返せる。
pub struct Reply {
    pub(crate) response: Response,
    pub(crate) body: ReplyBody,
    pub(crate) upgrade: Option<UpgradeFn>,
}

pub(crate) enum ReplyBody {
    /// `response.body` をそのまま送る
    Fixed,
    /// `BodyWriter` からフレームを受け取る
    Streaming(mpsc::Receiver<BodyFrame>),
}

pub(crate) enum BodyFrame {
    Data(Vec<u8>),
    End(Vec<(String, String)>),
}

impl Reply {
    /// 固定ボディの応答を作成
    pub fn new(response: Response) -> Self {
        Self {
            response,
            body: ReplyBody::Fixed,
            upgrade: None,
        }
    }

    /// ストリーミングボディの応答を作成
    ///
    /// `response.body` は無視され、ボディは返された `BodyWriter` で
    /// 供給する。HTTP/1.1 リクエストには chunked、HTTP/1.0 には
    /// close-delimited で送出される。
    pub fn streaming(response: Response) -> (Self, BodyWriter) {
        let (tx, rx) = mpsc::channel(8);
        (
            Self {
                response,
                body: ReplyBody::Streaming(rx),
                upgrade: None,
            },
            BodyWriter { tx },
        )
    }

    /// プロトコルアップグレード応答を作成
    ///
    /// `response` は 101 Switching Protocols であること。レスポンスの
    /// 全バイトがフラッシュされた後、継続処理が生ストリームと
    /// 未消費バイトを受け取る。
    pub fn upgrade<F, Fut>(response: Response, callback: F) -> Self
    where
        F: FnOnce(Upgraded) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            response,
            body: ReplyBody::Fixed,
            upgrade: Some(Box::new(move |upgraded| Box::pin(callback(upgraded)))),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::new(response)
    }
}

/// ボディ読み取りの応答
pub(crate) enum PulledBody {
    Data(Vec<u8>),
    End(Vec<(String, String)>),
    Failed(HttpError),
}

/// リクエストボディの遅延読み取りハンドル
///
/// ハンドラーに渡されるプル型のボディ消費口。`data()` を呼ぶたびに
/// 接続タスクへ読み取り要求が送られ、ドライバーにフレーミング済みの
/// データがあれば返る。ハンドラーが読み取らない間、ドライバーは
/// 水位までしかボディを先読みしない (バックプレッシャー)。
///
/// ボディ読み取り中にクライアントが切断した場合、`data()` は
/// エラーを返す。トレーラーはボディ終端後にのみ取得できる。
pub struct RequestBody {
    token: ResponseToken,
    tx: Option<mpsc::Sender<ConnEvent>>,
    trailers: Option<Vec<(String, String)>>,
    done: bool,
}

impl RequestBody {
    pub(crate) fn new(token: ResponseToken, tx: mpsc::Sender<ConnEvent>) -> Self {
        Self {
            token,
            tx: Some(tx),
            trailers: None,
            done: false,
        }
    }

    /// ボディなしリクエスト用の空ハンドル
    pub(crate) fn empty(token: ResponseToken) -> Self {
        Self {
            token,
            tx: None,
            trailers: Some(Vec::new()),
            done: true,
        }
    }

    /// 次のボディデータを取り出す
    ///
    /// ボディが終端したら `None` を返す (以後トレーラーが取得できる)。
    /// クライアント切断やパースエラーで続きが届かない場合は `Err`。
    pub async fn data(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let Some(tx) = &self.tx else {
            self.done = true;
            return Ok(None);
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(ConnEvent::PullBody {
                token: self.token,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            self.done = true;
            return Err(Error::ConnectionClosed);
        }
        match reply_rx.await {
            Ok(PulledBody::Data(data)) => Ok(Some(data)),
            Ok(PulledBody::End(trailers)) => {
                self.trailers = Some(trailers);
                self.done = true;
                Ok(None)
            }
            Ok(PulledBody::Failed(error)) => {
                self.done = true;
                match error {
                    HttpError::Disconnected => Err(Error::ConnectionClosed),
                    error => Err(Error::Http(error)),
                }
            }
            Err(_) => {
                // 接続タスクが終了した (クライアント切断)
                self.done = true;
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// ボディ全体を読み切る
    pub async fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(data) = self.data().await? {
            body.extend_from_slice(&data);
        }
        Ok(body)
    }

    /// トレーラーを取得
    ///
    /// ボディ終端 (`data()` が `None` を返した後) にのみ `Some`。
    /// それより前に呼ぶと `None` を返す (未確定)。
    pub fn trailers(&self) -> Option<&[(String, String)]> {
        self.trailers.as_deref()
    }
}

/// ストリーミングボディの書き込み口
///
/// チャネルは有界であり、接続側の送出が追いつかない場合は
/// `write()` が待たされる (バックプレッシャー)。
pub struct BodyWriter {
    tx: mpsc::Sender<BodyFrame>,
}

impl BodyWriter {
    /// ボディデータを送る
    ///
    /// 接続が既に閉じられている場合は `Error::ConnectionClosed`。
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(BodyFrame::Data(data))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// ボディを終端する (トレーラー付き)
    pub async fn finish(self, trailers: Vec<(String, String)>) -> Result<()> {
        self.tx
            .send(BodyFrame::End(trailers))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// 接続設定
pub(crate) struct ConnectionConfig {
    pub idle_timeout: Duration,
    /// 接続後に最初のバイトが届くまでのタイムアウト (idle_timeout 以下)
    pub header_read_timeout: Duration,
    pub max_requests_per_connection: u32,
    pub read_buffer_size: usize,
    pub driver: DriverConfig,
    /// 500 レスポンスにエラー詳細を含めるかどうか
    pub debug: bool,
}

/// 接続ループのイベント
pub(crate) enum ConnEvent {
    Reply {
        token: ResponseToken,
        response: Response,
        streaming: bool,
        upgrade: Option<UpgradeFn>,
    },
    Body {
        token: ResponseToken,
        data: Vec<u8>,
    },
    End {
        token: ResponseToken,
        trailers: Vec<(String, String)>,
    },
    /// ハンドラーからのリクエストボディ読み取り要求
    PullBody {
        token: ResponseToken,
        reply: oneshot::Sender<PulledBody>,
    },
}

/// 待機中のボディ読み取りにデータを届ける
///
/// `Pending` のものは残し、データ・終端・失敗が確定したものに応答する。
/// パースエラーを見つけた場合は接続を失敗させた上で、完了済みの
/// ボディはそのまま読めるように一度だけ再試行する。
fn service_body_waiters(
    driver: &mut Http1Driver,
    waiters: &mut HashMap<ResponseToken, oneshot::Sender<PulledBody>>,
) {
    let tokens: Vec<ResponseToken> = waiters.keys().copied().collect();
    for token in tokens {
        let outcome = match driver.poll_body(token) {
            Ok(RequestBodyProgress::Pending) => continue,
            Ok(RequestBodyProgress::Data(data)) => PulledBody::Data(data),
            Ok(RequestBodyProgress::Complete(trailers)) => PulledBody::End(trailers),
            Err(error) => {
                if matches!(error, HttpError::Disconnected) {
                    PulledBody::Failed(error)
                } else {
                    driver.fail(&error);
                    match driver.poll_body(token) {
                        Ok(RequestBodyProgress::Data(data)) => PulledBody::Data(data),
                        Ok(RequestBodyProgress::Complete(trailers)) => PulledBody::End(trailers),
                        _ => PulledBody::Failed(error),
                    }
                }
            }
        };
        if let Some(reply) = waiters.remove(&token) {
            let _ = reply.send(outcome);
        }
    }
}

/// 1 接続を処理する
///
/// 正常なクローズ (keep-alive 終了、タイムアウト、アップグレード完了) は
/// `Ok(())`。I/O エラーはこの接続だけを落とし、呼び出し側でログされる。
pub(crate) async fn serve_connection<S, H>(
    stream: S,
    peer_addr: SocketAddr,
    config: Arc<ConnectionConfig>,
    handler: Arc<H>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Handler,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut driver = Http1Driver::new(config.driver.clone());
    let (event_tx, mut event_rx) =
        mpsc::channel::<ConnEvent>(config.driver.max_pipelined.max(1) * 2);
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut upgrades: HashMap<ResponseToken, UpgradeFn> = HashMap::new();
    // データ待ちのボディ読み取り要求 (ボディ消費者は各リクエストに 1 つ)
    let mut body_waiters: HashMap<ResponseToken, oneshot::Sender<PulledBody>> = HashMap::new();
    let mut received_any = false;
    let mut eof = false;
    let mut request_count: u32 = 0;
    // 届いていないイベント (応答またはストリーム終端) の数
    let mut pending_events: usize = 0;

    loop {
        // 送出待ちバイトを書き切る (部分書き込みはオフセットで再開)
        loop {
            if driver.pending_output().is_empty() {
                break;
            }
            let n = writer.write(driver.pending_output()).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            driver.consume_output(n);
        }
        writer.flush().await?;

        // アップグレード: ソケットの所有権を継続処理へ移す
        if let Some((token, leftover)) = driver.take_upgrade() {
            let stream = reader.unsplit(writer);
            return match upgrades.remove(&token) {
                Some(callback) => {
                    tracing::debug!(%peer_addr, "connection upgraded");
                    callback(Upgraded {
                        stream: Box::new(stream),
                        leftover,
                    })
                    .await;
                    Ok(())
                }
                None => {
                    tracing::warn!(%peer_addr, "101 response without upgrade continuation");
                    Ok(())
                }
            };
        }

        if driver.is_closed() {
            return Ok(());
        }

        // ヘッダー完了したリクエストをボディハンドルと共にハンドラーへ
        loop {
            match driver.poll_request() {
                Ok(Some((token, request))) => {
                    request_count += 1;
                    pending_events += 1;
                    let force_close = request_count >= config.max_requests_per_connection;
                    let body = if driver.has_body(token) {
                        RequestBody::new(token, event_tx.clone())
                    } else {
                        RequestBody::empty(token)
                    };
                    dispatch(
                        token,
                        request,
                        body,
                        force_close,
                        config.debug,
                        handler.clone(),
                        event_tx.clone(),
                    );
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(%peer_addr, %error, "request parse error");
                    driver.fail(&error);
                    break;
                }
            }
        }

        // 新しく届いた/フレーミングされたボディを待機中の読み取りへ
        service_body_waiters(&mut driver, &mut body_waiters);

        // fail() や自動応答 (501 等) で出力が発生していれば先に書く
        if !driver.pending_output().is_empty() {
            continue;
        }

        let can_wait_event = pending_events > 0;
        let can_read = driver.wants_read() && !eof;
        if !can_wait_event && !can_read {
            // 読むものも待つものもない (EOF 後の掃き出し完了など)
            return Ok(());
        }

        let read_timeout = if received_any {
            config.idle_timeout
        } else {
            config.header_read_timeout
        };

        tokio::select! {
            event = event_rx.recv(), if can_wait_event => {
                let Some(event) = event else { continue };
                match event {
                    ConnEvent::Reply { token, response, streaming, upgrade } => {
                        if !streaming {
                            pending_events -= 1;
                        }
                        if let Some(callback) = upgrade {
                            upgrades.insert(token, callback);
                        }
                        if streaming {
                            if let Err(error) = driver.respond_streaming(token, response) {
                                // 不正なストリーミングヘッダーは 500 に差し替える
                                tracing::warn!(%peer_addr, %error, "invalid streaming response");
                                let _ = driver.respond(
                                    token,
                                    Response::new(500).header("Connection", "close"),
                                );
                            }
                        } else if let Err(error) = driver.respond(token, response) {
                            // アップグレードやクローズで破棄されたスロット
                            tracing::debug!(%peer_addr, %error, "response dropped");
                        }
                    }
                    ConnEvent::Body { token, data } => {
                        if let Err(error) = driver.push_body(token, &data) {
                            tracing::debug!(%peer_addr, %error, "body chunk dropped");
                        }
                    }
                    ConnEvent::End { token, trailers } => {
                        pending_events -= 1;
                        if let Err(error) = driver.finish_body(token, &trailers) {
                            tracing::debug!(%peer_addr, %error, "body end dropped");
                        }
                    }
                    ConnEvent::PullBody { token, reply } => {
                        body_waiters.insert(token, reply);
                        service_body_waiters(&mut driver, &mut body_waiters);
                    }
                }
            }
            read_result = tokio::time::timeout(read_timeout, reader.read(&mut buf)), if can_read => {
                match read_result {
                    Ok(Ok(0)) => {
                        eof = true;
                        driver.peer_closed();
                    }
                    Ok(Ok(n)) => {
                        received_any = true;
                        if let Err(error) = driver.feed(&buf[..n]) {
                            tracing::debug!(%peer_addr, %error, "receive buffer overflow");
                            driver.fail(&error);
                        }
                    }
                    Ok(Err(e)) => return Err(Error::Io(e)),
                    Err(_) => {
                        if driver.is_idle() {
                            // アイドル接続の正常な終了
                            tracing::debug!(%peer_addr, "idle timeout");
                        } else {
                            // 途中まで届いたリクエストの停滞は異常終了として
                            // レスポンスなしで閉じる
                            tracing::warn!(%peer_addr, "connection stalled mid-request");
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// リクエストを個別タスクで処理し、結果をイベントチャネルへ送る
///
/// ハンドラーの panic は JoinError として捕捉され 500 に変換される。
fn dispatch<H: Handler>(
    token: ResponseToken,
    request: Request,
    body: RequestBody,
    force_close: bool,
    debug: bool,
    handler: Arc<H>,
    tx: mpsc::Sender<ConnEvent>,
) {
    let task = tokio::spawn(async move { handler.handle(request, body).await });
    tokio::spawn(async move {
        let mut reply = match task.await {
            Ok(reply) => reply,
            Err(join_error) => {
                tracing::warn!(%join_error, "handler failed");
                panic_reply(&join_error, debug)
            }
        };

        if force_close && !reply.response.has_header("Connection") {
            reply.response.add_header("Connection", "close");
        }

        let body = std::mem::replace(&mut reply.body, ReplyBody::Fixed);
        let Reply {
            response, upgrade, ..
        } = reply;
        let streaming = matches!(body, ReplyBody::Streaming(_));
        if tx
            .send(ConnEvent::Reply {
                token,
                response,
                streaming,
                upgrade,
            })
            .await
            .is_err()
        {
            return;
        }

        // ストリーミングボディのフレームを接続タスクへ転送する
        if let ReplyBody::Streaming(mut rx) = body {
            while let Some(frame) = rx.recv().await {
                match frame {
                    BodyFrame::Data(data) => {
                        if tx.send(ConnEvent::Body { token, data }).await.is_err() {
                            return;
                        }
                    }
                    BodyFrame::End(trailers) => {
                        let _ = tx.send(ConnEvent::End { token, trailers }).await;
                        return;
                    }
                }
            }
            // BodyWriter が finish なしでドロップされた場合も終端する
            let _ = tx
                .send(ConnEvent::End {
                    token,
                    trailers: Vec::new(),
                })
                .await;
        }
    });
}

/// ハンドラーの panic を 500 レスポンスに変換する
fn panic_reply(join_error: &tokio::task::JoinError, debug: bool) -> Reply {
    let body = if debug {
        format!("handler error: {join_error}\n").into_bytes()
    } else {
        b"Internal Server Error\n".to_vec()
    };
    Reply::new(
        Response::new(500)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body),
    )
}
