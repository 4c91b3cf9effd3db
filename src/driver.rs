//! HTTP/1.x 接続ドライバー (Sans I/O)
//!
//! 1 接続につき 1 つの `Http1Driver` がリクエストデコーダーと
//! 送出キューを所有し、接続ライフサイクルを駆動する。
//!
//! - リクエストはヘッダー完了時点で引き渡され、ボディは
//!   `poll_body()` で遅延取得する (実体化済みの `Vec<u8>` ではなく
//!   プル型のハンドル)。消費者が引き取らない間はフレーミングが
//!   水位で中断される (バックプレッシャー)
//! - パイプライン化されたリクエストを到着順に取り出し、レスポンスは
//!   `respond()` の呼び出し順に関係なく**リクエスト到着順**に送出する。
//!   現在のメッセージのボディがフレーミングされ次第、消費を待たずに
//!   次のスタートラインのパースが進む
//! - `Expect: 100-continue` には中間レスポンスを先行送出する
//! - `101 Switching Protocols` のフラッシュ完了後はデコーダーを切り離し、
//!   未消費バイトを呼び出し側へ引き渡す (プロトコルアップグレード)
//! - パースエラーはステータスコードへ対応付けてエラーレスポンスを生成し、
//!   送出後に接続を閉じる。ボディ読み取り中の切断は
//!   `Error::Disconnected` として消費者に届く
//!
//! I/O は行わない。ソケットとの接続は呼び出し側 (tokio アダプター等) が
//! `feed()` / `pending_output()` / `consume_output()` で行う。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_http1_server::{
//!     DriverConfig, Http1Driver, RequestBodyProgress, Response,
//! };
//!
//! let mut driver = Http1Driver::new(DriverConfig::default());
//! driver
//!     .feed(b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello")
//!     .unwrap();
//!
//! // ヘッダー完了時点でリクエストが引き渡される
//! let (token, request) = driver.poll_request().unwrap().unwrap();
//! assert_eq!(request.method, "POST");
//! assert!(request.body.is_empty());
//!
//! // ボディはプル型で取り出す
//! assert_eq!(
//!     driver.poll_body(token).unwrap(),
//!     RequestBodyProgress::Data(b"hello".to_vec())
//! );
//! assert!(matches!(
//!     driver.poll_body(token).unwrap(),
//!     RequestBodyProgress::Complete(_)
//! ));
//!
//! driver.respond(token, Response::new(200)).unwrap();
//! let output = driver.pending_output().to_vec();
//! assert!(output.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! driver.consume_output(output.len());
//! ```

use std::collections::VecDeque;

use crate::decoder::{BodyKind, BodyProgress, HttpHead, RequestDecoder};
use crate::encoder::{EncodeContext, ResponseEncoder};
use crate::error::{EncodeError, Error};
use crate::expect::Expect;
use crate::limits::DecoderLimits;
use crate::request::Request;
use crate::response::Response;
use crate::status::default_reason_phrase;
use crate::upgrade::Upgrade;

/// ドライバー設定
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// デコーダーの制限設定
    pub limits: DecoderLimits,
    /// パース済みで未応答のリクエスト数の上限
    ///
    /// 上限に達すると `wants_read()` が false になり、読み取りが
    /// 停止する (バックプレッシャー)。
    pub max_pipelined: usize,
    /// 消費者が引き取るまでに内部で保持するボディの水位 (デフォルト: 64KB)
    ///
    /// `poll_body()` で引き取られないボディがこの水位に達すると、
    /// フレーミングが中断され `wants_read()` が false になる。
    /// 消費者がデータを引き取ると再開する。
    pub max_body_buffer: usize,
    /// 許可する HTTP メソッド
    ///
    /// リストにないメソッドのリクエストには 501 を返す。
    /// GET と HEAD は必須であり、欠けていれば自動的に補われる。
    pub allowed_methods: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            limits: DecoderLimits::default(),
            max_pipelined: 32,
            max_body_buffer: 64 * 1024,
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// レスポンス予約のトークン
///
/// `poll_request()` が発行し、`respond()` / `poll_body()` で
/// リクエストと対応付ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseToken(u64);

/// リクエストボディの取り出し結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBodyProgress {
    /// フレーミング済みのボディデータ
    Data(Vec<u8>),
    /// ボディ完了 (トレーラー付き)
    Complete(Vec<(String, String)>),
    /// データ待ち
    Pending,
}

/// レスポンススロットの状態
#[derive(Debug)]
enum SlotState {
    /// レスポンス待ち
    Waiting,
    /// 固定レスポンスが設定済み (シリアライズ待ち)
    Ready(Response),
    /// ストリーミング送出中
    Streaming(ResponseEncoder),
}

/// パイプライン FIFO の 1 エントリ
///
/// リクエスト到着順に積まれ、先頭のスロットだけが送出される。
#[derive(Debug)]
struct Slot {
    token: u64,
    version: String,
    head_request: bool,
    keep_alive: bool,
    /// リクエストが有効な Upgrade ヘッダーを提示していたかどうか
    upgrade_offered: bool,
    /// 先行送出する中間レスポンス (100 Continue)
    interim: Vec<u8>,
    state: SlotState,
}

/// リクエストボディの受け渡しチャネル
///
/// フレーミング済みで消費者に未引き渡しのボディを保持する。
/// 末尾のチャネルだけがフレーミング中になり得る。
#[derive(Debug)]
struct BodyChannel {
    token: u64,
    /// フレーミング済み・未引き渡しのボディ
    queued: Vec<u8>,
    /// Some ならフレーミング完了 (トレーラー確定)
    trailers: Option<Vec<(String, String)>>,
    /// 消費者に届ける失敗 (切断またはパースエラー)
    error: Option<Error>,
    /// 応答済みリクエストの残りボディは読み捨てる
    discard: bool,
}

/// ドライバーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    /// リクエスト受付中
    Active,
    /// 送出完了後にクローズ (新規リクエストは受け付けない)
    Closing,
    /// 101 送出中 (フラッシュ完了待ち)
    Upgrading,
    /// アップグレード済み (ドライバーの役目は終了)
    Upgraded,
}

/// 送出バッファ
///
/// 部分書き込みに備えて送出済みオフセットを保持する。
/// 再シリアライズは発生しない。
#[derive(Debug, Default)]
struct OutputBuffer {
    buf: Vec<u8>,
    offset: usize,
}

impl OutputBuffer {
    fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.offset..]
    }

    fn consume(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.buf.len());
        if self.offset == self.buf.len() {
            self.buf.clear();
            self.offset = 0;
        }
    }

    fn is_empty(&self) -> bool {
        self.offset == self.buf.len()
    }
}

/// HTTP/1.x 接続ドライバー
#[derive(Debug)]
pub struct Http1Driver {
    config: DriverConfig,
    decoder: RequestDecoder,
    /// リクエストボディのチャネル (到着順)
    bodies: VecDeque<BodyChannel>,
    /// レスポンス順序を保証する FIFO
    slots: VecDeque<Slot>,
    next_token: u64,
    out: OutputBuffer,
    state: DriverState,
    upgrade_token: Option<u64>,
    /// ピア側が読み取りを終了した (EOF)
    peer_closed: bool,
    failed: bool,
}

impl Http1Driver {
    /// 新しいドライバーを作成
    pub fn new(mut config: DriverConfig) -> Self {
        // GET / HEAD は必須 (RFC 9110 Section 9.1)
        for required in ["GET", "HEAD"] {
            if !config.allowed_methods.iter().any(|m| m == required) {
                config.allowed_methods.push(required.to_string());
            }
        }
        let decoder = RequestDecoder::with_limits(config.limits.clone());
        Self {
            config,
            decoder,
            bodies: VecDeque::new(),
            slots: VecDeque::new(),
            next_token: 0,
            out: OutputBuffer::default(),
            state: DriverState::Active,
            upgrade_token: None,
            peer_closed: false,
            failed: false,
        }
    }

    /// 受信バイトを投入する
    ///
    /// アップグレード送出中は未消費バイトとして蓄積され、
    /// `take_upgrade()` で引き渡される。
    pub fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.state {
            DriverState::Active => self.decoder.feed(data),
            DriverState::Upgrading | DriverState::Upgraded => {
                self.decoder.feed_unchecked(data);
                Ok(())
            }
            DriverState::Closing => Ok(()),
        }
    }

    /// 現在のメッセージのボディ上限を引き上げる
    pub fn increase_body_limit(&mut self, max_body_size: usize) {
        self.decoder.increase_body_limit(max_body_size);
    }

    /// 読み取りを継続すべきかどうか
    ///
    /// パイプライン上限、バッファ水位、またはボディ消費者の未消化
    /// (`max_body_buffer`) に達した場合は false を返し、呼び出し側は
    /// ソケット読み取りを停止する (バックプレッシャー)。
    pub fn wants_read(&self) -> bool {
        matches!(self.state, DriverState::Active)
            && !self.peer_closed
            && self.slots.len() < self.config.max_pipelined
            && self.decoder.buffered_len() < self.config.limits.max_buffer_size / 2
            && !self.body_consumer_saturated()
    }

    /// ボディ消費者が水位まで引き取っていないかどうか
    fn body_consumer_saturated(&self) -> bool {
        self.bodies.back().is_some_and(|channel| {
            channel.trailers.is_none()
                && channel.error.is_none()
                && !channel.discard
                && channel.queued.len() >= self.config.max_body_buffer
        })
    }

    /// フレーミング未完了のボディが残っているかどうか
    fn has_incomplete_body(&self) -> bool {
        self.bodies
            .back()
            .is_some_and(|channel| channel.trailers.is_none() && channel.error.is_none())
    }

    /// 接続上で何も進行していないかどうか
    ///
    /// アイドルタイムアウト時の「正常な切断」判定に使う。
    /// 部分的に届いたメッセージや未応答リクエスト、未消費の
    /// ボディがあると false。
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DriverState::Active)
            && self.bodies.is_empty()
            && self.slots.is_empty()
            && self.decoder.is_idle()
            && self.out.is_empty()
    }

    /// 接続の役目が終わったかどうか
    ///
    /// 送出すべきバイトとスロットが残っていない Closing 状態、
    /// またはアップグレード完了後に true を返す。
    pub fn is_closed(&self) -> bool {
        match self.state {
            DriverState::Upgraded => true,
            DriverState::Closing => self.slots.is_empty() && self.out.is_empty(),
            DriverState::Active => {
                self.peer_closed && self.slots.is_empty() && self.out.is_empty()
            }
            DriverState::Upgrading => false,
        }
    }

    /// ピア側の EOF を通知する
    ///
    /// 読み取り中のボディには `Error::Disconnected` が設定され、
    /// 消費者の次の `poll_body()` で届く。未応答のリクエストが
    /// あればそのレスポンスは書き切ってから閉じる。
    pub fn peer_closed(&mut self) {
        self.peer_closed = true;
        // 応答済みで読み捨て中のボディはもう完了し得ない
        self.bodies.retain(|channel| !channel.discard);
        if let Some(channel) = self.bodies.back_mut() {
            if channel.trailers.is_none() && channel.error.is_none() {
                channel.error = Some(Error::Disconnected);
            }
        }
        if self.slots.is_empty() && matches!(self.state, DriverState::Active) {
            self.state = DriverState::Closing;
        }
    }

    /// パースエラーを接続に反映する
    ///
    /// エラーに対応するステータスコードのレスポンスを送出キューの
    /// 末尾に積み、以後の新規リクエスト受付を停止する。
    /// 先に届いていたリクエストのレスポンスは順序どおり送出され、
    /// 読み取り中のボディの消費者には同じエラーが届く。
    pub fn fail(&mut self, error: &Error) {
        if self.failed || !matches!(self.state, DriverState::Active) {
            return;
        }
        self.failed = true;
        if let Some(channel) = self.bodies.back_mut() {
            if channel.trailers.is_none() && channel.error.is_none() {
                channel.error = Some(error.clone());
            }
        }
        let token = self.next_token;
        self.next_token += 1;
        self.slots.push_back(Slot {
            token,
            version: "HTTP/1.1".to_string(),
            head_request: false,
            keep_alive: false,
            upgrade_offered: false,
            interim: Vec::new(),
            state: SlotState::Ready(error_response(error)),
        });
        self.state = DriverState::Closing;
    }

    /// リクエストを取り出す
    ///
    /// ヘッダーが完了した時点でリクエストを到着順に返す。ボディは
    /// 実体化されず、`poll_body()` でプル型に取り出す (`Request.body` は
    /// 空、トレーラーはボディ完了時に `poll_body()` が返す)。
    /// データ不足なら `None`。返された `ResponseToken` で `respond()` を
    /// 呼ぶことがレスポンス送出の条件になる。
    ///
    /// 現在のメッセージのボディはフレーミングされ次第内部に積まれる
    /// (`max_body_buffer` 水位まで) ため、消費者やハンドラーの完了を
    /// 待たずにパイプライン上の後続リクエストを取り出せる。
    pub fn poll_request(&mut self) -> Result<Option<(ResponseToken, Request)>, Error> {
        if !matches!(self.state, DriverState::Active) || self.peer_closed {
            return Ok(None);
        }

        // 現在のメッセージのボディを先にフレーミングする
        self.pump_current_body()?;
        if self.has_incomplete_body() {
            // ボディのフレーミングが終わるまで次のスタートラインは読めない
            return Ok(None);
        }

        if self.slots.len() >= self.config.max_pipelined {
            return Ok(None);
        }
        let Some((head, body_kind)) = self.decoder.decode_headers()? else {
            return Ok(None);
        };
        let token = self.next_token;
        self.next_token += 1;
        let upgrade_offered = head
            .get_header("Upgrade")
            .is_some_and(|value| Upgrade::parse(value).is_ok());
        let mut slot = Slot {
            token,
            version: head.version.clone(),
            head_request: head.method == "HEAD",
            keep_alive: head.is_keep_alive(),
            upgrade_offered,
            interim: Vec::new(),
            state: SlotState::Waiting,
        };

        // メソッド許可リストの検査
        if !self.config.allowed_methods.iter().any(|m| m == &head.method) {
            slot.keep_alive = false;
            slot.state = SlotState::Ready(simple_error_response(501));
            self.slots.push_back(slot);
            // ボディのフレーミングを追跡せずに閉じる
            self.state = DriverState::Closing;
            return Ok(None);
        }

        let expects_body = !matches!(body_kind, BodyKind::None | BodyKind::ContentLength(0));

        // Expect の検査 (RFC 9110 Section 10.1.1)
        if let Some(value) = head.get_header("Expect") {
            let accepted = match Expect::parse(value) {
                Ok(expect) if expect.is_only_100_continue() => {
                    // HTTP/1.0 クライアントには 100 を送ってはならない
                    if expects_body && head.version == "HTTP/1.1" {
                        slot.interim = b"HTTP/1.1 100 Continue\r\n\r\n".to_vec();
                    }
                    true
                }
                // 理解できない expectation は 417
                _ => false,
            };
            if !accepted {
                // クライアントはボディ送信を保留している可能性があるため、
                // フレーミングを追わずに 417 を返して閉じる
                slot.keep_alive = false;
                slot.state = SlotState::Ready(simple_error_response(417));
                self.slots.push_back(slot);
                self.state = DriverState::Closing;
                return Ok(None);
            }
        }

        self.slots.push_back(slot);
        if expects_body {
            self.bodies.push_back(BodyChannel {
                token,
                queued: Vec::new(),
                trailers: None,
                error: None,
                discard: false,
            });
            // 既に届いているボディをフレーミングする
            self.pump_current_body()?;
        }

        let request = Request {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            body: Vec::new(),
            trailers: Vec::new(),
        };
        Ok(Some((ResponseToken(token), request)))
    }

    /// リクエストにボディが宣言されているかどうか
    ///
    /// `poll_request()` の直後に呼ぶ。false ならボディハンドルは不要。
    pub fn has_body(&self, token: ResponseToken) -> bool {
        self.bodies.iter().any(|channel| channel.token == token.0)
    }

    /// リクエストボディを取り出す (プル型)
    ///
    /// フレーミング済みのデータを `Data` で返し、ボディが終端したら
    /// `Complete` でトレーラーを返す。データ不足なら `Pending`。
    /// ボディ読み取り中にピアが切断した場合は `Error::Disconnected`。
    ///
    /// 消費者がここでデータを引き取らない間、フレーミングは
    /// `max_body_buffer` 水位で中断される (バックプレッシャー)。
    pub fn poll_body(&mut self, token: ResponseToken) -> Result<RequestBodyProgress, Error> {
        self.pump_current_body()?;
        let Some(index) = self
            .bodies
            .iter()
            .position(|channel| channel.token == token.0)
        else {
            // ボディなし、または応答済みで解放された
            return Ok(RequestBodyProgress::Complete(Vec::new()));
        };
        if self.bodies[index].discard {
            return Ok(RequestBodyProgress::Complete(Vec::new()));
        }
        if !self.bodies[index].queued.is_empty() {
            let data = std::mem::take(&mut self.bodies[index].queued);
            return Ok(RequestBodyProgress::Data(data));
        }
        if self.bodies[index].error.is_some() {
            let error = self
                .bodies
                .remove(index)
                .and_then(|channel| channel.error)
                .unwrap_or(Error::Disconnected);
            return Err(error);
        }
        if self.bodies[index].trailers.is_some() {
            let trailers = self
                .bodies
                .remove(index)
                .and_then(|channel| channel.trailers)
                .unwrap_or_default();
            return Ok(RequestBodyProgress::Complete(trailers));
        }
        Ok(RequestBodyProgress::Pending)
    }

    /// 現在のメッセージのボディをフレーミングする
    ///
    /// フレーミング対象は常に末尾のチャネル。消費者が引き取っていない
    /// データが `max_body_buffer` に達したら中断する。
    fn pump_current_body(&mut self) -> Result<(), Error> {
        loop {
            let (discard, room) = match self.bodies.back() {
                Some(channel) if channel.trailers.is_none() && channel.error.is_none() => {
                    if channel.discard {
                        (true, usize::MAX)
                    } else {
                        (
                            false,
                            self.config
                                .max_body_buffer
                                .saturating_sub(channel.queued.len()),
                        )
                    }
                }
                _ => return Ok(()),
            };
            if room == 0 {
                // バックプレッシャー: 消費者が引き取るまでフレーミングを中断する
                return Ok(());
            }

            let available = match self.decoder.peek_body() {
                Some(data) => {
                    // 水位までしか取り込まない
                    let take = data.len().min(room);
                    if !discard {
                        if let Some(channel) = self.bodies.back_mut() {
                            channel.queued.extend_from_slice(&data[..take]);
                        }
                    }
                    take
                }
                None => 0,
            };

            let progress = if available > 0 {
                self.decoder.consume_body(available)?
            } else {
                self.decoder.progress()?
            };
            match progress {
                BodyProgress::Complete { trailers } => {
                    if discard {
                        self.bodies.pop_back();
                    } else if let Some(channel) = self.bodies.back_mut() {
                        channel.trailers = Some(trailers);
                    }
                    return Ok(());
                }
                BodyProgress::Continue => {
                    if available == 0 && self.decoder.peek_body().is_none() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// 固定レスポンスを設定する
    ///
    /// 送出順序はトークンの発行順 (リクエスト到着順) で決まり、
    /// `respond()` を呼ぶ順序には依存しない。
    pub fn respond(&mut self, token: ResponseToken, response: Response) -> Result<(), EncodeError> {
        let slot = self.slot_mut(token)?;
        if !matches!(slot.state, SlotState::Waiting) {
            return Err(EncodeError::InvalidState(
                "response already set for this token".to_string(),
            ));
        }
        slot.state = SlotState::Ready(response);
        Ok(())
    }

    /// ストリーミングレスポンスを開始する
    ///
    /// ヘッダーのみ確定し、ボディは `push_body()` / `finish_body()` で
    /// 供給する。101 はストリーミングにできない。
    pub fn respond_streaming(
        &mut self,
        token: ResponseToken,
        response: Response,
    ) -> Result<(), EncodeError> {
        if response.status_code == 101 {
            return Err(EncodeError::InvalidState(
                "101 response cannot be streamed".to_string(),
            ));
        }
        let slot = self.slot_mut(token)?;
        if !matches!(slot.state, SlotState::Waiting) {
            return Err(EncodeError::InvalidState(
                "response already set for this token".to_string(),
            ));
        }
        let encoder = {
            let ctx = EncodeContext {
                request_version: slot.version.as_str(),
                head_request: slot.head_request,
                request_keep_alive: slot.keep_alive,
            };
            ResponseEncoder::streaming(&response, &ctx)?
        };
        slot.state = SlotState::Streaming(encoder);
        Ok(())
    }

    /// ストリーミングレスポンスにボディデータを追記する
    pub fn push_body(&mut self, token: ResponseToken, data: &[u8]) -> Result<(), EncodeError> {
        match &mut self.slot_mut(token)?.state {
            SlotState::Streaming(encoder) => encoder.push_chunk(data),
            _ => Err(EncodeError::InvalidState(
                "not a streaming response".to_string(),
            )),
        }
    }

    /// ストリーミングレスポンスを終端する
    ///
    /// トレーラーはボディ完了後にのみ送出される (chunked のみ)。
    pub fn finish_body(
        &mut self,
        token: ResponseToken,
        trailers: &[(String, String)],
    ) -> Result<(), EncodeError> {
        match &mut self.slot_mut(token)?.state {
            SlotState::Streaming(encoder) => encoder.finish(trailers),
            _ => Err(EncodeError::InvalidState(
                "not a streaming response".to_string(),
            )),
        }
    }

    fn slot_mut(&mut self, token: ResponseToken) -> Result<&mut Slot, EncodeError> {
        self.slots
            .iter_mut()
            .find(|slot| slot.token == token.0)
            .ok_or_else(|| EncodeError::InvalidState("unknown response token".to_string()))
    }

    /// 送出待ちバイトを取得
    ///
    /// FIFO 先頭のスロットから順にシリアライズされる。
    /// 部分書き込み後は `consume_output()` で進めてから再取得する。
    pub fn pending_output(&mut self) -> &[u8] {
        self.pump();
        self.out.pending()
    }

    /// 送出済みバイト数を進める
    pub fn consume_output(&mut self, n: usize) {
        self.out.consume(n);
    }

    /// アップグレードの完了を確認し、未消費バイトを引き取る
    ///
    /// 101 レスポンスの全バイトが `consume_output()` で消費された後に
    /// `Some` を返す。以後このドライバーは接続に関与しない。
    /// ソケットの所有権は呼び出し側の継続処理に移る。
    pub fn take_upgrade(&mut self) -> Option<(ResponseToken, Vec<u8>)> {
        self.pump();
        if matches!(self.state, DriverState::Upgrading) && self.out.is_empty() {
            self.state = DriverState::Upgraded;
            let token = self.upgrade_token.take()?;
            let leftover = self.decoder.remaining().to_vec();
            self.decoder.reset();
            Some((ResponseToken(token), leftover))
        } else {
            None
        }
    }

    /// FIFO 先頭から送出可能なレスポンスをシリアライズする
    fn pump(&mut self) {
        loop {
            let Some(front) = self.slots.front_mut() else {
                break;
            };

            // 中間レスポンス (100 Continue) は本レスポンスより先に送出する
            if !front.interim.is_empty() {
                let interim = std::mem::take(&mut front.interim);
                self.out.extend(&interim);
            }

            if matches!(front.state, SlotState::Waiting) {
                break;
            }

            let (close, upgrade, token) = if matches!(front.state, SlotState::Ready(_)) {
                let token = front.token;
                let head_request = front.head_request;
                let keep_alive = front.keep_alive;
                let upgrade_offered = front.upgrade_offered;
                let version = std::mem::take(&mut front.version);
                let SlotState::Ready(response) =
                    std::mem::replace(&mut front.state, SlotState::Waiting)
                else {
                    break;
                };
                let ctx = EncodeContext {
                    request_version: &version,
                    head_request,
                    request_keep_alive: keep_alive,
                };
                // クライアントが Upgrade を提示していないリクエストに
                // 101 は返せない (RFC 9110 Section 7.8)
                let response = if response.status_code == 101 && !upgrade_offered {
                    simple_error_response(500)
                } else {
                    response
                };
                let is_upgrade = response.status_code == 101;
                let (bytes, close) = match ResponseEncoder::new(&response, &ctx) {
                    Ok(mut encoder) => (encoder.take_pending(), encoder.should_close()),
                    Err(_) => {
                        // ハンドラー供給のレスポンスが不正: 500 に差し替えて閉じる
                        match ResponseEncoder::new(&simple_error_response(500), &ctx) {
                            Ok(mut encoder) => (encoder.take_pending(), true),
                            Err(_) => (
                                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                    .to_vec(),
                                true,
                            ),
                        }
                    }
                };
                self.out.extend(&bytes);
                (close && !is_upgrade, is_upgrade, token)
            } else {
                let token = front.token;
                let SlotState::Streaming(encoder) = &mut front.state else {
                    break;
                };
                let bytes = encoder.take_pending();
                self.out.extend(&bytes);
                if encoder.is_finished() {
                    (encoder.should_close(), false, token)
                } else {
                    break;
                }
            };

            self.slots.pop_front();
            self.release_body(token);

            if upgrade {
                // アップグレード後のパイプラインリクエストは無効
                self.state = DriverState::Upgrading;
                self.upgrade_token = Some(token);
                self.slots.clear();
                self.bodies.clear();
                break;
            }
            if close {
                self.state = DriverState::Closing;
                self.slots.clear();
                self.bodies.clear();
                break;
            }
        }
    }

    /// 応答を書き切ったリクエストのボディチャネルを解放する
    ///
    /// フレーミングが未完了なら、keep-alive のフレーミングを守るために
    /// 残りを読み捨てる (discard モード)。
    fn release_body(&mut self, token: u64) {
        let Some(index) = self
            .bodies
            .iter()
            .position(|channel| channel.token == token)
        else {
            return;
        };
        let done =
            self.bodies[index].trailers.is_some() || self.bodies[index].error.is_some();
        if done {
            self.bodies.remove(index);
        } else {
            let channel = &mut self.bodies[index];
            channel.discard = true;
            channel.queued.clear();
        }
    }
}

/// パースエラーに対応するエラーレスポンスを作成
///
/// ステータスコードは `Error::status_code()` に従う。
/// 接続は回復不能とみなし、常に `Connection: close` を含む。
pub fn error_response(error: &Error) -> Response {
    simple_error_response(error.status_code())
}

/// 最小限の HTML エラーページを作成
fn simple_error_response(status_code: u16) -> Response {
    let reason = default_reason_phrase(status_code);
    let body = format!(
        "<html><head><title>{status_code} {reason}</title></head><body><h1>{status_code} {reason}</h1></body></html>\n"
    );
    Response::new(status_code)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Connection", "close")
        .body(body.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(driver: &mut Http1Driver) -> Vec<u8> {
        let bytes = driver.pending_output().to_vec();
        driver.consume_output(bytes.len());
        bytes
    }

    /// ボディを `poll_body()` で読み切る
    fn read_body(driver: &mut Http1Driver, token: ResponseToken) -> (Vec<u8>, Vec<(String, String)>) {
        let mut body = Vec::new();
        loop {
            match driver.poll_body(token).unwrap() {
                RequestBodyProgress::Data(data) => body.extend_from_slice(&data),
                RequestBodyProgress::Complete(trailers) => return (body, trailers),
                RequestBodyProgress::Pending => panic!("body should be complete"),
            }
        }
    }

    #[test]
    fn simple_request_response() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();

        let (token, request) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert!(!driver.has_body(token));
        assert!(matches!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Complete(trailers) if trailers.is_empty()
        ));
        assert!(driver.pending_output().is_empty());

        driver
            .respond(token, Response::new(200).body(b"hello".to_vec()))
            .unwrap();
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hello"));
        assert!(!driver.is_closed());
        assert!(driver.is_idle());
    }

    #[test]
    fn request_handed_off_at_headers_before_body() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST /upload HTTP/1.1\r\nHost: a\r\nContent-Length: 10\r\n\r\n")
            .unwrap();

        // ボディが 1 バイトも届いていなくてもリクエストは引き渡される
        let (token, request) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request.uri, "/upload");
        assert!(request.body.is_empty());
        assert!(driver.has_body(token));
        assert_eq!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Pending
        );

        driver.feed(b"hello").unwrap();
        assert_eq!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Data(b"hello".to_vec())
        );
        assert_eq!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Pending
        );

        driver.feed(b"world").unwrap();
        let (rest, trailers) = read_body(&mut driver, token);
        assert_eq!(rest, b"world");
        assert!(trailers.is_empty());
    }

    #[test]
    fn chunked_body_trailers_via_poll_body() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\nX-Checksum: abc\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        let (body, trailers) = read_body(&mut driver, token);
        assert_eq!(body, b"hello");
        assert_eq!(
            trailers,
            vec![("X-Checksum".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn pipelining_continues_once_body_framed_without_consumer() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST /1 HTTP/1.1\r\nHost: a\r\nContent-Length: 3\r\n\r\nabcGET /2 HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();

        let (token1, request1) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request1.uri, "/1");

        // 1 番目のボディを誰も消費していなくても、フレーミング済みなら
        // 2 番目のスタートラインのパースは進む
        let (_token2, request2) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request2.uri, "/2");

        let (body, _) = read_body(&mut driver, token1);
        assert_eq!(body, b"abc");
    }

    #[test]
    fn body_backpressure_suspends_framing_until_consumer_drains() {
        let config = DriverConfig {
            max_body_buffer: 4,
            ..DriverConfig::default()
        };
        let mut driver = Http1Driver::new(config);
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 10\r\n\r\n0123456789")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();

        // 消費者が引き取るまで水位でフレーミングが止まり、読み取りも止まる
        assert!(!driver.wants_read());
        match driver.poll_body(token).unwrap() {
            RequestBodyProgress::Data(data) => assert_eq!(data, b"0123"),
            progress => panic!("unexpected progress: {progress:?}"),
        }

        // 引き取られた分だけフレーミングが再開する
        let (rest, _) = read_body(&mut driver, token);
        assert_eq!(rest, b"456789");
        assert!(driver.wants_read());
    }

    #[test]
    fn peer_close_mid_body_fails_body_read() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 10\r\n\r\nhalf")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        assert_eq!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Data(b"half".to_vec())
        );

        driver.peer_closed();
        assert!(matches!(
            driver.poll_body(token),
            Err(Error::Disconnected)
        ));

        // ハンドラーは切断を認識した上で応答でき、書き切ってから閉じる
        driver.respond(token, Response::new(400)).unwrap();
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn unread_body_discarded_after_response() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 10\r\n\r\nhead")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();

        // ボディを読まずに応答した場合、残りは読み捨てられる
        driver.respond(token, Response::new(204)).unwrap();
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 204 No Content\r\n"));

        // 残りのボディと後続リクエストが届いてもフレーミングは崩れない
        driver.feed(b"middle").unwrap();
        assert!(driver.poll_request().unwrap().is_none());
        driver
            .feed(b"GET /next HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (_token2, request2) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request2.uri, "/next");
    }

    #[test]
    fn pipelined_responses_written_in_request_order() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET /1 HTTP/1.1\r\nHost: a\r\n\r\nGET /2 HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();

        let (token1, request1) = driver.poll_request().unwrap().unwrap();
        let (token2, request2) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request1.uri, "/1");
        assert_eq!(request2.uri, "/2");

        // 2 番目のハンドラーが先に完了しても出力は出ない
        driver
            .respond(token2, Response::new(200).body(b"second".to_vec()))
            .unwrap();
        assert!(driver.pending_output().is_empty());

        // 1 番目が完了した時点で両方が順序どおりに送出される
        driver
            .respond(token1, Response::new(200).body(b"first".to_vec()))
            .unwrap();
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        let first_pos = text.find("first").unwrap();
        let second_pos = text.find("second").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn expect_100_continue_interim_before_body_release() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(
                b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n",
            )
            .unwrap();

        // ヘッダー時点でリクエストは引き渡され、100 Continue が先に送出される
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        assert_eq!(
            driver.poll_body(token).unwrap(),
            RequestBodyProgress::Pending
        );
        let interim = drain(&mut driver);
        assert!(interim.starts_with(b"HTTP/1.1 100 Continue\r\n\r\n"));

        driver.feed(b"hello").unwrap();
        let (body, _) = read_body(&mut driver, token);
        assert_eq!(body, b"hello");

        driver.respond(token, Response::new(204)).unwrap();
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 204 No Content\r\n"));
    }

    #[test]
    fn expect_100_continue_not_sent_to_http10() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.0\r\nContent-Length: 2\r\nExpect: 100-continue\r\n\r\nok")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        let (body, _) = read_body(&mut driver, token);
        assert_eq!(body, b"ok");
        assert!(driver.pending_output().is_empty());
    }

    #[test]
    fn unknown_expectation_gets_417() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nExpect: x-magic\r\n\r\n")
            .unwrap();
        assert!(driver.poll_request().unwrap().is_none());
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        assert!(text.starts_with("HTTP/1.1 417 Expectation Failed\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn method_not_in_allow_list_gets_501() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"BREW / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        assert!(driver.poll_request().unwrap().is_none());
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 501 Not Implemented\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn get_and_head_always_allowed() {
        let config = DriverConfig {
            allowed_methods: vec!["POST".to_string()],
            ..DriverConfig::default()
        };
        let driver = Http1Driver::new(config);
        assert!(driver.config.allowed_methods.iter().any(|m| m == "GET"));
        assert!(driver.config.allowed_methods.iter().any(|m| m == "HEAD"));
    }

    #[test]
    fn parse_error_produces_error_response_and_close() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver.feed(b"NOT AN HTTP REQUEST\r\n\r\n").unwrap();
        let error = driver.poll_request().unwrap_err();
        assert_eq!(error.status_code(), 400);

        driver.fail(&error);
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn error_response_after_pending_response() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\nGARBAGE\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        let error = driver.poll_request().unwrap_err();
        driver.fail(&error);

        // 先行リクエストのレスポンスがエラーレスポンスより先に送出される
        driver
            .respond(token, Response::new(200).body(b"ok".to_vec()))
            .unwrap();
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        let ok_pos = text.find("HTTP/1.1 200 OK").unwrap();
        let err_pos = text.find("HTTP/1.1 400 Bad Request").unwrap();
        assert!(ok_pos < err_pos);
        assert!(driver.is_closed());
    }

    #[test]
    fn chunk_syntax_error_reaches_body_consumer() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();

        // 不正なチャンクサイズ行
        driver.feed(b"zz\r\n").unwrap();
        let error = driver.poll_body(token).unwrap_err();
        assert!(matches!(error, Error::InvalidChunk(_)));

        // 接続全体の失敗は fail() で反映する
        driver.fail(&error);
        // 以後の poll_body には記録済みのエラーが届く
        assert!(driver.poll_body(token).is_err());
    }

    #[test]
    fn upgrade_hands_over_leftover_bytes() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET /ws HTTP/1.1\r\nHost: a\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n")
            .unwrap();
        let (token, request) = driver.poll_request().unwrap().unwrap();
        assert_eq!(request.get_header("Upgrade"), Some("websocket"));

        driver
            .respond(
                token,
                Response::new(101)
                    .header("Upgrade", "websocket")
                    .header("Connection", "Upgrade"),
            )
            .unwrap();

        // アップグレード後プロトコルのバイトが既に届いている
        driver.feed(b"\x81\x05hello").unwrap();

        // フラッシュ完了までは引き渡されない
        assert!(driver.take_upgrade().is_none());
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 101 Switching Protocols\r\n"));

        let (upgrade_token, leftover) = driver.take_upgrade().unwrap();
        assert_eq!(upgrade_token, token);
        assert_eq!(leftover, b"\x81\x05hello");
        assert!(driver.is_closed());
    }

    #[test]
    fn upgrade_without_offer_is_replaced_with_500() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        driver.respond(token, Response::new(101)).unwrap();
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(driver.take_upgrade().is_none());
        assert!(driver.is_closed());
    }

    #[test]
    fn streaming_response_with_chunked_body() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();

        driver.respond_streaming(token, Response::new(200)).unwrap();
        let head = drain(&mut driver);
        assert!(
            String::from_utf8_lossy(&head).contains("Transfer-Encoding: chunked\r\n")
        );

        driver.push_body(token, b"hello").unwrap();
        assert_eq!(drain(&mut driver), b"5\r\nhello\r\n");

        driver.finish_body(token, &[]).unwrap();
        assert_eq!(drain(&mut driver), b"0\r\n\r\n");
        assert!(driver.is_idle());
    }

    #[test]
    fn head_request_response_has_no_body() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"HEAD / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        driver
            .respond(token, Response::new(200).body(b"hello".to_vec()))
            .unwrap();
        let output = drain(&mut driver);
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn connection_close_response_closes_driver() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (token, request) = driver.poll_request().unwrap().unwrap();
        assert!(!request.is_keep_alive());
        driver.respond(token, Response::new(200)).unwrap();
        let output = drain(&mut driver);
        assert!(String::from_utf8_lossy(&output).contains("Connection: close\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn max_pipelined_applies_backpressure() {
        let config = DriverConfig {
            max_pipelined: 2,
            ..DriverConfig::default()
        };
        let mut driver = Http1Driver::new(config);
        for _ in 0..3 {
            driver
                .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
                .unwrap();
        }
        assert!(driver.poll_request().unwrap().is_some());
        assert!(driver.poll_request().unwrap().is_some());
        // 上限に達したため 3 番目は取り出せず、読み取りも止まる
        assert!(driver.poll_request().unwrap().is_none());
        assert!(!driver.wants_read());
    }

    #[test]
    fn peer_close_with_pending_response_flushes_first() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        driver.peer_closed();
        assert!(!driver.is_closed());
        driver.respond(token, Response::new(200)).unwrap();
        let output = drain(&mut driver);
        assert!(output.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(driver.is_closed());
    }

    #[test]
    fn partial_output_consumption_resumes() {
        let mut driver = Http1Driver::new(DriverConfig::default());
        driver
            .feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .unwrap();
        let (token, _request) = driver.poll_request().unwrap().unwrap();
        driver
            .respond(token, Response::new(200).body(b"hello".to_vec()))
            .unwrap();

        let total = driver.pending_output().to_vec();
        // 1 バイトずつの部分書き込みをシミュレート
        let mut written = Vec::new();
        while !driver.pending_output().is_empty() {
            written.push(driver.pending_output()[0]);
            driver.consume_output(1);
        }
        assert_eq!(written, total);
    }
}
