//! PBT テスト共通ユーティリティ
//!
//! HTTP メッセージ生成の Strategy を各プロパティテストで共有する。

use proptest::prelude::*;

// ========================================
// トークン / ヘッダー生成
// ========================================

/// トークン文字 (控えめなサブセット)
pub fn token_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
    ]
}

/// トークン文字列
pub fn token_string(max_len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(token_char(), 1..=max_len)
        .prop_map(|chars| chars.into_iter().collect())
}

/// ヘッダー名
///
/// フレーミングヘッダー (Content-Length, Transfer-Encoding, Host 等) と
/// 衝突しないように "x-" プレフィックスを付ける。
pub fn header_name() -> impl Strategy<Value = String> {
    token_string(24).prop_map(|name| format!("x-{name}"))
}

/// ヘッダー値
///
/// デコード時に前後の空白が除去されるため、両端が可視文字の値のみを
/// 生成する (ラウンドトリップ同値性のため)。
pub fn header_value() -> impl Strategy<Value = String> {
    "[!-~]([ -~]{0,30}[!-~])?".prop_map(|s| s)
}

/// ヘッダーリスト
pub fn headers() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((header_name(), header_value()), 0..8)
}

/// トレーラーリスト (禁止フィールドを含まない)
pub fn trailers() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((header_name(), header_value()), 0..4)
}

// ========================================
// メッセージ要素生成
// ========================================

/// HTTP メソッド
pub fn http_method() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("GET".to_string()),
        Just("POST".to_string()),
        Just("PUT".to_string()),
        Just("DELETE".to_string()),
        Just("OPTIONS".to_string()),
        Just("PATCH".to_string()),
    ]
}

/// リクエストターゲット (origin-form)
pub fn http_uri() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/".to_string()),
        "/[a-zA-Z0-9/_.-]{1,48}".prop_map(|s| s),
        "/[a-zA-Z0-9/_.-]{1,32}\\?[a-zA-Z0-9=&_-]{1,32}".prop_map(|s| s),
    ]
}

/// ボディを持てるステータスコード
pub fn body_status_code() -> impl Strategy<Value = u16> {
    prop_oneof![
        Just(200u16),
        Just(201u16),
        Just(206u16),
        Just(301u16),
        Just(400u16),
        Just(404u16),
        Just(500u16),
        Just(503u16),
    ]
}

/// ボディ
pub fn body() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..256)
}

/// chunked 用のチャンク列 (空チャンクなし)
pub fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..64), 0..8)
}

/// 分割 feed のチャンクサイズ
pub fn split_size() -> impl Strategy<Value = usize> {
    1usize..=32
}
