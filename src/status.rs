//! ステータスコードのデフォルト reason-phrase (RFC 9110 Section 15)

/// ステータスコードからデフォルトの reason-phrase を取得
///
/// RFC 9112 Section 4: reason-phrase は省略可能であり、受信側は
/// 無視してよい。エンコーダーは reason-phrase が空の場合にこの
/// テーブルの値を補う。未知のコードにはクラス別の汎用句を返す。
pub fn default_reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        421 => "Misdirected Request",
        422 => "Unprocessable Content",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => match status_code {
            100..=199 => "Informational",
            200..=299 => "Success",
            300..=399 => "Redirection",
            400..=499 => "Client Error",
            _ => "Server Error",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(default_reason_phrase(200), "OK");
        assert_eq!(default_reason_phrase(404), "Not Found");
        assert_eq!(default_reason_phrase(414), "URI Too Long");
        assert_eq!(default_reason_phrase(431), "Request Header Fields Too Large");
        assert_eq!(default_reason_phrase(505), "HTTP Version Not Supported");
    }

    #[test]
    fn unknown_codes_fall_back_to_class() {
        assert_eq!(default_reason_phrase(299), "Success");
        assert_eq!(default_reason_phrase(499), "Client Error");
        assert_eq!(default_reason_phrase(599), "Server Error");
    }
}
