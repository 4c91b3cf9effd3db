#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_http1_server::{DriverConfig, Http1Driver, RequestBodyProgress, Response};

fuzz_target!(|data: &[u8]| {
    // 任意のバイト列に対してドライバーが panic しないこと、
    // またエラー後もエラーレスポンスの送出と終了まで進むことを確認する
    let mut driver = Http1Driver::new(DriverConfig::default());

    for chunk in data.chunks(11) {
        if let Err(error) = driver.feed(chunk) {
            driver.fail(&error);
            break;
        }
        loop {
            match driver.poll_request() {
                Ok(Some((token, _request))) => {
                    // ボディをプル型で読み進める (途中で応答するケースも混ぜる)
                    loop {
                        match driver.poll_body(token) {
                            Ok(RequestBodyProgress::Data(_)) => {}
                            Ok(RequestBodyProgress::Complete(_))
                            | Ok(RequestBodyProgress::Pending) => break,
                            Err(error) => {
                                driver.fail(&error);
                                break;
                            }
                        }
                    }
                    let _ = driver.respond(token, Response::new(200));
                }
                Ok(None) => break,
                Err(error) => {
                    driver.fail(&error);
                    break;
                }
            }
        }
        let n = driver.pending_output().len();
        driver.consume_output(n);
        if driver.is_closed() {
            return;
        }
    }

    driver.peer_closed();
    let n = driver.pending_output().len();
    driver.consume_output(n);
});
