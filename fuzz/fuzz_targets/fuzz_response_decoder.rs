#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_http1_server::ResponseDecoder;

fuzz_target!(|data: &[u8]| {
    // データを一度に feed
    let mut decoder = ResponseDecoder::new();
    if decoder.feed(data).is_ok() {
        let _ = decoder.decode();
        // close-delimited の可能性があるため EOF を通知して再度デコード
        decoder.mark_eof();
        let _ = decoder.decode();
    }

    // データを分割して feed (ストリーミングシナリオ)
    let mut decoder = ResponseDecoder::new();
    for chunk in data.chunks(13) {
        if decoder.feed(chunk).is_err() {
            return;
        }
        if decoder.decode().is_err() {
            return;
        }
    }
    decoder.mark_eof();
    let _ = decoder.decode();
});
