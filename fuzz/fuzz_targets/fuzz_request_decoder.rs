#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_http1_server::{BodyKind, BodyProgress, RequestDecoder};

fn exercise(decoder: &mut RequestDecoder) {
    if let Ok(Some((_, body_kind))) = decoder.decode_headers() {
        match body_kind {
            BodyKind::ContentLength(_) | BodyKind::Chunked | BodyKind::CloseDelimited => loop {
                if let Some(body_data) = decoder.peek_body() {
                    let len = body_data.len();
                    match decoder.consume_body(len) {
                        Ok(BodyProgress::Complete { .. }) => break,
                        Ok(BodyProgress::Continue) => {}
                        Err(_) => break,
                    }
                } else {
                    match decoder.progress() {
                        Ok(BodyProgress::Complete { .. }) => break,
                        Ok(BodyProgress::Continue) => {
                            if decoder.peek_body().is_none() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            },
            BodyKind::None => {}
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // データを一度に feed
    let mut decoder = RequestDecoder::new();
    if decoder.feed(data).is_ok() {
        exercise(&mut decoder);
    }

    // データを分割して feed (ストリーミングシナリオ)
    let mut decoder = RequestDecoder::new();
    for chunk in data.chunks(17) {
        if decoder.feed(chunk).is_err() {
            return;
        }
        if decoder.decode().is_err() {
            return;
        }
    }
});
