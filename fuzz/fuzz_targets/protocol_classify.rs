#![no_main]

use axum::body::Body;
use gatehouse_server::mux::GRPC_CONTENT_TYPE;
use gatehouse_server::Protocol;
use http::{header::CONTENT_TYPE, HeaderValue, Request, Version};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the HTTP version, the rest is the content-type value.
    // Tests handling of:
    // - Arbitrary (non-UTF-8) header bytes
    // - The token at every offset, or split across garbage
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };

    let version = match selector % 5 {
        0 => Version::HTTP_09,
        1 => Version::HTTP_10,
        2 => Version::HTTP_11,
        3 => Version::HTTP_2,
        _ => Version::HTTP_3,
    };

    let mut request = Request::builder().version(version).body(Body::empty()).unwrap();
    if let Ok(value) = HeaderValue::from_bytes(rest) {
        request.headers_mut().insert(CONTENT_TYPE, value);
    }

    let has_token = request
        .headers()
        .get(CONTENT_TYPE)
        .map(|v| {
            v.as_bytes()
                .windows(GRPC_CONTENT_TYPE.len())
                .any(|w| w == GRPC_CONTENT_TYPE.as_bytes())
        })
        .unwrap_or(false);

    let expected = if version == Version::HTTP_2 && has_token {
        Protocol::Grpc
    } else {
        Protocol::Http
    };
    assert_eq!(Protocol::classify(&request), expected);
});
