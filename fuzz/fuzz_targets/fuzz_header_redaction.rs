#![no_main]

//! Fuzz target for header redaction in logs.
//!
//! Attack surface: malformed UTF-8, long values, hostile header counts.

use arbitrary::Arbitrary;
use http::HeaderMap;
use libfuzzer_sys::fuzz_target;
use siftgate::logging_layer;

#[derive(Arbitrary, Debug)]
struct FuzzHeaders {
    headers: Vec<(Vec<u8>, Vec<u8>)>,
}

fuzz_target!(|input: FuzzHeaders| {
    fuzz_header_sanitization(input);
});

fn fuzz_header_sanitization(input: FuzzHeaders) {
    let mut header_map = HeaderMap::new();
    for (name, value) in input.headers.iter().take(100) {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name),
            http::header::HeaderValue::from_bytes(value),
        ) {
            header_map.insert(name, value);
        }
    }

    // Formatting must never panic
    let _ = format!("{:?}", logging_layer::sanitize_headers(&header_map));

    // A lone sensitive header renders as nothing but the marker
    for sensitive in logging_layer::SENSITIVE_HEADERS {
        let Some(value) = header_map.get(*sensitive) else {
            continue;
        };
        let mut single = HeaderMap::new();
        single.insert(*sensitive, value.clone());
        assert_eq!(
            format!("{:?}", logging_layer::sanitize_headers(&single)),
            format!("{{{:?}: \"[REDACTED]\"}}", sensitive)
        );
    }
}
