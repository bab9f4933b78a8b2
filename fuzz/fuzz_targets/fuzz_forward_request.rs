#![no_main]

//! Fuzz target for building backend requests from inbound ones.
//!
//! Attack surface: odd paths and queries, forged credential headers,
//! arbitrary bodies. Checks the forwarding invariants hold for every input
//! the inbound URI parser accepts.

use arbitrary::Arbitrary;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use libfuzzer_sys::fuzz_target;
use siftgate::config::{Credential, GatewayConfig};
use siftgate::forward::{ForwardRequest, InboundBody};
use url::Url;

const SECRET: &str = "fuzz-secret";

#[derive(Arbitrary, Debug)]
struct FuzzRequest {
    method: u8,
    path: String,
    query: Option<String>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzRequest| {
    fuzz_forward(input);
});

fn fuzz_forward(input: FuzzRequest) {
    let Ok(backend) = Url::parse("http://backend:8080/v1") else {
        return;
    };
    let Ok(credential) = Credential::new(SECRET) else {
        return;
    };
    let config = GatewayConfig::new(backend, credential);

    let method = match input.method % 5 {
        0 => Method::GET,
        1 => Method::HEAD,
        2 => Method::POST,
        3 => Method::PUT,
        _ => Method::DELETE,
    };

    let mut raw = format!("/api/sift/{}", input.path);
    if let Some(query) = &input.query {
        raw.push('?');
        raw.push_str(query);
    }
    let Ok(uri) = raw.parse::<Uri>() else {
        return;
    };

    let mut headers = HeaderMap::new();
    for (name, value) in input.headers.iter().take(64) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name),
            HeaderValue::from_bytes(value),
        ) {
            headers.append(name, value);
        }
    }

    let body = InboundBody::from_bytes(Bytes::from(input.body));
    let Ok(request) = ForwardRequest::from_inbound(method.clone(), &uri, &headers, body, &config)
    else {
        return;
    };

    // Credential is always the server's, exactly once
    let keys: Vec<_> = request.headers.get_all("x-api-key").iter().collect();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].as_bytes(), SECRET.as_bytes());

    assert!(request.headers.get("host").is_none());

    if method == Method::GET || method == Method::HEAD {
        assert!(request.body.is_none());
    }

    assert_eq!(request.target.query(), uri.query());
}
