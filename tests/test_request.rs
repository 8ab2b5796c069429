use std::collections::HashMap;

use switchboard::http::request::{Method, Request, RequestBuilder};

fn request(path: &str, headers: &[(&str, &str)]) -> Request {
    let headers: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Request {
        method: Method::GET,
        path: path.to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
    }
}

#[test]
fn test_request_header_retrieval_is_case_insensitive() {
    let req = request("/", &[("Host", "example.com"), ("Content-Type", "application/json")]);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_parsing() {
    let req = request("/api", &[("Content-Length", "42")]);
    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = request("/", &[]);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_content_length_invalid() {
    let req = request("/api", &[("Content-Length", "not-a-number")]);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_path_components_drop_empty_segments() {
    assert_eq!(
        request("/example/api/ping", &[]).path_components(),
        vec!["example", "api", "ping"]
    );
    assert_eq!(request("/", &[]).path_components(), Vec::<&str>::new());
    assert_eq!(request("/a//b/", &[]).path_components(), vec!["a", "b"]);
}

#[test]
fn test_path_components_keep_query_in_last_segment() {
    assert_eq!(
        request("/api/search?q=rust", &[]).path_components(),
        vec!["api", "search?q=rust"]
    );
}

#[test]
fn test_keep_alive_default_and_close() {
    assert!(request("/", &[]).keep_alive());
    assert!(request("/", &[("Connection", "keep-alive")]).keep_alive());
    assert!(!request("/", &[("Connection", "close")]).keep_alive());
}

#[test]
fn test_method_parsing() {
    assert_eq!(Method::from_str("GET"), Method::GET);
    assert_eq!(Method::from_str("DELETE"), Method::DELETE);
    assert_eq!(Method::from_str("BREW"), Method::Other("BREW".to_string()));
}

#[test]
fn test_only_post_and_put_forward_bodies() {
    assert!(Method::POST.forwards_body());
    assert!(Method::PUT.forwards_body());
    assert!(!Method::GET.forwards_body());
    assert!(!Method::DELETE.forwards_body());
    assert!(!Method::Other("BREW".to_string()).forwards_body());
}

#[test]
fn test_builder_defaults_version() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/x")
        .build()
        .unwrap();

    assert_eq!(req.version, "HTTP/1.1");
}

#[test]
fn test_builder_requires_method_and_path() {
    assert!(RequestBuilder::new().path("/x").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}
