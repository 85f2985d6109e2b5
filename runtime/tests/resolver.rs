//! Product resolution against a mocked storefront catalog.

use std::time::Duration;

use dropcart::Site;
use dropcart_runtime::error::ResolveError;
use dropcart_runtime::storefront::{HttpClient, ProductResolver};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn inputs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn client() -> HttpClient {
    HttpClient::new(Duration::from_secs(5), None).unwrap()
}

fn catalog() -> serde_json::Value {
    json!({"products": [
        {"id": 1, "title": "Dunk Low Kids", "handle": "dunk-low-kids",
         "variants": [{"id": 11, "title": "4Y", "option1": "4Y", "available": true, "price": "90.00"}]},
        {"id": 2, "title": "Dunk Low Retro", "handle": "dunk-low-retro",
         "variants": [
            {"id": 21, "title": "9", "option1": "9", "available": false, "price": "110.00"},
            {"id": 22, "title": "10", "option1": "10", "available": true, "price": "110.00"},
            {"id": 23, "title": "10.5", "option1": "10.5", "available": true, "price": "110.00"}
         ]}
    ]})
}

#[tokio::test]
async fn test_keywords_pick_matching_product_and_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
        .expect(1)
        .mount(&server)
        .await;

    let site = Site::new("Mock", server.uri());
    let client = client();
    let resolver = ProductResolver::new(&client, &site);

    let resolved = resolver
        .resolve(&inputs(&["+dunk,+low,-kids"]), &inputs(&["10"]))
        .await
        .unwrap();
    assert_eq!(resolved.product.as_ref().map(|p| p.id), Some(2));
    assert_eq!(resolved.variant.id, 22);
}

#[tokio::test]
async fn test_keywords_without_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
        .mount(&server)
        .await;

    let site = Site::new("Mock", server.uri());
    let client = client();
    let err = ProductResolver::new(&client, &site)
        .resolve(&inputs(&["+jordan"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NotFound));
}

#[tokio::test]
async fn test_product_url_input() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/dunk-low-retro.js"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2, "title": "Dunk Low Retro", "handle": "dunk-low-retro",
            "variants": [{"id": 21, "title": "9", "option1": "9", "available": false}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/gone.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let site = Site::new("Mock", server.uri());
    let client = client();
    let resolver = ProductResolver::new(&client, &site);

    let url = format!("{}/products/dunk-low-retro?variant=21", server.uri());
    let resolved = resolver.resolve(&inputs(&[&url]), &[]).await.unwrap();
    // Sold out variants are still eligible when nothing is available.
    assert_eq!(resolved.variant.id, 21);

    let gone = format!("{}/products/gone", server.uri());
    let err = resolver.resolve(&inputs(&[&gone]), &[]).await.unwrap_err();
    assert!(matches!(err, ResolveError::NotFound));
}

#[tokio::test]
async fn test_size_filter_without_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
        .mount(&server)
        .await;

    let site = Site::new("Mock", server.uri());
    let client = client();
    let err = ProductResolver::new(&client, &site)
        .resolve(&inputs(&["+retro"]), &inputs(&["13"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoVariant));
}

#[tokio::test]
async fn test_variant_identifiers_need_no_request() {
    let site = Site::new("Mock", "http://127.0.0.1:9");
    let client = client();
    let resolver = ProductResolver::new(&client, &site);

    let resolved = resolver.resolve(&inputs(&["39924754202706"]), &[]).await.unwrap();
    assert_eq!(resolved.variant.id, 39924754202706);
    assert!(resolved.product.is_none());

    let err = resolver.resolve(&inputs(&["abc123"]), &[]).await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidIdentifier(_)));

    let err = resolver.resolve(&[], &[]).await.unwrap_err();
    assert!(matches!(err, ResolveError::NotFound));
}
