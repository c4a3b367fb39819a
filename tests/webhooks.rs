use hmac::{Hmac, Mac};
use httpmock::prelude::*;
use mailgun_client::{Client, Config, Error, Signature};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;

const EXAMPLE_DOMAIN: &str = "testDomain";
const EXAMPLE_API_KEY: &str = "testAPIKey";
const BOUNDARY: &str = "------------------------d74496d66958873e";

fn client(server: &MockServer) -> Client {
    Client::builder(Config::new(EXAMPLE_DOMAIN, EXAMPLE_API_KEY))
        .api_base(server.base_url())
        .build()
        .unwrap()
}

fn offline_client() -> Client {
    Client::new(Config::new(EXAMPLE_DOMAIN, EXAMPLE_API_KEY)).unwrap()
}

fn signature_fields(key: &str, signed: bool) -> Vec<(String, String)> {
    let timestamp = "123456789";
    let token = "token";
    let signature = if signed {
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    } else {
        hex::encode(b"badsignature")
    };

    vec![
        ("token".to_string(), token.to_string()),
        ("timestamp".to_string(), timestamp.to_string()),
        ("signature".to_string(), signature),
        ("event".to_string(), "delivered".to_string()),
    ]
}

fn form_request(fields: &[(String, String)]) -> http::Request<Vec<u8>> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    http::Request::builder()
        .method("POST")
        .uri("/")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body.into_bytes())
        .unwrap()
}

fn multipart_request(fields: &[(String, String)]) -> http::Request<Vec<u8>> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    http::Request::builder()
        .method("POST")
        .uri("/")
        .header("Content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(body.into_bytes())
        .unwrap()
}

#[test]
fn verify_webhook_signature() {
    let client = offline_client();

    for signed in [true, false] {
        let fields: HashMap<String, String> =
            signature_fields(client.api_key(), signed).into_iter().collect();
        let sig = Signature {
            timestamp: fields["timestamp"].clone(),
            token: fields["token"].clone(),
            signature: fields["signature"].clone(),
        };

        let verified = client.verify_webhook_signature(&sig).unwrap();
        assert_eq!(verified, signed, "signed = {signed}");
    }
}

#[test]
fn sign_webhook_round_trips_through_verify() {
    let client = offline_client();
    let sig = client.sign_webhook("1700000000", "random-token").unwrap();
    assert!(client.verify_webhook_signature(&sig).unwrap());

    let other = Client::new(Config::new(EXAMPLE_DOMAIN, "anotherKey")).unwrap();
    assert!(!other.verify_webhook_signature(&sig).unwrap());
}

#[tokio::test]
async fn verify_webhook_request_form() {
    let client = offline_client();

    for signed in [true, false] {
        let request = form_request(&signature_fields(client.api_key(), signed));
        let verified = client.verify_webhook_request(&request).await.unwrap();
        assert_eq!(verified, signed, "signed = {signed}");
    }
}

#[tokio::test]
async fn verify_webhook_request_multipart_form() {
    let client = offline_client();

    for signed in [true, false] {
        let request = multipart_request(&signature_fields(client.api_key(), signed));
        let verified = client.verify_webhook_request(&request).await.unwrap();
        assert_eq!(verified, signed, "signed = {signed}");
    }
}

#[tokio::test]
async fn form_and_multipart_agree() {
    let client = offline_client();
    let fields = signature_fields(client.api_key(), true);

    let from_form = Signature::from_request(&form_request(&fields)).await.unwrap();
    let from_multipart = Signature::from_request(&multipart_request(&fields))
        .await
        .unwrap();
    assert_eq!(from_form, from_multipart);
}

#[tokio::test]
async fn verify_webhook_request_missing_field_is_error() {
    let client = offline_client();
    let fields: Vec<(String, String)> = signature_fields(client.api_key(), true)
        .into_iter()
        .filter(|(k, _)| k != "token")
        .collect();

    let err = client
        .verify_webhook_request(&form_request(&fields))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedSignature(_)), "{err}");
}

#[tokio::test]
async fn webhook_crud() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/domains/testDomain/webhooks")
                .x_www_form_urlencoded_tuple("id", "deliver")
                .x_www_form_urlencoded_tuple("url", "http://api.mailgun.net");
            then.status(200).json_body(json!({
                "message": "Webhook has been created",
                "webhook": {"url": "http://api.mailgun.net"}
            }));
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/domains/testDomain/webhooks/deliver");
            then.status(200)
                .json_body(json!({"webhook": {"url": "http://api.mailgun.net"}}));
        })
        .await;
    let update = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/domains/testDomain/webhooks/deliver")
                .x_www_form_urlencoded_tuple("url", "http://api.mailgun.net/messages");
            then.status(200).json_body(json!({
                "message": "Webhook has been updated",
                "webhook": {"url": "http://api.mailgun.net/messages"}
            }));
        })
        .await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET).path("/domains/testDomain/webhooks");
            then.status(200).json_body(json!({
                "webhooks": {
                    "deliver": {"url": "http://api.mailgun.net/messages"},
                    "bounce": {"urls": ["http://example.com/bounce", "http://example.com/b2"]}
                }
            }));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/domains/testDomain/webhooks/deliver");
            then.status(200).json_body(json!({"message": "Webhook has been deleted"}));
        })
        .await;
    let client = client(&server);

    client
        .create_webhook("deliver", &["http://api.mailgun.net"])
        .await
        .unwrap();
    assert_eq!(
        client.get_webhook("deliver").await.unwrap(),
        "http://api.mailgun.net"
    );
    client
        .update_webhook("deliver", &["http://api.mailgun.net/messages"])
        .await
        .unwrap();

    let hooks = client.list_webhooks().await.unwrap();
    assert_eq!(hooks["deliver"], "http://api.mailgun.net/messages");
    assert_eq!(hooks["bounce"], "http://example.com/bounce");

    client.delete_webhook("deliver").await.unwrap();

    create.assert_async().await;
    get.assert_async().await;
    update.assert_async().await;
    list.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn get_missing_webhook_surfaces_api_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/domains/testDomain/webhooks/open");
            then.status(404).json_body(json!({"message": "Webhook not found"}));
        })
        .await;

    let err = client(&server).get_webhook("open").await.unwrap_err();
    assert_eq!(err.to_string(), "Webhook not found");
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn get_webhook_without_url_is_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/domains/testDomain/webhooks/open");
            then.status(200).json_body(json!({"webhook": {}}));
        })
        .await;

    let err = client(&server).get_webhook("open").await.unwrap_err();
    assert!(matches!(err, Error::MissingWebhookUrl(ref name) if name == "open"));
    assert_eq!(err.to_string(), "webhook `open` has no url");
}
