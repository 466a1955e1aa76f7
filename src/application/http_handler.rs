// コンタクトフォームHTTPハンドラー
//
// メソッドルーティング（OPTIONS/POST/405）、CORSヘッダー、
// レスポンスJSONの整形を担う。すべてのエラーは`{ok:false}`の
// 整形済みJSONとして返し、生の例外を漏らさない。

use lambda_http::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap, HeaderValue,
};
use lambda_http::{Body, Request, Response};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::application::forwarder::{ContactForwarder, ForwardError};
use crate::domain::InboundSubmission;
use crate::infrastructure::{ForwarderConfig, MarketingApi};

/// コンタクトフォームHTTPハンドラー
pub struct ContactFormHandler<A: MarketingApi> {
    /// 転送パイプライン
    forwarder: ContactForwarder<A>,
}

impl<A: MarketingApi> ContactFormHandler<A> {
    /// 新しいハンドラーを作成
    pub fn new(config: ForwarderConfig, api: A) -> Self {
        Self {
            forwarder: ContactForwarder::new(config, api),
        }
    }

    /// HTTPリクエストを処理してレスポンスを生成
    ///
    /// - OPTIONS: CORSプリフライトとして204を返す
    /// - POST: 転送パイプラインを実行
    /// - その他: 405
    pub async fn handle(&self, request: Request) -> Response<Body> {
        match request.method().as_str() {
            "OPTIONS" => preflight_response(),
            "POST" => self.handle_post(request.body()).await,
            method => {
                warn!(method = %method, "許可されないHTTPメソッド");
                json_response(
                    405,
                    json!({"ok": false, "message": "Method Not Allowed"}),
                )
            }
        }
    }

    /// POSTリクエストを処理
    async fn handle_post(&self, body: &Body) -> Response<Body> {
        let bytes: &[u8] = match body {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(data) => data.as_slice(),
            Body::Empty => &[],
            _ => &[],
        };

        // ボディの解析失敗はクライアント入力エラー
        let submission = match InboundSubmission::from_body(bytes) {
            Ok(submission) => submission,
            Err(e) => {
                warn!(error = %e, "リクエストボディの解析に失敗");
                return json_response(400, json!({"ok": false, "message": e.to_string()}));
            }
        };

        match self.forwarder.forward(&submission).await {
            Ok(result) => {
                info!(
                    email = %result.email,
                    profile_id = %result.profile_id,
                    "転送成功レスポンス送信"
                );

                let mut body = match serde_json::to_value(&result) {
                    Ok(value) => value,
                    Err(e) => {
                        return json_response(
                            500,
                            ForwardError::Unexpected(e.to_string()).to_response_json(),
                        );
                    }
                };
                body["ok"] = Value::Bool(true);
                json_response(200, body)
            }
            Err(error) => {
                warn!(
                    status = error.status_code(),
                    error = %error,
                    "転送失敗レスポンス送信"
                );
                json_response(error.status_code(), error.to_response_json())
            }
        }
    }
}

/// 設定エラー用の500レスポンスを生成
///
/// コールドスタート時の設定読み込みに失敗した場合でも、
/// 整形済みJSONで応答するために使用する。
pub fn configuration_error_response(message: &str) -> Response<Body> {
    json_response(500, json!({"ok": false, "message": message}))
}

/// CORSプリフライト用の204レスポンスを生成
fn preflight_response() -> Response<Body> {
    let mut response = Response::builder()
        .status(204)
        .body(Body::Empty)
        .expect("レスポンスの構築に失敗");
    *response.headers_mut() = build_cors_headers(false);
    response
}

/// JSONボディ付きレスポンスを生成
fn json_response(status: u16, body: Value) -> Response<Body> {
    let mut response = Response::builder()
        .status(status)
        .body(Body::Text(body.to_string()))
        .expect("レスポンスの構築に失敗");
    *response.headers_mut() = build_cors_headers(true);
    response
}

/// CORSヘッダーを生成
///
/// すべてのレスポンスに付与する:
/// - Access-Control-Allow-Origin: *
/// - Access-Control-Allow-Methods: POST, OPTIONS
/// - Access-Control-Allow-Headers: Content-Type
/// - Content-Type: application/json（ボディ付きの場合のみ）
fn build_cors_headers(with_content_type: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    if with_content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContactRecord;
    use crate::infrastructure::{ApiCallOutcome, KlaviyoError, ProfileUpsert};
    use async_trait::async_trait;
    use lambda_http::http::Request as HttpRequest;

    /// 固定結果を返すモックAPI
    struct MockApi {
        upsert_result: Result<ProfileUpsert, KlaviyoError>,
    }

    impl Default for MockApi {
        fn default() -> Self {
            Self {
                upsert_result: Ok(ProfileUpsert {
                    profile_id: "p_1".to_string(),
                    create_status: 201,
                    update_status: None,
                }),
            }
        }
    }

    #[async_trait]
    impl MarketingApi for MockApi {
        async fn upsert_profile(
            &self,
            _record: &ContactRecord,
        ) -> Result<ProfileUpsert, KlaviyoError> {
            self.upsert_result.clone()
        }

        async fn link_to_list(
            &self,
            _profile_id: &str,
            _list_id: &str,
        ) -> Result<ApiCallOutcome, KlaviyoError> {
            Ok(ApiCallOutcome {
                status: 204,
                body: Value::Null,
            })
        }

        async fn track_event(
            &self,
            _record: &ContactRecord,
            _profile_id: &str,
        ) -> Result<ApiCallOutcome, KlaviyoError> {
            Ok(ApiCallOutcome {
                status: 202,
                body: Value::Null,
            })
        }

        fn supports_events(&self) -> bool {
            false
        }
    }

    fn test_handler() -> ContactFormHandler<MockApi> {
        ContactFormHandler::new(
            ForwarderConfig::new("pk_test", Some("LIST_X".to_string())),
            MockApi::default(),
        )
    }

    fn request(method: &str, body: Body) -> Request {
        HttpRequest::builder()
            .method(method)
            .uri("/api/klaviyo-contact")
            .body(body)
            .unwrap()
    }

    fn body_json(response: &Response<Body>) -> Value {
        let text = match response.body() {
            Body::Text(text) => text.clone(),
            Body::Binary(bytes) => String::from_utf8(bytes.clone()).unwrap(),
            Body::Empty => String::new(),
            _ => panic!("予期しないBody型"),
        };
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_options_preflight_returns_204() {
        let response = test_handler().handle(request("OPTIONS", Body::Empty)).await;

        assert_eq!(response.status(), 204);
        assert!(matches!(response.body(), Body::Empty));
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "POST, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_other_methods_return_405() {
        for method in ["GET", "PUT", "DELETE", "PATCH"] {
            let response = test_handler().handle(request(method, Body::Empty)).await;

            assert_eq!(response.status(), 405);
            let body = body_json(&response);
            assert_eq!(body["ok"], false);
            assert_eq!(body["message"], "Method Not Allowed");
        }
    }

    #[tokio::test]
    async fn test_post_success() {
        let payload = json!({
            "contact[email]": "a@x.com",
            "contact[Phone number]": "555-1234",
            "page_url": "/contact",
        });
        let response = test_handler()
            .handle(request("POST", Body::Text(payload.to_string())))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body = body_json(&response);
        assert_eq!(body["ok"], true);
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["profile_id"], "p_1");
        assert_eq!(body["list_id"], "LIST_X");
        assert_eq!(body["klaviyo_profile_create_status"], 201);
        assert_eq!(body["klaviyo_list_link_status"], 204);
    }

    #[tokio::test]
    async fn test_post_missing_email_returns_400() {
        let payload = json!({"message": "no email here"});
        let response = test_handler()
            .handle(request("POST", Body::Text(payload.to_string())))
            .await;

        assert_eq!(response.status(), 400);
        let body = body_json(&response);
        assert_eq!(body["ok"], false);
        assert_eq!(body["message"], "Missing email");
    }

    #[tokio::test]
    async fn test_post_invalid_json_returns_400() {
        let response = test_handler()
            .handle(request("POST", Body::Text("{not json".to_string())))
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(body_json(&response)["ok"], false);
    }

    #[tokio::test]
    async fn test_post_empty_body_returns_400() {
        let response = test_handler().handle(request("POST", Body::Empty)).await;

        assert_eq!(response.status(), 400);
        assert_eq!(body_json(&response)["ok"], false);
    }

    #[tokio::test]
    async fn test_post_json_encoded_string_body() {
        // ボディがJSONエンコードされた文字列でも処理できる
        let inner = json!({"email": "b@x.com"}).to_string();
        let outer = serde_json::to_string(&inner).unwrap();

        let response = test_handler()
            .handle(request("POST", Body::Text(outer)))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response)["email"], "b@x.com");
    }

    #[tokio::test]
    async fn test_post_upstream_failure_returns_502() {
        let handler = ContactFormHandler::new(
            ForwarderConfig::new("pk_test", Some("LIST_X".to_string())),
            MockApi {
                upsert_result: Err(KlaviyoError::Upstream {
                    status: 500,
                    body: json!({"errors": []}),
                }),
            },
        );

        let payload = json!({"email": "a@x.com"});
        let response = handler
            .handle(request("POST", Body::Text(payload.to_string())))
            .await;

        assert_eq!(response.status(), 502);
        let body = body_json(&response);
        assert_eq!(body["ok"], false);
        assert_eq!(body["step"], "profile_upsert");
        assert_eq!(body["status"], 500);
    }

    #[tokio::test]
    async fn test_error_responses_carry_cors_headers() {
        let response = test_handler().handle(request("GET", Body::Empty)).await;

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn test_configuration_error_response() {
        let response = configuration_error_response("Missing environment variable: KLAVIYO_API_KEY");

        assert_eq!(response.status(), 500);
        let body = body_json(&response);
        assert_eq!(body["ok"], false);
        assert_eq!(
            body["message"],
            "Missing environment variable: KLAVIYO_API_KEY"
        );
    }
}
