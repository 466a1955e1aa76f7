/// コンタクトフォーム転送Lambdaエントリポイント
///
/// Lambda Function URL経由のHTTPリクエストを処理し、
/// フォーム送信をKlaviyo APIへ転送する。
/// 設定はコールドスタート時に一度だけ読み込み、以後読み取り専用。
use std::sync::Arc;

use contact_forwarder::application::ContactFormHandler;
use contact_forwarder::application::http_handler::configuration_error_response;
use contact_forwarder::infrastructure::{ForwarderConfig, KlaviyoClient, init_logging};
use lambda_http::{Body, Error, Request, Response, run, service_fn};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    info!("コンタクトフォームLambda関数を初期化");

    // 設定読み込みに失敗してもプロセスは落とさず、
    // 各リクエストに整形済みの500 JSONで応答する
    let handler = init_handler();

    run(service_fn(move |request: Request| {
        let handler = handler.clone();
        async move {
            let response = match handler.as_ref() {
                Ok(h) => h.handle(request).await,
                Err(message) => configuration_error_response(message),
            };
            Ok::<Response<Body>, Error>(response)
        }
    }))
    .await
}

/// 環境変数から設定を読み込み、ハンドラーを構築
fn init_handler() -> Arc<Result<ContactFormHandler<KlaviyoClient>, String>> {
    match ForwarderConfig::from_env() {
        Ok(config) => {
            let api = KlaviyoClient::new(&config);
            Arc::new(Ok(ContactFormHandler::new(config, api)))
        }
        Err(e) => {
            error!(error = %e, "設定の読み込みに失敗");
            Arc::new(Err(e.to_string()))
        }
    }
}
