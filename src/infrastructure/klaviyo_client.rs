// Klaviyo APIクライアント
//
// プロファイルのupsert、リスト紐付け、イベント送出の
// 3つのアウトバウンド呼び出しを担う。各呼び出しは1回のみ試行する
// （再試行なし）。認証はAPIキー、バージョンはRevisionヘッダーで指定。

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::ContactRecord;
use crate::infrastructure::config::ForwarderConfig;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// JSON:APIコンテンツタイプ
const CONTENT_TYPE_JSON_API: &str = "application/vnd.api+json";

/// コンタクトフォーム送信イベントのメトリック名
pub const CONTACT_EVENT_METRIC: &str = "Contact Form Submitted";

/// Klaviyo API呼び出しのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KlaviyoError {
    /// ネットワーク接続エラー（タイムアウト含む）
    #[error("Network error: {0}")]
    Network(String),

    /// 上流APIのエラーレスポンス（非成功・非409）
    #[error("Upstream error: status={status}")]
    Upstream {
        /// HTTPステータスコード
        status: u16,
        /// レスポンスボディ（JSONとして解析できない場合は生文字列）
        body: Value,
    },

    /// 成功レスポンスからプロファイルIDを特定できない
    #[error("No profile id in response: status={status}")]
    MissingProfileId {
        /// HTTPステータスコード
        status: u16,
        /// レスポンスボディ
        body: Value,
    },

    /// イベントトラッキング資格情報が未設定
    #[error("Event tracking credential is not configured")]
    TrackingNotConfigured,
}

/// プロファイルupsertの結果
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpsert {
    /// プロファイルID（新規作成または重複経由で回収）
    pub profile_id: String,
    /// 作成リクエストのHTTPステータス
    pub create_status: u16,
    /// 409経由の場合のプロパティ更新（PATCH）ステータス
    pub update_status: Option<u16>,
}

/// 単一API呼び出しの結果（ステータス判定は呼び出し側のポリシー）
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallOutcome {
    /// HTTPステータスコード
    pub status: u16,
    /// レスポンスボディ
    pub body: Value,
}

impl ApiCallOutcome {
    /// 成功ステータス（2xx）かどうか
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// マーケティングAPI操作用トレイト
///
/// アウトバウンド呼び出しを抽象化し、異なる実装を可能にする
/// （実際のKlaviyoクライアント、テスト用モック）。
#[async_trait]
pub trait MarketingApi: Send + Sync {
    /// プロファイルを作成または更新し、プロファイルIDを返す
    ///
    /// 409（重複）は失敗ではなく、既存プロファイルIDの回収として扱う。
    async fn upsert_profile(&self, record: &ContactRecord)
    -> Result<ProfileUpsert, KlaviyoError>;

    /// プロファイルをリストのメンバーシップに紐付ける
    ///
    /// ステータスの成否判定は呼び出し側のポリシーに委ねる。
    async fn link_to_list(
        &self,
        profile_id: &str,
        list_id: &str,
    ) -> Result<ApiCallOutcome, KlaviyoError>;

    /// コンタクトフォーム送信イベントを記録する
    async fn track_event(
        &self,
        record: &ContactRecord,
        profile_id: &str,
    ) -> Result<ApiCallOutcome, KlaviyoError>;

    /// イベント送出が設定されているかどうか
    fn supports_events(&self) -> bool;
}

/// Klaviyo REST APIクライアント
#[derive(Clone)]
pub struct KlaviyoClient {
    /// HTTPクライアント
    client: Client,
    /// API資格情報
    api_key: String,
    /// イベントトラッキング資格情報
    track_api_key: Option<String>,
    /// APIリビジョン文字列
    revision: String,
    /// APIベースURL
    base_url: String,
}

impl std::fmt::Debug for KlaviyoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlaviyoClient")
            .field("base_url", &self.base_url)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl KlaviyoClient {
    /// 設定からクライアントを作成
    pub fn new(config: &ForwarderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .expect("HTTPクライアントの構築に失敗");

        Self {
            client,
            api_key: config.api_key.clone(),
            track_api_key: config.track_api_key.clone(),
            revision: config.revision.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// プロファイル作成エンドポイントURLを構築
    fn profiles_url(&self) -> String {
        format!("{}/api/profiles", self.base_url.trim_end_matches('/'))
    }

    /// プロファイル更新エンドポイントURLを構築
    fn profile_url(&self, profile_id: &str) -> String {
        format!(
            "{}/api/profiles/{}",
            self.base_url.trim_end_matches('/'),
            profile_id
        )
    }

    /// リスト紐付けエンドポイントURLを構築
    fn list_relationships_url(&self, list_id: &str) -> String {
        format!(
            "{}/api/lists/{}/relationships/profiles",
            self.base_url.trim_end_matches('/'),
            list_id
        )
    }

    /// イベント送出エンドポイントURLを構築
    fn events_url(&self) -> String {
        format!("{}/api/events", self.base_url.trim_end_matches('/'))
    }

    /// 認証・リビジョンヘッダー付きでリクエストを送信し、結果を回収
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        api_key: &str,
        body: &Value,
    ) -> Result<ApiCallOutcome, KlaviyoError> {
        let response = request
            .header("Authorization", format!("Klaviyo-API-Key {api_key}"))
            .header("Revision", &self.revision)
            .header("Content-Type", CONTENT_TYPE_JSON_API)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| KlaviyoError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        // JSONとして解析できない場合も生ボディを診断用に保持する
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(ApiCallOutcome { status, body })
    }

    /// 既存プロファイルにカスタムプロパティを反映（PATCH）
    async fn patch_profile_properties(
        &self,
        profile_id: &str,
        record: &ContactRecord,
    ) -> Result<ApiCallOutcome, KlaviyoError> {
        let url = self.profile_url(profile_id);
        let body = profile_patch_body(profile_id, record);
        debug!(url = %url, "プロファイルプロパティを更新");

        self.send(self.client.patch(&url), &self.api_key, &body)
            .await
    }
}

#[async_trait]
impl MarketingApi for KlaviyoClient {
    async fn upsert_profile(
        &self,
        record: &ContactRecord,
    ) -> Result<ProfileUpsert, KlaviyoError> {
        let url = self.profiles_url();
        let body = profile_create_body(record);
        debug!(url = %url, email = %record.email, "プロファイルを作成");

        let outcome = self.send(self.client.post(&url), &self.api_key, &body).await?;

        // 成功と409（重複）以外は致命的エラー
        if !outcome.is_success() && outcome.status != StatusCode::CONFLICT.as_u16() {
            return Err(KlaviyoError::Upstream {
                status: outcome.status,
                body: outcome.body,
            });
        }

        // 新規作成のdata.id、または重複レスポンスの埋め込みIDを回収
        let profile_id = extract_profile_id(&outcome.body).ok_or_else(|| {
            KlaviyoError::MissingProfileId {
                status: outcome.status,
                body: outcome.body.clone(),
            }
        })?;

        // 重複（既存プロファイル）の場合のみ、プロパティをPATCHで反映する。
        // PATCHはベストエフォート: 失敗してもupsert全体は成功とする。
        let update_status = if outcome.status == StatusCode::CONFLICT.as_u16() {
            match self.patch_profile_properties(&profile_id, record).await {
                Ok(patch) => {
                    if !patch.is_success() {
                        warn!(
                            profile_id = %profile_id,
                            status = patch.status,
                            "プロファイルプロパティ更新が失敗（続行）"
                        );
                    }
                    Some(patch.status)
                }
                Err(e) => {
                    warn!(
                        profile_id = %profile_id,
                        error = %e,
                        "プロファイルプロパティ更新リクエスト失敗（続行）"
                    );
                    None
                }
            }
        } else {
            None
        };

        info!(
            profile_id = %profile_id,
            status = outcome.status,
            "プロファイルupsert成功"
        );

        Ok(ProfileUpsert {
            profile_id,
            create_status: outcome.status,
            update_status,
        })
    }

    async fn link_to_list(
        &self,
        profile_id: &str,
        list_id: &str,
    ) -> Result<ApiCallOutcome, KlaviyoError> {
        let url = self.list_relationships_url(list_id);
        let body = list_link_body(profile_id);
        debug!(url = %url, profile_id = %profile_id, "リストへ紐付け");

        self.send(self.client.post(&url), &self.api_key, &body).await
    }

    async fn track_event(
        &self,
        record: &ContactRecord,
        profile_id: &str,
    ) -> Result<ApiCallOutcome, KlaviyoError> {
        let track_key = self
            .track_api_key
            .as_deref()
            .ok_or(KlaviyoError::TrackingNotConfigured)?;

        let url = self.events_url();
        let body = event_body(record, profile_id);
        debug!(url = %url, email = %record.email, "イベントを送出");

        self.send(self.client.post(&url), track_key, &body).await
    }

    fn supports_events(&self) -> bool {
        self.track_api_key.is_some()
    }
}

/// プロファイル作成リクエストボディを構築
///
/// 欠落フィールドはnullとして送信する。空文字列は送信しない
/// （既存プロファイルのデータを上書きしないため）。
pub fn profile_create_body(record: &ContactRecord) -> Value {
    json!({
        "data": {
            "type": "profile",
            "attributes": {
                "email": record.email,
                "first_name": record.name,
                "phone_number": record.phone,
                "properties": profile_properties(record),
            }
        }
    })
}

/// プロファイル更新（PATCH）リクエストボディを構築
pub fn profile_patch_body(profile_id: &str, record: &ContactRecord) -> Value {
    json!({
        "data": {
            "type": "profile",
            "id": profile_id,
            "attributes": {
                "properties": profile_properties(record),
            }
        }
    })
}

/// リスト紐付けリクエストボディを構築
pub fn list_link_body(profile_id: &str) -> Value {
    json!({
        "data": [{ "type": "profile", "id": profile_id }]
    })
}

/// イベント送出リクエストボディを構築
pub fn event_body(record: &ContactRecord, profile_id: &str) -> Value {
    json!({
        "data": {
            "type": "event",
            "attributes": {
                "time": Utc::now().to_rfc3339(),
                "properties": {
                    "profile_id": profile_id,
                    "contact_message": record.message,
                    "page_url": record.page_url,
                    "referrer_url": record.referrer,
                    "product_handle": record.product_handle,
                    "product_title": record.product_title,
                    "product_id": record.product_id,
                },
                "metric": {
                    "data": {
                        "type": "metric",
                        "attributes": { "name": CONTACT_EVENT_METRIC }
                    }
                },
                "profile": {
                    "data": {
                        "type": "profile",
                        "attributes": { "email": record.email }
                    }
                }
            }
        }
    })
}

/// プロファイルのカスタムプロパティマップを構築
fn profile_properties(record: &ContactRecord) -> Value {
    json!({
        "contact_name": record.name,
        "contact_email": record.email,
        "contact_phone": record.phone,
        "contact_message": record.message,
        "page_url": record.page_url,
        "referrer_url": record.referrer,
        "product_handle": record.product_handle,
        "product_title": record.product_title,
        "product_id": record.product_id,
    })
}

/// レスポンスボディからプロファイルIDを抽出
///
/// 新規作成時は`data.id`、409重複時は
/// `errors[0].meta.duplicate_profile_id`を参照する。
pub fn extract_profile_id(body: &Value) -> Option<String> {
    if let Some(id) = body.pointer("/data/id").and_then(Value::as_str) {
        return Some(id.to_string());
    }

    body.pointer("/errors/0/meta/duplicate_profile_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}
