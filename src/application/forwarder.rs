// コンタクト転送パイプライン
//
// 1リクエスト = 入力検証 → プロファイルupsert → リスト紐付け →
// イベント送出（任意）の直列実行。各ステップは前ステップの結果に
// 依存し、並列化しない。リスト紐付けの失敗は設定されたポリシー
// （fail_fast / best_effort）に従い、イベント送出の失敗は常に非致命。

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{ContactRecord, InboundSubmission, LinkFailurePolicy};
use crate::infrastructure::{ForwarderConfig, KlaviyoError, MarketingApi};

/// 転送パイプラインのエラー型
///
/// HTTPステータスへの対応:
/// - ClientInput → 400
/// - Configuration → 500
/// - Upstream / Network → 502
/// - Unexpected → 500
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForwardError {
    /// クライアント入力エラー（必須フィールド欠落、不許可リストID）
    #[error("{0}")]
    ClientInput(String),

    /// サーバー設定エラー（必須設定の欠落）
    #[error("{0}")]
    Configuration(String),

    /// 必須ステップでの上流APIエラー
    #[error("Upstream call failed at step {step}: status={status}")]
    Upstream {
        /// 失敗したステップ名
        step: String,
        /// 上流のHTTPステータス
        status: u16,
        /// 上流のレスポンスボディ
        body: Value,
    },

    /// 必須ステップでのネットワークエラー
    #[error("Network failure at step {step}: {message}")]
    Network {
        /// 失敗したステップ名
        step: String,
        /// エラー内容
        message: String,
    },

    /// 予期しない内部エラー
    #[error("{0}")]
    Unexpected(String),
}

impl ForwardError {
    /// 対応するHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientInput(_) => 400,
            Self::Configuration(_) => 500,
            Self::Upstream { .. } | Self::Network { .. } => 502,
            Self::Unexpected(_) => 500,
        }
    }

    /// `{ok:false, ...}`形式のレスポンスJSONを構築
    pub fn to_response_json(&self) -> Value {
        match self {
            Self::ClientInput(message)
            | Self::Configuration(message)
            | Self::Unexpected(message) => json!({
                "ok": false,
                "message": message,
            }),
            Self::Upstream { step, status, body } => json!({
                "ok": false,
                "message": format!("Upstream call failed at step {step}"),
                "step": step,
                "status": status,
                "body": body,
            }),
            Self::Network { step, message } => json!({
                "ok": false,
                "message": message,
                "step": step,
            }),
        }
    }
}

/// 転送パイプラインの結果
///
/// リクエストごとに新規構築され、レスポンス送信後に破棄される。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardResult {
    /// 解決されたメールアドレス
    pub email: String,
    /// プロファイルID
    pub profile_id: String,
    /// 紐付け先リストID
    pub list_id: String,
    /// プロファイル作成ステップのHTTPステータス
    #[serde(rename = "klaviyo_profile_create_status")]
    pub profile_create_status: u16,
    /// プロパティ更新（PATCH）のHTTPステータス（409経由の場合のみ）
    #[serde(
        rename = "klaviyo_profile_update_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_update_status: Option<u16>,
    /// リスト紐付けステップのHTTPステータス（ネットワーク失敗時はNone）
    #[serde(
        rename = "klaviyo_list_link_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub list_link_status: Option<u16>,
    /// イベント送出ステップのHTTPステータス（スキップ・失敗時はNone）
    #[serde(
        rename = "klaviyo_event_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_status: Option<u16>,
}

/// コンタクト転送パイプライン
///
/// 設定とマーケティングAPIクライアントを保持し、
/// 送信データごとに直列のステップ実行を行う。
pub struct ContactForwarder<A: MarketingApi> {
    /// プロセス全体の設定（読み取り専用）
    config: ForwarderConfig,
    /// マーケティングAPIクライアント
    api: A,
}

impl<A: MarketingApi> ContactForwarder<A> {
    /// 新しい転送パイプラインを作成
    pub fn new(config: ForwarderConfig, api: A) -> Self {
        Self { config, api }
    }

    /// 送信データを転送
    ///
    /// # 処理フロー
    /// 1. 入力検証（コンタクトレコード解決。失敗時は外部呼び出しなし）
    /// 2. プロファイルupsert（失敗は常に致命的）
    /// 3. リスト紐付け（失敗はポリシーに従う）
    /// 4. イベント送出（資格情報がある場合のみ。失敗は常に非致命）
    pub async fn forward(
        &self,
        submission: &InboundSubmission,
    ) -> Result<ForwardResult, ForwardError> {
        // 入力検証: 外部呼び出しの前に必ず完了する
        let record = ContactRecord::resolve(
            submission,
            self.config.default_list_id.as_deref(),
            &self.config.allowed_list_ids,
        )
        .map_err(|e| ForwardError::ClientInput(e.to_string()))?;

        info!(
            email = %record.email,
            list_id = %record.list_id,
            "コンタクト転送開始"
        );

        // プロファイルupsert
        let upsert = self
            .api
            .upsert_profile(&record)
            .await
            .map_err(|e| step_error("profile_upsert", e))?;

        // リスト紐付け
        let list_link_status = match self
            .api
            .link_to_list(&upsert.profile_id, &record.list_id)
            .await
        {
            Ok(outcome) if outcome.is_success() => Some(outcome.status),
            Ok(outcome) => match self.config.link_policy {
                LinkFailurePolicy::FailFast => {
                    return Err(ForwardError::Upstream {
                        step: "list_link".to_string(),
                        status: outcome.status,
                        body: outcome.body,
                    });
                }
                LinkFailurePolicy::BestEffort => {
                    warn!(
                        profile_id = %upsert.profile_id,
                        list_id = %record.list_id,
                        status = outcome.status,
                        "リスト紐付けが失敗（続行）"
                    );
                    Some(outcome.status)
                }
            },
            Err(e) => match self.config.link_policy {
                LinkFailurePolicy::FailFast => return Err(step_error("list_link", e)),
                LinkFailurePolicy::BestEffort => {
                    warn!(
                        profile_id = %upsert.profile_id,
                        error = %e,
                        "リスト紐付けリクエスト失敗（続行）"
                    );
                    None
                }
            },
        };

        // イベント送出（資格情報がある場合のみ、最後に実行）
        let event_status = if self.api.supports_events() {
            match self.api.track_event(&record, &upsert.profile_id).await {
                Ok(outcome) => {
                    if !outcome.is_success() {
                        warn!(
                            email = %record.email,
                            status = outcome.status,
                            "イベント送出が失敗（続行）"
                        );
                    }
                    Some(outcome.status)
                }
                Err(e) => {
                    warn!(email = %record.email, error = %e, "イベント送出リクエスト失敗（続行）");
                    None
                }
            }
        } else {
            debug!("イベントトラッキング未設定のためイベント送出をスキップ");
            None
        };

        info!(
            email = %record.email,
            profile_id = %upsert.profile_id,
            "コンタクト転送完了"
        );

        Ok(ForwardResult {
            email: record.email,
            profile_id: upsert.profile_id,
            list_id: record.list_id,
            profile_create_status: upsert.create_status,
            profile_update_status: upsert.update_status,
            list_link_status,
            event_status,
        })
    }
}

/// クライアントエラーを必須ステップのパイプラインエラーへ変換
fn step_error(step: &str, error: KlaviyoError) -> ForwardError {
    match error {
        KlaviyoError::Upstream { status, body }
        | KlaviyoError::MissingProfileId { status, body } => ForwardError::Upstream {
            step: step.to_string(),
            status,
            body,
        },
        KlaviyoError::Network(message) => ForwardError::Network {
            step: step.to_string(),
            message,
        },
        KlaviyoError::TrackingNotConfigured => {
            ForwardError::Unexpected(error.to_string())
        }
    }
}
