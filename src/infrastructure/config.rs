// 転送設定
//
// 環境変数からプロセス全体の設定をコールドスタート時に一度だけ
// 読み込み、以後読み取り専用として転送パイプラインに明示的に渡す。

use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::domain::LinkFailurePolicy;

/// KlaviyoベースURLのデフォルト値
pub const DEFAULT_BASE_URL: &str = "https://a.klaviyo.com";

/// APIリビジョンのデフォルト値
pub const DEFAULT_REVISION: &str = "2025-10-15";

/// 設定読み込みのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// 必須環境変数が未設定
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// ベースURLがURLとして解析できない
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// リスト紐付けポリシーの値が不正
    #[error("Invalid link failure policy: {0}")]
    InvalidLinkPolicy(String),
}

/// 転送パイプラインの設定
///
/// 環境変数:
/// - KLAVIYO_API_KEY: API資格情報（必須）
/// - KLAVIYO_LIST_ID: デフォルトリストID（任意。未設定時は送信側の指定が必須）
/// - KLAVIYO_API_REVISION: APIリビジョン（デフォルト: 2025-10-15）
/// - KLAVIYO_API_BASE_URL: APIベースURL（デフォルト: https://a.klaviyo.com）
/// - KLAVIYO_ALLOWED_LIST_IDS: 許可リストID（カンマ区切り、任意）
/// - KLAVIYO_TRACK_API_KEY: イベントトラッキング資格情報（任意。未設定時はイベント送出をスキップ）
/// - KLAVIYO_LINK_POLICY: fail_fast / best_effort（デフォルト: best_effort）
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// API資格情報
    pub api_key: String,
    /// デフォルトリストID
    pub default_list_id: Option<String>,
    /// APIリビジョン文字列
    pub revision: String,
    /// APIベースURL
    pub base_url: String,
    /// 許可リストID一覧（空の場合は全リストを許可）
    pub allowed_list_ids: Vec<String>,
    /// イベントトラッキング資格情報
    pub track_api_key: Option<String>,
    /// リスト紐付け失敗時のポリシー
    pub link_policy: LinkFailurePolicy,
}

impl ForwarderConfig {
    /// 環境変数から設定を読み込み
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = get_required("KLAVIYO_API_KEY")?;
        let default_list_id = get_optional("KLAVIYO_LIST_ID");
        let revision =
            get_optional("KLAVIYO_API_REVISION").unwrap_or_else(|| DEFAULT_REVISION.to_string());

        let base_url =
            get_optional("KLAVIYO_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Url::parse(&base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.clone()))?;

        let allowed_list_ids = get_optional("KLAVIYO_ALLOWED_LIST_IDS")
            .map(|v| parse_comma_separated(&v))
            .unwrap_or_default();

        let track_api_key = get_optional("KLAVIYO_TRACK_API_KEY");

        let link_policy = match get_optional("KLAVIYO_LINK_POLICY") {
            Some(value) => LinkFailurePolicy::from_str(&value)
                .map_err(|_| ConfigError::InvalidLinkPolicy(value))?,
            None => LinkFailurePolicy::default(),
        };

        Ok(Self {
            api_key,
            default_list_id,
            revision,
            base_url,
            allowed_list_ids,
            track_api_key,
            link_policy,
        })
    }

    /// 明示的な値で設定を作成（テスト用）
    pub fn new(api_key: impl Into<String>, default_list_id: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_list_id,
            revision: DEFAULT_REVISION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            allowed_list_ids: Vec::new(),
            track_api_key: None,
            link_policy: LinkFailurePolicy::default(),
        }
    }
}

/// 必須環境変数を読み込み（空白のみの値は未設定扱い）
fn get_required(key: &str) -> Result<String, ConfigError> {
    get_optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// 任意環境変数を読み込み（空文字はNone扱い）
fn get_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// カンマ区切り文字列をトリムして分解
fn parse_comma_separated(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
