// 正規化済みコンタクトレコード
//
// フォーム送信データから導出される不変のレコード。
// emailとlist_idは構築時点で検証済みであることを保証し、
// 外部API呼び出しの前に必ず入力検証が完了する。

use thiserror::Error;

use crate::domain::field_resolver;
use crate::domain::submission::InboundSubmission;

/// コンタクトレコード解決のエラー型
///
/// いずれもクライアント入力エラー（HTTP 400相当）。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// メールアドレスがどの候補キーにも存在しない
    #[error("Missing email")]
    MissingEmail,

    /// リストIDが送信データにも設定デフォルトにも存在しない
    #[error("Missing list id")]
    MissingListId,

    /// リストIDが許可リストに含まれない
    #[error("List id is not allowed: {0}")]
    DisallowedListId(String),
}

/// 正規化済みコンタクトレコード
///
/// `resolve`でのみ構築され、構築後は変更されない。
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    /// メールアドレス（必須、非空）
    pub email: String,
    /// 名前
    pub name: Option<String>,
    /// 電話番号
    pub phone: Option<String>,
    /// メッセージ本文
    pub message: Option<String>,
    /// 送信元ページURL
    pub page_url: Option<String>,
    /// リファラー
    pub referrer: Option<String>,
    /// 商品ハンドル
    pub product_handle: Option<String>,
    /// 商品タイトル
    pub product_title: Option<String>,
    /// 商品ID
    pub product_id: Option<String>,
    /// 転送先リストID（必須、検証済み）
    pub list_id: String,
}

impl ContactRecord {
    /// 送信データからコンタクトレコードを解決
    ///
    /// 各論理フィールドを候補キー表に従って解決し、必須フィールド
    /// （email、list_id）の存在と許可リストを検証する。
    ///
    /// # 引数
    /// * `submission` - 正規化済みフォーム送信データ
    /// * `default_list_id` - 設定済みデフォルトリストID
    /// * `allowed_list_ids` - 許可リストIDの一覧（空の場合は検査しない）
    ///
    /// # 戻り値
    /// * 検証済みレコード、または`ResolveError`
    pub fn resolve(
        submission: &InboundSubmission,
        default_list_id: Option<&str>,
        allowed_list_ids: &[String],
    ) -> Result<Self, ResolveError> {
        let email = field_resolver::resolve_first(submission, field_resolver::EMAIL_KEYS)
            .map(str::to_string)
            .ok_or(ResolveError::MissingEmail)?;

        let list_id = field_resolver::resolve_list_id(submission, default_list_id)
            .ok_or(ResolveError::MissingListId)?;

        // 許可リストが設定されている場合のみ検査
        if !allowed_list_ids.is_empty() && !allowed_list_ids.contains(&list_id) {
            return Err(ResolveError::DisallowedListId(list_id));
        }

        let resolve = |keys: &[&str]| {
            field_resolver::resolve_first(submission, keys).map(str::to_string)
        };

        Ok(Self {
            email,
            name: resolve(field_resolver::NAME_KEYS),
            phone: field_resolver::resolve_phone(submission).map(str::to_string),
            message: resolve(field_resolver::MESSAGE_KEYS),
            page_url: resolve(field_resolver::PAGE_URL_KEYS),
            referrer: resolve(field_resolver::REFERRER_KEYS),
            product_handle: resolve(field_resolver::PRODUCT_HANDLE_KEYS),
            product_title: resolve(field_resolver::PRODUCT_TITLE_KEYS),
            product_id: resolve(field_resolver::PRODUCT_ID_KEYS),
            list_id,
        })
    }
}
