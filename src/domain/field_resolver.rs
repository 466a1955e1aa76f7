// フィールド解決器
//
// 任意キーのフォーム送信データから論理フィールドを決定的に抽出する。
// 論理フィールドごとに候補キーの宣言的テーブル（優先順）を持ち、
// 1つの汎用リゾルバー関数がテーブルを消費する。
// 解決は純粋で副作用を持たず、I/Oを行わない。

use crate::domain::submission::InboundSubmission;

/// メールアドレスの候補キー（Shopifyはcontact[email]を使用）
pub const EMAIL_KEYS: &[&str] = &["contact[email]", "email", "contact_email"];

/// 名前の候補キー
pub const NAME_KEYS: &[&str] = &["name", "first_name", "contact[Name]", "contact[name]"];

/// 電話番号の候補キー（フォールバックスキャンは別途）
pub const PHONE_KEYS: &[&str] = &[
    "phone",
    "contact[Phone number]",
    "contact[Phone]",
    "contact[phone]",
];

/// メッセージ本文の候補キー
pub const MESSAGE_KEYS: &[&str] = &[
    "message",
    "contact[Message]",
    "contact[Body]",
    "contact[Comment]",
    "contact[body]",
];

/// 送信元ページURLの候補キー
pub const PAGE_URL_KEYS: &[&str] = &["page_url", "pageUrl"];

/// リファラーの候補キー
pub const REFERRER_KEYS: &[&str] = &["referrer", "referrer_url"];

/// 商品ハンドルの候補キー
pub const PRODUCT_HANDLE_KEYS: &[&str] = &["product_handle"];

/// 商品タイトルの候補キー
pub const PRODUCT_TITLE_KEYS: &[&str] = &["product_title"];

/// 商品IDの候補キー
pub const PRODUCT_ID_KEYS: &[&str] = &["product_id"];

/// リストIDの候補キー（設定デフォルトへのフォールバックは呼び出し側）
pub const LIST_ID_KEYS: &[&str] = &["klaviyo_list", "list_id"];

/// 候補キーリストから最初に存在する値を解決
///
/// 候補キーを先頭から順に調べ、非空文字列値を持つ最初のキーの
/// 値を返す。どの候補も存在しない場合はNone。
pub fn resolve_first<'a>(
    submission: &'a InboundSubmission,
    candidates: &[&str],
) -> Option<&'a str> {
    candidates.iter().find_map(|key| submission.get(key))
}

/// 電話番号を解決（候補キー＋フォールバックスキャン）
///
/// 候補キーで見つからない場合、全フィールドをスキャンして
/// キー名に"phone"を含む（大文字小文字を区別しない）最初の
/// エントリの値を返す。反復順序は辞書順で固定。
pub fn resolve_phone<'a>(submission: &'a InboundSubmission) -> Option<&'a str> {
    resolve_first(submission, PHONE_KEYS).or_else(|| {
        submission
            .iter()
            .find(|(key, _)| key.to_lowercase().contains("phone"))
            .map(|(_, value)| value)
    })
}

/// リストIDを解決（送信データ優先、次に設定デフォルト）
pub fn resolve_list_id(
    submission: &InboundSubmission,
    default_list_id: Option<&str>,
) -> Option<String> {
    resolve_first(submission, LIST_ID_KEYS)
        .map(str::to_string)
        .or_else(|| default_list_id.map(str::to_string))
}
