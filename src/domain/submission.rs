// 受信フォーム送信データ
//
// ストアフロントから受信した任意キーのJSONボディを、
// フィールド名→非空文字列値の正規化済みマップとして保持する。
// キーはフォームテンプレートごとに異なる（contact[email]、email等）。

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// 送信ボディ解析のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmissionParseError {
    /// JSONとして解析できない
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    /// JSONオブジェクトではない（配列・数値など）
    #[error("Request body is not a JSON object")]
    NotAnObject,
}

/// 正規化済みのフォーム送信データ
///
/// 値は非空文字列のみ保持する。JSON文字列値はそのまま、
/// 数値・真偽値は文字列表現に変換し、null・配列・ネストした
/// オブジェクトは欠落として扱う。空白のみの値も欠落扱い。
///
/// キーの反復順序は辞書順で固定されるため、
/// 電話番号のフォールバックスキャンは決定的になる。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundSubmission {
    /// 正規化済みフィールド
    fields: BTreeMap<String, String>,
}

impl InboundSubmission {
    /// 生のリクエストボディから送信データを構築
    ///
    /// JSONオブジェクト、またはオブジェクトをJSONエンコードした
    /// 文字列の両方を受け付ける（ストアフロント側の実装差異対応）。
    pub fn from_body(body: &[u8]) -> Result<Self, SubmissionParseError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SubmissionParseError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// 解析済みJSON値から送信データを構築
    pub fn from_value(value: Value) -> Result<Self, SubmissionParseError> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: normalize(map),
            }),
            // JSONエンコードされた文字列（二重エンコード）を一段展開
            Value::String(inner) => {
                let parsed: Value = serde_json::from_str(&inner)
                    .map_err(|e| SubmissionParseError::InvalidJson(e.to_string()))?;
                match parsed {
                    Value::Object(map) => Ok(Self {
                        fields: normalize(map),
                    }),
                    _ => Err(SubmissionParseError::NotAnObject),
                }
            }
            _ => Err(SubmissionParseError::NotAnObject),
        }
    }

    /// キー・値ペアから直接構築（テスト用）
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 指定キーの値を取得（存在しない場合はNone）
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// 全フィールドを辞書順で反復
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// フィールド数を取得
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// フィールドが空かどうか
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// JSONオブジェクトを文字列マップに正規化
fn normalize(map: serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    map.into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                // null・配列・ネストしたオブジェクトは欠落扱い
                _ => return None,
            };
            if text.trim().is_empty() {
                None
            } else {
                Some((key, text))
            }
        })
        .collect()
}
