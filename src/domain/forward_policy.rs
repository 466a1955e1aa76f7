// リスト紐付け失敗時のポリシー
//
// 二次ステップ（リスト紐付け）の上流エラーを致命的とするか、
// 警告ログと結果への記録に留めるかを1箇所の明示的な設定で決める。

use std::str::FromStr;

/// リスト紐付けステップ失敗時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkFailurePolicy {
    /// 失敗を致命的エラーとして扱う（HTTP 502）
    FailFast,
    /// 失敗を警告として記録し、全体は成功として応答する
    #[default]
    BestEffort,
}

impl FromStr for LinkFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown link failure policy: {other} (expected fail_fast or best_effort)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_best_effort() {
        assert_eq!(LinkFailurePolicy::default(), LinkFailurePolicy::BestEffort);
    }

    #[test]
    fn test_parse_fail_fast() {
        assert_eq!(
            "fail_fast".parse::<LinkFailurePolicy>().unwrap(),
            LinkFailurePolicy::FailFast
        );
    }

    #[test]
    fn test_parse_best_effort() {
        assert_eq!(
            "best_effort".parse::<LinkFailurePolicy>().unwrap(),
            LinkFailurePolicy::BestEffort
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "FAIL_FAST".parse::<LinkFailurePolicy>().unwrap(),
            LinkFailurePolicy::FailFast
        );
        assert_eq!(
            "  Best_Effort ".parse::<LinkFailurePolicy>().unwrap(),
            LinkFailurePolicy::BestEffort
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let result = "sometimes".parse::<LinkFailurePolicy>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("sometimes"));
    }
}
