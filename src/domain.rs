// ドメイン層モジュール
pub mod contact_record;
pub mod field_resolver;
pub mod forward_policy;
pub mod submission;

// 再エクスポート
pub use contact_record::{ContactRecord, ResolveError};
pub use forward_policy::LinkFailurePolicy;
pub use submission::{InboundSubmission, SubmissionParseError};
