// アプリケーション層モジュール
pub mod forwarder;
pub mod http_handler;

// 再エクスポート
pub use forwarder::{ContactForwarder, ForwardError, ForwardResult};
pub use http_handler::ContactFormHandler;
