// インフラストラクチャ層モジュール
pub mod config;
pub mod klaviyo_client;
pub mod logging;

// 再エクスポート
pub use config::{ConfigError, ForwarderConfig};
pub use klaviyo_client::{
    ApiCallOutcome, KlaviyoClient, KlaviyoError, MarketingApi, ProfileUpsert,
};
pub use logging::init_logging;
