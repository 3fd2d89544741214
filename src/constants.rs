pub const API_BASE_URL: &str = "https://openapi.taptools.io";
pub const WALLET_TRADES_PATH: &str = "/api/v1/wallet/trades/tokens";

pub const API_KEY_VAR: &str = "TAPTOOLS_API_KEY";
pub const BASE_URL_VAR: &str = "TAPTOOLS_BASE_URL";
