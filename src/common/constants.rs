pub const RUN_MSG: &str = r#"
   ____ __  __  ____ _   _   ____        _
  / ___|  \/  |/ ___| \ | | / ___| _ __ (_)_ __   ___ _ __
 | |  _| |\/| | |  _|  \| | \___ \| '_ \| | '_ \ / _ \ '__|
 | |_| | |  | | |_| | |\  |  ___) | | | | | |_) |  __/ |
  \____|_|  |_|\____|_| \_| |____/|_| |_|_| .__/ \___|_|
                                          |_|
"#;

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

pub const DEFAULT_GMGN_API_HOST: &str = "https://gmgn.ai";
pub const DEFAULT_SOLANA_RPC: &str = "https://api.mainnet-beta.solana.com";
pub const GMGN_USER_AGENT: &str = "GMGN-Trading-Bot/1.0";
pub const DEFAULT_GMGN_TELEGRAM_BOT: &str = "@GMGN_sol_bot";

pub const SWAP_ROUTE_PATH: &str = "/defi/router/v1/sol/tx/get_swap_route";
pub const SUBMIT_TX_PATH: &str = "/defi/router/v1/sol/tx/submit";
pub const HEALTH_PATH: &str = "/api/health";

// 1 request per second against the public endpoints
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;

/// Limit orders placed through the GMGN bot expire after one hour.
pub const LIMIT_ORDER_EXPIRY_SECS: u64 = 3600;

pub const MAX_TRADE_HISTORY: usize = 100;
pub const MAX_ALERTS: usize = 50;
pub const MAX_METRIC_SAMPLES: usize = 1000;
