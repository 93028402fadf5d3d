use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub business: BusinessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expires_in: String,
    /// 首次启动时若不存在超级管理员，则用以下账号创建
    pub bootstrap_admin_username: String,
    pub bootstrap_admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// 业务规则参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    /// 每位教练最多带的学员数 (default: 20)
    pub max_students_per_coach: i64,
    /// 每位学员最多选择的教练数 (default: 2)
    pub max_coaches_per_student: i64,
    /// 可提前预约的天数 (default: 7)
    pub booking_window_days: i64,
    /// 取消预约需提前的小时数 (default: 24)
    pub cancellation_lead_hours: i64,
    /// 每月最多取消次数 (default: 3)
    pub monthly_cancellation_limit: i64,
    /// 每个校区的球台数量 (default: 20)
    pub table_count: u32,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "tabletennis-admin")]
#[command(version, about = "Table tennis training center back office")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// JWT secret key (overrides config file)
    #[arg(long, value_name = "SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT expiration time (overrides config file, e.g., "24h")
    #[arg(long, value_name = "DURATION")]
    pub jwt_expires_in: Option<String>,

    /// Logging level (overrides config file, e.g., "info,tabletennis_admin=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_, `.env` is honoured)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        dotenvy::dotenv().ok();
        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: Server host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: Server port (default: 8080)
    /// - APP_DATABASE_URL: Database URL (default: sqlite://data/tabletennis.db)
    /// - APP_JWT_SECRET: JWT secret key
    /// - APP_JWT_EXPIRES_IN: JWT expiration time (e.g., "24h")
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,tabletennis_admin=debug")
    /// - APP_MAX_STUDENTS_PER_COACH, APP_MAX_COACHES_PER_STUDENT, APP_BOOKING_WINDOW_DAYS,
    ///   APP_CANCELLATION_LEAD_HOURS, APP_MONTHLY_CANCELLATION_LIMIT, APP_TABLE_COUNT: business limits
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(secret) = std::env::var("APP_JWT_SECRET") {
            self.auth.jwt_secret = secret;
            tracing::info!("Override auth.jwt_secret from env");
        }

        if let Ok(expires) = std::env::var("APP_JWT_EXPIRES_IN") {
            self.auth.jwt_expires_in = expires;
            tracing::info!("Override auth.jwt_expires_in from env: {}", self.auth.jwt_expires_in);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        let business = &mut self.business;
        let limits: [(&str, &mut i64); 5] = [
            ("APP_MAX_STUDENTS_PER_COACH", &mut business.max_students_per_coach),
            ("APP_MAX_COACHES_PER_STUDENT", &mut business.max_coaches_per_student),
            ("APP_BOOKING_WINDOW_DAYS", &mut business.booking_window_days),
            ("APP_CANCELLATION_LEAD_HOURS", &mut business.cancellation_lead_hours),
            ("APP_MONTHLY_CANCELLATION_LIMIT", &mut business.monthly_cancellation_limit),
        ];
        for (key, slot) in limits {
            if let Some(value) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
                *slot = value;
                tracing::info!("Override business limit from env: {}={}", key, value);
            }
        }

        if let Some(tables) = std::env::var("APP_TABLE_COUNT").ok().and_then(|v| v.parse().ok()) {
            business.table_count = tables;
            tracing::info!("Override business.table_count from env: {}", tables);
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(secret) = &args.jwt_secret {
            self.auth.jwt_secret = secret.clone();
            tracing::info!("Override auth.jwt_secret from CLI");
        }

        if let Some(expires) = &args.jwt_expires_in {
            self.auth.jwt_expires_in = expires.clone();
            tracing::info!("Override auth.jwt_expires_in from CLI: {}", self.auth.jwt_expires_in);
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.auth.jwt_secret == "dev-secret-key-change-in-production" {
            tracing::warn!("⚠️  WARNING: Using default JWT secret!");
            tracing::warn!(
                "⚠️  Please set APP_JWT_SECRET environment variable or update config.toml"
            );
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if let Err(e) = parse_duration_to_secs(&self.auth.jwt_expires_in) {
            anyhow::bail!("auth.jwt_expires_in is invalid: {}", e);
        }

        let b = &self.business;
        if b.max_students_per_coach <= 0
            || b.max_coaches_per_student <= 0
            || b.booking_window_days <= 0
            || b.cancellation_lead_hours < 0
            || b.monthly_cancellation_limit <= 0
            || b.table_count == 0
        {
            anyhow::bail!("business limits must be positive");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/tabletennis.db".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-key-change-in-production".to_string(),
            jwt_expires_in: "24h".to_string(),
            bootstrap_admin_username: "admin".to_string(),
            bootstrap_admin_password: "Admin@123".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,tabletennis_admin=debug".to_string(),
            file: Some("logs/tabletennis.log".to_string()),
        }
    }
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            max_students_per_coach: 20,
            max_coaches_per_student: 2,
            booking_window_days: 7,
            cancellation_lead_hours: 24,
            monthly_cancellation_limit: 3,
            table_count: 20,
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

pub fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // 纯数字按秒处理
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}
