use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletionConfig {
    /// Days between a deletion request and the sweep purging the account.
    pub grace_period_days: i64,
    pub sweep_interval_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// Directory where generated PDF artifacts are written.
    pub dir: String,
    /// Headless browser binary used for HTML-to-PDF conversion.
    pub renderer_bin: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub deletion: DeletionConfig,
    pub reports: ReportsConfig,
    pub assistant: AssistantConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "travelmate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "travelmate-users".into()),
            access_ttl_minutes: env_or("JWT_ACCESS_TTL_MINUTES", 60),
            refresh_ttl_days: env_or("JWT_REFRESH_TTL_DAYS", 7),
        };
        let deletion = DeletionConfig {
            grace_period_days: env_or("DELETION_GRACE_PERIOD_DAYS", 30),
            sweep_interval_hours: env_or("DELETION_SWEEP_INTERVAL_HOURS", 24),
        };
        let reports = ReportsConfig {
            dir: std::env::var("REPORTS_DIR").unwrap_or_else(|_| "./reports".into()),
            renderer_bin: std::env::var("PDF_RENDERER_BIN").unwrap_or_else(|_| "chromium".into()),
            timeout_secs: env_or("PDF_TIMEOUT_SECS", 30),
        };
        let assistant = AssistantConfig {
            endpoint: std::env::var("ASSISTANT_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:11434/api/generate".into()),
            api_key: std::env::var("ASSISTANT_API_KEY").unwrap_or_default(),
            timeout_secs: env_or("ASSISTANT_TIMEOUT_SECS", 60),
        };
        Ok(Self {
            database_url,
            jwt,
            deletion,
            reports,
            assistant,
        })
    }
}
