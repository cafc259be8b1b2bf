use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in days.
    pub jwt_expire_days: i64,
    pub cors_origins: Vec<String>,
    pub frontend_url: String,
    pub static_dir: String,
    pub mail_webhook_url: Option<String>,
    pub mail_from: String,
    pub academy_name: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "development-secret-change-in-production".to_string(),
            jwt_expire_days: 30,
            cors_origins: vec!["http://localhost:5173".to_string()],
            frontend_url: "http://localhost:5173".to_string(),
            static_dir: "static".to_string(),
            mail_webhook_url: None,
            mail_from: "Courseware Academy <no-reply@localhost>".to_string(),
            academy_name: "Courseware Academy".to_string(),
            admin_email: None,
            admin_password: None,
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/courseware.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_expire_days: env::var("JWT_EXPIRE_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .filter(|d| *d > 0)
                .unwrap_or(defaults.jwt_expire_days),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or(defaults.cors_origins),
            frontend_url: env::var("FRONTEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            static_dir: env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
            mail_webhook_url: non_empty_var("MAIL_WEBHOOK_URL"),
            mail_from: env::var("MAIL_FROM").unwrap_or(defaults.mail_from),
            academy_name: env::var("ACADEMY_NAME").unwrap_or(defaults.academy_name),
            admin_email: non_empty_var("ADMIN_EMAIL"),
            admin_password: non_empty_var("ADMIN_PASSWORD"),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
