use std::{env, path::PathBuf, time::Duration};

use secrecy::SecretString;

const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "https://localhost:3000",
    "http://localhost:3000",
    "http://localhost:3001",
    "https://localhost:3001",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub http_port: u16,
    pub environment: String,
    pub tls: Option<TlsConfig>,
    pub jwt_secret: SecretString,
    pub jwt_ttl_hours: i64,
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
    pub public_dir: PathBuf,
    pub security_log_path: PathBuf,
    pub login_otp_enabled: bool,
    pub otp_ttl_minutes: i64,
    pub rate_limits: RateLimitConfig,
    pub khalti: KhaltiConfig,
    pub email: Option<EmailConfig>,
    pub recaptcha_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Per-tier request budgets. Each tier allows `max` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Key clients by `x-forwarded-for` / `x-real-ip` instead of the socket
    /// peer. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy: bool,
    pub general: RateLimitTier,
    pub auth: RateLimitTier,
    pub payment: RateLimitTier,
    pub password_reset: RateLimitTier,
    pub registration: RateLimitTier,
    pub api: RateLimitTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTier {
    pub max: u32,
    pub window: Duration,
}

impl RateLimitTier {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            general: RateLimitTier::new(100, 15 * 60),
            auth: RateLimitTier::new(5, 15 * 60),
            payment: RateLimitTier::new(3, 5 * 60),
            password_reset: RateLimitTier::new(3, 60 * 60),
            registration: RateLimitTier::new(5, 60 * 60),
            api: RateLimitTier::new(60, 60),
        }
    }
}

impl RateLimitConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        let tier = |key: &str, default: RateLimitTier| RateLimitTier {
            max: env_parse(key).unwrap_or(default.max),
            window: default.window,
        };
        Self {
            trust_proxy: env_parse("TRUST_PROXY").unwrap_or(defaults.trust_proxy),
            general: tier("RATE_LIMIT_GENERAL_MAX", defaults.general),
            auth: tier("RATE_LIMIT_AUTH_MAX", defaults.auth),
            payment: tier("RATE_LIMIT_PAYMENT_MAX", defaults.payment),
            password_reset: tier("RATE_LIMIT_PASSWORD_RESET_MAX", defaults.password_reset),
            registration: tier("RATE_LIMIT_REGISTRATION_MAX", defaults.registration),
            api: tier("RATE_LIMIT_API_MAX", defaults.api),
        }
    }
}

#[derive(Clone, Default)]
pub struct KhaltiConfig {
    pub secret_key: Option<SecretString>,
    pub gateway_url: Option<String>,
    /// Public base URL of this API, used to build Khalti's `return_url`.
    pub backend_uri: Option<String>,
    pub website_url: String,
}

impl std::fmt::Debug for KhaltiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KhaltiConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("gateway_url", &self.gateway_url)
            .field("backend_uri", &self.backend_uri)
            .field("website_url", &self.website_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("APP_PORT").unwrap_or(5000);
        let http_port = env_parse("HTTP_PORT").unwrap_or(5001);

        let tls = match (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            _ => None,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect());

        let email = match (env::var("EMAIL_USER"), env::var("EMAIL_PASSWORD")) {
            (Ok(user), Ok(password)) => Some(EmailConfig {
                smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
                smtp_port: env_parse("SMTP_PORT").unwrap_or(587),
                from_address: env::var("EMAIL_FROM").unwrap_or_else(|_| user.clone()),
                smtp_username: user,
                smtp_password: SecretString::from(password),
            }),
            _ => None,
        };

        let khalti = KhaltiConfig {
            secret_key: env_secret("KHALTI_SECRET_KEY"),
            gateway_url: env_non_empty("KHALTI_GATEWAY_URL"),
            backend_uri: env_non_empty("BACKEND_URI"),
            website_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        };

        Ok(Self {
            database_url,
            host,
            port,
            http_port,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            tls,
            jwt_secret: SecretString::from(jwt_secret),
            jwt_ttl_hours: env_parse("JWT_TTL_HOURS").unwrap_or(24),
            cors_origins,
            body_limit: env_parse("BODY_LIMIT_BYTES").unwrap_or(10 * 1024 * 1024),
            public_dir: env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".into()).into(),
            security_log_path: env::var("SECURITY_LOG_PATH")
                .unwrap_or_else(|_| "logs/security.log".into())
                .into(),
            login_otp_enabled: env_parse("LOGIN_OTP_ENABLED").unwrap_or(true),
            otp_ttl_minutes: env_parse("OTP_TTL_MINUTES").unwrap_or(10),
            rate_limits: RateLimitConfig::from_env(),
            khalti,
            email,
            recaptcha_secret: env_secret("RECAPTCHA_SECRET_KEY"),
        })
    }

    /// Configuration used by tests and tooling that never touch the network.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "postgres://localhost/sparklenest_test".into(),
            host: "127.0.0.1".into(),
            port: 5000,
            http_port: 5001,
            environment: "test".into(),
            tls: None,
            jwt_secret: SecretString::from(jwt_secret.to_string()),
            jwt_ttl_hours: 24,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            body_limit: 10 * 1024 * 1024,
            public_dir: env::temp_dir().join("sparklenest-public"),
            security_log_path: env::temp_dir().join("sparklenest-security.log"),
            login_otp_enabled: false,
            otp_ttl_minutes: 10,
            rate_limits: RateLimitConfig::default(),
            khalti: KhaltiConfig::default(),
            email: None,
            recaptcha_secret: None,
        }
    }

    pub fn products_dir(&self) -> PathBuf {
        self.public_dir.join("products")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.public_dir.join("profile")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_secret(key: &str) -> Option<SecretString> {
    env_non_empty(key).map(SecretString::from)
}
