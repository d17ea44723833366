use std::env;

/// Development-only signing secret. Never accepted in `Env::Production`.
const LOCAL_JWT_SECRET: &str = "local-development-jwt-secret-change-me";

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup
/// and shared read-only through `AppState` (pulled into handlers via `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` selects the in-memory repository (Local only).
    pub db_url: Option<String>,
    // S3-compatible storage endpoint URL (MinIO locally).
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_key: String,
    pub s3_secret: String,
    // Bucket holding uploaded content documents.
    pub s3_bucket: String,
    // Runtime environment marker. Controls the development auth bypass and log format.
    pub env: Env,
    // HMAC secret used to sign and verify access/refresh tokens.
    pub jwt_secret: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub bind_addr: String,
    // Upper bound for request bodies, documents included.
    pub max_upload_bytes: usize,
    // Optional bootstrap administrator created at startup when absent.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

/// Env
///
/// Runtime context: `Local` enables development conveniences (x-user-id bypass,
/// in-memory persistence, MinIO defaults), `Production` demands explicit secrets.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            db_url: None,
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_key: "admin".to_string(),
            s3_secret: "password".to_string(),
            s3_bucket: "cms-test".to_string(),
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl_secs: 300,
            refresh_token_ttl_secs: 86_400,
            bind_addr: "127.0.0.1:3000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables (after `.env` has been applied).
    ///
    /// # Panics
    /// Panics if a variable required in `Env::Production` is missing, or if a numeric
    /// variable cannot be parsed. The server must not start half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let access_token_ttl_secs = parse_var("ACCESS_TOKEN_TTL_SECS", 300);
        let refresh_token_ttl_secs = parse_var("REFRESH_TOKEN_TTL_SECS", 86_400);
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024);
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let s3_bucket = env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "cms-documents".to_string());
        let admin_email = env::var("ADMIN_EMAIL").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        match env {
            Env::Local => Self {
                env: Env::Local,
                db_url: env::var("DATABASE_URL").ok(),
                s3_endpoint: env::var("S3_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:9000".to_string()),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                s3_key: env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "admin".to_string()),
                s3_secret: env::var("S3_SECRET_KEY").unwrap_or_else(|_| "password".to_string()),
                s3_bucket,
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                access_token_ttl_secs,
                refresh_token_ttl_secs,
                bind_addr,
                max_upload_bytes,
                admin_email,
                admin_password,
            },
            Env::Production => Self {
                env: Env::Production,
                db_url: Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                ),
                s3_endpoint: env::var("S3_ENDPOINT").expect("FATAL: S3_ENDPOINT required in prod"),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                s3_key: env::var("S3_ACCESS_KEY").expect("FATAL: S3_ACCESS_KEY required in prod"),
                s3_secret: env::var("S3_SECRET_KEY")
                    .expect("FATAL: S3_SECRET_KEY required in prod"),
                s3_bucket,
                jwt_secret: env::var("JWT_SECRET")
                    .expect("FATAL: JWT_SECRET must be set in production."),
                access_token_ttl_secs,
                refresh_token_ttl_secs,
                bind_addr,
                max_upload_bytes,
                admin_email,
                admin_password,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be a non-negative integer")),
        Err(_) => default,
    }
}
