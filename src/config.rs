use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL that uploaded objects are served from.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            match get(key) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => bail!("{key} must be set"),
            }
        };
        let minutes = |key: &str, default: i64| -> anyhow::Result<i64> {
            match get(key) {
                Some(v) => v
                    .parse::<i64>()
                    .with_context(|| format!("{key} must be a number of minutes")),
                None => Ok(default),
            }
        };

        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "vidtube".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "vidtube-users".into()),
            access_ttl_minutes: minutes("ACCESS_TOKEN_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: minutes("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 14)?,
        };
        if jwt.access_secret == jwt.refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let endpoint = required("S3_ENDPOINT")?;
        let bucket = required("S3_BUCKET")?;
        let public_url = get("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            region: get("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            public_url: public_url.trim_end_matches('/').to_string(),
            endpoint,
            bucket,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt,
            storage,
            cors_origin: get("CORS_ORIGIN").filter(|v| !v.trim().is_empty()),
        })
    }
}
