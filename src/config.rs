use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

const DEFAULT_REPOSITORIES: &str = "images,images1,images2,images3";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub upload: UploadConfig,
}

/// Everything the upload pipeline needs to reach the content repositories.
#[derive(Clone)]
pub struct UploadConfig {
    /// Account that owns every destination repository.
    pub owner: String,

    /// Ordered rotation of destination repositories. Never empty.
    pub repositories: Vec<String>,

    pub branch: String,
    pub api_base: String,
    pub raw_base: String,

    /// Content API credential. Only required when serving.
    pub token: Option<String>,
}

// Keeps the credential out of the startup log line.
impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("owner", &self.owner)
            .field("repositories", &self.repositories)
            .field("branch", &self.branch)
            .field("api_base", &self.api_base)
            .field("raw_base", &self.raw_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked image upload relay")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_RELAY_PORT / PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides IMAGE_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Repository owner (overrides IMAGE_RELAY_REPO_OWNER)
    #[arg(long)]
    pub owner: Option<String>,

    /// Comma separated repository rotation (overrides IMAGE_RELAY_REPOSITORIES)
    #[arg(long)]
    pub repositories: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("IMAGE_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env_parse::<u16>("IMAGE_RELAY_PORT")? {
            Some(port) => port,
            None => env_parse::<u16>("PORT")?.unwrap_or(5000),
        };
        let env_db = env::var("IMAGE_RELAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/image_relay.db".into());
        let env_owner = env::var("IMAGE_RELAY_REPO_OWNER").unwrap_or_else(|_| "bgridtech".into());
        let env_repos =
            env::var("IMAGE_RELAY_REPOSITORIES").unwrap_or_else(|_| DEFAULT_REPOSITORIES.into());

        // --- Merge ---
        let repositories = parse_repository_list(&args.repositories.unwrap_or(env_repos))?;
        let upload = UploadConfig {
            owner: args.owner.unwrap_or(env_owner),
            repositories,
            branch: env::var("IMAGE_RELAY_BRANCH").unwrap_or_else(|_| "main".into()),
            api_base: env::var("IMAGE_RELAY_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".into()),
            raw_base: env::var("IMAGE_RELAY_RAW_BASE")
                .unwrap_or_else(|_| "https://raw.githubusercontent.com".into()),
            token: env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: env_parse("IMAGE_RELAY_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            session_ttl_secs: env_parse("IMAGE_RELAY_SESSION_TTL_SECS")?.unwrap_or(3600),
            sweep_interval_secs: env_parse("IMAGE_RELAY_SWEEP_INTERVAL_SECS")?.unwrap_or(60),
            upload,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Split a comma separated repository list, dropping blanks.
pub fn parse_repository_list(raw: &str) -> Result<Vec<String>> {
    let repos: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if repos.is_empty() {
        bail!("repository list must name at least one repository");
    }
    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_list_is_trimmed_and_ordered() {
        let repos = parse_repository_list(" images, images1 ,,images2").unwrap();
        assert_eq!(repos, vec!["images", "images1", "images2"]);
    }

    #[test]
    fn empty_repository_list_is_rejected() {
        assert!(parse_repository_list("").is_err());
        assert!(parse_repository_list(" , ,").is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let cfg = UploadConfig {
            owner: "acme".into(),
            repositories: vec!["a".into()],
            branch: "main".into(),
            api_base: "https://api.github.com".into(),
            raw_base: "https://raw.githubusercontent.com".into(),
            token: Some("ghp_secret".into()),
        };
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
