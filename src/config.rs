use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Loopback listen address for both the proxy and the admin API.
    pub addr: String,
    /// Path of the SQLite database file.
    pub db_path: String,
    /// Directory holding `auth.json` for credential import.
    pub codex_home: PathBuf,
    /// Default upstream for `static_key` credentials. A per-credential
    /// `base_url` takes precedence.
    pub api_upstream: String,
    /// Fixed upstream for `interactive_login` credentials.
    pub chatgpt_upstream: String,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let codex_home = match std::env::var("CODEX_HOME") {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => {
            let home = std::env::var("HOME")
                .map_err(|_| anyhow::anyhow!("neither CODEX_HOME nor HOME is set"))?;
            PathBuf::from(home).join(".codex")
        }
    };

    Ok(Config {
        addr: std::env::var("CODEX_COMPANION_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
        db_path: std::env::var("CODEX_COMPANION_DB").unwrap_or_else(|_| "companion.db".into()),
        codex_home,
        api_upstream: std::env::var("CODEX_COMPANION_API_UPSTREAM")
            .unwrap_or_else(|_| "https://api.openai.com".into()),
        chatgpt_upstream: std::env::var("CODEX_COMPANION_CHATGPT_UPSTREAM")
            .unwrap_or_else(|_| "https://chatgpt.com/backend-api/codex".into()),
    })
}
