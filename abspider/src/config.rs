use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanConfig {
    pub mode: Option<String>,
    pub batches: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub qps: Option<u32>,
    pub user_agent: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ReconConfig {
    pub mode: Option<String>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanConfig>,
    pub recon: Option<ReconConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("abspider.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
