/// `load_config` module: the persisted profile store — named publish-target
/// configurations plus the last-used one, JSON-serialized like the original
/// plugin's key-value storage.
///
/// This module is the only place where untrusted JSON is parsed and mapped
/// to rich, strongly-typed internal structs.
///
/// # Responsibilities
/// - Parse the profile-store file into type-safe Rust structs
/// - Track which profile was used last
/// - Inject environment variables for secret fields (repo token, storage
///   keys) when present
/// - A missing or unparseable store degrades to an empty one (logged), never
///   a crash: the store is convenience state, not a source of truth
///
/// # Errors
/// Failures worth surfacing (a store that cannot be written, a profile that
/// cannot be resolved) use `anyhow::Error` for context-rich diagnostics at
/// the CLI boundary.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use blog_sync_core::publish::StagingFile;

fn default_branch() -> String {
    "master".to_string()
}

fn default_asset_root() -> String {
    "images".to_string()
}

/// Repository coordinates and credentials for one publish target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default)]
    pub token: String,
    pub owner: String,
    pub repo: String,
    /// Blank means "use `default_branch`".
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Optional CI handoff file; writes go here when configured.
    #[serde(default)]
    pub staging: Option<StagingFile>,
}

/// Object-storage credentials and coordinates for asset sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosSettings {
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
}

impl CosSettings {
    /// Bucket root endpoint, e.g. `https://blog-1250000000.cos.ap-beijing.myqcloud.com`.
    pub fn base_url(&self) -> String {
        format!("https://{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }
}

/// One named publish configuration. Storage settings are optional: a profile
/// without them publishes text only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub github: GithubSettings,
    #[serde(default)]
    pub cos: Option<CosSettings>,
}

/// The on-disk store: every saved profile plus the name used last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// Load the profile store. Absence and parse failures both degrade to an
/// empty store so a fresh machine starts clean.
pub fn load_store<P: AsRef<Path>>(path: P) -> ProfileStore {
    let path_ref = path.as_ref();
    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            info!(store = ?path_ref, error = ?e, "Profile store not readable, starting empty");
            return ProfileStore::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(store) => {
            info!(store = ?path_ref, "Loaded profile store");
            store
        }
        Err(e) => {
            warn!(store = ?path_ref, error = ?e, "Profile store is not valid JSON, starting empty");
            ProfileStore::default()
        }
    }
}

/// Persist the store.
pub fn save_store<P: AsRef<Path>>(path: P, store: &ProfileStore) -> Result<()> {
    let path_ref = path.as_ref();
    let json = serde_json::to_string_pretty(store).context("serializing profile store")?;
    fs::write(path_ref, json)
        .with_context(|| format!("writing profile store {:?}", path_ref))?;
    info!(store = ?path_ref, "Saved profile store");
    Ok(())
}

/// Resolve which profile a publish should use: an explicit name, else the
/// last-used one, else the sole stored profile.
pub fn select_profile<'a>(
    store: &'a ProfileStore,
    name: Option<&str>,
) -> Result<(String, &'a Profile)> {
    if let Some(name) = name {
        return match store.profiles.get(name) {
            Some(profile) => Ok((name.to_string(), profile)),
            None => {
                error!(profile = name, "Requested profile does not exist");
                bail!("no profile named '{name}' in the store")
            }
        };
    }
    if let Some(last) = &store.last_used {
        if let Some(profile) = store.profiles.get(last) {
            info!(profile = %last, "Using last-used profile");
            return Ok((last.clone(), profile));
        }
    }
    if store.profiles.len() == 1 {
        let (name, profile) = store.profiles.iter().next().expect("len checked");
        return Ok((name.clone(), profile));
    }
    bail!("no profile selected: pass --profile or store exactly one")
}

/// Override secrets from the environment when set: `GITHUB_TOKEN`,
/// `COS_SECRET_ID`, `COS_SECRET_KEY`.
pub fn apply_env_overrides(profile: &mut Profile) {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.trim().is_empty() {
            info!("Repository token taken from GITHUB_TOKEN");
            profile.github.token = token;
        }
    }
    if let Some(cos) = profile.cos.as_mut() {
        if let Ok(id) = std::env::var("COS_SECRET_ID") {
            if !id.trim().is_empty() {
                cos.secret_id = id;
            }
        }
        if let Ok(key) = std::env::var("COS_SECRET_KEY") {
            if !key.trim().is_empty() {
                cos.secret_key = key;
            }
        }
    }
}
