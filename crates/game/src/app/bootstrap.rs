use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sim::{
    builtin_kind_database, load_kind_database, ContentCompileError, GridError, KindDatabase,
    SimConfig, WorldError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::loop_runner::LoopConfig;

pub(crate) const CONFIG_ENV_VAR: &str = "TILESIM_CONFIG";
pub(crate) const CONTENT_ENV_VAR: &str = "TILESIM_CONTENT";

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    ParseConfig(String),
    #[error(transparent)]
    Content(#[from] ContentCompileError),
    #[error(transparent)]
    Map(#[from] GridError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("failed to serialize world snapshot: {0}")]
    Snapshot(#[source] serde_json::Error),
}

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) sim_config: SimConfig,
    pub(crate) kinds: Arc<KindDatabase>,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Tile Sim Startup ===");

    let sim_config = match env_path(CONFIG_ENV_VAR) {
        Some(path) => load_sim_config(&path)?,
        None => SimConfig::default(),
    };
    let kinds = match env_path(CONTENT_ENV_VAR) {
        Some(path) => {
            info!(path = %path.display(), "content_loading");
            load_kind_database(&path)?
        }
        None => builtin_kind_database()?,
    };
    info!(
        kinds = kinds.kind_count(),
        sprites = kinds.sprite_count(),
        frame_rate = sim_config.frame_rate,
        "content_ready"
    );

    Ok(AppWiring {
        loop_config: LoopConfig::default(),
        sim_config,
        kinds: Arc::new(kinds),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn load_sim_config(path: &Path) -> Result<SimConfig, AppError> {
    let raw = fs::read_to_string(path).map_err(|source| AppError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_sim_config_json(&raw).map_err(AppError::ParseConfig)?;
    info!(path = %path.display(), "config_loaded");
    Ok(config)
}

fn parse_sim_config_json(raw: &str) -> Result<SimConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, SimConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse sim config json: {source}"))
            } else {
                Err(format!("parse sim config json at {path}: {source}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_sim_config_json(r#"{ "frame_rate": 25, "instant_zoning": true }"#)
            .expect("parse");

        assert_eq!(config.frame_rate, 25);
        assert!(config.instant_zoning);
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.aggro_poll_interval_ms, 1000);
    }

    #[test]
    fn type_errors_name_the_offending_field() {
        let error = parse_sim_config_json(r#"{ "tile_size": "big" }"#).expect_err("bad type");
        assert!(error.starts_with("parse sim config json at tile_size:"), "{error}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = parse_sim_config_json(r#"{ "tick_rate": 30 }"#).expect_err("unknown field");
        assert!(error.contains("tick_rate"), "{error}");
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sim.json");
        fs::write(&path, r#"{ "hurt_flash_ms": 120 }"#).expect("write");

        let config = load_sim_config(&path).expect("load");
        assert_eq!(config.hurt_flash_ms, 120);

        let missing = load_sim_config(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(AppError::ReadConfig { .. })));
    }
}
