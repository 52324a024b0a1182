//! Operational helpers: logging setup and on-disk layout.

use std::path::{Path, PathBuf};

use platelog_types::{
    config::{OpsConfig, PlatelogConfig},
    PlatelogError, Result,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| PlatelogError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| PlatelogError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_data_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| PlatelogError::Ops(format!("failed to create data dir: {err}")))?;
    info!("Data directory ready at {:?}", dir);
    Ok(dir)
}

/// Location of the item store: `storage.data_file`, relative to
/// `ops.data_dir` unless absolute.
pub fn data_file_path(config: &PlatelogConfig) -> PathBuf {
    let file = Path::new(&config.storage.data_file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        Path::new(&config.ops.data_dir).join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_data_file_lives_in_data_dir() {
        let mut config = PlatelogConfig::default();
        config.ops.data_dir = "var/platelog".into();
        config.storage.data_file = "items.json".into();
        assert_eq!(
            data_file_path(&config),
            PathBuf::from("var/platelog/items.json")
        );
    }

    #[test]
    fn data_dir_is_created() {
        let root = tempfile::tempdir().expect("temp dir");
        let target = root.path().join("a").join("b");
        let created = ensure_data_dir(target.to_str().expect("utf8 path")).expect("create");
        assert!(created.is_dir());
    }
}
