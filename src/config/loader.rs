use std::io::ErrorKind;
use std::path::Path;

use super::{AppConfig, ConfigError};

/// Read a YAML application config, then check its addresses and LB config
/// list. A missing file is `NotFound`, not `Io`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
        _ => ConfigError::Io(e),
    })?;
    let config: AppConfig = serde_yaml::from_str(&content)?;
    config.validate()?;

    tracing::debug!(
        path = %path.display(),
        authority = %config.channel.authority,
        addresses = config.addresses.len(),
        "Loaded imbalancer configuration"
    );
    Ok(config)
}
