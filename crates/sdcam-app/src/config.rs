//! Application settings, stored as JSON.

use anyhow::{ensure, Context, Result};
use sdcam_video::AcquisitionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub video: VideoConfig,
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Command port of the camera front end.
    pub remote: String,
    pub local: String,
    pub timeout_ms: u64,
    /// "little" or "big".
    pub word_order: String,
    /// Talk to the in-process emulated device instead of the network.
    pub loopback: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            remote: "192.168.10.2:50000".to_string(),
            local: "0.0.0.0:0".to_string(),
            timeout_ms: 200,
            word_order: "little".to_string(),
            loopback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: usize,
    pub height: usize,
    /// Natural frame period of the capture source.
    pub frame_period_ms: u64,
    pub display_capacity: usize,
    #[serde(flatten)]
    pub acquisition: AcquisitionConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            frame_period_ms: 40,
            display_capacity: sdcam_video::DISPLAY_QUEUE_CAPACITY,
            acquisition: AcquisitionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub registers: Vec<RegisterWrite>,
    pub camera: Vec<RegisterWrite>,
    /// Read every startup write back and warn on mismatch.
    pub verify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    pub address: u16,
    pub value: u16,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sdcam").join("config.json"))
    }

    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the built-in defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    log::info!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        log::info!("Using config: {}", path.display());
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate().with_context(|| format!("checking {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.video.display_capacity > 0, "video.display_capacity must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_round_trip_through_json() {
        let text = serde_json::to_string(&AppConfig::default()).unwrap();
        let back: AppConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.video.display_capacity, 20);
        assert_eq!(back.video.acquisition.frame_interval_ms, 40);
        assert_eq!(back.device.word_order, "little");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"device": {{"loopback": true}}, "video": {{"gain": 3}},
                "startup": {{"registers": [{{"address": 65, "value": 2}}]}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert!(config.device.loopback);
        assert_eq!(config.device.timeout_ms, 200);
        assert_eq!(config.video.acquisition.gain, 3);
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.startup.registers, vec![RegisterWrite { address: 0x41, value: 2 }]);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn zero_display_capacity_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"video": {{"display_capacity": 0}}}}"#).unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("display_capacity"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
