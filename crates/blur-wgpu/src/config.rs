//! Runtime blur parameters

use crate::error::{BlurError, Result};
use crate::kernel::BlurKernel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of one blur run
///
/// ```yaml
/// iterations: 8
/// radius: 10.0
/// sigma: 2.0 # optional
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurConfig {
    /// Number of convolution passes, alternating horizontal and vertical
    pub iterations: u32,
    /// Tap spacing in pixels
    pub radius: f32,
    /// Standard deviation for derived kernel weights; `None` keeps the standard weights
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f32>,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            iterations: 8,
            radius: 10.0,
            sigma: None,
        }
    }
}

impl BlurConfig {
    /// Parses a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml_content: &str) -> Result<Self> {
        let config: Self = serde_norway::from_str(yaml_content).map_err(|e| BlurError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| BlurError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&content)
    }

    /// Rejects radii and sigmas that cannot produce a meaningful kernel
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(BlurError::InvalidConfig(format!("radius must be finite and non-negative, got {}", self.radius)));
        }
        match self.sigma {
            Some(sigma) if !sigma.is_finite() || sigma <= 0.0 => {
                return Err(BlurError::InvalidConfig(format!("sigma must be finite and positive, got {sigma}")));
            }
            _ => {}
        }
        Ok(())
    }

    /// Kernel used by every convolution pass
    pub fn kernel(&self) -> BlurKernel {
        match self.sigma {
            Some(sigma) => BlurKernel::from_sigma(sigma),
            None => BlurKernel::STANDARD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BlurConfig::default();
        assert_eq!(config.iterations, 8);
        assert_eq!(config.radius, 10.0);
        assert_eq!(config.sigma, None);
        assert_eq!(config.kernel(), BlurKernel::STANDARD);
    }

    #[test]
    fn yaml_fills_missing_fields() {
        let config = BlurConfig::from_yaml_str("iterations: 3\n").unwrap();
        assert_eq!(config, BlurConfig { iterations: 3, ..Default::default() });

        let config = BlurConfig::from_yaml_str("radius: 2.5\nsigma: 1.5\n").unwrap();
        assert_eq!(config.iterations, 8);
        assert_eq!(config.radius, 2.5);
        assert_eq!(config.kernel(), BlurKernel::from_sigma(1.5));
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        let err = BlurConfig::from_yaml_str("iteratons: 3\n").unwrap_err();
        assert!(matches!(err, BlurError::Config(_)), "{err}");
    }

    #[test]
    fn rejects_bad_values() {
        let negative = BlurConfig { radius: -1.0, ..Default::default() };
        assert!(matches!(negative.validate(), Err(BlurError::InvalidConfig(_))));

        let nan = BlurConfig { radius: f32::NAN, ..Default::default() };
        assert!(matches!(nan.validate(), Err(BlurError::InvalidConfig(_))));

        let zero_sigma = BlurConfig { sigma: Some(0.0), ..Default::default() };
        assert!(matches!(zero_sigma.validate(), Err(BlurError::InvalidConfig(_))));

        assert!(matches!(BlurConfig::from_yaml_str("radius: -4\n"), Err(BlurError::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = BlurConfig::from_yaml_file("/nonexistent/blur.yaml").unwrap_err();
        assert!(matches!(err, BlurError::Config(_)));
    }
}
