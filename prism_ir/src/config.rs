//! Configuration for graph construction, escape analysis and the pipeline.
//!
//! Defaults suit ordinary method-sized compilation units. Presets trade
//! compile time against how many allocations escape analysis may remove.

use thiserror::Error;

/// Largest array escape analysis will ever scalar-replace.
pub const MAX_VIRTUAL_ARRAY_LENGTH: u32 = 1024;

/// Largest node capacity a graph may pre-reserve.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 24;

// =============================================================================
// Graph
// =============================================================================

/// Configuration for a single graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Node slots reserved up front.
    ///
    /// Default: 64
    pub initial_capacity: usize,

    /// Run structural verification when the graph is finalized.
    ///
    /// Default: true
    pub verify_on_finalize: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            verify_on_finalize: true,
        }
    }
}

impl GraphConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(ConfigError::CapacityTooLarge(self.initial_capacity));
        }
        Ok(())
    }
}

// =============================================================================
// Escape Analysis
// =============================================================================

/// Configuration for escape analysis and scalar replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeConfig {
    /// Run the pass at all.
    ///
    /// Default: true
    pub enabled: bool,

    /// Instance types with more fields than this stay materialized.
    ///
    /// Default: 32
    pub max_fields: usize,

    /// Arrays longer than this stay materialized.
    ///
    /// Default: 16
    pub max_array_length: u32,
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_fields: 32,
            max_array_length: 16,
        }
    }
}

impl EscapeConfig {
    /// Small objects only.
    pub fn conservative() -> Self {
        Self {
            enabled: true,
            max_fields: 8,
            max_array_length: 4,
        }
    }

    /// Virtualize everything within the hard limits.
    pub fn aggressive() -> Self {
        Self {
            enabled: true,
            max_fields: 256,
            max_array_length: MAX_VIRTUAL_ARRAY_LENGTH,
        }
    }

    /// Escape analysis switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.max_fields == 0 {
            return Err(ConfigError::ZeroFieldLimit);
        }
        if self.max_array_length > MAX_VIRTUAL_ARRAY_LENGTH {
            return Err(ConfigError::ArrayLimitTooLarge(self.max_array_length));
        }
        Ok(())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Configuration for the per-unit pipeline driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Settings applied to every graph the pipeline runs.
    pub graph: GraphConfig,
    /// Escape analysis settings.
    pub escape: EscapeConfig,
    /// Verify structure before escape analysis touches the graph.
    ///
    /// Default: true
    pub verify_before_escape: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            escape: EscapeConfig::default(),
            verify_before_escape: true,
        }
    }
}

impl PipelineConfig {
    /// Pipeline with escape analysis disabled.
    pub fn without_escape() -> Self {
        Self {
            escape: EscapeConfig::disabled(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate()?;
        self.escape.validate()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("initial capacity {0} exceeds {max}", max = MAX_INITIAL_CAPACITY)]
    CapacityTooLarge(usize),
    #[error("field limit must be at least 1 when escape analysis is enabled")]
    ZeroFieldLimit,
    #[error("array length limit {0} exceeds {max}", max = MAX_VIRTUAL_ARRAY_LENGTH)]
    ArrayLimitTooLarge(u32),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_preset_configs_are_valid() {
        assert!(EscapeConfig::conservative().validate().is_ok());
        assert!(EscapeConfig::aggressive().validate().is_ok());
        assert!(EscapeConfig::disabled().validate().is_ok());
        assert!(PipelineConfig::without_escape().validate().is_ok());
    }

    #[test]
    fn test_zero_field_limit() {
        let config = EscapeConfig {
            max_fields: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroFieldLimit));

        // Irrelevant while disabled.
        let config = EscapeConfig {
            enabled: false,
            max_fields: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_array_limit_too_large() {
        let config = PipelineConfig {
            escape: EscapeConfig {
                max_array_length: MAX_VIRTUAL_ARRAY_LENGTH + 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ArrayLimitTooLarge(MAX_VIRTUAL_ARRAY_LENGTH + 1))
        );
    }

    #[test]
    fn test_capacity_too_large() {
        let config = GraphConfig {
            initial_capacity: MAX_INITIAL_CAPACITY + 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge(_))
        ));
    }
}
