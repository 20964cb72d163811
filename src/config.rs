//! Endpoint configuration. See [`Settings`].

use web_time::Duration;

use crate::{cipher::CIPHER_OVERHEAD, interface::Interface};

/// Smallest `max_data_size` that can hold a minimal symbol header plus the
/// cipher envelope's fixed overhead.
const MIN_DATA_SIZE: usize = CIPHER_OVERHEAD + 8;

/// Configuration for an [`Endpoint`](crate::Endpoint), built incrementally
/// and validated at [`Endpoint::initialize`](crate::Endpoint::initialize).
pub struct Settings {
    pub(crate) initiator: bool,
    pub(crate) target_loss: f64,
    pub(crate) min_loss: f64,
    pub(crate) min_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) max_data_size: usize,
    pub(crate) interface: Box<dyn Interface>,
}

impl Settings {
    /// Starts building settings with sensible defaults:
    /// `target_loss = 1e-4`, `min_loss = 1e-3`,
    /// `min_delay = 5ms`, `max_delay = 300ms`, `max_data_size = 1200`.
    #[must_use]
    pub fn new(initiator: bool, interface: Box<dyn Interface>) -> Self {
        Self {
            initiator,
            target_loss: 1e-4,
            min_loss: 1e-3,
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(300),
            max_data_size: 1200,
            interface,
        }
    }

    /// Sets the residual per-packet loss the redundancy planner targets.
    #[must_use]
    pub fn with_target_loss(mut self, target_loss: f64) -> Self {
        self.target_loss = target_loss;
        self
    }

    /// Sets the floor applied to the measured loss before planning redundancy.
    #[must_use]
    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        self.min_loss = min_loss;
        self
    }

    /// Sets the clamp range for the smoothed delay estimate.
    #[must_use]
    pub fn with_delay_bounds(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    /// Sets the ceiling on outbound datagram size after encryption.
    #[must_use]
    pub fn with_max_data_size(mut self, max_data_size: usize) -> Self {
        self.max_data_size = max_data_size;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_loss) {
            return Err(ConfigError::LossOutOfRange { min_loss: self.min_loss });
        }
        if self.min_delay > self.max_delay {
            return Err(ConfigError::DelayBoundsInverted {
                min_delay: self.min_delay,
                max_delay: self.max_delay,
            });
        }
        if self.max_data_size < MIN_DATA_SIZE {
            return Err(ConfigError::DataSizeTooSmall {
                max_data_size: self.max_data_size,
                min: MIN_DATA_SIZE,
            });
        }
        Ok(())
    }
}

/// Settings failed validation at [`Endpoint::initialize`](crate::Endpoint::initialize).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// `min_loss` fell outside `[0, 1]`.
    #[error("min_loss {min_loss} outside [0, 1]")]
    LossOutOfRange {
        /// The offending value.
        min_loss: f64,
    },
    /// `min_delay` exceeded `max_delay`.
    #[error("min_delay {min_delay:?} exceeds max_delay {max_delay:?}")]
    DelayBoundsInverted {
        /// The configured minimum.
        min_delay: Duration,
        /// The configured maximum.
        max_delay: Duration,
    },
    /// `max_data_size` could not hold headers plus cipher overhead.
    #[error("max_data_size {max_data_size} below minimum {min}")]
    DataSizeTooSmall {
        /// The configured ceiling.
        max_data_size: usize,
        /// The smallest workable value.
        min: usize,
    },
    /// The cipher rejected the supplied key material.
    #[error(transparent)]
    Key(#[from] crate::cipher::KeyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullInterface;
    impl Interface for NullInterface {
        fn on_packet(&mut self, _payload: &[u8]) {}
        fn on_oob(&mut self, _payload: &[u8]) {}
        fn send_data(&mut self, _packet: &[u8]) {}
    }

    #[test]
    fn defaults_validate() {
        let settings = Settings::new(true, Box::new(NullInterface));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_loss_out_of_range() {
        let settings = Settings::new(true, Box::new(NullInterface)).with_min_loss(1.5);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::LossOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let settings = Settings::new(true, Box::new(NullInterface))
            .with_delay_bounds(Duration::from_millis(100), Duration::from_millis(10));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DelayBoundsInverted { .. })
        ));
    }

    #[test]
    fn rejects_tiny_data_size() {
        let settings = Settings::new(true, Box::new(NullInterface)).with_max_data_size(4);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DataSizeTooSmall { .. })
        ));
    }
}
