//! # Lantern Courier
//!
//! Store-and-forward for the Lantern mesh. When a station composes a
//! message while the room is unreachable, the courier holds it: parcels
//! carry a lifetime and a priority, the queue drains in priority order
//! when connectivity returns, and delivery confirmations for emergencies
//! are tracked against a deadline.
//!
//! This crate is pure logic; the node wires it to the transport.
//!
//! ## Key Types
//!
//! - [`Parcel`]: a queued message with lifetime, priority, and attempt count
//! - [`CourierQueue`]: the offline queue
//! - [`SeenCache`]: duplicate suppression for gossip redelivery
//! - [`DeliveryTracker`]: pending-ack bookkeeping and delivery events

pub mod delivery;
pub mod error;
pub mod parcel;
pub mod queue;
pub mod seen;

pub use delivery::{DeliveryEvent, DeliveryTracker, PendingDelivery};
pub use error::{CourierError, CourierResult};
pub use parcel::{Parcel, Priority};
pub use queue::{CourierQueue, QueueStats};
pub use seen::SeenCache;

use std::time::Duration;

/// Configuration for the courier subsystem
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Maximum parcels held in the queue
    pub max_queued: usize,
    /// Send attempts before a parcel is declared failed
    pub max_attempts: u32,
    /// Lifetime assigned to queued parcels
    pub default_lifetime: Duration,
    /// How long to wait for a delivery confirmation
    pub ack_deadline: Duration,
    /// How long seen message ids are remembered
    pub seen_ttl: Duration,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            max_queued: 512,
            max_attempts: 8,
            default_lifetime: Duration::from_secs(86400), // 24 hours
            ack_deadline: Duration::from_secs(120),
            seen_ttl: Duration::from_secs(3600),
        }
    }
}

impl CourierConfig {
    /// Config for long field deployments with sparse connectivity
    ///
    /// Large queue, long lifetimes, patient retries.
    pub fn field_deployment() -> Self {
        Self {
            max_queued: 2048,
            max_attempts: 16,
            default_lifetime: Duration::from_secs(86400 * 3),
            ack_deadline: Duration::from_secs(600),
            seen_ttl: Duration::from_secs(7200),
        }
    }

    /// Config for drills and tests
    ///
    /// Everything short so exercises finish quickly.
    pub fn drill() -> Self {
        Self {
            max_queued: 64,
            max_attempts: 3,
            default_lifetime: Duration::from_secs(600),
            ack_deadline: Duration::from_secs(15),
            seen_ttl: Duration::from_secs(300),
        }
    }

    /// The default lifetime as a chrono duration for parcel construction
    pub fn parcel_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_lifetime.as_secs() as i64)
    }

    /// Validate configuration invariants
    ///
    /// Returns a list of warnings if the configuration has potential
    /// issues. An empty list means the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.default_lifetime.is_zero() {
            warnings.push(ConfigWarning::ZeroLifetime);
        }
        if self.max_attempts == 0 {
            warnings.push(ConfigWarning::ZeroAttempts);
        }
        if self.max_queued < 16 {
            warnings.push(ConfigWarning::TinyQueue);
        }
        if self.ack_deadline > self.default_lifetime && !self.default_lifetime.is_zero() {
            warnings.push(ConfigWarning::AckDeadlineExceedsLifetime);
        }

        warnings
    }

    /// Check if the configuration is valid (no warnings)
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Parcels would expire immediately
    ZeroLifetime,
    /// Parcels could never be sent
    ZeroAttempts,
    /// Queue too small to ride out an outage
    TinyQueue,
    /// Confirmations would outlive the parcels they confirm
    AckDeadlineExceedsLifetime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CourierConfig::default().is_valid());
        assert!(CourierConfig::field_deployment().is_valid());
        assert!(CourierConfig::drill().is_valid());
    }

    #[test]
    fn test_validation_catches_degenerate_configs() {
        let mut config = CourierConfig::default();
        config.default_lifetime = Duration::ZERO;
        config.max_attempts = 0;
        config.max_queued = 4;
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::ZeroLifetime));
        assert!(warnings.contains(&ConfigWarning::ZeroAttempts));
        assert!(warnings.contains(&ConfigWarning::TinyQueue));
    }

    #[test]
    fn test_ack_deadline_warning() {
        let mut config = CourierConfig::drill();
        config.ack_deadline = Duration::from_secs(601);
        assert!(
            config
                .validate()
                .contains(&ConfigWarning::AckDeadlineExceedsLifetime)
        );
    }
}
