//! Configuration de la machine d'appel
//!
//! Regroupe les paramètres du cycle de vie (sonnerie, tics) et les
//! configurations des composants audio et session.

use std::time::Duration;

use audio::AudioConfig;
use network::SessionConfig;

/// Configuration complète d'un appel
#[derive(Clone, Debug)]
pub struct CallConfig {
    /// Durée de sonnerie avant décrochage automatique
    ///
    /// Environ trois sonneries. Le timer est annulé par un décrochage
    /// ou un refus manuel.
    pub ring_timeout: Duration,

    /// Période des tics de durée (sonnerie et appel)
    pub tick_interval: Duration,

    /// Configuration du système audio
    pub audio: AudioConfig,

    /// Configuration de la session de streaming
    pub session: SessionConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(6),
            tick_interval: Duration::from_secs(1),
            audio: AudioConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl CallConfig {
    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.ring_timeout.is_zero() {
            return Err("Durée de sonnerie nulle".to_string());
        }

        if self.tick_interval.is_zero() {
            return Err("Période de tic nulle".to_string());
        }

        self.audio.validate()?;
        self.session.validate()?;
        Ok(())
    }

    /// Configuration pour tests (timers accélérés, composants de test)
    pub fn test_config() -> Self {
        Self {
            ring_timeout: Duration::from_millis(150),
            tick_interval: Duration::from_millis(40),
            audio: AudioConfig::test_config(),
            session: SessionConfig::test_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CallConfig::default();

        assert_eq!(config.ring_timeout, Duration::from_secs(6));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CallConfig::test_config();
        config.ring_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config_is_faster() {
        let config = CallConfig::test_config();
        assert!(config.ring_timeout < CallConfig::default().ring_timeout);
        assert!(config.validate().is_ok());
    }
}
