//! Configuration audio pour Fauxcall
//!
//! Ce module définit tous les paramètres audio utilisés par l'application.
//! Les fréquences sont fixées par le contrat de transport : le format est
//! du PCM 16 bits mono, sans négociation de codec.

use serde::{Deserialize, Serialize};

/// Configuration principale pour tout le système audio
///
/// Cette structure contient tous les paramètres nécessaires pour configurer :
/// - La capture audio (microphone)
/// - La conversion PCM pour le transport
/// - La lecture audio (haut-parleurs)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage de la capture en Hz
    ///
    /// 16 kHz : c'est la fréquence attendue côté agent vocal pour
    /// l'audio entrant (mimeType audio/pcm;rate=16000).
    pub capture_sample_rate: u32,

    /// Fréquence d'échantillonnage des réponses distantes en Hz
    ///
    /// L'agent vocal répond en PCM 24 kHz ; la lecture se fait à cette
    /// fréquence sans rééchantillonnage.
    pub playback_sample_rate: u32,

    /// Nombre de canaux audio
    ///
    /// Le contrat de transport est mono (1 canal), point final.
    pub channels: u16,

    /// Taille d'un bloc de capture en échantillons
    ///
    /// Un bloc = une livraison du callback périphérique = une frame envoyée.
    /// 4096 échantillons à 16 kHz = 256 ms par bloc.
    pub capture_block_samples: usize,

    /// Capacité du canal entre le callback de capture et le consommateur
    ///
    /// Si le consommateur prend du retard, les blocs excédentaires sont
    /// perdus plutôt que de bloquer le thread audio.
    pub channel_capacity: usize,
}

impl Default for AudioConfig {
    /// Configuration par défaut alignée sur le contrat de transport
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            channels: 1,
            capture_block_samples: 4096,
            channel_capacity: 16,
        }
    }
}

impl AudioConfig {
    /// Durée d'un bloc de capture
    ///
    /// Exemple : 4096 / 16000 = 256 ms
    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            self.capture_block_samples as f64 / self.capture_sample_rate as f64,
        )
    }

    /// Taille en bytes d'un bloc une fois converti en PCM 16 bits
    ///
    /// Chaque échantillon i16 = 2 bytes.
    pub fn block_size_bytes(&self) -> usize {
        self.capture_block_samples * self.channels as usize * 2
    }

    /// Valide que la configuration est cohérente
    ///
    /// Vérifie que tous les paramètres sont dans des plages acceptables
    pub fn validate(&self) -> Result<(), String> {
        if self.capture_sample_rate < 8_000 || self.capture_sample_rate > 48_000 {
            return Err(format!(
                "Fréquence de capture invalide: {} (doit être entre 8000 et 48000)",
                self.capture_sample_rate
            ));
        }

        if self.playback_sample_rate < 8_000 || self.playback_sample_rate > 48_000 {
            return Err(format!(
                "Fréquence de lecture invalide: {} (doit être entre 8000 et 48000)",
                self.playback_sample_rate
            ));
        }

        if self.channels != 1 {
            return Err(format!(
                "Nombre de canaux invalide: {} (le transport est mono)",
                self.channels
            ));
        }

        if self.capture_block_samples == 0 || self.capture_block_samples > 65_536 {
            return Err(format!(
                "Taille de bloc invalide: {} (doit être entre 1 et 65536)",
                self.capture_block_samples
            ));
        }

        if self.channel_capacity == 0 {
            return Err("Capacité de canal nulle".to_string());
        }

        Ok(())
    }

    /// Configuration pour les tests (blocs minuscules, canal court)
    pub fn test_config() -> Self {
        Self {
            capture_block_samples: 64,
            channel_capacity: 4,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.capture_sample_rate, 16_000);
        assert_eq!(config.playback_sample_rate, 24_000);
        assert_eq!(config.block_duration().as_millis(), 256); // 4096 / 16000
        assert_eq!(config.block_size_bytes(), 8192); // 4096 * 2

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.capture_sample_rate = 1000; // Trop bas
        assert!(config.validate().is_err());

        config.capture_sample_rate = 16_000;
        config.channels = 2; // Le transport est mono
        assert!(config.validate().is_err());

        config.channels = 1;
        config.capture_block_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config() {
        let config = AudioConfig::test_config();
        assert!(config.validate().is_ok());
        assert!(config.capture_block_samples < AudioConfig::default().capture_block_samples);
    }
}
