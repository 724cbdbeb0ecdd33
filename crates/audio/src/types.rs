//! Types de données pour le système audio
//!
//! Ce module définit les structures principales pour manipuler l'audio :
//! - AudioFrame : Frame audio PCM 16 bits (format de transport)
//! - SampleBlock : Bloc d'échantillons flottants bruts issus de la capture
//! - GainMode : Mode de gain de lecture (normal / haut-parleur)

use crate::{AudioError, AudioResult};

/// Type pour un échantillon audio brut
///
/// Un échantillon représente l'amplitude du son à un instant donné.
/// - Valeurs entre -1.0 et +1.0
/// - 0.0 = silence
/// - f32 est le format natif des périphériques de capture/lecture
pub type Sample = f32;

/// Bloc d'échantillons bruts produit par une itération du callback de capture
///
/// Taille fixe par configuration (4096 échantillons par défaut).
pub type SampleBlock = Vec<Sample>;

/// Frame audio PCM 16 bits mono
///
/// C'est l'unité transportée sur la session de streaming : des entiers
/// signés 16 bits little-endian à une fréquence d'échantillonnage fixe
/// par direction (16 kHz en émission, 24 kHz en réception).
///
/// Une frame est immuable après construction : on la crée, on l'encode
/// pour le transport, on la consomme. La fréquence ne change jamais
/// pendant la durée d'une session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    /// Les échantillons PCM signés 16 bits
    samples: Vec<i16>,

    /// Fréquence d'échantillonnage en Hz
    sample_rate: u32,
}

impl AudioFrame {
    /// Crée une nouvelle frame audio
    ///
    /// # Arguments
    /// * `samples` - Les échantillons PCM 16 bits
    /// * `sample_rate` - Fréquence d'échantillonnage en Hz
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![0, 1200, -1200, 0], 16_000);
    /// assert_eq!(frame.len(), 4);
    /// ```
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Crée une frame de silence
    pub fn silence(sample_count: usize, sample_rate: u32) -> Self {
        Self::new(vec![0; sample_count], sample_rate)
    }

    /// Accès en lecture aux échantillons
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Fréquence d'échantillonnage de cette frame
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nombre d'échantillons
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Vérifie si la frame est vide
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Durée de cette frame
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Sérialise les échantillons en bytes little-endian
    ///
    /// C'est la représentation binaire attendue par le contrat de transport
    /// (PCM 16 bits LE mono).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Reconstruit une frame depuis des bytes little-endian
    ///
    /// # Erreurs
    /// - `AudioError::Framing` si le nombre de bytes est impair
    ///   (impossible pour du PCM 16 bits)
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> AudioResult<Self> {
        if bytes.len() % 2 != 0 {
            return Err(AudioError::Framing(format!(
                "nombre de bytes impair pour du PCM 16 bits: {}",
                bytes.len()
            )));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self::new(samples, sample_rate))
    }

    /// Calcule le niveau sonore RMS (Root Mean Square)
    ///
    /// Retourne une valeur entre 0.0 et 1.0, utilisée par l'indicateur
    /// de niveau micro.
    pub fn rms_level(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MIN.unsigned_abs() as f64;
                normalized * normalized
            })
            .sum();

        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }
}

/// Mode de gain appliqué à la lecture des réponses distantes
///
/// Le mode haut-parleur n'amplifie que l'audio distant, jamais le
/// monitoring local de la capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GainMode {
    /// Écoute normale (gain 1.0)
    #[default]
    Normal,
    /// Mode haut-parleur (gain 2.0)
    Boosted,
}

impl GainMode {
    /// Facteur multiplicatif appliqué aux échantillons
    pub fn multiplier(self) -> f32 {
        match self {
            GainMode::Normal => 1.0,
            GainMode::Boosted => 2.0,
        }
    }

    /// Bascule entre les deux modes
    pub fn toggled(self) -> Self {
        match self {
            GainMode::Normal => GainMode::Boosted,
            GainMode::Boosted => GainMode::Normal,
        }
    }
}

impl std::fmt::Display for GainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainMode::Normal => write!(f, "normal"),
            GainMode::Boosted => write!(f, "haut-parleur"),
        }
    }
}

/// Calcule le niveau RMS d'un bloc d'échantillons bruts
///
/// Même mesure que [`AudioFrame::rms_level`] mais côté capture,
/// avant conversion PCM. L'indicateur de niveau reste actif même
/// quand le micro est coupé.
pub fn block_rms_level(block: &[Sample]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = block.iter().map(|&s| s * s).sum();
    (sum_squares / block.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_creation() {
        let samples = vec![0, 100, -100, 32767];
        let frame = AudioFrame::new(samples.clone(), 16_000);

        assert_eq!(frame.samples(), samples.as_slice());
        assert_eq!(frame.sample_rate(), 16_000);
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_silence() {
        let frame = AudioFrame::silence(4096, 16_000);
        assert_eq!(frame.len(), 4096);
        assert!(frame.samples().iter().all(|&s| s == 0));
        assert_eq!(frame.rms_level(), 0.0);
    }

    #[test]
    fn test_duration() {
        // 4096 échantillons à 16 kHz = 256 ms
        let frame = AudioFrame::silence(4096, 16_000);
        assert_eq!(frame.duration().as_millis(), 256);
    }

    #[test]
    fn test_le_bytes_round_trip() {
        let frame = AudioFrame::new(vec![0, 1, -1, i16::MAX, i16::MIN], 24_000);
        let bytes = frame.to_le_bytes();

        assert_eq!(bytes.len(), 10);

        let rebuilt = AudioFrame::from_le_bytes(&bytes, 24_000).unwrap();
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn test_odd_byte_count_is_framing_error() {
        let result = AudioFrame::from_le_bytes(&[1, 2, 3], 24_000);
        assert!(matches!(result, Err(AudioError::Framing(_))));
    }

    #[test]
    fn test_rms_level() {
        // Carré plein à mi-amplitude : RMS = 0.5
        let half = (i16::MIN as i32 / -2) as i16; // 16384
        let frame = AudioFrame::new(vec![half, -half, half, -half], 16_000);

        let rms = frame.rms_level();
        assert!((rms - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_gain_mode() {
        assert_eq!(GainMode::Normal.multiplier(), 1.0);
        assert_eq!(GainMode::Boosted.multiplier(), 2.0);
        assert_eq!(GainMode::Normal.toggled(), GainMode::Boosted);
        assert_eq!(GainMode::Boosted.toggled(), GainMode::Normal);
    }

    #[test]
    fn test_block_rms() {
        assert_eq!(block_rms_level(&[]), 0.0);

        let block = vec![0.5, -0.5, 0.5, -0.5];
        assert!((block_rms_level(&block) - 0.5).abs() < 0.001);
    }
}
