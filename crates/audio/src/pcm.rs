//! Codec PCM : conversion flottant ↔ 16 bits et encodage de transport
//!
//! Fonctions pures, sans aucun état. Deux couches distinctes :
//! - la quantification f32 ↔ i16 (frames PCM)
//! - l'encodage texte base64 des bytes d'une frame, imposé par un
//!   transport orienté messages texte (un transport binaire pourrait
//!   sauter cette couche)
//!
//! # Facteur d'échelle
//!
//! Un seul facteur (32768) est utilisé dans les deux sens :
//! `i16 = clamp(f32 * 32768)` et `f32 = i16 / 32768`. Le clamp borne les
//! positifs à +32767 (la valeur +1.0 sature donc d'un pas de quantification).
//! Ne jamais mélanger 32767 et 32768 entre encodage et décodage.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{AudioError, AudioFrame, AudioResult, Sample};

/// Facteur d'échelle unique entre flottants [-1, 1] et entiers 16 bits
const PCM_SCALE: f32 = 32_768.0;

/// Quantifie des échantillons flottants en frame PCM 16 bits
///
/// Chaque échantillon est multiplié par 32768 puis borné à
/// `[-32768, 32767]` : aucune entrée, même hors de [-1, 1], ne peut
/// déborder la plage représentable.
///
/// # Example
/// ```rust
/// use audio::pcm;
///
/// let frame = pcm::encode_frame(&[0.0, 0.5, -1.0], 16_000);
/// assert_eq!(frame.samples(), &[0, 16384, -32768]);
/// ```
pub fn encode_frame(samples: &[Sample], sample_rate: u32) -> AudioFrame {
    let quantized = samples
        .iter()
        .map(|&s| (s * PCM_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect();

    AudioFrame::new(quantized, sample_rate)
}

/// Reconvertit une frame PCM 16 bits en échantillons flottants
///
/// Division par le même facteur 32768 qu'à l'encodage : l'aller-retour
/// `decode_frame(encode_frame(s))` reproduit chaque échantillon à un pas
/// de quantification près.
pub fn decode_frame(frame: &AudioFrame) -> Vec<Sample> {
    frame
        .samples()
        .iter()
        .map(|&s| s as f32 / PCM_SCALE)
        .collect()
}

/// Encode les bytes d'une frame en texte base64 (alphabet standard)
///
/// Encodage déterministe et réversible : `from_transport_encoding` est
/// son inverse exact. Le texte est construit par frame sortante et
/// consommé immédiatement par la session, jamais conservé.
pub fn to_transport_encoding(frame: &AudioFrame) -> String {
    STANDARD.encode(frame.to_le_bytes())
}

/// Décode un texte base64 en frame PCM
///
/// # Erreurs
/// - `AudioError::Framing` si le texte n'est pas du base64 valide ou si
///   le nombre de bytes décodés est impair
pub fn from_transport_encoding(text: &str, sample_rate: u32) -> AudioResult<AudioFrame> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|e| AudioError::Framing(format!("base64 invalide: {}", e)))?;

    AudioFrame::from_le_bytes(&bytes, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_basic_values() {
        let frame = encode_frame(&[0.0, 0.5, -0.5, 1.0, -1.0], 16_000);

        assert_eq!(frame.samples()[0], 0);
        assert_eq!(frame.samples()[1], 16_384);
        assert_eq!(frame.samples()[2], -16_384);
        assert_eq!(frame.samples()[3], i16::MAX); // +1.0 sature à 32767
        assert_eq!(frame.samples()[4], i16::MIN); // -1.0 atteint -32768 exactement
    }

    #[test]
    fn test_clamping_out_of_range() {
        // Aucune entrée ne doit sortir de la plage i16, même très hors borne
        let frame = encode_frame(&[2.0, -2.0, 100.0, -100.0, f32::MAX, f32::MIN], 16_000);

        for &s in frame.samples() {
            assert!(s == i16::MAX || s == i16::MIN);
        }
        assert_eq!(frame.samples()[0], i16::MAX);
        assert_eq!(frame.samples()[1], i16::MIN);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        // decode(encode(s)) doit reproduire s à un pas de quantification près
        let step = 1.0 / 32_768.0;
        let samples: Vec<f32> = (0..1000)
            .map(|i| ((i as f32 / 1000.0) * 2.0 - 1.0) * 0.99)
            .collect();

        let decoded = decode_frame(&encode_frame(&samples, 16_000));

        assert_eq!(decoded.len(), samples.len());
        for (orig, back) in samples.iter().zip(decoded.iter()) {
            assert!(
                (orig - back).abs() <= step,
                "écart > 1 pas: {} → {}",
                orig,
                back
            );
        }
    }

    #[test]
    fn test_transport_round_trip_exact() {
        // from(to(f)) == f exactement, pour toutes les valeurs limites
        let frame = AudioFrame::new(vec![0, 1, -1, i16::MAX, i16::MIN, 12_345], 24_000);

        let text = to_transport_encoding(&frame);
        let rebuilt = from_transport_encoding(&text, 24_000).unwrap();

        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn test_transport_encoding_known_value() {
        // Deux échantillons [1, -1] en LE : 01 00 FF FF
        let frame = AudioFrame::new(vec![1, -1], 16_000);
        assert_eq!(to_transport_encoding(&frame), "AQD//w==");
    }

    #[test]
    fn test_invalid_base64_is_framing_error() {
        let result = from_transport_encoding("pas du base64 !!", 24_000);
        assert!(matches!(result, Err(AudioError::Framing(_))));
    }

    #[test]
    fn test_odd_payload_is_framing_error() {
        // 3 bytes décodés : impair, impossible en PCM 16 bits
        let text = STANDARD.encode([1u8, 2, 3]);
        let result = from_transport_encoding(&text, 24_000);
        assert!(matches!(result, Err(AudioError::Framing(_))));
    }

    #[test]
    fn test_empty_frame() {
        let frame = encode_frame(&[], 16_000);
        assert!(frame.is_empty());

        let text = to_transport_encoding(&frame);
        let rebuilt = from_transport_encoding(&text, 16_000).unwrap();
        assert!(rebuilt.is_empty());
    }
}
