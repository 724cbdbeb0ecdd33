//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces (traits) que doivent implémenter
//! les composants audio. Cela permet d'avoir du code modulaire et
//! testable avec différentes implémentations.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioResult, GainMode, SampleBlock};

/// Trait pour le tube de capture microphone
///
/// Ce trait abstrait permet d'utiliser différentes implémentations :
/// - CpalCapture : Implémentation avec la librairie cpal
/// - MockCapture : Implémentation factice pour les tests
///
/// # Inversion de contrôle
///
/// C'est l'horloge du périphérique qui cadence la livraison, pas
/// l'appelant : `open()` retourne un canal sur lequel les blocs
/// arrivent d'eux-mêmes. Il n'y a pas de file interrogeable.
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
/// `Send` indique que l'objet peut être transféré entre threads.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Ouvre le périphérique et démarre la livraison de blocs
    ///
    /// Retourne le canal sur lequel arrivent les blocs d'échantillons,
    /// un par callback périphérique, de taille fixe.
    ///
    /// # Erreurs
    /// Les quatre sous-types de panne périphérique sont distingués car
    /// chacun a un remède utilisateur différent :
    /// - `AudioError::PermissionDenied` : accès refusé
    /// - `AudioError::NoDeviceFound` : aucun microphone
    /// - `AudioError::DeviceBusy` : périphérique déjà utilisé
    /// - `AudioError::InsecureContext` : contexte non sécurisé
    async fn open(&mut self) -> AudioResult<mpsc::Receiver<SampleBlock>>;

    /// Coupe ou rétablit le micro sans fermer le périphérique
    ///
    /// Coupé, les blocs capturés sont jetés avant d'atteindre le canal :
    /// le périphérique continue de tourner (pas de coût de redémarrage,
    /// pas de nouvelle demande de permission au retour) et l'indicateur
    /// de niveau local reste alimenté.
    fn set_muted(&self, muted: bool);

    /// Vérifie si le micro est coupé
    fn is_muted(&self) -> bool;

    /// Ferme le périphérique et arrête la livraison
    ///
    /// Idempotent : rappeler `close()` ne fait rien. Les autres méthodes
    /// deviennent des no-ops après fermeture.
    async fn close(&mut self) -> AudioResult<()>;

    /// Vérifie si la capture est ouverte
    fn is_open(&self) -> bool;

    /// Dernier niveau RMS mesuré (0.0 à 1.0), vivant même coupé
    fn level(&self) -> f32;

    /// Retourne des informations sur le périphérique utilisé
    ///
    /// Utile pour l'interface utilisateur ou le debug.
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour l'ordonnanceur de lecture audio
///
/// Sérialise les buffers décodés arrivants en une sortie continue :
/// le début planifié du buffer n+1 n'est jamais avant la fin du buffer n
/// (lecture jointive, sans chevauchement), quelle que soit la cadence
/// d'arrivée.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Met un buffer décodé en file de lecture
    ///
    /// Le buffer démarre à `max(maintenant, fin du buffer précédent)`.
    /// Le gain courant lui est appliqué au moment de l'enfilage ; les
    /// buffers déjà planifiés ne sont pas retouchés.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` / `AudioError::DeviceBusy` si la
    ///   sortie ne peut pas être ouverte
    fn enqueue(&mut self, samples: SampleBlock) -> AudioResult<()>;

    /// Change le mode de gain pour les buffers enfilés ensuite
    fn set_gain(&mut self, mode: GainMode);

    /// Mode de gain courant
    fn gain(&self) -> GainMode;

    /// Vide la file et libère la sortie audio
    ///
    /// Appelé à la fin d'un appel. Idempotent.
    async fn reset(&mut self) -> AudioResult<()>;

    /// Nombre de buffers encore planifiés
    fn queued(&self) -> usize;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioFrame;

    // Tests que les types utilisés par les traits sont bien formés
    // (les implémentations sont testées dans leurs modules respectifs)

    #[test]
    fn test_sample_block_is_plain_vec() {
        let block: SampleBlock = vec![0.0, 0.1, -0.1];
        assert_eq!(block.len(), 3);
    }

    #[test]
    fn test_gain_default() {
        assert_eq!(GainMode::default(), GainMode::Normal);
    }

    #[test]
    fn test_frame_from_block_shape() {
        let block: SampleBlock = vec![0.0; 64];
        let frame = crate::pcm::encode_frame(&block, 16_000);
        assert_eq!(frame, AudioFrame::silence(64, 16_000));
    }
}
