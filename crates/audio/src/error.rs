//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit tous les types d'erreurs possibles dans notre système audio.
//! Chaque sous-type d'erreur périphérique a un remède utilisateur différent,
//! d'où des variantes distinctes plutôt qu'un message générique.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// et nous permet de définir des messages d'erreur avec `#[error("...")]`
#[derive(Error, Debug)]
pub enum AudioError {
    /// L'accès au microphone a été refusé par l'utilisateur ou le système
    #[error("Accès au microphone refusé")]
    PermissionDenied,

    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// Le périphérique est déjà utilisé par une autre application
    #[error("Périphérique audio occupé par une autre application")]
    DeviceBusy,

    /// L'environnement d'exécution n'offre pas de contexte sécurisé
    /// (certains hôtes exigent un canal authentifié pour ouvrir le micro)
    #[error("Contexte non sécurisé : accès au microphone bloqué")]
    InsecureContext,

    /// Données audio malformées (base64 invalide, nombre de bytes impair
    /// pour du PCM 16 bits, etc.)
    #[error("Frame audio malformée: {0}")]
    Framing(String),

    /// Opération tentée alors que le composant n'est pas dans le bon état
    /// (ex: envoyer une frame après close)
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal (Cross-Platform Audio Library)
    /// `#[from]` génère automatiquement une conversion depuis l'erreur cpal
    #[error("Erreur cpal: {0}")]
    CpalError(#[from] cpal::PlayStreamError),

    /// Le périphérique audio a été débranché pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

/// Conversion des erreurs cpal::BuildStreamError
///
/// `DeviceNotAvailable` signifie en pratique qu'une autre application
/// monopolise le périphérique ou qu'il vient d'être débranché. Les
/// refus de permission remontent en erreur spécifique backend : on les
/// reconnaît à leur description, faute de variante dédiée côté cpal.
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceBusy,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                AudioError::ConfigError("Configuration de stream non supportée".to_string())
            }
            other => {
                let description = format!("{}", other).to_lowercase();
                if description.contains("permission")
                    || description.contains("denied")
                    || description.contains("refus")
                {
                    AudioError::PermissionDenied
                } else {
                    AudioError::InitializationError(format!("Erreur construction stream: {}", other))
                }
            }
        }
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::DeviceBusy,
            other => AudioError::ConfigError(format!("Erreur config par défaut: {:?}", other)),
        }
    }
}

/// Conversion des erreurs cpal::PauseStreamError
impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::ConfigError(format!("Erreur pause stream: {:?}", err))
    }
}

/// Type Result personnalisé pour notre crate
///
/// Au lieu d'écrire Result<T, AudioError> partout, on peut écrire AudioResult<T>
pub type AudioResult<T> = Result<T, AudioError>;

impl AudioError {
    /// Crée une erreur d'état invalide avec contexte
    pub fn invalid_state(operation: &str, current_state: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current_state: current_state.to_string(),
        }
    }

    /// Remède utilisateur associé à cette erreur
    ///
    /// Chaque sous-type de panne périphérique a une action corrective
    /// différente, affichée telle quelle dans la notification d'erreur.
    pub fn remedy(&self) -> &'static str {
        match self {
            AudioError::PermissionDenied => {
                "Autorisez l'accès au microphone dans les réglages du système."
            }
            AudioError::NoDeviceFound => {
                "Aucun microphone détecté. Vérifiez vos périphériques audio."
            }
            AudioError::DeviceBusy => {
                "Le microphone est utilisé par une autre application. Fermez-la puis réessayez."
            }
            AudioError::InsecureContext => {
                "L'accès au microphone exige un contexte sécurisé. Relancez depuis un environnement de confiance."
            }
            AudioError::DeviceDisconnected => {
                "Le périphérique audio a été débranché. Rebranchez-le puis réessayez."
            }
            _ => "Vérifiez vos permissions et périphériques audio, puis réessayez.",
        }
    }

    /// Vérifie si l'erreur concerne l'acquisition du périphérique
    ///
    /// Ces erreurs avortent l'établissement d'un appel ; les autres
    /// (framing, état) ne concernent qu'une frame ou un appel de méthode.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            AudioError::PermissionDenied
                | AudioError::NoDeviceFound
                | AudioError::DeviceBusy
                | AudioError::InsecureContext
                | AudioError::DeviceDisconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        // Test que nos messages d'erreurs s'affichent correctement
        let error = AudioError::NoDeviceFound;
        assert_eq!(error.to_string(), "Aucun périphérique audio trouvé");

        let error = AudioError::Framing("longueur impaire".to_string());
        assert_eq!(error.to_string(), "Frame audio malformée: longueur impaire");
    }

    #[test]
    fn test_remedies_are_distinct() {
        // Chaque sous-type périphérique doit proposer un remède différent
        let errors = [
            AudioError::PermissionDenied,
            AudioError::NoDeviceFound,
            AudioError::DeviceBusy,
            AudioError::InsecureContext,
        ];

        for (i, a) in errors.iter().enumerate() {
            for (j, b) in errors.iter().enumerate() {
                if i != j {
                    assert_ne!(a.remedy(), b.remedy());
                }
            }
        }
    }

    #[test]
    fn test_device_error_classification() {
        assert!(AudioError::PermissionDenied.is_device_error());
        assert!(AudioError::DeviceBusy.is_device_error());
        assert!(!AudioError::Framing("x".to_string()).is_device_error());
        assert!(!AudioError::invalid_state("send", "closed").is_device_error());
    }
}
