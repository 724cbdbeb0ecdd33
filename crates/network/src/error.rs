//! Gestion d'erreurs pour la session de streaming
//!
//! Ce module définit tous les types d'erreurs possibles côté session.
//! Il suit les mêmes patterns que le module audio pour la cohérence du code.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles de la session de streaming
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// avec des messages d'erreur descriptifs.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Credential manquant ou refusé par le service distant
    #[error("Authentification refusée: {0}")]
    Auth(String),

    /// Échec réseau ou de handshake lors de l'établissement de la session
    #[error("Connexion impossible: {0}")]
    Connect(String),

    /// Erreur applicative envoyée par l'agent distant pendant la session
    ///
    /// Ne ferme pas la session à elle seule : elle est remontée en
    /// notification et l'appel continue tant que le transport tient.
    #[error("Erreur distante: {0}")]
    Remote(String),

    /// Opération tentée alors que la session n'est pas dans le bon état
    /// (ex: envoyer une frame avant l'ouverture ou après la fermeture)
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Message entrant impossible à décoder au niveau trame
    #[error("Message malformé: {0}")]
    Framing(String),

    /// Configuration de session invalide
    #[error("Configuration de session invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
///
/// Au lieu d'écrire Result<T, SessionError> partout, on peut écrire SessionResult<T>
pub type SessionResult<T> = Result<T, SessionError>;

/// Fonctions utilitaires pour créer des erreurs communes
impl SessionError {
    /// Crée une erreur d'état invalide avec contexte
    pub fn invalid_state(operation: &str, current_state: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current_state: current_state.to_string(),
        }
    }

    /// Vérifie si l'erreur met fin à l'appel en cours
    ///
    /// Les erreurs distantes applicatives ne sont pas fatales tant que
    /// le transport reste ouvert ; tout le reste avorte l'appel.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Remote(_) | SessionError::Framing(_))
    }

    /// Message destiné à l'utilisateur final
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Auth(_) => {
                "Clé d'API refusée. Vérifiez votre credential.".to_string()
            }
            SessionError::Connect(_) => {
                "Connexion au service impossible. Vérifiez votre réseau et votre clé d'API.".to_string()
            }
            SessionError::Remote(message) => format!("Erreur du service distant : {}", message),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SessionError::Auth("clé manquante".to_string());
        assert!(error.to_string().contains("clé manquante"));

        let error = SessionError::invalid_state("send_frame", "closed");
        assert!(error.to_string().contains("send_frame"));
        assert!(error.to_string().contains("closed"));
    }

    #[test]
    fn test_fatality() {
        assert!(SessionError::Auth("x".to_string()).is_fatal());
        assert!(SessionError::Connect("x".to_string()).is_fatal());
        assert!(!SessionError::Remote("quota".to_string()).is_fatal());
        assert!(!SessionError::Framing("base64".to_string()).is_fatal());
    }

    #[test]
    fn test_user_messages() {
        let auth = SessionError::Auth("401".to_string());
        assert!(auth.user_message().contains("clé d'API") || auth.user_message().contains("Clé"));

        let remote = SessionError::Remote("quota dépassé".to_string());
        assert!(remote.user_message().contains("quota dépassé"));
    }
}
