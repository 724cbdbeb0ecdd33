//! Types de données pour la machine d'appel
//!
//! Ce module définit les surfaces de la machine d'états :
//! - CallState : États du cycle de vie d'un appel
//! - CallCommand : Commandes de l'interface utilisateur (fire-and-forget)
//! - CallEvent : Événements observables par la couche de présentation
//! - NoticeCategory : Catégories des notifications d'erreur utilisateur

use audio::AudioError;
use network::SessionError;

/// États du cycle de vie d'un appel
///
/// Progression : `Idle → Ringing → Connecting → Active → Ended`.
/// `Ended` est terminal : un nouvel appel exige une nouvelle machine.
/// Le refus depuis `Ringing` saute directement à `Ended` sans jamais
/// passer par `Connecting` (aucune ressource acquise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Aucun appel en cours
    Idle,
    /// Appel entrant, sonnerie en cours
    Ringing,
    /// Acquisition du micro puis connexion de la session
    Connecting,
    /// Appel en cours : l'audio circule dans les deux sens
    Active,
    /// Appel terminé (terminal)
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Idle => write!(f, "idle"),
            CallState::Ringing => write!(f, "ringing"),
            CallState::Connecting => write!(f, "connecting"),
            CallState::Active => write!(f, "active"),
            CallState::Ended => write!(f, "ended"),
        }
    }
}

/// Commandes de l'interface utilisateur
///
/// Fire-and-forget : une commande invalide pour l'état courant est
/// ignorée silencieusement (basculer le micro pendant la sonnerie ne
/// fait rien, répondre à un appel actif non plus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    /// Décrocher l'appel entrant
    Answer,
    /// Refuser l'appel entrant
    Decline,
    /// Raccrocher l'appel en cours
    HangUp,
    /// Couper/rétablir le micro
    ToggleMute,
    /// Activer/désactiver le mode haut-parleur
    ToggleSpeaker,
}

/// Catégorie d'une notification d'erreur utilisateur
///
/// Chaque catégorie correspond à un remède différent, affiché avec le
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCategory {
    /// Accès micro refusé
    PermissionDenied,
    /// Aucun micro trouvé
    NoDeviceFound,
    /// Micro occupé par une autre application
    DeviceBusy,
    /// Contexte non sécurisé
    InsecureContext,
    /// Credential refusé
    Auth,
    /// Échec ou perte de connexion
    Connect,
    /// Erreur applicative de l'agent distant
    Remote,
}

impl NoticeCategory {
    /// Classe une erreur du système audio
    pub fn from_audio(error: &AudioError) -> Self {
        match error {
            AudioError::PermissionDenied => NoticeCategory::PermissionDenied,
            AudioError::NoDeviceFound => NoticeCategory::NoDeviceFound,
            AudioError::DeviceBusy => NoticeCategory::DeviceBusy,
            AudioError::InsecureContext => NoticeCategory::InsecureContext,
            _ => NoticeCategory::NoDeviceFound,
        }
    }

    /// Classe une erreur de session
    pub fn from_session(error: &SessionError) -> Self {
        match error {
            SessionError::Auth(_) => NoticeCategory::Auth,
            SessionError::Remote(_) => NoticeCategory::Remote,
            _ => NoticeCategory::Connect,
        }
    }
}

impl std::fmt::Display for NoticeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeCategory::PermissionDenied => write!(f, "permission refusée"),
            NoticeCategory::NoDeviceFound => write!(f, "micro introuvable"),
            NoticeCategory::DeviceBusy => write!(f, "micro occupé"),
            NoticeCategory::InsecureContext => write!(f, "contexte non sécurisé"),
            NoticeCategory::Auth => write!(f, "authentification"),
            NoticeCategory::Connect => write!(f, "connexion"),
            NoticeCategory::Remote => write!(f, "service distant"),
        }
    }
}

/// Événement observable produit par la machine d'appel
///
/// Consommé par la couche de présentation (hors périmètre de ce crate) :
/// changements d'état, tics de durée à 1 Hz, bascules micro/haut-parleur
/// et notifications d'erreur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Changement d'état du cycle de vie
    State(CallState),

    /// Tic de sonnerie (secondes écoulées depuis le début de la sonnerie)
    RingTick(u64),

    /// Tic d'appel (secondes écoulées depuis le décrochage)
    CallTick(u64),

    /// Le micro vient d'être coupé/rétabli
    MuteChanged(bool),

    /// Le mode haut-parleur vient de changer
    SpeakerChanged(bool),

    /// Notification d'erreur destinée à l'utilisateur
    Notice {
        category: NoticeCategory,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(CallState::Ringing.to_string(), "ringing");
        assert_eq!(CallState::Ended.to_string(), "ended");
    }

    #[test]
    fn test_audio_error_classification() {
        assert_eq!(
            NoticeCategory::from_audio(&AudioError::PermissionDenied),
            NoticeCategory::PermissionDenied
        );
        assert_eq!(
            NoticeCategory::from_audio(&AudioError::DeviceBusy),
            NoticeCategory::DeviceBusy
        );
        assert_eq!(
            NoticeCategory::from_audio(&AudioError::InsecureContext),
            NoticeCategory::InsecureContext
        );
    }

    #[test]
    fn test_session_error_classification() {
        assert_eq!(
            NoticeCategory::from_session(&SessionError::Auth("401".to_string())),
            NoticeCategory::Auth
        );
        assert_eq!(
            NoticeCategory::from_session(&SessionError::Connect("réseau".to_string())),
            NoticeCategory::Connect
        );
        assert_eq!(
            NoticeCategory::from_session(&SessionError::Remote("quota".to_string())),
            NoticeCategory::Remote
        );
    }
}
