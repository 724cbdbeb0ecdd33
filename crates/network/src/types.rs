//! Types de données pour la session de streaming
//!
//! Ce module définit le contrat de messages avec l'agent vocal distant :
//! - SessionConfig : Configuration de la session
//! - SetupMessage / AudioMessage : Messages sortants (JSON)
//! - ServerMessage : Messages entrants, décodés une seule fois à la
//!   frontière de la session en variantes fermées
//! - SessionEvent : Événements livrés à l'orchestrateur
//! - SessionState : États du cycle de vie de la session

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use audio::AudioFrame;

/// Configuration de la session de streaming
///
/// Centralise tous les paramètres de la connexion à l'agent vocal.
/// Le credential est fourni par l'application (variable d'environnement
/// ou option de ligne de commande) ; son provisionnement n'est pas du
/// ressort de ce crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Endpoint websocket du service de dialogue audio
    pub url: String,

    /// Clé d'API, passée en paramètre de requête `key`
    pub api_key: String,

    /// Identifiant du modèle de dialogue audio
    pub model: String,

    /// Instruction système envoyée dans le message d'initialisation
    pub system_instruction: String,

    /// Fréquence d'échantillonnage de l'audio de réponse en Hz
    ///
    /// Fixée par le contrat : l'agent répond en PCM 24 kHz.
    pub inbound_sample_rate: u32,

    /// Timeout pour l'établissement de la connexion
    pub connect_timeout: Duration,

    /// Capacité de la file de messages sortants
    ///
    /// Pleine, les frames audio excédentaires sont perdues plutôt que
    /// de bloquer la boucle d'événements.
    pub outbound_capacity: usize,

    /// Capacité de la file d'événements entrants
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "wss://generativelanguage.googleapis.com/v1beta/live:streamGenerateContent"
                .to_string(),
            api_key: String::new(),
            model: "gemini-2.5-flash-preview-native-audio-dialog".to_string(),
            system_instruction: "You are a helpful assistant in a phone call simulation. \
                                 Respond naturally and conversationally."
                .to_string(),
            inbound_sample_rate: 24_000,
            connect_timeout: Duration::from_secs(10),
            outbound_capacity: 32,
            event_capacity: 32,
        }
    }
}

impl SessionConfig {
    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| format!("URL invalide: {}", e))?;

        if url.scheme() != "wss" && url.scheme() != "ws" {
            return Err(format!("Schéma d'URL invalide: {} (ws/wss attendu)", url.scheme()));
        }

        if self.model.is_empty() {
            return Err("Identifiant de modèle vide".to_string());
        }

        if self.outbound_capacity == 0 || self.event_capacity == 0 {
            return Err("Capacité de file nulle".to_string());
        }

        Ok(())
    }

    /// Configuration pour tests (timeouts accélérés)
    pub fn test_config() -> Self {
        Self {
            api_key: "test-key".to_string(),
            connect_timeout: Duration::from_millis(500),
            outbound_capacity: 8,
            event_capacity: 8,
            ..Default::default()
        }
    }
}

/// Type MIME des frames audio sortantes
///
/// Format fixe du contrat : PCM 16 bits mono, fréquence en paramètre.
pub fn audio_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Message d'initialisation envoyé à l'ouverture de la session
///
/// Déclare le modèle, la modalité de réponse (toujours AUDIO) et
/// l'instruction système.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub model: String,
    pub config: SetupConfig,
}

/// Bloc `config` du message d'initialisation
#[derive(Debug, Serialize)]
pub struct SetupConfig {
    #[serde(rename = "responseModalities")]
    pub response_modalities: Vec<String>,
    #[serde(rename = "systemInstruction")]
    pub system_instruction: String,
}

impl SetupMessage {
    /// Construit le message d'initialisation depuis la configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            model: config.model.clone(),
            config: SetupConfig {
                response_modalities: vec!["AUDIO".to_string()],
                system_instruction: config.system_instruction.clone(),
            },
        }
    }

    /// Sérialise en JSON pour le transport
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("sérialisation SetupMessage")
    }
}

/// Message de données audio sortant
///
/// Transporte une frame PCM encodée en base64 avec son type MIME.
#[derive(Debug, Serialize)]
pub struct AudioMessage {
    pub audio: AudioPayload,
}

/// Charge utile audio d'un message sortant
#[derive(Debug, Serialize)]
pub struct AudioPayload {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl AudioMessage {
    /// Construit un message audio depuis une frame déjà transport-encodée
    pub fn new(data: String, sample_rate: u32) -> Self {
        Self {
            audio: AudioPayload {
                data,
                mime_type: audio_mime_type(sample_rate),
            },
        }
    }

    /// Sérialise en JSON pour le transport
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("sérialisation AudioMessage")
    }
}

/// Message entrant classé, décodé une seule fois à la frontière de session
///
/// Variantes fermées : les composants en aval ne manipulent jamais de
/// JSON brut. Un message peut porter de l'audio, une erreur structurée,
/// ou être un message de contrôle sans effet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Accusé de contrôle (ex: initialisation acceptée), sans effet
    ControlAck,

    /// Audio de réponse, encodé en base64 (PCM 24 kHz)
    AudioChunk(String),

    /// Erreur applicative envoyée par l'agent distant
    RemoteError(String),

    /// Message inconnu, journalisé puis ignoré
    Unrecognized,
}

/// Forme brute des messages entrants pour la désérialisation
#[derive(Deserialize)]
struct RawServerMessage {
    error: Option<RawError>,
    response: Option<RawResponse>,
    #[serde(rename = "setupComplete")]
    setup_complete: Option<Value>,
}

#[derive(Deserialize)]
struct RawError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    audio: Option<String>,
}

impl ServerMessage {
    /// Classe un message texte entrant
    ///
    /// Un texte qui n'est pas du JSON, ou un JSON d'une forme inconnue,
    /// devient `Unrecognized` : jamais d'erreur, jamais de payload brut
    /// qui fuit vers l'aval.
    pub fn parse(text: &str) -> Self {
        let raw: RawServerMessage = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(_) => return ServerMessage::Unrecognized,
        };

        if let Some(error) = raw.error {
            return ServerMessage::RemoteError(
                error.message.unwrap_or_else(|| "erreur non décrite".to_string()),
            );
        }

        if let Some(response) = raw.response {
            if let Some(audio) = response.audio {
                return ServerMessage::AudioChunk(audio);
            }
        }

        if raw.setup_complete.is_some() {
            return ServerMessage::ControlAck;
        }

        ServerMessage::Unrecognized
    }
}

/// Événement livré par la session à l'orchestrateur
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Frame audio décodée, prête pour l'ordonnanceur de lecture
    Audio(AudioFrame),

    /// Erreur applicative distante : notifiée, l'appel continue
    RemoteError(String),

    /// La session est morte (fermeture distante, erreur transport ou
    /// fermeture locale) ; émis exactement une fois
    Closed { reason: Option<String> },
}

/// États du cycle de vie d'une session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Créée, pas encore connectée
    Idle,
    /// Connexion en cours
    Connecting,
    /// Ouverte : les frames peuvent partir
    Open,
    /// Morte : plus aucun envoi possible
    Closed,
}

impl SessionState {
    /// Vérifie si la session accepte des frames
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Open)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Open => write!(f, "open"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}
