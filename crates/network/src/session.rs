//! Session de streaming haut niveau vers l'agent vocal
//!
//! Ce module implémente la logique métier d'une session duplex :
//! établissement (credential, handshake, message d'initialisation),
//! envoi de frames audio, classification des messages entrants, et
//! fermeture idempotente. Il orchestre le transport bas niveau et
//! fournit une API simple à l'orchestrateur d'appel.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use audio::{AudioFrame, pcm};

use crate::{
    ServerMessage, SessionConfig, SessionError, SessionEvent, SessionResult, SessionState,
    SessionTransport, SetupMessage, TransportEvent,
};
use crate::types::AudioMessage;

/// Une session logique duplex vers l'agent vocal distant
///
/// Cycle de vie : `Idle → Connecting → Open → Closed`, sans retour en
/// arrière. Une valeur de session ne se connecte qu'une fois ; un nouvel
/// appel construit une nouvelle session.
///
/// # Garanties
///
/// - Aucune frame ne peut partir avant que `connect()` ait rendu la main
///   avec succès (équivalent du signal d'ouverture)
/// - Les frames partent dans l'ordre de soumission
/// - `SessionEvent::Closed` est livré exactement une fois, même si une
///   fermeture locale et une fermeture distante se croisent
/// - Après fermeture, `send_frame` échoue avec `InvalidState`
///
/// # Coupure micro
///
/// La session est agnostique du mute : couper le micro est une politique
/// du tube de capture, pas de la session.
pub struct AgentSession {
    /// Configuration de la session
    config: SessionConfig,

    /// État du cycle de vie
    state: SessionState,

    /// Moitié sortante du lien transport (None hors Open)
    ///
    /// La dropper ferme proprement la connexion.
    outbound: Option<mpsc::Sender<String>>,
}

impl AgentSession {
    /// Crée une session non connectée
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            outbound: None,
        }
    }

    /// Établit la session via le transport fourni
    ///
    /// Séquence : validation du credential, connexion transport, envoi
    /// du message d'initialisation, puis passage à l'état Open. Le
    /// retour avec succès vaut signal d'ouverture : l'appelant reçoit
    /// le canal d'événements entrants, alimenté par une tâche de pompe
    /// qui classifie chaque message une seule fois.
    ///
    /// # Erreurs
    /// - `SessionError::Auth` : credential absent ou refusé (le transport
    ///   n'est même pas sollicité si la clé manque)
    /// - `SessionError::Connect` : échec réseau ou de handshake
    pub async fn connect(
        &mut self,
        transport: &mut dyn SessionTransport,
    ) -> SessionResult<mpsc::Receiver<SessionEvent>> {
        if self.state != SessionState::Idle {
            return Err(SessionError::invalid_state("connect", &self.state.to_string()));
        }

        self.config.validate().map_err(SessionError::ConfigError)?;

        if self.config.api_key.trim().is_empty() {
            return Err(SessionError::Auth("clé d'API manquante".to_string()));
        }

        self.state = SessionState::Connecting;

        let link = match transport.connect(&self.config).await {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        // Le message d'initialisation part avant toute frame audio
        let setup = SetupMessage::from_config(&self.config).to_json();
        if link.outbound.send(setup).await.is_err() {
            self.state = SessionState::Closed;
            return Err(SessionError::Connect(
                "connexion fermée pendant l'initialisation".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity);
        let inbound_rate = self.config.inbound_sample_rate;
        tokio::spawn(pump_inbound(link.inbound, events_tx, inbound_rate));

        self.outbound = Some(link.outbound);
        self.state = SessionState::Open;

        debug!(transport = %transport.transport_info(), "Session ouverte");
        Ok(events_rx)
    }

    /// Envoie une frame audio à l'agent distant
    ///
    /// Encode la frame pour le transport puis la soumet sans bloquer.
    ///
    /// # Erreurs
    /// - `SessionError::InvalidState` avant l'ouverture ou après la
    ///   fermeture
    pub fn send_frame(&mut self, frame: &AudioFrame) -> SessionResult<()> {
        let data = pcm::to_transport_encoding(frame);
        self.send_encoded(data, frame.sample_rate())
    }

    /// Envoie une frame déjà transport-encodée
    ///
    /// Même contrat que [`send_frame`](Self::send_frame) ; évite un
    /// réencodage quand l'appelant a déjà le base64 sous la main.
    pub fn send_encoded(&mut self, data: String, sample_rate: u32) -> SessionResult<()> {
        if !self.state.is_open() {
            return Err(SessionError::invalid_state("send_frame", &self.state.to_string()));
        }

        let message = AudioMessage::new(data, sample_rate).to_json();

        let Some(outbound) = self.outbound.as_ref() else {
            return Err(SessionError::invalid_state("send_frame", "closed"));
        };

        match outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // Politique temps réel : la file est pleine, la frame est
                // perdue plutôt que de bloquer la boucle d'événements
                warn!("File d'envoi pleine, frame audio perdue");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                self.mark_closed();
                Err(SessionError::invalid_state("send_frame", "closed"))
            }
        }
    }

    /// Ferme la session
    ///
    /// Idempotent. Dropper la moitié sortante termine la tâche
    /// d'entrée/sortie du transport, qui clôt la connexion ; la pompe
    /// livre alors l'unique `SessionEvent::Closed` (sauf si la fermeture
    /// distante l'a déjà fait, auquel cas rien de plus n'est émis).
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.outbound = None;
        self.state = SessionState::Closed;
        debug!("Session fermée localement");
    }

    /// Marque la session morte après un événement de fermeture
    ///
    /// À appeler quand l'orchestrateur consomme `SessionEvent::Closed` :
    /// les envois suivants échoueront immédiatement en `InvalidState`.
    pub fn mark_closed(&mut self) {
        self.outbound = None;
        self.state = SessionState::Closed;
    }

    /// État courant de la session
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Vérifie si la session accepte des frames
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

/// Pompe de classification des messages entrants
///
/// Tourne tant que le transport vit. Décode chaque message une seule
/// fois à la frontière : l'aval ne voit jamais de JSON brut. Une frame
/// audio indécodable est journalisée et perdue, sans tuer la session ni
/// bloquer les frames suivantes. Le premier signal de mort du transport
/// produit l'unique `Closed`, puis la pompe s'arrête.
async fn pump_inbound(
    mut inbound: mpsc::Receiver<TransportEvent>,
    events: mpsc::Sender<SessionEvent>,
    inbound_rate: u32,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Message(text) => match ServerMessage::parse(&text) {
                ServerMessage::AudioChunk(data) => {
                    match pcm::from_transport_encoding(&data, inbound_rate) {
                        Ok(frame) => {
                            if events.send(SessionEvent::Audio(frame)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            // Frame perdue, appel intact
                            warn!("Frame audio entrante invalide, ignorée: {}", e);
                        }
                    }
                }
                ServerMessage::RemoteError(message) => {
                    // Notifiée sans fermer : seule la mort du transport
                    // termine la session
                    if events.send(SessionEvent::RemoteError(message)).await.is_err() {
                        return;
                    }
                }
                ServerMessage::ControlAck => {
                    debug!("Initialisation confirmée par le serveur");
                }
                ServerMessage::Unrecognized => {
                    debug!("Message entrant non reconnu, ignoré");
                }
            },
            TransportEvent::Error(reason) => {
                let _ = events.send(SessionEvent::Closed { reason: Some(reason) }).await;
                return;
            }
            TransportEvent::Closed(reason) => {
                let _ = events.send(SessionEvent::Closed { reason }).await;
                return;
            }
        }
    }

    // Transport disparu sans signal : session morte quand même
    let _ = events.send(SessionEvent::Closed { reason: None }).await;
}
