//! Traits abstraits pour le transport de session
//!
//! Ce module définit la couture entre la session logique et le
//! transport concret. Cela permet d'avoir du code modulaire et
//! testable avec différentes implémentations :
//! - WsTransport : websocket réel avec tokio-tungstenite
//! - SimulatedTransport : implémentation scriptée pour les tests

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{SessionConfig, SessionResult};

/// Événement brut émis par le transport
///
/// Le transport ne connaît pas le contrat de messages : il livre du
/// texte et des signaux de vie. La classification se fait une couche
/// au-dessus, dans la session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Message texte entrant
    Message(String),

    /// Erreur transport : la connexion est morte
    Error(String),

    /// Fermeture (distante ou consécutive à une fermeture locale)
    Closed(Option<String>),
}

/// Canaux reliant la session à une connexion établie
///
/// - `outbound` : messages texte à envoyer ; dropper ce sender ferme
///   proprement la connexion
/// - `inbound` : événements du transport, dans l'ordre de réception
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Trait pour le transport de session
///
/// Une implémentation établit la connexion duplex et retourne les deux
/// canaux. La tâche d'entrée/sortie qui possède la connexion vit tant
/// que le sender `outbound` vit.
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
/// `Send` indique que l'objet peut être transféré entre threads.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Établit la connexion vers l'agent distant
    ///
    /// # Erreurs
    /// - `SessionError::Auth` : credential refusé pendant le handshake
    /// - `SessionError::Connect` : échec réseau ou de handshake
    async fn connect(&mut self, config: &SessionConfig) -> SessionResult<TransportLink>;

    /// Retourne des informations sur le transport
    ///
    /// Utile pour le debug et les journaux.
    fn transport_info(&self) -> String {
        "Transport inconnu".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_event_equality() {
        assert_eq!(
            TransportEvent::Message("a".to_string()),
            TransportEvent::Message("a".to_string())
        );
        assert_ne!(
            TransportEvent::Closed(None),
            TransportEvent::Closed(Some("raison".to_string()))
        );
    }

    #[tokio::test]
    async fn test_link_channels() {
        // Un TransportLink n'est que deux canaux : vérifie le câblage de base
        let (out_tx, mut out_rx) = mpsc::channel::<String>(4);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(4);

        let link = TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        };

        link.outbound.send("ping".to_string()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "ping");

        in_tx.send(TransportEvent::Closed(None)).await.unwrap();
        let mut link = link;
        assert_eq!(link.inbound.recv().await.unwrap(), TransportEvent::Closed(None));
    }
}
