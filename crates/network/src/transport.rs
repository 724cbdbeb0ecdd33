//! Transports de session : websocket réel et simulation
//!
//! Ce module fournit les deux implémentations du trait SessionTransport :
//! - `WsTransport` : connexion websocket via tokio-tungstenite, avec une
//!   tâche d'entrée/sortie qui possède la connexion et fait le pont vers
//!   les canaux de la session
//! - `SimulatedTransport` : transport scripté pour tester la session et
//!   l'orchestrateur sans réseau (latence, perte, pannes simulées)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

use crate::{SessionConfig, SessionError, SessionResult, SessionTransport, TransportEvent, TransportLink};

/// Transport websocket réel
///
/// Le credential est ajouté en paramètre de requête `key` sur l'URL de
/// la configuration. Après le handshake, une tâche dédiée possède la
/// connexion : elle relaie les messages texte entrants vers le canal
/// `inbound` et envoie sur la socket tout ce qui arrive par `outbound`.
/// Dropper le sender `outbound` ferme la socket proprement.
pub struct WsTransport;

impl WsTransport {
    /// Crée un transport websocket
    pub fn new() -> Self {
        Self
    }

    /// Construit l'URL de connexion avec le credential
    fn build_url(config: &SessionConfig) -> SessionResult<url::Url> {
        let mut url = url::Url::parse(&config.url)
            .map_err(|e| SessionError::ConfigError(format!("URL invalide: {}", e)))?;

        url.query_pairs_mut().append_pair("key", &config.api_key);
        Ok(url)
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Traduit une erreur de handshake tungstenite en erreur de session
///
/// Une réponse HTTP 401/403 pendant l'upgrade signifie un credential
/// refusé ; tout le reste est un échec de connexion.
fn map_handshake_error(err: tokio_tungstenite::tungstenite::Error) -> SessionError {
    use tokio_tungstenite::tungstenite::Error;

    match err {
        Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                SessionError::Auth(format!("handshake refusé: HTTP {}", status))
            } else {
                SessionError::Connect(format!("handshake échoué: HTTP {}", status))
            }
        }
        other => SessionError::Connect(other.to_string()),
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn connect(&mut self, config: &SessionConfig) -> SessionResult<TransportLink> {
        let url = Self::build_url(config)?;

        debug!(url = %config.url, "Connexion websocket");

        let connected = timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                SessionError::Connect(format!(
                    "timeout de connexion après {}ms",
                    config.connect_timeout.as_millis()
                ))
            })?
            .map_err(map_handshake_error)?;

        let (ws_stream, _response) = connected;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(config.outbound_capacity);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(config.event_capacity);

        // La tâche d'entrée/sortie possède la connexion
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(TransportEvent::Message(text.to_string())).await.is_err() {
                                    // Session partie : plus personne à servir
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let reason = frame.map(|f| f.reason.to_string());
                                let _ = in_tx.send(TransportEvent::Closed(reason)).await;
                                break;
                            }
                            Some(Ok(_)) => {
                                // Binaire, ping, pong : hors contrat, ignorés
                            }
                            Some(Err(e)) => {
                                let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                                break;
                            }
                            None => {
                                let _ = in_tx.send(TransportEvent::Closed(None)).await;
                                break;
                            }
                        }
                    }
                    cmd = out_rx.recv() => {
                        match cmd {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                                    break;
                                }
                            }
                            None => {
                                // Fermeture locale : close frame puis fin
                                let _ = write.send(Message::Close(None)).await;
                                let _ = in_tx.send(TransportEvent::Closed(None)).await;
                                break;
                            }
                        }
                    }
                }
            }

            debug!("Tâche websocket terminée");
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn transport_info(&self) -> String {
        "WebSocket (tokio-tungstenite)".to_string()
    }
}

/// Implémentation de transport simulé pour les tests
///
/// Cette implémentation permet de tester le comportement de la session
/// sans réseau : événements entrants scriptés ou injectés en direct,
/// pannes de connexion programmées, latence et perte simulées, et
/// capture de tout ce qui part.
pub struct SimulatedTransport {
    /// Panne à la prochaine connexion (consommée)
    fail_connect: Option<SessionError>,

    /// Événements rejoués après la connexion, dans l'ordre
    script: Vec<TransportEvent>,

    /// Paramètres de simulation
    latency_ms: u64,
    jitter_ms: u64,
    loss_rate: f32,

    /// Capacités des canaux
    capacity: usize,

    /// État partagé avec la poignée de test
    shared: Arc<SimulatedShared>,
}

struct SimulatedShared {
    /// Messages sortants capturés
    sent: std::sync::Mutex<Vec<String>>,

    /// Nombre de connexions tentées
    connects: AtomicUsize,

    /// Injecteur d'événements en direct (disponible après connexion)
    injector: std::sync::Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

/// Poignée de test sur un [`SimulatedTransport`]
///
/// Clonable, survit au transport : sert à observer le trafic sortant et
/// à jouer le rôle du serveur distant.
#[derive(Clone)]
pub struct SimulatedHandle {
    shared: Arc<SimulatedShared>,
}

impl SimulatedTransport {
    /// Crée un transport simulé sans script ni panne
    pub fn new() -> Self {
        Self {
            fail_connect: None,
            script: Vec::new(),
            latency_ms: 0,
            jitter_ms: 0,
            loss_rate: 0.0,
            capacity: 32,
            shared: Arc::new(SimulatedShared {
                sent: std::sync::Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                injector: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Programme une panne pour la prochaine connexion
    pub fn with_failure(error: SessionError) -> Self {
        let mut transport = Self::new();
        transport.fail_connect = Some(error);
        transport
    }

    /// Programme des événements entrants rejoués après la connexion
    pub fn with_script(script: Vec<TransportEvent>) -> Self {
        let mut transport = Self::new();
        transport.script = script;
        transport
    }

    /// Configure les paramètres de simulation
    pub fn set_simulation_params(&mut self, latency_ms: u64, jitter_ms: u64, loss_rate: f32) {
        self.latency_ms = latency_ms;
        self.jitter_ms = jitter_ms;
        self.loss_rate = loss_rate;
    }

    /// Retourne une poignée de test
    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Délai simulé avant livraison d'un événement
    fn simulated_delay(&self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            fastrand::u64(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.latency_ms + jitter)
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHandle {
    /// Messages sortants capturés jusqu'ici
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Nombre de messages sortants capturés
    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().unwrap().len()
    }

    /// Nombre de connexions tentées
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::Acquire)
    }

    /// Injecte un événement entrant comme le ferait le serveur distant
    ///
    /// Retourne `false` si la connexion n'existe pas (ou plus).
    pub async fn inject(&self, event: TransportEvent) -> bool {
        let sender = self.shared.injector.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl SessionTransport for SimulatedTransport {
    async fn connect(&mut self, _config: &SessionConfig) -> SessionResult<TransportLink> {
        self.shared.connects.fetch_add(1, Ordering::AcqRel);

        if let Some(error) = self.fail_connect.take() {
            return Err(error);
        }

        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.capacity);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(self.capacity);

        // L'injecteur permet aux tests de jouer le serveur en direct
        *self.shared.injector.lock().unwrap() = Some(in_tx.clone());

        // Rejoue le script d'événements entrants
        let script = std::mem::take(&mut self.script);
        let delay = self.simulated_delay();
        let script_tx = in_tx.clone();
        tokio::spawn(async move {
            for event in script {
                if delay > Duration::ZERO {
                    sleep(delay).await;
                }
                if script_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        // Draine le trafic sortant vers le journal de capture
        let shared = Arc::clone(&self.shared);
        let loss_rate = self.loss_rate;
        tokio::spawn(async move {
            loop {
                match out_rx.recv().await {
                    Some(text) => {
                        if loss_rate > 0.0 && fastrand::f32() < loss_rate {
                            // Message perdu en route
                            continue;
                        }
                        shared.sent.lock().unwrap().push(text);
                    }
                    None => {
                        // Fermeture locale
                        let _ = in_tx.send(TransportEvent::Closed(None)).await;
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn transport_info(&self) -> String {
        format!(
            "Transport simulé (latence {}ms, jitter {}ms, perte {:.0}%)",
            self.latency_ms,
            self.jitter_ms,
            self.loss_rate * 100.0
        )
    }
}
