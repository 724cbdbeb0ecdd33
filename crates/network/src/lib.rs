//! Crate network - Session de streaming duplex vers l'agent vocal
//!
//! Ce crate fournit la couche réseau de Fauxcall : une session logique
//! duplex au-dessus d'un websocket, avec le contrat de messages de
//! l'agent vocal (initialisation JSON, audio PCM base64 dans les deux
//! sens, erreurs structurées).
//!
//! # Architecture
//!
//! Le crate est organisé en plusieurs modules :
//!
//! - `error` : Gestion d'erreurs avec types spécialisés session
//! - `types` : Contrat de messages, configuration, événements, états
//! - `traits` : Couture transport (canaux entrant/sortant)
//! - `transport` : Implémentations websocket (réelle et simulée)
//! - `session` : Session haut niveau avec logique métier
//!
//! # Examples
//!
//! ## Session basique
//!
//! ```rust,no_run
//! use network::{AgentSession, SessionConfig, WsTransport};
//! use audio::AudioFrame;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = SessionConfig::default();
//! config.api_key = std::env::var("GEMINI_API_KEY")?;
//!
//! let mut transport = WsTransport::new();
//! let mut session = AgentSession::new(config);
//!
//! // L'ouverture rend le canal d'événements entrants
//! let mut events = session.connect(&mut transport).await?;
//!
//! // Envoi d'une frame de capture
//! let frame = AudioFrame::silence(4096, 16_000);
//! session.send_frame(&frame)?;
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tests et simulation
//!
//! ```rust
//! use network::{AgentSession, SessionConfig, SimulatedTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Transport simulé : pas de réseau, événements scriptés
//! let mut transport = SimulatedTransport::new();
//! let mut session = AgentSession::new(SessionConfig::test_config());
//!
//! let events = session.connect(&mut transport).await?;
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod transport;
mod session;

// Re-exports publics
pub use error::{SessionError, SessionResult};

pub use types::{
    AudioMessage, ServerMessage, SessionConfig, SessionEvent, SessionState, SetupMessage,
    audio_mime_type,
};

pub use traits::{SessionTransport, TransportEvent, TransportLink};

pub use transport::{SimulatedHandle, SimulatedTransport, WsTransport};

pub use session::AgentSession;

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
