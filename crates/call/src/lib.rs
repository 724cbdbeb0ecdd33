//! Crate call - Machine d'états du cycle de vie d'un appel
//!
//! Ce crate est l'orchestrateur de Fauxcall : il possède le tube de
//! capture, l'ordonnanceur de lecture et le transport de session, et
//! les fait traverser le cycle `Idle → Ringing → Connecting → Active →
//! Ended` en gérant toutes les pannes.
//!
//! # Architecture
//!
//! - `types` : États, commandes, événements d'observation, catégories
//!   de notification
//! - `config` : Configuration de l'appel (sonnerie, tics, composants)
//! - `session` : La valeur d'appel en cours (unique, possédée)
//! - `machine` : La machine d'états elle-même
//!
//! # Example
//!
//! ```rust,no_run
//! use call::{CallCommand, CallConfig, CallMachine};
//! use audio::{CpalCapture, CpalPlayback};
//! use network::WsTransport;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = CallConfig::default();
//! config.session.api_key = std::env::var("GEMINI_API_KEY")?;
//!
//! let capture = CpalCapture::new(config.audio.clone())?;
//! let playback = CpalPlayback::new(config.audio.clone())?;
//!
//! let (events_tx, mut events_rx) = mpsc::channel(64);
//! let (commands_tx, commands_rx) = mpsc::channel(16);
//!
//! let machine = CallMachine::new(
//!     config,
//!     Box::new(capture),
//!     Box::new(playback),
//!     Box::new(WsTransport::new()),
//!     events_tx,
//! );
//!
//! // L'appel sonne ; décrochage depuis l'interface
//! let call = tokio::spawn(machine.run(commands_rx));
//! commands_tx.send(CallCommand::Answer).await?;
//! # Ok(())
//! # }
//! ```

mod types;
mod config;
mod session;
mod machine;

pub use types::{CallCommand, CallEvent, CallState, NoticeCategory};
pub use config::CallConfig;
pub use session::CallSession;
pub use machine::CallMachine;

/// Version du crate call
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
