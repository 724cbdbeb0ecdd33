//! Valeur d'appel en cours
//!
//! L'unique instance vivante d'un dialogue : créée au décrochage,
//! détruite au raccrochage. Jamais de global ni de singleton : c'est la
//! machine d'appel qui la possède, et elle n'en détient qu'une à la
//! fois.

use std::time::Instant;

use tokio::sync::mpsc;

use network::{AgentSession, SessionEvent};

/// L'appel en cours : session distante et indicateurs d'état
pub struct CallSession {
    /// Session de streaming ouverte (possédée exclusivement)
    pub(crate) session: AgentSession,

    /// Événements entrants de la session
    pub(crate) events: mpsc::Receiver<SessionEvent>,

    /// Instant du décrochage
    pub(crate) started_at: Instant,

    /// Micro coupé ?
    pub(crate) muted: bool,

    /// Mode haut-parleur ?
    pub(crate) speaker: bool,
}

impl CallSession {
    /// Crée la valeur d'appel au moment où la session s'ouvre
    pub(crate) fn new(session: AgentSession, events: mpsc::Receiver<SessionEvent>) -> Self {
        Self {
            session,
            events,
            started_at: Instant::now(),
            muted: false,
            speaker: false,
        }
    }

    /// Durée de l'appel depuis le décrochage
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Micro coupé ?
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Haut-parleur actif ?
    pub fn is_speaker(&self) -> bool {
        self.speaker
    }
}
