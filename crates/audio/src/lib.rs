//! Crate audio pour Fauxcall - Simulation d'appel vocal IA
//!
//! Ce crate gère toute la chaîne audio locale :
//! - Capture microphone avec cpal (blocs de taille fixe, coupure micro)
//! - Codec PCM 16 bits et encodage de transport base64
//! - Ordonnancement de lecture jointive des réponses distantes
//! - Implémentations factices pour les tests sans matériel

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, etc.)
pub mod traits;      // Traits abstraits
pub mod pcm;         // Codec PCM et encodage de transport
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Implémentation lecture avec cpal
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::{CpalCapture, MockCapture, MockCaptureHandle};
pub use playback::{CpalPlayback, MockPlayback, MockPlaybackHandle, PlaybackQueue, ScheduledBuffer};
