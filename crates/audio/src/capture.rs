//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture en utilisant la librairie cpal
//! (Cross-Platform Audio Library) pour capturer l'audio depuis le microphone.
//!
//! cpal est la librairie standard en Rust pour l'audio cross-platform.
//! Elle supporte Windows (WASAPI), macOS (CoreAudio), et Linux (ALSA/PulseAudio).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AudioCapture, AudioConfig, AudioError, AudioResult, SampleBlock, block_rms_level};

/// État partagé entre le callback cpal (thread temps réel) et l'API
struct CaptureShared {
    /// Micro coupé : les blocs sont jetés avant le canal
    muted: AtomicBool,

    /// Dernier niveau RMS mesuré (bits d'un f32)
    ///
    /// Mis à jour même coupé, pour que l'indicateur de niveau reste vivant.
    level: AtomicU32,
}

impl CaptureShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            muted: AtomicBool::new(false),
            level: AtomicU32::new(0),
        })
    }

    fn store_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Release);
    }

    fn load_level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Acquire))
    }
}

/// Implémentation du tube de capture avec cpal
///
/// Cette structure gère :
/// - La découverte du périphérique de capture (microphone)
/// - La configuration du stream audio à la fréquence du contrat (16 kHz)
/// - L'accumulation des échantillons en blocs de taille fixe
/// - La coupure micro sans arrêt du périphérique
///
/// # Architecture thread
///
/// cpal fonctionne avec des callbacks. Quand des données audio arrivent,
/// cpal appelle notre fonction qui accumule les échantillons. Quand on a
/// un bloc complet, on l'envoie via un canal async vers le consommateur.
/// L'envoi est non-bloquant : si le consommateur est en retard, le bloc
/// est perdu plutôt que de bloquer le thread audio.
pub struct CpalCapture {
    /// Périphérique audio d'entrée (microphone)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si fermé)
    stream: Option<Stream>,

    /// État partagé avec le callback
    shared: Arc<CaptureShared>,

    /// État d'ouverture
    is_open: bool,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalCapture {
    /// Crée une nouvelle instance de capture
    ///
    /// Cette fonction découvre automatiquement le périphérique d'entrée par défaut
    /// et prépare la configuration, mais n'ouvre pas encore le périphérique.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun microphone n'est disponible
    /// - `AudioError::ConfigError` si la configuration est incohérente
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        // Obtient l'host audio par défaut du système
        let host = cpal::default_host();

        // Trouve le périphérique d'entrée par défaut
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoDeviceFound)?;

        // Récupère la description du périphérique pour debug
        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        debug!(device = %device_name, "Périphérique de capture trouvé");

        Ok(Self {
            device,
            config,
            stream: None,
            shared: CaptureShared::new(),
            is_open: false,
            device_name,
        })
    }

    /// Vérifie que la fréquence du contrat est supportée par le périphérique
    fn validate_config(&self) -> AudioResult<SupportedStreamConfig> {
        // Obtient la configuration par défaut du périphérique
        let default_config = self.device.default_input_config()?;

        debug!(
            sample_rate = default_config.sample_rate(),
            channels = default_config.channels(),
            format = ?default_config.sample_format(),
            "Config par défaut du périphérique"
        );

        // Vérifie que le périphérique supporte notre sample rate
        let supported_rates = self
            .device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?;

        let mut config_found = false;
        for supported_range in supported_rates {
            let min_rate = supported_range.min_sample_rate();
            let max_rate = supported_range.max_sample_rate();

            if self.config.capture_sample_rate >= min_rate
                && self.config.capture_sample_rate <= max_rate
            {
                config_found = true;
                break;
            }
        }

        if !config_found {
            return Err(AudioError::ConfigError(format!(
                "Fréquence {} Hz non supportée par le périphérique",
                self.config.capture_sample_rate
            )));
        }

        Ok(default_config)
    }

    /// Construit et configure le stream audio
    fn build_stream(&mut self, sender: mpsc::Sender<SampleBlock>) -> AudioResult<Stream> {
        let supported = self.validate_config()?;

        // Demande la fréquence du contrat, en gardant les canaux du
        // périphérique (réduits en mono dans le callback)
        let mut stream_config = supported.config();
        stream_config.sample_rate = self.config.capture_sample_rate;
        let channels = stream_config.channels;

        let block_samples = self.config.capture_block_samples;
        let shared = Arc::clone(&self.shared);

        debug!(
            block_samples,
            block_ms = self.config.block_duration().as_millis() as u64,
            "Démarrage capture"
        );

        // Buffer pour accumuler les échantillons mono
        let mut block_buffer: Vec<f32> = Vec::with_capacity(block_samples * 2);

        // Détermine le format d'échantillons du périphérique
        let sample_format = supported.sample_format();

        // Construit le stream selon le format d'échantillons
        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels as usize) {
                        let mono = frame.iter().sum::<f32>() / channels as f32;
                        push_sample(mono, &mut block_buffer, block_samples, &sender, &shared);
                    }
                },
                move |err| {
                    warn!("Erreur stream de capture : {}", err);
                },
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels as usize) {
                        let sum: f32 = frame.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
                        push_sample(sum / channels as f32, &mut block_buffer, block_samples, &sender, &shared);
                    }
                },
                move |err| {
                    warn!("Erreur stream de capture : {}", err);
                },
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels as usize) {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                            .sum();
                        push_sample(sum / channels as f32, &mut block_buffer, block_samples, &sender, &shared);
                    }
                },
                move |err| {
                    warn!("Erreur stream de capture : {}", err);
                },
                None,
            )?,
            _ => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    sample_format
                )));
            }
        };

        Ok(stream)
    }
}

/// Accumule un échantillon mono et expédie les blocs complets
///
/// Appelé dans le callback audio (thread temps réel) : doit rester très
/// rapide et ne jamais bloquer.
fn push_sample(
    sample: f32,
    block_buffer: &mut Vec<f32>,
    block_samples: usize,
    sender: &mpsc::Sender<SampleBlock>,
    shared: &CaptureShared,
) {
    block_buffer.push(sample);

    if block_buffer.len() >= block_samples {
        let block: SampleBlock = block_buffer.drain(..).collect();

        // L'indicateur de niveau vit même micro coupé
        shared.store_level(block_rms_level(&block));

        if shared.muted.load(Ordering::Acquire) {
            // Coupé : le bloc est jeté avant d'atteindre le consommateur,
            // le périphérique continue de tourner
            return;
        }

        // Envoi non-bloquant : sous charge, perdre un bloc est normal
        let _ = sender.try_send(block);
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn open(&mut self) -> AudioResult<mpsc::Receiver<SampleBlock>> {
        if self.is_open {
            return Err(AudioError::invalid_state("open", "déjà ouvert"));
        }

        let (sender, receiver) = mpsc::channel(self.config.channel_capacity);

        // Construit et démarre le stream
        let stream = self.build_stream(sender)?;
        stream.play()?;

        self.stream = Some(stream);
        self.is_open = true;

        debug!(device = %self.device_name, "Capture audio ouverte");
        Ok(receiver)
    }

    fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
    }

    fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }

    async fn close(&mut self) -> AudioResult<()> {
        if !self.is_open {
            return Ok(()); // Déjà fermé
        }

        // Dropper le stream arrête le callback et libère le périphérique ;
        // le sender part avec lui, ce qui clôt le canal côté consommateur
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }

        self.is_open = false;

        debug!(device = %self.device_name, "Capture audio fermée");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn level(&self) -> f32 {
        self.shared.load_level()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Capture factice pour les tests
///
/// Permet de tester toute la chaîne sans matériel : les blocs sont
/// injectés par un [`MockCaptureHandle`], les pannes d'ouverture sont
/// scriptées, et des compteurs observables vérifient la libération du
/// périphérique.
pub struct MockCapture {
    shared: Arc<MockCaptureShared>,
    fail_open: Option<AudioError>,
    capacity: usize,
    is_open: bool,
}

struct MockCaptureShared {
    muted: AtomicBool,
    level: AtomicU32,
    opens: AtomicUsize,
    closes: AtomicUsize,
    sender: std::sync::Mutex<Option<mpsc::Sender<SampleBlock>>>,
}

/// Poignée de test sur une [`MockCapture`]
///
/// Clonable, survit à la capture elle-même : sert à injecter des blocs
/// et à observer les compteurs open/close depuis le test.
#[derive(Clone)]
pub struct MockCaptureHandle {
    shared: Arc<MockCaptureShared>,
}

impl MockCapture {
    /// Crée une capture factice opérationnelle
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockCaptureShared {
                muted: AtomicBool::new(false),
                level: AtomicU32::new(0),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                sender: std::sync::Mutex::new(None),
            }),
            fail_open: None,
            capacity: 16,
            is_open: false,
        }
    }

    /// Simule une panne : le prochain `open()` échouera avec cette erreur
    pub fn with_failure(error: AudioError) -> Self {
        let mut mock = Self::new();
        mock.fail_open = Some(error);
        mock
    }

    /// Retourne une poignée de test
    pub fn handle(&self) -> MockCaptureHandle {
        MockCaptureHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCaptureHandle {
    /// Injecte un bloc comme le ferait le callback périphérique
    ///
    /// Retourne `true` si le bloc a atteint le canal, `false` s'il a été
    /// jeté (micro coupé, capture fermée ou canal plein), selon les mêmes règles
    /// que l'implémentation réelle.
    pub fn push_block(&self, block: SampleBlock) -> bool {
        self.shared
            .level
            .store(block_rms_level(&block).to_bits(), Ordering::Release);

        if self.shared.muted.load(Ordering::Acquire) {
            return false;
        }

        let guard = self.shared.sender.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender.try_send(block).is_ok(),
            None => false,
        }
    }

    /// Nombre d'ouvertures effectuées
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::Acquire)
    }

    /// Nombre de fermetures effectives (les fermetures répétées ne comptent pas)
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::Acquire)
    }

    /// Le périphérique simulé est-il encore ouvert ?
    pub fn is_open(&self) -> bool {
        self.shared.sender.lock().unwrap().is_some()
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn open(&mut self) -> AudioResult<mpsc::Receiver<SampleBlock>> {
        self.shared.opens.fetch_add(1, Ordering::AcqRel);

        if let Some(error) = self.fail_open.take() {
            return Err(error);
        }

        if self.is_open {
            return Err(AudioError::invalid_state("open", "déjà ouvert"));
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        *self.shared.sender.lock().unwrap() = Some(sender);
        self.is_open = true;

        Ok(receiver)
    }

    fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
    }

    fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }

    async fn close(&mut self) -> AudioResult<()> {
        if !self.is_open {
            return Ok(());
        }

        *self.shared.sender.lock().unwrap() = None;
        self.is_open = false;
        self.shared.closes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn level(&self) -> f32 {
        f32::from_bits(self.shared.level.load(Ordering::Acquire))
    }

    fn device_info(&self) -> String {
        "Capture factice".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[test]
    fn test_capture_creation() {
        let config = AudioConfig::default();

        // Test que la création ne panic pas
        // Note: peut échouer si aucun microphone n'est disponible
        match CpalCapture::new(config) {
            Ok(capture) => {
                assert!(!capture.is_open());
                assert!(!capture.is_muted());
                assert!(!capture.device_info().is_empty());
            }
            Err(AudioError::NoDeviceFound) => {
                // Acceptable dans un environnement de test sans audio
            }
            Err(e) => panic!("Erreur inattendue: {}", e),
        }
    }

    #[tokio::test]
    async fn test_capture_open_close() {
        let config = AudioConfig::default();

        if let Ok(mut capture) = CpalCapture::new(config) {
            assert!(!capture.is_open());

            if capture.open().await.is_ok() {
                assert!(capture.is_open());

                capture.close().await.unwrap();
                assert!(!capture.is_open());

                // close() est idempotent
                capture.close().await.unwrap();
            }
        }
    }

    // Note: Ce test nécessite un vrai microphone et peut être lent
    #[tokio::test]
    #[ignore] // Ignore par défaut, lance avec --ignored pour tester
    async fn test_capture_block() {
        let config = AudioConfig::default();

        if let Ok(mut capture) = CpalCapture::new(config.clone()) {
            if let Ok(mut blocks) = capture.open().await {
                match timeout(Duration::from_secs(5), blocks.recv()).await {
                    Ok(Some(block)) => {
                        assert_eq!(block.len(), config.capture_block_samples);
                    }
                    Ok(None) => panic!("Canal fermé sans bloc"),
                    Err(_) => panic!("Timeout - aucun bloc reçu"),
                }

                let _ = capture.close().await;
            }
        }
    }

    #[tokio::test]
    async fn test_mock_delivers_blocks() {
        let mut mock = MockCapture::new();
        let handle = mock.handle();

        let mut blocks = mock.open().await.unwrap();
        assert_eq!(handle.open_count(), 1);

        assert!(handle.push_block(vec![0.1; 64]));
        let block = blocks.recv().await.unwrap();
        assert_eq!(block.len(), 64);
    }

    #[tokio::test]
    async fn test_mock_mute_suppresses_without_closing() {
        let mut mock = MockCapture::new();
        let handle = mock.handle();

        let mut blocks = mock.open().await.unwrap();

        // Coupé : aucun bloc n'atteint le consommateur
        mock.set_muted(true);
        assert!(!handle.push_block(vec![0.5; 64]));

        // ... mais le périphérique reste ouvert et le niveau vit toujours
        assert!(mock.is_open());
        assert!(handle.is_open());
        assert!(mock.level() > 0.0);

        // Au retour, les blocs repartent sans réouverture
        mock.set_muted(false);
        assert!(handle.push_block(vec![0.2; 64]));
        assert_eq!(blocks.recv().await.unwrap().len(), 64);
        assert_eq!(handle.open_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_close_ends_channel() {
        let mut mock = MockCapture::new();
        let handle = mock.handle();

        let mut blocks = mock.open().await.unwrap();
        mock.close().await.unwrap();

        assert_eq!(handle.close_count(), 1);
        assert!(!handle.push_block(vec![0.0; 64]));
        assert!(blocks.recv().await.is_none());

        // Fermetures répétées : aucun effet supplémentaire
        mock.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let mut mock = MockCapture::with_failure(AudioError::PermissionDenied);
        let handle = mock.handle();

        let result = mock.open().await;
        assert!(matches!(result, Err(AudioError::PermissionDenied)));
        assert_eq!(handle.open_count(), 1);
        assert!(!mock.is_open());
    }
}
