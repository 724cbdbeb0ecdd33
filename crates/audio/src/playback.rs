//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente l'ordonnanceur de lecture : les buffers décodés
//! arrivent séquencés mais à une cadence quelconque (plus vite ou plus
//! lentement que le temps réel), et doivent être joués jointivement,
//! sans chevauchement ni réordonnancement.
//!
//! La planification est portée par [`PlaybackQueue`], un registre pur
//! testable sans matériel : le début du buffer n+1 vaut
//! `max(maintenant, fin du buffer n)`. Côté matériel, le callback cpal
//! tire dans une FIFO d'échantillons continue, ce qui réalise exactement
//! cette planification (les buffers y sont concaténés bout à bout).

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream};
use tracing::{debug, warn};

use crate::{AudioConfig, AudioError, AudioPlayback, AudioResult, GainMode, SampleBlock};

/// Créneau de lecture planifié pour un buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledBuffer {
    /// Début de lecture planifié
    pub start: Instant,
    /// Fin de lecture planifiée
    pub end: Instant,
    /// Nombre d'échantillons du buffer
    pub samples: usize,
}

/// Registre de planification des buffers en attente
///
/// Structure pure, sans périphérique : elle ne fait que calculer et
/// mémoriser les créneaux. Invariants garantis quel que soit le rythme
/// d'arrivée :
/// - `start(n+1) >= end(n)` (jamais de chevauchement)
/// - les buffers gardent leur ordre d'arrivée (jamais réordonnés)
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    /// Créneaux encore planifiés, dans l'ordre d'arrivée
    entries: VecDeque<ScheduledBuffer>,

    /// Fin du dernier créneau planifié
    tail_end: Option<Instant>,
}

impl PlaybackQueue {
    /// Crée un registre vide
    pub fn new() -> Self {
        Self::default()
    }

    /// Planifie un buffer arrivant maintenant
    ///
    /// Le début est `max(now, fin du créneau précédent)` : un buffer qui
    /// arrive pendant la lecture du précédent s'enchaîne sans trou, un
    /// buffer qui arrive après un silence démarre immédiatement.
    /// Les créneaux déjà écoulés sont purgés au passage.
    pub fn schedule(&mut self, sample_count: usize, sample_rate: u32, now: Instant) -> ScheduledBuffer {
        while let Some(front) = self.entries.front() {
            if front.end <= now {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        let start = match self.tail_end {
            Some(tail) if tail > now => tail,
            _ => now,
        };

        let duration = Duration::from_secs_f64(sample_count as f64 / sample_rate as f64);
        let entry = ScheduledBuffer {
            start,
            end: start + duration,
            samples: sample_count,
        };

        self.tail_end = Some(entry.end);
        self.entries.push_back(entry);
        entry
    }

    /// Nombre de buffers dont la lecture n'est pas terminée à `now`
    pub fn pending_at(&self, now: Instant) -> usize {
        self.entries.iter().filter(|e| e.end > now).count()
    }

    /// Fin du dernier créneau planifié
    pub fn tail_end(&self) -> Option<Instant> {
        self.tail_end
    }

    /// Vide le registre
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tail_end = None;
    }
}

/// Implémentation de lecture audio avec cpal
///
/// Cette structure gère :
/// - La découverte du périphérique de sortie (haut-parleurs)
/// - L'ouverture paresseuse du stream (au premier buffer enfilé)
/// - La FIFO d'échantillons tirée par le callback temps réel
/// - Le gain haut-parleur appliqué à l'enfilage
///
/// # Architecture thread
///
/// Le thread appelant enfile des échantillons via `enqueue()`.
/// Le callback cpal (thread temps réel) tire dans la FIFO et envoie
/// les échantillons vers le hardware ; s'il n'y a rien à jouer, il
/// sort du silence et compte un underrun.
pub struct CpalPlayback {
    /// Périphérique audio de sortie (haut-parleurs)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None tant que rien n'a été enfilé)
    stream: Option<Stream>,

    /// FIFO d'échantillons partagée avec le callback
    fifo: Arc<std::sync::Mutex<VecDeque<f32>>>,

    /// Compteur d'underruns (callback sans données)
    underruns: Arc<AtomicU64>,

    /// Registre de planification
    queue: PlaybackQueue,

    /// Mode de gain courant
    gain: GainMode,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalPlayback {
    /// Crée une nouvelle instance de lecture
    ///
    /// Découvre le périphérique de sortie par défaut mais n'ouvre pas
    /// encore le stream : il sera construit au premier `enqueue()`.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun haut-parleur n'est disponible
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        debug!(device = %device_name, "Périphérique de lecture trouvé");

        Ok(Self {
            device,
            config,
            stream: None,
            fifo: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            underruns: Arc::new(AtomicU64::new(0)),
            queue: PlaybackQueue::new(),
            gain: GainMode::Normal,
            device_name,
        })
    }

    /// Construit le stream de sortie s'il ne l'est pas encore
    fn ensure_stream(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let supported = self.device.default_output_config()?;

        let mut stream_config = supported.config();
        stream_config.sample_rate = self.config.playback_sample_rate;
        let channels = stream_config.channels as usize;

        debug!(
            sample_rate = self.config.playback_sample_rate,
            channels,
            "Démarrage lecture"
        );

        let fifo = Arc::clone(&self.fifo);
        let underruns = Arc::clone(&self.underruns);

        // Construit le stream selon le format d'échantillons
        let stream = match supported.sample_format() {
            SampleFormat::F32 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_output(data, channels, &fifo, &underruns, |s| s);
                },
                move |err| {
                    warn!("Erreur stream de sortie : {}", err);
                },
                None,
            )?,
            SampleFormat::I16 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    fill_output(data, channels, &fifo, &underruns, |s| {
                        (s * i16::MAX as f32) as i16
                    });
                },
                move |err| {
                    warn!("Erreur stream de sortie : {}", err);
                },
                None,
            )?,
            SampleFormat::U16 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    fill_output(data, channels, &fifo, &underruns, |s| {
                        ((s + 1.0) * 0.5 * u16::MAX as f32) as u16
                    });
                },
                move |err| {
                    warn!("Erreur stream de sortie : {}", err);
                },
                None,
            )?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )));
            }
        };

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Nombre d'underruns depuis l'ouverture
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Acquire)
    }
}

/// Remplit le buffer de sortie depuis la FIFO mono
///
/// Appelé par le callback audio (thread temps réel) : try_lock pour ne
/// jamais bloquer, silence si la FIFO est vide ou verrouillée.
fn fill_output<T: Copy>(
    output: &mut [T],
    channels: usize,
    fifo: &Arc<std::sync::Mutex<VecDeque<f32>>>,
    underruns: &Arc<AtomicU64>,
    convert: impl Fn(f32) -> T,
) {
    let mut missed = false;

    match fifo.try_lock() {
        Ok(mut fifo) => {
            for frame in output.chunks_mut(channels) {
                let sample = match fifo.pop_front() {
                    Some(s) => s,
                    None => {
                        missed = true;
                        0.0
                    }
                };
                let value = convert(sample);
                for out in frame {
                    *out = value;
                }
            }
        }
        Err(_) => {
            // Verrou pris : on sort du silence plutôt que d'attendre
            for out in output.iter_mut() {
                *out = convert(0.0);
            }
            missed = true;
        }
    }

    if missed {
        underruns.fetch_add(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl AudioPlayback for CpalPlayback {
    fn enqueue(&mut self, samples: SampleBlock) -> AudioResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        self.ensure_stream()?;

        // Gain appliqué maintenant : les buffers déjà planifiés gardent le leur
        let multiplier = self.gain.multiplier();
        let entry = self.queue.schedule(
            samples.len(),
            self.config.playback_sample_rate,
            Instant::now(),
        );

        let mut fifo = self.fifo.lock().unwrap();
        fifo.extend(
            samples
                .iter()
                .map(|&s| (s * multiplier).clamp(-1.0, 1.0)),
        );

        debug!(
            samples = entry.samples,
            queued = self.queue.tail_end().is_some(),
            "Buffer planifié"
        );
        Ok(())
    }

    fn set_gain(&mut self, mode: GainMode) {
        self.gain = mode;
    }

    fn gain(&self) -> GainMode {
        self.gain
    }

    async fn reset(&mut self) -> AudioResult<()> {
        self.fifo.lock().unwrap().clear();
        self.queue.clear();

        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }

        debug!("Lecture réinitialisée");
        Ok(())
    }

    fn queued(&self) -> usize {
        self.queue.pending_at(Instant::now())
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Lecture factice pour les tests
///
/// Enregistre chaque buffer enfilé avec le gain qui lui a été appliqué,
/// et compte les resets : de quoi vérifier l'ordre de démontage et la
/// portée du mode haut-parleur sans périphérique.
pub struct MockPlayback {
    log: Arc<std::sync::Mutex<Vec<(usize, GainMode)>>>,
    resets: Arc<AtomicUsize>,
    queue: PlaybackQueue,
    gain: GainMode,
    sample_rate: u32,
}

/// Poignée de test sur une [`MockPlayback`]
#[derive(Clone)]
pub struct MockPlaybackHandle {
    log: Arc<std::sync::Mutex<Vec<(usize, GainMode)>>>,
    resets: Arc<AtomicUsize>,
}

impl MockPlayback {
    /// Crée une lecture factice
    pub fn new(sample_rate: u32) -> Self {
        Self {
            log: Arc::new(std::sync::Mutex::new(Vec::new())),
            resets: Arc::new(AtomicUsize::new(0)),
            queue: PlaybackQueue::new(),
            gain: GainMode::Normal,
            sample_rate,
        }
    }

    /// Retourne une poignée de test
    pub fn handle(&self) -> MockPlaybackHandle {
        MockPlaybackHandle {
            log: Arc::clone(&self.log),
            resets: Arc::clone(&self.resets),
        }
    }
}

impl MockPlaybackHandle {
    /// Buffers enfilés : (taille, gain appliqué)
    pub fn enqueued(&self) -> Vec<(usize, GainMode)> {
        self.log.lock().unwrap().clone()
    }

    /// Nombre de buffers enfilés
    pub fn enqueued_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Nombre de resets effectués
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AudioPlayback for MockPlayback {
    fn enqueue(&mut self, samples: SampleBlock) -> AudioResult<()> {
        self.queue
            .schedule(samples.len(), self.sample_rate, Instant::now());
        self.log.lock().unwrap().push((samples.len(), self.gain));
        Ok(())
    }

    fn set_gain(&mut self, mode: GainMode) {
        self.gain = mode;
    }

    fn gain(&self) -> GainMode {
        self.gain
    }

    async fn reset(&mut self) -> AudioResult<()> {
        self.queue.clear();
        self.resets.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn queued(&self) -> usize {
        self.queue.pending_at(Instant::now())
    }

    fn device_info(&self) -> String {
        "Lecture factice".to_string()
    }
}
