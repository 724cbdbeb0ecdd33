//! Machine d'états du cycle de vie d'un appel
//!
//! Orchestrateur de tout le système : possède le tube de capture,
//! l'ordonnanceur de lecture et le transport de session, et les fait
//! traverser `Idle → Ringing → Connecting → Active → Ended` en gérant
//! toutes les transitions de panne.
//!
//! # Modèle d'exécution
//!
//! Une seule boucle coopérative par phase (`tokio::select!`) sérialise
//! les trois sources d'événements externes : les blocs du périphérique
//! de capture, les événements de la session, et les commandes de
//! l'interface. Les handlers vont à leur terme sans préemption et ne
//! bloquent jamais. Les seuls points de suspension longs sont
//! l'ouverture du micro et la connexion de la session.

use tokio::sync::mpsc;
use tokio::time::{Instant as TokioInstant, interval_at, sleep};
use tracing::{debug, info, warn};

use audio::{AudioCapture, AudioPlayback, GainMode, SampleBlock, pcm};
use network::{AgentSession, SessionEvent, SessionTransport};

use crate::{CallCommand, CallConfig, CallEvent, CallSession, CallState, NoticeCategory};

/// Issue de la phase de sonnerie
enum RingOutcome {
    /// Décroché (manuellement ou par le timer de sonnerie)
    Answered,
    /// Refusé : fin d'appel sans acquisition de ressources
    Declined,
}

/// Issue de la phase active : notification éventuelle d'abandon
type ActiveOutcome = Option<(NoticeCategory, String)>;

/// Machine d'états d'un appel entrant simulé
///
/// Possède exclusivement les poignées de ses composants pendant toute
/// la durée de l'appel, et reste seule responsable de l'ordre de
/// démontage. Il n'existe au plus qu'une [`CallSession`] à la fois :
/// la machine n'en détient qu'une et ignore tout `Answer` hors
/// sonnerie.
pub struct CallMachine {
    config: CallConfig,
    state: CallState,

    /// Tube de capture micro (cpal ou factice)
    capture: Box<dyn AudioCapture>,

    /// Ordonnanceur de lecture (cpal ou factice)
    playback: Box<dyn AudioPlayback>,

    /// Transport de session (websocket ou simulé)
    transport: Box<dyn SessionTransport>,

    /// Surface d'observation consommée par la couche de présentation
    events: mpsc::Sender<CallEvent>,
}

impl CallMachine {
    /// Crée une machine au repos
    ///
    /// Les composants sont injectés par trait : l'application passe les
    /// implémentations réelles, les tests des factices.
    pub fn new(
        config: CallConfig,
        capture: Box<dyn AudioCapture>,
        playback: Box<dyn AudioPlayback>,
        transport: Box<dyn SessionTransport>,
        events: mpsc::Sender<CallEvent>,
    ) -> Self {
        Self {
            config,
            state: CallState::Idle,
            capture,
            playback,
            transport,
            events,
        }
    }

    /// État courant
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Déroule l'appel entrant jusqu'à son terme
    ///
    /// Démarre la sonnerie, puis suit les transitions jusqu'à `Ended`.
    /// Consomme la machine : un nouvel appel exige une nouvelle
    /// instance.
    pub async fn run(mut self, mut commands: mpsc::Receiver<CallCommand>) -> CallState {
        info!("Appel entrant");
        self.set_state(CallState::Ringing).await;

        match self.ring_phase(&mut commands).await {
            RingOutcome::Answered => {}
            RingOutcome::Declined => {
                // Refus : aucune ressource n'a jamais été acquise
                self.teardown(None, None).await;
                return self.state;
            }
        }

        self.set_state(CallState::Connecting).await;

        let (frames, call) = match self.connect_phase().await {
            Ok(pair) => pair,
            Err(notice) => {
                self.teardown(None, Some(notice)).await;
                return self.state;
            }
        };

        self.set_state(CallState::Active).await;

        let (call, notice) = self.active_phase(&mut commands, frames, call).await;
        self.teardown(Some(call), notice).await;
        self.state
    }

    /// Phase de sonnerie
    ///
    /// Un unique timer d'échéance décroche automatiquement ; il est
    /// annulé par un décrochage ou un refus manuel. Tics à 1 Hz pour
    /// l'affichage. Les bascules micro/haut-parleur sont ignorées ici.
    async fn ring_phase(&mut self, commands: &mut mpsc::Receiver<CallCommand>) -> RingOutcome {
        let auto_answer = sleep(self.config.ring_timeout);
        tokio::pin!(auto_answer);

        let mut ticker = interval_at(
            TokioInstant::now() + self.config.tick_interval,
            self.config.tick_interval,
        );
        let mut elapsed: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut auto_answer => {
                    info!("Sonnerie expirée : décrochage automatique");
                    return RingOutcome::Answered;
                }

                _ = ticker.tick() => {
                    elapsed += 1;
                    self.emit(CallEvent::RingTick(elapsed)).await;
                }

                cmd = commands.recv() => match cmd {
                    Some(CallCommand::Answer) => {
                        info!("Appel décroché");
                        return RingOutcome::Answered;
                    }
                    Some(CallCommand::Decline) | Some(CallCommand::HangUp) => {
                        info!("Appel refusé");
                        return RingOutcome::Declined;
                    }
                    Some(other) => {
                        // Commande invalide pendant la sonnerie : ignorée
                        debug!(?other, "Commande ignorée en sonnerie");
                    }
                    None => {
                        // Interface partie : on raccroche
                        return RingOutcome::Declined;
                    }
                },
            }
        }
    }

    /// Phase d'établissement
    ///
    /// Dans l'ordre : (a) ouverture du micro, (b) connexion de la
    /// session. Si (a) échoue, fin d'appel avec l'erreur micro. Si (a)
    /// réussit mais pas (b), le périphérique est libéré avant la
    /// transition vers `Ended` : jamais de poignée qui fuit sur un
    /// échec partiel.
    async fn connect_phase(
        &mut self,
    ) -> Result<(mpsc::Receiver<SampleBlock>, CallSession), (NoticeCategory, String)> {
        let frames = match self.capture.open().await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Ouverture du micro impossible: {}", e);
                return Err((
                    NoticeCategory::from_audio(&e),
                    format!("{}. {}", e, e.remedy()),
                ));
            }
        };

        debug!(device = %self.capture.device_info(), "Micro ouvert");

        let mut session = AgentSession::new(self.config.session.clone());
        match session.connect(self.transport.as_mut()).await {
            Ok(events) => Ok((frames, CallSession::new(session, events))),
            Err(e) => {
                warn!("Connexion de session impossible: {}", e);
                // Libère le périphérique avant de finir l'appel
                let _ = self.capture.close().await;
                Err((NoticeCategory::from_session(&e), e.user_message()))
            }
        }
    }

    /// Phase active : l'audio circule
    ///
    /// Câble capture → codec → session et session → codec → lecture,
    /// applique les bascules, et convertit tout événement fatal de la
    /// session en fin d'appel immédiate. Retourne la valeur d'appel
    /// pour le démontage, avec la notification d'abandon éventuelle.
    async fn active_phase(
        &mut self,
        commands: &mut mpsc::Receiver<CallCommand>,
        mut frames: mpsc::Receiver<SampleBlock>,
        mut call: CallSession,
    ) -> (CallSession, ActiveOutcome) {
        let mut ticker = interval_at(
            TokioInstant::now() + self.config.tick_interval,
            self.config.tick_interval,
        );

        let capture_rate = self.config.audio.capture_sample_rate;

        loop {
            tokio::select! {
                block = frames.recv() => match block {
                    Some(block) => {
                        // Le mute a déjà filtré en amont : tout bloc reçu part
                        let frame = pcm::encode_frame(&block, capture_rate);
                        if let Err(e) = call.session.send_frame(&frame) {
                            warn!("Envoi impossible, fin d'appel: {}", e);
                            return (call, Some((NoticeCategory::Connect, e.user_message())));
                        }
                    }
                    None => {
                        warn!("Périphérique de capture disparu");
                        let e = audio::AudioError::DeviceDisconnected;
                        let notice = format!("{}. {}", e, e.remedy());
                        return (call, Some((NoticeCategory::from_audio(&e), notice)));
                    }
                },

                event = call.events.recv() => match event {
                    Some(SessionEvent::Audio(frame)) => {
                        let samples = pcm::decode_frame(&frame);
                        if let Err(e) = self.playback.enqueue(samples) {
                            // Buffer perdu, l'appel continue
                            warn!("Lecture impossible pour ce buffer: {}", e);
                        }
                    }
                    Some(SessionEvent::RemoteError(message)) => {
                        // Erreur applicative : notifiée, l'appel continue
                        warn!("Erreur distante: {}", message);
                        self.emit(CallEvent::Notice {
                            category: NoticeCategory::Remote,
                            message: format!("Erreur du service distant : {}", message),
                        })
                        .await;
                    }
                    Some(SessionEvent::Closed { reason }) => {
                        call.session.mark_closed();
                        let message = match reason {
                            Some(reason) => format!("Connexion interrompue : {}", reason),
                            None => "Connexion interrompue.".to_string(),
                        };
                        return (call, Some((NoticeCategory::Connect, message)));
                    }
                    None => {
                        call.session.mark_closed();
                        return (call, Some((
                            NoticeCategory::Connect,
                            "Connexion interrompue.".to_string(),
                        )));
                    }
                },

                cmd = commands.recv() => match cmd {
                    Some(CallCommand::HangUp) | Some(CallCommand::Decline) => {
                        info!("Raccrochage");
                        return (call, None);
                    }
                    Some(CallCommand::ToggleMute) => {
                        call.muted = !call.muted;
                        self.capture.set_muted(call.muted);
                        debug!(muted = call.muted, "Micro basculé");
                        self.emit(CallEvent::MuteChanged(call.muted)).await;
                    }
                    Some(CallCommand::ToggleSpeaker) => {
                        call.speaker = !call.speaker;
                        self.playback.set_gain(if call.speaker {
                            GainMode::Boosted
                        } else {
                            GainMode::Normal
                        });
                        debug!(speaker = call.speaker, "Haut-parleur basculé");
                        self.emit(CallEvent::SpeakerChanged(call.speaker)).await;
                    }
                    Some(CallCommand::Answer) => {
                        // Déjà en ligne : une seule CallSession à la fois
                        debug!("Answer ignoré : appel déjà actif");
                    }
                    None => {
                        // Interface partie : on raccroche
                        return (call, None);
                    }
                },

                _ = ticker.tick() => {
                    self.emit(CallEvent::CallTick(call.elapsed().as_secs())).await;
                }
            }
        }
    }

    /// Fin d'appel : démontage ordonné, idempotent
    ///
    /// Ordre fixe : (1) les timers sont retombés avec les boucles de
    /// phase, (2) fermeture de la session, (3) libération du micro,
    /// (4) reset de la lecture. Le réseau d'abord, pour qu'aucune
    /// frame tardive ne tente de s'enfiler dans un ordonnanceur déjà
    /// réinitialisé. Émet au plus une notification puis l'unique
    /// passage à `Ended` ; un second appel ne fait rien.
    async fn teardown(
        &mut self,
        mut call: Option<CallSession>,
        notice: Option<(NoticeCategory, String)>,
    ) {
        if self.state == CallState::Ended {
            return;
        }

        if let Some((category, message)) = notice {
            self.emit(CallEvent::Notice { category, message }).await;
        }

        if let Some(call) = call.as_mut() {
            call.session.close().await;
        }

        let _ = self.capture.close().await;
        let _ = self.playback.reset().await;

        self.state = CallState::Ended;
        self.emit(CallEvent::State(CallState::Ended)).await;
        info!("Appel terminé");

        // La CallSession est détruite ici avec ses poignées
    }

    /// Change d'état et l'annonce
    async fn set_state(&mut self, state: CallState) {
        self.state = state;
        debug!(%state, "Transition");
        self.emit(CallEvent::State(state)).await;
    }

    /// Émet un événement d'observation
    ///
    /// Une interface disparue n'arrête pas l'appel : l'envoi raté est
    /// ignoré.
    async fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::{AudioError, MockCapture, MockCaptureHandle, MockPlayback, MockPlaybackHandle};
    use network::{SessionError, SimulatedHandle, SimulatedTransport, TransportEvent};
    use tokio::task::JoinHandle;
    use tokio::time::{Duration, timeout};

    /// Banc de test : machine lancée avec composants factices
    struct Harness {
        events: mpsc::Receiver<CallEvent>,
        commands: mpsc::Sender<CallCommand>,
        capture: MockCaptureHandle,
        playback: MockPlaybackHandle,
        transport: SimulatedHandle,
        task: JoinHandle<CallState>,
    }

    fn spawn_machine(capture: MockCapture, transport: SimulatedTransport) -> Harness {
        spawn_machine_with_config(CallConfig::test_config(), capture, transport)
    }

    fn spawn_machine_with_config(
        config: CallConfig,
        capture: MockCapture,
        transport: SimulatedTransport,
    ) -> Harness {
        let playback = MockPlayback::new(config.session.inbound_sample_rate);
        let capture_handle = capture.handle();
        let playback_handle = playback.handle();
        let transport_handle = transport.handle();

        let (events_tx, events_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let machine = CallMachine::new(
            config,
            Box::new(capture),
            Box::new(playback),
            Box::new(transport),
            events_tx,
        );

        let task = tokio::spawn(machine.run(commands_rx));

        Harness {
            events: events_rx,
            commands: commands_tx,
            capture: capture_handle,
            playback: playback_handle,
            transport: transport_handle,
            task,
        }
    }

    async fn next_event(events: &mut mpsc::Receiver<CallEvent>) -> CallEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timeout en attente d'événement")
            .expect("canal d'événements fermé")
    }

    /// Consomme les événements jusqu'à l'état voulu, en les collectant
    async fn collect_until_state(
        events: &mut mpsc::Receiver<CallEvent>,
        target: CallState,
    ) -> Vec<CallEvent> {
        let mut collected = Vec::new();
        loop {
            let event = next_event(events).await;
            let done = event == CallEvent::State(target);
            collected.push(event);
            if done {
                return collected;
            }
        }
    }

    fn count_state(events: &[CallEvent], state: CallState) -> usize {
        events
            .iter()
            .filter(|e| **e == CallEvent::State(state))
            .count()
    }

    fn notices(events: &[CallEvent]) -> Vec<(NoticeCategory, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                CallEvent::Notice { category, message } => Some((*category, message.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_decline_acquires_nothing() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        assert_eq!(
            next_event(&mut harness.events).await,
            CallEvent::State(CallState::Ringing)
        );

        harness.commands.send(CallCommand::Decline).await.unwrap();
        let events = collect_until_state(&mut harness.events, CallState::Ended).await;

        // Ni micro ni session n'ont jamais été sollicités
        assert_eq!(harness.capture.open_count(), 0);
        assert_eq!(harness.transport.connect_count(), 0);
        assert_eq!(count_state(&events, CallState::Connecting), 0);
        assert!(notices(&events).is_empty());

        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_ring_timeout_auto_answers_exactly_once() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        // Aucune commande : la sonnerie expire et décroche toute seule
        let events = collect_until_state(&mut harness.events, CallState::Active).await;
        assert_eq!(count_state(&events, CallState::Connecting), 1);

        // Des tics de sonnerie ont été émis pendant l'attente
        assert!(events.iter().any(|e| matches!(e, CallEvent::RingTick(_))));

        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;
        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_mic_denied_notifies_and_never_connects() {
        let mut harness = spawn_machine(
            MockCapture::with_failure(AudioError::PermissionDenied),
            SimulatedTransport::new(),
        );

        harness.commands.send(CallCommand::Answer).await.unwrap();
        let events = collect_until_state(&mut harness.events, CallState::Ended).await;

        // Exactement une notification, de la bonne catégorie
        let notices = notices(&events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeCategory::PermissionDenied);
        assert!(notices[0].1.contains("Autorisez"));

        // La session n'a jamais été tentée
        assert_eq!(harness.transport.connect_count(), 0);
        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_device() {
        let mut harness = spawn_machine(
            MockCapture::new(),
            SimulatedTransport::with_failure(SessionError::Connect("réseau".to_string())),
        );

        harness.commands.send(CallCommand::Answer).await.unwrap();
        let events = collect_until_state(&mut harness.events, CallState::Ended).await;

        // Micro ouvert puis libéré : pas de poignée qui fuit
        assert_eq!(harness.capture.open_count(), 1);
        assert_eq!(harness.capture.close_count(), 1);
        assert!(!harness.capture.is_open());

        let notices = notices(&events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeCategory::Connect);

        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_auth_failure_is_categorized() {
        let mut harness = spawn_machine(
            MockCapture::new(),
            SimulatedTransport::with_failure(SessionError::Auth("401".to_string())),
        );

        harness.commands.send(CallCommand::Answer).await.unwrap();
        let events = collect_until_state(&mut harness.events, CallState::Ended).await;

        let notices = notices(&events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeCategory::Auth);
        assert_eq!(harness.capture.close_count(), 1);
    }

    #[tokio::test]
    async fn test_happy_path_one_block_one_frame() {
        let mut config = CallConfig::test_config();
        config.audio.capture_block_samples = 4096;

        let mut harness =
            spawn_machine_with_config(config, MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        // Un bloc de capture de 4096 échantillons flottants...
        assert!(harness.capture.push_block(vec![0.25; 4096]));

        // ... devient exactement un message audio de 4096 échantillons 16 bits
        let sent = timeout(Duration::from_secs(2), async {
            loop {
                let sent = harness.transport.sent();
                if sent.len() >= 2 {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frame audio jamais envoyée");

        assert_eq!(sent.len(), 2); // initialisation + une frame
        let value: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(value["audio"]["mimeType"], "audio/pcm;rate=16000");
        let data = value["audio"]["data"].as_str().unwrap();
        let frame = audio::pcm::from_transport_encoding(data, 16_000).unwrap();
        assert_eq!(frame.len(), 4096);

        // Une réponse distante est décodée et enfilée en lecture
        let reply = audio::pcm::encode_frame(&[0.1; 2400], 24_000);
        let chunk = format!(
            r#"{{"response": {{"audio": "{}"}}}}"#,
            audio::pcm::to_transport_encoding(&reply)
        );
        assert!(harness.transport.inject(TransportEvent::Message(chunk)).await);

        timeout(Duration::from_secs(2), async {
            while harness.playback.enqueued_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("réponse jamais enfilée en lecture");
        assert_eq!(harness.playback.enqueued()[0].0, 2400);

        // Raccrochage : tout est libéré
        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;

        assert_eq!(harness.capture.close_count(), 1);
        assert!(!harness.capture.is_open());
        assert_eq!(harness.playback.reset_count(), 1);
        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_mute_suppresses_without_stopping() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        harness.commands.send(CallCommand::ToggleMute).await.unwrap();
        let events = collect_until_mute(&mut harness.events, true).await;
        assert!(events.contains(&CallEvent::MuteChanged(true)));

        // Coupé : le bloc est jeté avant la session, le micro reste ouvert
        assert!(!harness.capture.push_block(vec![0.5; 64]));
        assert!(harness.capture.is_open());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(harness.transport.sent_count(), 1); // initialisation seule

        // Rétabli sans réouverture : les blocs repartent
        harness.commands.send(CallCommand::ToggleMute).await.unwrap();
        collect_until_mute(&mut harness.events, false).await;
        assert_eq!(harness.capture.open_count(), 1);
        assert!(harness.capture.push_block(vec![0.5; 64]));

        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;
    }

    async fn collect_until_mute(
        events: &mut mpsc::Receiver<CallEvent>,
        muted: bool,
    ) -> Vec<CallEvent> {
        let mut collected = Vec::new();
        loop {
            let event = next_event(events).await;
            let done = event == CallEvent::MuteChanged(muted);
            collected.push(event);
            if done {
                return collected;
            }
        }
    }

    #[tokio::test]
    async fn test_speaker_toggle_boosts_subsequent_buffers() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        // Premier buffer en gain normal
        let reply = audio::pcm::encode_frame(&[0.1; 240], 24_000);
        let chunk = format!(
            r#"{{"response": {{"audio": "{}"}}}}"#,
            audio::pcm::to_transport_encoding(&reply)
        );
        assert!(harness.transport.inject(TransportEvent::Message(chunk.clone())).await);

        timeout(Duration::from_secs(2), async {
            while harness.playback.enqueued_count() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Bascule haut-parleur puis second buffer
        harness.commands.send(CallCommand::ToggleSpeaker).await.unwrap();
        loop {
            if next_event(&mut harness.events).await == CallEvent::SpeakerChanged(true) {
                break;
            }
        }
        assert!(harness.transport.inject(TransportEvent::Message(chunk)).await);

        timeout(Duration::from_secs(2), async {
            while harness.playback.enqueued_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let log = harness.playback.enqueued();
        assert_eq!(log[0].1, GainMode::Normal);
        assert_eq!(log[1].1, GainMode::Boosted);

        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;
    }

    #[tokio::test]
    async fn test_remote_error_notifies_but_call_continues() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        assert!(
            harness
                .transport
                .inject(TransportEvent::Message(
                    r#"{"error": {"message": "quota dépassé"}}"#.to_string()
                ))
                .await
        );

        // La notification arrive sans fin d'appel
        loop {
            match next_event(&mut harness.events).await {
                CallEvent::Notice { category, message } => {
                    assert_eq!(category, NoticeCategory::Remote);
                    assert!(message.contains("quota dépassé"));
                    break;
                }
                CallEvent::State(CallState::Ended) => panic!("l'appel n'aurait pas dû finir"),
                _ => {}
            }
        }

        // L'appel tourne toujours : le micro passe encore
        assert!(harness.capture.push_block(vec![0.1; 64]));

        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;
    }

    #[tokio::test]
    async fn test_remote_close_ends_call() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        assert!(
            harness
                .transport
                .inject(TransportEvent::Closed(Some("fin distante".to_string())))
                .await
        );

        let events = collect_until_state(&mut harness.events, CallState::Ended).await;
        let notices = notices(&events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeCategory::Connect);

        // Tout est libéré malgré la fin subie
        assert_eq!(harness.capture.close_count(), 1);
        assert_eq!(harness.playback.reset_count(), 1);
        assert_eq!(harness.task.await.unwrap(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let config = CallConfig::test_config();
        let capture = MockCapture::new();
        let playback = MockPlayback::new(24_000);
        let playback_handle = playback.handle();
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let mut machine = CallMachine::new(
            config,
            Box::new(capture),
            Box::new(playback),
            Box::new(SimulatedTransport::new()),
            events_tx,
        );

        // Deux fins d'appel successives : une seule séquence de démontage
        machine.teardown(None, None).await;
        machine.teardown(None, None).await;

        assert_eq!(machine.state(), CallState::Ended);
        assert_eq!(playback_handle.reset_count(), 1);

        let mut ended = 0;
        while let Ok(Some(event)) = timeout(Duration::from_millis(50), events_rx.recv()).await {
            if event == CallEvent::State(CallState::Ended) {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn test_answer_ignored_while_active() {
        let mut harness = spawn_machine(MockCapture::new(), SimulatedTransport::new());

        harness.commands.send(CallCommand::Answer).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Active).await;

        // Un second décrochage ne crée pas de seconde session
        harness.commands.send(CallCommand::Answer).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(harness.transport.connect_count(), 1);
        assert_eq!(harness.capture.open_count(), 1);

        harness.commands.send(CallCommand::HangUp).await.unwrap();
        collect_until_state(&mut harness.events, CallState::Ended).await;
    }
}
