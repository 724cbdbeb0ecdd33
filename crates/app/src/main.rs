// Client terminal Fauxcall
//
// Cette application simule un appel entrant dont l'interlocuteur est
// un agent vocal IA. Elle câble les composants réels (micro cpal,
// lecture cpal, websocket) sur la machine d'appel et rend les
// événements sous forme d'écran d'appel texte.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use audio::{AudioCapture, AudioPlayback, CpalCapture, CpalPlayback};
use call::{CallCommand, CallConfig, CallEvent, CallMachine, CallState};
use network::WsTransport;

#[derive(Parser)]
#[command(author, version, about = "Fauxcall - appel entrant simulé avec un agent vocal IA")]
struct Cli {
    /// Clé d'API du service de dialogue audio
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Identifiant du modèle de dialogue audio
    #[arg(long)]
    model: Option<String>,

    /// Durée de sonnerie avant décrochage automatique (secondes)
    #[arg(long, default_value = "6")]
    ring_timeout: u64,

    /// Journaux détaillés
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Configuration de l'appel
    let mut config = CallConfig::default();
    config.ring_timeout = Duration::from_secs(cli.ring_timeout.max(1));
    config.session.api_key = cli.api_key;
    if let Some(model) = cli.model {
        config.session.model = model;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration invalide : {}", e))?;

    // Composants réels
    let capture = CpalCapture::new(config.audio.clone())
        .map_err(|e| anyhow::anyhow!("{}. {}", e, e.remedy()))?;
    let playback = CpalPlayback::new(config.audio.clone())
        .map_err(|e| anyhow::anyhow!("{}. {}", e, e.remedy()))?;
    let transport = WsTransport::new();

    println!("🎤 Micro : {}", capture.device_info());
    println!("🔊 Sortie : {}", playback.device_info());

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (commands_tx, commands_rx) = mpsc::channel(16);

    let machine = CallMachine::new(
        config,
        Box::new(capture),
        Box::new(playback),
        Box::new(transport),
        events_tx,
    );

    let call = tokio::spawn(machine.run(commands_rx));

    print_controls();

    // Lecture des commandes clavier sur stdin
    let keyboard = commands_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "a" | "answer" => CallCommand::Answer,
                "d" | "decline" => CallCommand::Decline,
                "m" | "mute" => CallCommand::ToggleMute,
                "s" | "speaker" => CallCommand::ToggleSpeaker,
                "e" | "q" | "end" => CallCommand::HangUp,
                "" => continue,
                _ => {
                    print_controls();
                    continue;
                }
            };
            if keyboard.send(command).await.is_err() {
                break;
            }
        }
    });

    // Boucle de rendu des événements
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\n🛑 Interruption : raccrochage...");
                let _ = commands_tx.send(CallCommand::HangUp).await;
            }

            event = events_rx.recv() => match event {
                Some(event) => {
                    if render_event(&event) {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let final_state = call.await.context("machine d'appel interrompue")?;
    println!("👋 Fin ({})", final_state);
    Ok(())
}

/// Affiche l'aide des commandes clavier
fn print_controls() {
    println!();
    println!("📋 Commandes :");
    println!("   a = décrocher   d = refuser   m = micro   s = haut-parleur   e = raccrocher");
    println!();
}

/// Rend un événement d'appel à l'écran
///
/// Retourne `true` quand l'appel est terminé.
fn render_event(event: &CallEvent) -> bool {
    match event {
        CallEvent::State(CallState::Ringing) => {
            println!("📞 Appel entrant : Agent IA");
            println!("   (décrochage automatique dans quelques secondes)");
        }
        CallEvent::State(CallState::Connecting) => {
            println!("⏳ Connexion...");
        }
        CallEvent::State(CallState::Active) => {
            println!("✅ En ligne ! Parlez, l'agent vous répond.");
        }
        CallEvent::State(CallState::Ended) => {
            println!();
            return true;
        }
        CallEvent::State(CallState::Idle) => {}
        CallEvent::RingTick(secs) => {
            print!("\r🔔 Sonnerie {}", format_clock(*secs));
            let _ = io::stdout().flush();
        }
        CallEvent::CallTick(secs) => {
            print!("\r⏱  {}", format_clock(*secs));
            let _ = io::stdout().flush();
        }
        CallEvent::MuteChanged(muted) => {
            if *muted {
                println!("\n🔇 Micro coupé");
            } else {
                println!("\n🎤 Micro rétabli");
            }
        }
        CallEvent::SpeakerChanged(speaker) => {
            if *speaker {
                println!("\n📢 Haut-parleur activé");
            } else {
                println!("\n🔊 Écoute normale");
            }
        }
        CallEvent::Notice { message, .. } => {
            println!("\n❌ {}", message);
        }
    }
    false
}

/// Formate une durée en mm:ss
fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
