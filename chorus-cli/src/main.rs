use anyhow::{Context, Result};
use chorus::mesh::{
    LocalIdentity, MeshConfig, PeerStatus, RosterEntry, SessionEvent, SilenceSource,
    StaticCapture, VoiceClient, VoiceSession, WebRtcMediaFactory, WsSignalingTransport,
};
use chorus::model::IceServerConfig;
use chorus::relay::RelayConfig;
use clap::{Parser, Subcommand};
use colored::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Peer-to-peer voice sessions over a signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        /// Address to listen on. Defaults to CHORUS_RELAY_ADDR or 0.0.0.0:3000.
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Join a session with a silent microphone and print roster changes until Ctrl-C.
    Join {
        #[arg(long, env = "CHORUS_RELAY_URL", default_value = "ws://127.0.0.1:3000")]
        relay: String,

        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        name: String,

        /// Stable participant id. A random one is used when omitted.
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        muted: bool,

        /// STUN/TURN url, repeatable. Replaces the configured ICE servers.
        #[arg(long = "ice-server")]
        ice_servers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { addr } => {
            let mut config = RelayConfig::from_env();
            if let Some(addr) = addr {
                config.bind_addr = addr;
            }
            println!(
                "{} {}",
                "Starting Chorus relay on".green().bold(),
                config.bind_addr
            );
            chorus::relay::run(config).await
        }
        Commands::Join {
            relay,
            session,
            name,
            id,
            muted,
            ice_servers,
        } => {
            let mut config = MeshConfig::from_env();
            if !ice_servers.is_empty() {
                config.ice_servers = vec![IceServerConfig {
                    urls: ice_servers,
                    username: None,
                    credential: None,
                }];
            }
            let identity = match id {
                Some(id) => LocalIdentity::new(id, name),
                None => LocalIdentity::anonymous(name),
            };
            join(relay, session, identity, muted, config).await
        }
    }
}

async fn join(
    relay: String,
    session: String,
    identity: LocalIdentity,
    muted: bool,
    config: MeshConfig,
) -> Result<()> {
    let client = VoiceClient::new(
        Arc::new(identity.clone()),
        Arc::new(WsSignalingTransport::new(relay.clone())),
        Arc::new(WebRtcMediaFactory::new(&config)),
        Arc::new(StaticCapture::new(Arc::new(SilenceSource::start()))),
        config,
    );

    let voice = client
        .join(session.as_str())
        .await
        .with_context(|| format!("failed to join {session} through {relay}"))?;
    let mut events = voice.events();
    println!(
        "{} {} as {} ({})",
        "Joined".green().bold(),
        session.bold(),
        identity.name,
        identity.id.to_string().dimmed()
    );

    if muted {
        voice.set_muted(true).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Left { .. }) => return Ok(()),
                Ok(event) => {
                    print_event(&event);
                    if matches!(
                        event,
                        SessionEvent::ParticipantJoined { .. }
                            | SessionEvent::ParticipantLeft { .. }
                            | SessionEvent::PeerStatusChanged { .. }
                    ) {
                        print_roster(&voice).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} session events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }

    println!("{}", "Leaving...".yellow());
    voice.leave().await?;
    println!("{}", "Left the session.".green());
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::ParticipantJoined { participant, name } => {
            println!("{} {} ({})", "+".green().bold(), name, participant)
        }
        SessionEvent::ParticipantLeft { participant } => {
            println!("{} {}", "-".red().bold(), participant)
        }
        SessionEvent::PeerStatusChanged {
            participant,
            status,
        } => println!("  {} is {}", participant, colored_status(*status)),
        SessionEvent::RemoteAudioAvailable { participant, .. } => {
            println!("  {} {}", "audio from".cyan(), participant)
        }
        SessionEvent::RemoteAudioReleased { participant } => {
            println!("  {} {}", "audio closed for".dimmed(), participant)
        }
        SessionEvent::PeerUnreachable { participant } => {
            println!("{} {} is unreachable", "!".red().bold(), participant)
        }
        SessionEvent::MuteChanged { muted } => {
            let label = if *muted { "muted" } else { "unmuted" };
            println!("  {}", label.yellow())
        }
        SessionEvent::SignalingError { message } => {
            println!("{} {}", "signaling error:".red().bold(), message)
        }
        SessionEvent::Left { .. } => {}
    }
}

async fn print_roster(voice: &VoiceSession) {
    let roster: Vec<RosterEntry> = match voice.roster().await {
        Ok(roster) => roster,
        Err(e) => {
            warn!("Could not read roster: {}", e);
            return;
        }
    };
    println!("{}", format!("Roster ({})", roster.len()).bold());
    for entry in roster {
        println!(
            "  {:<20} {:<12} {}",
            entry.name.to_string(),
            colored_status(entry.status),
            entry.participant.to_string().dimmed()
        );
    }
}

fn colored_status(status: PeerStatus) -> ColoredString {
    match status {
        PeerStatus::Connecting => status.as_str().yellow(),
        PeerStatus::Connected => status.as_str().green(),
        PeerStatus::Failed => status.as_str().red(),
    }
}
