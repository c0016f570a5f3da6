//! Story circle: each player adds one line to a shared story.
//!
//! `story-circle` plays a three-player round in-process over a mesh that
//! duplicates every frame, with one player staying silent so their turn
//! times out. `story-circle broker [addr]` runs a relay broker instead.

use std::time::Duration;

use tokio::sync::broadcast;
use turnforge::prelude::*;

const TURN: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// What each seat writes when its turn comes up. `None` stays silent.
const SEATS: [(&str, &str, Option<&str>); 3] = [
    ("ana", "Ana", Some("The lighthouse went dark at midnight.")),
    ("ben", "Ben", None),
    ("cy", "Cy", Some("By morning the keeper was gone.")),
];

/// Writes this seat's line whenever a turn for it starts.
async fn play_seat(
    handle: CoordinatorHandle,
    line: Option<&'static str>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::TurnStarted(_)) => {
                let Ok(snap) = handle.snapshot().await else {
                    return;
                };
                if !snap.is_my_turn() {
                    continue;
                }
                let Some(line) = line else {
                    tracing::info!(player = %handle.local_peer(), "staying silent");
                    continue;
                };
                if let Err(e) = handle.submit(line).await {
                    tracing::warn!(player = %handle.local_peer(), error = %e, "submit failed");
                }
            }
            Ok(SessionEvent::ReplayReady(_)) => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn wait_for_lobby(handle: &CoordinatorHandle, size: usize) -> Result<(), TurnforgeError> {
    loop {
        if handle.snapshot().await?.players.len() >= size {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn play_local() -> Result<(), TurnforgeError> {
    let mesh = LocalMesh::with_faults(MeshFaults { duplicate: true });
    let handles: Vec<CoordinatorHandle> = SEATS
        .iter()
        .map(|(id, name, _)| {
            CoordinatorHandle::spawn(mesh.endpoint(*id), CoordinatorConfig::named(*name))
        })
        .collect();
    let host = &handles[0];

    let session = host.host_room("The lighthouse", TURN).await?;
    println!("hosting session {session}");
    // One at a time, so seating order is join order.
    for (seated, guest) in handles.iter().enumerate().skip(1) {
        guest.join_room(session.clone()).await?;
        wait_for_lobby(host, seated + 1).await?;
    }

    let seats: Vec<_> = handles
        .iter()
        .zip(SEATS)
        .map(|(handle, (_, _, line))| {
            tokio::spawn(play_seat(handle.clone(), line, handle.subscribe()))
        })
        .collect();

    host.start_game().await?;
    for seat in seats {
        let _ = seat.await;
    }

    let snapshot = host.snapshot().await?;
    let names: Vec<(PeerId, String)> = snapshot
        .players
        .iter()
        .map(|p| (p.id.clone(), p.display_name.clone()))
        .collect();
    println!("\n{}", snapshot.prompt);
    if let Some(replay) = &snapshot.replay {
        for item in &replay.items {
            let name = names
                .iter()
                .find(|(id, _)| *id == item.player_id)
                .map_or(item.player_id.as_str(), |(_, n)| n.as_str());
            let text = if item.text.is_empty() { "(silence)" } else { &item.text };
            println!("  {}. {name}: {text}", item.turn_index + 1);
        }
    }
    println!(
        "\nduplicates dropped by host: {}",
        snapshot.stats.duplicates
    );

    for handle in &handles {
        handle.finish().await?;
        handle.shutdown().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    turnforge::telemetry::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("broker") => {
            let addr = args.get(1).map_or("0.0.0.0:7400", String::as_str);
            let broker = Broker::bind(BrokerConfig::bind(addr)).await?;
            eprintln!("story-circle broker on {}", broker.local_addr()?);
            broker
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        _ => play_local().await?,
    }
    Ok(())
}
