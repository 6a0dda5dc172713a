use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use twentyone_protocol::*;
use uuid::Uuid;

mod game;
mod persistence;

use game::Room;
use persistence::ChipStore;

// ==== knobs ====
const TABLES: &[&str] = &["main", "casual", "high-stakes"];
const STARTING_CHIPS: u64 = 500;
const LEADERBOARD_SIZE: usize = 10;
const BIND_ADDR: &str = "0.0.0.0:9001";

#[derive(Clone)]
struct AppState {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
    chip_store: Arc<ChipStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir =
        std::env::var("TWENTYONE_DATA_DIR").unwrap_or_else(|_| "./table_data".to_string());
    let chip_store = Arc::new(ChipStore::new(&data_dir)?);

    // the tables are fixed at startup and live for the process lifetime
    let mut rooms = HashMap::new();
    for name in TABLES {
        rooms.insert(name.to_string(), Room::new(name.to_string()));
    }
    let state = AppState {
        rooms: Arc::new(Mutex::new(rooms)),
        chip_store,
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(BIND_ADDR).await?;
    println!("server listening on ws://{BIND_ADDR}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let my_id = Uuid::new_v4();
    let _ = tx_out.send(ServerToClient::Hello { your_id: my_id });

    let mut joined_room: Option<String> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => {
                if let Ok(cmd) = serde_json::from_str::<ClientToServer>(&t) {
                    route_cmd(cmd, &state, &mut joined_room, my_id, &tx_out).await;
                } else {
                    let _ = tx_out.send(ServerToClient::Error {
                        message: "bad json".into(),
                    });
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // implicit leave on disconnect, clean or not
    if let Some(room) = joined_room.take() {
        leave_room(&state, &room, my_id).await;
    }
}

async fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    joined_room: &mut Option<String>,
    my_id: Uuid,
    tx_out: &mpsc::UnboundedSender<ServerToClient>,
) {
    eprintln!("[WS] from {} → {:?}", &my_id.to_string()[..8], cmd);

    match cmd {
        ClientToServer::JoinRoom { room, name } => {
            if joined_room.is_some() {
                let _ = tx_out.send(ServerToClient::Error {
                    message: "already seated at a table".into(),
                });
                return;
            }
            // identity handoff: the saved balance for this name, or a fresh
            // stack for a first-timer
            let chips = match state.chip_store.balance(&name).await {
                Ok(Some(chips)) => chips,
                Ok(None) => STARTING_CHIPS,
                Err(e) => {
                    eprintln!("[STORE] balance lookup failed: {e}");
                    STARTING_CHIPS
                }
            };
            let mut rooms = state.rooms.lock();
            let Some(r) = rooms.get_mut(&room) else {
                let _ = tx_out.send(ServerToClient::Error {
                    message: format!("no such table: {room}"),
                });
                return;
            };
            if r.join(my_id, name, chips, tx_out.clone()) {
                *joined_room = Some(room);
            }
        }
        ClientToServer::PlaceBet { amount } => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    r.set_bet(my_id, amount);
                });
            }
        }
        ClientToServer::Action { mv } => {
            let Some(room) = joined_room else { return };
            let Some(mv) = Move::parse(&mv) else {
                eprintln!("[ACT] dropping malformed move from {}", &my_id.to_string()[..8]);
                return;
            };
            let settled = with_room(state, room, |r| {
                r.action(my_id, mv);
                r.phase == Phase::Settle
            });
            if settled == Some(true) {
                settle_room(state, room).await;
            }
        }
        ClientToServer::Leave => {
            if let Some(room) = joined_room.take() {
                leave_room(state, &room, my_id).await;
            }
        }
    }
}

fn with_room<R>(state: &AppState, room: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
    let mut rooms = state.rooms.lock();
    rooms.get_mut(room).map(f)
}

async fn leave_room(state: &AppState, room: &str, id: Uuid) {
    // a departure mid-turn can finish the round on its own
    let settled = with_room(state, room, |r| {
        r.leave(id);
        r.phase == Phase::Settle
    });
    if settled == Some(true) {
        settle_room(state, room).await;
    }
}

/// Persists the settled balances, pushes a fresh leaderboard, then returns
/// the room to the lobby; the room never leaves `Settle` on its own.
async fn settle_room(state: &AppState, room: &str) {
    let Some((balances, txs)) = with_room(state, room, |r| {
        let balances: Vec<(String, u64)> =
            r.players.iter().map(|p| (p.name.clone(), p.chips)).collect();
        let txs: Vec<_> = r.players.iter().map(|p| p.tx.clone()).collect();
        (balances, txs)
    }) else {
        return;
    };

    if let Err(e) = state.chip_store.record_balances(&balances).await {
        eprintln!("[STORE] failed to persist balances: {e}");
    }
    match state.chip_store.top(LEADERBOARD_SIZE).await {
        Ok(entries) => {
            for tx in &txs {
                let _ = tx.send(ServerToClient::Leaderboard {
                    entries: entries.clone(),
                });
            }
        }
        Err(e) => eprintln!("[STORE] leaderboard query failed: {e}"),
    }

    with_room(state, room, |r| {
        if r.phase == Phase::Settle {
            r.reset_to_lobby();
        }
    });
}
