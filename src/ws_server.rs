// WebSocket front end. One task per client connection; each request gets
// exactly one JSON reply, and a connection that subscribes also receives
// the snapshot stream interleaved with its replies.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};

use crate::arbiter::BidOutcome;
use crate::coordinator::CoordinatorHandle;
use crate::error::RejectReason;
use crate::notify::{AuctionSnapshot, Subscription};
use crate::protocol::{ClientMessage, ServerMessage};

/// Run the WebSocket server on the given port. Accepts connections until
/// the task is cancelled or the process exits.
pub async fn run(port: u16, handle: CoordinatorHandle) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let local_addr = listener.local_addr()?;
    info!("websocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let handle = handle.clone();
        tokio::spawn(async move {
            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed for {addr}: {e}");
                    return;
                }
            };
            info!("client connected from {addr}");
            if let Err(e) = serve_connection(ws_stream, handle).await {
                warn!("connection {addr} ended with error: {e:#}");
            }
            info!("client {addr} disconnected");
        });
    }
}

/// Serve one websocket connection to completion. Generic over the
/// transport so it can run on in-memory streams in tests.
pub async fn serve_connection<S>(
    ws_stream: WebSocketStream<S>,
    handle: CoordinatorHandle,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    enum Event {
        Client(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
        Snapshot(Option<std::sync::Arc<AuctionSnapshot>>),
    }

    let (mut write, mut read) = ws_stream.split();
    let mut subscription: Option<Subscription> = None;

    loop {
        // The subscription borrow must end before `dispatch` can install a
        // new one, hence the block.
        let event = match subscription.as_mut() {
            Some(sub) => tokio::select! {
                msg = read.next() => Event::Client(msg),
                snapshot = sub.recv() => Event::Snapshot(snapshot),
            },
            None => Event::Client(read.next().await),
        };

        match event {
            Event::Client(Some(Ok(Message::Text(text)))) => {
                let reply = dispatch(&handle, &text, &mut subscription).await;
                let json = serde_json::to_string(&reply)?;
                write.send(Message::text(json)).await?;
            }
            Event::Client(Some(Ok(Message::Close(_)))) | Event::Client(None) => break,
            Event::Client(Some(Ok(_))) => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
            Event::Client(Some(Err(e))) => {
                warn!("websocket error: {e}");
                break;
            }
            Event::Snapshot(Some(snapshot)) => {
                let reply = ServerMessage::Snapshot {
                    snapshot: (*snapshot).clone(),
                };
                let json = serde_json::to_string(&reply)?;
                write.send(Message::text(json)).await?;
            }
            // Bus shut down; stop streaming but keep serving requests.
            Event::Snapshot(None) => subscription = None,
        }
    }
    Ok(())
}

/// Parse one raw text frame and produce its reply. The primary unit-test
/// target; no I/O.
pub async fn dispatch(
    handle: &CoordinatorHandle,
    text: &str,
    subscription: &mut Option<Subscription>,
) -> ServerMessage {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => return ServerMessage::bad_request(format!("unparseable request: {e}")),
    };
    handle_request(handle, msg, subscription).await
}

async fn handle_request(
    handle: &CoordinatorHandle,
    msg: ClientMessage,
    subscription: &mut Option<Subscription>,
) -> ServerMessage {
    match msg {
        ClientMessage::CreateTeam { team, member } => {
            match handle.create_team(&team, &member).await {
                Ok(_) => ServerMessage::TeamCreated { team },
                Err(e) => ServerMessage::error(&e),
            }
        }
        ClientMessage::JoinTeam { team, member } => match handle.join_team(&team, &member).await {
            Ok(()) => ServerMessage::TeamJoined { team },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::GetTeam { team } => match handle.get_team(&team).await {
            Ok(view) => ServerMessage::Team { team: view },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::StartAuction {
            player_id,
            starting_bid,
        } => match handle.start_auction(&player_id, starting_bid).await {
            Ok(snapshot) => ServerMessage::Session { snapshot },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::PlaceBid { team, amount } => match handle.place_bid(&team, amount).await {
            Ok((outcome, snapshot)) => bid_result(outcome, snapshot),
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::ResolveAuction { team, price } => {
            match handle.resolve_auction(team, price).await {
                Ok(sale) => ServerMessage::Sold {
                    team: sale.team,
                    price: sale.price,
                    snapshot: sale.snapshot,
                },
                Err(e) => ServerMessage::error(&e),
            }
        }
        ClientMessage::MarkUnsold => match handle.mark_unsold().await {
            Ok(snapshot) => ServerMessage::Session { snapshot },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::ListPlayers => match handle.list_players().await {
            Ok(players) => ServerMessage::Players { players },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::SubmitLineup { team, player_ids } => {
            match handle.submit_lineup(&team, player_ids).await {
                Ok(submission) => ServerMessage::LineupAccepted { submission },
                Err(e) => ServerMessage::error(&e),
            }
        }
        ClientMessage::ListSubmissions => match handle.list_submissions().await {
            Ok(submissions) => ServerMessage::Submissions { submissions },
            Err(e) => ServerMessage::error(&e),
        },
        // Reply with the current state; the stream of later snapshots
        // arrives on the same connection.
        ClientMessage::Subscribe => {
            let sub = handle.subscribe();
            match handle.snapshot().await {
                Ok(snapshot) => {
                    *subscription = Some(sub);
                    ServerMessage::Snapshot { snapshot }
                }
                Err(e) => ServerMessage::error(&e),
            }
        }
    }
}

fn bid_result(outcome: BidOutcome, snapshot: AuctionSnapshot) -> ServerMessage {
    let (accepted, reason): (bool, Option<RejectReason>) = match outcome {
        BidOutcome::Accepted { .. } => (true, None),
        BidOutcome::Rejected(reason) => (false, Some(reason)),
    };
    ServerMessage::BidResult {
        accepted,
        reason,
        snapshot,
    }
}
