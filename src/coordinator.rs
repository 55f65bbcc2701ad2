// Auction coordinator: a single task that owns all mutable auction state
// and drains a command channel. Every state transition happens inside this
// task, one command at a time, which is what makes bid arbitration and
// budget debits atomic without locks.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::arbiter::{BidArbiter, BidOutcome};
use crate::config::Config;
use crate::db::Database;
use crate::directory::{AuctionDirectory, Disposition};
use crate::error::AuctionError;
use crate::ledger::{PurchaseRecord, TeamLedger};
use crate::lineup::{build_submission, LineupRules, LineupSubmission};
use crate::notify::{AuctionSnapshot, NotificationBus};
use crate::player::{Amount, BasePrices, Player, PlayerId};
use crate::protocol::TeamView;
use crate::session::AuctionSession;

const COMMAND_BUFFER: usize = 256;

/// Commands accepted by the coordinator task. Each carries a oneshot
/// reply; the queue order is the serialization order.
#[derive(Debug)]
pub enum Command {
    CreateTeam {
        team: String,
        member: String,
        reply: oneshot::Sender<Result<AuctionSnapshot, AuctionError>>,
    },
    JoinTeam {
        team: String,
        member: String,
        reply: oneshot::Sender<Result<(), AuctionError>>,
    },
    GetTeam {
        team: String,
        reply: oneshot::Sender<Result<TeamView, AuctionError>>,
    },
    StartAuction {
        player_id: String,
        starting_bid: Option<Amount>,
        reply: oneshot::Sender<Result<AuctionSnapshot, AuctionError>>,
    },
    PlaceBid {
        team: String,
        amount: Amount,
        reply: oneshot::Sender<Result<(BidOutcome, AuctionSnapshot), AuctionError>>,
    },
    ResolveAuction {
        team: Option<String>,
        price: Option<Amount>,
        reply: oneshot::Sender<Result<SaleResult, AuctionError>>,
    },
    MarkUnsold {
        reply: oneshot::Sender<Result<AuctionSnapshot, AuctionError>>,
    },
    ListPlayers {
        reply: oneshot::Sender<Vec<Player>>,
    },
    SubmitLineup {
        team: String,
        player_ids: Vec<String>,
        reply: oneshot::Sender<Result<LineupSubmission, AuctionError>>,
    },
    ListSubmissions {
        reply: oneshot::Sender<Result<Vec<LineupSubmission>, AuctionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<AuctionSnapshot>,
    },
}

/// Outcome of a successful `ResolveAuction`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleResult {
    pub team: String,
    pub price: Amount,
    pub snapshot: AuctionSnapshot,
}

/// Cheap-to-clone handle for submitting commands to the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    bus: NotificationBus,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, AuctionError>>) -> Command,
    ) -> Result<T, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| AuctionError::Unavailable)?;
        rx.await.map_err(|_| AuctionError::Unavailable)?
    }

    pub async fn create_team(
        &self,
        team: &str,
        member: &str,
    ) -> Result<AuctionSnapshot, AuctionError> {
        self.request(|reply| Command::CreateTeam {
            team: team.to_string(),
            member: member.to_string(),
            reply,
        })
        .await
    }

    pub async fn join_team(&self, team: &str, member: &str) -> Result<(), AuctionError> {
        self.request(|reply| Command::JoinTeam {
            team: team.to_string(),
            member: member.to_string(),
            reply,
        })
        .await
    }

    pub async fn get_team(&self, team: &str) -> Result<TeamView, AuctionError> {
        self.request(|reply| Command::GetTeam {
            team: team.to_string(),
            reply,
        })
        .await
    }

    pub async fn start_auction(
        &self,
        player_id: &str,
        starting_bid: Option<Amount>,
    ) -> Result<AuctionSnapshot, AuctionError> {
        self.request(|reply| Command::StartAuction {
            player_id: player_id.to_string(),
            starting_bid,
            reply,
        })
        .await
    }

    pub async fn place_bid(
        &self,
        team: &str,
        amount: Amount,
    ) -> Result<(BidOutcome, AuctionSnapshot), AuctionError> {
        self.request(|reply| Command::PlaceBid {
            team: team.to_string(),
            amount,
            reply,
        })
        .await
    }

    pub async fn resolve_auction(
        &self,
        team: Option<String>,
        price: Option<Amount>,
    ) -> Result<SaleResult, AuctionError> {
        self.request(|reply| Command::ResolveAuction { team, price, reply })
            .await
    }

    pub async fn mark_unsold(&self) -> Result<AuctionSnapshot, AuctionError> {
        self.request(|reply| Command::MarkUnsold { reply }).await
    }

    pub async fn list_players(&self) -> Result<Vec<Player>, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ListPlayers { reply })
            .await
            .map_err(|_| AuctionError::Unavailable)?;
        rx.await.map_err(|_| AuctionError::Unavailable)
    }

    pub async fn submit_lineup(
        &self,
        team: &str,
        player_ids: Vec<String>,
    ) -> Result<LineupSubmission, AuctionError> {
        self.request(|reply| Command::SubmitLineup {
            team: team.to_string(),
            player_ids,
            reply,
        })
        .await
    }

    pub async fn list_submissions(&self) -> Result<Vec<LineupSubmission>, AuctionError> {
        self.request(|reply| Command::ListSubmissions { reply }).await
    }

    pub async fn snapshot(&self) -> Result<AuctionSnapshot, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| AuctionError::Unavailable)?;
        rx.await.map_err(|_| AuctionError::Unavailable)
    }

    /// Subscribe to the snapshot stream. Goes straight to the bus; no
    /// round-trip through the command queue.
    pub fn subscribe(&self) -> crate::notify::Subscription {
        self.bus.subscribe()
    }
}

/// The coordinator task state. Constructed once at startup, then consumed
/// by [`Coordinator::run`].
pub struct Coordinator {
    ledger: TeamLedger,
    session: AuctionSession,
    arbiter: BidArbiter,
    directory: AuctionDirectory,
    db: Database,
    bus: NotificationBus,
    base_prices: BasePrices,
    lineup_rules: LineupRules,
    rx: mpsc::Receiver<Command>,
}

impl Coordinator {
    pub fn new(
        config: &Config,
        pool: BTreeMap<PlayerId, Player>,
        db: Database,
        bus: NotificationBus,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let coordinator = Coordinator {
            ledger: TeamLedger::new(config.budget, config.roster_cap),
            session: AuctionSession::new(),
            arbiter: BidArbiter::new(),
            directory: AuctionDirectory::new(pool),
            db,
            bus: bus.clone(),
            base_prices: config.base_prices,
            lineup_rules: config.lineup,
            rx,
        };
        let handle = CoordinatorHandle { tx, bus };
        (coordinator, handle)
    }

    /// Replay persisted teams and completions to rebuild in-memory state
    /// after a restart. Must run before `run`.
    pub fn recover(&mut self) -> anyhow::Result<()> {
        let data = self.db.load_recovery()?;
        let (team_count, sale_count, unsold_count) =
            (data.teams.len(), data.sales.len(), data.unsold.len());

        for (name, members) in data.teams {
            let mut members = members.into_iter();
            let Some(first) = members.next() else {
                warn!(team = name, "persisted team has no members; skipping");
                continue;
            };
            self.ledger.create_team(&name, &first)?;
            for member in members {
                self.ledger.join_team(&name, &member)?;
            }
        }

        for (team, purchase) in data.sales {
            match self.directory.reserve_for_auction(&purchase.player_id) {
                Ok(player) => {
                    self.ledger
                        .debit_and_add_player(&team, &player, purchase.price)?;
                    self.directory.mark_completed(
                        &purchase.player_id,
                        Disposition::Sold {
                            team,
                            price: purchase.price,
                        },
                    )?;
                }
                // The player left the dataset since the sale was recorded.
                // The ledger still needs the debit; the directory has
                // nothing to track.
                Err(_) => {
                    warn!(
                        player_id = purchase.player_id,
                        "sold player missing from dataset; replaying ledger only"
                    );
                    let player = player_from_purchase(&purchase);
                    self.ledger
                        .debit_and_add_player(&team, &player, purchase.price)?;
                }
            }
        }

        for player_id in data.unsold {
            if self.directory.in_pool(&player_id) {
                self.directory.mark_completed(&player_id, Disposition::Unsold)?;
            } else {
                warn!(player_id, "unsold player missing from dataset; skipping");
            }
        }

        if team_count + sale_count + unsold_count > 0 {
            info!(
                teams = team_count,
                sales = sale_count,
                unsold = unsold_count,
                "recovered persisted auction state"
            );
        }
        Ok(())
    }

    /// Drain the command queue until every handle is dropped.
    pub async fn run(mut self) {
        info!("coordinator running");
        while let Some(cmd) = self.rx.recv().await {
            self.dispatch(cmd);
        }
        info!("coordinator shutting down");
    }

    fn dispatch(&mut self, cmd: Command) {
        // A dropped reply means the requester went away; nothing to do.
        match cmd {
            Command::CreateTeam {
                team,
                member,
                reply,
            } => {
                let _ = reply.send(self.create_team(&team, &member));
            }
            Command::JoinTeam {
                team,
                member,
                reply,
            } => {
                let _ = reply.send(self.join_team(&team, &member));
            }
            Command::GetTeam { team, reply } => {
                let _ = reply.send(self.ledger.get_team(&team).map(TeamView::from));
            }
            Command::StartAuction {
                player_id,
                starting_bid,
                reply,
            } => {
                let _ = reply.send(self.start_auction(&player_id, starting_bid));
            }
            Command::PlaceBid {
                team,
                amount,
                reply,
            } => {
                let _ = reply.send(self.place_bid(&team, amount));
            }
            Command::ResolveAuction { team, price, reply } => {
                let _ = reply.send(self.resolve_auction(team, price));
            }
            Command::MarkUnsold { reply } => {
                let _ = reply.send(self.mark_unsold());
            }
            Command::ListPlayers { reply } => {
                let _ = reply.send(self.directory.list_available().cloned().collect());
            }
            Command::SubmitLineup {
                team,
                player_ids,
                reply,
            } => {
                let _ = reply.send(self.submit_lineup(&team, &player_ids));
            }
            Command::ListSubmissions { reply } => {
                let _ = reply.send(persist(self.db.load_submissions()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Command handlers. All synchronous; no await point can interleave two
    // commands' effects.
    // -----------------------------------------------------------------------

    fn create_team(&mut self, team: &str, member: &str) -> Result<AuctionSnapshot, AuctionError> {
        self.ledger.create_team(team, member)?;
        persist(self.db.record_team(team, member))?;
        let snapshot = self.snapshot();
        self.bus.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn join_team(&mut self, team: &str, member: &str) -> Result<(), AuctionError> {
        self.ledger.join_team(team, member)?;
        persist(self.db.record_member(team, member))
    }

    fn start_auction(
        &mut self,
        player_id: &str,
        starting_bid: Option<Amount>,
    ) -> Result<AuctionSnapshot, AuctionError> {
        if self.session.is_active() {
            return Err(AuctionError::AuctionAlreadyActive);
        }
        let player = self.directory.reserve_for_auction(player_id)?;
        let starting_bid = starting_bid.unwrap_or_else(|| self.base_prices.for_player(player.capped));
        if let Err(e) = self.session.start(player, starting_bid) {
            self.directory.abort_in_flight(player_id);
            return Err(e);
        }
        let snapshot = self.snapshot();
        self.bus.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn place_bid(
        &mut self,
        team: &str,
        amount: Amount,
    ) -> Result<(BidOutcome, AuctionSnapshot), AuctionError> {
        let budget = self.ledger.get_team(team)?.budget;
        self.session.active()?;
        let outcome = self.arbiter.submit(&mut self.session, amount, team, budget);
        let snapshot = self.snapshot();
        if outcome.is_accepted() {
            self.bus.publish(snapshot.clone());
        }
        Ok((outcome, snapshot))
    }

    fn resolve_auction(
        &mut self,
        team: Option<String>,
        price: Option<Amount>,
    ) -> Result<SaleResult, AuctionError> {
        let (winner, price, player) = {
            let view = self.session.active()?;
            let winner = match team.or_else(|| view.highest_bidder.map(str::to_string)) {
                Some(t) => t,
                None => return Err(AuctionError::InvalidTransition("no bids to resolve")),
            };
            (winner, price.unwrap_or(view.current_bid), view.player.clone())
        };

        // Debit first so a budget or roster failure leaves the session
        // active for a different resolution.
        self.ledger.debit_and_add_player(&winner, &player, price)?;
        let player = self.session.finish()?;
        self.directory.mark_completed(
            &player.id,
            Disposition::Sold {
                team: winner.clone(),
                price,
            },
        )?;
        persist(
            self.db
                .record_sale(&winner, &PurchaseRecord::new(&player, price)),
        )?;
        info!(player_id = player.id, team = winner, price, "player sold");

        let snapshot = self.snapshot();
        self.bus.publish(snapshot.clone());
        Ok(SaleResult {
            team: winner,
            price,
            snapshot,
        })
    }

    fn mark_unsold(&mut self) -> Result<AuctionSnapshot, AuctionError> {
        let player = self.session.finish()?;
        self.directory
            .mark_completed(&player.id, Disposition::Unsold)?;
        persist(self.db.record_unsold(&PurchaseRecord::new(&player, 0)))?;
        info!(player_id = player.id, "player unsold");

        let snapshot = self.snapshot();
        self.bus.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn submit_lineup(
        &mut self,
        team: &str,
        player_ids: &[String],
    ) -> Result<LineupSubmission, AuctionError> {
        let team = self.ledger.get_team(team)?;
        let submission = build_submission(team, player_ids, &self.lineup_rules)?;
        persist(self.db.save_submission(&submission))?;
        info!(
            team = submission.team,
            average_rating = submission.average_rating,
            "lineup submitted"
        );
        Ok(submission)
    }

    fn snapshot(&self) -> AuctionSnapshot {
        AuctionSnapshot::capture(&self.session, &self.ledger, &self.directory)
    }
}

/// Map a database failure onto the domain error, logging it. For writes,
/// the in-memory transition has already been committed when this runs.
fn persist<T>(result: anyhow::Result<T>) -> Result<T, AuctionError> {
    result.map_err(|e| {
        error!("database operation failed: {e:#}");
        AuctionError::Persistence(e.to_string())
    })
}

fn player_from_purchase(purchase: &PurchaseRecord) -> Player {
    Player {
        id: purchase.player_id.clone(),
        name: purchase.player_name.clone(),
        role: purchase.role,
        rating: purchase.rating,
        capped: purchase.capped,
        base_price: purchase.price,
        stats: serde_json::Value::Null,
    }
}
