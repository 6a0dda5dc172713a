use tokio::sync::mpsc::UnboundedSender;
use twentyone_protocol::*;
use uuid::Uuid;

/// Minimum qualifying bet; bets are placed in multiples of this.
pub const MIN_BET: u64 = 10;
/// Seats per table; a full initial deal (two cards each for six players
/// plus the dealer) stays under the reshuffle floor.
pub const MAX_PLAYERS: usize = 6;
/// A fresh deck is swapped in at round start when fewer cards remain.
pub const RESHUFFLE_BELOW: usize = 15;
/// The dealer draws until reaching this total.
pub const DEALER_STANDS_AT: u32 = 17;

pub struct PlayerSeat {
    pub id: Uuid,
    pub name: String,
    pub chips: u64,
    pub hand: Vec<Card>,
    pub bet: u64,
    pub done: bool,
    pub doubled_down: bool,
    pub tx: UnboundedSender<ServerToClient>,
}

/// One blackjack table. Every public operation is synchronous, applies fully
/// or not at all, and reports which via its return value; protocol misuse
/// (wrong phase, wrong player, illegal move) is ignored rather than raised so
/// one stray client message cannot stall the table for everyone else.
/// Callers serialize access per room; rooms never share state.
pub struct Room {
    pub name: String,
    pub deck: Deck,
    pub dealer_hand: Vec<Card>,
    pub players: Vec<PlayerSeat>,
    /// Seated-player ids snapshotted at round start; joins during a round
    /// wait here until the next deal.
    pub turn_order: Vec<Uuid>,
    pub current_index: usize,
    pub phase: Phase,
}

impl Room {
    pub fn new(name: String) -> Self {
        Room {
            name,
            deck: Deck::standard_shuffled(),
            dealer_hand: Vec::new(),
            players: Vec::new(),
            turn_order: Vec::new(),
            current_index: 0,
            phase: Phase::Lobby,
        }
    }

    fn seat_of(&self, id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// Seats a player. Idempotent: re-joining only refreshes the outbound
    /// channel. Joins beyond `MAX_PLAYERS` are refused with an error to the
    /// would-be joiner. Otherwise broadcasts, whatever the phase.
    pub fn join(
        &mut self,
        id: Uuid,
        name: String,
        chips: u64,
        tx: UnboundedSender<ServerToClient>,
    ) -> bool {
        if let Some(seat) = self.seat_of(id) {
            self.players[seat].tx = tx;
            self.broadcast_state();
            return false;
        }
        if self.players.len() >= MAX_PLAYERS {
            eprintln!("[JOIN] room={} refused {}: table full", self.name, name);
            let _ = tx.send(ServerToClient::Error {
                message: format!("table {} is full", self.name),
            });
            return false;
        }
        eprintln!("[JOIN] room={} name={} chips={}", self.name, name, chips);
        self.players.push(PlayerSeat {
            id,
            name,
            chips,
            hand: Vec::new(),
            bet: 0,
            done: false,
            doubled_down: false,
            tx,
        });
        self.broadcast_state();
        true
    }

    /// Records a bet, clamped to the player's stack and floored to a
    /// multiple of `MIN_BET`. Once every seated player holds a qualifying
    /// bet the round starts on the spot, even for a single player.
    pub fn set_bet(&mut self, id: Uuid, amount: u64) -> bool {
        if self.phase != Phase::Lobby && self.phase != Phase::Betting {
            return false;
        }
        let Some(seat) = self.seat_of(id) else {
            return false;
        };
        let amount = amount.min(self.players[seat].chips) / MIN_BET * MIN_BET;
        if amount < MIN_BET {
            return false;
        }
        self.players[seat].bet = amount;
        self.phase = Phase::Betting;
        eprintln!(
            "[BET] room={} name={} bet={}",
            self.name, self.players[seat].name, amount
        );
        if self.all_bets_placed() {
            self.start_round();
        } else {
            self.broadcast_state();
        }
        true
    }

    fn all_bets_placed(&self) -> bool {
        self.players.iter().all(|p| p.bet >= MIN_BET)
    }

    fn start_round(&mut self) {
        if self.deck.remaining() < RESHUFFLE_BELOW {
            self.deck = Deck::standard_shuffled();
        }
        self.dealer_hand.clear();
        self.turn_order = self.players.iter().map(|p| p.id).collect();
        for p in self.players.iter_mut() {
            p.hand.clear();
            p.done = false;
            p.doubled_down = false;
        }
        for seat in 0..self.players.len() {
            for _ in 0..2 {
                let c = self.deck.draw().expect("deck replenished before deal");
                self.players[seat].hand.push(c);
            }
        }
        for _ in 0..2 {
            let c = self.deck.draw().expect("deck replenished before deal");
            self.dealer_hand.push(c);
        }
        self.phase = Phase::Playing;
        self.current_index = 0;
        eprintln!(
            "[DEAL] room={} players={} deck={}",
            self.name,
            self.turn_order.len(),
            self.deck.remaining()
        );
        self.broadcast_state();
    }

    /// First not-yet-done player from the cursor onward; `None` once
    /// everyone has acted (or outside the playing phase).
    pub fn current_player(&self) -> Option<Uuid> {
        if self.phase != Phase::Playing {
            return None;
        }
        self.turn_order
            .iter()
            .skip(self.current_index)
            .copied()
            .find(|id| self.seat_of(*id).is_some_and(|s| !self.players[s].done))
    }

    /// Applies a move for the current turn holder. Hitting into a bust ends
    /// the turn; double-down is only legal on a two-card hand with
    /// `chips >= bet` and always ends the turn after exactly one card.
    pub fn action(&mut self, id: Uuid, mv: Move) -> bool {
        if self.phase != Phase::Playing || self.current_player() != Some(id) {
            return false;
        }
        let seat = self.seat_of(id).expect("current player is seated");
        match mv {
            Move::Hit => {
                let c = self.deck.draw().expect("deck holds enough for a round");
                self.players[seat].hand.push(c);
                let value = hand_value(&self.players[seat].hand);
                eprintln!(
                    "[ACT] room={} name={} hits to {}",
                    self.name, self.players[seat].name, value
                );
                if is_bust(value) {
                    self.players[seat].done = true;
                }
            }
            Move::Stand => {
                eprintln!(
                    "[ACT] room={} name={} stands at {}",
                    self.name,
                    self.players[seat].name,
                    hand_value(&self.players[seat].hand)
                );
                self.players[seat].done = true;
            }
            Move::DoubleDown => {
                let p = &self.players[seat];
                if p.hand.len() != 2 || p.chips < p.bet {
                    return false;
                }
                self.players[seat].doubled_down = true;
                let c = self.deck.draw().expect("deck holds enough for a round");
                self.players[seat].hand.push(c);
                eprintln!(
                    "[ACT] room={} name={} doubles down to {}",
                    self.name,
                    self.players[seat].name,
                    hand_value(&self.players[seat].hand)
                );
                // one card ends the turn, bust or not
                self.players[seat].done = true;
            }
        }
        if self.players[seat].done {
            self.advance();
        } else {
            self.broadcast_state();
        }
        true
    }

    /// Moves the cursor past every finished (or departed) player; when none
    /// remain the dealer plays out and the hand settles.
    fn advance(&mut self) {
        while self.current_index < self.turn_order.len() {
            let id = self.turn_order[self.current_index];
            if self.seat_of(id).is_some_and(|s| !self.players[s].done) {
                break;
            }
            self.current_index += 1;
        }
        if self.current_index >= self.turn_order.len() {
            self.resolve_dealer();
        } else {
            self.broadcast_state();
        }
    }

    fn resolve_dealer(&mut self) {
        while hand_value(&self.dealer_hand) < DEALER_STANDS_AT {
            let c = self.deck.draw().expect("deck holds enough for a round");
            self.dealer_hand.push(c);
        }
        let dealer_value = hand_value(&self.dealer_hand);
        eprintln!(
            "[DEALER] room={} value={} bust={}",
            self.name,
            dealer_value,
            is_bust(dealer_value)
        );

        let mut results = Vec::new();
        for id in self.turn_order.clone() {
            let Some(seat) = self.seat_of(id) else {
                continue; // left mid-round, nothing to settle
            };
            let settlement = resolve_hand(
                &self.players[seat].hand,
                &self.dealer_hand,
                self.players[seat].bet,
                self.players[seat].doubled_down,
            );
            let p = &mut self.players[seat];
            // chips floor at zero; the doubled stake was never escrowed, so
            // only the resolved delta applies here
            p.chips = if settlement.delta < 0 {
                p.chips.saturating_sub(settlement.delta.unsigned_abs())
            } else {
                p.chips + settlement.delta as u64
            };
            eprintln!(
                "[SETTLE] room={} name={} {:?} delta={} chips={}",
                self.name, p.name, settlement.outcome, settlement.delta, p.chips
            );
            results.push(HandResult {
                user_id: p.id,
                name: p.name.clone(),
                chips: p.chips,
                delta: settlement.delta,
                outcome: settlement.outcome,
                reason: settlement.reason.to_string(),
                player_value: settlement.player_value,
                dealer_value: settlement.dealer_value,
                doubled_down: p.doubled_down,
            });
            p.hand.clear();
            p.bet = 0;
            p.done = false;
            p.doubled_down = false;
        }
        self.phase = Phase::Settle;
        self.broadcast_state();
        for p in self.players.iter() {
            let _ = p.tx.send(ServerToClient::RoundResult {
                results: results.clone(),
            });
        }
    }

    /// Unseats a player. A departure never stalls the table: if the turn
    /// holder leaves the round advances immediately, and a departure during
    /// betting re-checks whether the remaining players are all ready.
    pub fn leave(&mut self, id: Uuid) -> bool {
        let Some(seat) = self.seat_of(id) else {
            return false;
        };
        let was_current = self.current_player() == Some(id);
        eprintln!(
            "[LEAVE] room={} name={} phase={:?}",
            self.name, self.players[seat].name, self.phase
        );
        self.players.remove(seat);
        if let Some(pos) = self.turn_order.iter().position(|t| *t == id) {
            self.turn_order.remove(pos);
            if pos < self.current_index {
                self.current_index -= 1;
            }
        }
        if self.players.is_empty() {
            self.reset_to_lobby();
            return true;
        }
        match self.phase {
            Phase::Playing if was_current => self.advance(),
            Phase::Betting if self.all_bets_placed() => self.start_round(),
            _ => self.broadcast_state(),
        }
        true
    }

    /// Returns the room to the lobby. The room never leaves `Settle` on its
    /// own; the caller invokes this after persisting the settled balances.
    pub fn reset_to_lobby(&mut self) {
        self.phase = Phase::Lobby;
        self.dealer_hand.clear();
        self.turn_order.clear();
        self.current_index = 0;
        self.broadcast_state();
    }

    fn snapshot_for(&self, observer: Uuid) -> RoomSnapshot {
        let players = self
            .players
            .iter()
            .map(|p| PublicPlayer {
                user_id: p.id,
                name: p.name.clone(),
                chips: p.chips,
                bet: p.bet,
                hand: p.hand.clone(),
                done: p.done,
                you: p.id == observer,
            })
            .collect();
        let dealer = if self.phase == Phase::Playing {
            DealerView::Hidden {
                upcard: self.dealer_hand.first().copied(),
                count: self.dealer_hand.len(),
            }
        } else {
            DealerView::Revealed {
                hand: self.dealer_hand.clone(),
            }
        };
        RoomSnapshot {
            room_id: self.name.clone(),
            phase: self.phase,
            players,
            dealer,
            current_player_id: self.current_player(),
        }
    }

    pub fn broadcast_state(&self) {
        for p in self.players.iter() {
            let _ = p.tx.send(ServerToClient::UpdateState {
                snapshot: self.snapshot_for(p.id),
            });
        }
    }
}
