use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    /// Blackjack value with the ace counted high; soft-ace reduction is
    /// `hand_value`'s job.
    pub fn value(self) -> u32 {
        match self {
            Rank::Jack | Rank::Queen | Rank::King => 10,
            Rank::Ace => 11,
            r => r as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.rank {
            Rank::Ace => "A",
            Rank::King => "K",
            Rank::Queen => "Q",
            Rank::Jack => "J",
            Rank::Ten => "10",
            Rank::Nine => "9",
            Rank::Eight => "8",
            Rank::Seven => "7",
            Rank::Six => "6",
            Rank::Five => "5",
            Rank::Four => "4",
            Rank::Three => "3",
            Rank::Two => "2",
        };
        let s = match self.suit {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        };
        write!(f, "{}{}", r, s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub cards: Vec<Card>,
}

impl Deck {
    pub fn standard_shuffled() -> Self {
        let mut cards = Vec::with_capacity(52);
        for &s in &[Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades] {
            for r in [
                Rank::Two,
                Rank::Three,
                Rank::Four,
                Rank::Five,
                Rank::Six,
                Rank::Seven,
                Rank::Eight,
                Rank::Nine,
                Rank::Ten,
                Rank::Jack,
                Rank::Queen,
                Rank::King,
                Rank::Ace,
            ] {
                cards.push(Card { rank: r, suit: s });
            }
        }
        cards.shuffle(&mut thread_rng());
        Deck { cards }
    }

    /// Removes and returns the top card. `None` only when the deck is
    /// exhausted, which the room's reshuffle rule is meant to prevent.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

/// ---- Hand evaluation ----

/// Blackjack total of a hand: aces count 11, then drop to 1 one at a time
/// while the total is over 21. An empty hand is 0.
pub fn hand_value(cards: &[Card]) -> u32 {
    let mut total = 0;
    let mut aces = 0;
    for c in cards {
        total += c.rank.value();
        if c.rank == Rank::Ace {
            aces += 1;
        }
    }
    while total > 21 && aces > 0 {
        total -= 10;
        aces -= 1;
    }
    total
}

pub fn is_bust(value: u32) -> bool {
    value > 21
}

/// A natural: exactly two cards totalling 21.
pub fn is_natural_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards) == 21
}

/// ---- Settlement ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandOutcome {
    Win,
    Lose,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub outcome: HandOutcome,
    pub delta: i64,
    pub reason: &'static str,
    pub player_value: u32,
    pub dealer_value: u32,
}

/// Settles one player hand against the dealer. Rules apply in priority
/// order: a player bust loses outright no matter what the dealer holds, a
/// natural pays 3:2 unless the dealer also shows 21, a dealer bust pays even
/// money, and otherwise the higher total wins. A natural against a dealer 21
/// falls through to the total comparison and pushes.
pub fn resolve_hand(player: &[Card], dealer: &[Card], bet: u64, doubled_down: bool) -> Settlement {
    let mult: i64 = if doubled_down { 2 } else { 1 };
    let bet = bet as i64;
    let player_value = hand_value(player);
    let dealer_value = hand_value(dealer);

    let (outcome, delta, reason) = if is_bust(player_value) {
        (HandOutcome::Lose, -bet * mult, "you busted")
    } else if is_natural_blackjack(player) && dealer_value != 21 {
        (HandOutcome::Win, bet * 3 / 2 * mult, "blackjack")
    } else if is_bust(dealer_value) {
        (HandOutcome::Win, bet * mult, "dealer busted")
    } else if player_value > dealer_value {
        (HandOutcome::Win, bet * mult, "higher total")
    } else if player_value < dealer_value {
        (HandOutcome::Lose, -bet * mult, "lower total")
    } else {
        (HandOutcome::Push, 0, "push")
    };

    Settlement {
        outcome,
        delta,
        reason,
        player_value,
        dealer_value,
    }
}

/// ---- Moves ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Move {
    Hit,
    Stand,
    DoubleDown,
}

impl Move {
    /// Parses a client-supplied move string; anything unrecognized is `None`
    /// and the caller drops it.
    pub fn parse(input: &str) -> Option<Move> {
        match input.trim().to_ascii_uppercase().as_str() {
            "HIT" => Some(Move::Hit),
            "STAND" => Some(Move::Stand),
            "DOUBLE_DOWN" => Some(Move::DoubleDown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    Betting,
    Playing,
    Settle,
}

/// ---- Room views ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub user_id: Uuid,
    pub name: String,
    pub chips: u64,
    pub bet: u64,
    pub hand: Vec<Card>,
    pub done: bool,
    pub you: bool,
}

/// While a hand is being played only the dealer's upcard is visible; in
/// every other phase the full dealer hand is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DealerView {
    Hidden { upcard: Option<Card>, count: usize },
    Revealed { hand: Vec<Card> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub phase: Phase,
    pub players: Vec<PublicPlayer>,
    pub dealer: DealerView,
    pub current_player_id: Option<Uuid>,
}

/// Per-player line of the settle-time result broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandResult {
    pub user_id: Uuid,
    pub name: String,
    pub chips: u64,
    pub delta: i64,
    pub outcome: HandOutcome,
    pub reason: String,
    pub player_value: u32,
    pub dealer_value: u32,
    pub doubled_down: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub chips: u64,
}

/// ---- Wire messages ----
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientToServer {
    JoinRoom { room: String, name: String },
    PlaceBet { amount: u64 },
    Action { mv: String },
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerToClient {
    Hello { your_id: Uuid },
    UpdateState { snapshot: RoomSnapshot },
    RoundResult { results: Vec<HandResult> },
    Leaderboard { entries: Vec<LeaderboardEntry> },
    Info { message: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    fn hand(ranks: &[Rank]) -> Vec<Card> {
        ranks.iter().map(|&r| card(r, Suit::Spades)).collect()
    }

    #[test]
    fn hand_value_empty_and_order_invariant() {
        assert_eq!(hand_value(&[]), 0);
        let mut h = vec![
            card(Rank::Ace, Suit::Spades),
            card(Rank::Six, Suit::Hearts),
            card(Rank::King, Suit::Clubs),
        ];
        let forward = hand_value(&h);
        h.reverse();
        assert_eq!(hand_value(&h), forward);
    }

    #[test]
    fn soft_ace_drops_to_one() {
        assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::Six])), 17);
        assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::Six, Rank::King])), 17);
        assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::Ace])), 12);
        assert_eq!(hand_value(&hand(&[Rank::Ace, Rank::Ace, Rank::Nine])), 21);
    }

    #[test]
    fn natural_blackjack_needs_two_cards() {
        assert!(is_natural_blackjack(&hand(&[Rank::Ace, Rank::King])));
        assert!(!is_natural_blackjack(&hand(&[
            Rank::Five,
            Rank::Six,
            Rank::Ten
        ])));
        assert!(!is_natural_blackjack(&hand(&[Rank::Ten, Rank::Ten])));
    }

    #[test]
    fn fresh_deck_has_52_distinct_cards() {
        let mut deck = Deck::standard_shuffled();
        assert_eq!(deck.remaining(), 52);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..52 {
            let c = deck.draw().unwrap();
            assert!(seen.insert(c.to_string()), "duplicate card {}", c);
        }
        assert!(deck.draw().is_none());
    }

    #[test]
    fn player_bust_loses_even_against_dealer_bust() {
        let player = hand(&[Rank::King, Rank::Queen, Rank::Four]); // 24
        let dealer = hand(&[Rank::King, Rank::Nine, Rank::Five]); // 24
        let s = resolve_hand(&player, &dealer, 10, false);
        assert_eq!(s.outcome, HandOutcome::Lose);
        assert_eq!(s.delta, -10);
        assert_eq!(s.reason, "you busted");
    }

    #[test]
    fn natural_pays_three_to_two() {
        let player = hand(&[Rank::Ace, Rank::King]);
        let dealer = hand(&[Rank::King, Rank::Queen]); // 20
        let s = resolve_hand(&player, &dealer, 10, false);
        assert_eq!(s.outcome, HandOutcome::Win);
        assert_eq!(s.delta, 15);
        assert_eq!(s.reason, "blackjack");
    }

    #[test]
    fn natural_against_dealer_21_pushes() {
        let player = hand(&[Rank::Ace, Rank::King]);
        let dealer = vec![
            card(Rank::Ace, Suit::Hearts),
            card(Rank::Queen, Suit::Hearts),
        ];
        let s = resolve_hand(&player, &dealer, 10, false);
        assert_eq!(s.outcome, HandOutcome::Push);
        assert_eq!(s.delta, 0);
    }

    #[test]
    fn dealer_bust_pays_even_money() {
        let player = hand(&[Rank::King, Rank::Eight]); // 18
        let dealer = hand(&[Rank::King, Rank::Six, Rank::Nine]); // 25
        let s = resolve_hand(&player, &dealer, 10, false);
        assert_eq!(s.outcome, HandOutcome::Win);
        assert_eq!(s.delta, 10);
        assert_eq!(s.reason, "dealer busted");
    }

    #[test]
    fn totals_compared_when_nobody_busts() {
        let eighteen = hand(&[Rank::King, Rank::Eight]);
        let seventeen = hand(&[Rank::King, Rank::Seven]);
        let win = resolve_hand(&eighteen, &seventeen, 10, false);
        assert_eq!((win.outcome, win.delta), (HandOutcome::Win, 10));
        let lose = resolve_hand(&seventeen, &eighteen, 10, false);
        assert_eq!((lose.outcome, lose.delta), (HandOutcome::Lose, -10));
        let push = resolve_hand(&eighteen, &eighteen, 10, false);
        assert_eq!((push.outcome, push.delta), (HandOutcome::Push, 0));
        assert_eq!(push.reason, "push");
    }

    #[test]
    fn double_down_doubles_the_delta() {
        let player = hand(&[Rank::King, Rank::Five, Rank::Six]); // 21, not natural
        let dealer = hand(&[Rank::King, Rank::Seven]);
        assert_eq!(resolve_hand(&player, &dealer, 10, false).delta, 10);
        assert_eq!(resolve_hand(&player, &dealer, 10, true).delta, 20);
        let natural = hand(&[Rank::Ace, Rank::King]);
        assert_eq!(resolve_hand(&natural, &dealer, 10, true).delta, 30);
    }

    #[test]
    fn move_parsing_is_lenient_on_case_and_whitespace() {
        assert_eq!(Move::parse(" hit "), Some(Move::Hit));
        assert_eq!(Move::parse("STAND"), Some(Move::Stand));
        assert_eq!(Move::parse("double_down"), Some(Move::DoubleDown));
        assert_eq!(Move::parse("split"), None);
        assert_eq!(Move::parse(""), None);
    }

    #[test]
    fn wire_verbs_use_snake_case() {
        let join = serde_json::to_string(&ClientToServer::JoinRoom {
            room: "main".into(),
            name: "ada".into(),
        })
        .unwrap();
        assert!(join.contains("join_room"));
        let bet = serde_json::to_string(&ClientToServer::PlaceBet { amount: 10 }).unwrap();
        assert!(bet.contains("place_bet"));
        let mv = serde_json::to_string(&Move::DoubleDown).unwrap();
        assert_eq!(mv, "\"DOUBLE_DOWN\"");
    }
}
