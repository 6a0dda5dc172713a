use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use twentyone_protocol::LeaderboardEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt store file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlayer {
    pub name: String,
    pub chips: u64,
    pub updated_at: DateTime<Utc>,
}

/// Chip balances on disk, keyed by player name (the identity the join
/// request supplies; account auth lives outside this server). One JSON file,
/// rewritten whole on every settle; table counts are small enough that
/// anything fancier would be noise.
pub struct ChipStore {
    path: PathBuf,
}

impl ChipStore {
    pub fn new(data_dir: &str) -> io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(ChipStore {
            path: Path::new(data_dir).join("players.json"),
        })
    }

    async fn read_all(&self) -> Result<HashMap<String, StoredPlayer>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, all: &HashMap<String, StoredPlayer>) -> Result<(), StoreError> {
        fs::write(&self.path, serde_json::to_string_pretty(all)?).await?;
        Ok(())
    }

    /// Saved balance for a returning player, if any.
    pub async fn balance(&self, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.read_all().await?.get(name).map(|p| p.chips))
    }

    /// Upserts every settled player's balance.
    pub async fn record_balances(&self, settled: &[(String, u64)]) -> Result<(), StoreError> {
        if settled.is_empty() {
            return Ok(());
        }
        let mut all = self.read_all().await?;
        let now = Utc::now();
        for (name, chips) in settled {
            all.insert(
                name.clone(),
                StoredPlayer {
                    name: name.clone(),
                    chips: *chips,
                    updated_at: now,
                },
            );
        }
        self.write_all(&all).await
    }

    /// Top `n` players by chips, descending; ties break by name so the
    /// ordering is stable.
    pub async fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let all = self.read_all().await?;
        let mut entries: Vec<LeaderboardEntry> = all
            .into_values()
            .map(|p| LeaderboardEntry {
                name: p.name,
                chips: p.chips,
            })
            .collect();
        entries.sort_by(|a, b| b.chips.cmp(&a.chips).then_with(|| a.name.cmp(&b.name)));
        entries.truncate(n);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChipStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChipStore::new(dir.path().to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn unknown_player_has_no_balance() {
        let (_dir, store) = store();
        assert_eq!(store.balance("ada").await.unwrap(), None);
        assert!(store.top(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn balances_survive_a_round_trip() {
        let (_dir, store) = store();
        store
            .record_balances(&[("ada".to_string(), 510), ("bob".to_string(), 490)])
            .await
            .unwrap();
        assert_eq!(store.balance("ada").await.unwrap(), Some(510));
        store
            .record_balances(&[("ada".to_string(), 520)])
            .await
            .unwrap();
        assert_eq!(store.balance("ada").await.unwrap(), Some(520));
        assert_eq!(store.balance("bob").await.unwrap(), Some(490));
    }

    #[tokio::test]
    async fn leaderboard_sorts_by_chips_descending() {
        let (_dir, store) = store();
        store
            .record_balances(&[
                ("ada".to_string(), 510),
                ("bob".to_string(), 700),
                ("cleo".to_string(), 30),
            ])
            .await
            .unwrap();
        let top = store.top(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].name.as_str(), top[0].chips), ("bob", 700));
        assert_eq!((top[1].name.as_str(), top[1].chips), ("ada", 510));
    }
}
