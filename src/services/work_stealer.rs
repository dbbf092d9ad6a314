//! Work-stealing advisor.
//!
//! Maintains a worker → load view and suggests donor → recipient pairs when
//! the pool is imbalanced. Suggestions are advisory; the scheduler may act
//! on them or not.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Load above which a worker is considered a donor.
pub const DONOR_THRESHOLD: f64 = 0.8;
/// Load below which a worker is considered a recipient.
pub const RECIPIENT_THRESHOLD: f64 = 0.3;

/// An advisory donor → recipient pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StealSuggestion {
    pub from: Uuid,
    pub to: Uuid,
}

/// Load-imbalance advisor over a shared load map.
#[derive(Default)]
pub struct WorkStealer {
    loads: Arc<RwLock<HashMap<Uuid, f64>>>,
}

impl WorkStealer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the given loads into the view. Values are clamped to [0, 1].
    pub async fn update_loads(&self, loads: HashMap<Uuid, f64>) {
        let mut view = self.loads.write().await;
        for (worker, load) in loads {
            view.insert(worker, load.clamp(0.0, 1.0));
        }
    }

    /// Replace the whole view.
    pub async fn replace_loads(&self, loads: HashMap<Uuid, f64>) {
        let mut view = self.loads.write().await;
        view.clear();
        for (worker, load) in loads {
            view.insert(worker, load.clamp(0.0, 1.0));
        }
    }

    /// Current load for one worker.
    pub async fn load(&self, worker: Uuid) -> Option<f64> {
        self.loads.read().await.get(&worker).copied()
    }

    /// Suggest donor → recipient pairs.
    ///
    /// Donors (load > 0.8) are paired highest-loaded first with recipients
    /// (load < 0.3) lowest-loaded first; each worker appears in at most one
    /// pair.
    pub async fn suggest(&self) -> Vec<StealSuggestion> {
        let view = self.loads.read().await;

        let mut donors: Vec<(Uuid, f64)> = view
            .iter()
            .filter(|(_, load)| **load > DONOR_THRESHOLD)
            .map(|(w, l)| (*w, *l))
            .collect();
        let mut recipients: Vec<(Uuid, f64)> = view
            .iter()
            .filter(|(_, load)| **load < RECIPIENT_THRESHOLD)
            .map(|(w, l)| (*w, *l))
            .collect();

        // Highest-loaded donors give to lowest-loaded recipients
        donors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        recipients.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        donors
            .into_iter()
            .zip(recipients)
            .map(|((from, _), (to, _))| StealSuggestion { from, to })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stealer_with(loads: &[(Uuid, f64)]) -> WorkStealer {
        let stealer = WorkStealer::new();
        stealer
            .update_loads(loads.iter().copied().collect())
            .await;
        stealer
    }

    #[tokio::test]
    async fn test_single_imbalance_suggests_one_pair() {
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        let stealer = stealer_with(&[(a1, 0.9), (a2, 0.1)]).await;

        let suggestions = stealer.suggest().await;
        assert_eq!(suggestions, vec![StealSuggestion { from: a1, to: a2 }]);
    }

    #[tokio::test]
    async fn test_no_recipient_below_threshold_means_no_suggestion() {
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        let stealer = stealer_with(&[(a1, 0.9), (a2, 0.5)]).await;

        assert!(stealer.suggest().await.is_empty());
    }

    #[tokio::test]
    async fn test_thresholds_are_exclusive() {
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        // Exactly at the thresholds: neither qualifies
        let stealer = stealer_with(&[(a1, 0.8), (a2, 0.3)]).await;
        assert!(stealer.suggest().await.is_empty());
    }

    #[tokio::test]
    async fn test_pairs_highest_donor_with_lowest_recipient() {
        let hot = Uuid::new_v4();
        let warm = Uuid::new_v4();
        let cool = Uuid::new_v4();
        let cold = Uuid::new_v4();
        let stealer = stealer_with(&[(hot, 1.0), (warm, 0.85), (cool, 0.2), (cold, 0.0)]).await;

        let suggestions = stealer.suggest().await;
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0], StealSuggestion { from: hot, to: cold });
        assert_eq!(suggestions[1], StealSuggestion { from: warm, to: cool });
    }

    #[tokio::test]
    async fn test_update_merges_and_clamps() {
        let worker = Uuid::new_v4();
        let stealer = stealer_with(&[(worker, 2.5)]).await;
        assert_eq!(stealer.load(worker).await, Some(1.0));

        let other = Uuid::new_v4();
        stealer.update_loads([(other, -0.5)].into_iter().collect()).await;
        // Merge keeps the previous worker and clamps the new one
        assert_eq!(stealer.load(worker).await, Some(1.0));
        assert_eq!(stealer.load(other).await, Some(0.0));
    }

    #[tokio::test]
    async fn test_replace_drops_stale_workers() {
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let stealer = stealer_with(&[(stale, 0.9)]).await;

        stealer.replace_loads([(fresh, 0.1)].into_iter().collect()).await;
        assert_eq!(stealer.load(stale).await, None);
        assert_eq!(stealer.load(fresh).await, Some(0.1));
    }
}
