//! Simulated account population.

use rand::Rng;

use coffer_common::{AccountId, AccountRef, Balance};
use coffer_ledger::{AccountStore, LedgerEngine, NewAccount};

/// Accounts opened for a simulation run.
#[derive(Debug, Clone)]
pub struct Population {
    ids: Vec<AccountId>,
    initial_balance: Balance,
}

impl Population {
    /// Open `count` accounts named `sim-user-<n>`, each funded with
    /// `initial_balance`.
    pub async fn open<S: AccountStore>(
        engine: &LedgerEngine<S>,
        count: usize,
        initial_balance: Balance,
    ) -> anyhow::Result<Self> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let account = engine
                .create_account(NewAccount::new(
                    format!("sim-user-{}", n),
                    "simulated",
                    initial_balance,
                ))
                .await?;
            ids.push(account.id);
        }

        Ok(Self {
            ids,
            initial_balance,
        })
    }

    pub fn ids(&self) -> &[AccountId] {
        &self.ids
    }

    /// Total the population must always hold.
    pub fn expected_total(&self) -> i128 {
        i128::from(self.initial_balance) * self.ids.len() as i128
    }

    /// Two distinct accounts, chosen uniformly.
    pub fn pick_pair<R: Rng>(&self, rng: &mut R) -> Option<(AccountId, AccountId)> {
        if self.ids.len() < 2 {
            return None;
        }

        let from = rng.gen_range(0..self.ids.len());
        let mut to = rng.gen_range(0..self.ids.len() - 1);
        if to >= from {
            to += 1;
        }
        Some((self.ids[from], self.ids[to]))
    }

    /// Current balance of every account, in population order.
    pub async fn balances<S: AccountStore>(
        &self,
        engine: &LedgerEngine<S>,
    ) -> anyhow::Result<Vec<(AccountId, Balance)>> {
        let mut balances = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            let balance = engine.check_balance(&AccountRef::Id(*id)).await?;
            balances.push((*id, balance));
        }
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use coffer_ledger::{LedgerConfig, MemoryAccountStore};

    use super::*;

    #[tokio::test]
    async fn test_open_and_pick() {
        let engine = LedgerEngine::new(Arc::new(MemoryAccountStore::new()), LedgerConfig::default());
        let population = Population::open(&engine, 3, 500).await.unwrap();

        assert_eq!(population.ids().len(), 3);
        assert_eq!(population.expected_total(), 1500);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let (from, to) = population.pick_pair(&mut rng).unwrap();
            assert_ne!(from, to);
        }

        let balances = population.balances(&engine).await.unwrap();
        assert!(balances.iter().all(|(_, balance)| *balance == 500));
    }

    #[tokio::test]
    async fn test_single_account_has_no_pair() {
        let engine = LedgerEngine::new(Arc::new(MemoryAccountStore::new()), LedgerConfig::default());
        let population = Population::open(&engine, 1, 10).await.unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(population.pick_pair(&mut rng).is_none());
    }
}
