//! Chain logs in sled and the grant store on top of them
use super::context::RouteContext;
use super::error::{ConflictError, Result};
use super::grant::{ChainKey, DirectorateId, GrantRequest, RoutingGrant, TimeStamp};
use tracing::{debug, info, warn};

const CHAINS_TREE: &str = "route_chains";

/// One sled entry per chain: the minicbor encoded [`RouteContext`].
///
/// Writers go through [`ChainStore::update`], which re-reads the entry and
/// swaps it in with compare-and-swap, so two writers on the same chain never
/// both win. Readers decode whatever is stored at the time.
#[derive(Clone)]
pub struct ChainStore {
    tree: sled::Tree,
    max_attempts: u32,
    flush_on_write: bool,
}

impl ChainStore {
    pub fn open(db: &sled::Db, max_attempts: u32, flush_on_write: bool) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(CHAINS_TREE)?,
            max_attempts: max_attempts.max(1),
            flush_on_write,
        })
    }

    pub fn read(&self, key: &ChainKey) -> Result<Option<RouteContext>> {
        match self.tree.get(key.to_bytes())? {
            Some(bytes) => Ok(Some(RouteContext::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Applies `f` to the current log of `key` and stores the result.
    ///
    /// `f` may run more than once when another writer got in first; it always
    /// sees the latest log. Nothing is written if `f` fails or appends nothing.
    pub fn update<T>(
        &self,
        key: &ChainKey,
        mut f: impl FnMut(&mut RouteContext) -> Result<T>,
    ) -> Result<T> {
        let store_key = key.to_bytes();

        for attempt in 1..=self.max_attempts {
            let current = self.tree.get(store_key)?;
            let mut ctx = match &current {
                Some(bytes) => RouteContext::decode(key, bytes)?,
                None => RouteContext::new(*key),
            };

            let before = ctx.len();
            let out = f(&mut ctx)?;
            if ctx.len() == before {
                return Ok(out);
            }

            let swapped = self
                .tree
                .compare_and_swap(store_key, current.as_ref(), Some(ctx.encode()?))?;
            if swapped.is_ok() {
                if self.flush_on_write {
                    self.tree.flush()?;
                }
                return Ok(out);
            }

            warn!(
                key = %hex::encode(store_key),
                attempt,
                "chain log changed underneath writer, retrying"
            );
        }

        Err(ConflictError::WriteContention {
            key: *key,
            attempts: self.max_attempts,
        }
        .into())
    }
}

/// Validates and appends routing grants.
#[derive(Clone)]
pub struct RouteConfigStore {
    chains: ChainStore,
}

impl RouteConfigStore {
    pub fn new(chains: ChainStore) -> Self {
        Self { chains }
    }

    /// Appends a grant to its chain. If an active grant for the same actor and
    /// permission already exists, that grant is returned and nothing is written.
    pub fn create(
        &self,
        request: &GrantRequest,
        acting_directorate: Option<DirectorateId>,
    ) -> Result<RoutingGrant> {
        let grant = request.validate_and_finalise(acting_directorate)?;
        let key = grant.key;

        let (stored, created) = self.chains.update(&key, |ctx| {
            if let Some(existing) = ctx.find_active(&grant.route) {
                return Ok((existing.clone(), false));
            }
            Ok((ctx.append_grant(grant.clone(), TimeStamp::new())?, true))
        })?;

        if created {
            info!(
                grant_id = %stored.id,
                transaction_id = key.transaction_id,
                sub_module = key.sub_module,
                route_type = ?stored.route.route_type(),
                permission = ?stored.route.permission(),
                "routing grant created"
            );
        } else {
            debug!(
                grant_id = %stored.id,
                transaction_id = key.transaction_id,
                sub_module = key.sub_module,
                "active grant already present"
            );
        }
        Ok(stored)
    }

    /// Grants of a chain in chain order. Empty when nothing was routed yet.
    pub fn list(&self, key: &ChainKey) -> Result<Vec<RoutingGrant>> {
        Ok(self
            .chains
            .read(key)?
            .map(|ctx| ctx.grants)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use crate::grant::NewGrant;

    fn grant() -> NewGrant {
        GrantRequest::external()
            .set_transaction(100)
            .set_sub_module(1)
            .set_vessel(5)
            .set_directorate(10)
            .validate_and_finalise(None)
            .unwrap()
    }

    fn chains(max_attempts: u32) -> (sled::Db, ChainStore) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = ChainStore::open(&db, max_attempts, false).unwrap();
        (db, store)
    }

    // Every call commits a rival write first, so the swap never matches.
    fn always_contended(max_attempts: u32) {
        let (_db, store) = chains(max_attempts);
        let rival = store.clone();
        let key = ChainKey::new(100, 1);
        let mut calls = 0;

        let result = store.update(&key, |ctx| {
            calls += 1;
            rival.update(&key, |theirs| theirs.append_grant(grant(), TimeStamp::new()))?;
            ctx.append_grant(grant(), TimeStamp::new())
        });

        assert!(matches!(
            result,
            Err(RoutingError::Conflict(ConflictError::WriteContention { attempts, .. }))
                if attempts == max_attempts
        ));
        assert_eq!(calls, max_attempts);
        // only the rival writes were stored
        let stored = store.read(&key).unwrap().unwrap();
        assert_eq!(stored.grants.len(), max_attempts as usize);
    }

    #[test]
    fn single_attempt_gives_up_on_contention() {
        always_contended(1);
    }

    #[test]
    fn retries_are_bounded() {
        always_contended(2);
    }

    #[test]
    fn retry_sees_the_rival_write() {
        let (_db, store) = chains(2);
        let rival = store.clone();
        let key = ChainKey::new(100, 1);
        let mut seen = vec![];

        store
            .update(&key, |ctx| {
                seen.push(ctx.grants.len());
                if seen.len() == 1 {
                    rival.update(&key, |theirs| theirs.append_grant(grant(), TimeStamp::new()))?;
                }
                ctx.append_grant(grant(), TimeStamp::new())
            })
            .unwrap();

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(store.read(&key).unwrap().unwrap().grants.len(), 2);
    }

    #[test]
    fn nothing_is_written_when_nothing_is_appended() {
        let (_db, store) = chains(1);
        let key = ChainKey::new(100, 1);

        store.update(&key, |ctx| Ok(ctx.len())).unwrap();

        assert!(store.read(&key).unwrap().is_none());
    }
}
