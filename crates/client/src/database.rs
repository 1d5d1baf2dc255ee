//! Session database: access grants and the mutation journal

use crate::error::{ClientError, ClientResult};
use crate::mutation::{MutationKind, MutationOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use spout_common::{Address, TokenAmount, TxHash};
use std::path::Path;
use tracing::{debug, info};

/// A persisted authorization of an account for this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub address: Address,
    pub granted_at: i64,
}

impl AccessGrant {
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.granted_at, 0).unwrap_or_else(Utc::now)
    }
}

/// A resolved mutation, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub address: Address,
    pub kind: MutationKind,
    pub amount: Option<TokenAmount>,
    pub tx_hash: Option<TxHash>,
    pub outcome: Option<MutationOutcome>,
    pub error: Option<String>,
    pub timestamp: i64,
}

impl MutationRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Session database
pub struct SessionDatabase {
    db: Db,
    /// Tree for access grants, keyed by address
    grants: Tree,
    /// Tree for mutation records, keyed by (timestamp, sequence)
    mutations: Tree,
}

impl SessionDatabase {
    /// Create or open session database
    pub fn new<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        info!("Opening session database at: {}", path.as_ref().display());

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(16 * 1024 * 1024)
            .open()?;

        let grants = db.open_tree("grants")?;
        let mutations = db.open_tree("mutations")?;

        Ok(Self { db, grants, mutations })
    }

    fn encode<T: Serialize>(value: &T) -> ClientResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| ClientError::Internal(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ClientResult<T> {
        bincode::deserialize(bytes).map_err(|e| ClientError::Internal(e.to_string()))
    }

    pub fn record_grant(&self, grant: &AccessGrant) -> ClientResult<()> {
        self.grants.insert(grant.address.0, Self::encode(grant)?)?;
        self.grants.flush()?;
        debug!("Recorded access grant for {}", grant.address);
        Ok(())
    }

    pub fn get_grant(&self, address: &Address) -> ClientResult<Option<AccessGrant>> {
        match self.grants.get(address.0)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes the grant; returns whether one existed.
    pub fn revoke_grant(&self, address: &Address) -> ClientResult<bool> {
        let removed = self.grants.remove(address.0)?.is_some();
        self.grants.flush()?;
        if removed {
            info!("Revoked access grant for {}", address);
        }
        Ok(removed)
    }

    /// Append a resolved mutation to the journal
    pub fn add_mutation_record(&self, record: &MutationRecord) -> ClientResult<()> {
        let sequence = self.db.generate_id()?;
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&record.timestamp.to_be_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());

        self.mutations.insert(key, Self::encode(record)?)?;
        debug!("Journaled {} mutation for {}", record.kind.label(), record.address);
        Ok(())
    }

    /// Most recent journal entries, newest first
    pub fn recent_mutations(&self, limit: usize) -> ClientResult<Vec<MutationRecord>> {
        let mut records = Vec::new();
        for item in self.mutations.iter().rev().take(limit) {
            let (_, value) = item?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    /// Journal entries for one account, newest first
    pub fn mutations_for_address(&self, address: &Address) -> ClientResult<Vec<MutationRecord>> {
        let mut records = Vec::new();
        for item in self.mutations.iter().rev() {
            let (_, value) = item?;
            let record: MutationRecord = Self::decode(&value)?;
            if record.address == *address {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Clean journal entries older than `days`
    pub fn cleanup_old_records(&self, days: i64) -> ClientResult<usize> {
        let cutoff = Utc::now().timestamp() - (days * 86400);
        let mut keys_to_remove = Vec::new();

        for item in self.mutations.range(..cutoff.to_be_bytes().to_vec()) {
            let (key, _) = item?;
            keys_to_remove.push(key);
        }

        for key in &keys_to_remove {
            self.mutations.remove(key)?;
        }

        info!("Cleaned up {} old records (older than {} days)", keys_to_remove.len(), days);
        Ok(keys_to_remove.len())
    }
}
