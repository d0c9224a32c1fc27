//! Command handlers for the `ledgersync` binary.

use std::fmt;
use std::path::Path;

use ledgersync_common::{Amount, Config, EntryKind, Hash256, LastClosedLedger, LedgerEntry};
use ledgersync_db::{
    state_keys, Database, EntryCounts, EntryQueries, LedgerQueries, LedgerStore, StateQueries,
};
use ledgersync_ledger::LedgerManagerConfig;
use serde_json::{json, Value};

/// Creates the database, or resets an existing one when `force` is set.
///
/// A reset empties every entry table and forgets both sync markers, so the
/// next catch-up imports in full.
pub fn new_db(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Database already exists at {}. Use --force to reset it.",
            path.display()
        );
    }

    tracing::info!(path = %path.display(), "Creating database");
    let store = LedgerStore::open(path)?;
    let tx = store.begin_transaction()?;
    tx.drop_all_entry_tables()?;
    tx.recreate_entry_tables()?;
    tx.with_connection(|conn| {
        conn.delete_state(state_keys::LAST_CLOSED_LEDGER)?;
        conn.delete_state(state_keys::LEDGER_TO_IMPORT)
    })?;
    tx.commit()?;
    Ok(())
}

/// Opens the database, which applies any pending migrations, and returns
/// the resulting schema version.
pub fn upgrade_db(path: &Path) -> anyhow::Result<i32> {
    if !path.exists() {
        anyhow::bail!(
            "No database at {}. Run 'new-db' to create it.",
            path.display()
        );
    }
    tracing::info!(path = %path.display(), "Upgrading database schema");
    let db = Database::open(path)?;
    Ok(db.schema_version()?)
}

/// What `info` reports about a database.
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub schema_version: i32,
    pub last_closed: Option<LastClosedLedger>,
    pub ledger_to_import: Option<Hash256>,
    pub latest_header_seq: Option<u32>,
    pub counts: EntryCounts,
    pub sync: LedgerManagerConfig,
}

pub fn database_info(config: &Config) -> anyhow::Result<DatabaseInfo> {
    let store = LedgerStore::open(&config.database.path)?;
    let schema_version = store.database().schema_version()?;
    let (last_closed, ledger_to_import, latest_header_seq, counts) =
        store.with_connection(|conn| {
            Ok((
                conn.get_last_closed_ledger()?,
                conn.get_ledger_to_import()?,
                conn.get_latest_ledger_seq()?,
                conn.count_entries()?,
            ))
        })?;
    Ok(DatabaseInfo {
        schema_version,
        last_closed,
        ledger_to_import,
        latest_header_seq,
        counts,
        sync: LedgerManagerConfig::from(&config.sync),
    })
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema version: {}", self.schema_version)?;
        match &self.last_closed {
            Some(last) => {
                writeln!(f, "Last closed ledger:")?;
                writeln!(f, "  Sequence:   {}", last.header.ledger_seq)?;
                writeln!(f, "  Root hash:  {}", last.root_hash)?;
                writeln!(f, "  Close time: {}", last.header.close_time)?;
            }
            None => writeln!(f, "Last closed ledger: none")?,
        }
        match &self.ledger_to_import {
            Some(root) => writeln!(f, "Pending import: {root}")?,
            None => writeln!(f, "Pending import: none")?,
        }
        match self.latest_header_seq {
            Some(seq) => writeln!(f, "Latest stored header: {seq}")?,
            None => writeln!(f, "Latest stored header: none")?,
        }
        writeln!(f, "Entries:")?;
        writeln!(f, "  Accounts:    {}", self.counts.accounts)?;
        writeln!(f, "  Trust lines: {}", self.counts.trust_lines)?;
        writeln!(f, "  Offers:      {}", self.counts.offers)?;
        writeln!(f, "Sync:")?;
        writeln!(f, "  Max diff threshold: {}", self.sync.max_diff_threshold)?;
        writeln!(f, "  Batch size:         {}", self.sync.batch_size)?;
        writeln!(f, "  Check local nodes:  {}", self.sync.check_local_nodes)
    }
}

/// Loads projected rows, optionally of one kind, as JSON values.
pub fn dump_entries(path: &Path, kind: Option<EntryKind>) -> anyhow::Result<Vec<Value>> {
    let store = LedgerStore::open(path)?;
    let entries = store.with_connection(|conn| conn.load_all_entries(kind))?;
    Ok(entries.iter().map(entry_to_json).collect())
}

fn amount_to_json(amount: &Amount) -> Value {
    if amount.currency.is_native() {
        json!({ "currency": amount.currency.to_human(), "value": amount.value })
    } else {
        json!({
            "currency": amount.currency.to_human(),
            "issuer": amount.issuer.to_hex(),
            "value": amount.value,
        })
    }
}

pub fn entry_to_json(entry: &LedgerEntry) -> Value {
    let index = entry.index().to_hex();
    match entry {
        LedgerEntry::Account(account) => json!({
            "kind": EntryKind::Account.name(),
            "index": index,
            "account_id": account.account_id.to_hex(),
            "balance": account.balance,
            "sequence": account.sequence,
            "owner_count": account.owner_count,
            "transfer_rate": account.transfer_rate,
            "inflation_dest": account.inflation_dest.map(|dest| dest.to_hex()),
            "public_key": Hash256::from_bytes(account.public_key).to_hex(),
            "require_dest": account.require_dest,
            "require_auth": account.require_auth,
        }),
        LedgerEntry::TrustLine(line) => json!({
            "kind": EntryKind::TrustLine.name(),
            "index": index,
            "low_account": line.low_account.to_hex(),
            "high_account": line.high_account.to_hex(),
            "currency": line.currency.to_human(),
            "low_limit": line.low_limit,
            "high_limit": line.high_limit,
            "balance": line.balance,
            "low_auth_set": line.low_auth_set,
            "high_auth_set": line.high_auth_set,
        }),
        LedgerEntry::Offer(offer) => json!({
            "kind": EntryKind::Offer.name(),
            "index": index,
            "account_id": offer.account_id.to_hex(),
            "sequence": offer.sequence,
            "taker_pays": amount_to_json(&offer.taker_pays),
            "taker_gets": amount_to_json(&offer.taker_gets),
            "expiration": offer.expiration,
            "passive": offer.passive,
        }),
    }
}

/// A configuration file with every default spelled out.
pub fn sample_config() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&Config::new("ledgersync.db"))?)
}
