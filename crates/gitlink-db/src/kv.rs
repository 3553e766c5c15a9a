use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use rusqlite::Connection;

use crate::Database;

/// Per-key get/set/delete, plus multi-key transactions for writes that must
/// land together.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Run `body` against a consistent view of the store. Its writes are
    /// applied together if it returns `Ok` and discarded otherwise; no other
    /// writer interleaves with it.
    fn transaction(&self, body: &mut dyn FnMut(&mut dyn KvTxn) -> Result<()>) -> Result<()>;
}

/// Reads and writes inside a [`KvStore::transaction`].
pub trait KvTxn {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| query_value(conn, key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(|conn| upsert_value(conn, key, value))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| delete_value(conn, key))
    }

    fn transaction(&self, body: &mut dyn FnMut(&mut dyn KvTxn) -> Result<()>) -> Result<()> {
        self.with_conn(|conn| {
            // The connection mutex is held throughout, so nothing else can
            // start a transaction on it.
            let tx = conn.unchecked_transaction()?;
            body(&mut SqliteTxn(&*tx))?;
            tx.commit()?;
            Ok(())
        })
    }
}

struct SqliteTxn<'a>(&'a Connection);

impl KvTxn for SqliteTxn<'_> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        query_value(self.0, key)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        upsert_value(self.0, key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        delete_value(self.0, key)
    }
}

fn upsert_value(conn: &Connection, key: &str, value: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
    Ok(())
}

fn query_value(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>> {
    let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;

    let value = stmt
        .query_row([key], |row| row.get::<_, Vec<u8>>(0))
        .optional()?;

    Ok(value)
}

/// Process-local store, used by tests and by single-node dev runs.
/// Counts mutations so callers can assert that a path performed no writes.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`delete` calls seen so far.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|e| anyhow!("store lock poisoned: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|e| anyhow!("store lock poisoned: {}", e))?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|e| anyhow!("store lock poisoned: {}", e))?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        entries.remove(key);
        Ok(())
    }

    fn transaction(&self, body: &mut dyn FnMut(&mut dyn KvTxn) -> Result<()>) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|e| anyhow!("store lock poisoned: {}", e))?;
        let mut txn = MemoryTxn {
            staged: entries.clone(),
            writes: 0,
        };

        body(&mut txn)?;

        *entries = txn.staged;
        self.mutations.fetch_add(txn.writes, Ordering::SeqCst);
        Ok(())
    }
}

/// Works on a copy of the map; the copy replaces the original on commit.
struct MemoryTxn {
    staged: HashMap<String, Vec<u8>>,
    writes: usize,
}

impl KvTxn for MemoryTxn {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.staged.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.writes += 1;
        self.staged.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.writes += 1;
        self.staged.remove(key);
        Ok(())
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", b"one").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"one"[..]));

        store.set("a", b"two").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"two"[..]));

        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        // absent key
        store.delete("a").unwrap();
    }

    #[test]
    fn sqlite_store_get_set_delete() {
        let db = Database::open_in_memory().unwrap();
        exercise(&db);
    }

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.mutations(), 4);
    }

    fn transactions_commit_or_roll_back(store: &dyn KvStore) {
        store.set("a", b"one").unwrap();

        store
            .transaction(&mut |txn: &mut dyn KvTxn| {
                assert_eq!(txn.get("a")?.as_deref(), Some(&b"one"[..]));
                txn.set("a", b"two")?;
                txn.set("b", b"new")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.get("b").unwrap().as_deref(), Some(&b"new"[..]));

        let result = store.transaction(&mut |txn: &mut dyn KvTxn| {
            txn.delete("a")?;
            txn.set("c", b"never")?;
            Err(anyhow!("second write failed"))
        });
        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.get("c").unwrap(), None);
    }

    #[test]
    fn sqlite_transactions() {
        let db = Database::open_in_memory().unwrap();
        transactions_commit_or_roll_back(&db);
    }

    #[test]
    fn memory_transactions() {
        let store = MemoryStore::new();
        transactions_commit_or_roll_back(&store);
        // one plain set plus the two committed writes
        assert_eq!(store.mutations(), 3);
    }

    #[test]
    fn sqlite_store_keeps_binary_values() {
        let db = Database::open_in_memory().unwrap();
        let blob = [0u8, 159, 146, 150, 255];
        db.set("bin", &blob).unwrap();
        assert_eq!(db.get("bin").unwrap().unwrap(), blob);
    }
}
