//! Credential vault: encrypted-at-rest linked identities plus the
//! GitLab-username -> platform-user reverse index.
//!
//! Storage layout:
//!
//! | key                   | value                                          |
//! |-----------------------|------------------------------------------------|
//! | `{user_id}_token`     | JSON `LinkedIdentity`, token fields encrypted  |
//! | `{gitlab_user}_username` | raw platform user ID bytes                  |
//!
//! [`Vault::store`] never touches the reverse index. The index is changed by
//! its own calls, or together with the record inside one transaction by
//! [`Vault::update_settings`] and [`Vault::unlink`].

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, warn};

use gitlink_crypto::TokenCipher;
use gitlink_types::models::{LinkedIdentity, OAuthToken, Setting, Toggle};

use crate::kv::{KvStore, KvTxn};

const TOKEN_KEY_SUFFIX: &str = "_token";
const USERNAME_KEY_SUFFIX: &str = "_username";

pub fn token_key(user_id: &str) -> String {
    format!("{}{}", user_id, TOKEN_KEY_SUFFIX)
}

pub fn username_key(gitlab_username: &str) -> String {
    format!("{}{}", gitlab_username, USERNAME_KEY_SUFFIX)
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no linked GitLab account for user {0}")]
    NotLinked(String),

    /// Detail is logged where it happens; the message stays generic.
    #[error("credential could not be encrypted or decrypted")]
    Crypto,

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("stored identity is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Vault {
    store: Arc<dyn KvStore>,
    cipher: Arc<dyn TokenCipher>,
}

impl Vault {
    pub fn new(store: Arc<dyn KvStore>, cipher: Arc<dyn TokenCipher>) -> Self {
        Self { store, cipher }
    }

    /// Persist the identity under `{user_id}_token` with its token encrypted.
    /// The caller's value is left untouched.
    pub fn store(&self, identity: &LinkedIdentity) -> Result<(), VaultError> {
        let mut sealed = identity.clone();
        sealed.token = self.seal_token(&identity.token)?;

        let json = serde_json::to_vec(&sealed)?;
        self.store
            .set(&token_key(&identity.user_id), &json)
            .map_err(VaultError::Storage)
    }

    /// Load and decrypt the identity linked to `user_id`.
    pub fn resolve(&self, user_id: &str) -> Result<LinkedIdentity, VaultError> {
        let raw = self.store.get(&token_key(user_id)).map_err(VaultError::Storage)?;
        let mut identity = parse_identity(raw)?.ok_or_else(|| VaultError::NotLinked(user_id.to_string()))?;

        identity.token = self.open_token(&identity.token).inspect_err(|_| {
            error!(user_id = %user_id, "Unable to decrypt stored GitLab token");
        })?;

        Ok(identity)
    }

    pub fn set_reverse_index(&self, gitlab_username: &str, user_id: &str) -> Result<(), VaultError> {
        self.store
            .set(&username_key(gitlab_username), user_id.as_bytes())
            .map_err(VaultError::Storage)
    }

    pub fn clear_reverse_index(&self, gitlab_username: &str) -> Result<(), VaultError> {
        self.store
            .delete(&username_key(gitlab_username))
            .map_err(VaultError::Storage)
    }

    /// Platform user currently receiving notifications for `gitlab_username`.
    pub fn lookup_by_external_username(&self, gitlab_username: &str) -> Result<Option<String>, VaultError> {
        let raw = self
            .store
            .get(&username_key(gitlab_username))
            .map_err(VaultError::Storage)?;
        parse_owner(gitlab_username, raw)
    }

    /// Apply one settings change to the stored record. Turning notifications
    /// on or off sets or clears the reverse index in the same transaction, so
    /// the index entry exists exactly while notifications are enabled. An
    /// index entry owned by another user is left alone.
    ///
    /// The token stays sealed throughout; no decryption happens here.
    pub fn update_settings(&self, user_id: &str, setting: Setting, toggle: Toggle) -> Result<(), VaultError> {
        self.transact(|txn| {
            let mut identity = read_identity(txn, user_id)?.ok_or_else(|| VaultError::NotLinked(user_id.to_string()))?;
            identity.apply(setting, toggle);

            if setting == Setting::Notifications {
                let index = username_key(&identity.gitlab_username);
                if toggle.is_on() {
                    txn.set(&index, user_id.as_bytes()).map_err(VaultError::Storage)?;
                } else if read_owner(txn, &identity.gitlab_username)?.as_deref() == Some(user_id) {
                    txn.delete(&index).map_err(VaultError::Storage)?;
                }
            }

            write_identity(txn, &identity)
        })
    }

    /// Stamp the record with the time of the latest todo summary. Returns
    /// `false` without writing when the record is gone, so a summary that
    /// finishes after a disconnect can't bring the account back.
    pub fn record_todo_post(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool, VaultError> {
        self.transact(|txn| {
            let Some(mut identity) = read_identity(txn, user_id)? else {
                return Ok(false);
            };
            identity.last_todo_post_at = Some(at);
            write_identity(txn, &identity)?;
            Ok(true)
        })
    }

    /// Remove the identity and its reverse-index entry in one transaction.
    ///
    /// A user with nothing stored is a no-op that issues no writes. The index
    /// entry is only removed while it still points at `user_id`. Returns
    /// whether an identity was removed.
    pub fn unlink(&self, user_id: &str) -> Result<bool, VaultError> {
        self.transact(|txn| {
            // The username is stored in clear, so a record whose token no
            // longer decrypts can still have its index entry cleaned up. An
            // unparseable record is removed on its own.
            let username = match read_identity(txn, user_id) {
                Ok(Some(identity)) => Some(identity.gitlab_username),
                Ok(None) => return Ok(false),
                Err(VaultError::Corrupt(e)) => {
                    warn!(user_id = %user_id, "Removing unparseable identity record: {}", e);
                    None
                }
                Err(e) => return Err(e),
            };

            txn.delete(&token_key(user_id)).map_err(VaultError::Storage)?;

            if let Some(username) = username {
                if read_owner(txn, &username)?.as_deref() == Some(user_id) {
                    txn.delete(&username_key(&username)).map_err(VaultError::Storage)?;
                }
            }

            Ok(true)
        })
    }

    /// Run `body` in a store transaction, keeping its `VaultError` intact.
    fn transact<T>(&self, mut body: impl FnMut(&mut dyn KvTxn) -> Result<T, VaultError>) -> Result<T, VaultError> {
        let mut outcome = None;

        self.store
            .transaction(&mut |txn: &mut dyn KvTxn| {
                outcome = Some(body(txn)?);
                Ok(())
            })
            .map_err(|e| e.downcast::<VaultError>().unwrap_or_else(VaultError::Storage))?;

        outcome.ok_or_else(|| VaultError::Storage(anyhow!("transaction body did not run")))
    }

    fn seal_token(&self, token: &OAuthToken) -> Result<OAuthToken, VaultError> {
        let mut sealed = token.clone();
        sealed.access_token = self.encrypt(&token.access_token)?;
        sealed.refresh_token = token
            .refresh_token
            .as_deref()
            .map(|refresh| self.encrypt(refresh))
            .transpose()?;
        Ok(sealed)
    }

    fn open_token(&self, token: &OAuthToken) -> Result<OAuthToken, VaultError> {
        let mut opened = token.clone();
        opened.access_token = self.decrypt(&token.access_token)?;
        opened.refresh_token = token
            .refresh_token
            .as_deref()
            .map(|refresh| self.decrypt(refresh))
            .transpose()?;
        Ok(opened)
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        self.cipher.encrypt(plaintext).map_err(|e| {
            error!("Token encryption failed: {:#}", e);
            VaultError::Crypto
        })
    }

    fn decrypt(&self, sealed: &str) -> Result<String, VaultError> {
        self.cipher.decrypt(sealed).map_err(|e| {
            error!("Token decryption failed: {:#}", e);
            VaultError::Crypto
        })
    }
}

fn read_identity(txn: &dyn KvTxn, user_id: &str) -> Result<Option<LinkedIdentity>, VaultError> {
    let raw = txn.get(&token_key(user_id)).map_err(VaultError::Storage)?;
    parse_identity(raw)
}

/// Writes the record as read; its token fields are still ciphertext.
fn write_identity(txn: &mut dyn KvTxn, sealed: &LinkedIdentity) -> Result<(), VaultError> {
    let json = serde_json::to_vec(sealed)?;
    txn.set(&token_key(&sealed.user_id), &json).map_err(VaultError::Storage)
}

fn read_owner(txn: &dyn KvTxn, gitlab_username: &str) -> Result<Option<String>, VaultError> {
    let raw = txn.get(&username_key(gitlab_username)).map_err(VaultError::Storage)?;
    parse_owner(gitlab_username, raw)
}

fn parse_identity(raw: Option<Vec<u8>>) -> Result<Option<LinkedIdentity>, VaultError> {
    raw.map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(VaultError::from)
}

fn parse_owner(gitlab_username: &str, raw: Option<Vec<u8>>) -> Result<Option<String>, VaultError> {
    let Some(bytes) = raw else {
        return Ok(None);
    };

    let user_id = String::from_utf8(bytes).map_err(|e| {
        error!(gitlab_username = %gitlab_username, "Reverse index entry is not valid UTF-8");
        VaultError::Storage(anyhow::Error::new(e).context(format!(
            "reverse index entry for {} is not valid UTF-8",
            gitlab_username
        )))
    })?;

    Ok(Some(user_id).filter(|id| !id.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, MemoryStore};
    use gitlink_crypto::AesGcmCipher;

    fn vault_with(store: Arc<MemoryStore>, secret: &str) -> Vault {
        Vault::new(store, Arc::new(AesGcmCipher::from_secret(secret)))
    }

    fn alice() -> LinkedIdentity {
        let mut token = OAuthToken::bearer("glpat-alice");
        token.refresh_token = Some("refresh-alice".into());
        LinkedIdentity::new("user-1", "alice", token)
    }

    #[test]
    fn store_then_resolve_roundtrips() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store, "secret");
        let identity = alice();

        vault.store(&identity).unwrap();
        let resolved = vault.resolve("user-1").unwrap();

        assert_eq!(resolved, identity);
    }

    #[test]
    fn token_is_never_stored_in_cleartext() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");

        vault.store(&alice()).unwrap();

        let raw = store.get("user-1_token").unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("glpat-alice"));
        assert!(!raw.contains("refresh-alice"));
        assert!(raw.contains("alice"));
    }

    #[test]
    fn resolve_missing_is_not_linked() {
        let vault = vault_with(Arc::new(MemoryStore::new()), "secret");
        assert!(matches!(vault.resolve("nobody"), Err(VaultError::NotLinked(id)) if id == "nobody"));
    }

    #[test]
    fn resolve_with_rotated_secret_is_crypto_error() {
        let store = Arc::new(MemoryStore::new());
        vault_with(store.clone(), "old-secret").store(&alice()).unwrap();

        let result = vault_with(store, "new-secret").resolve("user-1");
        assert!(matches!(result, Err(VaultError::Crypto)));
    }

    #[test]
    fn crypto_error_message_has_no_detail() {
        assert_eq!(
            VaultError::Crypto.to_string(),
            "credential could not be encrypted or decrypted"
        );
    }

    #[test]
    fn garbage_record_is_corrupt() {
        let store = Arc::new(MemoryStore::new());
        store.set("user-1_token", b"{not json").unwrap();

        let result = vault_with(store, "secret").resolve("user-1");
        assert!(matches!(result, Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn store_does_not_touch_reverse_index() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");

        vault.store(&alice()).unwrap();

        assert_eq!(vault.lookup_by_external_username("alice").unwrap(), None);
        assert_eq!(store.mutations(), 1);
    }

    #[test]
    fn reverse_index_set_lookup_clear() {
        let vault = vault_with(Arc::new(MemoryStore::new()), "secret");

        vault.set_reverse_index("alice", "user-1").unwrap();
        assert_eq!(vault.lookup_by_external_username("alice").unwrap().as_deref(), Some("user-1"));

        vault.clear_reverse_index("alice").unwrap();
        assert_eq!(vault.lookup_by_external_username("alice").unwrap(), None);

        // clearing twice is fine
        vault.clear_reverse_index("alice").unwrap();
    }

    #[test]
    fn unlink_removes_identity_and_index() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");
        vault.store(&alice()).unwrap();
        vault.set_reverse_index("alice", "user-1").unwrap();

        assert!(vault.unlink("user-1").unwrap());

        assert!(matches!(vault.resolve("user-1"), Err(VaultError::NotLinked(_))));
        assert_eq!(vault.lookup_by_external_username("alice").unwrap(), None);
    }

    #[test]
    fn unlink_without_identity_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");

        assert!(!vault.unlink("user-1").unwrap());
        assert!(!vault.unlink("user-1").unwrap());
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn unlink_tolerates_missing_index_entry() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");
        vault.store(&alice()).unwrap();

        assert!(vault.unlink("user-1").unwrap());
        assert!(!store.contains("user-1_token"));
    }

    #[test]
    fn unlink_leaves_index_owned_by_someone_else() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");
        vault.store(&alice()).unwrap();
        vault.set_reverse_index("alice", "user-2").unwrap();

        vault.unlink("user-1").unwrap();

        assert_eq!(vault.lookup_by_external_username("alice").unwrap().as_deref(), Some("user-2"));
    }

    #[test]
    fn unlink_works_even_when_token_no_longer_decrypts() {
        let store = Arc::new(MemoryStore::new());
        let old = vault_with(store.clone(), "old-secret");
        old.store(&alice()).unwrap();
        old.set_reverse_index("alice", "user-1").unwrap();

        let vault = vault_with(store.clone(), "new-secret");
        assert!(vault.unlink("user-1").unwrap());
        assert!(!store.contains("user-1_token"));
        assert!(!store.contains("alice_username"));
    }

    #[test]
    fn notifications_toggle_moves_the_index_with_the_record() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");
        vault.store(&alice()).unwrap();

        vault.update_settings("user-1", Setting::Notifications, Toggle::On).unwrap();
        assert_eq!(vault.lookup_by_external_username("alice").unwrap().as_deref(), Some("user-1"));

        vault.update_settings("user-1", Setting::Notifications, Toggle::Off).unwrap();
        assert_eq!(vault.lookup_by_external_username("alice").unwrap(), None);
        assert!(!vault.resolve("user-1").unwrap().settings.notifications);
    }

    #[test]
    fn turning_notifications_off_keeps_another_users_index() {
        let vault = vault_with(Arc::new(MemoryStore::new()), "secret");
        vault.store(&alice()).unwrap();
        vault.set_reverse_index("alice", "user-2").unwrap();

        vault.update_settings("user-1", Setting::Notifications, Toggle::Off).unwrap();

        assert_eq!(vault.lookup_by_external_username("alice").unwrap().as_deref(), Some("user-2"));
    }

    #[test]
    fn settings_update_needs_no_decryption() {
        let store = Arc::new(MemoryStore::new());
        vault_with(store.clone(), "old-secret").store(&alice()).unwrap();

        let vault = vault_with(store.clone(), "new-secret");
        vault.update_settings("user-1", Setting::Reminders, Toggle::Off).unwrap();

        let resolved = vault_with(store, "old-secret").resolve("user-1").unwrap();
        assert!(!resolved.settings.daily_reminder);
        assert_eq!(resolved.token.access_token, "glpat-alice");
    }

    #[test]
    fn settings_update_for_unlinked_user_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");

        let result = vault.update_settings("user-1", Setting::Notifications, Toggle::On);

        assert!(matches!(result, Err(VaultError::NotLinked(_))));
        assert_eq!(store.mutations(), 0);
        assert!(!store.contains("alice_username"));
    }

    #[test]
    fn todo_stamp_only_touches_existing_records() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_with(store.clone(), "secret");
        let at = chrono::Utc::now();

        assert!(!vault.record_todo_post("user-1", at).unwrap());
        assert!(!store.contains("user-1_token"));

        vault.store(&alice()).unwrap();
        assert!(vault.record_todo_post("user-1", at).unwrap());
        assert_eq!(vault.resolve("user-1").unwrap().last_todo_post_at, Some(at));

        vault.unlink("user-1").unwrap();
        assert!(!vault.record_todo_post("user-1", at).unwrap());
        assert!(!store.contains("user-1_token"));
    }

    #[test]
    fn non_utf8_index_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("alice_username", &[0xff, 0xfe, b'1']).unwrap();

        let result = vault_with(store, "secret").lookup_by_external_username("alice");
        assert!(matches!(result, Err(VaultError::Storage(_))));
    }

    #[test]
    fn unlink_removes_an_unparseable_record() {
        let store = Arc::new(MemoryStore::new());
        store.set("user-1_token", b"{not json").unwrap();

        assert!(vault_with(store.clone(), "secret").unlink("user-1").unwrap());
        assert!(!store.contains("user-1_token"));
    }

    #[test]
    fn vault_over_sqlite() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let vault = Vault::new(db, Arc::new(AesGcmCipher::from_secret("secret")));

        let mut identity = alice();
        identity.last_todo_post_at = Some(chrono::Utc::now());
        vault.store(&identity).unwrap();

        assert_eq!(vault.resolve("user-1").unwrap(), identity);
    }
}
