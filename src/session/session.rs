//! Session state machine.
//!
//! A session starts from credentials, opens by resuming an on-disk blob
//! or by logging in, and owns its API client, its key material, and its
//! filesystem snapshot. Opening prefers the cheapest path that still
//! yields a valid session: a fresh enough blob is trusted outright, a
//! stale one is revalidated with `ug`, and only then does a full login
//! run.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::api::client::{ApiClient, SidParam};
use crate::base64::{base64url_decode, base64url_encode};
use crate::crypto::auth::check_tsid;
use crate::crypto::keys::{decrypt_key, make_password_key, make_username_hash};
use crate::crypto::rsa::{decrypt_private_key, parse_raw_private_key, MegaRsaKey};
use crate::error::{MegaError, Result};
use crate::fs::tree::{FileSystem, TreeBuilder};
use crate::http::{HttpClient, Transport};
use crate::session::store::{SessionRecord, SessionStore};

/// Envelope name of the filesystem snapshot blob.
const FS_BLOB_NAME: &str = "fs";

/// How long a saved session is trusted without revalidation.
const DEFAULT_FRESHNESS: Duration = Duration::from_secs(3600);

/// An authenticated (or exported-folder) session.
pub struct Session<T: Transport = HttpClient> {
    api: ApiClient<T>,
    store: SessionStore,
    username: String,
    password: String,
    session_name: String,
    pk: [u8; 16],
    freshness: Duration,

    mk: Option<[u8; 16]>,
    rsa: Option<MegaRsaKey>,
    pubk: Option<String>,
    uh: Option<String>,
    email: Option<String>,
    name: Option<String>,
    sid: Option<String>,
    sid_param: SidParam,
    saved: Option<u64>,
    fs: Option<FileSystem>,
    exported: bool,
    open: bool,
}

impl Session<HttpClient> {
    /// Create a credentialed session using the default HTTPS transport.
    pub fn new(username: &str, password: &str) -> Self {
        Self::with_transport(HttpClient::new(), username, password)
    }
}

impl<T: Transport> Session<T> {
    /// Create a credentialed session over a custom transport.
    pub fn with_transport(transport: T, username: &str, password: &str) -> Self {
        Self {
            api: ApiClient::with_transport(transport),
            store: SessionStore::new(),
            username: username.to_string(),
            password: password.to_string(),
            session_name: String::new(),
            pk: make_password_key(password),
            freshness: DEFAULT_FRESHNESS,
            mk: None,
            rsa: None,
            pubk: None,
            uh: None,
            email: None,
            name: None,
            sid: None,
            sid_param: SidParam::Session,
            saved: None,
            fs: None,
            exported: false,
            open: false,
        }
    }

    /// Override where session blobs live. Defaults to the system
    /// temporary directory.
    pub fn set_store(&mut self, store: SessionStore) {
        self.store = store;
    }

    /// Name this session so several can coexist for one account.
    pub fn set_session_name(&mut self, name: &str) {
        self.session_name = name.to_string();
    }

    /// Adjust the resume freshness window.
    pub fn set_freshness(&mut self, window: Duration) {
        self.freshness = window;
    }

    /// Switch into exported-folder mode: the public folder handle acts
    /// as the session id (under the `n` parameter) and the supplied key
    /// becomes the session's master key. No login happens.
    pub fn set_exported_folder(&mut self, folder_handle: &str, folder_key: &[u8; 16]) {
        self.exported = true;
        self.mk = Some(*folder_key);
        self.sid = Some(folder_handle.to_string());
        self.sid_param = SidParam::Folder;
    }

    /// Usernames of ephemeral accounts are their 11-character handle.
    pub fn is_ephemeral(username: &str) -> bool {
        username.len() == 11
            && username
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn user_handle(&self) -> Option<&str> {
        self.uh.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn master_key(&self) -> Option<&[u8; 16]> {
        self.mk.as_ref()
    }

    /// The current filesystem snapshot, if one has been loaded or
    /// restored.
    pub fn filesystem(&self) -> Option<&FileSystem> {
        self.fs.as_ref()
    }

    /// The underlying API client, for the RPC wrappers layered on top.
    pub fn api_mut(&mut self) -> &mut ApiClient<T> {
        &mut self.api
    }

    /// Open the session.
    ///
    /// A saved blob within the freshness window is resumed without
    /// traffic (unless `force_check`); a stale blob is revalidated with
    /// `ug` and, if the server rejects the sid, the full login flow
    /// runs. Every successful open rewrites both blobs.
    pub async fn open(&mut self, force_check: bool) -> Result<()> {
        if self.exported {
            let sid = self.sid.clone().ok_or(MegaError::InvalidResponse)?;
            self.api.set_session_id(sid, SidParam::Folder);
            self.restore_filesystem();
            self.persist()?;
            self.open = true;
            return Ok(());
        }

        if self.restore_from_store() {
            let age = now_millis().saturating_sub(self.saved.unwrap_or(0));
            if !force_check && age < self.freshness.as_millis() as u64 {
                self.restore_filesystem();
                self.persist()?;
                self.open = true;
                return Ok(());
            }

            match self.get_user().await {
                Ok(()) => {
                    self.restore_filesystem();
                    self.persist()?;
                    self.open = true;
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(error = %err, "saved sid rejected, falling back to login");
                    self.api.clear_session_id();
                }
            }
        }

        if Self::is_ephemeral(&self.username) {
            self.login_ephemeral().await?;
        } else {
            self.login().await?;
        }

        self.restore_filesystem();
        self.persist()?;
        self.open = true;
        Ok(())
    }

    /// Close the session: remove both blobs and drop the key material,
    /// returning to the credentialed state.
    pub fn close(&mut self) {
        self.store
            .remove(&self.pk, &self.username, &self.password, &self.session_name);
        self.store
            .remove(&self.pk, &self.username, &self.password, FS_BLOB_NAME);

        self.api.clear_session_id();
        self.mk = None;
        self.rsa = None;
        self.pubk = None;
        self.uh = None;
        self.email = None;
        self.name = None;
        self.sid = None;
        self.sid_param = SidParam::Session;
        self.saved = None;
        self.fs = None;
        self.open = false;
    }

    /// Fetch the node catalogue and materialise the tree, then persist
    /// the new snapshot.
    pub async fn load_filesystem(&mut self) -> Result<()> {
        let mk = self
            .mk
            .ok_or_else(|| MegaError::Custom("session has no master key".to_string()))?;

        let response = self.api.call(json!({"a": "f", "c": 1, "r": 1})).await?;

        let uh = self.uh.clone().unwrap_or_default();
        let mut builder = TreeBuilder::new(&mk, &uh);
        if let Some(rsa) = &self.rsa {
            builder = builder.with_rsa(rsa);
        }
        if self.exported {
            builder = builder.exported_folder();
        }

        let fs = builder.build(&response);
        tracing::debug!(nodes = fs.len(), "filesystem materialised");
        self.fs = Some(fs);
        self.persist()
    }

    async fn login(&mut self) -> Result<()> {
        let email = self.username.to_lowercase();
        let uh = make_username_hash(&email, &self.pk);
        let response = self
            .api
            .call(json!({"a": "us", "user": email, "uh": uh}))
            .await?;
        self.finish_login(&response, false).await
    }

    async fn login_ephemeral(&mut self) -> Result<()> {
        let response = self
            .api
            .call(json!({"a": "us", "user": &self.username}))
            .await?;
        self.finish_login(&response, true).await
    }

    async fn finish_login(&mut self, response: &Value, ephemeral: bool) -> Result<()> {
        let k = response
            .get("k")
            .and_then(|v| v.as_str())
            .ok_or(MegaError::InvalidResponse)?;
        let mk = decrypt_key(k, &self.pk)?;

        // csid wins when the server sends both session proofs.
        let sid = if let Some(csid) = response.get("csid").and_then(|v| v.as_str()) {
            let privk = response
                .get("privk")
                .and_then(|v| v.as_str())
                .ok_or(MegaError::SidDecryptFailed)?;
            let rsa =
                decrypt_private_key(privk, &mk).map_err(|_| MegaError::SidDecryptFailed)?;
            let sid = rsa
                .decrypt_session_id(csid)
                .map_err(|_| MegaError::SidDecryptFailed)?;
            self.rsa = Some(rsa);
            sid
        } else if let Some(tsid) = response.get("tsid").and_then(|v| v.as_str()) {
            if !check_tsid(tsid, &mk) {
                // A named login failing here means the password key
                // unwrapped the wrong master key.
                return Err(if ephemeral {
                    MegaError::InvalidTsid
                } else {
                    MegaError::BadPassword
                });
            }
            tsid.to_string()
        } else {
            return Err(MegaError::EmptyResponse);
        };

        if let Some(u) = response.get("u").and_then(|v| v.as_str()) {
            self.uh = Some(u.to_string());
        }
        self.mk = Some(mk);
        self.sid = Some(sid.clone());
        self.sid_param = SidParam::Session;
        self.api.set_session_id(sid, SidParam::Session);

        self.get_user().await
    }

    /// Fetch the user object; also revalidates a resumed sid.
    async fn get_user(&mut self) -> Result<()> {
        let user = self.api.call(json!({"a": "ug"})).await?;

        if let Some(u) = user.get("u").and_then(|v| v.as_str()) {
            self.uh = Some(u.to_string());
        }
        if let Some(email) = user.get("email").and_then(|v| v.as_str()) {
            self.email = Some(email.to_string());
        }
        if let Some(name) = user.get("name").and_then(|v| v.as_str()) {
            self.name = Some(name.to_string());
        }
        if let Some(pubk) = user.get("pubk").and_then(|v| v.as_str()) {
            self.pubk = Some(pubk.to_string());
        }
        if let (Some(privk), Some(mk)) = (user.get("privk").and_then(|v| v.as_str()), self.mk) {
            match decrypt_private_key(privk, &mk) {
                Ok(rsa) => self.rsa = Some(rsa),
                Err(err) => tracing::warn!(error = %err, "private key failed to unwrap"),
            }
        }

        Ok(())
    }

    /// Try to restore session state from the on-disk blob. Returns
    /// false when the blob is absent, corrupt, or inconsistent.
    fn restore_from_store(&mut self) -> bool {
        let Some(payload) =
            self.store
                .load(&self.pk, &self.username, &self.password, &self.session_name)
        else {
            return false;
        };
        let Ok(record) = serde_json::from_slice::<SessionRecord>(&payload) else {
            tracing::warn!("session record failed to parse, ignoring");
            return false;
        };

        let Ok(pk) = base64url_decode(&record.pk) else {
            return false;
        };
        if pk != self.pk {
            tracing::warn!("session record belongs to different credentials, ignoring");
            return false;
        }

        let Some(mk) = base64url_decode(&record.mk)
            .ok()
            .filter(|b| b.len() == 16)
        else {
            return false;
        };
        let mut mk_arr = [0u8; 16];
        mk_arr.copy_from_slice(&mk);

        self.mk = Some(mk_arr);
        self.uh = Some(record.uh).filter(|s| !s.is_empty());
        self.email = record.email;
        self.name = record.name;
        self.pubk = record.pubk;
        self.rsa = record
            .privk
            .as_deref()
            .and_then(|b64| base64url_decode(b64).ok())
            .and_then(|bytes| parse_raw_private_key(&bytes).ok());
        self.sid = Some(record.sid.clone());
        self.sid_param = record.sid_param;
        self.saved = Some(record.saved);
        self.api.set_session_id(record.sid, record.sid_param);
        true
    }

    /// Restore the filesystem snapshot blob, if one decrypts.
    fn restore_filesystem(&mut self) {
        if self.fs.is_some() {
            return;
        }
        let Some(payload) =
            self.store
                .load(&self.pk, &self.username, &self.password, FS_BLOB_NAME)
        else {
            return;
        };
        match serde_json::from_slice::<FileSystem>(&payload) {
            Ok(fs) => self.fs = Some(fs),
            Err(err) => tracing::warn!(error = %err, "filesystem snapshot failed to parse"),
        }
    }

    /// Rewrite both blobs with the current state.
    fn persist(&mut self) -> Result<()> {
        let now = now_millis();
        self.saved = Some(now);

        let record = SessionRecord {
            uh: self.uh.clone().unwrap_or_default(),
            email: self.email.clone(),
            name: self.name.clone(),
            mk: base64url_encode(
                &self
                    .mk
                    .ok_or_else(|| MegaError::Custom("session has no master key".to_string()))?,
            ),
            pk: base64url_encode(&self.pk),
            pubk: self.pubk.clone(),
            privk: self
                .rsa
                .as_ref()
                .map(|rsa| base64url_encode(&rsa.private_key_bytes())),
            sid: self
                .sid
                .clone()
                .ok_or_else(|| MegaError::Custom("session has no sid".to_string()))?,
            sid_param: self.sid_param,
            saved: now,
        };

        let payload = serde_json::to_vec(&record)?;
        self.store.save(
            &self.pk,
            &self.username,
            &self.password,
            &self.session_name,
            &payload,
        )?;

        let empty = FileSystem::default();
        let snapshot = self.fs.as_ref().unwrap_or(&empty);
        let fs_payload = serde_json::to_vec(snapshot)?;
        self.store.save(
            &self.pk,
            &self.username,
            &self.password,
            FS_BLOB_NAME,
            &fs_payload,
        )?;

        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes::aes128_ecb_encrypt_block;
    use crate::crypto::keys::encrypt_key;
    use crate::http::testing::StubTransport;
    use std::sync::Arc;

    const PASSWORD: &str = "correct horse";
    const EMAIL: &str = "alice@example.com";
    const MK: [u8; 16] = [0x5Au8; 16];

    fn make_tsid(mk: &[u8; 16]) -> String {
        let ts1 = [0x11u8; 16];
        let ts2 = aes128_ecb_encrypt_block(&ts1, mk);
        let mut blob = Vec::new();
        blob.extend_from_slice(&ts1);
        blob.extend_from_slice(&ts2);
        base64url_encode(&blob)
    }

    fn us_response(pk: &[u8; 16]) -> serde_json::Value {
        json!({
            "k": base64url_encode(&encrypt_key(&MK, pk)),
            "tsid": make_tsid(&MK),
            "u": "handleAAAAB",
        })
    }

    fn ug_response() -> serde_json::Value {
        json!({
            "u": "handleAAAAB",
            "email": EMAIL,
            "name": "Alice",
        })
    }

    fn session_with(
        stub: &Arc<StubTransport>,
        dir: &tempfile::TempDir,
    ) -> Session<Arc<StubTransport>> {
        let mut session = Session::with_transport(stub.clone(), EMAIL, PASSWORD);
        session.set_store(SessionStore::at(dir.path()));
        session
    }

    fn request_actions(stub: &StubTransport) -> Vec<String> {
        stub.request_bodies()
            .iter()
            .map(|body| {
                let v: serde_json::Value = serde_json::from_str(body).unwrap();
                v[0]["a"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn ephemeral_predicate() {
        assert!(Session::<HttpClient>::is_ephemeral("AbC123_-xYz"));
        assert!(!Session::<HttpClient>::is_ephemeral("short"));
        assert!(!Session::<HttpClient>::is_ephemeral("waytoolonghandle"));
        assert!(!Session::<HttpClient>::is_ephemeral("has@symbol1"));
        assert!(!Session::<HttpClient>::is_ephemeral("alice@x.com"));
    }

    #[tokio::test]
    async fn fresh_login_reaches_open_and_writes_blobs() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&stub, &dir);

        let pk = make_password_key(PASSWORD);
        stub.push_json(json!([us_response(&pk)]));
        stub.push_json(json!([ug_response()]));

        session.open(false).await.unwrap();

        assert!(session.is_open());
        assert_eq!(session.session_id(), Some(make_tsid(&MK).as_str()));
        assert_eq!(session.master_key(), Some(&MK));
        assert_eq!(session.user_handle(), Some("handleAAAAB"));
        assert_eq!(session.email(), Some(EMAIL));
        assert_eq!(request_actions(&stub), vec!["us", "ug"]);

        // The login request carried the username hash, not the password.
        let first: serde_json::Value =
            serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        assert_eq!(first[0]["uh"], make_username_hash(EMAIL, &pk));

        // Both blobs are on disk and decryptable.
        let store = SessionStore::at(dir.path());
        assert!(store.load(&pk, EMAIL, PASSWORD, "").is_some());
        assert!(store.load(&pk, EMAIL, PASSWORD, "fs").is_some());
    }

    #[tokio::test]
    async fn resume_within_freshness_makes_no_traffic() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();

        // First run: real login.
        let pk = make_password_key(PASSWORD);
        {
            let mut session = session_with(&stub, &dir);
            stub.push_json(json!([us_response(&pk)]));
            stub.push_json(json!([ug_response()]));
            session.open(false).await.unwrap();
        }
        let logged_in_requests = stub.request_count();

        // Second run resumes from disk: no canned responses needed.
        let mut session = session_with(&stub, &dir);
        session.open(false).await.unwrap();

        assert!(session.is_open());
        assert_eq!(session.master_key(), Some(&MK));
        assert_eq!(stub.request_count(), logged_in_requests);
    }

    fn age_record(dir: &tempfile::TempDir, by_millis: u64) {
        let pk = make_password_key(PASSWORD);
        let store = SessionStore::at(dir.path());
        let payload = store.load(&pk, EMAIL, PASSWORD, "").unwrap();
        let mut record: SessionRecord = serde_json::from_slice(&payload).unwrap();
        record.saved = record.saved.saturating_sub(by_millis);
        store
            .save(&pk, EMAIL, PASSWORD, "", &serde_json::to_vec(&record).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn stale_resume_revalidates_with_get_user() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let pk = make_password_key(PASSWORD);
        {
            let mut session = session_with(&stub, &dir);
            stub.push_json(json!([us_response(&pk)]));
            stub.push_json(json!([ug_response()]));
            session.open(false).await.unwrap();
        }
        // Pretend the blob was written two hours ago.
        age_record(&dir, 2 * 3600 * 1000);

        stub.push_json(json!([ug_response()]));
        let mut session = session_with(&stub, &dir);
        session.open(false).await.unwrap();

        assert!(session.is_open());
        // Exactly one extra request, and it was ug, not us.
        let actions = request_actions(&stub);
        assert_eq!(actions, vec!["us", "ug", "ug"]);
    }

    #[tokio::test]
    async fn rejected_sid_falls_back_to_login() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let pk = make_password_key(PASSWORD);
        {
            let mut session = session_with(&stub, &dir);
            stub.push_json(json!([us_response(&pk)]));
            stub.push_json(json!([ug_response()]));
            session.open(false).await.unwrap();
        }
        age_record(&dir, 2 * 3600 * 1000);
        let old_saved = {
            let store = SessionStore::at(dir.path());
            let payload = store.load(&pk, EMAIL, PASSWORD, "").unwrap();
            serde_json::from_slice::<SessionRecord>(&payload).unwrap().saved
        };

        // ug rejects the stale sid, then the login flow runs.
        stub.push_json(json!(-15));
        stub.push_json(json!([us_response(&pk)]));
        stub.push_json(json!([ug_response()]));

        let mut session = session_with(&stub, &dir);
        session.open(false).await.unwrap();

        assert!(session.is_open());
        assert_eq!(request_actions(&stub), vec!["us", "ug", "ug", "us", "ug"]);

        // The record was rewritten.
        let store = SessionStore::at(dir.path());
        let payload = store.load(&pk, EMAIL, PASSWORD, "").unwrap();
        let record: SessionRecord = serde_json::from_slice(&payload).unwrap();
        assert!(record.saved > old_saved);
        assert_eq!(record.sid, make_tsid(&MK));
    }

    #[tokio::test]
    async fn force_check_revalidates_even_when_fresh() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let pk = make_password_key(PASSWORD);
        {
            let mut session = session_with(&stub, &dir);
            stub.push_json(json!([us_response(&pk)]));
            stub.push_json(json!([ug_response()]));
            session.open(false).await.unwrap();
        }

        stub.push_json(json!([ug_response()]));
        let mut session = session_with(&stub, &dir);
        session.open(true).await.unwrap();
        assert_eq!(request_actions(&stub), vec!["us", "ug", "ug"]);
    }

    #[tokio::test]
    async fn wrong_password_is_detected_by_tsid_check() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&stub, &dir);

        // Response keyed to a different password key.
        let wrong_pk = make_password_key("not the password");
        stub.push_json(json!([us_response(&wrong_pk)]));

        match session.open(false).await {
            Err(MegaError::BadPassword) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn csid_preferred_over_tsid() {
        // A login response carrying both proofs must take the csid
        // path; an undecryptable csid therefore fails even though the
        // tsid is valid.
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&stub, &dir);

        let pk = make_password_key(PASSWORD);
        let mut response = us_response(&pk);
        response["csid"] = json!(base64url_encode(&[0u8; 8]));
        response["privk"] = json!(base64url_encode(&[0u8; 16]));
        stub.push_json(json!([response]));

        match session.open(false).await {
            Err(MegaError::SidDecryptFailed) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ephemeral_login_uses_handle_and_maps_tsid_failure() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();

        let handle = "AbC123_-xYz";
        let mut session = Session::with_transport(stub.clone(), handle, PASSWORD);
        session.set_store(SessionStore::at(dir.path()));

        // Ephemeral response keyed to the wrong password key: the tsid
        // check fails as invalid_tsid, not bad_password.
        let wrong_pk = make_password_key("other");
        stub.push_json(json!([us_response(&wrong_pk)]));

        match session.open(false).await {
            Err(MegaError::InvalidTsid) => {}
            other => panic!("unexpected: {other:?}"),
        }

        let first: serde_json::Value =
            serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        assert_eq!(first[0]["user"], handle);
        assert!(first[0].get("uh").is_none());
    }

    #[tokio::test]
    async fn close_removes_blobs_and_state() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let pk = make_password_key(PASSWORD);
        let mut session = session_with(&stub, &dir);
        stub.push_json(json!([us_response(&pk)]));
        stub.push_json(json!([ug_response()]));
        session.open(false).await.unwrap();

        session.close();
        assert!(!session.is_open());
        assert!(session.master_key().is_none());

        let store = SessionStore::at(dir.path());
        assert!(store.load(&pk, EMAIL, PASSWORD, "").is_none());
        assert!(store.load(&pk, EMAIL, PASSWORD, "fs").is_none());
    }

    #[tokio::test]
    async fn filesystem_snapshot_restored_on_resume() {
        use crate::crypto::attrs::make_node_attrs;

        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();
        let pk = make_password_key(PASSWORD);

        {
            let mut session = session_with(&stub, &dir);
            stub.push_json(json!([us_response(&pk)]));
            stub.push_json(json!([ug_response()]));
            session.open(false).await.unwrap();

            let key = [3u8; 16];
            let mut attrs = serde_json::Map::new();
            attrs.insert("n".to_string(), json!("docs"));
            stub.push_json(json!([{
                "f": [
                    {"h": "rootnod1", "t": 2, "ts": 0},
                    {
                        "h": "foldera1", "p": "rootnod1", "t": 1, "ts": 0,
                        "k": format!("handleAAAAB:{}", base64url_encode(
                            &crate::crypto::aes::aes128_ecb_encrypt(&key, &MK))),
                        "a": make_node_attrs(&key, &attrs),
                    },
                ],
            }]));
            session.load_filesystem().await.unwrap();
            assert_eq!(session.filesystem().unwrap().node("foldera1").unwrap().path, "Root/docs");
        }

        // Resume: snapshot comes back from disk without an f call.
        let before = stub.request_count();
        let mut session = session_with(&stub, &dir);
        session.open(false).await.unwrap();
        assert_eq!(stub.request_count(), before);
        let fs = session.filesystem().unwrap();
        assert_eq!(fs.node("foldera1").unwrap().path, "Root/docs");
    }

    #[tokio::test]
    async fn exported_folder_session_skips_login() {
        let stub = Arc::new(StubTransport::new());
        let dir = tempfile::tempdir().unwrap();

        let folder_mk = [0x77u8; 16];
        let mut session = Session::with_transport(stub.clone(), "", "");
        session.set_store(SessionStore::at(dir.path()));
        session.set_exported_folder("fldrhnd1", &folder_mk);

        session.open(false).await.unwrap();
        assert!(session.is_open());
        assert_eq!(stub.request_count(), 0);

        let key = [1u8; 16];
        let mut attrs = serde_json::Map::new();
        attrs.insert("n".to_string(), json!("Public"));
        stub.push_json(json!([{
            "f": [{
                "h": "fldrhnd1", "t": 1, "ts": 0,
                "k": format!("fldrhnd1:{}", base64url_encode(
                    &crate::crypto::aes::aes128_ecb_encrypt(&key, &folder_mk))),
                "a": make_node_attrs_helper(&key, "Public"),
            }],
        }]));
        session.load_filesystem().await.unwrap();

        // The f request went out under the n parameter.
        assert!(stub.request_urls()[0].contains("&n=fldrhnd1"));
        let fs = session.filesystem().unwrap();
        assert_eq!(fs.node("fldrhnd1").unwrap().parent_handle, None);
        assert_eq!(fs.share_keys.get("fldrhnd1"), Some(&folder_mk));
    }

    fn make_node_attrs_helper(key: &[u8; 16], name: &str) -> String {
        let mut attrs = serde_json::Map::new();
        attrs.insert("n".to_string(), json!(name));
        crate::crypto::attrs::make_node_attrs(key, &attrs)
    }
}
