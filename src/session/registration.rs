//! Account registration, confirmation, and reset RPC wrappers.
//!
//! These drive the account lifecycle around the session core. They are
//! thin wrappers over the transaction engine: each maps one server
//! operation, with the key material prepared locally.

use serde_json::{json, Map, Value};

use crate::api::client::ApiClient;
use crate::base64::{base64url_decode, base64url_encode};
use crate::crypto::aes::{aes128_ecb_decrypt, aes128_ecb_encrypt};
use crate::crypto::auth::make_ts_blob;
use crate::crypto::buffer::join_buf;
use crate::crypto::keys::{make_password_key, make_username_hash};
use crate::crypto::random::{make_random_key, random_bytes};
use crate::error::{MegaError, Result};
use crate::http::Transport;

/// Create an anonymous account.
///
/// Sends `up` with the master key wrapped under the password key and a
/// fresh `ts` blob (16 random bytes plus their encryption under the
/// master key). Returns the new user handle and the master key; the
/// handle is the username for subsequent ephemeral logins.
pub async fn register_ephemeral<T: Transport>(
    api: &mut ApiClient<T>,
    password: &str,
) -> Result<(String, [u8; 16])> {
    let pk = make_password_key(password);
    let mk = make_random_key();
    let emk = aes128_ecb_encrypt(&mk, &pk);
    let ts = make_ts_blob(&mk);

    let response = api
        .call(json!({
            "a": "up",
            "k": base64url_encode(&emk),
            "ts": base64url_encode(&ts),
        }))
        .await?;

    let uh = response
        .as_str()
        .ok_or(MegaError::InvalidResponse)?
        .to_string();
    Ok((uh, mk))
}

/// Request a signup confirmation email (`uc`).
///
/// The confirmation blob is the master key and a zero-tailed challenge,
/// wrapped under the password key; the server mails it back inside the
/// confirmation link.
pub async fn request_signup_link<T: Transport>(
    api: &mut ApiClient<T>,
    email: &str,
    name: &str,
    password: &str,
    mk: &[u8; 16],
) -> Result<Value> {
    let pk = make_password_key(password);
    let mut challenge = random_bytes(8);
    challenge.resize(16, 0);
    let c = aes128_ecb_encrypt(&join_buf(&[mk, &challenge]), &pk);

    api.call(json!({
        "a": "uc",
        "c": base64url_encode(&c),
        "n": base64url_encode(name.as_bytes()),
        "m": base64url_encode(email.as_bytes()),
    }))
    .await
}

/// Confirmed signup details returned by [`verify_signup_link`].
#[derive(Debug, Clone)]
pub struct SignupConfirmation {
    pub email: String,
    pub name: String,
    pub uh: String,
    /// Master key recovered from the confirmation blob.
    pub mk: [u8; 16],
}

/// Complete signup from the emailed code (`ud`).
///
/// The response echoes the confirmation blob; the challenge tail must
/// decrypt to zeros under the password key, otherwise the password does
/// not match the one used at signup.
pub async fn verify_signup_link<T: Transport>(
    api: &mut ApiClient<T>,
    code: &str,
    password: &str,
) -> Result<SignupConfirmation> {
    let response = api.call(json!({"a": "ud", "c": code})).await?;

    let fields = response.as_array().ok_or(MegaError::InvalidResponse)?;
    if fields.len() < 4 {
        return Err(MegaError::InvalidResponse);
    }
    let email_b64 = fields[0].as_str().ok_or(MegaError::InvalidResponse)?;
    let name_b64 = fields[1].as_str().ok_or(MegaError::InvalidResponse)?;
    let uh = fields[2].as_str().ok_or(MegaError::InvalidResponse)?;
    let c_b64 = fields[3].as_str().ok_or(MegaError::InvalidResponse)?;

    let pk = make_password_key(password);
    let wrapped = base64url_decode(c_b64)?;
    if wrapped.len() != 32 {
        return Err(MegaError::InvalidResponse);
    }
    let plain = aes128_ecb_decrypt(&wrapped, &pk);
    if plain[24..32].iter().any(|b| *b != 0) {
        return Err(MegaError::BadPassword);
    }
    let mut mk = [0u8; 16];
    mk.copy_from_slice(&plain[..16]);

    let email = String::from_utf8(base64url_decode(email_b64)?)
        .map_err(|_| MegaError::InvalidResponse)?;
    let name =
        String::from_utf8(base64url_decode(name_b64)?).map_err(|_| MegaError::InvalidResponse)?;

    Ok(SignupConfirmation {
        email,
        name,
        uh: uh.to_string(),
        mk,
    })
}

/// Start a password reset (`erx`): the server mails a recovery code.
pub async fn request_user_reset<T: Transport>(
    api: &mut ApiClient<T>,
    email: &str,
) -> Result<Value> {
    api.call(json!({"a": "erx", "u": email})).await
}

/// Finish a password reset (`erm`).
///
/// Re-wraps the (recovered) master key under the new password key and
/// re-arms the session proof with a fresh inline `ts` blob.
pub async fn complete_user_reset<T: Transport>(
    api: &mut ApiClient<T>,
    code: &str,
    email: &str,
    new_password: &str,
    mk: &[u8; 16],
) -> Result<Value> {
    let pk = make_password_key(new_password);
    let emk = aes128_ecb_encrypt(mk, &pk);
    let ts = make_ts_blob(mk);

    api.call(json!({
        "a": "erm",
        "m": email,
        "c": code,
        "x": base64url_encode(&emk),
        "y": make_username_hash(email, &pk),
        "z": base64url_encode(&ts),
    }))
    .await
}

/// Optional fields for a profile update (`up`).
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub c: Option<String>,
    pub uh: Option<String>,
    pub pubk: Option<String>,
    pub privk: Option<String>,
    pub name: Option<String>,
}

/// Update account attributes; returns the user handle.
pub async fn update_user<T: Transport>(
    api: &mut ApiClient<T>,
    update: UserUpdate,
) -> Result<String> {
    let mut payload = Map::new();
    payload.insert("a".to_string(), json!("up"));
    for (field, value) in [
        ("c", update.c),
        ("uh", update.uh),
        ("pubk", update.pubk),
        ("privk", update.privk),
        ("name", update.name),
    ] {
        if let Some(value) = value {
            payload.insert(field.to_string(), json!(value));
        }
    }

    let response = api.call(Value::Object(payload)).await?;
    response
        .as_str()
        .map(str::to_string)
        .ok_or(MegaError::InvalidResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::RetryPolicy;
    use crate::crypto::auth::check_tsid;
    use crate::http::testing::StubTransport;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn api(stub: &Arc<StubTransport>) -> ApiClient<Arc<StubTransport>> {
        let mut api = ApiClient::with_transport(stub.clone());
        api.retry = RetryPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
        };
        api
    }

    #[tokio::test]
    async fn ephemeral_registration_sends_verifiable_ts() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!(["handleAAAAB"]));
        let mut api = api(&stub);

        let (uh, mk) = register_ephemeral(&mut api, "pw").await.unwrap();
        assert_eq!(uh, "handleAAAAB");

        let body: serde_json::Value = serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        assert_eq!(body[0]["a"], "up");

        // The emitted ts blob self-authenticates under the returned mk.
        let ts = body[0]["ts"].as_str().unwrap();
        assert!(check_tsid(ts, &mk));

        // And k unwraps back to mk under the password key.
        let pk = make_password_key("pw");
        let k = body[0]["k"].as_str().unwrap();
        assert_eq!(crate::crypto::keys::decrypt_key(k, &pk).unwrap(), mk);
    }

    #[tokio::test]
    async fn signup_link_roundtrip() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!([0]));
        let mut api = api(&stub);

        let mk = [0x21u8; 16];
        request_signup_link(&mut api, "alice@x", "Alice", "pw", &mk)
            .await
            .unwrap();

        // Feed the emitted blob back as the server would.
        let body: serde_json::Value = serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        let c = body[0]["c"].as_str().unwrap();
        stub.push_json(json!([[
            base64url_encode(b"alice@x"),
            base64url_encode(b"Alice"),
            "handleAAAAB",
            c,
        ]]));

        let confirmation = verify_signup_link(&mut api, "emailed-code", "pw")
            .await
            .unwrap();
        assert_eq!(confirmation.email, "alice@x");
        assert_eq!(confirmation.name, "Alice");
        assert_eq!(confirmation.uh, "handleAAAAB");
        assert_eq!(confirmation.mk, mk);
    }

    #[tokio::test]
    async fn signup_link_with_wrong_password_fails_challenge() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!([0]));
        let mut api = api(&stub);

        let mk = [0x21u8; 16];
        request_signup_link(&mut api, "alice@x", "Alice", "pw", &mk)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        let c = body[0]["c"].as_str().unwrap();
        stub.push_json(json!([[
            base64url_encode(b"alice@x"),
            base64url_encode(b"Alice"),
            "handleAAAAB",
            c,
        ]]));

        match verify_signup_link(&mut api, "emailed-code", "other password").await {
            Err(MegaError::BadPassword) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_reset_reencrypts_master_key() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!([0]));
        stub.push_json(json!([0]));
        let mut api = api(&stub);

        request_user_reset(&mut api, "alice@x").await.unwrap();

        let mk = [0x44u8; 16];
        complete_user_reset(&mut api, "reset-code", "alice@x", "new pw", &mk)
            .await
            .unwrap();

        let bodies = stub.request_bodies();
        let erx: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(erx[0]["a"], "erx");

        let erm: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
        assert_eq!(erm[0]["a"], "erm");
        let new_pk = make_password_key("new pw");
        let x = erm[0]["x"].as_str().unwrap();
        assert_eq!(crate::crypto::keys::decrypt_key(x, &new_pk).unwrap(), mk);
        assert!(check_tsid(erm[0]["z"].as_str().unwrap(), &mk));
        assert_eq!(erm[0]["y"], make_username_hash("alice@x", &new_pk));
    }

    #[tokio::test]
    async fn update_user_sends_only_present_fields() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!(["handleAAAAB"]));
        let mut api = api(&stub);

        let uh = update_user(
            &mut api,
            UserUpdate {
                name: Some("Alice".to_string()),
                pubk: Some("PUBK".to_string()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(uh, "handleAAAAB");

        let body: serde_json::Value = serde_json::from_str(&stub.request_bodies()[0]).unwrap();
        assert_eq!(body[0]["a"], "up");
        assert_eq!(body[0]["name"], "Alice");
        assert_eq!(body[0]["pubk"], "PUBK");
        assert!(body[0].get("c").is_none());
        assert!(body[0].get("privk").is_none());
    }
}
