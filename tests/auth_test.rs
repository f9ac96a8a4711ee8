//! Token handling tests against a mocked token endpoint.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use submission_report::auth::UserAuth;
use submission_report::consent::{AuthorizationCode, ConsentMode};
use submission_report::credential_store::{MemoryCredentialStore, StoredToken};
use submission_report::models::ClientSecrets;
use submission_report::{Authenticator, CredentialStore, DriveError, Result};
use tempfile::NamedTempFile;

fn secrets(server: &Server) -> ClientSecrets {
    ClientSecrets {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        auth_uri: format!("{}/auth", server.url()),
        token_uri: format!("{}/token", server.url()),
    }
}

fn stored(access: &str, refresh: Option<&str>, expires_in: i64) -> StoredToken {
    StoredToken {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_at: Utc::now() + Duration::seconds(expires_in),
        scope: None,
    }
}

/// Memory store that records which operations the authenticator performed.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryCredentialStore,
    ops: Mutex<Vec<&'static str>>,
}

impl RecordingStore {
    fn new(token: Option<StoredToken>) -> Self {
        Self {
            inner: MemoryCredentialStore::new(token),
            ops: Mutex::new(Vec::new()),
        }
    }

    fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }
}

impl CredentialStore for RecordingStore {
    fn load(&self) -> Result<Option<StoredToken>> {
        self.ops.lock().unwrap().push("load");
        self.inner.load()
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        self.ops.lock().unwrap().push("save");
        self.inner.save(token)
    }

    fn clear(&self) -> Result<()> {
        self.ops.lock().unwrap().push("clear");
        self.inner.clear()
    }
}

fn provided_code() -> ConsentMode {
    ConsentMode::Provided(AuthorizationCode::pasted("4/consent"))
}

async fn code_exchange_mock(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "4/consent".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "http://localhost".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"access_token": "granted", "refresh_token": "r-new", "expires_in": 3599})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await
}

mod user_auth {
    use super::*;

    #[tokio::test]
    async fn no_token_goes_to_consent_and_persists() {
        let mut server = Server::new_async().await;
        let exchange = code_exchange_mock(&mut server).await;

        let store = Arc::new(RecordingStore::default());
        let auth = Authenticator::user(secrets(&server), store.clone(), provided_code());

        assert_eq!(auth.get_access_token().await.unwrap(), "granted");
        assert_eq!(auth.get_access_token().await.unwrap(), "granted");
        exchange.assert_async().await;

        assert_eq!(store.ops(), vec!["load", "save"]);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "granted");
        assert_eq!(saved.refresh_token.as_deref(), Some("r-new"));
    }

    #[tokio::test]
    async fn expired_without_refresh_token_goes_to_consent() {
        let mut server = Server::new_async().await;
        let exchange = code_exchange_mock(&mut server).await;

        let store = Arc::new(RecordingStore::new(Some(stored("stale", None, -60))));
        let auth = Authenticator::user(secrets(&server), store.clone(), provided_code());

        assert_eq!(auth.get_access_token().await.unwrap(), "granted");
        exchange.assert_async().await;

        assert_eq!(store.ops(), vec!["load", "save"]);
        assert_eq!(store.load().unwrap().unwrap().access_token, "granted");
    }

    #[tokio::test]
    async fn rejected_refresh_clears_store_and_reauthorizes() {
        let mut server = Server::new_async().await;
        let refresh = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "invalid_grant"}"#)
            .expect(1)
            .create_async()
            .await;
        let exchange = code_exchange_mock(&mut server).await;

        let store = Arc::new(RecordingStore::new(Some(stored("stale", Some("revoked"), -60))));
        let auth = Authenticator::user(secrets(&server), store.clone(), provided_code());

        assert_eq!(auth.get_access_token().await.unwrap(), "granted");
        refresh.assert_async().await;
        exchange.assert_async().await;

        assert_eq!(store.ops(), vec!["load", "clear", "save"]);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "granted");
        assert_eq!(saved.refresh_token.as_deref(), Some("r-new"));
    }

    #[tokio::test]
    async fn valid_token_is_used_without_network() {
        let server = Server::new_async().await;
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("cached", None, 3600))));
        let auth = Authenticator::user(secrets(&server), store, ConsentMode::Manual);

        assert_eq!(auth.get_access_token().await.unwrap(), "cached");
        assert_eq!(auth.get_access_token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-id".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"access_token": "fresh", "expires_in": 3599, "token_type": "Bearer"})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new(Some(stored("stale", Some("r1"), -60))));
        let auth = Authenticator::user(secrets(&server), store.clone(), ConsentMode::Manual);

        assert_eq!(auth.get_access_token().await.unwrap(), "fresh");
        assert_eq!(auth.get_access_token().await.unwrap(), "fresh");
        mock.assert_async().await;

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
        assert!(saved.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn rejected_refresh_is_token_refresh_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::default());
        let auth = UserAuth::new(secrets(&server), store, ConsentMode::Manual);

        let err = auth.refresh(&stored("stale", Some("revoked"), -60)).await.unwrap_err();
        assert!(matches!(err, DriveError::TokenRefreshError(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn exchange_code_returns_refresh_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "4/code".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": "a1",
                    "refresh_token": "r1",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/drive.metadata.readonly"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::default());
        let auth = UserAuth::new(secrets(&server), store, ConsentMode::Manual);
        let code = AuthorizationCode {
            code: "4/code".to_string(),
            redirect_uri: "http://localhost".to_string(),
        };

        let token = auth.exchange_code(&code).await.unwrap();
        assert_eq!(token.access_token, "a1");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
        assert!(token.scope.unwrap().ends_with("drive.metadata.readonly"));
    }
}

mod service_account {
    use super::*;

    #[test]
    fn from_invalid_file() {
        assert!(Authenticator::from_service_account_file("/nonexistent/key.json").is_err());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();
        assert!(Authenticator::from_service_account_file(temp_file.path()).is_err());
    }

    #[tokio::test]
    async fn bad_private_key_fails_before_network() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let key = json!({
            "client_email": "grader@project.iam.gserviceaccount.com",
            "private_key": "not a pem key",
            "token_uri": "http://127.0.0.1:9/token"
        });
        temp_file.write_all(key.to_string().as_bytes()).unwrap();

        let auth = Authenticator::from_service_account_file(temp_file.path()).unwrap();
        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::JwtError(_)));
    }
}
