//! Realtime Tree REST Store
//!
//! `RemoteDataPort` over the hosted realtime tree's REST surface:
//! - `GET/PUT/POST {base}/{path}.json`, optional `?auth=` token
//! - server values `{".sv":"timestamp"}` and `{".sv":{"increment":n}}`
//! - listeners over `text/event-stream`; each `put`/`patch` event re-reads
//!   the watched path and pushes the whole value

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::try_join_all;
use kernel::id::{PlateKey, UserId};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::domain::entities::{
    INITIAL_REPUTATION, OwnedSnapshot, Plate, PlateCollection, ReportSnapshot,
};
use crate::domain::remote::{RemoteDataPort, Subscription, SubscriptionHandle};
use crate::domain::value_objects::{PlateId, ReportDirection};
use crate::error::{ReputationError, ReputationResult};

const PLATES: &str = "plates";
const USERS: &str = "users";
const OWNED_PLATES: &str = "owned_plates";

/// REST store configuration
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Database root, e.g. `https://example-default-rtdb.firebaseio.com`
    pub base_url: String,
    /// ID token or database secret appended as `?auth=`
    pub auth_token: Option<String>,
    /// Per-request timeout for one-shot calls
    pub request_timeout: Duration,
    /// Reputation of newly created plates
    pub initial_reputation: f64,
}

impl RestStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            initial_reputation: INITIAL_REPUTATION,
        }
    }

    /// Read `REPUTATION_DB_URL` (required) and `REPUTATION_DB_TOKEN`
    pub fn from_env() -> ReputationResult<Self> {
        let base_url = env::var("REPUTATION_DB_URL")
            .map_err(|_| ReputationError::Internal("REPUTATION_DB_URL is not set".into()))?;
        let mut config = Self::new(base_url);
        config.auth_token = env::var("REPUTATION_DB_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Ok(config)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// `{base}/{path}.json`
    pub fn node_url(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }
}

/// REST tree store
#[derive(Clone)]
pub struct RestTreeStore {
    client: Client,
    config: Arc<RestStoreConfig>,
}

impl RestTreeStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: RestStoreConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.config.node_url(path));
        match &self.config.auth_token {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }

    async fn get_value(&self, path: &str) -> ReputationResult<Value> {
        let value = self
            .request(Method::GET, path)
            .timeout(self.config.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    }

    /// Whether a node exists, read shallow
    async fn exists(&self, path: &str) -> ReputationResult<bool> {
        let value = self
            .request(Method::GET, path)
            .query(&[("shallow", "true")])
            .timeout(self.config.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(!value.is_null())
    }

    async fn put_value(&self, path: &str, body: &Value) -> ReputationResult<()> {
        self.request(Method::PUT, path)
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Open the event stream for `path` and pump decoded values into a subscription
    async fn watch<T>(&self, path: String, decode: fn(Value) -> T) -> ReputationResult<Subscription<T>>
    where
        T: Send + 'static,
    {
        let response = self
            .request(Method::GET, &path)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut parser = SseParser::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::debug!(path = %path, error = %e, "Listener stream broke");
                        return;
                    }
                };
                for event in parser.push(&chunk) {
                    match event.name.as_str() {
                        "put" | "patch" => match store.get_value(&path).await {
                            Ok(value) => {
                                if tx.send(decode(value)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(path = %path, error = %e, "Listener refresh dropped");
                            }
                        },
                        "keep-alive" => {}
                        "cancel" | "auth_revoked" => {
                            tracing::debug!(path = %path, event = %event.name, "Listener revoked by server");
                            return;
                        }
                        other => {
                            tracing::debug!(path = %path, event = other, "Unknown listener event");
                        }
                    }
                }
            }
        });

        let abort = task.abort_handle();
        Ok(Subscription::new(
            rx,
            SubscriptionHandle::new(move || abort.abort()),
        ))
    }
}

impl RemoteDataPort for RestTreeStore {
    async fn create_user(&self, user_id: &UserId) -> ReputationResult<()> {
        let path = format!("{USERS}/{user_id}");
        if !self.exists(&path).await? {
            self.put_value(&path, &json!("")).await?;
        }
        Ok(())
    }

    async fn register_owner(&self, plate_key: &PlateKey, user_id: &UserId) -> ReputationResult<()> {
        self.put_value(&format!("{USERS}/{user_id}/{OWNED_PLATES}/{plate_key}"), &json!(""))
            .await
    }

    async fn log_report(
        &self,
        plate_key: &PlateKey,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<()> {
        let path = format!(
            "{USERS}/{user_id}/{}/{plate_key}/timestamp",
            direction.path_segment()
        );
        self.put_value(&path, &json!({".sv": "timestamp"})).await
    }

    async fn increment_reputation(
        &self,
        plate_key: &PlateKey,
        direction: ReportDirection,
    ) -> ReputationResult<()> {
        // A server-side increment on a missing node would create a bare counter.
        // Plates are never deleted, so checking first is enough.
        if !self.exists(&format!("{PLATES}/{plate_key}")).await? {
            return Err(ReputationError::PlateNotFound(plate_key.clone()));
        }
        let path = format!("{PLATES}/{plate_key}/reputation");
        self.put_value(&path, &json!({".sv": {"increment": direction.delta()}}))
            .await
    }

    async fn lookup_plates_by_keys(
        &self,
        keys: &[PlateKey],
    ) -> ReputationResult<Vec<(PlateKey, Plate)>> {
        let fetches = keys.iter().map(|key| async move {
            let value = self.get_value(&format!("{PLATES}/{key}")).await?;
            Ok::<_, ReputationError>(decode_plate(value).map(|plate| (key.clone(), plate)))
        });
        let plates = try_join_all(fetches).await?;
        Ok(plates.into_iter().flatten().collect())
    }

    async fn create_plate(&self, id: &PlateId) -> ReputationResult<PlateKey> {
        #[derive(Deserialize)]
        struct Created {
            name: String,
        }

        let plate = Plate::new(id, self.config.initial_reputation);
        let created = self
            .request(Method::POST, PLATES)
            .timeout(self.config.request_timeout)
            .json(&plate)
            .send()
            .await?
            .error_for_status()?
            .json::<Created>()
            .await?;
        Ok(PlateKey::parse(created.name)?)
    }

    async fn watch_plates(&self) -> ReputationResult<Subscription<PlateCollection>> {
        self.watch(PLATES.to_string(), decode_plates).await
    }

    async fn watch_reports(
        &self,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<Subscription<ReportSnapshot>> {
        let path = format!("{USERS}/{user_id}/{}", direction.path_segment());
        self.watch(path, decode_reports).await
    }

    async fn watch_owned(&self, user_id: &UserId) -> ReputationResult<Subscription<OwnedSnapshot>> {
        self.watch(format!("{USERS}/{user_id}/{OWNED_PLATES}"), decode_owned)
            .await
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_plate(value: Value) -> Option<Plate> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value)
        .inspect_err(|e| tracing::debug!(error = %e, "Skipping malformed plate"))
        .ok()
}

/// Children of an object node with valid keys; anything else is empty
fn children(value: Value) -> Vec<(PlateKey, Value)> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(key, child)| PlateKey::parse(key).ok().map(|key| (key, child)))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn decode_plates(value: Value) -> PlateCollection {
    children(value)
        .into_iter()
        .filter_map(|(key, child)| decode_plate(child).map(|plate| (key, plate)))
        .collect()
}

pub(crate) fn decode_reports(value: Value) -> ReportSnapshot {
    #[derive(Deserialize)]
    struct Record {
        timestamp: i64,
    }

    children(value)
        .into_iter()
        .filter_map(|(key, child)| {
            serde_json::from_value::<Record>(child)
                .ok()
                .map(|record| (key, record.timestamp))
        })
        .collect()
}

pub(crate) fn decode_owned(value: Value) -> OwnedSnapshot {
    children(value).into_iter().map(|(key, _)| key).collect()
}

// ============================================================================
// Event stream parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed a chunk; returns the events it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = Self::parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut name = None;
        let mut data = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.trim_start());
            }
        }
        name.map(|name| SseEvent {
            name,
            data: data.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_url() {
        let config = RestStoreConfig::new("https://db.example.com/");
        assert_eq!(
            config.node_url("plates/k1"),
            "https://db.example.com/plates/k1.json"
        );
    }

    #[test]
    fn test_decode_plates_skips_malformed() {
        let value = json!({
            "k1": {"prefix": "ABC", "number": "1", "reputation": 500},
            "k2": {"prefix": "XYZ"},
            "bad.key": {"prefix": "DEF", "number": "2", "reputation": 1}
        });
        let plates = decode_plates(value);
        assert_eq!(plates.len(), 1);
        let key = PlateKey::parse("k1").unwrap();
        assert_eq!(plates.get(&key).unwrap().reputation, 500.0);
    }

    #[test]
    fn test_decode_null_is_empty() {
        assert!(decode_plates(Value::Null).is_empty());
        assert!(decode_reports(Value::Null).is_empty());
        assert!(decode_owned(Value::Null).is_empty());
    }

    #[test]
    fn test_decode_reports_and_owned() {
        let reports = decode_reports(json!({
            "k1": {"timestamp": 1700000000000i64},
            "k2": {"other": 1}
        }));
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[&PlateKey::parse("k1").unwrap()],
            1_700_000_000_000
        );

        let owned = decode_owned(json!({"k1": "", "k2": ""}));
        assert_eq!(owned.len(), 2);
    }

    #[test]
    fn test_sse_parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: put\ndata: {\"path\":\"/\",").is_empty());
        let events = parser.push(b"\"data\":null}\n\nevent: keep-alive\ndata: null\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "put");
        assert_eq!(events[0].data, "{\"path\":\"/\",\"data\":null}");
        assert_eq!(events[1].name, "keep-alive");
    }

    #[test]
    fn test_sse_parser_strips_carriage_returns() {
        let mut parser = SseParser::default();
        let events = parser.push(b"event: patch\r\ndata: {}\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                name: "patch".into(),
                data: "{}".into()
            }]
        );
    }

    mod served {
        use super::*;
        use crate::infra::fake_tree::FakeTree;
        use axum::http::{Method as HttpMethod, StatusCode};
        use kernel::error::kind::ErrorKind;

        const NOW_MS: i64 = 1_700_000_000_000;

        async fn store_with(
            config: impl FnOnce(RestStoreConfig) -> RestStoreConfig,
        ) -> (FakeTree, RestTreeStore) {
            let tree = FakeTree::new(NOW_MS);
            let base_url = tree.serve().await;
            let store = RestTreeStore::new(config(RestStoreConfig::new(base_url)));
            (tree, store)
        }

        async fn store() -> (FakeTree, RestTreeStore) {
            store_with(|config| config).await
        }

        fn user() -> UserId {
            UserId::parse("user-1").unwrap()
        }

        fn seed_plate(tree: &FakeTree, key: &str, prefix: &str, reputation: f64) {
            tree.seed(
                &format!("plates/{key}"),
                json!({"prefix": prefix, "number": "1", "reputation": reputation}),
            );
        }

        async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("no snapshot")
                .expect("listener closed")
        }

        #[tokio::test]
        async fn test_create_user_writes_missing_node_once() {
            let (tree, store) = store().await;

            store.create_user(&user()).await.unwrap();
            store.create_user(&user()).await.unwrap();

            assert_eq!(tree.get("users/user-1"), json!(""));
            assert_eq!(tree.requests_with(HttpMethod::PUT).len(), 1);
            let reads = tree.requests_with(HttpMethod::GET);
            assert_eq!(reads.len(), 2);
            assert!(reads
                .iter()
                .all(|read| read.query.get("shallow").map(String::as_str) == Some("true")));
        }

        #[tokio::test]
        async fn test_create_plate_returns_generated_name() {
            let (tree, store) = store().await;
            let id = PlateId::parse("abc", "1234").unwrap();

            let key = store.create_plate(&id).await.unwrap();

            assert_eq!(key.as_str(), "-Fake000001");
            let created = tree.get(&format!("plates/{key}"));
            assert_eq!(created["prefix"], json!("ABC"));
            assert_eq!(created["reputation"], json!(500.0));
        }

        #[tokio::test]
        async fn test_report_writes_send_server_values() {
            let (tree, store) = store().await;
            seed_plate(&tree, "k1", "ABC", 500.0);
            let key = PlateKey::parse("k1").unwrap();

            store
                .increment_reputation(&key, ReportDirection::Downvote)
                .await
                .unwrap();
            store
                .log_report(&key, &user(), ReportDirection::Downvote)
                .await
                .unwrap();

            let puts = tree.requests_with(HttpMethod::PUT);
            assert_eq!(puts[0].path, "plates/k1/reputation");
            assert_eq!(puts[0].body, json!({".sv": {"increment": -1}}));
            assert_eq!(puts[1].path, "users/user-1/downvoted_plates/k1/timestamp");
            assert_eq!(puts[1].body, json!({".sv": "timestamp"}));

            assert_eq!(tree.get("plates/k1/reputation"), json!(499.0));
            assert_eq!(
                tree.get("users/user-1/downvoted_plates/k1/timestamp"),
                json!(NOW_MS)
            );
        }

        #[tokio::test]
        async fn test_increment_on_missing_plate_writes_nothing() {
            let (tree, store) = store().await;
            let key = PlateKey::parse("gone").unwrap();

            let result = store
                .increment_reputation(&key, ReportDirection::Upvote)
                .await;

            assert!(matches!(result, Err(ReputationError::PlateNotFound(_))));
            assert!(tree.requests_with(HttpMethod::PUT).is_empty());
            assert_eq!(tree.get("plates"), Value::Null);
        }

        #[tokio::test]
        async fn test_lookup_by_keys_omits_missing() {
            let (tree, store) = store().await;
            seed_plate(&tree, "k1", "ABC", 500.0);
            seed_plate(&tree, "k2", "XYZ", 12.0);
            let keys = ["k1", "missing", "k2"].map(|key| PlateKey::parse(key).unwrap());

            let found = store.lookup_plates_by_keys(&keys).await.unwrap();

            let prefixes: Vec<_> = found.iter().map(|(_, plate)| plate.prefix.as_str()).collect();
            assert_eq!(prefixes, ["ABC", "XYZ"]);
            assert_eq!(tree.requests_with(HttpMethod::GET).len(), 3);
        }

        #[tokio::test]
        async fn test_watch_rereads_path_on_each_event() {
            let (tree, store) = store().await;
            seed_plate(&tree, "k1", "ABC", 500.0);

            let (mut rx, handle) = store.watch_plates().await.unwrap().into_parts();
            assert_eq!(next(&mut rx).await.len(), 1);

            store
                .create_plate(&PlateId::parse("XYZ", "9").unwrap())
                .await
                .unwrap();
            let snapshot = next(&mut rx).await;
            assert_eq!(snapshot.len(), 2);
            assert!(snapshot.find(&PlateId::parse("XYZ", "9").unwrap()).is_some());

            handle.cancel();
            assert!(rx.recv().await.is_none());
        }

        #[tokio::test]
        async fn test_watch_reports_decodes_timestamps() {
            let (tree, store) = store().await;
            seed_plate(&tree, "k1", "ABC", 500.0);

            let (mut rx, _handle) = store
                .watch_reports(&user(), ReportDirection::Upvote)
                .await
                .unwrap()
                .into_parts();
            assert!(next(&mut rx).await.is_empty());

            let key = PlateKey::parse("k1").unwrap();
            store.log_report(&key, &user(), ReportDirection::Upvote).await.unwrap();
            assert_eq!(next(&mut rx).await[&key], NOW_MS);
        }

        #[tokio::test]
        async fn test_auth_token_sent_as_query() {
            let (tree, store) = store_with(|config| config.with_auth_token("secret")).await;

            store.create_user(&user()).await.unwrap();

            let requests = tree.requests();
            assert!(!requests.is_empty());
            assert!(requests
                .iter()
                .all(|request| request.query.get("auth").map(String::as_str) == Some("secret")));
        }

        #[tokio::test]
        async fn test_status_errors_map_to_kinds() {
            let (tree, store) = store().await;

            tree.fail_next(StatusCode::SERVICE_UNAVAILABLE);
            let unavailable = store.create_user(&user()).await.unwrap_err();
            assert_eq!(unavailable.kind(), ErrorKind::NetworkFailure);
            assert!(unavailable.is_transient());

            tree.fail_next(StatusCode::UNAUTHORIZED);
            let denied = store.create_user(&user()).await.unwrap_err();
            assert_eq!(denied.kind(), ErrorKind::Unauthenticated);
            assert!(!denied.is_transient());

            tree.fail_next(StatusCode::BAD_REQUEST);
            let rejected = store.create_user(&user()).await.unwrap_err();
            assert_eq!(rejected.kind(), ErrorKind::Internal);
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_failure() {
        let mut config = RestStoreConfig::new("http://127.0.0.1:9");
        config.request_timeout = Duration::from_millis(500);
        let store = RestTreeStore::new(config);

        let err = store
            .create_user(&UserId::parse("user-1").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
