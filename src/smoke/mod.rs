//! End-to-end smoke test
//!
//! Drives process control, the data backend and the dispatcher against a
//! scratch database. The query steps go through an in-process dispatcher and
//! then through the real accept loop on a loopback port; bulk insert and
//! count timings are reported alongside.

mod endpoint;
mod report;

pub use report::{SmokeReport, StepResult};

use futures::future::join_all;
use hyper::StatusCode;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::DataBackend;
use crate::config::Config;
use crate::control::ProcessControl;
use crate::dispatch::{Dispatcher, QueryResponse, Resolver};
use crate::logger;

/// Bundled migration applied to the smoke database
pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const CONNECTION_CHECK: &str = "SELECT json_build_object('version', version())";
const TABLES_CHECK: &str = "SELECT string_agg(table_name, ',' ORDER BY table_name) \
     FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_name IN ('posts', 'users')";
const SAMPLE_DATA_CHECK: &str = "SELECT count(*) FROM users";
const SAMPLE_USERS: &str = "2";

const USERS_REQUEST: &str = "{ users { id name email } }";
const POSTS_REQUEST: &str = "{ posts { id title author { name } } }";

const BULK_ROWS: u64 = 100;
const BULK_INSERT_SQL: &str = "DO $$ \
     DECLARE i INTEGER; \
     BEGIN \
         FOR i IN 1..100 LOOP \
             INSERT INTO posts (title, content, author_id, published) \
             VALUES ('Performance Test ' || i, 'Content for test post ' || i, 1, true); \
         END LOOP; \
     END $$";
const POST_COUNT_SQL: &str = "SELECT count(*) FROM posts";

const READINESS: &str = "Service readiness";
const CONNECTION: &str = "Basic connection";
const CREATION: &str = "Database creation";
const MIGRATION: &str = "Database migration";
const VERIFICATION: &str = "Migration verification";
const SAMPLE_DATA: &str = "Sample data";
const USERS_QUERY: &str = "Users query";
const POSTS_QUERY: &str = "Posts query";
const HTTP_ENDPOINT: &str = "HTTP endpoint";
const CONCURRENCY: &str = "Concurrent connections";
const BULK_INSERT: &str = "Bulk insert";
const QUERY_PERFORMANCE: &str = "Query performance";
const CLEANUP: &str = "Cleanup";

/// Steps that need the scratch database
const DATABASE_STEPS: [&str; 9] = [
    MIGRATION,
    VERIFICATION,
    SAMPLE_DATA,
    USERS_QUERY,
    POSTS_QUERY,
    HTTP_ENDPOINT,
    CONCURRENCY,
    BULK_INSERT,
    QUERY_PERFORMANCE,
];

pub struct SmokeTest<'a> {
    config: &'a Config,
    control: &'a dyn ProcessControl,
    backend: Arc<dyn DataBackend>,
}

impl<'a> SmokeTest<'a> {
    pub fn new(
        config: &'a Config,
        control: &'a dyn ProcessControl,
        backend: Arc<dyn DataBackend>,
    ) -> Self {
        Self {
            config,
            control,
            backend,
        }
    }

    fn database(&self) -> &str {
        &self.config.smoke.database
    }

    /// Dispatcher over the smoke database with the built-in keyword table.
    /// The scratch database only holds the bundled schema, so configured
    /// `[[resolvers]]` tables are not used here.
    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            &self.config.endpoint.path,
            self.database(),
            self.config.endpoint.max_body_size,
            Resolver::default(),
            Arc::clone(&self.backend),
        )
    }

    pub async fn run(&self) -> SmokeReport {
        let mut report = SmokeReport::default();
        logger::log_info(&format!(
            "Query gateway smoke test (database: {}, backend: {})",
            self.database(),
            self.backend.name()
        ));

        let readiness = self.readiness().await;
        let ready = readiness.success;
        report.record(readiness);
        if !ready {
            let mut rest = vec![CONNECTION, CREATION];
            rest.extend(DATABASE_STEPS);
            rest.push(CLEANUP);
            report.skip_all(&rest, "service not ready");
            return report;
        }

        report.record(self.connection().await);

        let creation = self.create_database().await;
        let created = creation.success;
        report.record(creation);
        if created {
            report.record(self.migrate().await);
            report.record(self.verify_tables().await);
            report.record(self.verify_sample_data().await);
            report.record(self.dispatch(USERS_QUERY, USERS_REQUEST).await);
            report.record(self.dispatch(POSTS_QUERY, POSTS_REQUEST).await);
            report.record(self.http_endpoint().await);
            report.record(self.concurrent_connections().await);
            report.record(self.bulk_insert().await);
            report.record(self.query_performance().await);
        } else {
            report.skip_all(&DATABASE_STEPS, "database not created");
        }

        report.record(self.cleanup().await);
        report
    }

    async fn readiness(&self) -> StepResult {
        match self.control.is_ready().await {
            Ok(true) => StepResult::pass(READINESS, "accepting connections"),
            Ok(false) => StepResult::fail(
                READINESS,
                "not accepting connections",
                "start it with `query_gateway start`",
            ),
            Err(e) => StepResult::fail(READINESS, "readiness check failed", e.to_string()),
        }
    }

    async fn connection(&self) -> StepResult {
        let store = &self.config.database.maintenance_db;
        match self.backend.execute(CONNECTION_CHECK, store).await {
            Ok(value) => match value.get("version").and_then(Value::as_str) {
                Some(version) => {
                    let short: Vec<&str> = version.split_whitespace().take(2).collect();
                    StepResult::pass(CONNECTION, format!("connected to {}", short.join(" ")))
                }
                None => StepResult::fail(CONNECTION, "unexpected result", value.to_string()),
            },
            Err(e) => StepResult::fail(CONNECTION, format!("cannot connect to '{store}'"), e.to_string()),
        }
    }

    async fn create_database(&self) -> StepResult {
        let name = self.database();
        if let Err(e) = self.control.drop_database(name).await {
            return StepResult::fail(CREATION, "failed to drop stale database", e.to_string());
        }
        match self.control.create_database(name).await {
            Ok(()) => StepResult::pass(CREATION, format!("created '{name}'")),
            Err(e) => StepResult::fail(CREATION, "failed to create database", e.to_string()),
        }
    }

    async fn migrate(&self) -> StepResult {
        let file = tempfile::Builder::new()
            .prefix("query_gateway_schema")
            .suffix(".sql")
            .tempfile()
            .and_then(|mut file| {
                file.write_all(SCHEMA_SQL.as_bytes())?;
                file.flush()?;
                Ok(file)
            });
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                return StepResult::fail(MIGRATION, "cannot write migration file", e.to_string())
            }
        };

        match self.control.run_file(self.database(), file.path()).await {
            Ok(()) => StepResult::pass(MIGRATION, "schema applied"),
            Err(e) => StepResult::fail(MIGRATION, "migration failed", e.to_string()),
        }
    }

    async fn verify_tables(&self) -> StepResult {
        match self.control.run_statement(self.database(), TABLES_CHECK).await {
            Ok(tables) if tables == "posts,users" => {
                StepResult::pass(VERIFICATION, "users and posts tables exist")
            }
            Ok(tables) => StepResult::fail(VERIFICATION, "tables missing", format!("found: {tables}")),
            Err(e) => StepResult::fail(VERIFICATION, "cannot list tables", e.to_string()),
        }
    }

    async fn verify_sample_data(&self) -> StepResult {
        match self.control.run_statement(self.database(), SAMPLE_DATA_CHECK).await {
            Ok(count) if count == SAMPLE_USERS => {
                StepResult::pass(SAMPLE_DATA, format!("{count} users present"))
            }
            Ok(count) => StepResult::fail(
                SAMPLE_DATA,
                "unexpected user count",
                format!("expected {SAMPLE_USERS}, found {count}"),
            ),
            Err(e) => StepResult::fail(SAMPLE_DATA, "cannot count users", e.to_string()),
        }
    }

    /// Run a query through an in-process dispatcher targeting the smoke database
    async fn dispatch(&self, name: &str, query: &str) -> StepResult {
        let (response, outcome) = self.dispatcher().execute_query(query).await;
        match response {
            QueryResponse::Data { ref data } => {
                let count = outcome
                    .operation
                    .as_deref()
                    .and_then(|field| data.get(field))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                StepResult::pass(name, format!("returned {count} record(s)"))
            }
            QueryResponse::Errors { .. } => StepResult::fail(
                name,
                "query returned errors",
                serde_json::to_string(&response).unwrap_or_default(),
            ),
        }
    }

    /// Serve the dispatcher on a loopback port and POST both queries to it
    async fn http_endpoint(&self) -> StepResult {
        let queries = [(USERS_REQUEST, "users"), (POSTS_REQUEST, "posts")];
        let requests: Vec<&str> = queries.iter().map(|(query, _)| *query).collect();

        match endpoint::serve_and_query(self.config, self.dispatcher(), &requests).await {
            Ok((addr, replies)) => {
                let failures: Vec<String> = replies
                    .iter()
                    .zip(queries.iter().map(|(_, field)| *field))
                    .filter(|(reply, field)| {
                        reply.status != StatusCode::OK || !reply.body["data"][*field].is_array()
                    })
                    .map(|(reply, field)| format!("{field}: {} {}", reply.status, reply.body))
                    .collect();
                if failures.is_empty() {
                    StepResult::pass(
                        HTTP_ENDPOINT,
                        format!(
                            "users and posts served on http://{addr}{}",
                            self.config.endpoint.path
                        ),
                    )
                } else {
                    StepResult::fail(HTTP_ENDPOINT, "unexpected responses", failures.join("; "))
                }
            }
            Err(e) => StepResult::fail(HTTP_ENDPOINT, "endpoint request failed", e.to_string()),
        }
    }

    async fn concurrent_connections(&self) -> StepResult {
        let count = self.config.smoke.concurrency.max(1);
        let backend = self.backend.as_ref();
        let store = self.database();
        let started = Instant::now();

        let calls = (0..count).map(|worker| async move {
            let sql = format!("SELECT json_build_object('worker', {worker})");
            backend.execute(&sql, store).await
        });
        let results = join_all(calls).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(Result::err)
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            StepResult::pass(
                CONCURRENCY,
                format!(
                    "{count} simultaneous connections in {} ms",
                    started.elapsed().as_millis()
                ),
            )
        } else {
            StepResult::fail(
                CONCURRENCY,
                format!("{}/{count} connections failed", failures.len()),
                failures.join("; "),
            )
        }
    }

    async fn bulk_insert(&self) -> StepResult {
        let started = Instant::now();
        match self.control.run_statement(self.database(), BULK_INSERT_SQL).await {
            Ok(_) => StepResult::pass(
                BULK_INSERT,
                format!(
                    "inserted {BULK_ROWS} posts in {:.2} s",
                    started.elapsed().as_secs_f64()
                ),
            ),
            Err(e) => StepResult::fail(BULK_INSERT, "bulk insert failed", e.to_string()),
        }
    }

    async fn query_performance(&self) -> StepResult {
        let started = Instant::now();
        let count = self.control.run_statement(self.database(), POST_COUNT_SQL).await;
        let elapsed = started.elapsed().as_secs_f64();
        match count {
            Ok(count) => match count.parse::<u64>() {
                Ok(posts) if posts >= BULK_ROWS => StepResult::pass(
                    QUERY_PERFORMANCE,
                    format!("counted {posts} posts in {elapsed:.3} s"),
                ),
                _ => StepResult::fail(
                    QUERY_PERFORMANCE,
                    "unexpected post count",
                    format!("expected at least {BULK_ROWS}, found {count}"),
                ),
            },
            Err(e) => StepResult::fail(QUERY_PERFORMANCE, "cannot count posts", e.to_string()),
        }
    }

    async fn cleanup(&self) -> StepResult {
        match self.control.drop_database(self.database()).await {
            Ok(()) => StepResult::pass(CLEANUP, format!("dropped '{}'", self.database())),
            Err(e) => StepResult::fail(CLEANUP, "failed to drop database", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::control::ControlError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeControl {
        ready: bool,
        fail_create: bool,
        calls: Mutex<Vec<String>>,
        statements: Mutex<Vec<String>>,
        migrated: Mutex<Option<String>>,
    }

    impl FakeControl {
        fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ProcessControl for FakeControl {
        async fn is_ready(&self) -> Result<bool, ControlError> {
            self.record("is_ready".to_string());
            Ok(self.ready)
        }
        async fn start_service(&self) -> Result<(), ControlError> {
            Ok(())
        }
        async fn stop_service(&self) -> Result<(), ControlError> {
            Ok(())
        }
        async fn create_database(&self, name: &str) -> Result<(), ControlError> {
            self.record(format!("create {name}"));
            if self.fail_create {
                return Err(ControlError::Failed {
                    command: format!("createdb {name}"),
                    status: Some(1),
                    stderr: "permission denied to create database".to_string(),
                });
            }
            Ok(())
        }
        async fn drop_database(&self, name: &str) -> Result<(), ControlError> {
            self.record(format!("drop {name}"));
            Ok(())
        }
        async fn run_file(&self, database: &str, path: &Path) -> Result<(), ControlError> {
            self.record(format!("run_file {database}"));
            *self.migrated.lock().unwrap() = Some(std::fs::read_to_string(path).unwrap());
            Ok(())
        }
        async fn run_statement(&self, _: &str, sql: &str) -> Result<String, ControlError> {
            self.statements.lock().unwrap().push(sql.to_string());
            if sql.contains("information_schema") {
                Ok("posts,users".to_string())
            } else if sql.starts_with("DO $$") {
                Ok("DO".to_string())
            } else if sql.contains("FROM posts") {
                Ok("102".to_string())
            } else {
                Ok("2".to_string())
            }
        }
        async fn list_databases(&self) -> Result<Vec<String>, ControlError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: AtomicUsize,
        fail_workers: bool,
    }

    #[async_trait]
    impl DataBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn execute(&self, query: &str, _store: &str) -> Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.contains("version()") {
                Ok(json!({"version": "PostgreSQL 16.2 on x86_64-pc-linux-gnu"}))
            } else if query.contains("worker") {
                if self.fail_workers {
                    Err(BackendError::Failed {
                        status: 2,
                        stderr: "too many connections".to_string(),
                    })
                } else {
                    Ok(json!({"worker": 0}))
                }
            } else if query.contains("FROM users") {
                Ok(json!([{"id": 1, "name": "Codegen Admin"}, {"id": 2, "name": "Developer User"}]))
            } else {
                Ok(Value::Null)
            }
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl DataBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn execute(&self, _: &str, _: &str) -> Result<Value, BackendError> {
            Err(BackendError::Failed {
                status: 2,
                stderr: "connection refused".to_string(),
            })
        }
    }

    fn config() -> Config {
        Config::load_from("nonexistent-config-file").unwrap()
    }

    fn names(report: &SmokeReport) -> Vec<(&str, &'static str)> {
        report
            .steps()
            .iter()
            .map(|s| (s.name.as_str(), s.label()))
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_passes() {
        let config = config();
        let control = FakeControl::ready();
        let backend = Arc::new(FakeBackend::default());
        let report = SmokeTest::new(&config, &control, backend.clone()).run().await;

        assert!(report.success(), "{:?}", report.steps());
        let steps = names(&report);
        assert_eq!(steps.len(), 13);
        assert_eq!(steps[8], (HTTP_ENDPOINT, "PASS"));
        assert_eq!(steps[10], (BULK_INSERT, "PASS"));
        assert_eq!(steps[11], (QUERY_PERFORMANCE, "PASS"));
        assert_eq!(steps[12], (CLEANUP, "PASS"));

        assert_eq!(report.steps()[1].message, "connected to PostgreSQL 16.2");
        assert_eq!(report.steps()[6].message, "returned 2 record(s)");
        // null result from the posts query is an empty list
        assert_eq!(report.steps()[7].message, "returned 0 record(s)");
        assert!(report.steps()[8]
            .message
            .starts_with("users and posts served on http://127.0.0.1:"));
        assert!(report.steps()[8].message.ends_with("/graphql"));
        assert!(report.steps()[10].message.starts_with("inserted 100 posts in "));
        assert!(report.steps()[11].message.starts_with("counted 102 posts in "));

        // 1 connection check + 2 dispatcher queries + 2 HTTP queries + 5 concurrent calls
        assert_eq!(backend.calls.load(Ordering::SeqCst), 10);

        let statements = control.statements.lock().unwrap().clone();
        assert_eq!(statements.len(), 4);
        assert!(statements[2].starts_with("DO $$"));
        assert!(statements[2].contains("FOR i IN 1..100 LOOP"));
        assert_eq!(statements[3], POST_COUNT_SQL);

        let db = "codegen_backend_test";
        assert_eq!(
            control.calls(),
            vec![
                "is_ready".to_string(),
                format!("drop {db}"),
                format!("create {db}"),
                format!("run_file {db}"),
                format!("drop {db}"),
            ]
        );
        let migrated = control.migrated.lock().unwrap().clone().unwrap();
        assert_eq!(migrated, SCHEMA_SQL);
    }

    #[tokio::test]
    async fn test_not_ready_skips_everything() {
        let config = config();
        let control = FakeControl::default();
        let backend = Arc::new(FakeBackend::default());
        let report = SmokeTest::new(&config, &control, backend.clone()).run().await;

        assert!(!report.success());
        let steps = names(&report);
        assert_eq!(steps[0], (READINESS, "FAIL"));
        assert!(steps[1..].iter().all(|(_, label)| *label == "SKIP"));
        assert_eq!(steps.len(), 13);
        assert_eq!(control.calls(), vec!["is_ready"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_creation_failure_skips_database_steps_but_cleans_up() {
        let config = config();
        let control = FakeControl {
            fail_create: true,
            ..FakeControl::ready()
        };
        let report = SmokeTest::new(&config, &control, Arc::new(FakeBackend::default()))
            .run()
            .await;

        let steps = names(&report);
        assert_eq!(steps[2], (CREATION, "FAIL"));
        assert!(report.steps()[2]
            .details
            .as_deref()
            .unwrap()
            .contains("permission denied"));
        for (name, label) in &steps[3..12] {
            assert_eq!(*label, "SKIP", "{name}");
        }
        assert_eq!(steps[12], (CLEANUP, "PASS"));
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_concurrency_failure() {
        let mut config = config();
        config.smoke.concurrency = 3;
        let control = FakeControl::ready();
        let backend = Arc::new(FakeBackend {
            fail_workers: true,
            ..FakeBackend::default()
        });
        let report = SmokeTest::new(&config, &control, backend).run().await;

        let step = report
            .steps()
            .iter()
            .find(|s| s.name == CONCURRENCY)
            .unwrap();
        assert!(!step.success);
        assert_eq!(step.message, "3/3 connections failed");
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_http_endpoint_reports_query_errors() {
        let config = config();
        let control = FakeControl::ready();
        let smoke = SmokeTest::new(&config, &control, Arc::new(FailingBackend));

        let step = smoke.http_endpoint().await;
        assert!(!step.success);
        assert_eq!(step.message, "unexpected responses");
        let details = step.details.unwrap();
        assert!(details.contains("users: 200 OK"), "{details}");
        assert!(details.contains("Database query failed"), "{details}");
    }

    #[tokio::test]
    async fn test_low_post_count_fails() {
        struct EmptyPosts(FakeControl);

        #[async_trait]
        impl ProcessControl for EmptyPosts {
            async fn is_ready(&self) -> Result<bool, ControlError> {
                self.0.is_ready().await
            }
            async fn start_service(&self) -> Result<(), ControlError> {
                Ok(())
            }
            async fn stop_service(&self) -> Result<(), ControlError> {
                Ok(())
            }
            async fn create_database(&self, name: &str) -> Result<(), ControlError> {
                self.0.create_database(name).await
            }
            async fn drop_database(&self, name: &str) -> Result<(), ControlError> {
                self.0.drop_database(name).await
            }
            async fn run_file(&self, database: &str, path: &Path) -> Result<(), ControlError> {
                self.0.run_file(database, path).await
            }
            async fn run_statement(&self, _: &str, _: &str) -> Result<String, ControlError> {
                Ok("2".to_string())
            }
            async fn list_databases(&self) -> Result<Vec<String>, ControlError> {
                Ok(Vec::new())
            }
        }

        let config = config();
        let control = EmptyPosts(FakeControl::ready());
        let smoke = SmokeTest::new(&config, &control, Arc::new(FakeBackend::default()));

        let step = smoke.query_performance().await;
        assert!(!step.success);
        assert_eq!(step.message, "unexpected post count");
        assert_eq!(step.details.as_deref(), Some("expected at least 100, found 2"));
    }

    #[tokio::test]
    async fn test_smoke_dispatcher_ignores_configured_resolvers() {
        let mut config = config();
        config.endpoint.path = "/query".to_string();
        config.resolvers = vec![crate::config::ResolverEntry::new(
            "orders",
            "orders",
            "SELECT json_agg(o) FROM orders o",
        )];
        let control = FakeControl::ready();
        let smoke = SmokeTest::new(&config, &control, Arc::new(FakeBackend::default()));

        let dispatcher = smoke.dispatcher();
        assert_eq!(dispatcher.endpoint(), "/query");
        assert_eq!(dispatcher.store(), "codegen_backend_test");

        let step = smoke.dispatch(USERS_QUERY, USERS_REQUEST).await;
        assert!(step.success, "{step:?}");
        assert_eq!(step.message, "returned 2 record(s)");
    }

    #[test]
    fn test_bundled_schema() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS users"));
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS posts"));
        assert_eq!(SCHEMA_SQL.matches("@codegen.com").count(), 2);
    }
}
