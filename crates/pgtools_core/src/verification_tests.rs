//! End-to-end checks of the dump and restore paths against an in-memory server.
//!
//! The fake server keeps just enough state to replay archives: databases,
//! tables with row counts, and a log of connections and statements.

#[cfg(test)]
mod tests {
    use crate::archive::{resolve_archive_name, ArchivePath};
    use crate::error::PgToolsError;
    use crate::models::{
        ColumnDescriptor, ConstraintStatement, DatabaseDescriptor, RoleDescriptor,
        SequenceDescriptor, SessionAttribute, TableRef, SESSION_ATTRIBUTE_NAMES,
    };
    use crate::quote::unquote_identifier;
    use crate::services::catalog::{CatalogSource, RowSink};
    use crate::services::connection::Connector;
    use crate::services::dump::{write_archive, DumpRequest, DumpTarget, DumpWriter};
    use crate::services::restore::{
        restore_archives, run_statements, RestoreOptions, StatementReader, StatementTarget,
    };

    use async_trait::async_trait;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    // =========================================================================
    // Fake server
    // =========================================================================

    #[derive(Clone)]
    struct FakeTable {
        table: TableRef,
        columns: Vec<ColumnDescriptor>,
        rows: u64,
    }

    #[derive(Clone, Default)]
    struct FakeDatabase {
        owner: String,
        tables: Vec<FakeTable>,
        sequences: Vec<SequenceDescriptor>,
    }

    #[derive(Default)]
    struct FakeServer {
        databases: BTreeMap<String, FakeDatabase>,
        roles: Vec<RoleDescriptor>,
        superuser: bool,
        open: usize,
        max_open: usize,
        events: Vec<String>,
        fail_statement: Option<String>,
        fail_columns_of: Option<String>,
        rows_seen: Option<Arc<AtomicU64>>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        server: Arc<Mutex<FakeServer>>,
    }

    struct FakeSession {
        server: Arc<Mutex<FakeServer>>,
        database: String,
    }

    impl FakeConnector {
        fn with_databases(names: &[&str]) -> Self {
            let connector = Self::default();
            {
                let mut server = connector.server.lock().unwrap();
                server.superuser = true;
                for name in names {
                    server.databases.insert(
                        name.to_string(),
                        FakeDatabase { owner: "postgres".into(), ..Default::default() },
                    );
                }
            }
            connector
        }

        fn add_table(&self, db: &str, name: &str, rows: u64) {
            let mut server = self.server.lock().unwrap();
            let database = server.databases.get_mut(db).unwrap();
            database.tables.push(FakeTable {
                table: TableRef::new("public", name),
                columns: vec![
                    column("id", "integer", false),
                    column("name", "text", true),
                ],
                rows,
            });
        }

        fn events(&self) -> Vec<String> {
            self.server.lock().unwrap().events.clone()
        }

        fn max_open(&self) -> usize {
            self.server.lock().unwrap().max_open
        }

        fn row_count(&self, db: &str, table: &str) -> Option<u64> {
            let server = self.server.lock().unwrap();
            server
                .databases
                .get(db)?
                .tables
                .iter()
                .find(|t| t.table.name == table)
                .map(|t| t.rows)
        }
    }

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Session = FakeSession;

        async fn connect(&self, database: &str) -> Result<FakeSession, PgToolsError> {
            let mut server = self.server.lock().unwrap();
            if !server.databases.contains_key(database) {
                return Err(PgToolsError::connection(format!(
                    "database \"{database}\" does not exist"
                )));
            }
            server.open += 1;
            server.max_open = server.max_open.max(server.open);
            server.events.push(format!("connect {database}"));
            Ok(FakeSession { server: Arc::clone(&self.server), database: database.to_string() })
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            let mut server = self.server.lock().unwrap();
            server.open -= 1;
            server.events.push(format!("close {}", self.database));
        }
    }

    impl FakeSession {
        fn database(&self) -> FakeDatabase {
            self.server.lock().unwrap().databases.get(&self.database).cloned().unwrap_or_default()
        }
    }

    /// Third word of a statement, unquoted: the object of `CREATE TABLE x`,
    /// `INSERT INTO x`, `CREATE DATABASE x`.
    fn object_name(sql: &str, index: usize) -> String {
        let word = sql.split_whitespace().nth(index).unwrap_or_default();
        unquote_identifier(word.trim_end_matches(['(', ';']))
    }

    #[async_trait]
    impl StatementTarget for FakeSession {
        async fn execute_statement(&self, sql: &str) -> Result<(), PgToolsError> {
            let mut server = self.server.lock().unwrap();
            server.events.push(format!("{}: {sql}", self.database));
            if server.fail_statement.as_deref().is_some_and(|f| sql.contains(f)) {
                return Err(PgToolsError::execution(sql, "simulated failure"));
            }

            let db = self.database.clone();
            if sql.starts_with("CREATE DATABASE ") {
                server.databases.insert(object_name(sql, 2), FakeDatabase::default());
            } else if sql.starts_with("DROP DATABASE IF EXISTS ") {
                let name = object_name(sql, 4);
                if name == db {
                    return Err(PgToolsError::execution(sql, "cannot drop the currently open database"));
                }
                server.databases.remove(&name);
            } else if sql.starts_with("CREATE TABLE ") {
                let name = object_name(sql, 2);
                if let Some(database) = server.databases.get_mut(&db) {
                    database.tables.push(FakeTable {
                        table: TableRef::new("public", name),
                        columns: Vec::new(),
                        rows: 0,
                    });
                }
            } else if sql.starts_with("INSERT INTO ") {
                let name = object_name(sql, 2);
                if let Some(table) = server
                    .databases
                    .get_mut(&db)
                    .and_then(|d| d.tables.iter_mut().find(|t| t.table.name == name))
                {
                    table.rows += 1;
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CatalogSource for FakeSession {
        async fn database_descriptor(&self, db_name: &str) -> Result<DatabaseDescriptor, PgToolsError> {
            Ok(DatabaseDescriptor {
                name: db_name.to_string(),
                encoding: "UTF8".into(),
                collate: Some("C".into()),
                ctype: Some("C".into()),
                template_name: None,
                tablespace: Some("pg_default".into()),
                owner: self.owner(db_name).await?,
            })
        }

        async fn session_attributes(&self) -> Result<Vec<SessionAttribute>, PgToolsError> {
            Ok(SESSION_ATTRIBUTE_NAMES
                .iter()
                .map(|name| SessionAttribute { name: name.to_string(), value: "0".into() })
                .collect())
        }

        async fn owner(&self, _db_name: &str) -> Result<String, PgToolsError> {
            Ok(self.database().owner)
        }

        async fn sequences(&self) -> Result<Vec<SequenceDescriptor>, PgToolsError> {
            Ok(self.database().sequences)
        }

        async fn tables(&self) -> Result<Vec<TableRef>, PgToolsError> {
            Ok(self.database().tables.into_iter().map(|t| t.table).collect())
        }

        async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>, PgToolsError> {
            if self.server.lock().unwrap().fail_columns_of.as_deref() == Some(table.name.as_str()) {
                return Err(PgToolsError::catalog_query("simulated catalog failure"));
            }
            Ok(self
                .database()
                .tables
                .into_iter()
                .find(|t| t.table == *table)
                .map(|t| t.columns)
                .unwrap_or_default())
        }

        async fn constraints(&self) -> Result<Vec<ConstraintStatement>, PgToolsError> {
            Ok(self
                .database()
                .tables
                .into_iter()
                .map(|t| ConstraintStatement::PrimaryKey {
                    name: format!("{}_pkey", t.table.name),
                    table: t.table,
                    columns: vec!["id".into()],
                })
                .collect())
        }

        async fn stream_rows(
            &self,
            table: &TableRef,
            _columns: &[ColumnDescriptor],
            on_row: RowSink<'_>,
        ) -> Result<u64, PgToolsError> {
            let rows = self
                .database()
                .tables
                .into_iter()
                .find(|t| t.table == *table)
                .map(|t| t.rows)
                .unwrap_or_default();
            let seen = self.server.lock().unwrap().rows_seen.clone();
            for i in 0..rows {
                if let Some(seen) = &seen {
                    // Every earlier row must already be in the sink.
                    assert_eq!(seen.load(Ordering::SeqCst), i);
                }
                on_row(vec![Some(i.to_string()), Some(format!("name {i}"))])?;
            }
            Ok(rows)
        }

        async fn is_superuser(&self) -> Result<bool, PgToolsError> {
            Ok(self.server.lock().unwrap().superuser)
        }

        async fn roles(&self) -> Result<Vec<RoleDescriptor>, PgToolsError> {
            Ok(self.server.lock().unwrap().roles.clone())
        }

        async fn database_names(&self) -> Result<Vec<String>, PgToolsError> {
            Ok(self.server.lock().unwrap().databases.keys().cloned().collect())
        }
    }

    /// Write sink that keeps no data, only counts INSERT statements.
    struct CountingSink {
        inserts: Arc<AtomicU64>,
        bytes: u64,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.starts_with(b"INSERT INTO") {
                self.inserts.fetch_add(1, Ordering::SeqCst);
            }
            self.bytes += buf.len() as u64;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lines(input: &[&str]) -> StatementReader<std::vec::IntoIter<String>> {
        StatementReader::new(input.iter().map(|l| l.to_string()).collect::<Vec<_>>().into_iter())
    }

    fn options(roles_only: bool) -> RestoreOptions {
        RestoreOptions { roles_only, role_ddl: true, maintenance_db: "postgres".into() }
    }

    fn shop_server() -> FakeConnector {
        let connector = FakeConnector::with_databases(&["postgres", "shop"]);
        connector.add_table("shop", "customers", 3);
        connector.add_table("shop", "orders", 0);
        connector
    }

    // =========================================================================
    // Archive naming
    // =========================================================================

    #[test]
    fn test_archive_naming_is_idempotent() {
        let inputs = [
            "", "x", "x.sql", "x.gz", "x.sql.gz", ".gz", ".sql", "a.gz.sql", "a.sql.sql.gz",
            "dir/backup.tar", "x.SQL", "x.sql.gz.gz",
        ];
        for input in inputs {
            let once = resolve_archive_name(input);
            assert_eq!(resolve_archive_name(&once), once, "input {input:?}");
            assert!(once.ends_with(".sql") || once.ends_with(".sql.gz"));
        }
    }

    // =========================================================================
    // Restore interpreter
    // =========================================================================

    #[tokio::test]
    async fn test_statement_lines_are_concatenated() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        let summary = run_statements(&connector, lines(&["SELECT 1,", "2;"]), &options(false), "mem")
            .await
            .unwrap();
        assert_eq!(summary.executed, 1);
        assert_eq!(
            connector.events(),
            vec!["connect postgres", "postgres: SELECT 1, 2;", "close postgres"]
        );
    }

    #[tokio::test]
    async fn test_reconnect_is_deferred_until_pending_statement_runs() {
        let connector = FakeConnector::with_databases(&["postgres", "dbB"]);
        let input = lines(&["SELECT 1", "\\c dbB", "FROM t;", "INSERT INTO t VALUES (1);"]);
        let summary = run_statements(&connector, input, &options(false), "mem").await.unwrap();

        assert_eq!(summary.executed, 2);
        assert_eq!(summary.reconnects, 1);
        assert_eq!(
            connector.events(),
            vec![
                "connect postgres",
                "postgres: SELECT 1 FROM t;",
                "close postgres",
                "connect dbB",
                "dbB: INSERT INTO t VALUES (1);",
                "close dbB",
            ]
        );
        assert_eq!(connector.max_open(), 1);
    }

    #[tokio::test]
    async fn test_roles_only_filter() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        let input = lines(&[
            "UPDATE foo SET x=1;",
            "INSERT INTO pg_authid SELECT * FROM pg_shadow;",
            "SELECT rolname FROM pg_roles;",
            "CREATE ROLE \"app\";",
        ]);
        let summary = run_statements(&connector, input, &options(true), "mem").await.unwrap();

        assert_eq!(summary.executed, 3);
        assert_eq!(summary.skipped, 1);
        assert!(!connector.events().iter().any(|e| e.contains("UPDATE foo")));
    }

    #[tokio::test]
    async fn test_roles_only_catalog_mentions_without_role_ddl() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        let input = lines(&["CREATE ROLE \"app\";", "SELECT rolname FROM pg_roles;"]);
        let strict = RestoreOptions { role_ddl: false, ..options(true) };
        let summary = run_statements(&connector, input, &strict, "mem").await.unwrap();

        assert_eq!(summary.executed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!connector.events().iter().any(|e| e.contains("CREATE ROLE")));
    }

    #[tokio::test]
    async fn test_roles_only_still_follows_reconnects() {
        let connector = FakeConnector::with_databases(&["postgres", "shop"]);
        let input = lines(&["\\c shop", "INSERT INTO t VALUES (1);", "SELECT * FROM pg_user;"]);
        run_statements(&connector, input, &options(true), "mem").await.unwrap();
        assert!(connector.events().contains(&"shop: SELECT * FROM pg_user;".to_string()));
    }

    #[tokio::test]
    async fn test_execution_failure_stops_restore() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        connector.server.lock().unwrap().fail_statement = Some("bad".into());
        let input = lines(&["SELECT 1;", "SELECT bad;", "SELECT 3;"]);
        let err = run_statements(&connector, input, &options(false), "mem").await.err().unwrap();

        assert_eq!(err.code(), 60);
        assert!(err.to_string().contains("SELECT bad;"));
        assert!(!connector.events().iter().any(|e| e.contains("SELECT 3;")));
    }

    #[tokio::test]
    async fn test_reconnect_to_missing_database_is_connection_failure() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        let err = run_statements(&connector, lines(&["\\c nowhere"]), &options(false), "mem")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PgToolsError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_failed_archive_prevents_later_archives() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.sql");
        let second = dir.path().join("second.sql");
        std::fs::write(&first, "SELECT 1;\nSELECT bad;\n").unwrap();
        std::fs::write(&second, "SELECT 2;\n").unwrap();

        let connector = FakeConnector::with_databases(&["postgres"]);
        connector.server.lock().unwrap().fail_statement = Some("bad".into());
        let paths = vec![first.display().to_string(), second.display().to_string()];
        let err = restore_archives(&connector, &paths, &options(false)).await.err().unwrap();

        assert_eq!(err.code(), 60);
        assert!(!connector.events().iter().any(|e| e.contains("SELECT 2;")));
    }

    #[tokio::test]
    async fn test_missing_archive_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::with_databases(&["postgres"]);
        let paths = vec![dir.path().join("absent.sql.gz").display().to_string()];
        let err = restore_archives(&connector, &paths, &options(false)).await.err().unwrap();

        assert!(matches!(err, PgToolsError::ArchiveOpen { .. }));
        assert!(connector.events().is_empty());
    }

    // =========================================================================
    // Dump writer
    // =========================================================================

    #[tokio::test]
    async fn test_rows_stream_one_at_a_time() {
        const ROWS: u64 = 100_000;
        let connector = FakeConnector::with_databases(&["big"]);
        connector.add_table("big", "events", ROWS);
        let inserts = Arc::new(AtomicU64::new(0));
        connector.server.lock().unwrap().rows_seen = Some(Arc::clone(&inserts));

        let mut sink = CountingSink { inserts: Arc::clone(&inserts), bytes: 0 };
        {
            let session = connector.connect("big").await.unwrap();
            let mut writer = DumpWriter::new(&mut sink, "memory");
            writer.write_database(&session, "big").await.unwrap();
            assert_eq!(writer.rows_written(), ROWS);
            assert_eq!(writer.tables_written(), 1);
        }
        assert_eq!(inserts.load(Ordering::SeqCst), ROWS);
        assert!(sink.bytes > 0);
    }

    #[tokio::test]
    async fn test_database_order_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::with_databases(&["alpha", "beta"]);
        let archive = dir.path().join("two");
        let request = DumpRequest {
            target: DumpTarget::Databases(vec!["beta".into(), "alpha".into()]),
            archive: archive.display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let summary = write_archive(&connector, &request).await.unwrap();

        assert!(summary.archive.ends_with("two.sql"));
        assert_eq!(summary.databases, vec!["beta", "alpha"]);
        let text = std::fs::read_to_string(dir.path().join("two.sql")).unwrap();
        let beta = text.find("-- Dump of database: beta").unwrap();
        let alpha = text.find("-- Dump of database: alpha").unwrap();
        assert!(beta < alpha);
        assert_eq!(connector.max_open(), 1);
    }

    #[tokio::test]
    async fn test_database_script_layout() {
        let connector = shop_server();
        connector.server.lock().unwrap().databases.get_mut("shop").unwrap().sequences =
            vec![SequenceDescriptor {
                schema: "public".into(),
                name: "customers_id_seq".into(),
                increment: 1,
                min_value: 1,
                max_value: i64::MAX,
                cache_size: 1,
                cycle: false,
                last_value: Some(3),
            }];
        let mut out = Vec::new();
        {
            let session = connector.connect("shop").await.unwrap();
            DumpWriter::new(&mut out, "memory").write_database(&session, "shop").await.unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let position = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("missing {needle}"));

        let order = [
            "-- Dump of database: shop",
            "-- Dump created with pgtools on ",
            "DROP DATABASE IF EXISTS \"shop\";",
            "CREATE DATABASE \"shop\" WITH TEMPLATE = \"template0\"",
            "\\c \"shop\"",
            "SET statement_timeout = 0;",
            "SET row_security = 0;",
            "ALTER DATABASE \"shop\" OWNER TO \"postgres\";",
            "CREATE SEQUENCE \"public\".\"customers_id_seq\"",
            "ALTER SEQUENCE \"public\".\"customers_id_seq\" OWNER TO \"postgres\";",
            "SELECT pg_catalog.setval(",
            "DROP TABLE IF EXISTS \"customers\";",
            "CREATE TABLE \"customers\" (",
            "INSERT INTO \"customers\" VALUES ('0', 'name 0');",
            "DROP TABLE IF EXISTS \"orders\";",
            "ALTER TABLE \"customers\" ADD CONSTRAINT \"customers_pkey\" PRIMARY KEY (\"id\");",
        ];
        let positions: Vec<usize> = order.iter().map(|n| position(n)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
        assert_eq!(SESSION_ATTRIBUTE_NAMES.len(), text.matches("\nSET ").count());
    }

    #[tokio::test]
    async fn test_data_only_dump_has_no_ddl() {
        let connector = shop_server();
        let mut out = Vec::new();
        {
            let session = connector.connect("shop").await.unwrap();
            DumpWriter::new(&mut out, "memory").write_database_data(&session, "shop").await.unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("BEGIN;").count(), 2);
        assert_eq!(text.matches("COMMIT;").count(), 2);
        assert_eq!(text.matches("INSERT INTO \"customers\"").count(), 3);
        assert!(!text.contains("CREATE TABLE"));
        assert!(!text.contains("DROP"));
        assert!(!text.contains("ADD CONSTRAINT"));
    }

    #[tokio::test]
    async fn test_roles_dump_requires_superuser_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::with_databases(&["postgres"]);
        connector.server.lock().unwrap().superuser = false;
        let request = DumpRequest {
            target: DumpTarget::Roles,
            archive: dir.path().join("roles").display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let err = write_archive(&connector, &request).await.err().unwrap();

        assert!(matches!(err, PgToolsError::PrivilegeRequired { .. }));
        assert!(!dir.path().join("roles.sql").exists());
    }

    #[tokio::test]
    async fn test_roles_dump_skips_system_roles() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::with_databases(&["postgres"]);
        let role = |name: &str, password: Option<&str>| RoleDescriptor {
            name: name.into(),
            superuser: false,
            inherit: true,
            create_role: false,
            create_db: false,
            login: true,
            replication: false,
            bypass_rls: false,
            password: password.map(str::to_string),
        };
        connector.server.lock().unwrap().roles = vec![
            role("app", Some("SCRAM-SHA-256$4096:salt$key:server")),
            role("pg_monitor", None),
            role("reporting", None),
        ];
        let request = DumpRequest {
            target: DumpTarget::Roles,
            archive: dir.path().join("roles.gz").display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let summary = write_archive(&connector, &request).await.unwrap();
        assert_eq!(summary.roles, 2);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(dir.path().join("roles.sql.gz")).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("-- Global roles and users"));
        assert!(!text.contains("pg_monitor"));
        assert!(text.contains("PASSWORD 'SCRAM-SHA-256$4096:salt$key:server'"));
        assert_eq!(text.matches("CREATE ROLE").count(), 2);
    }

    #[tokio::test]
    async fn test_failed_dump_keeps_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        let connector = shop_server();
        connector.server.lock().unwrap().fail_columns_of = Some("orders".into());
        let request = DumpRequest {
            target: DumpTarget::Databases(vec!["shop".into()]),
            archive: dir.path().join("partial.sql.gz").display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let err = write_archive(&connector, &request).await.err().unwrap();
        assert_eq!(err.code(), 30);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(dir.path().join("partial.sql.gz")).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("-- Dump of database: shop"));
        assert_eq!(text.matches("INSERT INTO \"customers\"").count(), 3);
        assert!(!text.contains("CREATE TABLE \"orders\""));
    }

    #[tokio::test]
    async fn test_empty_database_list_is_invalid_arguments() {
        let connector = FakeConnector::with_databases(&["postgres"]);
        let request = DumpRequest {
            target: DumpTarget::Databases(Vec::new()),
            archive: "unused".into(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let err = write_archive(&connector, &request).await.err().unwrap();
        assert_eq!(err.code(), 80);
        assert!(connector.events().is_empty());
    }

    // =========================================================================
    // Backup then restore
    // =========================================================================

    #[tokio::test]
    async fn test_shop_backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = shop_server();
        let archive = dir.path().join("out.sql.gz");
        let request = DumpRequest {
            target: DumpTarget::Databases(vec!["shop".into()]),
            archive: archive.display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let summary = write_archive(&source, &request).await.unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.tables, 2);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&archive).unwrap()).read_to_string(&mut text).unwrap();
        assert!(text.starts_with("-- "));
        assert_eq!(text.matches("CREATE TABLE \"customers\"").count(), 1);
        assert_eq!(text.matches("INSERT INTO \"customers\"").count(), 3);
        assert_eq!(text.matches("CREATE TABLE \"orders\"").count(), 1);
        assert_eq!(text.matches("INSERT INTO \"orders\"").count(), 0);

        let target = FakeConnector::with_databases(&["postgres"]);
        let summaries = restore_archives(
            &target,
            &[ArchivePath::for_restore(&archive).display()],
            &options(false),
        )
        .await
        .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].reconnects, 1);
        assert_eq!(target.row_count("shop", "customers"), Some(3));
        assert_eq!(target.row_count("shop", "orders"), Some(0));
        assert_eq!(target.max_open(), 1);
    }

    #[tokio::test]
    async fn test_all_databases_round_trip_skips_maintenance_database() {
        let dir = tempfile::tempdir().unwrap();
        let source = shop_server();
        let archive = dir.path().join("everything.sql");
        let request = DumpRequest {
            target: DumpTarget::AllDatabases,
            archive: archive.display().to_string(),
            data_only: false,
            maintenance_db: "postgres".into(),
        };
        let summary = write_archive(&source, &request).await.unwrap();
        assert_eq!(summary.databases, vec!["shop".to_string()]);

        let text = std::fs::read_to_string(&archive).unwrap();
        assert!(!text.contains("DROP DATABASE IF EXISTS \"postgres\""));
        assert!(text.contains("DROP DATABASE IF EXISTS \"shop\""));

        let target = FakeConnector::with_databases(&["postgres"]);
        let summaries = restore_archives(&target, &[archive.display().to_string()], &options(false))
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(target.row_count("shop", "customers"), Some(3));
        assert!(target.events().iter().all(|e| !e.contains("DROP DATABASE IF EXISTS \"postgres\"")));
    }

    #[tokio::test]
    async fn test_dropping_the_open_database_fails_restore() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("self.sql");
        std::fs::write(&archive, "DROP DATABASE IF EXISTS \"postgres\";\n").unwrap();

        let target = FakeConnector::with_databases(&["postgres"]);
        let err = restore_archives(&target, &[archive.display().to_string()], &options(false))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), 60);
    }
}
