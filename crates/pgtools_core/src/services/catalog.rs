//! Catalog extraction.
//!
//! Queries PostgreSQL system catalogs of one connected database and returns
//! the descriptors the dump writer renders. `CatalogSource` is the seam the
//! dump writer is written against; `PgSession` is the real implementation.

use async_trait::async_trait;

use crate::error::PgToolsError;
use crate::models::catalog::group_primary_keys;
use crate::models::{
    ColumnDescriptor, ConstraintStatement, DatabaseDescriptor, PrimaryKeyColumn, RoleDescriptor,
    SequenceDescriptor, SessionAttribute, TableRef, SESSION_ATTRIBUTE_NAMES, SYSTEM_SCHEMAS,
};
use crate::quote::quote_identifier;
use crate::services::connection::{column, PgSession};

/// Callback receiving one row of text values.
pub type RowSink<'a> = &'a mut (dyn FnMut(Vec<Option<String>>) -> Result<(), PgToolsError> + Send);

/// Read-only catalog access for one connected database.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Database-level definition, owner included.
    async fn database_descriptor(&self, db_name: &str) -> Result<DatabaseDescriptor, PgToolsError>;

    /// Every fixed session attribute, in fixed order. Fails as a whole.
    async fn session_attributes(&self) -> Result<Vec<SessionAttribute>, PgToolsError>;

    /// Owning role of `db_name`.
    async fn owner(&self, db_name: &str) -> Result<String, PgToolsError>;

    /// Sequences of the `public` schema.
    async fn sequences(&self) -> Result<Vec<SequenceDescriptor>, PgToolsError>;

    /// User tables, ordered by schema then name.
    async fn tables(&self) -> Result<Vec<TableRef>, PgToolsError>;

    /// Live columns of `table` in ordinal order.
    async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>, PgToolsError>;

    /// Constraint statements: primary keys, foreign keys, other constraints, unique indexes.
    async fn constraints(&self) -> Result<Vec<ConstraintStatement>, PgToolsError>;

    /// Stream every row of `table` to `on_row`, one row at a time.
    async fn stream_rows(
        &self,
        table: &TableRef,
        columns: &[ColumnDescriptor],
        on_row: RowSink<'_>,
    ) -> Result<u64, PgToolsError>;

    /// Whether the connected role is a superuser.
    async fn is_superuser(&self) -> Result<bool, PgToolsError>;

    /// Server-wide roles, system roles excluded.
    async fn roles(&self) -> Result<Vec<RoleDescriptor>, PgToolsError>;

    /// Names of all non-template databases, in name order.
    async fn database_names(&self) -> Result<Vec<String>, PgToolsError>;
}

/// `WHERE` conditions keeping ordinary tables outside system and temporary schemas.
///
/// `class` and `namespace` are the aliases of `pg_class` and `pg_namespace` in
/// the surrounding query.
pub fn user_table_filter(class: &str, namespace: &str) -> String {
    let excluded: Vec<String> = SYSTEM_SCHEMAS.iter().map(|s| format!("'{s}'")).collect();
    format!(
        "{class}.relkind = 'r' \
         AND {namespace}.nspname NOT IN ({}) \
         AND {namespace}.nspname NOT LIKE 'pg_temp_%' \
         AND {namespace}.nspname NOT LIKE 'pg_toast_temp_%'",
        excluded.join(", ")
    )
}

fn tables_sql() -> String {
    format!(
        r#"
        SELECT n.nspname::text AS schema, c.relname::text AS name
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE {}
        ORDER BY n.nspname, c.relname
        "#,
        user_table_filter("c", "n")
    )
}

fn primary_keys_sql() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema,
            t.relname::text AS table_name,
            con.conname::text AS constraint_name,
            a.attname::text AS column_name,
            k.pos::integer AS position
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, pos)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE con.contype = 'p'
          AND {}
        "#,
        user_table_filter("t", "n")
    )
}

fn foreign_keys_sql() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema,
            t.relname::text AS table_name,
            con.conname::text AS constraint_name,
            a.attname::text AS column_name,
            fn.nspname::text AS foreign_schema,
            ft.relname::text AS foreign_table,
            fa.attname::text AS foreign_column
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_class ft ON ft.oid = con.confrelid
        JOIN pg_catalog.pg_namespace fn ON fn.oid = ft.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, fattnum, pos)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        JOIN pg_catalog.pg_attribute fa ON fa.attrelid = ft.oid AND fa.attnum = k.fattnum
        WHERE con.contype = 'f'
          AND {}
        ORDER BY n.nspname, t.relname, con.conname, k.pos
        "#,
        user_table_filter("t", "n")
    )
}

fn other_constraints_sql() -> String {
    format!(
        r#"
        SELECT
            tc.table_schema::text AS schema,
            tc.table_name::text AS table_name,
            tc.constraint_name::text AS constraint_name,
            tc.constraint_type::text AS constraint_type
        FROM information_schema.table_constraints tc
        JOIN pg_catalog.pg_namespace n ON n.nspname = tc.table_schema
        JOIN pg_catalog.pg_class t ON t.relnamespace = n.oid AND t.relname = tc.table_name
        WHERE tc.constraint_type NOT IN ('PRIMARY KEY', 'FOREIGN KEY')
          AND {}
        ORDER BY tc.table_schema, tc.table_name, tc.constraint_name
        "#,
        user_table_filter("t", "n")
    )
}

fn unique_indexes_sql() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema,
            t.relname::text AS table_name,
            i.relname::text AS index_name,
            array_agg(a.attname::text ORDER BY array_position(ix.indkey::int2[], a.attnum)) AS column_names
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE ix.indisunique
          AND NOT ix.indisprimary
          AND {}
        GROUP BY n.nspname, t.relname, i.relname
        ORDER BY n.nspname, t.relname, i.relname
        "#,
        user_table_filter("t", "n")
    )
}

/// `SELECT` reading every column of `table` cast to text, in ordinal order.
pub fn row_query(table: &TableRef, columns: &[ColumnDescriptor]) -> String {
    if columns.is_empty() {
        return format!("SELECT FROM {}", table.sql_name());
    }
    let list: Vec<String> =
        columns.iter().map(|c| format!("{}::text", quote_identifier(&c.name))).collect();
    format!("SELECT {} FROM {}", list.join(", "), table.sql_name())
}

#[async_trait]
impl CatalogSource for PgSession {
    async fn database_descriptor(&self, db_name: &str) -> Result<DatabaseDescriptor, PgToolsError> {
        tracing::debug!(database = db_name, "Reading database definition");
        let row = self
            .query_one(
                r#"
                SELECT
                    pg_catalog.pg_encoding_to_char(d.encoding)::text AS encoding,
                    d.datcollate::text AS collate,
                    d.datctype::text AS ctype,
                    CASE WHEN d.datistemplate THEN d.datname::text END AS template_name,
                    t.spcname::text AS tablespace
                FROM pg_catalog.pg_database d
                LEFT JOIN pg_catalog.pg_tablespace t ON t.oid = d.dattablespace
                WHERE d.datname = $1
                "#,
                &[&db_name],
            )
            .await
            .map_err(|e| e.into_catalog("database definition"))?;

        let owner = self.owner(db_name).await?;
        Ok(DatabaseDescriptor {
            name: db_name.to_string(),
            encoding: column(&row, "encoding")?,
            collate: column(&row, "collate")?,
            ctype: column(&row, "ctype")?,
            template_name: column(&row, "template_name")?,
            tablespace: column(&row, "tablespace")?,
            owner,
        })
    }

    async fn session_attributes(&self) -> Result<Vec<SessionAttribute>, PgToolsError> {
        let mut attributes = Vec::with_capacity(SESSION_ATTRIBUTE_NAMES.len());
        for name in SESSION_ATTRIBUTE_NAMES {
            let row = self
                .query_one(&format!("SHOW {name}"), &[])
                .await
                .map_err(|e| e.into_catalog(&format!("SHOW {name}")))?;
            let value: String = row
                .try_get(0)
                .map_err(|e| PgToolsError::catalog_query(format!("SHOW {name}: {e}")))?;
            attributes.push(SessionAttribute { name: name.to_string(), value });
        }
        Ok(attributes)
    }

    async fn owner(&self, db_name: &str) -> Result<String, PgToolsError> {
        let row = self
            .query_one(
                "SELECT pg_catalog.pg_get_userbyid(datdba)::text AS owner \
                 FROM pg_catalog.pg_database WHERE datname = $1",
                &[&db_name],
            )
            .await
            .map_err(|e| e.retag(|message| PgToolsError::OwnershipLookup { message }))?;
        column(&row, "owner").map_err(|e| e.retag(|message| PgToolsError::OwnershipLookup { message }))
    }

    async fn sequences(&self) -> Result<Vec<SequenceDescriptor>, PgToolsError> {
        let to_sequence_error = |e: PgToolsError| e.retag(|message| PgToolsError::SequenceQuery { message });
        let rows = self
            .query(
                r#"
                SELECT
                    schemaname::text AS schema,
                    sequencename::text AS name,
                    increment_by,
                    min_value,
                    max_value,
                    cache_size,
                    cycle,
                    last_value
                FROM pg_catalog.pg_sequences
                WHERE schemaname = 'public'
                ORDER BY sequencename
                "#,
                &[],
            )
            .await
            .map_err(to_sequence_error)?;

        rows.iter()
            .map(|row| {
                Ok(SequenceDescriptor {
                    schema: column(row, "schema")?,
                    name: column(row, "name")?,
                    increment: column(row, "increment_by")?,
                    min_value: column(row, "min_value")?,
                    max_value: column(row, "max_value")?,
                    cache_size: column(row, "cache_size")?,
                    cycle: column(row, "cycle")?,
                    last_value: column(row, "last_value")?,
                })
            })
            .collect::<Result<Vec<_>, PgToolsError>>()
            .map_err(to_sequence_error)
    }

    async fn tables(&self) -> Result<Vec<TableRef>, PgToolsError> {
        let rows = self
            .query(&tables_sql(), &[])
            .await
            .map_err(|e| e.into_catalog("table list"))?;

        rows.iter()
            .map(|row| Ok(TableRef::new(column::<String>(row, "schema")?, column::<String>(row, "name")?)))
            .collect()
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>, PgToolsError> {
        let rows = self
            .query(
                r#"
                SELECT
                    a.attname::text AS name,
                    pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
                    NOT a.attnotnull AS is_nullable,
                    pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_value
                FROM pg_catalog.pg_attribute a
                JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE n.nspname = $1
                  AND c.relname = $2
                  AND a.attnum > 0
                  AND NOT a.attisdropped
                ORDER BY a.attnum
                "#,
                &[&table.schema, &table.name],
            )
            .await
            .map_err(|e| e.into_catalog(&format!("columns of {}.{}", table.schema, table.name)))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: column(row, "name")?,
                    data_type: column(row, "data_type")?,
                    nullable: column(row, "is_nullable")?,
                    default_value: column(row, "default_value")?,
                })
            })
            .collect()
    }

    async fn constraints(&self) -> Result<Vec<ConstraintStatement>, PgToolsError> {
        let mut statements = Vec::new();

        let rows = self
            .query(&primary_keys_sql(), &[])
            .await
            .map_err(|e| e.into_catalog("primary keys"))?;
        let pk_rows = rows
            .iter()
            .map(|row| {
                Ok(PrimaryKeyColumn {
                    table: TableRef::new(
                        column::<String>(row, "schema")?,
                        column::<String>(row, "table_name")?,
                    ),
                    constraint: column(row, "constraint_name")?,
                    column: column(row, "column_name")?,
                    position: column(row, "position")?,
                })
            })
            .collect::<Result<Vec<_>, PgToolsError>>()?;
        statements.extend(group_primary_keys(pk_rows));

        let rows = self
            .query(&foreign_keys_sql(), &[])
            .await
            .map_err(|e| e.into_catalog("foreign keys"))?;
        for row in &rows {
            statements.push(ConstraintStatement::ForeignKey {
                table: TableRef::new(column::<String>(row, "schema")?, column::<String>(row, "table_name")?),
                name: column(row, "constraint_name")?,
                column: column(row, "column_name")?,
                foreign_table: TableRef::new(
                    column::<String>(row, "foreign_schema")?,
                    column::<String>(row, "foreign_table")?,
                ),
                foreign_column: column(row, "foreign_column")?,
            });
        }

        let rows = self
            .query(&other_constraints_sql(), &[])
            .await
            .map_err(|e| e.into_catalog("table constraints"))?;
        for row in &rows {
            statements.push(ConstraintStatement::Unsupported {
                table: TableRef::new(column::<String>(row, "schema")?, column::<String>(row, "table_name")?),
                name: column(row, "constraint_name")?,
                constraint_type: column(row, "constraint_type")?,
            });
        }

        let rows = self
            .query(&unique_indexes_sql(), &[])
            .await
            .map_err(|e| e.into_catalog("unique indexes"))?;
        for row in &rows {
            statements.push(ConstraintStatement::UniqueIndex {
                table: TableRef::new(column::<String>(row, "schema")?, column::<String>(row, "table_name")?),
                name: column(row, "index_name")?,
                columns: column(row, "column_names")?,
            });
        }

        tracing::debug!(count = statements.len(), "Constraints collected");
        Ok(statements)
    }

    async fn stream_rows(
        &self,
        table: &TableRef,
        columns: &[ColumnDescriptor],
        on_row: RowSink<'_>,
    ) -> Result<u64, PgToolsError> {
        tracing::debug!(schema = %table.schema, table = %table.name, "Streaming rows");
        self.stream_text_rows(&row_query(table, columns), on_row).await
    }

    async fn is_superuser(&self) -> Result<bool, PgToolsError> {
        let row = self
            .query_one("SELECT rolsuper FROM pg_catalog.pg_roles WHERE rolname = current_user", &[])
            .await
            .map_err(|e| e.retag(|message| PgToolsError::RoleQuery { message }))?;
        column(&row, "rolsuper")
    }

    async fn roles(&self) -> Result<Vec<RoleDescriptor>, PgToolsError> {
        let to_role_error = |e: PgToolsError| e.retag(|message| PgToolsError::RoleQuery { message });
        let rows = self
            .query(
                r#"
                SELECT
                    rolname::text AS name,
                    rolsuper, rolinherit, rolcreaterole, rolcreatedb,
                    rolcanlogin, rolreplication, rolbypassrls,
                    rolpassword AS password
                FROM pg_catalog.pg_authid
                WHERE rolname !~ '^pg_'
                ORDER BY rolname
                "#,
                &[],
            )
            .await
            .map_err(to_role_error)?;

        rows.iter()
            .map(|row| {
                Ok(RoleDescriptor {
                    name: column(row, "name")?,
                    superuser: column(row, "rolsuper")?,
                    inherit: column(row, "rolinherit")?,
                    create_role: column(row, "rolcreaterole")?,
                    create_db: column(row, "rolcreatedb")?,
                    login: column(row, "rolcanlogin")?,
                    replication: column(row, "rolreplication")?,
                    bypass_rls: column(row, "rolbypassrls")?,
                    password: column(row, "password")?,
                })
            })
            .collect::<Result<Vec<_>, PgToolsError>>()
            .map_err(to_role_error)
    }

    async fn database_names(&self) -> Result<Vec<String>, PgToolsError> {
        let rows = self
            .query(
                "SELECT datname::text AS name FROM pg_catalog.pg_database \
                 WHERE NOT datistemplate AND datallowconn ORDER BY datname",
                &[],
            )
            .await
            .map_err(|e| e.into_catalog("database list"))?;
        rows.iter().map(|row| column(row, "name")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_query_casts_every_column() {
        let table = TableRef::new("public", "orders");
        let columns = vec![
            ColumnDescriptor {
                name: "id".into(),
                data_type: "integer".into(),
                nullable: false,
                default_value: None,
            },
            ColumnDescriptor {
                name: "Note".into(),
                data_type: "text".into(),
                nullable: true,
                default_value: None,
            },
        ];
        assert_eq!(
            row_query(&table, &columns),
            "SELECT \"id\"::text, \"Note\"::text FROM \"orders\""
        );
        assert_eq!(
            row_query(&TableRef::new("sales", "empty"), &[]),
            "SELECT FROM \"sales\".\"empty\""
        );
    }

    #[test]
    fn test_user_table_filter() {
        assert_eq!(
            user_table_filter("t", "n"),
            "t.relkind = 'r' AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
             AND n.nspname NOT LIKE 'pg_temp_%' AND n.nspname NOT LIKE 'pg_toast_temp_%'"
        );
    }

    #[test]
    fn test_constraint_queries_skip_non_tables_and_temp_schemas() {
        let filter = user_table_filter("t", "n");
        for sql in [primary_keys_sql(), foreign_keys_sql(), other_constraints_sql(), unique_indexes_sql()] {
            assert!(sql.contains(&filter), "missing table filter in {sql}");
        }
        assert!(tables_sql().contains(&user_table_filter("c", "n")));
        assert!(other_constraints_sql().contains("JOIN pg_catalog.pg_class t"));
    }
}
