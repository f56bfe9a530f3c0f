//! Catalog descriptors produced by the extractor and the SQL they render to.
//!
//! Descriptors live only for the duration of one dump; each one knows how to
//! turn itself into the statements written to the archive.

use std::collections::BTreeMap;

use crate::quote::{escape_literal, quote_identifier, quote_qualified, render_value};

/// Session settings captured per database, in emission order.
///
/// The order is fixed so regenerated dumps stay diff-stable.
pub const SESSION_ATTRIBUTE_NAMES: [&str; 8] = [
    "statement_timeout",
    "lock_timeout",
    "idle_in_transaction_session_timeout",
    "client_encoding",
    "standard_conforming_strings",
    "xmloption",
    "client_min_messages",
    "row_security",
];

/// Schemas never dumped.
pub const SYSTEM_SCHEMAS: [&str; 3] = ["pg_catalog", "information_schema", "pg_toast"];

/// Database-level definition used to emit `CREATE DATABASE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescriptor {
    /// Database name.
    pub name: String,
    /// Server encoding name (e.g. `UTF8`).
    pub encoding: String,
    /// LC_COLLATE, if reported.
    pub collate: Option<String>,
    /// LC_CTYPE, if reported.
    pub ctype: Option<String>,
    /// Template name; only set when the database is itself a template.
    pub template_name: Option<String>,
    /// Tablespace name.
    pub tablespace: Option<String>,
    /// Owning role.
    pub owner: String,
}

impl DatabaseDescriptor {
    /// Render the `CREATE DATABASE` statement.
    pub fn create_statement(&self) -> String {
        let mut parts = vec![
            format!("CREATE DATABASE {}", quote_identifier(&self.name)),
            format!(
                "WITH TEMPLATE = {}",
                quote_identifier(self.template_name.as_deref().unwrap_or("template0"))
            ),
            format!("ENCODING = {}", escape_literal(Some(&self.encoding))),
        ];
        if let Some(collate) = &self.collate {
            parts.push(format!("LC_COLLATE = {}", escape_literal(Some(collate))));
        }
        if let Some(ctype) = &self.ctype {
            parts.push(format!("LC_CTYPE = {}", escape_literal(Some(ctype))));
        }
        if let Some(tablespace) = self.tablespace.as_deref().filter(|t| *t != "pg_default") {
            parts.push(format!("TABLESPACE = {}", quote_identifier(tablespace)));
        }
        format!("{};", parts.join(" "))
    }
}

/// One `SET name = value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAttribute {
    /// GUC name.
    pub name: String,
    /// Value as reported by `SHOW`.
    pub value: String,
}

impl SessionAttribute {
    /// Render the `SET` statement. Values containing letters are quoted.
    pub fn set_statement(&self) -> String {
        let value = if self.value.chars().any(|c| c.is_ascii_alphabetic()) {
            escape_literal(Some(&self.value))
        } else {
            self.value.clone()
        };
        format!("SET {} = {};", self.name, value)
    }
}

/// A user sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDescriptor {
    /// Schema name.
    pub schema: String,
    /// Sequence name.
    pub name: String,
    /// INCREMENT BY.
    pub increment: i64,
    /// Catalog minimum; non-positive values render as `NO MINVALUE`.
    pub min_value: i64,
    /// MAXVALUE.
    pub max_value: i64,
    /// CACHE.
    pub cache_size: i64,
    /// Whether the sequence wraps around.
    pub cycle: bool,
    /// Last value handed out, if the sequence was ever used.
    pub last_value: Option<i64>,
}

impl SequenceDescriptor {
    /// Qualified, quoted sequence name.
    pub fn qualified_name(&self) -> String {
        quote_qualified(&self.schema, &self.name)
    }

    /// Render `CREATE SEQUENCE` for this sequence.
    pub fn create_statement(&self) -> String {
        let min = if self.min_value > 0 {
            format!("MINVALUE {}", self.min_value)
        } else {
            "NO MINVALUE".to_string()
        };
        let mut lines = vec![
            format!("CREATE SEQUENCE {}", self.qualified_name()),
            format!("    INCREMENT BY {}", self.increment),
            format!("    {min}"),
            format!("    MAXVALUE {}", self.max_value),
        ];
        if let Some(last) = self.last_value {
            lines.push(format!("    START WITH {last}"));
        }
        if self.cycle {
            lines.push(format!("    CACHE {}", self.cache_size));
            lines.push("    CYCLE;".to_string());
        } else {
            lines.push(format!("    CACHE {};", self.cache_size));
        }
        lines.join("\n")
    }

    /// Render `ALTER SEQUENCE .. OWNER TO`.
    pub fn owner_statement(&self, owner: &str) -> String {
        format!("ALTER SEQUENCE {} OWNER TO {};", self.qualified_name(), quote_identifier(owner))
    }

    /// Render the `setval` call restoring the current value, if there is one.
    pub fn setval_statement(&self) -> Option<String> {
        self.last_value.map(|last| {
            format!(
                "SELECT pg_catalog.setval({}, {last}, true);",
                escape_literal(Some(&self.qualified_name()))
            )
        })
    }
}

/// A table to dump.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl TableRef {
    /// Create a table reference.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }

    /// Name as written in generated SQL: bare for `public`, qualified otherwise.
    pub fn sql_name(&self) -> String {
        if self.schema == "public" {
            quote_identifier(&self.name)
        } else {
            quote_qualified(&self.schema, &self.name)
        }
    }

    /// `DROP TABLE IF EXISTS` statement.
    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.sql_name())
    }

    /// `CREATE TABLE` statement for the given columns, one column per line.
    pub fn create_statement(&self, columns: &[ColumnDescriptor]) -> String {
        if columns.is_empty() {
            return format!("CREATE TABLE {} ();", self.sql_name());
        }
        let body: Vec<String> = columns.iter().map(ColumnDescriptor::definition).collect();
        format!("CREATE TABLE {} (\n    {}\n);", self.sql_name(), body.join(",\n    "))
    }

    /// One `INSERT` for one row, values in column ordinal order.
    pub fn insert_statement(&self, values: &[Option<String>]) -> String {
        if values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES;", self.sql_name());
        }
        let rendered: Vec<String> = values.iter().map(|v| render_value(v.as_deref())).collect();
        format!("INSERT INTO {} VALUES ({});", self.sql_name(), rendered.join(", "))
    }
}

/// A column, in catalog ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Formatted type (e.g. `character varying(40)`).
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression, if any.
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    fn definition(&self) -> String {
        let mut line = format!("{} {}", quote_identifier(&self.name), self.data_type);
        if let Some(default) = &self.default_value {
            line.push_str(" DEFAULT ");
            line.push_str(default);
        }
        if !self.nullable {
            line.push_str(" NOT NULL");
        }
        line
    }
}

/// A server-wide role from `pg_authid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDescriptor {
    /// Role name.
    pub name: String,
    /// rolsuper
    pub superuser: bool,
    /// rolinherit
    pub inherit: bool,
    /// rolcreaterole
    pub create_role: bool,
    /// rolcreatedb
    pub create_db: bool,
    /// rolcanlogin
    pub login: bool,
    /// rolreplication
    pub replication: bool,
    /// rolbypassrls
    pub bypass_rls: bool,
    /// Stored password hash, emitted verbatim.
    pub password: Option<String>,
}

impl RoleDescriptor {
    /// `CREATE ROLE` followed by one `ALTER ROLE .. WITH` carrying every attribute.
    pub fn statements(&self) -> [String; 2] {
        let flag = |on: bool, yes: &str, no: &str| if on { yes.to_string() } else { no.to_string() };
        let mut attrs = vec![
            flag(self.superuser, "SUPERUSER", "NOSUPERUSER"),
            flag(self.inherit, "INHERIT", "NOINHERIT"),
            flag(self.create_role, "CREATEROLE", "NOCREATEROLE"),
            flag(self.create_db, "CREATEDB", "NOCREATEDB"),
            flag(self.login, "LOGIN", "NOLOGIN"),
            flag(self.replication, "REPLICATION", "NOREPLICATION"),
            flag(self.bypass_rls, "BYPASSRLS", "NOBYPASSRLS"),
        ];
        if let Some(hash) = &self.password {
            attrs.push(format!("PASSWORD {}", escape_literal(Some(hash))));
        }
        let name = quote_identifier(&self.name);
        [format!("CREATE ROLE {name};"), format!("ALTER ROLE {name} WITH {};", attrs.join(" "))]
    }
}

/// One column of a primary key, as read from the catalog.
#[derive(Debug, Clone)]
pub struct PrimaryKeyColumn {
    /// Owning table.
    pub table: TableRef,
    /// Constraint name.
    pub constraint: String,
    /// Column name.
    pub column: String,
    /// Position of the column inside the key (1-based).
    pub position: i32,
}

/// Constraint DDL emitted after all table data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintStatement {
    /// `ALTER TABLE .. ADD CONSTRAINT .. PRIMARY KEY`.
    PrimaryKey {
        /// Owning table.
        table: TableRef,
        /// Constraint name.
        name: String,
        /// Key columns in key order.
        columns: Vec<String>,
    },
    /// `ALTER TABLE .. ADD CONSTRAINT .. FOREIGN KEY`, one per referencing column.
    ForeignKey {
        /// Referencing table.
        table: TableRef,
        /// Constraint name.
        name: String,
        /// Referencing column.
        column: String,
        /// Referenced table.
        foreign_table: TableRef,
        /// Referenced column.
        foreign_column: String,
    },
    /// Constraint whose body is not reconstructed; rendered as a comment.
    Unsupported {
        /// Owning table.
        table: TableRef,
        /// Constraint name.
        name: String,
        /// information_schema constraint type (e.g. `CHECK`).
        constraint_type: String,
    },
    /// `CREATE UNIQUE INDEX` for a unique, non-primary index.
    UniqueIndex {
        /// Indexed table.
        table: TableRef,
        /// Index name.
        name: String,
        /// Indexed columns in index order.
        columns: Vec<String>,
    },
}

impl ConstraintStatement {
    /// Render the statement (or placeholder comment).
    pub fn to_sql(&self) -> String {
        let column_list =
            |columns: &[String]| columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ");
        match self {
            Self::PrimaryKey { table, name, columns } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
                table.sql_name(),
                quote_identifier(name),
                column_list(columns)
            ),
            Self::ForeignKey { table, name, column, foreign_table, foreign_column } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({});",
                table.sql_name(),
                quote_identifier(name),
                quote_identifier(column),
                foreign_table.sql_name(),
                quote_identifier(foreign_column)
            ),
            Self::Unsupported { table, name, constraint_type } => format!(
                "-- Skipping unsupported constraint type: {constraint_type} {name} on {}.{}",
                table.schema, table.name
            ),
            Self::UniqueIndex { table, name, columns } => format!(
                "CREATE UNIQUE INDEX {} ON {} ({});",
                quote_identifier(name),
                table.sql_name(),
                column_list(columns)
            ),
        }
    }
}

/// Group per-column primary key rows into one statement per constraint.
///
/// Columns are joined in key order; constraints come out ordered by table,
/// then constraint name.
pub fn group_primary_keys(rows: Vec<PrimaryKeyColumn>) -> Vec<ConstraintStatement> {
    let mut grouped: BTreeMap<(TableRef, String), Vec<(i32, String)>> = BTreeMap::new();
    for row in rows {
        grouped.entry((row.table, row.constraint)).or_default().push((row.position, row.column));
    }
    grouped
        .into_iter()
        .map(|((table, name), mut columns)| {
            columns.sort_by_key(|(position, _)| *position);
            ConstraintStatement::PrimaryKey {
                table,
                name,
                columns: columns.into_iter().map(|(_, column)| column).collect(),
            }
        })
        .collect()
}
