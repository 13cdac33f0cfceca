use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

/// A reference to another table.
///
/// Foreign keys are never part of the initial `CREATE TABLE`: they are applied
/// later by [`Table::rebuild_with_foreign_keys`], once the loaded rows have
/// been checked.
pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

/// What an insert does when it hits an existing conflict key.
#[derive(Debug, PartialEq, Eq)]
pub enum ConflictAction {
    DoNothing,
    UpdateColumns(&'static [&'static str]),
}

pub struct Upsert {
    /// Columns written by the insert, in parameter order.
    pub columns: &'static [&'static str],
    pub conflict_key: &'static [&'static str],
    pub action: ConflictAction,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
    pub upsert: Option<Upsert>,
}

impl Table {
    fn create_sql(&self, table_name: &str, with_foreign_keys: bool) -> String {
        let mut create_sql = format!("CREATE TABLE IF NOT EXISTS {} (", table_name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if column.is_unique {
                create_sql.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
            if with_foreign_keys {
                if let Some(foreign_key) = column.foreign_key {
                    create_sql.push_str(&format!(
                        " REFERENCES {}({}) ON DELETE {}",
                        foreign_key.foreign_table,
                        foreign_key.foreign_column,
                        foreign_key.on_delete.as_sql()
                    ));
                }
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        create_sql
    }

    fn create_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    /// Creates the table, without foreign keys, if it does not exist yet.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(self.name, false), params![])?;
        self.create_indices(conn)
    }

    pub fn drop(&self, conn: &Connection) -> Result<()> {
        conn.execute(&format!("DROP TABLE IF EXISTS {};", self.name), params![])?;
        Ok(())
    }

    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            params![self.name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn has_foreign_keys(&self) -> bool {
        self.columns.iter().any(|c| c.foreign_key.is_some())
    }

    /// Renders the parameterized insert statement, including its conflict clause.
    pub fn upsert_sql(&self) -> Option<String> {
        let upsert = self.upsert.as_ref()?;
        let placeholders = (1..=upsert.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let action = match upsert.action {
            ConflictAction::DoNothing => "DO NOTHING".to_string(),
            ConflictAction::UpdateColumns(columns) => format!(
                "DO UPDATE SET {}",
                columns
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        Some(format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            self.name,
            upsert.columns.join(", "),
            placeholders,
            upsert.conflict_key.join(", "),
            action
        ))
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let name = row.get::<usize, String>(1)?;
                let sql_type = match row.get::<_, String>(2)?.as_str() {
                    "TEXT" => &SqlType::Text,
                    "INTEGER" => &SqlType::Integer,
                    "REAL" => &SqlType::Real,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            2,
                            "".to_string(),
                            Type::Text,
                        ))
                    }
                };

                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? > 0,
                    is_unique: false,
                    foreign_key: None,
                })
            })?
            .collect::<Result<_, _>>()?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual_column, expected_column) in actual_columns.iter().zip(self.columns.iter()) {
            if actual_column.name != expected_column.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    actual_column.name
                );
            }
            if actual_column.sql_type != expected_column.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected_column.name,
                    expected_column.sql_type,
                    actual_column.sql_type
                );
            }
            if actual_column.non_null != expected_column.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.non_null,
                    actual_column.non_null
                );
            }
            if actual_column.is_primary_key != expected_column.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.is_primary_key,
                    actual_column.is_primary_key
                );
            }
        }

        // Upserts name their conflict target, which must exist as a constraint
        let mut expected_uniques: Vec<Vec<String>> = self
            .unique_constraints
            .iter()
            .map(|columns| columns.iter().map(|c| c.to_string()).collect())
            .chain(
                self.columns
                    .iter()
                    .filter(|c| c.is_unique)
                    .map(|c| vec![c.name.to_string()]),
            )
            .collect();
        let mut actual_uniques = self.live_unique_constraints(conn)?;
        expected_uniques.sort();
        actual_uniques.sort();
        if actual_uniques != expected_uniques {
            bail!(
                "Table {} unique constraints mismatch: expected {:?}, got {:?}",
                self.name,
                expected_uniques,
                actual_uniques
            );
        }
        Ok(())
    }

    /// Column lists of the live table's UNIQUE constraints, primary key excluded.
    fn live_unique_constraints(&self, conn: &Connection) -> Result<Vec<Vec<String>>> {
        // PRAGMA index_list returns: seq, name, unique, origin, partial
        let mut list_stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let index_names: Vec<String> = list_stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .filter_map(|r| match r {
                Ok((name, unique, origin)) if unique == 1 && origin == "u" => Some(Ok(name)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_, _>>()?;

        let mut constraints = Vec::with_capacity(index_names.len());
        for index_name in index_names {
            // PRAGMA index_info returns: seqno, cid, name
            let mut info_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut columns: Vec<(i32, String)> = info_stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(2)?)))?
                .collect::<Result<_, _>>()?;
            columns.sort();
            constraints.push(columns.into_iter().map(|(_, name)| name).collect());
        }
        Ok(constraints)
    }

    /// Whether every declared foreign key is present on the live table.
    pub fn foreign_keys_applied(&self, conn: &Connection) -> Result<bool> {
        // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
        let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        let actual_fks: Vec<(String, String, String)> = fk_stmt
            .query_map([], |row| Ok((row.get(3)?, row.get(2)?, row.get(4)?)))?
            .collect::<Result<_, _>>()?;

        Ok(self.columns.iter().all(|column| match column.foreign_key {
            None => true,
            Some(expected) => actual_fks.iter().any(|(from, to_table, to_column)| {
                from == column.name
                    && to_table == expected.foreign_table
                    && to_column == expected.foreign_column
            }),
        }))
    }

    /// Recreates the table with its foreign keys, keeping every row.
    ///
    /// Must run with `PRAGMA foreign_keys` off, and should run inside a
    /// transaction so a failed `foreign_key_check` can roll it back.
    pub fn rebuild_with_foreign_keys(&self, conn: &Connection) -> Result<()> {
        let staging = format!("{}__with_fk", self.name);
        let columns = self
            .columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ");

        conn.execute(&format!("DROP TABLE IF EXISTS {};", staging), params![])?;
        conn.execute(&self.create_sql(&staging, true), params![])?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {};",
                staging, columns, columns, self.name
            ),
            params![],
        )?;
        conn.execute(&format!("DROP TABLE {};", self.name), params![])?;
        conn.execute(
            &format!("ALTER TABLE {} RENAME TO {};", staging, self.name),
            params![],
        )?;
        self.create_indices(conn)
    }
}
