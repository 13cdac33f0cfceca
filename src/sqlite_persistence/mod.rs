mod table;

pub use table::{Column, ConflictAction, ForeignKey, ForeignKeyOnChange, SqlType, Table, Upsert};
