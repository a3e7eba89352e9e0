//! The seam between the connector and whatever executes SQL.

use chrono::NaiveDateTime;

use crate::{models::RawRow, DataParcResult};

/// A bound parameter for a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// `nvarchar` text.
    Text(String),
    /// `datetime2` in site-local time.
    Time(NaiveDateTime),
    /// `int`.
    Int(i32),
}

/// Parameterized SQL using `@P1..@Pn` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: &'static str,
    params: Vec<Param>,
}

impl Statement {
    /// Pairs `sql` with its positional parameters.
    pub fn new(sql: &'static str, params: Vec<Param>) -> Self {
        Self { sql, params }
    }
    /// SQL text.
    pub fn sql(&self) -> &'static str {
        self.sql
    }
    /// Parameters in placeholder order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Something that can run PARCdata statements.
///
/// [`crate::SqlServer`] is the production implementation.
pub trait Backend: Send {
    /// Runs `statement` and returns its rows.
    fn query(&mut self, statement: &Statement) -> DataParcResult<Vec<RawRow>>;

    /// Round-trips a trivial query, opening a session if needed.
    fn ping(&mut self) -> DataParcResult<()>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn query(&mut self, statement: &Statement) -> DataParcResult<Vec<RawRow>> {
        (**self).query(statement)
    }

    fn ping(&mut self) -> DataParcResult<()> {
        (**self).ping()
    }
}
