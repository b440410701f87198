//! `SELECT` support for [`MemorySource`].
//!
//! ```text
//! SELECT * | column [, column ...] FROM table [WHERE expression] [;]
//! ```
//!
//! The `WHERE` grammar is the shared attribute-filter grammar.

use std::borrow::Cow;

use log::debug;
use pgeo_core_common::expr::{Parser, Token};
use pgeo_core_common::{
    ColumnDescriptor, ColumnResolver, Expr, ExprError, Operand, QueryResult, RawValue, Row,
    SourceError, SourceResult, VecCursor,
};

use crate::source::MemorySource;

#[derive(Debug, PartialEq)]
enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug)]
struct Select {
    projection: Projection,
    table: String,
    filter: Option<Expr>,
}

fn parse_select(sql: &str) -> Result<Select, ExprError> {
    let text = sql.trim().trim_end_matches(';');
    let mut parser = Parser::new(text)?;
    parser.expect_keyword("SELECT")?;

    let projection = if parser.consume(&Token::Star) {
        Projection::All
    } else {
        let mut columns = vec![parser.expect_identifier()?];
        while parser.consume(&Token::Comma) {
            columns.push(parser.expect_identifier()?);
        }
        Projection::Columns(columns)
    };

    parser.expect_keyword("FROM")?;
    let table = parser.expect_identifier()?;
    let filter = if parser.consume_keyword("WHERE") {
        Some(parser.parse_expr()?)
    } else {
        None
    };
    parser.expect_end()?;

    Ok(Select {
        projection,
        table,
        filter,
    })
}

/// Resolves expression columns against one row.
struct RowResolver<'a> {
    columns: &'a [ColumnDescriptor],
    row: &'a Row,
}

impl ColumnResolver for RowResolver<'_> {
    fn resolve(&self, column: &str) -> Option<Operand<'_>> {
        let index = column_index(self.columns, column)?;
        Some(match &self.row[index] {
            RawValue::Null => Operand::Null,
            RawValue::Integer(v) => Operand::Integer(*v),
            RawValue::Real(v) => Operand::Real(*v),
            RawValue::Text(s) => Operand::Text(Cow::Borrowed(s)),
            RawValue::Binary(_) => Operand::Binary,
        })
    }
}

fn column_index(columns: &[ColumnDescriptor], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
}

pub(crate) fn execute(source: &MemorySource, sql: &str) -> SourceResult<QueryResult> {
    let select = parse_select(sql).map_err(|err| SourceError::Query {
        sql: sql.to_string(),
        message: err.to_string(),
    })?;
    let table = source.table(&select.table)?;
    let missing = |column: &str| SourceError::NoSuchColumn {
        table: table.name().to_string(),
        column: column.to_string(),
    };

    if let Some(filter) = &select.filter {
        if let Some(column) = filter
            .columns()
            .into_iter()
            .find(|c| column_index(table.columns(), c).is_none())
        {
            return Err(missing(column));
        }
    }

    let indices: Vec<usize> = match &select.projection {
        Projection::All => (0..table.columns().len()).collect(),
        Projection::Columns(names) => names
            .iter()
            .map(|name| column_index(table.columns(), name).ok_or_else(|| missing(name.as_str())))
            .collect::<SourceResult<_>>()?,
    };
    let columns: Vec<ColumnDescriptor> = indices
        .iter()
        .map(|&i| table.columns()[i].clone())
        .collect();

    let rows: Vec<Row> = table
        .rows()
        .iter()
        .filter(|row| {
            select.filter.as_ref().is_none_or(|filter| {
                filter.matches(&RowResolver {
                    columns: table.columns(),
                    row,
                })
            })
        })
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    debug!("Query on '{}' produced {} rows", table.name(), rows.len());
    Ok(QueryResult {
        columns: columns.clone(),
        cursor: Box::new(VecCursor::new(columns, rows)),
    })
}
