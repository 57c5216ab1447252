use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::Connection;

/// SQL name of the Unicode-aware lowercase function used by text search.
/// SQLite's own `lower()` and `LIKE` only fold ASCII.
pub const UNICODE_LOWER: &str = "unicode_lower";

/// Registers the scalar functions composed queries rely on. Must run on every
/// connection before [`QueryBuilder::contains_text`] is used with it.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|value| value.to_lowercase()))
        },
    )
}

/// Incrementally composed `SELECT`: a base query ending in a `WHERE` clause,
/// followed by `AND`-joined predicates and their positional parameters.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    sql: String,
    params: Vec<Value>,
}

impl QueryBuilder {
    pub fn new(base: &str, params: Vec<Value>) -> Self {
        Self {
            sql: base.to_string(),
            params,
        }
    }

    /// Appends an arbitrary predicate. `clause` must use `?` placeholders only.
    pub fn and(&mut self, clause: &str, params: impl IntoIterator<Item = Value>) -> &mut Self {
        self.sql.push_str(" AND (");
        self.sql.push_str(clause);
        self.sql.push(')');
        self.params.extend(params);
        self
    }

    /// Appends a predicate that takes no parameters.
    pub fn and_clause(&mut self, clause: &str) -> &mut Self {
        self.and(clause, std::iter::empty::<Value>())
    }

    pub fn eq(&mut self, column: &str, value: Option<impl Into<Value>>) -> &mut Self {
        if let Some(value) = value {
            self.and(&format!("{} = ?", column), [value.into()]);
        }
        self
    }

    pub fn eq_text(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = text_filter(value) {
            self.and(&format!("{} = ?", column), [text(value)]);
        }
        self
    }

    pub fn at_least(&mut self, column: &str, value: Option<impl Into<Value>>) -> &mut Self {
        if let Some(value) = value {
            self.and(&format!("{} >= ?", column), [value.into()]);
        }
        self
    }

    pub fn at_most(&mut self, column: &str, value: Option<impl Into<Value>>) -> &mut Self {
        if let Some(value) = value {
            self.and(&format!("{} <= ?", column), [value.into()]);
        }
        self
    }

    /// Case-insensitive literal substring match OR'd across `columns`.
    /// Both sides are lowercased with full Unicode case folding.
    pub fn contains_text(&mut self, columns: &[&str], needle: Option<&str>) -> &mut Self {
        let Some(needle) = text_filter(needle) else {
            return self;
        };
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let clause = columns
            .iter()
            .map(|column| format!("{}({}) LIKE ? ESCAPE '\\'", UNICODE_LOWER, column))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.and(&clause, columns.iter().map(|_| text(&pattern)));
        self
    }

    /// Containment test on a JSON array column.
    pub fn json_array_contains(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = text_filter(value) {
            self.and(
                &format!("EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value = ?)", column),
                [text(value)],
            );
        }
        self
    }

    /// Matches rows whose JSON array column holds at least one of `values`.
    pub fn json_array_contains_any(&mut self, column: &str, values: &[String]) -> &mut Self {
        let values = values
            .iter()
            .filter_map(|value| text_filter(Some(value.as_str())))
            .collect::<Vec<_>>();
        if values.is_empty() {
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.and(
            &format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value IN ({}))",
                column, placeholders
            ),
            values.into_iter().map(text),
        );
        self
    }

    pub fn order_by(&mut self, ordering: &str) -> &mut Self {
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(ordering);
        self
    }

    /// No limit means the whole filtered set; an offset alone still skips rows.
    /// A zero limit or offset counts as absent, like any other empty filter value.
    pub fn paginate(&mut self, limit: Option<u32>, offset: Option<u32>) -> &mut Self {
        let limit = limit.filter(|limit| *limit > 0);
        let offset = offset.filter(|offset| *offset > 0);
        if limit.is_none() && offset.is_none() {
            return self;
        }
        self.sql.push_str(" LIMIT ? OFFSET ?");
        self.params
            .push(Value::Integer(limit.map(i64::from).unwrap_or(-1)));
        self.params
            .push(Value::Integer(offset.map(i64::from).unwrap_or(0)));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn query<T, F>(&self, conn: &Connection, parse: F) -> rusqlite::Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::debug!(sql = %self.sql, params = self.params.len(), "running composed query");
        let mut statement = conn.prepare(&self.sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(self.params.iter()), parse)?;
        rows.collect()
    }
}

/// Blank optional strings impose no constraint.
pub fn text_filter(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn text(value: impl AsRef<str>) -> Value {
    Value::Text(value.as_ref().to_string())
}

pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
