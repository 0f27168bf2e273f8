// src/source.rs
//
// Abstract tabular-source capability. Everything the dispatcher knows about
// folders, tables, and streams goes through `TabularSource`; row iteration
// goes through an owned `RowCursor` that carries its own column snapshot.

use crate::error::{TabservError, TabservResult};
use crate::http::ParsedRequest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Folder,
    Table,
    Stream,
}

/// Resolution result for a request path.
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    pub kind: ResourceKind,
    pub mime_type: Option<String>,
}

/// One folder entry as reported by a listing.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Undefined,
    Invalid,
    Character,
    WideCharacter,
    Numeric,
    Double,
    Integer,
    Date,
    DateTime,
    Boolean,
    Binary,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Undefined => "undefined",
            ColumnType::Invalid => "invalid",
            ColumnType::Character => "character",
            ColumnType::WideCharacter => "widecharacter",
            ColumnType::Numeric => "numeric",
            ColumnType::Double => "double",
            ColumnType::Integer => "integer",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: ColumnType,
    pub width: u32,
    pub scale: u32,
}

impl ColumnInfo {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            width: 0,
            scale: 0,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }
}

/// Table structure; `row_count` is present only when the source can count
/// without a full scan (the "fast row count" capability).
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: Vec<ColumnInfo>,
    pub row_count: Option<u64>,
}

/// Calendar date; all-zero fields mean "no value", which serializes to the
/// 0000-00-00 sentinel rather than being omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DateValue {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl DateValue {
    pub fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    pub fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DateTimeValue {
    pub date: DateValue,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTimeValue {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            date: DateValue::new(year, month, day),
            hour,
            minute,
            second,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.date.is_zero() && self.hour == 0 && self.minute == 0 && self.second == 0
    }
}

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Text(String),
    Number(f64),
    Integer(i64),
    Date(DateValue),
    Timestamp(DateTimeValue),
    Bool(bool),
    Binary(Vec<u8>),
}

impl Datum {
    pub fn as_text(&self) -> String {
        match self {
            Datum::Text(s) => s.clone(),
            Datum::Number(n) => n.to_string(),
            Datum::Integer(i) => i.to_string(),
            Datum::Date(d) => format!("{:04}-{:02}-{:02}", d.year, d.month, d.day),
            Datum::Timestamp(t) => format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                t.date.year, t.date.month, t.date.day, t.hour, t.minute, t.second
            ),
            Datum::Bool(b) => (if *b { "true" } else { "false" }).to_string(),
            Datum::Binary(_) => String::new(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            Datum::Integer(i) => Some(*i as f64),
            Datum::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Integer(i) => Some(*i),
            Datum::Number(n) => Some(*n as i64),
            Datum::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Owned, forward-iterating view over a query result. `rewind` restarts at
/// the first row; `skip`/`read` only ever move forward. The schema snapshot
/// is owned by the cursor and released with it, so there are no per-column
/// handles to acquire or leak.
pub trait RowCursor: Send {
    fn columns(&self) -> &[ColumnInfo];
    fn rewind(&mut self);
    fn skip(&mut self, rows: u64);
    fn read(&mut self) -> Option<Vec<Datum>>;
    fn total_count(&self) -> Option<u64>;
}

/// The tabular-source capability consumed by the dispatcher. Implemented
/// elsewhere (filesystem tables, ODBC, ...); tabserv only requires that the
/// implementation is shareable across request threads.
pub trait TabularSource: Send + Sync {
    fn resource_meta(&self, path: &str) -> Option<ResourceMeta>;
    fn open_folder(&self, path: &str) -> TabservResult<Vec<EntryMeta>>;
    fn open_table(&self, path: &str) -> TabservResult<Schema>;
    fn execute_query(&self, sql: &str) -> TabservResult<Box<dyn RowCursor>>;
    fn open_stream(&self, path: &str) -> TabservResult<Vec<u8>>;
}

/// Script execution capability for `.sjs` resources.
pub trait ScriptHost: Send + Sync {
    fn run_script(&self, path: &str, req: &ParsedRequest) -> TabservResult<String>;
}

// ---------------------------------------------------------------------------
// In-memory source, used by the demo binary and the test suite.

pub struct MemoryTable {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Datum>>,
}

#[derive(Default)]
pub struct MemorySource {
    tables: BTreeMap<String, MemoryTable>,
    streams: BTreeMap<String, (String, Vec<u8>)>,
    folders: Vec<String>,
    queries_executed: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            folders: vec!["/".to_string()],
            ..Self::default()
        }
    }

    pub fn add_table(&mut self, path: &str, columns: Vec<ColumnInfo>, rows: Vec<Vec<Datum>>) {
        self.tables
            .insert(path.to_string(), MemoryTable { columns, rows });
    }

    pub fn add_stream(&mut self, path: &str, mime_type: &str, data: Vec<u8>) {
        self.streams
            .insert(path.to_string(), (mime_type.to_string(), data));
    }

    pub fn add_folder(&mut self, path: &str) {
        self.folders.push(path.to_string());
    }

    /// How many times `execute_query` ran; pagination tests pin this to 1.
    pub fn queries_executed(&self) -> usize {
        self.queries_executed.load(Ordering::Relaxed)
    }

    fn parent_of(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &path[..idx],
            None => "/",
        }
    }

    fn leaf_of(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }
}

fn datum_cmp(a: &Datum, b: &Datum) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Datum::Text(x), Datum::Text(y)) => x.cmp(y),
        (Datum::Integer(x), Datum::Integer(y)) => x.cmp(y),
        (Datum::Number(x), Datum::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Datum::Bool(x), Datum::Bool(y)) => x.cmp(y),
        (Datum::Date(x), Datum::Date(y)) => x.cmp(y),
        (Datum::Timestamp(x), Datum::Timestamp(y)) => x.cmp(y),
        (Datum::Binary(x), Datum::Binary(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

impl TabularSource for MemorySource {
    fn resource_meta(&self, path: &str) -> Option<ResourceMeta> {
        if self.folders.iter().any(|f| f == path) {
            return Some(ResourceMeta {
                kind: ResourceKind::Folder,
                mime_type: None,
            });
        }
        if self.tables.contains_key(path) {
            return Some(ResourceMeta {
                kind: ResourceKind::Table,
                mime_type: None,
            });
        }
        self.streams.get(path).map(|(mime, _)| ResourceMeta {
            kind: ResourceKind::Stream,
            mime_type: Some(mime.clone()),
        })
    }

    fn open_folder(&self, path: &str) -> TabservResult<Vec<EntryMeta>> {
        if !self.folders.iter().any(|f| f == path) {
            return Err(TabservError::ResourceNotFound);
        }

        let mut entries = Vec::new();
        for folder in &self.folders {
            if folder != path && Self::parent_of(folder) == path {
                entries.push(EntryMeta {
                    name: Self::leaf_of(folder).to_string(),
                    kind: ResourceKind::Folder,
                    format: None,
                    mime_type: None,
                    size: None,
                });
            }
        }
        for (table_path, table) in &self.tables {
            if Self::parent_of(table_path) == path {
                entries.push(EntryMeta {
                    name: Self::leaf_of(table_path).to_string(),
                    kind: ResourceKind::Table,
                    format: Some("native".to_string()),
                    mime_type: None,
                    size: Some(table.rows.len() as u64),
                });
            }
        }
        for (stream_path, (mime, data)) in &self.streams {
            if Self::parent_of(stream_path) == path {
                entries.push(EntryMeta {
                    name: Self::leaf_of(stream_path).to_string(),
                    kind: ResourceKind::Stream,
                    format: None,
                    mime_type: Some(mime.clone()),
                    size: Some(data.len() as u64),
                });
            }
        }
        Ok(entries)
    }

    fn open_table(&self, path: &str) -> TabservResult<Schema> {
        let table = self.tables.get(path).ok_or(TabservError::ResourceNotFound)?;
        Ok(Schema {
            columns: table.columns.clone(),
            row_count: Some(table.rows.len() as u64),
        })
    }

    fn execute_query(&self, sql: &str) -> TabservResult<Box<dyn RowCursor>> {
        let rest = sql
            .strip_prefix("SELECT * FROM ")
            .ok_or_else(|| TabservError::QueryFailed(format!("unsupported query: {sql}")))?;
        let (path, order) = match rest.split_once(" ORDER BY ") {
            Some((p, o)) => (p, Some(o)),
            None => (rest, None),
        };

        let table = self.tables.get(path).ok_or(TabservError::ResourceNotFound)?;
        let columns = table.columns.clone();
        let mut rows = table.rows.clone();

        if let Some(order) = order {
            for term in order.split(',').rev() {
                let term = term.trim();
                let (name, desc) = match term.to_ascii_lowercase().strip_suffix(" desc") {
                    Some(_) => (term[..term.len() - 5].trim_end(), true),
                    None => (term, false),
                };
                let Some(idx) = columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
                else {
                    return Err(TabservError::QueryFailed(format!("unknown column: {name}")));
                };
                rows.sort_by(|a, b| {
                    let ord = datum_cmp(&a[idx], &b[idx]);
                    if desc { ord.reverse() } else { ord }
                });
            }
        }

        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryCursor {
            columns,
            rows,
            pos: 0,
        }))
    }

    fn open_stream(&self, path: &str) -> TabservResult<Vec<u8>> {
        self.streams
            .get(path)
            .map(|(_, data)| data.clone())
            .ok_or(TabservError::ResourceNotFound)
    }
}

struct MemoryCursor {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Datum>>,
    pos: usize,
}

impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn skip(&mut self, rows: u64) {
        self.pos = self.pos.saturating_add(rows as usize);
    }

    fn read(&mut self) -> Option<Vec<Datum>> {
        let row = self.rows.get(self.pos).cloned()?;
        self.pos += 1;
        Some(row)
    }

    fn total_count(&self) -> Option<u64> {
        Some(self.rows.len() as u64)
    }
}
