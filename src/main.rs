// src/main.rs
use std::sync::Arc;
use tabserv::source::{ColumnInfo, ColumnType, Datum, DateValue};
use tabserv::{Dispatcher, MemorySource, Server, ServerConfig};

fn sample_source() -> MemorySource {
    let mut source = MemorySource::new();

    source.add_table(
        "/sales",
        vec![
            ColumnInfo::new("id", ColumnType::Integer),
            ColumnInfo::new("region", ColumnType::Character),
            ColumnInfo::new("amount", ColumnType::Numeric).with_scale(2),
            ColumnInfo::new("sold_on", ColumnType::Date),
        ],
        (1..=250)
            .map(|n| {
                vec![
                    Datum::Integer(n),
                    Datum::Text(["north", "south", "east", "west"][(n % 4) as usize].to_string()),
                    Datum::Number(n as f64 * 1.25),
                    Datum::Date(DateValue::new(2026, (n % 12 + 1) as u8, (n % 28 + 1) as u8)),
                ]
            })
            .collect(),
    );

    source.add_stream(
        "/index.html",
        "text/html",
        b"<html><body>tabserv</body></html>".to_vec(),
    );

    source
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tabserv::logging::init_logging();

    let config = ServerConfig::from_env()?;
    let dispatcher = Dispatcher::new(Arc::new(sample_source())).with_root(&config.root);

    Server::bind(&config.bind_addr()).serve(dispatcher)?;
    Ok(())
}
