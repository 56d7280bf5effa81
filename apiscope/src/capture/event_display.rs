//! Console output for reap passes, the inventory and dispatch statistics

use crate::clock::KernelClock;
use crate::connections::{Classification, ReapReport, ReapedConnection};
use crate::schema::ApiSchema;

use super::dispatcher::DispatchStats;

/// Render a reaped connection; complete ones include the captured exchange
#[must_use]
pub fn format_reaped_connection(conn: &ReapedConnection, clock: &KernelClock) -> String {
    let Some(exchange) = &conn.exchange else {
        return format!("[{}] {}\n", label(conn.classification), conn.conn_id);
    };

    let peer = exchange
        .peer
        .map_or_else(|| "unknown".to_string(), |p| p.to_string());
    let mut out = format!(
        "[{}] {} peer={peer} opened={} closed={}\n",
        label(conn.classification),
        conn.conn_id,
        clock.format(exchange.open_timestamp_ns),
        clock.format(exchange.close_timestamp_ns),
    );
    if exchange.truncated {
        out.push_str("  (truncated at buffer capacity)\n");
    }
    out.push_str(&format!(
        "  Request ->\n{}\n",
        String::from_utf8_lossy(&exchange.inbound)
    ));
    out.push_str(&format!(
        "  Response ->\n{}\n",
        String::from_utf8_lossy(&exchange.outbound)
    ));
    out
}

fn label(classification: Classification) -> &'static str {
    match classification {
        Classification::Open => "OPEN",
        Classification::Complete => "COMPLETE",
        Classification::Malformed => "MALFORMED",
        Classification::Stale => "STALE",
    }
}

/// Display everything a reap pass produced
pub fn display_reap_report(report: &ReapReport, clock: &KernelClock) {
    for conn in report.evicted.iter().filter(|c| c.exchange.is_some()) {
        println!("\n{}", format_reaped_connection(conn, clock));
    }
    for schema in &report.new_entries {
        println!("[NEW API] {} pii={}", schema.key(), schema.contains_pii);
    }
}

/// Render one inventory entry
#[must_use]
pub fn format_schema(schema: &ApiSchema) -> String {
    format!(
        "{} {}\n  request:  {}\n  response: {}\n  pii:      {}",
        schema.method,
        schema.path,
        schema.request_schema,
        schema.response_schema,
        schema.contains_pii
    )
}

/// Display the full API inventory
pub fn display_inventory(entries: &[ApiSchema]) {
    println!("\nAPI inventory ({} entries)", entries.len());
    for schema in entries {
        println!("{}", format_schema(schema));
    }
}

/// Display dispatch statistics
pub fn display_statistics(stats: &DispatchStats, tracked: usize) {
    eprintln!(
        "stats: events={} open={} data={} close={} decode_errors={} tracked={tracked}",
        stats.events, stats.opens, stats.data, stats.closes, stats.decode_errors
    );
}
