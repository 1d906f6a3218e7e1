//! Persistent analytics recorder

use duckdb::Connection;
use parking_lot::Mutex;

use super::sql_types::SqlTimestamp;
use crate::data::analytics::{AnalyticsEvent, AnalyticsRecorder};

/// Writes analytics events into the `api_analytics` table
///
/// Holds its own connection so recording never waits on a request's
/// in-flight query.
pub struct DuckdbAnalytics {
    conn: Mutex<Connection>,
}

impl DuckdbAnalytics {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl AnalyticsRecorder for DuckdbAnalytics {
    fn record(&self, event: AnalyticsEvent) {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO api_analytics (datetime, ip, ua, source, result, num_rows) VALUES (?, ?, ?, ?, ?, ?)",
            duckdb::params![
                SqlTimestamp(event.timestamp),
                event.ip.as_deref().unwrap_or(""),
                event.user_agent.as_deref().unwrap_or(""),
                event.source,
                event.result,
                i64::try_from(event.num_rows).unwrap_or(i64::MAX),
            ],
        );
        if let Err(e) = inserted {
            tracing::warn!(error = %e, source = %event.source, "Failed to record analytics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::analytics::ClientInfo;
    use crate::data::duckdb::migrations::run_migrations;

    #[test]
    fn records_event_row() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let recorder = DuckdbAnalytics::new(conn.try_clone().unwrap());

        let client = ClientInfo {
            ip: Some("127.0.0.1".into()),
            user_agent: None,
        };
        recorder.record(AnalyticsEvent::new("fluview", 2, 10000, &client));

        let (ip, ua, source, result, num_rows): (String, String, String, i32, i64) = conn
            .query_row(
                "SELECT ip, ua, source, result, num_rows FROM api_analytics",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(
            (ip.as_str(), ua.as_str(), source.as_str(), result, num_rows),
            ("127.0.0.1", "", "fluview", 2, 10000)
        );
    }

    #[test]
    fn missing_table_does_not_panic() {
        let recorder = DuckdbAnalytics::new(Connection::open_in_memory().unwrap());
        recorder.record(AnalyticsEvent::new("fluview", 1, 1, &ClientInfo::default()));
    }
}
