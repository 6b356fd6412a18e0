/// Jobs are identified by opaque strings (UUIDs when generated here).
pub type JobId = String;

/// Identifier of a single browser websocket connection.
pub type ConnId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
