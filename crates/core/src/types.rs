/// Opaque identifier assigned to a message by the queue provider.
pub type MessageId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
