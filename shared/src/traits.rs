//! External collaborator seams: transport and persistence.
//!
//! The core consumes these abstract operations; WebSocket framing,
//! authentication and real storage live outside the subsystem.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// TRANSPORT
// ============================================================================

/// One authenticated client connection.
#[async_trait]
pub trait Connection: Send + Sync {
    fn user_id(&self) -> &str;
    fn username(&self) -> &str;
    async fn send(&self, message: Value) -> Result<()>;
    async fn join_room(&self, room_id: &str) -> Result<()>;
    async fn leave_room(&self, room_id: &str) -> Result<()>;
}

/// Fan-out to every connection in a room.
#[async_trait]
pub trait Hub: Send + Sync {
    async fn broadcast_to_room(&self, room_id: &str, message: Value) -> Result<()>;
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// The key/value "table row" the supervisor writes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub name: String,
    pub variant: String,
    pub status: String,
    pub creator_id: String,
    pub min_players: u8,
    pub max_players: u8,
    pub settings: Value,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn upsert(&self, row: TableRow) -> Result<()>;
    async fn delete(&self, table_id: &str) -> Result<()>;
}

/// One audited core action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    pub user_id: String,
    pub table_id: Option<String>,
    pub action: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

/// In-memory collaborators for tests and storage-less deployments.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Hub that records every broadcast per room.
    #[derive(Default)]
    pub struct MemoryHub {
        broadcasts: Mutex<HashMap<String, Vec<Value>>>,
    }

    impl MemoryHub {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn messages_for(&self, room_id: &str) -> Vec<Value> {
            self.broadcasts
                .lock()
                .expect("hub lock poisoned")
                .get(room_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Hub for MemoryHub {
        async fn broadcast_to_room(&self, room_id: &str, message: Value) -> Result<()> {
            self.broadcasts
                .lock()
                .expect("hub lock poisoned")
                .entry(room_id.to_string())
                .or_default()
                .push(message);
            Ok(())
        }
    }

    /// Connection fake: captures sent messages and joined rooms.
    pub struct MemoryConnection {
        user_id: String,
        username: String,
        pub sent: Mutex<Vec<Value>>,
        pub rooms: Mutex<Vec<String>>,
    }

    impl MemoryConnection {
        pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
            Self {
                user_id: user_id.into(),
                username: username.into(),
                sent: Mutex::new(Vec::new()),
                rooms: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        fn user_id(&self) -> &str {
            &self.user_id
        }

        fn username(&self) -> &str {
            &self.username
        }

        async fn send(&self, message: Value) -> Result<()> {
            self.sent.lock().expect("conn lock poisoned").push(message);
            Ok(())
        }

        async fn join_room(&self, room_id: &str) -> Result<()> {
            self.rooms
                .lock()
                .expect("conn lock poisoned")
                .push(room_id.to_string());
            Ok(())
        }

        async fn leave_room(&self, room_id: &str) -> Result<()> {
            self.rooms
                .lock()
                .expect("conn lock poisoned")
                .retain(|r| r != room_id);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        rows: Mutex<HashMap<String, TableRow>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, table_id: &str) -> Option<TableRow> {
            self.rows
                .lock()
                .expect("store lock poisoned")
                .get(table_id)
                .cloned()
        }

        pub fn len(&self) -> usize {
            self.rows.lock().expect("store lock poisoned").len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl TableStore for MemoryStore {
        async fn upsert(&self, row: TableRow) -> Result<()> {
            self.rows
                .lock()
                .expect("store lock poisoned")
                .insert(row.id.clone(), row);
            Ok(())
        }

        async fn delete(&self, table_id: &str) -> Result<()> {
            self.rows.lock().expect("store lock poisoned").remove(table_id);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryAudit {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl MemoryAudit {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<AuditRecord> {
            self.records.lock().expect("audit lock poisoned").clone()
        }
    }

    #[async_trait]
    impl AuditLog for MemoryAudit {
        async fn record(&self, record: AuditRecord) -> Result<()> {
            self.records.lock().expect("audit lock poisoned").push(record);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;

    #[tokio::test]
    async fn test_memory_hub_collects_by_room() {
        let hub = MemoryHub::new();
        hub.broadcast_to_room("table_a", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        hub.broadcast_to_room("table_b", serde_json::json!({"n": 2}))
            .await
            .unwrap();
        assert_eq!(hub.messages_for("table_a").len(), 1);
        assert_eq!(hub.messages_for("table_b").len(), 1);
        assert!(hub.messages_for("table_c").is_empty());
    }

    #[tokio::test]
    async fn test_memory_connection_rooms() {
        let conn = MemoryConnection::new("u1", "alice");
        conn.join_room("table_x").await.unwrap();
        assert_eq!(conn.rooms.lock().unwrap().as_slice(), ["table_x"]);
        conn.leave_room("table_x").await.unwrap();
        assert!(conn.rooms.lock().unwrap().is_empty());
    }
}
