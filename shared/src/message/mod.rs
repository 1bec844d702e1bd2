//! Real-time waitlist messages
//!
//! Server → Client: [`WaitlistFrame`] (member private channel + restaurant topics)
//! Client → Server: [`WaitlistCommand`] (subscription control)

use serde::{Deserialize, Serialize};

use crate::models::WaitingStatus;

/// Per-member queue position snapshot
///
/// Recomputed from the ledger on every broadcast; a lost update is superseded
/// by the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePositionUpdate {
    pub waiting_id: i64,
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub waiting_number: u32,
    /// Zero-based
    pub position_in_queue: u32,
    pub estimated_wait_minutes: u32,
    pub total_waiting_count: u32,
    pub status: WaitingStatus,
    pub timestamp: i64,
}

/// Restaurant topic aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingCountUpdate {
    pub restaurant_id: i64,
    pub waiting_count: u32,
    pub timestamp: i64,
}

/// "Please come in now"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingCalledNotice {
    pub waiting_id: i64,
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub waiting_number: u32,
    pub title: String,
    pub message: String,
}

/// Owner-facing notice for a new admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingNewNotice {
    pub waiting_id: i64,
    pub restaurant_id: i64,
    pub member_id: i64,
    pub member_nickname: String,
    pub guest_count: u32,
    pub waiting_number: u32,
}

/// Owner-facing notice for a cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingCancelledNotice {
    pub waiting_id: i64,
    pub restaurant_id: i64,
    pub member_id: i64,
    pub member_nickname: String,
    pub waiting_number: u32,
}

/// Messages delivered on a member's private channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberNotification {
    WaitingQueueUpdate(QueuePositionUpdate),
    WaitingCalled(WaitingCalledNotice),
    WaitingNew(WaitingNewNotice),
    WaitingCancelled(WaitingCancelledNotice),
}

/// Server → client WebSocket frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum WaitlistFrame {
    /// Private member channel
    Member {
        #[serde(flatten)]
        notification: MemberNotification,
    },
    /// Restaurant topic
    Restaurant { update: WaitingCountUpdate },
    /// Request could not be applied
    Error { message: String },
}

/// Client → server command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WaitlistCommand {
    /// Replace the restaurant topic subscription
    #[serde(rename_all = "camelCase")]
    Subscribe { restaurant_ids: Vec<i64> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_notification_wire_shape() {
        let notification = MemberNotification::WaitingQueueUpdate(QueuePositionUpdate {
            waiting_id: 7,
            restaurant_id: 1,
            restaurant_name: "Noodle Bar".into(),
            waiting_number: 2,
            position_in_queue: 0,
            estimated_wait_minutes: 15,
            total_waiting_count: 1,
            status: WaitingStatus::Waiting,
            timestamp: 1,
        });
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "WAITING_QUEUE_UPDATE");
        assert_eq!(value["payload"]["positionInQueue"], 0);
        assert_eq!(value["payload"]["status"], "WAITING");
    }

    #[test]
    fn test_frame_flattens_member_notification() {
        let frame = WaitlistFrame::Member {
            notification: MemberNotification::WaitingCalled(WaitingCalledNotice {
                waiting_id: 7,
                restaurant_id: 1,
                restaurant_name: "Noodle Bar".into(),
                waiting_number: 2,
                title: "Your table is ready".into(),
                message: "Please come in now".into(),
            }),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["channel"], "member");
        assert_eq!(value["type"], "WAITING_CALLED");
        assert_eq!(value["payload"]["waitingId"], 7);
    }

    #[test]
    fn test_subscribe_command_parses() {
        let cmd: WaitlistCommand =
            serde_json::from_str(r#"{"type":"subscribe","restaurantIds":[1,2]}"#).unwrap();
        let WaitlistCommand::Subscribe { restaurant_ids } = cmd;
        assert_eq!(restaurant_ids, vec![1, 2]);
    }

    #[test]
    fn test_subscribe_command_round_trip() {
        let cmd = WaitlistCommand::Subscribe {
            restaurant_ids: vec![3, 1],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","restaurantIds":[3,1]}"#);
        assert_eq!(serde_json::from_str::<WaitlistCommand>(&json).unwrap(), cmd);

        assert!(serde_json::from_str::<WaitlistCommand>(r#"{"type":"unsubscribe"}"#).is_err());
        assert!(serde_json::from_str::<WaitlistCommand>(r#"{"type":"subscribe"}"#).is_err());
    }
}
