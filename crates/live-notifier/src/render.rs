//! Plain-text message templates.
//!
//! The mass-mention marker is never part of the body; senders add it from
//! the `wants_mass_mention` flag.

use crate::gifts::GiftInfo;
use crate::notification::GiftEvent;
use chrono::{DateTime, Local, Utc};
use common::types::RoomId;
use std::time::Duration;

const RULE: &str = "--------------------";

/// Public URL of a room.
#[must_use]
pub fn room_url(room_id: RoomId) -> String {
    format!("https://www.douyu.com/{room_id}")
}

/// Human-readable duration: `2 hours 5 minutes`, `42 minutes`, or `unknown`
/// when zero.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return "unknown".to_string();
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{} {}", plural(hours, "hour"), plural(minutes, "minute"))
    } else {
        plural(minutes, "minute")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn local_datetime(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[must_use]
pub fn live_start(room_id: RoomId, name: &str, started_at: DateTime<Utc>) -> String {
    format!(
        "Live now: {name}\n{RULE}\nStreamer: {name}\nRoom: {room_id}\nTime: {}\nLink: {}\n{RULE}\nCome and watch!",
        local_datetime(started_at),
        room_url(room_id),
    )
}

#[must_use]
pub fn live_end(
    room_id: RoomId,
    name: &str,
    duration: Duration,
    ended_at: DateTime<Utc>,
) -> String {
    format!(
        "Stream ended: {name}\n{RULE}\nStreamer: {name}\nRoom: {room_id}\nDuration: {}\nEnded: {}\n{RULE}\nThanks for watching!",
        format_duration(duration),
        local_datetime(ended_at),
    )
}

#[must_use]
pub fn gift(name: &str, event: &GiftEvent, info: &GiftInfo) -> String {
    format!(
        "Gift received\n{RULE}\nRoom: {name}\nFrom: {}\nGift: {} x{}\nTime: {}",
        event.sender,
        info.name,
        event.count,
        local_time(event.timestamp),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gifts::GiftTier;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "unknown");
        assert_eq!(format_duration(Duration::from_secs(59)), "0 minutes");
        assert_eq!(format_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(format_duration(Duration::from_secs(600)), "10 minutes");
        assert_eq!(
            format_duration(Duration::from_secs(3600 + 60)),
            "1 hour 1 minute"
        );
        assert_eq!(
            format_duration(Duration::from_secs(2 * 3600 + 5 * 60 + 30)),
            "2 hours 5 minutes"
        );
    }

    #[test]
    fn test_live_start_contains_link() {
        let text = live_start(RoomId(12_725_169), "Streamer", Utc::now());
        assert!(text.contains("Streamer"));
        assert!(text.contains("https://www.douyu.com/12725169"));
        assert!(!text.contains('@'));
    }

    #[test]
    fn test_live_end_contains_duration() {
        let text = live_end(RoomId(1), "Streamer", Duration::from_secs(600), Utc::now());
        assert!(text.contains("Duration: 10 minutes"));
    }

    #[test]
    fn test_gift_uses_catalog_name() {
        let event = GiftEvent {
            gift_id: "42".to_string(),
            sender: "viewer".to_string(),
            count: 3,
            timestamp: Utc::now(),
        };
        let info = GiftInfo {
            name: "Mystery gift (42)".to_string(),
            tier: GiftTier::Unknown,
        };
        let text = gift("Room", &event, &info);
        assert!(text.contains("Gift: Mystery gift (42) x3"));
        assert!(text.contains("From: viewer"));
    }
}
