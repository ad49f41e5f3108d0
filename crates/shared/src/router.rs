//! Maps pushed event types to the cache keys they make stale.
//!
//! Pure lookup: no I/O, no allocation. The connection manager forwards the
//! resolved keys to the cache invalidation port.

use crate::protocol::LiveEventKind;
use crate::query::QueryKey;

pub const NOTIFICATIONS: QueryKey = QueryKey::from_static("/api/notifications");
pub const NOTIFICATIONS_UNREAD_COUNT: QueryKey =
    QueryKey::from_static("/api/notifications/unread-count");
pub const HEALTH_SUMMARY: QueryKey = QueryKey::from_static("/api/health/summary");
pub const HEALTH_METRICS: QueryKey = QueryKey::from_static("/api/health/metrics");
pub const AUDIT_LOGS: QueryKey = QueryKey::from_static("/api/audit-logs");
pub const BOOKINGS: QueryKey = QueryKey::from_static("/api/bookings");
pub const ADMIN_BOOKINGS: QueryKey = QueryKey::from_static("/api/admin/bookings");
pub const ACTIVE_PROTOCOL: QueryKey = QueryKey::from_static("/api/protocols/active");
pub const PROTOCOLS: QueryKey = QueryKey::from_static("/api/protocols");
pub const COMMUNITY_POSTS: QueryKey = QueryKey::from_static("/api/community/posts");
pub const COMMUNITY_MY_STATS: QueryKey = QueryKey::from_static("/api/community/my-stats");

/// Keys invalidated by a known event kind. Never empty.
pub fn keys_for(kind: LiveEventKind) -> &'static [QueryKey] {
    const NOTIFICATION: &[QueryKey] = &[NOTIFICATIONS, NOTIFICATIONS_UNREAD_COUNT];
    const HEALTH: &[QueryKey] = &[HEALTH_SUMMARY, HEALTH_METRICS];
    const AUDIT: &[QueryKey] = &[AUDIT_LOGS];
    const BOOKING: &[QueryKey] = &[BOOKINGS, ADMIN_BOOKINGS];
    const PROTOCOL: &[QueryKey] = &[ACTIVE_PROTOCOL, PROTOCOLS];
    const COMMUNITY: &[QueryKey] = &[COMMUNITY_POSTS, COMMUNITY_MY_STATS];

    match kind {
        LiveEventKind::Notification => NOTIFICATION,
        LiveEventKind::HealthUpdate => HEALTH,
        LiveEventKind::AuditLog => AUDIT,
        LiveEventKind::BookingUpdate => BOOKING,
        LiveEventKind::ProtocolUpdate => PROTOCOL,
        LiveEventKind::CommunityUpdate => COMMUNITY,
    }
}

/// Keys invalidated by a raw `type` tag. Unknown tags resolve to nothing.
pub fn resolve(kind: &str) -> &'static [QueryKey] {
    match kind.parse::<LiveEventKind>() {
        Ok(kind) => keys_for(kind),
        Err(_) => &[],
    }
}
