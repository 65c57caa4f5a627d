//! Core data model: tenants, players, team members, and invite links.
//!
//! These types are the typed core fields of otherwise open-schema store
//! documents (§6): unknown keys arriving from the store are never dropped
//! by `update_document`, but the fields below are the ones the router and
//! dispatch layer depend on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant: one football team, one bot token, two chats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub name: String,
    /// Secret. Never logged; redact before any `tracing` call.
    pub bot_token: String,
    pub main_chat_id: i64,
    pub leadership_chat_id: i64,
    pub status: TeamStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Suspended,
    Archived,
}

/// Playing position, fixed enumeration per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Pending,
    Approved,
    Active,
    Inactive,
    Rejected,
}

/// A player within a team. `player_id` is unique within `team_id` (I-2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub team_id: String,
    pub telegram_id: Option<i64>,
    pub phone_number: String,
    pub full_name: String,
    pub position: Option<Position>,
    pub status: PlayerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMemberRole {
    Coach,
    Manager,
    Assistant,
    Coordinator,
    Volunteer,
    Admin,
    ClubAdministrator,
    TeamManager,
    TeamMember,
}

/// A team member (leadership-side identity), parallel to [`Player`].
///
/// A single human may be both a `Player` and a `TeamMember` in the same
/// team, linked by equal `telegram_id` — the two entities are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub member_id: String,
    pub team_id: String,
    pub telegram_id: Option<i64>,
    pub phone_number: String,
    pub full_name: String,
    pub role: TeamMemberRole,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteLinkStatus {
    Active,
    Used,
    Expired,
    Revoked,
}

/// A one-time secure token granting chat join and registration binding.
///
/// Expiry is evaluated against wall-clock at read time (`is_expired`); the
/// core never mutates a link except to mark it `used`/`expired`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteLink {
    pub link_id: String,
    pub team_id: String,
    pub secure_token: String,
    pub expires_at: DateTime<Utc>,
    pub status: InviteLinkStatus,
    pub player_id: Option<String>,
    pub member_id: Option<String>,
}

impl InviteLink {
    /// Evaluate expiry against wall-clock `now`. Does not mutate `status`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == InviteLinkStatus::Expired || now >= self.expires_at
    }
}

/// Identity resolution outcome for a `(team_id, telegram_id)` pair (§4.I step 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Unregistered,
    PlayerOnly,
    MemberOnly,
    Both,
}

/// Effective role used by the permission gate (§4.I step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveRole {
    Unregistered,
    Player,
    TeamMember,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_link_expired_by_status() {
        let link = InviteLink {
            link_id: "l1".into(),
            team_id: "KTI".into(),
            secure_token: "x".repeat(32),
            expires_at: Utc::now() + chrono::Duration::days(1),
            status: InviteLinkStatus::Expired,
            player_id: None,
            member_id: None,
        };
        assert!(link.is_expired(Utc::now()));
    }

    #[test]
    fn invite_link_expired_by_wall_clock() {
        let link = InviteLink {
            link_id: "l1".into(),
            team_id: "KTI".into(),
            secure_token: "x".repeat(32),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            status: InviteLinkStatus::Active,
            player_id: None,
            member_id: None,
        };
        assert!(link.is_expired(Utc::now()));
    }

    #[test]
    fn invite_link_not_expired() {
        let link = InviteLink {
            link_id: "l1".into(),
            team_id: "KTI".into(),
            secure_token: "x".repeat(32),
            expires_at: Utc::now() + chrono::Duration::days(1),
            status: InviteLinkStatus::Active,
            player_id: None,
            member_id: None,
        };
        assert!(!link.is_expired(Utc::now()));
    }
}
