//! Command & tool dispatch (§4.J).
//!
//! Every tool follows the same shape, grounded on `player_tools_native.py` /
//! `team_member_tools_native.py` / `attendance_tools.py`: validate canonical
//! parameters first, fetch the store from the registry, do one store-backed
//! operation, and return a plain string — success as a bulleted summary,
//! failure as an `❌`-prefixed echo of the underlying error. Nothing ever
//! throws across a tool boundary; every fallible step is caught locally.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::{InviteLink, InviteLinkStatus, Player, PlayerStatus, TeamMember, TeamMemberRole};
use crate::registry::ServiceRegistry;
use crate::store::{Filter, Store, StoreError, team_collection};

/// Per-call handle to the registry a tool needs to reach the store.
///
/// Mirrors `get_container().get_service(...)` in the reference tools, minus
/// the dependency-injection container: there's only one service a tool ever
/// needs here, so this is a thin, typed accessor rather than a general
/// lookup API.
pub struct ToolContext {
    registry: Arc<ServiceRegistry>,
}

impl ToolContext {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    fn store(&self) -> Result<Arc<dyn Store>, String> {
        let instance = self
            .registry
            .get_service("store")
            .ok_or_else(|| "❌ Store service is temporarily unavailable. Please try again later.".to_string())?;
        instance
            .downcast::<Arc<dyn Store>>()
            .map(|boxed| (*boxed).clone())
            .map_err(|_| "❌ Store service is temporarily unavailable. Please try again later.".to_string())
    }
}

/// Validate the three canonical parameters every tool takes (§4.J).
/// Returns the first violation as an `❌`-prefixed message, matching the
/// order the reference tools check them in.
fn validate_canonical(telegram_id: i64, team_id: &str, chat_type: &str) -> Result<(), String> {
    if telegram_id <= 0 {
        return Err("❌ Valid Telegram ID is required.".to_string());
    }
    if team_id.trim().is_empty() {
        return Err("❌ Team ID is required.".to_string());
    }
    if chat_type.trim().is_empty() {
        return Err("❌ Chat type is required.".to_string());
    }
    Ok(())
}

fn require_field(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("❌ {field} is required."))
    } else {
        Ok(())
    }
}

fn store_error(action: &str, e: StoreError) -> String {
    format!("❌ Failed to {action}: {e}")
}

async fn find_player_by_telegram_id(
    store: &dyn Store,
    team_id: &str,
    telegram_id: i64,
) -> Result<Option<Player>, StoreError> {
    let collection = team_collection(team_id, "players");
    let docs = store
        .query_documents(&collection, &[Filter::eq("telegram_id", json!(telegram_id))], None)
        .await?;
    Ok(docs.into_iter().next().and_then(|d| serde_json::from_value(d.data).ok()))
}

async fn find_player_by_id(store: &dyn Store, team_id: &str, player_id: &str) -> Result<Option<Player>, StoreError> {
    let collection = team_collection(team_id, "players");
    let doc = store.get_document(&collection, player_id).await?;
    Ok(doc.and_then(|d| serde_json::from_value(d.data).ok()))
}

async fn find_member_by_telegram_id(
    store: &dyn Store,
    team_id: &str,
    telegram_id: i64,
) -> Result<Option<TeamMember>, StoreError> {
    let collection = team_collection(team_id, "team_members");
    let docs = store
        .query_documents(&collection, &[Filter::eq("telegram_id", json!(telegram_id))], None)
        .await?;
    Ok(docs.into_iter().next().and_then(|d| serde_json::from_value(d.data).ok()))
}

// ---------------------------------------------------------------------
// Player tools
// ---------------------------------------------------------------------

/// Register a new player, reject a duplicate `phone_number` within the
/// team, and mint an invite link.
pub async fn add_player(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    full_name: &str,
    phone_number: &str,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(full_name, "Full name") {
        return e;
    }
    if let Err(e) = require_field(phone_number, "Phone number") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "players");
    let existing = match store
        .query_documents(&collection, &[Filter::eq("phone_number", json!(phone_number))], None)
        .await
    {
        Ok(docs) => docs,
        Err(e) => return store_error("check for an existing player", e),
    };
    if !existing.is_empty() {
        return format!("❌ A player with phone number {phone_number} is already registered in this team.");
    }

    let now = Utc::now();
    let player = Player {
        player_id: Uuid::now_v7().to_string(),
        team_id: team_id.to_string(),
        telegram_id: None,
        phone_number: phone_number.to_string(),
        full_name: full_name.to_string(),
        position: None,
        status: PlayerStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let player_id = player.player_id.clone();
    let data = match serde_json::to_value(&player) {
        Ok(v) => v,
        Err(e) => return format!("❌ Failed to encode player record: {e}"),
    };
    if let Err(e) = store.create_document(&collection, data, Some(player_id.clone())).await {
        return store_error("add player", e);
    }

    let invite = InviteLink {
        link_id: Uuid::now_v7().to_string(),
        team_id: team_id.to_string(),
        secure_token: Uuid::new_v4().simple().to_string() + &Uuid::new_v4().simple().to_string(),
        expires_at: now + chrono::Duration::days(7),
        status: InviteLinkStatus::Active,
        player_id: Some(player_id.clone()),
        member_id: None,
    };
    let invite_link_id = invite.link_id.clone();
    let invite_collection = team_collection(team_id, "invite_links");
    let invite_data = match serde_json::to_value(&invite) {
        Ok(v) => v,
        Err(e) => return format!("❌ Failed to encode invite link: {e}"),
    };
    if let Err(e) = store.create_document(&invite_collection, invite_data, Some(invite_link_id)).await {
        return store_error("create the player's invite link", e);
    }

    format!(
        "✅ Player Added Successfully\n\n\
        • Name: {full_name}\n\
        • Player ID: {player_id}\n\
        • Team: {team_id}\n\
        • Status: Pending\n\n\
        Invite token: {}\n\
        Share this with the player to complete registration.",
        invite.secure_token
    )
}

pub async fn approve_player(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    player_id: &str,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(player_id, "Player ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let player = match find_player_by_id(store.as_ref(), team_id, player_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return format!("❌ No player found with ID {player_id} in team {team_id}."),
        Err(e) => return store_error("look up the player", e),
    };

    let collection = team_collection(team_id, "players");
    if let Err(e) = store
        .update_document(&collection, player_id, json!({"status": PlayerStatus::Approved}))
        .await
    {
        return store_error("approve player", e);
    }

    format!(
        "✅ Player Approved Successfully\n\n\
        • Name: {}\n\
        • Player ID: {player_id}\n\
        • Team: {team_id}\n\
        • Status: Approved\n\n\
        Player is now approved for squad selection.",
        player.full_name
    )
}

pub async fn get_my_status(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    if chat_type == "main" {
        match find_player_by_telegram_id(store.as_ref(), team_id, telegram_id).await {
            Ok(Some(player)) => format!(
                "👤 Your Player Status\n\n\
                • Name: {}\n\
                • Position: {}\n\
                • Status: {:?}\n\
                • Player ID: {}\n\
                • Team: {team_id}",
                player.full_name,
                player.position.map(|p| format!("{p:?}")).unwrap_or_else(|| "Not set".to_string()),
                player.status,
                player.player_id,
            ),
            Ok(None) => "❌ You are not registered as a player in this team. Use /register to join as a player.".to_string(),
            Err(e) => store_error("get your status", e),
        }
    } else {
        match find_member_by_telegram_id(store.as_ref(), team_id, telegram_id).await {
            Ok(Some(member)) => format!(
                "👔 Your Team Member Status\n\n\
                • Name: {}\n\
                • Role: {:?}\n\
                • Team: {team_id}",
                member.full_name, member.role,
            ),
            Ok(None) => "❌ You are not registered as a team member. Contact an administrator for access.".to_string(),
            Err(e) => store_error("get your status", e),
        }
    }
}

pub async fn get_player_status(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    player_id: &str,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(player_id, "Player ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    match find_player_by_id(store.as_ref(), team_id, player_id).await {
        Ok(Some(player)) => format!(
            "👤 Player Status\n\n\
            • Name: {}\n\
            • Player ID: {player_id}\n\
            • Status: {:?}\n\
            • Team: {team_id}",
            player.full_name, player.status,
        ),
        Ok(None) => format!("❌ No player found with ID {player_id} in team {team_id}."),
        Err(e) => store_error("get player status", e),
    }
}

pub async fn get_all_players(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "players");
    let players: Vec<Player> = match store.query_documents(&collection, &[], None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list players", e),
    };

    if players.is_empty() {
        return format!("📋 Players in {team_id}\n\nNo players registered yet.");
    }

    let mut lines = vec![format!("📋 Players in {team_id} ({}):", players.len()), String::new()];
    for player in &players {
        lines.push(format!("• {} ({:?}) — {}", player.full_name, player.status, player.player_id));
    }
    lines.join("\n")
}

pub async fn get_active_players(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "players");
    let filter = Filter::eq("status", json!(PlayerStatus::Active));
    let players: Vec<Player> = match store.query_documents(&collection, &[filter], None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list active players", e),
    };

    if players.is_empty() {
        return format!("📋 Active Players in {team_id}\n\nNone are active right now.");
    }

    let mut lines = vec![format!("📋 Active Players in {team_id} ({}):", players.len()), String::new()];
    for player in &players {
        lines.push(format!("• {} — {}", player.full_name, player.player_id));
    }
    lines.join("\n")
}

pub async fn list_team_members_and_players(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let players_collection = team_collection(team_id, "players");
    let players: Vec<Player> = match store.query_documents(&players_collection, &[], None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list players", e),
    };

    let members_collection = team_collection(team_id, "team_members");
    let members: Vec<TeamMember> = match store.query_documents(&members_collection, &[], None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list team members", e),
    };

    let mut lines = vec![format!("📋 {team_id} Roster"), String::new(), format!("Players ({}):", players.len())];
    for player in &players {
        lines.push(format!("• {} ({:?})", player.full_name, player.status));
    }
    lines.push(String::new());
    lines.push(format!("Team members ({}):", members.len()));
    for member in &members {
        lines.push(format!("• {} ({:?})", member.full_name, member.role));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------
// Team member tools
// ---------------------------------------------------------------------

pub async fn team_member_registration(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    full_name: &str,
    phone_number: &str,
    role: TeamMemberRole,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(full_name, "Name") {
        return e;
    }
    if let Err(e) = require_field(phone_number, "Phone number") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "team_members");
    let existing = match store
        .query_documents(&collection, &[Filter::eq("phone_number", json!(phone_number))], None)
        .await
    {
        Ok(docs) => docs,
        Err(e) => return store_error("check for an existing team member", e),
    };
    if !existing.is_empty() {
        return format!("❌ A team member with phone number {phone_number} is already registered in this team.");
    }

    let now = Utc::now();
    let member = TeamMember {
        member_id: Uuid::now_v7().to_string(),
        team_id: team_id.to_string(),
        telegram_id: Some(telegram_id),
        phone_number: phone_number.to_string(),
        full_name: full_name.to_string(),
        role,
        is_admin: false,
        created_at: now,
        updated_at: now,
    };
    let member_id = member.member_id.clone();
    let data = match serde_json::to_value(&member) {
        Ok(v) => v,
        Err(e) => return format!("❌ Failed to encode team member record: {e}"),
    };
    if let Err(e) = store.create_document(&collection, data, Some(member_id.clone())).await {
        return store_error("register team member", e);
    }

    format!(
        "✅ Team Member Registered\n\n\
        • Name: {full_name}\n\
        • Member ID: {member_id}\n\
        • Role: {role:?}\n\
        • Team: {team_id}"
    )
}

pub async fn get_my_team_member_status(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    match find_member_by_telegram_id(store.as_ref(), team_id, telegram_id).await {
        Ok(Some(member)) => format!(
            "👔 Your Team Member Status\n\n\
            • Name: {}\n\
            • Role: {:?}\n\
            • Admin: {}\n\
            • Team: {team_id}",
            member.full_name, member.role, member.is_admin,
        ),
        Ok(None) => "❌ You are not registered as a team member. Contact an administrator for access.".to_string(),
        Err(e) => store_error("get your team member status", e),
    }
}

pub async fn get_team_members(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, role: Option<TeamMemberRole>) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "team_members");
    let filters = match role {
        Some(role) => vec![Filter::eq("role", json!(role))],
        None => vec![],
    };
    let members: Vec<TeamMember> = match store.query_documents(&collection, &filters, None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list team members", e),
    };

    if members.is_empty() {
        return format!("📋 Team Members in {team_id}\n\nNone found.");
    }

    let mut lines = vec![format!("📋 Team Members in {team_id} ({}):", members.len()), String::new()];
    for member in &members {
        lines.push(format!("• {} — {:?}", member.full_name, member.role));
    }
    lines.join("\n")
}

async fn set_member_role(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    target_telegram_id: i64,
    role: TeamMemberRole,
    action: &str,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if target_telegram_id <= 0 {
        return "❌ Valid target Telegram ID is required.".to_string();
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let member = match find_member_by_telegram_id(store.as_ref(), team_id, target_telegram_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return format!("❌ No team member found for Telegram ID {target_telegram_id} in team {team_id}."),
        Err(e) => return store_error("look up team member", e),
    };

    let collection = team_collection(team_id, "team_members");
    if let Err(e) = store.update_document(&collection, &member.member_id, json!({"role": role})).await {
        return store_error(action, e);
    }

    format!("✅ {} {role:?} role for {}.", if action == "add team member role" { "Added" } else { "Removed" }, member.full_name)
}

pub async fn add_team_member_role(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    target_telegram_id: i64,
    role: TeamMemberRole,
) -> String {
    set_member_role(ctx, telegram_id, team_id, chat_type, target_telegram_id, role, "add team member role").await
}

pub async fn remove_team_member_role(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    target_telegram_id: i64,
) -> String {
    set_member_role(
        ctx,
        telegram_id,
        team_id,
        chat_type,
        target_telegram_id,
        TeamMemberRole::TeamMember,
        "remove team member role",
    )
    .await
}

pub async fn promote_team_member_to_admin(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    target_telegram_id: i64,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if target_telegram_id <= 0 {
        return "❌ Valid target Telegram ID is required.".to_string();
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let member = match find_member_by_telegram_id(store.as_ref(), team_id, target_telegram_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return format!("❌ No team member found for Telegram ID {target_telegram_id} in team {team_id}."),
        Err(e) => return store_error("look up team member", e),
    };

    let collection = team_collection(team_id, "team_members");
    if let Err(e) = store.update_document(&collection, &member.member_id, json!({"is_admin": true})).await {
        return store_error("promote team member to admin", e);
    }

    format!("✅ {} is now a team admin.", member.full_name)
}

// ---------------------------------------------------------------------
// Match & attendance tools
//
// Matches and attendance records have no typed domain struct (no data
// model entry names one); they are stored and manipulated as open-schema
// documents the same way the reference services persist them, keyed by
// `match_id` / `player_id`.
// ---------------------------------------------------------------------

fn attendance_doc_id(match_id: &str, player_id: &str) -> String {
    format!("{match_id}:{player_id}")
}

pub async fn record_attendance(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    match_id: &str,
    player_id: &str,
    status: &str,
    reason: Option<&str>,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(match_id, "Match ID") {
        return e;
    }
    if let Err(e) = require_field(player_id, "Player ID") {
        return e;
    }
    let normalized = status.to_lowercase();
    if !["attended", "absent", "late"].contains(&normalized.as_str()) {
        return format!("❌ Invalid status: {status}. Valid options: attended, absent, late");
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "attendance");
    let record = json!({
        "match_id": match_id,
        "player_id": player_id,
        "status": normalized,
        "reason": reason,
        "recorded_at": Utc::now().to_rfc3339(),
    });
    let doc_id = attendance_doc_id(match_id, player_id);
    if let Err(e) = store.create_document(&collection, record, Some(doc_id)).await {
        return store_error("record attendance", e);
    }

    let mut lines = vec![
        "✅ Match Attendance Recorded".to_string(),
        String::new(),
        format!("Match: {match_id}"),
        format!("Player: {player_id}"),
        format!("Status: {normalized}"),
    ];
    if let Some(reason) = reason {
        lines.push(format!("Reason: {reason}"));
    }
    lines.join("\n")
}

pub async fn get_match_attendance(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, match_id: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(match_id, "Match ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "attendance");
    let records = match store.query_documents(&collection, &[Filter::eq("match_id", json!(match_id))], None).await {
        Ok(docs) => docs,
        Err(e) => return store_error("get match attendance", e),
    };

    let mut attended = Vec::new();
    let mut absent = Vec::new();
    let mut late = Vec::new();
    for doc in &records {
        let player_id = doc.data.get("player_id").and_then(Value::as_str).unwrap_or("?");
        match doc.data.get("status").and_then(Value::as_str) {
            Some("attended") => attended.push(player_id.to_string()),
            Some("absent") => absent.push(player_id.to_string()),
            Some("late") => late.push(player_id.to_string()),
            _ => {}
        }
    }

    let mut lines = vec![format!("📊 Match Attendance: {match_id}"), String::new(), format!("Total Players: {}", records.len()), String::new()];
    if !attended.is_empty() {
        lines.push(format!("✅ Attended ({}):", attended.len()));
        lines.extend(attended.iter().map(|p| format!("• {p}")));
    }
    if !absent.is_empty() {
        lines.push(format!("❌ Absent ({}):", absent.len()));
        lines.extend(absent.iter().map(|p| format!("• {p}")));
    }
    if !late.is_empty() {
        lines.push(format!("⏰ Late ({}):", late.len()));
        lines.extend(late.iter().map(|p| format!("• {p}")));
    }
    lines.join("\n")
}

pub async fn get_player_attendance_history(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    player_id: &str,
    limit: usize,
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(player_id, "Player ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "attendance");
    let records = match store
        .query_documents(&collection, &[Filter::eq("player_id", json!(player_id))], Some(limit))
        .await
    {
        Ok(docs) => docs,
        Err(e) => return store_error("get attendance history", e),
    };

    if records.is_empty() {
        return format!("📈 Attendance History for {player_id}\n\nNo attendance records found.");
    }

    let mut lines = vec![format!("📈 Attendance History for {player_id}"), String::new(), format!("Last {} matches:", records.len())];
    for doc in &records {
        let match_id = doc.data.get("match_id").and_then(Value::as_str).unwrap_or("?");
        let status = doc.data.get("status").and_then(Value::as_str).unwrap_or("?");
        lines.push(format!("• {match_id}: {status}"));
    }
    lines.join("\n")
}

pub async fn bulk_record_attendance(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    match_id: &str,
    records: &[(String, String)],
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(match_id, "Match ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "attendance");
    let mut recorded = 0usize;
    let mut failures = Vec::new();
    for (player_id, status) in records {
        let normalized = status.to_lowercase();
        if !["attended", "absent", "late"].contains(&normalized.as_str()) {
            failures.push(format!("{player_id}: invalid status {status}"));
            continue;
        }
        let doc = json!({
            "match_id": match_id,
            "player_id": player_id,
            "status": normalized,
            "reason": Value::Null,
            "recorded_at": Utc::now().to_rfc3339(),
        });
        let doc_id = attendance_doc_id(match_id, player_id);
        if let Err(e) = store.create_document(&collection, doc, Some(doc_id)).await {
            failures.push(format!("{player_id}: {e}"));
        } else {
            recorded += 1;
        }
    }

    let mut lines = vec!["✅ Bulk Attendance Recorded".to_string(), String::new(), format!("Match: {match_id}"), format!("Recorded: {recorded}/{}", records.len())];
    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("Failures:".to_string());
        lines.extend(failures.iter().map(|f| format!("• {f}")));
    }
    lines.join("\n")
}

pub async fn get_available_players_for_match(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, _match_id: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "players");
    let filter = Filter::eq("status", json!(PlayerStatus::Active));
    let players: Vec<Player> = match store.query_documents(&collection, &[filter], None).await {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("list available players", e),
    };

    if players.is_empty() {
        return "📋 Available Players\n\nNone are active right now.".to_string();
    }

    let mut lines = vec![format!("📋 Available Players ({}):", players.len()), String::new()];
    lines.extend(players.iter().map(|p| format!("• {} — {}", p.full_name, p.player_id)));
    lines.join("\n")
}

pub async fn select_squad(
    ctx: &ToolContext,
    telegram_id: i64,
    team_id: &str,
    chat_type: &str,
    match_id: &str,
    player_ids: &[String],
) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(match_id, "Match ID") {
        return e;
    }
    if player_ids.is_empty() {
        return "❌ At least one player ID is required to select a squad.".to_string();
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "matches");
    let patch = json!({ "squad": player_ids });
    match store.update_document(&collection, match_id, patch).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => {
            if let Err(e) = store
                .create_document(&collection, json!({ "match_id": match_id, "squad": player_ids }), Some(match_id.to_string()))
                .await
            {
                return store_error("select squad", e);
            }
        }
        Err(e) => return store_error("select squad", e),
    }

    format!("✅ Squad Selected\n\nMatch: {match_id}\nPlayers: {}", player_ids.len())
}

// ---------------------------------------------------------------------
// Communication tools
// ---------------------------------------------------------------------

pub async fn send_message(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, chat_id: i64, text: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(text, "Message text") {
        return e;
    }
    let registry = &ctx.registry;
    let Some(instance) = registry.get_service("fleet") else {
        return "❌ Messaging service is temporarily unavailable. Please try again later.".to_string();
    };
    let Ok(fleet) = instance.downcast::<Arc<crate::fleet::FleetManager>>() else {
        return "❌ Messaging service is temporarily unavailable. Please try again later.".to_string();
    };

    let mut targets = std::collections::HashMap::new();
    targets.insert(team_id.to_string(), chat_id);
    let results = fleet.broadcast(&targets, text).await;
    match results.get(team_id) {
        Some(Ok(())) => "✅ Message sent.".to_string(),
        Some(Err(e)) => format!("❌ Failed to send message: {e}"),
        None => "❌ No running bot worker for this team.".to_string(),
    }
}

pub async fn send_announcement(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, leadership_chat_id: i64, text: &str) -> String {
    let reply = send_message(ctx, telegram_id, team_id, chat_type, leadership_chat_id, &format!("📢 Announcement\n\n{text}")).await;
    if reply.starts_with("✅") { "✅ Announcement sent.".to_string() } else { reply }
}

pub async fn send_poll(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, chat_id: i64, question: &str, options: &[String]) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(question, "Poll question") {
        return e;
    }
    if options.len() < 2 {
        return "❌ A poll requires at least two options.".to_string();
    }
    let body = format!("🗳️ {question}\n\n{}", options.iter().enumerate().map(|(i, o)| format!("{}. {o}", i + 1)).collect::<Vec<_>>().join("\n"));
    send_message(ctx, telegram_id, team_id, chat_type, chat_id, &body).await
}

pub async fn send_telegram_message(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, chat_id: i64, text: &str) -> String {
    send_message(ctx, telegram_id, team_id, chat_type, chat_id, text).await
}

pub async fn get_invite_link(ctx: &ToolContext, telegram_id: i64, team_id: &str, chat_type: &str, player_id: &str) -> String {
    if let Err(e) = validate_canonical(telegram_id, team_id, chat_type) {
        return e;
    }
    if let Err(e) = require_field(player_id, "Player ID") {
        return e;
    }
    let store = match ctx.store() {
        Ok(s) => s,
        Err(e) => return e,
    };

    let collection = team_collection(team_id, "invite_links");
    let links: Vec<InviteLink> = match store
        .query_documents(&collection, &[Filter::eq("player_id", json!(player_id))], None)
        .await
    {
        Ok(docs) => docs.into_iter().filter_map(|d| serde_json::from_value(d.data).ok()).collect(),
        Err(e) => return store_error("look up invite link", e),
    };

    let now = Utc::now();
    match links.into_iter().find(|l| !l.is_expired(now) && l.status == InviteLinkStatus::Active) {
        Some(link) => format!("🔗 Invite link for {player_id}\n\nToken: {}\nExpires: {}", link.secure_token, link.expires_at),
        None => format!("❌ No active invite link found for player {player_id}."),
    }
}

// ---------------------------------------------------------------------
// Tool registry
//
// A command name maps to one `(validator, handler)` pair: the validator
// checks the raw argument tokens are shaped correctly before the handler
// ever touches the store, and the handler adapts those tokens to the
// tool function's own canonical parameters. This table is the single
// source of truth for which commands exist — the router looks commands
// up here instead of matching on command names itself.
// ---------------------------------------------------------------------

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;
type Validator = fn(&[String]) -> Result<(), String>;
type Handler = for<'a> fn(&'a ToolContext, i64, &'a str, &'a str, &'a [String]) -> ToolFuture<'a>;

/// One registered command: its argument validator and the handler that
/// adapts validated tokens into a tool call.
pub struct ToolEntry {
    pub validator: Validator,
    pub handler: Handler,
}

/// Command name → `(validator, handler)`, built once at startup and
/// shared read-only from then on.
pub struct ToolRegistry {
    entries: HashMap<&'static str, ToolEntry>,
}

impl ToolRegistry {
    pub fn get(&self, command: &str) -> Option<&ToolEntry> {
        self.entries.get(command)
    }

    pub fn contains(&self, command: &str) -> bool {
        self.entries.contains_key(command)
    }

    /// Validate and invoke `command`'s registered tool, or `None` if no
    /// such command is registered.
    pub async fn dispatch(
        &self,
        command: &str,
        ctx: &ToolContext,
        telegram_id: i64,
        team_id: &str,
        chat_type: &str,
        tokens: &[String],
    ) -> Option<String> {
        let entry = self.entries.get(command)?;
        if let Err(e) = (entry.validator)(tokens) {
            return Some(e);
        }
        Some((entry.handler)(ctx, telegram_id, team_id, chat_type, tokens).await)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        let mut entries: HashMap<&'static str, ToolEntry> = HashMap::new();
        macro_rules! register {
            ($name:expr, $validator:expr, $handler:expr) => {
                entries.insert($name, ToolEntry { validator: $validator, handler: $handler });
            };
        }

        register!("approve", validate_player_id, h_approve_player);
        register!("status", no_args, h_get_my_status);
        register!("myinfo", no_args, h_get_my_status);
        register!("playerstatus", validate_player_id, h_get_player_status);
        register!("allplayers", no_args, h_get_all_players);
        register!("activeplayers", no_args, h_get_active_players);
        register!("list", no_args, h_list_team_members_and_players);
        register!("addplayer", validate_name_and_phone, h_add_player);
        register!("addmember", validate_name_and_phone, h_team_member_registration);
        register!("myteamstatus", no_args, h_get_my_team_member_status);
        register!("members", no_args, h_get_team_members);
        register!("addrole", validate_target_and_role, h_add_team_member_role);
        register!("removerole", validate_target_id, h_remove_team_member_role);
        register!("promote", validate_target_id, h_promote_team_member_to_admin);
        register!("attendance", validate_attendance_args, h_record_attendance);
        register!("matchattendance", validate_match_id, h_get_match_attendance);
        register!("attendancehistory", validate_player_id, h_get_player_attendance_history);
        register!("bulkattendance", validate_bulk_attendance_args, h_bulk_record_attendance);
        register!("available", validate_match_id, h_get_available_players_for_match);
        register!("squad", validate_squad_args, h_select_squad);
        register!("invite", validate_player_id, h_get_invite_link);
        register!("poll", validate_poll_args, h_send_poll);
        register!("announce", validate_chat_id_and_text, h_send_announcement);
        register!("broadcast", validate_chat_id_and_text, h_send_telegram_message);

        Self { entries }
    }
}

fn no_args(_tokens: &[String]) -> Result<(), String> {
    Ok(())
}

fn validate_player_id(tokens: &[String]) -> Result<(), String> {
    if tokens.is_empty() { Err("❌ Player ID is required.".to_string()) } else { Ok(()) }
}

fn validate_match_id(tokens: &[String]) -> Result<(), String> {
    if tokens.is_empty() { Err("❌ Match ID is required.".to_string()) } else { Ok(()) }
}

fn validate_target_id(tokens: &[String]) -> Result<(), String> {
    if tokens.is_empty() || tokens[0].parse::<i64>().is_err() {
        Err("❌ A valid target Telegram ID is required.".to_string())
    } else {
        Ok(())
    }
}

fn validate_target_and_role(tokens: &[String]) -> Result<(), String> {
    validate_target_id(tokens)?;
    match tokens.get(1) {
        Some(raw) if parse_role(raw).is_some() => Ok(()),
        _ => Err("❌ Usage: /addrole <telegram_id> <role>".to_string()),
    }
}

fn validate_name_and_phone(tokens: &[String]) -> Result<(), String> {
    if tokens.len() < 2 {
        Err("❌ Usage: <\"full name\"> <phone>".to_string())
    } else {
        Ok(())
    }
}

fn validate_attendance_args(tokens: &[String]) -> Result<(), String> {
    if tokens.len() < 3 {
        Err("❌ Usage: /attendance <match_id> <player_id> <attended|absent|late> [reason]".to_string())
    } else {
        Ok(())
    }
}

fn validate_bulk_attendance_args(tokens: &[String]) -> Result<(), String> {
    if tokens.len() < 2 {
        Err("❌ Usage: /bulkattendance <match_id> <player_id:status> ...".to_string())
    } else {
        Ok(())
    }
}

fn validate_squad_args(tokens: &[String]) -> Result<(), String> {
    if tokens.len() < 2 {
        Err("❌ Usage: /squad <match_id> <player_id> ...".to_string())
    } else {
        Ok(())
    }
}

fn validate_poll_args(tokens: &[String]) -> Result<(), String> {
    if tokens.len() < 4 || tokens[0].parse::<i64>().is_err() {
        Err("❌ Usage: /poll <chat_id> <question> <option> <option> ...".to_string())
    } else {
        Ok(())
    }
}

fn validate_chat_id_and_text(tokens: &[String]) -> Result<(), String> {
    match tokens.first() {
        Some(id) if id.parse::<i64>().is_ok() && tokens.len() > 1 => Ok(()),
        _ => Err("❌ Usage: <chat_id> <text>".to_string()),
    }
}

fn parse_role(raw: &str) -> Option<TeamMemberRole> {
    match raw.to_lowercase().as_str() {
        "coach" => Some(TeamMemberRole::Coach),
        "manager" => Some(TeamMemberRole::Manager),
        "assistant" => Some(TeamMemberRole::Assistant),
        "coordinator" => Some(TeamMemberRole::Coordinator),
        "volunteer" => Some(TeamMemberRole::Volunteer),
        "admin" => Some(TeamMemberRole::Admin),
        "club_administrator" => Some(TeamMemberRole::ClubAdministrator),
        "team_manager" => Some(TeamMemberRole::TeamManager),
        "team_member" => Some(TeamMemberRole::TeamMember),
        _ => None,
    }
}

fn h_approve_player<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { approve_player(ctx, telegram_id, team_id, chat_type, &tokens[0]).await })
}

fn h_get_my_status<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, _tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_my_status(ctx, telegram_id, team_id, chat_type).await })
}

fn h_get_player_status<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_player_status(ctx, telegram_id, team_id, chat_type, &tokens[0]).await })
}

fn h_get_all_players<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, _tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_all_players(ctx, telegram_id, team_id, chat_type).await })
}

fn h_get_active_players<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, _tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_active_players(ctx, telegram_id, team_id, chat_type).await })
}

fn h_list_team_members_and_players<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    _tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move { list_team_members_and_players(ctx, telegram_id, team_id, chat_type).await })
}

fn h_add_player<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let phone = &tokens[tokens.len() - 1];
        let full_name = tokens[..tokens.len() - 1].join(" ");
        add_player(ctx, telegram_id, team_id, chat_type, &full_name, phone).await
    })
}

fn h_team_member_registration<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let phone = &tokens[tokens.len() - 1];
        let full_name = tokens[..tokens.len() - 1].join(" ");
        team_member_registration(ctx, telegram_id, team_id, chat_type, &full_name, phone, TeamMemberRole::TeamMember).await
    })
}

fn h_get_my_team_member_status<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    _tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move { get_my_team_member_status(ctx, telegram_id, team_id, chat_type).await })
}

fn h_get_team_members<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let role = tokens.first().and_then(|t| parse_role(t));
        get_team_members(ctx, telegram_id, team_id, chat_type, role).await
    })
}

fn h_add_team_member_role<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let target = tokens[0].parse::<i64>().unwrap_or(0);
        let role = parse_role(&tokens[1]).unwrap_or(TeamMemberRole::TeamMember);
        add_team_member_role(ctx, telegram_id, team_id, chat_type, target, role).await
    })
}

fn h_remove_team_member_role<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let target = tokens[0].parse::<i64>().unwrap_or(0);
        remove_team_member_role(ctx, telegram_id, team_id, chat_type, target).await
    })
}

fn h_promote_team_member_to_admin<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let target = tokens[0].parse::<i64>().unwrap_or(0);
        promote_team_member_to_admin(ctx, telegram_id, team_id, chat_type, target).await
    })
}

fn h_record_attendance<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let reason = if tokens.len() > 3 { Some(tokens[3..].join(" ")) } else { None };
        record_attendance(ctx, telegram_id, team_id, chat_type, &tokens[0], &tokens[1], &tokens[2], reason.as_deref()).await
    })
}

fn h_get_match_attendance<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_match_attendance(ctx, telegram_id, team_id, chat_type, &tokens[0]).await })
}

fn h_get_player_attendance_history<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let limit = tokens.get(1).and_then(|t| t.parse::<usize>().ok()).unwrap_or(10);
        get_player_attendance_history(ctx, telegram_id, team_id, chat_type, &tokens[0], limit).await
    })
}

fn h_bulk_record_attendance<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move {
        let records: Vec<(String, String)> = tokens[1..]
            .iter()
            .filter_map(|t| t.split_once(':'))
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        bulk_record_attendance(ctx, telegram_id, team_id, chat_type, &tokens[0], &records).await
    })
}

fn h_get_available_players_for_match<'a>(
    ctx: &'a ToolContext,
    telegram_id: i64,
    team_id: &'a str,
    chat_type: &'a str,
    tokens: &'a [String],
) -> ToolFuture<'a> {
    Box::pin(async move { get_available_players_for_match(ctx, telegram_id, team_id, chat_type, &tokens[0]).await })
}

fn h_select_squad<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let player_ids = tokens[1..].to_vec();
        select_squad(ctx, telegram_id, team_id, chat_type, &tokens[0], &player_ids).await
    })
}

fn h_get_invite_link<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move { get_invite_link(ctx, telegram_id, team_id, chat_type, &tokens[0]).await })
}

fn h_send_poll<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let chat_id = tokens[0].parse::<i64>().unwrap_or(0);
        let question = &tokens[1];
        let options = tokens[2..].to_vec();
        send_poll(ctx, telegram_id, team_id, chat_type, chat_id, question, &options).await
    })
}

fn h_send_announcement<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let chat_id = tokens[0].parse::<i64>().unwrap_or(0);
        let text = tokens[1..].join(" ");
        send_announcement(ctx, telegram_id, team_id, chat_type, chat_id, &text).await
    })
}

fn h_send_telegram_message<'a>(ctx: &'a ToolContext, telegram_id: i64, team_id: &'a str, chat_type: &'a str, tokens: &'a [String]) -> ToolFuture<'a> {
    Box::pin(async move {
        let chat_id = tokens[0].parse::<i64>().unwrap_or(0);
        let text = tokens[1..].join(" ");
        send_telegram_message(ctx, telegram_id, team_id, chat_type, chat_id, &text).await
    })
}

/// Resolve [`crate::domain::Identity`] for `(team_id, telegram_id)` — used by
/// the router's identity-resolution step (§4.I step 2), not a tool itself.
pub async fn resolve_identity(
    store: &dyn Store,
    team_id: &str,
    telegram_id: i64,
) -> Result<crate::domain::Identity, StoreError> {
    use crate::domain::Identity;

    let player = find_player_by_telegram_id(store, team_id, telegram_id).await?;
    let member = find_member_by_telegram_id(store, team_id, telegram_id).await?;
    Ok(match (player.is_some(), member.is_some()) {
        (true, true) => Identity::Both,
        (true, false) => Identity::PlayerOnly,
        (false, true) => Identity::MemberOnly,
        (false, false) => Identity::Unregistered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryConfig, ServiceDefinition, ServiceType};
    use crate::store::MemoryStore;

    fn ctx_with_store(store: Arc<dyn Store>) -> ToolContext {
        let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default()));
        let instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(store);
        registry.register_service(ServiceDefinition::new("store", ServiceType::Core), Some(instance));
        ToolContext::new(registry)
    }

    #[tokio::test]
    async fn add_player_rejects_duplicate_phone() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = ctx_with_store(store);

        let first = add_player(&ctx, 1, "KTI", "leadership", "Alice", "+447000000001").await;
        assert!(first.starts_with("✅"), "{first}");

        let second = add_player(&ctx, 1, "KTI", "leadership", "Alice Two", "+447000000001").await;
        assert!(second.starts_with("❌ A player with phone number"), "{second}");
    }

    #[tokio::test]
    async fn approve_player_rejects_missing_telegram_id() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = ctx_with_store(store);
        let reply = approve_player(&ctx, 0, "KTI", "leadership", "P1").await;
        assert_eq!(reply, "❌ Valid Telegram ID is required.");
    }

    #[tokio::test]
    async fn approve_player_approves_existing_player() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let player = Player {
            player_id: "P1".into(),
            team_id: "KTI".into(),
            telegram_id: None,
            phone_number: "+44700".into(),
            full_name: "Bob".into(),
            position: None,
            status: PlayerStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        store.seed(&team_collection("KTI", "players"), "P1", serde_json::to_value(&player).unwrap());

        let ctx = ctx_with_store(store);
        let reply = approve_player(&ctx, 1, "KTI", "leadership", "P1").await;
        assert!(reply.contains("Player Approved Successfully"), "{reply}");
        assert!(reply.contains("Bob"));
    }

    #[tokio::test]
    async fn get_my_status_reports_unregistered() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = ctx_with_store(store);
        let reply = get_my_status(&ctx, 42, "KTI", "main").await;
        assert!(reply.starts_with("❌ You are not registered"), "{reply}");
    }

    #[tokio::test]
    async fn record_attendance_rejects_invalid_status() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = ctx_with_store(store);
        let reply = record_attendance(&ctx, 1, "KTI", "leadership", "M1", "P1", "maybe", None).await;
        assert!(reply.starts_with("❌ Invalid status"), "{reply}");
    }

    #[tokio::test]
    async fn store_unavailable_surfaces_friendly_message() {
        let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default()));
        let ctx = ToolContext::new(registry);
        let reply = get_my_status(&ctx, 1, "KTI", "main").await;
        assert!(reply.starts_with("❌ Store service is temporarily unavailable"), "{reply}");
    }

    #[tokio::test]
    async fn resolve_identity_detects_both() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let player = Player {
            player_id: "P1".into(),
            team_id: "KTI".into(),
            telegram_id: Some(7),
            phone_number: "+44700".into(),
            full_name: "Carol".into(),
            position: None,
            status: PlayerStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let member = TeamMember {
            member_id: "M1".into(),
            team_id: "KTI".into(),
            telegram_id: Some(7),
            phone_number: "+44700".into(),
            full_name: "Carol".into(),
            role: TeamMemberRole::Coach,
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        store.seed(&team_collection("KTI", "players"), "P1", serde_json::to_value(&player).unwrap());
        store.seed(&team_collection("KTI", "team_members"), "M1", serde_json::to_value(&member).unwrap());

        let identity = resolve_identity(store.as_ref(), "KTI", 7).await.unwrap();
        assert_eq!(identity, crate::domain::Identity::Both);
    }

    #[test]
    fn registry_rejects_unknown_command() {
        let registry = ToolRegistry::default();
        assert!(!registry.contains("nosuchcommand"));
        assert!(registry.get("nosuchcommand").is_none());
    }

    #[test]
    fn registry_contains_the_authoritative_tool_set() {
        let registry = ToolRegistry::default();
        for command in [
            "approve",
            "playerstatus",
            "allplayers",
            "activeplayers",
            "addplayer",
            "addmember",
            "myteamstatus",
            "members",
            "addrole",
            "removerole",
            "promote",
            "attendance",
            "matchattendance",
            "attendancehistory",
            "bulkattendance",
            "available",
            "squad",
            "invite",
            "poll",
            "announce",
            "broadcast",
        ] {
            assert!(registry.contains(command), "missing command: {command}");
        }
    }

    #[tokio::test]
    async fn registry_dispatches_a_tool_never_reachable_from_the_hardcoded_match() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let player = Player {
            player_id: "P1".into(),
            team_id: "KTI".into(),
            telegram_id: None,
            phone_number: "+44700".into(),
            full_name: "Dana".into(),
            position: None,
            status: PlayerStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.seed(&team_collection("KTI", "players"), "P1", serde_json::to_value(&player).unwrap());

        let ctx = ctx_with_store(store);
        let registry = ToolRegistry::default();
        let tokens = vec!["P1".to_string()];
        let reply = registry.dispatch("playerstatus", &ctx, 1, "KTI", "leadership", &tokens).await.unwrap();
        assert!(reply.contains("Dana"), "{reply}");
    }

    #[test]
    fn registry_validator_rejects_malformed_args_before_touching_the_store() {
        let registry = ToolRegistry::default();
        let entry = registry.get("addrole").unwrap();
        let reply = (entry.validator)(&["not-a-number".to_string()]);
        assert!(reply.is_err());
    }
}
