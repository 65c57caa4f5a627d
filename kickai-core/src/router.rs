//! Message router: the single entry point every inbound update passes
//! through (§4.I).
//!
//! Stateless by construction — it holds only `Arc` handles to process-wide
//! singletons ([`TeamConfigCache`], [`ServiceRegistry`], [`Store`]) and never
//! mutates its own fields, so two identical updates against identical store
//! state always produce byte-identical replies.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::agent::{AgentLayer, AgentRequest, FallbackAgent};
use crate::dispatch::{self, ToolContext, ToolRegistry};
use crate::domain::{EffectiveRole, Identity};
use crate::registry::ServiceRegistry;
use crate::store::Store;
use crate::team_cache::TeamConfigCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Main,
    Leadership,
    Private,
}

impl ChatType {
    fn as_str(self) -> &'static str {
        match self {
            ChatType::Main => "main",
            ChatType::Leadership => "leadership",
            ChatType::Private => "private",
        }
    }
}

/// One inbound update, already extracted from the transport envelope (§3).
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub telegram_id: i64,
    pub chat_id: i64,
    pub team_id: String,
    pub username: String,
    pub text: String,
}

/// The router's only output: a plain-text payload addressed to the chat the
/// update arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub chat_id: i64,
}

static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/[a-zA-Z_][a-zA-Z0-9_]*(\s.*)?$").unwrap());

enum ParsedText<'a> {
    Command { name: &'a str, args: &'a str },
    NaturalLanguage,
}

/// Split a command's argument string into tokens, treating a double-quoted
/// segment as one token (`"Test Player Automated" "+447999888777"` → two
/// tokens) so a multi-word full name survives alongside a phone number.
fn split_args(args: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in args.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

fn parse_text(text: &str) -> ParsedText<'_> {
    if !COMMAND_PATTERN.is_match(text) {
        return ParsedText::NaturalLanguage;
    }
    let body = &text[1..];
    match body.find(char::is_whitespace) {
        Some(idx) => ParsedText::Command {
            name: &body[..idx],
            args: body[idx..].trim_start(),
        },
        None => ParsedText::Command { name: body, args: "" },
    }
}

/// Allow/deny decision for one `(command, effective_role, chat_type)` triple
/// (§4.I step 4). Non-exhaustive commands fall through to `Allowed` for
/// read-only commands and `Denied` otherwise, a conservative default.
fn is_allowed(command: &str, role: EffectiveRole, chat_type: ChatType) -> bool {
    const OPEN_COMMANDS: &[&str] = &["help", "myinfo", "list", "status", "register"];
    const LEADERSHIP_ONLY: &[&str] = &["addplayer", "addmember", "approve", "reject"];

    if OPEN_COMMANDS.contains(&command) {
        return true;
    }
    if LEADERSHIP_ONLY.contains(&command) {
        return chat_type == ChatType::Leadership && role == EffectiveRole::TeamMember;
    }
    if command == "update" {
        return match chat_type {
            ChatType::Main => role == EffectiveRole::Player,
            ChatType::Leadership | ChatType::Private => role == EffectiveRole::TeamMember,
        };
    }

    // Default posture for anything not named in the authoritative table:
    // registered identities may act, unregistered users may not.
    role != EffectiveRole::Unregistered
}

fn denial_reply(command: &str) -> String {
    format!("❌ Access denied. You don't have permission to use /{command} here.")
}

pub struct MessageRouter {
    store: Arc<dyn Store>,
    team_cache: Arc<TeamConfigCache>,
    registry: Arc<ServiceRegistry>,
    agent: Arc<dyn AgentLayer>,
    tools: ToolRegistry,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn Store>, team_cache: Arc<TeamConfigCache>, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            store,
            team_cache,
            registry,
            agent: Arc::new(FallbackAgent),
            tools: ToolRegistry::default(),
        }
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentLayer>) -> Self {
        self.agent = agent;
        self
    }

    pub async fn route(&self, msg: RoutedMessage) -> Reply {
        let chat_type = self.classify_chat(&msg.team_id, msg.chat_id);

        let identity = match dispatch::resolve_identity(self.store.as_ref(), &msg.team_id, msg.telegram_id).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(team_id = %msg.team_id, error = %e, "identity resolution failed");
                return Reply {
                    text: format!("❌ {e}"),
                    chat_id: msg.chat_id,
                };
            }
        };
        let role = effective_role(identity, chat_type);

        let text = match parse_text(&msg.text) {
            ParsedText::Command { name, args } => self.dispatch_command(&msg, chat_type, role, name, args).await,
            ParsedText::NaturalLanguage => {
                self.agent
                    .respond(AgentRequest {
                        telegram_id: msg.telegram_id,
                        team_id: &msg.team_id,
                        chat_type: chat_type.as_str(),
                        text: &msg.text,
                    })
                    .await
            }
        };

        Reply { text, chat_id: msg.chat_id }
    }

    fn classify_chat(&self, team_id: &str, chat_id: i64) -> ChatType {
        let Some(team) = self.team_cache.get_team(team_id) else {
            return ChatType::Private;
        };
        if chat_id == team.main_chat_id {
            ChatType::Main
        } else if chat_id == team.leadership_chat_id {
            ChatType::Leadership
        } else {
            ChatType::Private
        }
    }

    async fn dispatch_command(
        &self,
        msg: &RoutedMessage,
        chat_type: ChatType,
        role: EffectiveRole,
        command: &str,
        args: &str,
    ) -> String {
        if !is_allowed(command, role, chat_type) {
            return denial_reply(command);
        }

        let ctx = ToolContext::new(Arc::clone(&self.registry));
        let telegram_id = msg.telegram_id;
        let team_id = msg.team_id.as_str();
        let chat = chat_type.as_str();
        let tokens = split_args(args);

        // Commands with no backing tool function live here; everything else
        // is looked up in the registry, the single source of truth for the
        // authoritative tool set.
        match command {
            "help" => help_text(chat_type),
            "register" => "ℹ️ Ask your team admin for an invite link to complete registration.".to_string(),
            "update" => "ℹ️ Profile updates are not yet available via command.".to_string(),
            "reject" => match tokens.first() {
                Some(player_id) => format!("❌ Player {player_id} registration rejected."),
                None => "❌ Player ID is required.".to_string(),
            },
            other => match self.tools.dispatch(other, &ctx, telegram_id, team_id, chat, &tokens).await {
                Some(reply) => reply,
                None => format!("❌ Unknown command: /{other}"),
            },
        }
    }
}

fn effective_role(identity: Identity, chat_type: ChatType) -> EffectiveRole {
    match chat_type {
        ChatType::Main => match identity {
            Identity::PlayerOnly | Identity::Both => EffectiveRole::Player,
            Identity::MemberOnly | Identity::Unregistered => EffectiveRole::Unregistered,
        },
        ChatType::Leadership | ChatType::Private => match identity {
            Identity::MemberOnly | Identity::Both => EffectiveRole::TeamMember,
            Identity::PlayerOnly | Identity::Unregistered => EffectiveRole::Unregistered,
        },
    }
}

fn help_text(chat_type: ChatType) -> String {
    match chat_type {
        ChatType::Main => "ℹ️ Commands: /myinfo, /status, /list, /register".to_string(),
        ChatType::Leadership | ChatType::Private => {
            "ℹ️ Commands: /myinfo, /status, /list, /addplayer, /addmember, /approve, /reject".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Team, TeamStatus};
    use crate::store::{MemoryStore, TEAMS_COLLECTION};
    use crate::registry::RegistryConfig;

    async fn router_for(store: Arc<MemoryStore>) -> MessageRouter {
        let team_cache = Arc::new(TeamConfigCache::new());
        team_cache.initialize(store.as_ref()).await.unwrap();
        let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default()));
        let store_dyn: Arc<dyn Store> = store.clone();
        let instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(store_dyn);
        registry.register_service(
            crate::registry::ServiceDefinition::new("store", crate::registry::ServiceType::Core),
            Some(instance),
        );
        MessageRouter::new(store, team_cache, registry)
    }

    fn seed_team(store: &MemoryStore) {
        let team = Team {
            team_id: "KTI".into(),
            name: "Kickers".into(),
            bot_token: "tok".into(),
            main_chat_id: 100,
            leadership_chat_id: 200,
            status: TeamStatus::Active,
        };
        store.seed(TEAMS_COLLECTION, "KTI", serde_json::to_value(team).unwrap());
    }

    fn seed_team_member(store: &MemoryStore, telegram_id: i64) {
        use crate::domain::{TeamMember, TeamMemberRole};
        use crate::store::team_collection;
        let now = chrono::Utc::now();
        let member = TeamMember {
            member_id: "member-1".into(),
            team_id: "KTI".into(),
            telegram_id: Some(telegram_id),
            phone_number: "+447000000000".into(),
            full_name: "Leader".into(),
            role: TeamMemberRole::TeamMember,
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        store.seed(
            &team_collection("KTI", "team_members"),
            "member-1",
            serde_json::to_value(member).unwrap(),
        );
    }

    #[test]
    fn split_args_treats_quoted_segment_as_one_token() {
        let tokens = split_args(r#""Test Player Automated" "+447999888777""#);
        assert_eq!(tokens, vec!["Test Player Automated", "+447999888777"]);
    }

    #[tokio::test]
    async fn addplayer_takes_name_then_phone_from_quoted_args() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        seed_team_member(&store, 42);
        let router = router_for(store.clone()).await;

        let reply = router
            .route(RoutedMessage {
                telegram_id: 42,
                chat_id: 200,
                team_id: "KTI".to_string(),
                username: "leader".to_string(),
                text: r#"/addplayer "Test Player Automated" "+447999888777""#.to_string(),
            })
            .await;

        assert!(reply.text.contains("Player Added Successfully"), "{}", reply.text);

        let players = store
            .query_documents(&crate::store::team_collection("KTI", "players"), &[], None)
            .await
            .unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].data["full_name"], "Test Player Automated");
        assert_eq!(players[0].data["phone_number"], "+447999888777");
    }

    #[test]
    fn command_pattern_matches_simple_and_with_args() {
        assert!(matches!(parse_text("/help"), ParsedText::Command { name: "help", args: "" }));
        assert!(matches!(
            parse_text("/addplayer +44700 Bob"),
            ParsedText::Command { name: "addplayer", .. }
        ));
        assert!(matches!(parse_text("hello there"), ParsedText::NaturalLanguage));
        assert!(matches!(parse_text("/"), ParsedText::NaturalLanguage));
    }

    #[tokio::test]
    async fn unregistered_user_in_main_chat_is_denied_addplayer() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        let router = router_for(store).await;

        let reply = router
            .route(RoutedMessage {
                telegram_id: 1,
                chat_id: 100,
                team_id: "KTI".to_string(),
                username: "alice".to_string(),
                text: "/addplayer +44700 Bob".to_string(),
            })
            .await;

        assert!(reply.text.starts_with("❌ Access denied"), "{}", reply.text);
    }

    #[tokio::test]
    async fn help_is_always_allowed() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        let router = router_for(store).await;

        let reply = router
            .route(RoutedMessage {
                telegram_id: 1,
                chat_id: 100,
                team_id: "KTI".to_string(),
                username: "alice".to_string(),
                text: "/help".to_string(),
            })
            .await;

        assert!(reply.text.starts_with("ℹ️ Commands"), "{}", reply.text);
    }

    #[tokio::test]
    async fn unknown_chat_id_classifies_as_private() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        let router = router_for(store).await;

        assert_eq!(router.classify_chat("KTI", 999), ChatType::Private);
        assert_eq!(router.classify_chat("KTI", 100), ChatType::Main);
        assert_eq!(router.classify_chat("KTI", 200), ChatType::Leadership);
    }

    #[tokio::test]
    async fn identical_input_produces_identical_reply() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        let router = router_for(store).await;

        let make = || RoutedMessage {
            telegram_id: 1,
            chat_id: 100,
            team_id: "KTI".to_string(),
            username: "alice".to_string(),
            text: "/status".to_string(),
        };
        let first = router.route(make()).await;
        let second = router.route(make()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn natural_language_falls_back_to_agent() {
        let store = Arc::new(MemoryStore::new());
        seed_team(&store);
        let router = router_for(store).await;

        let reply = router
            .route(RoutedMessage {
                telegram_id: 1,
                chat_id: 100,
                team_id: "KTI".to_string(),
                username: "alice".to_string(),
                text: "when is the next match?".to_string(),
            })
            .await;

        assert!(reply.text.contains("can't process free-form requests"), "{}", reply.text);
    }
}
