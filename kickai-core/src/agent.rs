//! Natural-language fallback for messages that aren't commands (§4.I step 5).
//!
//! LLM-backed reasoning is out of scope; this crate only needs somewhere for
//! the router to hand off non-command text, and a well-defined answer for
//! when that layer has nothing configured. A real agent layer would
//! implement [`AgentLayer`] and get swapped in without touching the router.

use async_trait::async_trait;

/// Context the router passes alongside free-text input.
pub struct AgentRequest<'a> {
    pub telegram_id: i64,
    pub team_id: &'a str,
    pub chat_type: &'a str,
    pub text: &'a str,
}

#[async_trait]
pub trait AgentLayer: Send + Sync {
    async fn respond(&self, request: AgentRequest<'_>) -> String;
}

/// Deterministic stand-in used whenever no real agent layer is wired up.
/// Always returns the same explanatory reply for the same input, preserving
/// the router's statelessness guarantee.
pub struct FallbackAgent;

#[async_trait]
impl AgentLayer for FallbackAgent {
    async fn respond(&self, request: AgentRequest<'_>) -> String {
        format!(
            "🤖 I can't process free-form requests yet in team {}.\n\n\
            Try a command instead — start your message with `/`, for example `/help`.",
            request.team_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_is_deterministic() {
        let agent = FallbackAgent;
        let request = || AgentRequest {
            telegram_id: 1,
            team_id: "KTI",
            chat_type: "main",
            text: "hello there",
        };
        let first = agent.respond(request()).await;
        let second = agent.respond(request()).await;
        assert_eq!(first, second);
    }
}
