use crate::appraisal::{extract_certificate, AppraisalCertificate};
use crate::db::Database;
use crate::error::AppError;
use crate::llm::{Content, LlmError, Part};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Chat appraisals allowed per calendar day.
pub const DAILY_LIMIT: u32 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appraisal_data: Option<AppraisalCertificate>,
    pub created_at: String,
}

impl ChatMessage {
    fn new(role: ChatRole, text: String, appraisal_data: Option<AppraisalCertificate>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text,
            appraisal_data,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    pub date: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Transcript of the current session. Append-only; lost on restart.
#[derive(Default)]
pub struct ChatSession {
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a question and its answer as one adjacent pair.
    pub fn push_exchange(&self, question: ChatMessage, answer: ChatMessage) {
        let mut messages = self.lock();
        messages.push(question);
        messages.push(answer);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Today's date in local time, as stored by the usage counter.
pub fn local_today() -> String {
    chrono::Local::now().date_naive().to_string()
}

pub fn usage_status(db: &Database, today: &str) -> Result<UsageStatus, AppError> {
    let usage = db.load_daily_usage(today)?;
    Ok(UsageStatus {
        date: usage.date,
        used: usage.count,
        limit: DAILY_LIMIT,
        remaining: DAILY_LIMIT.saturating_sub(usage.count),
    })
}

/// Model turns for the transcript; the last user turn carries `instructions`.
pub fn history_contents(messages: &[ChatMessage], instructions: &str) -> Vec<Content> {
    let mut contents: Vec<Content> = messages
        .iter()
        .map(|m| match m.role {
            ChatRole::User => Content::user(vec![Part::text(m.text.clone())]),
            ChatRole::Model => Content::model(m.text.clone()),
        })
        .collect();

    let ends_with_user = messages.last().is_some_and(|m| m.role == ChatRole::User);
    match contents.last_mut() {
        Some(last) if ends_with_user => last.parts.push(Part::text(instructions)),
        _ => contents.push(Content::user(vec![Part::text(instructions)])),
    }
    contents
}

/// One chat exchange. A slot of the daily allowance is reserved before the
/// model is contacted and handed back if the call fails; the transcript only
/// gains the question and its reply together, after a successful call.
pub async fn run_turn<F, Fut>(
    db: &Database,
    session: &ChatSession,
    today: &str,
    text: &str,
    appraise: F,
) -> Result<ChatMessage, AppError>
where
    F: FnOnce(Vec<ChatMessage>) -> Fut,
    Fut: Future<Output = Result<String, LlmError>>,
{
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidInput("Please describe the item first.".into()));
    }

    let Some(used) = db.try_reserve_usage(today, DAILY_LIMIT)? else {
        log::info!("Daily appraisal limit reached ({})", DAILY_LIMIT);
        return Err(AppError::DailyLimitReached { limit: DAILY_LIMIT });
    };

    let question = ChatMessage::new(ChatRole::User, text.to_string(), None);
    let mut history = session.messages();
    history.push(question.clone());

    let raw = match appraise(history).await {
        Ok(raw) => raw,
        Err(e) => {
            if let Err(release) = db.release_usage(today) {
                log::error!("Could not return appraisal slot: {}", release);
            }
            return Err(e.into());
        }
    };

    let extraction = extract_certificate(&raw);
    let reply = ChatMessage::new(ChatRole::Model, extraction.narrative, extraction.certificate);
    session.push_exchange(question, reply.clone());
    log::info!("Appraisal {}/{} for {}", used, DAILY_LIMIT, today);
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use futures::executor::block_on;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const REPLY: &str = r#"귀한 분청사기로구려. {"certificate": {"id": "CERT-100001", "itemName": "분청사기 박지모란문 편병", "rarity": "희귀"}}"#;

    fn turn(db: &Database, session: &ChatSession, today: &str, calls: &Cell<u32>) -> Result<ChatMessage, AppError> {
        block_on(run_turn(db, session, today, "이 병을 봐 주시오", |_| {
            calls.set(calls.get() + 1);
            async { Ok(REPLY.to_string()) }
        }))
    }

    #[test]
    fn reply_carries_extracted_certificate() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();
        let calls = Cell::new(0);

        let reply = turn(&db, &session, "2026-10-16", &calls).unwrap();
        assert_eq!(reply.role, ChatRole::Model);
        assert_eq!(reply.text, "귀한 분청사기로구려.");
        assert_eq!(reply.appraisal_data.unwrap().item_name, "분청사기 박지모란문 편병");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(usage_status(&db, "2026-10-16").unwrap().used, 1);
    }

    #[test]
    fn request_after_the_limit_never_reaches_the_model() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();
        let calls = Cell::new(0);

        for _ in 0..DAILY_LIMIT {
            turn(&db, &session, "2026-10-16", &calls).unwrap();
        }
        assert_eq!(calls.get(), DAILY_LIMIT);

        let rejected = turn(&db, &session, "2026-10-16", &calls);
        assert!(matches!(rejected, Err(AppError::DailyLimitReached { limit: DAILY_LIMIT })));
        assert_eq!(calls.get(), DAILY_LIMIT);
        assert_eq!(session.messages().len(), 2 * DAILY_LIMIT as usize);

        assert!(turn(&db, &session, "2026-10-17", &calls).is_ok());
        assert_eq!(usage_status(&db, "2026-10-17").unwrap().used, 1);
    }

    #[test]
    fn failed_call_is_not_counted() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();

        let result = block_on(run_turn(&db, &session, "2026-10-16", "hello", |_| async {
            Err(LlmError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        }));
        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(usage_status(&db, "2026-10-16").unwrap().remaining, DAILY_LIMIT);
    }

    #[test]
    fn failed_call_leaves_no_dangling_question() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();

        let _ = block_on(run_turn(&db, &session, "2026-10-16", "first try", |_| async {
            Err(LlmError::Parse("model returned no text".into()))
        }));
        assert!(session.messages().is_empty());

        let seen = std::cell::RefCell::new(Vec::new());
        block_on(run_turn(&db, &session, "2026-10-16", "second try", |history| {
            *seen.borrow_mut() = history;
            async { Ok(REPLY.to_string()) }
        }))
        .unwrap();

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].text, "second try");
        let roles: Vec<_> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Model]);
    }

    #[test]
    fn concurrent_turns_never_exceed_the_limit() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();
        let calls = AtomicU32::new(0);

        let (db, session, calls) = (&db, &session, &calls);
        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    scope.spawn(move || {
                        block_on(run_turn(db, session, "2026-10-16", "이 병을 봐 주시오", |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(100));
                            async { Ok(REPLY.to_string()) }
                        }))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Result::is_ok)
                .count() as u32
        });

        assert_eq!(accepted, DAILY_LIMIT);
        assert_eq!(calls.load(Ordering::SeqCst), DAILY_LIMIT);
        assert_eq!(usage_status(&db, "2026-10-16").unwrap().used, DAILY_LIMIT);
        assert_eq!(session.messages().len(), 2 * DAILY_LIMIT as usize);
    }

    #[test]
    fn blank_input_is_rejected() {
        let db = Database::in_memory().unwrap();
        let session = ChatSession::new();
        let calls = Cell::new(0);
        let result = block_on(run_turn(&db, &session, "2026-10-16", "   ", |_| {
            calls.set(1);
            async { Ok(String::new()) }
        }));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(calls.get(), 0);
        assert!(session.messages().is_empty());
    }

    #[test]
    fn history_ends_with_instructions_on_the_user_turn() {
        let messages = vec![
            ChatMessage::new(ChatRole::User, "first".into(), None),
            ChatMessage::new(ChatRole::Model, "answer".into(), None),
            ChatMessage::new(ChatRole::User, "second".into(), None),
        ];
        let contents = history_contents(&messages, "PROMPT");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, Role::Model);
        assert_eq!(
            contents[2].parts,
            vec![Part::text("second"), Part::text("PROMPT")]
        );
    }

    #[test]
    fn clearing_the_session_empties_history() {
        let session = ChatSession::new();
        session.push_exchange(
            ChatMessage::new(ChatRole::User, "x".into(), None),
            ChatMessage::new(ChatRole::Model, "y".into(), None),
        );
        session.clear();
        assert!(session.messages().is_empty());
    }
}
