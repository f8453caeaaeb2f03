use chrono::NaiveDateTime;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

// ============================================================================
// Ideas board models (sections of free-text suggestions)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaSection {
    pub key: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaItem {
    pub id: String,
    pub section_key: String,
    pub text: String,
    pub created_at: NaiveDateTime,
}

/// Wire shape of one item inside a section payload. Item ids are short
/// random tokens minted by the client; the server fills in blanks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaItemPayload {
    #[serde(default)]
    pub id: String,
    pub text: String,
}

/// Wire shape of a whole section, as exchanged by GET/PUT `/api/ideas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaSectionPayload {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub items: Vec<IdeaItemPayload>,
}

/// Mint a short random item token, same shape the web client produces.
pub fn new_item_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
