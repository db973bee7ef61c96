//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CHALLENGES: &str = "challenges";
    /// Attempt rows keyed by `{user_id}_{challenge_id}_{day}`
    pub const ATTEMPTS: &str = "challenge_attempts";
    pub const CONVERSATIONS: &str = "conversations";
    pub const MESSAGES: &str = "chat_messages";
}
