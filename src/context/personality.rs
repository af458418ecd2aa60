use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::server::client::SessionClient;

pub const PERSONALITY_HEADER: &str = "[PERSONALITY v1]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
}

pub static BUILTIN_PERSONALITIES: Lazy<Vec<Personality>> = Lazy::new(|| {
    vec![
        Personality {
            id: "professional".to_string(),
            name: "Professional".to_string(),
            description: "Clear, concise, business-appropriate responses".to_string(),
            system_prompt: format!(
                "{PERSONALITY_HEADER}\nYou are a professional assistant. Provide clear, concise, and business-appropriate responses. \nFocus on accuracy and practical solutions. Avoid unnecessary verbosity."
            ),
        },
        Personality {
            id: "efficient".to_string(),
            name: "Efficient".to_string(),
            description: "Minimal responses, maximum utility".to_string(),
            system_prompt: format!(
                "{PERSONALITY_HEADER}\nYou are an efficient assistant. Provide the shortest accurate answer possible.\nSkip pleasantries. Use bullet points and code blocks. No filler words."
            ),
        },
        Personality {
            id: "fact_based".to_string(),
            name: "Fact-Based".to_string(),
            description: "Evidence-focused, cite sources when possible".to_string(),
            system_prompt: format!(
                "{PERSONALITY_HEADER}\nYou are a fact-based assistant. Prioritize accuracy and evidence.\nCite sources when possible. Acknowledge uncertainty. Avoid speculation."
            ),
        },
        Personality {
            id: "exploratory".to_string(),
            name: "Exploratory".to_string(),
            description: "Thorough exploration, multiple perspectives".to_string(),
            system_prompt: format!(
                "{PERSONALITY_HEADER}\nYou are an exploratory assistant. Provide thorough analysis with multiple perspectives.\nConsider alternatives. Ask clarifying questions. Think out loud when helpful."
            ),
        },
    ]
});

/// Built-in and custom personalities, plus the per-session assignment. A
/// personality is applied by sending its system prompt alongside a marker
/// message.
#[derive(Debug)]
pub struct PersonalityManager {
    client: Arc<dyn SessionClient>,
    custom: Mutex<Vec<Personality>>,
    session_assignments: DashMap<String, String>,
}

impl PersonalityManager {
    pub fn new(client: Arc<dyn SessionClient>) -> Self {
        Self {
            client,
            custom: Mutex::new(Vec::new()),
            session_assignments: DashMap::new(),
        }
    }

    pub fn all_personalities(&self) -> Vec<Personality> {
        let mut all = BUILTIN_PERSONALITIES.clone();
        all.extend(self.custom.lock().expect("personality lock").iter().cloned());
        all
    }

    pub fn personality(&self, id: &str) -> Option<Personality> {
        self.all_personalities().into_iter().find(|p| p.id == id)
    }

    pub fn session_personality(&self, session_id: &str) -> Option<String> {
        self.session_assignments
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Apply a personality to a session. Unknown ids and send failures both
    /// report `false`; the assignment is only recorded on success.
    pub async fn set_session_personality(&self, session_id: &str, personality_id: &str) -> bool {
        let Some(personality) = self.personality(personality_id) else {
            return false;
        };
        let marker = format!("Personality set to: {}", personality.name);
        match self
            .client
            .prompt_no_reply_with_system(session_id, &marker, &personality.system_prompt)
            .await
        {
            Ok(()) => {
                self.session_assignments
                    .insert(session_id.to_string(), personality_id.to_string());
                true
            }
            Err(err) => {
                error!(%session_id, "failed to set personality: {err}");
                false
            }
        }
    }

    pub fn add_custom_personality(
        &self,
        name: String,
        description: String,
        system_prompt: String,
    ) -> Personality {
        let personality = Personality {
            id: format!("custom_{}", Utc::now().timestamp_millis()),
            name,
            description,
            system_prompt,
        };
        self.custom
            .lock()
            .expect("personality lock")
            .push(personality.clone());
        personality
    }

    pub fn remove_custom_personality(&self, id: &str) -> bool {
        let mut custom = self.custom.lock().expect("personality lock");
        let before = custom.len();
        custom.retain(|p| p.id != id);
        custom.len() != before
    }

    pub fn export_personalities(&self) -> String {
        let custom = self.custom.lock().expect("personality lock");
        serde_json::to_string_pretty(&*custom).unwrap_or_else(|_| "[]".to_string())
    }

    /// Import custom personalities from JSON; returns how many were accepted.
    /// Entries without a name or system prompt are skipped.
    pub fn import_personalities(&self, json: &str) -> usize {
        let Ok(parsed) = serde_json::from_str::<Vec<Personality>>(json) else {
            return 0;
        };
        let mut imported = 0;
        for p in parsed {
            if !p.name.is_empty() && !p.system_prompt.is_empty() {
                self.add_custom_personality(p.name, p.description, p.system_prompt);
                imported += 1;
            }
        }
        imported
    }
}
