//! Avatar personas and prompt assembly.
//!
//! Prompts carry the user's profile, the selected avatar, recent context and
//! pastoral themes. Themes are given to the model as a hidden steer and are
//! never meant to be echoed back to the user.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::memory::Theme;

/// A selectable persona: name and the tone it asks of the model.
pub struct Avatar {
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVATARS: [Avatar; 4] = [
    Avatar {
        name: "Pio",
        description: "Intense compassion, focus on suffering and confession",
    },
    Avatar {
        name: "Thérèse",
        description: "Contemplative, mystical, focused on prayer and interior life.",
    },
    Avatar {
        name: "Dan",
        description: "Practical, family-focused, relatable 40-something father",
    },
    Avatar {
        name: "Kim",
        description: "Energetic, community-driven, youthful enthusiasm",
    },
];

/// Case-insensitive avatar lookup; unknown names give an empty description.
pub fn avatar_description(name: &str) -> &'static str {
    AVATARS
        .iter()
        .find(|a| a.name.to_lowercase() == name.trim().to_lowercase())
        .map(|a| a.description)
        .unwrap_or("")
}

pub fn spirituality_stage(spiritual_maturity: f32) -> &'static str {
    if spiritual_maturity < 1.8 {
        "Exploring"
    } else if spiritual_maturity > 2.5 {
        "Mature"
    } else {
        "Growing"
    }
}

/// Profile fields sent by the app with each message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub avatar: String,
    /// Birth year as entered during onboarding.
    pub age_range: String,
    pub sex: String,
    pub life_stage: String,
    pub spiritual_maturity: f32,
    pub spiritual_goals: Vec<String>,
    #[serde(rename = "responseStyle", alias = "response_style")]
    pub response_style: String,
}

impl UserProfile {
    /// Age derived from the birth year, if it parses.
    pub fn age(&self, current_year: i32) -> Option<i32> {
        self.age_range
            .trim()
            .parse::<i32>()
            .ok()
            .map(|born| current_year - born)
            .filter(|age| *age >= 0)
    }

    /// `"default"` style answers warmer; anything else stays close to the text.
    pub fn temperature(&self) -> f32 {
        if self.response_style == "default" {
            0.6
        } else {
            0.3
        }
    }

    fn summary(&self) -> String {
        let age = self
            .age(chrono::Utc::now().year())
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".into());
        format!(
            "age={age}, sex={}, life_stage={}, spiritual_goals={}, spiritual_maturity={} ({})",
            self.sex,
            self.life_stage,
            self.spiritual_goals.join(", "),
            self.spiritual_maturity,
            spirituality_stage(self.spiritual_maturity),
        )
    }
}

fn themes_line(themes: &[Theme]) -> String {
    if themes.is_empty() {
        return String::new();
    }
    let labels: Vec<&str> = themes.iter().map(Theme::as_str).collect();
    format!("User has been exploring themes like: {}.", labels.join(", "))
}

/// System message shared by every generation call.
pub const SYSTEM_PROMPT: &str = "You are a faithful Catholic scripture companion.";

pub fn chat_prompt(profile: &UserProfile, themes: &[Theme], context: &str, text: &str) -> String {
    format!(
        "You are an AI-powered Catholic spiritual companion. You are not a human, priest, or divine authority.\n\
         The user has selected avatar: {avatar} ({description}).\n\
         Shape reflections subtly using the profile: {profile}. Never mention it explicitly.\n\
         Pastoral memory (use to guide scripture and saint choices, never mention): {themes}\n\
         Recent conversation:\n{context}\n\n\
         User said: \"{text}\"\n\n\
         Respond with empathy, a Scripture, Catechism or saint reference, a pastoral reflection, \
         and one practical step. Return valid JSON only, without code fences:\n\
         {{\"answer\": \"...\", \"follow_ups\": [\"clickable prompt1\", \"clickable prompt2\"]}}",
        avatar = profile.avatar,
        description = avatar_description(&profile.avatar),
        profile = profile.summary(),
        themes = themes_line(themes),
    )
}

pub fn prayer_prompt(profile: &UserProfile, themes: &[Theme], intention: &str) -> String {
    format!(
        "You are a Catholic spiritual companion helping users articulate intercessory prayers.\n\
         The user has selected the spiritual avatar: {avatar} ({description}).\n\
         The user's profile: {profile}.\n\
         The pastoral theme/intention type is: {themes}\n\
         Do not pray yourself or act as the speaker. Acknowledge the intention, offer brief consolation, \
         then write a short prayer the user can pray, ending with an act of trust in God.\n\n\
         Intention: \"{intention}\"",
        avatar = profile.avatar,
        description = avatar_description(&profile.avatar),
        profile = profile.summary(),
        themes = themes_line(themes),
    )
}

pub fn saint_prompt(saint_name: &str, avatar: &str) -> String {
    format!(
        "When given a saint's name and an avatar name, generate a brief, structured response about the saint \
         in the voice of the avatar. Use a reverent, educational, and pastoral tone.\n\
         1. The saint's name in **bold**.\n\
         2. A 2-sentence overview of who the saint is.\n\
         3. 3 sentences on their time period, origin and historical context.\n\
         4. 3-4 sentences on key works, teachings and notable quotes.\n\
         5. A 3-4 sentence prayer of intercession in **bold**, ending with \"Saint [Name], pray for us. Amen.\"\n\n\
         Saint: {saint_name}\nAvatar: {avatar}"
    )
}

pub fn scripture_prompt(reading_title: &str, scripture_reference: &str) -> String {
    format!(
        "Produce the full Scripture reading for the passage below, faithful to a Catholic translation.\n\
         Begin with the reading title in **bold**, then the reference, then the text.\n\n\
         Reading: {reading_title}\nReference: {scripture_reference}"
    )
}

pub fn bible_study_prompt(profile: &UserProfile, reading_title: &str, verse: &str) -> String {
    format!(
        "Create a complete Bible study session for the passage below.\n\
         1. The verse title in **bold**.\n\
         2. A 1-2 sentence overview of the passage's theme or context.\n\
         3. A short reflection, one cross-reference, and two questions for personal reflection.\n\
         Subtly tailor this to the user profile ({profile}) in the tone of avatar {avatar}, \
         without referencing the profile directly.\n\n\
         Reading: {reading_title}\nPassage: {verse}",
        profile = profile.summary(),
        avatar = profile.avatar,
    )
}

pub fn calendar_prompt(date: &str) -> String {
    format!(
        "Today is {date}.\n\
         You are a Catholic liturgical calendar assistant. Give a JSON response with date, season, \
         season_week, year (A, B, or C), saint of the day, and readings (first, psalm, second, gospel):\n\
         {{\"date\": \"{date}\", \"season\": \"Ordinary Time\", \"season_week\": \"15\", \"year\": \"C\", \
         \"saint\": \"...\", \"readings\": {{\"first\": \"...\", \"psalm\": \"...\", \"second\": \"...\", \"gospel\": \"...\"}}}}\n\
         Only return valid JSON, no explanation. Do NOT include code fences."
    )
}
