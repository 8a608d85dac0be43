use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod ids;
pub mod reference;
pub mod schema;
pub mod tags;

pub use ids::{IdSource, RandomIds, StableId, StableIdError, STABLE_ID_LEN};
pub use reference::MessageRef;
pub use tags::{ProfileTags, TagError, MAX_TAG_CHARS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    ResumeRefine,
    InterviewPrep,
    GeneralChat,
    Onboarding,
}

impl ChatIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatIntent::ResumeRefine => "resume_refine",
            ChatIntent::InterviewPrep => "interview_prep",
            ChatIntent::GeneralChat => "general_chat",
            ChatIntent::Onboarding => "onboarding",
        }
    }
}

impl fmt::Display for ChatIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatIntent {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "resume_refine" => Ok(ChatIntent::ResumeRefine),
            "interview_prep" => Ok(ChatIntent::InterviewPrep),
            "general_chat" => Ok(ChatIntent::GeneralChat),
            "onboarding" => Ok(ChatIntent::Onboarding),
            other => Err(format!("Unknown chat intent: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("Unknown message role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObservationCategory {
    #[serde(rename = "skill_detect")]
    Skill,
    #[serde(rename = "trait_detect")]
    Trait,
    #[serde(rename = "experience_fragment")]
    Experience,
    #[serde(rename = "preference")]
    Preference,
}

impl ObservationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationCategory::Skill => "skill_detect",
            ObservationCategory::Trait => "trait_detect",
            ObservationCategory::Experience => "experience_fragment",
            ObservationCategory::Preference => "preference",
        }
    }
}

impl FromStr for ObservationCategory {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "skill_detect" => Ok(ObservationCategory::Skill),
            "trait_detect" => Ok(ObservationCategory::Trait),
            "experience_fragment" => Ok(ObservationCategory::Experience),
            "preference" => Ok(ObservationCategory::Preference),
            other => Err(format!("Unknown observation category: {other}")),
        }
    }
}

/// Lifecycle of a raw observation; `Promoted` means it was written into a profile section.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    #[default]
    Pending,
    Promoted,
    Rejected,
    Merged,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Pending => "pending",
            ObservationStatus::Promoted => "promoted",
            ObservationStatus::Rejected => "rejected",
            ObservationStatus::Merged => "merged",
        }
    }
}

impl FromStr for ObservationStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(ObservationStatus::Pending),
            "promoted" => Ok(ObservationStatus::Promoted),
            "rejected" => Ok(ObservationStatus::Rejected),
            "merged" => Ok(ObservationStatus::Merged),
            other => Err(format!("Unknown observation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSectionKey {
    Skills,
    WorkExperience,
    ProjectsSummary,
    ProjectDetails,
    BehavioralTraits,
    Education,
    Summary,
}

impl ProfileSectionKey {
    pub const ALL: [ProfileSectionKey; 7] = [
        ProfileSectionKey::Skills,
        ProfileSectionKey::WorkExperience,
        ProfileSectionKey::ProjectsSummary,
        ProfileSectionKey::ProjectDetails,
        ProfileSectionKey::BehavioralTraits,
        ProfileSectionKey::Education,
        ProfileSectionKey::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSectionKey::Skills => "skills",
            ProfileSectionKey::WorkExperience => "work_experience",
            ProfileSectionKey::ProjectsSummary => "projects_summary",
            ProfileSectionKey::ProjectDetails => "project_details",
            ProfileSectionKey::BehavioralTraits => "behavioral_traits",
            ProfileSectionKey::Education => "education",
            ProfileSectionKey::Summary => "summary",
        }
    }
}

impl fmt::Display for ProfileSectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileSectionKey {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        ProfileSectionKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| format!("Unknown profile section key: {normalized}"))
    }
}
