//! Language and category definitions

use serde::{Deserialize, Serialize};

/// Languages covered by the benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(rename = "bo")]
    Tibetan,
    #[serde(rename = "mn")]
    Mongolian,
    #[serde(rename = "ug")]
    Uyghur,
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    pub fn all() -> Vec<Language> {
        vec![
            Language::Tibetan,
            Language::Mongolian,
            Language::Uyghur,
            Language::Chinese,
        ]
    }

    /// The three minority languages the judge stage iterates by default
    pub fn minority() -> Vec<Language> {
        vec![Language::Tibetan, Language::Mongolian, Language::Uyghur]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Tibetan => "bo",
            Language::Mongolian => "mn",
            Language::Uyghur => "ug",
            Language::Chinese => "zh",
        }
    }

    /// Script name used in report tables
    pub fn script_name(&self) -> &'static str {
        match self {
            Language::Tibetan => "藏文",
            Language::Mongolian => "蒙文",
            Language::Uyghur => "维文",
            Language::Chinese => "中文",
        }
    }

    /// Spoken-language name used inside judge prompts
    pub fn spoken_name(&self) -> &'static str {
        match self {
            Language::Tibetan => "藏语",
            Language::Mongolian => "蒙古语",
            Language::Uyghur => "维吾尔语",
            Language::Chinese => "汉语",
        }
    }

    /// Report label for a raw language directory name, falling back to the code itself
    pub fn display_for_code(code: &str) -> String {
        code.parse::<Language>()
            .map(|l| l.script_name().to_string())
            .unwrap_or_else(|_| code.to_string())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bo" | "tibetan" => Ok(Language::Tibetan),
            "mn" | "mongolian" => Ok(Language::Mongolian),
            "ug" | "uyghur" => Ok(Language::Uyghur),
            "zh" | "chinese" => Ok(Language::Chinese),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Top-level task groups of the benchmark directory layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskGroup {
    Foundation,
    MinorityKnowledge,
    SafetyAlignment,
}

impl TaskGroup {
    pub fn dir_name(&self) -> &'static str {
        match self {
            TaskGroup::Foundation => "Foundation_Tasks",
            TaskGroup::MinorityKnowledge => "Chinese_Minority_Knowledge_Tasks",
            TaskGroup::SafetyAlignment => "Safety_Alignment_Tasks",
        }
    }
}

/// Closed label set of the text classification task, in match-priority order
pub const TEXT_CATEGORIES: [&str; 7] = ["体育", "健康", "地理", "娱乐", "政治", "旅游", "科技"];
