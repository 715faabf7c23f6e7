use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The entire durable state of one user; encrypted and stored as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDataBlob {
    pub entries: Vec<Entry>,
    pub habits: Vec<Habit>,
    pub templates: Vec<Template>,
    pub reminders: Vec<Reminder>,
    pub xp_history: Vec<XpEntry>,
    pub badges: Vec<Badge>,
    pub medals: Vec<Medal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineType {
    Text,
    Checkbox,
    CheckboxTime,
    Radio,
}

impl LineType {
    pub fn is_checkable(self) -> bool {
        matches!(self, LineType::Checkbox | LineType::CheckboxTime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    #[serde(rename = "type")]
    pub line_type: LineType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<i64>,
}

impl Line {
    pub fn new(line_type: LineType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            line_type,
            content: content.into(),
            checked: line_type.is_checkable().then_some(false),
            xp: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(LineType::Text, "")
    }

    pub fn is_checked(&self) -> bool {
        self.checked.unwrap_or(false)
    }
}

/// A recorded value for one habit on one day. Absence from the map means "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HabitValue {
    Checked(bool),
    Number(f64),
    Text(String),
}

/// One calendar day. `id` is always the ISO form of `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub date: NaiveDate,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub habits: BTreeMap<String, HabitValue>,
}

impl Entry {
    pub fn day_id(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Derive the id from the date and give an empty day its blank line.
    pub fn normalized(mut self) -> Self {
        self.id = Self::day_id(self.date);
        if self.lines.is_empty() {
            self.lines.push(Line::empty());
        }
        self
    }

    pub fn with_lines(date: NaiveDate, lines: Vec<Line>) -> Self {
        let lines = if lines.is_empty() {
            vec![Line::empty()]
        } else {
            lines
        };
        Self {
            id: Self::day_id(date),
            date,
            lines,
            habits: BTreeMap::new(),
        }
    }

    pub fn blank(date: NaiveDate) -> Self {
        Self::with_lines(date, Vec::new())
    }

    pub fn line(&self, line_id: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == line_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitType {
    Checkbox,
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub habit_type: HabitType,
    pub icon: String,
    pub color: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<i64>,
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

/// Line shape stored in a template; `content` is used as placeholder text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLine {
    #[serde(rename = "type")]
    pub line_type: LineType,
    pub content: String,
}

impl TemplateLine {
    pub fn instantiate(&self) -> Line {
        Line::new(self.line_type, self.content.clone())
    }
}

impl From<&Line> for TemplateLine {
    fn from(line: &Line) -> Self {
        Self {
            line_type: line.line_type,
            content: line.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub lines: Vec<TemplateLine>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub line_id: String,
    pub day_id: String,
    pub line_content: String,
    pub datetime: DateTime<Utc>,
    pub recurring: Recurrence,
    /// Weekdays counted from Sunday (0) to Saturday (6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_recurring: Option<Vec<u8>>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XpSource {
    Task,
    Habit,
    Badge,
}

/// One append-only ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpEntry {
    pub id: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub source: XpSource,
    pub source_id: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: String,
    #[serde(rename = "type")]
    pub badge_type: String,
    pub name: String,
    pub icon: String,
    pub xp_boost: i64,
    pub description: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MedalTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Legend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medal {
    pub id: String,
    pub tier: MedalTier,
    pub name: String,
    pub icon: String,
    pub threshold: i64,
    pub description: String,
    pub year: i32,
    pub month: u32,
    pub timestamp: DateTime<Utc>,
}
