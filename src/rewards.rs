//! Badges (one per type per day, each carrying an XP boost) and monthly medals
//! (milestones derived from a month's XP, carrying no XP of their own).

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use tracing::info;
use uuid::Uuid;

use crate::error::JournalError;
use crate::model::{Badge, Medal, MedalTier, XpSource};
use crate::storage::DataCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeKind {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub xp_boost: i64,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedalKind {
    pub tier: MedalTier,
    pub name: &'static str,
    pub icon: &'static str,
    pub threshold: i64,
    pub description: &'static str,
}

pub static BADGE_KINDS: Lazy<Vec<BadgeKind>> = Lazy::new(|| {
    vec![
        BadgeKind {
            key: "DEEP_WORK_2HR",
            name: "Deep Focus",
            icon: "🧠",
            xp_boost: 20,
            description: "Two hours of deep work in a day",
        },
        BadgeKind {
            key: "DEEP_WORK_5HR",
            name: "Flow State",
            icon: "🔥",
            xp_boost: 50,
            description: "Five hours of deep work in a day",
        },
        BadgeKind {
            key: "WATER_WARRIOR",
            name: "Water Warrior",
            icon: "💧",
            xp_boost: 15,
            description: "Hit the daily water goal",
        },
        BadgeKind {
            key: "EXERCISE_PRO",
            name: "Exercise Pro",
            icon: "💪",
            xp_boost: 25,
            description: "Completed a full workout",
        },
        BadgeKind {
            key: "EARLY_BIRD",
            name: "Early Bird",
            icon: "🌅",
            xp_boost: 15,
            description: "Started the day before 6 AM",
        },
        BadgeKind {
            key: "NIGHT_OWL",
            name: "Night Owl",
            icon: "🦉",
            xp_boost: 15,
            description: "Productive late-night session",
        },
        BadgeKind {
            key: "TASK_MASTER",
            name: "Task Master",
            icon: "✅",
            xp_boost: 30,
            description: "Finished every task of the day",
        },
        BadgeKind {
            key: "HABIT_STREAK_7",
            name: "Week Streak",
            icon: "📅",
            xp_boost: 40,
            description: "Kept a habit for seven days straight",
        },
        BadgeKind {
            key: "PERFECT_DAY",
            name: "Perfect Day",
            icon: "🌟",
            xp_boost: 50,
            description: "Every task and habit done",
        },
        BadgeKind {
            key: "READING_BUG",
            name: "Reading Bug",
            icon: "📚",
            xp_boost: 20,
            description: "Read for at least an hour",
        },
        BadgeKind {
            key: "PRODUCTIVITY_BEAST",
            name: "Productivity Beast",
            icon: "🚀",
            xp_boost: 60,
            description: "An exceptionally productive day",
        },
    ]
});

/// Ordered from the highest threshold down.
pub static MEDAL_KINDS: Lazy<Vec<MedalKind>> = Lazy::new(|| {
    vec![
        MedalKind {
            tier: MedalTier::Legend,
            name: "Legend",
            icon: "👑",
            threshold: 5000,
            description: "5000 XP in a single month",
        },
        MedalKind {
            tier: MedalTier::Diamond,
            name: "Diamond",
            icon: "💎",
            threshold: 3500,
            description: "3500 XP in a single month",
        },
        MedalKind {
            tier: MedalTier::Platinum,
            name: "Platinum",
            icon: "🏅",
            threshold: 2000,
            description: "2000 XP in a single month",
        },
        MedalKind {
            tier: MedalTier::Gold,
            name: "Gold",
            icon: "🥇",
            threshold: 1000,
            description: "1000 XP in a single month",
        },
        MedalKind {
            tier: MedalTier::Silver,
            name: "Silver",
            icon: "🥈",
            threshold: 500,
            description: "500 XP in a single month",
        },
        MedalKind {
            tier: MedalTier::Bronze,
            name: "Bronze",
            icon: "🥉",
            threshold: 250,
            description: "250 XP in a single month",
        },
    ]
});

pub fn badge_kind(key: &str) -> Option<&'static BadgeKind> {
    BADGE_KINDS.iter().find(|k| k.key == key)
}

pub fn medal_kind(tier: MedalTier) -> &'static MedalKind {
    MEDAL_KINDS
        .iter()
        .find(|k| k.tier == tier)
        .unwrap_or_else(|| unreachable!("every tier has a catalogue row"))
}

#[derive(Debug, Clone, Default)]
pub struct BadgeUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub xp_boost: Option<i64>,
}

#[derive(Clone)]
pub struct RewardManager {
    cache: DataCache,
}

impl RewardManager {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    pub fn load_badges(&self) -> Vec<Badge> {
        self.cache.load_badges()
    }

    pub fn badges_for_date(&self, date: NaiveDate) -> Vec<Badge> {
        self.cache
            .read(|data| data.badges.iter().filter(|b| b.date == date).cloned().collect())
    }

    /// Award a badge and its XP boost. Returns `None` when the same badge type
    /// was already awarded on that date.
    pub fn award_badge(&self, kind_key: &str, date: NaiveDate) -> crate::Result<Option<Badge>> {
        let kind = badge_kind(kind_key)
            .ok_or_else(|| JournalError::InvalidInput(format!("unknown badge type {}", kind_key)))?;

        let awarded = self.cache.mutate(|data| {
            if data.badges.iter().any(|b| b.badge_type == kind.key && b.date == date) {
                return None;
            }
            let badge = Badge {
                id: Uuid::new_v4().to_string(),
                badge_type: kind.key.to_string(),
                name: kind.name.to_string(),
                icon: kind.icon.to_string(),
                xp_boost: kind.xp_boost,
                description: kind.description.to_string(),
                date,
                timestamp: Utc::now(),
            };
            data.append_xp(date, badge.xp_boost, XpSource::Badge, &badge.id, &badge.name);
            data.badges.push(badge.clone());
            Some(badge)
        })?;

        if let Some(badge) = &awarded {
            info!("Awarded badge {} for {}", badge.badge_type, date);
        }
        Ok(awarded)
    }

    pub fn delete_badge(&self, id: &str) -> crate::Result<()> {
        self.cache.mutate(|data| -> crate::Result<()> {
            let index = data
                .badges
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| JournalError::NotFound(format!("badge {}", id)))?;
            let badge = data.badges.remove(index);
            data.revert_xp_source(&badge.id, badge.date);
            Ok(())
        })?
    }

    /// Edit a badge. A new `xp_boost` replaces the badge's ledger row.
    pub fn update_badge(&self, id: &str, update: BadgeUpdate) -> crate::Result<Badge> {
        self.cache.mutate(|data| -> crate::Result<Badge> {
            let index = data
                .badges
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| JournalError::NotFound(format!("badge {}", id)))?;
            let badge = &mut data.badges[index];
            if let Some(name) = update.name {
                badge.name = name;
            }
            if let Some(icon) = update.icon {
                badge.icon = icon;
            }
            if let Some(description) = update.description {
                badge.description = description;
            }
            let repriced = match update.xp_boost {
                Some(boost) if boost != badge.xp_boost => {
                    badge.xp_boost = boost;
                    true
                }
                _ => false,
            };
            let badge = badge.clone();
            if repriced {
                data.revert_xp_source(&badge.id, badge.date);
                data.append_xp(badge.date, badge.xp_boost, XpSource::Badge, &badge.id, &badge.name);
            }
            Ok(badge)
        })?
    }

    pub fn load_medals(&self) -> Vec<Medal> {
        self.cache.load_medals()
    }

    /// Record a medal. Returns `None` when the tier already exists for the month.
    pub fn award_medal(
        &self,
        tier: MedalTier,
        year: i32,
        month: u32,
    ) -> crate::Result<Option<Medal>> {
        if !(1..=12).contains(&month) {
            return Err(JournalError::InvalidInput(format!("month out of range: {}", month)));
        }
        let kind = medal_kind(tier);
        let awarded = self.cache.mutate(|data| {
            if data
                .medals
                .iter()
                .any(|m| m.tier == tier && m.year == year && m.month == month)
            {
                return None;
            }
            let medal = Medal {
                id: Uuid::new_v4().to_string(),
                tier,
                name: kind.name.to_string(),
                icon: kind.icon.to_string(),
                threshold: kind.threshold,
                description: kind.description.to_string(),
                year,
                month,
                timestamp: Utc::now(),
            };
            data.medals.push(medal.clone());
            Some(medal)
        })?;

        if let Some(medal) = &awarded {
            info!("Awarded {:?} medal for {}-{:02}", medal.tier, year, month);
        }
        Ok(awarded)
    }

    /// Award the single highest tier the month's XP qualifies for. Lower tiers
    /// are not backfilled.
    pub fn check_monthly_medals(&self, year: i32, month: u32) -> crate::Result<Option<Medal>> {
        let total: i64 = self
            .cache
            .read(|data| data.xp_for_month(year, month).iter().map(|d| d.total).sum());
        match MEDAL_KINDS.iter().find(|k| total >= k.threshold) {
            Some(kind) => self.award_medal(kind.tier, year, month),
            None => Ok(None),
        }
    }

    /// The highest-threshold medal recorded for the month.
    pub fn get_medal_for_month(&self, year: i32, month: u32) -> Option<Medal> {
        self.cache.read(|data| {
            data.medals
                .iter()
                .filter(|m| m.year == year && m.month == month)
                .max_by_key(|m| m.threshold)
                .cloned()
        })
    }
}
