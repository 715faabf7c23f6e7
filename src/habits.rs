use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::error::JournalError;
use crate::model::{Entry, Habit, HabitType, HabitValue, XpSource};
use crate::storage::DataCache;
use crate::xp::XpChange;

#[derive(Debug, Clone)]
pub struct NewHabit {
    pub name: String,
    pub habit_type: HabitType,
    pub icon: String,
    pub color: String,
    pub goal: Option<f64>,
    pub xp: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub goal: Option<Option<f64>>,
    pub xp: Option<Option<i64>>,
    pub visible: Option<bool>,
}

/// XP earned by a number habit: `min(value / goal, 1) * xp`, rounded.
/// Non-finite values and goals earn nothing.
pub fn number_habit_xp(value: f64, goal: Option<f64>, xp: Option<i64>) -> i64 {
    match (goal, xp) {
        (Some(goal), Some(xp)) if goal.is_finite() && goal > 0.0 && value.is_finite() => {
            ((value / goal).min(1.0) * xp as f64).round() as i64
        }
        _ => 0,
    }
}

// JSON has no NaN or infinity; such a number would make the stored blob unreadable.
fn require_finite(what: &str, value: Option<f64>) -> crate::Result<()> {
    match value {
        Some(v) if !v.is_finite() => Err(JournalError::InvalidInput(format!(
            "{} must be a finite number, got {}",
            what, v
        ))),
        _ => Ok(()),
    }
}

fn habit_xp(habit: &Habit, value: Option<&HabitValue>) -> i64 {
    match (habit.habit_type, value) {
        (HabitType::Checkbox, Some(HabitValue::Checked(true))) => habit.xp.unwrap_or(0),
        (HabitType::Number, Some(HabitValue::Number(n))) => {
            number_habit_xp(*n, habit.goal, habit.xp)
        }
        _ => 0,
    }
}

#[derive(Clone)]
pub struct HabitManager {
    cache: DataCache,
}

impl HabitManager {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    /// All habits in display order.
    pub fn load_habits(&self) -> Vec<Habit> {
        self.cache.load_habits()
    }

    pub fn visible_habits(&self) -> Vec<Habit> {
        self.load_habits().into_iter().filter(|h| h.visible).collect()
    }

    pub fn get_habit(&self, id: &str) -> Option<Habit> {
        self.cache
            .read(|data| data.habits.iter().find(|h| h.id == id).cloned())
    }

    pub fn add_habit(&self, new: NewHabit) -> crate::Result<Habit> {
        if new.name.trim().is_empty() {
            return Err(JournalError::InvalidInput("habit name is required".to_string()));
        }
        require_finite("habit goal", new.goal)?;
        self.cache.mutate(|data| {
            let habit = Habit {
                id: Uuid::new_v4().to_string(),
                name: new.name,
                habit_type: new.habit_type,
                icon: new.icon,
                color: new.color,
                order: data.habits.len() as u32,
                goal: new.goal,
                xp: new.xp,
                visible: true,
            };
            data.habits.push(habit.clone());
            habit
        })
    }

    pub fn update_habit(&self, id: &str, update: HabitUpdate) -> crate::Result<bool> {
        require_finite("habit goal", update.goal.flatten())?;
        self.cache.mutate(|data| {
            let Some(habit) = data.habits.iter_mut().find(|h| h.id == id) else {
                return false;
            };
            if let Some(name) = update.name {
                habit.name = name;
            }
            if let Some(icon) = update.icon {
                habit.icon = icon;
            }
            if let Some(color) = update.color {
                habit.color = color;
            }
            if let Some(goal) = update.goal {
                habit.goal = goal;
            }
            if let Some(xp) = update.xp {
                habit.xp = xp;
            }
            if let Some(visible) = update.visible {
                habit.visible = visible;
            }
            true
        })
    }

    pub fn delete_habit(&self, id: &str) -> crate::Result<bool> {
        self.cache.mutate(|data| {
            let before = data.habits.len();
            data.habits.retain(|h| h.id != id);
            data.habits.len() != before
        })
    }

    /// Rewrite `order` to match `ordered_ids`. The list must be a permutation
    /// of the existing habit ids; anything else is rejected untouched.
    pub fn reorder_habits(&self, ordered_ids: &[String]) -> crate::Result<bool> {
        let existing: HashSet<String> = self
            .cache
            .read(|data| data.habits.iter().map(|h| h.id.clone()).collect());
        let requested: HashSet<&String> = ordered_ids.iter().collect();
        if requested.len() != ordered_ids.len()
            || ordered_ids.len() != existing.len()
            || !ordered_ids.iter().all(|id| existing.contains(id))
        {
            warn!(
                "Rejecting habit reorder: {} ids given for {} habits",
                ordered_ids.len(),
                existing.len()
            );
            return Ok(false);
        }

        self.cache.mutate(|data| {
            for habit in &mut data.habits {
                if let Some(position) = ordered_ids.iter().position(|id| *id == habit.id) {
                    habit.order = position as u32;
                }
            }
            data.habits.sort_by_key(|h| h.order);
            true
        })
    }

    /// Record (or clear, with `None`) a habit's value for a day and keep the
    /// ledger holding at most one row for `(habit, day)`.
    pub fn set_habit_value(
        &self,
        date: NaiveDate,
        habit_id: &str,
        value: Option<HabitValue>,
    ) -> crate::Result<XpChange> {
        let habit = self
            .get_habit(habit_id)
            .ok_or_else(|| JournalError::NotFound(format!("habit {}", habit_id)))?;
        let value_matches = match (&value, habit.habit_type) {
            (None, _) => true,
            (Some(HabitValue::Checked(_)), HabitType::Checkbox) => true,
            (Some(HabitValue::Number(_)), HabitType::Number) => true,
            (Some(HabitValue::Text(_)), HabitType::Text) => true,
            _ => false,
        };
        if !value_matches {
            return Err(JournalError::InvalidInput(format!(
                "value does not fit {:?} habit {}",
                habit.habit_type, habit.name
            )));
        }
        if let Some(HabitValue::Number(n)) = &value {
            require_finite("habit value", Some(*n))?;
        }

        self.cache.mutate(|data| {
            let entry = data.entry_or_create(date);
            let old_xp = habit_xp(&habit, entry.habits.get(habit_id));
            match value {
                Some(value) => {
                    entry.habits.insert(habit_id.to_string(), value);
                }
                None => {
                    entry.habits.remove(habit_id);
                }
            }
            let new_xp = habit_xp(&habit, entry.habits.get(habit_id));

            if habit.habit_type == HabitType::Text {
                return XpChange {
                    delta: 0,
                    day_total: data.xp_for_date(date),
                };
            }
            let mut change =
                data.reprice_xp_source(date, new_xp, XpSource::Habit, habit_id, &habit.name);
            change.delta = new_xp.max(0) - old_xp.max(0);
            change
        })
    }

    pub fn get_habit_value(&self, date: NaiveDate, habit_id: &str) -> Option<HabitValue> {
        let day_id = Entry::day_id(date);
        self.cache.read(|data| {
            data.entries
                .iter()
                .find(|e| e.id == day_id)
                .and_then(|e| e.habits.get(habit_id).cloned())
        })
    }
}
