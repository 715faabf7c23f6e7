use chrono::{DateTime, Datelike, Duration, Months, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::JournalError;
use crate::model::{Recurrence, Reminder};
use crate::storage::DataCache;

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub line_id: String,
    pub day_id: String,
    pub line_content: String,
    pub datetime: DateTime<Utc>,
    pub recurring: Recurrence,
    pub custom_recurring: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderUpdate {
    pub line_content: Option<String>,
    pub datetime: Option<DateTime<Utc>>,
    pub recurring: Option<Recurrence>,
    pub custom_recurring: Option<Option<Vec<u8>>>,
    pub enabled: Option<bool>,
}

impl Reminder {
    /// When a recurring reminder fires next after its current time.
    pub fn next_occurrence(&self) -> Option<DateTime<Utc>> {
        match self.recurring {
            Recurrence::None => None,
            Recurrence::Daily => Some(self.datetime + Duration::days(1)),
            Recurrence::Weekly => Some(self.datetime + Duration::days(7)),
            Recurrence::Monthly => self.datetime.checked_add_months(Months::new(1)),
            Recurrence::Custom => {
                let days = self.custom_recurring.as_deref().unwrap_or_default();
                if days.is_empty() {
                    return None;
                }
                (1..=7)
                    .map(|offset| self.datetime + Duration::days(offset))
                    .find(|candidate| {
                        let weekday = candidate.weekday().num_days_from_sunday() as u8;
                        days.contains(&weekday)
                    })
            }
        }
    }
}

fn validate_weekdays(days: Option<&[u8]>) -> crate::Result<()> {
    match days {
        Some(days) if days.iter().any(|d| *d > 6) => Err(JournalError::InvalidInput(
            "custom weekdays must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct ReminderManager {
    cache: DataCache,
}

impl ReminderManager {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    pub fn load_reminders(&self) -> Vec<Reminder> {
        self.cache.load_reminders()
    }

    pub fn add_reminder(&self, new: NewReminder) -> crate::Result<Reminder> {
        validate_weekdays(new.custom_recurring.as_deref())?;
        let custom_recurring = match new.recurring {
            Recurrence::Custom => new.custom_recurring,
            _ => None,
        };
        self.cache.mutate(|data| {
            let reminder = Reminder {
                id: Uuid::new_v4().to_string(),
                line_id: new.line_id,
                day_id: new.day_id,
                line_content: new.line_content,
                datetime: new.datetime,
                recurring: new.recurring,
                custom_recurring,
                enabled: true,
            };
            data.reminders.push(reminder.clone());
            reminder
        })
    }

    pub fn update_reminder(&self, id: &str, update: ReminderUpdate) -> crate::Result<bool> {
        if let Some(days) = &update.custom_recurring {
            validate_weekdays(days.as_deref())?;
        }
        self.cache.mutate(|data| {
            let Some(reminder) = data.reminders.iter_mut().find(|r| r.id == id) else {
                return false;
            };
            if let Some(content) = update.line_content {
                reminder.line_content = content;
            }
            if let Some(datetime) = update.datetime {
                reminder.datetime = datetime;
            }
            if let Some(recurring) = update.recurring {
                reminder.recurring = recurring;
            }
            if let Some(days) = update.custom_recurring {
                reminder.custom_recurring = days;
            }
            if let Some(enabled) = update.enabled {
                reminder.enabled = enabled;
            }
            true
        })
    }

    pub fn delete_reminder(&self, id: &str) -> crate::Result<bool> {
        self.cache.mutate(|data| {
            let before = data.reminders.len();
            data.reminders.retain(|r| r.id != id);
            data.reminders.len() != before
        })
    }

    pub fn get_reminders_for_line(&self, line_id: &str) -> Vec<Reminder> {
        self.cache.read(|data| {
            data.reminders
                .iter()
                .filter(|r| r.line_id == line_id)
                .cloned()
                .collect()
        })
    }

    pub fn active_reminders(&self) -> Vec<Reminder> {
        self.cache
            .read(|data| data.reminders.iter().filter(|r| r.enabled).cloned().collect())
    }

    /// Enabled reminders firing within `window` after `now`.
    pub fn due_reminders(&self, now: DateTime<Utc>, window: Duration) -> Vec<Reminder> {
        self.active_reminders()
            .into_iter()
            .filter(|r| {
                let until = r.datetime - now;
                until > Duration::zero() && until < window
            })
            .collect()
    }

    /// Move a recurring reminder to its next occurrence.
    pub fn advance_recurring(&self, id: &str) -> crate::Result<Option<Reminder>> {
        self.cache.mutate(|data| {
            let reminder = data.reminders.iter_mut().find(|r| r.id == id)?;
            let next = reminder.next_occurrence()?;
            debug!("Reminder {} rescheduled to {}", reminder.id, next);
            reminder.datetime = next;
            Some(reminder.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::journal;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn reminder(recurring: Recurrence, days: Option<Vec<u8>>) -> NewReminder {
        NewReminder {
            line_id: "line-1".to_string(),
            day_id: "2026-02-08".to_string(),
            line_content: "Take vitamins".to_string(),
            datetime: at(2026, 2, 8, 9),
            recurring,
            custom_recurring: days,
        }
    }

    #[test]
    fn test_crud_and_line_lookup() {
        let journal = journal();
        let reminders = journal.reminders();
        let r = reminders.add_reminder(reminder(Recurrence::None, None)).unwrap();
        assert!(r.enabled);
        assert_eq!(reminders.get_reminders_for_line("line-1").len(), 1);
        assert!(reminders.get_reminders_for_line("other").is_empty());

        assert!(reminders
            .update_reminder(
                &r.id,
                ReminderUpdate {
                    enabled: Some(false),
                    ..ReminderUpdate::default()
                },
            )
            .unwrap());
        assert!(reminders.active_reminders().is_empty());

        assert!(reminders.delete_reminder(&r.id).unwrap());
        assert!(!reminders.delete_reminder(&r.id).unwrap());
    }

    #[test]
    fn test_due_window_only_includes_upcoming() {
        let journal = journal();
        journal.reminders().add_reminder(reminder(Recurrence::None, None)).unwrap();
        let due = journal
            .reminders()
            .due_reminders(at(2026, 2, 8, 9) - Duration::seconds(30), Duration::minutes(1));
        assert_eq!(due.len(), 1);
        let late = journal
            .reminders()
            .due_reminders(at(2026, 2, 8, 10), Duration::minutes(1));
        assert!(late.is_empty());
    }

    #[test]
    fn test_next_occurrence_rules() {
        let journal = journal();
        let reminders = journal.reminders();
        let daily = reminders.add_reminder(reminder(Recurrence::Daily, None)).unwrap();
        let weekly = reminders.add_reminder(reminder(Recurrence::Weekly, None)).unwrap();
        let monthly = reminders.add_reminder(reminder(Recurrence::Monthly, None)).unwrap();
        let once = reminders.add_reminder(reminder(Recurrence::None, None)).unwrap();

        assert_eq!(daily.next_occurrence(), Some(at(2026, 2, 9, 9)));
        assert_eq!(weekly.next_occurrence(), Some(at(2026, 2, 15, 9)));
        assert_eq!(monthly.next_occurrence(), Some(at(2026, 3, 8, 9)));
        assert_eq!(once.next_occurrence(), None);
    }

    #[test]
    fn test_custom_days_pick_the_next_selected_weekday() {
        let journal = journal();
        // 2026-02-08 is a Sunday; 3 is Wednesday.
        let custom = journal
            .reminders()
            .add_reminder(reminder(Recurrence::Custom, Some(vec![3, 5])))
            .unwrap();
        assert_eq!(custom.next_occurrence(), Some(at(2026, 2, 11, 9)));

        let advanced = journal.reminders().advance_recurring(&custom.id).unwrap().unwrap();
        assert_eq!(advanced.datetime, at(2026, 2, 11, 9));
        let invalid = reminder(Recurrence::Custom, Some(vec![7]));
        assert!(journal.reminders().add_reminder(invalid).is_err());
    }
}
