use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::JournalError;
use crate::model::{Entry, HabitValue, Line, LineType, Template, UserDataBlob, XpSource};
use crate::storage::DataCache;
use crate::xp::XpChange;

/// Build a fresh day from the default template, or a single blank line.
pub fn build_day(date: NaiveDate, default_template: Option<&Template>) -> Entry {
    let lines = default_template
        .map(|t| t.lines.iter().map(|l| l.instantiate()).collect())
        .unwrap_or_default();
    Entry::with_lines(date, lines)
}

pub(crate) fn parse_day_id(day_id: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(day_id, "%Y-%m-%d")
        .map_err(|e| JournalError::InvalidInput(format!("bad day id {:?}: {}", day_id, e)))
}

impl UserDataBlob {
    pub(crate) fn default_template(&self) -> Option<&Template> {
        self.templates.iter().find(|t| t.is_default)
    }

    pub(crate) fn entry_mut(&mut self, day_id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == day_id)
    }

    /// Find the day or create it from the default template.
    pub(crate) fn entry_or_create(&mut self, date: NaiveDate) -> &mut Entry {
        let day_id = Entry::day_id(date);
        let index = match self.entries.iter().position(|e| e.id == day_id) {
            Some(index) => index,
            None => {
                let entry = build_day(date, self.default_template());
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    /// Replace a day's lines. Checked tasks that go away take their XP with
    /// them. Returns the XP removed.
    pub(crate) fn replace_lines(&mut self, date: NaiveDate, lines: Vec<Line>) -> i64 {
        let entry = self.entry_or_create(date);
        let lines = if lines.is_empty() {
            vec![Line::empty()]
        } else {
            lines
        };
        let previous = std::mem::replace(&mut entry.lines, lines);
        let dropped: Vec<String> = {
            let still_checked: HashSet<&str> = entry
                .lines
                .iter()
                .filter(|l| l.is_checked())
                .map(|l| l.id.as_str())
                .collect();
            previous
                .iter()
                .filter(|l| l.is_checked() && !still_checked.contains(l.id.as_str()))
                .map(|l| l.id.clone())
                .collect()
        };
        dropped
            .iter()
            .map(|id| self.revert_xp_source(id, date))
            .sum()
    }
}

#[derive(Clone)]
pub struct EntryManager {
    cache: DataCache,
}

impl EntryManager {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    pub fn load_entries(&self) -> Vec<Entry> {
        self.cache.load_entries()
    }

    pub fn save_entries(&self, entries: Vec<Entry>) -> crate::Result<()> {
        self.cache.save_entries(entries)
    }

    pub fn get_entry(&self, day_id: &str) -> Option<Entry> {
        self.cache
            .read(|data| data.entries.iter().find(|e| e.id == day_id).cloned())
    }

    /// Entries with `start <= date <= end`, oldest first.
    pub fn entries_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.cache.read(|data| {
            data.entries
                .iter()
                .filter(|e| e.date >= start && e.date <= end)
                .cloned()
                .collect()
        });
        entries.sort_by_key(|e| e.date);
        entries
    }

    /// A new day shaped by the current default template. Not stored.
    pub fn create_day(&self, date: NaiveDate) -> Entry {
        let template = self.cache.read(|data| data.default_template().cloned());
        build_day(date, template.as_ref())
    }

    /// Return the stored day, creating and storing it on first view.
    pub fn get_or_create_day(&self, date: NaiveDate) -> crate::Result<Entry> {
        if let Some(existing) = self.get_entry(&Entry::day_id(date)) {
            return Ok(existing);
        }
        self.cache.mutate(|data| data.entry_or_create(date).clone())
    }

    /// Replace a day's lines, and its habit values when given.
    pub fn update_day(
        &self,
        day_id: &str,
        lines: Vec<Line>,
        habits: Option<BTreeMap<String, HabitValue>>,
    ) -> crate::Result<()> {
        let date = parse_day_id(day_id)?;
        self.cache.mutate(|data| {
            data.replace_lines(date, lines);
            if let Some(habits) = habits {
                data.entry_or_create(date).habits = habits;
            }
        })
    }

    /// Insert an empty text line after `after_index` and return its id.
    pub fn add_line(&self, day_id: &str, after_index: usize) -> crate::Result<Option<String>> {
        self.cache.mutate(|data| {
            let entry = data.entry_mut(day_id)?;
            let line = Line::empty();
            let id = line.id.clone();
            let at = (after_index + 1).min(entry.lines.len());
            entry.lines.insert(at, line);
            Some(id)
        })
    }

    pub fn update_line(
        &self,
        day_id: &str,
        line_id: &str,
        content: &str,
        line_type: LineType,
    ) -> crate::Result<bool> {
        self.cache.mutate(|data| {
            let Some(line) = data
                .entry_mut(day_id)
                .and_then(|e| e.lines.iter_mut().find(|l| l.id == line_id))
            else {
                return false;
            };
            line.content = content.to_string();
            if line.line_type != line_type {
                line.line_type = line_type;
                if line_type.is_checkable() {
                    line.checked.get_or_insert(false);
                }
            }
            true
        })
    }

    /// Remove a line. The last remaining line of a day is never removed.
    pub fn delete_line(&self, day_id: &str, line_id: &str) -> crate::Result<bool> {
        let deletable = self.cache.read(|data| {
            data.entries
                .iter()
                .find(|e| e.id == day_id)
                .map(|e| e.lines.len() > 1 && e.line(line_id).is_some())
                .unwrap_or(false)
        });
        if !deletable {
            debug!("Refusing to delete line {} of {}", line_id, day_id);
            return Ok(false);
        }
        self.cache.mutate(|data| {
            let Some(entry) = data.entry_mut(day_id).filter(|e| e.lines.len() > 1) else {
                return false;
            };
            let date = entry.date;
            let lines = entry.lines.iter().filter(|l| l.id != line_id).cloned().collect();
            data.replace_lines(date, lines);
            true
        })
    }

    /// Reset the day to one empty line. Habit values are kept.
    pub fn clear_day(&self, day_id: &str) -> crate::Result<bool> {
        self.cache.mutate(|data| match data.entry_mut(day_id).map(|e| e.date) {
            Some(date) => {
                data.replace_lines(date, Vec::new());
                true
            }
            None => false,
        })
    }

    /// Check or uncheck a task line, awarding or reverting its XP.
    pub fn set_line_checked(
        &self,
        day_id: &str,
        line_id: &str,
        checked: bool,
    ) -> crate::Result<XpChange> {
        let date = parse_day_id(day_id)?;
        self.cache.mutate(|data| -> crate::Result<XpChange> {
            let entry = data
                .entry_mut(day_id)
                .ok_or_else(|| JournalError::NotFound(format!("day {}", day_id)))?;
            let line = entry
                .lines
                .iter_mut()
                .find(|l| l.id == line_id)
                .ok_or_else(|| JournalError::NotFound(format!("line {}", line_id)))?;
            if !line.line_type.is_checkable() {
                return Err(JournalError::InvalidInput(format!(
                    "line {} is not a checkbox",
                    line_id
                )));
            }
            line.checked = Some(checked);
            let amount = if checked { line.xp.unwrap_or(0) } else { 0 };
            let name = line.content.clone();
            Ok(data.reprice_xp_source(date, amount, XpSource::Task, line_id, &name))
        })?
    }

    /// Change a task's XP value; a checked task is re-priced in the ledger.
    pub fn set_line_xp(
        &self,
        day_id: &str,
        line_id: &str,
        xp: Option<i64>,
    ) -> crate::Result<XpChange> {
        let date = parse_day_id(day_id)?;
        self.cache.mutate(|data| -> crate::Result<XpChange> {
            let entry = data
                .entry_mut(day_id)
                .ok_or_else(|| JournalError::NotFound(format!("day {}", day_id)))?;
            let line = entry
                .lines
                .iter_mut()
                .find(|l| l.id == line_id)
                .ok_or_else(|| JournalError::NotFound(format!("line {}", line_id)))?;
            line.xp = xp;
            if !line.is_checked() {
                return Ok(XpChange {
                    delta: 0,
                    day_total: data.xp_for_date(date),
                });
            }
            let name = line.content.clone();
            Ok(data.reprice_xp_source(date, xp.unwrap_or(0), XpSource::Task, line_id, &name))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateLine;
    use crate::templates::NewTemplate;
    use crate::testing::journal;

    fn feb(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn test_new_day_without_template_has_one_blank_line() {
        let journal = journal();
        let day = journal.entries().create_day(feb(8));
        assert_eq!(day.id, "2026-02-08");
        assert_eq!(day.lines.len(), 1);
        assert_eq!(day.lines[0].content, "");
        assert!(journal.entries().load_entries().is_empty());
    }

    #[test]
    fn test_new_day_uses_default_template_with_fresh_ids() {
        let journal = journal();
        journal
            .templates()
            .save_template(NewTemplate {
                name: "Morning".into(),
                is_default: true,
                lines: vec![
                    TemplateLine {
                        line_type: LineType::Checkbox,
                        content: "Meditate".into(),
                    },
                    TemplateLine {
                        line_type: LineType::Text,
                        content: "Notes".into(),
                    },
                ],
                created_at: None,
            })
            .unwrap();

        let a = journal.entries().get_or_create_day(feb(8)).unwrap();
        let b = journal.entries().get_or_create_day(feb(9)).unwrap();
        assert_eq!(a.lines.len(), 2);
        assert_eq!(a.lines[0].line_type, LineType::Checkbox);
        assert_eq!(a.lines[0].content, "Meditate");
        assert_eq!(a.lines[0].checked, Some(false));
        assert_ne!(a.lines[0].id, b.lines[0].id);
        assert_eq!(journal.entries().load_entries().len(), 2);

        let again = journal.entries().get_or_create_day(feb(8)).unwrap();
        assert_eq!(again.lines[0].id, a.lines[0].id);
    }

    #[test]
    fn test_last_line_cannot_be_deleted() {
        let journal = journal();
        let day = journal.entries().get_or_create_day(feb(8)).unwrap();
        let only = day.lines[0].id.clone();

        assert!(!journal.entries().delete_line(&day.id, &only).unwrap());
        let after = journal.entries().get_entry(&day.id).unwrap();
        assert_eq!(after.lines.len(), 1);
        assert_eq!(after.lines[0].id, only);
    }

    #[test]
    fn test_add_update_and_delete_lines() {
        let journal = journal();
        let entries = journal.entries();
        let day = entries.get_or_create_day(feb(8)).unwrap();
        let new_id = entries.add_line(&day.id, 0).unwrap().unwrap();
        assert!(entries
            .update_line(&day.id, &new_id, "call mom", LineType::Checkbox)
            .unwrap());

        let stored = entries.get_entry(&day.id).unwrap();
        assert_eq!(stored.lines[1].content, "call mom");
        assert_eq!(stored.lines[1].checked, Some(false));

        assert!(entries.delete_line(&day.id, &new_id).unwrap());
        assert_eq!(entries.get_entry(&day.id).unwrap().lines.len(), 1);
        assert!(entries.add_line("2030-01-01", 0).unwrap().is_none());
    }

    #[test]
    fn test_checking_then_unchecking_restores_day_xp() {
        let journal = journal();
        let entries = journal.entries();
        let mut task = Line::new(LineType::Checkbox, "Deep work");
        task.xp = Some(10);
        let task_id = task.id.clone();
        entries.update_day("2026-02-08", vec![task], None).unwrap();
        journal
            .xp()
            .add_xp(feb(8), 3, XpSource::Habit, "h", "Water")
            .unwrap();
        let before = journal.xp().get_xp_for_date(feb(8));

        let gained = entries.set_line_checked("2026-02-08", &task_id, true).unwrap();
        assert_eq!(gained.delta, 10);
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), before + 10);

        let lost = entries.set_line_checked("2026-02-08", &task_id, false).unwrap();
        assert_eq!(lost.delta, -10);
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), before);
        assert!(journal.xp().get_xp_for_source(&task_id, feb(8)).is_empty());
    }

    #[test]
    fn test_checking_twice_does_not_double_award() {
        let journal = journal();
        let entries = journal.entries();
        let mut task = Line::new(LineType::CheckboxTime, "Gym");
        task.xp = Some(20);
        let task_id = task.id.clone();
        entries.update_day("2026-02-08", vec![task], None).unwrap();

        entries.set_line_checked("2026-02-08", &task_id, true).unwrap();
        let second = entries.set_line_checked("2026-02-08", &task_id, true).unwrap();
        assert_eq!(second.delta, 0);
        assert_eq!(journal.xp().get_xp_for_source(&task_id, feb(8)).len(), 1);

        let repriced = entries.set_line_xp("2026-02-08", &task_id, Some(35)).unwrap();
        assert_eq!(repriced.delta, 15);
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 35);
    }

    #[test]
    fn test_text_lines_cannot_be_checked() {
        let journal = journal();
        let day = journal.entries().get_or_create_day(feb(8)).unwrap();
        let result = journal
            .entries()
            .set_line_checked(&day.id, &day.lines[0].id, true);
        assert!(matches!(result, Err(JournalError::InvalidInput(_))));
    }

    #[test]
    fn test_clear_day_keeps_habit_values() {
        let journal = journal();
        let mut habits = BTreeMap::new();
        habits.insert("h1".to_string(), HabitValue::Checked(true));
        journal
            .entries()
            .update_day(
                "2026-02-08",
                vec![Line::new(LineType::Text, "a"), Line::new(LineType::Text, "b")],
                Some(habits),
            )
            .unwrap();

        assert!(journal.entries().clear_day("2026-02-08").unwrap());
        let day = journal.entries().get_entry("2026-02-08").unwrap();
        assert_eq!(day.lines.len(), 1);
        assert_eq!(day.lines[0].content, "");
        assert_eq!(day.habits.len(), 1);
    }

    #[test]
    fn test_removed_checked_tasks_take_their_xp() {
        let journal = journal();
        let entries = journal.entries();
        let checked_task = |content: &str| {
            let mut task = Line::new(LineType::Checkbox, content);
            task.xp = Some(10);
            task
        };
        let (a, b, c) = (checked_task("a"), checked_task("b"), checked_task("c"));
        let ids = [a.id.clone(), b.id.clone(), c.id.clone()];
        entries
            .update_day("2026-02-08", vec![a.clone(), b, c, Line::empty()], None)
            .unwrap();
        for id in &ids {
            entries.set_line_checked("2026-02-08", id, true).unwrap();
        }
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 30);

        assert!(entries.delete_line("2026-02-08", &ids[2]).unwrap());
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 20);
        assert!(journal.xp().get_xp_for_source(&ids[2], feb(8)).is_empty());

        let kept = entries.get_entry("2026-02-08").unwrap().lines[0].clone();
        assert_eq!(kept.id, ids[0]);
        entries.update_day("2026-02-08", vec![kept], None).unwrap();
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 10);

        assert!(entries.clear_day("2026-02-08").unwrap());
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 0);
        assert_eq!(journal.xp().get_total_xp(), 0);
    }

    #[test]
    fn test_applying_a_template_reverts_checked_tasks() {
        let journal = journal();
        let entries = journal.entries();
        let mut task = Line::new(LineType::Checkbox, "Run");
        task.xp = Some(25);
        let task_id = task.id.clone();
        entries.update_day("2026-02-08", vec![task], None).unwrap();
        entries.set_line_checked("2026-02-08", &task_id, true).unwrap();

        let template = journal
            .templates()
            .save_template(NewTemplate {
                name: "Evening".into(),
                is_default: false,
                lines: vec![TemplateLine {
                    line_type: LineType::Text,
                    content: "Recap".into(),
                }],
                created_at: None,
            })
            .unwrap();
        assert!(journal.templates().apply_template("2026-02-08", &template).unwrap());
        assert_eq!(journal.xp().get_xp_for_date(feb(8)), 0);
    }

    #[test]
    fn test_range_query_is_sorted() {
        let journal = journal();
        for d in [10, 3, 7, 20] {
            journal.entries().get_or_create_day(feb(d)).unwrap();
        }
        let ids: Vec<String> = journal
            .entries()
            .entries_in_range(feb(3), feb(10))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["2026-02-03", "2026-02-07", "2026-02-10"]);
    }
}
