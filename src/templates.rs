use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::entries::parse_day_id;
use crate::error::JournalError;
use crate::model::{Line, Template, TemplateLine, UserDataBlob};
use crate::storage::DataCache;

/// Name of the hidden template that stands for "no default layout".
pub const CLEARED_DEFAULT_NAME: &str = "__cleared_default__";

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub is_default: bool,
    pub lines: Vec<TemplateLine>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub is_default: Option<bool>,
    pub lines: Option<Vec<TemplateLine>>,
    pub is_hidden: Option<bool>,
}

impl UserDataBlob {
    fn unset_default_templates(&mut self) {
        for template in &mut self.templates {
            template.is_default = false;
        }
    }

    fn insert_template(&mut self, new: NewTemplate, is_hidden: bool) -> Template {
        if new.is_default {
            self.unset_default_templates();
        }
        let template = Template {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            is_default: new.is_default,
            lines: new.lines,
            created_at: new.created_at.unwrap_or_else(Utc::now),
            is_hidden,
        };
        self.templates.push(template.clone());
        template
    }
}

#[derive(Clone)]
pub struct TemplateManager {
    cache: DataCache,
}

impl TemplateManager {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    /// Every stored template, hidden ones included.
    pub fn load_templates(&self) -> Vec<Template> {
        self.cache.load_templates()
    }

    /// Templates meant for browsing; hidden system templates are left out.
    pub fn list_templates(&self) -> Vec<Template> {
        self.cache
            .read(|data| data.templates.iter().filter(|t| !t.is_hidden).cloned().collect())
    }

    pub fn get_template(&self, id: &str) -> Option<Template> {
        self.cache
            .read(|data| data.templates.iter().find(|t| t.id == id).cloned())
    }

    pub fn save_template(&self, new: NewTemplate) -> crate::Result<Template> {
        if new.name.trim().is_empty() {
            return Err(JournalError::InvalidInput("template name is required".to_string()));
        }
        let template = self.cache.mutate(|data| data.insert_template(new, false))?;
        info!("Saved template {} (default: {})", template.name, template.is_default);
        Ok(template)
    }

    /// Snapshot a day's line shapes; their content becomes placeholder text.
    pub fn capture_template(
        &self,
        day_id: &str,
        name: &str,
        is_default: bool,
    ) -> crate::Result<Template> {
        let lines: Option<Vec<TemplateLine>> = self.cache.read(|data| {
            data.entries
                .iter()
                .find(|e| e.id == day_id)
                .map(|e| e.lines.iter().map(TemplateLine::from).collect())
        });
        let lines = lines.ok_or_else(|| JournalError::NotFound(format!("day {}", day_id)))?;
        self.save_template(NewTemplate {
            name: name.to_string(),
            is_default,
            lines,
            created_at: None,
        })
    }

    pub fn update_template(&self, id: &str, update: TemplateUpdate) -> crate::Result<bool> {
        self.cache.mutate(|data| {
            if !data.templates.iter().any(|t| t.id == id) {
                return false;
            }
            if update.is_default == Some(true) {
                data.unset_default_templates();
            }
            if let Some(template) = data.templates.iter_mut().find(|t| t.id == id) {
                if let Some(name) = update.name {
                    template.name = name;
                }
                if let Some(is_default) = update.is_default {
                    template.is_default = is_default;
                }
                if let Some(lines) = update.lines {
                    template.lines = lines;
                }
                if let Some(is_hidden) = update.is_hidden {
                    template.is_hidden = is_hidden;
                }
            }
            true
        })
    }

    pub fn delete_template(&self, id: &str) -> crate::Result<bool> {
        self.cache.mutate(|data| {
            let before = data.templates.len();
            data.templates.retain(|t| t.id != id);
            data.templates.len() != before
        })
    }

    pub fn get_default_template(&self) -> Option<Template> {
        self.cache.read(|data| data.default_template().cloned())
    }

    /// Make an existing template the default.
    pub fn set_default_template(&self, id: &str) -> crate::Result<bool> {
        self.update_template(
            id,
            TemplateUpdate {
                is_default: Some(true),
                ..TemplateUpdate::default()
            },
        )
    }

    /// Store a hidden empty template as the default so new days start blank.
    pub fn clear_default_template(&self) -> crate::Result<Template> {
        self.cache.mutate(|data| {
            data.templates
                .retain(|t| !(t.is_hidden && t.name == CLEARED_DEFAULT_NAME));
            data.insert_template(
                NewTemplate {
                    name: CLEARED_DEFAULT_NAME.to_string(),
                    is_default: true,
                    lines: Vec::new(),
                    created_at: None,
                },
                true,
            )
        })
    }

    /// Overwrite a day's lines with fresh copies of the template's lines.
    pub fn apply_template(&self, day_id: &str, template: &Template) -> crate::Result<bool> {
        let date = parse_day_id(day_id)?;
        let lines: Vec<Line> = template.lines.iter().map(|l| l.instantiate()).collect();
        self.cache.mutate(|data| {
            data.replace_lines(date, lines);
            true
        })
    }
}
