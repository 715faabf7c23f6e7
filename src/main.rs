use anyhow::{bail, Context};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use integrity_journal::{
    rewards::BADGE_KINDS, HabitType, HabitValue, Journal, JournalConfig, LineType, NewHabit,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "journal")]
#[command(about = "A daily journal that keeps score.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in
    Register {
        username: String,
        password: String,
    },
    /// Log in and remember the session
    Login {
        username: String,
        password: String,
    },
    /// Flush pending edits and forget the session
    Logout,
    /// Show a day's lines, habits and XP
    Today {
        /// Day to show (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Append a line to a day
    AddLine {
        content: String,
        /// Make the line a checkbox task
        #[arg(short, long)]
        task: bool,
        /// XP awarded when the task is checked
        #[arg(long)]
        xp: Option<i64>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Check a task line
    Check {
        line_id: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Uncheck a task line
    Uncheck {
        line_id: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Define a new habit
    HabitAdd {
        name: String,
        #[arg(short = 't', long, value_enum, default_value = "checkbox")]
        kind: HabitKind,
        #[arg(long, default_value = "⭐")]
        icon: String,
        #[arg(long, default_value = "#4f46e5")]
        color: String,
        #[arg(long)]
        goal: Option<f64>,
        #[arg(long)]
        xp: Option<i64>,
    },
    /// Record a habit value ("true"/"false", a number, or text)
    HabitSet {
        habit_id: String,
        value: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Award a badge, or list the catalogue when no key is given
    Badge {
        key: Option<String>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Show this month's XP summary and medal
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum HabitKind {
    Checkbox,
    Number,
    Text,
}

impl From<HabitKind> for HabitType {
    fn from(kind: HabitKind) -> Self {
        match kind {
            HabitKind::Checkbox => HabitType::Checkbox,
            HabitKind::Number => HabitType::Number,
            HabitKind::Text => HabitType::Text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = JournalConfig::from_env().context("invalid configuration")?;
    let journal = Journal::open(&config);
    info!("Data directory: {}", config.data_dir.display());

    match cli.command {
        Commands::Register { username, password } => {
            journal
                .register(&username, &password)
                .context("registration failed")?;
            println!("Registered and logged in as {}", username);
        }
        Commands::Login { username, password } => {
            journal.login(&username, &password).context("login failed")?;
            println!("Logged in as {}", username);
        }
        Commands::Logout => {
            journal.logout()?;
            println!("Logged out");
        }
        command => {
            if !journal.restore_session().context("could not restore session")? {
                bail!("not logged in; run `journal login` first");
            }
            run(&journal, command)?;
        }
    }
    Ok(())
}

fn run(journal: &Journal, command: Commands) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    match command {
        Commands::Today { date } => show_day(journal, date.unwrap_or(today))?,
        Commands::AddLine { content, task, xp, date } => {
            let date = date.unwrap_or(today);
            let entries = journal.entries();
            let entry = entries.get_or_create_day(date)?;
            let line_id = match entry.lines.last() {
                Some(last) if last.content.is_empty() => last.id.clone(),
                _ => entries
                    .add_line(&entry.id, entry.lines.len().saturating_sub(1))?
                    .context("day vanished while adding a line")?,
            };
            let line_type = if task {
                LineType::Checkbox
            } else {
                LineType::Text
            };
            entries.update_line(&entry.id, &line_id, &content, line_type)?;
            if xp.is_some() {
                entries.set_line_xp(&entry.id, &line_id, xp)?;
            }
            journal.force_save()?;
            println!("{}", line_id);
        }
        Commands::Check { line_id, date } => {
            set_checked(journal, date.unwrap_or(today), &line_id, true)?
        }
        Commands::Uncheck { line_id, date } => {
            set_checked(journal, date.unwrap_or(today), &line_id, false)?
        }
        Commands::HabitAdd { name, kind, icon, color, goal, xp } => {
            let habit = journal.habits().add_habit(NewHabit {
                name,
                habit_type: kind.into(),
                icon,
                color,
                goal,
                xp,
            })?;
            journal.force_save()?;
            println!("{} {}", habit.id, habit.name);
        }
        Commands::HabitSet { habit_id, value, date } => {
            let value = match value.as_str() {
                "true" => HabitValue::Checked(true),
                "false" => HabitValue::Checked(false),
                other => other
                    .parse::<f64>()
                    .map(HabitValue::Number)
                    .unwrap_or_else(|_| HabitValue::Text(other.to_string())),
            };
            let change = journal
                .habits()
                .set_habit_value(date.unwrap_or(today), &habit_id, Some(value))?;
            journal.force_save()?;
            println!("{:+} XP (day total {})", change.delta, change.day_total);
        }
        Commands::Badge { key: None, .. } => {
            for kind in BADGE_KINDS.iter() {
                println!(
                    "{} {:<20} +{:<3} {}",
                    kind.icon, kind.key, kind.xp_boost, kind.description
                );
            }
        }
        Commands::Badge { key: Some(key), date } => {
            match journal.rewards().award_badge(&key, date.unwrap_or(today))? {
                Some(badge) => {
                    journal.force_save()?;
                    println!("{} {} (+{} XP)", badge.icon, badge.name, badge.xp_boost);
                }
                None => println!("{} was already awarded that day", key),
            }
        }
        Commands::Stats => {
            let summary = journal.xp().month_summary(today.year(), today.month());
            println!("Total XP:    {}", journal.xp().get_total_xp());
            println!("This month:  {}", summary.total);
            println!("Peak day:    {}", summary.peak);
            println!("Daily avg:   {}", summary.average);
            println!("Active days: {}", summary.active_days);
            let rewards = journal.rewards();
            if rewards
                .check_monthly_medals(today.year(), today.month())?
                .is_some()
            {
                journal.force_save()?;
            }
            if let Some(medal) = rewards.get_medal_for_month(today.year(), today.month()) {
                println!("Medal:       {} {}", medal.icon, medal.name);
            }
        }
        Commands::Register { .. } | Commands::Login { .. } | Commands::Logout => {}
    }
    Ok(())
}

fn set_checked(
    journal: &Journal,
    date: NaiveDate,
    line_id: &str,
    checked: bool,
) -> anyhow::Result<()> {
    let day_id = date.format("%Y-%m-%d").to_string();
    let change = journal
        .entries()
        .set_line_checked(&day_id, line_id, checked)
        .with_context(|| format!("could not update line {}", line_id))?;
    journal.force_save()?;
    println!("{:+} XP (day total {})", change.delta, change.day_total);
    Ok(())
}

fn show_day(journal: &Journal, date: NaiveDate) -> anyhow::Result<()> {
    let entry = journal.entries().get_or_create_day(date)?;
    println!("{}", entry.id);
    for line in &entry.lines {
        let marker = match (line.line_type, line.checked) {
            (LineType::Checkbox | LineType::CheckboxTime, Some(true)) => "[x]",
            (LineType::Checkbox | LineType::CheckboxTime, _) => "[ ]",
            (LineType::Radio, _) => "( )",
            (LineType::Text, _) => "   ",
        };
        let xp = line.xp.map(|xp| format!(" +{}", xp)).unwrap_or_default();
        println!("  {} {}{}  ({})", marker, line.content, xp, line.id);
    }
    for habit in journal.habits().visible_habits() {
        let value = match entry.habits.get(&habit.id) {
            Some(HabitValue::Checked(true)) => "done".to_string(),
            Some(HabitValue::Checked(false)) => "-".to_string(),
            Some(HabitValue::Number(n)) => match habit.goal {
                Some(goal) => format!("{} / {}", n, goal),
                None => n.to_string(),
            },
            Some(HabitValue::Text(text)) => text.clone(),
            None => "-".to_string(),
        };
        println!("  {} {:<16} {}  ({})", habit.icon, habit.name, value, habit.id);
    }
    for badge in journal.rewards().badges_for_date(date) {
        println!("  {} {}", badge.icon, badge.name);
    }
    println!("XP today: {}", journal.xp().get_xp_for_date(date));
    journal.force_save()?;
    Ok(())
}
