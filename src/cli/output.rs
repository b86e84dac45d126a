//! Text and JSON rendering of compiled scripts.

use std::fmt::Write as _;

use serde::Serialize;

use crate::builder::{Condition, Trigger, ValueFormat};
use crate::error::{ErrorExpression, ErrorKind};
use crate::model::AchievementScriptContext;

#[derive(Debug, Serialize)]
pub struct ScriptReport<'a> {
    pub title: Option<&'a str>,
    pub game_id: Option<u32>,
    pub achievements: Vec<AchievementReport<'a>>,
    pub leaderboards: Vec<LeaderboardReport<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich_presence: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AchievementReport<'a> {
    pub id: u32,
    pub title: &'a str,
    pub description: &'a str,
    pub points: u32,
    pub badge: &'a str,
    pub trigger: String,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardReport<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub format: ValueFormat,
    pub definition: String,
}

impl<'a> From<&'a AchievementScriptContext> for ScriptReport<'a> {
    fn from(context: &'a AchievementScriptContext) -> Self {
        Self {
            title: context.title.as_deref(),
            game_id: context.game_id,
            achievements: context
                .achievements
                .iter()
                .map(|achievement| AchievementReport {
                    id: achievement.id,
                    title: &achievement.title,
                    description: &achievement.description,
                    points: achievement.points,
                    badge: &achievement.badge,
                    trigger: achievement.trigger.to_string(),
                })
                .collect(),
            leaderboards: context
                .leaderboards
                .iter()
                .map(|leaderboard| LeaderboardReport {
                    title: &leaderboard.title,
                    description: &leaderboard.description,
                    format: leaderboard.format,
                    definition: leaderboard.serialize(),
                })
                .collect(),
            rich_presence: (!context.rich_presence.is_empty())
                .then(|| context.rich_presence.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReport<'a> {
    pub kind: &'static str,
    pub message: &'a str,
    pub line: usize,
    pub column: usize,
}

impl<'a> From<&'a ErrorExpression> for ErrorReport<'a> {
    fn from(error: &'a ErrorExpression) -> Self {
        Self {
            kind: match error.kind {
                ErrorKind::Parse => "parse",
                ErrorKind::Evaluation => "evaluation",
            },
            message: &error.message,
            line: error.span.line,
            column: error.span.column,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConditionReport {
    pub group: usize,
    pub flag: &'static str,
    pub left: String,
    pub operator: Option<&'static str>,
    pub right: Option<String>,
    pub hits: u32,
}

impl ConditionReport {
    fn new(group: usize, condition: &Condition) -> Self {
        Self {
            group,
            flag: condition.flag.name(),
            left: condition.left.to_string(),
            operator: condition.right.map(|(op, _)| op.symbol()),
            right: condition.right.map(|(_, right)| right.to_string()),
            hits: condition.hit_target,
        }
    }
}

/// Conditions of a decoded trigger; group 0 is the core.
pub fn condition_reports(trigger: &Trigger) -> Vec<ConditionReport> {
    trigger
        .groups()
        .enumerate()
        .flat_map(|(group, conditions)| {
            conditions
                .iter()
                .map(move |condition| ConditionReport::new(group, condition))
        })
        .collect()
}

pub fn render_text(context: &AchievementScriptContext) -> String {
    let mut out = String::new();
    if let Some(title) = &context.title {
        let _ = writeln!(out, "Game: {title}");
    }
    if let Some(id) = context.game_id {
        let _ = writeln!(out, "Game ID: {id}");
    }
    for achievement in &context.achievements {
        let _ = writeln!(
            out,
            "Achievement {}: {} ({} points)",
            achievement.id, achievement.title, achievement.points
        );
        let _ = writeln!(out, "  {}", achievement.description);
        let _ = writeln!(out, "  {}", achievement.trigger);
    }
    for leaderboard in &context.leaderboards {
        let _ = writeln!(out, "Leaderboard: {} ({})", leaderboard.title, leaderboard.format);
        let _ = writeln!(out, "  {}", leaderboard.description);
        let _ = writeln!(out, "  {}", leaderboard.serialize());
    }
    if !context.rich_presence.is_empty() {
        let _ = writeln!(out, "Rich Presence:");
        out.push_str(&context.rich_presence.to_string());
    }
    out
}

pub fn render_conditions(trigger: &Trigger) -> String {
    let mut out = String::new();
    for (group, conditions) in trigger.groups().enumerate() {
        if group == 0 {
            let _ = writeln!(out, "Core");
        } else {
            let _ = writeln!(out, "Alt {group}");
        }
        for (index, condition) in conditions.iter().enumerate() {
            let report = ConditionReport::new(group, condition);
            let _ = write!(out, "  {:>2}: {:<12}{}", index + 1, report.flag, report.left);
            if let (Some(op), Some(right)) = (report.operator, &report.right) {
                let _ = write!(out, " {op} {right}");
            }
            if report.hits > 0 {
                let _ = write!(out, " ({} hits)", report.hits);
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::compile;

    #[test]
    fn renders_script_as_text_and_json() {
        let context = compile(indoc! {r#"
            // Demo Game
            // #ID = 42
            achievement("Start", "Begin the game", 5, byte(0x10) == 1, 7)
        "#})
        .unwrap();

        assert_eq!(
            render_text(&context),
            indoc! {"
                Game: Demo Game
                Game ID: 42
                Achievement 7: Start (5 points)
                  Begin the game
                  0xH000010=1
            "}
        );

        let json = serde_json::to_value(ScriptReport::from(&context)).unwrap();
        assert_eq!(json["game_id"], 42);
        assert_eq!(json["achievements"][0]["trigger"], "0xH000010=1");
        assert!(json.get("rich_presence").is_none());
    }

    #[test]
    fn renders_decoded_conditions() {
        let trigger: Trigger = "R:0xH000001=1_0xH000002>=3.2.$0xX000010!=0".parse().unwrap();
        assert_eq!(
            render_conditions(&trigger),
            indoc! {"
                Core
                   1: ResetIf     0xH000001 = 1
                   2:             0xH000002 >= 3 (2 hits)
                Alt 1
                   1:             0xX000010 != 0
            "}
        );
        let reports = condition_reports(&trigger);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].group, 1);
    }
}
