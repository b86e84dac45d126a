//! Functions that register output: achievements, leaderboards and rich
//! presence.

use crate::ast::{Expression, ExpressionKind, MacroKind, RichPresenceMacro};
use crate::builder::{ValueFormat, build_trigger, build_value};
use crate::error::{ErrorExpression, EvalResult};
use crate::interpreter::InterpreterScope;
use crate::model::{Achievement, Leaderboard};

use super::Arguments;
use super::scalar::substitute;

fn unsigned(args: &Arguments<'_>, index: usize, name: &str) -> EvalResult<u32> {
    let value = args.integer(index, name)?;
    u32::try_from(value)
        .map_err(|_| args.error(format!("{name} must be between 0 and {}, got {value}", u32::MAX)))
}

fn value_format(args: &Arguments<'_>, index: usize) -> EvalResult<ValueFormat> {
    let name = args.optional_string(index, "format", "value")?;
    ValueFormat::from_name(name).ok_or_else(|| args.error(format!("unknown format: {name}")))
}

/// `achievement(title, description, points, trigger[, id[, badge]])`
pub(super) fn achievement(
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    args.expect_count(4, 6)?;
    let title = args.string(0, "title")?;
    let description = args.string(1, "description")?;
    let points = unsigned(args, 2, "points")?;
    let trigger = build_trigger(&args.condition(3, "trigger")?)?;
    let id = match args.get(4) {
        Some(_) => unsigned(args, 4, "id")?,
        None => 0,
    };
    let badge = match args.get(5) {
        Some(value) => value
            .constant_text()
            .ok_or_else(|| args.type_error("badge", "a string or integer", value))?,
        None => scope.runtime().settings().default_badge.clone(),
    };

    log::debug!("registered achievement {title:?}: {trigger}");
    scope.runtime().output().achievements.push(Achievement {
        id,
        title: title.to_string(),
        description: description.to_string(),
        points,
        badge,
        trigger,
    });
    Ok(None)
}

/// `leaderboard(title, description, start, cancel, submit, value[, format])`
pub(super) fn leaderboard(
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    args.expect_count(6, 7)?;
    let title = args.string(0, "title")?;
    let description = args.string(1, "description")?;
    let start = build_trigger(&args.condition(2, "start")?)?;
    let cancel = build_trigger(&args.condition(3, "cancel")?)?;
    let submit = build_trigger(&args.condition(4, "submit")?)?;
    let value = build_value(args.value(5, "value")?)?;
    let format = value_format(args, 6)?;

    let leaderboard = Leaderboard {
        title: title.to_string(),
        description: description.to_string(),
        start,
        cancel,
        submit,
        value,
        format,
    };
    log::debug!("registered leaderboard {title:?}: {}", leaderboard.serialize());
    scope.runtime().output().leaderboards.push(leaderboard);
    Ok(None)
}

fn rich_presence_macro(args: &Arguments<'_>, kind: MacroKind) -> EvalResult<Option<Expression>> {
    let name = args.string(0, "name")?;
    let expression = args.value(1, "expression")?;
    Ok(Some(Expression::new(
        ExpressionKind::RichPresenceMacro(RichPresenceMacro {
            name: name.to_string(),
            kind,
            expression: Box::new(expression.clone()),
        }),
        args.span(),
    )))
}

/// `rich_presence_value(name, expression[, format])`
pub(super) fn rich_presence_value(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(2, 3)?;
    let format = value_format(args, 2)?;
    rich_presence_macro(args, MacroKind::Value(format))
}

/// `rich_presence_lookup(name, expression, dictionary[, fallback])`
pub(super) fn rich_presence_lookup(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(3, 4)?;
    let dictionary = args.value(2, "dictionary")?;
    let ExpressionKind::Dictionary(pairs) = &dictionary.kind else {
        return Err(args.type_error("dictionary", "a dictionary", dictionary));
    };
    let mut entries = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let ExpressionKind::Integer(key) = key.kind else {
            return Err(args.type_error("dictionary key", "an integer", key));
        };
        let text = value
            .constant_text()
            .ok_or_else(|| args.type_error("dictionary value", "a constant", value))?;
        entries.push((key, text));
    }
    let fallback = args.optional_string(3, "fallback", "")?.to_string();
    rich_presence_macro(args, MacroKind::Lookup { entries, fallback })
}

/// Builds display text, registering each macro it references.
fn display_text(
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
    format_index: usize,
) -> EvalResult<String> {
    let template = args.string(format_index, "format")?;
    substitute(args, template, args.rest(format_index + 1), |value| {
        let ExpressionKind::RichPresenceMacro(rich_presence_macro) = &value.kind else {
            return value.constant_text().ok_or_else(|| {
                args.type_error("parameter", "a constant or rich presence macro", value)
            });
        };
        let wire = build_value(&rich_presence_macro.expression)?;
        let name = &rich_presence_macro.name;
        let mut output = scope.runtime().output();
        let registered = match &rich_presence_macro.kind {
            MacroKind::Value(format) => output.rich_presence.add_value_format(name, *format),
            MacroKind::Lookup { entries, fallback } => {
                output
                    .rich_presence
                    .add_lookup(name, entries.clone(), fallback.clone())
            }
        };
        registered.map_err(|message| ErrorExpression::evaluation(message, value.span))?;
        Ok(format!("@{name}({wire})"))
    })
}

/// `rich_presence_display(format, parameters...)`
pub(super) fn rich_presence_display(
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    args.expect_count(1, usize::MAX)?;
    let text = display_text(args, scope, 0)?;
    scope
        .runtime()
        .output()
        .rich_presence
        .set_display(text)
        .map_err(|message| ErrorExpression::evaluation(message, args.span()))?;
    Ok(None)
}

/// `rich_presence_conditional_display(condition, format, parameters...)`
pub(super) fn rich_presence_conditional_display(
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    args.expect_count(2, usize::MAX)?;
    let condition = build_trigger(&args.condition(0, "condition")?)?;
    let text = display_text(args, scope, 1)?;
    scope
        .runtime()
        .output()
        .rich_presence
        .add_conditional_display(condition, text);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::builder::ValueFormat;
    use crate::config::Settings;
    use crate::error::EvalResult;
    use crate::interpreter::Interpreter;
    use crate::model::AchievementScriptContext;
    use crate::parser::parse;

    fn run(source: &str) -> EvalResult<AchievementScriptContext> {
        Interpreter::new().run(&parse(source)?)
    }

    #[test]
    fn achievement_defaults_and_overrides() {
        let settings = Settings {
            default_badge: "00000".to_string(),
            ..Settings::default()
        };
        let program = parse(indoc! {r#"
            achievement("A", "first", 5, byte(1) == 1)
            achievement("B", "second", 10, byte(2) == 1, 77, "12345")
        "#})
        .unwrap();
        let output = Interpreter::with_settings(settings).run(&program).unwrap();
        let first = &output.achievements[0];
        assert_eq!((first.id, first.badge.as_str()), (0, "00000"));
        let second = &output.achievements[1];
        assert_eq!((second.id, second.badge.as_str()), (77, "12345"));
    }

    #[test]
    fn achievement_argument_errors() {
        assert_eq!(
            run(r#"achievement("A", "", -5, byte(1) == 1)"#).unwrap_err().message,
            "achievement: points must be between 0 and 4294967295, got -5"
        );
        assert_eq!(
            run(r#"achievement("A", "", 5)"#).unwrap_err().message,
            "achievement: expected at least 4 arguments, got 3"
        );
        assert_eq!(
            run(r#"achievement("A", "", 5, byte(1))"#).unwrap_err().message,
            "achievement: trigger must be a condition, got MemoryAccessor"
        );
    }

    #[test]
    fn registers_leaderboards() {
        let output = run(indoc! {r#"
            leaderboard("Fast", "Quickest run", byte(1) == 1, byte(1) == 0, byte(2) == 9,
                        dword(0x10) * 2 + 5, "FRAMES")
        "#})
        .unwrap();
        let leaderboard = &output.leaderboards[0];
        assert_eq!(leaderboard.format, ValueFormat::Frames);
        assert_eq!(
            leaderboard.serialize(),
            "STA:0xH000001=1::CAN:0xH000001=0::SUB:0xH000002=9::VAL:0xX000010*2_v5"
        );
    }

    #[test]
    fn renders_rich_presence_macros() {
        let output = run(indoc! {r#"
            modes = {0: "Easy", 1: "Hard"}
            rich_presence_conditional_display(byte(3) == 1, "Paused in {0}",
                rich_presence_lookup("Mode", byte(2), modes, "?"))
            rich_presence_display("{0} mode, {1} points",
                rich_presence_lookup("Mode", byte(2), modes, "?"),
                rich_presence_value("Score", word(0x10), "score"))
        "#})
        .unwrap();
        assert_eq!(
            output.rich_presence.to_string(),
            indoc! {"
                Format:Score
                FormatType=SCORE

                Lookup:Mode
                0=Easy
                1=Hard
                *=?

                Display:
                ?0xH000003=1?Paused in @Mode(0xH000002)
                @Mode(0xH000002) mode, @Score(0x 000010) points
            "}
        );
    }

    #[test]
    fn rich_presence_errors() {
        assert_eq!(
            run(r#"rich_presence_display("{0}", byte(1))"#).unwrap_err().message,
            "rich_presence_display: parameter must be a constant or rich presence macro, got MemoryAccessor"
        );
        assert_eq!(
            run(indoc! {r#"
                rich_presence_display("a")
                rich_presence_display("b")
            "#})
            .unwrap_err()
            .message,
            "Only one rich_presence_display may be specified"
        );
        assert_eq!(
            run(r#"rich_presence_display("{0}", rich_presence_value("S", byte(1), "bogus"))"#)
                .unwrap_err()
                .message,
            "rich_presence_value: unknown format: bogus"
        );
    }
}
