//! Statement execution over the scope chain.
//!
//! Execution pipeline: `Interpreter::run` -> `exec_statement` ->
//! `Expression::evaluate` -> `call_function` -> `exec_block` (function body).

mod evaluate;
mod execute;
pub mod scope;

use std::thread;

use crate::ast::{Program, Statement};
use crate::config::Settings;
use crate::error::{ErrorExpression, EvalResult};
use crate::model::AchievementScriptContext;
use crate::token::Span;

pub(crate) use execute::{ExecResult, exec_block};
pub use scope::{InterpreterScope, Runtime, ScopeContext};

/// Stack reserved for each level of user function calls.
const STACK_PER_CALL: usize = 256 * 1024;
const BASE_STACK: usize = 4 * 1024 * 1024;

/// Runs parsed scripts and collects the achievements, leaderboards and rich
/// presence they register.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    settings: Settings,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs `program` on a worker thread whose stack grows with
    /// `max_call_depth`, so runaway recursion ends in an error instead of a
    /// stack overflow.
    pub fn run(&self, program: &Program) -> EvalResult<AchievementScriptContext> {
        let stack_size = self
            .settings
            .max_call_depth
            .saturating_mul(STACK_PER_CALL)
            .saturating_add(BASE_STACK);
        thread::scope(|threads| {
            let worker = thread::Builder::new()
                .name("rascript-interpreter".to_string())
                .stack_size(stack_size)
                .spawn_scoped(threads, || self.run_in_place(program))
                .map_err(|error| {
                    ErrorExpression::evaluation(
                        format!("Failed to start interpreter thread: {error}"),
                        Span::default(),
                    )
                })?;
            worker.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    }

    fn run_in_place(&self, program: &Program) -> EvalResult<AchievementScriptContext> {
        let runtime = Runtime::new(self.settings.clone());
        {
            let mut scope = InterpreterScope::global(&runtime);
            for statement in &program.statements {
                if let Statement::FunctionDef(definition) = statement {
                    execute::define_function(definition, &mut scope)?;
                    continue;
                }
                if let ExecResult::Return(value) = execute::exec_statement(statement, &mut scope)? {
                    return Err(ErrorExpression::evaluation(
                        "return is only valid inside a function",
                        value.span,
                    ));
                }
            }
        }

        let output = runtime.into_output();
        if output.rich_presence.has_conditional_displays() && output.rich_presence.display().is_none() {
            return Err(ErrorExpression::evaluation(
                "rich_presence_conditional_display requires a rich_presence_display for the default case",
                Span::default(),
            ));
        }
        log::debug!(
            "script registered {} achievements and {} leaderboards",
            output.achievements.len(),
            output.leaderboards.len()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser::parse;

    fn run(source: &str) -> EvalResult<AchievementScriptContext> {
        Interpreter::new().run(&parse(source)?)
    }

    fn run_err(source: &str) -> String {
        run(source).expect_err("expected script error").message
    }

    #[test]
    fn registers_achievement_from_none_of() {
        let output = run(indoc! {r#"
            achievement("T", "D", 5, none_of([byte(0x1234) == 1, byte(0x1235) == 2]))
        "#})
        .unwrap();
        assert_eq!(output.achievements.len(), 1);
        let achievement = &output.achievements[0];
        assert_eq!(achievement.title, "T");
        assert_eq!(achievement.points, 5);
        assert_eq!(achievement.trigger.to_string(), "0xH001234!=1_0xH001235!=2");
        assert!(achievement.trigger.alts.is_empty());
    }

    #[test]
    fn functions_loops_and_conditionals() {
        let output = run(indoc! {r#"
            function flag(index) => byte(0x100 + index) == 1
            function points(index) {
                if index > 2 {
                    return 10
                }
                return 5
            }
            names = {1: "One", 2: "Two", 3: "Three"}
            for i in range(1, 3) {
                achievement(names[i], "Reach " + i, points(i), flag(i))
            }
        "#})
        .unwrap();
        let summary: Vec<_> = output
            .achievements
            .iter()
            .map(|a| (a.title.as_str(), a.points, a.trigger.to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("One", 5, "0xH000101=1".to_string()),
                ("Two", 5, "0xH000102=1".to_string()),
                ("Three", 10, "0xH000103=1".to_string()),
            ]
        );
        assert_eq!(output.achievements[1].description, "Reach 2");
    }

    #[test]
    fn loop_bodies_update_outer_variables() {
        let output = run(indoc! {r#"
            total = 0
            for i in [1, 2, 3] {
                total = total + i
            }
            achievement("Sum", "", total, byte(0x10) == total)
        "#})
        .unwrap();
        assert_eq!(output.achievements[0].trigger.to_string(), "0xH000010=6");
    }

    #[test]
    fn index_assignment_creates_and_updates_entries() {
        let output = run(indoc! {r#"
            table = {"a": {1: 2}}
            table["a"][1] = 3
            table["b"] = 4
            achievement("T", "", table["a"][1] + table["b"], byte(1) == 1)
        "#})
        .unwrap();
        assert_eq!(output.achievements[0].points, 7);
    }

    #[test]
    fn default_parameters_and_function_references() {
        let output = run(indoc! {r#"
            function check(address, value = 3) => byte(address) == value
            achievement("T", "", 1, all_of([1, 2], check))
            achievement("U", "", 1, check(4, 5))
        "#})
        .unwrap();
        assert_eq!(
            output.achievements[0].trigger.to_string(),
            "0xH000001=3_0xH000002=3"
        );
        assert_eq!(output.achievements[1].trigger.to_string(), "0xH000004=5");
    }

    #[test]
    fn defaults_may_refer_to_other_parameters() {
        let output = run(indoc! {r#"
            function check(address = base + 1, base = 0x20) => byte(address) == base
            achievement("T", "", 1, check())
            achievement("U", "", 1, check(0x40))
        "#})
        .unwrap();
        assert_eq!(output.achievements[0].trigger.to_string(), "0xH000021=32");
        assert_eq!(output.achievements[1].trigger.to_string(), "0xH000040=32");
    }

    #[test]
    fn mutually_dependent_defaults_are_reported() {
        assert_eq!(
            run_err(indoc! {"
                function f(a = b, b = a) => a + b
                x = f()
            "}),
            "Recursive reference to variable: a"
        );
    }

    #[test]
    fn alt_groups_are_joined_with_dollar() {
        let output = run(indoc! {r#"
            achievement("A", "d", 5, byte(1) == 1 && (byte(2) == 2 || byte(3) == 3))
        "#})
        .unwrap();
        assert_eq!(
            output.achievements[0].trigger.to_string(),
            "0xH000001=1$0xH000002=2$0xH000003=3"
        );
    }

    #[test]
    fn iterating_a_dictionary_yields_its_keys() {
        let output = run(indoc! {r#"
            flags = {0x10: 1, 0x20: 2}
            total = 0
            for address in flags {
                total = total + flags[address]
            }
            achievement("T", "", total, byte(0x10) == 1)
        "#})
        .unwrap();
        assert_eq!(output.achievements[0].points, 3);
    }

    #[test]
    fn statement_errors() {
        assert_eq!(
            run_err("if true { function f() => 1 }"),
            "Functions may only be defined at the top level"
        );
        assert_eq!(
            run_err("function byte(a) => a"),
            "byte is a built-in function and cannot be redefined"
        );
        assert_eq!(
            run_err("for i in [1] { i = 2 }"),
            "Cannot modify loop variable i"
        );
        assert_eq!(run_err("for i in 3 { }"), "Cannot iterate over IntegerConstant");
        assert_eq!(
            run_err("1 + 2"),
            "Only assignments and function calls can be used as statements"
        );
        assert_eq!(run_err("return 1"), "return is only valid inside a function");
        assert_eq!(run_err("missing(1)"), "Unknown function: missing");
    }

    #[test]
    fn call_errors() {
        assert_eq!(
            run_err(indoc! {"
                function f(a) => a
                x = f(1, 2)
            "}),
            "Too many parameters passed to f: expected 1, got 2"
        );
        assert_eq!(
            run_err(indoc! {"
                function f(a) => a
                x = f()
            "}),
            "Required parameter 'a' not provided to f"
        );
        assert_eq!(
            run_err(indoc! {"
                function f(a) { x = a }
                y = f(1)
            "}),
            "f did not return a value"
        );
    }

    #[test]
    fn runaway_recursion_at_default_depth_is_reported() {
        assert_eq!(
            run_err(indoc! {"
                function f(n) {
                    return f(n + 1)
                }
                x = f(0)
            "}),
            "Maximum call depth exceeded calling f"
        );
    }

    #[test]
    fn runaway_recursion_at_deepest_allowed_depth_is_reported() {
        let settings = Settings {
            max_call_depth: crate::config::MAX_CALL_DEPTH_LIMIT,
            ..Settings::default()
        };
        let program = parse(indoc! {"
            function count(n) => all_of([n], count_next)
            function count_next(n) => count(n + 1) == 1
            x = count(0)
        "})
        .unwrap();
        let error = Interpreter::with_settings(settings).run(&program).unwrap_err();
        assert_eq!(error.message, "Maximum call depth exceeded calling count");
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let settings = Settings {
            max_call_depth: 20,
            ..Settings::default()
        };
        let program = parse("function f(n) => f(n + 1)\nx = f(0)").unwrap();
        let error = Interpreter::with_settings(settings).run(&program).unwrap_err();
        assert_eq!(error.message, "Maximum call depth exceeded calling f");
    }

    #[test]
    fn conditional_display_needs_default() {
        assert_eq!(
            run_err(r#"rich_presence_conditional_display(byte(1) == 1, "Playing")"#),
            "rich_presence_conditional_display requires a rich_presence_display for the default case"
        );
    }
}
