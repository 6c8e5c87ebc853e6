//! Rule evaluation: map bound values to a target state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use rhai::{Dynamic, Engine, Scope, AST};

use crate::data::{DataValue, RuleBasedMap, ValueMap};
use crate::state::StateValue;

/// Evaluates a rule map against bound values.
pub trait RuleEvaluator {
    /// Target of the first statement whose expression holds, or `initial` when
    /// none does. `None` means no state should be applied.
    fn evaluate(
        &self,
        initial: &StateValue,
        values: &ValueMap,
        rule: Option<&RuleBasedMap>,
    ) -> Option<StateValue>;
}

fn quote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^'\\]*)'").expect("quote regex is valid"))
}

/// Rewrite single-quoted literals as double-quoted strings.
pub fn normalize_expression(expression: &str) -> String {
    quote_regex().replace_all(expression, "\"$1\"").into_owned()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Sandboxed Rhai evaluation of rule expressions like `temperature >= 40`.
pub struct RhaiRuleEvaluator {
    engine: Engine,
    compiled: RefCell<HashMap<String, Option<AST>>>,
}

impl RhaiRuleEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        // Same limits as user scripts: expressions never need more
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(64);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(500);

        Self {
            engine,
            compiled: RefCell::new(HashMap::new()),
        }
    }

    fn scope_for(values: &ValueMap) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in values {
            if !is_identifier(name) {
                log::debug!("Skipping field '{}' in rule scope", name);
                continue;
            }
            let dynamic = match value {
                DataValue::Bool(b) => Dynamic::from(*b),
                DataValue::Number(n) => Dynamic::from(*n),
                DataValue::Text(s) => Dynamic::from(s.clone()),
            };
            scope.push_dynamic(name.clone(), dynamic);
        }
        scope
    }

    /// True if `expression` evaluates to boolean true. Failures count as false.
    pub fn test(&self, expression: &str, values: &ValueMap) -> bool {
        let mut scope = Self::scope_for(values);

        let mut compiled = self.compiled.borrow_mut();
        let ast = compiled.entry(expression.to_string()).or_insert_with(|| {
            let source = normalize_expression(expression);
            match self.engine.compile_expression(&source) {
                Ok(ast) => Some(ast),
                Err(e) => {
                    log::warn!("Rule expression '{}' failed to compile: {}", expression, e);
                    None
                }
            }
        });
        let Some(ast) = ast else {
            return false;
        };

        match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast) {
            Ok(result) => result.as_bool().unwrap_or(false),
            Err(e) => {
                log::debug!("Rule expression '{}' did not evaluate: {}", expression, e);
                false
            }
        }
    }
}

impl Default for RhaiRuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for RhaiRuleEvaluator {
    fn evaluate(
        &self,
        initial: &StateValue,
        values: &ValueMap,
        rule: Option<&RuleBasedMap>,
    ) -> Option<StateValue> {
        let Some(rule) = rule else {
            return Some(initial.clone());
        };
        let target = rule
            .statements
            .iter()
            .find(|statement| self.test(&statement.expression, values))
            .map(|statement| StateValue::from(statement.target.as_str()));
        Some(target.unwrap_or_else(|| initial.clone()))
    }
}

impl<F> RuleEvaluator for F
where
    F: Fn(&StateValue, &ValueMap, Option<&RuleBasedMap>) -> Option<StateValue>,
{
    fn evaluate(
        &self,
        initial: &StateValue,
        values: &ValueMap,
        rule: Option<&RuleBasedMap>,
    ) -> Option<StateValue> {
        self(initial, values, rule)
    }
}
